//! Packager
//!
//! Copies the installed SDK subtrees into the package output directory.
//! Idempotence within a run is handled by the run state, see
//! [`ProvisioningRun::package`](crate::pipeline::ProvisioningRun::package).

use std::path::Path;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::ProvisionError;

/// Subtrees of the SDK root that make up a package
pub const PACKAGE_SUBTREES: [&str; 4] = ["build-tools", "licenses", "platforms", "tools"];

/// Copy every [`PACKAGE_SUBTREES`] entry from `sdk_root` into `package_dir`.
///
/// All subtrees are checked before anything is copied. The package directory
/// is created if needed and never removed.
pub fn copy_package(sdk_root: &Path, package_dir: &Path) -> Result<(), ProvisionError> {
    for subtree in PACKAGE_SUBTREES {
        let source = sdk_root.join(subtree);
        if !source.is_dir() {
            return Err(ProvisionError::Packaging {
                subtree,
                path: source,
            });
        }
    }

    std::fs::create_dir_all(package_dir)
        .map_err(|e| ProvisionError::io(format!("Failed to create {:?}", package_dir), e))?;

    for subtree in PACKAGE_SUBTREES {
        let copied = copy_tree(&sdk_root.join(subtree), &package_dir.join(subtree))?;
        info!("Packaged {} ({} entries)", subtree, copied);
    }
    Ok(())
}

/// Recursively copy `src` to `dst`, keeping file permissions and recreating
/// symbolic links. Existing files in `dst` are overwritten.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<usize, ProvisionError> {
    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| {
            let context = format!("Failed to walk {:?}", src);
            ProvisionError::io(
                context,
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
            )
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| ProvisionError::io("Failed to relativize path", std::io::Error::other(e)))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&target)
                .map_err(|e| ProvisionError::io(format!("Failed to create {:?}", target), e))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|e| {
                ProvisionError::io(format!("Failed to copy {:?}", entry.path()), e)
            })?;
        }
        copied += 1;
    }
    debug!("Copied {} entries from {:?} to {:?}", copied, src, dst);
    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> Result<(), ProvisionError> {
    let pointee = std::fs::read_link(link)
        .map_err(|e| ProvisionError::io(format!("Failed to read link {:?}", link), e))?;
    if target.symlink_metadata().is_ok() {
        std::fs::remove_file(target)
            .map_err(|e| ProvisionError::io(format!("Failed to replace {:?}", target), e))?;
    }
    std::os::unix::fs::symlink(&pointee, target)
        .map_err(|e| ProvisionError::io(format!("Failed to link {:?}", target), e))
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> Result<(), ProvisionError> {
    if link.is_dir() {
        copy_tree(link, target).map(|_| ())
    } else {
        std::fs::copy(link, target)
            .map(|_| ())
            .map_err(|e| ProvisionError::io(format!("Failed to copy {:?}", link), e))
    }
}
