//! Archive extraction
//!
//! Synchronous zip and tar extraction with optional strip-root. Callers run
//! these inside `spawn_blocking`.

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::FetchError;
use crate::sources::ArchiveFormat;

/// Extract `archive` into `target_dir`.
///
/// With `strip_root`, exactly one leading path component is removed from every
/// entry and all entries must live under the same top-level directory.
/// Returns the number of files, directories and links written.
pub fn extract_archive(
    archive: &Path,
    format: ArchiveFormat,
    target_dir: &Path,
    strip_root: bool,
) -> Result<usize, FetchError> {
    std::fs::create_dir_all(target_dir)?;
    debug!("Extracting {:?} ({:?}) to {:?}", archive, format, target_dir);

    let file = File::open(archive)?;
    match format {
        ArchiveFormat::Zip => extract_zip(file, target_dir, strip_root),
        ArchiveFormat::TarGz => extract_tar(flate2::read::GzDecoder::new(file), target_dir, strip_root),
        ArchiveFormat::Tar => extract_tar(file, target_dir, strip_root),
    }
}

/// Tracks the single top-level directory seen while stripping
struct RootStripper {
    enabled: bool,
    root: Option<PathBuf>,
}

impl RootStripper {
    fn new(enabled: bool) -> Self {
        Self { enabled, root: None }
    }

    /// Map an archive path to a relative output path; `None` for the root entry itself
    fn relative(&mut self, entry: &Path) -> Result<Option<PathBuf>, FetchError> {
        if entry.is_absolute()
            || entry
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(FetchError::Extraction(format!(
                "refusing to extract unsafe path {:?}",
                entry
            )));
        }

        let mut components = entry
            .components()
            .filter(|c| matches!(c, Component::Normal(_)));

        if !self.enabled {
            let rel: PathBuf = components.collect();
            return Ok((!rel.as_os_str().is_empty()).then_some(rel));
        }

        let Some(first) = components.next() else {
            return Ok(None);
        };
        let first = PathBuf::from(first.as_os_str());
        match &self.root {
            Some(root) if *root != first => {
                return Err(FetchError::Extraction(format!(
                    "cannot strip root: archive has several top-level entries ({:?} and {:?})",
                    root, first
                )));
            }
            Some(_) => {}
            None => self.root = Some(first),
        }

        let rest: PathBuf = components.collect();
        Ok((!rest.as_os_str().is_empty()).then_some(rest))
    }
}

fn extract_zip(file: File, target_dir: &Path, strip_root: bool) -> Result<usize, FetchError> {
    let mut zip = zip::ZipArchive::new(file).map_err(|e| FetchError::Extraction(e.to_string()))?;
    let mut stripper = RootStripper::new(strip_root);
    let mut written = 0;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| FetchError::Extraction(e.to_string()))?;

        let name = PathBuf::from(entry.name());
        let is_dir = entry.is_dir();
        let Some(rel) = stripper.relative(&name)? else {
            if !is_dir {
                return Err(FetchError::Extraction(format!(
                    "cannot strip root: {:?} is a file at the top level",
                    name
                )));
            }
            continue;
        };
        let outpath = target_dir.join(rel);

        if is_dir {
            std::fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&outpath)?;
            std::io::copy(&mut entry, &mut outfile)?;
        }

        // Set permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode & 0o7777))?;
            }
        }

        written += 1;
    }

    Ok(written)
}

fn extract_tar<R: Read>(reader: R, target_dir: &Path, strip_root: bool) -> Result<usize, FetchError> {
    let mut tar = tar::Archive::new(reader);
    let mut stripper = RootStripper::new(strip_root);
    let mut written = 0;

    let entries = tar
        .entries()
        .map_err(|e| FetchError::Extraction(e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| FetchError::Extraction(e.to_string()))?;
        let name = entry
            .path()
            .map_err(|e| FetchError::Extraction(e.to_string()))?
            .into_owned();
        let is_dir = entry.header().entry_type().is_dir();

        let Some(rel) = stripper.relative(&name)? else {
            if !is_dir {
                return Err(FetchError::Extraction(format!(
                    "cannot strip root: {:?} is a file at the top level",
                    name
                )));
            }
            continue;
        };
        let outpath = target_dir.join(rel);

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Hard link targets name archive paths, so they go through the same root stripping
        if entry.header().entry_type() == tar::EntryType::Link {
            let link = entry
                .link_name()
                .map_err(|e| FetchError::Extraction(e.to_string()))?
                .ok_or_else(|| FetchError::Extraction(format!("hard link {:?} has no target", name)))?
                .into_owned();
            let Some(link_rel) = stripper.relative(&link)? else {
                return Err(FetchError::Extraction(format!(
                    "hard link {:?} points at the archive root",
                    name
                )));
            };
            if outpath.symlink_metadata().is_ok() {
                std::fs::remove_file(&outpath)?;
            }
            std::fs::hard_link(target_dir.join(link_rel), &outpath)?;
            written += 1;
            continue;
        }

        entry.set_preserve_permissions(true);
        entry
            .unpack(&outpath)
            .map_err(|e| FetchError::Extraction(format!("{:?}: {}", outpath, e)))?;
        written += 1;
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, entries: &[(&str, Option<&[u8]>)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in entries {
            match content {
                None => zip
                    .add_directory(*name, zip::write::FileOptions::default())
                    .unwrap(),
                Some(bytes) => {
                    zip.start_file(*name, zip::write::FileOptions::default())
                        .unwrap();
                    zip.write_all(bytes).unwrap();
                }
            }
        }
        zip.finish().unwrap();
    }

    fn write_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let gz = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(gz);
        for (name, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *content).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_zip_strip_root() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("tools.zip");
        write_zip(
            &archive,
            &[
                ("cmdline-tools/", None),
                ("cmdline-tools/bin/", None),
                ("cmdline-tools/bin/sdkmanager", Some(b"#!/bin/sh\n")),
                ("cmdline-tools/lib/sdkmanager.jar", Some(b"PK")),
            ],
        );

        let out = dir.path().join("out");
        extract_archive(&archive, ArchiveFormat::Zip, &out, true).unwrap();

        assert!(out.join("bin").join("sdkmanager").is_file());
        assert!(out.join("lib").join("sdkmanager.jar").is_file());
        assert!(!out.join("cmdline-tools").exists());
    }

    #[test]
    fn test_zip_without_strip_keeps_layout() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("tools.zip");
        write_zip(&archive, &[("cmdline-tools/bin/sdkmanager", Some(b"x"))]);

        let out = dir.path().join("out");
        extract_archive(&archive, ArchiveFormat::Zip, &out, false).unwrap();
        assert!(out.join("cmdline-tools/bin/sdkmanager").is_file());
    }

    #[test]
    fn test_strip_requires_single_root() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("tools.zip");
        write_zip(
            &archive,
            &[("a/bin/sdkmanager", Some(b"x")), ("b/bin/avdmanager", Some(b"y"))],
        );

        let err = extract_archive(&archive, ArchiveFormat::Zip, &dir.path().join("out"), true)
            .unwrap_err();
        assert!(err.to_string().contains("several top-level entries"));
    }

    #[test]
    fn test_tar_gz_strip_root() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("tools.tar.gz");
        write_tar_gz(
            &archive,
            &[
                ("tools-1.0/bin/sdkmanager", b"#!/bin/sh\n"),
                ("tools-1.0/NOTICE.txt", b"notice"),
            ],
        );

        let out = dir.path().join("out");
        let written = extract_archive(&archive, ArchiveFormat::TarGz, &out, true).unwrap();
        assert_eq!(written, 2);
        assert_eq!(
            std::fs::read(out.join("bin/sdkmanager")).unwrap(),
            b"#!/bin/sh\n"
        );
        assert!(out.join("NOTICE.txt").is_file());
    }

    fn write_tar_gz_with_hard_link(path: &Path, file: &str, link: &str) {
        let archive = File::create(path).unwrap();
        let gz = flate2::write::GzEncoder::new(archive, flate2::Compression::default());
        let mut builder = tar::Builder::new(gz);

        let content = b"#!/bin/sh\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o755);
        builder.append_data(&mut header, file, &content[..]).unwrap();

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Link);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_link_name(file).unwrap();
        builder.append_data(&mut header, link, std::io::empty()).unwrap();

        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_tar_hard_link_follows_stripped_root() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("tools.tar.gz");
        write_tar_gz_with_hard_link(
            &archive,
            "tools-1.0/bin/sdkmanager",
            "tools-1.0/bin/sdkmanager-classic",
        );

        let out = dir.path().join("out");
        let written = extract_archive(&archive, ArchiveFormat::TarGz, &out, true).unwrap();

        assert_eq!(written, 2);
        assert_eq!(
            std::fs::read(out.join("bin/sdkmanager-classic")).unwrap(),
            b"#!/bin/sh\n"
        );
        assert!(!out.join("tools-1.0").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let original = std::fs::metadata(out.join("bin/sdkmanager")).unwrap();
            let linked = std::fs::metadata(out.join("bin/sdkmanager-classic")).unwrap();
            assert_eq!(original.ino(), linked.ino());
        }
    }

    #[test]
    fn test_tar_hard_link_outside_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("tools.tar.gz");
        write_tar_gz_with_hard_link(&archive, "tools-1.0/bin/sdkmanager", "other/sdkmanager");

        let out = dir.path().join("out");
        assert!(extract_archive(&archive, ArchiveFormat::TarGz, &out, true).is_err());
        assert!(!out.join("sdkmanager").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_zip_keeps_stored_unix_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("tools.zip");
        let file = File::create(&archive).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let executable = zip::write::FileOptions::default().unix_permissions(0o755);
        let regular = zip::write::FileOptions::default().unix_permissions(0o644);
        zip.start_file("cmdline-tools/bin/sdkmanager", executable).unwrap();
        zip.write_all(b"#!/bin/sh\n").unwrap();
        zip.start_file("cmdline-tools/NOTICE.txt", regular).unwrap();
        zip.write_all(b"notice").unwrap();
        zip.finish().unwrap();

        let out = dir.path().join("out");
        extract_archive(&archive, ArchiveFormat::Zip, &out, true).unwrap();

        let mode = |rel: &str| std::fs::metadata(out.join(rel)).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode("bin/sdkmanager"), 0o755);
        assert_eq!(mode("NOTICE.txt"), 0o644);
    }

    #[test]
    fn test_wrong_format_fails() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("tools.zip");
        write_zip(&archive, &[("root/file", Some(b"x"))]);

        assert!(extract_archive(&archive, ArchiveFormat::TarGz, &dir.path().join("out"), true).is_err());
    }

    #[test]
    fn test_unsafe_paths_rejected() {
        let mut stripper = RootStripper::new(true);
        assert!(stripper.relative(Path::new("root/../../etc/passwd")).is_err());
        assert!(stripper.relative(Path::new("/etc/passwd")).is_err());
        assert_eq!(stripper.relative(Path::new("root")).unwrap(), None);
        assert_eq!(
            stripper.relative(Path::new("./root/bin")).unwrap(),
            Some(PathBuf::from("bin"))
        );
    }
}
