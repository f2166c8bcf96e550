//! Permission Remediation
//!
//! Archive extraction does not always keep the executable bit. Scripts and
//! native binaries are recognised by their leading magic bytes and made
//! executable again.

use std::io::Read;
use std::path::Path;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::ProvisionError;

/// Mach-O magic numbers: fat, 64-bit and 32-bit, both byte orders
const MACH_O_MAGICS: [[u8; 4]; 6] = [
    [0xCA, 0xFE, 0xBA, 0xBE],
    [0xBE, 0xBA, 0xFE, 0xCA],
    [0xFE, 0xED, 0xFA, 0xCF],
    [0xCF, 0xFA, 0xED, 0xFE],
    [0xFE, 0xED, 0xFA, 0xCE],
    [0xCE, 0xFA, 0xED, 0xFE],
];

const ELF_MAGIC: [u8; 4] = [0x7F, 0x45, 0x4C, 0x46];

/// Classification of a file by its first bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSignature {
    /// `#!` interpreter script
    Script,
    Elf,
    MachO,
    Unknown,
}

impl FileSignature {
    /// Classify up to the first four bytes of a file. Shorter input never matches
    /// a four-byte magic.
    pub fn from_header(header: &[u8]) -> Self {
        if header.starts_with(b"#!") {
            return FileSignature::Script;
        }
        let Some(magic) = header.get(..4) else {
            return FileSignature::Unknown;
        };
        if magic == ELF_MAGIC {
            FileSignature::Elf
        } else if MACH_O_MAGICS.iter().any(|m| m == magic) {
            FileSignature::MachO
        } else {
            FileSignature::Unknown
        }
    }

    /// Read the header of `path` and classify it
    pub fn of_file(path: &Path) -> std::io::Result<Self> {
        let mut header = Vec::with_capacity(4);
        std::fs::File::open(path)?.take(4).read_to_end(&mut header)?;
        Ok(Self::from_header(&header))
    }

    pub fn is_executable(&self) -> bool {
        !matches!(self, FileSignature::Unknown)
    }

    fn describe(&self) -> &'static str {
        match self {
            FileSignature::Script => "script",
            FileSignature::Elf => "ELF",
            FileSignature::MachO => "Mach-O",
            FileSignature::Unknown => "unknown",
        }
    }
}

/// Outcome of a remediation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemediationReport {
    /// Regular files inspected
    pub scanned: usize,
    /// Files that matched an executable signature
    pub marked: usize,
}

/// Restore the executable bit on every script or native binary under `root`.
///
/// Symbolic links are neither followed nor modified. Without a POSIX
/// permission model the pass is skipped and an empty report is returned.
pub fn remediate_permissions(root: &Path) -> Result<RemediationReport, ProvisionError> {
    if !cfg!(unix) {
        debug!("Skipping permission remediation on a non-POSIX host");
        return Ok(RemediationReport::default());
    }

    let mut report = RemediationReport::default();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| {
            let context = format!("Failed to walk {:?}", root);
            match e.into_io_error() {
                Some(io) => ProvisionError::io(context, io),
                None => ProvisionError::io(context, std::io::Error::other("filesystem loop")),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        report.scanned += 1;
        let signature = FileSignature::of_file(path)
            .map_err(|e| ProvisionError::io(format!("Failed to read {:?}", path), e))?;
        if signature.is_executable() {
            info!("chmod on {} file: {:?}", signature.describe(), path);
            mark_executable(path)?;
            report.marked += 1;
        }
    }

    debug!(
        "Remediated {} of {} files under {:?}",
        report.marked, report.scanned, root
    );
    Ok(report)
}

/// Add the execute bit for owner, group and other, keeping every existing bit
#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<(), ProvisionError> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)
        .map_err(|e| ProvisionError::io(format!("Failed to stat {:?}", path), e))?
        .permissions();
    let mode = perms.mode();
    if mode & 0o111 != 0o111 {
        perms.set_mode(mode | 0o111);
        std::fs::set_permissions(path, perms)
            .map_err(|e| ProvisionError::io(format!("Failed to chmod {:?}", path), e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<(), ProvisionError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_priority() {
        assert_eq!(FileSignature::from_header(b"#!/bin/sh"), FileSignature::Script);
        assert_eq!(FileSignature::from_header(b"#!"), FileSignature::Script);
        assert_eq!(FileSignature::from_header(&ELF_MAGIC), FileSignature::Elf);
        assert_eq!(
            FileSignature::from_header(&[0x00, 0x01, 0x02, 0x03]),
            FileSignature::Unknown
        );
        assert_eq!(FileSignature::from_header(b"#"), FileSignature::Unknown);
        assert_eq!(FileSignature::from_header(&[0x7F, 0x45, 0x4C]), FileSignature::Unknown);
        assert_eq!(FileSignature::from_header(&[]), FileSignature::Unknown);
    }

    #[test]
    fn test_each_mach_o_magic() {
        for magic in MACH_O_MAGICS {
            assert_eq!(FileSignature::from_header(&magic), FileSignature::MachO);
        }
        // Off by one byte from FE ED FA CE
        assert_eq!(
            FileSignature::from_header(&[0xFE, 0xEF, 0xFA, 0xCE]),
            FileSignature::Unknown
        );
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;
        use std::os::unix::fs::PermissionsExt;

        fn write_with_mode(path: &Path, bytes: &[u8], mode: u32) {
            std::fs::write(path, bytes).unwrap();
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
        }

        fn mode_of(path: &Path) -> u32 {
            std::fs::metadata(path).unwrap().permissions().mode() & 0o7777
        }

        #[test]
        fn test_marks_only_matching_files() {
            let dir = tempfile::tempdir().unwrap();
            let bin = dir.path().join("bin");
            std::fs::create_dir_all(bin.join("nested")).unwrap();

            let script = bin.join("sdkmanager");
            let elf = bin.join("nested").join("aapt");
            let data = bin.join("source.properties");
            let tiny = bin.join("tiny");
            let empty = bin.join("empty");
            write_with_mode(&script, b"#!/bin/sh\necho hi\n", 0o644);
            write_with_mode(&elf, &[0x7F, 0x45, 0x4C, 0x46, 0x02], 0o600);
            write_with_mode(&data, &[0x00, 0x01, 0x02, 0x03], 0o644);
            write_with_mode(&tiny, b"#", 0o644);
            write_with_mode(&empty, b"", 0o640);

            let report = remediate_permissions(dir.path()).unwrap();

            assert_eq!(report, RemediationReport { scanned: 5, marked: 2 });
            assert_eq!(mode_of(&script), 0o755);
            assert_eq!(mode_of(&elf), 0o711);
            assert_eq!(mode_of(&data), 0o644);
            assert_eq!(mode_of(&tiny), 0o644);
            assert_eq!(mode_of(&empty), 0o640);
        }

        #[test]
        fn test_every_mach_o_file_is_marked() {
            let dir = tempfile::tempdir().unwrap();
            for (i, magic) in MACH_O_MAGICS.iter().enumerate() {
                write_with_mode(&dir.path().join(format!("macho{i}")), magic, 0o644);
            }

            let report = remediate_permissions(dir.path()).unwrap();
            assert_eq!(report.marked, MACH_O_MAGICS.len());
            for i in 0..MACH_O_MAGICS.len() {
                assert_eq!(mode_of(&dir.path().join(format!("macho{i}"))), 0o755);
            }
        }

        #[test]
        fn test_keeps_special_bits() {
            let dir = tempfile::tempdir().unwrap();
            let script = dir.path().join("tool");
            write_with_mode(&script, b"#!/bin/sh\n", 0o4640);

            remediate_permissions(dir.path()).unwrap();
            assert_eq!(mode_of(&script), 0o4751);
        }

        #[test]
        fn test_symlink_cycles_terminate() {
            let dir = tempfile::tempdir().unwrap();
            let inner = dir.path().join("inner");
            std::fs::create_dir(&inner).unwrap();
            std::os::unix::fs::symlink(dir.path(), inner.join("loop")).unwrap();
            write_with_mode(&inner.join("run.sh"), b"#!/bin/sh\n", 0o644);

            let report = remediate_permissions(dir.path()).unwrap();
            assert_eq!(report, RemediationReport { scanned: 1, marked: 1 });
        }
    }
}
