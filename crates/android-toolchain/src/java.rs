//! JDK lookup
//!
//! sdkmanager is a Java program. Finds a JDK to hand it through `JAVA_HOME`.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use which::which;

fn java_executable(jdk: &Path) -> PathBuf {
    jdk.join("bin")
        .join(if cfg!(windows) { "java.exe" } else { "java" })
}

fn is_jdk(path: &Path) -> bool {
    java_executable(path).is_file()
}

/// Resolve the JDK used to run sdkmanager.
///
/// Order: the configured path, `JAVA_HOME`, then `java` on `PATH`
/// (following symlinks back to `<jdk>/bin/java`).
pub fn resolve_java_home(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if is_jdk(path) {
            debug!("Using configured JDK {:?}", path);
            return Some(path.to_path_buf());
        }
        warn!("Configured java_home {:?} has no bin/java, ignoring it", path);
    }

    if let Some(java_home) = std::env::var_os("JAVA_HOME").map(PathBuf::from) {
        if is_jdk(&java_home) {
            debug!("Using JAVA_HOME {:?}", java_home);
            return Some(java_home);
        }
    }

    if let Ok(java_path) = which("java") {
        let resolved = std::fs::canonicalize(&java_path).unwrap_or(java_path);
        // Navigate up from bin/java to JDK root
        if let Some(jdk_root) = resolved.parent().and_then(Path::parent) {
            if is_jdk(jdk_root) {
                debug!("Using JDK found on PATH {:?}", jdk_root);
                return Some(jdk_root.to_path_buf());
            }
        }
    }

    warn!("No JDK found; sdkmanager will look for java on its own");
    None
}
