//! Best-effort discovery of external engine binaries.
//!
//! Candidates are gathered from, in order: an explicitly configured path,
//! every directory on `PATH`, and a list of well-known install locations for
//! the host OS. The first candidate is selected.

use super::process::probe_version;
use serde::Serialize;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Outcome of a discovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Discovery {
    /// Every executable candidate found, in search order, without duplicates.
    pub candidates_found: Vec<PathBuf>,
    /// The candidate that will be used.
    pub selected: Option<PathBuf>,
    /// Version reported by the selected binary.
    pub version: Option<String>,
}

impl Discovery {
    /// Whether a binary was selected.
    pub fn is_found(&self) -> bool {
        self.selected.is_some()
    }
}

/// Executable names LibreOffice installs under.
pub const LIBREOFFICE_NAMES: &[&str] = &["soffice", "libreoffice"];

/// Executable names of wkhtmltopdf.
pub const WKHTMLTOPDF_NAMES: &[&str] = &["wkhtmltopdf"];

/// Well-known LibreOffice locations for the host OS.
pub fn libreoffice_locations() -> &'static [&'static str] {
    if cfg!(windows) {
        &[
            r"C:\Program Files\LibreOffice\program\soffice.exe",
            r"C:\Program Files (x86)\LibreOffice\program\soffice.exe",
            r"C:\Program Files\LibreOffice 7\program\soffice.exe",
            r"C:\Program Files (x86)\LibreOffice 7\program\soffice.exe",
            r"C:\Program Files\LibreOffice 6\program\soffice.exe",
            r"C:\Program Files (x86)\LibreOffice 6\program\soffice.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/Applications/LibreOffice.app/Contents/MacOS/soffice",
            "/usr/local/bin/libreoffice",
            "/usr/local/bin/soffice",
            "/opt/homebrew/bin/soffice",
        ]
    } else {
        &[
            "/usr/bin/libreoffice",
            "/usr/bin/soffice",
            "/opt/libreoffice/program/soffice",
            "/snap/bin/libreoffice",
            "/usr/local/bin/libreoffice",
            "/usr/local/bin/soffice",
        ]
    }
}

/// Well-known wkhtmltopdf locations for the host OS.
pub fn wkhtmltopdf_locations() -> &'static [&'static str] {
    if cfg!(windows) {
        &[
            r"C:\Program Files\wkhtmltopdf\bin\wkhtmltopdf.exe",
            r"C:\Program Files (x86)\wkhtmltopdf\bin\wkhtmltopdf.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &["/usr/local/bin/wkhtmltopdf", "/opt/homebrew/bin/wkhtmltopdf"]
    } else {
        &["/usr/bin/wkhtmltopdf", "/usr/local/bin/wkhtmltopdf"]
    }
}

/// Find executable candidates without probing their version.
pub fn discover_binary(configured: Option<&Path>, names: &[&str], locations: &[&str]) -> Discovery {
    let mut candidates: Vec<PathBuf> = Vec::new();
    let mut push = |path: PathBuf| {
        if is_executable(&path) && !candidates.contains(&path) {
            candidates.push(path);
        }
    };

    if let Some(path) = configured {
        push(path.to_path_buf());
    }
    if let Some(dirs) = env::var_os("PATH") {
        for dir in env::split_paths(&dirs) {
            for name in names {
                push(dir.join(executable_name(name)));
            }
        }
    }
    for location in locations {
        push(PathBuf::from(location));
    }

    Discovery {
        selected: candidates.first().cloned(),
        candidates_found: candidates,
        version: None,
    }
}

/// Locate LibreOffice and ask the selected binary for its version.
pub fn discover_libreoffice(configured: Option<&Path>) -> Discovery {
    with_version(discover_binary(
        configured,
        LIBREOFFICE_NAMES,
        libreoffice_locations(),
    ))
}

/// Locate wkhtmltopdf and ask the selected binary for its version.
pub fn discover_wkhtmltopdf(configured: Option<&Path>) -> Discovery {
    with_version(discover_binary(
        configured,
        WKHTMLTOPDF_NAMES,
        wkhtmltopdf_locations(),
    ))
}

fn with_version(mut discovery: Discovery) -> Discovery {
    discovery.version = discovery.selected.as_deref().and_then(probe_version);
    discovery
}

/// An engine binary located by a discovery function. While no usable
/// binary is known, every lookup searches again, so an engine installed
/// after the backend was created is still found.
pub struct EngineBinary {
    configured: Option<PathBuf>,
    discover: fn(Option<&Path>) -> Discovery,
    state: Mutex<Discovery>,
}

impl EngineBinary {
    /// Run `discover` once now.
    pub fn new(configured: Option<PathBuf>, discover: fn(Option<&Path>) -> Discovery) -> Self {
        let state = discover(configured.as_deref());
        log::debug!("Engine binary: {:?}", state.selected);
        Self {
            configured,
            discover,
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, Discovery> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The selected binary if it is still executable, else the result of a
    /// fresh search.
    pub fn path(&self) -> Option<PathBuf> {
        let mut state = self.state();
        if let Some(bin) = state.selected.as_deref().filter(|bin| is_executable(bin)) {
            return Some(bin.to_path_buf());
        }
        *state = (self.discover)(self.configured.as_deref());
        if let Some(bin) = &state.selected {
            log::info!("Engine binary found at {}", bin.display());
        }
        state.selected.clone()
    }

    /// Version reported by the current binary.
    pub fn version(&self) -> Option<String> {
        self.path()?;
        self.state().version.clone()
    }
}

impl std::fmt::Debug for EngineBinary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBinary")
            .field("configured", &self.configured)
            .field("selected", &self.state().selected)
            .finish()
    }
}

fn executable_name(name: &str) -> String {
    if cfg!(windows) && !name.ends_with(".exe") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Whether `path` is a file the current user could execute.
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
