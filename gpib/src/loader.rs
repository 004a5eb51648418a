use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable naming the driver library to load instead of the
/// platform candidates.
pub const LIBRARY_ENV: &str = "GPIB_LIBRARY";

pub const NOT_FOUND_MESSAGE: &str = "GPIB library not found. Please manually load it using \
    gpib::load_lib(Some(path)) or set GPIB_LIBRARY. All GPIB functions will fail until the \
    library is loaded.";

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        pub const CANDIDATES: &[&str] = &[
            "gpib-32.dll",
            "c:\\windows\\system32\\gpib-32.dll",
            "c:\\windows\\system\\gpib-32.dll",
            "c:\\gpib\\gpib-32.dll",
            "gpib-32.so",
            "libgpib.so.0",
        ];
    } else {
        // linux-gpib first, NI-488.2 for Linux and macOS after
        pub const CANDIDATES: &[&str] = &["libgpib.so.0", "gpib-32.so", "macosx_gpib_lib_1.0.3a.dylib"];
    }
}

pub fn candidates(filename: Option<&Path>) -> Vec<PathBuf> {
    candidates_with(filename, std::env::var_os(LIBRARY_ENV))
}

fn candidates_with(filename: Option<&Path>, env: Option<OsString>) -> Vec<PathBuf> {
    if let Some(filename) = filename {
        return vec![filename.to_path_buf()];
    }
    match env {
        Some(x) if !x.is_empty() => {
            log::debug!("Using GPIB library from {}: {:?}", LIBRARY_ENV, x);
            vec![PathBuf::from(x)]
        }
        _ => CANDIDATES.iter().map(PathBuf::from).collect(),
    }
}
