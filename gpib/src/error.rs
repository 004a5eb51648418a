use std::fmt::{Display, Formatter};

use gpib_constants::{explain, is_os_error};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by the driver through the `ERR` bit of `ibsta`.
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpibError {
    func: String,
    code: i32,
    errno: Option<i32>,
    desc: String,
}

impl GpibError {
    /// `count` is the value of `ibcnt` right after the failing call. It is only
    /// looked at for `EDVR` and `EFSO`, where the driver stores an OS errno in it.
    pub fn new<T: Into<String>>(func: T, code: i32, count: i64) -> Self {
        let func = func.into();
        if is_os_error(code) {
            let errno = count as i32;
            let desc = format!("{}() error: Errno {}, {}", func, errno, strerror(errno));
            Self {
                func,
                code,
                errno: Some(errno),
                desc,
            }
        } else {
            let expl = explain(code).unwrap_or("unknown error");
            let desc = format!("{}() error: Iberr {}, {}", func, code, expl);
            Self {
                func,
                code,
                errno: None,
                desc,
            }
        }
    }

    pub fn func(&self) -> &str {
        &self.func
    }

    /// The `iberr` value.
    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn errno(&self) -> Option<i32> {
        self.errno
    }

    pub fn description(&self) -> &str {
        &self.desc
    }
}

impl Display for GpibError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.desc)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Gpib(GpibError),
    #[error("{0}")]
    NotImplemented(String),
    #[error("{0}")]
    LibraryNotFound(String),
    #[error("Failed to load `{path}`: {source}")]
    Load {
        path: String,
        #[source]
        source: dlopen::Error,
    },
    #[error("Symbol `{0}` not found in GPIB library")]
    SymbolNotFound(String),
    #[error("Invalid argument: {0}")]
    Argument(String),
}

impl Error {
    pub fn argument<T: Into<String>>(msg: T) -> Self {
        Error::Argument(msg.into())
    }

    pub fn gpib(&self) -> Option<&GpibError> {
        match self {
            Error::Gpib(x) => Some(x),
            _ => None,
        }
    }
}

impl From<GpibError> for Error {
    fn from(err: GpibError) -> Self {
        Error::Gpib(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        fn strerror(errno: i32) -> String {
            use std::ffi::CStr;
            use std::os::raw::c_char;

            let mut buf = [0 as c_char; 256];
            let ret = unsafe { libc::strerror_r(errno, buf.as_mut_ptr(), buf.len()) };
            if ret != 0 {
                return format!("Unknown error {}", errno);
            }
            unsafe { CStr::from_ptr(buf.as_ptr()) }.to_string_lossy().into_owned()
        }
    } else {
        fn strerror(errno: i32) -> String {
            let msg = std::io::Error::from_raw_os_error(errno).to_string();
            let suffix = format!(" (os error {})", errno);
            match msg.strip_suffix(&suffix) {
                Some(x) => x.to_string(),
                None => msg,
            }
        }
    }
}
