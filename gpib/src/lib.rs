//! Runtime binding to the GPIB (IEEE-488) driver libraries linux-gpib and NI-488.2.
//!
//! The driver is loaded with `dlopen` when first used, so programs using this crate
//! start and can be inspected on machines without GPIB hardware or drivers. Every
//! call maps 1:1 to the classic C API (`ibdev`, `ibwrt`, `ibrd`, ...).
//!
//! ```no_run
//! use gpib::{Device, DeviceOptions};
//!
//! let dmm = Device::open(gpib::default_gpib(), 0, 5, &DeviceOptions::default())?;
//! let idn = dmm.query("*IDN?\n", None)?;
//! println!("{}", String::from_utf8_lossy(&idn));
//! # Ok::<(), gpib::Error>(())
//! ```

#[macro_use]
extern crate lazy_static;

mod api;
mod binding;
mod default;
pub mod device;
pub mod error;
mod loader;
#[cfg(test)]
mod testing;

pub use gpib_constants as constants;
pub use gpib_constants::{Ibsta, Timeout, ALL_SAD, NO_SAD};

pub use api::{AccessorKind, BindingInfo};
pub use binding::Gpib;
pub use default::*;
pub use device::{Device, DeviceOptions};
pub use error::{Error, GpibError, Result};
pub use loader::{CANDIDATES, LIBRARY_ENV};
