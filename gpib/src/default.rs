//! Process wide default binding and free functions operating on it.
//!
//! The free functions mirror the `Gpib` methods for code written against the
//! classic module level API. The default is loaded from the platform candidates
//! on first use. Replacing it while other threads are in a driver call is
//! allowed but those calls finish on the old binding.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use gpib_constants::{Ibsta, Timeout};

use crate::api::BindingInfo;
use crate::binding::Gpib;
use crate::error::Result;

lazy_static! {
    static ref DEFAULT: RwLock<Option<Arc<Gpib>>> = RwLock::new(None);
}

/// The default binding, searching the platform candidates on first use.
pub fn default_gpib() -> Arc<Gpib> {
    if let Some(gpib) = DEFAULT.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
        return gpib.clone();
    }
    let mut default = DEFAULT.write().unwrap_or_else(PoisonError::into_inner);
    default.get_or_insert_with(|| Arc::new(Gpib::search(None))).clone()
}

/// Install `gpib` as the process wide default used by all free functions in
/// this crate and by `Device`s opened afterwards with `default_gpib()`.
/// Returns the previous default, if any had been loaded.
pub fn make_default(gpib: Gpib) -> Option<Arc<Gpib>> {
    let mut default = DEFAULT.write().unwrap_or_else(PoisonError::into_inner);
    default.replace(Arc::new(gpib))
}

/// Load the driver library and make it the default. Without `filename`, the
/// platform candidates (or `GPIB_LIBRARY`) are searched.
///
/// Returns whether a library was found. If not, the default is replaced by a
/// binding that fails every call with `Error::LibraryNotFound`.
pub fn load_lib(filename: Option<&Path>) -> bool {
    let gpib = Gpib::search(filename);
    let loaded = gpib.is_loaded();
    make_default(gpib);
    loaded
}

pub fn info() -> Result<BindingInfo> {
    default_gpib().info()
}

pub fn ask(handle: i32, option: i32) -> Result<i32> {
    default_gpib().ask(handle, option)
}

pub fn ibcac(handle: i32, synchronous: bool) -> Result<Ibsta> {
    default_gpib().ibcac(handle, synchronous)
}

pub fn clear(handle: i32) -> Result<Ibsta> {
    default_gpib().clear(handle)
}

pub fn close(handle: i32) -> Result<Ibsta> {
    default_gpib().close(handle)
}

pub fn command(handle: i32, cmd: &[u8]) -> Result<Ibsta> {
    default_gpib().command(handle, cmd)
}

pub fn config(handle: i32, option: i32, value: i32) -> Result<Ibsta> {
    default_gpib().config(handle, option, value)
}

pub fn dev(board: i32, pad: i32, sad: i32, tmo: Timeout, send_eoi: bool, eos: i32) -> Result<i32> {
    default_gpib().dev(board, pad, sad, tmo, send_eoi, eos)
}

pub fn find(name: &str) -> Result<i32> {
    default_gpib().find(name)
}

pub fn ibgts(handle: i32, shadow_handshake: bool) -> Result<Ibsta> {
    default_gpib().ibgts(handle, shadow_handshake)
}

pub fn ibloc(handle: i32) -> Result<Ibsta> {
    default_gpib().ibloc(handle)
}

pub fn ibpct(handle: i32) -> Result<Ibsta> {
    default_gpib().ibpct(handle)
}

pub fn interface_clear(board: i32) -> Result<Ibsta> {
    default_gpib().interface_clear(board)
}

pub fn lines(board: i32) -> Result<u16> {
    default_gpib().lines(board)
}

pub fn listener(board: i32, pad: i32, sad: i32) -> Result<bool> {
    default_gpib().listener(board, pad, sad)
}

pub fn read(handle: i32, len: usize) -> Result<Vec<u8>> {
    default_gpib().read(handle, len)
}

pub fn remote_enable(board: i32, enable: bool) -> Result<Ibsta> {
    default_gpib().remote_enable(board, enable)
}

pub fn serial_poll(handle: i32) -> Result<u8> {
    default_gpib().serial_poll(handle)
}

pub fn spoll_bytes(handle: i32) -> Result<i32> {
    default_gpib().spoll_bytes(handle)
}

pub fn timeout(handle: i32, tmo: Timeout) -> Result<Ibsta> {
    default_gpib().timeout(handle, tmo)
}

pub fn trigger(handle: i32) -> Result<Ibsta> {
    default_gpib().trigger(handle)
}

pub fn version() -> Result<Option<String>> {
    default_gpib().version()
}

pub fn wait(handle: i32, mask: i32) -> Result<Ibsta> {
    default_gpib().wait(handle, mask)
}

pub fn write(handle: i32, data: &[u8]) -> Result<Ibsta> {
    default_gpib().write(handle, data)
}

/// See `Gpib::write_async`.
///
/// # Safety
///
/// `data` must stay alive and unmodified until the transfer completed.
pub unsafe fn write_async(handle: i32, data: &[u8]) -> Result<Ibsta> {
    default_gpib().write_async(handle, data)
}

pub fn ibsta() -> Result<Ibsta> {
    default_gpib().ibsta()
}

pub fn iberr() -> Result<i32> {
    default_gpib().iberr()
}

pub fn ibcnt() -> Result<i64> {
    default_gpib().ibcnt()
}
