use std::convert::TryFrom;
use std::ffi::{c_void, CStr, CString, OsStr};
use std::os::raw::{c_char, c_int, c_long, c_short};
use std::path::Path;
use std::ptr;

use dlopen::raw::Library;
use gpib_constants::{is_os_error, Ibsta, Timeout};

use crate::api::{to_wide, Api, BindingInfo, Find};
use crate::error::{Error, GpibError, Result};
use crate::loader;

enum Inner {
    Bound {
        api: Api,
        name: String,
        // keeps the mapping alive for the function pointers in `api`
        _lib: Option<Library>,
    },
    Missing(String),
}

/// A bound GPIB driver library.
///
/// All methods are thin wrappers around the corresponding driver call. When the
/// driver sets the `ERR` bit in `ibsta`, the call fails with `Error::Gpib`
/// carrying `iberr` as read immediately after the failing call.
pub struct Gpib {
    inner: Inner,
}

impl Gpib {
    /// Load the driver from the given file name or path.
    pub fn load<P: AsRef<OsStr>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path.to_string_lossy().to_string();
        let lib = Library::open(path).map_err(|source| Error::Load {
            path: name.clone(),
            source,
        })?;
        let api = Api::resolve(&lib, &name)?;
        log::info!("Loaded GPIB library `{}`", name);
        Ok(Gpib {
            inner: Inner::Bound {
                api,
                name,
                _lib: Some(lib),
            },
        })
    }

    /// Search for the driver library. `filename` (or `GPIB_LIBRARY` if set)
    /// replaces the platform candidate list.
    ///
    /// Never fails: if nothing can be loaded, the returned binding fails every
    /// call with `Error::LibraryNotFound`.
    pub fn search(filename: Option<&Path>) -> Self {
        let candidates = loader::candidates(filename);
        Self::search_in(&candidates)
    }

    /// Load the first candidate which opens and exports all required entry
    /// points. Otherwise the stub message lists why each candidate was rejected.
    pub fn search_in<P: AsRef<OsStr>>(candidates: &[P]) -> Self {
        let mut rejected = Vec::new();
        for candidate in candidates {
            let candidate: &OsStr = candidate.as_ref();
            match Self::load(candidate) {
                Ok(gpib) => return gpib,
                Err(err @ Error::Load { .. }) => {
                    log::debug!("{}", err);
                    rejected.push(err.to_string());
                }
                Err(err) => {
                    log::warn!("Rejected GPIB library `{}`: {}", candidate.to_string_lossy(), err);
                    rejected.push(format!("`{}`: {}", candidate.to_string_lossy(), err));
                }
            }
        }
        let mut msg = loader::NOT_FOUND_MESSAGE.to_string();
        for reason in &rejected {
            msg.push_str("\n  ");
            msg.push_str(reason);
        }
        log::warn!("{}", msg);
        Self::missing(msg)
    }

    /// A binding without library where every call fails with `msg`.
    pub fn missing<T: Into<String>>(msg: T) -> Self {
        Gpib {
            inner: Inner::Missing(msg.into()),
        }
    }

    #[cfg(test)]
    pub(crate) fn from_api<T: Into<String>>(name: T, api: Api) -> Self {
        Gpib {
            inner: Inner::Bound {
                api,
                name: name.into(),
                _lib: None,
            },
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.inner, Inner::Bound { .. })
    }

    pub fn name(&self) -> Option<&str> {
        match &self.inner {
            Inner::Bound { name, .. } => Some(name),
            Inner::Missing(_) => None,
        }
    }

    pub fn info(&self) -> Result<BindingInfo> {
        match &self.inner {
            Inner::Bound { api, name, .. } => Ok(api.info(name)),
            Inner::Missing(msg) => Err(Error::LibraryNotFound(msg.clone())),
        }
    }

    fn api(&self) -> Result<&Api> {
        match &self.inner {
            Inner::Bound { api, .. } => Ok(api),
            Inner::Missing(msg) => Err(Error::LibraryNotFound(msg.clone())),
        }
    }

    fn error(api: &Api, func: &str) -> Error {
        let code = api.iberr.get();
        let count = if is_os_error(code) { api.ibcnt.get() as i64 } else { 0 };
        let err = GpibError::new(func, code, count);
        log::debug!("{}", err);
        Error::Gpib(err)
    }

    fn check(api: &Api, func: &str, sta: c_int) -> Result<Ibsta> {
        let sta = Ibsta(sta);
        if sta.is_err() {
            return Err(Self::error(api, func));
        }
        Ok(sta)
    }

    fn length(len: usize) -> Result<c_long> {
        c_long::try_from(len).map_err(|_| Error::argument(format!("Length {} exceeds the driver limit", len)))
    }

    /// Query a configuration setting (`ibask`), `option` is one of the `Iba*` constants.
    pub fn ask(&self, handle: i32, option: i32) -> Result<i32> {
        let api = self.api()?;
        let mut value: c_int = 0;
        let sta = unsafe { (api.ibask)(handle, option, &mut value) };
        Self::check(api, "ask", sta)?;
        Ok(value)
    }

    /// Assert ATN and become active controller (`ibcac`).
    pub fn ibcac(&self, handle: i32, synchronous: bool) -> Result<Ibsta> {
        let api = self.api()?;
        let sta = unsafe { (api.ibcac)(handle, synchronous as c_int) };
        Self::check(api, "ibcac", sta)
    }

    /// Send the selected device clear (`ibclr`).
    pub fn clear(&self, handle: i32) -> Result<Ibsta> {
        let api = self.api()?;
        let sta = unsafe { (api.ibclr)(handle) };
        Self::check(api, "clear", sta)
    }

    /// Take the handle offline (`ibonl(handle, 0)`). The handle is invalid afterwards.
    pub fn close(&self, handle: i32) -> Result<Ibsta> {
        let api = self.api()?;
        let sta = unsafe { (api.ibonl)(handle, 0) };
        Self::check(api, "close", sta)
    }

    /// Write command bytes with ATN asserted (`ibcmd`).
    pub fn command(&self, handle: i32, cmd: &[u8]) -> Result<Ibsta> {
        let api = self.api()?;
        let len = Self::length(cmd.len())?;
        let sta = unsafe { (api.ibcmd)(handle, cmd.as_ptr() as *const c_void, len) };
        Self::check(api, "command", sta)
    }

    /// Change a configuration setting (`ibconfig`), `option` is one of the `Ibc*` constants.
    pub fn config(&self, handle: i32, option: i32, value: i32) -> Result<Ibsta> {
        let api = self.api()?;
        let sta = unsafe { (api.ibconfig)(handle, option, value) };
        Self::check(api, "config", sta)
    }

    /// Open a device handle (`ibdev`).
    pub fn dev(&self, board: i32, pad: i32, sad: i32, tmo: Timeout, send_eoi: bool, eos: i32) -> Result<i32> {
        let api = self.api()?;
        let ud = unsafe { (api.ibdev)(board, pad, sad, tmo.code(), send_eoi as c_int, eos) };
        if ud < 0 {
            return Err(Self::error(api, "dev"));
        }
        Ok(ud)
    }

    /// Open a board or device by the name given in the driver configuration (`ibfind`).
    pub fn find(&self, name: &str) -> Result<i32> {
        let api = self.api()?;
        if name.contains('\0') {
            return Err(Error::argument("Name contains a NUL character"));
        }
        let ud = match api.ibfind {
            Find::Narrow(ibfind) => {
                let name = CString::new(name).map_err(|_| Error::argument("Name contains a NUL character"))?;
                unsafe { ibfind(name.as_ptr()) }
            }
            Find::Wide(ibfind) => {
                let name = to_wide(name);
                unsafe { ibfind(name.as_ptr()) }
            }
        };
        if ud < 0 {
            return Err(Self::error(api, "find"));
        }
        Ok(ud)
    }

    /// Release ATN and go to standby (`ibgts`).
    pub fn ibgts(&self, handle: i32, shadow_handshake: bool) -> Result<Ibsta> {
        let api = self.api()?;
        let sta = unsafe { (api.ibgts)(handle, shadow_handshake as c_int) };
        Self::check(api, "ibgts", sta)
    }

    /// Go to local.
    pub fn ibloc(&self, handle: i32) -> Result<Ibsta> {
        let api = self.api()?;
        let sta = unsafe { (api.ibloc)(handle) };
        Self::check(api, "ibloc", sta)
    }

    /// Pass control to the device (`ibpct`).
    pub fn ibpct(&self, handle: i32) -> Result<Ibsta> {
        let api = self.api()?;
        let sta = unsafe { (api.ibpct)(handle) };
        Self::check(api, "ibpct", sta)
    }

    /// Pulse IFC (`ibsic`).
    pub fn interface_clear(&self, board: i32) -> Result<Ibsta> {
        let api = self.api()?;
        let sta = unsafe { (api.ibsic)(board) };
        Self::check(api, "interface_clear", sta)
    }

    /// State of the bus control lines (`iblines`), see the `Valid*` and `Bus*` masks.
    pub fn lines(&self, board: i32) -> Result<u16> {
        let api = self.api()?;
        let mut lines: c_short = 0;
        let sta = unsafe { (api.iblines)(board, &mut lines) };
        Self::check(api, "lines", sta)?;
        Ok(lines as u16)
    }

    /// Check whether a listener is present at the given address (`ibln`).
    pub fn listener(&self, board: i32, pad: i32, sad: i32) -> Result<bool> {
        let api = self.api()?;
        let mut found: c_short = 0;
        let sta = unsafe { (api.ibln)(board, pad, sad, &mut found) };
        Self::check(api, "listener", sta)?;
        Ok(found != 0)
    }

    /// Read up to `len` bytes (`ibrd`). Only the bytes the driver reports in
    /// `ibcnt` are returned.
    pub fn read(&self, handle: i32, len: usize) -> Result<Vec<u8>> {
        let api = self.api()?;
        let cnt = Self::length(len)?;
        let mut data = vec![0_u8; len];
        let sta = unsafe { (api.ibrd)(handle, data.as_mut_ptr() as *mut c_void, cnt) };
        Self::check(api, "read", sta)?;
        let transferred = api.ibcnt.get().max(0) as usize;
        data.truncate(transferred.min(len));
        Ok(data)
    }

    /// Set or clear remote enable (`ibsre`).
    pub fn remote_enable(&self, board: i32, enable: bool) -> Result<Ibsta> {
        let api = self.api()?;
        let sta = unsafe { (api.ibsre)(board, enable as c_int) };
        Self::check(api, "remote_enable", sta)
    }

    /// Serial poll the device and return its status byte (`ibrsp`).
    pub fn serial_poll(&self, handle: i32) -> Result<u8> {
        let api = self.api()?;
        let mut status: c_char = 0;
        let sta = unsafe { (api.ibrsp)(handle, &mut status) };
        Self::check(api, "serial_poll", sta)?;
        Ok(status as u8)
    }

    /// Length of the status byte queue (`ibspb`). Fails with
    /// `Error::NotImplemented` if the driver does not export it.
    pub fn spoll_bytes(&self, handle: i32) -> Result<i32> {
        let api = self.api()?;
        let ibspb = api.ibspb.get()?;
        let mut len: c_short = 0;
        let sta = unsafe { ibspb(handle, &mut len) };
        Self::check(api, "spoll_bytes", sta)?;
        Ok(len as i32)
    }

    /// Set the I/O timeout (`ibtmo`).
    pub fn timeout(&self, handle: i32, tmo: Timeout) -> Result<Ibsta> {
        let api = self.api()?;
        let sta = unsafe { (api.ibtmo)(handle, tmo.code()) };
        Self::check(api, "timeout", sta)
    }

    /// Send group execute trigger (`ibtrg`).
    pub fn trigger(&self, handle: i32) -> Result<Ibsta> {
        let api = self.api()?;
        let sta = unsafe { (api.ibtrg)(handle) };
        Self::check(api, "trigger", sta)
    }

    /// Driver version (`ibvers`), `None` where the driver does not export it.
    pub fn version(&self) -> Result<Option<String>> {
        let api = self.api()?;
        let ibvers = match api.ibvers {
            Some(f) => f,
            None => return Ok(None),
        };
        let mut version: *const c_char = ptr::null();
        unsafe { ibvers(&mut version) };
        if version.is_null() {
            return Ok(None);
        }
        let version = unsafe { CStr::from_ptr(version) };
        Ok(Some(version.to_string_lossy().into_owned()))
    }

    /// Wait for any of the `ibsta` bits in `mask` (`ibwait`).
    pub fn wait(&self, handle: i32, mask: i32) -> Result<Ibsta> {
        let api = self.api()?;
        let sta = unsafe { (api.ibwait)(handle, mask) };
        Self::check(api, "wait", sta)
    }

    /// Write data bytes (`ibwrt`).
    pub fn write(&self, handle: i32, data: &[u8]) -> Result<Ibsta> {
        let api = self.api()?;
        let len = Self::length(data.len())?;
        let sta = unsafe { (api.ibwrt)(handle, data.as_ptr() as *const c_void, len) };
        Self::check(api, "write", sta)
    }

    /// Start an asynchronous write (`ibwrta`).
    ///
    /// # Safety
    ///
    /// The driver keeps using `data` after the call returns. It must stay alive and
    /// unmodified until the transfer completed, e.g. until `wait` reports `CMPL`.
    pub unsafe fn write_async(&self, handle: i32, data: &[u8]) -> Result<Ibsta> {
        let api = self.api()?;
        let len = Self::length(data.len())?;
        let sta = (api.ibwrta)(handle, data.as_ptr() as *const c_void, len);
        Self::check(api, "write_async", sta)
    }

    /// Status word of the last call on this thread (`ThreadIbsta` or `ibsta`).
    pub fn ibsta(&self) -> Result<Ibsta> {
        Ok(Ibsta(self.api()?.ibsta.get()))
    }

    /// Error code of the last failed call on this thread (`ThreadIberr` or `iberr`).
    pub fn iberr(&self) -> Result<i32> {
        Ok(self.api()?.iberr.get())
    }

    /// Number of bytes transferred by the last call on this thread (`ThreadIbcntl` or `ibcntl`).
    pub fn ibcnt(&self) -> Result<i64> {
        Ok(self.api()?.ibcnt.get() as i64)
    }
}
