//! Function table of the GPIB driver library.
//!
//! Every entry point is resolved once when the library is loaded. Entry points that
//! differ between driver implementations are resolved into tagged variants so that
//! calls never have to check the platform again.

use std::ffi::c_void;
use std::os::raw::{c_char, c_int, c_long, c_short};

use dlopen::raw::Library;
use serde::{Deserialize, Serialize};

use crate::error::Error;

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        pub type WChar = u16;
    } else {
        pub type WChar = u32;
    }
}

pub type IbaskFn = unsafe extern "system" fn(ud: c_int, option: c_int, value: *mut c_int) -> c_int;
pub type IbcacFn = unsafe extern "system" fn(ud: c_int, synchronous: c_int) -> c_int;
pub type IbclrFn = unsafe extern "system" fn(ud: c_int) -> c_int;
pub type IbcmdFn = unsafe extern "system" fn(ud: c_int, cmd: *const c_void, cnt: c_long) -> c_int;
pub type IbconfigFn = unsafe extern "system" fn(ud: c_int, option: c_int, value: c_int) -> c_int;
pub type IbdevFn = unsafe extern "system" fn(
    board: c_int,
    pad: c_int,
    sad: c_int,
    tmo: c_int,
    send_eoi: c_int,
    eos: c_int,
) -> c_int;
pub type IbfindFn = unsafe extern "system" fn(name: *const c_char) -> c_int;
pub type IbfindWFn = unsafe extern "system" fn(name: *const WChar) -> c_int;
pub type IbgtsFn = unsafe extern "system" fn(ud: c_int, shadow_handshake: c_int) -> c_int;
pub type IblinesFn = unsafe extern "system" fn(ud: c_int, line_status: *mut c_short) -> c_int;
pub type IblnFn = unsafe extern "system" fn(ud: c_int, pad: c_int, sad: c_int, found: *mut c_short) -> c_int;
pub type IblocFn = unsafe extern "system" fn(ud: c_int) -> c_int;
pub type IbonlFn = unsafe extern "system" fn(ud: c_int, online: c_int) -> c_int;
pub type IbpctFn = unsafe extern "system" fn(ud: c_int) -> c_int;
pub type IbrdFn = unsafe extern "system" fn(ud: c_int, buf: *mut c_void, cnt: c_long) -> c_int;
pub type IbrspFn = unsafe extern "system" fn(ud: c_int, spr: *mut c_char) -> c_int;
pub type IbsicFn = unsafe extern "system" fn(ud: c_int) -> c_int;
pub type IbspbFn = unsafe extern "system" fn(ud: c_int, sp_bytes: *mut c_short) -> c_int;
pub type IbsreFn = unsafe extern "system" fn(ud: c_int, enable: c_int) -> c_int;
pub type IbtmoFn = unsafe extern "system" fn(ud: c_int, tmo: c_int) -> c_int;
pub type IbtrgFn = unsafe extern "system" fn(ud: c_int) -> c_int;
pub type IbversFn = unsafe extern "system" fn(version: *mut *const c_char);
pub type IbwaitFn = unsafe extern "system" fn(ud: c_int, mask: c_int) -> c_int;
pub type IbwrtFn = unsafe extern "system" fn(ud: c_int, buf: *const c_void, cnt: c_long) -> c_int;

/// `ibfind` takes a narrow string on linux-gpib and a wide one on NI-488.2 for Windows.
#[derive(Clone, Copy)]
pub enum Find {
    Narrow(IbfindFn),
    Wide(IbfindWFn),
}

impl Find {
    pub fn symbol(&self) -> &'static str {
        match self {
            Find::Narrow(_) => "ibfind",
            Find::Wide(_) => "ibfindW",
        }
    }
}

/// An entry point which some driver builds do not export.
#[derive(Clone)]
pub enum Entry<F> {
    Bound(F),
    Unavailable(String),
}

impl<F: Copy> Entry<F> {
    pub fn get(&self) -> Result<F, Error> {
        match self {
            Entry::Bound(f) => Ok(*f),
            Entry::Unavailable(msg) => Err(Error::NotImplemented(msg.clone())),
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, Entry::Bound(_))
    }
}

/// Status, error and count are either exported as thread-local accessor
/// functions or as plain global variables.
#[derive(Clone, Copy)]
pub enum Accessor<T: Copy> {
    Thread(unsafe extern "system" fn() -> T),
    Global(*const T),
}

impl<T: Copy> Accessor<T> {
    pub fn get(&self) -> T {
        match self {
            Accessor::Thread(f) => unsafe { f() },
            Accessor::Global(ptr) => unsafe { std::ptr::read_volatile(*ptr) },
        }
    }

    fn kind(&self) -> AccessorKind {
        match self {
            Accessor::Thread(_) => AccessorKind::Thread,
            Accessor::Global(_) => AccessorKind::Global,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessorKind {
    Thread,
    Global,
}

#[derive(Clone)]
pub struct Api {
    pub ibask: IbaskFn,
    pub ibcac: IbcacFn,
    pub ibclr: IbclrFn,
    pub ibcmd: IbcmdFn,
    pub ibconfig: IbconfigFn,
    pub ibdev: IbdevFn,
    pub ibfind: Find,
    pub ibgts: IbgtsFn,
    pub iblines: IblinesFn,
    pub ibln: IblnFn,
    pub ibloc: IblocFn,
    pub ibonl: IbonlFn,
    pub ibpct: IbpctFn,
    pub ibrd: IbrdFn,
    pub ibrsp: IbrspFn,
    pub ibsic: IbsicFn,
    pub ibspb: Entry<IbspbFn>,
    pub ibsre: IbsreFn,
    pub ibtmo: IbtmoFn,
    pub ibtrg: IbtrgFn,
    pub ibvers: Option<IbversFn>,
    pub ibwait: IbwaitFn,
    pub ibwrt: IbwrtFn,
    pub ibwrta: IbwrtFn,
    pub ibsta: Accessor<c_int>,
    pub iberr: Accessor<c_int>,
    pub ibcnt: Accessor<c_long>,
}

// The global variable pointers point into the library mapping, which outlives
// the table (see `Gpib`).
unsafe impl Send for Api {}
unsafe impl Sync for Api {}

/// Where entry points are looked up.
pub trait Symbols {
    /// Address of the exported symbol `name`, `None` if it is not exported.
    fn address(&self, name: &str) -> Option<*const c_void>;
}

impl Symbols for Library {
    fn address(&self, name: &str) -> Option<*const c_void> {
        unsafe { self.symbol::<*const c_void>(name) }.ok()
    }
}

// `T` must be a function pointer or a raw pointer.
unsafe fn optional<T, S: Symbols + ?Sized>(lib: &S, name: &str) -> Option<T> {
    debug_assert_eq!(std::mem::size_of::<T>(), std::mem::size_of::<*const c_void>());
    lib.address(name)
        .map(|ptr| std::mem::transmute_copy::<*const c_void, T>(&ptr))
}

unsafe fn required<T, S: Symbols + ?Sized>(lib: &S, name: &str) -> Result<T, Error> {
    optional(lib, name).ok_or_else(|| Error::SymbolNotFound(name.to_string()))
}

unsafe fn accessor<T: Copy, S: Symbols + ?Sized>(
    lib: &S,
    thread: &str,
    global: &str,
) -> Result<Accessor<T>, Error> {
    if let Some(f) = optional::<unsafe extern "system" fn() -> T, _>(lib, thread) {
        return Ok(Accessor::Thread(f));
    }
    match optional::<*const T, _>(lib, global) {
        Some(ptr) => Ok(Accessor::Global(ptr)),
        None => Err(Error::SymbolNotFound(format!("{} or {}", thread, global))),
    }
}

unsafe fn find<S: Symbols + ?Sized>(lib: &S) -> Result<Find, Error> {
    if let Some(f) = optional::<IbfindFn, _>(lib, "ibfind") {
        return Ok(Find::Narrow(f));
    }
    match optional::<IbfindWFn, _>(lib, "ibfindW") {
        Some(f) => Ok(Find::Wide(f)),
        None => Err(Error::SymbolNotFound("ibfind or ibfindW".to_string())),
    }
}

impl Api {
    /// Resolves all entry points from `lib`. `name` is only used for messages.
    ///
    /// Required entry points are resolved first, so a library which is rejected
    /// does not log anything about its optional ones.
    pub fn resolve<S: Symbols + ?Sized>(lib: &S, name: &str) -> Result<Self, Error> {
        unsafe {
            Ok(Api {
                ibask: required(lib, "ibask")?,
                ibcac: required(lib, "ibcac")?,
                ibclr: required(lib, "ibclr")?,
                ibcmd: required(lib, "ibcmd")?,
                ibconfig: required(lib, "ibconfig")?,
                ibdev: required(lib, "ibdev")?,
                ibfind: find(lib)?,
                ibgts: required(lib, "ibgts")?,
                iblines: required(lib, "iblines")?,
                ibln: required(lib, "ibln")?,
                ibloc: required(lib, "ibloc")?,
                ibonl: required(lib, "ibonl")?,
                ibpct: required(lib, "ibpct")?,
                ibrd: required(lib, "ibrd")?,
                ibrsp: required(lib, "ibrsp")?,
                ibsic: required(lib, "ibsic")?,
                ibsre: required(lib, "ibsre")?,
                ibtmo: required(lib, "ibtmo")?,
                ibtrg: required(lib, "ibtrg")?,
                ibwait: required(lib, "ibwait")?,
                ibwrt: required(lib, "ibwrt")?,
                ibwrta: required(lib, "ibwrta")?,
                ibsta: accessor(lib, "ThreadIbsta", "ibsta")?,
                iberr: accessor(lib, "ThreadIberr", "iberr")?,
                ibcnt: accessor(lib, "ThreadIbcntl", "ibcntl")?,
                // struct fields are evaluated in the order written
                ibspb: match optional::<IbspbFn, _>(lib, "ibspb") {
                    Some(f) => Entry::Bound(f),
                    None => {
                        let msg = format!("{} does not implement ibspb() on this platform.", name);
                        log::warn!("{}", msg);
                        Entry::Unavailable(msg)
                    }
                },
                ibvers: optional(lib, "ibvers"),
            })
        }
    }

    pub fn info(&self, library: &str) -> BindingInfo {
        BindingInfo {
            library: library.to_string(),
            find: self.ibfind.symbol().to_string(),
            status: self.ibsta.kind(),
            error: self.iberr.kind(),
            count: self.ibcnt.kind(),
            spoll_bytes: self.ibspb.is_bound(),
            version: self.ibvers.is_some(),
        }
    }
}

/// What the capability probe found in the loaded library.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingInfo {
    pub library: String,
    pub find: String,
    pub status: AccessorKind,
    pub error: AccessorKind,
    pub count: AccessorKind,
    pub spoll_bytes: bool,
    pub version: bool,
}

/// Null terminated wide string for `ibfindW`.
pub fn to_wide(s: &str) -> Vec<WChar> {
    #[cfg(windows)]
    let mut ret: Vec<WChar> = s.encode_utf16().collect();
    #[cfg(not(windows))]
    let mut ret: Vec<WChar> = s.chars().map(|c| c as WChar).collect();
    ret.push(0);
    ret
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, Fixture};

    /// A library with one symbol removed.
    struct Hiding<'a> {
        lib: &'a Library,
        hidden: &'static str,
    }

    impl Symbols for Hiding<'_> {
        fn address(&self, name: &str) -> Option<*const c_void> {
            if name == self.hidden {
                None
            } else {
                self.lib.address(name)
            }
        }
    }

    #[test]
    fn wide_strings_are_terminated() {
        let x = to_wide("dmm");
        assert_eq!(x, vec![b'd' as WChar, b'm' as WChar, b'm' as WChar, 0]);
        assert_eq!(to_wide(""), vec![0]);
    }

    #[test]
    fn unavailable_entry() {
        let entry: Entry<IbspbFn> = Entry::Unavailable("no ibspb".to_string());
        assert!(!entry.is_bound());
        match entry.get() {
            Err(Error::NotImplemented(msg)) => assert_eq!(msg, "no ibspb"),
            _ => panic!("expected NotImplemented"),
        }
    }

    #[test]
    fn info_reflects_probe() {
        let api = testing::api();
        let info = api.info("fake");
        assert_eq!(info.library, "fake");
        assert_eq!(info.find, "ibfind");
        assert_eq!(info.status, AccessorKind::Thread);
        assert!(info.spoll_bytes);
        assert!(info.version);

        let api = testing::windows_like_api();
        let info = api.info("fake");
        assert_eq!(info.find, "ibfindW");
        assert_eq!(info.count, AccessorKind::Global);
        assert!(!info.spoll_bytes);
        assert!(!info.version);
    }

    #[test]
    fn resolves_globals_and_optional_entries() {
        testing::capture_logs();
        let _fixture = Fixture::open();
        let lib = Library::open(Fixture::path()).unwrap();
        let api = Api::resolve(&lib, "complete fake_gpib").unwrap();
        let info = api.info("complete fake_gpib");
        assert_eq!(info.find, "ibfind");
        assert_eq!(info.status, AccessorKind::Global);
        assert!(!info.spoll_bytes);
        assert!(info.version);
        assert!(testing::logged("complete fake_gpib does not implement ibspb() on this platform."));
    }

    #[test]
    fn rejected_library_logs_nothing_about_optional_entries() {
        testing::capture_logs();
        let _fixture = Fixture::open();
        let lib = Library::open(Fixture::path()).unwrap();
        let cases = [
            ("ibask", "ibask"),
            ("ibwrta", "ibwrta"),
            ("ibcntl", "ThreadIbcntl or ibcntl"),
        ];
        for (hidden, missing) in cases.iter() {
            let name = format!("fake_gpib without {}", hidden);
            let view = Hiding { lib: &lib, hidden: *hidden };
            match Api::resolve(&view, &name) {
                Err(Error::SymbolNotFound(symbol)) => assert_eq!(symbol, *missing),
                _ => panic!("expected SymbolNotFound"),
            }
            assert!(!testing::logged(&format!("{} does not implement", name)));
        }
        let view = Hiding { lib: &lib, hidden: "ibfind" };
        match Api::resolve(&view, "fake_gpib without ibfind") {
            Err(Error::SymbolNotFound(symbol)) => assert_eq!(symbol, "ibfind or ibfindW"),
            _ => panic!("expected SymbolNotFound"),
        }
    }
}
