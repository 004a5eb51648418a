//! A fake GPIB driver implemented in Rust. State is thread-local, like the
//! `Thread*` accessors of the real drivers, so tests can run in parallel.

use std::cell::RefCell;
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::ffi::{c_void, CStr};
use std::os::raw::{c_char, c_int, c_long, c_short};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Mutex, MutexGuard, Once, PoisonError};

use dlopen::raw::Library;
use gpib_constants::ERR;
use log::{LevelFilter, Log, Metadata, Record};

use crate::api::{Accessor, Api, Entry, Find, WChar};

pub const VERSION: &str = "4.3.6";

#[derive(Default)]
pub struct State {
    pub sta: i32,
    pub err: i32,
    pub cnt: i64,
    /// returned by the count accessor instead of `cnt`
    pub cnt_override: Option<i64>,
    pub handle: i32,
    pub calls: Vec<&'static str>,
    pub written: Vec<u8>,
    pub commands: Vec<u8>,
    pub read_data: Vec<u8>,
    pub found: String,
    pub ask_value: i32,
    pub ask_args: Option<(i32, i32)>,
    pub config: Vec<(i32, i32, i32)>,
    pub dev_args: Option<(i32, i32, i32, i32, i32, i32)>,
    pub ln_args: Option<(i32, i32, i32)>,
    pub online: Option<(i32, i32)>,
    pub listener: i16,
    pub lines: i16,
    pub spoll: u8,
    pub spb: i16,
    pub tmo: Option<i32>,
    pub sre: Option<i32>,
    pub gts: Option<i32>,
    pub cac: Option<i32>,
    pub waited: Option<i32>,
}

thread_local! {
    static STATE: RefCell<State> = RefCell::new(State::default());
}

pub fn with_state<R, F: FnOnce(&mut State) -> R>(f: F) -> R {
    STATE.with(|s| f(&mut s.borrow_mut()))
}

pub fn reset() {
    with_state(|s| *s = State::default());
}

fn call(name: &'static str) -> c_int {
    with_state(|s| {
        s.calls.push(name);
        s.sta
    })
}

extern "system" fn ibask(ud: c_int, option: c_int, value: *mut c_int) -> c_int {
    with_state(|s| {
        s.ask_args = Some((ud, option));
        unsafe { *value = s.ask_value };
    });
    call("ibask")
}

extern "system" fn ibcac(_ud: c_int, synchronous: c_int) -> c_int {
    with_state(|s| s.cac = Some(synchronous));
    call("ibcac")
}

extern "system" fn ibclr(_ud: c_int) -> c_int {
    call("ibclr")
}

extern "system" fn ibcmd(_ud: c_int, cmd: *const c_void, cnt: c_long) -> c_int {
    let cmd = unsafe { std::slice::from_raw_parts(cmd as *const u8, cnt as usize) };
    with_state(|s| {
        s.commands.extend_from_slice(cmd);
        s.cnt = cnt as i64;
    });
    call("ibcmd")
}

extern "system" fn ibconfig(ud: c_int, option: c_int, value: c_int) -> c_int {
    with_state(|s| s.config.push((ud, option, value)));
    call("ibconfig")
}

extern "system" fn ibdev(board: c_int, pad: c_int, sad: c_int, tmo: c_int, send_eoi: c_int, eos: c_int) -> c_int {
    call("ibdev");
    with_state(|s| {
        s.dev_args = Some((board, pad, sad, tmo, send_eoi, eos));
        s.handle
    })
}

extern "system" fn ibfind(name: *const c_char) -> c_int {
    call("ibfind");
    let name = unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned();
    with_state(|s| {
        s.found = name;
        s.handle
    })
}

extern "system" fn ibfind_w(name: *const WChar) -> c_int {
    call("ibfindW");
    let mut chars = Vec::new();
    unsafe {
        let mut ptr = name;
        while *ptr != 0 {
            chars.push(*ptr);
            ptr = ptr.add(1);
        }
    }
    #[cfg(windows)]
    let name = String::from_utf16_lossy(&chars);
    #[cfg(not(windows))]
    let name: String = chars.iter().filter_map(|c| std::char::from_u32(*c)).collect();
    with_state(|s| {
        s.found = name;
        s.handle
    })
}

extern "system" fn ibgts(_ud: c_int, shadow_handshake: c_int) -> c_int {
    with_state(|s| s.gts = Some(shadow_handshake));
    call("ibgts")
}

extern "system" fn iblines(_ud: c_int, line_status: *mut c_short) -> c_int {
    with_state(|s| unsafe { *line_status = s.lines });
    call("iblines")
}

extern "system" fn ibln(ud: c_int, pad: c_int, sad: c_int, found: *mut c_short) -> c_int {
    with_state(|s| {
        s.ln_args = Some((ud, pad, sad));
        unsafe { *found = s.listener };
    });
    call("ibln")
}

extern "system" fn ibloc(_ud: c_int) -> c_int {
    call("ibloc")
}

extern "system" fn ibonl(ud: c_int, online: c_int) -> c_int {
    with_state(|s| s.online = Some((ud, online)));
    call("ibonl")
}

extern "system" fn ibpct(_ud: c_int) -> c_int {
    call("ibpct")
}

extern "system" fn ibrd(_ud: c_int, buf: *mut c_void, cnt: c_long) -> c_int {
    let sta = call("ibrd");
    if sta & ERR != 0 {
        return sta;
    }
    let buf = unsafe { std::slice::from_raw_parts_mut(buf as *mut u8, cnt as usize) };
    with_state(|s| {
        let n = s.read_data.len().min(buf.len());
        buf[..n].copy_from_slice(&s.read_data[..n]);
        // garbage behind the transferred bytes
        for x in buf[n..].iter_mut() {
            *x = 0xff;
        }
        s.cnt = n as i64;
    });
    sta
}

extern "system" fn ibrsp(_ud: c_int, spr: *mut c_char) -> c_int {
    with_state(|s| unsafe { *spr = s.spoll as c_char });
    call("ibrsp")
}

extern "system" fn ibsic(_ud: c_int) -> c_int {
    call("ibsic")
}

extern "system" fn ibspb(_ud: c_int, sp_bytes: *mut c_short) -> c_int {
    with_state(|s| unsafe { *sp_bytes = s.spb });
    call("ibspb")
}

extern "system" fn ibsre(_ud: c_int, enable: c_int) -> c_int {
    with_state(|s| s.sre = Some(enable));
    call("ibsre")
}

extern "system" fn ibtmo(_ud: c_int, tmo: c_int) -> c_int {
    with_state(|s| s.tmo = Some(tmo));
    call("ibtmo")
}

extern "system" fn ibtrg(_ud: c_int) -> c_int {
    call("ibtrg")
}

extern "system" fn ibvers(version: *mut *const c_char) {
    unsafe { *version = b"4.3.6\0".as_ptr() as *const c_char };
}

extern "system" fn ibwait(_ud: c_int, mask: c_int) -> c_int {
    with_state(|s| s.waited = Some(mask));
    call("ibwait")
}

fn record_write(buf: *const c_void, cnt: c_long) {
    let data = unsafe { std::slice::from_raw_parts(buf as *const u8, cnt as usize) };
    with_state(|s| {
        s.written.extend_from_slice(data);
        s.cnt = cnt as i64;
    });
}

extern "system" fn ibwrt(_ud: c_int, buf: *const c_void, cnt: c_long) -> c_int {
    record_write(buf, cnt);
    call("ibwrt")
}

extern "system" fn ibwrta(_ud: c_int, buf: *const c_void, cnt: c_long) -> c_int {
    record_write(buf, cnt);
    call("ibwrta")
}

extern "system" fn thread_ibsta() -> c_int {
    with_state(|s| s.sta)
}

extern "system" fn thread_iberr() -> c_int {
    with_state(|s| s.err)
}

extern "system" fn thread_ibcntl() -> c_long {
    with_state(|s| s.cnt_override.unwrap_or(s.cnt) as c_long)
}

/// A linux-gpib like library: narrow `ibfind`, thread-local accessors, every
/// optional entry point present.
pub fn api() -> Api {
    Api {
        ibask,
        ibcac,
        ibclr,
        ibcmd,
        ibconfig,
        ibdev,
        ibfind: Find::Narrow(ibfind),
        ibgts,
        iblines,
        ibln,
        ibloc,
        ibonl,
        ibpct,
        ibrd,
        ibrsp,
        ibsic,
        ibspb: Entry::Bound(ibspb),
        ibsre,
        ibtmo,
        ibtrg,
        ibvers: Some(ibvers),
        ibwait,
        ibwrt,
        ibwrta,
        ibsta: Accessor::Thread(thread_ibsta),
        iberr: Accessor::Thread(thread_iberr),
        ibcnt: Accessor::Thread(thread_ibcntl),
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(target_pointer_width = "64", not(windows)))] {
        type AtomicLong = std::sync::atomic::AtomicI64;
    } else {
        type AtomicLong = std::sync::atomic::AtomicI32;
    }
}

static GLOBAL_IBSTA: AtomicI32 = AtomicI32::new(0);
static GLOBAL_IBERR: AtomicI32 = AtomicI32::new(0);
static GLOBAL_IBCNTL: AtomicLong = AtomicLong::new(0);

pub fn set_globals(sta: i32, err: i32, cnt: c_long) {
    GLOBAL_IBSTA.store(sta, Ordering::SeqCst);
    GLOBAL_IBERR.store(err, Ordering::SeqCst);
    GLOBAL_IBCNTL.store(cnt, Ordering::SeqCst);
}

/// An old NI-488.2 like library: wide `ibfindW`, global status variables, no
/// `ibspb` and no `ibvers`.
pub fn windows_like_api() -> Api {
    Api {
        ibfind: Find::Wide(ibfind_w),
        ibspb: Entry::Unavailable("fake does not implement ibspb() on this platform.".to_string()),
        ibvers: None,
        ibsta: Accessor::Global(&GLOBAL_IBSTA as *const AtomicI32 as *const c_int),
        iberr: Accessor::Global(&GLOBAL_IBERR as *const AtomicI32 as *const c_int),
        ibcnt: Accessor::Global(&GLOBAL_IBCNTL as *const AtomicLong as *const c_long),
        ..api()
    }
}

/// The `fake_gpib` loopback driver, built as a cdylib next to the test binary.
/// Its state is process wide, so only one test may use it at a time.
pub struct Fixture {
    lib: Library,
    _guard: MutexGuard<'static, ()>,
}

lazy_static! {
    static ref FIXTURE_LOCK: Mutex<()> = Mutex::new(());
}

impl Fixture {
    pub fn path() -> PathBuf {
        let exe = std::env::current_exe().unwrap();
        let dir = exe.parent().unwrap();
        dir.join(format!("{}fake_gpib{}", DLL_PREFIX, DLL_SUFFIX))
    }

    pub fn open() -> Self {
        let guard = FIXTURE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let lib = Library::open(Self::path()).unwrap();
        let ret = Fixture { lib, _guard: guard };
        ret.reset();
        ret
    }

    pub fn reset(&self) {
        unsafe {
            let reset: unsafe extern "system" fn() = self.lib.symbol("fake_gpib_reset").unwrap();
            reset();
        }
    }

    /// Fail all following calls with `code`, reporting `cnt` in `ibcntl`.
    pub fn fail(&self, code: i32, cnt: i64) {
        unsafe {
            let fail: unsafe extern "system" fn(c_int, i64) = self.lib.symbol("fake_gpib_fail").unwrap();
            fail(code, cnt);
        }
    }
}

cfg_if::cfg_if! {
    // present on every machine and exports none of the GPIB entry points
    if #[cfg(windows)] {
        pub const SYSTEM_LIBRARY: &str = "kernel32.dll";
    } else if #[cfg(target_os = "macos")] {
        pub const SYSTEM_LIBRARY: &str = "libSystem.B.dylib";
    } else {
        pub const SYSTEM_LIBRARY: &str = "libc.so.6";
    }
}

struct Capture;

lazy_static! {
    static ref LOGGED: Mutex<Vec<String>> = Mutex::new(Vec::new());
}

impl Log for Capture {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let msg = format!("{}", record.args());
        LOGGED.lock().unwrap_or_else(PoisonError::into_inner).push(msg);
    }

    fn flush(&self) {}
}

static CAPTURE: Capture = Capture;

/// Record all log messages of this process from now on.
pub fn capture_logs() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        if log::set_logger(&CAPTURE).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
    });
}

pub fn logged(needle: &str) -> bool {
    LOGGED
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .any(|x| x.contains(needle))
}
