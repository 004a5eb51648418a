//! A loopback GPIB driver exporting the C API like an NI-488.2 build: narrow
//! `ibfind`, status in the global variables `ibsta`, `iberr` and `ibcntl`, no
//! `ibspb`.
//!
//! Data written to any device is queued and read back by `ibrd`. A listener is
//! present at the primary address of the last device opened with `ibdev`.
//! `fake_gpib_fail` makes every following call fail until `fake_gpib_reset`.

#![allow(non_upper_case_globals)]
#![allow(clippy::missing_safety_doc)]

use std::ffi::c_void;
use std::os::raw::{c_char, c_int, c_long, c_short};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};

const CMPL: c_int = 0x100;
const ERR: c_int = 0x8000;

pub const HANDLE: c_int = 7;

#[no_mangle]
pub static mut ibsta: c_int = 0;
#[no_mangle]
pub static mut iberr: c_int = 0;
#[no_mangle]
pub static mut ibcntl: c_long = 0;

static FAILING: AtomicBool = AtomicBool::new(false);
static FAIL_CODE: AtomicI32 = AtomicI32::new(0);
static FAIL_COUNT: AtomicI64 = AtomicI64::new(0);
static LAST_PAD: AtomicI32 = AtomicI32::new(-1);
static QUEUE: Mutex<Vec<u8>> = Mutex::new(Vec::new());

unsafe fn finish(cnt: c_long) -> c_int {
    if FAILING.load(Ordering::SeqCst) {
        ibsta = ERR | CMPL;
        iberr = FAIL_CODE.load(Ordering::SeqCst);
        ibcntl = FAIL_COUNT.load(Ordering::SeqCst) as c_long;
    } else {
        ibsta = CMPL;
        ibcntl = cnt;
    }
    ibsta
}

fn failing() -> bool {
    FAILING.load(Ordering::SeqCst)
}

#[no_mangle]
pub unsafe extern "system" fn fake_gpib_fail(code: c_int, cnt: i64) {
    FAIL_CODE.store(code, Ordering::SeqCst);
    FAIL_COUNT.store(cnt, Ordering::SeqCst);
    FAILING.store(true, Ordering::SeqCst);
}

#[no_mangle]
pub unsafe extern "system" fn fake_gpib_reset() {
    FAILING.store(false, Ordering::SeqCst);
    LAST_PAD.store(-1, Ordering::SeqCst);
    QUEUE.lock().unwrap_or_else(PoisonError::into_inner).clear();
    ibsta = 0;
    iberr = 0;
    ibcntl = 0;
}

#[no_mangle]
pub unsafe extern "system" fn ibask(_ud: c_int, _option: c_int, value: *mut c_int) -> c_int {
    if !failing() {
        *value = LAST_PAD.load(Ordering::SeqCst);
    }
    finish(0)
}

#[no_mangle]
pub unsafe extern "system" fn ibcac(_ud: c_int, _synchronous: c_int) -> c_int {
    finish(0)
}

#[no_mangle]
pub unsafe extern "system" fn ibclr(_ud: c_int) -> c_int {
    finish(0)
}

#[no_mangle]
pub unsafe extern "system" fn ibcmd(_ud: c_int, _cmd: *const c_void, cnt: c_long) -> c_int {
    finish(cnt)
}

#[no_mangle]
pub unsafe extern "system" fn ibconfig(_ud: c_int, _option: c_int, _value: c_int) -> c_int {
    finish(0)
}

#[no_mangle]
pub unsafe extern "system" fn ibdev(
    _board: c_int,
    pad: c_int,
    _sad: c_int,
    _tmo: c_int,
    _send_eoi: c_int,
    _eos: c_int,
) -> c_int {
    finish(0);
    if failing() {
        return -1;
    }
    LAST_PAD.store(pad, Ordering::SeqCst);
    HANDLE
}

#[no_mangle]
pub unsafe extern "system" fn ibfind(_name: *const c_char) -> c_int {
    finish(0);
    if failing() {
        -1
    } else {
        HANDLE
    }
}

#[no_mangle]
pub unsafe extern "system" fn ibgts(_ud: c_int, _shadow_handshake: c_int) -> c_int {
    finish(0)
}

#[no_mangle]
pub unsafe extern "system" fn iblines(_ud: c_int, line_status: *mut c_short) -> c_int {
    *line_status = 0;
    finish(0)
}

#[no_mangle]
pub unsafe extern "system" fn ibln(_ud: c_int, pad: c_int, _sad: c_int, found: *mut c_short) -> c_int {
    *found = (pad == LAST_PAD.load(Ordering::SeqCst)) as c_short;
    finish(0)
}

#[no_mangle]
pub unsafe extern "system" fn ibloc(_ud: c_int) -> c_int {
    finish(0)
}

#[no_mangle]
pub unsafe extern "system" fn ibonl(_ud: c_int, _online: c_int) -> c_int {
    finish(0)
}

#[no_mangle]
pub unsafe extern "system" fn ibpct(_ud: c_int) -> c_int {
    finish(0)
}

#[no_mangle]
pub unsafe extern "system" fn ibrd(_ud: c_int, buf: *mut c_void, cnt: c_long) -> c_int {
    if failing() {
        return finish(0);
    }
    let mut queue = QUEUE.lock().unwrap_or_else(PoisonError::into_inner);
    let n = queue.len().min(cnt.max(0) as usize);
    std::ptr::copy_nonoverlapping(queue.as_ptr(), buf as *mut u8, n);
    queue.drain(..n);
    finish(n as c_long)
}

#[no_mangle]
pub unsafe extern "system" fn ibrsp(_ud: c_int, spr: *mut c_char) -> c_int {
    *spr = 0;
    finish(0)
}

#[no_mangle]
pub unsafe extern "system" fn ibsic(_ud: c_int) -> c_int {
    finish(0)
}

#[no_mangle]
pub unsafe extern "system" fn ibsre(_ud: c_int, _enable: c_int) -> c_int {
    finish(0)
}

#[no_mangle]
pub unsafe extern "system" fn ibtmo(_ud: c_int, _tmo: c_int) -> c_int {
    finish(0)
}

#[no_mangle]
pub unsafe extern "system" fn ibtrg(_ud: c_int) -> c_int {
    finish(0)
}

#[no_mangle]
pub unsafe extern "system" fn ibvers(version: *mut *const c_char) {
    *version = b"fake\0".as_ptr() as *const c_char;
}

#[no_mangle]
pub unsafe extern "system" fn ibwait(_ud: c_int, _mask: c_int) -> c_int {
    finish(0)
}

#[no_mangle]
pub unsafe extern "system" fn ibwrt(_ud: c_int, buf: *const c_void, cnt: c_long) -> c_int {
    if failing() {
        return finish(0);
    }
    let data = std::slice::from_raw_parts(buf as *const u8, cnt.max(0) as usize);
    QUEUE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .extend_from_slice(data);
    finish(cnt)
}

#[no_mangle]
pub unsafe extern "system" fn ibwrta(ud: c_int, buf: *const c_void, cnt: c_long) -> c_int {
    ibwrt(ud, buf, cnt)
}
