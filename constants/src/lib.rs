//! Numeric codes of the classic GPIB (IEEE-488) C API as defined by linux-gpib
//! and NI-488.2. Names follow the C headers so that code ported from C or from
//! other language bindings reads the same.

#![allow(non_upper_case_globals)]

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// timeout codes, see `Timeout`
pub const TNONE: i32 = 0;
pub const T10us: i32 = 1;
pub const T30us: i32 = 2;
pub const T100us: i32 = 3;
pub const T300us: i32 = 4;
pub const T1ms: i32 = 5;
pub const T3ms: i32 = 6;
pub const T10ms: i32 = 7;
pub const T30ms: i32 = 8;
pub const T100ms: i32 = 9;
pub const T300ms: i32 = 10;
pub const T1s: i32 = 11;
pub const T3s: i32 = 12;
pub const T10s: i32 = 13;
pub const T30s: i32 = 14;
pub const T100s: i32 = 15;
pub const T300s: i32 = 16;
pub const T1000s: i32 = 17;

// ibconfig() options
pub const IbcPAD: i32 = 0x1;
pub const IbcSAD: i32 = 0x2;
pub const IbcTMO: i32 = 0x3;
pub const IbcEOT: i32 = 0x4;
pub const IbcPPC: i32 = 0x5; // board only
pub const IbcREADDR: i32 = 0x6; // device only
pub const IbcAUTOPOLL: i32 = 0x7; // board only
pub const IbcCICPROT: i32 = 0x8; // board only
pub const IbcIRQ: i32 = 0x9; // board only
pub const IbcSC: i32 = 0xa; // board only
pub const IbcSRE: i32 = 0xb; // board only
pub const IbcEOSrd: i32 = 0xc;
pub const IbcEOSwrt: i32 = 0xd;
pub const IbcEOScmp: i32 = 0xe;
pub const IbcEOSchar: i32 = 0xf;
pub const IbcPP2: i32 = 0x10; // board only
pub const IbcTIMING: i32 = 0x11; // board only
pub const IbcDMA: i32 = 0x12; // board only
pub const IbcReadAdjust: i32 = 0x13;
pub const IbcWriteAdjust: i32 = 0x14;
pub const IbcEventQueue: i32 = 0x15; // board only
pub const IbcSPollBit: i32 = 0x16; // board only
pub const IbcSpollBit: i32 = 0x16; // board only
pub const IbcSendLLO: i32 = 0x17; // board only
pub const IbcSPollTime: i32 = 0x18; // device only
pub const IbcPPollTime: i32 = 0x19; // board only
pub const IbcEndBitIsNormal: i32 = 0x1a;
pub const IbcUnAddr: i32 = 0x1b; // device only
pub const IbcHSCableLength: i32 = 0x1f; // board only
pub const IbcIst: i32 = 0x20; // board only
pub const IbcRsv: i32 = 0x21; // board only
pub const IbcBNA: i32 = 0x200; // device only

// ibask() options
pub const IbaPAD: i32 = 0x1;
pub const IbaSAD: i32 = 0x2;
pub const IbaTMO: i32 = 0x3;
pub const IbaEOT: i32 = 0x4;
pub const IbaPPC: i32 = 0x5; // board only
pub const IbaREADDR: i32 = 0x6; // device only
pub const IbaAUTOPOLL: i32 = 0x7; // board only
pub const IbaCICPROT: i32 = 0x8; // board only
pub const IbaIRQ: i32 = 0x9; // board only
pub const IbaSC: i32 = 0xa; // board only
pub const IbaSRE: i32 = 0xb; // board only
pub const IbaEOSrd: i32 = 0xc;
pub const IbaEOSwrt: i32 = 0xd;
pub const IbaEOScmp: i32 = 0xe;
pub const IbaEOSchar: i32 = 0xf;
pub const IbaPP2: i32 = 0x10; // board only
pub const IbaTIMING: i32 = 0x11; // board only
pub const IbaDMA: i32 = 0x12; // board only
pub const IbaReadAdjust: i32 = 0x13;
pub const IbaWriteAdjust: i32 = 0x14;
pub const IbaEventQueue: i32 = 0x15; // board only
pub const IbaSPollBit: i32 = 0x16; // board only
pub const IbaSpollBit: i32 = 0x16; // board only
pub const IbaSendLLO: i32 = 0x17; // board only
pub const IbaSPollTime: i32 = 0x18; // device only
pub const IbaPPollTime: i32 = 0x19; // board only
pub const IbaEndBitIsNormal: i32 = 0x1a;
pub const IbaUnAddr: i32 = 0x1b; // device only
pub const IbaHSCableLength: i32 = 0x1f; // board only
pub const IbaIst: i32 = 0x20; // board only
pub const IbaRsv: i32 = 0x21; // board only
pub const IbaBNA: i32 = 0x200; // device only
pub const Iba7BitEOS: i32 = 0x1000; // board only, linux-gpib only

// ibsta bits
pub const DCAS: i32 = 0x0001; // device clear state
pub const DTAS: i32 = 0x0002; // device trigger state
pub const LACS: i32 = 0x0004; // interface is listener
pub const TACS: i32 = 0x0008; // interface is talker
pub const ATN: i32 = 0x0010; // attention
pub const CIC: i32 = 0x0020; // controller-in-charge
pub const REM: i32 = 0x0040; // remote state
pub const LOK: i32 = 0x0080; // lockout state
pub const CMPL: i32 = 0x0100; // IO completed
pub const EVENT: i32 = 0x0200; // DCAS, DTAS or IFC occurred
pub const SPOLL: i32 = 0x0400; // board serial-polled by busmaster
pub const RQS: i32 = 0x0800; // device requesting service
pub const SRQI: i32 = 0x1000; // SRQ is asserted
pub const END: i32 = 0x2000; // EOI or EOS
pub const TIMO: i32 = 0x4000; // timeout
pub const ERR: i32 = 0x8000; // error

const STATUS_NAMES: [(i32, &str); 16] = [
    (DCAS, "DCAS"),
    (DTAS, "DTAS"),
    (LACS, "LACS"),
    (TACS, "TACS"),
    (ATN, "ATN"),
    (CIC, "CIC"),
    (REM, "REM"),
    (LOK, "LOK"),
    (CMPL, "CMPL"),
    (EVENT, "EVENT"),
    (SPOLL, "SPOLL"),
    (RQS, "RQS"),
    (SRQI, "SRQI"),
    (END, "END"),
    (TIMO, "TIMO"),
    (ERR, "ERR"),
];

// iblines() bits
pub const ValidDAV: u16 = 0x1;
pub const ValidNDAC: u16 = 0x2;
pub const ValidNRFD: u16 = 0x4;
pub const ValidIFC: u16 = 0x8;
pub const ValidREN: u16 = 0x10;
pub const ValidSRQ: u16 = 0x20;
pub const ValidATN: u16 = 0x40;
pub const ValidEOI: u16 = 0x80;
pub const BusDAV: u16 = 0x100;
pub const BusNDAC: u16 = 0x200;
pub const BusNRFD: u16 = 0x400;
pub const BusIFC: u16 = 0x800;
pub const BusREN: u16 = 0x1000;
pub const BusSRQ: u16 = 0x2000;
pub const BusATN: u16 = 0x4000;
pub const BusEOI: u16 = 0x8000;

// secondary address
pub const NO_SAD: i32 = 0;
pub const ALL_SAD: i32 = -1;

// serial poll status byte bits
pub const IbStbRQS: u8 = 0x40;
pub const IbStbESB: u8 = 0x20;
pub const IbStbMAV: u8 = 0x10;

// iberr codes
pub const EDVR: i32 = 0; // system error
pub const ECIC: i32 = 1; // not CIC
pub const ENOL: i32 = 2; // no listener
pub const EADR: i32 = 3; // CIC and not addressed before IO
pub const EARG: i32 = 4; // bad argument to function call
pub const ESAC: i32 = 5; // not SAC
pub const EABO: i32 = 6; // IO aborted
pub const ENEB: i32 = 7; // GPIB board offline
pub const EDMA: i32 = 8; // DMA hardware error
pub const EOIP: i32 = 10; // previous IO still in progress
pub const ECAP: i32 = 11; // not capable
pub const EFSO: i32 = 12; // file system operation error
pub const EBUS: i32 = 14; // bus error
pub const ESTB: i32 = 15; // lost serial poll bytes
pub const ESRQ: i32 = 16; // SRQ stuck on
pub const ETAB: i32 = 20; // table overflow
pub const ELCK: i32 = 21; // interface locked
pub const EARM: i32 = 22; // failed to rearm
pub const EHDL: i32 = 23; // invalid handle
pub const EWIP: i32 = 26; // previous wait still in progress
pub const ERST: i32 = 27; // event notification cancelled due to reset
pub const EPWR: i32 = 28; // interface lost power

/// Returns the English explanation of an `iberr` code, if the code is known.
pub fn explain(code: i32) -> Option<&'static str> {
    let ret = match code {
        EDVR => "system error",
        ECIC => "not CIC",
        ENOL => "no listener",
        EADR => "CIC and not addressed before IO",
        EARG => "bad argument to function call",
        ESAC => "not SAC",
        EABO => "IO aborted",
        ENEB => "GPIB board offline",
        EDMA => "DMA hardware error",
        EOIP => "previous IO still in progress",
        ECAP => "not capable",
        EFSO => "file system operation error",
        EBUS => "bus error",
        ESTB => "lost serial poll bytes",
        ESRQ => "SRQ stuck on",
        ETAB => "table overflow",
        ELCK => "interface locked",
        EARM => "failed to rearm",
        EHDL => "invalid handle",
        EWIP => "previous wait still in progress",
        ERST => "event notification cancelled due to reset",
        EPWR => "interface lost power",
        _ => return None,
    };
    Some(ret)
}

/// For these codes the driver stores an OS `errno` in the byte count.
pub fn is_os_error(code: i32) -> bool {
    code == EDVR || code == EFSO
}

/// Status word (`ibsta`) as returned by almost every driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ibsta(pub i32);

impl Ibsta {
    pub fn bits(&self) -> i32 {
        self.0
    }

    pub fn contains(&self, mask: i32) -> bool {
        self.0 & mask == mask
    }

    pub fn is_err(&self) -> bool {
        self.0 & ERR != 0
    }

    pub fn is_timeout(&self) -> bool {
        self.0 & TIMO != 0
    }

    pub fn names(&self) -> Vec<&'static str> {
        STATUS_NAMES
            .iter()
            .filter(|(bit, _)| self.0 & bit != 0)
            .map(|(_, name)| *name)
            .collect()
    }
}

impl From<i32> for Ibsta {
    fn from(x: i32) -> Self {
        Ibsta(x)
    }
}

impl Display for Ibsta {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)?;
        let names = self.names();
        if !names.is_empty() {
            write!(f, " ({})", names.join(" | "))?;
        }
        Ok(())
    }
}

/// I/O timeout codes accepted by `ibtmo`, `ibdev` and `IbcTMO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum Timeout {
    TNONE = 0,
    T10us = 1,
    T30us = 2,
    T100us = 3,
    T300us = 4,
    T1ms = 5,
    T3ms = 6,
    T10ms = 7,
    T30ms = 8,
    T100ms = 9,
    T300ms = 10,
    T1s = 11,
    T3s = 12,
    T10s = 13,
    T30s = 14,
    T100s = 15,
    T300s = 16,
    T1000s = 17,
}

const TIMEOUTS: [(Timeout, &str, u64); 18] = [
    (Timeout::TNONE, "TNONE", 0),
    (Timeout::T10us, "T10us", 10),
    (Timeout::T30us, "T30us", 30),
    (Timeout::T100us, "T100us", 100),
    (Timeout::T300us, "T300us", 300),
    (Timeout::T1ms, "T1ms", 1_000),
    (Timeout::T3ms, "T3ms", 3_000),
    (Timeout::T10ms, "T10ms", 10_000),
    (Timeout::T30ms, "T30ms", 30_000),
    (Timeout::T100ms, "T100ms", 100_000),
    (Timeout::T300ms, "T300ms", 300_000),
    (Timeout::T1s, "T1s", 1_000_000),
    (Timeout::T3s, "T3s", 3_000_000),
    (Timeout::T10s, "T10s", 10_000_000),
    (Timeout::T30s, "T30s", 30_000_000),
    (Timeout::T100s, "T100s", 100_000_000),
    (Timeout::T300s, "T300s", 300_000_000),
    (Timeout::T1000s, "T1000s", 1_000_000_000),
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeoutError {
    #[error("Invalid timeout code {0}")]
    InvalidCode(i32),
    #[error("Invalid timeout name `{0}`")]
    InvalidName(String),
}

impl Timeout {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn name(&self) -> &'static str {
        TIMEOUTS[*self as usize].1
    }

    /// `None` means the driver waits forever.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Timeout::TNONE => None,
            x => Some(Duration::from_micros(TIMEOUTS[*x as usize].2)),
        }
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Timeout::T30s
    }
}

impl std::convert::TryFrom<i32> for Timeout {
    type Error = TimeoutError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        TIMEOUTS
            .iter()
            .find(|(x, _, _)| x.code() == code)
            .map(|(x, _, _)| *x)
            .ok_or(TimeoutError::InvalidCode(code))
    }
}

impl From<Timeout> for i32 {
    fn from(x: Timeout) -> Self {
        x.code()
    }
}

impl FromStr for Timeout {
    type Err = TimeoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TIMEOUTS
            .iter()
            .find(|(_, name, _)| name.eq_ignore_ascii_case(s))
            .map(|(x, _, _)| *x)
            .ok_or_else(|| TimeoutError::InvalidName(s.to_string()))
    }
}

impl Display for Timeout {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
