use std::sync::Arc;

use gpib_constants::{Ibsta, Timeout, NO_SAD};
use serde::{Deserialize, Serialize};

use crate::binding::Gpib;
use crate::error::Result;

const DEFAULT_READ_LENGTH: usize = 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceOptions {
    pub sad: i32,
    pub timeout: Timeout,
    pub send_eoi: bool,
    pub eos: i32,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            sad: NO_SAD,
            timeout: Timeout::T30s,
            send_eoi: true,
            eos: 0,
        }
    }
}

/// An open device handle which is taken offline when dropped.
pub struct Device {
    gpib: Arc<Gpib>,
    handle: i32,
    closed: bool,
}

impl Device {
    pub fn open(gpib: Arc<Gpib>, board: i32, pad: i32, options: &DeviceOptions) -> Result<Self> {
        let handle = gpib.dev(
            board,
            pad,
            options.sad,
            options.timeout,
            options.send_eoi,
            options.eos,
        )?;
        log::debug!("Opened GPIB device {}:{} as handle {}", board, pad, handle);
        Ok(Device {
            gpib,
            handle,
            closed: false,
        })
    }

    /// Open a device by the name given in the driver configuration.
    pub fn find(gpib: Arc<Gpib>, name: &str) -> Result<Self> {
        let handle = gpib.find(name)?;
        log::debug!("Opened GPIB device `{}` as handle {}", name, handle);
        Ok(Device {
            gpib,
            handle,
            closed: false,
        })
    }

    pub fn handle(&self) -> i32 {
        self.handle
    }

    pub fn write<T: AsRef<[u8]>>(&self, data: T) -> Result<Ibsta> {
        self.gpib.write(self.handle, data.as_ref())
    }

    pub fn read(&self, len: usize) -> Result<Vec<u8>> {
        self.gpib.read(self.handle, len)
    }

    /// Write `data` and read back the answer, at most `len` bytes or 1024 if `None`.
    pub fn query<T: AsRef<[u8]>>(&self, data: T, len: Option<usize>) -> Result<Vec<u8>> {
        self.write(data)?;
        self.read(len.unwrap_or(DEFAULT_READ_LENGTH))
    }

    pub fn clear(&self) -> Result<Ibsta> {
        self.gpib.clear(self.handle)
    }

    pub fn trigger(&self) -> Result<Ibsta> {
        self.gpib.trigger(self.handle)
    }

    pub fn serial_poll(&self) -> Result<u8> {
        self.gpib.serial_poll(self.handle)
    }

    pub fn set_timeout(&self, tmo: Timeout) -> Result<Ibsta> {
        self.gpib.timeout(self.handle, tmo)
    }

    pub fn local(&self) -> Result<Ibsta> {
        self.gpib.ibloc(self.handle)
    }

    pub fn wait(&self, mask: i32) -> Result<Ibsta> {
        self.gpib.wait(self.handle, mask)
    }

    pub fn ask(&self, option: i32) -> Result<i32> {
        self.gpib.ask(self.handle, option)
    }

    pub fn config(&self, option: i32, value: i32) -> Result<Ibsta> {
        self.gpib.config(self.handle, option, value)
    }

    /// Take the device offline, reporting a failure instead of logging it.
    pub fn close(mut self) -> Result<Ibsta> {
        self.closed = true;
        self.gpib.close(self.handle)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.gpib.close(self.handle) {
            log::error!("Error closing GPIB handle {}: {}", self.handle, err);
        }
    }
}
