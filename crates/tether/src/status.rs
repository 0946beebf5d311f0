use std::{fmt::Debug, io};

use ash::vk;

///Numeric status returned by a fallible API call.
pub trait Status: Copy + Debug {
    fn is_success(&self) -> bool;

    fn is_failure(&self) -> bool {
        !self.is_success()
    }

    ///The raw code, widened so every status type fits.
    fn code(&self) -> i64;

    ///Human readable description of the status.
    fn message(&self) -> String;
}

///COM style result code. Negative values are failures, `S_FALSE` and friends are successes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HResult(pub i32);

impl HResult {
    pub const S_OK: HResult = HResult(0);
    pub const S_FALSE: HResult = HResult(1);
    pub const E_NOINTERFACE: HResult = HResult(0x8000_4002_u32 as i32);
    pub const E_POINTER: HResult = HResult(0x8000_4003_u32 as i32);
    pub const E_FAIL: HResult = HResult(0x8000_4005_u32 as i32);
    pub const E_OUTOFMEMORY: HResult = HResult(0x8007_000E_u32 as i32);
    pub const E_INVALIDARG: HResult = HResult(0x8007_0057_u32 as i32);

    pub const FACILITY_WIN32: u16 = 7;

    ///Wraps a Win32 error code, the same way `HRESULT_FROM_WIN32` does.
    pub const fn from_win32(code: u32) -> Self {
        if (code as i32) <= 0 {
            HResult(code as i32)
        } else {
            HResult(((code & 0xffff) | ((Self::FACILITY_WIN32 as u32) << 16) | 0x8000_0000) as i32)
        }
    }

    pub const fn facility(&self) -> u16 {
        (((self.0 as u32) >> 16) & 0x1fff) as u16
    }

    fn well_known(&self) -> Option<&'static str> {
        match *self {
            HResult::S_OK => Some("The operation completed successfully."),
            HResult::S_FALSE => Some("The operation completed with S_FALSE."),
            HResult::E_NOINTERFACE => Some("No such interface supported"),
            HResult::E_POINTER => Some("Invalid pointer"),
            HResult::E_FAIL => Some("Unspecified error"),
            HResult::E_OUTOFMEMORY => {
                Some("Not enough memory resources are available to complete this operation.")
            }
            HResult::E_INVALIDARG => Some("The parameter is incorrect."),
            _ => None,
        }
    }
}

impl Status for HResult {
    fn is_success(&self) -> bool {
        self.0 >= 0
    }

    fn code(&self) -> i64 {
        self.0 as i64
    }

    ///Asks the system message table first. Off Windows that table doesn't know HRESULTs, so well known codes are
    /// translated by name and the rest is printed as hex.
    fn message(&self) -> String {
        #[cfg(windows)]
        if let Some(msg) = system_message(self.0) {
            return msg;
        }

        if let Some(msg) = self.well_known() {
            return msg.to_owned();
        }

        if self.facility() == Self::FACILITY_WIN32 {
            return format!("Win32 error {}", self.0 & 0xffff);
        }
        format!("HRESULT 0x{:08X}", self.0 as u32)
    }
}

///Error number of the operating system (`errno` or `GetLastError`). Zero is success.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OsError(pub i32);

impl OsError {
    ///Last error reported by the OS for the calling thread.
    pub fn last() -> Self {
        OsError(io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }
}

impl Status for OsError {
    fn is_success(&self) -> bool {
        self.0 == 0
    }

    fn code(&self) -> i64 {
        self.0 as i64
    }

    fn message(&self) -> String {
        system_message(self.0).unwrap_or_else(|| format!("OS error {}", self.0))
    }
}

impl Status for vk::Result {
    //Positive codes (NOT_READY, TIMEOUT, INCOMPLETE ...) are no errors.
    fn is_success(&self) -> bool {
        self.as_raw() >= 0
    }

    fn code(&self) -> i64 {
        self.as_raw() as i64
    }

    fn message(&self) -> String {
        self.to_string()
    }
}

///Looks `code` up in the system message table. `None` if the system doesn't know the code.
fn system_message(code: i32) -> Option<String> {
    let text = io::Error::from_raw_os_error(code).to_string();
    //std appends " (os error <code>)"
    let text = text
        .rsplit_once(" (os error")
        .map_or(text.as_str(), |(msg, _)| msg)
        .trim();

    if text.is_empty() || text.starts_with("Unknown error") || text.starts_with("OS Error") {
        None
    } else {
        Some(text.to_owned())
    }
}
