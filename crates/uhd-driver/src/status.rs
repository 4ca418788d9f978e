//! Status codes returned by every driver call.

use std::fmt;

/// Status codes matching the `uhd_error` enum of the C API.
///
/// The set is closed: raw values the driver returns outside of it are folded
/// into [`Status::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    /// Operation successful.
    None = 0,
    /// Invalid device arguments or handle.
    InvalidDevice = 1,
    /// Index out of range.
    Index = 10,
    /// Unknown key.
    Key = 11,
    /// Operation not implemented by this device.
    NotImplemented = 20,
    /// USB transport failure.
    Usb = 21,
    /// Generic I/O failure.
    Io = 30,
    /// Operating system failure.
    Os = 31,
    /// Internal assertion failed.
    Assertion = 40,
    /// Lookup failed.
    Lookup = 41,
    /// Wrong type.
    Type = 42,
    /// Invalid value.
    Value = 43,
    /// Runtime failure.
    Runtime = 44,
    /// Environment failure.
    Environment = 45,
    /// System failure.
    System = 46,
    /// Generic driver exception.
    Except = 47,
    /// Exception from a third-party library inside the driver.
    LibraryException = 60,
    /// Standard library exception inside the driver.
    StandardException = 70,
    /// Anything else.
    Unknown = 100,
}

impl Status {
    /// Map a raw status value onto the closed set.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Status::None,
            1 => Status::InvalidDevice,
            10 => Status::Index,
            11 => Status::Key,
            20 => Status::NotImplemented,
            21 => Status::Usb,
            30 => Status::Io,
            31 => Status::Os,
            40 => Status::Assertion,
            41 => Status::Lookup,
            42 => Status::Type,
            43 => Status::Value,
            44 => Status::Runtime,
            45 => Status::Environment,
            46 => Status::System,
            47 => Status::Except,
            60 => Status::LibraryException,
            70 => Status::StandardException,
            _ => Status::Unknown,
        }
    }

    /// Raw value as used on the C side.
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// True for [`Status::None`].
    pub fn is_ok(self) -> bool {
        self == Status::None
    }

    /// Get the C constant name for the status code.
    pub fn name(self) -> &'static str {
        match self {
            Status::None => "UHD_ERROR_NONE",
            Status::InvalidDevice => "UHD_ERROR_INVALID_DEVICE",
            Status::Index => "UHD_ERROR_INDEX",
            Status::Key => "UHD_ERROR_KEY",
            Status::NotImplemented => "UHD_ERROR_NOT_IMPLEMENTED",
            Status::Usb => "UHD_ERROR_USB",
            Status::Io => "UHD_ERROR_IO",
            Status::Os => "UHD_ERROR_OS",
            Status::Assertion => "UHD_ERROR_ASSERTION",
            Status::Lookup => "UHD_ERROR_LOOKUP",
            Status::Type => "UHD_ERROR_TYPE",
            Status::Value => "UHD_ERROR_VALUE",
            Status::Runtime => "UHD_ERROR_RUNTIME",
            Status::Environment => "UHD_ERROR_ENVIRONMENT",
            Status::System => "UHD_ERROR_SYSTEM",
            Status::Except => "UHD_ERROR_EXCEPT",
            Status::LibraryException => "UHD_ERROR_BOOSTEXCEPT",
            Status::StandardException => "UHD_ERROR_STDEXCEPT",
            Status::Unknown => "UHD_ERROR_UNKNOWN",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_values_survive() {
        for status in [
            Status::None,
            Status::InvalidDevice,
            Status::Index,
            Status::Key,
            Status::NotImplemented,
            Status::Usb,
            Status::Io,
            Status::Os,
            Status::Assertion,
            Status::Lookup,
            Status::Type,
            Status::Value,
            Status::Runtime,
            Status::Environment,
            Status::System,
            Status::Except,
            Status::LibraryException,
            Status::StandardException,
            Status::Unknown,
        ] {
            assert_eq!(Status::from_raw(status.as_raw()), status);
        }
    }

    #[test]
    fn test_out_of_set_is_unknown() {
        assert_eq!(Status::from_raw(-1), Status::Unknown);
        assert_eq!(Status::from_raw(12), Status::Unknown);
    }

    #[test]
    fn test_display_uses_constant_name() {
        assert_eq!(Status::Value.to_string(), "UHD_ERROR_VALUE");
        assert!(Status::None.is_ok());
        assert!(!Status::Io.is_ok());
    }
}
