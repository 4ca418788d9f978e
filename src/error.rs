//! Error handling for the libuhd library
//!
//! Every driver call reports a [`Status`]. A call that did not succeed becomes
//! [`Error::Driver`], carrying the diagnostic the driver recorded for the
//! handle the call was made on (or the thread-wide diagnostic for calls made
//! without one). Streaming conditions such as timeouts and overflows are not
//! errors: they travel in the per-call metadata.

use std::cell::RefCell;

use thiserror::Error;
use uhd_driver::{AnyRaw, Driver, EmptyRange, Status, read_c_str};

/// Size of the per-thread buffer strings are read through.
pub const SCRATCH_LEN: usize = 1024;

/// A specialized Result type for libuhd operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for libuhd operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The driver rejected a call
    #[error("{}", describe(.status, .message))]
    Driver {
        status: Status,
        /// Diagnostic recorded by the driver, if it left one
        message: Option<String>,
    },

    /// A range list was built from no ranges at all
    #[error("range list is empty")]
    EmptyRange,

    /// An argument was rejected before reaching the driver
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The driver returned a value outside the documented set
    #[error("unexpected {what} from driver: {raw}")]
    UnexpectedValue { what: &'static str, raw: i64 },
}

fn describe(status: &Status, message: &Option<String>) -> String {
    match message {
        Some(message) => format!("{status}: {message}"),
        None => status.to_string(),
    }
}

impl From<EmptyRange> for Error {
    fn from(_: EmptyRange) -> Self {
        Error::EmptyRange
    }
}

impl Error {
    /// Create an invalid argument error with a custom message
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Status reported by the driver, for driver errors
    pub fn status(&self) -> Option<Status> {
        match self {
            Error::Driver { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Driver diagnostic, for driver errors that carry one
    pub fn message(&self) -> Option<&str> {
        match self {
            Error::Driver { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

/// Refuse strings the driver could not take as C strings.
pub(crate) fn no_nul(arg: &str) -> Result<()> {
    if arg.contains('\0') {
        return Err(Error::invalid_argument(format!(
            "string argument contains a NUL byte: {arg:?}"
        )));
    }
    Ok(())
}

thread_local! {
    static SCRATCH: RefCell<Vec<u8>> = RefCell::new(vec![0; SCRATCH_LEN]);
}

/// Run `f` against the thread's scratch buffer and decode what it wrote.
///
/// The borrow ends before the caller looks at the status, so a failing call
/// can still use the buffer to fetch its diagnostic.
pub(crate) fn with_scratch(f: impl FnOnce(&mut [u8]) -> Status) -> (Status, String) {
    SCRATCH.with_borrow_mut(|buf| {
        buf[0] = 0;
        let status = f(buf);
        let text = String::from_utf8_lossy(read_c_str(buf)).into_owned();
        (status, text)
    })
}

/// Translate a status into a result.
///
/// `scope` is the handle the call was made on; `None` reads the thread-wide
/// diagnostic instead.
pub(crate) fn check(driver: &dyn Driver, scope: Option<AnyRaw>, status: Status) -> Result<()> {
    if status.is_ok() {
        return Ok(());
    }
    let (fetched, message) = with_scratch(|buf| match scope {
        Some(h) => driver.handle_last_error(h, buf),
        None => driver.last_error(buf),
    });
    let message = (fetched.is_ok() && !message.is_empty()).then_some(message);
    tracing::debug!(
        "driver call failed on {}: {status} {message:?}",
        scope.map_or("library".to_string(), |h| format!("{h:?}"))
    );
    Err(Error::Driver { status, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uhd_driver::sim::SimDriver;

    #[test]
    fn test_driver_error_display() {
        let err = Error::Driver {
            status: Status::Value,
            message: Some("bad gain".to_string()),
        };
        assert_eq!(err.to_string(), "UHD_ERROR_VALUE: bad gain");
        assert_eq!(err.status(), Some(Status::Value));
        assert_eq!(err.message(), Some("bad gain"));
    }

    #[test]
    fn test_bare_status_display() {
        let err = Error::Driver {
            status: Status::Io,
            message: None,
        };
        assert_eq!(err.to_string(), "UHD_ERROR_IO");
        assert_eq!(err.message(), None);
    }

    #[test]
    fn test_invalid_argument_constructor() {
        let err = Error::invalid_argument("two buffers for one channel");
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(err.to_string().contains("Invalid argument"));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_empty_range_conversion() {
        let err: Error = EmptyRange.into();
        assert_eq!(err, Error::EmptyRange);
    }

    #[test]
    fn test_no_nul() {
        assert!(no_nul("RX2").is_ok());
        assert!(no_nul("").is_ok());
        assert!(matches!(no_nul("RX\02"), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_check_reads_thread_diagnostic() {
        let sim = SimDriver::new();
        let status = sim.set_thread_priority(3.0, false);
        let err = check(&sim, None, status).unwrap_err();
        assert_eq!(err.status(), Some(Status::Value));
        assert!(err.message().unwrap().contains("out of range"));
        assert!(check(&sim, None, Status::None).is_ok());
    }

    #[test]
    fn test_check_without_diagnostic() {
        let sim = SimDriver::new();
        let mut out = None;
        assert_eq!(sim.string_vector_make(&mut out), Status::None);
        let raw = out.unwrap();
        // a scope the driver has no record for
        assert_eq!(sim.free(raw.erase()), Status::None);
        let err = check(&sim, Some(raw.erase()), Status::Runtime).unwrap_err();
        assert_eq!(
            err,
            Error::Driver {
                status: Status::Runtime,
                message: None
            }
        );
    }
}
