//! Procedural driver surface for USRP software defined radios.
//!
//! # Overview
//!
//! `uhd-driver` is the flat, call-by-call layer underneath `libuhd`. The
//! [`Driver`] trait mirrors the C API of the device library: status codes,
//! opaque handles, out-parameters and caller-provided string buffers. Two
//! implementations are provided:
//!
//! - [`sim::SimDriver`], an in-process simulated B210 that needs no hardware;
//! - `native::NativeDriver` (feature `native`), a binding to the system
//!   `libuhd`.
//!
//! Nothing in this crate owns a handle. The safe, owning API lives in the
//! `libuhd` crate.
//!
//! # Example
//!
//! ```
//! use uhd_driver::{Driver, Status, sim::SimDriver};
//!
//! let sim = SimDriver::new();
//! let mut out = None;
//! assert_eq!(sim.usrp_make(&mut out, "type=b200"), Status::None);
//! let usrp = out.expect("handle");
//! assert_eq!(sim.free(usrp.erase()), Status::None);
//! ```

pub mod api;
pub mod args;
pub mod handle;
#[cfg(feature = "native")]
pub mod native;
pub mod range;
pub mod sim;
pub mod status;
pub mod types;

pub use api::{Driver, Out, read_c_str, write_c_str};
pub use args::{ArgsError, DeviceArgs};
pub use handle::{AnyRaw, HandleKind, Kind, Raw};
pub use range::{EmptyRange, MetaRange, Range};
pub use status::Status;
pub use types::*;
