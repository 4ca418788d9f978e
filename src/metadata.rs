//! Per-call streaming metadata.
//!
//! Metadata records are driver objects. An [`RxMetadata`] is filled by every
//! receive call, a [`TxMetadata`] is built once and handed to send calls, and
//! an [`AsyncMetadata`] receives transmit-path events.

use std::sync::Arc;

use uhd_driver::handle;
use uhd_driver::{AsyncEventCode, Driver, RxErrorCode, TimeSpec, UserPayload};

use crate::error::{Error, Result};
use crate::handle::Owned;

/// Metadata filled in by [`RxStreamer::recv`](crate::RxStreamer::recv).
#[derive(Debug)]
pub struct RxMetadata {
    pub(crate) handle: Owned<handle::RxMetadata>,
}

impl RxMetadata {
    pub(crate) fn new(driver: &Arc<dyn Driver>) -> Result<Self> {
        Ok(Self {
            handle: Owned::make(driver, |d, out| d.rx_metadata_make(out))?,
        })
    }

    pub fn has_time_spec(&self) -> Result<bool> {
        self.handle.read(|d, h, out| d.rx_metadata_has_time_spec(h, out))
    }

    /// Device time of the first sample of the last receive call.
    pub fn time_spec(&self) -> Result<TimeSpec> {
        self.handle.read(|d, h, out| d.rx_metadata_time_spec(h, out))
    }

    pub fn more_fragments(&self) -> Result<bool> {
        self.handle.read(|d, h, out| d.rx_metadata_more_fragments(h, out))
    }

    pub fn fragment_offset(&self) -> Result<usize> {
        self.handle.read(|d, h, out| d.rx_metadata_fragment_offset(h, out))
    }

    pub fn start_of_burst(&self) -> Result<bool> {
        self.handle.read(|d, h, out| d.rx_metadata_start_of_burst(h, out))
    }

    pub fn end_of_burst(&self) -> Result<bool> {
        self.handle.read(|d, h, out| d.rx_metadata_end_of_burst(h, out))
    }

    pub fn out_of_sequence(&self) -> Result<bool> {
        self.handle.read(|d, h, out| d.rx_metadata_out_of_sequence(h, out))
    }

    /// In-band condition of the last receive call.
    pub fn error_code(&self) -> Result<RxErrorCode> {
        let raw = self.handle.read(|d, h, out| d.rx_metadata_error_code(h, out))?;
        RxErrorCode::from_raw(raw).ok_or(Error::UnexpectedValue {
            what: "rx error code",
            raw: raw.into(),
        })
    }

    pub fn pp_string(&self) -> Result<String> {
        self.handle.read_string(|d, h, buf| d.rx_metadata_to_pp_string(h, buf))
    }

    /// Driver description of the current error code.
    pub fn strerror(&self) -> Result<String> {
        self.handle.read_string(|d, h, buf| d.rx_metadata_strerror(h, buf))
    }
}

/// Fields of a [`TxMetadata`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TxMetadataArgs {
    /// Device time to send the first sample at; `None` sends immediately.
    pub time_spec: Option<TimeSpec>,
    pub start_of_burst: bool,
    pub end_of_burst: bool,
}

impl TxMetadataArgs {
    /// Start and end a burst in one send call.
    pub fn burst() -> Self {
        Self {
            time_spec: None,
            start_of_burst: true,
            end_of_burst: true,
        }
    }

    pub fn at(mut self, time_spec: TimeSpec) -> Self {
        self.time_spec = Some(time_spec);
        self
    }
}

/// Immutable metadata handed to [`TxStreamer::send`](crate::TxStreamer::send).
#[derive(Debug)]
pub struct TxMetadata {
    pub(crate) handle: Owned<handle::TxMetadata>,
}

impl TxMetadata {
    pub(crate) fn new(driver: &Arc<dyn Driver>, args: TxMetadataArgs) -> Result<Self> {
        let time_spec = args.time_spec.unwrap_or(TimeSpec::ZERO);
        let handle = Owned::make(driver, |d, out| {
            d.tx_metadata_make(
                out,
                args.time_spec.is_some(),
                time_spec,
                args.start_of_burst,
                args.end_of_burst,
            )
        })?;
        Ok(Self { handle })
    }

    pub fn has_time_spec(&self) -> Result<bool> {
        self.handle.read(|d, h, out| d.tx_metadata_has_time_spec(h, out))
    }

    pub fn time_spec(&self) -> Result<TimeSpec> {
        self.handle.read(|d, h, out| d.tx_metadata_time_spec(h, out))
    }

    pub fn start_of_burst(&self) -> Result<bool> {
        self.handle.read(|d, h, out| d.tx_metadata_start_of_burst(h, out))
    }

    pub fn end_of_burst(&self) -> Result<bool> {
        self.handle.read(|d, h, out| d.tx_metadata_end_of_burst(h, out))
    }
}

/// A transmit-path event copied out of an [`AsyncMetadata`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AsyncEvent {
    pub channel: usize,
    pub time_spec: Option<TimeSpec>,
    pub event_code: AsyncEventCode,
    /// Present when the event code carries `USER_PAYLOAD`.
    pub user_payload: Option<UserPayload>,
}

/// Record filled by [`TxStreamer::recv_async_msg`](crate::TxStreamer::recv_async_msg).
#[derive(Debug)]
pub struct AsyncMetadata {
    pub(crate) handle: Owned<handle::AsyncMetadata>,
}

impl AsyncMetadata {
    pub(crate) fn new(driver: &Arc<dyn Driver>) -> Result<Self> {
        Ok(Self {
            handle: Owned::make(driver, |d, out| d.async_metadata_make(out))?,
        })
    }

    pub fn channel(&self) -> Result<usize> {
        self.handle.read(|d, h, out| d.async_metadata_channel(h, out))
    }

    pub fn has_time_spec(&self) -> Result<bool> {
        self.handle.read(|d, h, out| d.async_metadata_has_time_spec(h, out))
    }

    pub fn time_spec(&self) -> Result<TimeSpec> {
        self.handle.read(|d, h, out| d.async_metadata_time_spec(h, out))
    }

    pub fn event_code(&self) -> Result<AsyncEventCode> {
        let bits = self.handle.read(|d, h, out| d.async_metadata_event_code(h, out))?;
        Ok(AsyncEventCode::from_bits_retain(bits))
    }

    /// Raw payload words; only meaningful when the event code has `USER_PAYLOAD`.
    pub fn user_payload(&self) -> Result<UserPayload> {
        self.handle.read(|d, h, out| d.async_metadata_user_payload(h, out))
    }

    pub fn event(&self) -> Result<AsyncEvent> {
        let event_code = self.event_code()?;
        let time_spec = if self.has_time_spec()? {
            Some(self.time_spec()?)
        } else {
            None
        };
        let user_payload = if event_code.contains(AsyncEventCode::USER_PAYLOAD) {
            Some(self.user_payload()?)
        } else {
            None
        };
        Ok(AsyncEvent {
            channel: self.channel()?,
            time_spec,
            event_code,
            user_payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use uhd_driver::sim::SimDriver;

    fn driver() -> Arc<dyn Driver> {
        Arc::new(SimDriver::new())
    }

    #[test]
    fn test_fresh_rx_metadata() {
        let md = RxMetadata::new(&driver()).unwrap();
        assert!(!md.has_time_spec().unwrap());
        assert_eq!(md.error_code().unwrap(), RxErrorCode::None);
        assert_eq!(md.fragment_offset().unwrap(), 0);
        assert!(!md.more_fragments().unwrap());
        assert!(!md.start_of_burst().unwrap());
        assert!(!md.end_of_burst().unwrap());
        assert!(!md.out_of_sequence().unwrap());
        assert!(!md.pp_string().unwrap().is_empty());
    }

    #[test]
    fn test_tx_metadata_without_time_spec() {
        let md = TxMetadata::new(&driver(), TxMetadataArgs::burst()).unwrap();
        assert!(!md.has_time_spec().unwrap());
        let ts = md.time_spec().unwrap();
        assert_eq!(ts.full_secs, 0);
        assert_relative_eq!(ts.frac_secs, 0.0);
        assert!(md.start_of_burst().unwrap());
        assert!(md.end_of_burst().unwrap());
    }

    #[test]
    fn test_tx_metadata_with_time_spec() {
        let args = TxMetadataArgs::default().at(TimeSpec::new(2, 0.25));
        let md = TxMetadata::new(&driver(), args).unwrap();
        assert!(md.has_time_spec().unwrap());
        assert_eq!(md.time_spec().unwrap(), TimeSpec::new(2, 0.25));
        assert!(!md.start_of_burst().unwrap());
    }

    #[test]
    fn test_fresh_async_metadata() {
        let md = AsyncMetadata::new(&driver()).unwrap();
        let event = md.event().unwrap();
        assert_eq!(event.channel, 0);
        assert!(event.event_code.is_empty());
        assert_eq!(event.user_payload, None);
        assert_eq!(md.user_payload().unwrap(), [0; 4]);
    }
}
