//! Receive streaming.

use std::marker::PhantomData;
use std::time::Duration;

use uhd_driver::handle::{self, Usrp};
use uhd_driver::{StreamArgs, StreamCmd};

use crate::error::{Error, Result, no_nul};
use crate::handle::Owned;
use crate::metadata::RxMetadata;
use crate::sample::{STACK_CHANNELS, Sample, as_bytes_mut};

/// A receive streamer bound to a channel list, delivering samples of type `T`.
///
/// The streamer keeps the device open on its own: it stays usable after the
/// [`Usrp`](crate::Usrp) that created it is dropped.
#[derive(Debug)]
pub struct RxStreamer<T: Sample> {
    handle: Owned<handle::RxStreamer>,
    num_channels: usize,
    _format: PhantomData<fn() -> T>,
}

impl<T: Sample> RxStreamer<T> {
    pub(crate) fn bind(usrp: &Owned<Usrp>, args: StreamArgs) -> Result<Self> {
        let args = with_cpu_format::<T>(args)?;
        let handle = Owned::make(usrp.driver(), |d, out| d.rx_streamer_make(out))?;
        usrp.call(|d, h| d.usrp_get_rx_stream(h, &args, handle.raw()))?;
        let num_channels = handle.read(|d, h, out| d.rx_streamer_num_channels(h, out))?;
        tracing::debug!(
            "rx streamer: {} on {num_channels} channel(s), otw '{}'",
            args.cpu_format,
            args.otw_format
        );
        Ok(Self {
            handle,
            num_channels,
            _format: PhantomData,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Largest number of samples per channel one packet carries.
    pub fn max_num_samps(&self) -> Result<usize> {
        self.handle.read(|d, h, out| d.rx_streamer_max_num_samps(h, out))
    }

    /// Start, stop or schedule sample delivery. `recv` alone never starts it.
    pub fn issue_stream_cmd(&mut self, cmd: &StreamCmd) -> Result<()> {
        tracing::debug!("rx stream command: {cmd:?}");
        self.handle.call(|d, h| d.rx_streamer_issue_stream_cmd(h, cmd))
    }

    /// Receive into one buffer per channel, returning the samples written
    /// into each.
    ///
    /// Fewer samples than the buffers hold come back on timeout, at the end
    /// of a packet when `one_packet` is set, or when the device reports a
    /// condition in `md`. Those conditions are read from
    /// [`RxMetadata::error_code`], never returned as `Err`.
    pub fn recv(
        &mut self,
        buffs: &mut [&mut [T]],
        md: &mut RxMetadata,
        timeout: Duration,
        one_packet: bool,
    ) -> Result<usize> {
        if buffs.len() != self.num_channels {
            return Err(Error::invalid_argument(format!(
                "{} buffers for {} channels",
                buffs.len(),
                self.num_channels
            )));
        }
        self.handle.same_driver(&md.handle)?;
        let samps = buffs.iter().map(|b| b.len()).min().unwrap_or(0);
        let md = md.handle.raw();
        let timeout = timeout.as_secs_f64();
        let mut stack: [&mut [u8]; STACK_CHANNELS] = Default::default();
        let mut heap = Vec::new();
        let channels = buffs.len();
        let bytes: &mut [&mut [u8]] = if channels <= STACK_CHANNELS {
            for (slot, buf) in stack.iter_mut().zip(buffs.iter_mut()) {
                *slot = as_bytes_mut::<T>(buf);
            }
            &mut stack[..channels]
        } else {
            heap.extend(buffs.iter_mut().map(|b| as_bytes_mut::<T>(b)));
            &mut heap
        };
        let mut items = 0;
        self.handle.call(|d, h| {
            d.rx_streamer_recv(h, bytes, samps, md, timeout, one_packet, &mut items)
        })?;
        tracing::trace!("recv: {items}/{samps} samples");
        Ok(items)
    }
}

/// Fill in the CPU format `T` streams in, refusing a conflicting one.
pub(crate) fn with_cpu_format<T: Sample>(mut args: StreamArgs) -> Result<StreamArgs> {
    let name = T::FORMAT.name();
    if !args.cpu_format.is_empty() && args.cpu_format != name {
        return Err(Error::invalid_argument(format!(
            "cpu format '{}' does not match sample type ({name})",
            args.cpu_format
        )));
    }
    no_nul(&args.otw_format)?;
    no_nul(&args.args)?;
    args.cpu_format = name.to_string();
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex;

    #[test]
    fn test_cpu_format_is_filled_in() {
        let args = with_cpu_format::<Complex<f32>>(StreamArgs::default()).unwrap();
        assert_eq!(args.cpu_format, "fc32");
        let args = with_cpu_format::<Complex<i16>>(StreamArgs::new("sc16", "sc8")).unwrap();
        assert_eq!(args.otw_format, "sc8");
    }

    #[test]
    fn test_conflicting_cpu_format() {
        let err = with_cpu_format::<Complex<f32>>(StreamArgs::new("sc16", "")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let err = with_cpu_format::<Complex<f32>>(StreamArgs::new("", "sc\016")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
