//! Transmit streaming and the asynchronous event channel.

use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use uhd_driver::StreamArgs;
use uhd_driver::handle::{self, Usrp};

use crate::error::{Error, Result};
use crate::handle::Owned;
use crate::metadata::{AsyncEvent, AsyncMetadata, TxMetadata};
use crate::rx::with_cpu_format;
use crate::sample::{STACK_CHANNELS, Sample, as_bytes};

/// A transmit streamer bound to a channel list, taking samples of type `T`.
///
/// Like [`RxStreamer`](crate::RxStreamer), it outlives the
/// [`Usrp`](crate::Usrp) that created it.
#[derive(Debug)]
pub struct TxStreamer<T: Sample> {
    handle: Owned<handle::TxStreamer>,
    num_channels: usize,
    events: Option<AsyncMetadata>,
    /// Held by the split halves from a driver call until its status has been
    /// checked, so the other half cannot clear the diagnostic in between.
    calls: Mutex<()>,
    _format: PhantomData<fn(T)>,
}

/// Longest time the event half holds the call lock while waiting.
const EVENT_POLL: Duration = Duration::from_millis(10);

fn lock(calls: &Mutex<()>) -> MutexGuard<'_, ()> {
    calls.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Sample> TxStreamer<T> {
    pub(crate) fn bind(usrp: &Owned<Usrp>, args: StreamArgs) -> Result<Self> {
        let args = with_cpu_format::<T>(args)?;
        let handle = Owned::make(usrp.driver(), |d, out| d.tx_streamer_make(out))?;
        usrp.call(|d, h| d.usrp_get_tx_stream(h, &args, handle.raw()))?;
        let num_channels = handle.read(|d, h, out| d.tx_streamer_num_channels(h, out))?;
        tracing::debug!(
            "tx streamer: {} on {num_channels} channel(s), otw '{}'",
            args.cpu_format,
            args.otw_format
        );
        Ok(Self {
            handle,
            num_channels,
            events: None,
            calls: Mutex::new(()),
            _format: PhantomData,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn max_num_samps(&self) -> Result<usize> {
        self.handle.read(|d, h, out| d.tx_streamer_max_num_samps(h, out))
    }

    /// Send one buffer per channel, returning how many samples per channel
    /// the device accepted.
    pub fn send(&mut self, buffs: &[&[T]], md: &TxMetadata, timeout: Duration) -> Result<usize> {
        send(&self.handle, self.num_channels, buffs, md, timeout)
    }

    /// Wait up to `timeout` for a transmit-path event and store it in `md`.
    ///
    /// Returns `false` when nothing arrived in time.
    pub fn recv_async_msg(&mut self, md: &mut AsyncMetadata, timeout: Duration) -> Result<bool> {
        recv_async_msg(&self.handle, md, timeout)
    }

    /// Wait up to `timeout` for the next transmit-path event.
    pub fn next_async_event(&mut self, timeout: Duration) -> Result<Option<AsyncEvent>> {
        let mut md = match self.events.take() {
            Some(md) => md,
            None => AsyncMetadata::new(self.handle.driver())?,
        };
        let event = next_async_event(&self.handle, &mut md, timeout);
        self.events = Some(md);
        event
    }

    /// Split into a sending half and an event-draining half that can be
    /// used from two threads at once.
    ///
    /// The halves take turns on the driver: a send runs to completion before
    /// the event half resumes waiting, and the event half waits in slices of
    /// at most 10 ms so sends are never held up longer than that.
    pub fn split(&mut self) -> Result<(TxSender<'_, T>, AsyncEvents<'_>)> {
        let events = AsyncMetadata::new(self.handle.driver())?;
        Ok((
            TxSender {
                handle: &self.handle,
                calls: &self.calls,
                num_channels: self.num_channels,
                _format: PhantomData,
            },
            AsyncEvents {
                handle: &self.handle,
                calls: &self.calls,
                md: events,
            },
        ))
    }
}

/// Sending half of a [`TxStreamer`].
#[derive(Debug)]
pub struct TxSender<'a, T: Sample> {
    handle: &'a Owned<handle::TxStreamer>,
    calls: &'a Mutex<()>,
    num_channels: usize,
    _format: PhantomData<fn(T)>,
}

impl<T: Sample> TxSender<'_, T> {
    pub fn send(&mut self, buffs: &[&[T]], md: &TxMetadata, timeout: Duration) -> Result<usize> {
        let _calls = lock(self.calls);
        send(self.handle, self.num_channels, buffs, md, timeout)
    }
}

/// Event-draining half of a [`TxStreamer`].
#[derive(Debug)]
pub struct AsyncEvents<'a> {
    handle: &'a Owned<handle::TxStreamer>,
    calls: &'a Mutex<()>,
    md: AsyncMetadata,
}

impl AsyncEvents<'_> {
    /// Wait up to `timeout` for the next transmit-path event.
    pub fn next_event(&mut self, timeout: Duration) -> Result<Option<AsyncEvent>> {
        // No deadline means the timeout is too long to represent: wait on.
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let left = deadline.map_or(EVENT_POLL, |d| d.saturating_duration_since(Instant::now()));
            let event = {
                let _calls = lock(self.calls);
                next_async_event(self.handle, &mut self.md, left.min(EVENT_POLL))?
            };
            if event.is_some() || deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(event);
            }
        }
    }
}

fn send<T: Sample>(
    handle: &Owned<handle::TxStreamer>,
    num_channels: usize,
    buffs: &[&[T]],
    md: &TxMetadata,
    timeout: Duration,
) -> Result<usize> {
    if buffs.len() != num_channels {
        return Err(Error::invalid_argument(format!(
            "{} buffers for {num_channels} channels",
            buffs.len()
        )));
    }
    handle.same_driver(&md.handle)?;
    let samps = buffs.iter().map(|b| b.len()).min().unwrap_or(0);
    let md = md.handle.raw();
    let timeout = timeout.as_secs_f64();
    let mut stack: [&[u8]; STACK_CHANNELS] = Default::default();
    let heap: Vec<&[u8]>;
    let bytes: &[&[u8]] = if buffs.len() <= STACK_CHANNELS {
        for (slot, buf) in stack.iter_mut().zip(buffs) {
            *slot = as_bytes::<T>(buf);
        }
        &stack[..buffs.len()]
    } else {
        heap = buffs.iter().map(|b| as_bytes::<T>(b)).collect();
        &heap
    };
    let mut items = 0;
    handle.call(|d, h| d.tx_streamer_send(h, bytes, samps, md, timeout, &mut items))?;
    tracing::trace!("send: {items}/{samps} samples");
    Ok(items)
}

fn recv_async_msg(
    handle: &Owned<handle::TxStreamer>,
    md: &mut AsyncMetadata,
    timeout: Duration,
) -> Result<bool> {
    handle.same_driver(&md.handle)?;
    let md = md.handle.raw();
    let timeout = timeout.as_secs_f64();
    let valid = handle.read(|d, h, out| d.tx_streamer_recv_async_msg(h, md, timeout, out))?;
    tracing::trace!("recv_async_msg: valid={valid}");
    Ok(valid)
}

fn next_async_event(
    handle: &Owned<handle::TxStreamer>,
    md: &mut AsyncMetadata,
    timeout: Duration,
) -> Result<Option<AsyncEvent>> {
    if recv_async_msg(handle, md, timeout)? {
        md.event().map(Some)
    } else {
        Ok(None)
    }
}
