//! Streaming engine of the simulated device.

use std::collections::VecDeque;
use std::f64::consts::TAU;

use crate::types::{
    AsyncEventCode, RxErrorCode, StreamCmd, StreamMode, TimeSpec, UserPayload,
};

use super::Fault;
use super::device::Session;

/// Samples per simulated packet.
pub const MAX_NUM_SAMPS: usize = 2000;
/// Samples per period of the generated test tone.
pub const TONE_PERIOD: u64 = 64;
/// Pending async events kept per TX streamer.
pub const MAX_EVENTS: usize = 64;

/// Host sample formats the simulated converters handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuFormat {
    Fc64,
    Fc32,
    Sc16,
    Sc8,
}

impl CpuFormat {
    pub fn parse(name: &str) -> Result<Self, Fault> {
        match name {
            "fc64" => Ok(CpuFormat::Fc64),
            "fc32" => Ok(CpuFormat::Fc32),
            "sc16" => Ok(CpuFormat::Sc16),
            "sc8" => Ok(CpuFormat::Sc8),
            other => Err(Fault::lookup(format!(
                "no converter registered for cpu format '{other}'"
            ))),
        }
    }

    /// Bytes per complex sample.
    pub fn size(self) -> usize {
        match self {
            CpuFormat::Fc64 => 16,
            CpuFormat::Fc32 => 8,
            CpuFormat::Sc16 => 4,
            CpuFormat::Sc8 => 2,
        }
    }

    /// Full-scale amplitude used for the test tone.
    fn amplitude(self) -> f64 {
        match self {
            CpuFormat::Fc64 | CpuFormat::Fc32 => 0.5,
            CpuFormat::Sc16 => 16384.0,
            CpuFormat::Sc8 => 64.0,
        }
    }

    fn write(self, out: &mut [u8], i: f64, q: f64) {
        match self {
            CpuFormat::Fc64 => {
                out[..8].copy_from_slice(&i.to_ne_bytes());
                out[8..16].copy_from_slice(&q.to_ne_bytes());
            }
            CpuFormat::Fc32 => {
                out[..4].copy_from_slice(&(i as f32).to_ne_bytes());
                out[4..8].copy_from_slice(&(q as f32).to_ne_bytes());
            }
            CpuFormat::Sc16 => {
                out[..2].copy_from_slice(&(i.round() as i16).to_ne_bytes());
                out[2..4].copy_from_slice(&(q.round() as i16).to_ne_bytes());
            }
            CpuFormat::Sc8 => {
                out[0] = (i.round() as i8) as u8;
                out[1] = (q.round() as i8) as u8;
            }
        }
    }
}

pub fn check_otw_format(name: &str) -> Result<(), Fault> {
    match name {
        "" | "sc16" | "sc12" | "sc8" => Ok(()),
        other => Err(Fault::lookup(format!(
            "over-the-wire format '{other}' is not supported"
        ))),
    }
}

/// Normalized I/Q of the test tone at sample `index`.
pub fn tone(index: u64) -> (f64, f64) {
    let phase = TAU * (index % TONE_PERIOD) as f64 / TONE_PERIOD as f64;
    (phase.cos(), phase.sin())
}

/// Per-call receive metadata as stored in a metadata handle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RxMeta {
    pub has_time_spec: bool,
    pub time_spec: TimeSpec,
    pub more_fragments: bool,
    pub fragment_offset: usize,
    pub start_of_burst: bool,
    pub end_of_burst: bool,
    pub out_of_sequence: bool,
    pub error_code: u32,
}

impl RxMeta {
    fn error(code: RxErrorCode) -> Self {
        Self {
            error_code: code.as_raw(),
            ..Default::default()
        }
    }

    pub fn pp_string(&self) -> String {
        let mut out = String::from("RX Metadata:");
        if self.has_time_spec {
            out.push_str(&format!(
                "\n  Time spec: {} full secs, {} frac secs",
                self.time_spec.full_secs, self.time_spec.frac_secs
            ));
        }
        if self.more_fragments {
            out.push_str(&format!(
                "\n  More fragments, offset {}",
                self.fragment_offset
            ));
        }
        if self.start_of_burst {
            out.push_str("\n  Start of burst.");
        }
        if self.end_of_burst {
            out.push_str("\n  End of burst.");
        }
        if self.out_of_sequence {
            out.push_str("\n  Out of sequence.");
        }
        out.push_str(&format!("\n  Error Code: {}", strerror(self.error_code)));
        out
    }
}

pub fn strerror(code: u32) -> String {
    match RxErrorCode::from_raw(code) {
        Some(RxErrorCode::None) => "ERROR_CODE_NONE".to_string(),
        Some(RxErrorCode::Timeout) => "ERROR_CODE_TIMEOUT: no packet received".to_string(),
        Some(RxErrorCode::LateCommand) => {
            "ERROR_CODE_LATE_COMMAND: stream command arrived after its time".to_string()
        }
        Some(RxErrorCode::BrokenChain) => {
            "ERROR_CODE_BROKEN_CHAIN: expected another stream command".to_string()
        }
        Some(RxErrorCode::Overflow) => {
            "ERROR_CODE_OVERFLOW: host did not keep up with the sample rate".to_string()
        }
        Some(RxErrorCode::Alignment) => {
            "ERROR_CODE_ALIGNMENT: channels could not be aligned".to_string()
        }
        Some(RxErrorCode::BadPacket) => "ERROR_CODE_BAD_PACKET: malformed packet".to_string(),
        None => format!("ERROR_CODE_UNKNOWN ({code:#x})"),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TxMeta {
    pub has_time_spec: bool,
    pub time_spec: TimeSpec,
    pub start_of_burst: bool,
    pub end_of_burst: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AsyncMeta {
    pub channel: usize,
    pub has_time_spec: bool,
    pub time_spec: TimeSpec,
    pub event_code: u32,
    pub user_payload: UserPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxMode {
    Idle,
    Continuous,
    Finite { remaining: usize, more: bool },
    /// A `NumSampsAndMore` burst ended and no follow-up command arrived.
    Chained,
}

/// A bound receive streamer.
#[derive(Debug)]
pub struct RxStream {
    pub session: u64,
    pub channels: Vec<usize>,
    pub format: CpuFormat,
    mode: RxMode,
    start: Option<TimeSpec>,
    late: bool,
    first_packet: bool,
    produced: u64,
}

impl RxStream {
    pub fn new(session: u64, channels: Vec<usize>, format: CpuFormat) -> Self {
        Self {
            session,
            channels,
            format,
            mode: RxMode::Idle,
            start: None,
            late: false,
            first_packet: true,
            produced: 0,
        }
    }

    /// True when a `recv` would produce something other than a timeout.
    pub fn is_active(&self) -> bool {
        self.mode != RxMode::Idle
    }

    pub fn issue(&mut self, cmd: &StreamCmd, now: TimeSpec) {
        self.mode = match cmd.mode {
            StreamMode::StopContinuous => RxMode::Idle,
            StreamMode::StartContinuous => RxMode::Continuous,
            StreamMode::NumSampsAndDone => RxMode::Finite {
                remaining: cmd.num_samps,
                more: false,
            },
            StreamMode::NumSampsAndMore => RxMode::Finite {
                remaining: cmd.num_samps,
                more: true,
            },
        };
        if cmd.mode == StreamMode::StopContinuous || cmd.stream_now {
            self.start = None;
            self.late = false;
        } else {
            self.start = Some(cmd.time_spec);
            self.late = cmd.time_spec < now;
        }
        if !matches!(self.mode, RxMode::Idle) {
            self.first_packet = true;
        }
    }

    /// Produce one call's worth of samples.
    ///
    /// Buffers have already been checked against the channel count and
    /// `samps_per_buff`.
    pub fn recv(
        &mut self,
        session: &mut Session,
        buffs: &mut [&mut [u8]],
        samps_per_buff: usize,
        one_packet: bool,
    ) -> (usize, RxMeta) {
        match self.mode {
            RxMode::Idle => return (0, RxMeta::error(RxErrorCode::Timeout)),
            RxMode::Chained => {
                self.mode = RxMode::Idle;
                return (0, RxMeta::error(RxErrorCode::BrokenChain));
            }
            RxMode::Continuous | RxMode::Finite { .. } => {}
        }

        if let Some(start) = self.start.take() {
            if std::mem::take(&mut self.late) {
                self.mode = RxMode::Idle;
                let mut md = RxMeta::error(RxErrorCode::LateCommand);
                md.has_time_spec = true;
                md.time_spec = session.time;
                return (0, md);
            }
            session.time = start;
        }

        let mut n = samps_per_buff;
        if one_packet {
            n = n.min(MAX_NUM_SAMPS);
        }
        if let RxMode::Finite { remaining, .. } = self.mode {
            n = n.min(remaining);
        }

        let md_time = session.time;
        let amplitude = self.format.amplitude();
        let size = self.format.size();
        for buf in buffs.iter_mut() {
            for (k, out) in buf.chunks_exact_mut(size).take(n).enumerate() {
                let (i, q) = tone(self.produced + k as u64);
                self.format.write(out, i * amplitude, q * amplitude);
            }
        }
        self.produced += n as u64;

        let rate = self
            .channels
            .first()
            .and_then(|&c| session.rx.get(c))
            .map_or(1e6, |c| c.rate);
        session.time = session.time.add_ticks(n as u64, rate);

        let mut md = RxMeta {
            has_time_spec: true,
            time_spec: md_time,
            start_of_burst: std::mem::take(&mut self.first_packet),
            ..Default::default()
        };
        if let RxMode::Finite { remaining, more } = self.mode {
            let remaining = remaining - n;
            if remaining == 0 {
                md.end_of_burst = true;
                self.mode = if more { RxMode::Chained } else { RxMode::Idle };
            } else {
                self.mode = RxMode::Finite { remaining, more };
            }
        }
        (n, md)
    }
}

/// A bound transmit streamer.
#[derive(Debug)]
pub struct TxStream {
    pub session: u64,
    pub channels: Vec<usize>,
    pub format: CpuFormat,
    in_burst: bool,
    events: VecDeque<AsyncMeta>,
    pub samples_sent: u64,
}

impl TxStream {
    pub fn new(session: u64, channels: Vec<usize>, format: CpuFormat) -> Self {
        Self {
            session,
            channels,
            format,
            in_burst: false,
            events: VecDeque::new(),
            samples_sent: 0,
        }
    }

    pub fn send(&mut self, session: &mut Session, md: &TxMeta, n: usize) -> usize {
        if md.start_of_burst && self.in_burst {
            self.push_all(AsyncEventCode::SEQ_ERROR_IN_BURST, session.time);
        }
        if md.has_time_spec {
            if md.time_spec < session.time {
                self.push_all(AsyncEventCode::TIME_ERROR, session.time);
            } else {
                session.time = md.time_spec;
            }
        }
        if md.start_of_burst {
            self.in_burst = true;
        }

        let rate = self
            .channels
            .first()
            .and_then(|&c| session.tx.get(c))
            .map_or(1e6, |c| c.rate);
        session.time = session.time.add_ticks(n as u64, rate);
        self.samples_sent += n as u64;

        if md.end_of_burst {
            self.in_burst = false;
            self.push_all(AsyncEventCode::BURST_ACK, session.time);
        }
        n
    }

    fn push_all(&mut self, code: AsyncEventCode, time: TimeSpec) {
        for channel in 0..self.channels.len() {
            self.push(AsyncMeta {
                channel,
                has_time_spec: true,
                time_spec: time,
                event_code: code.bits(),
                user_payload: [0; 4],
            });
        }
    }

    pub fn push(&mut self, event: AsyncMeta) {
        if self.events.len() == MAX_EVENTS
            && let Some(dropped) = self.events.pop_front()
        {
            tracing::warn!(
                "async event queue full, dropping {:?}",
                AsyncEventCode::from_bits_retain(dropped.event_code)
            );
        }
        self.events.push_back(event);
    }

    pub fn pop(&mut self) -> Option<AsyncMeta> {
        self.events.pop_front()
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::device::SimDevice;
    use approx::assert_relative_eq;

    fn session() -> Session {
        Session::new(SimDevice::b200("T"))
    }

    fn recv(rx: &mut RxStream, s: &mut Session, n: usize, one_packet: bool) -> (usize, RxMeta) {
        let mut buf = vec![0u8; n * rx.format.size()];
        let mut buffs = [buf.as_mut_slice()];
        rx.recv(s, &mut buffs, n, one_packet)
    }

    #[test]
    fn test_finite_burst_sets_flags() {
        let mut s = session();
        let mut rx = RxStream::new(1, vec![0], CpuFormat::Fc32);
        rx.issue(&StreamCmd::num_samps_and_done(3000), s.time);

        let (n, md) = recv(&mut rx, &mut s, 5000, true);
        assert_eq!(n, MAX_NUM_SAMPS);
        assert!(md.start_of_burst && !md.end_of_burst);

        let (n, md) = recv(&mut rx, &mut s, 5000, false);
        assert_eq!(n, 1000);
        assert!(md.end_of_burst && !md.start_of_burst);
        assert_relative_eq!(md.time_spec.as_secs_f64(), 2e-3, epsilon = 1e-12);

        let (n, md) = recv(&mut rx, &mut s, 10, false);
        assert_eq!(n, 0);
        assert_eq!(md.error_code, RxErrorCode::Timeout.as_raw());
    }

    #[test]
    fn test_late_command() {
        let mut s = session();
        s.time = TimeSpec::new(5, 0.0);
        let mut rx = RxStream::new(1, vec![0], CpuFormat::Sc16);
        rx.issue(&StreamCmd::start_continuous().at(TimeSpec::new(1, 0.0)), s.time);
        let (n, md) = recv(&mut rx, &mut s, 10, false);
        assert_eq!(n, 0);
        assert_eq!(md.error_code, RxErrorCode::LateCommand.as_raw());
        assert!(!rx.is_active());
    }

    #[test]
    fn test_timed_start_moves_clock() {
        let mut s = session();
        let mut rx = RxStream::new(1, vec![0], CpuFormat::Sc8);
        rx.issue(&StreamCmd::start_continuous().at(TimeSpec::new(2, 0.5)), s.time);
        let (n, md) = recv(&mut rx, &mut s, 100, false);
        assert_eq!(n, 100);
        assert_eq!(md.time_spec, TimeSpec::new(2, 0.5));
    }

    #[test]
    fn test_broken_chain() {
        let mut s = session();
        let mut rx = RxStream::new(1, vec![0], CpuFormat::Fc64);
        rx.issue(&StreamCmd::num_samps_and_more(10), s.time);
        let (_, md) = recv(&mut rx, &mut s, 10, false);
        assert!(md.end_of_burst);
        let (_, md) = recv(&mut rx, &mut s, 10, false);
        assert_eq!(md.error_code, RxErrorCode::BrokenChain.as_raw());
    }

    #[test]
    fn test_tone_in_sc16() {
        let mut s = session();
        let mut rx = RxStream::new(1, vec![0], CpuFormat::Sc16);
        rx.issue(&StreamCmd::start_continuous(), s.time);
        let mut buf = vec![0u8; 4 * 17];
        rx.recv(&mut s, &mut [buf.as_mut_slice()], 17, false);
        assert_eq!(i16::from_ne_bytes([buf[0], buf[1]]), 16384);
        // Quarter period: pure Q.
        let k = (TONE_PERIOD / 4) as usize * 4;
        assert_eq!(i16::from_ne_bytes([buf[k], buf[k + 1]]), 0);
        assert_eq!(i16::from_ne_bytes([buf[k + 2], buf[k + 3]]), 16384);
    }

    #[test]
    fn test_tx_burst_events() {
        let mut s = session();
        let mut tx = TxStream::new(1, vec![0], CpuFormat::Fc32);
        let sob = TxMeta {
            start_of_burst: true,
            ..Default::default()
        };
        tx.send(&mut s, &sob, 100);
        tx.send(&mut s, &sob, 100);
        let eob = TxMeta {
            end_of_burst: true,
            ..Default::default()
        };
        tx.send(&mut s, &eob, 100);

        let first = tx.pop().unwrap();
        assert_eq!(first.event_code, AsyncEventCode::SEQ_ERROR_IN_BURST.bits());
        let ack = tx.pop().unwrap();
        assert_eq!(ack.event_code, AsyncEventCode::BURST_ACK.bits());
        assert!(tx.pop().is_none());
        assert_eq!(tx.samples_sent, 300);
    }

    #[test]
    fn test_tx_late_send() {
        let mut s = session();
        s.time = TimeSpec::new(3, 0.0);
        let mut tx = TxStream::new(1, vec![0], CpuFormat::Fc32);
        let md = TxMeta {
            has_time_spec: true,
            time_spec: TimeSpec::new(1, 0.0),
            ..Default::default()
        };
        tx.send(&mut s, &md, 10);
        assert_eq!(
            tx.pop().map(|e| e.event_code),
            Some(AsyncEventCode::TIME_ERROR.bits())
        );
    }

    #[test]
    fn test_event_queue_is_bounded() {
        let mut tx = TxStream::new(1, vec![0], CpuFormat::Fc32);
        for channel in 0..MAX_EVENTS + 5 {
            tx.push(AsyncMeta {
                channel,
                ..Default::default()
            });
        }
        assert_eq!(tx.pop().map(|e| e.channel), Some(5));
    }
}
