//! Value types exchanged with the driver.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::time::Duration;

/// Channel value meaning "every channel" on the C side.
pub const ALL_CHANS: usize = usize::MAX;
/// Mboard value meaning "every motherboard" on the C side.
pub const ALL_MBOARDS: usize = usize::MAX;
/// Gain name meaning "the overall gain".
pub const ALL_GAINS: &str = "";
/// LO name meaning "every LO".
pub const ALL_LOS: &str = "all";

/// Signal path direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Rx,
    Tx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rx => f.write_str("RX"),
            Direction::Tx => f.write_str("TX"),
        }
    }
}

/// Device time: whole seconds plus a fractional part in `[0, 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeSpec {
    pub full_secs: i64,
    pub frac_secs: f64,
}

impl TimeSpec {
    pub const ZERO: TimeSpec = TimeSpec {
        full_secs: 0,
        frac_secs: 0.0,
    };

    pub fn new(full_secs: i64, frac_secs: f64) -> Self {
        Self {
            full_secs,
            frac_secs,
        }
        .normalized()
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        let full = secs.floor();
        Self {
            full_secs: full as i64,
            frac_secs: secs - full,
        }
    }

    pub fn as_secs_f64(self) -> f64 {
        self.full_secs as f64 + self.frac_secs
    }

    /// Time of the `ticks`-th sample after `self` at `rate` samples per second.
    pub fn add_ticks(self, ticks: u64, rate: f64) -> Self {
        let whole = (ticks as f64 / rate).floor();
        let rem = (ticks as f64 - whole * rate) / rate;
        Self {
            full_secs: self.full_secs + whole as i64,
            frac_secs: self.frac_secs + rem,
        }
        .normalized()
    }

    fn normalized(mut self) -> Self {
        if !(0.0..1.0).contains(&self.frac_secs) {
            let carry = self.frac_secs.floor();
            self.full_secs += carry as i64;
            self.frac_secs -= carry;
        }
        self
    }
}

impl From<Duration> for TimeSpec {
    fn from(d: Duration) -> Self {
        Self {
            full_secs: d.as_secs() as i64,
            frac_secs: d.subsec_nanos() as f64 * 1e-9,
        }
    }
}

impl PartialOrd for TimeSpec {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match self.full_secs.cmp(&other.full_secs) {
            std::cmp::Ordering::Equal => self.frac_secs.partial_cmp(&other.frac_secs),
            ord => Some(ord),
        }
    }
}

/// How a tuning stage is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum TunePolicy {
    /// Leave the stage untouched.
    None = b'N' as i32,
    /// Let the device pick.
    #[default]
    Auto = b'A' as i32,
    /// Use the supplied value.
    Manual = b'M' as i32,
}

impl TunePolicy {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            r if r == TunePolicy::None as i32 => Some(TunePolicy::None),
            r if r == TunePolicy::Auto as i32 => Some(TunePolicy::Auto),
            r if r == TunePolicy::Manual as i32 => Some(TunePolicy::Manual),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// How a target frequency is split between the RF and DSP stages.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TuneRequest {
    pub target_freq: f64,
    pub rf_freq_policy: TunePolicy,
    pub rf_freq: f64,
    pub dsp_freq_policy: TunePolicy,
    pub dsp_freq: f64,
    /// Extra device arguments, e.g. `mode_n=integer`.
    pub args: String,
}

impl TuneRequest {
    /// Let the device tune both stages to reach `target_freq`.
    pub fn new(target_freq: f64) -> Self {
        Self {
            target_freq,
            ..Default::default()
        }
    }

    /// Pin the RF stage to `target_freq + lo_offset` and let the DSP stage
    /// cover the offset.
    pub fn with_lo_offset(target_freq: f64, lo_offset: f64) -> Self {
        Self {
            target_freq,
            rf_freq_policy: TunePolicy::Manual,
            rf_freq: target_freq + lo_offset,
            ..Default::default()
        }
    }

    pub fn rf(mut self, policy: TunePolicy, freq: f64) -> Self {
        self.rf_freq_policy = policy;
        self.rf_freq = freq;
        self
    }

    pub fn dsp(mut self, policy: TunePolicy, freq: f64) -> Self {
        self.dsp_freq_policy = policy;
        self.dsp_freq = freq;
        self
    }

    pub fn args(mut self, args: impl Into<String>) -> Self {
        self.args = args.into();
        self
    }
}

/// Frequencies the device actually reached.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct TuneResult {
    pub clipped_rf_freq: f64,
    pub target_rf_freq: f64,
    pub actual_rf_freq: f64,
    pub target_dsp_freq: f64,
    pub actual_dsp_freq: f64,
}

/// Stream command mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StreamMode {
    StartContinuous = b'a' as i32,
    StopContinuous = b'o' as i32,
    NumSampsAndDone = b'd' as i32,
    NumSampsAndMore = b'm' as i32,
}

impl StreamMode {
    pub fn from_raw(raw: i32) -> Option<Self> {
        [
            StreamMode::StartContinuous,
            StreamMode::StopContinuous,
            StreamMode::NumSampsAndDone,
            StreamMode::NumSampsAndMore,
        ]
        .into_iter()
        .find(|m| *m as i32 == raw)
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Starts, stops or bounds an RX stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamCmd {
    pub mode: StreamMode,
    pub num_samps: usize,
    pub stream_now: bool,
    pub time_spec: TimeSpec,
}

impl StreamCmd {
    fn now(mode: StreamMode, num_samps: usize) -> Self {
        Self {
            mode,
            num_samps,
            stream_now: true,
            time_spec: TimeSpec::ZERO,
        }
    }

    pub fn start_continuous() -> Self {
        Self::now(StreamMode::StartContinuous, 0)
    }

    pub fn stop_continuous() -> Self {
        Self::now(StreamMode::StopContinuous, 0)
    }

    /// Stream exactly `num_samps` samples then stop.
    pub fn num_samps_and_done(num_samps: usize) -> Self {
        Self::now(StreamMode::NumSampsAndDone, num_samps)
    }

    /// Stream `num_samps` samples and expect another command to follow.
    pub fn num_samps_and_more(num_samps: usize) -> Self {
        Self::now(StreamMode::NumSampsAndMore, num_samps)
    }

    /// Defer the command to a device time.
    pub fn at(mut self, time_spec: TimeSpec) -> Self {
        self.stream_now = false;
        self.time_spec = time_spec;
        self
    }
}

/// Streamer construction arguments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamArgs {
    /// Host sample format (`fc32`, `sc16`, ...).
    pub cpu_format: String,
    /// Over-the-wire sample format (`sc16`, `sc8`); empty lets the device pick.
    pub otw_format: String,
    pub args: String,
    pub channels: Vec<usize>,
}

impl StreamArgs {
    pub fn new(cpu_format: impl Into<String>, otw_format: impl Into<String>) -> Self {
        Self {
            cpu_format: cpu_format.into(),
            otw_format: otw_format.into(),
            ..Default::default()
        }
    }

    pub fn channels(mut self, channels: impl IntoIterator<Item = usize>) -> Self {
        self.channels = channels.into_iter().collect();
        self
    }

    pub fn args(mut self, args: impl Into<String>) -> Self {
        self.args = args.into();
        self
    }
}

/// In-band receive condition reported in the metadata.
///
/// The raw values look like bits but the device reports one condition per
/// call, so this is a plain enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RxErrorCode {
    None = 0x0,
    /// No packet arrived within the timeout.
    Timeout = 0x1,
    /// A timed stream command arrived after its time.
    LateCommand = 0x2,
    /// Expected another stream command but none arrived.
    BrokenChain = 0x4,
    /// The host did not drain samples fast enough.
    Overflow = 0x8,
    /// Multi-channel alignment failed.
    Alignment = 0xC,
    /// A packet could not be parsed.
    BadPacket = 0xF,
}

impl RxErrorCode {
    pub const ALL: [RxErrorCode; 7] = [
        RxErrorCode::None,
        RxErrorCode::Timeout,
        RxErrorCode::LateCommand,
        RxErrorCode::BrokenChain,
        RxErrorCode::Overflow,
        RxErrorCode::Alignment,
        RxErrorCode::BadPacket,
    ];

    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| *c as u32 == raw)
    }

    pub fn as_raw(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            RxErrorCode::None => "none",
            RxErrorCode::Timeout => "timeout",
            RxErrorCode::LateCommand => "late command",
            RxErrorCode::BrokenChain => "broken chain",
            RxErrorCode::Overflow => "overflow",
            RxErrorCode::Alignment => "alignment",
            RxErrorCode::BadPacket => "bad packet",
        }
    }
}

impl fmt::Display for RxErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of transmit-path events; several may be reported at once.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AsyncEventCode(u32);

impl AsyncEventCode {
    pub const BURST_ACK: Self = Self(0x1);
    pub const UNDERFLOW: Self = Self(0x2);
    pub const SEQ_ERROR: Self = Self(0x4);
    pub const TIME_ERROR: Self = Self(0x8);
    pub const UNDERFLOW_IN_PACKET: Self = Self(0x10);
    pub const SEQ_ERROR_IN_BURST: Self = Self(0x20);
    pub const USER_PAYLOAD: Self = Self(0x40);

    const NAMED: [(Self, &'static str); 7] = [
        (Self::BURST_ACK, "BURST_ACK"),
        (Self::UNDERFLOW, "UNDERFLOW"),
        (Self::SEQ_ERROR, "SEQ_ERROR"),
        (Self::TIME_ERROR, "TIME_ERROR"),
        (Self::UNDERFLOW_IN_PACKET, "UNDERFLOW_IN_PACKET"),
        (Self::SEQ_ERROR_IN_BURST, "SEQ_ERROR_IN_BURST"),
        (Self::USER_PAYLOAD, "USER_PAYLOAD"),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    /// Keep every bit, including ones this library has no name for.
    pub const fn from_bits_retain(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Underflow or sequence errors, the events a sender has to react to.
    pub const fn is_error(self) -> bool {
        self.intersects(Self(
            Self::UNDERFLOW.0
                | Self::SEQ_ERROR.0
                | Self::TIME_ERROR.0
                | Self::UNDERFLOW_IN_PACKET.0
                | Self::SEQ_ERROR_IN_BURST.0,
        ))
    }

    /// Iterate over the named flags that are set.
    pub fn iter(self) -> impl Iterator<Item = Self> {
        Self::NAMED
            .into_iter()
            .map(|(flag, _)| flag)
            .filter(move |flag| self.contains(*flag))
    }
}

impl BitOr for AsyncEventCode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AsyncEventCode {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for AsyncEventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("AsyncEventCode(empty)");
        }
        let mut first = true;
        f.write_str("AsyncEventCode(")?;
        for (flag, name) in Self::NAMED {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        let unnamed = self.0 & !0x7f;
        if unnamed != 0 {
            if !first {
                f.write_str(" | ")?;
            }
            write!(f, "{unnamed:#x}")?;
        }
        f.write_str(")")
    }
}

/// User payload carried by an async event.
pub type UserPayload = [u32; 4];

/// Sensor value data type as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorType {
    Boolean,
    Integer,
    Real,
    String,
    Unknown,
}

impl SensorType {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            98 => SensorType::Boolean,
            105 => SensorType::Integer,
            114 => SensorType::Real,
            115 => SensorType::String,
            _ => SensorType::Unknown,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            SensorType::Boolean => b'b' as i32,
            SensorType::Integer => b'i' as i32,
            SensorType::Real => b'r' as i32,
            SensorType::String => b's' as i32,
            SensorType::Unknown => 0,
        }
    }
}

/// Identification of one RX or TX chain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChainInfo {
    pub mboard_id: String,
    pub mboard_name: String,
    pub mboard_serial: String,
    pub id: String,
    pub subdev_name: String,
    pub subdev_spec: String,
    pub serial: String,
    pub antenna: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_timespec_normalizes_fraction() {
        let t = TimeSpec::new(1, 1.25);
        assert_eq!(t.full_secs, 2);
        assert_relative_eq!(t.frac_secs, 0.25);

        let t = TimeSpec::new(1, -0.25);
        assert_eq!(t.full_secs, 0);
        assert_relative_eq!(t.frac_secs, 0.75);
    }

    #[test]
    fn test_timespec_add_ticks() {
        let t = TimeSpec::new(10, 0.5).add_ticks(1_500_000, 1e6);
        assert_eq!(t.full_secs, 12);
        assert_relative_eq!(t.frac_secs, 0.0, epsilon = 1e-12);
        assert!(TimeSpec::new(1, 0.2) < TimeSpec::new(1, 0.3));
        assert!(TimeSpec::new(2, 0.0) > TimeSpec::new(1, 0.9));
    }

    #[test]
    fn test_lo_offset_request() {
        let req = TuneRequest::with_lo_offset(100e6, 2e6);
        assert_eq!(req.rf_freq_policy, TunePolicy::Manual);
        assert_relative_eq!(req.rf_freq, 102e6);
        assert_eq!(req.dsp_freq_policy, TunePolicy::Auto);
    }

    #[test]
    fn test_policy_raw_values_are_ascii() {
        assert_eq!(TunePolicy::None.as_raw(), 78);
        assert_eq!(TunePolicy::Auto.as_raw(), 65);
        assert_eq!(TunePolicy::Manual.as_raw(), 77);
        assert_eq!(StreamMode::from_raw(111), Some(StreamMode::StopContinuous));
        assert_eq!(StreamMode::from_raw(0), None);
    }

    #[test]
    fn test_event_flags_combine() {
        let code = AsyncEventCode::UNDERFLOW | AsyncEventCode::UNDERFLOW_IN_PACKET;
        assert!(code.contains(AsyncEventCode::UNDERFLOW));
        assert!(!code.contains(AsyncEventCode::BURST_ACK));
        assert!(code.is_error());
        assert!(!AsyncEventCode::BURST_ACK.is_error());
        assert_eq!(code.iter().count(), 2);
        assert_eq!(
            format!("{code:?}"),
            "AsyncEventCode(UNDERFLOW | UNDERFLOW_IN_PACKET)"
        );
    }
}
