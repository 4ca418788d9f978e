//! Radio model behind a simulated session.

use std::collections::BTreeMap;

use crate::args::DeviceArgs;
use crate::range::{MetaRange, Range};
use crate::types::{ChainInfo, Direction, TimeSpec, TunePolicy, TuneRequest, TuneResult};

use super::Fault;

/// Synthesizer frequency grid of the simulated front end.
pub const RF_STEP: f64 = 1e3;
/// Width of the DSP phase accumulator; DSP frequencies are multiples of `rate / 2^32`.
const DSP_BITS: i32 = 32;

const FE_FREQ: Range = Range {
    start: 70e6,
    stop: 6e9,
    step: 0.0,
};
const RATES: Range = Range {
    start: 1e5,
    stop: 61.44e6,
    step: 0.0,
};
const BANDWIDTHS: Range = Range {
    start: 200e3,
    stop: 56e6,
    step: 0.0,
};
const RX_GAIN: Range = Range {
    start: 0.0,
    stop: 76.0,
    step: 1.0,
};
const TX_GAIN: Range = Range {
    start: 0.0,
    stop: 89.75,
    step: 0.25,
};

pub const GAIN_STAGE: &str = "PGA";
pub const LO_SOURCES: [&str; 2] = ["internal", "external"];
pub const CLOCK_SOURCES: [&str; 3] = ["internal", "external", "gpsdo"];
pub const TIME_SOURCES: [&str; 4] = ["none", "internal", "external", "gpsdo"];

/// One device the simulated driver can discover and open.
#[derive(Debug, Clone, PartialEq)]
pub struct SimDevice {
    /// Identification pairs matched against `find`/`make` arguments.
    pub args: DeviceArgs,
    pub mboard_name: String,
    pub rx_channels: usize,
    pub tx_channels: usize,
}

impl SimDevice {
    /// A two-channel B210-like device.
    pub fn b210(serial: &str) -> Self {
        Self {
            args: DeviceArgs::new()
                .with("type", "b200")
                .with("product", "B210")
                .with("serial", serial)
                .with("name", "sim"),
            mboard_name: "B210".to_string(),
            rx_channels: 2,
            tx_channels: 2,
        }
    }

    /// A single-channel B200-like device.
    pub fn b200(serial: &str) -> Self {
        Self {
            args: DeviceArgs::new()
                .with("type", "b200")
                .with("product", "B200")
                .with("serial", serial)
                .with("name", "sim"),
            mboard_name: "B200".to_string(),
            rx_channels: 1,
            tx_channels: 1,
        }
    }

    pub fn serial(&self) -> &str {
        self.args.get("serial").unwrap_or("")
    }
}

/// Per-channel radio state.
#[derive(Debug, Clone)]
pub struct Chain {
    pub dir: Direction,
    pub rate: f64,
    pub rf_freq: f64,
    pub dsp_freq: f64,
    pub gains: BTreeMap<String, f64>,
    pub antenna: String,
    pub bandwidth: f64,
    pub lo_source: String,
    pub lo_export: bool,
    pub agc: bool,
    pub dc_offset: bool,
    pub iq_balance: bool,
    pub subdev: (String, String),
}

impl Chain {
    fn new(dir: Direction, index: usize) -> Self {
        let sd = if index % 2 == 0 { "A" } else { "B" };
        Self {
            dir,
            rate: 1e6,
            rf_freq: 1e9,
            dsp_freq: 0.0,
            gains: BTreeMap::from([(GAIN_STAGE.to_string(), 0.0)]),
            antenna: antennas(dir)[0].to_string(),
            bandwidth: 56e6,
            lo_source: LO_SOURCES[0].to_string(),
            lo_export: false,
            agc: false,
            dc_offset: true,
            iq_balance: true,
            subdev: ("A".to_string(), sd.to_string()),
        }
    }

    pub fn freq(&self) -> f64 {
        self.rf_freq + self.dsp_freq
    }

    pub fn overall_gain(&self) -> f64 {
        self.gains.values().sum()
    }

    pub fn subdev_name(&self) -> String {
        let n = if self.subdev.1 == "B" { 2 } else { 1 };
        format!("FE-{}{}", self.dir, n)
    }

    pub fn gain(&self, name: &str) -> Result<f64, Fault> {
        if name.is_empty() {
            return Ok(self.overall_gain());
        }
        self.gains
            .get(name)
            .copied()
            .ok_or_else(|| Fault::key(format!("Invalid gain name: {name}")))
    }

    pub fn set_gain(&mut self, name: &str, gain: f64) -> Result<(), Fault> {
        let range = gain_range(self.dir);
        let value = range.clip(gain, true);
        // Single stage: the overall gain is the stage gain.
        let stage = if name.is_empty() { GAIN_STAGE } else { name };
        let slot = self
            .gains
            .get_mut(stage)
            .ok_or_else(|| Fault::key(format!("Invalid gain name: {name}")))?;
        *slot = value;
        Ok(())
    }

    pub fn normalized_gain(&self) -> f64 {
        let range = gain_range(self.dir);
        (self.overall_gain() - range.start()) / (range.stop() - range.start())
    }

    pub fn set_normalized_gain(&mut self, gain: f64) -> Result<(), Fault> {
        if !(0.0..=1.0).contains(&gain) {
            return Err(Fault::value(
                "Normalized gain out of range, must be in [0, 1].",
            ));
        }
        let range = gain_range(self.dir);
        self.set_gain("", range.start() + gain * (range.stop() - range.start()))
    }

    pub fn set_antenna(&mut self, antenna: &str) -> Result<(), Fault> {
        if !antennas(self.dir).contains(&antenna) {
            return Err(Fault::value(format!(
                "Invalid {} antenna: {antenna}",
                self.dir
            )));
        }
        self.antenna = antenna.to_string();
        Ok(())
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.rate = rate_range().clip(rate, false);
        // The DSP offset has to stay inside the new passband.
        self.dsp_freq = self.dsp_freq.clamp(-self.rate / 2.0, self.rate / 2.0);
    }

    pub fn set_bandwidth(&mut self, bandwidth: f64) {
        self.bandwidth = bandwidth_range().clip(bandwidth, false);
    }

    pub fn check_lo(&self, name: &str) -> Result<(), Fault> {
        if name == crate::types::ALL_LOS || name == lo_name(self.dir) {
            Ok(())
        } else {
            Err(Fault::key(format!("Invalid LO name: {name}")))
        }
    }

    pub fn set_lo_source(&mut self, source: &str, name: &str) -> Result<(), Fault> {
        self.check_lo(name)?;
        if !LO_SOURCES.contains(&source) {
            return Err(Fault::value(format!("Invalid LO source: {source}")));
        }
        self.lo_source = source.to_string();
        Ok(())
    }

    /// Set the LO directly; returns the coerced frequency.
    pub fn set_lo_freq(&mut self, freq: f64, name: &str) -> Result<f64, Fault> {
        self.check_lo(name)?;
        self.rf_freq = quantize_rf(freq);
        Ok(self.rf_freq)
    }

    /// Apply a tune request.
    ///
    /// The RF stage lands on the synthesizer grid; the DSP stage covers the
    /// remaining offset within half the sample rate.
    pub fn tune(&mut self, request: &TuneRequest) -> TuneResult {
        let target_rf = match request.rf_freq_policy {
            TunePolicy::Auto => request.target_freq,
            TunePolicy::Manual => request.rf_freq,
            TunePolicy::None => self.rf_freq,
        };
        let clipped_rf = fe_freq_range().clip(target_rf, false);
        if request.rf_freq_policy != TunePolicy::None {
            self.rf_freq = quantize_rf(clipped_rf);
        }

        let target_dsp = match request.dsp_freq_policy {
            TunePolicy::Auto => request.target_freq - self.rf_freq,
            TunePolicy::Manual => request.dsp_freq,
            TunePolicy::None => self.dsp_freq,
        };
        if request.dsp_freq_policy != TunePolicy::None {
            let half = self.rate / 2.0;
            let step = self.rate / 2f64.powi(DSP_BITS);
            self.dsp_freq = (target_dsp.clamp(-half, half) / step).round() * step;
        }

        TuneResult {
            clipped_rf_freq: clipped_rf,
            target_rf_freq: target_rf,
            actual_rf_freq: self.rf_freq,
            target_dsp_freq: target_dsp,
            actual_dsp_freq: self.dsp_freq,
        }
    }

    /// Passband reachable with the current rate.
    pub fn freq_range(&self) -> MetaRange {
        let half = self.rate / 2.0;
        MetaRange::single(Range::new(FE_FREQ.start - half, FE_FREQ.stop + half, 0.0))
    }
}

fn quantize_rf(freq: f64) -> f64 {
    fe_freq_range().clip((freq / RF_STEP).round() * RF_STEP, false)
}

pub fn fe_freq_range() -> MetaRange {
    MetaRange::single(FE_FREQ)
}

pub fn rate_range() -> MetaRange {
    MetaRange::single(RATES)
}

pub fn bandwidth_range() -> MetaRange {
    MetaRange::single(BANDWIDTHS)
}

pub fn gain_range(dir: Direction) -> MetaRange {
    match dir {
        Direction::Rx => MetaRange::single(RX_GAIN),
        Direction::Tx => MetaRange::single(TX_GAIN),
    }
}

pub fn antennas(dir: Direction) -> &'static [&'static str] {
    match dir {
        Direction::Rx => &["RX2", "TX/RX"],
        Direction::Tx => &["TX/RX"],
    }
}

pub fn lo_name(dir: Direction) -> &'static str {
    match dir {
        Direction::Rx => "RX_LO",
        Direction::Tx => "TX_LO",
    }
}

/// A reading produced by a simulated sensor.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Bool {
        value: bool,
        utrue: String,
        ufalse: String,
    },
    Int {
        value: i32,
        unit: String,
    },
    Real {
        value: f64,
        unit: String,
    },
    Text {
        value: String,
        unit: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub name: String,
    pub reading: Reading,
}

impl Sensor {
    pub fn empty() -> Self {
        Self::text("", "", "")
    }

    pub fn boolean(name: &str, value: bool, utrue: &str, ufalse: &str) -> Self {
        Self {
            name: name.to_string(),
            reading: Reading::Bool {
                value,
                utrue: utrue.to_string(),
                ufalse: ufalse.to_string(),
            },
        }
    }

    pub fn int(name: &str, value: i32, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            reading: Reading::Int {
                value,
                unit: unit.to_string(),
            },
        }
    }

    pub fn real(name: &str, value: f64, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            reading: Reading::Real {
                value,
                unit: unit.to_string(),
            },
        }
    }

    pub fn text(name: &str, value: &str, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            reading: Reading::Text {
                value: value.to_string(),
                unit: unit.to_string(),
            },
        }
    }

    pub fn value(&self) -> String {
        match &self.reading {
            Reading::Bool { value, .. } => value.to_string(),
            Reading::Int { value, .. } => value.to_string(),
            Reading::Real { value, .. } => format!("{value:.6}"),
            Reading::Text { value, .. } => value.clone(),
        }
    }

    pub fn unit(&self) -> String {
        match &self.reading {
            Reading::Bool {
                value,
                utrue,
                ufalse,
            } => (if *value { utrue } else { ufalse }).clone(),
            Reading::Int { unit, .. } | Reading::Real { unit, .. } | Reading::Text { unit, .. } => {
                unit.clone()
            }
        }
    }

    pub fn pp_string(&self) -> String {
        match &self.reading {
            Reading::Bool { .. } => format!("{}: {}", self.name, self.unit()),
            _ => format!("{}: {} {}", self.name, self.value(), self.unit()),
        }
    }
}

/// State of one opened device, shared by the session handle and its streamers.
#[derive(Debug)]
pub struct Session {
    pub device: SimDevice,
    /// Handles referring to this session.
    pub refs: usize,
    pub time: TimeSpec,
    pub last_pps: TimeSpec,
    pub master_clock_rate: f64,
    pub clock_source: String,
    pub time_source: String,
    pub clock_source_out: bool,
    pub time_source_out: bool,
    pub command_time: Option<TimeSpec>,
    pub user_registers: BTreeMap<u8, u32>,
    pub rx: Vec<Chain>,
    pub tx: Vec<Chain>,
}

impl Session {
    pub fn new(device: SimDevice) -> Self {
        let rx = (0..device.rx_channels)
            .map(|i| Chain::new(Direction::Rx, i))
            .collect();
        let tx = (0..device.tx_channels)
            .map(|i| Chain::new(Direction::Tx, i))
            .collect();
        Self {
            device,
            refs: 1,
            time: TimeSpec::ZERO,
            last_pps: TimeSpec::ZERO,
            master_clock_rate: 32e6,
            clock_source: CLOCK_SOURCES[0].to_string(),
            time_source: TIME_SOURCES[1].to_string(),
            clock_source_out: false,
            time_source_out: false,
            command_time: None,
            user_registers: BTreeMap::new(),
            rx,
            tx,
        }
    }

    pub fn chains(&self, dir: Direction) -> &[Chain] {
        match dir {
            Direction::Rx => &self.rx,
            Direction::Tx => &self.tx,
        }
    }

    pub fn chains_mut(&mut self, dir: Direction) -> &mut Vec<Chain> {
        match dir {
            Direction::Rx => &mut self.rx,
            Direction::Tx => &mut self.tx,
        }
    }

    pub fn chain(&self, dir: Direction, chan: usize) -> Result<&Chain, Fault> {
        self.chains(dir).get(chan).ok_or_else(|| bad_channel(dir, chan))
    }

    pub fn chain_mut(&mut self, dir: Direction, chan: usize) -> Result<&mut Chain, Fault> {
        self.chains_mut(dir)
            .get_mut(chan)
            .ok_or_else(|| bad_channel(dir, chan))
    }

    /// Run `f` on one channel, or on every channel for `ALL_CHANS`.
    pub fn for_chains(
        &mut self,
        dir: Direction,
        chan: usize,
        mut f: impl FnMut(&mut Chain) -> Result<(), Fault>,
    ) -> Result<(), Fault> {
        if chan == crate::types::ALL_CHANS {
            return self.chains_mut(dir).iter_mut().try_for_each(f);
        }
        f(self.chain_mut(dir, chan)?)
    }

    pub fn check_mboard(&self, mboard: usize, allow_all: bool) -> Result<(), Fault> {
        if mboard == 0 || (allow_all && mboard == crate::types::ALL_MBOARDS) {
            Ok(())
        } else {
            Err(Fault::index(format!("mboard index out of range: {mboard}")))
        }
    }

    pub fn info(&self, dir: Direction, chan: usize) -> Result<ChainInfo, Fault> {
        let chain = self.chain(dir, chan)?;
        Ok(ChainInfo {
            mboard_id: self.device.mboard_name.clone(),
            mboard_name: self.device.args.get("name").unwrap_or("").to_string(),
            mboard_serial: self.device.serial().to_string(),
            id: format!("{} {} (0x0{})", self.device.mboard_name, dir, chan),
            subdev_name: chain.subdev_name(),
            subdev_spec: self.subdev_markup(dir),
            serial: self.device.serial().to_string(),
            antenna: chain.antenna.clone(),
        })
    }

    pub fn subdev_pairs(&self, dir: Direction) -> Vec<(String, String)> {
        self.chains(dir).iter().map(|c| c.subdev.clone()).collect()
    }

    pub fn subdev_markup(&self, dir: Direction) -> String {
        subdev_markup(&self.subdev_pairs(dir))
    }

    /// Re-map the channels of one direction onto new front ends.
    pub fn set_subdev(&mut self, dir: Direction, pairs: &[(String, String)]) -> Result<(), Fault> {
        if pairs.is_empty() {
            return Err(Fault::value("subdev spec must not be empty"));
        }
        let max = match dir {
            Direction::Rx => self.device.rx_channels,
            Direction::Tx => self.device.tx_channels,
        };
        let valid = ["A", "B"];
        for (db, sd) in pairs {
            if db != "A" || !valid[..max.min(valid.len())].contains(&sd.as_str()) {
                return Err(Fault::value(format!(
                    "Invalid subdevice specification entry {db}:{sd}"
                )));
            }
        }
        let chains = self.chains_mut(dir);
        chains.truncate(pairs.len());
        while chains.len() < pairs.len() {
            let index = chains.len();
            chains.push(Chain::new(dir, index));
        }
        for (chain, pair) in chains.iter_mut().zip(pairs) {
            chain.subdev = pair.clone();
        }
        Ok(())
    }

    pub fn mboard_sensors(&self) -> Vec<Sensor> {
        let locked = self.clock_source != "internal";
        vec![
            Sensor::boolean("ref_locked", locked, "locked", "unlocked"),
            Sensor::real("temp", 42.5, "C"),
        ]
    }

    pub fn chain_sensors(&self, dir: Direction, chan: usize) -> Result<Vec<Sensor>, Fault> {
        let chain = self.chain(dir, chan)?;
        let mut sensors = vec![Sensor::boolean("lo_locked", true, "locked", "unlocked")];
        if dir == Direction::Rx {
            sensors.push(Sensor::real("rssi", chain.overall_gain() - 100.0, "dB"));
        }
        Ok(sensors)
    }

    pub fn pp_string(&self) -> String {
        let mut out = String::from("Single USRP:\n");
        out.push_str(&format!(
            "  Device: B-Series Device (simulated, serial {})\n",
            self.device.serial()
        ));
        out.push_str(&format!("  Mboard 0: {}\n", self.device.mboard_name));
        for dir in [Direction::Rx, Direction::Tx] {
            for (i, chain) in self.chains(dir).iter().enumerate() {
                out.push_str(&format!("  {dir} Channel: {i}\n"));
                out.push_str(&format!("    {dir} DSP: {i}\n"));
                out.push_str(&format!("    {dir} Dboard: {}\n", chain.subdev.0));
                out.push_str(&format!("    {dir} Subdev: {}\n", chain.subdev_name()));
            }
        }
        out
    }
}

fn bad_channel(dir: Direction, chan: usize) -> Fault {
    Fault::index(format!("{dir} channel index out of range: {chan}"))
}

pub fn parse_subdev(markup: &str) -> Vec<(String, String)> {
    markup
        .split_whitespace()
        .map(|entry| match entry.split_once(':') {
            Some((db, sd)) => (db.to_string(), sd.to_string()),
            None => (entry.to_string(), String::new()),
        })
        .collect()
}

pub fn subdev_markup(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(db, sd)| format!("{db}:{sd}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn subdev_pp_string(pairs: &[(String, String)]) -> String {
    let mut out = String::from("Subdevice Specification:");
    if pairs.is_empty() {
        out.push_str("\n    Empty");
    }
    for (i, (db, sd)) in pairs.iter().enumerate() {
        out.push_str(&format!(
            "\n    Channel {i}: Daughterboard {db}, Subdevice {sd}"
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn chain() -> Chain {
        Chain::new(Direction::Rx, 0)
    }

    #[test]
    fn test_tune_auto_splits_stages() {
        let mut c = chain();
        let res = c.tune(&TuneRequest::new(100.0004e6));
        assert_relative_eq!(res.actual_rf_freq, 100e6);
        assert_relative_eq!(res.target_dsp_freq, 400.0, epsilon = 1e-6);
        assert_relative_eq!(c.freq(), 100.0004e6, epsilon = 1e-3);
    }

    #[test]
    fn test_tune_lo_offset_clips_dsp() {
        let mut c = chain();
        c.set_rate(1e6);
        let res = c.tune(&TuneRequest::with_lo_offset(2.4e9, 2e6));
        assert_relative_eq!(res.actual_rf_freq, 2.402e9);
        // -2 MHz does not fit in a 1 MHz passband.
        assert_relative_eq!(res.actual_dsp_freq, -0.5e6, epsilon = 1e-3);
    }

    #[test]
    fn test_tune_none_keeps_state() {
        let mut c = chain();
        c.tune(&TuneRequest::new(915e6));
        let before = (c.rf_freq, c.dsp_freq);
        let req = TuneRequest::new(2e9)
            .rf(TunePolicy::None, 0.0)
            .dsp(TunePolicy::None, 0.0);
        c.tune(&req);
        assert_eq!((c.rf_freq, c.dsp_freq), before);
    }

    #[test]
    fn test_tune_clips_to_front_end() {
        let mut c = chain();
        let res = c.tune(&TuneRequest::new(10e6));
        assert_relative_eq!(res.clipped_rf_freq, 70e6);
        assert_relative_eq!(res.target_rf_freq, 10e6);
    }

    #[test]
    fn test_gain_snaps_to_step() {
        let mut c = Chain::new(Direction::Tx, 0);
        c.set_gain("", 10.1).unwrap();
        assert_relative_eq!(c.overall_gain(), 10.0);
        c.set_gain(GAIN_STAGE, 200.0).unwrap();
        assert_relative_eq!(c.overall_gain(), 89.75);
        assert!(c.set_gain("LNA", 1.0).is_err());
        assert!(c.set_normalized_gain(1.5).is_err());
        c.set_normalized_gain(0.0).unwrap();
        assert_relative_eq!(c.normalized_gain(), 0.0);
    }

    #[test]
    fn test_subdev_markup() {
        let pairs = parse_subdev("A:A  A:B");
        assert_eq!(pairs.len(), 2);
        assert_eq!(subdev_markup(&pairs), "A:A A:B");
        assert!(subdev_pp_string(&pairs).contains("Channel 1: Daughterboard A, Subdevice B"));
    }

    #[test]
    fn test_set_subdev_resizes() {
        let mut s = Session::new(SimDevice::b210("X"));
        s.set_subdev(Direction::Rx, &parse_subdev("A:B")).unwrap();
        assert_eq!(s.rx.len(), 1);
        assert_eq!(s.rx[0].subdev_name(), "FE-RX2");
        assert!(s.set_subdev(Direction::Rx, &parse_subdev("B:A")).is_err());
        assert!(s.set_subdev(Direction::Rx, &[]).is_err());
    }
}
