//! Device sessions.
//!
//! [`Usrp`] owns one opened device. Every call goes straight to the driver;
//! nothing is cached on this side, so getters always report what the device
//! currently uses.
//!
//! Calls that exist once per signal path take a [`Direction`]. Setters that
//! can address every channel or motherboard at once take a [`Channel`] or
//! [`Mboard`]; getters take a plain index.

use std::sync::Arc;

use uhd_driver::handle;
use uhd_driver::{
    ALL_CHANS, ALL_MBOARDS, ChainInfo, Direction, Driver, MetaRange, StreamArgs, TimeSpec,
    TuneRequest, TuneResult,
};

use crate::error::{Result, no_nul};
use crate::handle::Owned;
use crate::range::read_meta_range;
use crate::rx::RxStreamer;
use crate::sample::Sample;
use crate::sensor::{SensorValue, SubdevSpec, read_sensor, read_strings};
use crate::tx::TxStreamer;

/// Channel selector for setters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Index(usize),
    All,
}

impl Channel {
    pub(crate) fn raw(self) -> usize {
        match self {
            Channel::Index(chan) => chan,
            Channel::All => ALL_CHANS,
        }
    }
}

impl Default for Channel {
    fn default() -> Self {
        Channel::Index(0)
    }
}

impl From<usize> for Channel {
    fn from(chan: usize) -> Self {
        Channel::Index(chan)
    }
}

/// Motherboard selector for setters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mboard {
    Index(usize),
    All,
}

impl Mboard {
    pub(crate) fn raw(self) -> usize {
        match self {
            Mboard::Index(mboard) => mboard,
            Mboard::All => ALL_MBOARDS,
        }
    }
}

impl Default for Mboard {
    fn default() -> Self {
        Mboard::Index(0)
    }
}

impl From<usize> for Mboard {
    fn from(mboard: usize) -> Self {
        Mboard::Index(mboard)
    }
}

/// An opened device.
#[derive(Debug)]
pub struct Usrp {
    handle: Owned<handle::Usrp>,
}

impl Usrp {
    pub(crate) fn open(driver: &Arc<dyn Driver>, args: &str) -> Result<Self> {
        no_nul(args)?;
        tracing::info!("opening device '{args}'");
        let handle = Owned::make(driver, |d, out| d.usrp_make(out, args))?;
        Ok(Self { handle })
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        self.handle.driver()
    }

    // Streams

    /// Build a receive streamer delivering samples of type `T`.
    ///
    /// The CPU format follows from `T`; leave it empty in `args` or set it to
    /// the matching name. An empty channel list means channel 0.
    pub fn rx_stream<T: Sample>(&self, args: StreamArgs) -> Result<RxStreamer<T>> {
        RxStreamer::bind(&self.handle, args)
    }

    /// Build a transmit streamer taking samples of type `T`.
    pub fn tx_stream<T: Sample>(&self, args: StreamArgs) -> Result<TxStreamer<T>> {
        TxStreamer::bind(&self.handle, args)
    }

    // Info

    pub fn info(&self, dir: Direction, chan: usize) -> Result<ChainInfo> {
        self.handle.read(|d, h, out| d.usrp_info(h, dir, chan, out))
    }

    pub fn pp_string(&self) -> Result<String> {
        self.handle.read_string(|d, h, buf| d.usrp_pp_string(h, buf))
    }

    pub fn mboard_name(&self, mboard: usize) -> Result<String> {
        self.handle.read_string(|d, h, buf| d.usrp_mboard_name(h, mboard, buf))
    }

    pub fn num_mboards(&self) -> Result<usize> {
        self.handle.read(|d, h, out| d.usrp_num_mboards(h, out))
    }

    // Clocking and time

    pub fn set_master_clock_rate(&self, rate: f64, mboard: impl Into<Mboard>) -> Result<()> {
        let mboard = mboard.into().raw();
        self.handle.call(|d, h| d.usrp_set_master_clock_rate(h, rate, mboard))
    }

    pub fn master_clock_rate(&self, mboard: usize) -> Result<f64> {
        self.handle.read(|d, h, out| d.usrp_master_clock_rate(h, mboard, out))
    }

    pub fn time_now(&self, mboard: usize) -> Result<TimeSpec> {
        self.handle.read(|d, h, out| d.usrp_time_now(h, mboard, out))
    }

    pub fn time_last_pps(&self, mboard: usize) -> Result<TimeSpec> {
        self.handle.read(|d, h, out| d.usrp_time_last_pps(h, mboard, out))
    }

    pub fn set_time_now(&self, time: TimeSpec, mboard: impl Into<Mboard>) -> Result<()> {
        let mboard = mboard.into().raw();
        self.handle.call(|d, h| d.usrp_set_time_now(h, time, mboard))
    }

    /// Latch `time` into the device clock on the next PPS edge.
    pub fn set_time_next_pps(&self, time: TimeSpec, mboard: impl Into<Mboard>) -> Result<()> {
        let mboard = mboard.into().raw();
        self.handle.call(|d, h| d.usrp_set_time_next_pps(h, time, mboard))
    }

    pub fn set_time_unknown_pps(&self, time: TimeSpec) -> Result<()> {
        self.handle.call(|d, h| d.usrp_set_time_unknown_pps(h, time))
    }

    pub fn time_synchronized(&self) -> Result<bool> {
        self.handle.read(|d, h, out| d.usrp_time_synchronized(h, out))
    }

    /// Apply subsequent configuration calls at device time `time`.
    pub fn set_command_time(&self, time: TimeSpec, mboard: impl Into<Mboard>) -> Result<()> {
        let mboard = mboard.into().raw();
        self.handle.call(|d, h| d.usrp_set_command_time(h, time, mboard))
    }

    pub fn clear_command_time(&self, mboard: impl Into<Mboard>) -> Result<()> {
        let mboard = mboard.into().raw();
        self.handle.call(|d, h| d.usrp_clear_command_time(h, mboard))
    }

    pub fn set_time_source(&self, source: &str, mboard: impl Into<Mboard>) -> Result<()> {
        no_nul(source)?;
        let mboard = mboard.into().raw();
        self.handle.call(|d, h| d.usrp_set_time_source(h, source, mboard))
    }

    pub fn time_source(&self, mboard: usize) -> Result<String> {
        self.handle.read_string(|d, h, buf| d.usrp_time_source(h, mboard, buf))
    }

    pub fn time_sources(&self, mboard: usize) -> Result<Vec<String>> {
        read_strings(&self.handle, |d, h, out| d.usrp_time_sources(h, mboard, out))
    }

    pub fn set_clock_source(&self, source: &str, mboard: impl Into<Mboard>) -> Result<()> {
        no_nul(source)?;
        let mboard = mboard.into().raw();
        self.handle.call(|d, h| d.usrp_set_clock_source(h, source, mboard))
    }

    pub fn clock_source(&self, mboard: usize) -> Result<String> {
        self.handle.read_string(|d, h, buf| d.usrp_clock_source(h, mboard, buf))
    }

    pub fn clock_sources(&self, mboard: usize) -> Result<Vec<String>> {
        read_strings(&self.handle, |d, h, out| d.usrp_clock_sources(h, mboard, out))
    }

    pub fn set_clock_source_out(&self, enable: bool, mboard: impl Into<Mboard>) -> Result<()> {
        let mboard = mboard.into().raw();
        self.handle.call(|d, h| d.usrp_set_clock_source_out(h, enable, mboard))
    }

    pub fn set_time_source_out(&self, enable: bool, mboard: impl Into<Mboard>) -> Result<()> {
        let mboard = mboard.into().raw();
        self.handle.call(|d, h| d.usrp_set_time_source_out(h, enable, mboard))
    }

    pub fn mboard_sensor(&self, name: &str, mboard: usize) -> Result<SensorValue> {
        no_nul(name)?;
        read_sensor(&self.handle, |d, h, out| d.usrp_mboard_sensor(h, name, mboard, out))
    }

    pub fn mboard_sensor_names(&self, mboard: usize) -> Result<Vec<String>> {
        read_strings(&self.handle, |d, h, out| d.usrp_mboard_sensor_names(h, mboard, out))
    }

    pub fn set_user_register(&self, addr: u8, data: u32, mboard: impl Into<Mboard>) -> Result<()> {
        let mboard = mboard.into().raw();
        self.handle.call(|d, h| d.usrp_set_user_register(h, addr, data, mboard))
    }

    // Front-end mapping

    pub fn set_subdev_spec(
        &self,
        dir: Direction,
        spec: &SubdevSpec,
        mboard: impl Into<Mboard>,
    ) -> Result<()> {
        let mboard = mboard.into().raw();
        self.handle.call(|d, h| d.usrp_set_subdev_spec(h, dir, spec.raw(), mboard))
    }

    pub fn subdev_spec(&self, dir: Direction, mboard: usize) -> Result<SubdevSpec> {
        let spec = SubdevSpec::new(self.driver(), "")?;
        self.handle.call(|d, h| d.usrp_subdev_spec(h, dir, mboard, spec.raw()))?;
        Ok(spec)
    }

    pub fn num_channels(&self, dir: Direction) -> Result<usize> {
        self.handle.read(|d, h, out| d.usrp_num_channels(h, dir, out))
    }

    pub fn subdev_name(&self, dir: Direction, chan: usize) -> Result<String> {
        self.handle.read_string(|d, h, buf| d.usrp_subdev_name(h, dir, chan, buf))
    }

    // Sample rate

    pub fn set_rate(&self, dir: Direction, rate: f64, chan: impl Into<Channel>) -> Result<()> {
        let chan = chan.into().raw();
        tracing::debug!("{dir} rate {rate} on channel {chan:#x}");
        self.handle.call(|d, h| d.usrp_set_rate(h, dir, rate, chan))
    }

    pub fn rate(&self, dir: Direction, chan: usize) -> Result<f64> {
        self.handle.read(|d, h, out| d.usrp_rate(h, dir, chan, out))
    }

    pub fn rates(&self, dir: Direction, chan: usize) -> Result<MetaRange> {
        read_meta_range(&self.handle, |d, h, out| d.usrp_rates(h, dir, chan, out))
    }

    // Frequency

    /// Tune one channel and report what each stage ended up at.
    pub fn set_freq(
        &self,
        dir: Direction,
        request: &TuneRequest,
        chan: usize,
    ) -> Result<TuneResult> {
        no_nul(request.args.as_str())?;
        tracing::debug!("{dir} tune channel {chan}: {request:?}");
        self.handle.read(|d, h, out| d.usrp_set_freq(h, dir, request, chan, out))
    }

    pub fn freq(&self, dir: Direction, chan: usize) -> Result<f64> {
        self.handle.read(|d, h, out| d.usrp_freq(h, dir, chan, out))
    }

    /// Tunable range of the whole chain, DSP included.
    pub fn freq_range(&self, dir: Direction, chan: usize) -> Result<MetaRange> {
        read_meta_range(&self.handle, |d, h, out| d.usrp_freq_range(h, dir, chan, out))
    }

    /// Tunable range of the RF front end alone.
    pub fn fe_freq_range(&self, dir: Direction, chan: usize) -> Result<MetaRange> {
        read_meta_range(&self.handle, |d, h, out| d.usrp_fe_freq_range(h, dir, chan, out))
    }

    // Local oscillators

    pub fn lo_names(&self, dir: Direction, chan: usize) -> Result<Vec<String>> {
        read_strings(&self.handle, |d, h, out| d.usrp_lo_names(h, dir, chan, out))
    }

    pub fn set_lo_source(
        &self,
        dir: Direction,
        source: &str,
        name: &str,
        chan: impl Into<Channel>,
    ) -> Result<()> {
        no_nul(source)?;
        no_nul(name)?;
        let chan = chan.into().raw();
        self.handle.call(|d, h| d.usrp_set_lo_source(h, dir, source, name, chan))
    }

    pub fn lo_source(&self, dir: Direction, name: &str, chan: usize) -> Result<String> {
        no_nul(name)?;
        self.handle.read_string(|d, h, buf| d.usrp_lo_source(h, dir, name, chan, buf))
    }

    pub fn lo_sources(&self, dir: Direction, name: &str, chan: usize) -> Result<Vec<String>> {
        no_nul(name)?;
        read_strings(&self.handle, |d, h, out| d.usrp_lo_sources(h, dir, name, chan, out))
    }

    pub fn set_lo_export_enabled(
        &self,
        dir: Direction,
        enabled: bool,
        name: &str,
        chan: impl Into<Channel>,
    ) -> Result<()> {
        no_nul(name)?;
        let chan = chan.into().raw();
        self.handle.call(|d, h| d.usrp_set_lo_export_enabled(h, dir, enabled, name, chan))
    }

    pub fn lo_export_enabled(&self, dir: Direction, name: &str, chan: usize) -> Result<bool> {
        no_nul(name)?;
        self.handle.read(|d, h, out| d.usrp_lo_export_enabled(h, dir, name, chan, out))
    }

    /// Set an LO frequency, returning the frequency it was coerced to.
    pub fn set_lo_freq(&self, dir: Direction, freq: f64, name: &str, chan: usize) -> Result<f64> {
        no_nul(name)?;
        self.handle.read(|d, h, out| d.usrp_set_lo_freq(h, dir, freq, name, chan, out))
    }

    pub fn lo_freq(&self, dir: Direction, name: &str, chan: usize) -> Result<f64> {
        no_nul(name)?;
        self.handle.read(|d, h, out| d.usrp_lo_freq(h, dir, name, chan, out))
    }

    // Gain

    /// Set a gain stage by name; an empty name distributes over all stages.
    pub fn set_gain(
        &self,
        dir: Direction,
        gain: f64,
        name: &str,
        chan: impl Into<Channel>,
    ) -> Result<()> {
        no_nul(name)?;
        let chan = chan.into().raw();
        tracing::debug!("{dir} gain {gain} dB ('{name}') on channel {chan:#x}");
        self.handle.call(|d, h| d.usrp_set_gain(h, dir, gain, chan, name))
    }

    /// Set the overall gain as a fraction of its range, in `[0, 1]`.
    pub fn set_normalized_gain(
        &self,
        dir: Direction,
        gain: f64,
        chan: impl Into<Channel>,
    ) -> Result<()> {
        let chan = chan.into().raw();
        self.handle.call(|d, h| d.usrp_set_normalized_gain(h, dir, gain, chan))
    }

    pub fn gain(&self, dir: Direction, name: &str, chan: usize) -> Result<f64> {
        no_nul(name)?;
        self.handle.read(|d, h, out| d.usrp_gain(h, dir, chan, name, out))
    }

    pub fn normalized_gain(&self, dir: Direction, chan: usize) -> Result<f64> {
        self.handle.read(|d, h, out| d.usrp_normalized_gain(h, dir, chan, out))
    }

    pub fn gain_range(&self, dir: Direction, name: &str, chan: usize) -> Result<MetaRange> {
        no_nul(name)?;
        read_meta_range(&self.handle, |d, h, out| d.usrp_gain_range(h, dir, name, chan, out))
    }

    pub fn gain_names(&self, dir: Direction, chan: usize) -> Result<Vec<String>> {
        read_strings(&self.handle, |d, h, out| d.usrp_gain_names(h, dir, chan, out))
    }

    // Antenna

    pub fn set_antenna(
        &self,
        dir: Direction,
        antenna: &str,
        chan: impl Into<Channel>,
    ) -> Result<()> {
        no_nul(antenna)?;
        let chan = chan.into().raw();
        self.handle.call(|d, h| d.usrp_set_antenna(h, dir, antenna, chan))
    }

    pub fn antenna(&self, dir: Direction, chan: usize) -> Result<String> {
        self.handle.read_string(|d, h, buf| d.usrp_antenna(h, dir, chan, buf))
    }

    pub fn antennas(&self, dir: Direction, chan: usize) -> Result<Vec<String>> {
        read_strings(&self.handle, |d, h, out| d.usrp_antennas(h, dir, chan, out))
    }

    // Bandwidth

    pub fn set_bandwidth(
        &self,
        dir: Direction,
        bandwidth: f64,
        chan: impl Into<Channel>,
    ) -> Result<()> {
        let chan = chan.into().raw();
        self.handle.call(|d, h| d.usrp_set_bandwidth(h, dir, bandwidth, chan))
    }

    pub fn bandwidth(&self, dir: Direction, chan: usize) -> Result<f64> {
        self.handle.read(|d, h, out| d.usrp_bandwidth(h, dir, chan, out))
    }

    pub fn bandwidth_range(&self, dir: Direction, chan: usize) -> Result<MetaRange> {
        read_meta_range(&self.handle, |d, h, out| d.usrp_bandwidth_range(h, dir, chan, out))
    }

    // Sensors

    pub fn sensor(&self, dir: Direction, name: &str, chan: usize) -> Result<SensorValue> {
        no_nul(name)?;
        read_sensor(&self.handle, |d, h, out| d.usrp_sensor(h, dir, name, chan, out))
    }

    pub fn sensor_names(&self, dir: Direction, chan: usize) -> Result<Vec<String>> {
        read_strings(&self.handle, |d, h, out| d.usrp_sensor_names(h, dir, chan, out))
    }

    // RX front-end corrections

    pub fn set_rx_agc(&self, enable: bool, chan: impl Into<Channel>) -> Result<()> {
        let chan = chan.into().raw();
        self.handle.call(|d, h| d.usrp_set_rx_agc(h, enable, chan))
    }

    pub fn set_rx_dc_offset_enabled(&self, enable: bool, chan: impl Into<Channel>) -> Result<()> {
        let chan = chan.into().raw();
        self.handle.call(|d, h| d.usrp_set_rx_dc_offset_enabled(h, enable, chan))
    }

    pub fn set_rx_iq_balance_enabled(&self, enable: bool, chan: impl Into<Channel>) -> Result<()> {
        let chan = chan.into().raw();
        self.handle.call(|d, h| d.usrp_set_rx_iq_balance_enabled(h, enable, chan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectors() {
        assert_eq!(Channel::from(3).raw(), 3);
        assert_eq!(Channel::All.raw(), ALL_CHANS);
        assert_eq!(Channel::default(), Channel::Index(0));
        assert_eq!(Mboard::from(0).raw(), 0);
        assert_eq!(Mboard::All.raw(), ALL_MBOARDS);
    }
}
