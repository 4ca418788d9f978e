//! The procedural driver boundary.
//!
//! [`Driver`] mirrors the C API of the device library one call at a time:
//! every method reports a [`Status`], values come back through `&mut`
//! out-parameters, strings are written NUL-terminated into a caller buffer and
//! list results are written into handles the caller created beforehand.
//! Calls that exist once per signal path take a [`Direction`].
//!
//! Nothing here owns anything. Pairing `*_make` with [`Driver::free`] is the
//! caller's job.

use crate::handle::{
    AnyRaw, AsyncMetadata, MetaRange, Raw, RxMetadata, RxStreamer, SensorValue, StringVector,
    SubdevSpec, TxMetadata, TxStreamer, Usrp,
};
use crate::range::Range;
use crate::status::Status;
use crate::types::{
    ChainInfo, Direction, SensorType, StreamArgs, StreamCmd, TimeSpec, TuneRequest, TuneResult,
    UserPayload,
};

pub type Out<'a, K> = &'a mut Option<Raw<K>>;

pub trait Driver: Send + Sync {
    // Library

    /// Diagnostic of the last failed call made on this thread without a handle.
    fn last_error(&self, buf: &mut [u8]) -> Status;
    fn version_string(&self, buf: &mut [u8]) -> Status;
    fn abi_string(&self, buf: &mut [u8]) -> Status;
    fn set_thread_priority(&self, priority: f32, realtime: bool) -> Status;

    /// Release any handle. The handle must not be used afterwards.
    fn free(&self, handle: AnyRaw) -> Status;
    /// Diagnostic of the last failed call made on `handle`.
    fn handle_last_error(&self, handle: AnyRaw, buf: &mut [u8]) -> Status;

    // String vector

    fn string_vector_make(&self, out: Out<'_, StringVector>) -> Status;
    fn string_vector_push_back(&self, h: Raw<StringVector>, value: &str) -> Status;
    fn string_vector_at(&self, h: Raw<StringVector>, index: usize, buf: &mut [u8]) -> Status;
    fn string_vector_size(&self, h: Raw<StringVector>, out: &mut usize) -> Status;

    // Meta range

    fn meta_range_make(&self, out: Out<'_, MetaRange>) -> Status;
    fn meta_range_push_back(&self, h: Raw<MetaRange>, range: &Range) -> Status;
    fn meta_range_at(&self, h: Raw<MetaRange>, index: usize, out: &mut Range) -> Status;
    fn meta_range_size(&self, h: Raw<MetaRange>, out: &mut usize) -> Status;
    fn meta_range_start(&self, h: Raw<MetaRange>, out: &mut f64) -> Status;
    fn meta_range_stop(&self, h: Raw<MetaRange>, out: &mut f64) -> Status;
    fn meta_range_step(&self, h: Raw<MetaRange>, out: &mut f64) -> Status;
    fn meta_range_clip(&self, h: Raw<MetaRange>, value: f64, clip_step: bool, out: &mut f64)
    -> Status;
    fn meta_range_to_pp_string(&self, h: Raw<MetaRange>, buf: &mut [u8]) -> Status;

    // Sensor value

    fn sensor_value_make(&self, out: Out<'_, SensorValue>) -> Status;
    fn sensor_value_make_from_bool(
        &self,
        out: Out<'_, SensorValue>,
        name: &str,
        value: bool,
        utrue: &str,
        ufalse: &str,
    ) -> Status;
    fn sensor_value_make_from_int(
        &self,
        out: Out<'_, SensorValue>,
        name: &str,
        value: i32,
        unit: &str,
        formatter: &str,
    ) -> Status;
    fn sensor_value_make_from_realnum(
        &self,
        out: Out<'_, SensorValue>,
        name: &str,
        value: f64,
        unit: &str,
        formatter: &str,
    ) -> Status;
    fn sensor_value_make_from_string(
        &self,
        out: Out<'_, SensorValue>,
        name: &str,
        value: &str,
        unit: &str,
    ) -> Status;
    fn sensor_value_to_bool(&self, h: Raw<SensorValue>, out: &mut bool) -> Status;
    fn sensor_value_to_int(&self, h: Raw<SensorValue>, out: &mut i32) -> Status;
    fn sensor_value_to_realnum(&self, h: Raw<SensorValue>, out: &mut f64) -> Status;
    fn sensor_value_name(&self, h: Raw<SensorValue>, buf: &mut [u8]) -> Status;
    fn sensor_value_value(&self, h: Raw<SensorValue>, buf: &mut [u8]) -> Status;
    fn sensor_value_unit(&self, h: Raw<SensorValue>, buf: &mut [u8]) -> Status;
    fn sensor_value_data_type(&self, h: Raw<SensorValue>, out: &mut SensorType) -> Status;
    fn sensor_value_to_pp_string(&self, h: Raw<SensorValue>, buf: &mut [u8]) -> Status;

    // Sub-device specification

    fn subdev_spec_make(&self, out: Out<'_, SubdevSpec>, markup: &str) -> Status;
    fn subdev_spec_push_back(&self, h: Raw<SubdevSpec>, markup: &str) -> Status;
    fn subdev_spec_size(&self, h: Raw<SubdevSpec>, out: &mut usize) -> Status;
    /// Daughterboard and sub-device names of one entry.
    fn subdev_spec_at(
        &self,
        h: Raw<SubdevSpec>,
        index: usize,
        db_name: &mut [u8],
        sd_name: &mut [u8],
    ) -> Status;
    fn subdev_spec_to_pp_string(&self, h: Raw<SubdevSpec>, buf: &mut [u8]) -> Status;
    fn subdev_spec_to_string(&self, h: Raw<SubdevSpec>, buf: &mut [u8]) -> Status;

    // RX metadata

    fn rx_metadata_make(&self, out: Out<'_, RxMetadata>) -> Status;
    fn rx_metadata_has_time_spec(&self, h: Raw<RxMetadata>, out: &mut bool) -> Status;
    fn rx_metadata_time_spec(&self, h: Raw<RxMetadata>, out: &mut TimeSpec) -> Status;
    fn rx_metadata_more_fragments(&self, h: Raw<RxMetadata>, out: &mut bool) -> Status;
    fn rx_metadata_fragment_offset(&self, h: Raw<RxMetadata>, out: &mut usize) -> Status;
    fn rx_metadata_start_of_burst(&self, h: Raw<RxMetadata>, out: &mut bool) -> Status;
    fn rx_metadata_end_of_burst(&self, h: Raw<RxMetadata>, out: &mut bool) -> Status;
    fn rx_metadata_out_of_sequence(&self, h: Raw<RxMetadata>, out: &mut bool) -> Status;
    /// Raw `RxErrorCode` value.
    fn rx_metadata_error_code(&self, h: Raw<RxMetadata>, out: &mut u32) -> Status;
    fn rx_metadata_to_pp_string(&self, h: Raw<RxMetadata>, buf: &mut [u8]) -> Status;
    fn rx_metadata_strerror(&self, h: Raw<RxMetadata>, buf: &mut [u8]) -> Status;

    // TX metadata

    fn tx_metadata_make(
        &self,
        out: Out<'_, TxMetadata>,
        has_time_spec: bool,
        time_spec: TimeSpec,
        start_of_burst: bool,
        end_of_burst: bool,
    ) -> Status;
    fn tx_metadata_has_time_spec(&self, h: Raw<TxMetadata>, out: &mut bool) -> Status;
    fn tx_metadata_time_spec(&self, h: Raw<TxMetadata>, out: &mut TimeSpec) -> Status;
    fn tx_metadata_start_of_burst(&self, h: Raw<TxMetadata>, out: &mut bool) -> Status;
    fn tx_metadata_end_of_burst(&self, h: Raw<TxMetadata>, out: &mut bool) -> Status;

    // Async metadata

    fn async_metadata_make(&self, out: Out<'_, AsyncMetadata>) -> Status;
    fn async_metadata_channel(&self, h: Raw<AsyncMetadata>, out: &mut usize) -> Status;
    fn async_metadata_has_time_spec(&self, h: Raw<AsyncMetadata>, out: &mut bool) -> Status;
    fn async_metadata_time_spec(&self, h: Raw<AsyncMetadata>, out: &mut TimeSpec) -> Status;
    /// Raw `AsyncEventCode` bits.
    fn async_metadata_event_code(&self, h: Raw<AsyncMetadata>, out: &mut u32) -> Status;
    fn async_metadata_user_payload(&self, h: Raw<AsyncMetadata>, out: &mut UserPayload)
    -> Status;

    // RX streamer

    fn rx_streamer_make(&self, out: Out<'_, RxStreamer>) -> Status;
    fn rx_streamer_num_channels(&self, h: Raw<RxStreamer>, out: &mut usize) -> Status;
    fn rx_streamer_max_num_samps(&self, h: Raw<RxStreamer>, out: &mut usize) -> Status;
    /// Receive up to `samps_per_buff` samples into each channel buffer.
    ///
    /// Buffers are raw bytes in the streamer's CPU format and hold at least
    /// `samps_per_buff` samples each.
    #[allow(clippy::too_many_arguments)]
    fn rx_streamer_recv(
        &self,
        h: Raw<RxStreamer>,
        buffs: &mut [&mut [u8]],
        samps_per_buff: usize,
        md: Raw<RxMetadata>,
        timeout: f64,
        one_packet: bool,
        items_recvd: &mut usize,
    ) -> Status;
    fn rx_streamer_issue_stream_cmd(&self, h: Raw<RxStreamer>, cmd: &StreamCmd) -> Status;

    // TX streamer

    fn tx_streamer_make(&self, out: Out<'_, TxStreamer>) -> Status;
    fn tx_streamer_num_channels(&self, h: Raw<TxStreamer>, out: &mut usize) -> Status;
    fn tx_streamer_max_num_samps(&self, h: Raw<TxStreamer>, out: &mut usize) -> Status;
    fn tx_streamer_send(
        &self,
        h: Raw<TxStreamer>,
        buffs: &[&[u8]],
        samps_per_buff: usize,
        md: Raw<TxMetadata>,
        timeout: f64,
        items_sent: &mut usize,
    ) -> Status;
    /// Wait up to `timeout` seconds for a transmit-path event.
    fn tx_streamer_recv_async_msg(
        &self,
        h: Raw<TxStreamer>,
        md: Raw<AsyncMetadata>,
        timeout: f64,
        valid: &mut bool,
    ) -> Status;

    // USRP session

    fn usrp_find(&self, args: &str, out: Raw<StringVector>) -> Status;
    fn usrp_make(&self, out: Out<'_, Usrp>, args: &str) -> Status;
    /// Bind an already made streamer to the session.
    fn usrp_get_rx_stream(&self, h: Raw<Usrp>, args: &StreamArgs, out: Raw<RxStreamer>)
    -> Status;
    fn usrp_get_tx_stream(&self, h: Raw<Usrp>, args: &StreamArgs, out: Raw<TxStreamer>)
    -> Status;
    fn usrp_info(&self, h: Raw<Usrp>, dir: Direction, chan: usize, out: &mut ChainInfo)
    -> Status;
    fn usrp_pp_string(&self, h: Raw<Usrp>, buf: &mut [u8]) -> Status;
    fn usrp_mboard_name(&self, h: Raw<Usrp>, mboard: usize, buf: &mut [u8]) -> Status;
    fn usrp_num_mboards(&self, h: Raw<Usrp>, out: &mut usize) -> Status;

    fn usrp_set_master_clock_rate(&self, h: Raw<Usrp>, rate: f64, mboard: usize) -> Status;
    fn usrp_master_clock_rate(&self, h: Raw<Usrp>, mboard: usize, out: &mut f64) -> Status;

    fn usrp_time_now(&self, h: Raw<Usrp>, mboard: usize, out: &mut TimeSpec) -> Status;
    fn usrp_time_last_pps(&self, h: Raw<Usrp>, mboard: usize, out: &mut TimeSpec) -> Status;
    fn usrp_set_time_now(&self, h: Raw<Usrp>, time: TimeSpec, mboard: usize) -> Status;
    fn usrp_set_time_next_pps(&self, h: Raw<Usrp>, time: TimeSpec, mboard: usize) -> Status;
    fn usrp_set_time_unknown_pps(&self, h: Raw<Usrp>, time: TimeSpec) -> Status;
    fn usrp_time_synchronized(&self, h: Raw<Usrp>, out: &mut bool) -> Status;
    fn usrp_set_command_time(&self, h: Raw<Usrp>, time: TimeSpec, mboard: usize) -> Status;
    fn usrp_clear_command_time(&self, h: Raw<Usrp>, mboard: usize) -> Status;

    fn usrp_set_time_source(&self, h: Raw<Usrp>, source: &str, mboard: usize) -> Status;
    fn usrp_time_source(&self, h: Raw<Usrp>, mboard: usize, buf: &mut [u8]) -> Status;
    fn usrp_time_sources(&self, h: Raw<Usrp>, mboard: usize, out: Raw<StringVector>) -> Status;
    fn usrp_set_clock_source(&self, h: Raw<Usrp>, source: &str, mboard: usize) -> Status;
    fn usrp_clock_source(&self, h: Raw<Usrp>, mboard: usize, buf: &mut [u8]) -> Status;
    fn usrp_clock_sources(&self, h: Raw<Usrp>, mboard: usize, out: Raw<StringVector>)
    -> Status;
    fn usrp_set_clock_source_out(&self, h: Raw<Usrp>, enable: bool, mboard: usize) -> Status;
    fn usrp_set_time_source_out(&self, h: Raw<Usrp>, enable: bool, mboard: usize) -> Status;

    fn usrp_mboard_sensor(
        &self,
        h: Raw<Usrp>,
        name: &str,
        mboard: usize,
        out: Raw<SensorValue>,
    ) -> Status;
    fn usrp_mboard_sensor_names(
        &self,
        h: Raw<Usrp>,
        mboard: usize,
        out: Raw<StringVector>,
    ) -> Status;
    fn usrp_set_user_register(&self, h: Raw<Usrp>, addr: u8, data: u32, mboard: usize)
    -> Status;

    // Per direction

    fn usrp_set_subdev_spec(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        spec: Raw<SubdevSpec>,
        mboard: usize,
    ) -> Status;
    fn usrp_subdev_spec(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        mboard: usize,
        out: Raw<SubdevSpec>,
    ) -> Status;
    fn usrp_num_channels(&self, h: Raw<Usrp>, dir: Direction, out: &mut usize) -> Status;
    fn usrp_subdev_name(&self, h: Raw<Usrp>, dir: Direction, chan: usize, buf: &mut [u8])
    -> Status;

    fn usrp_set_rate(&self, h: Raw<Usrp>, dir: Direction, rate: f64, chan: usize) -> Status;
    fn usrp_rate(&self, h: Raw<Usrp>, dir: Direction, chan: usize, out: &mut f64) -> Status;
    fn usrp_rates(&self, h: Raw<Usrp>, dir: Direction, chan: usize, out: Raw<MetaRange>)
    -> Status;

    fn usrp_set_freq(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        request: &TuneRequest,
        chan: usize,
        result: &mut TuneResult,
    ) -> Status;
    fn usrp_freq(&self, h: Raw<Usrp>, dir: Direction, chan: usize, out: &mut f64) -> Status;
    fn usrp_freq_range(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<MetaRange>,
    ) -> Status;
    fn usrp_fe_freq_range(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<MetaRange>,
    ) -> Status;

    fn usrp_lo_names(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<StringVector>,
    ) -> Status;
    fn usrp_set_lo_source(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        source: &str,
        name: &str,
        chan: usize,
    ) -> Status;
    fn usrp_lo_source(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        name: &str,
        chan: usize,
        buf: &mut [u8],
    ) -> Status;
    fn usrp_lo_sources(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        name: &str,
        chan: usize,
        out: Raw<StringVector>,
    ) -> Status;
    fn usrp_set_lo_export_enabled(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        enabled: bool,
        name: &str,
        chan: usize,
    ) -> Status;
    fn usrp_lo_export_enabled(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        name: &str,
        chan: usize,
        out: &mut bool,
    ) -> Status;
    /// Returns the frequency the LO was coerced to in `coerced`.
    fn usrp_set_lo_freq(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        freq: f64,
        name: &str,
        chan: usize,
        coerced: &mut f64,
    ) -> Status;
    fn usrp_lo_freq(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        name: &str,
        chan: usize,
        out: &mut f64,
    ) -> Status;

    /// An empty `name` addresses the overall gain.
    fn usrp_set_gain(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        gain: f64,
        chan: usize,
        name: &str,
    ) -> Status;
    fn usrp_set_normalized_gain(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        gain: f64,
        chan: usize,
    ) -> Status;
    fn usrp_gain(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        chan: usize,
        name: &str,
        out: &mut f64,
    ) -> Status;
    fn usrp_normalized_gain(&self, h: Raw<Usrp>, dir: Direction, chan: usize, out: &mut f64)
    -> Status;
    fn usrp_gain_range(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        name: &str,
        chan: usize,
        out: Raw<MetaRange>,
    ) -> Status;
    fn usrp_gain_names(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<StringVector>,
    ) -> Status;

    fn usrp_set_antenna(&self, h: Raw<Usrp>, dir: Direction, antenna: &str, chan: usize)
    -> Status;
    fn usrp_antenna(&self, h: Raw<Usrp>, dir: Direction, chan: usize, buf: &mut [u8]) -> Status;
    fn usrp_antennas(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<StringVector>,
    ) -> Status;

    fn usrp_set_bandwidth(&self, h: Raw<Usrp>, dir: Direction, bandwidth: f64, chan: usize)
    -> Status;
    fn usrp_bandwidth(&self, h: Raw<Usrp>, dir: Direction, chan: usize, out: &mut f64)
    -> Status;
    fn usrp_bandwidth_range(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<MetaRange>,
    ) -> Status;

    fn usrp_sensor(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        name: &str,
        chan: usize,
        out: Raw<SensorValue>,
    ) -> Status;
    fn usrp_sensor_names(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<StringVector>,
    ) -> Status;

    // RX only

    fn usrp_set_rx_agc(&self, h: Raw<Usrp>, enable: bool, chan: usize) -> Status;
    fn usrp_set_rx_dc_offset_enabled(&self, h: Raw<Usrp>, enable: bool, chan: usize) -> Status;
    fn usrp_set_rx_iq_balance_enabled(&self, h: Raw<Usrp>, enable: bool, chan: usize)
    -> Status;
}

/// Copy `value` into `buf` NUL-terminated, truncating on a UTF-8 boundary.
///
/// Shared by the drivers that produce strings themselves.
pub fn write_c_str(buf: &mut [u8], value: &str) {
    let Some(room) = buf.len().checked_sub(1) else {
        return;
    };
    let mut len = value.len().min(room);
    while !value.is_char_boundary(len) {
        len -= 1;
    }
    buf[..len].copy_from_slice(&value.as_bytes()[..len]);
    buf[len] = 0;
}

/// Read the NUL-terminated prefix of `buf`.
pub fn read_c_str(buf: &[u8]) -> &[u8] {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    &buf[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_str_round_trip() {
        let mut buf = [0xffu8; 16];
        write_c_str(&mut buf, "RX2");
        assert_eq!(read_c_str(&buf), b"RX2");
    }

    #[test]
    fn test_c_str_truncates_on_char_boundary() {
        let mut buf = [0u8; 4];
        write_c_str(&mut buf, "aé€");
        assert_eq!(read_c_str(&buf), "aé".as_bytes());
        write_c_str(&mut [], "ignored");
    }
}
