//! Binding to the C API of the system `libuhd`.
//!
//! Handles are the library's opaque pointers stored as integers. Strings
//! passed in are converted to `CString` for the duration of one call; an
//! interior NUL byte fails the call with [`Status::Value`] before reaching
//! the library.

use std::cell::RefCell;
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::ptr::null_mut;

use crate::api::{Driver, Out, write_c_str};
use crate::handle::{
    AnyRaw, AsyncMetadata, HandleKind, Kind, MetaRange, Raw, RxMetadata, RxStreamer, SensorValue,
    StringVector, SubdevSpec, TxMetadata, TxStreamer, Usrp,
};
use crate::range::Range;
use crate::status::Status;
use crate::types::{
    ChainInfo, Direction, SensorType, StreamArgs, StreamCmd, TimeSpec, TuneRequest, TuneResult,
    UserPayload,
};

type Handle = *mut c_void;

/// Channel pointer arrays up to this size live on the stack.
const STACK_CHANNELS: usize = 16;

#[repr(C)]
struct uhd_range_t {
    start: f64,
    stop: f64,
    step: f64,
}

#[repr(C)]
struct uhd_tune_request_t {
    target_freq: f64,
    rf_freq_policy: c_int,
    rf_freq: f64,
    dsp_freq_policy: c_int,
    dsp_freq: f64,
    args: *mut c_char,
}

#[repr(C)]
struct uhd_stream_args_t {
    cpu_format: *mut c_char,
    otw_format: *mut c_char,
    args: *mut c_char,
    channel_list: *mut usize,
    n_channels: c_int,
}

#[repr(C)]
struct uhd_stream_cmd_t {
    stream_mode: c_int,
    num_samps: usize,
    stream_now: bool,
    time_spec_full_secs: i64,
    time_spec_frac_secs: f64,
}

#[repr(C)]
struct uhd_usrp_info_t {
    mboard_id: *mut c_char,
    mboard_name: *mut c_char,
    mboard_serial: *mut c_char,
    id: *mut c_char,
    subdev_name: *mut c_char,
    subdev_spec: *mut c_char,
    serial: *mut c_char,
    antenna: *mut c_char,
}

#[repr(C)]
struct uhd_subdev_spec_pair_t {
    db_name: *mut c_char,
    sd_name: *mut c_char,
}

#[allow(non_camel_case_types)]
type uhd_error = c_int;

#[link(name = "uhd")]
unsafe extern "C" {
    fn uhd_get_last_error(error_out: *mut c_char, strbuffer_len: usize) -> uhd_error;
    fn uhd_get_abi_string(abi_string_out: *mut c_char, buffer_len: usize) -> uhd_error;
    fn uhd_get_version_string(version_out: *mut c_char, buffer_len: usize) -> uhd_error;
    fn uhd_set_thread_priority(priority: f32, realtime: bool) -> uhd_error;

    fn uhd_string_vector_make(h: *mut Handle) -> uhd_error;
    fn uhd_string_vector_free(h: *mut Handle) -> uhd_error;
    fn uhd_string_vector_push_back(h: *mut Handle, value: *const c_char) -> uhd_error;
    fn uhd_string_vector_at(h: Handle, index: usize, value_out: *mut c_char, len: usize)
    -> uhd_error;
    fn uhd_string_vector_size(h: Handle, size_out: *mut usize) -> uhd_error;
    fn uhd_string_vector_last_error(h: Handle, error_out: *mut c_char, len: usize) -> uhd_error;

    fn uhd_meta_range_make(h: *mut Handle) -> uhd_error;
    fn uhd_meta_range_free(h: *mut Handle) -> uhd_error;
    fn uhd_meta_range_start(h: Handle, start_out: *mut f64) -> uhd_error;
    fn uhd_meta_range_stop(h: Handle, stop_out: *mut f64) -> uhd_error;
    fn uhd_meta_range_step(h: Handle, step_out: *mut f64) -> uhd_error;
    fn uhd_meta_range_clip(h: Handle, value: f64, clip_step: bool, result_out: *mut f64)
    -> uhd_error;
    fn uhd_meta_range_size(h: Handle, size_out: *mut usize) -> uhd_error;
    fn uhd_meta_range_push_back(h: Handle, range: *const uhd_range_t) -> uhd_error;
    fn uhd_meta_range_at(h: Handle, num: usize, range_out: *mut uhd_range_t) -> uhd_error;
    fn uhd_meta_range_to_pp_string(h: Handle, pp_string_out: *mut c_char, len: usize)
    -> uhd_error;
    fn uhd_meta_range_last_error(h: Handle, error_out: *mut c_char, len: usize) -> uhd_error;

    fn uhd_sensor_value_make(h: *mut Handle) -> uhd_error;
    fn uhd_sensor_value_make_from_bool(
        h: *mut Handle,
        name: *const c_char,
        value: bool,
        utrue: *const c_char,
        ufalse: *const c_char,
    ) -> uhd_error;
    fn uhd_sensor_value_make_from_int(
        h: *mut Handle,
        name: *const c_char,
        value: c_int,
        unit: *const c_char,
        formatter: *const c_char,
    ) -> uhd_error;
    fn uhd_sensor_value_make_from_realnum(
        h: *mut Handle,
        name: *const c_char,
        value: f64,
        unit: *const c_char,
        formatter: *const c_char,
    ) -> uhd_error;
    fn uhd_sensor_value_make_from_string(
        h: *mut Handle,
        name: *const c_char,
        value: *const c_char,
        unit: *const c_char,
    ) -> uhd_error;
    fn uhd_sensor_value_free(h: *mut Handle) -> uhd_error;
    fn uhd_sensor_value_to_bool(h: Handle, value_out: *mut bool) -> uhd_error;
    fn uhd_sensor_value_to_int(h: Handle, value_out: *mut c_int) -> uhd_error;
    fn uhd_sensor_value_to_realnum(h: Handle, value_out: *mut f64) -> uhd_error;
    fn uhd_sensor_value_name(h: Handle, name_out: *mut c_char, len: usize) -> uhd_error;
    fn uhd_sensor_value_value(h: Handle, value_out: *mut c_char, len: usize) -> uhd_error;
    fn uhd_sensor_value_unit(h: Handle, unit_out: *mut c_char, len: usize) -> uhd_error;
    fn uhd_sensor_value_data_type(h: Handle, data_type_out: *mut c_int) -> uhd_error;
    fn uhd_sensor_value_to_pp_string(h: Handle, pp_string_out: *mut c_char, len: usize)
    -> uhd_error;
    fn uhd_sensor_value_last_error(h: Handle, error_out: *mut c_char, len: usize) -> uhd_error;

    fn uhd_subdev_spec_pair_free(pair: *mut uhd_subdev_spec_pair_t) -> uhd_error;
    fn uhd_subdev_spec_make(h: *mut Handle, markup: *const c_char) -> uhd_error;
    fn uhd_subdev_spec_free(h: *mut Handle) -> uhd_error;
    fn uhd_subdev_spec_size(h: Handle, size_out: *mut usize) -> uhd_error;
    fn uhd_subdev_spec_push_back(h: Handle, markup: *const c_char) -> uhd_error;
    fn uhd_subdev_spec_at(h: Handle, num: usize, pair_out: *mut uhd_subdev_spec_pair_t)
    -> uhd_error;
    fn uhd_subdev_spec_to_pp_string(h: Handle, pp_string_out: *mut c_char, len: usize)
    -> uhd_error;
    fn uhd_subdev_spec_to_string(h: Handle, string_out: *mut c_char, len: usize) -> uhd_error;
    fn uhd_subdev_spec_last_error(h: Handle, error_out: *mut c_char, len: usize) -> uhd_error;

    fn uhd_rx_metadata_make(h: *mut Handle) -> uhd_error;
    fn uhd_rx_metadata_free(h: *mut Handle) -> uhd_error;
    fn uhd_rx_metadata_has_time_spec(h: Handle, result_out: *mut bool) -> uhd_error;
    fn uhd_rx_metadata_time_spec(h: Handle, full_secs_out: *mut i64, frac_secs_out: *mut f64)
    -> uhd_error;
    fn uhd_rx_metadata_more_fragments(h: Handle, result_out: *mut bool) -> uhd_error;
    fn uhd_rx_metadata_fragment_offset(h: Handle, fragment_offset_out: *mut usize) -> uhd_error;
    fn uhd_rx_metadata_start_of_burst(h: Handle, result_out: *mut bool) -> uhd_error;
    fn uhd_rx_metadata_end_of_burst(h: Handle, result_out: *mut bool) -> uhd_error;
    fn uhd_rx_metadata_out_of_sequence(h: Handle, result_out: *mut bool) -> uhd_error;
    fn uhd_rx_metadata_to_pp_string(h: Handle, pp_string_out: *mut c_char, len: usize)
    -> uhd_error;
    fn uhd_rx_metadata_error_code(h: Handle, error_code_out: *mut c_int) -> uhd_error;
    fn uhd_rx_metadata_strerror(h: Handle, strerror_out: *mut c_char, len: usize) -> uhd_error;
    fn uhd_rx_metadata_last_error(h: Handle, error_out: *mut c_char, len: usize) -> uhd_error;

    fn uhd_tx_metadata_make(
        h: *mut Handle,
        has_time_spec: bool,
        full_secs: i64,
        frac_secs: f64,
        start_of_burst: bool,
        end_of_burst: bool,
    ) -> uhd_error;
    fn uhd_tx_metadata_free(h: *mut Handle) -> uhd_error;
    fn uhd_tx_metadata_has_time_spec(h: Handle, result_out: *mut bool) -> uhd_error;
    fn uhd_tx_metadata_time_spec(h: Handle, full_secs_out: *mut i64, frac_secs_out: *mut f64)
    -> uhd_error;
    fn uhd_tx_metadata_start_of_burst(h: Handle, result_out: *mut bool) -> uhd_error;
    fn uhd_tx_metadata_end_of_burst(h: Handle, result_out: *mut bool) -> uhd_error;
    fn uhd_tx_metadata_last_error(h: Handle, error_out: *mut c_char, len: usize) -> uhd_error;

    fn uhd_async_metadata_make(h: *mut Handle) -> uhd_error;
    fn uhd_async_metadata_free(h: *mut Handle) -> uhd_error;
    fn uhd_async_metadata_channel(h: Handle, channel_out: *mut usize) -> uhd_error;
    fn uhd_async_metadata_has_time_spec(h: Handle, result_out: *mut bool) -> uhd_error;
    fn uhd_async_metadata_time_spec(
        h: Handle,
        full_secs_out: *mut i64,
        frac_secs_out: *mut f64,
    ) -> uhd_error;
    fn uhd_async_metadata_event_code(h: Handle, event_code_out: *mut c_int) -> uhd_error;
    fn uhd_async_metadata_user_payload(h: Handle, user_payload_out: *mut u32) -> uhd_error;
    fn uhd_async_metadata_last_error(h: Handle, error_out: *mut c_char, len: usize) -> uhd_error;

    fn uhd_rx_streamer_make(h: *mut Handle) -> uhd_error;
    fn uhd_rx_streamer_free(h: *mut Handle) -> uhd_error;
    fn uhd_rx_streamer_num_channels(h: Handle, num_channels_out: *mut usize) -> uhd_error;
    fn uhd_rx_streamer_max_num_samps(h: Handle, max_num_samps_out: *mut usize) -> uhd_error;
    fn uhd_rx_streamer_recv(
        h: Handle,
        buffs: *mut *mut c_void,
        samps_per_buff: usize,
        md: *mut Handle,
        timeout: f64,
        one_packet: bool,
        items_recvd: *mut usize,
    ) -> uhd_error;
    fn uhd_rx_streamer_issue_stream_cmd(h: Handle, stream_cmd: *const uhd_stream_cmd_t)
    -> uhd_error;
    fn uhd_rx_streamer_last_error(h: Handle, error_out: *mut c_char, len: usize) -> uhd_error;

    fn uhd_tx_streamer_make(h: *mut Handle) -> uhd_error;
    fn uhd_tx_streamer_free(h: *mut Handle) -> uhd_error;
    fn uhd_tx_streamer_num_channels(h: Handle, num_channels_out: *mut usize) -> uhd_error;
    fn uhd_tx_streamer_max_num_samps(h: Handle, max_num_samps_out: *mut usize) -> uhd_error;
    fn uhd_tx_streamer_send(
        h: Handle,
        buffs: *mut *const c_void,
        samps_per_buff: usize,
        md: *mut Handle,
        timeout: f64,
        items_sent: *mut usize,
    ) -> uhd_error;
    fn uhd_tx_streamer_recv_async_msg(
        h: Handle,
        md: *mut Handle,
        timeout: f64,
        valid: *mut bool,
    ) -> uhd_error;
    fn uhd_tx_streamer_last_error(h: Handle, error_out: *mut c_char, len: usize) -> uhd_error;

    fn uhd_usrp_find(args: *const c_char, strings_out: *mut Handle) -> uhd_error;
    fn uhd_usrp_make(h: *mut Handle, args: *const c_char) -> uhd_error;
    fn uhd_usrp_free(h: *mut Handle) -> uhd_error;
    fn uhd_usrp_last_error(h: Handle, error_out: *mut c_char, len: usize) -> uhd_error;
    fn uhd_usrp_get_rx_stream(h: Handle, args: *mut uhd_stream_args_t, h_out: Handle)
    -> uhd_error;
    fn uhd_usrp_get_tx_stream(h: Handle, args: *mut uhd_stream_args_t, h_out: Handle)
    -> uhd_error;
    fn uhd_usrp_get_rx_info(h: Handle, chan: usize, info_out: *mut uhd_usrp_info_t) -> uhd_error;
    fn uhd_usrp_get_tx_info(h: Handle, chan: usize, info_out: *mut uhd_usrp_info_t) -> uhd_error;
    fn uhd_usrp_rx_info_free(info: *mut uhd_usrp_info_t) -> uhd_error;
    fn uhd_usrp_tx_info_free(info: *mut uhd_usrp_info_t) -> uhd_error;
    fn uhd_usrp_set_master_clock_rate(h: Handle, rate: f64, mboard: usize) -> uhd_error;
    fn uhd_usrp_get_master_clock_rate(h: Handle, mboard: usize, rate_out: *mut f64) -> uhd_error;
    fn uhd_usrp_get_pp_string(h: Handle, pp_string_out: *mut c_char, len: usize) -> uhd_error;
    fn uhd_usrp_get_mboard_name(h: Handle, mboard: usize, name_out: *mut c_char, len: usize)
    -> uhd_error;
    fn uhd_usrp_get_time_now(
        h: Handle,
        mboard: usize,
        full_secs_out: *mut i64,
        frac_secs_out: *mut f64,
    ) -> uhd_error;
    fn uhd_usrp_get_time_last_pps(
        h: Handle,
        mboard: usize,
        full_secs_out: *mut i64,
        frac_secs_out: *mut f64,
    ) -> uhd_error;
    fn uhd_usrp_set_time_now(h: Handle, full_secs: i64, frac_secs: f64, mboard: usize)
    -> uhd_error;
    fn uhd_usrp_set_time_next_pps(h: Handle, full_secs: i64, frac_secs: f64, mboard: usize)
    -> uhd_error;
    fn uhd_usrp_set_time_unknown_pps(h: Handle, full_secs: i64, frac_secs: f64) -> uhd_error;
    fn uhd_usrp_get_time_synchronized(h: Handle, result_out: *mut bool) -> uhd_error;
    fn uhd_usrp_set_command_time(h: Handle, full_secs: i64, frac_secs: f64, mboard: usize)
    -> uhd_error;
    fn uhd_usrp_clear_command_time(h: Handle, mboard: usize) -> uhd_error;
    fn uhd_usrp_set_time_source(h: Handle, time_source: *const c_char, mboard: usize)
    -> uhd_error;
    fn uhd_usrp_get_time_source(h: Handle, mboard: usize, out: *mut c_char, len: usize)
    -> uhd_error;
    fn uhd_usrp_get_time_sources(h: Handle, mboard: usize, out: *mut Handle) -> uhd_error;
    fn uhd_usrp_set_clock_source(h: Handle, clock_source: *const c_char, mboard: usize)
    -> uhd_error;
    fn uhd_usrp_get_clock_source(h: Handle, mboard: usize, out: *mut c_char, len: usize)
    -> uhd_error;
    fn uhd_usrp_get_clock_sources(h: Handle, mboard: usize, out: *mut Handle) -> uhd_error;
    fn uhd_usrp_set_clock_source_out(h: Handle, enb: bool, mboard: usize) -> uhd_error;
    fn uhd_usrp_set_time_source_out(h: Handle, enb: bool, mboard: usize) -> uhd_error;
    fn uhd_usrp_get_num_mboards(h: Handle, num_mboards_out: *mut usize) -> uhd_error;
    fn uhd_usrp_get_mboard_sensor(
        h: Handle,
        name: *const c_char,
        mboard: usize,
        sensor_value_out: *mut Handle,
    ) -> uhd_error;
    fn uhd_usrp_get_mboard_sensor_names(h: Handle, mboard: usize, names_out: *mut Handle)
    -> uhd_error;
    fn uhd_usrp_set_user_register(h: Handle, addr: u8, data: u32, mboard: usize) -> uhd_error;

    fn uhd_usrp_set_rx_subdev_spec(h: Handle, subdev_spec: Handle, mboard: usize) -> uhd_error;
    fn uhd_usrp_get_rx_subdev_spec(h: Handle, mboard: usize, subdev_spec_out: Handle)
    -> uhd_error;
    fn uhd_usrp_get_rx_num_channels(h: Handle, num_channels_out: *mut usize) -> uhd_error;
    fn uhd_usrp_get_rx_subdev_name(h: Handle, chan: usize, out: *mut c_char, len: usize)
    -> uhd_error;
    fn uhd_usrp_set_rx_rate(h: Handle, rate: f64, chan: usize) -> uhd_error;
    fn uhd_usrp_get_rx_rate(h: Handle, chan: usize, rate_out: *mut f64) -> uhd_error;
    fn uhd_usrp_get_rx_rates(h: Handle, chan: usize, rates_out: Handle) -> uhd_error;
    fn uhd_usrp_set_rx_freq(
        h: Handle,
        tune_request: *mut uhd_tune_request_t,
        chan: usize,
        tune_result: *mut TuneResult,
    ) -> uhd_error;
    fn uhd_usrp_get_rx_freq(h: Handle, chan: usize, freq_out: *mut f64) -> uhd_error;
    fn uhd_usrp_get_rx_freq_range(h: Handle, chan: usize, freq_range_out: Handle) -> uhd_error;
    fn uhd_usrp_get_fe_rx_freq_range(h: Handle, chan: usize, freq_range_out: Handle)
    -> uhd_error;
    fn uhd_usrp_get_rx_lo_names(h: Handle, chan: usize, names_out: *mut Handle) -> uhd_error;
    fn uhd_usrp_set_rx_lo_source(
        h: Handle,
        src: *const c_char,
        name: *const c_char,
        chan: usize,
    ) -> uhd_error;
    fn uhd_usrp_get_rx_lo_source(
        h: Handle,
        name: *const c_char,
        chan: usize,
        out: *mut c_char,
        len: usize,
    ) -> uhd_error;
    fn uhd_usrp_get_rx_lo_sources(
        h: Handle,
        name: *const c_char,
        chan: usize,
        sources_out: *mut Handle,
    ) -> uhd_error;
    fn uhd_usrp_set_rx_lo_export_enabled(
        h: Handle,
        enabled: bool,
        name: *const c_char,
        chan: usize,
    ) -> uhd_error;
    fn uhd_usrp_get_rx_lo_export_enabled(
        h: Handle,
        name: *const c_char,
        chan: usize,
        result_out: *mut bool,
    ) -> uhd_error;
    fn uhd_usrp_set_rx_lo_freq(
        h: Handle,
        freq: f64,
        name: *const c_char,
        chan: usize,
        coerced_freq_out: *mut f64,
    ) -> uhd_error;
    fn uhd_usrp_get_rx_lo_freq(
        h: Handle,
        name: *const c_char,
        chan: usize,
        freq_out: *mut f64,
    ) -> uhd_error;
    fn uhd_usrp_set_rx_gain(h: Handle, gain: f64, chan: usize, gain_name: *const c_char)
    -> uhd_error;
    fn uhd_usrp_set_normalized_rx_gain(h: Handle, gain: f64, chan: usize) -> uhd_error;
    fn uhd_usrp_set_rx_agc(h: Handle, enable: bool, chan: usize) -> uhd_error;
    fn uhd_usrp_get_rx_gain(
        h: Handle,
        chan: usize,
        gain_name: *const c_char,
        gain_out: *mut f64,
    ) -> uhd_error;
    fn uhd_usrp_get_normalized_rx_gain(h: Handle, chan: usize, gain_out: *mut f64) -> uhd_error;
    fn uhd_usrp_get_rx_gain_range(
        h: Handle,
        name: *const c_char,
        chan: usize,
        gain_range_out: Handle,
    ) -> uhd_error;
    fn uhd_usrp_get_rx_gain_names(h: Handle, chan: usize, names_out: *mut Handle) -> uhd_error;
    fn uhd_usrp_set_rx_antenna(h: Handle, ant: *const c_char, chan: usize) -> uhd_error;
    fn uhd_usrp_get_rx_antenna(h: Handle, chan: usize, out: *mut c_char, len: usize)
    -> uhd_error;
    fn uhd_usrp_get_rx_antennas(h: Handle, chan: usize, antennas_out: *mut Handle) -> uhd_error;
    fn uhd_usrp_get_rx_sensor_names(h: Handle, chan: usize, names_out: *mut Handle)
    -> uhd_error;
    fn uhd_usrp_set_rx_bandwidth(h: Handle, bandwidth: f64, chan: usize) -> uhd_error;
    fn uhd_usrp_get_rx_bandwidth(h: Handle, chan: usize, bandwidth_out: *mut f64) -> uhd_error;
    fn uhd_usrp_get_rx_bandwidth_range(h: Handle, chan: usize, range_out: Handle) -> uhd_error;
    fn uhd_usrp_get_rx_sensor(
        h: Handle,
        name: *const c_char,
        chan: usize,
        sensor_value_out: *mut Handle,
    ) -> uhd_error;
    fn uhd_usrp_set_rx_dc_offset_enabled(h: Handle, enb: bool, chan: usize) -> uhd_error;
    fn uhd_usrp_set_rx_iq_balance_enabled(h: Handle, enb: bool, chan: usize) -> uhd_error;

    fn uhd_usrp_set_tx_subdev_spec(h: Handle, subdev_spec: Handle, mboard: usize) -> uhd_error;
    fn uhd_usrp_get_tx_subdev_spec(h: Handle, mboard: usize, subdev_spec_out: Handle)
    -> uhd_error;
    fn uhd_usrp_get_tx_num_channels(h: Handle, num_channels_out: *mut usize) -> uhd_error;
    fn uhd_usrp_get_tx_subdev_name(h: Handle, chan: usize, out: *mut c_char, len: usize)
    -> uhd_error;
    fn uhd_usrp_set_tx_rate(h: Handle, rate: f64, chan: usize) -> uhd_error;
    fn uhd_usrp_get_tx_rate(h: Handle, chan: usize, rate_out: *mut f64) -> uhd_error;
    fn uhd_usrp_get_tx_rates(h: Handle, chan: usize, rates_out: Handle) -> uhd_error;
    fn uhd_usrp_set_tx_freq(
        h: Handle,
        tune_request: *mut uhd_tune_request_t,
        chan: usize,
        tune_result: *mut TuneResult,
    ) -> uhd_error;
    fn uhd_usrp_get_tx_freq(h: Handle, chan: usize, freq_out: *mut f64) -> uhd_error;
    fn uhd_usrp_get_tx_freq_range(h: Handle, chan: usize, freq_range_out: Handle) -> uhd_error;
    fn uhd_usrp_get_fe_tx_freq_range(h: Handle, chan: usize, freq_range_out: Handle)
    -> uhd_error;
    fn uhd_usrp_get_tx_lo_names(h: Handle, chan: usize, names_out: *mut Handle) -> uhd_error;
    fn uhd_usrp_set_tx_lo_source(
        h: Handle,
        src: *const c_char,
        name: *const c_char,
        chan: usize,
    ) -> uhd_error;
    fn uhd_usrp_get_tx_lo_source(
        h: Handle,
        name: *const c_char,
        chan: usize,
        out: *mut c_char,
        len: usize,
    ) -> uhd_error;
    fn uhd_usrp_get_tx_lo_sources(
        h: Handle,
        name: *const c_char,
        chan: usize,
        sources_out: *mut Handle,
    ) -> uhd_error;
    fn uhd_usrp_set_tx_lo_export_enabled(
        h: Handle,
        enabled: bool,
        name: *const c_char,
        chan: usize,
    ) -> uhd_error;
    fn uhd_usrp_get_tx_lo_export_enabled(
        h: Handle,
        name: *const c_char,
        chan: usize,
        result_out: *mut bool,
    ) -> uhd_error;
    fn uhd_usrp_set_tx_lo_freq(
        h: Handle,
        freq: f64,
        name: *const c_char,
        chan: usize,
        coerced_freq_out: *mut f64,
    ) -> uhd_error;
    fn uhd_usrp_get_tx_lo_freq(
        h: Handle,
        name: *const c_char,
        chan: usize,
        freq_out: *mut f64,
    ) -> uhd_error;
    fn uhd_usrp_set_tx_gain(h: Handle, gain: f64, chan: usize, gain_name: *const c_char)
    -> uhd_error;
    fn uhd_usrp_set_normalized_tx_gain(h: Handle, gain: f64, chan: usize) -> uhd_error;
    fn uhd_usrp_get_tx_gain_range(
        h: Handle,
        name: *const c_char,
        chan: usize,
        gain_range_out: Handle,
    ) -> uhd_error;
    fn uhd_usrp_get_tx_gain(
        h: Handle,
        chan: usize,
        gain_name: *const c_char,
        gain_out: *mut f64,
    ) -> uhd_error;
    fn uhd_usrp_get_normalized_tx_gain(h: Handle, chan: usize, gain_out: *mut f64) -> uhd_error;
    fn uhd_usrp_get_tx_gain_names(h: Handle, chan: usize, names_out: *mut Handle) -> uhd_error;
    fn uhd_usrp_set_tx_antenna(h: Handle, ant: *const c_char, chan: usize) -> uhd_error;
    fn uhd_usrp_get_tx_antenna(h: Handle, chan: usize, out: *mut c_char, len: usize)
    -> uhd_error;
    fn uhd_usrp_get_tx_antennas(h: Handle, chan: usize, antennas_out: *mut Handle) -> uhd_error;
    fn uhd_usrp_set_tx_bandwidth(h: Handle, bandwidth: f64, chan: usize) -> uhd_error;
    fn uhd_usrp_get_tx_bandwidth(h: Handle, chan: usize, bandwidth_out: *mut f64) -> uhd_error;
    fn uhd_usrp_get_tx_bandwidth_range(h: Handle, chan: usize, range_out: Handle) -> uhd_error;
    fn uhd_usrp_get_tx_sensor(
        h: Handle,
        name: *const c_char,
        chan: usize,
        sensor_value_out: *mut Handle,
    ) -> uhd_error;
    fn uhd_usrp_get_tx_sensor_names(h: Handle, chan: usize, names_out: *mut Handle)
    -> uhd_error;
}

/// Driver backed by the system `libuhd`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeDriver;

impl NativeDriver {
    pub fn new() -> Self {
        NativeDriver
    }
}

fn status(code: uhd_error) -> Status {
    Status::from_raw(code)
}

fn ptr<K: Kind>(h: Raw<K>) -> Handle {
    h.value() as Handle
}

fn make_with<K: Kind>(out: Out<'_, K>, f: impl FnOnce(*mut Handle) -> uhd_error) -> Status {
    let mut raw: Handle = null_mut();
    let st = status(f(&mut raw));
    *out = Raw::new(raw as usize);
    st
}

thread_local! {
    /// Diagnostic of a call refused before reaching the library, handed out
    /// by the next diagnostic read on this thread.
    static REFUSED: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Convert an argument string, failing the call on an interior NUL.
macro_rules! c {
    ($s:expr) => {
        match CString::new($s) {
            Ok(s) => s,
            Err(_) => {
                let message = format!("string argument contains a NUL byte: {:?}", $s);
                tracing::warn!("{message}");
                REFUSED.set(Some(message));
                return Status::Value;
            }
        }
    };
}

/// Write the pending refusal diagnostic into `buf`, if there is one.
fn take_refused(buf: &mut [u8]) -> bool {
    match REFUSED.take() {
        Some(message) => {
            write_c_str(buf, &message);
            true
        }
        None => false,
    }
}

/// Call the RX or TX flavour of a C function with the same arguments.
macro_rules! dir_call {
    ($dir:expr, $rx:ident | $tx:ident ( $($arg:expr),* $(,)? )) => {
        status(match $dir {
            Direction::Rx => unsafe { $rx($($arg),*) },
            Direction::Tx => unsafe { $tx($($arg),*) },
        })
    };
}

fn time_out(out: &mut TimeSpec, f: impl FnOnce(*mut i64, *mut f64) -> uhd_error) -> Status {
    let (mut full, mut frac) = (0i64, 0f64);
    let st = status(f(&mut full, &mut frac));
    *out = TimeSpec {
        full_secs: full,
        frac_secs: frac,
    };
    st
}

fn c_str_field(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: the library hands out NUL-terminated strings owned by the
    // struct they came in, which is still alive here.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

impl Driver for NativeDriver {
    fn last_error(&self, buf: &mut [u8]) -> Status {
        if take_refused(buf) {
            return Status::None;
        }
        status(unsafe { uhd_get_last_error(buf.as_mut_ptr().cast(), buf.len()) })
    }

    fn version_string(&self, buf: &mut [u8]) -> Status {
        status(unsafe { uhd_get_version_string(buf.as_mut_ptr().cast(), buf.len()) })
    }

    fn abi_string(&self, buf: &mut [u8]) -> Status {
        status(unsafe { uhd_get_abi_string(buf.as_mut_ptr().cast(), buf.len()) })
    }

    fn set_thread_priority(&self, priority: f32, realtime: bool) -> Status {
        status(unsafe { uhd_set_thread_priority(priority, realtime) })
    }

    fn free(&self, h: AnyRaw) -> Status {
        let mut p = h.value() as Handle;
        let p = &mut p;
        status(unsafe {
            match h.kind() {
                HandleKind::Usrp => uhd_usrp_free(p),
                HandleKind::RxStreamer => uhd_rx_streamer_free(p),
                HandleKind::TxStreamer => uhd_tx_streamer_free(p),
                HandleKind::RxMetadata => uhd_rx_metadata_free(p),
                HandleKind::TxMetadata => uhd_tx_metadata_free(p),
                HandleKind::AsyncMetadata => uhd_async_metadata_free(p),
                HandleKind::MetaRange => uhd_meta_range_free(p),
                HandleKind::SensorValue => uhd_sensor_value_free(p),
                HandleKind::SubdevSpec => uhd_subdev_spec_free(p),
                HandleKind::StringVector => uhd_string_vector_free(p),
            }
        })
    }

    fn handle_last_error(&self, h: AnyRaw, buf: &mut [u8]) -> Status {
        if take_refused(buf) {
            return Status::None;
        }
        let p = h.value() as Handle;
        let (out, len) = (buf.as_mut_ptr().cast(), buf.len());
        status(unsafe {
            match h.kind() {
                HandleKind::Usrp => uhd_usrp_last_error(p, out, len),
                HandleKind::RxStreamer => uhd_rx_streamer_last_error(p, out, len),
                HandleKind::TxStreamer => uhd_tx_streamer_last_error(p, out, len),
                HandleKind::RxMetadata => uhd_rx_metadata_last_error(p, out, len),
                HandleKind::TxMetadata => uhd_tx_metadata_last_error(p, out, len),
                HandleKind::AsyncMetadata => uhd_async_metadata_last_error(p, out, len),
                HandleKind::MetaRange => uhd_meta_range_last_error(p, out, len),
                HandleKind::SensorValue => uhd_sensor_value_last_error(p, out, len),
                HandleKind::SubdevSpec => uhd_subdev_spec_last_error(p, out, len),
                HandleKind::StringVector => uhd_string_vector_last_error(p, out, len),
            }
        })
    }

    fn string_vector_make(&self, out: Out<'_, StringVector>) -> Status {
        make_with(out, |p| unsafe { uhd_string_vector_make(p) })
    }

    fn string_vector_push_back(&self, h: Raw<StringVector>, value: &str) -> Status {
        let value = c!(value);
        let mut p = ptr(h);
        status(unsafe { uhd_string_vector_push_back(&mut p, value.as_ptr()) })
    }

    fn string_vector_at(&self, h: Raw<StringVector>, index: usize, buf: &mut [u8]) -> Status {
        status(unsafe { uhd_string_vector_at(ptr(h), index, buf.as_mut_ptr().cast(), buf.len()) })
    }

    fn string_vector_size(&self, h: Raw<StringVector>, out: &mut usize) -> Status {
        status(unsafe { uhd_string_vector_size(ptr(h), out) })
    }

    fn meta_range_make(&self, out: Out<'_, MetaRange>) -> Status {
        make_with(out, |p| unsafe { uhd_meta_range_make(p) })
    }

    fn meta_range_push_back(&self, h: Raw<MetaRange>, range: &Range) -> Status {
        let range = uhd_range_t {
            start: range.start,
            stop: range.stop,
            step: range.step,
        };
        status(unsafe { uhd_meta_range_push_back(ptr(h), &range) })
    }

    fn meta_range_at(&self, h: Raw<MetaRange>, index: usize, out: &mut Range) -> Status {
        let mut range = uhd_range_t {
            start: 0.0,
            stop: 0.0,
            step: 0.0,
        };
        let st = status(unsafe { uhd_meta_range_at(ptr(h), index, &mut range) });
        *out = Range::new(range.start, range.stop, range.step);
        st
    }

    fn meta_range_size(&self, h: Raw<MetaRange>, out: &mut usize) -> Status {
        status(unsafe { uhd_meta_range_size(ptr(h), out) })
    }

    fn meta_range_start(&self, h: Raw<MetaRange>, out: &mut f64) -> Status {
        status(unsafe { uhd_meta_range_start(ptr(h), out) })
    }

    fn meta_range_stop(&self, h: Raw<MetaRange>, out: &mut f64) -> Status {
        status(unsafe { uhd_meta_range_stop(ptr(h), out) })
    }

    fn meta_range_step(&self, h: Raw<MetaRange>, out: &mut f64) -> Status {
        status(unsafe { uhd_meta_range_step(ptr(h), out) })
    }

    fn meta_range_clip(
        &self,
        h: Raw<MetaRange>,
        value: f64,
        clip_step: bool,
        out: &mut f64,
    ) -> Status {
        status(unsafe { uhd_meta_range_clip(ptr(h), value, clip_step, out) })
    }

    fn meta_range_to_pp_string(&self, h: Raw<MetaRange>, buf: &mut [u8]) -> Status {
        status(unsafe { uhd_meta_range_to_pp_string(ptr(h), buf.as_mut_ptr().cast(), buf.len()) })
    }

    fn sensor_value_make(&self, out: Out<'_, SensorValue>) -> Status {
        make_with(out, |p| unsafe { uhd_sensor_value_make(p) })
    }

    fn sensor_value_make_from_bool(
        &self,
        out: Out<'_, SensorValue>,
        name: &str,
        value: bool,
        utrue: &str,
        ufalse: &str,
    ) -> Status {
        let (name, utrue, ufalse) = (c!(name), c!(utrue), c!(ufalse));
        make_with(out, |p| unsafe {
            uhd_sensor_value_make_from_bool(
                p,
                name.as_ptr(),
                value,
                utrue.as_ptr(),
                ufalse.as_ptr(),
            )
        })
    }

    fn sensor_value_make_from_int(
        &self,
        out: Out<'_, SensorValue>,
        name: &str,
        value: i32,
        unit: &str,
        formatter: &str,
    ) -> Status {
        let (name, unit, formatter) = (c!(name), c!(unit), c!(formatter));
        make_with(out, |p| unsafe {
            uhd_sensor_value_make_from_int(
                p,
                name.as_ptr(),
                value,
                unit.as_ptr(),
                formatter.as_ptr(),
            )
        })
    }

    fn sensor_value_make_from_realnum(
        &self,
        out: Out<'_, SensorValue>,
        name: &str,
        value: f64,
        unit: &str,
        formatter: &str,
    ) -> Status {
        let (name, unit, formatter) = (c!(name), c!(unit), c!(formatter));
        make_with(out, |p| unsafe {
            uhd_sensor_value_make_from_realnum(
                p,
                name.as_ptr(),
                value,
                unit.as_ptr(),
                formatter.as_ptr(),
            )
        })
    }

    fn sensor_value_make_from_string(
        &self,
        out: Out<'_, SensorValue>,
        name: &str,
        value: &str,
        unit: &str,
    ) -> Status {
        let (name, value, unit) = (c!(name), c!(value), c!(unit));
        make_with(out, |p| unsafe {
            uhd_sensor_value_make_from_string(p, name.as_ptr(), value.as_ptr(), unit.as_ptr())
        })
    }

    fn sensor_value_to_bool(&self, h: Raw<SensorValue>, out: &mut bool) -> Status {
        status(unsafe { uhd_sensor_value_to_bool(ptr(h), out) })
    }

    fn sensor_value_to_int(&self, h: Raw<SensorValue>, out: &mut i32) -> Status {
        status(unsafe { uhd_sensor_value_to_int(ptr(h), out) })
    }

    fn sensor_value_to_realnum(&self, h: Raw<SensorValue>, out: &mut f64) -> Status {
        status(unsafe { uhd_sensor_value_to_realnum(ptr(h), out) })
    }

    fn sensor_value_name(&self, h: Raw<SensorValue>, buf: &mut [u8]) -> Status {
        status(unsafe { uhd_sensor_value_name(ptr(h), buf.as_mut_ptr().cast(), buf.len()) })
    }

    fn sensor_value_value(&self, h: Raw<SensorValue>, buf: &mut [u8]) -> Status {
        status(unsafe { uhd_sensor_value_value(ptr(h), buf.as_mut_ptr().cast(), buf.len()) })
    }

    fn sensor_value_unit(&self, h: Raw<SensorValue>, buf: &mut [u8]) -> Status {
        status(unsafe { uhd_sensor_value_unit(ptr(h), buf.as_mut_ptr().cast(), buf.len()) })
    }

    fn sensor_value_data_type(&self, h: Raw<SensorValue>, out: &mut SensorType) -> Status {
        let mut raw: c_int = 0;
        let st = status(unsafe { uhd_sensor_value_data_type(ptr(h), &mut raw) });
        *out = SensorType::from_raw(raw);
        st
    }

    fn sensor_value_to_pp_string(&self, h: Raw<SensorValue>, buf: &mut [u8]) -> Status {
        status(unsafe {
            uhd_sensor_value_to_pp_string(ptr(h), buf.as_mut_ptr().cast(), buf.len())
        })
    }

    fn subdev_spec_make(&self, out: Out<'_, SubdevSpec>, markup: &str) -> Status {
        let markup = c!(markup);
        make_with(out, |p| unsafe { uhd_subdev_spec_make(p, markup.as_ptr()) })
    }

    fn subdev_spec_push_back(&self, h: Raw<SubdevSpec>, markup: &str) -> Status {
        let markup = c!(markup);
        status(unsafe { uhd_subdev_spec_push_back(ptr(h), markup.as_ptr()) })
    }

    fn subdev_spec_size(&self, h: Raw<SubdevSpec>, out: &mut usize) -> Status {
        status(unsafe { uhd_subdev_spec_size(ptr(h), out) })
    }

    fn subdev_spec_at(
        &self,
        h: Raw<SubdevSpec>,
        index: usize,
        db_name: &mut [u8],
        sd_name: &mut [u8],
    ) -> Status {
        let mut pair = uhd_subdev_spec_pair_t {
            db_name: null_mut(),
            sd_name: null_mut(),
        };
        let st = status(unsafe { uhd_subdev_spec_at(ptr(h), index, &mut pair) });
        if st.is_ok() {
            write_c_str(db_name, &c_str_field(pair.db_name));
            write_c_str(sd_name, &c_str_field(pair.sd_name));
            let freed = status(unsafe { uhd_subdev_spec_pair_free(&mut pair) });
            if !freed.is_ok() {
                tracing::warn!("failed to free subdev spec pair: {freed}");
            }
        }
        st
    }

    fn subdev_spec_to_pp_string(&self, h: Raw<SubdevSpec>, buf: &mut [u8]) -> Status {
        status(unsafe { uhd_subdev_spec_to_pp_string(ptr(h), buf.as_mut_ptr().cast(), buf.len()) })
    }

    fn subdev_spec_to_string(&self, h: Raw<SubdevSpec>, buf: &mut [u8]) -> Status {
        status(unsafe { uhd_subdev_spec_to_string(ptr(h), buf.as_mut_ptr().cast(), buf.len()) })
    }

    fn rx_metadata_make(&self, out: Out<'_, RxMetadata>) -> Status {
        make_with(out, |p| unsafe { uhd_rx_metadata_make(p) })
    }

    fn rx_metadata_has_time_spec(&self, h: Raw<RxMetadata>, out: &mut bool) -> Status {
        status(unsafe { uhd_rx_metadata_has_time_spec(ptr(h), out) })
    }

    fn rx_metadata_time_spec(&self, h: Raw<RxMetadata>, out: &mut TimeSpec) -> Status {
        time_out(out, |full, frac| unsafe {
            uhd_rx_metadata_time_spec(ptr(h), full, frac)
        })
    }

    fn rx_metadata_more_fragments(&self, h: Raw<RxMetadata>, out: &mut bool) -> Status {
        status(unsafe { uhd_rx_metadata_more_fragments(ptr(h), out) })
    }

    fn rx_metadata_fragment_offset(&self, h: Raw<RxMetadata>, out: &mut usize) -> Status {
        status(unsafe { uhd_rx_metadata_fragment_offset(ptr(h), out) })
    }

    fn rx_metadata_start_of_burst(&self, h: Raw<RxMetadata>, out: &mut bool) -> Status {
        status(unsafe { uhd_rx_metadata_start_of_burst(ptr(h), out) })
    }

    fn rx_metadata_end_of_burst(&self, h: Raw<RxMetadata>, out: &mut bool) -> Status {
        status(unsafe { uhd_rx_metadata_end_of_burst(ptr(h), out) })
    }

    fn rx_metadata_out_of_sequence(&self, h: Raw<RxMetadata>, out: &mut bool) -> Status {
        status(unsafe { uhd_rx_metadata_out_of_sequence(ptr(h), out) })
    }

    fn rx_metadata_error_code(&self, h: Raw<RxMetadata>, out: &mut u32) -> Status {
        let mut raw: c_int = 0;
        let st = status(unsafe { uhd_rx_metadata_error_code(ptr(h), &mut raw) });
        *out = raw as u32;
        st
    }

    fn rx_metadata_to_pp_string(&self, h: Raw<RxMetadata>, buf: &mut [u8]) -> Status {
        status(unsafe { uhd_rx_metadata_to_pp_string(ptr(h), buf.as_mut_ptr().cast(), buf.len()) })
    }

    fn rx_metadata_strerror(&self, h: Raw<RxMetadata>, buf: &mut [u8]) -> Status {
        status(unsafe { uhd_rx_metadata_strerror(ptr(h), buf.as_mut_ptr().cast(), buf.len()) })
    }

    fn tx_metadata_make(
        &self,
        out: Out<'_, TxMetadata>,
        has_time_spec: bool,
        time_spec: TimeSpec,
        start_of_burst: bool,
        end_of_burst: bool,
    ) -> Status {
        make_with(out, |p| unsafe {
            uhd_tx_metadata_make(
                p,
                has_time_spec,
                time_spec.full_secs,
                time_spec.frac_secs,
                start_of_burst,
                end_of_burst,
            )
        })
    }

    fn tx_metadata_has_time_spec(&self, h: Raw<TxMetadata>, out: &mut bool) -> Status {
        status(unsafe { uhd_tx_metadata_has_time_spec(ptr(h), out) })
    }

    fn tx_metadata_time_spec(&self, h: Raw<TxMetadata>, out: &mut TimeSpec) -> Status {
        time_out(out, |full, frac| unsafe {
            uhd_tx_metadata_time_spec(ptr(h), full, frac)
        })
    }

    fn tx_metadata_start_of_burst(&self, h: Raw<TxMetadata>, out: &mut bool) -> Status {
        status(unsafe { uhd_tx_metadata_start_of_burst(ptr(h), out) })
    }

    fn tx_metadata_end_of_burst(&self, h: Raw<TxMetadata>, out: &mut bool) -> Status {
        status(unsafe { uhd_tx_metadata_end_of_burst(ptr(h), out) })
    }

    fn async_metadata_make(&self, out: Out<'_, AsyncMetadata>) -> Status {
        make_with(out, |p| unsafe { uhd_async_metadata_make(p) })
    }

    fn async_metadata_channel(&self, h: Raw<AsyncMetadata>, out: &mut usize) -> Status {
        status(unsafe { uhd_async_metadata_channel(ptr(h), out) })
    }

    fn async_metadata_has_time_spec(&self, h: Raw<AsyncMetadata>, out: &mut bool) -> Status {
        status(unsafe { uhd_async_metadata_has_time_spec(ptr(h), out) })
    }

    fn async_metadata_time_spec(&self, h: Raw<AsyncMetadata>, out: &mut TimeSpec) -> Status {
        time_out(out, |full, frac| unsafe {
            uhd_async_metadata_time_spec(ptr(h), full, frac)
        })
    }

    fn async_metadata_event_code(&self, h: Raw<AsyncMetadata>, out: &mut u32) -> Status {
        let mut raw: c_int = 0;
        let st = status(unsafe { uhd_async_metadata_event_code(ptr(h), &mut raw) });
        *out = raw as u32;
        st
    }

    fn async_metadata_user_payload(
        &self,
        h: Raw<AsyncMetadata>,
        out: &mut UserPayload,
    ) -> Status {
        status(unsafe { uhd_async_metadata_user_payload(ptr(h), out.as_mut_ptr()) })
    }

    fn rx_streamer_make(&self, out: Out<'_, RxStreamer>) -> Status {
        make_with(out, |p| unsafe { uhd_rx_streamer_make(p) })
    }

    fn rx_streamer_num_channels(&self, h: Raw<RxStreamer>, out: &mut usize) -> Status {
        status(unsafe { uhd_rx_streamer_num_channels(ptr(h), out) })
    }

    fn rx_streamer_max_num_samps(&self, h: Raw<RxStreamer>, out: &mut usize) -> Status {
        status(unsafe { uhd_rx_streamer_max_num_samps(ptr(h), out) })
    }

    fn rx_streamer_recv(
        &self,
        h: Raw<RxStreamer>,
        buffs: &mut [&mut [u8]],
        samps_per_buff: usize,
        md: Raw<RxMetadata>,
        timeout: f64,
        one_packet: bool,
        items_recvd: &mut usize,
    ) -> Status {
        let mut stack = [null_mut::<c_void>(); STACK_CHANNELS];
        let mut heap = Vec::new();
        let ptrs: &mut [*mut c_void] = if buffs.len() <= STACK_CHANNELS {
            &mut stack[..buffs.len()]
        } else {
            heap.resize(buffs.len(), null_mut());
            &mut heap
        };
        for (p, buf) in ptrs.iter_mut().zip(buffs.iter_mut()) {
            *p = buf.as_mut_ptr().cast();
        }
        let mut md = ptr(md);
        status(unsafe {
            uhd_rx_streamer_recv(
                ptr(h),
                ptrs.as_mut_ptr(),
                samps_per_buff,
                &mut md,
                timeout,
                one_packet,
                items_recvd,
            )
        })
    }

    fn rx_streamer_issue_stream_cmd(&self, h: Raw<RxStreamer>, cmd: &StreamCmd) -> Status {
        let cmd = uhd_stream_cmd_t {
            stream_mode: cmd.mode.as_raw(),
            num_samps: cmd.num_samps,
            stream_now: cmd.stream_now,
            time_spec_full_secs: cmd.time_spec.full_secs,
            time_spec_frac_secs: cmd.time_spec.frac_secs,
        };
        status(unsafe { uhd_rx_streamer_issue_stream_cmd(ptr(h), &cmd) })
    }

    fn tx_streamer_make(&self, out: Out<'_, TxStreamer>) -> Status {
        make_with(out, |p| unsafe { uhd_tx_streamer_make(p) })
    }

    fn tx_streamer_num_channels(&self, h: Raw<TxStreamer>, out: &mut usize) -> Status {
        status(unsafe { uhd_tx_streamer_num_channels(ptr(h), out) })
    }

    fn tx_streamer_max_num_samps(&self, h: Raw<TxStreamer>, out: &mut usize) -> Status {
        status(unsafe { uhd_tx_streamer_max_num_samps(ptr(h), out) })
    }

    fn tx_streamer_send(
        &self,
        h: Raw<TxStreamer>,
        buffs: &[&[u8]],
        samps_per_buff: usize,
        md: Raw<TxMetadata>,
        timeout: f64,
        items_sent: &mut usize,
    ) -> Status {
        let mut stack = [std::ptr::null::<c_void>(); STACK_CHANNELS];
        let mut heap = Vec::new();
        let ptrs: &mut [*const c_void] = if buffs.len() <= STACK_CHANNELS {
            &mut stack[..buffs.len()]
        } else {
            heap.resize(buffs.len(), std::ptr::null());
            &mut heap
        };
        for (p, buf) in ptrs.iter_mut().zip(buffs) {
            *p = buf.as_ptr().cast();
        }
        let mut md = ptr(md);
        status(unsafe {
            uhd_tx_streamer_send(
                ptr(h),
                ptrs.as_mut_ptr(),
                samps_per_buff,
                &mut md,
                timeout,
                items_sent,
            )
        })
    }

    fn tx_streamer_recv_async_msg(
        &self,
        h: Raw<TxStreamer>,
        md: Raw<AsyncMetadata>,
        timeout: f64,
        valid: &mut bool,
    ) -> Status {
        let mut md = ptr(md);
        status(unsafe { uhd_tx_streamer_recv_async_msg(ptr(h), &mut md, timeout, valid) })
    }

    fn usrp_find(&self, args: &str, out: Raw<StringVector>) -> Status {
        let args = c!(args);
        let mut p = ptr(out);
        status(unsafe { uhd_usrp_find(args.as_ptr(), &mut p) })
    }

    fn usrp_make(&self, out: Out<'_, Usrp>, args: &str) -> Status {
        let args = c!(args);
        make_with(out, |p| unsafe { uhd_usrp_make(p, args.as_ptr()) })
    }

    fn usrp_get_rx_stream(&self, h: Raw<Usrp>, args: &StreamArgs, out: Raw<RxStreamer>) -> Status {
        let cpu = c!(args.cpu_format.as_str());
        let otw = c!(args.otw_format.as_str());
        let extra = c!(args.args.as_str());
        let mut channels = args.channels.clone();
        let mut raw = uhd_stream_args_t {
            cpu_format: cpu.as_ptr().cast_mut(),
            otw_format: otw.as_ptr().cast_mut(),
            args: extra.as_ptr().cast_mut(),
            channel_list: channels.as_mut_ptr(),
            n_channels: channels.len() as c_int,
        };
        status(unsafe { uhd_usrp_get_rx_stream(ptr(h), &mut raw, ptr(out)) })
    }

    fn usrp_get_tx_stream(&self, h: Raw<Usrp>, args: &StreamArgs, out: Raw<TxStreamer>) -> Status {
        let cpu = c!(args.cpu_format.as_str());
        let otw = c!(args.otw_format.as_str());
        let extra = c!(args.args.as_str());
        let mut channels = args.channels.clone();
        let mut raw = uhd_stream_args_t {
            cpu_format: cpu.as_ptr().cast_mut(),
            otw_format: otw.as_ptr().cast_mut(),
            args: extra.as_ptr().cast_mut(),
            channel_list: channels.as_mut_ptr(),
            n_channels: channels.len() as c_int,
        };
        status(unsafe { uhd_usrp_get_tx_stream(ptr(h), &mut raw, ptr(out)) })
    }

    fn usrp_info(&self, h: Raw<Usrp>, dir: Direction, chan: usize, out: &mut ChainInfo) -> Status {
        let mut info = uhd_usrp_info_t {
            mboard_id: null_mut(),
            mboard_name: null_mut(),
            mboard_serial: null_mut(),
            id: null_mut(),
            subdev_name: null_mut(),
            subdev_spec: null_mut(),
            serial: null_mut(),
            antenna: null_mut(),
        };
        let st = dir_call!(
            dir,
            uhd_usrp_get_rx_info | uhd_usrp_get_tx_info(ptr(h), chan, &mut info)
        );
        if !st.is_ok() {
            return st;
        }
        *out = ChainInfo {
            mboard_id: c_str_field(info.mboard_id),
            mboard_name: c_str_field(info.mboard_name),
            mboard_serial: c_str_field(info.mboard_serial),
            id: c_str_field(info.id),
            subdev_name: c_str_field(info.subdev_name),
            subdev_spec: c_str_field(info.subdev_spec),
            serial: c_str_field(info.serial),
            antenna: c_str_field(info.antenna),
        };
        dir_call!(dir, uhd_usrp_rx_info_free | uhd_usrp_tx_info_free(&mut info))
    }

    fn usrp_pp_string(&self, h: Raw<Usrp>, buf: &mut [u8]) -> Status {
        status(unsafe { uhd_usrp_get_pp_string(ptr(h), buf.as_mut_ptr().cast(), buf.len()) })
    }

    fn usrp_mboard_name(&self, h: Raw<Usrp>, mboard: usize, buf: &mut [u8]) -> Status {
        status(unsafe {
            uhd_usrp_get_mboard_name(ptr(h), mboard, buf.as_mut_ptr().cast(), buf.len())
        })
    }

    fn usrp_num_mboards(&self, h: Raw<Usrp>, out: &mut usize) -> Status {
        status(unsafe { uhd_usrp_get_num_mboards(ptr(h), out) })
    }

    fn usrp_set_master_clock_rate(&self, h: Raw<Usrp>, rate: f64, mboard: usize) -> Status {
        status(unsafe { uhd_usrp_set_master_clock_rate(ptr(h), rate, mboard) })
    }

    fn usrp_master_clock_rate(&self, h: Raw<Usrp>, mboard: usize, out: &mut f64) -> Status {
        status(unsafe { uhd_usrp_get_master_clock_rate(ptr(h), mboard, out) })
    }

    fn usrp_time_now(&self, h: Raw<Usrp>, mboard: usize, out: &mut TimeSpec) -> Status {
        time_out(out, |full, frac| unsafe {
            uhd_usrp_get_time_now(ptr(h), mboard, full, frac)
        })
    }

    fn usrp_time_last_pps(&self, h: Raw<Usrp>, mboard: usize, out: &mut TimeSpec) -> Status {
        time_out(out, |full, frac| unsafe {
            uhd_usrp_get_time_last_pps(ptr(h), mboard, full, frac)
        })
    }

    fn usrp_set_time_now(&self, h: Raw<Usrp>, time: TimeSpec, mboard: usize) -> Status {
        status(unsafe { uhd_usrp_set_time_now(ptr(h), time.full_secs, time.frac_secs, mboard) })
    }

    fn usrp_set_time_next_pps(&self, h: Raw<Usrp>, time: TimeSpec, mboard: usize) -> Status {
        status(unsafe {
            uhd_usrp_set_time_next_pps(ptr(h), time.full_secs, time.frac_secs, mboard)
        })
    }

    fn usrp_set_time_unknown_pps(&self, h: Raw<Usrp>, time: TimeSpec) -> Status {
        status(unsafe { uhd_usrp_set_time_unknown_pps(ptr(h), time.full_secs, time.frac_secs) })
    }

    fn usrp_time_synchronized(&self, h: Raw<Usrp>, out: &mut bool) -> Status {
        status(unsafe { uhd_usrp_get_time_synchronized(ptr(h), out) })
    }

    fn usrp_set_command_time(&self, h: Raw<Usrp>, time: TimeSpec, mboard: usize) -> Status {
        status(unsafe {
            uhd_usrp_set_command_time(ptr(h), time.full_secs, time.frac_secs, mboard)
        })
    }

    fn usrp_clear_command_time(&self, h: Raw<Usrp>, mboard: usize) -> Status {
        status(unsafe { uhd_usrp_clear_command_time(ptr(h), mboard) })
    }

    fn usrp_set_time_source(&self, h: Raw<Usrp>, source: &str, mboard: usize) -> Status {
        let source = c!(source);
        status(unsafe { uhd_usrp_set_time_source(ptr(h), source.as_ptr(), mboard) })
    }

    fn usrp_time_source(&self, h: Raw<Usrp>, mboard: usize, buf: &mut [u8]) -> Status {
        status(unsafe {
            uhd_usrp_get_time_source(ptr(h), mboard, buf.as_mut_ptr().cast(), buf.len())
        })
    }

    fn usrp_time_sources(&self, h: Raw<Usrp>, mboard: usize, out: Raw<StringVector>) -> Status {
        let mut p = ptr(out);
        status(unsafe { uhd_usrp_get_time_sources(ptr(h), mboard, &mut p) })
    }

    fn usrp_set_clock_source(&self, h: Raw<Usrp>, source: &str, mboard: usize) -> Status {
        let source = c!(source);
        status(unsafe { uhd_usrp_set_clock_source(ptr(h), source.as_ptr(), mboard) })
    }

    fn usrp_clock_source(&self, h: Raw<Usrp>, mboard: usize, buf: &mut [u8]) -> Status {
        status(unsafe {
            uhd_usrp_get_clock_source(ptr(h), mboard, buf.as_mut_ptr().cast(), buf.len())
        })
    }

    fn usrp_clock_sources(&self, h: Raw<Usrp>, mboard: usize, out: Raw<StringVector>) -> Status {
        let mut p = ptr(out);
        status(unsafe { uhd_usrp_get_clock_sources(ptr(h), mboard, &mut p) })
    }

    fn usrp_set_clock_source_out(&self, h: Raw<Usrp>, enable: bool, mboard: usize) -> Status {
        status(unsafe { uhd_usrp_set_clock_source_out(ptr(h), enable, mboard) })
    }

    fn usrp_set_time_source_out(&self, h: Raw<Usrp>, enable: bool, mboard: usize) -> Status {
        status(unsafe { uhd_usrp_set_time_source_out(ptr(h), enable, mboard) })
    }

    fn usrp_mboard_sensor(
        &self,
        h: Raw<Usrp>,
        name: &str,
        mboard: usize,
        out: Raw<SensorValue>,
    ) -> Status {
        let name = c!(name);
        let mut p = ptr(out);
        status(unsafe { uhd_usrp_get_mboard_sensor(ptr(h), name.as_ptr(), mboard, &mut p) })
    }

    fn usrp_mboard_sensor_names(
        &self,
        h: Raw<Usrp>,
        mboard: usize,
        out: Raw<StringVector>,
    ) -> Status {
        let mut p = ptr(out);
        status(unsafe { uhd_usrp_get_mboard_sensor_names(ptr(h), mboard, &mut p) })
    }

    fn usrp_set_user_register(&self, h: Raw<Usrp>, addr: u8, data: u32, mboard: usize) -> Status {
        status(unsafe { uhd_usrp_set_user_register(ptr(h), addr, data, mboard) })
    }

    fn usrp_set_subdev_spec(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        spec: Raw<SubdevSpec>,
        mboard: usize,
    ) -> Status {
        dir_call!(
            dir,
            uhd_usrp_set_rx_subdev_spec | uhd_usrp_set_tx_subdev_spec(ptr(h), ptr(spec), mboard)
        )
    }

    fn usrp_subdev_spec(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        mboard: usize,
        out: Raw<SubdevSpec>,
    ) -> Status {
        dir_call!(
            dir,
            uhd_usrp_get_rx_subdev_spec | uhd_usrp_get_tx_subdev_spec(ptr(h), mboard, ptr(out))
        )
    }

    fn usrp_num_channels(&self, h: Raw<Usrp>, dir: Direction, out: &mut usize) -> Status {
        dir_call!(dir, uhd_usrp_get_rx_num_channels | uhd_usrp_get_tx_num_channels(ptr(h), out))
    }

    fn usrp_subdev_name(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        chan: usize,
        buf: &mut [u8],
    ) -> Status {
        let (out, len) = (buf.as_mut_ptr().cast(), buf.len());
        dir_call!(
            dir,
            uhd_usrp_get_rx_subdev_name | uhd_usrp_get_tx_subdev_name(ptr(h), chan, out, len)
        )
    }

    fn usrp_set_rate(&self, h: Raw<Usrp>, dir: Direction, rate: f64, chan: usize) -> Status {
        dir_call!(dir, uhd_usrp_set_rx_rate | uhd_usrp_set_tx_rate(ptr(h), rate, chan))
    }

    fn usrp_rate(&self, h: Raw<Usrp>, dir: Direction, chan: usize, out: &mut f64) -> Status {
        dir_call!(dir, uhd_usrp_get_rx_rate | uhd_usrp_get_tx_rate(ptr(h), chan, out))
    }

    fn usrp_rates(&self, h: Raw<Usrp>, dir: Direction, chan: usize, out: Raw<MetaRange>) -> Status {
        dir_call!(dir, uhd_usrp_get_rx_rates | uhd_usrp_get_tx_rates(ptr(h), chan, ptr(out)))
    }

    fn usrp_set_freq(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        request: &TuneRequest,
        chan: usize,
        result: &mut TuneResult,
    ) -> Status {
        let args = c!(request.args.as_str());
        let mut raw = uhd_tune_request_t {
            target_freq: request.target_freq,
            rf_freq_policy: request.rf_freq_policy.as_raw(),
            rf_freq: request.rf_freq,
            dsp_freq_policy: request.dsp_freq_policy.as_raw(),
            dsp_freq: request.dsp_freq,
            args: args.as_ptr().cast_mut(),
        };
        dir_call!(dir, uhd_usrp_set_rx_freq | uhd_usrp_set_tx_freq(ptr(h), &mut raw, chan, result))
    }

    fn usrp_freq(&self, h: Raw<Usrp>, dir: Direction, chan: usize, out: &mut f64) -> Status {
        dir_call!(dir, uhd_usrp_get_rx_freq | uhd_usrp_get_tx_freq(ptr(h), chan, out))
    }

    fn usrp_freq_range(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<MetaRange>,
    ) -> Status {
        dir_call!(
            dir,
            uhd_usrp_get_rx_freq_range | uhd_usrp_get_tx_freq_range(ptr(h), chan, ptr(out))
        )
    }

    fn usrp_fe_freq_range(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<MetaRange>,
    ) -> Status {
        dir_call!(
            dir,
            uhd_usrp_get_fe_rx_freq_range | uhd_usrp_get_fe_tx_freq_range(ptr(h), chan, ptr(out))
        )
    }

    fn usrp_lo_names(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<StringVector>,
    ) -> Status {
        let mut p = ptr(out);
        dir_call!(dir, uhd_usrp_get_rx_lo_names | uhd_usrp_get_tx_lo_names(ptr(h), chan, &mut p))
    }

    fn usrp_set_lo_source(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        source: &str,
        name: &str,
        chan: usize,
    ) -> Status {
        let (source, name) = (c!(source), c!(name));
        dir_call!(
            dir,
            uhd_usrp_set_rx_lo_source
                | uhd_usrp_set_tx_lo_source(ptr(h), source.as_ptr(), name.as_ptr(), chan)
        )
    }

    fn usrp_lo_source(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        name: &str,
        chan: usize,
        buf: &mut [u8],
    ) -> Status {
        let name = c!(name);
        let (out, len) = (buf.as_mut_ptr().cast(), buf.len());
        dir_call!(
            dir,
            uhd_usrp_get_rx_lo_source
                | uhd_usrp_get_tx_lo_source(ptr(h), name.as_ptr(), chan, out, len)
        )
    }

    fn usrp_lo_sources(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        name: &str,
        chan: usize,
        out: Raw<StringVector>,
    ) -> Status {
        let name = c!(name);
        let mut p = ptr(out);
        dir_call!(
            dir,
            uhd_usrp_get_rx_lo_sources
                | uhd_usrp_get_tx_lo_sources(ptr(h), name.as_ptr(), chan, &mut p)
        )
    }

    fn usrp_set_lo_export_enabled(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        enabled: bool,
        name: &str,
        chan: usize,
    ) -> Status {
        let name = c!(name);
        dir_call!(
            dir,
            uhd_usrp_set_rx_lo_export_enabled
                | uhd_usrp_set_tx_lo_export_enabled(ptr(h), enabled, name.as_ptr(), chan)
        )
    }

    fn usrp_lo_export_enabled(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        name: &str,
        chan: usize,
        out: &mut bool,
    ) -> Status {
        let name = c!(name);
        dir_call!(
            dir,
            uhd_usrp_get_rx_lo_export_enabled
                | uhd_usrp_get_tx_lo_export_enabled(ptr(h), name.as_ptr(), chan, out)
        )
    }

    fn usrp_set_lo_freq(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        freq: f64,
        name: &str,
        chan: usize,
        coerced: &mut f64,
    ) -> Status {
        let name = c!(name);
        dir_call!(
            dir,
            uhd_usrp_set_rx_lo_freq
                | uhd_usrp_set_tx_lo_freq(ptr(h), freq, name.as_ptr(), chan, coerced)
        )
    }

    fn usrp_lo_freq(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        name: &str,
        chan: usize,
        out: &mut f64,
    ) -> Status {
        let name = c!(name);
        dir_call!(
            dir,
            uhd_usrp_get_rx_lo_freq | uhd_usrp_get_tx_lo_freq(ptr(h), name.as_ptr(), chan, out)
        )
    }

    fn usrp_set_gain(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        gain: f64,
        chan: usize,
        name: &str,
    ) -> Status {
        let name = c!(name);
        dir_call!(
            dir,
            uhd_usrp_set_rx_gain | uhd_usrp_set_tx_gain(ptr(h), gain, chan, name.as_ptr())
        )
    }

    fn usrp_set_normalized_gain(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        gain: f64,
        chan: usize,
    ) -> Status {
        dir_call!(
            dir,
            uhd_usrp_set_normalized_rx_gain | uhd_usrp_set_normalized_tx_gain(ptr(h), gain, chan)
        )
    }

    fn usrp_gain(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        chan: usize,
        name: &str,
        out: &mut f64,
    ) -> Status {
        let name = c!(name);
        dir_call!(
            dir,
            uhd_usrp_get_rx_gain | uhd_usrp_get_tx_gain(ptr(h), chan, name.as_ptr(), out)
        )
    }

    fn usrp_normalized_gain(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        chan: usize,
        out: &mut f64,
    ) -> Status {
        dir_call!(
            dir,
            uhd_usrp_get_normalized_rx_gain | uhd_usrp_get_normalized_tx_gain(ptr(h), chan, out)
        )
    }

    fn usrp_gain_range(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        name: &str,
        chan: usize,
        out: Raw<MetaRange>,
    ) -> Status {
        let name = c!(name);
        dir_call!(
            dir,
            uhd_usrp_get_rx_gain_range
                | uhd_usrp_get_tx_gain_range(ptr(h), name.as_ptr(), chan, ptr(out))
        )
    }

    fn usrp_gain_names(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<StringVector>,
    ) -> Status {
        let mut p = ptr(out);
        dir_call!(
            dir,
            uhd_usrp_get_rx_gain_names | uhd_usrp_get_tx_gain_names(ptr(h), chan, &mut p)
        )
    }

    fn usrp_set_antenna(&self, h: Raw<Usrp>, dir: Direction, antenna: &str, chan: usize) -> Status {
        let antenna = c!(antenna);
        dir_call!(
            dir,
            uhd_usrp_set_rx_antenna | uhd_usrp_set_tx_antenna(ptr(h), antenna.as_ptr(), chan)
        )
    }

    fn usrp_antenna(&self, h: Raw<Usrp>, dir: Direction, chan: usize, buf: &mut [u8]) -> Status {
        let (out, len) = (buf.as_mut_ptr().cast(), buf.len());
        dir_call!(dir, uhd_usrp_get_rx_antenna | uhd_usrp_get_tx_antenna(ptr(h), chan, out, len))
    }

    fn usrp_antennas(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<StringVector>,
    ) -> Status {
        let mut p = ptr(out);
        dir_call!(dir, uhd_usrp_get_rx_antennas | uhd_usrp_get_tx_antennas(ptr(h), chan, &mut p))
    }

    fn usrp_set_bandwidth(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        bandwidth: f64,
        chan: usize,
    ) -> Status {
        dir_call!(
            dir,
            uhd_usrp_set_rx_bandwidth | uhd_usrp_set_tx_bandwidth(ptr(h), bandwidth, chan)
        )
    }

    fn usrp_bandwidth(&self, h: Raw<Usrp>, dir: Direction, chan: usize, out: &mut f64) -> Status {
        dir_call!(dir, uhd_usrp_get_rx_bandwidth | uhd_usrp_get_tx_bandwidth(ptr(h), chan, out))
    }

    fn usrp_bandwidth_range(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<MetaRange>,
    ) -> Status {
        dir_call!(
            dir,
            uhd_usrp_get_rx_bandwidth_range
                | uhd_usrp_get_tx_bandwidth_range(ptr(h), chan, ptr(out))
        )
    }

    fn usrp_sensor(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        name: &str,
        chan: usize,
        out: Raw<SensorValue>,
    ) -> Status {
        let name = c!(name);
        let mut p = ptr(out);
        dir_call!(
            dir,
            uhd_usrp_get_rx_sensor | uhd_usrp_get_tx_sensor(ptr(h), name.as_ptr(), chan, &mut p)
        )
    }

    fn usrp_sensor_names(
        &self,
        h: Raw<Usrp>,
        dir: Direction,
        chan: usize,
        out: Raw<StringVector>,
    ) -> Status {
        let mut p = ptr(out);
        dir_call!(
            dir,
            uhd_usrp_get_rx_sensor_names | uhd_usrp_get_tx_sensor_names(ptr(h), chan, &mut p)
        )
    }

    fn usrp_set_rx_agc(&self, h: Raw<Usrp>, enable: bool, chan: usize) -> Status {
        status(unsafe { uhd_usrp_set_rx_agc(ptr(h), enable, chan) })
    }

    fn usrp_set_rx_dc_offset_enabled(&self, h: Raw<Usrp>, enable: bool, chan: usize) -> Status {
        status(unsafe { uhd_usrp_set_rx_dc_offset_enabled(ptr(h), enable, chan) })
    }

    fn usrp_set_rx_iq_balance_enabled(&self, h: Raw<Usrp>, enable: bool, chan: usize) -> Status {
        status(unsafe { uhd_usrp_set_rx_iq_balance_enabled(ptr(h), enable, chan) })
    }
}
