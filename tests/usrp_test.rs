//! Device session tests against the simulated device

mod helpers;

use approx::assert_relative_eq;
use libuhd::uhd_driver::sim::SimDevice;
use libuhd::{
    ALL_LOS, ChainConfig, Channel, Direction, Error, Gain, Mboard, SensorReading, Status, TimeSpec,
    TunePolicy, TuneRequest, UsrpConfig,
};

#[test]
fn test_session_identity() {
    let (_sim, uhd) = helpers::sim();
    let usrp = uhd.open("type=b200").unwrap();
    assert_eq!(usrp.num_mboards().unwrap(), 1);
    assert_eq!(usrp.mboard_name(0).unwrap(), "B210");
    assert_eq!(usrp.num_channels(Direction::Rx).unwrap(), 2);
    assert_eq!(usrp.num_channels(Direction::Tx).unwrap(), 2);
    assert!(usrp.pp_string().unwrap().contains("31A1B2C"));

    let info = usrp.info(Direction::Rx, 1).unwrap();
    assert_eq!(info.mboard_serial, "31A1B2C");
    assert_eq!(info.antenna, "RX2");
    assert_eq!(info.subdev_spec, "A:A A:B");
}

#[test]
fn test_find_filters_devices() {
    let (_sim, uhd) = helpers::sim_with(vec![SimDevice::b210("AAA"), SimDevice::b200("BBB")]);
    assert_eq!(uhd.find("").unwrap().len(), 2);
    let found = uhd.find("product=B200").unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].contains("serial=BBB"));

    let usrp = uhd.open("serial=BBB").unwrap();
    assert_eq!(usrp.num_channels(Direction::Rx).unwrap(), 1);
}

#[test]
fn test_none_none_tune_is_a_no_op() {
    let (sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    usrp.set_rate(Direction::Rx, 4e6, 0).unwrap();
    usrp.set_freq(Direction::Rx, &TuneRequest::with_lo_offset(915.3e6, 1e6), 0)
        .unwrap();
    let before = sim.rx_frequency_state(0).unwrap();
    assert_relative_eq!(before.0, 916.3e6);
    assert_relative_eq!(before.1, -1e6, epsilon = 1e-3);

    let request = TuneRequest::new(100e6)
        .rf(TunePolicy::None, 0.0)
        .dsp(TunePolicy::None, 0.0);
    let result = usrp.set_freq(Direction::Rx, &request, 0).unwrap();
    assert_eq!(sim.rx_frequency_state(0).unwrap(), before);
    assert_eq!(result.actual_rf_freq, before.0);
    assert_eq!(result.actual_dsp_freq, before.1);
    assert_relative_eq!(usrp.freq(Direction::Rx, 0).unwrap(), 915.3e6, epsilon = 1e-3);
}

#[test]
fn test_tune_policies_reach_the_device() {
    let (sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    for policy in [TunePolicy::None, TunePolicy::Auto, TunePolicy::Manual] {
        let request = TuneRequest::new(2.4e9)
            .rf(policy, 2.4e9)
            .dsp(policy, 0.0)
            .args("mode_n=integer");
        usrp.set_freq(Direction::Tx, &request, 1).unwrap();
        let (dir, chan, seen) = sim.last_tune_request().unwrap();
        assert_eq!((dir, chan), (Direction::Tx, 1));
        assert_eq!(seen, request);
        assert_eq!(TunePolicy::from_raw(policy.as_raw()), Some(policy));
    }
}

#[test]
fn test_tune_is_clipped_to_front_end_range() {
    let (_sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    let result = usrp
        .set_freq(Direction::Rx, &TuneRequest::new(10e9), 0)
        .unwrap();
    let fe = usrp.fe_freq_range(Direction::Rx, 0).unwrap();
    assert_eq!(result.clipped_rf_freq, fe.stop());
    assert_eq!(result.target_rf_freq, 10e9);
    assert!(usrp.freq_range(Direction::Rx, 0).unwrap().stop() > fe.stop());
}

#[test]
fn test_gain_is_clipped_and_broadcast() {
    let (_sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    let range = usrp.gain_range(Direction::Rx, "", 0).unwrap();
    assert_eq!((range.start(), range.stop(), range.step()), (0.0, 76.0, 1.0));
    assert_eq!(usrp.gain_names(Direction::Rx, 0).unwrap(), vec!["PGA"]);

    usrp.set_gain(Direction::Rx, 30.4, "", Channel::All).unwrap();
    assert_eq!(usrp.gain(Direction::Rx, "", 0).unwrap(), 30.0);
    assert_eq!(usrp.gain(Direction::Rx, "PGA", 1).unwrap(), 30.0);

    usrp.set_gain(Direction::Rx, 500.0, "PGA", 0).unwrap();
    assert_eq!(usrp.gain(Direction::Rx, "", 0).unwrap(), 76.0);

    usrp.set_normalized_gain(Direction::Tx, 0.5, 0).unwrap();
    assert_relative_eq!(usrp.normalized_gain(Direction::Tx, 0).unwrap(), 0.5, epsilon = 0.01);
    let err = usrp
        .set_normalized_gain(Direction::Tx, 1.5, 0)
        .unwrap_err();
    assert_eq!(err.status(), Some(Status::Value));
}

#[test]
fn test_errors_carry_the_driver_diagnostic() {
    let (_sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();

    let err = usrp.set_antenna(Direction::Rx, "BAD", 0).unwrap_err();
    assert_eq!(err.status(), Some(Status::Value));
    assert!(err.message().unwrap().contains("BAD"));
    assert!(err.to_string().starts_with("UHD_ERROR_VALUE"));

    let err = usrp.rate(Direction::Rx, 9).unwrap_err();
    assert_eq!(err.status(), Some(Status::Index));

    let err = usrp.gain(Direction::Rx, "LNA", 0).unwrap_err();
    assert_eq!(err.status(), Some(Status::Key));

    let err = usrp.master_clock_rate(3).unwrap_err();
    assert_eq!(err.status(), Some(Status::Index));

    // A later successful call is unaffected by the earlier failure.
    usrp.set_antenna(Direction::Rx, "TX/RX", 0).unwrap();
    assert_eq!(usrp.antenna(Direction::Rx, 0).unwrap(), "TX/RX");
}

#[test]
fn test_rate_and_bandwidth() {
    let (_sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    usrp.set_rate(Direction::Tx, 2e6, Channel::All).unwrap();
    assert_eq!(usrp.rate(Direction::Tx, 1).unwrap(), 2e6);
    assert!(usrp.rates(Direction::Tx, 0).unwrap().contains(2e6));

    usrp.set_bandwidth(Direction::Rx, 1e9, 0).unwrap();
    let range = usrp.bandwidth_range(Direction::Rx, 0).unwrap();
    assert_eq!(usrp.bandwidth(Direction::Rx, 0).unwrap(), range.stop());
}

#[test]
fn test_clock_and_time() {
    let (_sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    assert_eq!(usrp.master_clock_rate(0).unwrap(), 32e6);
    usrp.set_master_clock_rate(16e6, Mboard::All).unwrap();
    assert_eq!(usrp.master_clock_rate(0).unwrap(), 16e6);

    usrp.set_time_next_pps(TimeSpec::new(3, 0.0), 0).unwrap();
    assert_eq!(usrp.time_last_pps(0).unwrap(), TimeSpec::new(3, 0.0));
    usrp.set_time_unknown_pps(TimeSpec::ZERO).unwrap();
    assert_eq!(usrp.time_now(0).unwrap(), TimeSpec::ZERO);
    assert!(usrp.time_synchronized().unwrap());

    usrp.set_command_time(TimeSpec::new(1, 0.5), Mboard::All).unwrap();
    usrp.clear_command_time(0).unwrap();
    usrp.set_user_register(4, 0xdead_beef, 0).unwrap();
}

#[test]
fn test_clock_sources_and_sensors() {
    let (_sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    assert!(usrp.clock_sources(0).unwrap().contains(&"gpsdo".to_string()));
    assert_eq!(usrp.clock_source(0).unwrap(), "internal");
    assert_eq!(
        usrp.mboard_sensor("ref_locked", 0).unwrap().reading().unwrap(),
        SensorReading::Boolean(false)
    );

    usrp.set_clock_source("external", 0).unwrap();
    usrp.set_time_source("external", Mboard::All).unwrap();
    assert_eq!(usrp.time_source(0).unwrap(), "external");
    usrp.set_clock_source_out(true, 0).unwrap();
    usrp.set_time_source_out(false, 0).unwrap();
    let locked = usrp.mboard_sensor("ref_locked", 0).unwrap();
    assert!(locked.to_bool().unwrap());
    assert_eq!(locked.unit().unwrap(), "locked");

    let err = usrp.set_clock_source("atomic", 0).unwrap_err();
    assert_eq!(err.status(), Some(Status::Value));

    usrp.set_gain(Direction::Rx, 20.0, "", 0).unwrap();
    assert_eq!(
        usrp.sensor_names(Direction::Rx, 0).unwrap(),
        vec!["lo_locked", "rssi"]
    );
    let rssi = usrp.sensor(Direction::Rx, "rssi", 0).unwrap();
    assert_relative_eq!(rssi.to_real().unwrap(), -80.0);
    assert_eq!(usrp.mboard_sensor_names(0).unwrap(), vec!["ref_locked", "temp"]);
    assert_eq!(
        usrp.sensor(Direction::Tx, "rssi", 0).unwrap_err().status(),
        Some(Status::Key)
    );
}

#[test]
fn test_local_oscillators() {
    let (_sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    let names = usrp.lo_names(Direction::Rx, 0).unwrap();
    assert_eq!(names, vec!["RX_LO"]);
    let lo = &names[0];

    assert_eq!(usrp.lo_sources(Direction::Rx, lo, 0).unwrap(), vec!["internal", "external"]);
    usrp.set_lo_source(Direction::Rx, "external", ALL_LOS, Channel::All)
        .unwrap();
    assert_eq!(usrp.lo_source(Direction::Rx, lo, 1).unwrap(), "external");

    usrp.set_lo_export_enabled(Direction::Rx, true, lo, 0).unwrap();
    assert!(usrp.lo_export_enabled(Direction::Rx, lo, 0).unwrap());

    let coerced = usrp.set_lo_freq(Direction::Rx, 1.2345678e9, lo, 0).unwrap();
    assert_eq!(coerced, 1.234568e9);
    assert_eq!(usrp.lo_freq(Direction::Rx, lo, 0).unwrap(), coerced);

    let err = usrp.lo_freq(Direction::Rx, "TX_LO", 0).unwrap_err();
    assert_eq!(err.status(), Some(Status::Key));
}

#[test]
fn test_subdev_spec_remaps_channels() {
    let (_sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    let spec = usrp.subdev_spec(Direction::Rx, 0).unwrap();
    assert_eq!(spec.markup().unwrap(), "A:A A:B");
    assert_eq!(spec.len().unwrap(), 2);

    let single = uhd.subdev_spec("A:B").unwrap();
    usrp.set_subdev_spec(Direction::Rx, &single, Mboard::All).unwrap();
    assert_eq!(usrp.num_channels(Direction::Rx).unwrap(), 1);
    assert_eq!(usrp.subdev_name(Direction::Rx, 0).unwrap(), "FE-RX2");

    let bad = uhd.subdev_spec("C:A").unwrap();
    let err = usrp
        .set_subdev_spec(Direction::Tx, &bad, 0)
        .unwrap_err();
    assert_eq!(err.status(), Some(Status::Value));
}

#[test]
fn test_rx_front_end_corrections() {
    let (_sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    usrp.set_rx_agc(true, Channel::All).unwrap();
    usrp.set_rx_dc_offset_enabled(false, 0).unwrap();
    usrp.set_rx_iq_balance_enabled(false, 1).unwrap();
    assert!(usrp.set_rx_agc(true, 4).is_err());
}

#[test]
fn test_apply_config() {
    let (sim, uhd) = helpers::sim();
    let config = UsrpConfig {
        clock_source: Some("gpsdo".to_string()),
        time_source: Some("gpsdo".to_string()),
        rx: Some(ChainConfig {
            channels: vec![0, 1],
            lo_offset: Some(1e6),
            gain: Gain::Manual(25.0),
            antenna: Some("TX/RX".to_string()),
            bandwidth: Some(5e6),
            ..ChainConfig::new(433.92e6, 4e6)
        }),
        tx: Some(ChainConfig::new(868e6, 1e6)),
        ..Default::default()
    };
    let usrp = uhd.open(&config.args).unwrap();
    let tuned = usrp.apply(&config).unwrap();

    assert_eq!(tuned.len(), 3);
    assert_eq!((tuned[0].dir, tuned[0].chan), (Direction::Rx, 0));
    assert_eq!((tuned[2].dir, tuned[2].chan), (Direction::Tx, 0));
    assert_relative_eq!(tuned[1].result.actual_rf_freq, 434.92e6);
    assert_relative_eq!(tuned[1].result.actual_dsp_freq, -1e6, epsilon = 1e-3);

    assert_eq!(usrp.clock_source(0).unwrap(), "gpsdo");
    assert_eq!(usrp.time_source(0).unwrap(), "gpsdo");
    assert_eq!(usrp.rate(Direction::Rx, 1).unwrap(), 4e6);
    assert_eq!(usrp.gain(Direction::Rx, "", 1).unwrap(), 25.0);
    assert_eq!(usrp.antenna(Direction::Rx, 1).unwrap(), "TX/RX");
    assert_eq!(usrp.bandwidth(Direction::Rx, 0).unwrap(), 5e6);
    assert_relative_eq!(usrp.freq(Direction::Tx, 0).unwrap(), 868e6);

    let (dir, chan, request) = sim.last_tune_request().unwrap();
    assert_eq!((dir, chan), (Direction::Tx, 0));
    assert_eq!(request.rf_freq_policy, TunePolicy::Auto);
}

#[test]
fn test_apply_stops_at_first_rejected_setting() {
    let (_sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    let config = UsrpConfig {
        rx: Some(ChainConfig {
            antenna: Some("NOPE".to_string()),
            bandwidth: Some(5e6),
            ..ChainConfig::new(100e6, 1e6)
        }),
        ..Default::default()
    };
    let err = usrp.apply(&config).unwrap_err();
    assert_eq!(err.status(), Some(Status::Value));
    // Tuning came before the antenna; bandwidth after it was never applied.
    assert_relative_eq!(usrp.freq(Direction::Rx, 0).unwrap(), 100e6);
    assert_ne!(usrp.bandwidth(Direction::Rx, 0).unwrap(), 5e6);
}

#[test]
fn test_nul_in_string_argument_is_refused_before_the_driver() {
    let (_sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    // Leave a diagnostic on the session the refusal must not pick up.
    let err = usrp.set_antenna(Direction::Rx, "BOGUS", 0).unwrap_err();
    assert!(err.message().unwrap().contains("BOGUS"));

    let err = usrp.set_antenna(Direction::Rx, "RX\02", 0).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(err.to_string().contains("NUL"));
    assert!(matches!(usrp.gain(Direction::Rx, "PGA\0", 0), Err(Error::InvalidArgument(_))));
    assert!(matches!(uhd.open("type=b200\0"), Err(Error::InvalidArgument(_))));
    assert!(matches!(uhd.find("\0"), Err(Error::InvalidArgument(_))));
    assert_eq!(usrp.antenna(Direction::Rx, 0).unwrap(), "RX2");
}
