//! Handle lifetime tests: every object is released exactly once

mod helpers;

use libuhd::{Direction, StreamArgs, TxMetadataArgs};
use num_complex::Complex;

const ITERATIONS: usize = 10_000;

#[test]
fn test_repeated_metadata_handles_do_not_leak() {
    let (sim, uhd) = helpers::sim();
    let baseline = sim.live_handles();
    for _ in 0..ITERATIONS {
        let rx = uhd.rx_metadata().unwrap();
        let tx = uhd.tx_metadata(TxMetadataArgs::burst()).unwrap();
        let events = uhd.async_metadata().unwrap();
        drop((rx, tx, events));
    }
    assert_eq!(sim.live_handles(), baseline);
}

#[test]
fn test_repeated_value_handles_do_not_leak() {
    let (sim, uhd) = helpers::sim();
    let baseline = sim.live_handles();
    for i in 0..ITERATIONS {
        let mut list = uhd.string_list().unwrap();
        list.push("internal").unwrap();
        let mut ranges = uhd.range_list().unwrap();
        ranges.push(libuhd::Range::new(0.0, i as f64, 1.0)).unwrap();
        let spec = uhd.subdev_spec("A:A A:B").unwrap();
        let sensor = uhd.sensor_int("count", i as i32, "", "%d").unwrap();
        assert_eq!(sensor.to_int().unwrap(), i as i32);
        drop((list, ranges, spec, sensor));
    }
    assert_eq!(sim.live_handles(), baseline);
}

#[test]
fn test_repeated_sessions_and_streamers_do_not_leak() {
    let (sim, uhd) = helpers::sim();
    let baseline = sim.live_handles();
    for _ in 0..ITERATIONS / 10 {
        let usrp = uhd.open("").unwrap();
        let rx = usrp.rx_stream::<Complex<f32>>(StreamArgs::default()).unwrap();
        let tx = usrp.tx_stream::<Complex<i16>>(StreamArgs::default()).unwrap();
        // Range, list and sensor reads create and release their own handles.
        usrp.gain_range(Direction::Rx, "", 0).unwrap();
        usrp.antennas(Direction::Tx, 0).unwrap();
        drop((rx, tx, usrp));
    }
    assert_eq!(sim.live_handles(), baseline);
    assert_eq!(sim.open_sessions(), 0);
}

#[test]
fn test_streamer_outlives_session() {
    let (sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    let mut rx = usrp.rx_stream::<Complex<f32>>(StreamArgs::default()).unwrap();
    drop(usrp);
    assert_eq!(sim.open_sessions(), 1);

    rx.issue_stream_cmd(&libuhd::StreamCmd::num_samps_and_done(100))
        .unwrap();
    let mut md = uhd.rx_metadata().unwrap();
    let mut buf = vec![Complex::new(0.0f32, 0.0); 100];
    let n = rx
        .recv(&mut [&mut buf[..]], &mut md, std::time::Duration::from_secs(1), false)
        .unwrap();
    assert_eq!(n, 100);

    drop(rx);
    assert_eq!(sim.open_sessions(), 0);
}

#[test]
fn test_failed_open_leaves_nothing_behind() {
    let (sim, uhd) = helpers::sim();
    let baseline = sim.live_handles();
    for _ in 0..100 {
        assert!(uhd.open("serial=missing").is_err());
    }
    assert_eq!(sim.live_handles(), baseline);
}

#[test]
fn test_failed_stream_bind_releases_streamer() {
    let (sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    let baseline = sim.live_handles();
    let err = usrp
        .rx_stream::<Complex<f32>>(StreamArgs::default().channels([7]))
        .unwrap_err();
    assert!(err.status().is_some());
    assert_eq!(sim.live_handles(), baseline);
}
