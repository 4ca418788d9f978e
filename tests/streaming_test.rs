//! Streaming tests against the simulated device

mod helpers;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use libuhd::{
    AsyncEventCode, Direction, Error, RxErrorCode, Status, StreamArgs, StreamCmd, StreamMode,
    TimeSpec, TxMetadataArgs,
};
use num_complex::Complex;

#[test]
fn test_recv_on_idle_stream_times_out_in_metadata() {
    let (_sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    let mut rx = usrp.rx_stream::<Complex<f32>>(StreamArgs::default()).unwrap();
    let mut md = uhd.rx_metadata().unwrap();
    let mut buf = vec![Complex::new(0.0f32, 0.0); 256];

    let n = rx
        .recv(&mut [&mut buf[..]], &mut md, Duration::ZERO, false)
        .unwrap();
    assert_eq!(n, 0);
    assert_eq!(md.error_code().unwrap(), RxErrorCode::Timeout);
    assert!(md.strerror().unwrap().contains("TIMEOUT"));
}

#[test]
fn test_recv_async_msg_without_events_returns_immediately() {
    let (_sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    let mut tx = usrp.tx_stream::<Complex<f32>>(StreamArgs::default()).unwrap();
    let mut md = uhd.async_metadata().unwrap();

    let start = Instant::now();
    assert!(!tx.recv_async_msg(&mut md, Duration::ZERO).unwrap());
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(tx.next_async_event(Duration::ZERO).unwrap(), None);
}

#[test]
fn test_finite_receive_fills_buffers_and_flags_burst() {
    let (_sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    usrp.set_rate(Direction::Rx, 1e6, 0).unwrap();
    let mut rx = usrp.rx_stream::<Complex<i16>>(StreamArgs::default()).unwrap();
    assert_eq!(rx.num_channels(), 1);
    let max = rx.max_num_samps().unwrap();
    assert_eq!(max, 2000);

    let mut md = uhd.rx_metadata().unwrap();
    let mut buf = vec![Complex::new(0i16, 0); 5000];
    rx.issue_stream_cmd(&StreamCmd::num_samps_and_done(3000))
        .unwrap();

    let n = rx
        .recv(&mut [&mut buf[..]], &mut md, Duration::from_secs(1), true)
        .unwrap();
    assert_eq!(n, max);
    assert!(md.start_of_burst().unwrap());
    assert!(!md.end_of_burst().unwrap());
    assert_eq!(buf[0], Complex::new(16384, 0));

    let n = rx
        .recv(&mut [&mut buf[..]], &mut md, Duration::from_secs(1), false)
        .unwrap();
    assert_eq!(n, 1000);
    assert!(md.end_of_burst().unwrap());
    assert_eq!(md.error_code().unwrap(), RxErrorCode::None);
    assert_relative_eq!(md.time_spec().unwrap().as_secs_f64(), 2e-3, epsilon = 1e-9);
}

#[test]
fn test_two_channel_receive() {
    let (_sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    let mut rx = usrp
        .rx_stream::<Complex<f64>>(StreamArgs::default().channels([0, 1]))
        .unwrap();
    assert_eq!(rx.num_channels(), 2);

    let mut md = uhd.rx_metadata().unwrap();
    let mut a = vec![Complex::new(0.0, 0.0); 64];
    let mut b = vec![Complex::new(0.0, 0.0); 64];
    rx.issue_stream_cmd(&StreamCmd::start_continuous()).unwrap();
    let n = rx
        .recv(&mut [&mut a[..], &mut b[..]], &mut md, Duration::from_secs(1), false)
        .unwrap();
    assert_eq!(n, 64);
    assert_eq!(a, b);
    assert_relative_eq!(a[0].re, 0.5);

    let err = rx
        .recv(&mut [&mut a[..]], &mut md, Duration::ZERO, false)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    rx.issue_stream_cmd(&StreamCmd::stop_continuous()).unwrap();
}

#[test]
fn test_late_timed_start_is_reported_in_metadata() {
    let (_sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    usrp.set_time_now(TimeSpec::new(10, 0.0), 0).unwrap();
    let mut rx = usrp.rx_stream::<Complex<f32>>(StreamArgs::default()).unwrap();
    let mut md = uhd.rx_metadata().unwrap();
    let mut buf = vec![Complex::new(0.0f32, 0.0); 100];

    rx.issue_stream_cmd(&StreamCmd::start_continuous().at(TimeSpec::new(1, 0.0)))
        .unwrap();
    let n = rx
        .recv(&mut [&mut buf[..]], &mut md, Duration::from_secs(1), false)
        .unwrap();
    assert_eq!(n, 0);
    assert_eq!(md.error_code().unwrap(), RxErrorCode::LateCommand);
}

#[test]
fn test_every_rx_error_code_round_trips() {
    let (sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    let mut rx = usrp.rx_stream::<Complex<f32>>(StreamArgs::default()).unwrap();
    let mut md = uhd.rx_metadata().unwrap();
    let mut buf = vec![Complex::new(0.0f32, 0.0); 16];

    for code in RxErrorCode::ALL {
        sim.inject_rx_error(code);
        let n = rx
            .recv(&mut [&mut buf[..]], &mut md, Duration::from_secs(1), false)
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(md.error_code().unwrap(), code);
    }
}

#[test]
fn test_every_async_event_code_round_trips() {
    let (sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    let mut tx = usrp.tx_stream::<Complex<f32>>(StreamArgs::default()).unwrap();

    let codes = [
        AsyncEventCode::BURST_ACK,
        AsyncEventCode::UNDERFLOW,
        AsyncEventCode::SEQ_ERROR,
        AsyncEventCode::TIME_ERROR,
        AsyncEventCode::UNDERFLOW_IN_PACKET,
        AsyncEventCode::SEQ_ERROR_IN_BURST,
        AsyncEventCode::UNDERFLOW | AsyncEventCode::UNDERFLOW_IN_PACKET,
    ];
    for code in codes {
        sim.inject_async_event(1, code, None);
        let event = tx.next_async_event(Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(event.event_code, code);
        assert_eq!(event.channel, 1);
        assert_eq!(event.user_payload, None);
    }

    sim.inject_async_event(0, AsyncEventCode::empty(), Some([1, 2, 3, 4]));
    let event = tx.next_async_event(Duration::from_secs(1)).unwrap().unwrap();
    assert_eq!(event.event_code, AsyncEventCode::USER_PAYLOAD);
    assert_eq!(event.user_payload, Some([1, 2, 3, 4]));
}

#[test]
fn test_every_stream_mode_round_trips() {
    let (sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    let mut rx = usrp.rx_stream::<Complex<f32>>(StreamArgs::default()).unwrap();

    let commands = [
        StreamCmd::start_continuous(),
        StreamCmd::stop_continuous(),
        StreamCmd::num_samps_and_done(10),
        StreamCmd::num_samps_and_more(20).at(TimeSpec::new(1, 0.5)),
    ];
    for cmd in commands {
        rx.issue_stream_cmd(&cmd).unwrap();
        assert_eq!(sim.last_stream_cmd(), Some(cmd));
        assert_eq!(StreamMode::from_raw(cmd.mode.as_raw()), Some(cmd.mode));
    }
}

#[test]
fn test_burst_is_acknowledged() {
    let (sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    let mut tx = usrp.tx_stream::<Complex<f32>>(StreamArgs::default()).unwrap();
    let samples = helpers::generate_tone_fc32(10e3, 1e6, 1500);
    let md = uhd.tx_metadata(TxMetadataArgs::burst()).unwrap();

    let sent = tx.send(&[&samples[..]], &md, Duration::from_secs(1)).unwrap();
    assert_eq!(sent, 1500);
    assert_eq!(sim.tx_samples_sent(), 1500);

    let event = tx.next_async_event(Duration::from_secs(1)).unwrap().unwrap();
    assert_eq!(event.event_code, AsyncEventCode::BURST_ACK);
    assert!(event.time_spec.is_some());
    assert_eq!(tx.next_async_event(Duration::ZERO).unwrap(), None);
}

#[test]
fn test_late_timed_send_reports_time_error() {
    let (_sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    usrp.set_time_now(TimeSpec::new(5, 0.0), 0).unwrap();
    let mut tx = usrp.tx_stream::<Complex<f32>>(StreamArgs::default()).unwrap();
    let samples = helpers::generate_tone_fc32(10e3, 1e6, 100);
    let md = uhd
        .tx_metadata(TxMetadataArgs::burst().at(TimeSpec::new(1, 0.0)))
        .unwrap();

    tx.send(&[&samples[..]], &md, Duration::from_secs(1)).unwrap();
    let event = tx.next_async_event(Duration::from_secs(1)).unwrap().unwrap();
    assert!(event.event_code.contains(AsyncEventCode::TIME_ERROR));
    assert!(event.event_code.is_error());
}

#[test]
fn test_split_sends_and_drains_concurrently() {
    let (_sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    let mut tx = usrp.tx_stream::<Complex<f32>>(StreamArgs::default()).unwrap();
    let samples = helpers::generate_tone_fc32(10e3, 1e6, 500);
    let md = uhd.tx_metadata(TxMetadataArgs::burst()).unwrap();
    let (mut sender, mut events) = tx.split().unwrap();

    let acks = crossbeam::scope(|s| {
        let drain = s.spawn(|_| {
            let mut acks = 0;
            while acks < 3 {
                if let Some(event) = events.next_event(Duration::from_secs(2)).unwrap() {
                    assert_eq!(event.event_code, AsyncEventCode::BURST_ACK);
                    acks += 1;
                } else {
                    break;
                }
            }
            acks
        });
        for _ in 0..3 {
            sender
                .send(&[&samples[..]], &md, Duration::from_secs(1))
                .unwrap();
        }
        drain.join().unwrap()
    })
    .unwrap();
    assert_eq!(acks, 3);
}

#[test]
fn test_cpu_format_must_match_sample_type() {
    let (_sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    let err = usrp
        .rx_stream::<Complex<f32>>(StreamArgs::new("sc16", "sc16"))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    let err = usrp
        .tx_stream::<Complex<i8>>(StreamArgs::new("sc8", "bogus"))
        .unwrap_err();
    assert_eq!(err.status(), Some(Status::Lookup));
    assert!(err.message().unwrap().contains("bogus"));
}

#[test]
fn test_split_send_failures_keep_their_diagnostic() {
    const SENDS: usize = 2000;
    let (sim, uhd) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    let mut tx = usrp.tx_stream::<Complex<f32>>(StreamArgs::default()).unwrap();
    let samples = helpers::generate_tone_fc32(10e3, 1e6, 100);
    let md = uhd.tx_metadata(TxMetadataArgs::burst()).unwrap();
    sim.inject_send_fault(SENDS);
    let (mut sender, mut events) = tx.split().unwrap();
    let done = AtomicBool::new(false);

    let lost = crossbeam::scope(|s| {
        s.spawn(|_| {
            while !done.load(Ordering::Relaxed) {
                events.next_event(Duration::ZERO).unwrap();
            }
        });
        let mut lost = 0;
        for _ in 0..SENDS {
            let err = sender
                .send(&[&samples[..]], &md, Duration::from_secs(1))
                .unwrap_err();
            assert_eq!(err.status(), Some(Status::Io));
            if err.message().is_none_or(|m| !m.contains("transport error")) {
                lost += 1;
            }
        }
        done.store(true, Ordering::Relaxed);
        lost
    })
    .unwrap();
    assert_eq!(lost, 0);

    let sent = sender.send(&[&samples[..]], &md, Duration::from_secs(1)).unwrap();
    assert_eq!(sent, 100);
}

#[test]
fn test_metadata_from_another_driver_is_refused() {
    let (_sim, uhd) = helpers::sim();
    let (_other_sim, other) = helpers::sim();
    let usrp = uhd.open("").unwrap();
    let mut rx = usrp.rx_stream::<Complex<f32>>(StreamArgs::default()).unwrap();
    let mut buf = vec![Complex::new(0.0f32, 0.0); 10];
    rx.issue_stream_cmd(&StreamCmd::num_samps_and_done(10)).unwrap();

    let mut foreign = other.rx_metadata().unwrap();
    let err = rx
        .recv(&mut [&mut buf[..]], &mut foreign, Duration::from_secs(1), false)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    // Nothing was consumed: the burst still lands in metadata of the same driver.
    let mut md = uhd.clone().rx_metadata().unwrap();
    let n = rx
        .recv(&mut [&mut buf[..]], &mut md, Duration::from_secs(1), false)
        .unwrap();
    assert_eq!(n, 10);
    assert!(md.start_of_burst().unwrap());
    assert!(md.has_time_spec().unwrap());

    let mut tx = usrp.tx_stream::<Complex<f32>>(StreamArgs::default()).unwrap();
    let samples = helpers::generate_tone_fc32(10e3, 1e6, 10);
    let foreign_tx = other.tx_metadata(TxMetadataArgs::burst()).unwrap();
    let err = tx
        .send(&[&samples[..]], &foreign_tx, Duration::from_secs(1))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    let mut foreign_async = other.async_metadata().unwrap();
    let err = tx
        .recv_async_msg(&mut foreign_async, Duration::ZERO)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}
