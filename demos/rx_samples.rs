//! Receive a timed, two-channel block of samples and print per-channel power.
//!
//! ```bash
//! cargo run --example rx_samples -- -c 433.92M -n 50000 -v
//! ```

use std::time::Duration;

use clap::{ArgAction, Parser};
use libuhd::{
    ChainConfig, Gain, RxErrorCode, StreamArgs, StreamCmd, TimeSpec, Uhd, UsrpConfig,
};
use num_complex::Complex;

#[derive(Parser, Debug)]
#[command(about = "Timed two-channel receive on the simulated device")]
struct Args {
    /// Center frequency in Hz
    #[arg(short, long, default_value_t = 433.92e6)]
    center_freq: f64,

    /// Sample rate in Hz
    #[arg(short, long, default_value_t = 2e6)]
    sample_rate: f64,

    /// Samples per channel
    #[arg(short, long, default_value_t = 20_000)]
    num_samps: usize,

    /// Verbosity level (-v=info, -vv=debug, -vvv=trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .try_init();

    let uhd = Uhd::sim();
    let config = UsrpConfig {
        clock_source: Some("internal".to_string()),
        rx: Some(ChainConfig {
            channels: vec![0, 1],
            lo_offset: Some(args.sample_rate / 4.0),
            gain: Gain::Manual(40.0),
            ..ChainConfig::new(args.center_freq, args.sample_rate)
        }),
        ..Default::default()
    };
    let usrp = uhd.open(&config.args)?;
    for tuned in usrp.apply(&config)? {
        println!(
            "{} channel {}: rf {:.0} Hz + dsp {:.0} Hz",
            tuned.dir, tuned.chan, tuned.result.actual_rf_freq, tuned.result.actual_dsp_freq
        );
    }

    usrp.set_time_now(TimeSpec::ZERO, 0)?;
    let mut rx = usrp.rx_stream::<Complex<f32>>(StreamArgs::default().channels([0, 1]))?;
    let mut md = uhd.rx_metadata()?;
    let mut ch0 = vec![Complex::new(0.0f32, 0.0); args.num_samps];
    let mut ch1 = ch0.clone();

    let start = TimeSpec::from_secs_f64(0.1);
    rx.issue_stream_cmd(&StreamCmd::num_samps_and_done(args.num_samps).at(start))?;

    let mut received = 0;
    while received < args.num_samps {
        let n = rx.recv(
            &mut [&mut ch0[received..], &mut ch1[received..]],
            &mut md,
            Duration::from_secs(1),
            false,
        )?;
        if received == 0 && md.has_time_spec()? {
            println!("first sample at {:.6} s", md.time_spec()?.as_secs_f64());
        }
        match md.error_code()? {
            RxErrorCode::None => received += n,
            code => anyhow::bail!("receive stopped after {received} samples: {code}"),
        }
    }

    for (chan, samples) in [&ch0, &ch1].into_iter().enumerate() {
        let power = samples.iter().map(|s| s.norm_sqr()).sum::<f32>() / samples.len() as f32;
        println!("channel {chan}: mean power {:.2} dBFS", 10.0 * power.log10());
    }
    Ok(())
}
