//! Send timed bursts and wait for the device to acknowledge each one.
//!
//! ```bash
//! cargo run --example tx_bursts -- --bursts 5 -v
//! ```

use std::time::Duration;

use clap::{ArgAction, Parser};
use libuhd::{
    AsyncEventCode, Direction, StreamArgs, TimeSpec, TuneRequest, TxMetadataArgs, Uhd,
};
use num_complex::Complex;

#[derive(Parser, Debug)]
#[command(about = "Timed transmit bursts on the simulated device")]
struct Args {
    /// Center frequency in Hz
    #[arg(short, long, default_value_t = 2.45e9)]
    center_freq: f64,

    /// Number of bursts
    #[arg(long, default_value_t = 3)]
    bursts: usize,

    /// Seconds between burst starts
    #[arg(long, default_value_t = 0.25)]
    period: f64,

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
    let usrp = uhd.open("")?;
    usrp.set_rate(Direction::Tx, 1e6, 0)?;
    usrp.set_freq(Direction::Tx, &TuneRequest::new(args.center_freq), 0)?;
    usrp.set_gain(Direction::Tx, 60.0, "", 0)?;

    let mut tx = usrp.tx_stream::<Complex<i16>>(StreamArgs::default())?;
    let burst = vec![Complex::new(8_000i16, 0); tx.max_num_samps()?];

    let now = usrp.time_now(0)?.as_secs_f64();
    for i in 0..args.bursts {
        let at = TimeSpec::from_secs_f64(now + 0.1 + i as f64 * args.period);
        let md = uhd.tx_metadata(TxMetadataArgs::burst().at(at))?;
        let sent = tx.send(&[&burst[..]], &md, Duration::from_secs(1))?;
        println!("burst {i}: {sent} samples at {:.3} s", at.as_secs_f64());

        match tx.next_async_event(Duration::from_secs(1))? {
            Some(event) if event.event_code.contains(AsyncEventCode::BURST_ACK) => {
                println!("  acknowledged on channel {}", event.channel);
            }
            Some(event) => println!("  event {:?}", event.event_code),
            None => println!("  no acknowledgement"),
        }
    }
    Ok(())
}
