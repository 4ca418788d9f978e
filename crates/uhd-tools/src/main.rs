//! Probe, receive from and transmit with USRP devices
//!
//! # Usage Examples
//!
//! ## List devices
//! ```bash
//! uhd-probe find
//! uhd-probe --sim find type=b200
//! ```
//!
//! ## Describe a device
//! ```bash
//! uhd-probe probe serial=31A1B2C -v
//! ```
//!
//! ## Receive 1M samples at 915 MHz into a raw fc32 file
//! ```bash
//! uhd-probe rx -c 915M -s 1M -n 1000000 -o samples.fc32
//! ```
//!
//! ## Transmit tone bursts
//! ```bash
//! uhd-probe --sim tx -c 2.45G --tone 100k --bursts 5
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{ArgAction, Parser, Subcommand};
use libuhd::{
    Direction, RxErrorCode, StreamArgs, StreamCmd, TuneRequest, TxMetadataArgs, Uhd, Usrp,
};
use num_complex::Complex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
struct Frequency(f64);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Probe, receive from and transmit with USRP devices",
    long_about = None
)]
struct Args {
    /// Use the simulated device instead of the system libuhd
    #[arg(long, global = true, default_value_t = false)]
    sim: bool,

    /// Verbosity level (-v=info, -vv=debug, -vvv=trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List devices matching the device arguments
    Find {
        #[arg(default_value = "")]
        args: String,
    },
    /// Print what a device offers on every channel
    Probe {
        #[arg(default_value = "")]
        args: String,
    },
    /// Receive samples into a raw fc32 file
    Rx {
        #[command(flatten)]
        radio: RadioArgs,

        /// Number of samples to receive
        #[arg(short, long, default_value_t = 100_000)]
        num_samps: usize,

        /// Output file (interleaved little-endian f32 I/Q)
        #[arg(short, long, default_value = "samples.fc32")]
        output: String,
    },
    /// Transmit tone bursts while reporting transmit-path events
    Tx {
        #[command(flatten)]
        radio: RadioArgs,

        /// Tone offset from the center frequency in Hz (accepts k/M suffix)
        #[arg(long, value_parser = Frequency::from_str, default_value = "100k")]
        tone: Frequency,

        /// Samples per burst
        #[arg(long, default_value_t = 10_000)]
        burst_len: usize,

        /// Number of bursts
        #[arg(long, default_value_t = 3)]
        bursts: usize,
    },
}

#[derive(clap::Args, Debug)]
struct RadioArgs {
    /// Device arguments (e.g., "serial=31A1B2C")
    #[arg(short, long, default_value = "")]
    args: String,

    /// Center frequency in Hz (accepts k/M/G suffix, e.g. 915M)
    #[arg(short, long, value_parser = Frequency::from_str)]
    center_freq: Frequency,

    /// Sample rate in Hz (accepts k/M suffix)
    #[arg(short, long, value_parser = Frequency::from_str, default_value = "1M")]
    sample_rate: Frequency,

    /// Gain in dB (None for AGC on RX, device default on TX)
    #[arg(short, long)]
    gain: Option<f64>,

    /// Channel index
    #[arg(long, default_value_t = 0)]
    channel: usize,

    /// Antenna port
    #[arg(long)]
    antenna: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 0 = WARN (quiet), 1 = INFO, 2 = DEBUG, 3+ = TRACE
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

    let uhd = backend(args.sim)?;
    debug!("driver version {}", uhd.version()?);

    match args.command {
        Command::Find { args } => find(&uhd, &args),
        Command::Probe { args } => probe(&uhd, &args),
        Command::Rx {
            radio,
            num_samps,
            output,
        } => rx(&uhd, &radio, num_samps, &output),
        Command::Tx {
            radio,
            tone,
            burst_len,
            bursts,
        } => tx(&uhd, &radio, tone.0, burst_len, bursts),
    }
}

#[cfg(feature = "native")]
fn backend(sim: bool) -> anyhow::Result<Uhd> {
    Ok(if sim { Uhd::sim() } else { Uhd::native() })
}

#[cfg(not(feature = "native"))]
fn backend(sim: bool) -> anyhow::Result<Uhd> {
    if !sim {
        bail!("built without the \"native\" feature; pass --sim to use the simulated device");
    }
    Ok(Uhd::sim())
}

fn find(uhd: &Uhd, args: &str) -> anyhow::Result<()> {
    let found = uhd.find(args)?;
    if found.is_empty() {
        warn!("no device matches '{args}'");
    }
    for (i, device) in found.iter().enumerate() {
        println!("[{i}] {device}");
    }
    Ok(())
}

fn probe(uhd: &Uhd, args: &str) -> anyhow::Result<()> {
    let usrp = uhd.open(args)?;
    println!("{}", usrp.pp_string()?);
    for mboard in 0..usrp.num_mboards()? {
        println!("Mboard {mboard}: {}", usrp.mboard_name(mboard)?);
        println!("  clock sources: {}", usrp.clock_sources(mboard)?.join(", "));
        println!("  time sources:  {}", usrp.time_sources(mboard)?.join(", "));
        for name in usrp.mboard_sensor_names(mboard)? {
            println!("  sensor {}", usrp.mboard_sensor(&name, mboard)?.pp_string()?);
        }
    }
    for dir in [Direction::Rx, Direction::Tx] {
        for chan in 0..usrp.num_channels(dir)? {
            probe_channel(&usrp, dir, chan)?;
        }
    }
    Ok(())
}

fn probe_channel(usrp: &Usrp, dir: Direction, chan: usize) -> anyhow::Result<()> {
    let info = usrp.info(dir, chan)?;
    println!("{dir} channel {chan}: {} ({})", usrp.subdev_name(dir, chan)?, info.subdev_spec);
    println!("  freq range:  {}", usrp.freq_range(dir, chan)?);
    println!("  rate range:  {}", usrp.rates(dir, chan)?);
    println!("  bandwidth:   {}", usrp.bandwidth_range(dir, chan)?);
    println!("  antennas:    {}", usrp.antennas(dir, chan)?.join(", "));
    for name in usrp.gain_names(dir, chan)? {
        println!("  gain {name}: {}", usrp.gain_range(dir, &name, chan)?);
    }
    for name in usrp.lo_names(dir, chan)? {
        println!("  lo {name}: {:.0} Hz", usrp.lo_freq(dir, &name, chan)?);
    }
    for name in usrp.sensor_names(dir, chan)? {
        println!("  sensor {}", usrp.sensor(dir, &name, chan)?.pp_string()?);
    }
    Ok(())
}

fn configure(usrp: &Usrp, dir: Direction, radio: &RadioArgs) -> anyhow::Result<()> {
    let chan = radio.channel;
    usrp.set_rate(dir, radio.sample_rate.0, chan)?;
    let tuned = usrp.set_freq(dir, &TuneRequest::new(radio.center_freq.0), chan)?;
    info!(
        "tuned {dir} channel {chan} to {:.0} Hz (rf {:.0} Hz, dsp {:.0} Hz) at {} S/s",
        tuned.actual_rf_freq + tuned.actual_dsp_freq,
        tuned.actual_rf_freq,
        tuned.actual_dsp_freq,
        usrp.rate(dir, chan)?
    );
    match (radio.gain, dir) {
        (Some(gain), _) => usrp.set_gain(dir, gain, "", chan)?,
        (None, Direction::Rx) => usrp.set_rx_agc(true, chan)?,
        (None, Direction::Tx) => {}
    }
    if let Some(antenna) = &radio.antenna {
        usrp.set_antenna(dir, antenna, chan)?;
    }
    Ok(())
}

fn rx(uhd: &Uhd, radio: &RadioArgs, num_samps: usize, output: &str) -> anyhow::Result<()> {
    let usrp = uhd.open(&radio.args)?;
    configure(&usrp, Direction::Rx, radio)?;

    let mut rx = usrp.rx_stream::<Complex<f32>>(
        StreamArgs::new("fc32", "sc16").channels([radio.channel]),
    )?;
    let mut md = uhd.rx_metadata()?;
    let mut buf = vec![Complex::new(0.0f32, 0.0); rx.max_num_samps()?];
    let mut writer = BufWriter::new(
        File::create(output).with_context(|| format!("cannot create {output}"))?,
    );

    rx.issue_stream_cmd(&StreamCmd::num_samps_and_done(num_samps))?;
    let mut received = 0;
    while received < num_samps {
        let n = rx.recv(&mut [&mut buf[..]], &mut md, Duration::from_secs(3), false)?;
        match md.error_code()? {
            RxErrorCode::None => {}
            RxErrorCode::Overflow => {
                warn!("overflow after {received} samples");
                continue;
            }
            RxErrorCode::Timeout => bail!("timed out after {received} samples"),
            code => bail!("receive failed: {code} ({})", md.strerror()?),
        }
        let take = n.min(num_samps - received);
        for sample in &buf[..take] {
            writer.write_all(&sample.re.to_le_bytes())?;
            writer.write_all(&sample.im.to_le_bytes())?;
        }
        received += take;
    }
    writer.flush()?;
    info!("wrote {received} samples to {output}");
    Ok(())
}

fn tx(
    uhd: &Uhd,
    radio: &RadioArgs,
    tone: f64,
    burst_len: usize,
    bursts: usize,
) -> anyhow::Result<()> {
    let usrp = uhd.open(&radio.args)?;
    configure(&usrp, Direction::Tx, radio)?;

    let rate = usrp.rate(Direction::Tx, radio.channel)?;
    let step = std::f64::consts::TAU * tone / rate;
    let burst: Vec<Complex<f32>> = (0..burst_len)
        .map(|i| Complex::from_polar(0.5, (step * i as f64) as f32))
        .collect();

    let mut tx = usrp.tx_stream::<Complex<f32>>(
        StreamArgs::new("fc32", "sc16").channels([radio.channel]),
    )?;
    let md = uhd.tx_metadata(TxMetadataArgs::burst())?;
    let done = AtomicBool::new(false);
    let (mut sender, mut events) = tx.split()?;

    crossbeam::scope(|s| -> anyhow::Result<()> {
        let drain = s.spawn(|_| -> libuhd::Result<usize> {
            let mut acks = 0;
            loop {
                match events.next_event(Duration::from_millis(100))? {
                    Some(event) if event.event_code.is_error() => {
                        warn!("channel {}: {:?}", event.channel, event.event_code);
                    }
                    Some(event) => {
                        debug!("channel {}: {:?}", event.channel, event.event_code);
                        acks += 1;
                    }
                    None if done.load(Ordering::Acquire) => return Ok(acks),
                    None => {}
                }
            }
        });

        let mut result = Ok(());
        for i in 0..bursts {
            match sender.send(&[&burst[..]], &md, Duration::from_secs(1)) {
                Ok(sent) => info!("burst {i}: sent {sent}/{burst_len} samples"),
                Err(e) => {
                    result = Err(e.into());
                    break;
                }
            }
        }
        done.store(true, Ordering::Release);

        let acks = drain
            .join()
            .map_err(|_| anyhow::anyhow!("event thread panicked"))??;
        info!("{acks} burst acknowledgement(s)");
        result
    })
    .map_err(|_| anyhow::anyhow!("transmit scope panicked"))?
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(stripped) = s.strip_suffix('G') {
            let val: f64 = stripped.trim().parse().map_err(|_| "Invalid GHz value")?;
            Ok(Frequency(val * 1e9))
        } else if let Some(stripped) = s.strip_suffix('M') {
            let val: f64 = stripped.trim().parse().map_err(|_| "Invalid MHz value")?;
            Ok(Frequency(val * 1e6))
        } else if let Some(stripped) = s.strip_suffix('k') {
            let val: f64 = stripped.trim().parse().map_err(|_| "Invalid kHz value")?;
            Ok(Frequency(val * 1e3))
        } else {
            let val: f64 = s.parse().map_err(|_| "Invalid Hz value")?;
            Ok(Frequency(val))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_suffixes() {
        assert_eq!(Frequency::from_str("105.1M").unwrap().0, 105.1e6);
        assert_eq!(Frequency::from_str("2.4G").unwrap().0, 2.4e9);
        assert_eq!(Frequency::from_str("500k").unwrap().0, 500e3);
        assert_eq!(Frequency::from_str(" 1000 ").unwrap().0, 1000.0);
        assert!(Frequency::from_str("fast").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let args = Args::try_parse_from(["uhd-probe", "--sim", "rx", "-c", "915M", "-n", "10"])
            .unwrap();
        assert!(args.sim);
        match args.command {
            Command::Rx { radio, num_samps, .. } => {
                assert_eq!(radio.center_freq.0, 915e6);
                assert_eq!(radio.sample_rate.0, 1e6);
                assert_eq!(num_samps, 10);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
