//! Typed device configuration.
//!
//! A [`UsrpConfig`] describes a whole session setup and can be loaded from any
//! serde format. [`Usrp::apply`] pushes it to a device.

use serde::{Deserialize, Serialize};
use uhd_driver::{Direction, TuneRequest, TuneResult};

use crate::error::Result;
use crate::usrp::{Mboard, Usrp};

/// Tuner gain setting.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gain {
    /// Automatic gain control (RX only; left untouched on TX)
    #[default]
    Auto,
    /// Overall gain in dB
    Manual(f64),
}

/// Settings for one signal path.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Channels the settings apply to; empty means channel 0
    pub channels: Vec<usize>,
    /// Sample rate in Hz
    pub rate: Option<f64>,
    /// Center frequency in Hz
    pub freq: Option<f64>,
    /// Offset of the RF stage from the center frequency, in Hz
    pub lo_offset: Option<f64>,
    pub gain: Gain,
    pub antenna: Option<String>,
    /// Analog bandwidth in Hz
    pub bandwidth: Option<f64>,
}

impl ChainConfig {
    pub fn new(freq: f64, rate: f64) -> Self {
        Self {
            freq: Some(freq),
            rate: Some(rate),
            ..Default::default()
        }
    }

    fn channels(&self) -> Vec<usize> {
        if self.channels.is_empty() {
            vec![0]
        } else {
            self.channels.clone()
        }
    }

    fn tune_request(&self) -> Option<TuneRequest> {
        self.freq.map(|freq| match self.lo_offset {
            Some(offset) => TuneRequest::with_lo_offset(freq, offset),
            None => TuneRequest::new(freq),
        })
    }
}

/// Settings for a whole session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UsrpConfig {
    /// Device arguments (e.g., "type=b200,serial=31A1B2C")
    pub args: String,
    /// Reference clock source (e.g., "internal", "external", "gpsdo")
    pub clock_source: Option<String>,
    /// Time source (e.g., "none", "external", "gpsdo")
    pub time_source: Option<String>,
    pub rx: Option<ChainConfig>,
    pub tx: Option<ChainConfig>,
}

/// Outcome of tuning one channel while applying a configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuned {
    pub dir: Direction,
    pub chan: usize,
    pub result: TuneResult,
}

impl Usrp {
    /// Apply `config`: clock and time sources first, then for each direction
    /// rate, frequency, gain, antenna and bandwidth.
    ///
    /// Returns what each tuned channel ended up at. `args` is not used here;
    /// it selects the device when opening it.
    pub fn apply(&self, config: &UsrpConfig) -> Result<Vec<Tuned>> {
        if let Some(source) = &config.clock_source {
            self.set_clock_source(source, Mboard::All)?;
        }
        if let Some(source) = &config.time_source {
            self.set_time_source(source, Mboard::All)?;
        }
        let mut tuned = Vec::new();
        for (dir, chain) in [(Direction::Rx, &config.rx), (Direction::Tx, &config.tx)] {
            if let Some(chain) = chain {
                self.apply_chain(dir, chain, &mut tuned)?;
            }
        }
        Ok(tuned)
    }

    fn apply_chain(
        &self,
        dir: Direction,
        chain: &ChainConfig,
        tuned: &mut Vec<Tuned>,
    ) -> Result<()> {
        let channels = chain.channels();
        if let Some(rate) = chain.rate {
            for &chan in &channels {
                self.set_rate(dir, rate, chan)?;
            }
        }
        if let Some(request) = chain.tune_request() {
            for &chan in &channels {
                let result = self.set_freq(dir, &request, chan)?;
                tracing::info!(
                    "{dir} channel {chan} tuned to {:.0} Hz (rf {:.0}, dsp {:.0})",
                    result.actual_rf_freq + result.actual_dsp_freq,
                    result.actual_rf_freq,
                    result.actual_dsp_freq
                );
                tuned.push(Tuned { dir, chan, result });
            }
        }
        for &chan in &channels {
            match (chain.gain, dir) {
                (Gain::Manual(gain), _) => self.set_gain(dir, gain, "", chan)?,
                (Gain::Auto, Direction::Rx) => self.set_rx_agc(true, chan)?,
                (Gain::Auto, Direction::Tx) => {}
            }
        }
        if let Some(antenna) = &chain.antenna {
            for &chan in &channels {
                self.set_antenna(dir, antenna, chan)?;
            }
        }
        if let Some(bandwidth) = chain.bandwidth {
            for &chan in &channels {
                self.set_bandwidth(dir, bandwidth, chan)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_json() {
        let config: UsrpConfig = serde_json::from_str(
            r#"{
                "args": "type=b200",
                "clock_source": "external",
                "rx": {
                    "channels": [0, 1], "rate": 1e6, "freq": 915e6,
                    "gain": { "manual": 30.0 }
                },
                "tx": { "freq": 2.45e9, "lo_offset": 5e6 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.args, "type=b200");
        assert_eq!(config.time_source, None);
        let rx = config.rx.unwrap();
        assert_eq!(rx.channels, vec![0, 1]);
        assert_eq!(rx.gain, Gain::Manual(30.0));
        let tx = config.tx.unwrap();
        assert_eq!(tx.gain, Gain::Auto);
        assert_eq!(tx.channels(), vec![0]);
        let request = tx.tune_request().unwrap();
        assert_eq!(request, TuneRequest::with_lo_offset(2.45e9, 5e6));
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = UsrpConfig {
            args: "serial=31A1B2C".to_string(),
            rx: Some(ChainConfig {
                antenna: Some("RX2".to_string()),
                ..ChainConfig::new(100e6, 2e6)
            }),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: UsrpConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_auto_gain_serializes_as_a_word() {
        assert_eq!(serde_json::to_string(&Gain::Auto).unwrap(), "\"auto\"");
    }
}
