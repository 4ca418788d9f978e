//! Test helpers: a simulated driver the tests can inspect, and signal generators
#![allow(dead_code)]

use std::f32::consts::PI;
use std::sync::Arc;

use libuhd::Uhd;
use libuhd::uhd_driver::sim::{SimDevice, SimDriver};
use num_complex::Complex;

/// A library entry point on a fresh simulated driver, plus the driver itself
/// for inspection
pub fn sim() -> (Arc<SimDriver>, Uhd) {
    let sim = Arc::new(SimDriver::new());
    let uhd = Uhd::with_driver(sim.clone());
    (sim, uhd)
}

/// Like [`sim`], with a chosen device list
pub fn sim_with(devices: Vec<SimDevice>) -> (Arc<SimDriver>, Uhd) {
    let sim = Arc::new(SimDriver::with_devices(devices));
    let uhd = Uhd::with_driver(sim.clone());
    (sim, uhd)
}

/// Generate a complex sine wave at a specific frequency
///
/// # Arguments
/// * `frequency` - Frequency in Hz
/// * `sample_rate` - Sample rate in Hz
/// * `num_samples` - Number of samples to generate
pub fn generate_tone_fc32(
    frequency: f32,
    sample_rate: f32,
    num_samples: usize,
) -> Vec<Complex<f32>> {
    let angular_freq = 2.0 * PI * frequency / sample_rate;
    (0..num_samples)
        .map(|n| Complex::from_polar(0.5, angular_freq * n as f32))
        .collect()
}
