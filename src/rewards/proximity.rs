//! Reward proximity threshold
//!
//! Shared read-mostly state: workers read it lock-free, the API may swap it at
//! runtime. A new value applies to scans that start afterwards.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct ProximitySettings {
    default_buffer_miles: f64,
    buffer_bits: AtomicU64,
}

impl ProximitySettings {
    pub fn new(default_buffer_miles: f64) -> Result<Self> {
        validate_buffer(default_buffer_miles)?;
        Ok(Self {
            default_buffer_miles,
            buffer_bits: AtomicU64::new(default_buffer_miles.to_bits()),
        })
    }

    /// Current reward threshold in statute miles
    pub fn proximity_buffer(&self) -> f64 {
        f64::from_bits(self.buffer_bits.load(Ordering::Acquire))
    }

    pub fn default_proximity_buffer(&self) -> f64 {
        self.default_buffer_miles
    }

    pub fn set_proximity_buffer(&self, miles: f64) -> Result<()> {
        validate_buffer(miles)?;
        self.buffer_bits.store(miles.to_bits(), Ordering::Release);
        info!("Reward proximity buffer set to {} miles", miles);
        Ok(())
    }

    pub fn set_default_proximity_buffer(&self) {
        self.buffer_bits
            .store(self.default_buffer_miles.to_bits(), Ordering::Release);
        info!(
            "Reward proximity buffer reset to default {} miles",
            self.default_buffer_miles
        );
    }
}

fn validate_buffer(miles: f64) -> Result<()> {
    if !miles.is_finite() || miles < 0.0 {
        return Err(Error::invalid_argument(format!(
            "proximity buffer must be a finite, non-negative number of miles, got {}",
            miles
        )));
    }
    Ok(())
}
