//! Foundation and physics configuration

use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, Result};

/// Foundation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoundationDesc {
    /// Resolve type names for allocation instrumentation
    pub report_allocation_names: bool,
}

impl Default for FoundationDesc {
    fn default() -> Self {
        Self {
            report_allocation_names: cfg!(debug_assertions),
        }
    }
}

impl FoundationDesc {
    /// Set whether allocation type names are reported
    pub fn with_allocation_names(mut self, enabled: bool) -> Self {
        self.report_allocation_names = enabled;
        self
    }
}

/// Characteristic scales of the simulated content
///
/// Consumed when objects are created to derive default tolerance fields.
/// Nothing about object lifetime depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TolerancesScale {
    /// Typical object size (default: 1 unit)
    pub length: f32,

    /// Typical object speed (default: 10 units per second)
    pub speed: f32,
}

impl Default for TolerancesScale {
    fn default() -> Self {
        Self {
            length: 1.0,
            speed: 10.0,
        }
    }
}

impl TolerancesScale {
    pub fn new(length: f32, speed: f32) -> Self {
        Self { length, speed }
    }

    /// Scales for content authored in centimetres
    pub fn centimetres() -> Self {
        Self {
            length: 100.0,
            speed: 1000.0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.length.is_finite() && self.length > 0.0 && self.speed.is_finite() && self.speed > 0.0
    }

    /// Default shape contact offset
    pub fn default_contact_offset(&self) -> f32 {
        0.02 * self.length
    }

    /// Default rigid body sleep threshold (mass-normalized kinetic energy)
    pub fn default_sleep_threshold(&self) -> f32 {
        5e-5 * self.speed * self.speed
    }
}

/// Physics object table configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicsDesc {
    /// Scales used to derive default tolerances
    pub tolerances: TolerancesScale,

    /// Object slots reserved up front
    pub initial_capacity: usize,
}

impl Default for PhysicsDesc {
    fn default() -> Self {
        Self {
            tolerances: TolerancesScale::default(),
            initial_capacity: 256,
        }
    }
}

impl PhysicsDesc {
    /// Set tolerance scales
    pub fn with_tolerances(mut self, tolerances: TolerancesScale) -> Self {
        self.tolerances = tolerances;
        self
    }

    /// Set initial slot capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.tolerances.is_valid() {
            return Err(PhysicsError::InvalidConfig(format!(
                "tolerance scales must be positive and finite, got length {} and speed {}",
                self.tolerances.length, self.tolerances.speed
            )));
        }
        Ok(())
    }
}
