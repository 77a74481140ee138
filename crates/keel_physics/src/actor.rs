//! Rigid actors
//!
//! Actors are owned by whoever created them and are never shared: releasing
//! an actor destroys it and drops its reference to every attached shape.

use keel_core::Handle;
use serde::{Deserialize, Serialize};

use crate::config::TolerancesScale;
use crate::error::{PhysicsError, Result};
use crate::geometry::Pose;
use crate::shape::Shape;

/// Static actor creation parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RigidStaticDesc {
    pub pose: Pose,
}

impl RigidStaticDesc {
    pub fn new(pose: Pose) -> Self {
        Self { pose }
    }

    pub fn validate(&self) -> Result<()> {
        check_pose(&self.pose)
    }
}

/// Dynamic body creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidDynamicDesc {
    pub pose: Pose,
    pub mass: f32,
    /// Mass-normalized kinetic energy below which the body may sleep
    pub sleep_threshold: Option<f32>,
    pub kinematic: bool,
}

impl Default for RigidDynamicDesc {
    fn default() -> Self {
        Self {
            pose: Pose::IDENTITY,
            mass: 1.0,
            sleep_threshold: None,
            kinematic: false,
        }
    }
}

impl RigidDynamicDesc {
    pub fn new(pose: Pose) -> Self {
        Self {
            pose,
            ..Default::default()
        }
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_sleep_threshold(mut self, threshold: f32) -> Self {
        self.sleep_threshold = Some(threshold);
        self
    }

    pub fn kinematic(mut self) -> Self {
        self.kinematic = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_pose(&self.pose)?;
        if !self.mass.is_finite() || self.mass <= 0.0 {
            return Err(PhysicsError::InvalidDescriptor(format!(
                "rigid body mass must be positive, got {}",
                self.mass
            )));
        }
        if let Some(threshold) = self.sleep_threshold {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(PhysicsError::InvalidDescriptor(format!(
                    "sleep threshold must be non-negative, got {threshold}"
                )));
            }
        }
        Ok(())
    }
}

fn check_pose(pose: &Pose) -> Result<()> {
    if pose.is_valid() {
        Ok(())
    } else {
        Err(PhysicsError::InvalidDescriptor(
            "actor pose is not a valid transform".into(),
        ))
    }
}

/// Static actor state
#[derive(Debug, Clone, PartialEq)]
pub struct RigidStatic {
    pub(crate) pose: Pose,
    pub(crate) shapes: Vec<Handle<Shape>>,
}

impl RigidStatic {
    pub(crate) fn from_desc(desc: &RigidStaticDesc) -> Self {
        Self {
            pose: desc.pose,
            shapes: Vec::new(),
        }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn shapes(&self) -> &[Handle<Shape>] {
        &self.shapes
    }

    pub fn to_desc(&self) -> RigidStaticDesc {
        RigidStaticDesc::new(self.pose)
    }
}

/// Dynamic body state
#[derive(Debug, Clone, PartialEq)]
pub struct RigidDynamic {
    pub(crate) pose: Pose,
    pub(crate) mass: f32,
    pub(crate) sleep_threshold: f32,
    pub(crate) kinematic: bool,
    pub(crate) shapes: Vec<Handle<Shape>>,
}

impl RigidDynamic {
    pub(crate) fn from_desc(desc: &RigidDynamicDesc, tolerances: &TolerancesScale) -> Self {
        Self {
            pose: desc.pose,
            mass: desc.mass,
            sleep_threshold: desc
                .sleep_threshold
                .unwrap_or_else(|| tolerances.default_sleep_threshold()),
            kinematic: desc.kinematic,
            shapes: Vec::new(),
        }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn sleep_threshold(&self) -> f32 {
        self.sleep_threshold
    }

    pub fn is_kinematic(&self) -> bool {
        self.kinematic
    }

    pub fn shapes(&self) -> &[Handle<Shape>] {
        &self.shapes
    }

    pub fn to_desc(&self) -> RigidDynamicDesc {
        RigidDynamicDesc {
            pose: self.pose,
            mass: self.mass,
            sleep_threshold: Some(self.sleep_threshold),
            kinematic: self.kinematic,
        }
    }
}
