//! Surface materials shared between shapes

use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, Result};

/// How two materials' coefficients combine at a contact
///
/// When the two sides disagree, the rule with the higher priority wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CombineRule {
    /// Mean of both values
    #[default]
    Average,
    /// Smaller value
    Min,
    /// Product of both values
    Multiply,
    /// Larger value
    Max,
}

impl CombineRule {
    fn priority(self) -> u8 {
        match self {
            CombineRule::Average => 0,
            CombineRule::Min => 1,
            CombineRule::Multiply => 2,
            CombineRule::Max => 3,
        }
    }

    /// The rule that applies when `self` meets `other`
    pub fn resolve(self, other: CombineRule) -> CombineRule {
        if other.priority() > self.priority() {
            other
        } else {
            self
        }
    }

    pub fn combine(self, a: f32, b: f32) -> f32 {
        match self {
            CombineRule::Average => (a + b) * 0.5,
            CombineRule::Min => a.min(b),
            CombineRule::Multiply => a * b,
            CombineRule::Max => a.max(b),
        }
    }
}

/// Material parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialDesc {
    pub static_friction: f32,
    pub dynamic_friction: f32,
    /// 0 = no bounce, 1 = perfectly elastic
    pub restitution: f32,
    pub friction_combine: CombineRule,
    pub restitution_combine: CombineRule,
}

impl Default for MaterialDesc {
    fn default() -> Self {
        Self {
            static_friction: 0.5,
            dynamic_friction: 0.5,
            restitution: 0.0,
            friction_combine: CombineRule::Average,
            restitution_combine: CombineRule::Average,
        }
    }
}

impl MaterialDesc {
    pub fn new(static_friction: f32, dynamic_friction: f32, restitution: f32) -> Self {
        Self {
            static_friction,
            dynamic_friction,
            restitution,
            ..Default::default()
        }
    }

    /// Near-frictionless ice
    pub fn ice() -> Self {
        Self::new(0.1, 0.03, 0.05)
    }

    /// Grippy, bouncy rubber
    pub fn rubber() -> Self {
        Self {
            restitution_combine: CombineRule::Max,
            ..Self::new(1.0, 0.8, 0.8)
        }
    }

    pub fn steel() -> Self {
        Self::new(0.74, 0.57, 0.3)
    }

    pub fn wood() -> Self {
        Self::new(0.5, 0.4, 0.3)
    }

    pub fn with_friction_combine(mut self, rule: CombineRule) -> Self {
        self.friction_combine = rule;
        self
    }

    pub fn with_restitution_combine(mut self, rule: CombineRule) -> Self {
        self.restitution_combine = rule;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let friction_ok = [self.static_friction, self.dynamic_friction]
            .iter()
            .all(|f| f.is_finite() && *f >= 0.0);
        if !friction_ok {
            return Err(PhysicsError::InvalidDescriptor(format!(
                "material friction must be finite and non-negative, got {} / {}",
                self.static_friction, self.dynamic_friction
            )));
        }
        if !(0.0..=1.0).contains(&self.restitution) {
            return Err(PhysicsError::InvalidDescriptor(format!(
                "material restitution must lie in [0, 1], got {}",
                self.restitution
            )));
        }
        Ok(())
    }
}

/// Immutable material resource
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    desc: MaterialDesc,
}

impl Material {
    pub(crate) fn from_desc(desc: &MaterialDesc) -> Self {
        Self { desc: *desc }
    }

    pub fn static_friction(&self) -> f32 {
        self.desc.static_friction
    }

    pub fn dynamic_friction(&self) -> f32 {
        self.desc.dynamic_friction
    }

    pub fn restitution(&self) -> f32 {
        self.desc.restitution
    }

    /// Effective (static, dynamic) friction at a contact with `other`
    pub fn combine_friction(&self, other: &Material) -> (f32, f32) {
        let rule = self.desc.friction_combine.resolve(other.desc.friction_combine);
        (
            rule.combine(self.desc.static_friction, other.desc.static_friction),
            rule.combine(self.desc.dynamic_friction, other.desc.dynamic_friction),
        )
    }

    /// Effective restitution at a contact with `other`
    pub fn combine_restitution(&self, other: &Material) -> f32 {
        let rule = self
            .desc
            .restitution_combine
            .resolve(other.desc.restitution_combine);
        rule.combine(self.desc.restitution, other.desc.restitution)
    }

    pub fn to_desc(&self) -> MaterialDesc {
        self.desc
    }
}
