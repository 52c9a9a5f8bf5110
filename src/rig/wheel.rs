//! Wheel identification, geometry and per-step state.
// rig/wheel.rs

use std::fmt;

use nalgebra::{Point3, UnitQuaternion, Vector3};
use rapier3d::prelude::Real;
use serde::{Deserialize, Serialize};

use crate::error::RigError;

// ============================================
// Wheel identification
// ============================================

/// Corner a wheel index is permanently bound to. Index 0..3 follow the
/// declaration order below.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum WheelPosition {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl WheelPosition {
    pub const ALL: [WheelPosition; 4] = [
        WheelPosition::FrontLeft,
        WheelPosition::FrontRight,
        WheelPosition::RearLeft,
        WheelPosition::RearRight,
    ];

    pub fn index(&self) -> usize {
        match self {
            WheelPosition::FrontLeft => 0,
            WheelPosition::FrontRight => 1,
            WheelPosition::RearLeft => 2,
            WheelPosition::RearRight => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WheelPosition::FrontLeft => "FL",
            WheelPosition::FrontRight => "FR",
            WheelPosition::RearLeft => "RL",
            WheelPosition::RearRight => "RR",
        }
    }

    pub fn is_front(&self) -> bool {
        matches!(self, WheelPosition::FrontLeft | WheelPosition::FrontRight)
    }

    pub fn is_left(&self) -> bool {
        matches!(self, WheelPosition::FrontLeft | WheelPosition::RearLeft)
    }
}

impl fmt::Display for WheelPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// Geometry + tuning (immutable after add_wheel)
// ============================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WheelSpec {
    pub position: WheelPosition,
    pub radius: f32,                 // m
    pub connection_point: [f32; 3],  // chassis local
    pub direction: [f32; 3],         // suspension ray, chassis local
    pub axle: [f32; 3],              // chassis local

    // stiffness and damping are per unit chassis mass
    pub suspension_stiffness: f32,
    pub rest_length: f32,            // m
    pub max_travel: f32,             // m
    pub damping_compression: f32,
    pub damping_relaxation: f32,
    pub max_suspension_force: f32,   // N

    pub roll_influence: f32,         // 0..1
    pub friction_slip: f32,
    pub side_friction_stiffness: f32,
}

impl Default for WheelSpec {
    fn default() -> Self {
        Self {
            position: WheelPosition::FrontLeft,
            radius: 0.35,
            connection_point: [0.0, 0.1, 0.0],
            direction: [0.0, -1.0, 0.0],
            axle: [-1.0, 0.0, 0.0],
            suspension_stiffness: 55.0,
            rest_length: 0.5,
            max_travel: 1.0,
            damping_compression: 4.3,
            damping_relaxation: 2.3,
            max_suspension_force: 10_000.0,
            roll_influence: 0.01,
            friction_slip: 30.0,
            side_friction_stiffness: 1.0,
        }
    }
}

impl WheelSpec {
    /// Rejects specs that would poison the per-step raycast loop.
    pub fn validate(&self) -> Result<(), RigError> {
        let position = self.position;
        let bad = |field: &'static str, value: f32| RigError::InvalidWheel { position, field, value };
        let within = |field: &'static str, value: f32, min: f32, max: f32, open_min: bool| {
            let low_ok = if open_min { value > min } else { value >= min };
            if value.is_finite() && low_ok && value <= max {
                Ok(())
            } else {
                Err(bad(field, value))
            }
        };

        within("radius", self.radius, 0.0, 5.0, true)?;
        within("rest_length", self.rest_length, 0.0, 10.0, true)?;
        within("max_travel", self.max_travel, 0.0, 10.0, false)?;
        within("suspension_stiffness", self.suspension_stiffness, 0.0, 1e4, false)?;
        within("damping_compression", self.damping_compression, 0.0, 1e4, false)?;
        within("damping_relaxation", self.damping_relaxation, 0.0, 1e4, false)?;
        within("max_suspension_force", self.max_suspension_force, 0.0, 1e7, true)?;
        within("roll_influence", self.roll_influence, 0.0, 1.0, false)?;
        within("friction_slip", self.friction_slip, 0.0, 1e3, false)?;
        within("side_friction_stiffness", self.side_friction_stiffness, 0.0, 100.0, false)?;

        for c in self.connection_point {
            within("connection_point", c, -100.0, 100.0, false)?;
        }
        let dir = Vector3::from(self.direction);
        if !dir.iter().all(|c| c.is_finite()) || dir.norm() < 1e-6 {
            return Err(bad("direction", dir.norm()));
        }
        let axle = Vector3::from(self.axle);
        if !axle.iter().all(|c| c.is_finite()) || axle.norm() < 1e-6 {
            return Err(bad("axle", axle.norm()));
        }
        if dir.normalize().cross(&axle.normalize()).norm() < 1e-3 {
            return Err(bad("axle", dir.normalize().dot(&axle.normalize())));
        }
        Ok(())
    }

    pub fn max_length(&self) -> Real {
        self.rest_length + self.max_travel
    }

    pub(crate) fn connection_local(&self) -> Point3<Real> {
        Point3::from(self.connection_point)
    }

    pub(crate) fn direction_local(&self) -> Vector3<Real> {
        Vector3::from(self.direction).normalize()
    }

    pub(crate) fn axle_local(&self) -> Vector3<Real> {
        Vector3::from(self.axle).normalize()
    }
}

// ============================================
// Runtime
// ============================================

/// Control setpoints written by the controller, read by the physics step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WheelSetpoints {
    pub engine_force: Real, // N, negative = forward
    pub steering: Real,     // rad, clamped to ±max steer
    pub brake: Real,        // N·s max rolling-friction impulse per step
}

/// Derived every physics step from the chassis pose and the ground.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelRuntimeState {
    pub in_contact: bool,
    pub suspension_length: Real,
    pub contact_point: Point3<Real>,
    pub contact_normal: Vector3<Real>,
    pub rotation: Real,
    pub world_position: Point3<Real>,
    pub world_orientation: UnitQuaternion<Real>,
}

impl WheelRuntimeState {
    pub(crate) fn at_rest(spec: &WheelSpec) -> Self {
        Self {
            in_contact: false,
            suspension_length: spec.rest_length,
            contact_point: Point3::origin(),
            contact_normal: -spec.direction_local(),
            rotation: 0.0,
            world_position: Point3::origin(),
            world_orientation: UnitQuaternion::identity(),
        }
    }
}

/// One registered wheel: spec, setpoints, published state and solver scratch.
#[derive(Debug, Clone)]
pub(crate) struct Wheel {
    pub spec: WheelSpec,
    pub setpoints: WheelSetpoints,
    pub state: WheelRuntimeState,

    // world-space frame, refreshed at the start of every step
    pub hard_point_ws: Point3<Real>,
    pub direction_ws: Vector3<Real>,
    pub axle_ws: Vector3<Real>,
    pub forward_ws: Vector3<Real>,

    // suspension
    pub prev_compression: Option<Real>,
    pub relative_velocity: Real,
    pub clipped_inv_contact_dot_suspension: Real,
    pub suspension_force: Real,

    // traction
    pub forward_impulse: Real,
    pub side_impulse: Real,
    pub delta_rotation: Real,
}

impl Wheel {
    pub fn new(spec: WheelSpec) -> Self {
        Self {
            spec,
            setpoints: WheelSetpoints::default(),
            state: WheelRuntimeState::at_rest(&spec),
            hard_point_ws: spec.connection_local(),
            direction_ws: spec.direction_local(),
            axle_ws: spec.axle_local(),
            forward_ws: Vector3::zeros(),
            prev_compression: None,
            relative_velocity: 0.0,
            clipped_inv_contact_dot_suspension: 1.0,
            suspension_force: 0.0,
            forward_impulse: 0.0,
            side_impulse: 0.0,
            delta_rotation: 0.0,
        }
    }

    pub fn compression(&self) -> Real {
        if self.state.in_contact {
            self.spec.rest_length - self.state.suspension_length
        } else {
            0.0
        }
    }

    /// Back to the uncompressed, airborne state. Setpoints and spin angle stay.
    pub fn relax(&mut self) {
        let rotation = self.state.rotation;
        self.state = WheelRuntimeState::at_rest(&self.spec);
        self.state.rotation = rotation;
        self.prev_compression = None;
        self.relative_velocity = 0.0;
        self.clipped_inv_contact_dot_suspension = 1.0;
        self.suspension_force = 0.0;
        self.forward_impulse = 0.0;
        self.side_impulse = 0.0;
        self.delta_rotation = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_map_to_fixed_indices() {
        for (i, p) in WheelPosition::ALL.iter().enumerate() {
            assert_eq!(p.index(), i);
        }
        assert!(WheelPosition::FrontRight.is_front());
        assert!(!WheelPosition::RearRight.is_left());
        assert_eq!(WheelPosition::RearLeft.to_string(), "RL");
    }

    #[test]
    fn default_spec_is_valid() {
        WheelSpec::default().validate().unwrap();
    }

    #[test]
    fn negative_rest_length_is_rejected() {
        let spec = WheelSpec { rest_length: -0.1, ..WheelSpec::default() };
        assert_eq!(
            spec.validate(),
            Err(RigError::InvalidWheel {
                position: WheelPosition::FrontLeft,
                field: "rest_length",
                value: -0.1,
            })
        );
    }

    #[test]
    fn nan_stiffness_is_rejected() {
        let spec = WheelSpec { suspension_stiffness: f32::NAN, ..WheelSpec::default() };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn axle_parallel_to_suspension_is_rejected() {
        let spec = WheelSpec { axle: [0.0, 2.0, 0.0], ..WheelSpec::default() };
        assert!(matches!(
            spec.validate(),
            Err(RigError::InvalidWheel { field: "axle", .. })
        ));
    }
}
