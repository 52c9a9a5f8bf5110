// ==============================================================================
// config.rs — SIMULATION CONFIGURATION (NAMED, BOUNDED, SERDE)
// ------------------------------------------------------------------------------
// Every tunable of the simulation lives in one of these structs:
// - PhysicsConfig: gravity, fixed logical timestep, substep cap, ground slab
// - ChassisConfig: box size, mass, damping, steering limit, spawn pose
// - ControlConfig: force/brake/steer constants + key bindings
// - CameraConfig / RenderConfig: follow offset, visual offsets, asset paths
// - wheels: the four WheelSpecs in corner order
//
// Defaults describe the stock vehicle. Files may be partial: missing
// fields fall back to defaults. validate() must pass before a Simulation is
// built from the config.
// ==============================================================================

use std::f32::consts::FRAC_PI_2;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::camera::CameraOffset;
use crate::error::ConfigError;
use crate::input::KeyBindings;
use crate::rig::{WheelPosition, WheelSpec};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    pub physics: PhysicsConfig,
    pub chassis: ChassisConfig,
    pub wheels: Vec<WheelSpec>,
    pub control: ControlConfig,
    pub camera: CameraConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhysicsConfig {
    pub gravity: [f32; 3],      // m/s²
    pub fixed_dt: f32,          // s
    pub max_substeps: u32,      // per wall-clock sample
    pub ground_half_extent: f32,// m
    pub ground_friction: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChassisConfig {
    pub half_extents: [f32; 3], // [hx, hy, hz] meters
    pub mass: f32,              // kg
    pub friction: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub max_steer: f32,         // radians
    pub spawn_position: [f32; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
    pub max_steer: f32,         // radians
    pub max_force: f32,         // N per wheel
    pub brake_force: f32,       // N·s per wheel per step
    pub slow_down_force: f32,   // N·s per wheel per step, no throttle held
    pub bindings: KeyBindings,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    pub offset: CameraOffset,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Added to the chassis position so the mesh origin sits on the body.
    pub chassis_visual_offset: [f32; 3],
    pub wheel_scale: f32,
    /// Left-side wheel meshes are mirrored along their local z axis.
    pub mirror_left_wheels: bool,
    pub chassis_asset: String,
    pub wheel_asset: String,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            physics: PhysicsConfig::default(),
            chassis: ChassisConfig::default(),
            wheels: default_wheels(),
            control: ControlConfig::default(),
            camera: CameraConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, -9.81, 0.0],
            fixed_dt: 1.0 / 60.0,
            max_substeps: 10,
            ground_half_extent: 500.0,
            ground_friction: 1.0,
        }
    }
}

impl Default for ChassisConfig {
    fn default() -> Self {
        Self {
            half_extents: [0.98, 0.5, 2.15],
            mass: 250.0,
            friction: 0.0,
            linear_damping: 0.01,
            angular_damping: 0.01,
            max_steer: 0.5,
            spawn_position: [0.0, 4.0, 0.0],
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            max_steer: 0.5,
            max_force: 750.0,
            brake_force: 36.0,
            slow_down_force: 19.6,
            bindings: KeyBindings::default(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            offset: CameraOffset::new(0.0, 3.0, 10.0),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            chassis_visual_offset: [0.0, -0.63, 0.0],
            wheel_scale: 1.4 * 1.1,
            mirror_left_wheels: true,
            chassis_asset: "assets/car.glb".to_string(),
            wheel_asset: "assets/wheel.gltf".to_string(),
        }
    }
}

/// Stock corner layout. Forward is local -z, so the front axle sits at
/// negative z and the left side at negative x.
pub fn default_wheels() -> Vec<WheelSpec> {
    WheelPosition::ALL
        .iter()
        .map(|&position| {
            let x = if position.is_left() { -0.78 } else { 0.75 };
            let z = if position.is_front() { -1.32 } else { 1.25 };
            WheelSpec {
                position,
                connection_point: [x, 0.1, z],
                ..WheelSpec::default()
            }
        })
        .collect()
}

fn check(field: &str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field: field.to_string(),
            value,
            min,
            max,
        })
    }
}

/// Strictly positive variant of `check` (lower bound excluded).
fn check_pos(field: &str, value: f32, max: f32) -> Result<(), ConfigError> {
    if value > 0.0 {
        check(field, value, 0.0, max)
    } else {
        Err(ConfigError::OutOfRange {
            field: field.to_string(),
            value,
            min: f32::MIN_POSITIVE,
            max,
        })
    }
}

fn check_vec(field: &str, v: [f32; 3], limit: f32) -> Result<(), ConfigError> {
    for (axis, c) in ["x", "y", "z"].iter().zip(v) {
        check(&format!("{field}.{axis}"), c, -limit, limit)?;
    }
    Ok(())
}

impl SimConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.physics;
        check_vec("physics.gravity", p.gravity, 1_000.0)?;
        check_pos("physics.fixed_dt", p.fixed_dt, 0.1)?;
        check("physics.max_substeps", p.max_substeps as f32, 1.0, 120.0)?;
        check_pos("physics.ground_half_extent", p.ground_half_extent, 1e5)?;
        check("physics.ground_friction", p.ground_friction, 0.0, 100.0)?;

        let c = &self.chassis;
        for (axis, h) in ["x", "y", "z"].iter().zip(c.half_extents) {
            check_pos(&format!("chassis.half_extents.{axis}"), h, 50.0)?;
        }
        check_pos("chassis.mass", c.mass, 1e5)?;
        check("chassis.friction", c.friction, 0.0, 100.0)?;
        check("chassis.linear_damping", c.linear_damping, 0.0, 100.0)?;
        check("chassis.angular_damping", c.angular_damping, 0.0, 100.0)?;
        check("chassis.max_steer", c.max_steer, 0.0, FRAC_PI_2)?;
        check_vec("chassis.spawn_position", c.spawn_position, 1_000.0)?;

        if self.wheels.len() != WheelPosition::ALL.len() {
            return Err(ConfigError::OutOfRange {
                field: "wheels.len".to_string(),
                value: self.wheels.len() as f32,
                min: 4.0,
                max: 4.0,
            });
        }
        for spec in &self.wheels {
            spec.validate()?;
        }

        let k = &self.control;
        check("control.max_steer", k.max_steer, 0.0, c.max_steer)?;
        check("control.max_force", k.max_force, 0.0, 1e6)?;
        check("control.brake_force", k.brake_force, 0.0, 1e6)?;
        check("control.slow_down_force", k.slow_down_force, 0.0, 1e6)?;

        let o = self.camera.offset;
        check_vec("camera.offset", [o.x, o.y, o.z], 1_000.0)?;

        let r = &self.render;
        check_vec("render.chassis_visual_offset", r.chassis_visual_offset, 100.0)?;
        check_pos("render.wheel_scale", r.wheel_scale, 100.0)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SimConfig::default().validate().unwrap();
    }

    #[test]
    fn default_wheels_follow_corner_order() {
        let wheels = default_wheels();
        let order: Vec<_> = wheels.iter().map(|w| w.position).collect();
        assert_eq!(order, WheelPosition::ALL.to_vec());
        assert_eq!(wheels[0].connection_point, [-0.78, 0.1, -1.32]);
        assert_eq!(wheels[3].connection_point, [0.75, 0.1, 1.25]);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = SimConfig::from_json_str(r#"{ "chassis": { "mass": 300.0 } }"#).unwrap();
        assert_eq!(config.chassis.mass, 300.0);
        assert_eq!(config.chassis.max_steer, 0.5);
        assert_eq!(config.control.max_force, 750.0);
        assert_eq!(config.wheels.len(), 4);
    }

    #[test]
    fn rejects_zero_timestep() {
        let mut config = SimConfig::default();
        config.physics.fixed_dt = 0.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { ref field, .. } if field == "physics.fixed_dt"));
    }

    #[test]
    fn rejects_control_steer_beyond_chassis_limit() {
        let mut config = SimConfig::default();
        config.control.max_steer = 0.8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_negative_wheel_radius() {
        let mut config = SimConfig::default();
        config.wheels[2].radius = -0.35;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Rig(_)));
    }

    #[test]
    fn rejects_three_wheels() {
        let mut config = SimConfig::default();
        config.wheels.pop();
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = SimConfig::from_json_str("{ chassis: ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
