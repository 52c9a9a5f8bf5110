// ==============================================================================
// render_sync.rs — PHYSICS -> RENDERABLE POSES (post-step)
// ------------------------------------------------------------------------------
// RenderScene holds the optional renderables: one chassis mesh and four wheel
// meshes in wheel-index order. Asset loading is external; load() only checks
// that the files exist. A failure is logged and the scene runs headless.
//
// RenderSync::sync() runs after every physics step:
// - chassis: body position + visual offset (world axes), body orientation
// - wheels:  VehicleRig::update_wheel_transform(i) for all four indices
// Wheel transforms are recomputed even when no renderable exists.
// ==============================================================================

use std::fs;
use std::path::Path;

use nalgebra::{Translation3, UnitQuaternion, Vector3};
use rapier3d::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::RenderConfig;
use crate::error::{AssetError, RigError};
use crate::rig::{VehicleRig, WheelPosition};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pose {
    pub position: [Real; 3],
    pub orientation: [Real; 4], // x, y, z, w
}

impl Pose {
    pub fn from_parts(position: Vector3<Real>, orientation: &UnitQuaternion<Real>) -> Self {
        let q = orientation.quaternion();
        Self {
            position: [position.x, position.y, position.z],
            orientation: [q.i, q.j, q.k, q.w],
        }
    }

    pub fn to_isometry(&self) -> Isometry<Real> {
        let [x, y, z, w] = self.orientation;
        let q = UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(w, x, y, z));
        Isometry::from_parts(Translation3::from(Vector3::from(self.position)), q)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            orientation: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Renderable {
    pub name: String,
    pub pose: Pose,
    pub scale: [Real; 3],
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RenderScene {
    pub chassis: Option<Renderable>,
    pub wheels: Vec<Renderable>,
}

fn check_asset(path: &str) -> Result<(), AssetError> {
    fs::metadata(Path::new(path))
        .map(|_| ())
        .map_err(|source| AssetError { path: path.into(), source })
}

impl RenderScene {
    pub fn headless() -> Self {
        Self::default()
    }

    /// Chassis + four wheel renderables, or a headless scene if any asset is
    /// missing.
    pub fn load(config: &RenderConfig) -> Self {
        if let Err(e) = check_asset(&config.chassis_asset).and_then(|_| check_asset(&config.wheel_asset)) {
            warn!(error = %e, "vehicle assets unavailable, running headless");
            return Self::headless();
        }
        let scene = Self::with_renderables(config);
        info!(wheels = scene.wheels.len(), "vehicle renderables ready");
        scene
    }

    /// Renderables without touching the filesystem.
    pub fn with_renderables(config: &RenderConfig) -> Self {
        let s = config.wheel_scale;
        let wheels = WheelPosition::ALL
            .iter()
            .map(|p| {
                let mirror = if config.mirror_left_wheels && p.is_left() { -1.0 } else { 1.0 };
                Renderable {
                    name: format!("wheel_{p}"),
                    pose: Pose::default(),
                    scale: [s, s, s * mirror],
                }
            })
            .collect();

        Self {
            chassis: Some(Renderable {
                name: "chassis".to_string(),
                pose: Pose::default(),
                scale: [1.0; 3],
            }),
            wheels,
        }
    }

    pub fn is_headless(&self) -> bool {
        self.chassis.is_none() && self.wheels.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderSync {
    visual_offset: Vector3<Real>,
}

/// Poses written by one sync, independent of which renderables exist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SyncedPoses {
    pub chassis: Pose,
    pub wheels: [Pose; 4],
}

impl RenderSync {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            visual_offset: Vector3::from(config.chassis_visual_offset),
        }
    }

    pub fn sync(
        &self,
        scene: &mut RenderScene,
        rig: &mut VehicleRig,
        bodies: &RigidBodySet,
    ) -> Result<SyncedPoses, RigError> {
        let body = bodies.get(rig.chassis()).ok_or(RigError::MissingChassis)?;
        let chassis = Pose::from_parts(body.translation() + self.visual_offset, body.rotation());
        if let Some(r) = scene.chassis.as_mut() {
            r.pose = chassis;
        }

        let mut wheels = [Pose::default(); 4];
        for (i, out) in wheels.iter_mut().enumerate() {
            let state = rig.update_wheel_transform(i, bodies)?;
            *out = Pose::from_parts(state.world_position.coords, &state.world_orientation);
            if let Some(r) = scene.wheels.get_mut(i) {
                r.pose = *out;
            }
        }

        Ok(SyncedPoses { chassis, wheels })
    }
}
