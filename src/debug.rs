// ==============================================================================
// debug.rs — DEBUG OVERLAY PRIMITIVES
// ------------------------------------------------------------------------------
// Serializable per-frame view of the rig:
// - DebugRay: suspension raycast (origin, direction, length, hit)
// - DebugWheel: per-wheel numeric state (grounded, compression, force, setpoints)
// - DebugChassis: body pose and box size
//
// Read-only: capture() never mutates the rig or the bodies.
// ==============================================================================

use rapier3d::prelude::*;
use serde::Serialize;

use crate::error::RigError;
use crate::rig::VehicleRig;

#[inline]
fn v3(v: Vector<Real>) -> [f32; 3] {
    [v.x, v.y, v.z]
}
#[inline]
fn p3(p: Point<Real>) -> [f32; 3] {
    [p.x, p.y, p.z]
}

#[derive(Clone, Debug, Serialize)]
pub struct DebugRay {
    pub origin: [f32; 3],
    pub direction: [f32; 3],
    pub length: f32,
    pub hit: Option<[f32; 3]>,
    pub color: [f32; 3],
}

#[derive(Clone, Debug, Serialize)]
pub struct DebugWheel {
    pub id: &'static str, // "FL", "FR", "RL", "RR"

    pub center: [f32; 3], // in world space
    pub radius: f32,
    pub grounded: bool,
    pub suspension_length: f32,
    pub compression: f32,
    pub normal_force: f32,

    pub steer: f32,
    pub engine_force: f32,
    pub brake: f32,
}

#[derive(Clone, Debug, Serialize)]
pub struct DebugChassis {
    pub position: [f32; 3],
    pub rotation: [f32; 4], // quaternion
    pub linvel: [f32; 3],
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct DebugOverlay {
    pub chassis: Option<DebugChassis>,
    pub suspension_rays: Vec<DebugRay>,
    pub wheels: Vec<DebugWheel>,
}

const RAY_HIT: [f32; 3] = [0.1, 0.9, 0.2];
const RAY_MISS: [f32; 3] = [0.9, 0.2, 0.1];

impl DebugOverlay {
    pub fn clear(&mut self) {
        self.chassis = None;
        self.suspension_rays.clear();
        self.wheels.clear();
    }

    pub fn capture(rig: &VehicleRig, bodies: &RigidBodySet) -> Result<Self, RigError> {
        let mut overlay = Self::default();
        overlay.refresh(rig, bodies)?;
        Ok(overlay)
    }

    /// Rebuilds the overlay in place from the latest physics step.
    pub fn refresh(&mut self, rig: &VehicleRig, bodies: &RigidBodySet) -> Result<(), RigError> {
        self.clear();
        let body = bodies.get(rig.chassis()).ok_or(RigError::MissingChassis)?;
        let pos = body.position();
        let q = pos.rotation.quaternion();

        self.chassis = Some(DebugChassis {
            position: v3(pos.translation.vector),
            rotation: [q.i, q.j, q.k, q.w],
            linvel: v3(*body.linvel()),
        });

        for i in 0..rig.wheel_count() {
            let spec = rig.wheel_spec(i)?;
            let state = rig.wheel_state(i)?;
            let setpoints = rig.setpoints(i)?;

            let origin = pos * Point::from(spec.connection_point);
            let direction = pos * Vector::from(spec.direction).normalize();
            let length = spec.max_length() + spec.radius;

            self.suspension_rays.push(DebugRay {
                origin: p3(origin),
                direction: v3(direction),
                length,
                hit: state.in_contact.then(|| p3(state.contact_point)),
                color: if state.in_contact { RAY_HIT } else { RAY_MISS },
            });

            self.wheels.push(DebugWheel {
                id: spec.position.as_str(),
                center: p3(state.world_position),
                radius: spec.radius,
                grounded: state.in_contact,
                suspension_length: state.suspension_length,
                compression: rig.compression(i)?,
                normal_force: rig.suspension_force(i)?,
                steer: setpoints.steering,
                engine_force: setpoints.engine_force,
                brake: setpoints.brake,
            });
        }
        Ok(())
    }
}
