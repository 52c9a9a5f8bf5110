//! Follow camera: chassis pose + offset in the chassis frame.

use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector3};
use rapier3d::prelude::Real;
use serde::{Deserialize, Serialize};

/// Offset in the chassis local frame. Fields are public so a debug surface
/// can edit them live; the next `update` picks the change up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraOffset {
    pub x: Real,
    pub y: Real,
    pub z: Real,
}

impl CameraOffset {
    pub const fn new(x: Real, y: Real, z: Real) -> Self {
        Self { x, y, z }
    }

    pub fn as_vector(&self) -> Vector3<Real> {
        Vector3::new(self.x, self.y, self.z)
    }
}

impl Default for CameraOffset {
    fn default() -> Self {
        Self::new(0.0, 3.0, 10.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraPose {
    pub position: [Real; 3],
    pub target: [Real; 3],
    pub orientation: [Real; 4], // x, y, z, w looking at target
}

#[derive(Debug, Clone)]
pub struct FollowCamera {
    pub offset: CameraOffset,
}

impl FollowCamera {
    pub fn new(offset: CameraOffset) -> Self {
        Self { offset }
    }

    /// Stateless apart from `offset`: same chassis pose in, same pose out.
    pub fn update(&self, chassis: &Isometry3<Real>) -> CameraPose {
        let target = Point3::from(chassis.translation.vector);
        let position = target + chassis.rotation * self.offset.as_vector();

        let view = target - position;
        let orientation = match view.try_normalize(1e-6) {
            Some(dir) => {
                // Looking straight up or down: roll follows the chassis forward axis.
                let up = if dir.dot(&Vector3::y()).abs() > 0.999 {
                    chassis.rotation * -Vector3::z()
                } else {
                    Vector3::y()
                };
                // Camera looks down its local -z.
                UnitQuaternion::face_towards(&-dir, &up)
            }
            None => chassis.rotation,
        };
        let q = orientation.quaternion();

        CameraPose {
            position: [position.x, position.y, position.z],
            target: [target.x, target.y, target.z],
            orientation: [q.i, q.j, q.k, q.w],
        }
    }
}
