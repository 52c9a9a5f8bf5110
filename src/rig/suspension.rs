// ==============================================================================
// suspension.rs — RAYCAST SUSPENSION
// ------------------------------------------------------------------------------
// Per wheel and per physics step:
// - refresh_wheel_frame(): hard point, suspension direction and steered axle
//   in world space from the chassis pose
// - cast_suspension_ray(): ray from the hard point along the suspension
//   direction, up to rest + travel + radius. Fills contact flag, clamped
//   suspension length, contact point/normal and the relative velocity used
//   by the damper
// - suspension_force(): spring + damper, scaled by chassis mass, clamped to
//   [0, max_suspension_force]
//
// Relative velocity is the rate of extension: negative while compressing.
// It comes from the previous step's compression when the wheel was already
// in contact, otherwise from the chassis point velocity along the normal.
// ==============================================================================

use nalgebra::{Unit, UnitQuaternion};
use rapier3d::prelude::*;

use crate::rig::wheel::Wheel;

/// Below this |normal · direction| the contact is treated as grazing.
const MIN_CONTACT_DOT: Real = 0.1;

pub(crate) fn steering_rotation(wheel: &Wheel, up: &Vector<Real>) -> UnitQuaternion<Real> {
    match Unit::try_new(*up, 1e-6) {
        Some(axis) => UnitQuaternion::from_axis_angle(&axis, wheel.setpoints.steering),
        None => UnitQuaternion::identity(),
    }
}

pub(crate) fn refresh_wheel_frame(wheel: &mut Wheel, chassis_pos: &Isometry<Real>) {
    wheel.hard_point_ws = chassis_pos * wheel.spec.connection_local();
    wheel.direction_ws = chassis_pos * wheel.spec.direction_local();

    let steer = steering_rotation(wheel, &-wheel.direction_ws);
    wheel.axle_ws = steer * (chassis_pos * wheel.spec.axle_local());
}

pub(crate) fn cast_suspension_ray(
    wheel: &mut Wheel,
    chassis: &RigidBody,
    bodies: &RigidBodySet,
    colliders: &ColliderSet,
    query: &QueryPipeline,
    filter: QueryFilter,
    dt: Real,
) {
    let max_length = wheel.spec.max_length();
    let ray_length = max_length + wheel.spec.radius;
    let ray = Ray::new(wheel.hard_point_ws, wheel.direction_ws);

    let Some((_collider, hit)) =
        query.cast_ray_and_get_normal(bodies, colliders, &ray, ray_length, true, filter)
    else {
        // No ground within travel: airborne, spring at rest length.
        wheel.state.in_contact = false;
        wheel.state.suspension_length = wheel.spec.rest_length;
        wheel.state.contact_point = ray.point_at(ray_length);
        wheel.state.contact_normal = -wheel.direction_ws;
        wheel.prev_compression = None;
        wheel.relative_velocity = 0.0;
        wheel.clipped_inv_contact_dot_suspension = 1.0;
        return;
    };

    let toi = hit.time_of_impact;
    let mut normal = hit.normal;
    // Ray origin already inside the ground: no usable normal.
    if toi <= 0.0 || normal.norm_squared() < 1e-12 {
        normal = -wheel.direction_ws;
    }

    let suspension_length = (toi - wheel.spec.radius).clamp(0.0, max_length);
    let compression = wheel.spec.rest_length - suspension_length;
    let contact_point = ray.point_at(toi);

    let denominator = normal.dot(&wheel.direction_ws);
    let (inv_dot, projected_vel) = if denominator >= -MIN_CONTACT_DOT {
        (1.0 / MIN_CONTACT_DOT, 0.0)
    } else {
        let inv = -1.0 / denominator;
        let point_vel = chassis.velocity_at_point(&contact_point);
        (inv, normal.dot(&point_vel) * inv)
    };

    wheel.relative_velocity = match wheel.prev_compression {
        Some(prev) if dt > 0.0 => (prev - compression) / dt,
        _ => projected_vel,
    };
    wheel.prev_compression = Some(compression);
    wheel.clipped_inv_contact_dot_suspension = inv_dot;

    wheel.state.in_contact = true;
    wheel.state.suspension_length = suspension_length;
    wheel.state.contact_point = contact_point;
    wheel.state.contact_normal = normal;
}

/// Spring + damper along the contact normal, in newtons.
///
/// `relative_velocity < 0` means the spring is compressing, which selects
/// `damping_compression`; otherwise `damping_relaxation`.
pub(crate) fn suspension_force(
    wheel: &Wheel,
    chassis_mass: Real,
) -> Real {
    if !wheel.state.in_contact {
        return 0.0;
    }

    let spec = &wheel.spec;
    let compression = spec.rest_length - wheel.state.suspension_length;

    let spring = spec.suspension_stiffness * compression * wheel.clipped_inv_contact_dot_suspension;
    let damping = if wheel.relative_velocity < 0.0 {
        spec.damping_compression
    } else {
        spec.damping_relaxation
    };
    let damper = damping * wheel.relative_velocity;

    ((spring - damper) * chassis_mass).clamp(0.0, spec.max_suspension_force)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::wheel::WheelSpec;
    use proptest::prelude::*;

    fn grounded(length: Real, relative_velocity: Real) -> Wheel {
        let mut w = Wheel::new(WheelSpec::default());
        w.state.in_contact = true;
        w.state.suspension_length = length;
        w.relative_velocity = relative_velocity;
        w.clipped_inv_contact_dot_suspension = 1.0;
        w
    }

    #[test]
    fn airborne_wheel_has_no_force() {
        let w = Wheel::new(WheelSpec::default());
        assert_eq!(suspension_force(&w, 250.0), 0.0);
    }

    #[test]
    fn static_spring_force() {
        // 0.1 m compression, at rest: 55 * 0.1 * 250
        let w = grounded(0.4, 0.0);
        assert!((suspension_force(&w, 250.0) - 1375.0).abs() < 1e-2);
    }

    #[test]
    fn compressing_uses_compression_damping() {
        let w = grounded(0.4, -1.0);
        let expected = (55.0 * 0.1 + 4.3) * 250.0;
        assert!((suspension_force(&w, 250.0) - expected).abs() < 1e-2);
    }

    #[test]
    fn relaxing_uses_relaxation_damping() {
        let w = grounded(0.4, 1.0);
        let expected = (55.0 * 0.1 - 2.3) * 250.0;
        assert!((suspension_force(&w, 250.0) - expected).abs() < 1e-2);
    }

    #[test]
    fn extended_spring_never_pulls() {
        let w = grounded(1.2, 0.0);
        assert_eq!(suspension_force(&w, 250.0), 0.0);
    }

    #[test]
    fn force_is_capped() {
        let w = grounded(0.0, -30.0);
        assert_eq!(suspension_force(&w, 250.0), 10_000.0);
    }

    #[test]
    fn frame_follows_chassis_pose() {
        let mut w = Wheel::new(WheelSpec {
            connection_point: [1.0, 0.0, 0.0],
            ..WheelSpec::default()
        });
        let pose = Isometry::new(vector![0.0, 2.0, 0.0], vector![0.0, std::f32::consts::FRAC_PI_2, 0.0]);
        refresh_wheel_frame(&mut w, &pose);
        // +x rotated a quarter turn about +y lands on -z
        assert!((w.hard_point_ws - point![0.0, 2.0, -1.0]).norm() < 1e-5);
        assert!((w.direction_ws - vector![0.0, -1.0, 0.0]).norm() < 1e-5);
    }

    #[test]
    fn steering_turns_axle_about_up() {
        let mut w = Wheel::new(WheelSpec::default());
        w.setpoints.steering = 0.5;
        refresh_wheel_frame(&mut w, &Isometry::identity());
        // (-1,0,0) rotated +0.5 rad about +y
        let expected = vector![-(0.5_f32).cos(), 0.0, (0.5_f32).sin()];
        assert!((w.axle_ws - expected).norm() < 1e-5);
    }

    proptest! {
        #[test]
        fn force_stays_within_bounds(length in 0.0f32..1.5, vel in -50.0f32..50.0, mass in 1.0f32..5000.0) {
            let w = grounded(length, vel);
            let f = suspension_force(&w, mass);
            prop_assert!(f >= 0.0);
            prop_assert!(f <= w.spec.max_suspension_force);
        }
    }
}
