// ==============================================================================
// traction.rs — ENGINE / BRAKE / SIDE-FRICTION IMPULSES (impulse domain)
// ==============================================================================
// For every wheel in contact:
// 1) Ground-plane basis: axle projected onto the contact plane, forward =
//    normal × axle. The axle is already steered (suspension.rs).
// 2) Side impulse: cancels a fraction of the lateral contact velocity.
// 3) Rolling impulse: engine_force * dt, plus a brake impulse (capped by the
//    brake setpoint) that drives forward contact velocity toward zero.
// 4) Friction circle: both scaled down if they exceed
//    suspension_force * dt * friction_slip.
//
// Output is a list of impulses; rig/mod.rs applies them after the solve.
// No tire slip model: wheel spin is kinematic, integrated from the chassis
// velocity at the hard point.
// ==============================================================================

use rapier3d::prelude::*;

use crate::rig::wheel::Wheel;

/// Fraction of lateral contact velocity removed per step per wheel.
const SIDE_CONTACT_DAMPING: Real = 0.2;
/// Weight of the forward impulse inside the friction circle.
const FORWARD_FACTOR: Real = 0.5;
/// Spin decay per step while airborne.
const AIR_SPIN_DAMPING: Real = 0.99;

#[derive(Clone, Copy, Debug)]
pub(crate) struct Impulse {
    /// Linear impulse in world space (N*s).
    pub impulse: Vector<Real>,
    pub at_point: Point<Real>,
}

pub(crate) fn solve_traction(wheels: &mut [Wheel], chassis: &RigidBody, dt: Real) -> Vec<Impulse> {
    let mass = chassis.mass();
    let on_ground = wheels.iter().filter(|w| w.state.in_contact).count();

    for wheel in wheels.iter_mut() {
        wheel.forward_impulse = 0.0;
        wheel.side_impulse = 0.0;
        wheel.forward_ws = Vector::zeros();
    }
    if on_ground == 0 {
        return Vec::new();
    }

    let mut impulses = Vec::with_capacity(wheels.len() * 2);
    let up = chassis.position().rotation * Vector::y();
    let com = *chassis.center_of_mass();

    for wheel in wheels.iter_mut().filter(|w| w.state.in_contact) {
        let n = wheel.state.contact_normal;
        let contact = wheel.state.contact_point;

        let mut axle = wheel.axle_ws - n * wheel.axle_ws.dot(&n);
        axle = axle.try_normalize(1.0e-5).unwrap_or_else(Vector::zeros);
        let forward = n.cross(&axle).try_normalize(1.0e-5).unwrap_or_else(Vector::zeros);
        wheel.forward_ws = forward;

        let point_vel = chassis.velocity_at_point(&contact);

        // --------------------------------------------------
        // Lateral
        // --------------------------------------------------
        let side = -SIDE_CONTACT_DAMPING * axle.dot(&point_vel) * mass * wheel.spec.side_friction_stiffness;

        // --------------------------------------------------
        // Longitudinal: engine + brake
        // --------------------------------------------------
        let mut rolling = wheel.setpoints.engine_force * dt;
        let brake = wheel.setpoints.brake;
        if brake > 0.0 {
            let v_long = forward.dot(&point_vel);
            rolling += (-v_long * mass / on_ground as Real).clamp(-brake, brake);
        }

        // --------------------------------------------------
        // Friction circle
        // --------------------------------------------------
        let max_imp = wheel.suspension_force * dt * wheel.spec.friction_slip;
        let x = rolling * FORWARD_FACTOR;
        let y = side;
        let len_sq = x * x + y * y;
        let scale = if len_sq > max_imp * max_imp && len_sq > 0.0 {
            max_imp / len_sq.sqrt()
        } else {
            1.0
        };

        wheel.forward_impulse = rolling * scale;
        wheel.side_impulse = side * scale;

        if wheel.forward_impulse != 0.0 {
            impulses.push(Impulse {
                impulse: forward * wheel.forward_impulse,
                at_point: contact,
            });
        }

        if wheel.side_impulse != 0.0 {
            // Lift the application point toward COM height to limit body roll.
            let lifted = contact
                - up * (up.dot(&(contact - com)) * (1.0 - wheel.spec.roll_influence));
            impulses.push(Impulse {
                impulse: axle * wheel.side_impulse,
                at_point: lifted,
            });
        }
    }

    impulses
}

/// Kinematic wheel spin: Δθ = v_forward * dt / r in contact, decaying when airborne.
pub(crate) fn integrate_spin(wheels: &mut [Wheel], chassis: &RigidBody, dt: Real) {
    let chassis_forward = chassis.position().rotation * Vector::z();

    for wheel in wheels.iter_mut() {
        if wheel.state.in_contact {
            let n = wheel.state.contact_normal;
            let fwd = chassis_forward - n * chassis_forward.dot(&n);
            let vel = chassis.velocity_at_point(&wheel.hard_point_ws);
            wheel.delta_rotation = fwd.dot(&vel) * dt / wheel.spec.radius;
        }
        wheel.state.rotation += wheel.delta_rotation;
        wheel.delta_rotation *= AIR_SPIN_DAMPING;
    }
}
