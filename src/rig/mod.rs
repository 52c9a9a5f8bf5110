//! VehicleRig: one chassis body and four raycast wheels.
//!
//! The rig is the only mutation surface for vehicle forces. Controllers write
//! setpoints (engine force, steering, brake) by wheel index; the physics step
//! turns them into impulses through [`VehicleRig::update`].

pub mod suspension;
pub mod traction;
pub mod wheel;

use nalgebra::{Translation3, UnitQuaternion};
use rapier3d::prelude::*;
use tracing::{debug, info, warn};

use crate::config::ChassisConfig;
use crate::error::RigError;
use crate::physics::PhysicsWorld;

pub use wheel::{WheelPosition, WheelRuntimeState, WheelSetpoints, WheelSpec};

use suspension::{cast_suspension_ray, refresh_wheel_frame, steering_rotation, suspension_force};
use traction::{integrate_spin, solve_traction};
use wheel::Wheel;

pub const WHEEL_COUNT: usize = 4;

pub struct VehicleRig {
    chassis: RigidBodyHandle,   // the chassis body
    wheels: Vec<Wheel>,         // indexed by WheelPosition::index()
    max_steer: Real,            // radians
}

impl VehicleRig {
    /// Wheels have to be attached afterwards with [`Self::add_wheel`].
    pub fn new(chassis: RigidBodyHandle, max_steer: Real) -> Self {
        Self {
            chassis,
            wheels: Vec::with_capacity(WHEEL_COUNT),
            max_steer: max_steer.abs(),
        }
    }

    /// Inserts the chassis body into `world` and registers `wheels` in order.
    pub fn spawn(
        world: &mut PhysicsWorld,
        chassis: &ChassisConfig,
        wheels: &[WheelSpec],
    ) -> Result<Self, RigError> {
        let handle = world.insert_chassis(chassis);
        let mut rig = Self::new(handle, chassis.max_steer);
        for spec in wheels {
            rig.add_wheel(*spec)?;
        }
        if !rig.is_ready() {
            return Err(RigError::NotReady { wheels: rig.wheels.len() });
        }
        info!(
            mass = chassis.mass,
            spawn = ?chassis.spawn_position,
            "vehicle rig spawned"
        );
        Ok(rig)
    }

    /// Registers a wheel and returns its fixed index. Specs must arrive in
    /// corner order; a malformed spec is rejected here and never reaches the
    /// step loop.
    pub fn add_wheel(&mut self, spec: WheelSpec) -> Result<usize, RigError> {
        let index = self.wheels.len();
        let Some(&expected) = WheelPosition::ALL.get(index) else {
            return Err(RigError::TooManyWheels);
        };
        if spec.position != expected {
            return Err(RigError::WheelOutOfOrder { expected, got: spec.position });
        }
        if let Err(e) = spec.validate() {
            warn!(wheel = %spec.position, error = %e, "wheel spec rejected");
            return Err(e);
        }

        self.wheels.push(Wheel::new(spec));
        debug!(wheel = %spec.position, index, "wheel registered");
        Ok(index)
    }

    pub fn is_ready(&self) -> bool {
        self.wheels.len() == WHEEL_COUNT
    }

    pub fn wheel_count(&self) -> usize {
        self.wheels.len()
    }

    pub fn chassis(&self) -> RigidBodyHandle {
        self.chassis
    }

    pub fn max_steer(&self) -> Real {
        self.max_steer
    }

    /// Indices of the wheels whose corner matches `select`.
    pub fn indices_where(&self, select: impl Fn(WheelPosition) -> bool) -> Vec<usize> {
        self.wheels
            .iter()
            .enumerate()
            .filter(|(_, w)| select(w.spec.position))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn wheel_spec(&self, index: usize) -> Result<&WheelSpec, RigError> {
        self.wheel(index).map(|w| &w.spec)
    }

    pub fn setpoints(&self, index: usize) -> Result<WheelSetpoints, RigError> {
        self.wheel(index).map(|w| w.setpoints)
    }

    /// State from the latest physics step (or reset).
    pub fn wheel_state(&self, index: usize) -> Result<&WheelRuntimeState, RigError> {
        self.wheel(index).map(|w| &w.state)
    }

    /// Suspension force computed for `index` during the latest step, in N.
    pub fn suspension_force(&self, index: usize) -> Result<Real, RigError> {
        self.wheel(index).map(|w| w.suspension_force)
    }

    pub fn compression(&self, index: usize) -> Result<Real, RigError> {
        self.wheel(index).map(|w| w.compression())
    }

    fn wheel(&self, index: usize) -> Result<&Wheel, RigError> {
        self.wheels.get(index).ok_or(RigError::NoSuchWheel(index))
    }

    fn wheel_mut(&mut self, index: usize) -> Result<&mut Wheel, RigError> {
        self.wheels.get_mut(index).ok_or(RigError::NoSuchWheel(index))
    }

    // --------------------------------------------------
    // Setpoints
    // --------------------------------------------------

    /// Drive force along the wheel's forward axis. Negative = forward.
    pub fn apply_engine_force(&mut self, force: Real, index: usize) -> Result<(), RigError> {
        if !force.is_finite() {
            return Err(RigError::NonFinite { what: "engine force" });
        }
        self.wheel_mut(index)?.setpoints.engine_force = force;
        Ok(())
    }

    /// Any index may be steered; the stored angle is clamped to ±max_steer.
    pub fn set_steering_value(&mut self, angle: Real, index: usize) -> Result<(), RigError> {
        if angle.is_nan() {
            return Err(RigError::NonFinite { what: "steering angle" });
        }
        let max = self.max_steer;
        self.wheel_mut(index)?.setpoints.steering = angle.clamp(-max, max);
        Ok(())
    }

    /// Max rolling-friction impulse per step opposing the wheel's rolling
    /// direction. Negative values are treated as zero.
    pub fn set_brake(&mut self, force: Real, index: usize) -> Result<(), RigError> {
        if !force.is_finite() {
            return Err(RigError::NonFinite { what: "brake force" });
        }
        self.wheel_mut(index)?.setpoints.brake = force.max(0.0);
        Ok(())
    }

    // --------------------------------------------------
    // Physics step
    // --------------------------------------------------

    /// Raycasts all wheels, applies suspension and traction impulses to the
    /// chassis and integrates wheel spin. Runs once per fixed step, before
    /// the integrator.
    pub fn update(
        &mut self,
        dt: Real,
        bodies: &mut RigidBodySet,
        colliders: &ColliderSet,
        query: &QueryPipeline,
    ) -> Result<(), RigError> {
        if !self.is_ready() {
            return Err(RigError::NotReady { wheels: self.wheels.len() });
        }
        let handle = self.chassis;
        let filter = QueryFilter::default().exclude_rigid_body(handle);

        {
            let chassis = bodies.get(handle).ok_or(RigError::MissingChassis)?;
            let pos = *chassis.position();

            // ----------------------------------------------------------------
            // 1) Raycast + suspension
            // ----------------------------------------------------------------
            for wheel in self.wheels.iter_mut() {
                refresh_wheel_frame(wheel, &pos);
                cast_suspension_ray(wheel, chassis, bodies, colliders, query, filter, dt);
            }

            let mass = chassis.mass();
            for wheel in self.wheels.iter_mut() {
                wheel.suspension_force = suspension_force(wheel, mass);
            }
        }

        let chassis = bodies.get_mut(handle).ok_or(RigError::MissingChassis)?;

        for wheel in &self.wheels {
            if wheel.suspension_force > 0.0 {
                let impulse = wheel.state.contact_normal * (wheel.suspension_force * dt);
                chassis.apply_impulse_at_point(impulse, wheel.state.contact_point, true);
            }
        }

        // ----------------------------------------------------------------
        // 2) Traction (uses the velocity after suspension impulses)
        // ----------------------------------------------------------------
        let impulses = solve_traction(&mut self.wheels, chassis, dt);
        for imp in impulses {
            chassis.apply_impulse_at_point(imp.impulse, imp.at_point, true);
        }

        integrate_spin(&mut self.wheels, chassis, dt);
        Ok(())
    }

    /// Recomputes the wheel's world pose from the current chassis pose, the
    /// latest suspension length, steering and spin.
    pub fn update_wheel_transform(
        &mut self,
        index: usize,
        bodies: &RigidBodySet,
    ) -> Result<WheelRuntimeState, RigError> {
        let chassis = bodies.get(self.chassis).ok_or(RigError::MissingChassis)?;
        let pos = *chassis.position();
        let wheel = self.wheel_mut(index)?;

        refresh_wheel_frame(wheel, &pos);

        let up_local = -wheel.spec.direction_local();
        let steer = steering_rotation(wheel, &up_local);
        let spin = match nalgebra::Unit::try_new(wheel.spec.axle_local(), 1e-6) {
            Some(axis) => UnitQuaternion::from_axis_angle(&axis, wheel.state.rotation),
            None => UnitQuaternion::identity(),
        };

        wheel.state.world_position =
            wheel.hard_point_ws + wheel.direction_ws * wheel.state.suspension_length;
        wheel.state.world_orientation = pos.rotation * steer * spin;
        Ok(wheel.state)
    }

    /// Teleports the chassis to the spawn pose and zeroes its velocity.
    /// Setpoints are left untouched: a held throttle keeps pushing.
    pub fn reset(
        &mut self,
        bodies: &mut RigidBodySet,
        position: Vector<Real>,
        orientation: UnitQuaternion<Real>,
    ) -> Result<(), RigError> {
        if !position.iter().all(|c| c.is_finite()) {
            return Err(RigError::NonFinite { what: "spawn position" });
        }
        let chassis = bodies.get_mut(self.chassis).ok_or(RigError::MissingChassis)?;

        chassis.set_position(Isometry::from_parts(Translation3::from(position), orientation), true);
        chassis.set_linvel(Vector::zeros(), true);
        chassis.set_angvel(Vector::zeros(), true);
        chassis.reset_forces(true);
        chassis.reset_torques(true);

        for wheel in self.wheels.iter_mut() {
            wheel.relax();
        }
        info!(position = ?[position.x, position.y, position.z], "vehicle reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_wheels, PhysicsConfig};
    use proptest::prelude::*;

    fn rig() -> (PhysicsWorld, VehicleRig) {
        let mut world = PhysicsWorld::new(&PhysicsConfig::default());
        let rig = VehicleRig::spawn(&mut world, &ChassisConfig::default(), &default_wheels()).unwrap();
        (world, rig)
    }

    #[test]
    fn spawn_registers_four_wheels_in_corner_order() {
        let (_, rig) = rig();
        assert!(rig.is_ready());
        for (i, p) in WheelPosition::ALL.iter().enumerate() {
            assert_eq!(rig.wheel_spec(i).unwrap().position, *p);
        }
        assert_eq!(rig.indices_where(|p| p.is_front()), vec![0, 1]);
    }

    #[test]
    fn fifth_wheel_is_rejected() {
        let (_, mut rig) = rig();
        assert_eq!(rig.add_wheel(WheelSpec::default()), Err(RigError::TooManyWheels));
    }

    #[test]
    fn out_of_order_wheel_is_rejected() {
        let mut rig = VehicleRig::new(RigidBodyHandle::invalid(), 0.5);
        let spec = WheelSpec { position: WheelPosition::RearLeft, ..WheelSpec::default() };
        assert_eq!(
            rig.add_wheel(spec),
            Err(RigError::WheelOutOfOrder {
                expected: WheelPosition::FrontLeft,
                got: WheelPosition::RearLeft,
            })
        );
        assert_eq!(rig.wheel_count(), 0);
    }

    #[test]
    fn malformed_wheel_never_registers() {
        let mut rig = VehicleRig::new(RigidBodyHandle::invalid(), 0.5);
        let spec = WheelSpec { radius: -1.0, ..WheelSpec::default() };
        assert!(rig.add_wheel(spec).is_err());
        assert_eq!(rig.wheel_count(), 0);
    }

    #[test]
    fn incomplete_rig_refuses_to_step() {
        let mut world = PhysicsWorld::new(&PhysicsConfig::default());
        let handle = world.insert_chassis(&ChassisConfig::default());
        let mut rig = VehicleRig::new(handle, 0.5);
        rig.add_wheel(default_wheels()[0]).unwrap();
        let err = rig
            .update(1.0 / 60.0, &mut world.bodies, &world.colliders, &world.query_pipeline)
            .unwrap_err();
        assert_eq!(err, RigError::NotReady { wheels: 1 });
    }

    #[test]
    fn setters_touch_only_their_wheel() {
        let (_, mut rig) = rig();
        rig.apply_engine_force(-750.0, 2).unwrap();
        rig.set_brake(36.0, 3).unwrap();
        rig.set_steering_value(0.2, 0).unwrap();

        assert_eq!(rig.setpoints(2).unwrap().engine_force, -750.0);
        assert_eq!(rig.setpoints(3).unwrap().brake, 36.0);
        assert_eq!(rig.setpoints(0).unwrap().steering, 0.2);
        assert_eq!(rig.setpoints(1).unwrap(), WheelSetpoints::default());
    }

    #[test]
    fn unknown_index_is_an_error() {
        let (_, mut rig) = rig();
        assert_eq!(rig.set_brake(1.0, 4), Err(RigError::NoSuchWheel(4)));
    }

    #[test]
    fn negative_brake_is_zero() {
        let (_, mut rig) = rig();
        rig.set_brake(-5.0, 0).unwrap();
        assert_eq!(rig.setpoints(0).unwrap().brake, 0.0);
    }

    #[test]
    fn airborne_wheels_produce_no_suspension_force() {
        // default spawn is 4 m up: every ray misses
        let (mut world, mut rig) = rig();
        rig.update(1.0 / 60.0, &mut world.bodies, &world.colliders, &world.query_pipeline)
            .unwrap();
        for i in 0..WHEEL_COUNT {
            assert!(!rig.wheel_state(i).unwrap().in_contact);
            assert_eq!(rig.suspension_force(i).unwrap(), 0.0);
            assert_eq!(rig.wheel_state(i).unwrap().suspension_length, 0.5);
        }
    }

    #[test]
    fn hard_point_closer_than_radius_clamps_to_zero() {
        // hard points at y = 0.3, radius 0.35: the ray starts inside the wheel
        let (mut world, mut rig) = rig();
        let h = rig.chassis();
        world.bodies[h].set_translation(vector![0.0, 0.2, 0.0], true);
        rig.update(1.0 / 60.0, &mut world.bodies, &world.colliders, &world.query_pipeline)
            .unwrap();
        for i in 0..WHEEL_COUNT {
            let state = rig.wheel_state(i).unwrap();
            assert!(state.in_contact);
            assert_eq!(state.suspension_length, 0.0);
        }
    }

    proptest! {
        #[test]
        fn suspension_length_stays_within_travel(
            height in -0.3f32..1.2,
            roll in -0.4f32..0.4,
            pitch in -0.4f32..0.4,
        ) {
            let (mut world, mut rig) = rig();
            let h = rig.chassis();
            let pose = Isometry::new(vector![0.0, height, 0.0], vector![roll, 0.0, pitch]);
            world.bodies[h].set_position(pose, true);
            rig.update(1.0 / 60.0, &mut world.bodies, &world.colliders, &world.query_pipeline)
                .unwrap();
            for i in 0..WHEEL_COUNT {
                let spec = rig.wheel_spec(i).unwrap();
                let length = rig.wheel_state(i).unwrap().suspension_length;
                prop_assert!(length >= 0.0, "wheel {} length {}", i, length);
                prop_assert!(length <= spec.max_length(), "wheel {} length {}", i, length);
            }
        }

        #[test]
        fn steering_is_always_clamped(angle in -1.0e6f32..1.0e6, index in 0usize..4) {
            let (_, mut rig) = rig();
            rig.set_steering_value(angle, index).unwrap();
            let stored = rig.setpoints(index).unwrap().steering;
            prop_assert!(stored >= -0.5 && stored <= 0.5);
            if angle.abs() <= 0.5 {
                prop_assert_eq!(stored, angle);
            }
        }
    }
}
