// ==============================================================================
// controller.rs — INPUT STATE -> RIG SETPOINTS (priority policy)
// ------------------------------------------------------------------------------
// Evaluated only when the pressed-key set changes, never per physics step.
//
// Order:
// 1) reset    -> teleport to spawn (independent of everything below)
// 2) brake    -> brake_force on all wheels, steering/engine left as they are
// 3) otherwise:
//    - brake cleared on all wheels
//    - steering: left (+max) > right (-max) > centred, front wheels only
//    - throttle: forward (-max_force) > backward (+max_force) > drag brake
//      (slow_down_force on all wheels, engine setpoint left as it was)
//
// Engine force goes to all four wheels, steering to the front pair.
// ==============================================================================

use nalgebra::UnitQuaternion;
use rapier3d::prelude::*;
use tracing::debug;

use crate::config::ControlConfig;
use crate::error::RigError;
use crate::input::VehicleInputState;
use crate::rig::VehicleRig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteerCommand {
    Left,
    Right,
    Centre,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleCommand {
    Forward,
    Backward,
    Coast,
}

/// What one evaluation decided. `drive` is None when the brake overrides
/// steering and throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPlan {
    pub reset: bool,
    pub drive: Option<(SteerCommand, ThrottleCommand)>,
}

impl ControlPlan {
    pub fn is_braking(&self) -> bool {
        self.drive.is_none()
    }
}

pub struct VehicleController {
    config: ControlConfig,
    spawn_position: Vector<Real>,
    spawn_orientation: UnitQuaternion<Real>,
}

impl VehicleController {
    pub fn new(config: ControlConfig, spawn_position: [Real; 3]) -> Self {
        Self {
            config,
            spawn_position: Vector::from(spawn_position),
            spawn_orientation: UnitQuaternion::identity(),
        }
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn spawn_position(&self) -> Vector<Real> {
        self.spawn_position
    }

    /// Pure branch selection, first matching branch wins.
    pub fn plan(input: &VehicleInputState) -> ControlPlan {
        if input.brake {
            return ControlPlan { reset: input.reset, drive: None };
        }

        let steer = if input.steer_left {
            SteerCommand::Left
        } else if input.steer_right {
            SteerCommand::Right
        } else {
            SteerCommand::Centre
        };

        let throttle = if input.forward {
            ThrottleCommand::Forward
        } else if input.backward {
            ThrottleCommand::Backward
        } else {
            ThrottleCommand::Coast
        };

        ControlPlan { reset: input.reset, drive: Some((steer, throttle)) }
    }

    /// Writes the plan for `input` into the rig.
    pub fn apply(
        &self,
        input: &VehicleInputState,
        rig: &mut VehicleRig,
        bodies: &mut RigidBodySet,
    ) -> Result<ControlPlan, RigError> {
        let plan = Self::plan(input);
        let all: Vec<usize> = (0..rig.wheel_count()).collect();
        let steered = rig.indices_where(|p| p.is_front());

        if plan.reset {
            rig.reset(bodies, self.spawn_position, self.spawn_orientation)?;
        }

        let Some((steer, throttle)) = plan.drive else {
            for &i in &all {
                rig.set_brake(self.config.brake_force, i)?;
            }
            debug!(brake = self.config.brake_force, "brake engaged");
            return Ok(plan);
        };

        for &i in &all {
            rig.set_brake(0.0, i)?;
        }

        let angle = match steer {
            SteerCommand::Left => self.config.max_steer,
            SteerCommand::Right => -self.config.max_steer,
            SteerCommand::Centre => 0.0,
        };
        for &i in &steered {
            rig.set_steering_value(angle, i)?;
        }

        match throttle {
            ThrottleCommand::Forward | ThrottleCommand::Backward => {
                let force = if throttle == ThrottleCommand::Forward {
                    -self.config.max_force
                } else {
                    self.config.max_force
                };
                for &i in &all {
                    rig.apply_engine_force(force, i)?;
                }
            }
            ThrottleCommand::Coast => {
                // drag brake only; the last engine setpoint stays
                for &i in &all {
                    rig.set_brake(self.config.slow_down_force, i)?;
                }
            }
        }

        debug!(?steer, ?throttle, reset = plan.reset, "controller evaluated");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_wheels, ChassisConfig, PhysicsConfig};
    use crate::physics::PhysicsWorld;
    use crate::rig::WheelSetpoints;

    fn setup() -> (PhysicsWorld, VehicleRig, VehicleController) {
        let mut world = PhysicsWorld::new(&PhysicsConfig::default());
        let chassis = ChassisConfig::default();
        let rig = VehicleRig::spawn(&mut world, &chassis, &default_wheels()).unwrap();
        let controller = VehicleController::new(ControlConfig::default(), chassis.spawn_position);
        (world, rig, controller)
    }

    fn sp(rig: &VehicleRig, i: usize) -> WheelSetpoints {
        rig.setpoints(i).unwrap()
    }

    #[test]
    fn forward_and_left() {
        let (mut world, mut rig, ctl) = setup();
        let input = VehicleInputState { forward: true, steer_left: true, ..Default::default() };
        ctl.apply(&input, &mut rig, &mut world.bodies).unwrap();

        for i in 0..4 {
            assert_eq!(sp(&rig, i).engine_force, -750.0);
            assert_eq!(sp(&rig, i).brake, 0.0);
        }
        assert_eq!(sp(&rig, 0).steering, 0.5);
        assert_eq!(sp(&rig, 1).steering, 0.5);
        assert_eq!(sp(&rig, 2).steering, 0.0);
        assert_eq!(sp(&rig, 3).steering, 0.0);
    }

    #[test]
    fn left_wins_over_right_and_forward_over_backward() {
        let input = VehicleInputState {
            forward: true,
            backward: true,
            steer_left: true,
            steer_right: true,
            ..Default::default()
        };
        assert_eq!(
            VehicleController::plan(&input).drive,
            Some((SteerCommand::Left, ThrottleCommand::Forward))
        );
    }

    #[test]
    fn backward_and_right() {
        let (mut world, mut rig, ctl) = setup();
        let input = VehicleInputState { backward: true, steer_right: true, ..Default::default() };
        ctl.apply(&input, &mut rig, &mut world.bodies).unwrap();
        assert_eq!(sp(&rig, 3).engine_force, 750.0);
        assert_eq!(sp(&rig, 0).steering, -0.5);
    }

    #[test]
    fn brake_overrides_and_keeps_steering() {
        let (mut world, mut rig, ctl) = setup();
        let turning = VehicleInputState { forward: true, steer_right: true, ..Default::default() };
        ctl.apply(&turning, &mut rig, &mut world.bodies).unwrap();

        let braking = VehicleInputState { brake: true, ..turning };
        let plan = ctl.apply(&braking, &mut rig, &mut world.bodies).unwrap();
        assert!(plan.is_braking());
        for i in 0..4 {
            assert_eq!(sp(&rig, i).brake, 36.0);
            assert_eq!(sp(&rig, i).engine_force, -750.0);
        }
        assert_eq!(sp(&rig, 0).steering, -0.5);
    }

    #[test]
    fn coasting_applies_drag_brake_and_keeps_engine() {
        let (mut world, mut rig, ctl) = setup();
        ctl.apply(&VehicleInputState { forward: true, ..Default::default() }, &mut rig, &mut world.bodies)
            .unwrap();
        ctl.apply(&VehicleInputState::default(), &mut rig, &mut world.bodies).unwrap();
        for i in 0..4 {
            assert_eq!(sp(&rig, i).engine_force, -750.0);
            assert_eq!(sp(&rig, i).brake, 19.6);
            assert_eq!(sp(&rig, i).steering, 0.0);
        }
    }

    #[test]
    fn reset_fires_alongside_brake() {
        let (mut world, mut rig, ctl) = setup();
        let h = rig.chassis();
        world.bodies[h].set_linvel(vector![3.0, 0.0, -8.0], true);
        world.bodies[h].set_translation(vector![20.0, 1.0, -40.0], true);

        let input = VehicleInputState { reset: true, brake: true, ..Default::default() };
        let plan = ctl.apply(&input, &mut rig, &mut world.bodies).unwrap();
        assert!(plan.reset && plan.is_braking());

        let body = &world.bodies[h];
        assert_eq!(*body.linvel(), Vector::zeros());
        assert_eq!(*body.translation(), vector![0.0, 4.0, 0.0]);
        assert_eq!(sp(&rig, 0).brake, 36.0);
    }
}
