// ==============================================================================
// sim.rs — ONE SIMULATION INSTANCE, ONE FRAME AT A TIME
// ------------------------------------------------------------------------------
// Frame order:
// (a) drain pending key events -> InputController -> VehicleController
//     (only when the pressed set changed)
// (b) PhysicsWorld::step(wall_dt): per internal step
//       rig.update (raycasts + impulses) -> integrate -> RenderSync
// (c) FollowCamera from the integrated chassis pose
// (d) FrameSnapshot for presentation / logging
//
// Everything runs on the caller's thread. Key events are only applied at
// frame boundaries, never during a physics step.
// ==============================================================================

use nalgebra::Isometry3;
use rapier3d::prelude::*;
use serde::Serialize;
use tracing::{debug, trace};

use crate::camera::{CameraPose, FollowCamera};
use crate::config::SimConfig;
use crate::controller::VehicleController;
use crate::debug::DebugOverlay;
use crate::error::{ConfigError, RigError};
use crate::input::{InputController, KeyEvent, KeyEventSource, VehicleInputState};
use crate::physics::{PhysicsWorld, StepContext, StepHooks};
use crate::render_sync::{Pose, RenderScene, RenderSync, SyncedPoses};
use crate::rig::{VehicleRig, WheelRuntimeState};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChassisSnapshot {
    pub pose: Pose,
    pub linvel: [Real; 3],
    pub angvel: [Real; 3],
    pub speed: Real,
    /// Velocity along the chassis forward axis (local -z), m/s.
    pub forward_speed: Real,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameSnapshot {
    pub frame: u64,
    pub sim_time: Real,
    pub steps: usize,
    /// Blend factor between the previous and this frame's render poses.
    pub interpolation_alpha: Real,
    pub input: VehicleInputState,
    pub chassis: ChassisSnapshot,
    pub render: SyncedPoses,
    pub camera: CameraPose,
    pub debug: DebugOverlay,
}

/// Step hooks wiring the rig and render sync into the physics loop.
struct FrameHooks<'a> {
    rig: &'a mut VehicleRig,
    scene: &'a mut RenderScene,
    sync: &'a RenderSync,
    poses: Option<SyncedPoses>,
    error: Option<RigError>,
}

impl StepHooks for FrameHooks<'_> {
    fn before_integrate(&mut self, ctx: &mut StepContext<'_>) {
        if let Err(e) = self.rig.update(ctx.dt, ctx.bodies, ctx.colliders, ctx.query_pipeline) {
            self.error.get_or_insert(e);
        }
    }

    fn after_step(&mut self, bodies: &RigidBodySet) {
        match self.sync.sync(self.scene, self.rig, bodies) {
            Ok(poses) => self.poses = Some(poses),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
    }
}

pub struct Simulation {
    world: PhysicsWorld,
    rig: VehicleRig,
    controller: VehicleController,
    input: InputController,
    events: Box<dyn KeyEventSource>,
    scene: RenderScene,
    render_sync: RenderSync,
    camera: FollowCamera,
    overlay: DebugOverlay,
    poses: SyncedPoses,
    frame: u64,
}

impl Simulation {
    pub fn new(config: &SimConfig, events: Box<dyn KeyEventSource>) -> Result<Self, ConfigError> {
        Self::with_scene(config, events, RenderScene::load(&config.render))
    }

    /// Same as [`Self::new`] without looking for render assets.
    pub fn headless(config: &SimConfig, events: Box<dyn KeyEventSource>) -> Result<Self, ConfigError> {
        Self::with_scene(config, events, RenderScene::headless())
    }

    fn with_scene(
        config: &SimConfig,
        events: Box<dyn KeyEventSource>,
        mut scene: RenderScene,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut world = PhysicsWorld::new(&config.physics);
        let mut rig = VehicleRig::spawn(&mut world, &config.chassis, &config.wheels)?;
        let controller = VehicleController::new(config.control.clone(), config.chassis.spawn_position);
        let render_sync = RenderSync::new(&config.render);

        let poses = render_sync.sync(&mut scene, &mut rig, &world.bodies)?;
        let overlay = DebugOverlay::capture(&rig, &world.bodies)?;

        Ok(Self {
            world,
            rig,
            controller,
            input: InputController::new(config.control.bindings.clone()),
            events,
            scene,
            render_sync,
            camera: FollowCamera::new(config.camera.offset),
            overlay,
            poses,
            frame: 0,
        })
    }

    /// Applies one key event. The controller runs only if the pressed set
    /// changed. Returns whether it ran.
    pub fn handle_key(&mut self, event: &KeyEvent) -> Result<bool, RigError> {
        if !self.input.handle(event) {
            return Ok(false);
        }
        let state = self.input.state();
        self.controller.apply(&state, &mut self.rig, &mut self.world.bodies)?;
        Ok(true)
    }

    fn drain_events(&mut self) -> Result<usize, RigError> {
        let mut n = 0;
        while let Some(event) = self.events.poll_event() {
            self.handle_key(&event)?;
            n += 1;
        }
        Ok(n)
    }

    pub fn frame(&mut self, wall_dt: Real) -> Result<FrameSnapshot, RigError> {
        // (a) input
        let events = self.drain_events()?;

        // (b) physics + render sync
        let mut hooks = FrameHooks {
            rig: &mut self.rig,
            scene: &mut self.scene,
            sync: &self.render_sync,
            poses: None,
            error: None,
        };
        let steps = self.world.step(wall_dt, &mut hooks);
        let FrameHooks { poses, error, .. } = hooks;
        if let Some(e) = error {
            return Err(e);
        }
        if let Some(p) = poses {
            self.poses = p;
        }

        // (c) camera
        let chassis_pose = self.chassis_isometry()?;
        let camera = self.camera.update(&chassis_pose);

        // (d) snapshot
        self.overlay.refresh(&self.rig, &self.world.bodies)?;
        self.frame += 1;
        let snapshot = FrameSnapshot {
            frame: self.frame,
            sim_time: self.world.sim_time(),
            steps,
            interpolation_alpha: self.world.interpolation_alpha(),
            input: self.input.state(),
            chassis: self.chassis_snapshot()?,
            render: self.poses,
            camera,
            debug: self.overlay.clone(),
        };

        if events > 0 {
            debug!(frame = self.frame, events, input = ?snapshot.input, "input applied");
        }
        trace!(frame = self.frame, steps, "frame");
        Ok(snapshot)
    }

    fn chassis(&self) -> Result<&RigidBody, RigError> {
        self.world.bodies.get(self.rig.chassis()).ok_or(RigError::MissingChassis)
    }

    pub fn chassis_isometry(&self) -> Result<Isometry3<Real>, RigError> {
        Ok(*self.chassis()?.position())
    }

    /// Velocity along the chassis forward axis (local -z).
    pub fn forward_speed(&self) -> Result<Real, RigError> {
        let body = self.chassis()?;
        let forward = body.rotation() * -Vector::z();
        Ok(body.linvel().dot(&forward))
    }

    pub fn chassis_snapshot(&self) -> Result<ChassisSnapshot, RigError> {
        let body = self.chassis()?;
        let v = *body.linvel();
        let w = *body.angvel();
        Ok(ChassisSnapshot {
            pose: Pose::from_parts(*body.translation(), body.rotation()),
            linvel: [v.x, v.y, v.z],
            angvel: [w.x, w.y, w.z],
            speed: v.norm(),
            forward_speed: self.forward_speed()?,
        })
    }

    /// Recomputes one wheel's world transform from the current chassis pose.
    pub fn wheel_transform(&mut self, index: usize) -> Result<WheelRuntimeState, RigError> {
        self.rig.update_wheel_transform(index, &self.world.bodies)
    }

    pub fn rig(&self) -> &VehicleRig {
        &self.rig
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn bodies_mut(&mut self) -> &mut RigidBodySet {
        &mut self.world.bodies
    }

    pub fn input(&self) -> &InputController {
        &self.input
    }

    pub fn camera_mut(&mut self) -> &mut FollowCamera {
        &mut self.camera
    }

    pub fn scene(&self) -> &RenderScene {
        &self.scene
    }

    pub fn frames(&self) -> u64 {
        self.frame
    }
}
