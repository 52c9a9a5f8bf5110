// ==============================================================================
// physics.rs — PHYSICS WORLD + FIXED-STEP DRIVER
// ------------------------------------------------------------------------------
// Owns every rapier set plus the query pipeline used for suspension rays.
//
// Stepping model:
// - step(wall_dt) turns wall-clock time into a whole number of fixed steps.
//   The very first call always takes exactly one step; later calls feed an
//   accumulator and take up to max_substeps steps, dropping the remainder.
// - Every internal step runs: hooks.before_integrate -> pipeline.step ->
//   exploding-body guard -> hooks.after_step.
//
// Collision groups: the ground only collides with the chassis and vice versa.
// ==============================================================================

use rapier3d::prelude::*;
use tracing::{debug, info, trace, warn};

use crate::config::{ChassisConfig, PhysicsConfig};

pub const GROUP_GROUND: Group = Group::from_bits_truncate(0b0001);
pub const GROUP_CHASSIS: Group = Group::from_bits_truncate(0b0010);

/// Bodies farther than this from the origin on any axis are reset.
const EXPLODE_LIMIT: Real = 1_000.0;
const EXPLODE_RESET: [Real; 3] = [0.0, 1.0, 0.0];
const GROUND_HALF_HEIGHT: Real = 0.1;

/// Mutable view of the world handed to [`StepHooks::before_integrate`].
pub struct StepContext<'a> {
    pub dt: Real,
    pub bodies: &'a mut RigidBodySet,
    pub colliders: &'a ColliderSet,
    pub query_pipeline: &'a QueryPipeline,
}

/// Per-step callbacks. `before_integrate` is where vehicle forces go;
/// `after_step` sees the integrated state.
pub trait StepHooks {
    fn before_integrate(&mut self, _ctx: &mut StepContext<'_>) {}
    fn after_step(&mut self, _bodies: &RigidBodySet) {}
}

impl StepHooks for () {}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>, // m/s², world axes
    pub pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet, // ground + chassis
    pub colliders: ColliderSet,
    pub joints: ImpulseJointSet, // unused by the rig, required by the pipeline
    pub multibody_joints: MultibodyJointSet,
    pub ccd: CCDSolver,
    pub query_pipeline: QueryPipeline, // suspension rays; refreshed by every step

    fixed_dt: Real,        // s
    max_substeps: u32,
    accumulator: Real,     // s, always < fixed_dt after a step
    has_wall_sample: bool, // false until the first step() call
    steps: u64,            // internal steps taken
    sim_time: Real,        // s, steps * fixed_dt
}

impl PhysicsWorld {
    pub fn new(config: &PhysicsConfig) -> Self {
        let gravity = Vector::from(config.gravity);

        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        // Thin static slab, top face exactly at y = 0.
        let ground_rb = RigidBodyBuilder::fixed()
            .translation(vector![0.0, -GROUND_HALF_HEIGHT, 0.0])
            .build();
        let ground_handle = bodies.insert(ground_rb);

        let half = config.ground_half_extent;
        let ground_collider = ColliderBuilder::cuboid(half, GROUND_HALF_HEIGHT, half)
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS))
            .friction(config.ground_friction)
            .restitution(0.0)
            .build();
        colliders.insert_with_parent(ground_collider, ground_handle, &mut bodies);

        let mut query_pipeline = QueryPipeline::new();
        query_pipeline.update(&colliders);

        info!(
            bodies = bodies.len(),
            colliders = colliders.len(),
            fixed_dt = config.fixed_dt,
            "ground inserted"
        );

        Self {
            gravity,
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline,
            fixed_dt: config.fixed_dt,
            max_substeps: config.max_substeps.max(1),
            accumulator: 0.0,
            has_wall_sample: false,
            steps: 0,
            sim_time: 0.0,
        }
    }

    /// Dynamic box body for the chassis. Collider density is derived from
    /// the configured mass so the body ends up with exactly that mass.
    pub fn insert_chassis(&mut self, config: &ChassisConfig) -> RigidBodyHandle {
        let [hx, hy, hz] = config.half_extents;
        let volume = 8.0 * hx * hy * hz;
        let density = config.mass / volume; // ρ = m / V

        let rb = RigidBodyBuilder::dynamic()
            .translation(Vector::from(config.spawn_position))
            .linear_damping(config.linear_damping)
            .angular_damping(config.angular_damping)
            .can_sleep(false)
            .build();

        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .collision_groups(InteractionGroups::new(GROUP_CHASSIS, GROUP_GROUND))
            .active_events(ActiveEvents::empty())
            .density(density)
            .friction(config.friction)
            .restitution(0.0)
            .build();

        let handle = self.bodies.insert(rb);
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        self.query_pipeline.update(&self.colliders);

        debug!(?handle, mass = config.mass, density, "chassis inserted");
        handle
    }

    pub fn fixed_dt(&self) -> Real {
        self.fixed_dt
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps
    }

    pub fn sim_time(&self) -> Real {
        self.sim_time
    }

    /// Leftover fraction of a fixed step, in [0, 1).
    ///
    /// The simulated state lags wall-clock time by `alpha * fixed_dt`. A
    /// presentation layer can blend the previous and current synced poses
    /// with this factor to hide the step/frame beat.
    pub fn interpolation_alpha(&self) -> Real {
        if self.fixed_dt > 0.0 {
            (self.accumulator / self.fixed_dt).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Advances the world by the given wall-clock delta and returns the
    /// number of fixed steps taken. Non-positive or non-finite deltas count
    /// as one fixed step.
    pub fn step<H: StepHooks>(&mut self, wall_dt: Real, hooks: &mut H) -> usize {
        let fixed = self.fixed_dt;

        let steps = if !self.has_wall_sample {
            self.has_wall_sample = true;
            1
        } else {
            let dt = if wall_dt.is_finite() && wall_dt > 0.0 { wall_dt } else { fixed };
            self.accumulator += dt;

            let mut n = 0;
            while self.accumulator >= fixed && n < self.max_substeps {
                self.accumulator -= fixed;
                n += 1;
            }
            if self.accumulator >= fixed {
                debug!(dropped = self.accumulator, "substep cap reached, dropping time");
            }
            self.accumulator %= fixed;
            n as usize
        };

        for _ in 0..steps {
            self.internal_step(hooks);
        }
        steps
    }

    fn internal_step<H: StepHooks>(&mut self, hooks: &mut H) {
        let dt = self.fixed_dt;
        let hooks_phys = ();
        let events = ();

        // 1) Vehicle forces
        {
            let mut ctx = StepContext {
                dt,
                bodies: &mut self.bodies,
                colliders: &self.colliders,
                query_pipeline: &self.query_pipeline,
            };
            hooks.before_integrate(&mut ctx);
        }

        // 2) Integrate
        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters {
                dt,
                ..IntegrationParameters::default()
            },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &hooks_phys,
            &events,
        );

        // 3) Safety: prevent bodies from exploding to insane coordinates
        self.reset_exploded_bodies();

        self.steps += 1;
        self.sim_time += dt;
        trace!(step = self.steps, "physics step");

        // 4) Observers (render sync)
        hooks.after_step(&self.bodies);
    }

    fn reset_exploded_bodies(&mut self) {
        for (handle, body) in self.bodies.iter_mut() {
            if !body.is_dynamic() {
                continue;
            }
            let pos = *body.translation();
            let bad = pos.iter().any(|c| !c.is_finite() || c.abs() > EXPLODE_LIMIT);
            if bad {
                let reset = Vector::from(EXPLODE_RESET);
                body.set_translation(reset, true);
                body.set_linvel(Vector::zeros(), true);
                body.set_angvel(Vector::zeros(), true);
                warn!(?handle, from = ?[pos.x, pos.y, pos.z], "reset exploding body");
            }
        }
    }
}
