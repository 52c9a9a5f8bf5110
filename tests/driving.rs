// End-to-end driving behaviour on a headless Simulation.

use std::collections::VecDeque;

use nalgebra::UnitQuaternion;
use raycast_rig::camera::CameraOffset;
use raycast_rig::{KeyEvent, SimConfig, Simulation};

const DT: f32 = 1.0 / 60.0;

fn sim() -> Simulation {
    let mut config = SimConfig::default();
    config.chassis.spawn_position = [0.0, 1.0, 0.0];
    Simulation::headless(&config, Box::new(VecDeque::<KeyEvent>::new())).unwrap()
}

fn run(sim: &mut Simulation, frames: usize) {
    for _ in 0..frames {
        sim.frame(DT).unwrap();
    }
}

/// Let the suspension take the chassis weight.
fn settled() -> Simulation {
    let mut s = sim();
    run(&mut s, 120);
    s
}

fn key(sim: &mut Simulation, line: &str) {
    sim.handle_key(&KeyEvent::parse(line).unwrap()).unwrap();
}

/// Drives forward for `frames` from rest and releases the throttle.
fn at_speed(frames: usize) -> Simulation {
    let mut s = settled();
    key(&mut s, "+w");
    run(&mut s, frames);
    key(&mut s, "-w");
    s
}

#[test]
fn first_frame_advances_exactly_one_step() {
    let mut s = sim();
    let snap = s.frame(0.0).unwrap();
    assert_eq!(snap.steps, 1);
    assert!((snap.sim_time - DT).abs() < 1e-7);
    assert!(snap.chassis.pose.position.iter().all(|c| c.is_finite()));
    assert!(snap.chassis.pose.orientation.iter().all(|c| c.is_finite()));
}

#[test]
fn suspension_holds_the_chassis_up() {
    let s = settled();
    let y = s.chassis_isometry().unwrap().translation.vector.y;
    // box bottom clears the ground, wheels all touching
    assert!(y > 0.5 && y < 1.0, "ride height {y}");
    for i in 0..4 {
        let state = s.rig().wheel_state(i).unwrap();
        assert!(state.in_contact);
        assert!(state.suspension_length >= 0.0 && state.suspension_length <= 1.5);
    }
}

#[test]
fn holding_forward_moves_toward_negative_z() {
    let mut s = settled();
    key(&mut s, "+w");
    let mut last = s.chassis_isometry().unwrap().translation.vector.z;
    for step in 0..120 {
        let snap = s.frame(DT).unwrap();
        let z = snap.chassis.pose.position[2];
        assert!(z < last, "z did not decrease at step {step}: {z} >= {last}");
        last = z;
    }
    assert!(s.forward_speed().unwrap() > 5.0);
}

#[test]
fn brake_alone_never_speeds_up_and_keeps_steering() {
    let mut s = settled();
    key(&mut s, "+w");
    run(&mut s, 60);
    key(&mut s, "-w");
    key(&mut s, "+space");
    // brake overrides steering: the held key is ignored
    key(&mut s, "+a");
    assert_eq!(s.rig().setpoints(0).unwrap().steering, 0.0);

    let mut last = s.forward_speed().unwrap();
    assert!(last > 1.0);
    for _ in 0..60 {
        let speed = s.frame(DT).unwrap().chassis.forward_speed;
        assert!(speed <= last + 1e-3, "speed rose from {last} to {speed}");
        last = speed;
    }
    assert!(last < 1.0, "braked speed {last}");
    assert_eq!(s.rig().setpoints(0).unwrap().steering, 0.0);
}

#[test]
fn released_throttle_decays_toward_rest() {
    let mut s = at_speed(120);
    let start = s.forward_speed().unwrap();
    assert!(start > 5.0);
    run(&mut s, 180);
    let end = s.forward_speed().unwrap();
    // the released engine setpoint stays; the drag brake still wins
    assert!(end >= 0.0 && end < start * 0.25, "speed {start} -> {end}");
}

#[test]
fn brake_stops_faster_than_drag() {
    let mut coasting = at_speed(120);
    let mut braking = at_speed(120);
    key(&mut braking, "+space");

    run(&mut coasting, 30);
    run(&mut braking, 30);

    let drag = coasting.forward_speed().unwrap();
    let brake = braking.forward_speed().unwrap();
    assert!(brake < drag, "brake {brake} vs drag {drag}");
}

#[test]
fn reset_while_moving_restores_spawn_pose() {
    let mut s = settled();
    key(&mut s, "+w");
    key(&mut s, "+d");
    run(&mut s, 90);
    key(&mut s, "+r");

    let body = &s.world().bodies[s.rig().chassis()];
    assert_eq!(*body.linvel(), nalgebra::Vector3::zeros());
    assert_eq!(*body.angvel(), nalgebra::Vector3::zeros());
    assert_eq!(*body.translation(), nalgebra::Vector3::new(0.0, 1.0, 0.0));
    assert_eq!(*body.rotation(), UnitQuaternion::identity());
    // held throttle stays applied
    assert_eq!(s.rig().setpoints(2).unwrap().engine_force, -750.0);

    for i in 0..4 {
        let spec = *s.rig().wheel_spec(i).unwrap();
        let state = s.wheel_transform(i).unwrap();
        assert_eq!(state.suspension_length, spec.rest_length);
        let [x, y, z] = spec.connection_point;
        let expected = nalgebra::Point3::new(x, 1.0 + y - spec.rest_length, z);
        assert!((state.world_position - expected).norm() < 1e-5);
    }
}

#[test]
fn camera_tracks_chassis_with_offset() {
    // spawned high enough that no wheel touches down on the first step
    let mut s = Simulation::headless(&SimConfig::default(), Box::new(VecDeque::<KeyEvent>::new())).unwrap();
    s.camera_mut().offset = CameraOffset::new(0.0, 3.0, -10.0);
    // falling straight down keeps the orientation at identity
    let snap = s.frame(0.0).unwrap();
    let p = snap.chassis.pose.position;
    assert_eq!(snap.chassis.pose.orientation, [0.0, 0.0, 0.0, 1.0]);
    assert_eq!(snap.camera.position, [p[0], p[1] + 3.0, p[2] - 10.0]);
    assert_eq!(snap.camera.target, p);
}

#[test]
fn focus_loss_releases_throttle() {
    let mut s = settled();
    key(&mut s, "+w");
    run(&mut s, 30);
    key(&mut s, "blur");
    assert!(!s.input().state().forward);
    for i in 0..4 {
        let sp = s.rig().setpoints(i).unwrap();
        assert_eq!(sp.engine_force, -750.0);
        assert_eq!(sp.brake, 19.6);
    }
}

#[test]
fn coasting_with_kept_engine_force_still_slows_down() {
    let mut s = at_speed(120);
    assert_eq!(s.rig().setpoints(0).unwrap().engine_force, -750.0);
    let start = s.forward_speed().unwrap();
    let mut last = start;
    for _ in 0..180 {
        let speed = s.frame(DT).unwrap().chassis.forward_speed;
        assert!(speed <= last + 1e-3, "speed rose from {last} to {speed}");
        last = speed;
    }
    assert!(last < start * 0.25, "speed {start} -> {last}");
}
