// ==============================================================================
// main.rs — HEADLESS DRIVER
// ------------------------------------------------------------------------------
// - 60 Hz display cadence (tokio interval), measured wall delta per frame
// - stdin lines (+w, -w, +space, -r, blur) -> KeyEvent channel -> Simulation
// - snapshots -> logging task
// - exits on ctrl-c, or once stdin closes and its events have been applied
//
// Usage: raycast-rig [config.json]
// ==============================================================================

use std::env;
use std::io::{self, BufRead};
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result};
use raycast_rig::{logging, FrameSnapshot, KeyEvent, SimConfig, Simulation};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

const FRAME: Duration = Duration::from_micros(16_667);

/// Blocking stdin reader on its own thread, so shutdown never waits on it.
fn read_keys(tx: mpsc::UnboundedSender<KeyEvent>) {
    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        };
        match KeyEvent::parse(&line) {
            Some(event) => {
                if tx.send(event).is_err() {
                    break;
                }
            }
            None if line.trim().is_empty() => {}
            None => warn!(line = %line.trim(), "unrecognised key line"),
        }
    }
    debug!("stdin closed");
}

async fn log_snapshots(mut rx: mpsc::UnboundedReceiver<FrameSnapshot>) {
    while let Some(snap) = rx.recv().await {
        let p = snap.chassis.pose.position;
        if snap.frame % 60 == 0 {
            info!(
                frame = snap.frame,
                t = snap.sim_time,
                pos = ?p,
                speed = snap.chassis.forward_speed,
                "vehicle"
            );
        } else {
            debug!(frame = snap.frame, steps = snap.steps, pos = ?p, "frame");
        }
    }
}

fn load_config() -> Result<SimConfig> {
    match env::args().nth(1) {
        Some(path) => SimConfig::from_json_file(&path)
            .with_context(|| format!("loading config from {path}")),
        None => Ok(SimConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let config = load_config()?;
    let (key_tx, key_rx) = mpsc::unbounded_channel();
    let mut sim = Simulation::new(&config, Box::new(key_rx)).context("building simulation")?;
    info!("🚗 simulation ready, reading keys from stdin");

    let stdin_task = thread::spawn(move || read_keys(key_tx));
    let (snap_tx, snap_rx) = mpsc::unbounded_channel();
    let logger = tokio::spawn(log_snapshots(snap_rx));

    let mut ticker = interval(FRAME);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c, shutting down");
                break;
            }
        }

        let input_closed = stdin_task.is_finished();
        let now = Instant::now();
        let wall_dt = now.duration_since(last).as_secs_f32();
        last = now;

        let snapshot = sim.frame(wall_dt).context("simulation frame")?;
        if snap_tx.send(snapshot).is_err() {
            break;
        }

        // Events sent before the reader finished were drained by this frame.
        if input_closed {
            info!(frames = sim.frames(), "input closed, shutting down");
            break;
        }
    }

    drop(snap_tx);
    logger.await.context("snapshot logger")?;
    Ok(())
}
