//! Raycast-suspension vehicle on a rapier rigid-body world.
//!
//! [`sim::Simulation`] ties the pieces together; every other module is usable
//! on its own.

pub mod camera;
pub mod config;
pub mod controller;
pub mod debug;
pub mod error;
pub mod input;
pub mod logging;
pub mod physics;
pub mod render_sync;
pub mod rig;
pub mod sim;

pub use config::SimConfig;
pub use error::{AssetError, ConfigError, RigError};
pub use input::{KeyEvent, KeyEventSource};
pub use sim::{FrameSnapshot, Simulation};
