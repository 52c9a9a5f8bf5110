//! Error types for rig construction, configuration and render assets.

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::rig::WheelPosition;

#[derive(Debug, Clone, PartialEq)]
pub enum RigError {
    /// A wheel spec field is outside its allowed range.
    InvalidWheel {
        position: WheelPosition,
        field: &'static str,
        value: f32,
    },
    /// Wheels must be registered in corner order (FL, FR, RL, RR).
    WheelOutOfOrder {
        expected: WheelPosition,
        got: WheelPosition,
    },
    TooManyWheels,
    NoSuchWheel(usize),
    MissingChassis,
    /// The rig is used before all four wheels were registered.
    NotReady { wheels: usize },
    NonFinite { what: &'static str },
}

impl fmt::Display for RigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RigError::InvalidWheel { position, field, value } => {
                write!(f, "wheel {position}: invalid {field} = {value}")
            }
            RigError::WheelOutOfOrder { expected, got } => {
                write!(f, "wheel registered out of order: expected {expected}, got {got}")
            }
            RigError::TooManyWheels => write!(f, "rig already has four wheels"),
            RigError::NoSuchWheel(index) => write!(f, "no wheel with index {index}"),
            RigError::MissingChassis => write!(f, "chassis body is not in the rigid body set"),
            RigError::NotReady { wheels } => {
                write!(f, "rig has {wheels} of 4 wheels registered")
            }
            RigError::NonFinite { what } => write!(f, "{what} must be finite"),
        }
    }
}

impl std::error::Error for RigError {}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: io::Error },
    Parse(serde_json::Error),
    OutOfRange {
        field: String,
        value: f32,
        min: f32,
        max: f32,
    },
    Rig(RigError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, .. } => write!(f, "cannot read config {}", path.display()),
            ConfigError::Parse(_) => write!(f, "malformed config"),
            ConfigError::OutOfRange { field, value, min, max } => {
                write!(f, "{field} = {value} is outside [{min}, {max}]")
            }
            ConfigError::Rig(_) => write!(f, "invalid vehicle rig"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Rig(e) => Some(e),
            ConfigError::OutOfRange { .. } => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<RigError> for ConfigError {
    fn from(e: RigError) -> Self {
        ConfigError::Rig(e)
    }
}

/// A render asset could not be found. Never fatal: the simulation keeps
/// running headless.
#[derive(Debug)]
pub struct AssetError {
    pub path: PathBuf,
    pub source: io::Error,
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "render asset {} unavailable", self.path.display())
    }
}

impl std::error::Error for AssetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
