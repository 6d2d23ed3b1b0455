use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Smallest cell extent accepted by the grid.
pub const MIN_CELL_SIZE: f32 = 1e-5;

/// World-level configuration for the physics core.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// gravity = 900.0
/// cell_size = [64.0, 64.0]
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Grid cell extent in world units.
    pub cell_size: Vec2,
    /// Downward acceleration in units/s².
    pub gravity: f32,
    /// Base ground friction constant, scaled by both entities' multipliers.
    pub friction: f32,
    /// Entities whose origin falls below this height are deleted.
    pub min_height: f32,
    /// Measure wall time of each physics step (adds small overhead when true).
    pub enable_timing: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            cell_size: Vec2::splat(75.0),
            gravity: 1350.0,
            friction: 800.0,
            min_height: -1000.0,
            enable_timing: false,
        }
    }
}

impl WorldConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load a configuration from a TOML file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Cell size with degenerate extents replaced by [`MIN_CELL_SIZE`].
    pub fn sanitized_cell_size(&self) -> Vec2 {
        let fix = |v: f32| if v.is_finite() { v.max(MIN_CELL_SIZE) } else { MIN_CELL_SIZE };
        Vec2::new(fix(self.cell_size.x), fix(self.cell_size.y))
    }
}

/// Configuration loading errors.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}
