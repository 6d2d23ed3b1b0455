//! Named, live-adjustable tunables shared across the engine.
//!
//! Physics reads its gravity, friction and kill height from here every step,
//! so changes made between frames take effect on the next one.

use std::collections::HashMap;
use std::fmt;

use bitflags::bitflags;
use log::{info, warn};

bitflags! {
    /// Behaviour flags for a [`GameVar`].
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct VarFlags: u32 {
        /// Can only be changed from code, never through `name=value` overrides.
        const PROGRAM_ONLY = 1 << 0;
    }
}

/// Handle to a variable inside a [`GameVars`] registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VarId(usize);

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum VarError {
    #[error("game variable \"{0}\" does not exist")]
    Unknown(String),

    #[error("game variable \"{0}\" cannot be modified")]
    ProgramOnly(String),

    #[error("game variable \"{name}\" modification failed: \"{value}\" is not a number")]
    InvalidValue { name: String, value: String },
}

/// One named tunable with optional clamping bounds.
#[derive(Clone, Debug)]
pub struct GameVar {
    name: String,
    value: f32,
    default: f32,
    description: String,
    min: Option<f32>,
    max: Option<f32>,
    pub flags: VarFlags,
}

impl GameVar {
    /// The default is the initial value after clamping.
    pub fn new(
        name: impl Into<String>,
        value: f32,
        description: impl Into<String>,
        flags: VarFlags,
        min: Option<f32>,
        max: Option<f32>,
    ) -> Self {
        let mut var = Self {
            name: name.into(),
            value,
            default: value,
            description: description.into(),
            min,
            max,
            flags,
        };
        var.default = var.set(value);
        var
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> f32 {
        self.value
    }

    /// Store `value` clamped to the bounds and return what was stored.
    pub fn set(&mut self, value: f32) -> f32 {
        self.value = value;
        if let Some(min) = self.min {
            if self.value < min {
                self.value = min;
            }
        }
        if let Some(max) = self.max {
            if self.value > max {
                self.value = max;
            }
        }
        self.value
    }

    pub fn reset(&mut self) {
        self.value = self.default;
    }

    pub fn default_value(&self) -> f32 {
        self.default
    }

    pub fn min(&self) -> Option<f32> {
        self.min
    }

    pub fn set_min(&mut self, min: Option<f32>) {
        self.min = min;
        self.set(self.value);
    }

    pub fn max(&self) -> Option<f32> {
        self.max
    }

    pub fn set_max(&mut self, max: Option<f32>) {
        self.max = max;
        self.set(self.value);
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for GameVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" = \"{}\"", self.name, self.value)?;
        if self.value != self.default {
            write!(f, " ( def. \"{}\" )", self.default)?;
        }
        if let Some(min) = self.min {
            write!(f, " min. {min}")?;
        }
        if let Some(max) = self.max {
            write!(f, " max. {max}")?;
        }
        if self.flags.contains(VarFlags::PROGRAM_ONLY) {
            write!(f, "\n programonly")?;
        }
        if !self.description.is_empty() {
            write!(f, "\n - {}", self.description)?;
        }
        Ok(())
    }
}

/// Result of a successful `name[=value]` override.
#[derive(Clone, Debug, PartialEq)]
pub enum Override {
    /// Only a name was given; carries the variable's description.
    Described(String),
    /// The variable now holds `value` (after clamping).
    Set { name: String, value: f32 },
}

/// Registry of game variables, addressable by name or by [`VarId`].
#[derive(Clone, Debug, Default)]
pub struct GameVars {
    vars: Vec<GameVar>,
    by_name: HashMap<String, VarId>,
}

impl GameVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable. If the name is taken, the existing id is returned
    /// and the arguments are ignored.
    pub fn create(
        &mut self,
        name: &str,
        value: f32,
        description: &str,
        flags: VarFlags,
        min: Option<f32>,
        max: Option<f32>,
    ) -> VarId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = VarId(self.vars.len());
        self.vars.push(GameVar::new(name, value, description, flags, min, max));
        self.by_name.insert(name.to_owned(), id);
        id
    }

    pub fn find(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: VarId) -> f32 {
        self.vars[id.0].get()
    }

    pub fn set(&mut self, id: VarId, value: f32) -> f32 {
        self.vars[id.0].set(value)
    }

    pub fn var(&self, id: VarId) -> &GameVar {
        &self.vars[id.0]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut GameVar {
        &mut self.vars[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameVar> {
        self.vars.iter()
    }

    /// Apply a user override of the form `name=value`, or describe `name`.
    pub fn apply_override(&mut self, arg: &str) -> Result<Override, VarError> {
        let arg = arg.trim();
        let (name, value) = match arg.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (arg, None),
        };
        let id = self.find(name).ok_or_else(|| VarError::Unknown(name.to_owned()))?;
        let Some(value) = value else {
            return Ok(Override::Described(self.var(id).to_string()));
        };
        if self.var(id).flags.contains(VarFlags::PROGRAM_ONLY) {
            return Err(VarError::ProgramOnly(name.to_owned()));
        }
        let parsed: f32 = value.trim().parse().map_err(|_| VarError::InvalidValue {
            name: name.to_owned(),
            value: value.to_owned(),
        })?;
        let value = self.set(id, parsed);
        Ok(Override::Set { name: name.to_owned(), value })
    }

    /// Apply several overrides, logging each outcome. Failures are skipped.
    pub fn apply_overrides<'a>(&mut self, args: impl IntoIterator<Item = &'a str>) -> usize {
        let mut applied = 0;
        for arg in args {
            match self.apply_override(arg) {
                Ok(Override::Described(text)) => info!("{text}"),
                Ok(Override::Set { name, value }) => {
                    info!("Set \"{name}\" to \"{value}\".");
                    applied += 1;
                }
                Err(e) => warn!("{e}"),
            }
        }
        applied
    }
}
