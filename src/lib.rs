//! plonk: 2D platformer physics core (spatial hash broad-phase, swept AABB
//! resolution, entity events with detours)

pub mod types;
pub mod api;
pub mod config;
pub mod error;
pub mod vars;
pub mod timers;
pub mod event;
pub mod entity;
pub mod grid;
pub mod motion;
pub mod narrowphase;
pub mod world;

pub use crate::types::*;
pub use crate::api::*;
pub use crate::config::{ConfigError, WorldConfig};
pub use crate::entity::{Entity, EntityArena, EntityFactory};
pub use crate::error::PhysicsError;
pub use crate::event::{
    CollisionInfo, Detour, DetourFn, Event, EventArgs, EventFn, EventSlot, EventTable, EventValue, detour_fn,
    event_fn,
};
pub use crate::grid::SpatialHashGrid;
pub use crate::narrowphase::Narrowphase;
pub use crate::vars::{GameVar, GameVars, Override, VarError, VarFlags, VarId};
pub use crate::world::{PhysicsVars, PhysicsWorld, TimerFn};
