use glam::Vec2;
use slotmap::SlotMap;

use crate::event::EventTable;
use crate::grid::GridMembership;
use crate::types::{Aabb, EntityKey, MoveType};
use crate::world::PhysicsWorld;

/// Arena owning every entity; keys are generation-checked.
pub type EntityArena = SlotMap<EntityKey, Entity>;

/// Builds a fresh entity for a registered classname.
pub type EntityFactory = fn(classname: &str) -> Entity;

/// Default acceleration multiplier for new entities.
pub const DEFAULT_ACCELERATION: f32 = 4.5;

/// A moving (or anchored) object in the world.
///
/// `base_origin` is the authoritative top-left corner in a y-up world; the
/// hitbox extends right and down from it. `origin_displacement` is a
/// render-only offset and never takes part in collision.
#[derive(Clone, Debug)]
pub struct Entity {
    classname: String,
    /// Inactive entities are skipped by physics and by per-frame dispatch.
    pub active: bool,
    /// Whether the renderer should draw this entity.
    pub visible: bool,
    pub can_use: bool,

    pub velocity: Vec2,
    base_origin: Vec2,
    origin_displacement: Vec2,
    hitbox: Vec2,

    /// Entity currently supporting this one from below.
    pub ground_entity: Option<EntityKey>,
    pub move_type: MoveType,
    /// Target horizontal speed.
    pub move_speed: f32,
    pub friction: f32,
    pub acceleration: f32,
    /// Set whenever the base origin changes; cleared by grid insertion.
    pub dirty: bool,
    deleted: bool,

    pub(crate) membership: Option<GridMembership>,
    pub events: EventTable<PhysicsWorld>,
}

impl Entity {
    pub fn new(classname: impl Into<String>) -> Self {
        Self {
            classname: classname.into(),
            active: false,
            visible: true,
            can_use: false,
            velocity: Vec2::ZERO,
            base_origin: Vec2::ZERO,
            origin_displacement: Vec2::ZERO,
            hitbox: Vec2::ZERO,
            ground_entity: None,
            move_type: MoveType::None,
            move_speed: 0.0,
            friction: 1.0,
            acceleration: DEFAULT_ACCELERATION,
            dirty: false,
            deleted: false,
            membership: None,
            events: EventTable::default(),
        }
    }

    /// Entity that physics treats as an immovable obstacle.
    pub fn anchored(classname: impl Into<String>) -> Self {
        let mut ent = Self::new(classname);
        ent.move_type = MoveType::Anchored;
        ent
    }

    pub fn classname(&self) -> &str {
        &self.classname
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    pub fn base_origin(&self) -> Vec2 {
        self.base_origin
    }

    /// Move the entity. Marks it dirty only if the position actually changed.
    pub fn set_base_origin(&mut self, origin: Vec2) {
        if origin != self.base_origin {
            self.dirty = true;
        }
        self.base_origin = origin;
    }

    pub fn origin_displacement(&self) -> Vec2 {
        self.origin_displacement
    }

    pub fn set_origin_displacement(&mut self, disp: Vec2) {
        self.origin_displacement = disp;
    }

    /// Render position: base origin plus displacement.
    pub fn absolute_origin(&self) -> Vec2 {
        self.base_origin + self.origin_displacement
    }

    pub fn hitbox(&self) -> Vec2 {
        self.hitbox
    }

    /// Negative or non-finite extents collapse to zero, leaving a point box.
    pub fn set_hitbox(&mut self, size: Vec2) {
        let fix = |v: f32| if v.is_finite() { v.max(0.0) } else { 0.0 };
        self.hitbox = Vec2::new(fix(size.x), fix(size.y));
    }

    pub fn top_left(&self) -> Vec2 {
        self.base_origin
    }

    pub fn top_right(&self) -> Vec2 {
        Vec2::new(self.base_origin.x + self.hitbox.x, self.base_origin.y)
    }

    pub fn bottom_left(&self) -> Vec2 {
        Vec2::new(self.base_origin.x, self.base_origin.y - self.hitbox.y)
    }

    pub fn bottom_right(&self) -> Vec2 {
        Vec2::new(self.base_origin.x + self.hitbox.x, self.base_origin.y - self.hitbox.y)
    }

    pub fn centre(&self) -> Vec2 {
        Vec2::new(
            self.base_origin.x + self.hitbox.x / 2.0,
            self.base_origin.y - self.hitbox.y / 2.0,
        )
    }

    pub fn aabb(&self) -> Aabb {
        Aabb {
            min: self.bottom_left(),
            max: self.top_right(),
        }
    }

    /// Horizontal extents overlap (strict).
    pub fn collides_x(&self, other: &Entity) -> bool {
        self.aabb().overlaps_x(&other.aabb())
    }

    /// Vertical extents overlap (strict).
    pub fn collides_y(&self, other: &Entity) -> bool {
        self.aabb().overlaps_y(&other.aabb())
    }

    pub fn collides(&self, other: &Entity) -> bool {
        self.aabb().intersects(&other.aabb())
    }

    /// Whether the grid currently holds this entity.
    pub fn in_grid(&self) -> bool {
        self.membership.is_some()
    }
}
