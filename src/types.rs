use glam::Vec2;
use slotmap::new_key_type;

new_key_type! {
    /// Generation-checked handle to an entity in the world arena.
    ///
    /// A key for a deleted entity never resolves to a newer entity, so stale
    /// references (e.g. a ground entity that was destroyed) are detected.
    pub struct EntityKey;
}

/// Integer cell coordinate in the spatial hash grid.
pub type CellCoord = (i32, i32);

/// How much authority the physics engine has over an entity.
///
/// Ordered: everything below `Physics` is never integrated by the engine.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MoveType {
    /// Invisible to physics and to colliding grid queries.
    #[default]
    None,
    /// Immovable obstacle; only re-bucketed when repositioned externally.
    Anchored,
    /// Gravity, friction, acceleration, swept collision and resolution.
    Physics,
    /// Swept collision only; velocity is driven by external code.
    Custom,
}

/// Which side of a collision pair an event is being delivered to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CollisionType {
    /// This entity is the mover colliding into another.
    Colliding,
    /// This entity is being collided into by the mover.
    Collided,
}

/// Side of the struck entity involved in a collision.
///
/// Moving right strikes the `Left` side, moving up strikes the `Down` side,
/// landing from above strikes the `Up` side.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CollisionDir {
    Left,
    Right,
    Up,
    Down,
}

impl CollisionDir {
    pub fn is_horizontal(self) -> bool {
        matches!(self, CollisionDir::Left | CollisionDir::Right)
    }
}

/// Axis-aligned bounding box in world units (y-up).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    /// Box spanning two arbitrary corners.
    pub fn from_corners(a: Vec2, b: Vec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn left(&self) -> f32 {
        self.min.x
    }

    pub fn right(&self) -> f32 {
        self.max.x
    }

    pub fn bottom(&self) -> f32 {
        self.min.y
    }

    pub fn top(&self) -> f32 {
        self.max.y
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    /// Strict overlap of the horizontal extents; touching edges do not count.
    pub fn overlaps_x(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x && self.max.x > other.min.x
    }

    /// Strict overlap of the vertical extents; touching edges do not count.
    pub fn overlaps_y(&self, other: &Aabb) -> bool {
        self.min.y < other.max.y && self.max.y > other.min.y
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.overlaps_x(other) && self.overlaps_y(other)
    }
}

/// Region swept by a mover over one step.
///
/// `start` is the trailing corner of the current AABB; `end` is the leading
/// corner pushed forward by the step's displacement.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sweep {
    pub start: Vec2,
    pub end: Vec2,
}

/// A directional edge crossing found by the narrowphase.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AxisHit {
    /// Side of the struck entity.
    pub dir: CollisionDir,
    /// Distance between the mover's leading edge and the struck edge.
    pub gap: f32,
}

/// Debug statistics for the spatial hash grid.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GridStats {
    /// Non-empty cells currently allocated.
    pub cells: usize,
    /// Sum of per-cell memberships (an entity spanning 4 cells counts 4 times).
    pub memberships: usize,
}

/// Counters and optional timing for the last physics step.
#[derive(Copy, Clone, Debug, Default)]
pub struct StepStats {
    /// Entities that went through the swept collision path.
    pub simulated: usize,
    /// Broad-phase candidates returned by grid queries (self excluded).
    pub candidates: usize,
    /// Directional hits that passed both `collision` gates.
    pub hits: usize,
    /// Entities killed for falling below the minimum height.
    pub killed: usize,
    /// Wall time of the step, when timing is enabled.
    pub step_ms: Option<f64>,
}
