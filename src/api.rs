use glam::Vec2;

use crate::entity::{Entity, EntityArena};
use crate::types::*;

/// Broad-phase membership and range queries over a sparse 2D space.
pub trait SpatialIndexApi {
    /// Add `entity` to every cell its AABB overlaps and record the handles on
    /// the entity. Clears the entity's dirty flag.
    fn insert(&mut self, key: EntityKey, entity: &mut Entity);

    /// Detach `entity` from every cell it occupies. No-op if it holds no
    /// membership.
    fn remove(&mut self, entity: &mut Entity);

    /// Remove then insert, re-bucketing after a position change.
    fn update(&mut self, key: EntityKey, entity: &mut Entity) {
        self.remove(entity);
        self.insert(key, entity);
    }

    /// Deduplicated entities in all cells spanned by the rectangle between
    /// `start` and `end` (either order). `MoveType::None` entities are skipped
    /// unless `include_non_colliding`. Result order is unspecified.
    fn query_range(
        &self,
        start: Vec2,
        end: Vec2,
        include_non_colliding: bool,
        entities: &EntityArena,
    ) -> Vec<EntityKey>;

    /// Drop all cell contents.
    fn reset(&mut self);
}

/// Per-frame swept tests used by the physics step.
pub trait NarrowphaseApi {
    /// Corners of the region covering the mover's AABB before and after
    /// moving by `velocity * dt`: trailing corner first, leading corner plus
    /// the displacement second. Corner choice follows the velocity signs.
    fn sweep_bounds(aabb: &Aabb, velocity: Vec2, dt: f32) -> Sweep;

    /// Horizontal crossing of `other`'s near vertical edge, if any.
    fn horizontal_hit(sweep: &Sweep, mover: &Aabb, velocity: Vec2, other: &Aabb) -> Option<AxisHit>;

    /// Vertical crossing of `other`'s near horizontal edge, if any.
    fn vertical_hit(sweep: &Sweep, mover: &Aabb, velocity: Vec2, other: &Aabb) -> Option<AxisHit>;
}
