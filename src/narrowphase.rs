use glam::Vec2;

use crate::api::NarrowphaseApi;
use crate::types::*;

/// Directional swept-edge tests between a mover and a static-for-this-step
/// candidate. Each axis is tested independently.
pub struct Narrowphase;

impl NarrowphaseApi for Narrowphase {
    fn sweep_bounds(aabb: &Aabb, velocity: Vec2, dt: f32) -> Sweep {
        let right = velocity.x >= 0.0;
        let up = velocity.y >= 0.0;
        let start = Vec2::new(
            if right { aabb.min.x } else { aabb.max.x },
            if up { aabb.min.y } else { aabb.max.y },
        );
        let lead = Vec2::new(
            if right { aabb.max.x } else { aabb.min.x },
            if up { aabb.max.y } else { aabb.min.y },
        );
        Sweep {
            start,
            end: lead + velocity * dt,
        }
    }

    fn horizontal_hit(sweep: &Sweep, mover: &Aabb, velocity: Vec2, other: &Aabb) -> Option<AxisHit> {
        if !mover.overlaps_y(other) {
            return None;
        }
        if velocity.x > 0.0 && sweep.end.x > other.left() && sweep.start.x < other.left() {
            // Moving right into the left edge.
            Some(AxisHit {
                dir: CollisionDir::Left,
                gap: (other.left() - mover.right()).abs(),
            })
        } else if velocity.x < 0.0 && sweep.end.x < other.right() && sweep.start.x > other.right() {
            Some(AxisHit {
                dir: CollisionDir::Right,
                gap: (mover.left() - other.right()).abs(),
            })
        } else {
            None
        }
    }

    fn vertical_hit(sweep: &Sweep, mover: &Aabb, velocity: Vec2, other: &Aabb) -> Option<AxisHit> {
        if !mover.overlaps_x(other) {
            return None;
        }
        if velocity.y > 0.0 && sweep.end.y > other.bottom() && sweep.start.y < other.bottom() {
            // Moving up into the underside.
            Some(AxisHit {
                dir: CollisionDir::Down,
                gap: (other.bottom() - mover.top()).abs(),
            })
        } else if velocity.y < 0.0 && sweep.end.y < other.top() && sweep.start.y > other.top() {
            // Landing on top.
            Some(AxisHit {
                dir: CollisionDir::Up,
                gap: (mover.bottom() - other.top()).abs(),
            })
        } else {
            None
        }
    }
}
