use std::collections::{HashMap, HashSet};

use glam::Vec2;
use log::debug;
use slotmap::{DenseSlotMap, new_key_type};

use crate::api::SpatialIndexApi;
use crate::config::MIN_CELL_SIZE;
use crate::entity::{Entity, EntityArena};
use crate::types::*;

new_key_type! {
    /// Handle to one membership slot inside a [`GridCell`].
    pub struct NodeKey;
}

/// Entities occupying one cell. Detaching by [`NodeKey`] is O(1).
#[derive(Clone, Debug, Default)]
pub struct GridCell {
    nodes: DenseSlotMap<NodeKey, EntityKey>,
}

impl GridCell {
    fn attach(&mut self, key: EntityKey) -> NodeKey {
        self.nodes.insert(key)
    }

    fn detach(&mut self, node: NodeKey) -> Option<EntityKey> {
        self.nodes.remove(node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        self.nodes.values().any(|&k| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityKey> + '_ {
        self.nodes.values().copied()
    }
}

/// Cells and node handles an entity occupies. Owned by the grid's lifecycle:
/// only the grid creates or consumes it.
#[derive(Clone, Debug)]
pub struct GridMembership {
    epoch: u64,
    nodes: Vec<(CellCoord, NodeKey)>,
}

impl GridMembership {
    pub fn cells(&self) -> impl Iterator<Item = CellCoord> + '_ {
        self.nodes.iter().map(|&(cell, _)| cell)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Sparse uniform grid keyed by integer cell coordinates.
///
/// Cell coordinates use `floor`, so a cell boundary maps the same way on both
/// sides of the origin.
#[derive(Clone, Debug)]
pub struct SpatialHashGrid {
    cell_size: Vec2,
    cells: HashMap<CellCoord, GridCell>,
    // Bumped by `reset` so memberships from before it are dropped untouched.
    epoch: u64,
}

impl SpatialHashGrid {
    pub fn new(cell_size: Vec2) -> Self {
        Self {
            cell_size: cell_size.max(Vec2::splat(MIN_CELL_SIZE)),
            cells: HashMap::new(),
            epoch: 0,
        }
    }

    pub fn cell_size(&self) -> Vec2 {
        self.cell_size
    }

    /// Cell containing point `p`.
    pub fn cell_of(&self, p: Vec2) -> CellCoord {
        (
            (p.x / self.cell_size.x).floor() as i32,
            (p.y / self.cell_size.y).floor() as i32,
        )
    }

    pub fn cell(&self, coord: CellCoord) -> Option<&GridCell> {
        self.cells.get(&coord)
    }

    /// Inclusive cell range covering two points in any order.
    fn cell_range(&self, a: Vec2, b: Vec2) -> (CellCoord, CellCoord) {
        let (ax, ay) = self.cell_of(a);
        let (bx, by) = self.cell_of(b);
        ((ax.min(bx), ay.min(by)), (ax.max(bx), ay.max(by)))
    }

    pub fn stats(&self) -> GridStats {
        GridStats {
            cells: self.cells.len(),
            memberships: self.cells.values().map(GridCell::len).sum(),
        }
    }
}

impl SpatialIndexApi for SpatialHashGrid {
    fn insert(&mut self, key: EntityKey, entity: &mut Entity) {
        if entity.membership.is_some() {
            self.remove(entity);
        }
        let aabb = entity.aabb();
        let ((x0, y0), (x1, y1)) = self.cell_range(aabb.min, aabb.max);
        let mut nodes = Vec::new();
        for y in y0..=y1 {
            for x in x0..=x1 {
                let node = self.cells.entry((x, y)).or_default().attach(key);
                nodes.push(((x, y), node));
            }
        }
        entity.membership = Some(GridMembership { epoch: self.epoch, nodes });
        entity.dirty = false;
    }

    fn remove(&mut self, entity: &mut Entity) {
        let Some(membership) = entity.membership.take() else {
            return;
        };
        if membership.epoch != self.epoch {
            return;
        }
        for (coord, node) in membership.nodes {
            let Some(cell) = self.cells.get_mut(&coord) else {
                continue;
            };
            cell.detach(node);
            if cell.is_empty() {
                self.cells.remove(&coord);
            }
        }
    }

    fn query_range(
        &self,
        start: Vec2,
        end: Vec2,
        include_non_colliding: bool,
        entities: &EntityArena,
    ) -> Vec<EntityKey> {
        let ((x0, y0), (x1, y1)) = self.cell_range(start, end);
        // Saturated cell coordinates can span 2^32 cells per axis.
        let width = (i64::from(x1) - i64::from(x0) + 1) as u64;
        let height = (i64::from(y1) - i64::from(y0) + 1) as u64;
        let span = width.saturating_mul(height);

        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut visit = |cell: &GridCell| {
            for key in cell.iter() {
                if !seen.insert(key) {
                    continue;
                }
                let Some(ent) = entities.get(key) else {
                    debug_assert!(false, "grid references missing entity {key:?}");
                    continue;
                };
                if include_non_colliding || ent.move_type != MoveType::None {
                    out.push(key);
                }
            }
        };

        // Huge sweeps would touch mostly empty cells; scan occupied ones instead.
        if span > self.cells.len() as u64 {
            for (&(x, y), cell) in &self.cells {
                if (x0..=x1).contains(&x) && (y0..=y1).contains(&y) {
                    visit(cell);
                }
            }
        } else {
            for y in y0..=y1 {
                for x in x0..=x1 {
                    if let Some(cell) = self.cells.get(&(x, y)) {
                        visit(cell);
                    }
                }
            }
        }
        out
    }

    fn reset(&mut self) {
        debug!("spatial hash grid reset ({} cells dropped)", self.cells.len());
        self.cells.clear();
        self.epoch = self.epoch.wrapping_add(1);
    }
}
