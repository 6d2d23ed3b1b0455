use glam::Vec2;

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use log::{debug, error, info, warn};

use crate::api::{NarrowphaseApi, SpatialIndexApi};
use crate::config::WorldConfig;
use crate::entity::{Entity, EntityArena, EntityFactory};
use crate::error::PhysicsError;
use crate::event::{CollisionInfo, EventArgs, EventSlot, EventValue};
use crate::grid::SpatialHashGrid;
use crate::motion;
use crate::narrowphase::Narrowphase;
use crate::timers::{Deadline, TimerQueue};
use crate::types::*;
use crate::vars::{GameVars, Override, VarFlags, VarId};

/// Handles of the engine-owned tunables inside [`PhysicsWorld::vars`].
#[derive(Copy, Clone, Debug)]
pub struct PhysicsVars {
    pub gravity: VarId,
    pub friction: VarId,
    pub min_height: VarId,
}

/// Deferred callback run by [`PhysicsWorld::run_frame`].
pub type TimerFn = Box<dyn FnOnce(&mut PhysicsWorld)>;

enum TimerAction {
    DeleteEntity(EntityKey),
    Call(TimerFn),
}

/// Closest accepted hit on one axis.
#[derive(Copy, Clone, Debug)]
struct Blocker {
    key: EntityKey,
    dir: CollisionDir,
    gap: f32,
}

/// Keep the current blocker unless the candidate is strictly closer.
fn nearer(current: Option<Blocker>, candidate: Blocker) -> Option<Blocker> {
    match current {
        Some(b) if b.gap <= candidate.gap => Some(b),
        _ => Some(candidate),
    }
}

/// Owns every entity, the broad-phase grid and the frame loop.
///
/// Entities are stored in a generational arena; `order` keeps creation order,
/// which is also the order physics and per-frame dispatch walk them in.
pub struct PhysicsWorld {
    pub cfg: WorldConfig,
    /// Master switch for [`PhysicsWorld::physics_step`].
    pub physics_enabled: bool,

    vars: GameVars,
    var_ids: PhysicsVars,

    entities: EntityArena,
    order: Vec<EntityKey>,
    grid: SpatialHashGrid,
    classes: HashMap<String, EntityFactory>,

    timers: TimerQueue<TimerAction>,
    frame_counter: u64,
    /// Simulated seconds, advanced by `run_frame`.
    clock: f64,
    last_stats: StepStats,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl PhysicsWorld {
    pub fn new(cfg: WorldConfig) -> Self {
        let mut vars = GameVars::new();
        let var_ids = PhysicsVars {
            gravity: vars.create("gravity", cfg.gravity, "World gravity", VarFlags::PROGRAM_ONLY, None, None),
            friction: vars.create("friction", cfg.friction, "World friction", VarFlags::PROGRAM_ONLY, None, None),
            min_height: vars.create(
                "minheight",
                cfg.min_height,
                "Lowest allowed height before entities are killed",
                VarFlags::PROGRAM_ONLY,
                None,
                None,
            ),
        };

        let mut classes: HashMap<String, EntityFactory> = HashMap::new();
        classes.insert("entity".to_owned(), |name| Entity::new(name));
        classes.insert("rect".to_owned(), |name| Entity::anchored(name));
        classes.insert("tile".to_owned(), |name| Entity::anchored(name));

        let grid = SpatialHashGrid::new(cfg.sanitized_cell_size());
        debug!("physics world created, cell size {:?}", grid.cell_size());

        Self {
            cfg,
            physics_enabled: true,
            vars,
            var_ids,
            entities: EntityArena::with_key(),
            order: Vec::new(),
            grid,
            classes,
            timers: TimerQueue::new(),
            frame_counter: 0,
            clock: 0.0,
            last_stats: StepStats::default(),
        }
    }

    /// Build a world from a TOML configuration file.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self, PhysicsError> {
        let cfg = WorldConfig::load(path)?;
        Ok(Self::new(cfg))
    }

    /// Apply a console-style `name=value` override (or describe `name`).
    /// Engine-owned variables are program-only and refuse this.
    pub fn apply_var_override(&mut self, arg: &str) -> Result<Override, PhysicsError> {
        Ok(self.vars.apply_override(arg)?)
    }

    /// Map `classname` to a factory, replacing any previous registration.
    pub fn register_classname(&mut self, classname: &str, factory: EntityFactory) {
        if self.classes.insert(classname.to_owned(), factory).is_some() {
            debug!("classname \"{classname}\" re-registered");
        }
    }

    /// Build an entity from a registered classname and append it to the world.
    ///
    /// The entity starts inactive and outside the grid; see
    /// [`PhysicsWorld::activate_entity`].
    pub fn create_entity(&mut self, classname: &str) -> Result<EntityKey, PhysicsError> {
        let Some(factory) = self.classes.get(classname).copied() else {
            error!("entity classname \"{classname}\" is invalid");
            return Err(PhysicsError::UnknownClassname(classname.to_owned()));
        };
        Ok(self.add_entity(factory(classname)))
    }

    /// Append a pre-built entity to the world.
    pub fn add_entity(&mut self, entity: Entity) -> EntityKey {
        let key = self.entities.insert(entity);
        self.order.push(key);
        key
    }

    /// Mark the entity active, fire `activated`, then insert it into the grid
    /// at whatever position the handler left it.
    pub fn activate_entity(&mut self, key: EntityKey) {
        let Some(ent) = self.entities.get_mut(key) else {
            warn!("cannot activate missing entity {key:?}");
            return;
        };
        ent.active = true;
        self.invoke_event(key, EventSlot::Activated, EventArgs::None);
        self.rebucket(key);
    }

    /// Hide the entity, drop it out of collision and schedule its removal for
    /// the next frame. Repeated calls are no-ops.
    pub fn delete_entity(&mut self, key: EntityKey) {
        let deadline = self.deadline(0.0);
        let Some(ent) = self.entities.get_mut(key) else {
            return;
        };
        if ent.is_deleted() {
            return;
        }
        ent.visible = false;
        ent.mark_deleted();
        ent.move_type = MoveType::None;
        self.timers.schedule(deadline, TimerAction::DeleteEntity(key));
        debug!("entity {key:?} ({}) scheduled for removal", ent.classname());
    }

    /// Remove every entity and pending deletion, and reset the grid.
    /// Gameplay timers survive.
    pub fn clear_entities(&mut self) {
        let count = self.entities.len();
        self.grid.reset();
        self.entities.clear();
        self.order.clear();
        self.timers.retain(|action| !matches!(action, TimerAction::DeleteEntity(_)));
        info!("cleared {count} entities");
    }

    /// Run `func` once `delay` simulated seconds have passed, and never
    /// earlier than the next frame. Timers fire after the physics step.
    pub fn create_timer(&mut self, delay: f32, func: impl FnOnce(&mut PhysicsWorld) + 'static) {
        self.timers.schedule(self.deadline(delay), TimerAction::Call(Box::new(func)));
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    fn deadline(&self, delay: f32) -> Deadline {
        Deadline {
            after_frame: self.frame_counter,
            at_time: self.clock + f64::from(delay.max(0.0)),
        }
    }

    fn remove_now(&mut self, key: EntityKey) {
        let Some(mut ent) = self.entities.remove(key) else {
            return;
        };
        self.grid.remove(&mut ent);
        self.order.retain(|&k| k != key);
    }

    pub fn entity(&self, key: EntityKey) -> Option<&Entity> {
        self.entities.get(key)
    }

    pub fn entity_mut(&mut self, key: EntityKey) -> Option<&mut Entity> {
        self.entities.get_mut(key)
    }

    /// Entities in creation order.
    pub fn entities(&self) -> impl Iterator<Item = (EntityKey, &Entity)> + '_ {
        self.order
            .iter()
            .filter_map(|&key| self.entities.get(key).map(|ent| (key, ent)))
    }

    pub fn count_entities(&self, active_only: bool) -> usize {
        if active_only {
            self.entities.values().filter(|e| e.active).count()
        } else {
            self.entities.len()
        }
    }

    pub fn grid(&self) -> &SpatialHashGrid {
        &self.grid
    }

    pub fn vars(&self) -> &GameVars {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut GameVars {
        &mut self.vars
    }

    pub fn physics_vars(&self) -> PhysicsVars {
        self.var_ids
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    /// Simulated seconds accumulated by [`PhysicsWorld::run_frame`].
    pub fn elapsed(&self) -> f64 {
        self.clock
    }

    pub fn last_stats(&self) -> &StepStats {
        &self.last_stats
    }

    /// Entities whose hitbox strictly overlaps the rectangle between `start`
    /// and `end`.
    pub fn query_entities(&self, start: Vec2, end: Vec2, include_non_colliding: bool) -> Vec<EntityKey> {
        let area = Aabb::from_corners(start, end);
        self.grid
            .query_range(start, end, include_non_colliding, &self.entities)
            .into_iter()
            .filter(|&key| self.entities.get(key).is_some_and(|e| area.intersects(&e.aabb())))
            .collect()
    }

    /// Run the entity's event chain for `slot`.
    ///
    /// The chain is cloned out of the entity first, so handlers are free to
    /// mutate the world (including the entity's own hooks).
    pub fn invoke_event(&mut self, key: EntityKey, slot: EventSlot, args: EventArgs) -> EventValue {
        let Some(event) = self.entities.get(key).map(|e| e.events.get(slot).clone()) else {
            warn!("entity {key:?}: could not find event \"{slot}\"");
            return EventValue::None;
        };
        event.invoke(self, key, &args)
    }

    pub fn invoke_event_by_name(&mut self, key: EntityKey, name: &str, args: EventArgs) -> EventValue {
        match name.parse::<EventSlot>() {
            Ok(slot) => self.invoke_event(key, slot, args),
            Err(e) => {
                warn!("entity {key:?}: {e}");
                EventValue::None
            }
        }
    }

    /// Advance one frame: physics, due timers, then `per_frame` on every
    /// active entity.
    pub fn run_frame(&mut self, dt: f32) {
        self.frame_counter += 1;
        self.clock += f64::from(dt.max(0.0));
        self.physics_step(dt);

        for action in self.timers.drain_due(self.frame_counter, self.clock) {
            match action {
                TimerAction::DeleteEntity(key) => self.remove_now(key),
                TimerAction::Call(func) => func(self),
            }
        }

        let mut i = 0;
        while i < self.order.len() {
            let key = self.order[i];
            i += 1;
            if self.entities.get(key).is_some_and(|e| e.active) {
                self.invoke_event(key, EventSlot::PerFrame, EventArgs::None);
            }
        }
    }

    /// Simulate every active entity once, in creation order.
    ///
    /// Entities created by handlers during the step are appended and
    /// simulated in the same step.
    pub fn physics_step(&mut self, dt: f32) {
        if !self.physics_enabled {
            return;
        }
        let started = self.cfg.enable_timing.then(Instant::now);
        let mut stats = StepStats::default();

        let mut i = 0;
        while i < self.order.len() {
            let key = self.order[i];
            i += 1;
            self.simulate(key, dt, &mut stats);
        }

        stats.step_ms = started.map(|t| t.elapsed().as_secs_f64() * 1000.0);
        self.last_stats = stats;
    }

    fn simulate(&mut self, key: EntityKey, dt: f32, stats: &mut StepStats) {
        let Some(ent) = self.entities.get(key) else {
            debug_assert!(false, "entity order references missing entity {key:?}");
            return;
        };
        if !ent.active {
            return;
        }
        if ent.move_type < MoveType::Physics {
            if ent.dirty {
                self.rebucket(key);
            }
            return;
        }
        if ent.move_type == MoveType::Physics {
            self.integrate_velocity(key, dt);
        }
        stats.simulated += 1;

        let Some(ent) = self.entities.get(key) else {
            return;
        };
        let mover_type = ent.move_type;
        let mover = ent.aabb();
        let velocity = ent.velocity;
        let sweep = Narrowphase::sweep_bounds(&mover, velocity, dt);
        let candidates = self.grid.query_range(sweep.start, sweep.end, false, &self.entities);

        let mut closest_x: Option<Blocker> = None;
        let mut closest_y: Option<Blocker> = None;

        for other in candidates {
            if other == key {
                continue;
            }
            stats.candidates += 1;

            if let Some(hit) = self
                .collidable_aabb(other)
                .and_then(|b| Narrowphase::horizontal_hit(&sweep, &mover, velocity, &b))
            {
                if self.allow_collision(key, other, hit.dir) {
                    stats.hits += 1;
                    closest_x = nearer(closest_x, Blocker { key: other, dir: hit.dir, gap: hit.gap });
                    self.push_rider(mover_type, key, other, Vec2::new(velocity.x * dt, 0.0), false);
                }
            }

            if let Some(hit) = self
                .collidable_aabb(other)
                .and_then(|b| Narrowphase::vertical_hit(&sweep, &mover, velocity, &b))
            {
                if self.allow_collision(key, other, hit.dir) {
                    stats.hits += 1;
                    closest_y = nearer(closest_y, Blocker { key: other, dir: hit.dir, gap: hit.gap });
                    let carried = hit.dir == CollisionDir::Down;
                    self.push_rider(mover_type, key, other, Vec2::new(0.0, velocity.y * dt), carried);
                }
            }
        }

        if mover_type == MoveType::Physics {
            self.resolve(key, closest_x, closest_y);
        }

        let Some(ent) = self.entities.get_mut(key) else {
            return;
        };
        let next = ent.base_origin() + ent.velocity * dt;
        ent.set_base_origin(next);
        if ent.dirty {
            self.rebucket(key);
        }

        let min_height = self.vars.get(self.var_ids.min_height);
        if self.entities.get(key).is_some_and(|e| e.base_origin().y < min_height && !e.is_deleted()) {
            debug!("entity {key:?} fell below {min_height}");
            self.delete_entity(key);
            stats.killed += 1;
        }
    }

    /// Gravity, ground friction and acceleration toward `move_speed`.
    fn integrate_velocity(&mut self, key: EntityKey, dt: f32) {
        let gravity = self.vars.get(self.var_ids.gravity);
        let base_friction = self.vars.get(self.var_ids.friction);
        let ground_friction = self
            .entities
            .get(key)
            .and_then(|e| e.ground_entity)
            .and_then(|g| self.entities.get(g))
            .map(|g| g.friction);

        let Some(ent) = self.entities.get_mut(key) else {
            return;
        };
        if ground_friction.is_none() {
            ent.ground_entity = None;
        }

        ent.velocity.y -= gravity * dt;

        let mut rate = ent.acceleration * dt * ent.friction;
        if let Some(gf) = ground_friction {
            ent.velocity.x = motion::apply_friction(ent.velocity.x, base_friction * gf * ent.friction * dt);
            rate *= gf;
        }
        ent.velocity.x = motion::accelerate(ent.velocity.x, ent.move_speed, rate);
    }

    fn collidable_aabb(&self, key: EntityKey) -> Option<Aabb> {
        self.entities
            .get(key)
            .filter(|e| e.move_type != MoveType::None)
            .map(Entity::aabb)
    }

    /// Both sides' `collision` handlers must agree; the candidate is only
    /// asked when the mover accepts.
    fn allow_collision(&mut self, mover: EntityKey, other: EntityKey, dir: CollisionDir) -> bool {
        let colliding = EventArgs::Collision(CollisionInfo {
            other,
            kind: CollisionType::Colliding,
            dir,
        });
        if !self.invoke_event(mover, EventSlot::Collision, colliding).is_truthy() {
            return false;
        }
        let collided = EventArgs::Collision(CollisionInfo {
            other: mover,
            kind: CollisionType::Collided,
            dir,
        });
        self.invoke_event(other, EventSlot::Collision, collided).is_truthy()
    }

    /// A custom mover drags physics entities it runs into along the hit axis.
    fn push_rider(&mut self, mover_type: MoveType, mover: EntityKey, other: EntityKey, offset: Vec2, carried: bool) {
        if mover_type != MoveType::Custom {
            return;
        }
        let Some(rider) = self.entities.get_mut(other) else {
            return;
        };
        if rider.move_type != MoveType::Physics {
            return;
        }
        let next = rider.base_origin() + offset;
        rider.set_base_origin(next);
        if carried {
            rider.ground_entity = Some(mover);
        }
        if rider.dirty {
            self.rebucket(other);
        }
    }

    fn notify_final(&mut self, mover: EntityKey, blocker: Blocker) {
        let colliding = EventArgs::Collision(CollisionInfo {
            other: blocker.key,
            kind: CollisionType::Colliding,
            dir: blocker.dir,
        });
        self.invoke_event(mover, EventSlot::CollisionFinal, colliding);
        let collided = EventArgs::Collision(CollisionInfo {
            other: mover,
            kind: CollisionType::Collided,
            dir: blocker.dir,
        });
        self.invoke_event(blocker.key, EventSlot::CollisionFinal, collided);
    }

    /// Snap the mover flush against the closest blocker on each axis and
    /// zero the blocked velocity component.
    fn resolve(&mut self, key: EntityKey, closest_x: Option<Blocker>, closest_y: Option<Blocker>) {
        let Some(ent) = self.entities.get_mut(key) else {
            return;
        };
        ent.ground_entity = None;
        let mut origin = ent.base_origin();
        let hitbox = ent.hitbox();

        if let Some(blocker) = closest_x {
            self.notify_final(key, blocker);
            if let Some(edge) = self.entities.get(blocker.key).map(Entity::aabb) {
                origin.x = match blocker.dir {
                    CollisionDir::Left => edge.left() - hitbox.x,
                    _ => edge.right(),
                };
            }
            if let Some(ent) = self.entities.get_mut(key) {
                ent.velocity.x = 0.0;
            }
        }

        if let Some(blocker) = closest_y {
            self.notify_final(key, blocker);
            if let Some(edge) = self.entities.get(blocker.key).map(Entity::aabb) {
                origin.y = match blocker.dir {
                    CollisionDir::Down => edge.bottom(),
                    _ => edge.top() + hitbox.y,
                };
            }
            if let Some(ent) = self.entities.get_mut(key) {
                ent.velocity.y = 0.0;
                if blocker.dir == CollisionDir::Up {
                    ent.ground_entity = Some(blocker.key);
                }
            }
        }

        if let Some(ent) = self.entities.get_mut(key) {
            ent.set_base_origin(origin);
        }
    }

    fn rebucket(&mut self, key: EntityKey) {
        let Self { grid, entities, .. } = self;
        if let Some(ent) = entities.get_mut(key) {
            grid.update(key, ent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::event::{Detour, detour_fn, event_fn};
    use crate::vars::VarError;
    use approx::assert_abs_diff_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn spawn(world: &mut PhysicsWorld, class: &str, origin: Vec2, size: Vec2, move_type: MoveType) -> EntityKey {
        let key = world.create_entity(class).unwrap();
        let ent = world.entity_mut(key).unwrap();
        ent.set_hitbox(size);
        ent.set_base_origin(origin);
        ent.move_type = move_type;
        world.activate_entity(key);
        key
    }

    fn refuse_collisions(world: &mut PhysicsWorld, key: EntityKey) {
        world
            .entity_mut(key)
            .unwrap()
            .events
            .get_mut(EventSlot::Collision)
            .set_func(event_fn(|_: &mut PhysicsWorld, _, _| EventValue::Bool(false)));
    }

    /// 10x10 mover at x 0..10 heading right at 100 u/s toward a tall wall.
    fn wall_setup(world: &mut PhysicsWorld) -> (EntityKey, EntityKey) {
        let player = spawn(world, "entity", Vec2::new(0.0, 10.0), Vec2::splat(10.0), MoveType::Physics);
        world.entity_mut(player).unwrap().velocity = Vec2::new(100.0, 0.0);
        let wall = spawn(world, "rect", Vec2::new(15.0, 100.0), Vec2::new(10.0, 200.0), MoveType::Anchored);
        (player, wall)
    }

    #[test]
    fn test_builtin_classnames() {
        let mut world = PhysicsWorld::default();
        let e = world.create_entity("entity").unwrap();
        let r = world.create_entity("rect").unwrap();
        let t = world.create_entity("tile").unwrap();
        assert_eq!(world.entity(e).unwrap().move_type, MoveType::None);
        assert_eq!(world.entity(r).unwrap().move_type, MoveType::Anchored);
        assert_eq!(world.entity(t).unwrap().classname(), "tile");
        assert!(!world.entity(e).unwrap().active);
        assert_eq!(world.count_entities(false), 3);
        assert_eq!(world.count_entities(true), 0);
    }

    #[test]
    fn test_unknown_classname_is_an_error() {
        let mut world = PhysicsWorld::default();
        let err = world.create_entity("nope").unwrap_err();
        assert!(matches!(err, PhysicsError::UnknownClassname(ref n) if n == "nope"));
        assert_eq!(world.count_entities(false), 0);
    }

    #[test]
    fn test_register_classname() {
        let mut world = PhysicsWorld::default();
        world.register_classname("player", |name| {
            let mut ent = Entity::new(name);
            ent.move_type = MoveType::Physics;
            ent.move_speed = 250.0;
            ent
        });
        let key = world.create_entity("player").unwrap();
        assert_eq!(world.entity(key).unwrap().move_type, MoveType::Physics);
        assert_eq!(world.entity(key).unwrap().move_speed, 250.0);
    }

    #[test]
    fn test_activate_inserts_after_handler() {
        let mut world = PhysicsWorld::default();
        let key = world.create_entity("rect").unwrap();
        world.entity_mut(key).unwrap().set_hitbox(Vec2::splat(10.0));
        world
            .entity_mut(key)
            .unwrap()
            .events
            .get_mut(EventSlot::Activated)
            .set_func(event_fn(|w: &mut PhysicsWorld, me, _| {
                w.entity_mut(me).unwrap().set_base_origin(Vec2::new(500.0, 500.0));
                EventValue::None
            }));
        assert!(!world.entity(key).unwrap().in_grid());
        world.activate_entity(key);
        let ent = world.entity(key).unwrap();
        assert!(ent.active && ent.in_grid() && !ent.dirty);
        let cell = world.grid().cell_of(Vec2::new(505.0, 495.0));
        assert!(world.grid().cell(cell).is_some_and(|c| c.contains(key)));
    }

    #[test]
    fn test_landing_on_anchored_floor() {
        let mut world = PhysicsWorld::default();
        let floor = spawn(&mut world, "rect", Vec2::new(-100.0, 0.0), Vec2::new(200.0, 20.0), MoveType::Anchored);
        let player = spawn(&mut world, "entity", Vec2::new(0.0, 50.0), Vec2::new(10.0, 20.0), MoveType::Physics);

        for _ in 0..120 {
            world.run_frame(1.0 / 60.0);
        }
        let ent = world.entity(player).unwrap();
        assert_eq!(ent.ground_entity, Some(floor));
        assert_eq!(ent.velocity.y, 0.0);
        assert_abs_diff_eq!(ent.base_origin().y, 20.0, epsilon = 1e-4);
        assert_abs_diff_eq!(ent.aabb().bottom(), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_horizontal_stop_against_wall() {
        let mut world = PhysicsWorld::default();
        let (player, _) = wall_setup(&mut world);
        world.physics_step(0.1);
        let ent = world.entity(player).unwrap();
        assert_eq!(ent.base_origin().x, 5.0);
        assert_eq!(ent.velocity.x, 0.0);
        assert_eq!(world.last_stats().hits, 1);
    }

    #[test]
    fn test_candidate_refusal_lets_mover_pass() {
        let mut world = PhysicsWorld::default();
        let (player, wall) = wall_setup(&mut world);
        refuse_collisions(&mut world, wall);
        world.physics_step(0.1);
        let ent = world.entity(player).unwrap();
        assert_abs_diff_eq!(ent.base_origin().x, 10.0, epsilon = 1e-4);
        assert_eq!(ent.velocity.x, 100.0);
        assert_eq!(world.last_stats().hits, 0);
    }

    #[test]
    fn test_mover_refusal_skips_candidate_handler() {
        let mut world = PhysicsWorld::default();
        let (player, wall) = wall_setup(&mut world);
        refuse_collisions(&mut world, player);

        let asked = Rc::new(RefCell::new(0));
        let counter = asked.clone();
        world
            .entity_mut(wall)
            .unwrap()
            .events
            .get_mut(EventSlot::Collision)
            .set_func(event_fn(move |_: &mut PhysicsWorld, _, _| {
                *counter.borrow_mut() += 1;
                EventValue::Bool(true)
            }));

        world.physics_step(0.1);
        assert_eq!(*asked.borrow(), 0);
        assert_eq!(world.entity(player).unwrap().velocity.x, 100.0);
    }

    #[test]
    fn test_superseding_hook_vetoes_collision() {
        let mut world = PhysicsWorld::default();
        let (player, wall) = wall_setup(&mut world);
        world
            .entity_mut(wall)
            .unwrap()
            .events
            .get_mut(EventSlot::Collision)
            .hook(detour_fn(|_: &mut PhysicsWorld, _, _, _, _| Detour::Supersede(EventValue::Bool(false))), false);
        world.physics_step(0.1);
        assert_eq!(world.entity(player).unwrap().velocity.x, 100.0);
    }

    #[test]
    fn test_collision_events_carry_direction_and_role() {
        let mut world = PhysicsWorld::default();
        let (player, wall) = wall_setup(&mut world);
        let seen: Rc<RefCell<Vec<(EventSlot, EntityKey, CollisionInfo)>>> = Rc::default();
        for (key, slot) in [
            (player, EventSlot::Collision),
            (wall, EventSlot::Collision),
            (player, EventSlot::CollisionFinal),
            (wall, EventSlot::CollisionFinal),
        ] {
            let log = seen.clone();
            world
                .entity_mut(key)
                .unwrap()
                .events
                .get_mut(slot)
                .set_func(event_fn(move |_: &mut PhysicsWorld, me, args| {
                    if let Some(info) = args.collision() {
                        log.borrow_mut().push((slot, me, *info));
                    }
                    EventValue::Bool(true)
                }));
        }
        world.physics_step(0.1);

        let seen = seen.borrow();
        let horizontal: Vec<_> = seen.iter().filter(|(_, _, i)| i.dir.is_horizontal()).collect();
        assert_eq!(horizontal.len(), 4);
        assert_eq!(horizontal[0].0, EventSlot::Collision);
        assert_eq!(horizontal[0].1, player);
        assert_eq!(horizontal[0].2.kind, CollisionType::Colliding);
        assert_eq!(horizontal[0].2.dir, CollisionDir::Left);
        assert_eq!(horizontal[1].1, wall);
        assert_eq!(horizontal[1].2.kind, CollisionType::Collided);
        assert_eq!(horizontal[1].2.other, player);
        assert_eq!(horizontal[2].0, EventSlot::CollisionFinal);
        assert_eq!(horizontal[3].0, EventSlot::CollisionFinal);
        assert_eq!(horizontal[3].1, wall);
    }

    #[test]
    fn test_closest_blocker_wins_in_any_order() {
        for near_first in [true, false] {
            let mut world = PhysicsWorld::default();
            let player = spawn(&mut world, "entity", Vec2::new(0.0, 10.0), Vec2::splat(10.0), MoveType::Physics);
            world.entity_mut(player).unwrap().velocity = Vec2::new(100.0, 0.0);
            let near = Vec2::new(15.0, 100.0);
            let far = Vec2::new(18.0, 100.0);
            let (a, b) = if near_first { (near, far) } else { (far, near) };
            spawn(&mut world, "rect", a, Vec2::new(2.0, 200.0), MoveType::Anchored);
            spawn(&mut world, "rect", b, Vec2::new(7.0, 200.0), MoveType::Anchored);

            world.physics_step(0.1);
            let ent = world.entity(player).unwrap();
            assert_eq!(ent.base_origin().x, 5.0, "near_first={near_first}");
            assert_eq!(world.last_stats().hits, 2);
        }
    }

    #[test]
    fn test_kill_height_deletes_next_frame() {
        let mut world = PhysicsWorld::default();
        let faller = spawn(&mut world, "entity", Vec2::new(0.0, -990.0), Vec2::splat(1.0), MoveType::Physics);

        world.run_frame(0.1);
        let ent = world.entity(faller).unwrap();
        assert!(ent.is_deleted());
        assert!(!ent.visible);
        assert_eq!(ent.move_type, MoveType::None);
        assert_eq!(world.last_stats().killed, 1);

        world.run_frame(0.1);
        assert!(world.entity(faller).is_none());
        assert_eq!(world.count_entities(false), 0);
        assert_eq!(world.grid().stats(), GridStats::default());
    }

    #[test]
    fn test_min_height_follows_variable() {
        let mut world = PhysicsWorld::default();
        let id = world.physics_vars().min_height;
        world.vars_mut().set(id, -10.0);
        let faller = spawn(&mut world, "entity", Vec2::new(0.0, 0.0), Vec2::splat(1.0), MoveType::Physics);
        world.run_frame(0.1);
        assert!(world.entity(faller).unwrap().is_deleted());
    }

    #[test]
    fn test_physics_variables_are_program_only() {
        let mut world = PhysicsWorld::default();
        assert!(world.vars_mut().apply_override("gravity=0").is_err());
        let id = world.physics_vars().gravity;
        assert_eq!(world.vars().get(id), 1350.0);
    }

    #[test]
    fn test_delete_is_deferred_and_idempotent() {
        let mut world = PhysicsWorld::default();
        let key = spawn(&mut world, "rect", Vec2::ZERO, Vec2::splat(10.0), MoveType::Anchored);
        world.delete_entity(key);
        world.delete_entity(key);
        assert!(world.entity(key).is_some());
        assert!(world.query_entities(Vec2::new(-5.0, -15.0), Vec2::new(15.0, 5.0), false).is_empty());

        world.run_frame(0.1);
        assert!(world.entity(key).is_none());
        assert_eq!(world.entities().count(), 0);
    }

    #[test]
    fn test_pickup_deletes_itself_from_collision_handler() {
        let mut world = PhysicsWorld::default();
        let (player, coin) = wall_setup(&mut world);
        world
            .entity_mut(coin)
            .unwrap()
            .events
            .get_mut(EventSlot::Collision)
            .set_func(event_fn(|w: &mut PhysicsWorld, me, _| {
                w.delete_entity(me);
                EventValue::Bool(false)
            }));

        world.run_frame(0.1);
        assert_eq!(world.entity(player).unwrap().velocity.x, 100.0);
        assert!(world.entity(coin).unwrap().is_deleted());
        world.run_frame(0.1);
        assert!(world.entity(coin).is_none());
    }

    #[test]
    fn test_custom_platform_carries_rider() {
        let mut world = PhysicsWorld::default();
        let platform = spawn(&mut world, "entity", Vec2::new(0.0, 0.0), Vec2::new(50.0, 10.0), MoveType::Custom);
        world.entity_mut(platform).unwrap().velocity = Vec2::new(0.0, 100.0);
        let rider = spawn(&mut world, "entity", Vec2::new(10.0, 12.0), Vec2::splat(10.0), MoveType::Physics);

        world.physics_step(0.1);

        let p = world.entity(platform).unwrap();
        assert_abs_diff_eq!(p.base_origin().y, 10.0, epsilon = 1e-4);
        assert_eq!(p.velocity, Vec2::new(0.0, 100.0));

        let r = world.entity(rider).unwrap();
        assert_eq!(r.ground_entity, Some(platform));
        assert_eq!(r.velocity.y, 0.0);
        assert_abs_diff_eq!(r.base_origin().y, 20.0, epsilon = 1e-4);
    }

    #[test]
    fn test_ground_friction_slows_sliding_entity() {
        let mut world = PhysicsWorld::default();
        spawn(&mut world, "rect", Vec2::new(-1000.0, 0.0), Vec2::new(2000.0, 20.0), MoveType::Anchored);
        let slider = spawn(&mut world, "entity", Vec2::new(0.0, 10.0), Vec2::splat(10.0), MoveType::Physics);

        world.physics_step(0.1);
        world.entity_mut(slider).unwrap().velocity.x = 100.0;
        world.physics_step(0.01);
        let vx = world.entity(slider).unwrap().velocity.x;
        assert_abs_diff_eq!(vx, 92.0, epsilon = 1e-3);

        for _ in 0..50 {
            world.physics_step(0.01);
        }
        assert_eq!(world.entity(slider).unwrap().velocity.x, 0.0);
    }

    #[test]
    fn test_stale_ground_entity_is_cleared() {
        let mut world = PhysicsWorld::default();
        let floor = spawn(&mut world, "rect", Vec2::new(-100.0, 0.0), Vec2::new(200.0, 20.0), MoveType::Anchored);
        let player = spawn(&mut world, "entity", Vec2::new(0.0, 10.0), Vec2::splat(10.0), MoveType::Physics);
        world.run_frame(0.1);
        assert_eq!(world.entity(player).unwrap().ground_entity, Some(floor));

        world.delete_entity(floor);
        world.run_frame(0.1);
        world.run_frame(0.1);
        let ent = world.entity(player).unwrap();
        assert_eq!(ent.ground_entity, None);
        assert!(ent.velocity.y < 0.0);
    }

    #[test]
    fn test_query_entities_filters_exact_overlap() {
        let mut world = PhysicsWorld::default();
        let a = spawn(&mut world, "rect", Vec2::new(0.0, 10.0), Vec2::splat(10.0), MoveType::Anchored);
        let b = spawn(&mut world, "rect", Vec2::new(40.0, 10.0), Vec2::splat(10.0), MoveType::Anchored);
        let ghost = spawn(&mut world, "entity", Vec2::new(5.0, 10.0), Vec2::splat(10.0), MoveType::None);

        let hits = world.query_entities(Vec2::new(-5.0, -5.0), Vec2::new(20.0, 20.0), false);
        assert_eq!(hits, vec![a]);
        let mut all = world.query_entities(Vec2::new(-5.0, -5.0), Vec2::new(20.0, 20.0), true);
        all.sort();
        let mut expected = vec![a, ghost];
        expected.sort();
        assert_eq!(all, expected);
        assert!(!hits.contains(&b));
    }

    #[test]
    fn test_per_frame_runs_on_active_entities_after_physics() {
        let mut world = PhysicsWorld::default();
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let active = spawn(&mut world, "entity", Vec2::ZERO, Vec2::splat(1.0), MoveType::None);
        let dormant = world.create_entity("entity").unwrap();
        for key in [active, dormant] {
            let log = ticks.clone();
            world
                .entity_mut(key)
                .unwrap()
                .events
                .get_mut(EventSlot::PerFrame)
                .set_func(event_fn(move |w: &mut PhysicsWorld, me, _| {
                    log.borrow_mut().push((me, w.frame_count()));
                    EventValue::None
                }));
        }
        world.run_frame(0.016);
        world.run_frame(0.016);
        assert_eq!(*ticks.borrow(), vec![(active, 1), (active, 2)]);
    }

    #[test]
    fn test_invoke_on_missing_entity_returns_none() {
        let mut world = PhysicsWorld::default();
        let key = spawn(&mut world, "entity", Vec2::ZERO, Vec2::splat(1.0), MoveType::None);
        assert_eq!(
            world.invoke_event(key, EventSlot::Collision, EventArgs::None),
            EventValue::Bool(true)
        );
        assert_eq!(world.invoke_event_by_name(key, "bogus", EventArgs::None), EventValue::None);
        assert_eq!(world.invoke_event_by_name(key, "collision", EventArgs::None), EventValue::Bool(true));

        world.delete_entity(key);
        world.run_frame(0.1);
        assert_eq!(world.invoke_event(key, EventSlot::Collision, EventArgs::None), EventValue::None);
    }

    #[test]
    fn test_disabled_physics_leaves_entities_alone() {
        let mut world = PhysicsWorld::default();
        let key = spawn(&mut world, "entity", Vec2::new(0.0, 10.0), Vec2::splat(10.0), MoveType::Physics);
        world.physics_enabled = false;
        world.run_frame(0.1);
        let ent = world.entity(key).unwrap();
        assert_eq!(ent.velocity, Vec2::ZERO);
        assert_eq!(ent.base_origin(), Vec2::new(0.0, 10.0));
    }

    #[test]
    fn test_clear_entities_resets_everything() {
        let mut world = PhysicsWorld::default();
        let key = spawn(&mut world, "rect", Vec2::ZERO, Vec2::splat(10.0), MoveType::Anchored);
        world.delete_entity(key);
        world.clear_entities();
        assert_eq!(world.count_entities(false), 0);
        assert_eq!(world.grid().stats(), GridStats::default());
        world.run_frame(0.1);
        assert_eq!(world.entities().count(), 0);
    }

    #[test]
    fn test_step_timing_is_optional() {
        let mut world = PhysicsWorld::default();
        world.physics_step(0.1);
        assert!(world.last_stats().step_ms.is_none());

        let mut timed = PhysicsWorld::new(WorldConfig {
            enable_timing: true,
            ..WorldConfig::default()
        });
        timed.physics_step(0.1);
        assert!(timed.last_stats().step_ms.is_some());
    }

    fn zero_gravity(world: &mut PhysicsWorld) {
        let id = world.physics_vars().gravity;
        world.vars_mut().set(id, 0.0);
    }

    #[test]
    fn test_custom_mover_pushes_every_physics_candidate_horizontally() {
        let mut world = PhysicsWorld::default();
        zero_gravity(&mut world);
        let pusher = spawn(&mut world, "entity", Vec2::new(0.0, 10.0), Vec2::splat(10.0), MoveType::Custom);
        world.entity_mut(pusher).unwrap().velocity = Vec2::new(100.0, 0.0);
        let near = spawn(&mut world, "entity", Vec2::new(12.0, 10.0), Vec2::splat(10.0), MoveType::Physics);
        let far = spawn(&mut world, "entity", Vec2::new(16.0, 10.0), Vec2::splat(10.0), MoveType::Physics);

        world.physics_step(0.1);

        let n = world.entity(near).unwrap();
        let f = world.entity(far).unwrap();
        assert_abs_diff_eq!(n.base_origin().x, 22.0, epsilon = 1e-4);
        assert_abs_diff_eq!(f.base_origin().x, 26.0, epsilon = 1e-4);
        assert_eq!(n.base_origin().y, 10.0);
        assert_eq!(n.velocity, Vec2::ZERO);
        assert_eq!(n.ground_entity, None);

        let p = world.entity(pusher).unwrap();
        assert_abs_diff_eq!(p.base_origin().x, 10.0, epsilon = 1e-4);
        assert_eq!(p.velocity, Vec2::new(100.0, 0.0));
    }

    #[test]
    fn test_refused_landing_falls_through() {
        let mut world = PhysicsWorld::default();
        let floor = spawn(&mut world, "rect", Vec2::new(-100.0, 0.0), Vec2::new(200.0, 20.0), MoveType::Anchored);
        refuse_collisions(&mut world, floor);
        let player = spawn(&mut world, "entity", Vec2::new(0.0, 12.0), Vec2::splat(10.0), MoveType::Physics);

        world.physics_step(0.1);
        let ent = world.entity(player).unwrap();
        assert_eq!(ent.ground_entity, None);
        assert_abs_diff_eq!(ent.velocity.y, -135.0, epsilon = 1e-3);
        assert_abs_diff_eq!(ent.base_origin().y, -1.5, epsilon = 1e-3);
        assert_eq!(world.last_stats().hits, 0);

        world.physics_step(0.1);
        let ent = world.entity(player).unwrap();
        assert_eq!(ent.ground_entity, None);
        assert!(ent.base_origin().y < -1.5);
    }

    #[test]
    fn test_refused_axis_does_not_suppress_other_axis() {
        let mut world = PhysicsWorld::default();
        zero_gravity(&mut world);
        let player = spawn(&mut world, "entity", Vec2::new(5.0, 8.0), Vec2::splat(10.0), MoveType::Physics);
        world.entity_mut(player).unwrap().velocity = Vec2::new(100.0, -100.0);
        let block = spawn(&mut world, "rect", Vec2::new(10.0, 0.0), Vec2::new(20.0, 20.0), MoveType::Anchored);
        world
            .entity_mut(block)
            .unwrap()
            .events
            .get_mut(EventSlot::Collision)
            .set_func(event_fn(|_: &mut PhysicsWorld, _, args| {
                let horizontal = args.collision().is_some_and(|info| info.dir.is_horizontal());
                EventValue::Bool(!horizontal)
            }));

        world.physics_step(0.1);
        let ent = world.entity(player).unwrap();
        assert_eq!(ent.ground_entity, Some(block));
        assert_eq!(ent.velocity, Vec2::new(100.0, 0.0));
        assert_eq!(ent.base_origin().y, 10.0);
        assert_abs_diff_eq!(ent.base_origin().x, 15.0, epsilon = 1e-4);
        assert_eq!(world.last_stats().hits, 1);
    }

    #[test]
    fn test_timer_fires_on_due_frame() {
        let mut world = PhysicsWorld::default();
        let fired = Rc::new(RefCell::new(Vec::new()));
        let log = fired.clone();
        world.create_timer(0.0, move |w: &mut PhysicsWorld| log.borrow_mut().push(w.frame_count()));
        let log = fired.clone();
        world.create_timer(0.25, move |w: &mut PhysicsWorld| log.borrow_mut().push(w.frame_count()));
        assert_eq!(world.pending_timers(), 2);

        for _ in 0..4 {
            world.run_frame(0.1);
        }
        assert_eq!(*fired.borrow(), vec![1, 3]);
        assert_eq!(world.pending_timers(), 0);
        assert_abs_diff_eq!(world.elapsed(), 0.4, epsilon = 1e-6);
    }

    #[test]
    fn test_timer_created_by_timer_waits_a_frame() {
        let mut world = PhysicsWorld::default();
        let fired = Rc::new(RefCell::new(Vec::new()));
        let log = fired.clone();
        world.create_timer(0.0, move |w: &mut PhysicsWorld| {
            w.create_timer(0.0, move |w: &mut PhysicsWorld| log.borrow_mut().push(w.frame_count()));
        });
        for _ in 0..3 {
            world.run_frame(0.1);
        }
        assert_eq!(*fired.borrow(), vec![2]);
    }

    #[test]
    fn test_timer_can_spawn_entities() {
        let mut world = PhysicsWorld::default();
        world.create_timer(0.0, |w: &mut PhysicsWorld| {
            if let Ok(key) = w.create_entity("rect") {
                w.activate_entity(key);
            }
        });
        world.run_frame(0.1);
        assert_eq!(world.count_entities(true), 1);
    }

    #[test]
    fn test_clear_entities_keeps_gameplay_timers() {
        let mut world = PhysicsWorld::default();
        let key = spawn(&mut world, "rect", Vec2::ZERO, Vec2::splat(10.0), MoveType::Anchored);
        world.delete_entity(key);
        let fired = Rc::new(RefCell::new(0));
        let count = fired.clone();
        world.create_timer(0.0, move |_: &mut PhysicsWorld| *count.borrow_mut() += 1);
        assert_eq!(world.pending_timers(), 2);

        world.clear_entities();
        assert_eq!(world.pending_timers(), 1);
        world.run_frame(0.1);
        assert_eq!(*fired.borrow(), 1);
    }

    #[test]
    fn test_world_from_config_file() {
        let path = std::env::temp_dir().join(format!("plonk-world-{}.toml", std::process::id()));
        std::fs::write(&path, "gravity = 900.0\nmin_height = -50.0\n").unwrap();
        let world = PhysicsWorld::from_config_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(world.vars().get(world.physics_vars().gravity), 900.0);
        assert_eq!(world.vars().get(world.physics_vars().min_height), -50.0);
        assert_eq!(world.cfg.friction, 800.0);

        let missing = PhysicsWorld::from_config_file("/definitely/not/here/world.toml");
        assert!(matches!(missing, Err(PhysicsError::Config(ConfigError::Io(_)))));
    }

    #[test]
    fn test_apply_var_override() {
        let mut world = PhysicsWorld::default();
        let id = world.vars_mut().create("jump", 300.0, "Jump speed", VarFlags::empty(), Some(0.0), None);
        let set = world.apply_var_override("jump=450");
        assert!(matches!(set, Ok(Override::Set { ref name, value }) if name == "jump" && value == 450.0));
        assert_eq!(world.vars().get(id), 450.0);

        let refused = world.apply_var_override("gravity=0");
        assert!(matches!(refused, Err(PhysicsError::Var(VarError::ProgramOnly(_)))));
        let unknown = world.apply_var_override("nope=1");
        assert!(matches!(unknown, Err(PhysicsError::Var(VarError::Unknown(_)))));
    }
}
