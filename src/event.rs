//! Per-entity event dispatch with detours.
//!
//! Each entity carries one [`Event`] per [`EventSlot`]. Invoking an event runs
//! the pre-call detours, the primary function and the post-call detours in
//! that order, threading a single running [`EventValue`] through the chain.
//! A detour may leave the value alone ([`Detour::Continue`]), replace it and
//! keep going ([`Detour::Override`]), or replace it and stop immediately
//! ([`Detour::Supersede`]). A pre-call supersede skips the primary function.
//!
//! The physics engine only relies on two slots: `collision`, whose result
//! gates resolution, and `collisionfinal`, which is a notification.
//! Gameplay customises collision behaviour by swapping the primary function
//! or hooking detours, never by touching the engine.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use log::debug;

use crate::error::PhysicsError;
use crate::types::{CollisionDir, CollisionType, EntityKey};

/// The closed set of entity events.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventSlot {
    Draw,
    Activated,
    PerFrame,
    Collision,
    CollisionFinal,
    Use,
}

impl EventSlot {
    pub const ALL: [EventSlot; 6] = [
        EventSlot::Draw,
        EventSlot::Activated,
        EventSlot::PerFrame,
        EventSlot::Collision,
        EventSlot::CollisionFinal,
        EventSlot::Use,
    ];

    /// Canonical event name.
    pub fn name(self) -> &'static str {
        match self {
            EventSlot::Draw => "draw",
            EventSlot::Activated => "activated",
            EventSlot::PerFrame => "per_frame",
            EventSlot::Collision => "collision",
            EventSlot::CollisionFinal => "collisionfinal",
            EventSlot::Use => "use",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EventSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventSlot {
    type Err = PhysicsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventSlot::ALL
            .into_iter()
            .find(|slot| slot.name() == s)
            .ok_or_else(|| PhysicsError::UnknownEvent(s.to_owned()))
    }
}

/// Value threaded through an invocation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum EventValue {
    #[default]
    None,
    Bool(bool),
}

impl EventValue {
    /// Only `Bool(true)` allows a collision; `None` does not.
    pub fn is_truthy(self) -> bool {
        matches!(self, EventValue::Bool(true))
    }
}

impl From<bool> for EventValue {
    fn from(b: bool) -> Self {
        EventValue::Bool(b)
    }
}

/// Payload delivered with `collision` and `collisionfinal`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CollisionInfo {
    /// The other entity in the pair.
    pub other: EntityKey,
    pub kind: CollisionType,
    pub dir: CollisionDir,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum EventArgs {
    #[default]
    None,
    Collision(CollisionInfo),
}

impl EventArgs {
    pub fn collision(&self) -> Option<&CollisionInfo> {
        match self {
            EventArgs::Collision(info) => Some(info),
            EventArgs::None => None,
        }
    }
}

/// What a detour asks the invocation to do next.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Detour {
    Continue,
    Override(EventValue),
    Supersede(EventValue),
}

/// Primary event function. `C` is the context handed to handlers.
pub type EventFn<C> = Rc<dyn Fn(&mut C, EntityKey, &EventArgs) -> EventValue>;

/// Detour function: receives the slot and the running return value.
pub type DetourFn<C> = Rc<dyn Fn(&mut C, EntityKey, EventSlot, EventValue, &EventArgs) -> Detour>;

/// Wrap a closure as an [`EventFn`].
pub fn event_fn<C, F>(f: F) -> EventFn<C>
where
    F: Fn(&mut C, EntityKey, &EventArgs) -> EventValue + 'static,
{
    Rc::new(f)
}

/// Wrap a closure as a [`DetourFn`]. Keep the returned `Rc` to remove it later.
pub fn detour_fn<C, F>(f: F) -> DetourFn<C>
where
    F: Fn(&mut C, EntityKey, EventSlot, EventValue, &EventArgs) -> Detour + 'static,
{
    Rc::new(f)
}

/// An invocable event with its detour chains.
pub struct Event<C> {
    slot: EventSlot,
    func: EventFn<C>,
    pre: Vec<DetourFn<C>>,
    post: Vec<DetourFn<C>>,
}

impl<C> Clone for Event<C> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot,
            func: Rc::clone(&self.func),
            pre: self.pre.clone(),
            post: self.post.clone(),
        }
    }
}

impl<C> fmt::Debug for Event<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("slot", &self.slot)
            .field("pre", &self.pre.len())
            .field("post", &self.post.len())
            .finish()
    }
}

impl<C> Event<C> {
    pub fn new(slot: EventSlot, func: EventFn<C>) -> Self {
        Self {
            slot,
            func,
            pre: Vec::new(),
            post: Vec::new(),
        }
    }

    pub fn slot(&self) -> EventSlot {
        self.slot
    }

    /// Replace the primary function.
    pub fn set_func(&mut self, func: EventFn<C>) {
        self.func = func;
    }

    /// Append a detour. Returns false if this exact detour is already hooked.
    pub fn hook(&mut self, detour: DetourFn<C>, post: bool) -> bool {
        let chain = if post { &mut self.post } else { &mut self.pre };
        if chain.iter().any(|d| Rc::ptr_eq(d, &detour)) {
            return false;
        }
        chain.push(detour);
        true
    }

    /// Remove a detour by identity. Returns whether it was found.
    pub fn remove_hook(&mut self, detour: &DetourFn<C>, post: bool) -> bool {
        let chain = if post { &mut self.post } else { &mut self.pre };
        match chain.iter().position(|d| Rc::ptr_eq(d, detour)) {
            Some(i) => {
                chain.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn hook_count(&self, post: bool) -> usize {
        if post { self.post.len() } else { self.pre.len() }
    }

    /// Run the chain against `ctx` on behalf of entity `key`.
    ///
    /// If a pre-call detour overrides the value, the primary function still
    /// runs but its result is discarded.
    pub fn invoke(&self, ctx: &mut C, key: EntityKey, args: &EventArgs) -> EventValue {
        let mut value = EventValue::None;
        let mut overridden = false;

        for pre in &self.pre {
            match pre(ctx, key, self.slot, value, args) {
                Detour::Continue => {}
                Detour::Override(v) => {
                    value = v;
                    overridden = true;
                }
                Detour::Supersede(v) => return v,
            }
        }

        let primary = (self.func)(ctx, key, args);
        if !overridden {
            value = primary;
        }

        for post in &self.post {
            match post(ctx, key, self.slot, value, args) {
                Detour::Continue => {}
                Detour::Override(v) => value = v,
                Detour::Supersede(v) => return v,
            }
        }
        value
    }
}

/// One event per slot, created with the stock defaults.
pub struct EventTable<C> {
    events: [Event<C>; 6],
}

impl<C> Clone for EventTable<C> {
    fn clone(&self) -> Self {
        Self { events: self.events.clone() }
    }
}

impl<C> fmt::Debug for EventTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.events.iter()).finish()
    }
}

impl<C: 'static> Default for EventTable<C> {
    fn default() -> Self {
        Self {
            events: EventSlot::ALL.map(|slot| Event::new(slot, default_fn(slot))),
        }
    }
}

impl<C> EventTable<C> {
    pub fn get(&self, slot: EventSlot) -> &Event<C> {
        &self.events[slot.index()]
    }

    pub fn get_mut(&mut self, slot: EventSlot) -> &mut Event<C> {
        &mut self.events[slot.index()]
    }
}

fn default_fn<C: 'static>(slot: EventSlot) -> EventFn<C> {
    match slot {
        EventSlot::Collision => event_fn(|_, _, _| EventValue::Bool(true)),
        EventSlot::Draw => event_fn(|_, key, _| {
            debug!("entity {key:?}: placeholder draw function called");
            EventValue::None
        }),
        _ => event_fn(|_, _, _| EventValue::None),
    }
}
