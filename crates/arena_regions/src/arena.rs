//! Collaborators owned by the host's arena runtime.
//!
//! Regions never own arenas, players or sound output. They reach them through
//! the traits in this module, implemented by the host.

use crate::types::{ArenaId, BlockPos, Location, PlayerId, Vec3};
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Arena lifecycle and world-interaction events that regions react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ArenaEvent {
    /// The arena's game started
    Started,
    /// The arena's game ended
    Ended,
    /// A player broke or otherwise interacted with a block
    BlockInteract { player: PlayerId, pos: BlockPos },
}

impl ArenaEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ArenaEvent::Started => "arena_started",
            ArenaEvent::Ended => "arena_ended",
            ArenaEvent::BlockInteract { .. } => "block_interact",
        }
    }
}

/// Identifier returned by [`ArenaEvents::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

pub type ArenaEventHandler = Arc<dyn Fn(&ArenaEvent) + Send + Sync>;

/// Subscribe/unsubscribe hub for one arena's events.
///
/// Handlers are invoked in subscription order. A handler may unsubscribe
/// itself (or others) while an event is being delivered; the change applies
/// from the next emit.
#[derive(Default)]
pub struct ArenaEvents {
    handlers: DashMap<SubscriptionId, ArenaEventHandler>,
    next_id: AtomicU64,
}

impl ArenaEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: impl Fn(&ArenaEvent) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.insert(id, Arc::new(handler));
        debug!("Registered arena event handler {}", id);
        id
    }

    /// Returns `false` when the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.handlers.remove(&id).is_some()
    }

    /// Delivers `event` to every handler and returns how many were invoked.
    pub fn emit(&self, event: &ArenaEvent) -> usize {
        let mut handlers: Vec<(SubscriptionId, ArenaEventHandler)> = self
            .handlers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        handlers.sort_by_key(|(id, _)| *id);

        for (_, handler) in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl fmt::Debug for ArenaEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaEvents")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Where a forwarded player should end up inside the destination arena.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub location: Location,
    pub velocity: Vec3,
}

/// The arena a region belongs to.
pub trait Arena: Send + Sync {
    fn id(&self) -> ArenaId;

    fn name(&self) -> &str;

    /// Called when one of the arena's regions submits build work.
    fn mark_busy(&self);

    /// Called when that work resolves, whatever the outcome.
    fn mark_idle(&self);

    /// Whether the arena itself is restoring its main volume.
    fn is_restoring(&self) -> bool {
        false
    }

    fn events(&self) -> &ArenaEvents;

    /// Moves `player` into this arena. Without a placement the arena picks
    /// its own spawn point.
    fn forward_player(&self, player: &dyn ArenaPlayer, placement: Option<Placement>);
}

/// Lookup of arenas by id.
pub trait ArenaDirectory: Send + Sync {
    fn arena(&self, id: ArenaId) -> Option<Arc<dyn Arena>>;
}

/// A player as seen by regions.
pub trait ArenaPlayer: Send + Sync {
    fn id(&self) -> PlayerId;

    /// The arena the player is currently part of.
    fn arena_id(&self) -> Option<ArenaId>;

    fn is_online(&self) -> bool;

    fn is_dead(&self) -> bool;

    fn health(&self) -> f64;

    fn max_health(&self) -> f64;

    fn set_health(&self, health: f64);

    fn damage(&self, amount: f64);

    fn location(&self) -> Location;

    fn velocity(&self) -> Vec3;
}

/// Sound output for players.
pub trait SoundPlayer: Send + Sync {
    fn has_sound(&self, name: &str) -> bool;

    fn is_playing(&self, player: PlayerId) -> bool;

    /// Plays `sounds` in order, looping the list when `looping` is set.
    fn play(&self, player: PlayerId, sounds: &[String], looping: bool);

    fn stop(&self, player: PlayerId);
}
