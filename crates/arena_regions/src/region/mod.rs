//! Region base state machine.
//!
//! A [`Region`] is a named volume of one arena. It owns the enabled flag, the
//! settings, the current snapshot and the triggered/dirty flags, and delegates
//! behavior to a [`RegionVariant`].
//!
//! ```text
//! Disabled -> Enabled -> { Idle, Busy(Capturing | Restoring | Building) }
//! ```
//!
//! Locking: the variant lock is always taken before the state lock. Task
//! completion callbacks never take the variant lock while being registered
//! from inside a variant hook. Submissions made by hooks are recorded and
//! only watched once the hook has returned and the variant lock is released.

mod variant;

pub use variant::{RegionVariant, VariantKind};

use crate::arena::{Arena, ArenaEvent, ArenaPlayer, SubscriptionId};
use crate::config::RegionDocument;
use crate::error::RegionError;
use crate::future::{TaskFuture, TaskOutcome, TaskOutput};
use crate::queue::{BuildSpeed, BuildTask, TaskHandle, TaskId, TaskKind, REDUNDANT};
use crate::services::RegionServices;
use crate::settings::Settings;
use crate::snapshot::Snapshot;
use crate::types::{BlockPos, Bounds, RegionId};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Kind of build work a region is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusyKind {
    Capturing,
    Restoring,
    Building,
}

impl From<TaskKind> for BusyKind {
    fn from(kind: TaskKind) -> Self {
        match kind {
            TaskKind::Capture => BusyKind::Capturing,
            TaskKind::Restore => BusyKind::Restoring,
            TaskKind::Fill => BusyKind::Building,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionStatus {
    Disabled,
    Idle,
    Busy(BusyKind),
}

/// Identifier of an extra enter or leave handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

pub type PlayerHandler = Arc<dyn Fn(&Region, &Arc<dyn ArenaPlayer>) + Send + Sync>;

#[derive(Default)]
struct RegionState {
    enabled: bool,
    disable_deferred: bool,
    triggered: bool,
    /// World content differs from the snapshot
    dirty: bool,
    snapshot: Option<Arc<Snapshot>>,
    settings: Settings,
    subscription: Option<SubscriptionId>,
    in_flight: Vec<(TaskId, BusyKind)>,
    /// Submitted but completion not yet observed
    unwatched: Vec<(TaskId, TaskFuture)>,
    pending_untrigger: Option<TaskFuture>,
}

#[derive(Default)]
struct PlayerHandlers {
    enter: BTreeMap<HandlerId, PlayerHandler>,
    leave: BTreeMap<HandlerId, PlayerHandler>,
}

pub struct Region {
    id: RegionId,
    kind: VariantKind,
    bounds: Mutex<Bounds>,
    arena: Arc<dyn Arena>,
    services: Arc<RegionServices>,
    this: Weak<Region>,
    initialized: AtomicBool,
    variant: Mutex<Box<dyn RegionVariant>>,
    state: Mutex<RegionState>,
    handlers: Mutex<PlayerHandlers>,
    next_handler: AtomicU64,
}

impl Region {
    /// Creates an uninitialized, disabled region.
    pub fn new(
        name: &str,
        kind: VariantKind,
        bounds: Bounds,
        arena: Arc<dyn Arena>,
        services: Arc<RegionServices>,
    ) -> Arc<Self> {
        let id = RegionId::new(arena.id(), name);
        Arc::new_cyclic(|this| Self {
            id,
            kind,
            bounds: Mutex::new(bounds),
            arena,
            services,
            this: this.clone(),
            initialized: AtomicBool::new(false),
            variant: Mutex::new(kind.create()),
            state: Mutex::new(RegionState {
                settings: Settings::defaults(kind.schema()),
                ..RegionState::default()
            }),
            handlers: Mutex::new(PlayerHandlers::default()),
            next_handler: AtomicU64::new(1),
        })
    }

    /// Creates and initializes a region from its persisted document.
    pub fn from_document(
        document: &RegionDocument,
        arena: Arc<dyn Arena>,
        services: Arc<RegionServices>,
    ) -> Result<Arc<Self>, RegionError> {
        let kind = VariantKind::from_type_name(&document.kind)
            .ok_or_else(|| RegionError::UnknownRegionType(document.kind.clone()))?;
        if document.name.trim().is_empty() {
            return Err(RegionError::InvalidBounds(format!(
                "region of type '{}' has no name",
                document.kind
            )));
        }

        let region = Self::new(&document.name, kind, document.bounds.to_bounds(), arena, services);
        region.init(&document.settings, document.enabled);
        Ok(region)
    }

    /// Loads settings, runs the variant's init hook and enables the region
    /// when `enabled` is set.
    ///
    /// # Panics
    ///
    /// Panics when called a second time.
    pub fn init(&self, settings: &BTreeMap<String, Value>, enabled: bool) {
        if self.initialized.swap(true, Ordering::AcqRel) {
            panic!("region {} initialized twice", self.id);
        }

        let settings = Settings::load(self.kind.schema(), settings, &self.context());
        {
            let mut variant = self.variant.lock();
            self.state.lock().settings = settings.clone();
            variant.load_settings(self, &settings);
            variant.on_init(self);
        }
        self.watch_submissions();
        debug!("Initialized {} region {}", self.kind, self.context());

        if enabled {
            self.enable();
        }
    }

    pub fn id(&self) -> &RegionId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn kind(&self) -> VariantKind {
        self.kind
    }

    pub fn bounds(&self) -> Bounds {
        *self.bounds.lock()
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        self.bounds.lock().contains(pos)
    }

    pub fn arena(&self) -> &Arc<dyn Arena> {
        &self.arena
    }

    pub fn services(&self) -> &Arc<RegionServices> {
        &self.services
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn is_busy(&self) -> bool {
        !self.state.lock().in_flight.is_empty()
    }

    pub fn status(&self) -> RegionStatus {
        let state = self.state.lock();
        match (state.enabled, state.in_flight.first()) {
            (_, Some((_, busy))) => RegionStatus::Busy(*busy),
            (true, None) => RegionStatus::Idle,
            (false, None) => RegionStatus::Disabled,
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.state.lock().triggered
    }

    /// True after a destructive change that has not been restored yet.
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.state.lock().snapshot.clone()
    }

    /// Whether a snapshot exists to restore from.
    pub fn can_restore(&self) -> bool {
        self.state.lock().snapshot.is_some()
    }

    pub fn settings(&self) -> Settings {
        self.state.lock().settings.clone()
    }

    /// Enables the region. Idempotent.
    ///
    /// A variant that needs a snapshot and has none gets a capture submitted;
    /// if that capture fails or is cancelled the region is disabled again.
    /// A disable deferred behind running work is withdrawn instead. Returns
    /// whether the region is enabled when the call returns.
    pub fn enable(&self) -> bool {
        let needs_capture = {
            let mut variant = self.variant.lock();
            {
                let mut state = self.state.lock();
                if state.enabled {
                    if state.disable_deferred {
                        state.disable_deferred = false;
                        debug!("Region {}: deferred disable withdrawn", self.context());
                    }
                    return true;
                }
                state.enabled = true;
                state.disable_deferred = false;
            }

            if variant.listens_to_arena_events() {
                self.subscribe_arena_events();
            }
            variant.on_enable(self);
            variant.requires_snapshot() && !self.can_restore()
        };

        if needs_capture {
            self.submit_capture();
        }
        self.watch_submissions();

        info!("Region {} enabled", self.context());
        self.is_enabled()
    }

    /// Disables the region. Idempotent.
    ///
    /// While build work is in flight the disable is deferred until it
    /// resolves; returns `false` in that case.
    pub fn disable(&self) -> bool {
        {
            let mut state = self.state.lock();
            if !state.enabled {
                return true;
            }
            if !state.in_flight.is_empty() {
                state.disable_deferred = true;
                debug!("Region {}: disable deferred until build work resolves", self.context());
                return false;
            }
        }
        self.apply_disable("disabled");
        true
    }

    /// Runs the variant's trigger. Returns whether it had an effect.
    ///
    /// No-op while disabled, busy or already triggered.
    pub fn trigger(&self) -> bool {
        let effect = {
            let mut variant = self.variant.lock();
            {
                let state = self.state.lock();
                if !state.enabled || state.triggered || !state.in_flight.is_empty() {
                    return false;
                }
            }

            let effect = variant.on_trigger(self);
            if effect {
                let mut state = self.state.lock();
                state.triggered = true;
                state.dirty = true;
            }
            effect
        };
        self.watch_submissions();

        if effect {
            debug!("Region {} triggered", self.context());
        }
        effect
    }

    /// Undoes a trigger by restoring the snapshot.
    ///
    /// Returns the restore future, or the already pending one when an
    /// untrigger is in progress. Returns `None` when the region is not
    /// triggered, or cannot be restored. The triggered flag is cleared only
    /// when the restore succeeds.
    pub fn untrigger(&self) -> Option<TaskFuture> {
        let handle = {
            let variant = self.variant.lock();
            let mut state = self.state.lock();
            if let Some(pending) = &state.pending_untrigger {
                return Some(pending.clone());
            }
            if !state.triggered {
                return None;
            }
            if !variant.restores_on_untrigger() {
                state.triggered = false;
                return None;
            }
            let Some(snapshot) = state.snapshot.clone() else {
                warn!("Region {}: cannot untrigger without a snapshot", self.context());
                return None;
            };

            let handle = self.submit_locked(&mut state, BuildTask::restore(self.id.clone(), snapshot).forced(true));
            state.pending_untrigger = Some(handle.future.clone());
            handle
        };

        let region = self.this.clone();
        handle.future.on_complete(move |outcome| {
            if let Some(region) = region.upgrade() {
                let mut state = region.state.lock();
                state.pending_untrigger = None;
                if outcome.is_success() {
                    state.triggered = false;
                    state.dirty = false;
                } else {
                    warn!("Region {}: untrigger restore {}", region.context(), outcome);
                }
            }
        });
        self.watch_submissions();
        Some(handle.future)
    }

    /// Writes the current snapshot back into the world.
    ///
    /// Fails immediately without a snapshot. Unless `force` is set, the
    /// restore is cancelled as redundant while the arena or another region of
    /// it is restoring.
    pub fn restore(&self, force: bool) -> TaskFuture {
        let future = self.submit_restore(force, BuildSpeed::default());
        self.watch_submissions();
        future
    }

    /// Replaces the snapshot with a fresh capture of the world.
    pub fn capture(&self) -> TaskFuture {
        let future = self.submit_capture();
        self.watch_submissions();
        future
    }

    /// Restore without watching; safe to call from variant hooks.
    pub(crate) fn submit_restore(&self, force: bool, speed: BuildSpeed) -> TaskFuture {
        let Some(snapshot) = self.snapshot() else {
            return TaskFuture::failed(RegionError::NoSnapshot(self.context()).to_string());
        };
        if !force && self.arena.is_restoring() {
            debug!("Region {}: arena is restoring, restore skipped", self.context());
            return TaskFuture::cancelled(REDUNDANT);
        }

        let handle = self.submit(
            BuildTask::restore(self.id.clone(), snapshot)
                .with_speed(speed)
                .forced(force),
        );
        let region = self.this.clone();
        handle.future.on_success(move |_| {
            if let Some(region) = region.upgrade() {
                region.state.lock().dirty = false;
            }
        });
        handle.future
    }

    fn submit_capture(&self) -> TaskFuture {
        let handle = self.submit(BuildTask::capture(self.id.clone(), self.bounds()));
        handle.future.clone()
    }

    /// Moves the region to new bounds.
    ///
    /// Rejected while build work is in flight. The old snapshot no longer
    /// matches the volume and is dropped together with the triggered and
    /// dirty flags; an enabled region whose variant needs a snapshot gets a
    /// fresh capture submitted.
    pub fn redefine(&self, bounds: Bounds) -> Result<(), RegionError> {
        {
            let variant = self.variant.lock();
            let needs_capture = {
                let mut state = self.state.lock();
                if !state.in_flight.is_empty() {
                    return Err(RegionError::Busy(self.context()));
                }
                *self.bounds.lock() = bounds;
                state.snapshot = None;
                state.triggered = false;
                state.dirty = false;
                state.enabled && variant.requires_snapshot()
            };

            if needs_capture {
                self.submit_capture();
            }
        }
        self.watch_submissions();

        info!("Region {} redefined to {} .. {}", self.context(), bounds.min(), bounds.max());
        Ok(())
    }

    /// Submits build work on behalf of this region and marks it busy.
    ///
    /// Completion is observed once the caller's entry point returns.
    pub(crate) fn submit(&self, task: BuildTask) -> TaskHandle {
        let mut state = self.state.lock();
        self.submit_locked(&mut state, task)
    }

    fn submit_locked(&self, state: &mut RegionState, task: BuildTask) -> TaskHandle {
        let busy = BusyKind::from(task.kind());
        let handle = self.services.queue.submit(task);
        state.in_flight.push((handle.id, busy));
        state.unwatched.push((handle.id, handle.future.clone()));
        self.arena.mark_busy();
        handle
    }

    /// Registers completion handling for submissions made so far.
    ///
    /// Must not be called with the variant locked.
    fn watch_submissions(&self) {
        let unwatched = std::mem::take(&mut self.state.lock().unwatched);
        for (id, future) in unwatched {
            let region = self.this.clone();
            future.on_complete(move |outcome| {
                if let Some(region) = region.upgrade() {
                    region.finish_task(id, outcome);
                }
            });
        }
    }

    fn finish_task(&self, id: TaskId, outcome: &TaskOutcome) {
        // The task stays in flight until its follow-up has run, so observers
        // never see an idle region that is about to be disabled.
        let (force_disable, deferred_disable) = {
            let mut state = self.state.lock();
            let Some((_, busy)) = state.in_flight.iter().find(|(task, _)| *task == id).copied() else {
                return;
            };

            if let TaskOutcome::Succeeded(TaskOutput::Captured(snapshot)) = outcome {
                state.snapshot = Some(snapshot.clone());
                state.dirty = false;
            }

            let force_disable = busy == BusyKind::Capturing && !outcome.is_success();
            let deferred_disable = state.in_flight.len() == 1 && state.disable_deferred;
            (force_disable, deferred_disable)
        };

        if force_disable {
            warn!("Region {}: snapshot capture {}, disabling", self.context(), outcome);
            self.apply_disable("force-disabled");
        } else if deferred_disable {
            self.apply_disable("disabled (deferred)");
        }

        self.state.lock().in_flight.retain(|(task, _)| *task != id);
        self.arena.mark_idle();
    }

    fn apply_disable(&self, how: &str) {
        let mut variant = self.variant.lock();
        let subscription = {
            let mut state = self.state.lock();
            if !state.enabled {
                return;
            }
            state.enabled = false;
            state.disable_deferred = false;
            state.subscription.take()
        };

        if let Some(id) = subscription {
            self.arena.events().unsubscribe(id);
        }
        variant.on_disable(self);
        drop(variant);
        self.watch_submissions();
        info!("Region {} {}", self.context(), how);
    }

    fn subscribe_arena_events(&self) {
        let region = self.this.clone();
        let id = self.arena.events().subscribe(move |event| {
            if let Some(region) = region.upgrade() {
                region.handle_arena_event(event);
            }
        });
        if let Some(previous) = self.state.lock().subscription.replace(id) {
            self.arena.events().unsubscribe(previous);
        }
    }

    fn handle_arena_event(&self, event: &ArenaEvent) {
        {
            let mut variant = self.variant.lock();
            if !self.is_enabled() {
                return;
            }
            variant.on_arena_event(self, event);
        }
        self.watch_submissions();
    }

    fn accepts_player(&self, player: &dyn ArenaPlayer) -> bool {
        if player.arena_id() != Some(self.arena.id()) {
            return false;
        }
        let state = self.state.lock();
        state.enabled && state.in_flight.is_empty()
    }

    /// Forwards a player entering the volume to the variant.
    ///
    /// Ignored while disabled or busy, for players of other arenas, and when
    /// the variant does not handle entering players. Returns whether the
    /// event was handled.
    pub fn player_entered(&self, player: &Arc<dyn ArenaPlayer>) -> bool {
        {
            let mut variant = self.variant.lock();
            if !self.accepts_player(player.as_ref()) || !variant.accepts_enter(player.as_ref()) {
                return false;
            }
            variant.on_enter(self, player);
        }
        self.watch_submissions();

        let handlers: Vec<PlayerHandler> = self.handlers.lock().enter.values().cloned().collect();
        for handler in handlers {
            handler(self, player);
        }
        true
    }

    /// Forwards a player leaving the volume to the variant.
    pub fn player_left(&self, player: &Arc<dyn ArenaPlayer>) -> bool {
        {
            let mut variant = self.variant.lock();
            if !self.accepts_player(player.as_ref()) || !variant.accepts_leave(player.as_ref()) {
                return false;
            }
            variant.on_leave(self, player);
        }
        self.watch_submissions();

        let handlers: Vec<PlayerHandler> = self.handlers.lock().leave.values().cloned().collect();
        for handler in handlers {
            handler(self, player);
        }
        true
    }

    /// Adds a handler run after the variant handled an entering player.
    pub fn add_enter_handler(&self, handler: impl Fn(&Region, &Arc<dyn ArenaPlayer>) + Send + Sync + 'static) -> HandlerId {
        let id = HandlerId(self.next_handler.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().enter.insert(id, Arc::new(handler));
        id
    }

    /// Adds a handler run after the variant handled a leaving player.
    pub fn add_leave_handler(&self, handler: impl Fn(&Region, &Arc<dyn ArenaPlayer>) + Send + Sync + 'static) -> HandlerId {
        let id = HandlerId(self.next_handler.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().leave.insert(id, Arc::new(handler));
        id
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock();
        handlers.enter.remove(&id).is_some() || handlers.leave.remove(&id).is_some()
    }

    /// Validates and stores one setting, then reloads the variant's settings.
    ///
    /// A value of the wrong type is rejected and nothing changes.
    pub fn set_setting(&self, key: &str, value: Value) -> Result<(), RegionError> {
        let mut variant = self.variant.lock();
        let settings = {
            let mut state = self.state.lock();
            state.settings.set(self.kind.schema(), key, &value)?;
            state.settings.clone()
        };
        variant.load_settings(self, &settings);
        drop(variant);
        self.watch_submissions();

        info!("Region {}: setting '{}' set to {}", self.context(), key, value);
        Ok(())
    }

    /// Resets one setting to its schema default, then reloads the variant's
    /// settings. The key is no longer persisted by [`Region::document`].
    pub fn clear_setting(&self, key: &str) -> Result<(), RegionError> {
        let mut variant = self.variant.lock();
        let settings = {
            let mut state = self.state.lock();
            state.settings.clear(self.kind.schema(), key)?;
            state.settings.clone()
        };
        variant.load_settings(self, &settings);
        drop(variant);
        self.watch_submissions();

        info!("Region {}: setting '{}' reset to default", self.context(), key);
        Ok(())
    }

    /// Persistable form of the region.
    pub fn document(&self) -> RegionDocument {
        let state = self.state.lock();
        RegionDocument {
            name: self.id.name.to_string(),
            kind: self.kind.type_name().to_string(),
            enabled: state.enabled && !state.disable_deferred,
            bounds: self.bounds().into(),
            settings: state.settings.to_document(),
        }
    }

    /// Disables the region right away, even while busy, and drops extra
    /// handlers. Used when the region or its arena goes away.
    pub fn dispose(&self) {
        self.apply_disable("disposed");
        let mut handlers = self.handlers.lock();
        handlers.enter.clear();
        handlers.leave.clear();
    }

    /// Marks the world inside the volume as changed since the snapshot.
    pub(crate) fn mark_dirty(&self) {
        self.state.lock().dirty = true;
    }

    /// `arena:region` label used in diagnostics.
    pub fn context(&self) -> String {
        format!("{}:{}", self.arena.name(), self.id.name)
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("bounds", &self.bounds())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::SHUT_DOWN;
    use crate::testkit::{TestArena, TestHarness, TestPlayer};
    use crate::types::{BlockData, ChunkCoords};
    use serde_json::json;

    fn floor(harness: &TestHarness, name: &str, kind: VariantKind) -> Arc<Region> {
        harness.world.fill(BlockPos::new(0, 0, 0), BlockPos::new(4, 0, 4), BlockData::of("STONE"));
        let bounds = Bounds::new(BlockPos::new(0, 0, 0), BlockPos::new(4, 0, 4));
        Region::new(name, kind, bounds, harness.arena.clone(), harness.services.clone())
    }

    async fn enabled_floor(harness: &TestHarness, name: &str, kind: VariantKind) -> Arc<Region> {
        let region = floor(harness, name, kind);
        region.init(&BTreeMap::new(), true);
        harness.settle(&region).await;
        region
    }

    #[tokio::test]
    #[should_panic(expected = "initialized twice")]
    async fn test_double_init_panics() {
        let harness = TestHarness::new();
        let region = floor(&harness, "twice", VariantKind::Music);
        region.init(&BTreeMap::new(), false);
        region.init(&BTreeMap::new(), false);
    }

    #[tokio::test]
    async fn test_enable_captures_snapshot_once() {
        let harness = TestHarness::new();
        let region = floor(&harness, "delete", VariantKind::Delete);
        region.init(&BTreeMap::new(), false);
        assert_eq!(region.status(), RegionStatus::Disabled);

        assert!(region.enable());
        assert!(region.enable());
        assert_eq!(region.status(), RegionStatus::Busy(BusyKind::Capturing));
        harness.settle(&region).await;

        assert_eq!(region.status(), RegionStatus::Idle);
        assert_eq!(region.snapshot().unwrap().cell_count(), 25);
        assert_eq!(harness.services.queue.stats().submitted, 1);
        assert_eq!(harness.arena.busy_calls(), (1, 1));

        // A second enable cycle keeps the existing snapshot.
        assert!(region.disable());
        assert!(region.enable());
        assert!(!region.is_busy());
        assert_eq!(harness.services.queue.stats().submitted, 1);
    }

    #[tokio::test]
    async fn test_failed_capture_force_disables() {
        let harness = TestHarness::new();
        harness.world.unload_chunk(ChunkCoords::new(0, 0));
        let region = floor(&harness, "delete", VariantKind::Delete);
        region.init(&BTreeMap::new(), true);
        harness.settle(&region).await;

        assert!(!region.is_enabled());
        assert!(!region.can_restore());
        assert_eq!(harness.arena.busy_calls(), (1, 1));
    }

    #[tokio::test]
    async fn test_cancelled_capture_force_disables() {
        let harness = TestHarness::new();
        harness.services.shutdown();
        let region = floor(&harness, "delete", VariantKind::Delete);
        region.init(&BTreeMap::new(), false);

        assert!(!region.enable());
        assert_eq!(region.status(), RegionStatus::Disabled);
        assert_eq!(harness.services.queue.stats().cancelled, 1);
    }

    #[tokio::test]
    async fn test_disable_is_deferred_while_busy() {
        let harness = TestHarness::gated();
        let region = floor(&harness, "delete", VariantKind::Delete);
        region.init(&BTreeMap::new(), true);
        assert!(region.is_busy());

        assert!(!region.disable());
        assert!(region.is_enabled());

        harness.open_gate();
        harness.settle(&region).await;
        assert!(!region.is_enabled());
        assert!(region.can_restore());
    }

    #[tokio::test]
    async fn test_enable_withdraws_deferred_disable() {
        let harness = TestHarness::gated();
        let region = floor(&harness, "delete", VariantKind::Delete);
        region.init(&BTreeMap::new(), true);

        assert!(!region.disable());
        assert!(region.enable());

        harness.open_gate();
        harness.settle(&region).await;
        assert!(region.is_enabled());
    }

    #[tokio::test]
    async fn test_trigger_requires_enabled_idle_and_untriggered() {
        let harness = TestHarness::new();
        let region = floor(&harness, "delete", VariantKind::Delete);
        region.init(&BTreeMap::new(), false);
        assert!(!region.trigger());

        region.enable();
        // Still capturing.
        assert!(!region.trigger());
        harness.settle(&region).await;

        assert!(region.trigger());
        assert!(!region.trigger());
        harness.settle(&region).await;

        assert!(region.is_triggered());
        assert!(region.is_dirty());
        assert!(harness.world.get(BlockPos::new(2, 0, 2)).is_air());
    }

    #[tokio::test]
    async fn test_untrigger_reuses_pending_future() {
        let harness = TestHarness::new();
        let region = enabled_floor(&harness, "delete", VariantKind::Delete).await;
        assert!(region.untrigger().is_none());

        region.trigger();
        harness.settle(&region).await;

        let first = region.untrigger().unwrap();
        let second = region.untrigger().unwrap();
        assert!(first.same_as(&second));

        assert!(first.wait().await.is_success());
        harness.settle(&region).await;
        assert!(!region.is_triggered());
        assert!(!region.is_dirty());
        assert_eq!(harness.world.get(BlockPos::new(2, 0, 2)), BlockData::of("STONE"));
        assert!(region.untrigger().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_untriggers_share_one_restore() {
        let harness = TestHarness::new();
        let region = enabled_floor(&harness, "delete", VariantKind::Delete).await;
        region.trigger();
        harness.settle(&region).await;

        harness.close_gate();
        let submitted = harness.services.queue.stats().submitted;
        let callers = 8;
        let barrier = Arc::new(std::sync::Barrier::new(callers));
        let tasks: Vec<_> = (0..callers)
            .map(|_| {
                let region = region.clone();
                let barrier = barrier.clone();
                tokio::task::spawn_blocking(move || {
                    barrier.wait();
                    region.untrigger()
                })
            })
            .collect();

        let mut futures = Vec::new();
        for task in tasks {
            futures.push(task.await.unwrap().unwrap());
        }
        assert!(futures.iter().all(|future| future.same_as(&futures[0])));
        assert_eq!(harness.services.queue.stats().submitted, submitted + 1);
        assert!(futures[0].outcome().is_none());

        harness.open_gate();
        assert!(futures[0].wait().await.is_success());
        harness.settle(&region).await;
        assert!(!region.is_triggered());
    }

    #[tokio::test]
    async fn test_failed_untrigger_keeps_triggered() {
        let harness = TestHarness::new();
        let region = enabled_floor(&harness, "delete", VariantKind::Delete).await;
        region.trigger();
        harness.settle(&region).await;

        harness.world.unload_chunk(ChunkCoords::new(0, 0));
        let outcome = region.untrigger().unwrap().wait().await;
        harness.settle(&region).await;

        assert!(!outcome.is_success());
        assert!(region.is_triggered());

        harness.world.load_chunk(ChunkCoords::new(0, 0));
        assert!(region.untrigger().unwrap().wait().await.is_success());
        harness.settle(&region).await;
        assert!(!region.is_triggered());
    }

    #[tokio::test]
    async fn test_restore_without_snapshot_fails() {
        let harness = TestHarness::new();
        let region = floor(&harness, "music", VariantKind::Music);
        region.init(&BTreeMap::new(), true);

        let outcome = region.restore(false).outcome().unwrap();
        assert!(outcome.reason().unwrap().contains("no snapshot"));
        assert_eq!(harness.services.queue.stats().submitted, 0);
    }

    #[tokio::test]
    async fn test_restore_skipped_while_arena_restoring() {
        let harness = TestHarness::new();
        let region = enabled_floor(&harness, "delete", VariantKind::Delete).await;
        harness.arena.set_restoring(true);

        assert_eq!(region.restore(false).outcome(), Some(TaskOutcome::Cancelled(REDUNDANT.to_string())));
        assert!(region.restore(true).wait().await.is_success());
    }

    #[tokio::test]
    async fn test_restore_after_shutdown_is_cancelled() {
        let harness = TestHarness::new();
        let region = enabled_floor(&harness, "delete", VariantKind::Delete).await;
        harness.services.shutdown();

        let outcome = region.restore(false).outcome().unwrap();
        assert_eq!(outcome, TaskOutcome::Cancelled(SHUT_DOWN.to_string()));
        assert!(!region.is_busy());
        assert!(region.is_enabled());
    }

    #[tokio::test]
    async fn test_player_events_ignored_unless_enabled_idle_same_arena() {
        let harness = TestHarness::new();
        let region = floor(&harness, "music", VariantKind::Music);
        harness.sounds.register("theme");
        region.init(&BTreeMap::from([("resource-sound".to_string(), json!("theme"))]), false);

        let player = harness.player();
        assert!(!region.player_entered(&player));

        region.enable();
        assert!(region.player_entered(&player));

        let stranger: Arc<dyn ArenaPlayer> = Arc::new(TestPlayer::in_arena(Some(TestArena::new("other").id())));
        assert!(!region.player_entered(&stranger));
    }

    #[tokio::test]
    async fn test_extra_handlers_run_after_variant() {
        let harness = TestHarness::new();
        let region = floor(&harness, "music", VariantKind::Music);
        harness.sounds.register("theme");
        region.init(&BTreeMap::from([("resource-sound".to_string(), json!("theme"))]), true);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let enter = region.add_enter_handler(move |region, _| log.lock().push(format!("enter:{}", region.name())));
        let log = seen.clone();
        region.add_leave_handler(move |region, _| log.lock().push(format!("leave:{}", region.name())));

        let player = harness.player();
        region.player_entered(&player);
        region.player_left(&player);
        assert!(region.remove_handler(enter));
        region.player_entered(&player);

        assert_eq!(*seen.lock(), vec!["enter:music", "leave:music"]);
    }

    #[tokio::test]
    async fn test_set_setting_validates_type() {
        let harness = TestHarness::new();
        let region = floor(&harness, "damage", VariantKind::DamageInterval);
        region.init(&BTreeMap::new(), false);

        let err = region.set_setting("interval", json!("soon")).unwrap_err();
        assert!(matches!(err, RegionError::SettingsType { .. }));
        assert_eq!(region.settings().integer("interval"), 1);

        region.set_setting("interval", json!(3)).unwrap();
        assert_eq!(region.settings().integer("interval"), 3);
        assert_eq!(region.document().settings["interval"], json!(3));
    }

    #[tokio::test]
    async fn test_clear_setting_restores_default() {
        let harness = TestHarness::new();
        let region = floor(&harness, "damage", VariantKind::DamageInterval);
        region.init(&BTreeMap::from([("interval".to_string(), json!(4))]), false);
        assert_eq!(region.document().settings["interval"], json!(4));

        region.clear_setting("interval").unwrap();
        assert_eq!(region.settings().integer("interval"), 1);
        assert!(!region.document().settings.contains_key("interval"));
        assert!(matches!(
            region.clear_setting("speed"),
            Err(RegionError::UnknownSetting(_))
        ));

        let reloaded = Region::from_document(&region.document(), harness.arena.clone(), harness.services.clone()).unwrap();
        assert_eq!(reloaded.settings().integer("interval"), 1);
        assert_eq!(reloaded.document(), region.document());
    }

    #[tokio::test]
    async fn test_redefine_rejected_while_busy() {
        let harness = TestHarness::gated();
        let region = floor(&harness, "delete", VariantKind::Delete);
        region.init(&BTreeMap::new(), true);
        let old = region.bounds();

        let wider = Bounds::new(BlockPos::new(0, 0, 0), BlockPos::new(5, 0, 5));
        assert!(matches!(region.redefine(wider), Err(RegionError::Busy(_))));
        assert_eq!(region.bounds(), old);

        harness.open_gate();
        harness.settle(&region).await;
        assert_eq!(region.snapshot().unwrap().bounds(), old);
    }

    #[tokio::test]
    async fn test_redefine_recaptures_new_volume() {
        let harness = TestHarness::new();
        let region = enabled_floor(&harness, "delete", VariantKind::Delete).await;
        region.trigger();
        harness.settle(&region).await;
        let submitted = harness.services.queue.stats().submitted;

        let wider = Bounds::new(BlockPos::new(0, 0, 0), BlockPos::new(5, 0, 5));
        region.redefine(wider).unwrap();
        assert_eq!(region.status(), RegionStatus::Busy(BusyKind::Capturing));
        assert!(!region.is_triggered());
        assert!(!region.is_dirty());
        assert!(region.contains(BlockPos::new(5, 0, 5)));
        harness.settle(&region).await;

        let snapshot = region.snapshot().unwrap();
        assert_eq!(snapshot.bounds(), wider);
        assert_eq!(snapshot.cell_count(), 36);
        assert_eq!(harness.services.queue.stats().submitted, submitted + 1);
        assert_eq!(region.document().bounds.to_bounds(), wider);
    }

    #[tokio::test]
    async fn test_redefine_disabled_region_drops_snapshot() {
        let harness = TestHarness::new();
        let region = enabled_floor(&harness, "delete", VariantKind::Delete).await;
        region.disable();
        let submitted = harness.services.queue.stats().submitted;

        region
            .redefine(Bounds::new(BlockPos::new(1, 0, 1), BlockPos::new(2, 0, 2)))
            .unwrap();
        assert!(!region.can_restore());
        assert!(!region.is_busy());
        assert_eq!(harness.services.queue.stats().submitted, submitted);

        // The next enable captures the new volume.
        region.enable();
        harness.settle(&region).await;
        assert_eq!(region.snapshot().unwrap().cell_count(), 4);
    }

    #[tokio::test]
    async fn test_listening_variant_unsubscribes_on_disable() {
        let harness = TestHarness::new();
        let region = enabled_floor(&harness, "spleef", VariantKind::SpleefFloor).await;
        assert_eq!(harness.arena.events().handler_count(), 1);

        region.disable();
        assert_eq!(harness.arena.events().handler_count(), 0);

        region.enable();
        region.dispose();
        assert_eq!(harness.arena.events().handler_count(), 0);
        assert!(!region.is_enabled());
    }

    #[tokio::test]
    async fn test_document_round_trip() {
        let harness = TestHarness::new();
        let document = RegionDocument::new(
            "lava",
            "damageinterval",
            Bounds::new(BlockPos::new(1, 2, 3), BlockPos::new(4, 5, 6)),
        )
        .with_setting("damage", json!(2.5))
        .disabled();

        let region = Region::from_document(&document, harness.arena.clone(), harness.services.clone()).unwrap();
        assert_eq!(region.document(), document);

        let unknown = RegionDocument::new("x", "portal", Bounds::new(BlockPos::new(0, 0, 0), BlockPos::new(0, 0, 0)));
        assert!(matches!(
            Region::from_document(&unknown, harness.arena.clone(), harness.services.clone()),
            Err(RegionError::UnknownRegionType(_))
        ));
    }
}
