//! In-memory collaborators shared by the crate's tests.

use crate::arena::{Arena, ArenaDirectory, ArenaEvents, ArenaPlayer, Placement, SoundPlayer};
use crate::config::EngineConfig;
use crate::error::WorldError;
use crate::region::Region;
use crate::services::RegionServices;
use crate::types::{ArenaId, BlockData, BlockPos, ChunkCoords, Location, PlayerId, Vec3};
use crate::world::{MemoryWorld, WorldHandle};
use dashmap::{DashMap, DashSet};
use parking_lot::{Condvar, Mutex};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// A [`MemoryWorld`] whose block reads and writes block until the gate opens.
///
/// Direct helpers (`fill`, `get`, ...) reach the inner world and never block.
pub struct GatedWorld {
    inner: MemoryWorld,
    open: Mutex<bool>,
    opened: Condvar,
    entered: Notify,
}

impl GatedWorld {
    pub fn closed() -> Self {
        Self::with_gate(false)
    }

    pub fn opened() -> Self {
        Self::with_gate(true)
    }

    fn with_gate(open: bool) -> Self {
        Self {
            inner: MemoryWorld::new(),
            open: Mutex::new(open),
            opened: Condvar::new(),
            entered: Notify::new(),
        }
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }

    /// Makes later reads and writes wait again.
    pub fn close(&self) {
        *self.open.lock() = false;
    }

    pub fn inner(&self) -> &MemoryWorld {
        &self.inner
    }

    /// Resolves once some task has reached the gate.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    fn pass(&self) {
        self.entered.notify_one();
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
    }
}

impl Deref for GatedWorld {
    type Target = MemoryWorld;

    fn deref(&self) -> &MemoryWorld {
        &self.inner
    }
}

impl WorldHandle for GatedWorld {
    fn read_block(&self, pos: BlockPos) -> Result<BlockData, WorldError> {
        self.pass();
        self.inner.read_block(pos)
    }

    fn write_block(&self, pos: BlockPos, block: &BlockData) -> Result<(), WorldError> {
        self.pass();
        self.inner.write_block(pos, block)
    }

    fn is_chunk_loaded(&self, coords: ChunkCoords) -> bool {
        self.inner.is_chunk_loaded(coords)
    }

    fn spawn_falling_block(&self, pos: BlockPos, block: &BlockData) -> Result<(), WorldError> {
        self.inner.spawn_falling_block(pos, block)
    }
}

pub struct TestArena {
    id: ArenaId,
    name: String,
    busy: AtomicU64,
    idle: AtomicU64,
    restoring: AtomicBool,
    events: ArenaEvents,
    forwarded: Mutex<Vec<(PlayerId, Option<Placement>)>>,
}

impl TestArena {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            id: ArenaId::new(),
            name: name.to_string(),
            busy: AtomicU64::new(0),
            idle: AtomicU64::new(0),
            restoring: AtomicBool::new(false),
            events: ArenaEvents::new(),
            forwarded: Mutex::new(Vec::new()),
        })
    }

    /// `(mark_busy, mark_idle)` call counts.
    pub fn busy_calls(&self) -> (u64, u64) {
        (self.busy.load(Ordering::SeqCst), self.idle.load(Ordering::SeqCst))
    }

    pub fn set_restoring(&self, restoring: bool) {
        self.restoring.store(restoring, Ordering::SeqCst);
    }

    pub fn forwarded(&self) -> Vec<(PlayerId, Option<Placement>)> {
        self.forwarded.lock().clone()
    }
}

impl Arena for TestArena {
    fn id(&self) -> ArenaId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn mark_busy(&self) {
        self.busy.fetch_add(1, Ordering::SeqCst);
    }

    fn mark_idle(&self) {
        self.idle.fetch_add(1, Ordering::SeqCst);
    }

    fn is_restoring(&self) -> bool {
        self.restoring.load(Ordering::SeqCst)
    }

    fn events(&self) -> &ArenaEvents {
        &self.events
    }

    fn forward_player(&self, player: &dyn ArenaPlayer, placement: Option<Placement>) {
        self.forwarded.lock().push((player.id(), placement));
    }
}

#[derive(Default)]
pub struct TestArenas {
    arenas: DashMap<ArenaId, Arc<TestArena>>,
}

impl TestArenas {
    pub fn add(&self, arena: &Arc<TestArena>) {
        self.arenas.insert(arena.id(), arena.clone());
    }
}

impl ArenaDirectory for TestArenas {
    fn arena(&self, id: ArenaId) -> Option<Arc<dyn Arena>> {
        self.arenas.get(&id).map(|entry| entry.value().clone() as Arc<dyn Arena>)
    }
}

pub struct TestPlayer {
    id: PlayerId,
    arena: Option<ArenaId>,
    online: AtomicBool,
    dead: AtomicBool,
    health: Mutex<f64>,
    max_health: f64,
    location: Mutex<Location>,
    velocity: Vec3,
}

impl TestPlayer {
    pub fn in_arena(arena: Option<ArenaId>) -> Self {
        Self {
            id: PlayerId::new(),
            arena,
            online: AtomicBool::new(true),
            dead: AtomicBool::new(false),
            health: Mutex::new(20.0),
            max_health: 20.0,
            location: Mutex::new(Location::new(0.0, 0.0, 0.0)),
            velocity: Vec3::default(),
        }
    }

    pub fn with_health(health: f64, max_health: f64) -> Self {
        let player = Self::in_arena(None);
        *player.health.lock() = health;
        Self { max_health, ..player }
    }

    pub fn at(self, location: Location) -> Self {
        *self.location.lock() = location;
        self
    }

    pub fn moving(self, velocity: Vec3) -> Self {
        Self { velocity, ..self }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl ArenaPlayer for TestPlayer {
    fn id(&self) -> PlayerId {
        self.id
    }

    fn arena_id(&self) -> Option<ArenaId> {
        self.arena
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    fn health(&self) -> f64 {
        *self.health.lock()
    }

    fn max_health(&self) -> f64 {
        self.max_health
    }

    fn set_health(&self, health: f64) {
        *self.health.lock() = health;
    }

    fn damage(&self, amount: f64) {
        let mut health = self.health.lock();
        *health = (*health - amount).max(0.0);
        if *health == 0.0 {
            self.dead.store(true, Ordering::SeqCst);
        }
    }

    fn location(&self) -> Location {
        *self.location.lock()
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }
}

#[derive(Default)]
pub struct TestSounds {
    known: DashSet<String>,
    playing: DashMap<PlayerId, (Vec<String>, bool)>,
}

impl TestSounds {
    pub fn register(&self, name: &str) {
        self.known.insert(name.to_string());
    }

    /// Playlist and loop flag currently playing for `player`.
    pub fn playing(&self, player: PlayerId) -> Option<(Vec<String>, bool)> {
        self.playing.get(&player).map(|entry| entry.value().clone())
    }
}

impl SoundPlayer for TestSounds {
    fn has_sound(&self, name: &str) -> bool {
        self.known.contains(name)
    }

    fn is_playing(&self, player: PlayerId) -> bool {
        self.playing.contains_key(&player)
    }

    fn play(&self, player: PlayerId, sounds: &[String], looping: bool) {
        self.playing.insert(player, (sounds.to_vec(), looping));
    }

    fn stop(&self, player: PlayerId) {
        self.playing.remove(&player);
    }
}

/// One arena with its own world, queue and collaborators.
pub struct TestHarness {
    pub world: Arc<GatedWorld>,
    pub arena: Arc<TestArena>,
    pub arenas: Arc<TestArenas>,
    pub sounds: Arc<TestSounds>,
    pub services: Arc<RegionServices>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::over(GatedWorld::opened())
    }

    /// World access blocks until [`TestHarness::open_gate`].
    pub fn gated() -> Self {
        Self::over(GatedWorld::closed())
    }

    fn over(world: GatedWorld) -> Self {
        let world = Arc::new(world);
        let arena = TestArena::new("test");
        let arenas = Arc::new(TestArenas::default());
        arenas.add(&arena);
        let sounds = Arc::new(TestSounds::default());
        let services = RegionServices::new(world.clone(), arenas.clone(), sounds.clone(), &EngineConfig::default());

        Self {
            world,
            arena,
            arenas,
            sounds,
            services,
        }
    }

    pub fn open_gate(&self) {
        self.world.open();
    }

    pub fn close_gate(&self) {
        self.world.close();
    }

    /// A player standing in this harness' arena.
    pub fn player(&self) -> Arc<dyn ArenaPlayer> {
        Arc::new(TestPlayer::in_arena(Some(self.arena.id())))
    }

    /// Waits until `region` has no build work in flight.
    pub async fn settle(&self, region: &Region) {
        for _ in 0..500 {
            if !region.is_busy() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("region {} never settled", region.name());
    }
}
