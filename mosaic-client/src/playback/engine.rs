//! Playback synchronization engine
//!
//! Per-session state machine: Idle → Loading(take) → Ready → Playing,
//! cycling the active take 1→2→3→1 on a fixed interval. All loaded
//! elements keep playing regardless of which take is visually active;
//! only opacity toggles, so a take switch never rebuffers.
//!
//! Three timers (drift correction, take cycle, store reconciliation)
//! plus one bounded fallback sleep run concurrently against this
//! engine. Every timer body is guarded by an epoch check: teardown
//! bumps the epoch, turning any in-flight callback into a no-op. The
//! "started" flag is only flipped under the state lock after re-checking
//! the epoch, so a drift tick firing mid-start cannot corrupt it.

use crate::playback::element::{MediaElement, Readiness};
use crate::session::MediaStorage;
use crate::store::GridStateStore;
use mosaic_common::config::MosaicConfig;
use mosaic_common::events::MosaicEvent;
use mosaic_common::model::{GridState, TakeIndex};
use mosaic_common::{Error, Result, SLOT_COUNT, TAKE_COUNT};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Engine lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Resolving URLs / waiting for buffered readiness
    Loading,
    /// Every eligible element reported full readiness; start imminent
    Ready,
    Playing,
}

struct SyncState {
    phase: Phase,
    active_take: TakeIndex,
    /// Coordinated start already issued for the current reveal
    started: bool,
    /// Bounded fallback consumed for the current not-yet-started state
    fallback_used: bool,
    /// Resolved playable URLs by (slot, take); re-entering a take never
    /// re-resolves a known URL
    url_cache: HashMap<(usize, TakeIndex), String>,
    /// Take groups that have been issued a start; only these receive
    /// drift correction, so a cycle re-arming the start flag never
    /// strands the still-playing background groups
    live_takes: HashSet<TakeIndex>,
    /// Terminal: every entry point no-ops once the session is torn down
    torn_down: bool,
}

/// Handles of the engine's periodic tasks; aborted together on teardown
pub struct SyncHandles {
    drift: JoinHandle<()>,
    cycle: JoinHandle<()>,
    reconcile: JoinHandle<()>,
    watch: JoinHandle<()>,
}

impl SyncHandles {
    pub fn abort_all(&self) {
        self.drift.abort();
        self.cycle.abort();
        self.reconcile.abort();
        self.watch.abort();
    }
}

/// Keeps up to 48 media elements in lockstep across takes
pub struct SyncEngine {
    /// 16 slots × 3 takes of host-owned elements
    elements: Vec<Vec<Arc<dyn MediaElement>>>,
    storage: Arc<dyn MediaStorage>,
    store: Arc<GridStateStore>,
    config: MosaicConfig,
    state: Mutex<SyncState>,
    /// Bumped on teardown; stale timer callbacks check it and bail
    epoch: AtomicU64,
    fallback_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    pub fn new(
        elements: Vec<Vec<Arc<dyn MediaElement>>>,
        storage: Arc<dyn MediaStorage>,
        store: Arc<GridStateStore>,
        config: MosaicConfig,
    ) -> Result<Self> {
        if elements.len() != SLOT_COUNT || elements.iter().any(|takes| takes.len() != TAKE_COUNT) {
            return Err(Error::Validation(format!(
                "element grid must be {SLOT_COUNT} slots x {TAKE_COUNT} takes"
            )));
        }
        let engine = Self {
            elements,
            storage,
            store,
            config,
            state: Mutex::new(SyncState {
                phase: Phase::Idle,
                active_take: TakeIndex::One,
                started: false,
                fallback_used: false,
                url_cache: HashMap::new(),
                live_takes: HashSet::new(),
                torn_down: false,
            }),
            epoch: AtomicU64::new(0),
            fallback_task: Mutex::new(None),
        };
        engine.apply_visibility(TakeIndex::One);
        Ok(engine)
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().unwrap().phase
    }

    pub fn active_take(&self) -> TakeIndex {
        self.state.lock().unwrap().active_take
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Kick off the session: resolve sources for the active and next
    /// take, arm the bounded fallback, and attempt a coordinated start.
    pub async fn start(self: &Arc<Self>) {
        self.refresh_sources().await;
        self.arm_fallback();
        self.coordinated_start().await;
    }

    /// Resolve playable URLs for the active take and the next one in
    /// cycle order, assigning them to the matching elements. Cached
    /// (slot, take) pairs are never re-resolved.
    pub async fn refresh_sources(&self) {
        let epoch = self.epoch();
        let grid = self.store.load().await;

        let active = {
            let mut state = self.state.lock().unwrap();
            if state.torn_down {
                return;
            }
            if state.phase == Phase::Idle {
                state.phase = Phase::Loading;
            }
            state.active_take
        };

        for take in [active, active.next()] {
            for slot in 0..SLOT_COUNT {
                if let Some(url) = self.resolve_one(&grid, slot, take, epoch).await {
                    self.elements[slot][take.as_usize()].set_source(&url);
                }
            }
        }
    }

    async fn resolve_one(
        &self,
        grid: &GridState,
        slot: usize,
        take: TakeIndex,
        epoch: u64,
    ) -> Option<String> {
        // Slots contributed through the single-video path have a
        // canonical ref but no takes; surface it on take 1.
        let media = grid.slots[slot]
            .takes
            .get(take)
            .or(if take == TakeIndex::One {
                grid.slots[slot].video.as_ref()
            } else {
                None
            })?
            .clone();

        if let Some(url) = self.state.lock().unwrap().url_cache.get(&(slot, take)) {
            return Some(url.clone());
        }

        let resolved = match self.storage.resolve(&media).await {
            Ok(url) => url,
            Err(e) => {
                warn!("URL resolve failed for slot {} take {:?}: {}", slot, take, e);
                None
            }
        };
        // A teardown may have landed while we were resolving
        if self.epoch() != epoch {
            return None;
        }
        let url = resolved?;
        self.state
            .lock()
            .unwrap()
            .url_cache
            .insert((slot, take), url.clone());
        Some(url)
    }

    /// Coordinated start: once **all** eligible elements report full
    /// readiness, reset every one to position zero, issue play as one
    /// batch, and run the intra-take alignment pass. Returns whether
    /// playback was started by this call.
    pub async fn coordinated_start(&self) -> bool {
        let epoch = self.epoch();
        let eligible = self.eligible();
        if eligible.is_empty() {
            return false;
        }

        if !eligible
            .iter()
            .all(|(_, _, e)| e.readiness() >= Readiness::EnoughData)
        {
            return false;
        }

        {
            let mut state = self.state.lock().unwrap();
            if state.torn_down || state.started || self.epoch.load(Ordering::Acquire) != epoch {
                return false;
            }
            state.started = true;
            state.phase = Phase::Ready;
        }

        for (_, _, element) in &eligible {
            element.seek(0.0);
        }
        for (_, _, element) in &eligible {
            element.play();
        }
        self.align_take_groups();
        self.cancel_fallback();
        {
            let mut state = self.state.lock().unwrap();
            for (take, _, _) in &eligible {
                state.live_takes.insert(*take);
            }
            state.phase = Phase::Playing;
        }

        let take = self.active_take();
        debug!("Coordinated start: {} elements, take {:?}", eligible.len(), take);
        self.store.bus().emit_lossy(MosaicEvent::PlaybackStarted {
            take,
            full_readiness: true,
            element_count: eligible.len(),
            timestamp: chrono::Utc::now(),
        });
        true
    }

    /// Bounded-fallback start: rather than stalling past the readiness
    /// deadline, start whichever eligible elements meet the looser bar.
    /// Applied at most once per not-yet-started state.
    pub fn fallback_start(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.torn_down || state.started || state.fallback_used {
                return;
            }
            state.started = true;
            state.fallback_used = true;
            state.phase = Phase::Playing;
        }

        let startable: Vec<_> = self
            .eligible()
            .into_iter()
            .filter(|(_, _, e)| e.readiness() >= Readiness::FutureData)
            .collect();
        for (_, _, element) in &startable {
            element.seek(0.0);
        }
        for (_, _, element) in &startable {
            element.play();
        }
        self.align_take_groups();
        {
            let mut state = self.state.lock().unwrap();
            for (take, _, _) in &startable {
                state.live_takes.insert(*take);
            }
        }

        let take = self.active_take();
        warn!(
            "Readiness deadline passed; fallback start with {} of {} elements",
            startable.len(),
            self.eligible().len()
        );
        self.store.bus().emit_lossy(MosaicEvent::PlaybackStarted {
            take,
            full_readiness: false,
            element_count: startable.len(),
            timestamp: chrono::Utc::now(),
        });
    }

    /// One drift-correction pass over every live take group: snap any
    /// follower whose offset from the group's reference exceeds the
    /// tolerance, and resume anything found unexpectedly paused. Groups
    /// never started (including the reveal still waiting on its
    /// coordinated start after a cycle) are left alone.
    pub fn drift_tick(&self) {
        let live = self.state.lock().unwrap().live_takes.clone();
        if live.is_empty() {
            return;
        }
        for take in TakeIndex::ALL {
            if !live.contains(&take) {
                continue;
            }
            let group: Vec<_> = self
                .eligible()
                .into_iter()
                .filter(|(t, _, _)| *t == take)
                .collect();
            let Some((_, _, reference)) = group.first() else {
                continue;
            };
            let reference_time = reference.current_time();
            for (_, _, follower) in group.iter().skip(1) {
                let delta = follower.current_time() - reference_time;
                if delta.abs() > self.config.drift_tolerance_s {
                    follower.seek(reference_time);
                }
                if follower.is_paused() {
                    follower.play();
                }
            }
            if reference.is_paused() {
                reference.play();
            }
        }
    }

    /// Advance the active take (1→2→3→1), toggle visibility, re-arm the
    /// coordinated start for the newly revealed element set, and preload
    /// the take after next.
    pub async fn cycle_tick(self: &Arc<Self>) {
        let (from, to) = {
            let mut state = self.state.lock().unwrap();
            if state.torn_down {
                return;
            }
            let from = state.active_take;
            let to = from.next();
            state.active_take = to;
            state.started = false;
            state.fallback_used = false;
            state.phase = Phase::Loading;
            (from, to)
        };

        self.apply_visibility(to);
        self.store.bus().emit_lossy(MosaicEvent::TakeCycled {
            from,
            to,
            timestamp: chrono::Utc::now(),
        });

        self.arm_fallback();
        // Resolves the revealed take and the one after next
        self.refresh_sources().await;
        self.coordinated_start().await;
    }

    /// Tear down the session: all timers die together and any in-flight
    /// callback against the old epoch becomes a no-op.
    pub fn teardown(&self, handles: &SyncHandles) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.cancel_fallback();
        handles.abort_all();
        let mut state = self.state.lock().unwrap();
        state.phase = Phase::Idle;
        state.started = false;
        state.live_takes.clear();
        state.torn_down = true;
    }

    /// Spawn the periodic tasks: drift correction, take cycling, store
    /// reconciliation, and the store-change watcher that re-derives
    /// URLs when another context writes the grid.
    pub fn spawn_timers(self: &Arc<Self>) -> SyncHandles {
        let epoch = self.epoch();

        let drift = {
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                let mut ticker =
                    tokio::time::interval(Duration::from_millis(engine.config.drift_tick_ms));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if engine.epoch() != epoch {
                        return;
                    }
                    engine.drift_tick();
                }
            })
        };

        let cycle = {
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                let mut ticker =
                    tokio::time::interval(Duration::from_millis(engine.config.take_cycle_ms));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                // First tick fires immediately; skip it so the initial
                // take gets its full display interval.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if engine.epoch() != epoch {
                        return;
                    }
                    engine.cycle_tick().await;
                }
            })
        };

        let reconcile = self
            .store
            .spawn_reconciler(Duration::from_millis(self.config.reconcile_interval_ms));

        let watch = {
            let engine = Arc::clone(self);
            let mut rx = self.store.subscribe();
            tokio::spawn(async move {
                while let Ok(event) = rx.recv().await {
                    if engine.epoch() != epoch {
                        return;
                    }
                    if matches!(event, MosaicEvent::GridChanged { .. }) {
                        engine.refresh_sources().await;
                        if !engine.state.lock().unwrap().started {
                            engine.coordinated_start().await;
                        }
                    }
                }
            })
        };

        SyncHandles {
            drift,
            cycle,
            reconcile,
            watch,
        }
    }

    fn arm_fallback(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        let epoch = self.epoch();
        let wait = Duration::from_millis(self.config.ready_timeout_ms);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            if engine.epoch() != epoch {
                return;
            }
            engine.fallback_start();
        });
        if let Some(previous) = self.fallback_task.lock().unwrap().replace(handle) {
            previous.abort();
        }
    }

    fn cancel_fallback(&self) {
        if let Some(handle) = self.fallback_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Elements with a resolved source, tagged (take, slot)
    fn eligible(&self) -> Vec<(TakeIndex, usize, Arc<dyn MediaElement>)> {
        let mut out = Vec::new();
        for (slot, takes) in self.elements.iter().enumerate() {
            for take in TakeIndex::ALL {
                let element = &takes[take.as_usize()];
                if element.source().is_some() {
                    out.push((take, slot, Arc::clone(element)));
                }
            }
        }
        out
    }

    /// Per-group alignment pass: first element of each take group is
    /// the time reference, every other member snaps to it
    fn align_take_groups(&self) {
        for take in TakeIndex::ALL {
            let group: Vec<_> = self
                .eligible()
                .into_iter()
                .filter(|(t, _, _)| *t == take)
                .collect();
            if let Some((_, _, reference)) = group.first() {
                let t = reference.current_time();
                for (_, _, follower) in group.iter().skip(1) {
                    follower.seek(t);
                }
            }
        }
    }

    fn apply_visibility(&self, active: TakeIndex) {
        for takes in &self.elements {
            for take in TakeIndex::ALL {
                takes[take.as_usize()].set_visible(take == active);
            }
        }
    }
}
