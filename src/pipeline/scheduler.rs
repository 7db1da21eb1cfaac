// src/pipeline/scheduler.rs

//! Periodic check cycles over all tracked novels.
//!
//! - At most one cycle runs at a time. A trigger that fires while a cycle is
//!   in flight is coalesced into it, not queued.
//! - Within a cycle, novels are checked through a bounded worker pool with a
//!   fixed delay after each check.
//! - Every check, scheduled or manual, holds a per-novel lock, so two
//!   writers never interleave on the same snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tokio::sync::{OwnedMutexGuard, broadcast, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::models::{SchedulerConfig, UpdateEvent};
use crate::pipeline::check::{CheckOutcome, UpdateChecker};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Per-novel state within the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntityState {
    #[default]
    Idle,
    InFlight,
    Updated,
    Unchanged,
    Failed,
}

/// Summary of one executed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub total: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub initialized: usize,
    pub failed: usize,
    /// Not visited because shutdown was requested
    pub skipped: usize,
    pub delivered: usize,
    pub elapsed: Duration,
}

impl CycleReport {
    fn record(&mut self, result: &Result<CheckOutcome>) {
        match result {
            Ok(CheckOutcome::Initialized(_)) => self.initialized += 1,
            Ok(CheckOutcome::Unchanged { redelivered }) => {
                self.unchanged += 1;
                self.delivered += redelivered.map_or(0, |r| r.delivered);
            }
            Ok(CheckOutcome::Updated { report, .. }) => {
                self.updated += 1;
                self.delivered += report.map_or(0, |r| r.delivered);
            }
            Err(_) => self.failed += 1,
        }
    }
}

/// Result of a cycle trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleTrigger {
    Ran(CycleReport),
    /// Another cycle was already running
    Coalesced,
}

/// Exclusive hold on one novel. Dropping it releases the novel and forgets
/// its lock once nobody else is waiting on it.
pub struct EntityGuard<'a> {
    scheduler: &'a Scheduler,
    novel_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for EntityGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self
            .scheduler
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Clones are only handed out under this mutex
        if locks
            .get(&self.novel_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.novel_id);
        }
    }
}

/// Clears the in-flight flag when the cycle ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Scheduler {
    checker: UpdateChecker,
    config: SchedulerConfig,
    in_flight: AtomicBool,
    stopping: AtomicBool,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    states: Mutex<HashMap<String, EntityState>>,
    events: broadcast::Sender<UpdateEvent>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, checker: UpdateChecker) -> Self {
        if config.quick_check {
            log::warn!(
                "Quick check enabled: only the unconditional latest chapter is compared, \
                 paid chapters will be announced like free ones"
            );
        }
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            checker,
            config,
            in_flight: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            locks: Mutex::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn checker(&self) -> &UpdateChecker {
        &self.checker
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Receive every update event detected from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.events.subscribe()
    }

    /// State of a novel in the current or last cycle.
    pub fn state(&self, novel_id: &str) -> EntityState {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(novel_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Stop visiting new novels; checks already in flight finish.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Run one cycle over all tracked novels, or coalesce into the running one.
    ///
    /// Fails only when the tracked set cannot be read.
    pub async fn run_cycle(&self) -> Result<CycleTrigger> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::info!("Check cycle already in progress, coalescing trigger");
            return Ok(CycleTrigger::Coalesced);
        }
        let _in_flight = InFlight(&self.in_flight);

        let started = Instant::now();
        let ids = self.checker.store().list_all_tracked_ids().await.map_err(|e| {
            log::error!("Aborting cycle, tracked novels unavailable: {e}");
            e
        })?;

        log::info!("Starting check cycle for {} novels", ids.len());
        {
            let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
            states.clear();
            states.extend(ids.iter().map(|id| (id.clone(), EntityState::Idle)));
        }

        let mut report = CycleReport {
            total: ids.len(),
            ..CycleReport::default()
        };
        let delay = self.config.request_delay();
        let concurrency = self.config.max_concurrent.max(1);

        let mut checks = stream::iter(ids)
            .map(|novel_id| async move {
                if self.is_stopping() {
                    return None;
                }
                let result = self.check_entity(&novel_id).await;
                match &result {
                    Err(e) if e.is_transient() => log::warn!("Check failed for {novel_id}: {e}"),
                    Err(e) => log::error!("Check failed for {novel_id}: {e}"),
                    Ok(_) => {}
                }
                if !delay.is_zero() && !self.is_stopping() {
                    tokio::time::sleep(delay).await;
                }
                Some(result)
            })
            .buffer_unordered(concurrency);

        while let Some(result) = checks.next().await {
            match result {
                Some(result) => report.record(&result),
                None => report.skipped += 1,
            }
        }

        report.elapsed = started.elapsed();
        log::info!(
            "Cycle finished in {:.1}s: {} updated, {} unchanged, {} initialized, {} failed, {} skipped",
            report.elapsed.as_secs_f64(),
            report.updated,
            report.unchanged,
            report.initialized,
            report.failed,
            report.skipped
        );
        Ok(CycleTrigger::Ran(report))
    }

    /// Check one novel out of band. Waits for any check of the same novel
    /// already in progress.
    pub async fn check_now(&self, novel_id: &str) -> Result<CheckOutcome> {
        log::info!("Manual check requested for {novel_id}");
        self.check_entity(novel_id).await
    }

    /// Hold the novel's lock; any check of it waits until the guard drops.
    pub async fn lock_entity(&self, novel_id: &str) -> EntityGuard<'_> {
        let guard = self.entity_lock(novel_id).lock_owned().await;
        EntityGuard {
            scheduler: self,
            novel_id: novel_id.to_string(),
            guard: Some(guard),
        }
    }

    async fn check_entity(&self, novel_id: &str) -> Result<CheckOutcome> {
        let _held = self.lock_entity(novel_id).await;

        self.set_state(novel_id, EntityState::InFlight);
        let result = self.checker.check(novel_id).await;
        self.set_state(
            novel_id,
            match &result {
                Ok(CheckOutcome::Updated { .. }) => EntityState::Updated,
                Ok(_) => EntityState::Unchanged,
                Err(_) => EntityState::Failed,
            },
        );

        if let Some(event) = result.as_ref().ok().and_then(CheckOutcome::event) {
            // No receivers is fine
            let _ = self.events.send(event.clone());
        }
        result
    }

    fn entity_lock(&self, novel_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(novel_id.to_string())
            .or_default()
            .clone()
    }

    fn set_state(&self, novel_id: &str, state: EntityState) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(novel_id.to_string(), state);
    }

    /// Trigger cycles on the configured interval until `shutdown` fires,
    /// then let the running cycle finish its in-flight checks. The first
    /// cycle starts one interval after startup.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.interval();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles = JoinSet::new();

        log::info!(
            "Scheduler started: every {}s, {} concurrent, {}ms between checks",
            self.config.interval_secs,
            self.config.max_concurrent,
            self.config.request_delay_ms
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    while cycles.try_join_next().is_some() {}
                    let scheduler = Arc::clone(&self);
                    cycles.spawn(async move {
                        if let Err(e) = scheduler.run_cycle().await {
                            log::error!("Cycle failed: {e}");
                        }
                    });
                }
                _ = shutdown.changed() => break,
            }
        }

        log::info!("Shutdown requested, waiting for in-flight checks");
        self.stop();
        while cycles.join_next().await.is_some() {}
        log::info!("Scheduler stopped");
    }
}
