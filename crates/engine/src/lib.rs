// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Cam Labs LLC

//! The control-plane engine: the Status Writer, Dependency Gate, Scheduler
//! Tick, Worker Launcher, Heartbeat Monitor, Startup Recovery, and
//! Capability Registry described across spec §4.
//!
//! Every component is generic over its adapters (`Database`,
//! `ContainerRuntime`, `SecretResolver`, `EventBroadcaster`, `Clock`)
//! rather than boxed as trait objects, so a daemon binary wires concrete
//! types once and the compiler monomorphizes the rest.

pub mod capability;
pub mod error;
pub mod gate;
pub mod heartbeat;
pub mod launcher;
pub mod recovery;
pub mod status_writer;
pub mod suppression;
pub mod tick;

pub use error::EngineError;
pub use gate::{DependencyGate, QueuedOutcome, Readiness, WaitingOutcome};
pub use heartbeat::{HeartbeatMonitor, HeartbeatSummary};
pub use launcher::{LaunchContext, LaunchError, WorkerLauncher};
pub use recovery::{RecoverySummary, StartupRecovery};
pub use status_writer::StatusWriter;
pub use tick::{SchedulerTick, TickSummary};

use cam_adapters::{ContainerRuntime, EventBroadcaster, SecretResolver};
use cam_core::Clock;
use cam_storage::Database;
use std::sync::Arc;

/// Bundles the adapters every engine component needs, and runs the
/// startup-then-tick-loop shape described in spec §5 ("Startup Recovery
/// runs once, before the scheduler's first tick").
///
/// Holds a single [`SchedulerTick`] for the process lifetime rather than
/// building one per call: the tick owns the per-task log-suppression map,
/// and that map's 60-second window (spec §9) only works if it survives
/// across ticks, not just within one.
pub struct Engine<D, R, S, B, C> {
    db: Arc<D>,
    broadcaster: Arc<B>,
    clock: C,
    stale_timeout: chrono::Duration,
    tick: SchedulerTick<D, R, S, B, C>,
}

impl<D, R, S, B, C> Engine<D, R, S, B, C>
where
    D: Database,
    R: ContainerRuntime,
    S: SecretResolver,
    B: EventBroadcaster,
    C: Clock,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<D>,
        runtime: Option<Arc<R>>,
        secrets: Arc<S>,
        broadcaster: Arc<B>,
        clock: C,
        context: LaunchContext,
        stale_timeout: chrono::Duration,
    ) -> Self {
        let tick = SchedulerTick::new(
            db.clone(),
            runtime,
            secrets,
            broadcaster.clone(),
            clock.clone(),
            context,
            stale_timeout,
        );
        Self { db, broadcaster, clock, stale_timeout, tick }
    }

    pub async fn run_startup_recovery(&self) -> Result<RecoverySummary, cam_storage::StoreError> {
        StartupRecovery::new(self.db.clone(), self.broadcaster.clone(), self.clock.clone(), self.stale_timeout)
            .run()
            .await
    }

    pub async fn run_tick(&self) -> Result<TickSummary, cam_storage::StoreError> {
        self.tick.run_once().await
    }
}
