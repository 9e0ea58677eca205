//! Simulated live tracking, one task per job.
//!
//! Simulated positions are kept here, keyed by job. They never touch the
//! drivers' own reports in `driver_location`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde::Serialize;
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::entities::job::{self, JobStatus};
use crate::error::AppResult;
use crate::tracking::{advance, TrackingState};

const MIN_TICK: Duration = Duration::from_millis(1);

/// Latest simulated state for a job
#[derive(Debug, Clone, Serialize)]
pub struct SimulatedPosition {
    pub driver_id: Uuid,
    #[serde(flatten)]
    pub state: TrackingState,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    generation: u64,
}

struct Simulation {
    generation: u64,
    handle: AbortHandle,
}

type Positions = Arc<RwLock<HashMap<Uuid, SimulatedPosition>>>;

/// Moves `job_id` from `from` to `to`, leaving any other status alone
async fn transition_job(
    db: &DatabaseConnection,
    job_id: Uuid,
    from: &[JobStatus],
    to: JobStatus,
) -> AppResult<()> {
    if let Some(found) = job::Entity::find_by_id(job_id).one(db).await? {
        if from.contains(&found.status) {
            let mut active: job::ActiveModel = found.into();
            active.status = Set(to);
            active.update(db).await?;
        }
    }
    Ok(())
}

/// Write `state` unless the slot was cleared or taken over by a newer run
fn publish(positions: &Positions, job_id: Uuid, generation: u64, state: &TrackingState) {
    if let Ok(mut positions) = positions.write() {
        if let Some(slot) = positions.get_mut(&job_id) {
            if slot.generation == generation {
                slot.state = state.clone();
                slot.updated_at = Utc::now();
            }
        }
    }
}

/// Runs one tracking simulation task per job on a fixed tick.
#[derive(Clone)]
pub struct TrackingSimulator {
    db: DatabaseConnection,
    tick: Duration,
    tasks: Arc<Mutex<HashMap<Uuid, Simulation>>>,
    positions: Positions,
    generation: Arc<AtomicU64>,
}

impl TrackingSimulator {
    pub fn new(db: DatabaseConnection, tick: Duration) -> Self {
        Self {
            db,
            tick: tick.max(MIN_TICK),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            positions: Arc::new(RwLock::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_running(&self, job_id: Uuid) -> bool {
        self.tasks
            .lock()
            .map(|tasks| tasks.get(&job_id).is_some_and(|s| !s.handle.is_finished()))
            .unwrap_or(false)
    }

    /// Simulated position for `job_id`; kept after delivery until stopped
    pub fn snapshot(&self, job_id: Uuid) -> Option<SimulatedPosition> {
        self.positions
            .read()
            .ok()
            .and_then(|positions| positions.get(&job_id).cloned())
    }

    /// Start simulating `job` driven by `driver_id`, replacing any simulation already running for it
    pub fn start(&self, job: &job::Model, driver_id: Uuid) -> TrackingState {
        let initial = TrackingState::start(job.pickup(), job.delivery(), job.distance_miles);
        let job_id = job.id;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut positions) = self.positions.write() {
            positions.insert(
                job_id,
                SimulatedPosition {
                    driver_id,
                    state: initial.clone(),
                    updated_at: Utc::now(),
                    generation,
                },
            );
        }

        let db = self.db.clone();
        let tick = self.tick;
        let tasks = self.tasks.clone();
        let positions = self.positions.clone();
        let mut state = initial.clone();

        let handle = tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut interval = tokio::time::interval(tick);
            // First tick completes immediately
            interval.tick().await;

            if let Err(e) = transition_job(
                &db,
                job_id,
                &[JobStatus::Available, JobStatus::Assigned],
                JobStatus::InProgress,
            )
            .await
            {
                tracing::warn!(%job_id, "Failed to mark job in progress: {}", e);
            }

            loop {
                interval.tick().await;
                state = advance(&state, tick, &mut rng);
                publish(&positions, job_id, generation, &state);

                tracing::debug!(
                    %job_id,
                    progress = state.progress(),
                    status = ?state.status,
                    "Simulation tick"
                );

                if state.is_finished() {
                    if let Err(e) =
                        transition_job(&db, job_id, &[JobStatus::InProgress], JobStatus::Completed)
                            .await
                    {
                        tracing::warn!(%job_id, "Failed to mark job completed: {}", e);
                    }
                    tracing::info!(%job_id, "Simulated delivery complete");
                    break;
                }
            }

            if let Ok(mut tasks) = tasks.lock() {
                // A replacement simulation may own the slot by now
                if tasks.get(&job_id).is_some_and(|s| s.generation == generation) {
                    tasks.remove(&job_id);
                }
            }
        });

        let simulation = Simulation {
            generation,
            handle: handle.abort_handle(),
        };
        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(previous) = tasks.insert(job_id, simulation) {
                previous.handle.abort();
            }
        }

        tracing::info!(%job_id, %driver_id, total_miles = initial.total_miles, "Tracking simulation started");
        initial
    }

    /// Abort the simulation for `job_id` and forget its position.
    /// Returns whether there was anything to stop.
    pub fn stop(&self, job_id: Uuid) -> bool {
        let task = self.tasks.lock().ok().and_then(|mut tasks| tasks.remove(&job_id));
        if let Some(task) = &task {
            task.handle.abort();
        }
        let position = self
            .positions
            .write()
            .ok()
            .and_then(|mut positions| positions.remove(&job_id));

        let stopped = task.is_some() || position.is_some();
        if stopped {
            tracing::info!(%job_id, "Tracking simulation stopped");
        }
        stopped
    }

    /// Stop the simulation and hand an in-progress job back to its driver
    pub async fn cancel(&self, job_id: Uuid) -> AppResult<bool> {
        if !self.stop(job_id) {
            return Ok(false);
        }
        transition_job(&self.db, job_id, &[JobStatus::InProgress], JobStatus::Assigned).await?;
        Ok(true)
    }

    pub fn stop_all(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for (_, task) in tasks.drain() {
                task.handle.abort();
            }
        }
        if let Ok(mut positions) = self.positions.write() {
            positions.clear();
        }
    }
}
