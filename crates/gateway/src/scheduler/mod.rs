//! The cron wheel: re-issues stored command invocations on schedule.
//!
//! Jobs are in-memory, keyed by schedule id; the durable rows live in
//! the persistence layer and are re-resolved on startup so a schedule
//! always targets whichever bundle version is enabled *now*. Fired
//! requests are pushed onto the bounded dispatcher queue with a
//! blocking send: a stalled dispatcher back-pressures the wheel rather
//! than dropping fires.

pub mod cron;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gort_data::{DataAccess, DataAccessHolder};
use gort_domain::{CommandEntry, CommandRequest, Error, Result, ScheduledCommand};
use parking_lot::Mutex;
use tokio::sync::mpsc;

pub use cron::CronSpec;

use crate::dispatch::resolve_command_line;

struct Job {
    schedule: ScheduledCommand,
    entry: CommandEntry,
    parameters: Vec<String>,
    spec: CronSpec,
    next: DateTime<Utc>,
}

pub struct Scheduler {
    data: Arc<DataAccessHolder>,
    request_tx: mpsc::Sender<CommandRequest>,
    jobs: Mutex<HashMap<i64, Job>>,
}

impl Scheduler {
    pub fn new(data: Arc<DataAccessHolder>, request_tx: mpsc::Sender<CommandRequest>) -> Self {
        Self {
            data,
            request_tx,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Validate, persist and register a new schedule. The command string
    /// must tokenize and resolve at creation time; the caller has
    /// already authorized it.
    pub async fn create(&self, schedule: &mut ScheduledCommand) -> Result<i64> {
        let spec = CronSpec::parse(&schedule.cron)?;
        let da = self.data.get().await?;
        let (entry, parameters) = resolve_command_line(da.as_ref(), &schedule.command).await?;

        da.schedule_create(schedule).await?;
        self.register(schedule.clone(), entry, parameters, spec)?;
        tracing::info!(
            schedule_id = schedule.schedule_id,
            cron = %schedule.cron,
            command = %schedule.command,
            "schedule registered"
        );
        Ok(schedule.schedule_id)
    }

    /// Load durable rows and register a live job for each. Rows whose
    /// command no longer resolves are skipped with a warning and left in
    /// place for a later retry.
    pub async fn hydrate(&self) -> Result<usize> {
        let da = self.data.get().await?;
        let mut registered = 0;
        for schedule in da.schedules_get().await? {
            let spec = match CronSpec::parse(&schedule.cron) {
                Ok(spec) => spec,
                Err(e) => {
                    tracing::warn!(
                        schedule_id = schedule.schedule_id,
                        error = %e,
                        "skipping schedule with unparseable cron"
                    );
                    continue;
                }
            };
            match resolve_command_line(da.as_ref(), &schedule.command).await {
                Ok((entry, parameters)) => {
                    if let Err(e) = self.register(schedule, entry, parameters, spec) {
                        tracing::warn!(error = %e, "skipping duplicate schedule tag");
                        continue;
                    }
                    registered += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        schedule_id = schedule.schedule_id,
                        command = %schedule.command,
                        error = %e,
                        "schedule no longer resolves; leaving row for retry"
                    );
                }
            }
        }
        Ok(registered)
    }

    /// One live job per schedule id; a duplicate tag is rejected.
    fn register(
        &self,
        schedule: ScheduledCommand,
        entry: CommandEntry,
        parameters: Vec<String>,
        spec: CronSpec,
    ) -> Result<()> {
        let now = Utc::now();
        let next = spec
            .next_after(&now)
            .ok_or_else(|| Error::Unmarshal(format!("cron never fires: {}", schedule.cron)))?;
        let mut jobs = self.jobs.lock();
        if jobs.contains_key(&schedule.schedule_id) {
            return Err(Error::already_exists(
                "schedule",
                schedule.schedule_id.to_string(),
            ));
        }
        jobs.insert(
            schedule.schedule_id,
            Job {
                schedule,
                entry,
                parameters,
                spec,
                next,
            },
        );
        Ok(())
    }

    /// Delete the durable row first, then drop the in-memory tag. If the
    /// second half fails the next restart reconciles.
    pub async fn cancel(&self, schedule_id: i64) -> Result<()> {
        let da = self.data.get().await?;
        da.schedule_delete(schedule_id).await?;
        self.jobs.lock().remove(&schedule_id);
        tracing::info!(schedule_id, "schedule cancelled");
        Ok(())
    }

    /// Ids of the currently registered jobs (sorted, for inspection).
    pub fn job_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.jobs.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Evaluate due jobs once. Called every second by the wheel loop.
    pub async fn tick(&self) {
        let now = Utc::now();

        // Advance fire times under the lock, then send outside it so a
        // blocked dispatcher can't wedge job registration.
        let due: Vec<(i64, CommandRequest)> = {
            let mut jobs = self.jobs.lock();
            let mut due = Vec::new();
            for (id, job) in jobs.iter_mut() {
                if job.next > now {
                    continue;
                }
                job.next = match job.spec.next_after(&now) {
                    Some(next) => next,
                    None => continue,
                };
                due.push((*id, job.build_request(now)));
            }
            due
        };

        for (schedule_id, mut request) in due {
            let da = match self.data.get().await {
                Ok(da) => da,
                Err(e) => {
                    tracing::error!(schedule_id, error = %e, "data access unavailable; fire dropped");
                    continue;
                }
            };
            if let Err(e) = da.request_begin(&mut request).await {
                tracing::error!(schedule_id, error = %e, "request_begin failed for scheduled fire");
                continue;
            }
            tracing::debug!(
                schedule_id,
                request_id = request.request_id,
                "scheduled command fired"
            );
            // Bounded buffer, blocking send (the documented saturation
            // policy). An error here means the dispatcher is gone.
            if self.request_tx.send(request).await.is_err() {
                tracing::error!(schedule_id, "dispatcher channel closed; fire dropped");
            }
        }
    }

    /// Run the wheel until the process exits.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }
}

impl Job {
    /// A fresh lifecycle row for one fire: new timestamp, zero request
    /// id, the scheduled principal.
    fn build_request(&self, now: DateTime<Utc>) -> CommandRequest {
        CommandRequest {
            request_id: 0,
            entry: self.entry.clone(),
            adapter: self.schedule.adapter.clone(),
            channel_id: self.schedule.channel_id.clone(),
            parameters: self.parameters.clone(),
            timestamp: now,
            user_id: self.schedule.user_id.clone(),
            user_email: self.schedule.user_email.clone(),
            user_name: self.schedule.user_name.clone(),
        }
    }
}
