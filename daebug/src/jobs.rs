//! Job manager (`spec.md` §4.E).
//!
//! Owned exclusively by the broker task. Timers never mutate state directly;
//! they post a [`crate::broker::BrokerCommand`] back onto the broker's own
//! channel, so every state change still happens on the single owning task.

use crate::broker::BrokerCommand;
use std::{collections::HashMap, path::PathBuf, time::Instant};
use tokio::{
    sync::mpsc::UnboundedSender,
    task::JoinHandle,
    time::{interval, sleep, Duration, MissedTickBehavior},
};
use tracing::trace;

/// Fixed job execution deadline (`spec.md` §4.E).
pub const TIMEOUT_MS: u64 = 60_000;
/// Placeholder-refresh cadence (`spec.md` §4.B).
const PLACEHOLDER_REFRESH_MS: u64 = 5_000;

struct Job {
    page_name: String,
    page_file: PathBuf,
    agent: String,
    code: String,
    request_has_footer: bool,
    requested_at: Instant,
    started_at: Option<Instant>,
    timeout_handle: JoinHandle<()>,
    ticker_handle: Option<JoinHandle<()>>,
}

/// A read-only, cloneable view of a [`Job`], safe to pass across channels.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub id: u64,
    pub page_name: String,
    pub page_file: PathBuf,
    pub agent: String,
    pub code: String,
    pub request_has_footer: bool,
    pub requested_at: Instant,
    pub started_at: Option<Instant>,
}

impl Job {
    fn snapshot(&self, id: u64) -> JobSnapshot {
        JobSnapshot {
            id,
            page_name: self.page_name.clone(),
            page_file: self.page_file.clone(),
            agent: self.agent.clone(),
            code: self.code.clone(),
            request_has_footer: self.request_has_footer,
            requested_at: self.requested_at,
            started_at: self.started_at,
        }
    }
}

/// At most one [`Job`] per page name, plus a monotonically increasing id
/// counter (`spec.md` §3 invariant 4).
pub struct JobManager {
    jobs: HashMap<String, (u64, Job)>,
    next_id: u64,
    timeout_ms: u64,
    refresh_ms: u64,
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new(TIMEOUT_MS, PLACEHOLDER_REFRESH_MS)
    }
}

impl JobManager {
    #[must_use]
    pub fn new(timeout_ms: u64, refresh_ms: u64) -> Self {
        Self {
            jobs: HashMap::new(),
            next_id: 1,
            timeout_ms,
            refresh_ms,
        }
    }

    /// Create a job for `page_name`. Callers upstream must guarantee no job
    /// already exists for this page (`spec.md` §4.E).
    pub fn create(
        &mut self,
        page_name: String,
        page_file: PathBuf,
        agent: String,
        code: String,
        request_has_footer: bool,
        cmd_tx: UnboundedSender<BrokerCommand>,
    ) -> JobSnapshot {
        debug_assert!(
            !self.jobs.contains_key(&page_name),
            "job manager invariant: at most one job per page"
        );

        let id = self.next_id;
        self.next_id += 1;

        let timeout_page = page_name.clone();
        let timeout_ms = self.timeout_ms;
        let timeout_handle = tokio::spawn(async move {
            sleep(Duration::from_millis(timeout_ms)).await;
            let _ = cmd_tx.send(BrokerCommand::JobTimeout {
                page_name: timeout_page,
            });
        });

        let job = Job {
            page_name: page_name.clone(),
            page_file,
            agent,
            code,
            request_has_footer,
            requested_at: Instant::now(),
            started_at: None,
            timeout_handle,
            ticker_handle: None,
        };
        let snapshot = job.snapshot(id);
        self.jobs.insert(page_name, (id, job));
        snapshot
    }

    /// Idempotent: the first call records `started_at` and arms the
    /// placeholder-refresh ticker; later calls just return the current
    /// snapshot unchanged. The returned `bool` is `true` only on the call
    /// that performed that first transition, so the caller knows exactly
    /// once when it must write the "executing" placeholder (`spec.md`
    /// §4.E/§4.B).
    pub fn start(
        &mut self,
        page_name: &str,
        cmd_tx: UnboundedSender<BrokerCommand>,
    ) -> Option<(JobSnapshot, bool)> {
        let (id, job) = self.jobs.get_mut(page_name)?;
        let id = *id;
        let just_started = job.started_at.is_none();
        if just_started {
            job.started_at = Some(Instant::now());
            let ticker_page = page_name.to_string();
            let refresh_ms = self.refresh_ms;
            job.ticker_handle = Some(tokio::spawn(async move {
                let mut tick = interval(Duration::from_millis(refresh_ms));
                tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                tick.tick().await; // first tick fires immediately; skip it
                loop {
                    tick.tick().await;
                    trace!(page = %ticker_page, "refreshing executing placeholder");
                    if cmd_tx
                        .send(BrokerCommand::RefreshPlaceholder {
                            page_name: ticker_page.clone(),
                        })
                        .is_err()
                    {
                        break;
                    }
                }
            }));
        }
        Some((job.snapshot(id), just_started))
    }

    /// Cancel the timeout and ticker and remove the job.
    pub fn finish(&mut self, page_name: &str) -> Option<JobSnapshot> {
        let (id, job) = self.jobs.remove(page_name)?;
        job.timeout_handle.abort();
        if let Some(ticker) = job.ticker_handle {
            ticker.abort();
        }
        Some(job.snapshot(id))
    }

    #[must_use]
    pub fn get(&self, page_name: &str) -> Option<JobSnapshot> {
        self.jobs.get(page_name).map(|(id, job)| job.snapshot(*id))
    }

    #[must_use]
    pub fn exists(&self, page_name: &str) -> bool {
        self.jobs.contains_key(page_name)
    }
}
