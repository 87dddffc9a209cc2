//! The broker task (`spec.md` §5): the single owner of the [`Registry`] and
//! [`JobManager`]. Every mutation funnels through [`BrokerCommand`] so no
//! lock is ever needed around either map.

use crate::{
    clock,
    codec::{self, BackgroundEvent, JobResultPayload},
    config::BrokerConfig,
    error::{BrokerError, BrokerResult},
    jobs::{JobManager, JobSnapshot},
    registry::{PageState, Registry},
    watcher::Watcher,
};
use std::{fs, path::Path, time::Duration};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, instrument, warn};

/// Outcome of a resolved long-poll (`spec.md` §4.F).
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// No job appeared before the deadline; client sleeps and retries.
    Empty,
    /// A job is ready to execute.
    Job { id: u64, code: String },
}

/// Messages the broker task accepts. HTTP handlers and the watcher's notify
/// callback are the only producers; nothing else ever touches `Registry` or
/// `JobManager` state.
pub enum BrokerCommand {
    Poll {
        name: String,
        url: Option<String>,
        reply: oneshot::Sender<BrokerResult<PollOutcome>>,
    },
    PollTimeout {
        page_name: String,
        waiter_id: u64,
    },
    PostResult {
        name: String,
        body: serde_json::Value,
        reply: oneshot::Sender<()>,
    },
    CheckPage {
        page_name: String,
    },
    FsEvent {
        page_name: String,
        removed_or_renamed: bool,
    },
    JobTimeout {
        page_name: String,
    },
    RefreshPlaceholder {
        page_name: String,
    },
    ShutdownSentinelDetected,
}

/// A cheap, cloneable reference to the running broker, handed to every axum
/// handler via `State`.
#[derive(Clone)]
pub struct BrokerHandle {
    tx: mpsc::UnboundedSender<BrokerCommand>,
}

impl BrokerHandle {
    pub async fn poll(&self, name: String, url: Option<String>) -> BrokerResult<PollOutcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(BrokerCommand::Poll { name, url, reply })
            .map_err(|_| BrokerError::Config("broker task is gone".to_string()))?;
        rx.await
            .map_err(|_| BrokerError::Config("broker task dropped reply".to_string()))?
    }

    pub async fn post_result(&self, name: String, body: serde_json::Value) {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(BrokerCommand::PostResult { name, body, reply })
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<BrokerCommand> {
        self.tx.clone()
    }
}

struct Waiter {
    id: u64,
    reply: oneshot::Sender<BrokerResult<PollOutcome>>,
}

/// Owns every mutable piece of broker state. Runs on one task; `run` never
/// returns until the command channel closes or a shutdown sentinel fires.
pub struct Broker {
    config: BrokerConfig,
    registry: Registry,
    jobs: JobManager,
    watcher: Watcher,
    waiters: std::collections::HashMap<String, Vec<Waiter>>,
    next_waiter_id: u64,
    rx: mpsc::UnboundedReceiver<BrokerCommand>,
    tx: mpsc::UnboundedSender<BrokerCommand>,
}

impl Broker {
    /// Build the broker and return it alongside the handle used to reach it.
    pub fn spawn(config: BrokerConfig) -> BrokerResult<(BrokerHandle, Broker)> {
        let registry = Registry::init(&config.root, &config.page_dir, &config.master_file)?;
        let jobs = JobManager::new(config.job_timeout_ms, config.placeholder_refresh_ms);
        let (tx, rx) = mpsc::unbounded_channel();
        let broker = Self {
            config,
            registry,
            jobs,
            watcher: Watcher::new(),
            waiters: std::collections::HashMap::new(),
            next_waiter_id: 1,
            rx,
            tx: tx.clone(),
        };
        Ok((BrokerHandle { tx }, broker))
    }

    /// Arm the shutdown watcher and run the broker's event loop to
    /// completion.
    pub async fn run(mut self) {
        self.watcher
            .watch_page(self.master_sentinel_key(), &self.master_path(), &self.tx);

        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                BrokerCommand::Poll { name, url, reply } => {
                    self.handle_poll(name, url, reply);
                }
                BrokerCommand::PollTimeout {
                    page_name,
                    waiter_id,
                } => self.handle_poll_timeout(&page_name, waiter_id),
                BrokerCommand::PostResult { name, body, reply } => {
                    self.handle_post_result(&name, body).await;
                    let _ = reply.send(());
                }
                BrokerCommand::CheckPage { page_name } => self.check_page(&page_name).await,
                BrokerCommand::FsEvent {
                    page_name,
                    removed_or_renamed,
                } => self.handle_fs_event(&page_name, removed_or_renamed),
                BrokerCommand::JobTimeout { page_name } => self.handle_job_timeout(&page_name).await,
                BrokerCommand::RefreshPlaceholder { page_name } => {
                    self.handle_refresh_placeholder(&page_name).await;
                }
                BrokerCommand::ShutdownSentinelDetected => {
                    self.handle_shutdown();
                    break;
                }
            }
        }
    }

    fn master_sentinel_key(&self) -> &str {
        "__master__"
    }

    fn master_path(&self) -> std::path::PathBuf {
        self.config.root.join(&self.config.master_file)
    }

    #[instrument(skip(self, reply))]
    fn handle_poll(
        &mut self,
        name: String,
        url: Option<String>,
        reply: oneshot::Sender<BrokerResult<PollOutcome>>,
    ) {
        if name.trim().is_empty() {
            let _ = reply.send(Err(BrokerError::BadRequest("missing name".to_string())));
            return;
        }

        let page = match self.registry.get_or_create(&name, url.as_deref()) {
            Ok(page) => page,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };
        self.watcher.watch_page(&page.name, &page.file, &self.tx);

        if self.jobs.exists(&page.name) {
            let (snapshot, just_started) = self
                .jobs
                .start(&page.name, self.tx.clone())
                .expect("job exists");
            self.registry.set_state(&page.name, PageState::Executing);
            if just_started {
                self.spawn_write_executing(&snapshot);
            }
            let _ = reply.send(Ok(Self::outcome(&snapshot)));
            return;
        }

        let waiter_id = self.next_waiter_id;
        self.next_waiter_id += 1;
        self.waiters
            .entry(page.name.clone())
            .or_default()
            .push(Waiter { id: waiter_id, reply });

        let tx = self.tx.clone();
        let page_name = page.name.clone();
        let min = self.config.long_poll_min_ms;
        let span = self.config.long_poll_max_ms.saturating_sub(min);
        tokio::spawn(async move {
            let extra = if span == 0 {
                0
            } else {
                rand::random::<u64>() % span
            };
            tokio::time::sleep(Duration::from_millis(min + extra)).await;
            let _ = tx.send(BrokerCommand::PollTimeout {
                page_name,
                waiter_id,
            });
        });
    }

    fn outcome(snapshot: &JobSnapshot) -> PollOutcome {
        PollOutcome::Job {
            id: snapshot.id,
            code: snapshot.code.clone(),
        }
    }

    fn handle_poll_timeout(&mut self, page_name: &str, waiter_id: u64) {
        if let Some(list) = self.waiters.get_mut(page_name) {
            if let Some(pos) = list.iter().position(|w| w.id == waiter_id) {
                let waiter = list.remove(pos);
                let _ = waiter.reply.send(Ok(PollOutcome::Empty));
            }
            if list.is_empty() {
                self.waiters.remove(page_name);
            }
        }
    }

    fn handle_fs_event(&mut self, page_name: &str, removed_or_renamed: bool) {
        if removed_or_renamed {
            if page_name == self.master_sentinel_key() {
                self.watcher.rearm(&self.master_path());
            } else if let Some(page) = self.registry.get(page_name) {
                let file = page.file.clone();
                self.watcher.rearm(&file);
            }
        }
        self.watcher
            .schedule_check(page_name, self.config.debounce_ms, &self.tx);
    }

    #[instrument(skip(self))]
    async fn check_page(&mut self, page_name: &str) {
        if page_name == self.master_sentinel_key() {
            self.check_master().await;
            return;
        }

        let Some(page) = self.registry.get(page_name).cloned() else {
            return;
        };

        if !page.file.exists() {
            self.watcher.set_last_content(page_name, String::new());
            return;
        }
        self.watcher.mark_seen(page_name);

        let content = match fs::read_to_string(&page.file) {
            Ok(c) => c,
            Err(e) => {
                warn!(page = %page_name, error = %e, "transient read failure, will resync");
                return;
            }
        };
        if self.watcher.last_content(page_name) == Some(content.as_str()) {
            return;
        }
        self.watcher.set_last_content(page_name, content.clone());

        let Some(parsed) = codec::parse_request(&content, page_name) else {
            return;
        };
        if self.jobs.exists(page_name) {
            return;
        }

        let snippet: String = parsed
            .code
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .take(20)
            .collect();
        info!(page = %page_name, agent = %parsed.agent, snippet = %snippet, "job created");

        let snapshot = self.jobs.create(
            page_name.to_string(),
            page.file.clone(),
            parsed.agent,
            parsed.code,
            parsed.has_footer,
            self.tx.clone(),
        );
        self.registry.set_state(page_name, PageState::Executing);
        let _ = self.registry.update_master();

        if let Some(list) = self.waiters.remove(page_name) {
            let (started, just_started) = self
                .jobs
                .start(page_name, self.tx.clone())
                .unwrap_or((snapshot, true));
            if just_started {
                self.spawn_write_executing(&started);
            }
            for waiter in list {
                let _ = waiter.reply.send(Ok(Self::outcome(&started)));
            }
        }
    }

    /// Write the "executing" placeholder for a job's first dispatch
    /// (`spec.md` §4.E "invoke `writeExecuting(job)`"). Fire-and-forget: the
    /// blocking file write runs on its own task, same pattern as the
    /// poll-timeout and ticker tasks spawned elsewhere in this file.
    fn spawn_write_executing(&self, snapshot: &JobSnapshot) {
        let page_name = snapshot.page_name.clone();
        let agent = snapshot.agent.clone();
        let path = snapshot.page_file.clone();
        let now = clock::clock_fmt(std::time::SystemTime::now());
        tokio::spawn(async move {
            let write_page = page_name.clone();
            let write_agent = agent.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                let target = codec::ReplyTarget {
                    page_name: &write_page,
                    agent: &write_agent,
                };
                codec::write_executing(&path, &target, &now)
            })
            .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(codec::WriteError::Missing)) => {
                    warn!(page = %page_name, "write race: file missing for executing placeholder");
                }
                Ok(Err(codec::WriteError::Io(e))) => {
                    warn!(page = %page_name, error = %e, "executing placeholder write failed");
                }
                Err(e) => warn!(page = %page_name, error = %e, "executing placeholder write task panicked"),
            }
        });
    }

    async fn check_master(&mut self) {
        let path = self.master_path();
        let Ok(content) = fs::read_to_string(&path) else {
            return;
        };
        if crate::shutdown::contains_shutdown_sentinel(&content) {
            let _ = self.tx.send(BrokerCommand::ShutdownSentinelDetected);
        }
    }

    async fn handle_job_timeout(&mut self, page_name: &str) {
        let Some(snapshot) = self.jobs.get(page_name) else {
            return; // already finished
        };
        let result = JobResultPayload::Err {
            ok: false,
            error: format!("job timed out after {}ms", self.config.job_timeout_ms),
            background_events: vec![],
            job_id: Some(snapshot.id.to_string()),
        };
        self.write_reply_for(&snapshot, &result).await;
        self.jobs.finish(page_name);
        self.registry.set_state(page_name, PageState::Idle);
        let _ = self.registry.update_master();
    }

    async fn handle_refresh_placeholder(&mut self, page_name: &str) {
        let Some(snapshot) = self.jobs.get(page_name) else {
            return;
        };
        let Some(started_at) = snapshot.started_at else {
            return;
        };
        let elapsed = started_at.elapsed();
        let path = snapshot.page_file.clone();
        let result = tokio::task::spawn_blocking(move || codec::refresh_executing(&path, elapsed))
            .await
            .unwrap_or(Ok(()));
        if let Err(e) = result {
            match e {
                codec::WriteError::Missing => {}
                codec::WriteError::Io(e) => warn!(page = %page_name, error = %e, "placeholder refresh failed"),
            }
        }
    }

    async fn handle_post_result(&mut self, name: &str, body: serde_json::Value) {
        match body.get("type").and_then(serde_json::Value::as_str) {
            Some("worker-timeout") => {
                let ms = body.get("ms").and_then(serde_json::Value::as_u64).unwrap_or(0);
                if let Some(page) = self.registry.get(name) {
                    let note = format!("Worker unresponsive for {ms}ms, restarting...");
                    let _ = Self::append_note(&page.file, &note);
                }
            }
            Some("worker-init") => {}
            Some("background-flush") => {
                if let Some(page) = self.registry.get(name) {
                    let events: Vec<BackgroundEvent> = body
                        .get("events")
                        .cloned()
                        .map(|v| serde_json::from_value(v).unwrap_or_default())
                        .unwrap_or_default();
                    if !events.is_empty() {
                        let heading = format!("### Orphaned background events at {}", clock::clock_fmt(std::time::SystemTime::now()));
                        let mut note = heading;
                        note.push('\n');
                        for event in &events {
                            note.push_str(&event.render());
                        }
                        let _ = Self::append_note(&page.file, note.trim_end());
                    }
                }
            }
            _ => {
                let Some(snapshot) = self.jobs.get(name) else {
                    return;
                };
                let payload: Result<JobResultPayload, _> = serde_json::from_value(body);
                if let Ok(result) = payload {
                    self.write_reply_for(&snapshot, &result).await;
                }
                self.jobs.finish(name);
                self.registry.set_state(name, PageState::Idle);
                let _ = self.registry.update_master();
            }
        }
    }

    async fn write_reply_for(&self, snapshot: &JobSnapshot, result: &JobResultPayload) {
        if !self.watcher.is_seen(&snapshot.page_name) {
            warn!(page = %snapshot.page_name, "skipping write: file never seen by watcher");
            return;
        }
        let page_name = snapshot.page_name.clone();
        let agent = snapshot.agent.clone();
        let path = snapshot.page_file.clone();
        let duration = snapshot
            .started_at
            .map_or(Duration::ZERO, |s| s.elapsed());
        let now = clock::clock_fmt(std::time::SystemTime::now());
        let result = result.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            let target = codec::ReplyTarget {
                page_name: &page_name,
                agent: &agent,
            };
            codec::write_reply(&path, &target, &now, duration, &result)
        })
        .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(codec::WriteError::Missing)) => {
                warn!(page = %snapshot.page_name, "write race: file missing");
            }
            Ok(Err(codec::WriteError::Io(e))) => {
                warn!(page = %snapshot.page_name, error = %e, "write failed");
            }
            Err(e) => warn!(page = %snapshot.page_name, error = %e, "write task panicked"),
        }
    }

    fn append_note(path: &Path, note: &str) -> std::io::Result<()> {
        let content = fs::read_to_string(path).unwrap_or_default();
        let base = codec::strip_trailing_footer(&content);
        let new_text = format!("{}\n\n{note}\n{}", base.trim_end_matches('\n'), codec::canonical_footer());
        fs::write(path, new_text)
    }

    fn handle_shutdown(&mut self) {
        let _ = self.registry.write_shutdown_template();
        info!("shutdown sentinel detected, exiting");
    }
}
