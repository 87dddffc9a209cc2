//! File watcher (`spec.md` §4.D).
//!
//! The OS-level watch and its debounce timers are the only pieces that run
//! outside the broker task (notify delivers events on its own thread); every
//! event is funneled back into [`crate::broker::BrokerCommand`] so the actual
//! state mutation (reading `lastContent`, parsing, creating jobs) still
//! happens on the single owning task.

use crate::broker::BrokerCommand;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    sync::mpsc::UnboundedSender,
    task::JoinHandle,
    time::{sleep, Duration},
};
use tracing::warn;

/// Debounce window for filesystem events (`spec.md` §4.D).
pub const DEBOUNCE_MS: u64 = 150;

/// Per-page watch state, owned by the broker task.
#[derive(Default)]
pub struct Watcher {
    inner: Option<RecommendedWatcher>,
    path_to_name: Arc<Mutex<HashMap<PathBuf, String>>>,
    /// Idempotency guard: `watchPage` called N times behaves like once.
    armed: HashSet<String>,
    /// Pages whose file has been read at least once (admits writer ops).
    seen: HashSet<String>,
    /// Last observed file content, for change detection.
    last_content: HashMap<String, String>,
    /// In-flight debounce timer per page, replaced on every new event.
    pending: HashMap<String, JoinHandle<()>>,
}

impl Watcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a watch on `file` for `page_name`, re-using the idempotency guard
    /// from `spec.md` §4.D ("calling `watchPage` twice results in a single
    /// OS-level watch"). Performs the immediate post-arm `check()` by
    /// scheduling a zero-delay debounce.
    pub fn watch_page(
        &mut self,
        page_name: &str,
        file: &Path,
        cmd_tx: &UnboundedSender<BrokerCommand>,
    ) {
        if !self.armed.insert(page_name.to_string()) {
            return;
        }
        self.path_to_name
            .lock()
            .insert(file.to_path_buf(), page_name.to_string());
        self.ensure_inner(cmd_tx.clone());
        self.arm_os_watch(file);
        self.schedule_check(page_name, 0, cmd_tx);
    }

    fn ensure_inner(&mut self, cmd_tx: UnboundedSender<BrokerCommand>) {
        if self.inner.is_some() {
            return;
        }
        let path_to_name = Arc::clone(&self.path_to_name);
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else { return };
            let map = path_to_name.lock();
            for path in &event.paths {
                let matched = map
                    .get(path)
                    .cloned()
                    .or_else(|| path.file_name().and_then(|base| {
                        map.iter()
                            .find(|(p, _)| p.file_name() == Some(base))
                            .map(|(_, name)| name.clone())
                    }));
                if let Some(page_name) = matched {
                    let _ = cmd_tx.send(BrokerCommand::FsEvent {
                        page_name,
                        removed_or_renamed: matches!(
                            event.kind,
                            EventKind::Remove(_) | EventKind::Modify(notify::event::ModifyKind::Name(_))
                        ),
                    });
                }
            }
        });
        match watcher {
            Ok(w) => self.inner = Some(w),
            Err(e) => warn!(error = %e, "failed to start file watcher"),
        }
    }

    fn arm_os_watch(&mut self, file: &Path) {
        let Some(watcher) = self.inner.as_mut() else {
            return;
        };
        // Watch the file directly if it exists; otherwise watch the parent
        // directory so recreation (editors writing via temp-file-plus-rename)
        // still surfaces events.
        let target: PathBuf = if file.exists() {
            file.to_path_buf()
        } else {
            file.parent().map_or_else(|| file.to_path_buf(), Path::to_path_buf)
        };
        if let Err(e) = watcher.watch(&target, RecursiveMode::NonRecursive) {
            warn!(path = %target.display(), error = %e, "failed to arm watch");
        }
    }

    /// Re-arm the watch for a page whose file was renamed away or removed,
    /// so recreation resumes the loop (`spec.md` §4.D step 4).
    pub fn rearm(&mut self, file: &Path) {
        if let Some(watcher) = self.inner.as_mut() {
            let _ = watcher.unwatch(file);
        }
        self.arm_os_watch(file);
    }

    /// Reset the debounce timer for `page_name`, scheduling a `CheckPage`
    /// command after `debounce_ms`.
    pub fn schedule_check(
        &mut self,
        page_name: &str,
        debounce_ms: u64,
        cmd_tx: &UnboundedSender<BrokerCommand>,
    ) {
        if let Some(handle) = self.pending.remove(page_name) {
            handle.abort();
        }
        let tx = cmd_tx.clone();
        let name = page_name.to_string();
        let handle = tokio::spawn(async move {
            if debounce_ms > 0 {
                sleep(Duration::from_millis(debounce_ms)).await;
            }
            let _ = tx.send(BrokerCommand::CheckPage { page_name: name });
        });
        self.pending.insert(page_name.to_string(), handle);
    }

    #[must_use]
    pub fn is_seen(&self, page_name: &str) -> bool {
        self.seen.contains(page_name)
    }

    pub fn mark_seen(&mut self, page_name: &str) {
        self.seen.insert(page_name.to_string());
    }

    #[must_use]
    pub fn last_content(&self, page_name: &str) -> Option<&str> {
        self.last_content.get(page_name).map(String::as_str)
    }

    pub fn set_last_content(&mut self, page_name: &str, content: String) {
        self.last_content.insert(page_name.to_string(), content);
    }
}
