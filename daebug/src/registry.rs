//! Page registry (`spec.md` §4.C).
//!
//! Owned exclusively by the broker task (`spec.md` §5): no locks, because
//! nothing else ever touches this map.

use crate::clock::sanitize_name;
use crate::codec::FOOTER_DIVIDER;
use crate::error::BrokerResult;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{debug, info};

/// A connected runtime (`spec.md` §3).
#[derive(Debug, Clone)]
pub struct Page {
    /// Stable identifier chosen by the runtime on first contact.
    pub name: String,
    /// Origin URL, or `worker://<name>` for a Web Worker.
    pub url: String,
    /// Absolute path to the backing Markdown file.
    pub file: PathBuf,
    /// Current execution state.
    pub state: PageState,
    /// Monotonic timestamp of the last HTTP contact.
    pub last_seen: Instant,
}

/// Whether a page currently owns a live job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Idle,
    Executing,
}

/// Holds every known [`Page`], keyed by name, plus the broker's start time
/// for the master index.
pub struct Registry {
    pages: HashMap<String, Page>,
    start_time: Instant,
    root: PathBuf,
    page_dir: String,
    master_file: String,
}

impl Registry {
    /// Ensure the master index file exists, creating it from a template if
    /// not (`spec.md` §4.C `init`).
    pub fn init(root: &Path, page_dir: &str, master_file: &str) -> BrokerResult<Self> {
        fs::create_dir_all(root.join(page_dir))?;
        let registry = Self {
            pages: HashMap::new(),
            start_time: Instant::now(),
            root: root.to_path_buf(),
            page_dir: page_dir.to_string(),
            master_file: master_file.to_string(),
        };
        let master_path = registry.master_path();
        if !master_path.exists() {
            fs::write(&master_path, registry.render_master())?;
        }
        Ok(registry)
    }

    fn master_path(&self) -> PathBuf {
        self.root.join(&self.master_file)
    }

    fn page_dir_path(&self) -> PathBuf {
        self.root.join(&self.page_dir)
    }

    /// Look up or create a page for `name` (`spec.md` §4.C `getOrCreate`).
    pub fn get_or_create(&mut self, name: &str, url: Option<&str>) -> BrokerResult<Page> {
        if let Some(page) = self.pages.get_mut(name) {
            page.last_seen = Instant::now();
            return Ok(page.clone());
        }

        let sanitized = sanitize_name(name);
        let file = self
            .find_adoptable_file(&sanitized)
            .unwrap_or_else(|| self.page_dir_path().join(format!("{sanitized}.md")));

        if !file.exists() {
            fs::write(&file, crate::codec::canonical_footer())?;
        }

        let page = Page {
            name: name.to_string(),
            url: url.unwrap_or_default().to_string(),
            file,
            state: PageState::Idle,
            last_seen: Instant::now(),
        };
        info!(page = %name, file = %page.file.display(), "page registered");
        self.pages.insert(name.to_string(), page.clone());
        self.update_master()?;
        Ok(page)
    }

    /// Scan the page directory for a file matching `sanitized` by stem
    /// (case-insensitive) that already carries the canonical footer
    /// sentinel, so an externally-created file can be adopted.
    fn find_adoptable_file(&self, sanitized: &str) -> Option<PathBuf> {
        let dir = self.page_dir_path();
        let entries = fs::read_dir(&dir).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !stem.eq_ignore_ascii_case(sanitized) {
                continue;
            }
            if let Ok(content) = fs::read_to_string(&path) {
                if content.contains(FOOTER_DIVIDER) {
                    debug!(file = %path.display(), "adopted existing page file");
                    return Some(path);
                }
            }
        }
        None
    }

    /// Update a page's in-memory state (e.g. after a job starts/finishes).
    pub fn set_state(&mut self, name: &str, state: PageState) {
        if let Some(page) = self.pages.get_mut(name) {
            page.state = state;
        }
    }

    /// Pure read: the current page for `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Page> {
        self.pages.get(name)
    }

    /// Pure read: every known page.
    #[must_use]
    pub fn all(&self) -> Vec<&Page> {
        self.pages.values().collect()
    }

    /// Re-render the master index from the current page map, sorted by
    /// `lastSeen` descending, and write it to disk.
    pub fn update_master(&self) -> BrokerResult<()> {
        fs::write(self.master_path(), self.render_master())?;
        Ok(())
    }

    fn render_master(&self) -> String {
        let mut pages: Vec<&Page> = self.pages.values().collect();
        pages.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));

        let mut out = String::from("# daebug\n\n");
        out.push_str(&format!(
            "Broker running for {:.0}s.\n\n",
            self.start_time.elapsed().as_secs_f64()
        ));
        if pages.is_empty() {
            out.push_str("No pages connected yet.\n\n");
        } else {
            out.push_str("| page | url | state |\n|---|---|---|\n");
            for page in pages {
                let state = match page.state {
                    PageState::Idle => "idle",
                    PageState::Executing => "executing",
                };
                out.push_str(&format!(
                    "| {} | {} | {} |\n",
                    page.name, page.url, state
                ));
            }
            out.push('\n');
        }
        out.push_str("Write a line containing exactly `%%SHUTDOWN%%` below to stop the broker.\n");
        out
    }

    /// Rewrite the master file with the shutdown template (`spec.md` §4.G).
    pub fn write_shutdown_template(&self) -> BrokerResult<()> {
        fs::write(self.master_path(), "# daebug\n\nShutting down.\n")?;
        Ok(())
    }
}
