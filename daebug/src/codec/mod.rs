//! The Markdown wire protocol (`spec.md` §4.B).
//!
//! The Markdown file *is* the mailbox: every contract here is observable via
//! a file round-trip. This module owns parsing requests out of page files,
//! and rendering the executing placeholder and final replies back into them.

mod events;
mod fenced;
mod footer;
mod reply;
mod request;

pub use events::{BackgroundEvent, EventKind};
pub(crate) use fenced::{find_fenced_blocks, is_js_lang};
pub(crate) use footer::{find_last_footer, strip_trailing_footer};
pub use reply::{write_executing, write_reply, WriteError};
pub use request::parse_request;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

/// The divider line of the canonical footer: exactly 70 hyphens.
pub const FOOTER_DIVIDER: &str =
    "----------------------------------------------------------------------";

/// The instruction line of the canonical footer.
pub const FOOTER_INSTRUCTION: &str =
    "> Write code in a fenced JS block below to execute against this page.";

/// Render the two-line canonical footer, newline-terminated.
#[must_use]
pub fn canonical_footer() -> String {
    format!("{FOOTER_DIVIDER}\n{FOOTER_INSTRUCTION}\n")
}

pub(crate) static AGENT_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^> \*\*([^*]+)\*\* to (\S+) at (\d{2}:\d{2}:\d{2})\s*$").unwrap()
});

/// Matches both a finished reply header (`... at HH:MM:SS (duration)`, with
/// an optional `(**ERROR**)` marker) and a bare executing-placeholder header
/// (`... at HH:MM:SS`, no trailing parens at all) — the two share the same
/// `(page, agent, time)` prefix and are disambiguated by the caller looking
/// at the line that follows.
pub(crate) static REPLY_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^> \*\*([^*]+)\*\* to (\S+) at (\d{2}:\d{2}:\d{2})( \(\*\*ERROR\*\*\))?(?: \(([^)]+)\))?\s*$",
    )
    .unwrap()
});

pub(crate) static EXECUTING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"executing \(\d+s\)").unwrap());

/// A request parsed out of a page file, ready to become a [`crate::jobs::Job`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    /// Agent name from the request header, or `"agent"` if absent.
    pub agent: String,
    /// Target from the request header, or the page name if absent.
    pub target: String,
    /// Timestamp text captured from the header, or empty if absent/no-footer.
    pub time: String,
    /// The JS source to execute.
    pub code: String,
    /// Whether the request sat below a canonical footer.
    pub has_footer: bool,
}

/// The result payload posted back by a runtime (`spec.md` §3, §9).
///
/// Modeled as a tagged variant plus a back-compat flat-string shape, matching
/// the "dynamic payload shape" design note: `Ok`/`Err` carry the job outcome,
/// `errors` is accepted on input only for older clients.
///
/// `ok` is a boolean discriminant, not a string tag, so `serde(tag = ...)`
/// cannot express this shape directly — deserialization is implemented by
/// hand below, branching on the `ok` field the way the protocol does.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JobResultPayload {
    /// A successful execution with a JSON-able value.
    Ok {
        /// Always `true` on this variant; kept explicit for symmetry with
        /// the wire format described in `spec.md` §3.
        ok: bool,
        /// The value returned by the executed code.
        value: serde_json::Value,
        /// Background console/error events observed during execution.
        #[serde(rename = "backgroundEvents")]
        background_events: Vec<BackgroundEvent>,
        /// The job id this result answers, if the client echoed it back.
        #[serde(rename = "jobId")]
        job_id: Option<String>,
    },
    /// A failed execution with a string error.
    Err {
        /// Always `false` on this variant.
        ok: bool,
        /// The stringified error.
        error: String,
        /// Background events observed before the failure.
        #[serde(rename = "backgroundEvents")]
        background_events: Vec<BackgroundEvent>,
        /// The job id this result answers, if the client echoed it back.
        #[serde(rename = "jobId")]
        job_id: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct RawJobResult {
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    error: String,
    /// Deprecated flat error list, accepted for back-compat and folded into
    /// `error` when present and `error` itself is empty.
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default, rename = "backgroundEvents")]
    background_events: Vec<BackgroundEvent>,
    #[serde(default, rename = "jobId")]
    job_id: Option<String>,
}

impl<'de> Deserialize<'de> for JobResultPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawJobResult::deserialize(deserializer)?;
        Ok(if raw.ok {
            Self::Ok {
                ok: true,
                value: raw.value,
                background_events: raw.background_events,
                job_id: raw.job_id,
            }
        } else {
            let error = if raw.error.is_empty() && !raw.errors.is_empty() {
                raw.errors.join("; ")
            } else {
                raw.error
            };
            Self::Err {
                ok: false,
                error,
                background_events: raw.background_events,
                job_id: raw.job_id,
            }
        })
    }
}

impl JobResultPayload {
    /// Whether the client reported success.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// The background events attached to this result, regardless of variant.
    #[must_use]
    pub fn background_events(&self) -> &[BackgroundEvent] {
        match self {
            Self::Ok {
                background_events, ..
            }
            | Self::Err {
                background_events, ..
            } => background_events,
        }
    }
}
