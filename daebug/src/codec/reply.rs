//! `writeExecuting` and `writeReply` (`spec.md` §4.B).
//!
//! These are synchronous, file-at-a-time operations; callers running inside
//! the async broker dispatch them via `tokio::task::spawn_blocking`.

use super::{
    canonical_footer, events::BackgroundEvent, footer::strip_trailing_footer, JobResultPayload,
    REPLY_HEADER_RE,
};
use serde_json::Value;
use std::{
    path::Path,
    time::Duration,
};
use thiserror::Error;

/// Everything `writeExecuting`/`writeReply` need about the job they're
/// writing for. Kept separate from [`crate::jobs::Job`] to avoid a
/// dependency cycle between the codec and job-manager modules.
///
/// The original agent request (header and code fence) is never touched by
/// either function: it already sits in the file from when it was parsed, and
/// stays there untouched below the spliced-in reply.
#[derive(Debug, Clone, Copy)]
pub struct ReplyTarget<'a> {
    /// The page's own name, as it appears in headers.
    pub page_name: &'a str,
    /// The agent the request came from.
    pub agent: &'a str,
}

/// Failure modes for the write operations (`spec.md` §7 "Write race").
#[derive(Debug, Error)]
pub enum WriteError {
    /// The backing file doesn't exist (deleted, or never seen yet).
    #[error("file missing")]
    Missing,
    /// Any other I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn read_existing(path: &Path) -> Result<String, WriteError> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(WriteError::Missing),
        Err(e) => Err(WriteError::Io(e)),
    }
}

fn executing_line(secs: u64) -> String {
    format!("executing ({secs}s)")
}

fn reply_header_line(page: &str, agent: &str, now: &str, is_error: bool, duration: &str) -> String {
    if is_error {
        format!("> **{page}** to {agent} at {now} (**ERROR**) ({duration})")
    } else {
        format!("> **{page}** to {agent} at {now} ({duration})")
    }
}

/// The executing-placeholder header: the same shape as a finished reply
/// header (`spec.md` §4.B), but with no trailing `(duration)` at all.
fn executing_header_line(page: &str, agent: &str, now: &str) -> String {
    format!("> **{page}** to {agent} at {now}")
}

/// Write the "executing" placeholder for a freshly started job.
///
/// Returns [`WriteError::Missing`] if the file doesn't exist; the caller
/// decides whether that's a race to warn about or a tick to swallow.
pub fn write_executing(path: &Path, target: &ReplyTarget<'_>, now: &str) -> Result<(), WriteError> {
    let content = read_existing(path)?;
    let base = strip_trailing_footer(&content);
    let header = executing_header_line(target.page_name, target.agent, now);
    let block = format!("{header}\n{}\n", executing_line(0));
    let new_text = format!("{}\n\n{block}{}", base.trim_end_matches('\n'), canonical_footer());
    std::fs::write(path, new_text)?;
    Ok(())
}

/// Refresh an in-flight "executing (Ns)" placeholder. Called every 5 seconds
/// while a job runs. A missing file is swallowed by the caller per
/// `spec.md` §4.B.
pub fn refresh_executing(path: &Path, elapsed: Duration) -> Result<(), WriteError> {
    let content = read_existing(path)?;
    let Some(m) = super::EXECUTING_RE.find(&content) else {
        return Ok(());
    };
    let replacement = executing_line(elapsed.as_secs());
    let new_text = format!("{}{}{}", &content[..m.start()], replacement, &content[m.end()..]);
    std::fs::write(path, new_text)?;
    Ok(())
}

/// Splice the final reply into place, replacing the executing placeholder if
/// one exists, or appending a fresh request+reply pair if it doesn't.
pub fn write_reply(
    path: &Path,
    target: &ReplyTarget<'_>,
    now: &str,
    duration: Duration,
    result: &JobResultPayload,
) -> Result<(), WriteError> {
    let content = read_existing(path)?;
    let base = strip_trailing_footer(&content);

    let is_error = !result.is_ok();
    let header = reply_header_line(
        target.page_name,
        target.agent,
        now,
        is_error,
        &crate::clock::duration_fmt(duration),
    );
    let result_block = render_result_block(result);
    let events_block = render_background_events(result.background_events());
    let reply = format!("{header}\n{result_block}{events_block}");

    let spliced = match find_executing_block(&base, target.page_name, target.agent) {
        Some((start, end)) => format!("{}{reply}{}", &base[..start], &base[end..]),
        None => {
            // The executing placeholder should already be in place by the
            // time a reply is written; if it isn't (a missed write, or the
            // file changed out from under us), the original request is
            // still sitting in `base` untouched, so just append the reply
            // after it rather than reconstructing a second copy of it.
            format!("{}\n\n{reply}", base.trim_end_matches('\n'))
        }
    };

    let new_text = format!("{}\n{}", spliced.trim_end_matches('\n'), canonical_footer());
    std::fs::write(path, new_text)?;
    Ok(())
}

/// Locate the byte range `[start, end)` of an existing executing block for
/// `(page, agent)`: a reply header whose very next line is `executing (`.
fn find_executing_block(text: &str, page: &str, agent: &str) -> Option<(usize, usize)> {
    let mut found = None;
    for caps in REPLY_HEADER_RE.captures_iter(text) {
        if &caps[1] != page || &caps[2] != agent {
            continue;
        }
        let m = caps.get(0).unwrap();
        let header_end = m.end();
        let Some(after_nl) = text[header_end..].strip_prefix('\n').map(|_| header_end + 1) else {
            continue;
        };
        let rest = &text[after_nl..];
        if !rest.starts_with("executing (") {
            continue;
        }
        let line_len = rest.find('\n').map_or(rest.len(), |i| i + 1);
        found = Some((m.start(), after_nl + line_len));
    }
    found
}

fn render_result_block(result: &JobResultPayload) -> String {
    match result {
        JobResultPayload::Ok { value, .. } => {
            let body = if value.is_object() {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
            } else {
                js_string_repr(value)
            };
            format!("```JSON\n{body}\n```\n")
        }
        JobResultPayload::Err { error, .. } => {
            format!("```Error\n{error}\n```\n")
        }
    }
}

fn js_string_repr(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(js_string_repr)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => serde_json::to_string(v).unwrap_or_default(),
    }
}

fn render_background_events(events: &[BackgroundEvent]) -> String {
    if events.is_empty() {
        return String::new();
    }
    if events.len() > 10 {
        let omitted = events.len() - 10;
        let mut out = String::new();
        for ev in &events[..2] {
            out.push_str(&ev.render());
        }
        out.push_str(&format!("... ({omitted} more background events omitted) ...\n"));
        for ev in &events[events.len() - 8..] {
            out.push_str(&ev.render());
        }
        out
    } else {
        events.iter().map(BackgroundEvent::render).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{canonical_footer, parse_request, EventKind, FOOTER_DIVIDER};
    use tempfile::NamedTempFile;

    fn write_tmp(content: &str) -> NamedTempFile {
        let f = NamedTempFile::new().unwrap();
        std::fs::write(f.path(), content).unwrap();
        f
    }

    #[test]
    fn executing_then_reply_then_parse_is_null() {
        let text = format!(
            "> **alice** to p at 12:00:00\n```js\n1+1\n```\n{}",
            canonical_footer()
        );
        let file = write_tmp(&text);
        let target = ReplyTarget {
            page_name: "p",
            agent: "alice",
        };
        write_executing(file.path(), &target, "12:00:01").unwrap();

        let ok = JobResultPayload::Ok {
            ok: true,
            value: serde_json::json!(2),
            background_events: vec![],
            job_id: None,
        };
        write_reply(file.path(), &target, "12:00:02", Duration::from_millis(50), &ok).unwrap();

        let final_text = std::fs::read_to_string(file.path()).unwrap();
        assert!(final_text.contains("```JSON\n2\n```"));
        assert!(final_text.ends_with(&canonical_footer()));
        assert!(parse_request(&final_text, "p").is_none());
    }

    #[test]
    fn realistic_footer_above_request_leaves_exactly_one_footer() {
        // The layout the broker actually reads: the footer sits above the
        // agent's pending request, not at the end of the file.
        let text = format!(
            "history\n\n{}> **alice** to p at 12:00:00\n```js\n1+1\n```\n",
            canonical_footer()
        );
        let file = write_tmp(&text);
        let target = ReplyTarget {
            page_name: "p",
            agent: "alice",
        };
        write_executing(file.path(), &target, "12:00:01").unwrap();
        let after_executing = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(after_executing.matches(FOOTER_DIVIDER).count(), 1);
        assert!(after_executing.contains("```js\n1+1\n```"));
        assert!(after_executing.contains("executing (0s)"));

        let ok = JobResultPayload::Ok {
            ok: true,
            value: serde_json::json!(2),
            background_events: vec![],
            job_id: None,
        };
        write_reply(file.path(), &target, "12:00:02", Duration::from_millis(50), &ok).unwrap();

        let final_text = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(final_text.matches(FOOTER_DIVIDER).count(), 1);
        assert_eq!(final_text.matches("```js\n1+1\n```").count(), 1);
        assert!(final_text.contains("```JSON\n2\n```"));
        assert!(final_text.ends_with(&canonical_footer()));
    }

    #[test]
    fn missing_placeholder_appends_reply_without_duplicating_request() {
        let text = format!(
            "> **alice** to p at 12:00:00\n```js\n2+3\n```\n{}",
            canonical_footer()
        );
        let file = write_tmp(&text);
        let target = ReplyTarget {
            page_name: "p",
            agent: "agent",
        };
        let ok = JobResultPayload::Ok {
            ok: true,
            value: serde_json::json!(5),
            background_events: vec![],
            job_id: None,
        };
        // No write_executing call: simulates a missed placeholder write.
        write_reply(file.path(), &target, "12:00:02", Duration::from_millis(10), &ok).unwrap();
        let final_text = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(final_text.matches("```js\n2+3\n```").count(), 1);
        assert!(final_text.contains("```JSON\n5\n```"));
    }

    #[test]
    fn error_reply_marks_header_and_uses_error_fence() {
        let text = format!(
            "> **alice** to p at 12:00:00\n```js\nthrow 1\n```\n{}",
            canonical_footer()
        );
        let file = write_tmp(&text);
        let target = ReplyTarget {
            page_name: "p",
            agent: "alice",
        };
        write_executing(file.path(), &target, "12:00:01").unwrap();
        let err = JobResultPayload::Err {
            ok: false,
            error: "job timed out after 60000ms".to_string(),
            background_events: vec![],
            job_id: None,
        };
        write_reply(
            file.path(),
            &target,
            "12:01:01",
            Duration::from_secs(60),
            &err,
        )
        .unwrap();
        let final_text = std::fs::read_to_string(file.path()).unwrap();
        assert!(final_text.contains("(**ERROR**)"));
        assert!(final_text.contains("```Error\njob timed out after 60000ms\n```"));
    }

    #[test]
    fn over_ten_background_events_are_truncated() {
        let events: Vec<BackgroundEvent> = (0..13)
            .map(|i| BackgroundEvent {
                kind: EventKind::Console,
                level: Some("log".to_string()),
                source: None,
                ts: i,
                message: format!("msg {i}"),
                stack: None,
                caller: None,
            })
            .collect();
        let rendered = render_background_events(&events);
        assert!(rendered.contains("msg 0"));
        assert!(rendered.contains("msg 1"));
        assert!(!rendered.contains("msg 2\n") || rendered.contains("(3 more background events omitted)"));
        assert!(rendered.contains("(3 more background events omitted)"));
        assert!(rendered.contains("msg 5"));
        assert!(rendered.contains("msg 12"));
    }

    #[test]
    fn missing_file_reports_missing() {
        let err = write_executing(
            Path::new("/nonexistent/path/file.md"),
            &ReplyTarget {
                page_name: "p",
                agent: "a",
            },
            "00:00:00",
        )
        .unwrap_err();
        assert!(matches!(err, WriteError::Missing));
    }
}
