//! Background events (`spec.md` §3, §4.B, §9).

use serde::{Deserialize, Serialize};

/// Discriminant for a [`BackgroundEvent`]: a console call or an uncaught
/// error observed by the runtime outside the current job's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A `console.*` call.
    Console,
    /// An uncaught error or rejection.
    Error,
}

/// A console or error observation captured outside the current job's result
/// value (`spec.md` GLOSSARY: "Background event").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundEvent {
    /// Console call vs. uncaught error.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// `console.<level>` level, e.g. `"log"`, `"warn"`, `"error"`.
    #[serde(default)]
    pub level: Option<String>,
    /// Origin of an error event: `"window.onerror"`, `"unhandledrejection"`,
    /// or absent for console events.
    #[serde(default)]
    pub source: Option<String>,
    /// Epoch-millisecond timestamp. The sources disagreed on string vs.
    /// epoch timestamps (`spec.md` §9 open question); this implementation
    /// fixes epoch milliseconds as the semantically minimal form.
    pub ts: i64,
    /// The console argument or error message, stringified by the client.
    pub message: String,
    /// An error's stack trace, if available.
    #[serde(default)]
    pub stack: Option<String>,
    /// The call site that produced the event, if the client captured one.
    #[serde(default)]
    pub caller: Option<String>,
}

impl BackgroundEvent {
    fn is_error_like(&self) -> bool {
        self.kind == EventKind::Error || self.level.as_deref() == Some("error")
    }

    /// The fence language tag this event renders under (`spec.md` §4.B).
    #[must_use]
    pub fn fence_lang(&self) -> &'static str {
        if self.is_error_like() {
            match self.source.as_deref() {
                Some("window.onerror") => "window.onerror",
                Some("unhandledrejection") => "unhandledrejection",
                _ => "Error",
            }
        } else if serde_json::from_str::<serde_json::Value>(&self.message).is_ok() {
            "JSON"
        } else {
            "Text"
        }
    }

    /// Render as a fenced Markdown block, including the trailing newline.
    #[must_use]
    pub fn render(&self) -> String {
        let lang = self.fence_lang();
        let header = if self.kind == EventKind::Console {
            let level = self.level.as_deref().unwrap_or("log");
            format!("```{lang} console.{level}\n")
        } else {
            format!("```{lang}\n")
        };

        let mut body = String::new();
        if let Some(caller) = &self.caller {
            body.push_str(caller);
            body.push('\n');
        }
        body.push_str(&self.message);
        if self.is_error_like() {
            if let Some(stack) = &self.stack {
                if !stack.is_empty() {
                    body.push('\n');
                    body.push_str(stack);
                }
            }
        }
        if !body.ends_with('\n') {
            body.push('\n');
        }

        format!("{header}{body}```\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console(level: &str, message: &str) -> BackgroundEvent {
        BackgroundEvent {
            kind: EventKind::Console,
            level: Some(level.to_string()),
            source: None,
            ts: 0,
            message: message.to_string(),
            stack: None,
            caller: None,
        }
    }

    #[test]
    fn console_text_gets_metadata_word() {
        let ev = console("log", "hello");
        assert_eq!(ev.fence_lang(), "Text");
        assert!(ev.render().starts_with("```Text console.log\n"));
    }

    #[test]
    fn console_json_message_renders_as_json() {
        let ev = console("info", r#"{"a":1}"#);
        assert_eq!(ev.fence_lang(), "JSON");
    }

    #[test]
    fn console_error_level_forces_error_lang() {
        let ev = console("error", "boom");
        assert_eq!(ev.fence_lang(), "Error");
    }

    #[test]
    fn window_onerror_source_is_preserved_as_lang() {
        let ev = BackgroundEvent {
            kind: EventKind::Error,
            level: None,
            source: Some("window.onerror".to_string()),
            ts: 0,
            message: "uncaught TypeError".to_string(),
            stack: Some("at foo.js:1:1".to_string()),
            caller: None,
        };
        assert_eq!(ev.fence_lang(), "window.onerror");
        let rendered = ev.render();
        assert!(rendered.starts_with("```window.onerror\n"));
        assert!(rendered.contains("uncaught TypeError"));
        assert!(rendered.contains("at foo.js:1:1"));
    }

    #[test]
    fn caller_is_prepended_to_body() {
        let mut ev = console("log", "hi");
        ev.caller = Some("handleClick (app.js:10)".to_string());
        let rendered = ev.render();
        let body_start = rendered.find('\n').unwrap() + 1;
        assert!(rendered[body_start..].starts_with("handleClick (app.js:10)\nhi\n"));
    }
}
