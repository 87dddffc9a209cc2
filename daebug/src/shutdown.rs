//! Shutdown watcher (`spec.md` §4.G).
//!
//! Not a separate OS-level watch: the master file is armed through the same
//! [`crate::watcher::Watcher`] as every page, keyed under the broker's
//! reserved sentinel name. This module owns only the pure sentinel check;
//! [`crate::broker::Broker::check_master`] is the component that wires it to
//! the file read and the shutdown transition.

use crate::codec::find_fenced_blocks;

/// Whether `content` contains a line equal, after trimming, to
/// `%%SHUTDOWN%%`. Occurrences inside fenced code or with leading/trailing
/// text on the line do not count (`spec.md` §4.G): a documentation example
/// showing the marker inside a fenced block must not trip the broker.
#[must_use]
pub fn contains_shutdown_sentinel(content: &str) -> bool {
    let fenced: Vec<(usize, usize)> = find_fenced_blocks(content)
        .into_iter()
        .map(|b| (b.start, b.end))
        .collect();

    let mut offset = 0usize;
    for line in content.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let in_fence = fenced.iter().any(|&(s, e)| line_start >= s && line_start < e);
        if !in_fence && line.trim() == "%%SHUTDOWN%%" {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_line_triggers() {
        assert!(contains_shutdown_sentinel("hello\n%%SHUTDOWN%%\n"));
    }

    #[test]
    fn prefixed_text_does_not_trigger() {
        assert!(!contains_shutdown_sentinel("please %%SHUTDOWN%% now"));
    }

    #[test]
    fn whitespace_around_sentinel_still_triggers() {
        assert!(contains_shutdown_sentinel("  %%SHUTDOWN%%  \n"));
    }

    #[test]
    fn fenced_occurrence_does_not_trigger() {
        let content = "Write `%%SHUTDOWN%%` to stop the broker, e.g.:\n```\n%%SHUTDOWN%%\n```\n";
        assert!(!contains_shutdown_sentinel(content));
    }

    #[test]
    fn bare_line_after_fenced_example_still_triggers() {
        let content = "example:\n```\n%%SHUTDOWN%%\n```\n%%SHUTDOWN%%\n";
        assert!(contains_shutdown_sentinel(content));
    }
}
