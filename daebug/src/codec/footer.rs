//! Canonical-footer location, shared by request parsing and reply writing.

use super::{FOOTER_DIVIDER, FOOTER_INSTRUCTION};

/// Byte offset of the first line in the *last* canonical footer, plus the
/// byte offset where the "region below the footer" begins.
pub struct FooterLocation {
    /// Offset of the `-----` divider line.
    pub start: usize,
    /// Offset right after the footer's own trailing newline (or end of
    /// string if the footer is the last thing in the file).
    pub region_start: usize,
}

/// Find the last occurrence of the two-line canonical footer.
#[must_use]
pub fn find_last_footer(text: &str) -> Option<FooterLocation> {
    let mut found = None;
    for (idx, _) in text.match_indices(FOOTER_DIVIDER) {
        let at_line_start = idx == 0 || text.as_bytes().get(idx - 1) == Some(&b'\n');
        if !at_line_start {
            continue;
        }
        let after_divider = idx + FOOTER_DIVIDER.len();
        // The divider line must end right there (end of string or newline).
        match text.as_bytes().get(after_divider) {
            None => {
                // Footer divider with no instruction line following can't be
                // a complete footer.
                continue;
            }
            Some(b'\n') => {}
            Some(b'\r') if text.as_bytes().get(after_divider + 1) == Some(&b'\n') => {
                continue; // CRLF not supported by the byte-exact footer match
            }
            Some(_) => continue,
        }
        let after_newline = after_divider + 1;
        let rest = &text[after_newline..];
        let instruction_line_len = rest.find('\n').unwrap_or(rest.len());
        let instruction_line = &rest[..instruction_line_len];
        if instruction_line == FOOTER_INSTRUCTION {
            let region_start = if after_newline + instruction_line_len < text.len() {
                after_newline + instruction_line_len + 1
            } else {
                text.len()
            };
            found = Some(FooterLocation {
                start: idx,
                region_start,
            });
        }
    }
    found
}

/// The text with its trailing canonical footer (if any) excised, so callers
/// can re-append a freshly rendered one without duplicating it.
///
/// The footer is usually *not* the last thing in the file: the realistic
/// case (`spec.md` §4.B) is the agent's pending request sitting right below
/// it. That content must survive the strip, just with the footer's own two
/// lines removed from between the prior conversation and it — which is why
/// this returns an owned `String` rather than a slice.
#[must_use]
pub fn strip_trailing_footer(text: &str) -> String {
    match find_last_footer(text) {
        Some(loc) => {
            let before = text[..loc.start].trim_end_matches('\n');
            let after = text[loc.region_start..].trim_end_matches('\n');
            if after.is_empty() {
                before.to_string()
            } else {
                format!("{before}\n\n{after}")
            }
        }
        None => text.trim_end_matches('\n').to_string(),
    }
}
