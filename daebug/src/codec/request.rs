//! `parseRequest` (`spec.md` §4.B).

use super::{
    fenced::{find_fenced_blocks, is_js_lang},
    footer::find_last_footer,
    ParsedRequest, AGENT_HEADER_RE, REPLY_HEADER_RE,
};

/// Extract the next pending request from a page file's current text, if any.
///
/// Returns `None` for every "nothing new to do" case the spec enumerates:
/// an empty post-footer region, an empty/whitespace-only code body, and a
/// fenced block that's really an echoed reply header rather than new code.
#[must_use]
pub fn parse_request(text: &str, page_name: &str) -> Option<ParsedRequest> {
    match find_last_footer(text) {
        Some(loc) => parse_with_footer(&text[loc.region_start..], page_name),
        None => parse_without_footer(text, page_name),
    }
}

fn parse_with_footer(region: &str, page_name: &str) -> Option<ParsedRequest> {
    if region.trim().is_empty() {
        return None;
    }

    let blank_skip = skip_blank_lines(region);
    let after_blanks = &region[blank_skip..];
    let first_line_len = after_blanks.find('\n').map_or(after_blanks.len(), |i| i + 1);
    let first_line = after_blanks[..first_line_len].trim_end_matches(['\n', '\r']);

    let (agent, target, time, rest) = match AGENT_HEADER_RE.captures(first_line) {
        Some(caps) => (
            caps[1].to_string(),
            caps[2].to_string(),
            caps[3].to_string(),
            &after_blanks[first_line_len..],
        ),
        None => (
            "agent".to_string(),
            page_name.to_string(),
            String::new(),
            after_blanks,
        ),
    };

    let code = extract_js_code(rest)?;

    Some(ParsedRequest {
        agent,
        target,
        time,
        code,
        has_footer: true,
    })
}

fn parse_without_footer(text: &str, page_name: &str) -> Option<ParsedRequest> {
    let block = find_fenced_blocks(text)
        .into_iter()
        .filter(|b| is_js_lang(&b.lang))
        .last()?;

    if let Some(prior_line) = nearest_non_blank_line_before(&text[..block.start]) {
        if let Some(caps) = REPLY_HEADER_RE.captures(prior_line) {
            if &caps[1] == page_name {
                return None;
            }
        }
    }

    let code = trim_one_trailing_newline(&block.body);
    if code.trim().is_empty() || begins_with_reply_header(&code) {
        return None;
    }

    Some(ParsedRequest {
        agent: "agent".to_string(),
        target: page_name.to_string(),
        time: String::new(),
        code,
        has_footer: false,
    })
}

/// Find the first JS fenced block in `rest` and return its trimmed body,
/// rejecting empty bodies and bodies that echo a reply header.
fn extract_js_code(rest: &str) -> Option<String> {
    let block = find_fenced_blocks(rest)
        .into_iter()
        .find(|b| is_js_lang(&b.lang))?;
    let code = trim_one_trailing_newline(&block.body);
    if code.trim().is_empty() || begins_with_reply_header(&code) {
        return None;
    }
    Some(code)
}

fn begins_with_reply_header(code: &str) -> bool {
    code.lines().next().is_some_and(|l| REPLY_HEADER_RE.is_match(l))
}

fn skip_blank_lines(s: &str) -> usize {
    let mut offset = 0;
    for line in s.split_inclusive('\n') {
        if line.trim().is_empty() {
            offset += line.len();
        } else {
            break;
        }
    }
    offset
}

fn trim_one_trailing_newline(s: &str) -> String {
    s.strip_suffix('\n').unwrap_or(s).to_string()
}

fn nearest_non_blank_line_before(s: &str) -> Option<&str> {
    let mut remaining = s;
    loop {
        let trimmed = remaining.trim_end_matches('\n');
        if trimmed.is_empty() {
            return None;
        }
        let start = trimmed.rfind('\n').map_or(0, |i| i + 1);
        let line = &trimmed[start..];
        if line.trim().is_empty() {
            remaining = &trimmed[..start];
        } else {
            return Some(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::canonical_footer;

    fn footer_file(conversation: &str, request: &str) -> String {
        format!("{conversation}{}{request}", canonical_footer())
    }

    #[test]
    fn happy_path_with_agent_header() {
        let text = footer_file(
            "history\n",
            "> **alice** to p at 12:00:00\n```js\n1+1\n```\n",
        );
        let req = parse_request(&text, "p").unwrap();
        assert_eq!(req.agent, "alice");
        assert_eq!(req.target, "p");
        assert_eq!(req.time, "12:00:00");
        assert_eq!(req.code, "1+1");
        assert!(req.has_footer);
    }

    #[test]
    fn missing_agent_header_uses_defaults() {
        let text = footer_file("history\n", "```js\n2+2\n```\n");
        let req = parse_request(&text, "p").unwrap();
        assert_eq!(req.agent, "agent");
        assert_eq!(req.target, "p");
        assert_eq!(req.time, "");
        assert_eq!(req.code, "2+2");
    }

    #[test]
    fn empty_region_below_footer_is_none() {
        let text = footer_file("history\n", "   \n\n");
        assert!(parse_request(&text, "p").is_none());
    }

    #[test]
    fn empty_fence_body_is_none() {
        let text = footer_file("history\n", "```js\n```\n");
        assert!(parse_request(&text, "p").is_none());
    }

    #[test]
    fn fence_with_only_reply_header_is_none() {
        let text = footer_file(
            "history\n",
            "```js\n> **p** to alice at 12:00:00\n```\n",
        );
        assert!(parse_request(&text, "p").is_none());
    }

    #[test]
    fn no_footer_recovery_picks_last_js_fence() {
        let text = "some notes\n```js\n2+3\n```\n";
        let req = parse_request(text, "p").unwrap();
        assert_eq!(req.agent, "agent");
        assert_eq!(req.code, "2+3");
        assert!(!req.has_footer);
    }

    #[test]
    fn no_footer_skips_answered_reply_fence() {
        let text = "> **p** to alice at 12:00:00 (10ms)\n```JSON\n2\n```\n";
        assert!(parse_request(text, "p").is_none());
    }

    #[test]
    fn no_footer_with_only_non_js_fence_is_none() {
        let text = "```python\nprint(1)\n```\n";
        assert!(parse_request(text, "p").is_none());
    }

    #[test]
    fn parse_after_reply_is_null_until_new_request() {
        let replied = footer_file(
            "> **alice** to p at 12:00:00\n```js\n1+1\n```\n",
            "",
        );
        // Simulate a footer with nothing below it (reply already spliced in
        // above the footer by codec::reply): parsing again yields None.
        assert!(parse_request(&replied, "p").is_none());
    }
}
