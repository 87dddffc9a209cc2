//! Fenced-code-block scanning, shared by request parsing and reply splicing.

/// A single fenced block found in a Markdown document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock {
    /// The language tag on the opening fence line (may be empty).
    pub lang: String,
    /// The block body, exactly as it appears between the fences (no
    /// trailing-newline trimming applied here — callers trim per §4.B).
    pub body: String,
    /// Byte offset of the opening ` ``` ` line.
    pub start: usize,
    /// Byte offset just past the closing ` ``` ` line (including its
    /// trailing newline, if any).
    pub end: usize,
}

/// Scan `text` for every top-level fenced block (` ``` ` ... ` ``` `).
///
/// Fences are matched line-by-line: an opening line is a line whose trimmed
/// content starts with three backticks followed only by an optional bare
/// word (the language tag); a closing line is a line whose trimmed content
/// is exactly three backticks. Nesting is not supported — a fence only
/// closes on the next bare ` ``` ` line, matching how editors render them.
#[must_use]
pub fn find_fenced_blocks(text: &str) -> Vec<FencedBlock> {
    let mut blocks = Vec::new();
    let mut offset = 0usize;
    let mut lines = text.split_inclusive('\n').peekable();

    while let Some(line) = lines.next() {
        let line_start = offset;
        offset += line.len();
        let trimmed = line.trim_end_matches(['\n', '\r']);
        let trimmed_lead = trimmed.trim_start();
        if let Some(rest) = trimmed_lead.strip_prefix("```") {
            if !rest.is_empty() && !rest.chars().all(|c| c.is_ascii_alphanumeric()) {
                // Not a valid opening fence (e.g. a line of four+ backticks
                // used as literal text); skip it.
                continue;
            }
            let lang = rest.to_string();
            let body_start = offset;
            let mut body_end = offset;
            let mut closed = false;
            for close_line in lines.by_ref() {
                let close_trimmed = close_line.trim_end_matches(['\n', '\r']).trim();
                if close_trimmed == "```" {
                    offset += close_line.len();
                    closed = true;
                    break;
                }
                body_end += close_line.len();
                offset += close_line.len();
            }
            if closed {
                blocks.push(FencedBlock {
                    lang,
                    body: text[body_start..body_end].to_string(),
                    start: line_start,
                    end: offset,
                });
            }
            // An unterminated fence is simply dropped, same as a request
            // that never gets a closing marker before EOF.
        }
    }

    blocks
}

/// Whether a fence language tag counts as "JS" for request extraction.
#[must_use]
pub fn is_js_lang(lang: &str) -> bool {
    matches!(lang, "" | "js" | "javascript")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_single_block() {
        let text = "before\n```js\n1+1\n```\nafter\n";
        let blocks = find_fenced_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].lang, "js");
        assert_eq!(blocks[0].body, "1+1\n");
    }

    #[test]
    fn finds_multiple_blocks_in_order() {
        let text = "```\na\n```\ntext\n```javascript\nb\n```\n";
        let blocks = find_fenced_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].body, "a\n");
        assert_eq!(blocks[1].lang, "javascript");
        assert_eq!(blocks[1].body, "b\n");
    }

    #[test]
    fn unterminated_fence_is_dropped() {
        let text = "```js\nno closing fence here\n";
        assert!(find_fenced_blocks(text).is_empty());
    }

    #[test]
    fn empty_body_is_a_block_with_empty_string() {
        let text = "```js\n```\n";
        let blocks = find_fenced_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].body, "");
    }
}
