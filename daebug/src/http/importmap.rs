//! Import-map merge logic for injected HTML and JSON (`spec.md` §4.F).

use serde_json::{json, Value};

/// Module specifiers the injected client script needs resolved, mirroring
/// the synthetic specifiers `spec.md` §6's injected client contract expects
/// to be importable.
#[must_use]
pub fn client_imports() -> Value {
    json!({
        "daebug:client": "/__daebug/client.js"
    })
}

/// Merge `client_imports()` into an existing import map JSON value,
/// preferring entries already present (don't clobber a page's own mapping).
#[must_use]
pub fn merge_importmap(existing: &Value, additions: &Value) -> Value {
    let mut merged = existing.clone();
    let Some(obj) = merged.as_object_mut() else {
        return additions.clone();
    };
    let imports = obj
        .entry("imports")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .map(std::mem::take);
    let mut imports = imports.unwrap_or_default();
    if let Some(add_imports) = additions.get("imports").and_then(Value::as_object) {
        for (k, v) in add_imports {
            imports.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
    obj.insert("imports".to_string(), Value::Object(imports));
    merged
}

/// Whether a parsed JSON value looks like an external import map
/// (`spec.md` §4.F: top-level `imports` or `scopes` key).
#[must_use]
pub fn looks_like_importmap(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.contains_key("imports") || obj.contains_key("scopes"))
}

/// Find the best insertion point for a new `<script type="importmap">` tag,
/// in `spec.md` §4.F's stated preference order, returning a byte offset.
#[must_use]
pub fn importmap_insertion_point(html: &str) -> usize {
    if let Some(pos) = html.find("</head>") {
        return pos;
    }
    if let Some(pos) = find_first_script_tag(html) {
        return pos;
    }
    if let Some(pos) = html.find("<body") {
        if let Some(close) = html[pos..].find('>') {
            return pos + close + 1;
        }
    }
    0
}

/// Find the best insertion point for the injected client `<script>` tag.
#[must_use]
pub fn client_script_insertion_point(html: &str) -> usize {
    if let Some(pos) = html.find("</body>") {
        return pos;
    }
    if let Some(pos) = html.find("</html>") {
        return pos;
    }
    html.len()
}

fn find_first_script_tag(html: &str) -> Option<usize> {
    html.find("<script")
}

/// Locate an existing `<script type="importmap">...</script>` block, if any,
/// returning the byte range of its JSON body.
#[must_use]
pub fn find_existing_importmap(html: &str) -> Option<(usize, usize)> {
    let tag_start = html.find("type=\"importmap\"").or_else(|| html.find("type='importmap'"))?;
    let open = html[tag_start..].find('>')? + tag_start + 1;
    let close = html[open..].find("</script>")? + open;
    Some((open, close))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_without_clobbering_existing_entries() {
        let existing = json!({"imports": {"daebug:client": "/already-set.js"}});
        let merged = merge_importmap(&existing, &client_imports());
        assert_eq!(
            merged["imports"]["daebug:client"],
            json!("/already-set.js")
        );
    }

    #[test]
    fn detects_importmap_by_top_level_keys() {
        assert!(looks_like_importmap(&json!({"imports": {}})));
        assert!(looks_like_importmap(&json!({"scopes": {}})));
        assert!(!looks_like_importmap(&json!({"other": {}})));
    }

    #[test]
    fn insertion_prefers_head_close() {
        let html = "<html><head></head><body></body></html>";
        let point = importmap_insertion_point(html);
        assert_eq!(&html[point..point + 7], "</head>");
    }

    #[test]
    fn insertion_falls_back_to_first_script() {
        let html = "<html><body><script>1</script></body></html>";
        let point = importmap_insertion_point(html);
        assert_eq!(&html[point..point + 7], "<script");
    }

    #[test]
    fn finds_existing_importmap_block() {
        let html = r#"<script type="importmap">{"imports":{}}</script>"#;
        let (start, end) = find_existing_importmap(html).unwrap();
        assert_eq!(&html[start..end], r#"{"imports":{}}"#);
    }
}
