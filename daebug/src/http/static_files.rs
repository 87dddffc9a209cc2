//! Static file surface with HTML/JSON import-map injection (`spec.md` §4.F).

use super::{importmap, AppState};
use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use tracing::warn;

/// The injected `<script>` payload for the browser-side poll/execute loop
/// (`spec.md` §6's "injected client contract").
#[must_use]
pub fn default_client_script() -> String {
    include_str!("client.js").to_string()
}

pub async fn handle(State(state): State<AppState>, uri: Uri) -> Response {
    let relative = uri.path().trim_start_matches('/');
    let relative = if relative.is_empty() { "index.html" } else { relative };
    let path = state.root.join(relative);

    // Refuse to serve outside root, however the path got constructed.
    let Ok(canonical_root) = std::fs::canonicalize(&state.root) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Ok(canonical) = std::fs::canonicalize(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !canonical.starts_with(&canonical_root) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let bytes = match std::fs::read(&canonical) {
        Ok(b) => b,
        Err(e) => {
            warn!(path = %canonical.display(), error = %e, "static file read failed");
            return StatusCode::NOT_FOUND.into_response();
        }
    };

    let mime = mime_guess::from_path(&canonical).first_or_octet_stream();

    if mime.essence_str() == "text/html" {
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let injected = inject_into_html(&text, &state.client_script);
        return (
            [(header::CONTENT_TYPE, "text/html")],
            injected,
        )
            .into_response();
    }

    if mime.essence_str() == "application/json" {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) {
            if importmap::looks_like_importmap(&value) {
                let merged = importmap::merge_importmap(&value, &importmap::client_imports());
                let rendered = serde_json::to_string_pretty(&merged).unwrap_or_default();
                return (
                    [(header::CONTENT_TYPE, "application/json")],
                    rendered,
                )
                    .into_response();
            }
        }
    }

    (
        [(header::CONTENT_TYPE, mime.essence_str().to_string())],
        bytes,
    )
        .into_response()
}

/// Inject the import map and client script into an HTML document,
/// preferring the insertion points `spec.md` §4.F lists in order.
fn inject_into_html(html: &str, client_script: &str) -> String {
    let mut out = html.to_string();

    if let Some((start, end)) = importmap::find_existing_importmap(&out) {
        if let Ok(existing) = serde_json::from_str::<serde_json::Value>(&out[start..end]) {
            let merged = importmap::merge_importmap(&existing, &importmap::client_imports());
            let rendered = serde_json::to_string(&merged).unwrap_or_default();
            out.replace_range(start..end, &rendered);
        }
    } else {
        let tag = format!(
            "<script type=\"importmap\">{}</script>",
            serde_json::json!({ "imports": importmap::client_imports() })
        );
        let point = importmap::importmap_insertion_point(&out);
        out.insert_str(point, &tag);
    }

    let script_tag = format!("<script type=\"module\">{client_script}</script>");
    let point = importmap::client_script_insertion_point(&out);
    out.insert_str(point, &script_tag);

    out
}
