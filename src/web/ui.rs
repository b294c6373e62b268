//! Browser UI.
//!
//! The inspector page and its scripts are compiled into the binary. The
//! dark-mode stylesheet and the theme toggle are linked into the page by
//! injecting tags before `</head>` and `</body>`, so a replacement
//! `index.html` from `web.static_path` gets them too.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode, Uri},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use tower::ServiceExt;
use tower_http::services::ServeDir;

const INDEX_HTML: &str = include_str!("../../assets/index.html");
const CUSTOM_CSS: &str = include_str!("../../assets/custom.css");
const CUSTOM_JS: &str = include_str!("../../assets/custom.js");
const APP_JS: &str = include_str!("../../assets/app.js");

const CSS_TAG: &str = "    <link rel=\"stylesheet\" href=\"css/custom.css\">\n";
const JS_TAG: &str = "    <script src=\"js/custom.js\"></script>\n";

const CSS_CONTENT_TYPE: &str = "text/css; charset=utf-8";
const JS_CONTENT_TYPE: &str = "application/javascript; charset=utf-8";

/// Insert `insertion` before the last case-insensitive occurrence of
/// `marker`.
///
/// Returns `html` unchanged when it already contains `insertion` or has no
/// `marker`.
pub fn inject_before(html: &str, marker: &str, insertion: &str) -> String {
    if html.contains(insertion) {
        return html.to_string();
    }
    // ASCII lowercasing keeps byte offsets intact.
    let lower = html.to_ascii_lowercase();
    match lower.rfind(&marker.to_ascii_lowercase()) {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + insertion.len());
            out.push_str(&html[..pos]);
            out.push_str(insertion);
            out.push_str(&html[pos..]);
            out
        }
        None => html.to_string(),
    }
}

/// The inspector page with the theme stylesheet and script linked in.
pub fn render_index(html: &str) -> String {
    let html = inject_before(html, "</head>", CSS_TAG);
    inject_before(&html, "</body>", JS_TAG)
}

struct UiState {
    index: String,
    web_path: String,
    static_dir: Option<PathBuf>,
}

/// Load the index page, preferring `index.html` from `static_dir`.
fn load_index(static_dir: Option<&Path>) -> String {
    if let Some(dir) = static_dir {
        let path = dir.join("index.html");
        match std::fs::read_to_string(&path) {
            Ok(html) => {
                tracing::info!("Serving UI index from {}", path.display());
                return render_index(&html);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!("Failed to read {}: {}; using built-in UI", path.display(), e);
            }
        }
    }
    render_index(INDEX_HTML)
}

/// Create the UI router mounted under `web_path`.
pub fn create_ui_router(web_path: &str, static_path: Option<&str>) -> Router {
    let static_dir = static_path.map(PathBuf::from);
    let state = Arc::new(UiState {
        index: load_index(static_dir.as_deref()),
        web_path: web_path.to_string(),
        static_dir,
    });

    let mut router = Router::new()
        .route(&format!("{}/", web_path), get(index))
        .route(&format!("{}/css/custom.css", web_path), get(custom_css))
        .route(&format!("{}/js/custom.js", web_path), get(custom_js))
        .route(&format!("{}/js/app.js", web_path), get(app_js));

    if !web_path.is_empty() {
        let target = format!("{}/", web_path);
        router = router.route(
            web_path,
            get(move || {
                let target = target.clone();
                async move { Redirect::permanent(&target) }
            }),
        );
    }

    router.fallback(static_asset).with_state(state)
}

async fn index(State(state): State<Arc<UiState>>) -> Html<String> {
    Html(state.index.clone())
}

async fn custom_css() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, CSS_CONTENT_TYPE)], CUSTOM_CSS)
}

async fn custom_js() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, JS_CONTENT_TYPE)], CUSTOM_JS)
}

async fn app_js() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, JS_CONTENT_TYPE)], APP_JS)
}

/// Serve files from `web.static_path` below `web_path`.
async fn static_asset(State(state): State<Arc<UiState>>, mut req: Request) -> Response {
    let Some(dir) = &state.static_dir else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(rest) = req
        .uri()
        .path()
        .strip_prefix(state.web_path.as_str())
        .filter(|rest| rest.starts_with('/'))
    else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Ok(uri) = rest.parse::<Uri>() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    *req.uri_mut() = uri;

    match ServeDir::new(dir).oneshot(req).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}
