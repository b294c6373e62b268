//! Browser UI assets and path prefix handling.

mod common;

use axum::http::StatusCode;
use common::{test_config, TestApp};
use tempfile::TempDir;

#[tokio::test]
async fn test_index_links_theme_assets() {
    let dir = TempDir::new().unwrap();
    let app = TestApp::start(test_config(&dir)).await;

    let index = app.api.get("/").await;
    assert_eq!(index.status_code(), StatusCode::OK);
    let html = index.text();
    assert!(html.contains(r#"<link rel="stylesheet" href="css/custom.css">"#));
    assert!(html.contains(r#"<script src="js/custom.js"></script>"#));

    let css = app.api.get("/css/custom.css").await;
    assert_eq!(css.header("content-type"), "text/css; charset=utf-8");
    assert!(css.text().contains("mh-dark"));

    let js = app.api.get("/js/custom.js").await;
    assert_eq!(
        js.header("content-type"),
        "application/javascript; charset=utf-8"
    );
    assert!(js.text().contains("localStorage"));
    assert!(js.text().contains("prefers-color-scheme"));

    let app_js = app.api.get("/js/app.js").await;
    assert_eq!(app_js.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_web_path_prefix() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.web.web_path = "mailhog/".to_string();
    let app = TestApp::start(config).await;

    assert_eq!(app.api.get("/mailhog/").await.status_code(), StatusCode::OK);
    assert_eq!(
        app.api.get("/mailhog/css/custom.css").await.status_code(),
        StatusCode::OK
    );
    assert_eq!(
        app.api.get("/mailhog/api/messages").await.status_code(),
        StatusCode::OK
    );
    assert_eq!(
        app.api.get("/api/messages").await.status_code(),
        StatusCode::NOT_FOUND
    );

    let redirect = app.api.get("/mailhog").await;
    assert_eq!(redirect.status_code(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(redirect.header("location"), "/mailhog/");

    assert_eq!(app.api.get("/health").await.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_static_path_overrides_index_and_serves_files() {
    let dir = TempDir::new().unwrap();
    let assets = dir.path().join("ui");
    std::fs::create_dir_all(&assets).unwrap();
    std::fs::write(
        assets.join("index.html"),
        "<html><HEAD><title>mine</title></HEAD><body>my inspector</body></html>",
    )
    .unwrap();
    std::fs::write(assets.join("logo.txt"), "logo").unwrap();

    let mut config = test_config(&dir);
    config.web.web_path = "/mh".to_string();
    config.web.static_path = Some(assets.to_string_lossy().into_owned());
    let app = TestApp::start(config).await;

    let html = app.api.get("/mh/").await.text();
    assert!(html.contains("my inspector"));
    let css = html.find("css/custom.css").unwrap();
    assert!(css < html.find("</HEAD>").unwrap());

    let logo = app.api.get("/mh/logo.txt").await;
    assert_eq!(logo.status_code(), StatusCode::OK);
    assert_eq!(logo.text(), "logo");

    assert_eq!(
        app.api.get("/mh/missing.txt").await.status_code(),
        StatusCode::NOT_FOUND
    );
}
