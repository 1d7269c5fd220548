#![allow(missing_docs)]

mod common;

use anyhow::Result;
use common::docframe_cmd;
use predicates::prelude::*;
use tempfile::tempdir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FIRST_PAGE: &str = r#"<html><head><script>function Go() {}</script></head><body>
<div class="ph"><select id="pages"><option value="file.htm">1</option></select></div>
</body></html>"#;

const THIRD_PAGE: &str = r#"<html><head></head><body>
<div class="ph"><select id="pages"></select></div><img src="p3.png">
</body></html>"#;

async fn search_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/preview"))
        .and(body_partial_json(serde_json::json!({"action": "getData", "id": "doc-7"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "documentCachedContentUrl": "/cache/7/file.htm"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cache/7/file.htm"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(FIRST_PAGE, "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cache/7/p3.htm"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(THIRD_PAGE, "text/html"))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn open_prints_rewritten_document() -> Result<()> {
    let server = search_server().await;
    let dir = tempdir()?;

    docframe_cmd(&dir.path().join("config.toml"))
        .args(["open", "doc-7", "--page", "2", "--origin", &server.uri()])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            r#"<base href="{}/cache/7/">"#,
            server.uri()
        )))
        .stdout(predicate::str::contains("var defPage=2;"));

    Ok(())
}

#[tokio::test]
async fn open_follows_navigation_messages() -> Result<()> {
    let server = search_server().await;
    let dir = tempdir()?;
    let out = dir.path().join("preview.html");

    let output = docframe_cmd(&dir.path().join("config.toml"))
        .args(["open", "doc-7", "--origin", &server.uri()])
        .args(["--navigate", r#"{"foo":"bar"}"#])
        .args([
            "--navigate",
            r#"{"type":"page-navigation","url":"p3.htm","page":3}"#,
        ])
        .args(["--format", "json", "--out"])
        .arg(&out)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let summary: serde_json::Value = serde_json::from_slice(&output)?;
    assert_eq!(summary["page"], 3);
    assert_eq!(
        summary["sourceUrl"],
        format!("{}/cache/7/p3.htm", server.uri())
    );

    let html = std::fs::read_to_string(&out)?;
    assert!(html.contains("var defPage=3;"));
    assert!(html.contains(&format!(r#"src="{}/cache/7/p3.png""#, server.uri())));
    Ok(())
}

#[tokio::test]
async fn open_default_mode_prints_download_url() -> Result<()> {
    let server = search_server().await;
    let dir = tempdir()?;

    docframe_cmd(&dir.path().join("config.toml"))
        .args(["open", "doc-7", "--mode", "default", "--origin", &server.uri()])
        .assert()
        .success()
        .stdout(format!("{}/cache/7/file.htm\n", server.uri()));

    Ok(())
}

#[tokio::test]
async fn open_unknown_document_fails() -> Result<()> {
    let server = search_server().await;
    let dir = tempdir()?;

    docframe_cmd(&dir.path().join("config.toml"))
        .args(["open", "doc-404", "--origin", &server.uri()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("doc-404"));

    Ok(())
}

#[test]
fn open_rejects_invalid_navigation_json() -> Result<()> {
    let dir = tempdir()?;

    docframe_cmd(&dir.path().join("config.toml"))
        .args(["open", "doc-7", "--navigate", "{not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not valid JSON"));

    Ok(())
}
