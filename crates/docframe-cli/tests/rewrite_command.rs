#![allow(missing_docs)]

mod common;

use anyhow::Result;
use common::docframe_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

const RENDITION: &str = r#"<html><head>
<script>function Go() { self.location.href = CurUrl(); }</script>
<link rel="stylesheet" href="style.css">
</head><body>
<div class="ph"><select id="pages"><option value="file.htm">1</option></select></div>
<object data="file_files/page1.svg" class="pi"></object>
<script src="/_nuxt/app.js"></script>
</body></html>"#;

#[test]
fn rewrite_writes_sandbox_ready_html() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("file.htm");
    std::fs::write(&input, RENDITION)?;

    docframe_cmd(&dir.path().join("config.toml"))
        .args(["rewrite"])
        .arg(&input)
        .args([
            "--source-url",
            "https://search.example.com/cache/42/file.htm",
            "--page",
            "4",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#"<base href="https://search.example.com/cache/42/">"#,
        ))
        .stdout(predicate::str::contains(
            r#"href="https://search.example.com/cache/42/style.css""#,
        ))
        .stdout(predicate::str::contains(
            r#"<img src="https://search.example.com/cache/42/file_files/page1.svg""#,
        ))
        .stdout(predicate::str::contains("var defPage=4;"))
        .stdout(predicate::str::contains("self.location.href").not())
        .stdout(predicate::str::contains("_nuxt").not());

    Ok(())
}

#[test]
fn rewrite_honors_iframe_policy_and_out_file() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("file.htm");
    let output = dir.path().join("out.html");
    std::fs::write(&input, RENDITION)?;

    docframe_cmd(&dir.path().join("config.toml"))
        .arg("rewrite")
        .arg(&input)
        .args(["--source-url", "https://search.example.com/cache/42/file.htm"])
        .arg("--iframe")
        .arg("--report")
        .arg("--out")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("objects replaced:      1"));

    let html = std::fs::read_to_string(&output)?;
    assert!(html.contains(r#"<iframe src="https://search.example.com/cache/42/file_files/page1.svg""#));
    Ok(())
}

#[test]
fn rewrite_reads_stdin() -> Result<()> {
    let dir = tempdir()?;

    docframe_cmd(&dir.path().join("config.toml"))
        .args(["rewrite", "-", "--source-url", "http://h/docs/index.html"])
        .write_stdin(r#"<img data-src="lazy.png">"#)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"src="http://h/docs/lazy.png""#))
        .stdout(predicate::str::contains(r#"loading="lazy""#));

    Ok(())
}

#[test]
fn rewrite_missing_file_fails() -> Result<()> {
    let dir = tempdir()?;

    docframe_cmd(&dir.path().join("config.toml"))
        .arg("rewrite")
        .arg(dir.path().join("absent.htm"))
        .args(["--source-url", "http://h/file.htm"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));

    Ok(())
}
