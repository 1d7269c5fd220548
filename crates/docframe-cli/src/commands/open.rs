use anyhow::{Context, Result, anyhow, bail};
use docframe_core::{
    Bridge, BridgeHandle, FrameMessage, PreviewMode, PreviewRequest, Published, QueryContext,
};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

use crate::cli::OpenArgs;
use crate::output::render_summary;
use crate::utils::settings;

pub async fn run(args: OpenArgs, explicit_config: Option<&Path>) -> Result<()> {
    let mut config = settings::load(explicit_config)?;
    if let Some(origin) = &args.origin {
        config.service.origin = origin.trim_end_matches('/').to_string();
    }

    let messages = parse_messages(&args.navigate)?;

    let (bridge, handle) = Bridge::from_config(&config)?;
    let task = bridge.spawn();
    let mut failures = handle.failures();

    if let Some(text) = &args.query {
        handle
            .set_query(QueryContext::new(args.query_name.as_str(), text.as_str()))
            .await?;
    }

    let request = PreviewRequest::new(args.document_id.as_str())
        .with_page(args.page)
        .with_mode(args.mode.into());
    handle.open(request).await?;
    for message in messages {
        handle.post_message(FrameMessage::new(message)).await?;
    }
    handle.settle().await?;

    let mut last_failure = None;
    while let Ok(failure) = failures.try_recv() {
        debug!(subject = %failure.target, category = failure.category, "cycle failed");
        last_failure = Some(failure);
    }

    let result = deliver(&handle, &args).await;

    handle.shutdown().await?;
    task.await.context("preview session panicked")?;

    match (result?, last_failure) {
        (true, Some(failure)) => {
            warn!(subject = %failure.target, "showing previous document: {}", failure.message);
            Ok(())
        },
        (true, None) => Ok(()),
        (false, Some(failure)) => Err(anyhow!(
            "preview of '{}' failed: {}",
            failure.target,
            failure.message
        )),
        (false, None) => bail!("nothing was published for '{}'", args.document_id),
    }
}

/// Write what the frame displays; `false` when nothing was published.
async fn deliver(handle: &BridgeHandle, args: &OpenArgs) -> Result<bool> {
    let Some(published) = handle.published().borrow().clone() else {
        return Ok(false);
    };

    let content = displayed_content(handle, &published)?;

    match &args.out {
        Some(path) => {
            std::fs::write(path, &content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            let summary = render_summary(
                &published,
                &path.display().to_string(),
                content.len(),
                args.format,
            )?;
            println!("{summary}");
        },
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&content)?;
            stdout.flush()?;
        },
    }

    // The host has consumed the content, as a frame would after loading it.
    if let Some(resource) = &published.handle {
        handle.frame_loaded(resource.id).await?;
    }

    Ok(true)
}

fn displayed_content(handle: &BridgeHandle, published: &Published) -> Result<Vec<u8>> {
    if published.mode == PreviewMode::Default {
        return Ok(format!("{}\n", published.url).into_bytes());
    }

    let blob = handle
        .store()
        .resolve(&published.url)
        .ok_or_else(|| anyhow!("published handle {} is no longer live", published.url))?;
    Ok(blob.bytes.to_vec())
}

fn parse_messages(raw: &[String]) -> Result<Vec<Value>> {
    raw.iter()
        .enumerate()
        .map(|(i, text)| {
            serde_json::from_str(text)
                .with_context(|| format!("--navigate #{} is not valid JSON", i + 1))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_messages_reports_position() {
        let ok = parse_messages(&[r#"{"type":"page-navigation","url":"a.htm","page":2}"#.into()])
            .unwrap();
        assert_eq!(ok[0]["page"], 2);

        let err = parse_messages(&["{}".into(), "{oops".into()]).unwrap_err();
        assert!(err.to_string().contains("#2"));
    }
}
