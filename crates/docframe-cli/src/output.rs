//! Summary output for published previews.

use clap::ValueEnum;
use docframe_core::Published;
use serde_json::json;
use std::fmt::Write as _;

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// A single JSON object
    Json,
}

/// Render a summary of what the frame displays.
pub fn render_summary(
    published: &Published,
    written_to: &str,
    bytes: usize,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Text => {
            let mut out = String::new();
            writeln!(out, "Displayed {} ({} mode)", published.url, published.mode)?;
            writeln!(out, "  source: {}", published.source_url)?;
            writeln!(out, "  page:   {}", published.page)?;
            write!(out, "  wrote {bytes} bytes to {written_to}")?;
            Ok(out)
        },
        OutputFormat::Json => {
            let value = json!({
                "url": published.url,
                "sourceUrl": published.source_url,
                "page": published.page,
                "mode": published.mode,
                "handle": published.handle.as_ref().map(|h| h.id.get()),
                "output": written_to,
                "bytes": bytes,
            });
            Ok(serde_json::to_string_pretty(&value)?)
        },
    }
}
