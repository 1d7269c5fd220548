//! # CLI Structure and Argument Parsing
//!
//! `docframe` plays the role of the UI hosting a preview frame: it opens
//! documents, replays the messages the frame would post, and writes the
//! content the frame would display.
//!
//! ```bash
//! # Preview a document and write the displayable HTML
//! docframe open doc-42 --page 3 --out preview.html
//!
//! # Follow the in-document page-select control to another page
//! docframe open doc-42 --navigate '{"type":"page-navigation","url":"file_0005.htm","page":5}'
//!
//! # Rewrite a local rendition without any network access
//! docframe rewrite file.htm --source-url https://search.example.com/cache/42/file.htm
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use docframe_core::{EmbedPolicy, PreviewMode};
use std::path::PathBuf;

use crate::commands::ConfigCommand;
use crate::output::OutputFormat;

/// Main CLI structure for the `docframe` command
#[derive(Parser, Clone, Debug)]
#[command(name = "docframe")]
#[command(version)]
#[command(about = "docframe - preview cached document renditions in a sandboxed frame", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Suppress informational messages (only show errors)
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, env = "DOCFRAME_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Open a document preview and write what the frame would display
    Open(OpenArgs),

    /// Rewrite a local HTML rendition for sandboxed display
    Rewrite(RewriteArgs),

    /// Show or change configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommand>,
    },
}

#[derive(Args, Clone, Debug)]
pub struct OpenArgs {
    /// Document identifier in the search index
    pub document_id: String,

    /// Page the pagination control should select
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub page: u32,

    /// How the document is turned into displayable content
    #[arg(long, value_enum, default_value = "transform")]
    pub mode: ModeArg,

    /// Full-text query scoping the preview lookup
    #[arg(long)]
    pub query: Option<String>,

    /// Name of the query definition on the search server
    #[arg(long, default_value = "_search")]
    pub query_name: String,

    /// Frame message to deliver after opening (JSON, repeatable)
    #[arg(long = "navigate", value_name = "JSON")]
    pub navigate: Vec<String>,

    /// Override the preview service origin
    #[arg(long, value_name = "URL")]
    pub origin: Option<String>,

    /// Write displayed content to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Format of the summary printed when `--out` is given
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Args, Clone, Debug)]
pub struct RewriteArgs {
    /// HTML file to rewrite (`-` reads stdin)
    pub file: PathBuf,

    /// URL the rendition was originally served from
    #[arg(long, value_name = "URL")]
    pub source_url: String,

    /// Page the pagination control should select
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub page: u32,

    /// Replace SVG objects with <img> elements
    #[arg(long, conflicts_with = "iframe")]
    pub img: bool,

    /// Replace SVG objects with <iframe> elements
    #[arg(long)]
    pub iframe: bool,

    /// Zoom factor applied to the document body
    #[arg(long, value_name = "FACTOR")]
    pub scale: Option<f64>,

    /// Re-wrap loose text runs in converter text blocks
    #[arg(long)]
    pub fix_text_runs: bool,

    /// Print what was rewritten to stderr
    #[arg(long)]
    pub report: bool,

    /// Write the rewritten document to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

impl RewriteArgs {
    /// Embed policy selected on the command line, if any.
    pub const fn embed_policy(&self) -> Option<EmbedPolicy> {
        if self.iframe {
            Some(EmbedPolicy::Iframe)
        } else if self.img {
            Some(EmbedPolicy::Img)
        } else {
            None
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    /// Display the download URL directly
    Default,
    /// Display the fetched bytes untouched
    Fetch,
    /// Rewrite the document for sandboxed display
    Transform,
}

impl From<ModeArg> for PreviewMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Default => Self::Default,
            ModeArg::Fetch => Self::RawFetch,
            ModeArg::Transform => Self::Transform,
        }
    }
}
