//! Rewrites cached HTML renditions so they display inside a sandboxed,
//! origin-less frame.
//!
//! A document served from a `blob:` handle has no usable base URL, so every
//! reference it makes has to be absolute before it is published. The
//! converter's page-select script also assumes it can navigate the top-level
//! window; it is swapped for one that talks to the host instead.
//!
//! The pipeline runs in a fixed order:
//!
//! 1. `<link href>` / `<script src>` absolutization
//! 2. SVG `<object>` substitution
//! 3. `<base>` insertion (an existing `<base>` is removed last instead)
//! 4. page-select script replacement
//! 5. `<img>` normalization
//! 6. build-tool `<script>` removal under `<body>`
//! 7. optional body scaling and text-run repair
//! 8. serialization
//!
//! Every step tolerates missing structure: it is skipped and recorded in the
//! [`RewriteReport`] while the remaining steps still run.
//!
//! ```rust
//! use docframe_core::{RewriteConfig, Rewriter};
//!
//! let rewriter = Rewriter::new(RewriteConfig::default());
//! let mut context = None;
//! let doc = rewriter.rewrite(
//!     r#"<html><head><link rel="stylesheet" href="style.css"></head><body></body></html>"#,
//!     "https://search.example.com/cache/7/file.htm",
//!     1,
//!     &mut context,
//! );
//!
//! assert!(doc.html.contains(r#"href="https://search.example.com/cache/7/style.css""#));
//! assert_eq!(context.unwrap().base_path, "/cache/7/");
//! ```

mod dom;
pub mod script;

use crate::config::{EmbedPolicy, RewriteConfig};
use crate::types::{origin_of, split_page_path};
use crate::{BaseContext, RewrittenDocument};
use markup5ever_rcdom::Handle;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

/// Content type declared for rewritten documents; serialization emits UTF-8.
pub const REWRITTEN_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Captures the file name of an SVG referenced by an `<object data>`.
///
/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static SVG_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^.*/([^/]+\.svg)$").unwrap());

/// Pipeline stage, used to report which steps were skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewriteStep {
    /// `<link>` / `<script>` URL absolutization.
    Absolutize,
    /// SVG `<object>` substitution.
    ObjectSubstitution,
    /// `<base>` insertion or removal.
    BaseHref,
    /// Page-select script replacement.
    PaginationScript,
    /// `<img>` normalization.
    Images,
    /// Build-tool script removal.
    StrayScripts,
    /// Body zoom factor.
    BodyScaling,
    /// Text-run repair.
    TextRuns,
}

impl fmt::Display for RewriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Absolutize => "absolutize",
            Self::ObjectSubstitution => "object-substitution",
            Self::BaseHref => "base-href",
            Self::PaginationScript => "pagination-script",
            Self::Images => "images",
            Self::StrayScripts => "stray-scripts",
            Self::BodyScaling => "body-scaling",
            Self::TextRuns => "text-runs",
        };
        f.write_str(name)
    }
}

/// What a rewrite changed, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteReport {
    /// `<link href>` attributes made absolute.
    pub links: usize,
    /// `<script src>` attributes made absolute.
    pub scripts: usize,
    /// `<object>` elements replaced.
    pub objects_replaced: usize,
    /// `<img>` elements normalized.
    pub images: usize,
    /// Build-tool scripts removed from `<body>`.
    pub stray_scripts_removed: usize,
    /// A `<base>` was inserted at the top of `<head>`.
    pub base_inserted: bool,
    /// An existing `<base>` was removed.
    pub base_removed: bool,
    /// The page-select script was replaced.
    pub control_script: bool,
    /// Steps skipped, fully or in part, because the document lacked the
    /// structure or base URL they need.
    pub degraded: Vec<RewriteStep>,
}

/// Applies the rewriting pipeline according to a [`RewriteConfig`].
#[derive(Debug, Clone, Default)]
pub struct Rewriter {
    config: RewriteConfig,
}

struct Document {
    dom: markup5ever_rcdom::RcDom,
    head: Option<Handle>,
    body: Option<Handle>,
    source: Option<Url>,
    base: Option<Url>,
}

impl Document {
    fn resolve(&self, value: &str) -> Option<String> {
        let base = self.base.as_ref()?;
        base.join(value.trim()).ok().map(String::from)
    }

    fn root(&self) -> &Handle {
        &self.dom.document
    }
}

impl Rewriter {
    /// Create a rewriter with the given policy.
    pub const fn new(config: RewriteConfig) -> Self {
        Self { config }
    }

    /// Active policy.
    pub const fn config(&self) -> &RewriteConfig {
        &self.config
    }

    /// Rewrite `raw_html` fetched from `source_url` so that it opens on `page`.
    ///
    /// On completion `context` is replaced with the context derived from
    /// `source_url`; it is left untouched when the URL cannot be parsed.
    pub fn rewrite(
        &self,
        raw_html: &str,
        source_url: &str,
        page: u32,
        context: &mut Option<BaseContext>,
    ) -> RewrittenDocument {
        let (document, report) = self.rewrite_with_report(raw_html, source_url, page, context);
        debug!(
            links = report.links,
            scripts = report.scripts,
            objects = report.objects_replaced,
            images = report.images,
            stray_scripts = report.stray_scripts_removed,
            base_inserted = report.base_inserted,
            base_removed = report.base_removed,
            control_script = report.control_script,
            degraded = ?report.degraded,
            "rewrite complete"
        );
        document
    }

    /// Same as [`Rewriter::rewrite`], also returning what was changed.
    pub fn rewrite_with_report(
        &self,
        raw_html: &str,
        source_url: &str,
        page: u32,
        context: &mut Option<BaseContext>,
    ) -> (RewrittenDocument, RewriteReport) {
        let mut report = RewriteReport::default();
        let doc = load(raw_html, source_url);

        if doc.base.is_some() {
            absolutize_links_and_scripts(&doc, &mut report);
            self.substitute_objects(&doc, &mut report);
        } else {
            report.degraded.push(RewriteStep::Absolutize);
            report.degraded.push(RewriteStep::ObjectSubstitution);
        }

        let existing_bases = insert_base(&doc, &mut report);
        self.replace_pagination_script(&doc, page, &mut report);

        normalize_images(&doc, &mut report);

        self.remove_stray_scripts(&doc, &mut report);

        if let Some(factor) = self.config.scaling_factor {
            apply_scaling(&doc, factor, &mut report);
        }
        if self.config.fix_text_runs {
            repair_text_runs(&doc);
        }

        // Base removal stays last: every resolution above relies on it.
        for base in existing_bases {
            if dom::detach(&base) {
                report.base_removed = true;
            }
        }

        let html = dom::serialize_document(&doc.dom);

        if let Ok(next) = BaseContext::from_source_url(source_url) {
            *context = Some(next);
        }

        (
            RewrittenDocument {
                html,
                content_type: REWRITTEN_CONTENT_TYPE.to_string(),
            },
            report,
        )
    }

    fn substitute_objects(&self, doc: &Document, report: &mut RewriteReport) {
        for object in dom::elements_by_tag(doc.root(), "object") {
            let Some(data) = dom::non_empty_attr(&object, "data") else {
                continue;
            };
            let Some(resolved) = doc.resolve(&data) else {
                continue;
            };
            let Some(name) = SVG_NAME_RE
                .captures(&resolved)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
            else {
                continue;
            };

            let asset = format!("{}/{name}", self.config.asset_dir.trim_end_matches('/'));
            let src = doc.resolve(&asset).unwrap_or(asset);

            let tag = match self.config.embed_policy {
                EmbedPolicy::Img => "img",
                EmbedPolicy::Iframe => "iframe",
            };
            let mut attrs: Vec<(&str, String)> =
                vec![("src", src), ("loading", "lazy".to_string())];
            if let Some(class) = dom::attr(&object, "class") {
                attrs.push(("class", class));
            }
            if let Some(style) = dom::attr(&object, "style") {
                attrs.push(("style", style));
            }
            let borrowed: Vec<(&str, &str)> = attrs.iter().map(|(k, v)| (*k, v.as_str())).collect();

            if dom::replace(&object, dom::create_element(tag, &borrowed)) {
                report.objects_replaced += 1;
            }
        }
    }

    fn replace_pagination_script(&self, doc: &Document, page: u32, report: &mut RewriteReport) {
        let marker = self.config.page_marker_class.as_str();
        let has_marker = dom::descendants(doc.root())
            .iter()
            .any(|node| dom::has_class(node, marker));
        if !has_marker {
            return;
        }

        let Some(head) = &doc.head else {
            report.degraded.push(RewriteStep::PaginationScript);
            return;
        };

        for old in dom::child_elements(head, "script") {
            dom::detach(&old);
        }

        let script = dom::create_element("script", &[]);
        dom::append(&script, dom::create_text(&script::control_script(page)));
        dom::append(head, script);
        report.control_script = true;
    }

    fn remove_stray_scripts(&self, doc: &Document, report: &mut RewriteReport) {
        let Some(body) = &doc.body else {
            report.degraded.push(RewriteStep::StrayScripts);
            return;
        };

        for script in dom::child_elements(body, "script") {
            let Some(src) = dom::attr(&script, "src") else {
                continue;
            };
            let stray = self
                .config
                .stray_script_fragments
                .iter()
                .filter(|fragment| !fragment.is_empty())
                .any(|fragment| src.contains(fragment.as_str()));
            if stray && dom::detach(&script) {
                report.stray_scripts_removed += 1;
            }
        }
    }
}

fn load(raw_html: &str, source_url: &str) -> Document {
    let dom = dom::parse(raw_html);
    let head = dom::find_element(&dom.document, "head");
    let body = dom::find_element(&dom.document, "body");
    let source = Url::parse(source_url).ok();

    let declared_base = head
        .as_ref()
        .and_then(|h| dom::child_elements(h, "base").into_iter().next())
        .and_then(|b| dom::non_empty_attr(&b, "href"));

    let base = match (&source, declared_base) {
        (Some(src), Some(href)) => src.join(href.trim()).ok().or_else(|| Some(src.clone())),
        (Some(src), None) => Some(src.clone()),
        (None, Some(href)) => Url::parse(href.trim()).ok(),
        (None, None) => None,
    };

    if source.is_none() {
        debug!(source_url, "source URL is not absolute");
    }

    Document {
        dom,
        head,
        body,
        source,
        base,
    }
}

fn absolutize_links_and_scripts(doc: &Document, report: &mut RewriteReport) {
    for node in dom::descendants(doc.root()) {
        if dom::is_element(&node, "link") {
            if let Some(href) = dom::non_empty_attr(&node, "href") {
                if let Some(absolute) = doc.resolve(&href) {
                    dom::set_attr(&node, "href", &absolute);
                    report.links += 1;
                }
            }
        } else if dom::is_element(&node, "script") {
            if let Some(src) = dom::non_empty_attr(&node, "src") {
                if let Some(absolute) = doc.resolve(&src) {
                    dom::set_attr(&node, "src", &absolute);
                    report.scripts += 1;
                }
            }
        }
    }
}

/// Insert a `<base>` when the document has none; return existing ones so
/// they can be removed once everything else is done.
fn insert_base(doc: &Document, report: &mut RewriteReport) -> Vec<Handle> {
    let Some(head) = &doc.head else {
        report.degraded.push(RewriteStep::BaseHref);
        return Vec::new();
    };

    let existing = dom::child_elements(head, "base");
    if !existing.is_empty() {
        return existing;
    }

    let Some(source) = &doc.source else {
        report.degraded.push(RewriteStep::BaseHref);
        return Vec::new();
    };

    if let Some((prefix, _page_name)) = split_page_path(source) {
        let href = format!("{}{prefix}", origin_of(source));
        dom::prepend(head, dom::create_element("base", &[("href", &href)]));
        report.base_inserted = true;
    }

    Vec::new()
}

/// Without a base, `src` stays as written and `data-src` is promoted verbatim.
fn normalize_images(doc: &Document, report: &mut RewriteReport) {
    if doc.base.is_none() {
        report.degraded.push(RewriteStep::Images);
    }

    for image in dom::elements_by_tag(doc.root(), "img") {
        dom::set_attr(&image, "loading", "lazy");

        if let Some(src) = dom::non_empty_attr(&image, "src") {
            if let Some(absolute) = doc.resolve(&src) {
                dom::set_attr(&image, "src", &absolute);
            }
        }
        if let Some(lazy_src) = dom::non_empty_attr(&image, "data-src") {
            let promoted = doc.resolve(&lazy_src).unwrap_or(lazy_src);
            dom::set_attr(&image, "src", &promoted);
        }

        report.images += 1;
    }
}

fn apply_scaling(doc: &Document, factor: f64, report: &mut RewriteReport) {
    let Some(body) = &doc.body else {
        report.degraded.push(RewriteStep::BodyScaling);
        return;
    };

    let kept: Vec<String> = dom::attr(body, "style")
        .unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|decl| !decl.is_empty())
        .filter(|decl| {
            let property = decl.split(':').next().unwrap_or_default().trim();
            property != "--factor" && !property.eq_ignore_ascii_case("zoom")
        })
        .map(ToString::to_string)
        .collect();

    let mut style = format!("--factor: {factor}; zoom: var(--factor);");
    for decl in kept {
        style.push(' ');
        style.push_str(&decl);
        style.push(';');
    }
    dom::set_attr(body, "style", &style);
}

/// Converter output sometimes splits glyph runs of one line across spans
/// with mismatched fonts; give every loose run its own span styled like the
/// first one and drop the per-child classes of the block.
fn repair_text_runs(doc: &Document) {
    let blocks = dom::elements_by_tag(doc.root(), "div")
        .into_iter()
        .filter(|div| dom::has_class(div, "t"));

    for block in blocks {
        let spans = dom::elements_by_tag(&block, "span");
        if spans.len() <= 1 {
            continue;
        }
        let class = dom::attr(&spans[0], "class").unwrap_or_default();

        for span in &spans {
            for child in dom::children(span) {
                let Some(text) = dom::text(&child).filter(|t| !t.trim().is_empty()) else {
                    continue;
                };
                let wrapper = dom::create_element("span", &[("class", &class)]);
                dom::append(&wrapper, dom::create_text(&text));
                dom::insert_after(&child, wrapper);
                dom::detach(&child);
            }
        }

        for child in dom::children(&block) {
            if dom::tag_name(&child).is_some() {
                dom::remove_attr(&child, "class");
            }
        }
    }
}
