use anyhow::{Context, Result};
use docframe_core::{RewriteReport, Rewriter};
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

use crate::cli::RewriteArgs;
use crate::utils::settings;

pub fn run(args: &RewriteArgs, explicit_config: Option<&Path>) -> Result<()> {
    let mut config = settings::load(explicit_config)?.rewrite;
    if let Some(policy) = args.embed_policy() {
        config.embed_policy = policy;
    }
    if args.scale.is_some() {
        config.scaling_factor = args.scale;
    }
    if args.fix_text_runs {
        config.fix_text_runs = true;
    }

    let html = read_input(&args.file)?;
    let rewriter = Rewriter::new(config);
    let mut context = None;
    let (document, report) =
        rewriter.rewrite_with_report(&html, &args.source_url, args.page, &mut context);

    if let Some(context) = &context {
        info!(base = %context.base_href(), "navigation base");
    }
    if args.report {
        eprintln!("{}", describe(&report));
    }

    match &args.out {
        Some(path) => std::fs::write(path, document.html.as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(document.html.as_bytes())?;
            stdout.flush()?;
        },
    }

    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut html = String::new();
        std::io::stdin()
            .read_to_string(&mut html)
            .context("failed to read stdin")?;
        return Ok(html);
    }

    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn describe(report: &RewriteReport) -> String {
    let mut lines = vec![
        format!("links absolutized:     {}", report.links),
        format!("scripts absolutized:   {}", report.scripts),
        format!("objects replaced:      {}", report.objects_replaced),
        format!("images normalized:     {}", report.images),
        format!("build scripts removed: {}", report.stray_scripts_removed),
        format!("base inserted:         {}", report.base_inserted),
        format!("base removed:          {}", report.base_removed),
        format!("control script:        {}", report.control_script),
    ];
    if !report.degraded.is_empty() {
        let steps: Vec<String> = report.degraded.iter().map(ToString::to_string).collect();
        lines.push(format!("skipped steps:         {}", steps.join(", ")));
    }
    lines.join("\n")
}
