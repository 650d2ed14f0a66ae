//! docaudit CLI - document review pipeline driver
//!
//! Wires the core crates into a reviewable workflow:
//! extract → analyze → preview → annotate.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use docaudit_core::{Analysis, Issue};
use docaudit_docx::{CommentAuthor, CommentWriter, ContentWalker, DocxPackage};
use docaudit_render::{apply_highlights, render_anchored, render_page};
use docaudit_review::{analyze, AnalyzeOptions, VisionReviewClient};
use std::path::{Path, PathBuf};

/// Environment variable holding the review-model API key.
const API_KEY_ENV: &str = "DASHSCOPE_API_KEY";

#[derive(Parser)]
#[command(
    name = "docaudit",
    version,
    about = "Review structured office documents with a multimodal model and re-emit them with native reviewer comments"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract the ordered content-unit list as JSON
    Extract {
        /// Input DOCX file
        input: PathBuf,
        /// Directory for extracted images
        #[arg(long, default_value = "docaudit_images")]
        images_dir: PathBuf,
        /// Output JSON path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run the review collaborator and persist the analysis
    Analyze {
        /// Input DOCX file
        input: PathBuf,
        /// Directory for extracted images
        #[arg(long, default_value = "docaudit_images")]
        images_dir: PathBuf,
        /// Analysis cache output path (defaults to <input>.analysis.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Review model id
        #[arg(long)]
        model: Option<String>,
        /// Chat-completions endpoint
        #[arg(long)]
        endpoint: Option<String>,
        /// Review rules file
        #[arg(long)]
        rules: Option<PathBuf>,
        /// Content units per collaborator call
        #[arg(long, default_value_t = docaudit_review::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// API key (falls back to $DASHSCOPE_API_KEY)
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Render the anchored (and optionally highlighted) HTML preview
    Preview {
        /// Input DOCX file
        input: PathBuf,
        /// Saved analysis to highlight from
        #[arg(long)]
        analysis: Option<PathBuf>,
        /// Issue index to emphasize as active
        #[arg(long)]
        active: Option<usize>,
        /// Directory for extracted images
        #[arg(long, default_value = "docaudit_images")]
        images_dir: PathBuf,
        /// Output HTML path (defaults to <input>.preview.html)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Emit the bare fragment without the page wrapper
        #[arg(long)]
        fragment: bool,
    },
    /// Write native reviewer comments into a copy of the document
    Annotate {
        /// Input DOCX file
        input: PathBuf,
        /// Saved analysis to take issues from
        #[arg(long)]
        analysis: PathBuf,
        /// Issue selection, e.g. "0,2-4" (all issues when omitted)
        #[arg(long)]
        select: Option<String>,
        /// Output DOCX path (defaults to commented_<input name>)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Comment author name
        #[arg(long)]
        author: Option<String>,
        /// Comment author initials
        #[arg(long)]
        initials: Option<String>,
    },
    /// Print the quality score of a saved analysis
    Score {
        /// Saved analysis file
        analysis: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Extract {
            input,
            images_dir,
            output,
        } => cmd_extract(&input, &images_dir, output.as_deref()),
        Command::Analyze {
            input,
            images_dir,
            output,
            model,
            endpoint,
            rules,
            batch_size,
            api_key,
        } => {
            cmd_analyze(
                &input, &images_dir, output, model, endpoint, rules, batch_size, api_key,
            )
            .await
        }
        Command::Preview {
            input,
            analysis,
            active,
            images_dir,
            output,
            fragment,
        } => cmd_preview(&input, analysis.as_deref(), active, &images_dir, output, fragment),
        Command::Annotate {
            input,
            analysis,
            select,
            output,
            author,
            initials,
        } => cmd_annotate(&input, &analysis, select.as_deref(), output, author, initials),
        Command::Score { analysis } => cmd_score(&analysis),
    }
}

fn cmd_extract(input: &Path, images_dir: &Path, output: Option<&Path>) -> Result<()> {
    let pkg = DocxPackage::open(input)
        .with_context(|| format!("failed to open {}", input.display()))?;
    let mut walker = ContentWalker::new(images_dir)?;
    let extraction = walker.walk(&pkg)?;

    let json = serde_json::to_string_pretty(&extraction.units)?;
    match output {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }
    eprintln!("{} content units", extraction.units.len());
    Ok(())
}

#[allow(clippy::too_many_arguments)] // mirrors the subcommand's flags
async fn cmd_analyze(
    input: &Path,
    images_dir: &Path,
    output: Option<PathBuf>,
    model: Option<String>,
    endpoint: Option<String>,
    rules: Option<PathBuf>,
    batch_size: usize,
    api_key: Option<String>,
) -> Result<()> {
    let api_key = match api_key.or_else(|| std::env::var(API_KEY_ENV).ok()) {
        Some(key) if !key.is_empty() => key,
        _ => bail!("no API key: pass --api-key or set ${API_KEY_ENV}"),
    };

    let pkg = DocxPackage::open(input)
        .with_context(|| format!("failed to open {}", input.display()))?;
    let mut walker = ContentWalker::new(images_dir)?;
    let extraction = walker.walk(&pkg)?;

    let mut client = VisionReviewClient::new(api_key);
    if let Some(model) = model {
        client = client.with_model(model);
    }
    if let Some(endpoint) = endpoint {
        client = client.with_endpoint(endpoint);
    }
    if let Some(rules) = rules {
        client = client.with_rules_file(rules);
    }

    let issues = analyze(&client, &extraction.units, AnalyzeOptions { batch_size }).await;
    let analysis = Analysis::from_issues(issues);

    let output = output.unwrap_or_else(|| default_sibling(input, "analysis.json"));
    analysis.save(&output)?;

    print_summary(&analysis);
    println!("analysis saved to {}", output.display());
    Ok(())
}

fn cmd_preview(
    input: &Path,
    analysis: Option<&Path>,
    active: Option<usize>,
    images_dir: &Path,
    output: Option<PathBuf>,
    fragment: bool,
) -> Result<()> {
    let pkg = DocxPackage::open(input)
        .with_context(|| format!("failed to open {}", input.display()))?;
    let mut walker = ContentWalker::new(images_dir)?;
    let extraction = walker.walk(&pkg)?;

    let mut html = render_anchored(&pkg, &extraction)?;
    if let Some(path) = analysis {
        let analysis = Analysis::load(path)
            .with_context(|| format!("failed to load analysis {}", path.display()))?;
        html = apply_highlights(&html, &analysis.issues, active)?;
    }
    if !fragment {
        html = render_page(&html);
    }

    let output = output.unwrap_or_else(|| default_sibling(input, "preview.html"));
    std::fs::write(&output, html)?;
    println!("preview written to {}", output.display());
    Ok(())
}

fn cmd_annotate(
    input: &Path,
    analysis_path: &Path,
    select: Option<&str>,
    output: Option<PathBuf>,
    author: Option<String>,
    initials: Option<String>,
) -> Result<()> {
    let pkg = DocxPackage::open(input)
        .with_context(|| format!("failed to open {}", input.display()))?;
    let analysis = Analysis::load(analysis_path)
        .with_context(|| format!("failed to load analysis {}", analysis_path.display()))?;

    let selected: Vec<Issue> = match select {
        Some(spec) => {
            let indices = parse_selection(spec, analysis.issues.len())
                .map_err(|e| anyhow::anyhow!("bad --select '{spec}': {e}"))?;
            indices
                .into_iter()
                .map(|i| analysis.issues[i].clone())
                .collect()
        }
        None => analysis.issues.clone(),
    };

    let mut comment_author = CommentAuthor::default();
    if let Some(name) = author {
        comment_author.name = name;
    }
    if let Some(initials) = initials {
        comment_author.initials = initials;
    }

    let writer = CommentWriter::with_author(comment_author);
    let commented = writer.annotate(&pkg, &selected)?;

    let output = output.unwrap_or_else(|| {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.docx".to_string());
        input.with_file_name(format!("commented_{name}"))
    });
    commented.write_to(&output)?;
    println!(
        "{} issues selected; commented document written to {}",
        selected.len(),
        output.display()
    );
    Ok(())
}

fn cmd_score(analysis_path: &Path) -> Result<()> {
    let analysis = Analysis::load(analysis_path)
        .with_context(|| format!("failed to load analysis {}", analysis_path.display()))?;
    print_summary(&analysis);
    Ok(())
}

fn print_summary(analysis: &Analysis) {
    println!(
        "Quality score: {}",
        analysis.quality_score.to_string().bold()
    );
    println!(
        "  {} critical, {} major, {} minor ({} total)",
        analysis.counts.critical.to_string().red(),
        analysis.counts.major.to_string().yellow(),
        analysis.counts.minor.to_string().blue(),
        analysis.counts.total()
    );
    for (index, issue) in analysis.issues.iter().enumerate() {
        let severity = match issue.severity {
            docaudit_core::Severity::Critical => issue.severity.to_string().red(),
            docaudit_core::Severity::Major => issue.severity.to_string().yellow(),
            docaudit_core::Severity::Minor => issue.severity.to_string().blue(),
        };
        println!("  #{index} [{severity}] {}", issue.description);
    }
}

/// Sibling path `<input stem>.<suffix>`.
fn default_sibling(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    input.with_file_name(format!("{stem}.{suffix}"))
}

/// Parse an issue selection like "0,2-4,7" into sorted unique indices.
///
/// Out-of-range indices and malformed pieces are errors; an empty spec
/// selects nothing.
fn parse_selection(spec: &str, len: usize) -> Result<Vec<usize>, String> {
    let mut indices = Vec::new();
    for piece in spec.split(',') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = piece.split_once('-') {
            let lo: usize = lo
                .trim()
                .parse()
                .map_err(|_| format!("invalid index '{lo}'"))?;
            let hi: usize = hi
                .trim()
                .parse()
                .map_err(|_| format!("invalid index '{hi}'"))?;
            if lo > hi {
                return Err(format!("descending range '{piece}'"));
            }
            for i in lo..=hi {
                indices.push(i);
            }
        } else {
            let i: usize = piece
                .parse()
                .map_err(|_| format!("invalid index '{piece}'"))?;
            indices.push(i);
        }
    }
    indices.sort_unstable();
    indices.dedup();
    if let Some(&max) = indices.last() {
        if max >= len {
            return Err(format!("index {max} out of range (have {len} issues)"));
        }
    }
    Ok(indices)
}
