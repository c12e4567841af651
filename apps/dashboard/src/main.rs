use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    config::normalize_api_url,
    interpret::interpret,
    load_settings, render,
    types::ALIGNMENT_PREVIEW_COLUMNS,
    ComparisonResult, FastaUpload, Gateway, HttpPhyloBackend, PipelineController, Settings,
    TreeArtifact, TreeLayout,
};
use shared::domain::{SessionId, TreeMethod};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Drive the phylogenetic analysis service from the terminal")]
struct Cli {
    /// Analysis service base URL; overrides phylo_client.toml and the environment.
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Health,
    Sessions,
    Session {
        session_id: String,
    },
    Tree {
        session_id: String,
        #[arg(value_parser = parse_method)]
        method: TreeMethod,
        #[arg(long)]
        svg: Option<PathBuf>,
    },
    /// Upload, align, build both trees and compare them.
    Run {
        fasta: PathBuf,
        #[arg(long)]
        svg: Option<PathBuf>,
    },
}

fn parse_method(raw: &str) -> Result<TreeMethod, String> {
    TreeMethod::parse(raw).ok_or_else(|| format!("unknown method '{raw}' (expected nj or ml)"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings()?;
    if let Some(url) = &cli.api_url {
        settings.api_base_url = normalize_api_url(url)?;
    }
    if let Some(secs) = cli.timeout_secs {
        settings.request_timeout_secs = secs;
    }
    debug!(api_url = %settings.api_base_url, "settings loaded");

    match cli.command {
        Command::Health => {
            let health = gateway(&settings)?.health().await?;
            println!("{}: {}", health.status, health.message);
        }
        Command::Sessions => {
            let list = gateway(&settings)?.list_sessions().await?;
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        Command::Session { session_id } => {
            let info = gateway(&settings)?
                .session_info(&SessionId(session_id))
                .await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Tree {
            session_id,
            method,
            svg,
        } => {
            let artifact = gateway(&settings)?
                .fetch_tree(&SessionId(session_id), method)
                .await?;
            print_tree(&artifact);
            if let Some(path) = svg {
                write_svg(&path, &[&artifact])?;
            }
        }
        Command::Run { fasta, svg } => run_pipeline(&settings, &fasta, svg.as_deref()).await?,
    }

    Ok(())
}

fn gateway(settings: &Settings) -> Result<Gateway> {
    Ok(Gateway::new(Arc::new(HttpPhyloBackend::new(settings)?)))
}

async fn run_pipeline(settings: &Settings, fasta: &Path, svg: Option<&Path>) -> Result<()> {
    let controller = PipelineController::from_settings(settings)?;
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            debug!(?event, "pipeline event");
        }
    });

    let upload = FastaUpload::read(fasta, settings.max_upload_bytes).await?;
    let session = controller
        .submit_upload(upload)
        .await
        .context("upload failed")?;
    println!(
        "session {} ({}): {} sequences",
        session.session_id.short(),
        session.filename,
        session.sequence_count
    );

    let alignment = controller
        .request_alignment()
        .await
        .context("alignment failed")?;
    println!(
        "aligned {} sequences over {} columns",
        alignment.aligned_sequences.len(),
        alignment.alignment_length
    );
    for row in alignment.preview(ALIGNMENT_PREVIEW_COLUMNS) {
        let marker = if row.truncated { "..." } else { "" };
        println!("  {:<24} {}{marker}", row.name, row.columns);
    }

    let (nj, ml) = tokio::join!(
        controller.request_tree(TreeMethod::Nj),
        controller.request_tree(TreeMethod::Ml)
    );
    for (method, result) in [(TreeMethod::Nj, nj), (TreeMethod::Ml, ml)] {
        match result {
            Ok(artifact) => print_tree(&artifact),
            Err(err) => warn!(%method, "tree build failed: {err}"),
        }
    }

    let snapshot = controller.snapshot().await;
    println!("{}", snapshot.tree_progress());
    if !snapshot.can_compare() {
        bail!("both trees are needed for a comparison");
    }

    let comparison = controller
        .request_comparison(&TreeMethod::ALL)
        .await
        .context("comparison failed")?;
    print_comparison(&comparison);

    if let Some(path) = svg {
        let trees: Vec<&TreeArtifact> = snapshot.trees.values().collect();
        write_svg(path, &trees)?;
    }
    Ok(())
}

fn print_tree(artifact: &TreeArtifact) {
    let info = artifact.info;
    println!(
        "{} ({}; {}, {})",
        info.display_name, info.description, info.complexity, info.estimated_duration
    );
    println!(
        "  {} leaves, {} internal nodes, depth {}",
        artifact.tree.leaf_names().len(),
        artifact.tree.internal_count(),
        artifact.tree.max_depth()
    );
    if let Some(newick) = &artifact.newick {
        println!("  {newick}");
    }
}

fn print_comparison(comparison: &ComparisonResult) {
    let reading = interpret(comparison);
    println!(
        "{} vs {}: {:.1}% similar ({})",
        comparison.method1,
        comparison.method2,
        comparison.similarity.percentage,
        reading.similarity
    );
    println!("  {}", reading.similarity.description());
    println!(
        "  Robinson-Foulds {} of {} (normalized {:.3}): {}",
        comparison.rf_distance.distance,
        comparison.rf_distance.max_distance,
        comparison.rf_distance.normalized,
        reading.topology
    );
    println!("  {}", reading.topology.description());
    println!(
        "  {} common leaves, {} only in {}, {} only in {}",
        comparison.terminals.common.len(),
        comparison.terminals.unique1.len(),
        comparison.method1,
        comparison.terminals.unique2.len(),
        comparison.method2
    );
    if let Some(support) = &comparison.support_values {
        println!(
            "  mean support {:.1} vs {:.1}",
            support.tree1.mean, support.tree2.mean
        );
    }
}

fn write_svg(path: &Path, trees: &[&TreeArtifact]) -> Result<()> {
    let diagrams: Vec<render::TreeDiagram> = trees
        .iter()
        .map(|artifact| {
            render::project(
                &TreeLayout::compute(&artifact.tree),
                render::Viewport::default(),
                artifact.info.display_name,
            )
        })
        .collect();
    let document = render::render_side_by_side(&diagrams);
    std::fs::write(path, document.to_string())
        .with_context(|| format!("failed to write '{}'", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}
