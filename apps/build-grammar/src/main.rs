//! build-grammar: make a Kaldi decode graph for an Alexa skill

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use skill_grammar::{run, BuildPaths, KaldiToolchain, ToolchainConfig};

#[derive(Parser, Debug)]
#[command(
    name = "build-grammar",
    version,
    about = "Make a Kaldi decode graph for an Alexa skill"
)]
struct Cli {
    /// Path to the Alexa skill
    skill: PathBuf,
    /// Path to the Kaldi lang directory
    lang: PathBuf,
    /// Kaldi model directory. Defaults to the directory above the graph
    #[arg(long)]
    model: Option<PathBuf>,
    /// Path to write the graph
    graph: PathBuf,
    /// Kaldi checkout holding the OpenFst and graph tools
    #[arg(long, default_value = "kaldi")]
    kaldi_root: PathBuf,
    /// JSON toolchain config; overrides --kaldi-root
    #[arg(long)]
    toolchain: Option<PathBuf>,
    /// Self-loop scale passed to mkgraph.sh
    #[arg(long)]
    self_loop_scale: Option<f32>,
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.toolchain {
        Some(path) => ToolchainConfig::load(path)?,
        None => ToolchainConfig::for_root(&cli.kaldi_root),
    };
    if let Some(scale) = cli.self_loop_scale {
        config.self_loop_scale = scale;
    }
    let toolchain = KaldiToolchain::new(config)?;

    let paths = BuildPaths::new(cli.skill, cli.lang, cli.model, cli.graph);
    let report = run(&paths, &toolchain)?;

    if !report.oov.is_empty() {
        warn!(
            count = report.oov.len(),
            "tokens missing from words.txt were mapped to <unk>"
        );
    }
    info!(
        intents = report.intents,
        states = report.states,
        arcs = report.arcs,
        fst_bytes = report.fst_bytes,
        graph = %paths.graph_dir.display(),
        "decode graph ready"
    );
    Ok(())
}

fn setup_tracing() {
    // Out-of-vocabulary warnings should reach the operator without RUST_LOG.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
