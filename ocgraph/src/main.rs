use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;

use occore::clustering::ClusteringParams;
use occore::loss::{
    calc_lv_lbeta, calc_simple_clus_space_loss, CondensationConfig, CondensationLoss, SimpleClusSpaceConfig,
    SimpleClusSpaceLoss,
};
use ocgraph::io::{load_graphs, load_predictions, load_tables, save_graphs};
use ocgraph::{create_graph_tracking_cld, BuiltGraph, GraphBatch, GraphOptions};

#[derive(Parser)]
#[command(name = "ocgraph")]
#[command(about = "Object-condensation graphs: build, decode and score", long_about = None)]
struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build graphs from event tables (.json, .jsonl or bincode)
    Graphs {
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the kept graphs (.json or bincode)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep inference-only columns
        #[arg(long)]
        predict: bool,

        /// Keep tau-ancestry links
        #[arg(long)]
        tau: bool,

        /// The last hit feature is an overlay flag
        #[arg(long)]
        overlay: bool,

        /// zstd-compress bincode output
        #[arg(long)]
        compress: bool,
    },
    /// Greedy clustering of model output
    Cluster {
        /// JSON with `betas` and `coords`
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, default_value_t = 0.1)]
        t_beta: f32,

        #[arg(long, default_value_t = 1.0)]
        t_d: f32,
    },
    /// Object condensation loss of model output on a set of graphs
    Loss {
        #[arg(short, long)]
        graphs: PathBuf,

        /// JSON with `betas`, `coords` and optional `hit_energy`, one entry per node
        #[arg(short, long)]
        predictions: PathBuf,

        /// JSON file with a condensation loss config
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct LossReport {
    tuple: [f32; 7],
    condensation: CondensationLoss,
    simple: SimpleClusSpaceLoss,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    match cli.command {
        Commands::Graphs {
            input,
            output,
            predict,
            tau,
            overlay,
            compress,
        } => run_graphs(input, output, GraphOptions { predict, tau, overlay }, compress),
        Commands::Cluster { input, t_beta, t_d } => run_cluster(input, ClusteringParams { t_beta, t_d }),
        Commands::Loss {
            graphs,
            predictions,
            config,
        } => run_loss(graphs, predictions, config),
    }
}

fn run_graphs(input: PathBuf, output: Option<PathBuf>, options: GraphOptions, compress: bool) -> anyhow::Result<()> {
    let tables = load_tables(&input).with_context(|| format!("reading tables from {}", input.display()))?;

    let built = tables
        .par_iter()
        .enumerate()
        .map(|(i, t)| create_graph_tracking_cld(t, &options).with_context(|| format!("event {}", i)))
        .collect::<anyhow::Result<Vec<BuiltGraph>>>()?;

    let mut empty: BTreeMap<String, usize> = BTreeMap::new();
    let mut graphs = Vec::with_capacity(built.len());
    for b in built {
        match b {
            BuiltGraph::Graph(g) => graphs.push(g),
            BuiltGraph::Empty(reason) => {
                let key = match reason {
                    ocgraph::EmptyReason::NoHits => "no hits",
                    ocgraph::EmptyReason::TooFewRawHits(_) => "too few raw hits",
                    ocgraph::EmptyReason::TooFewParticles(_) => "too few particles",
                };
                log::debug!("skipping event: {}", reason);
                *empty.entry(key.to_string()).or_default() += 1;
            }
        }
    }

    log::info!("{} of {} events kept", graphs.len(), tables.len());
    for (reason, n) in &empty {
        log::info!("  empty ({}): {}", reason, n);
    }

    if let Some(out) = output {
        save_graphs(&out, &graphs, compress).with_context(|| format!("writing graphs to {}", out.display()))?;
        log::info!("wrote {} graphs to {}", graphs.len(), out.display());
    }
    Ok(())
}

fn run_cluster(input: PathBuf, params: ClusteringParams) -> anyhow::Result<()> {
    let pred = load_predictions(&input).with_context(|| format!("reading predictions from {}", input.display()))?;
    let coords = pred.coords_array()?;
    let betas = ndarray::ArrayView1::from(pred.betas.as_slice());
    let labels = params.cluster(betas, coords.view())?;

    let n_assigned = labels.iter().filter(|&&l| l >= 0).count();
    log::info!("{} of {} points assigned", n_assigned, labels.len());
    println!("{}", serde_json::to_string(&labels)?);
    Ok(())
}

fn run_loss(graphs: PathBuf, predictions: PathBuf, config: Option<PathBuf>) -> anyhow::Result<()> {
    let config: CondensationConfig = match config {
        Some(path) => {
            let f = BufReader::new(File::open(&path).with_context(|| format!("opening {}", path.display()))?);
            serde_json::from_reader(f).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => CondensationConfig::default(),
    };

    let graphs = load_graphs(&graphs).with_context(|| format!("reading graphs from {}", graphs.display()))?;
    let batch = GraphBatch::from_graphs(&graphs)?;
    let pred = load_predictions(&predictions)?;
    if pred.betas.len() != batch.n_hits() {
        bail!(
            "{} predictions for {} nodes in {} graphs",
            pred.betas.len(),
            batch.n_hits(),
            batch.n_events()
        );
    }
    let coords = pred.coords_array()?;

    let input = batch.condensation_input(&pred.betas, coords.view(), pred.hit_energy.as_deref());
    let condensation = calc_lv_lbeta(&input, &config)?;
    let simple = calc_simple_clus_space_loss(
        coords.view(),
        batch.cluster_ids(),
        batch.batch(),
        &SimpleClusSpaceConfig::default(),
        None,
    )?;
    log::info!("loss over {} events:\n{}", batch.n_events(), condensation.components());

    let report = LossReport {
        tuple: condensation.to_tuple(),
        condensation,
        simple,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
