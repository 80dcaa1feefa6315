// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # opsched
//!
//! Command-line driver for the hierarchical memory-aware scheduler.
//!
//! ## Usage
//! ```bash
//! # Schedule a model and report the estimated peak
//! opsched ./models/mobilenet_v2.json
//!
//! # Compare against the reverse-post-order baseline
//! opsched ./models/mobilenet_v2.json --compare
//!
//! # Dump value lifetimes and a DOT rendering of the scheduled graph
//! opsched ./models/mobilenet_v2.json --lifetimes --dot sched.dot
//! ```

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "opsched",
    about = "Memory-aware operator scheduling for inference graphs",
    version
)]
struct Cli {
    /// Path to the model JSON file.
    model: std::path::PathBuf,

    /// Also compute the reverse-post-order baseline and report both peaks.
    #[arg(long)]
    compare: bool,

    /// Print the per-value lifetime table of the final schedule.
    #[arg(long)]
    lifetimes: bool,

    /// Write a Graphviz DOT rendering of the scheduled graph to this path.
    #[arg(long, value_name = "FILE")]
    dot: Option<std::path::PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let graph = graph_ir::GraphLoader::load(&cli.model).map_err(|e| {
        anyhow::anyhow!("failed to load model from '{}': {e}", cli.model.display())
    })?;
    tracing::info!("{}", graph.summary());

    let order = hier_sched::hierarchical_schedule(&graph)?;
    let peak = hier_sched::estimate_peak(&order, &graph);
    tracing::info!(peak_bytes = peak, "schedule complete");

    println!("Model: {}", graph.name);
    println!("Ops scheduled: {}", order.len());
    println!(
        "Estimated peak: {:.1} KiB ({peak} bytes)",
        peak as f64 / 1024.0,
    );

    if cli.compare {
        let baseline = hier_sched::reverse_post_order(&graph);
        let baseline_peak = hier_sched::estimate_peak(&baseline, &graph);
        println!(
            "Reverse post-order peak: {:.1} KiB ({baseline_peak} bytes)",
            baseline_peak as f64 / 1024.0,
        );
        if baseline_peak > 0 {
            let saved = baseline_peak.saturating_sub(peak);
            println!(
                "Savings over baseline: {:.1}%",
                saved as f64 / baseline_peak as f64 * 100.0,
            );
        }
    }

    if cli.lifetimes {
        let lifetime = hier_sched::Lifetime::compute(&order, &graph);
        println!();
        print!("{lifetime}");
    }

    if let Some(path) = cli.dot {
        let rendered = graph_ir::dot::render(&graph, Some(&order));
        std::fs::write(&path, rendered)
            .map_err(|e| anyhow::anyhow!("cannot write '{}': {e}", path.display()))?;
        println!("DOT written to {}", path.display());
    }

    Ok(())
}

/// Initializes the tracing subscriber from the `-v` count.
fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}
