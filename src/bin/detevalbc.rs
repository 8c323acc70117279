// src/bin/detevalbc.rs
//! Evaluate four simulation directories that differ only in the boundary
//! condition (pbc, apbc-x, apbc-y, apbc-xy) and average the estimates.

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use detsdw::evaluation::{average_evaluations, common_metadata, evaluate_directory, EvalOptions, SystemSize};
use detsdw::params::BoundaryCondition;
use detsdw::SdwError;
use rayon::prelude::*;

#[derive(Parser, Debug)]
#[command(about = "Average time series estimates over the four boundary conditions")]
struct Cli {
    #[arg(short, long, default_value_t = 0)]
    discard: usize,

    #[arg(short, long, default_value_t = 0)]
    read: usize,

    #[arg(short, long, default_value_t = 1)]
    subsample: usize,

    #[arg(short, long = "jkblocks", default_value_t = 1)]
    jkblocks: usize,

    /// Switch off estimation of expectation values and error bars
    #[arg(long)]
    noexp: bool,

    #[arg(long = "outputDirectory", default_value = ".")]
    output_directory: PathBuf,

    /// The four directories containing time series
    #[arg(num_args = 4, required = true)]
    input_directories: Vec<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    if cli.input_directories.len() != 4 {
        return Err(format!("number of passed input directories {} is not 4", cli.input_directories.len()).into());
    }
    let opts = EvalOptions {
        discard: cli.discard,
        read: cli.read,
        subsample: cli.subsample,
        jk_blocks: cli.jkblocks,
        notau: true,
        noexp: cli.noexp,
        noncollect: Vec::new(),
    };

    // Directories are independent: evaluate them in parallel.
    let results: Vec<_> = cli
        .input_directories
        .par_iter()
        .map(|dir| evaluate_directory(dir, &opts))
        .collect::<Result<_, SdwError>>()?;

    let mut seen = Vec::new();
    for (meta, _) in &results {
        let bc = meta.get("bc").ok_or_else(|| SdwError::missing("bc"))?;
        if seen.contains(&bc) {
            return Err(format!("boundary condition {bc} appears more than once").into());
        }
        seen.push(bc);
    }
    for bc in BoundaryCondition::ALL {
        if !seen.contains(&bc.as_str()) {
            return Err(format!("no data present for boundary condition {bc}").into());
        }
    }

    let sizes = results
        .iter()
        .map(|(meta, _)| SystemSize::from_metadata(meta))
        .collect::<Result<Vec<_>, SdwError>>()?;
    if sizes.windows(2).any(|w| w[0] != w[1]) {
        return Err("mismatch of L, m or dtau between the directories".into());
    }

    let metas: Vec<_> = results.iter().map(|(meta, _)| meta.clone()).collect();
    let mut meta = common_metadata(&metas);
    meta.insert("bc", "averaged");
    let evals: Vec<_> = results.into_iter().map(|(_, eval)| eval).collect();
    let avg = average_evaluations(&evals, sizes[0])?;

    std::fs::create_dir_all(&cli.output_directory)?;
    if !opts.noexp {
        avg.write_results(&cli.output_directory, &meta, &opts)?;
    }
    println!("Done!");
    Ok(())
}
