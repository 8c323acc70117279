// src/bin/deteval.rs
//! Evaluate the time series of one simulation directory:
//! averages, jackknife error bars and integrated autocorrelation times.

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use detsdw::evaluation::{evaluate_directory, EvalOptions};

#[derive(Parser, Debug)]
#[command(about = "Evaluate time series written by detsdw; writes eval-results.values and eval-tauint.values")]
struct Cli {
    /// Number of initial time series entries to discard (additional thermalization)
    #[arg(short, long, default_value_t = 0)]
    discard: usize,

    /// Maximum number of entries to read after discarding, before subsampling (0: all)
    #[arg(short, long, default_value_t = 0)]
    read: usize,

    /// Take only every s'th sample into account
    #[arg(short, long, default_value_t = 1)]
    subsample: usize,

    /// Number of jackknife blocks
    #[arg(short, long = "jkblocks", default_value_t = 1)]
    jkblocks: usize,

    /// Switch off estimation of integrated autocorrelation times
    #[arg(long)]
    notau: bool,

    /// Switch off estimation of expectation values and error bars
    #[arg(long)]
    noexp: bool,

    /// Do not process these observables
    #[arg(short, long, num_args = 1..)]
    noncollect: Vec<String>,

    /// Directory containing info.dat and the *.series files
    #[arg(default_value = ".")]
    directory: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let opts = EvalOptions {
        discard: cli.discard,
        read: cli.read,
        subsample: cli.subsample,
        jk_blocks: cli.jkblocks,
        notau: cli.notau,
        noexp: cli.noexp,
        noncollect: cli.noncollect,
    };

    let (meta, eval) = evaluate_directory(&cli.directory, &opts)?;
    if !opts.noexp {
        eval.write_results(&cli.directory, &meta, &opts)?;
    }
    if !opts.notau {
        eval.write_tauints(&cli.directory, &meta, &opts)?;
    }

    let errors = eval.errors();
    for (name, value) in &eval.estimates {
        match errors.get(name) {
            Some(err) => println!("{name:>28} = {value:.6} ± {err:.6}"),
            None => println!("{name:>28} = {value:.6}"),
        }
    }
    println!("Done!");
    Ok(())
}
