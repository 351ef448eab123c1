use anyhow::{ensure, Result};
use clap::Parser;
use log::info;
use std::time::Duration;

pub mod covariance;
pub mod harmonize;
pub mod io;
pub mod stats;
pub mod util;

use crate::io::columns::{ColumnSpec, LogicalColumn};

/// Test the association between brain imaging derived phenotypes (IDPs)
/// and a trait, using GWAS summary statistics, IDP prediction weights and
/// per-chromosome genotype covariance.
#[derive(Parser, Debug, Clone)]
#[command(author, version)]
pub struct InputArguments {
    /// Path to the genotype covariance of each chromosome, with {chr_num}
    /// standing in for the chromosome number
    #[arg(long = "genotype_covariance")]
    pub genotype_covariance: String,

    /// GWAS table path followed by [col]:[name] pairs, e.g.
    /// gwas.tsv snpid:rsid chr:chrom effect_allele:a1 non_effect_allele:a2 zscore:z
    #[arg(long, num_args(1..), required = true)]
    pub gwas: Vec<String>,

    /// IDP weight table path followed by [col]:[name] pairs for the SNP
    /// columns snpid, chr, effect_allele and non_effect_allele
    #[arg(long = "idp_weight", num_args(1..), required = true)]
    pub idp_weight: Vec<String>,

    /// Keep IDPs whose cross-validated Spearman correlation is at least this
    #[arg(long = "spearman_cutoff", default_value_t = 0.1)]
    pub spearman_cutoff: f64,

    /// Also report p-values calibrated against random weights
    #[arg(long = "empirical_null", default_value_t = false)]
    pub empirical_null: bool,

    /// Number of random weight vectors for the empirical null
    #[arg(long = "empirical_null_nrepeat", default_value_t = 1000)]
    pub empirical_null_nrepeat: usize,

    /// Seed of the random weights for the empirical null
    #[arg(long = "empirical_null_seed", default_value_t = 1)]
    pub empirical_null_seed: u64,

    /// Prefix of the output files <prefix>.csv and <prefix>.adj_meta.csv
    #[arg(long = "output_prefix")]
    pub output_prefix: String,

    /// Number of chromosomes to process at once
    #[arg(long = "num_threads", default_value_t = 1)]
    pub num_threads: usize,

    /// Number of chromosomes to load ahead of the workers
    #[arg(long, default_value_t = 2)]
    pub capacity: usize,

    /// Number of covariance rows to multiply at a time
    #[arg(long = "block_size", default_value_t = 100)]
    pub block_size: usize,

    /// Suppress output
    #[arg(short, long)]
    pub quiet: bool,
}

pub fn run_cli(args: InputArguments) -> Result<()> {
    info!("Received arguments: {:#?}", &args);

    info!("Starting S-BrainXcan");
    let start = std::time::Instant::now();

    let gwas_spec = ColumnSpec::parse(&args.gwas, &LogicalColumn::ALL, false)?;
    let weight_spec = ColumnSpec::parse(&args.idp_weight, &LogicalColumn::SNP_KEYS, true)?;

    let empirical_null = if args.empirical_null {
        ensure!(
            args.empirical_null_nrepeat > 0,
            "--empirical_null_nrepeat must be positive"
        );
        Some(util::EmpiricalNull {
            nrepeat: args.empirical_null_nrepeat,
            seed: args.empirical_null_seed,
        })
    } else {
        None
    };

    let runtime_config = util::RuntimeConfig {
        num_threads: args.num_threads,
        capacity: args.capacity,
        block_size: args.block_size,
    };

    util::run(
        &gwas_spec,
        &weight_spec,
        &args.genotype_covariance,
        &args.output_prefix,
        args.spearman_cutoff,
        empirical_null,
        &runtime_config,
    )?;

    let duration = Duration::new(start.elapsed().as_secs(), 0);
    info!(
        "Finished S-BrainXcan in {}",
        humantime::format_duration(duration).to_string()
    );

    Ok(())
}
