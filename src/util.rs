use std::path::Path;
use std::thread;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::Sender;
use log::{debug, info, warn};

use crate::covariance::open_covariance;
use crate::harmonize::harmonize_gwas_and_weight;
use crate::io;
use crate::io::columns::ColumnSpec;
use crate::io::gwas::GwasTable;
use crate::io::paths::{chromosome_path, resolve_companion, CompanionKind, CHR_PLACEHOLDER};
use crate::io::results::AdjustmentMeta;
use crate::io::weights::WeightTable;
use crate::stats::chromosome::{aggregate_chromosome, ChromosomeJob};
use crate::stats::marginal::{empirical_null_adjust, genomic_control, marginal_test};
use crate::stats::null::{null_names, null_weights};
use crate::stats::running::{ChromosomeContribution, RunningSufficientStats};

pub const N_AUTOSOMES: u8 = 22;

pub struct RuntimeConfig {
    /// Chromosomes processed concurrently.
    pub num_threads: usize,
    /// Chromosomes loaded ahead of the workers.
    pub capacity: usize,
    /// Forwarded to the covariance product.
    pub block_size: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct EmpiricalNull {
    pub nrepeat: usize,
    pub seed: u64,
}

/// Load the covariance meta and covariance of every chromosome with GWAS
/// SNPs and hand them to the workers.
fn chromosome_reader(
    covariance_template: &str,
    gwas: &GwasTable,
    weight: &WeightTable,
    output: Sender<ChromosomeJob>,
) -> Result<()> {
    for chr in 1..=N_AUTOSOMES {
        let label = chr.to_string();
        let gwas_sub = gwas.subset_chr(&label);
        if gwas_sub.is_empty() {
            debug!("Chromosome {}: no GWAS SNPs, skipping", chr);
            continue;
        }
        let weight_sub = weight.subset_chr(&label);

        info!("Chromosome {}: Loading genotype covariance meta information.", chr);
        let cov_path = chromosome_path(covariance_template, chr);
        let cov_path = Path::new(&cov_path);
        let meta_path = resolve_companion(cov_path, CompanionKind::SnpMeta)?;
        let target = io::matrix::load_snp_meta(&meta_path)
            .with_context(|| format!("Error reading SNP meta: {}", meta_path.display()))?;
        let covariance = open_covariance(cov_path, &target)
            .with_context(|| format!("Error opening genotype covariance: {}", cov_path.display()))?;

        let job = ChromosomeJob {
            chr,
            gwas: gwas_sub,
            weight: weight_sub,
            target,
            covariance,
        };
        if output.send(job).is_err() {
            break;
        }
    }

    Ok(())
}

/// Sum the contributions of all chromosomes. A reader thread loads
/// covariance blocks while `num_threads` workers multiply, and the calling
/// thread is the only one touching the running sums.
pub fn accumulate_chromosomes(
    covariance_template: &str,
    gwas: &GwasTable,
    weight: &WeightTable,
    runtime_config: &RuntimeConfig,
) -> Result<RunningSufficientStats> {
    let n_idps = weight.n_idps();
    let block_size = runtime_config.block_size;
    let (job_sender, job_receiver) =
        crossbeam_channel::bounded::<ChromosomeJob>(runtime_config.capacity.max(1));
    let (contribution_sender, contribution_receiver) =
        crossbeam_channel::unbounded::<ChromosomeContribution>();

    thread::scope(|s| -> Result<RunningSufficientStats> {
        let reader =
            s.spawn(move || chromosome_reader(covariance_template, gwas, weight, job_sender));

        let mut workers = Vec::new();
        for _ in 0..runtime_config.num_threads.max(1) {
            let receiver = job_receiver.clone();
            let sender = contribution_sender.clone();
            workers.push(s.spawn(move || -> Result<()> {
                for job in receiver.iter() {
                    let contribution = aggregate_chromosome(&job, block_size)
                        .with_context(|| format!("Error processing chromosome {}", job.chr))?;
                    if sender.send(contribution).is_err() {
                        break;
                    }
                }
                Ok(())
            }));
        }
        drop(job_receiver);
        drop(contribution_sender);

        let mut running = RunningSufficientStats::new(n_idps);
        for contribution in contribution_receiver.iter() {
            running.update(&contribution);
        }

        reader
            .join()
            .map_err(|_| anyhow!("Chromosome reader panicked"))??;
        for worker in workers {
            worker
                .join()
                .map_err(|_| anyhow!("Chromosome worker panicked"))??;
        }

        Ok(running)
    })
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    gwas_spec: &ColumnSpec,
    weight_spec: &ColumnSpec,
    covariance_template: &str,
    output_prefix: &str,
    spearman_cutoff: f64,
    empirical_null: Option<EmpiricalNull>,
    runtime_config: &RuntimeConfig,
) -> Result<()> {
    if !covariance_template.contains(CHR_PLACEHOLDER) {
        warn!(
            "Genotype covariance path has no {} placeholder, the same file is used for every chromosome",
            CHR_PLACEHOLDER
        );
    }

    info!("Loading GWAS.");
    let gwas = io::gwas::load_gwas(gwas_spec)
        .with_context(|| format!("Error loading GWAS: {}", gwas_spec.path.display()))?;
    info!("GWAS SNP = {}", gwas.len());

    info!("Loading IDP weights.");
    let (mut weight, performance) = io::weights::load_idp_weights(weight_spec, spearman_cutoff)
        .with_context(|| format!("Error loading IDP weights: {}", weight_spec.path.display()))?;
    let mut idp_names = weight.idp_names.clone();
    let mut nsnp_total = weight.nonzero_counts();
    let mut is_null = vec![false; weight.n_idps()];
    info!(
        "IDP SNP = {} and number of IDPs = {}",
        weight.len(),
        weight.n_idps()
    );

    if let Some(null) = empirical_null {
        info!(
            "Generating IDP weights for the empirical null: nrepeat = {} and seed = {}.",
            null.nrepeat, null.seed
        );
        let names = null_names(null.nrepeat);
        let extra = null_weights(weight.len(), null.nrepeat, null.seed);
        idp_names.extend(names.iter().cloned());
        nsnp_total.extend(extra.column_iter().map(|c| c.iter().filter(|x| **x != 0.0).count()));
        is_null.extend(std::iter::repeat(true).take(null.nrepeat));
        weight.append_columns(names, &extra);
    }

    info!("Harmonizing GWAS and IDP weights.");
    let (gwas, weight) = harmonize_gwas_and_weight(&gwas, &weight);
    info!(
        "{} SNPs left after harmonizing GWAS and IDP weights.",
        gwas.len()
    );

    let running = accumulate_chromosomes(covariance_template, &gwas, &weight, runtime_config)?;
    info!("Processed chromosomes: {:?}", running.chromosomes_seen());

    info!("Step2: Computing marginal test.");
    let test = marginal_test(&running, &idp_names, &nsnp_total, &is_null);
    let (test, null_z) = test.split_null();
    if test.is_empty() {
        warn!("No IDP has usable SNPs, the result table will be empty");
    }

    info!("Generating adjusted BrainXcan z-score.");
    let (z_adj_gc, lambda_gc) = genomic_control(&test.zscore);
    info!("GC lambda = {}.", lambda_gc);

    let z_adj_emp = empirical_null.map(|_| {
        let null_values: Vec<f64> = null_z.iter().map(|(_, z)| *z).collect();
        empirical_null_adjust(&test.zscore, &null_values).0
    });

    info!("Saving outputs.");
    let results =
        io::results::assemble_results(&test, &z_adj_gc, z_adj_emp.as_deref(), &performance);
    let results_file = format!("{}.csv", output_prefix);
    io::results::write_results(&results, &results_file, z_adj_emp.is_some())
        .with_context(|| format!("Error writing results to file: {}", results_file))?;

    let meta_file = format!("{}.adj_meta.csv", output_prefix);
    io::results::write_adjustment_meta(&AdjustmentMeta { lambda_gc, null_z }, &meta_file)
        .with_context(|| format!("Error writing results to file: {}", meta_file))?;

    Ok(())
}
