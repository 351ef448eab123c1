use anyhow::Result;
use log::info;

use crate::covariance::GenotypeCovariance;
use crate::harmonize::{rearrange_gwas_by_target, rearrange_weights_by_target, SnpInfo};
use crate::io::gwas::GwasTable;
use crate::io::weights::WeightTable;
use crate::stats::running::ChromosomeContribution;

/// Everything needed to process one chromosome.
pub struct ChromosomeJob {
    pub chr: u8,
    pub gwas: GwasTable,
    pub weight: WeightTable,
    /// SNP order and orientation of the covariance block.
    pub target: Vec<SnpInfo>,
    pub covariance: Box<dyn GenotypeCovariance>,
}

/// Lay GWAS and weights out on the covariance SNPs, zero-fill what is
/// missing and compute the chromosome's contribution.
pub fn aggregate_chromosome(job: &ChromosomeJob, param: usize) -> Result<ChromosomeContribution> {
    let chr = job.chr;
    let n0 = job.weight.len();

    let gwas = rearrange_gwas_by_target(&job.gwas, &job.target);
    let weight = rearrange_weights_by_target(&job.weight, &job.target);
    info!(
        "Step0 Chromosome {}: {} out of {} SNPs in IDP/GWAS are used ({} weight rows matched, {} covariance SNPs).",
        chr,
        gwas.n_observed(),
        n0,
        weight.n_observed(),
        job.target.len()
    );

    info!("Step1 Chromosome {}: Working with genotype covariance.", chr);
    let weight = weight.zero_filled();
    let (effect_size, effect_size_se) = gwas.zero_filled();
    ChromosomeContribution::compute(
        chr,
        &weight,
        &effect_size,
        &effect_size_se,
        job.covariance.as_ref(),
        param,
    )
}
