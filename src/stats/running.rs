use anyhow::{ensure, Result};
use nalgebra::{DMatrix, DVector};

use crate::covariance::GenotypeCovariance;

/// What one chromosome adds to the running sums.
#[derive(Debug, Clone)]
pub struct ChromosomeContribution {
    pub chr: u8,
    /// `weight.T @ Cov @ weight`, IDP x IDP.
    pub d: DMatrix<f64>,
    /// `weight.T @ (diag(Cov) * b)`.
    pub numer_b: DVector<f64>,
    /// `weight.T @ (sqrt(diag(Cov)) * z)`.
    pub numer_z: DVector<f64>,
    pub nsnp_used: Vec<usize>,
}

impl ChromosomeContribution {
    /// Compute the contribution from zero-filled weights (SNP x IDP) and
    /// GWAS effect sizes and standard errors laid out in covariance order.
    pub fn compute(
        chr: u8,
        weight: &DMatrix<f64>,
        effect_size: &DVector<f64>,
        effect_size_se: &DVector<f64>,
        covariance: &dyn GenotypeCovariance,
        param: usize,
    ) -> Result<Self> {
        ensure!(
            weight.nrows() == effect_size.len() && effect_size.len() == effect_size_se.len(),
            "Chromosome {}: weights cover {} SNPs but GWAS covers {}",
            chr,
            weight.nrows(),
            effect_size.len()
        );

        let z_gwas = effect_size.component_div(effect_size_se);
        let (cov_x_weight, diag_cov) = covariance.eval_matmul_on_left(weight, param)?;

        let d = weight.tr_mul(&cov_x_weight);
        let numer_b = weight.tr_mul(&diag_cov.component_mul(effect_size));
        let numer_z = weight.tr_mul(&diag_cov.map(f64::sqrt).component_mul(&z_gwas));
        let nsnp_used = weight
            .column_iter()
            .map(|col| col.iter().filter(|x| **x != 0.0).count())
            .collect();

        Ok(ChromosomeContribution {
            chr,
            d,
            numer_b,
            numer_z,
            nsnp_used,
        })
    }
}

/// Sums of the per-chromosome contributions. Addition is commutative, so
/// chromosomes may be folded in any order or in separate accumulators that
/// are merged afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningSufficientStats {
    pub d: DMatrix<f64>,
    pub numer_b: DVector<f64>,
    pub numer_z: DVector<f64>,
    pub nsnp_used: Vec<usize>,
    chromosomes_seen: Vec<u8>,
}

impl RunningSufficientStats {
    pub fn new(n_idps: usize) -> Self {
        RunningSufficientStats {
            d: DMatrix::zeros(n_idps, n_idps),
            numer_b: DVector::zeros(n_idps),
            numer_z: DVector::zeros(n_idps),
            nsnp_used: vec![0; n_idps],
            chromosomes_seen: Vec::new(),
        }
    }

    pub fn n_idps(&self) -> usize {
        self.numer_b.len()
    }

    pub fn update(&mut self, contribution: &ChromosomeContribution) {
        assert_eq!(
            contribution.numer_b.len(),
            self.n_idps(),
            "Chromosome {} has {} IDPs, expected {}",
            contribution.chr,
            contribution.numer_b.len(),
            self.n_idps()
        );
        self.d += &contribution.d;
        self.numer_b += &contribution.numer_b;
        self.numer_z += &contribution.numer_z;
        for (total, n) in self.nsnp_used.iter_mut().zip(&contribution.nsnp_used) {
            *total += n;
        }
        self.chromosomes_seen.push(contribution.chr);
    }

    pub fn merge(mut self, other: RunningSufficientStats) -> Self {
        self.d += other.d;
        self.numer_b += other.numer_b;
        self.numer_z += other.numer_z;
        for (total, n) in self.nsnp_used.iter_mut().zip(other.nsnp_used) {
            *total += n;
        }
        self.chromosomes_seen.extend(other.chromosomes_seen);
        self
    }

    /// Chromosomes folded in so far, sorted.
    pub fn chromosomes_seen(&self) -> Vec<u8> {
        let mut seen = self.chromosomes_seen.clone();
        seen.sort_unstable();
        seen
    }
}
