use log::{info, warn};
use statrs::statistics::{Data, OrderStatistics, Statistics};

use crate::stats::running::RunningSufficientStats;
use crate::stats::sumstats::GC_NUMBER;

/// Per-IDP marginal association, restricted to IDPs with non-zero variance.
#[derive(Debug, Clone)]
pub struct MarginalTest {
    pub idp_names: Vec<String>,
    pub bhat: Vec<f64>,
    pub zscore: Vec<f64>,
    pub nsnp_used: Vec<usize>,
    pub nsnp_total: Vec<usize>,
    pub is_null: Vec<bool>,
}

/// Turn the accumulated sums into effect sizes and z-scores:
/// `bhat = numer_b / D_ii` and `z = numer_z / sqrt(D_ii)`. IDPs with
/// `D_ii == 0` have no usable SNPs and are dropped from every output.
pub fn marginal_test(
    stats: &RunningSufficientStats,
    idp_names: &[String],
    nsnp_total: &[usize],
    is_null: &[bool],
) -> MarginalTest {
    let n = stats.n_idps();
    assert_eq!(idp_names.len(), n, "One name per accumulated IDP");
    assert_eq!(nsnp_total.len(), n, "One SNP count per accumulated IDP");
    assert_eq!(is_null.len(), n, "One null flag per accumulated IDP");

    let keep: Vec<usize> = (0..n).filter(|&i| stats.d[(i, i)] != 0.0).collect();
    if keep.len() < n {
        let dropped: Vec<&str> = (0..n)
            .filter(|&i| stats.d[(i, i)] == 0.0)
            .map(|i| idp_names[i].as_str())
            .collect();
        warn!(
            "{} IDPs have no usable SNPs and are excluded: {:?}",
            dropped.len(),
            dropped
        );
    }

    let var_d: Vec<f64> = keep.iter().map(|&i| stats.d[(i, i)]).collect();
    MarginalTest {
        idp_names: keep.iter().map(|&i| idp_names[i].clone()).collect(),
        bhat: keep
            .iter()
            .zip(&var_d)
            .map(|(&i, v)| stats.numer_b[i] / v)
            .collect(),
        zscore: keep
            .iter()
            .zip(&var_d)
            .map(|(&i, v)| stats.numer_z[i] / v.sqrt())
            .collect(),
        nsnp_used: keep.iter().map(|&i| stats.nsnp_used[i]).collect(),
        nsnp_total: keep.iter().map(|&i| nsnp_total[i]).collect(),
        is_null: keep.iter().map(|&i| is_null[i]).collect(),
    }
}

impl MarginalTest {
    pub fn len(&self) -> usize {
        self.idp_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idp_names.is_empty()
    }

    /// Separate empirical null replicates from real IDPs. Returns the real
    /// IDPs and the `(name, z)` pairs of the null replicates.
    pub fn split_null(self) -> (MarginalTest, Vec<(String, f64)>) {
        let real: Vec<usize> = (0..self.len()).filter(|&i| !self.is_null[i]).collect();
        let null_z = (0..self.len())
            .filter(|&i| self.is_null[i])
            .map(|i| (self.idp_names[i].clone(), self.zscore[i]))
            .collect();

        let pick = |values: &[f64]| -> Vec<f64> { real.iter().map(|&i| values[i]).collect() };
        let test = MarginalTest {
            idp_names: real.iter().map(|&i| self.idp_names[i].clone()).collect(),
            bhat: pick(&self.bhat),
            zscore: pick(&self.zscore),
            nsnp_used: real.iter().map(|&i| self.nsnp_used[i]).collect(),
            nsnp_total: real.iter().map(|&i| self.nsnp_total[i]).collect(),
            is_null: vec![false; real.len()],
        };
        (test, null_z)
    }
}

/// Genomic control: `lambda = median(z^2) / 0.456` and
/// `z_adj = sign(z) sqrt(z^2 / lambda)`.
pub fn genomic_control(zscore: &[f64]) -> (Vec<f64>, f64) {
    let chisq: Vec<f64> = zscore.iter().map(|z| z.powi(2)).collect();
    let lambda_gc = Data::new(chisq.clone()).median() / GC_NUMBER;
    let z_adj = chisq
        .iter()
        .zip(zscore)
        .map(|(c, z)| {
            if *z == 0.0 {
                0.0
            } else {
                (c / lambda_gc).sqrt() * z.signum()
            }
        })
        .collect();
    (z_adj, lambda_gc)
}

/// Rescale z-scores by the spread of z-scores from random weights. Returns
/// the adjusted z-scores and the null variance.
pub fn empirical_null_adjust(zscore: &[f64], null_z: &[f64]) -> (Vec<f64>, f64) {
    let varz_null = null_z.iter().population_variance();
    info!(
        "Empirical null variance = {} from {} replicates",
        varz_null,
        null_z.len()
    );
    let scale = varz_null.sqrt();
    (zscore.iter().map(|z| z / scale).collect(), varz_null)
}
