//! Genotype covariance blocks, one per chromosome, addressed in the SNP
//! order of their meta table.

use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::harmonize::SnpInfo;
use crate::io::error::SbxcanError;
use crate::io::matrix::{labeled_matrix_from_table, triplets_from_table};
use crate::io::table::read_table;

pub trait GenotypeCovariance: Send {
    /// Number of SNPs covered.
    fn dim(&self) -> usize;

    /// Return `Cov @ weight` and the diagonal of `Cov`. `param` only tunes
    /// how the product is computed.
    fn eval_matmul_on_left(
        &self,
        weight: &DMatrix<f64>,
        param: usize,
    ) -> Result<(DMatrix<f64>, DVector<f64>)>;
}

fn check_weight_rows(weight: &DMatrix<f64>, dim: usize) -> Result<()> {
    ensure!(
        weight.nrows() == dim,
        "Weight matrix has {} rows but the covariance covers {} SNPs",
        weight.nrows(),
        dim
    );
    Ok(())
}

/// A fully stored covariance matrix.
pub struct DenseCovariance {
    cov: DMatrix<f64>,
}

impl DenseCovariance {
    pub fn new(cov: DMatrix<f64>) -> Result<Self> {
        if cov.nrows() != cov.ncols() {
            return Err(SbxcanError::CovarianceShape {
                expected: cov.nrows(),
                nrows: cov.nrows(),
                ncols: cov.ncols(),
            }
            .into());
        }
        Ok(DenseCovariance { cov })
    }
}

impl GenotypeCovariance for DenseCovariance {
    fn dim(&self) -> usize {
        self.cov.nrows()
    }

    /// Multiplies `param` rows of the covariance at a time.
    fn eval_matmul_on_left(
        &self,
        weight: &DMatrix<f64>,
        param: usize,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        check_weight_rows(weight, self.dim())?;

        let block_size = param.max(1);
        let mut product = DMatrix::zeros(self.dim(), weight.ncols());
        let mut start = 0;
        while start < self.dim() {
            let nrows = block_size.min(self.dim() - start);
            let block = self.cov.rows(start, nrows) * weight;
            product.rows_mut(start, nrows).copy_from(&block);
            start += nrows;
        }

        Ok((product, self.cov.diagonal()))
    }
}

/// A symmetric sparse covariance, typically banded, stored as one entry per
/// unordered SNP pair.
pub struct BandedCovariance {
    dim: usize,
    entries: Vec<(usize, usize, f64)>,
}

impl BandedCovariance {
    /// Entries may name either triangle; repeated pairs are summed.
    pub fn new(dim: usize, entries: Vec<(usize, usize, f64)>) -> Result<Self> {
        if let Some((i, j, _)) = entries.iter().find(|(i, j, _)| *i >= dim || *j >= dim) {
            bail!(
                "Covariance entry ({}, {}) is outside a {} x {} matrix",
                i,
                j,
                dim,
                dim
            );
        }
        let entries = entries
            .into_iter()
            .map(|(i, j, v)| if i <= j { (i, j, v) } else { (j, i, v) })
            .collect();
        Ok(BandedCovariance { dim, entries })
    }
}

impl GenotypeCovariance for BandedCovariance {
    fn dim(&self) -> usize {
        self.dim
    }

    fn eval_matmul_on_left(
        &self,
        weight: &DMatrix<f64>,
        _param: usize,
    ) -> Result<(DMatrix<f64>, DVector<f64>)> {
        check_weight_rows(weight, self.dim)?;

        let mut product = DMatrix::zeros(self.dim, weight.ncols());
        let mut diag = DVector::zeros(self.dim);
        for &(i, j, v) in &self.entries {
            for k in 0..weight.ncols() {
                product[(i, k)] += v * weight[(j, k)];
                if i != j {
                    product[(j, k)] += v * weight[(i, k)];
                }
            }
            if i == j {
                diag[i] += v;
            }
        }

        Ok((product, diag))
    }
}

/// Open the covariance block at `path`, laid out in the order of `meta`.
/// A table with `i`, `j` and `value` columns is read as sparse triplets,
/// anything else as a labeled dense matrix whose labels are the SNP ids.
pub fn open_covariance(path: &Path, meta: &[SnpInfo]) -> Result<Box<dyn GenotypeCovariance>> {
    let table = read_table(path)?;
    let is_triplet = ["i", "j", "value"].iter().all(|c| table.has_column(c));

    let covariance: Box<dyn GenotypeCovariance> = if is_triplet {
        let entries = triplets_from_table(&table)
            .with_context(|| format!("Error reading covariance triplets: {}", path.display()))?;
        debug!("{}: {} stored covariance entries", path.display(), entries.len());
        Box::new(BandedCovariance::new(meta.len(), entries)?)
    } else {
        let labeled = labeled_matrix_from_table(&table)
            .with_context(|| format!("Error reading covariance matrix: {}", path.display()))?;
        if labeled.matrix.nrows() != meta.len() || labeled.matrix.ncols() != meta.len() {
            return Err(SbxcanError::CovarianceShape {
                expected: meta.len(),
                nrows: labeled.matrix.nrows(),
                ncols: labeled.matrix.ncols(),
            }
            .into());
        }
        let meta_ids = meta.iter().map(|snp| snp.snpid.as_str());
        ensure!(
            labeled.row_labels.iter().map(|x| x.as_str()).eq(meta_ids.clone())
                && labeled.col_labels.iter().map(|x| x.as_str()).eq(meta_ids),
            "Covariance labels in {} do not follow the SNP meta order",
            path.display()
        );
        Box::new(DenseCovariance::new(labeled.matrix)?)
    };

    Ok(covariance)
}
