use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use nalgebra::DMatrix;

use crate::harmonize::SnpInfo;
use crate::io::columns::{ColumnSpec, SnpColumns};
use crate::io::gwas::{first_occurrences, read_snp_info};
use crate::io::paths::{resolve_companion, CompanionKind};
use crate::io::table::read_table;

/// Cross-validated performance of one IDP prediction model.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceRecord {
    pub idp: String,
    pub cv_r2: Option<f64>,
    pub cv_pearson: Option<f64>,
    pub cv_spearman: Option<f64>,
}

/// Prediction weights, one row per SNP and one column per IDP.
#[derive(Debug, Clone)]
pub struct WeightTable {
    pub snps: Vec<SnpInfo>,
    pub idp_names: Vec<String>,
    pub weights: DMatrix<f64>,
}

impl WeightTable {
    pub fn len(&self) -> usize {
        self.snps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snps.is_empty()
    }

    pub fn n_idps(&self) -> usize {
        self.idp_names.len()
    }

    pub fn subset_chr(&self, chr: &str) -> WeightTable {
        let rows: Vec<usize> = (0..self.len())
            .filter(|&i| self.snps[i].chr == chr)
            .collect();
        WeightTable {
            snps: rows.iter().map(|&i| self.snps[i].clone()).collect(),
            idp_names: self.idp_names.clone(),
            weights: self.weights.select_rows(&rows),
        }
    }

    /// Number of SNPs with a non-zero weight, per IDP.
    pub fn nonzero_counts(&self) -> Vec<usize> {
        self.weights
            .column_iter()
            .map(|col| col.iter().filter(|x| **x != 0.0).count())
            .collect()
    }

    /// Append extra IDP columns, e.g. random weights for an empirical null.
    pub fn append_columns(&mut self, names: Vec<String>, columns: &DMatrix<f64>) {
        assert_eq!(columns.nrows(), self.len(), "Extra columns must have one row per SNP");
        let n_old = self.weights.ncols();
        let old = &self.weights;
        self.weights = DMatrix::from_fn(self.len(), n_old + columns.ncols(), |i, j| {
            if j < n_old {
                old[(i, j)]
            } else {
                columns[(i, j - n_old)]
            }
        });
        self.idp_names.extend(names);
    }
}

/// Read the model performance table. `phenotype` names the IDP; `R2`,
/// `Pearson` and `Spearman` hold the cross-validated metrics.
pub fn load_performance(path: &Path) -> Result<Vec<PerformanceRecord>> {
    let table = read_table(path)?;
    let idp = table.text("phenotype")?;
    let r2 = table.numeric("R2")?;
    let pearson = table.numeric("Pearson")?;
    let spearman = table.numeric("Spearman")?;

    Ok((0..table.nrows())
        .filter_map(|i| {
            idp[i].as_ref().map(|name| PerformanceRecord {
                idp: name.clone(),
                cv_r2: r2[i],
                cv_pearson: pearson[i],
                cv_spearman: spearman[i],
            })
        })
        .collect())
}

/// Load IDP weights and their performance table. Keeps IDPs whose CV
/// Spearman correlation reaches `spearman_cutoff` and whose weights are not
/// all zero, then drops SNPs without any non-zero weight.
pub fn load_idp_weights(
    spec: &ColumnSpec,
    spearman_cutoff: f64,
) -> Result<(WeightTable, Vec<PerformanceRecord>)> {
    let perf_path = resolve_companion(&spec.path, CompanionKind::Performance)?;
    let perf = load_performance(&perf_path)
        .with_context(|| format!("Error reading model performance: {}", perf_path.display()))?;
    let n_models = perf.len();
    let perf: Vec<PerformanceRecord> = perf
        .into_iter()
        .filter(|p| p.cv_spearman.is_some_and(|x| x >= spearman_cutoff))
        .collect();
    info!(
        "{} of {} IDP models pass CV Spearman >= {}",
        perf.len(),
        n_models,
        spearman_cutoff
    );

    let table = read_table(&spec.path)?;
    let columns = SnpColumns::resolve(spec)?;
    let key_columns: HashSet<&str> = columns.names().into_iter().collect();

    let mut idp_names = Vec::new();
    let mut idp_values = Vec::new();
    for record in &perf {
        if key_columns.contains(record.idp.as_str()) || !table.has_column(&record.idp) {
            warn!("IDP {} has performance but no weight column, skipping", record.idp);
            continue;
        }
        let values = table.numeric(&record.idp)?;
        if values.iter().flatten().sum::<f64>() == 0.0 {
            warn!("IDP {} has all-zero weights, skipping", record.idp);
            continue;
        }
        idp_names.push(record.idp.clone());
        idp_values.push(values);
    }

    let snps = read_snp_info(&table, &columns)?;
    let rows: Vec<usize> = first_occurrences(&snps)
        .into_iter()
        .filter(|&i| idp_values.iter().any(|v| v[i].is_some_and(|x| x != 0.0)))
        .collect();

    let weights = DMatrix::from_fn(rows.len(), idp_names.len(), |i, j| {
        idp_values[j][rows[i]].unwrap_or(0.0)
    });
    let snps: Vec<SnpInfo> = rows.iter().filter_map(|&i| snps[i].clone()).collect();

    info!(
        "IDP weights: {} SNPs and {} IDPs (from {} rows)",
        snps.len(),
        idp_names.len(),
        table.nrows()
    );

    Ok((
        WeightTable {
            snps,
            idp_names,
            weights,
        },
        perf,
    ))
}
