use std::collections::HashSet;

use anyhow::{Context, Result};
use log::info;

use crate::harmonize::alleles::AllelePair;
use crate::harmonize::SnpInfo;
use crate::io::columns::{ColumnSpec, EffectColumns, GwasColumns, SnpColumns};
use crate::io::error::SbxcanError;
use crate::io::table::{read_table, RawTable};

/// GWAS summary statistics with one row per SNP. Every row carries a
/// finite effect size and a finite, non-zero standard error.
#[derive(Debug, Clone, Default)]
pub struct GwasTable {
    pub snps: Vec<SnpInfo>,
    pub effect_size: Vec<f64>,
    pub effect_size_se: Vec<f64>,
}

impl GwasTable {
    pub fn len(&self) -> usize {
        self.snps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snps.is_empty()
    }

    pub fn subset_chr(&self, chr: &str) -> GwasTable {
        let mut subset = GwasTable::default();
        for (i, snp) in self.snps.iter().enumerate() {
            if snp.chr == chr {
                subset.snps.push(snp.clone());
                subset.effect_size.push(self.effect_size[i]);
                subset.effect_size_se.push(self.effect_size_se[i]);
            }
        }
        subset
    }
}

/// SNP identity columns read from a table, with rows lacking an id or a
/// chromosome marked as unusable.
pub(crate) fn read_snp_info(table: &RawTable, columns: &SnpColumns) -> Result<Vec<Option<SnpInfo>>> {
    let snpid = table.text(&columns.snpid)?;
    let chr = table.text(&columns.chr)?;
    let effect_allele = table.text(&columns.effect_allele)?;
    let non_effect_allele = table.text(&columns.non_effect_allele)?;

    Ok((0..table.nrows())
        .map(|i| match (&snpid[i], &chr[i]) {
            (Some(id), Some(c)) => Some(SnpInfo::new(
                id,
                c,
                AllelePair::parse(effect_allele[i].as_deref(), non_effect_allele[i].as_deref()),
            )),
            _ => None,
        })
        .collect())
}

/// Indices of the first occurrence of every SNP id, skipping unusable rows.
pub(crate) fn first_occurrences(snps: &[Option<SnpInfo>]) -> Vec<usize> {
    let mut seen = HashSet::new();
    snps.iter()
        .enumerate()
        .filter_map(|(i, snp)| snp.as_ref().map(|s| (i, s)))
        .filter(|(_, snp)| seen.insert(snp.snpid.clone()))
        .map(|(i, _)| i)
        .collect()
}

/// Effect size and standard error implied by a z-score, allele frequency
/// and sample size: `se = 1 / sqrt(2 n af (1 - af))`, `b = z se`.
pub fn impute_effect_size(zscore: f64, allele_frequency: f64, sample_size: f64) -> (f64, f64) {
    let se = 1.0 / (2.0 * sample_size * allele_frequency * (1.0 - allele_frequency)).sqrt();
    (zscore * se, se)
}

/// Impute effect sizes for all rows. Fails if any sample size is negative
/// or any allele frequency lies outside (0, 1); rows with a missing input
/// get missing outputs.
pub fn impute_b_from_z(
    zscore: &[Option<f64>],
    allele_frequency: &[Option<f64>],
    sample_size: &[Option<f64>],
) -> Result<(Vec<Option<f64>>, Vec<Option<f64>>)> {
    let n_negative = sample_size.iter().flatten().filter(|n| **n < 0.0).count();
    if n_negative > 0 {
        return Err(SbxcanError::NegativeSampleSize(n_negative).into());
    }
    let n_bad_af = allele_frequency
        .iter()
        .flatten()
        .filter(|af| **af <= 0.0 || **af >= 1.0)
        .count();
    if n_bad_af > 0 {
        return Err(SbxcanError::AlleleFrequencyOutOfRange(n_bad_af).into());
    }

    Ok(zscore
        .iter()
        .zip(allele_frequency)
        .zip(sample_size)
        .map(|((z, af), n)| match (z, af, n) {
            (Some(z), Some(af), Some(n)) => {
                let (b, se) = impute_effect_size(*z, *af, *n);
                (Some(b), Some(se))
            }
            _ => (None, None),
        })
        .unzip())
}

fn usable_se(se: Option<f64>) -> Option<f64> {
    se.filter(|x| *x != 0.0 && x.is_finite())
}

/// Load GWAS summary statistics, imputing effect sizes from z-scores when
/// the table has no effect size column.
pub fn load_gwas(spec: &ColumnSpec) -> Result<GwasTable> {
    let table = read_table(&spec.path)?;
    let columns = GwasColumns::resolve(spec, &table.header)
        .with_context(|| format!("Error resolving GWAS columns in {}", spec.path.display()))?;

    let snps = read_snp_info(&table, &columns.snp)?;
    let keep = first_occurrences(&snps);
    let select = |values: Vec<Option<f64>>| -> Vec<Option<f64>> {
        keep.iter().map(|&i| values[i]).collect()
    };

    let (effect_size, effect_size_se) = match &columns.effect {
        EffectColumns::EffectSize {
            effect_size,
            effect_size_se,
        } => (
            select(table.numeric(effect_size)?),
            select(table.numeric(effect_size_se)?),
        ),
        EffectColumns::Zscore {
            zscore,
            allele_frequency,
            sample_size,
        } => {
            info!("Imputing GWAS effect sizes from z-scores");
            impute_b_from_z(
                &select(table.numeric(zscore)?),
                &select(table.numeric(allele_frequency)?),
                &select(table.numeric(sample_size)?),
            )?
        }
    };

    let mut gwas = GwasTable::default();
    for (k, &i) in keep.iter().enumerate() {
        let (Some(b), Some(se)) = (effect_size[k], usable_se(effect_size_se[k])) else {
            continue;
        };
        if let Some(snp) = &snps[i] {
            gwas.snps.push(snp.clone());
            gwas.effect_size.push(b);
            gwas.effect_size_se.push(se);
        }
    }

    info!(
        "GWAS: {} rows, {} unique SNPs, {} SNPs pass QC",
        table.nrows(),
        keep.len(),
        gwas.len()
    );
    Ok(gwas)
}
