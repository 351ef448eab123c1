use std::collections::HashMap;

use log::info;
use nalgebra::{DMatrix, DVector};

use crate::io::gwas::GwasTable;
use crate::io::weights::WeightTable;

pub mod alleles;

use alleles::{check_flips, AllelePair, Flip};

/// Identity and allele orientation of one SNP row.
#[derive(Debug, Clone, PartialEq)]
pub struct SnpInfo {
    pub snpid: String,
    pub chr: String,
    pub alleles: AllelePair,
}

impl SnpInfo {
    pub fn new(snpid: &str, chr: &str, alleles: AllelePair) -> Self {
        SnpInfo {
            snpid: snpid.to_string(),
            chr: clean_chr(chr),
            alleles,
        }
    }

    fn key(&self) -> (&str, &str) {
        (&self.snpid, &self.chr)
    }
}

/// Strip a leading "chr" from a chromosome label.
pub fn clean_chr(chr: &str) -> String {
    let chr = chr.trim();
    chr.strip_prefix("chr").unwrap_or(chr).to_string()
}

fn index_by_key(snps: &[SnpInfo]) -> HashMap<(&str, &str), usize> {
    let mut index = HashMap::with_capacity(snps.len());
    for (i, snp) in snps.iter().enumerate() {
        index.entry(snp.key()).or_insert(i);
    }
    index
}

/// Keep the SNPs present in both the GWAS and the weight table with a
/// determined orientation, in GWAS order. Allele columns take the weight
/// table's orientation and GWAS effect sizes are signed to match it.
pub fn harmonize_gwas_and_weight(gwas: &GwasTable, weight: &WeightTable) -> (GwasTable, WeightTable) {
    let weight_index = index_by_key(&weight.snps);

    let (gwas_rows, weight_rows): (Vec<usize>, Vec<usize>) = gwas
        .snps
        .iter()
        .enumerate()
        .filter_map(|(i, snp)| weight_index.get(&snp.key()).map(|&j| (i, j)))
        .unzip();

    let query: Vec<AllelePair> = gwas_rows.iter().map(|&i| gwas.snps[i].alleles).collect();
    let reference: Vec<AllelePair> = weight_rows.iter().map(|&j| weight.snps[j].alleles).collect();
    let flips = check_flips(&query, &reference);

    let mut snps = Vec::new();
    let mut effect_size = Vec::new();
    let mut effect_size_se = Vec::new();
    let mut kept_weight_rows = Vec::new();
    for ((&i, &j), flip) in gwas_rows.iter().zip(weight_rows.iter()).zip(flips) {
        let Some(b) = flip.orient(gwas.effect_size[i]) else {
            continue;
        };
        snps.push(weight.snps[j].clone());
        effect_size.push(b);
        effect_size_se.push(gwas.effect_size_se[i]);
        kept_weight_rows.push(j);
    }

    info!(
        "{} SNPs shared by GWAS and IDP weights, {} with a usable orientation",
        gwas_rows.len(),
        snps.len()
    );

    let harmonized_weight = WeightTable {
        snps: snps.clone(),
        idp_names: weight.idp_names.clone(),
        weights: weight.weights.select_rows(&kept_weight_rows),
    };
    let harmonized_gwas = GwasTable {
        snps,
        effect_size,
        effect_size_se,
    };

    (harmonized_gwas, harmonized_weight)
}

/// Position of every target row in a source table, with the orientation of
/// the source alleles relative to the target's.
#[derive(Debug, Clone)]
pub struct TargetAlignment {
    pub source_row: Vec<Option<usize>>,
    pub flips: Vec<Flip>,
}

impl TargetAlignment {
    pub fn len(&self) -> usize {
        self.source_row.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_row.is_empty()
    }

    pub fn n_matched(&self) -> usize {
        self.source_row.iter().filter(|x| x.is_some()).count()
    }

    /// A signed source value re-expressed in the target orientation.
    pub fn oriented(&self, i: usize, values: &[f64]) -> Option<f64> {
        self.source_row[i].and_then(|r| self.flips[i].orient(values[r]))
    }

    /// An unsigned source value carried over as is.
    pub fn carried(&self, i: usize, values: &[f64]) -> Option<f64> {
        self.source_row[i].map(|r| values[r])
    }
}

/// Left-join a source SNP list onto a target SNP list. The result always has
/// one entry per target row, in target order.
pub fn align_to_target(source: &[SnpInfo], target: &[SnpInfo]) -> TargetAlignment {
    let source_index = index_by_key(source);
    let source_row: Vec<Option<usize>> = target
        .iter()
        .map(|snp| source_index.get(&snp.key()).copied())
        .collect();

    let query: Vec<AllelePair> = target.iter().map(|snp| snp.alleles).collect();
    let reference: Vec<AllelePair> = source_row
        .iter()
        .map(|row| row.map(|r| source[r].alleles).unwrap_or_default())
        .collect();
    let flips = check_flips(&query, &reference);

    TargetAlignment { source_row, flips }
}

/// GWAS values laid out in the order and orientation of a target SNP list.
#[derive(Debug, Clone)]
pub struct TargetGwas {
    pub snps: Vec<SnpInfo>,
    pub effect_size: Vec<Option<f64>>,
    pub effect_size_se: Vec<Option<f64>>,
}

impl TargetGwas {
    pub fn n_observed(&self) -> usize {
        self.effect_size.iter().filter(|x| x.is_some()).count()
    }

    /// Effect sizes with missing values as 0 and standard errors with
    /// missing values as 1, so absent SNPs have a z-score of 0.
    pub fn zero_filled(&self) -> (DVector<f64>, DVector<f64>) {
        let b = DVector::from_iterator(
            self.effect_size.len(),
            self.effect_size.iter().map(|x| x.unwrap_or(0.0)),
        );
        let se = DVector::from_iterator(
            self.effect_size_se.len(),
            self.effect_size_se.iter().map(|x| x.unwrap_or(1.0)),
        );
        (b, se)
    }
}

/// IDP weights laid out in the order and orientation of a target SNP list.
#[derive(Debug, Clone)]
pub struct TargetWeights {
    pub snps: Vec<SnpInfo>,
    pub idp_names: Vec<String>,
    pub weights: DMatrix<Option<f64>>,
}

impl TargetWeights {
    pub fn n_observed(&self) -> usize {
        self.weights
            .row_iter()
            .filter(|row| row.iter().any(|x| x.is_some()))
            .count()
    }

    pub fn zero_filled(&self) -> DMatrix<f64> {
        self.weights.map(|x| x.unwrap_or(0.0))
    }
}

pub fn rearrange_gwas_by_target(gwas: &GwasTable, target: &[SnpInfo]) -> TargetGwas {
    let alignment = align_to_target(&gwas.snps, target);
    let effect_size = (0..alignment.len())
        .map(|i| alignment.oriented(i, &gwas.effect_size))
        .collect();
    let effect_size_se = (0..alignment.len())
        .map(|i| alignment.carried(i, &gwas.effect_size_se))
        .collect();

    TargetGwas {
        snps: target.to_vec(),
        effect_size,
        effect_size_se,
    }
}

pub fn rearrange_weights_by_target(weight: &WeightTable, target: &[SnpInfo]) -> TargetWeights {
    let alignment = align_to_target(&weight.snps, target);
    let weights = DMatrix::from_fn(alignment.len(), weight.weights.ncols(), |i, j| {
        alignment.source_row[i].and_then(|r| alignment.flips[i].orient(weight.weights[(r, j)]))
    });

    TargetWeights {
        snps: target.to_vec(),
        idp_names: weight.idp_names.clone(),
        weights,
    }
}
