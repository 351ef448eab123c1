use std::path::Path;

use anyhow::{anyhow, Result};
use nalgebra::DMatrix;

use crate::harmonize::SnpInfo;
use crate::io::columns::SnpColumns;
use crate::io::gwas::read_snp_info;
use crate::io::table::{read_table, RawTable};

pub struct LabeledMatrix {
    pub row_labels: Vec<String>,
    pub col_labels: Vec<String>,
    pub matrix: DMatrix<f64>,
}

/// A matrix whose first column holds row labels and whose header holds
/// column labels.
pub(crate) fn labeled_matrix_from_table(table: &RawTable) -> Result<LabeledMatrix> {
    let (label_column, col_labels) = table
        .header
        .split_first()
        .ok_or_else(|| anyhow!("Matrix file has no columns"))?;

    let row_labels: Vec<String> = table
        .text(label_column)?
        .into_iter()
        .enumerate()
        .map(|(i, x)| x.ok_or_else(|| anyhow!("Missing row label on row {}", i + 1)))
        .collect::<Result<_>>()?;

    let mut columns = Vec::with_capacity(col_labels.len());
    for label in col_labels {
        let values: Vec<f64> = table
            .numeric(label)?
            .into_iter()
            .map(|x| x.ok_or_else(|| anyhow!("Missing value in matrix column {}", label)))
            .collect::<Result<_>>()?;
        columns.push(values);
    }

    let matrix = DMatrix::from_fn(row_labels.len(), col_labels.len(), |i, j| columns[j][i]);

    Ok(LabeledMatrix {
        row_labels,
        col_labels: col_labels.to_vec(),
        matrix,
    })
}

/// Read `i, j, value` triplets with 0-based indices.
pub(crate) fn triplets_from_table(table: &RawTable) -> Result<Vec<(usize, usize, f64)>> {
    let i = table.numeric("i")?;
    let j = table.numeric("j")?;
    let value = table.numeric("value")?;

    let index = |x: Option<f64>, row: usize| -> Result<usize> {
        match x {
            Some(v) if v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
            _ => Err(anyhow!("Invalid matrix index on row {}", row + 1)),
        }
    };

    (0..table.nrows())
        .map(|r| {
            let v = value[r].ok_or_else(|| anyhow!("Missing matrix value on row {}", r + 1))?;
            Ok((index(i[r], r)?, index(j[r], r)?, v))
        })
        .collect()
}

/// Read the SNP order and allele orientation of a covariance block.
pub fn load_snp_meta(path: &Path) -> Result<Vec<SnpInfo>> {
    let table = read_table(path)?;
    read_snp_info(&table, &SnpColumns::canonical())?
        .into_iter()
        .enumerate()
        .map(|(i, snp)| snp.ok_or_else(|| anyhow!("SNP meta row {} has no snpid or chr", i + 1)))
        .collect()
}
