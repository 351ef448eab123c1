use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::Result;

use crate::io::weights::PerformanceRecord;
use crate::stats::marginal::MarginalTest;
use crate::stats::sumstats::z2p;

const MISSING: &str = "NA";

/// One row of the per-IDP output table.
#[derive(Debug, Clone, PartialEq)]
pub struct IdpResult {
    pub idp: String,
    pub bhat: f64,
    pub pval: f64,
    pub pval_adj: f64,
    pub pval_adj_emp: Option<f64>,
    pub nsnp_used: usize,
    pub nsnp_total: usize,
    pub cv_r2: Option<f64>,
    pub cv_pearson: Option<f64>,
    pub cv_spearman: Option<f64>,
}

/// Genomic control lambda and, with an empirical null, the z-score of
/// every null replicate.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentMeta {
    pub lambda_gc: f64,
    pub null_z: Vec<(String, f64)>,
}

fn pvalue_order(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.total_cmp(&b),
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
    }
}

/// Join test statistics with model performance (IDPs without a performance
/// row keep missing metrics) and sort by ascending p-value, missing last.
pub fn assemble_results(
    test: &MarginalTest,
    z_adj_gc: &[f64],
    z_adj_emp: Option<&[f64]>,
    performance: &[PerformanceRecord],
) -> Vec<IdpResult> {
    let perf_by_idp: HashMap<&str, &PerformanceRecord> =
        performance.iter().map(|p| (p.idp.as_str(), p)).collect();

    let mut results: Vec<IdpResult> = (0..test.len())
        .map(|i| {
            let perf = perf_by_idp.get(test.idp_names[i].as_str());
            IdpResult {
                idp: test.idp_names[i].clone(),
                bhat: test.bhat[i],
                pval: z2p(test.zscore[i]),
                pval_adj: z2p(z_adj_gc[i]),
                pval_adj_emp: z_adj_emp.map(|z| z2p(z[i])),
                nsnp_used: test.nsnp_used[i],
                nsnp_total: test.nsnp_total[i],
                cv_r2: perf.and_then(|p| p.cv_r2),
                cv_pearson: perf.and_then(|p| p.cv_pearson),
                cv_spearman: perf.and_then(|p| p.cv_spearman),
            }
        })
        .collect();

    results.sort_by(|a, b| pvalue_order(a.pval, b.pval));
    results
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(x) if !x.is_nan() => x.to_string(),
        _ => MISSING.to_string(),
    }
}

pub fn write_results(results: &[IdpResult], filename: &str, with_empirical: bool) -> Result<()> {
    let mut writer = csv::Writer::from_path(filename)?;

    let mut header = vec!["IDP", "bhat", "pval", "pval_adj"];
    if with_empirical {
        header.push("pval_adj_emp");
    }
    header.extend(["nsnp_used", "nsnp_total", "CV_R2", "CV_Pearson", "CV_Spearman"]);
    writer.write_record(&header)?;

    for result in results {
        let mut record = vec![
            result.idp.clone(),
            format_value(Some(result.bhat)),
            format_value(Some(result.pval)),
            format_value(Some(result.pval_adj)),
        ];
        if with_empirical {
            record.push(format_value(result.pval_adj_emp));
        }
        record.extend([
            result.nsnp_used.to_string(),
            result.nsnp_total.to_string(),
            format_value(result.cv_r2),
            format_value(result.cv_pearson),
            format_value(result.cv_spearman),
        ]);
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_adjustment_meta(meta: &AdjustmentMeta, filename: &str) -> Result<()> {
    let mut writer = csv::Writer::from_path(filename)?;
    writer.write_record(["name", "value"])?;
    writer.write_record(["lambda_gc".to_string(), format_value(Some(meta.lambda_gc))])?;
    for (name, z) in &meta.null_z {
        writer.write_record([name.clone(), format_value(Some(*z))])?;
    }
    writer.flush()?;
    Ok(())
}
