use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use polars::prelude::{DataFrame, NamedFrom, ParquetWriter, Series};

use nalgebra::{DMatrix, DVector};
use sbxcan::{stats::marginal::genomic_control, stats::sumstats::z2p, InputArguments};
use serde::{Deserialize, Serialize};

const ALLELES: [(&str, &str); 4] = [("A", "G"), ("C", "T"), ("A", "C"), ("G", "T")];
pub const CHROMOSOMES: [u8; 2] = [1, 2];
pub const SPEARMAN_CUTOFF: f64 = 0.1;

pub struct TestSnp {
    pub id: String,
    pub chr: u8,
    pub effect: &'static str,
    pub non_effect: &'static str,
}

pub struct TestData {
    pub snps: Vec<TestSnp>,
    /// One block per entry of `CHROMOSOMES`.
    pub covariance: Vec<DMatrix<f64>>,
    pub idp_ids: Vec<String>,
    pub cv_r2: Vec<f64>,
    pub cv_pearson: Vec<f64>,
    pub cv_spearman: Vec<f64>,
    /// SNP x IDP, in the orientation of the covariance meta.
    pub weights: DMatrix<f64>,
    pub effect_size: DVector<f64>,
    pub effect_size_se: DVector<f64>,
}

// Which simulated SNPs each source carries and how it orients them
fn in_gwas(i: usize) -> bool {
    i % 7 != 3
}

fn in_weights(i: usize) -> bool {
    i % 5 != 1
}

fn gwas_swapped(i: usize) -> bool {
    i % 3 == 0
}

fn weight_complemented(i: usize) -> bool {
    i % 4 == 2
}

fn complement(allele: &str) -> &'static str {
    match allele {
        "A" => "T",
        "T" => "A",
        "C" => "G",
        _ => "C",
    }
}

fn sample_covariance(genotypes: &DMatrix<f64>) -> DMatrix<f64> {
    let n = genotypes.nrows() as f64;
    let means = genotypes.row_mean();
    let centered = DMatrix::from_fn(genotypes.nrows(), genotypes.ncols(), |i, j| {
        genotypes[(i, j)] - means[j]
    });
    (centered.transpose() * &centered) / (n - 1.0)
}

// Simulate
fn build_test(n_samples: usize, n_snps_per_chr: usize, n_idps: usize) -> TestData {
    let mut snps = Vec::new();
    let mut covariance = Vec::new();
    for chr in CHROMOSOMES {
        for k in 0..n_snps_per_chr {
            let (effect, non_effect) = ALLELES[(k + chr as usize) % ALLELES.len()];
            snps.push(TestSnp {
                id: format!("rs{}_{}", chr, k),
                chr,
                effect,
                non_effect,
            });
        }
        let genotypes =
            DMatrix::<u8>::new_random(n_samples, n_snps_per_chr).map(|x| (x % 3) as f64);
        covariance.push(sample_covariance(&genotypes));
    }
    let n_snps = snps.len();

    // Real IDPs, then one with weights only on SNPs missing from the GWAS,
    // one with all-zero weights and one below the Spearman cutoff
    let mut idp_ids: Vec<String> = (0..n_idps).map(|x| format!("idp_{}", x)).collect();
    idp_ids.extend(["idp_unused", "idp_zero", "idp_weak"].map(String::from));

    let mut weights = DMatrix::<f64>::new_random(n_snps, idp_ids.len()).map(|x| x - 0.5);
    for i in 0..n_snps {
        for j in 0..n_idps {
            if (i + j) % 3 == 0 {
                weights[(i, j)] = 0.0;
            }
        }
        weights[(i, n_idps)] = if in_gwas(i) { 0.0 } else { 1.0 };
        weights[(i, n_idps + 1)] = 0.0;
    }

    let cv_spearman: Vec<f64> = (0..idp_ids.len())
        .map(|j| if j == n_idps + 2 { 0.05 } else { 0.2 + 0.01 * j as f64 })
        .collect();

    TestData {
        snps,
        covariance,
        cv_r2: cv_spearman.iter().map(|x| x * x).collect(),
        cv_pearson: cv_spearman.iter().map(|x| x + 0.01).collect(),
        cv_spearman,
        idp_ids,
        weights,
        effect_size: DVector::<f64>::new_random(n_snps).map(|x| (x - 0.5) * 0.2),
        effect_size_se: DVector::<f64>::new_random(n_snps).map(|x| 0.05 + x * 0.05),
    }
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>, csv::Error> {
    csv::WriterBuilder::new().delimiter(b'\t').from_path(path)
}

fn write_gwas(test_data: &TestData, path: &Path) -> Result<(), csv::Error> {
    let mut writer = tsv_writer(path)?;
    writer.write_record(["rsid", "chrom", "a1", "a2", "beta", "se", "z", "af", "n", "pval"])?;

    let mut rows: Vec<usize> = (0..test_data.snps.len()).filter(|&i| in_gwas(i)).collect();
    // A duplicated SNP id, only the first row counts
    rows.push(rows[0]);
    for (k, &i) in rows.iter().enumerate() {
        let snp = &test_data.snps[i];
        let duplicate = k == rows.len() - 1;
        let (a1, a2, sign) = if gwas_swapped(i) {
            (snp.non_effect, snp.effect, -1.0)
        } else {
            (snp.effect, snp.non_effect, 1.0)
        };
        let beta = if duplicate {
            99.0
        } else {
            sign * test_data.effect_size[i]
        };
        let se = test_data.effect_size_se[i];
        writer.write_record([
            snp.id.clone(),
            format!("chr{}", snp.chr),
            a1.to_string(),
            a2.to_string(),
            beta.to_string(),
            se.to_string(),
            (beta / se).to_string(),
            "0.3".to_string(),
            "10000".to_string(),
            "0.5".to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_weights(test_data: &TestData, dir: &Path) -> Result<(), csv::Error> {
    let mut writer = tsv_writer(&dir.join("weights.tsv"))?;
    let mut header = vec![
        "snp".to_string(),
        "chromosome".to_string(),
        "eff".to_string(),
        "ref".to_string(),
    ];
    header.extend(test_data.idp_ids.iter().cloned());
    // Weights without a performance row are ignored
    header.push("idp_no_performance".to_string());
    writer.write_record(&header)?;

    for (i, snp) in test_data.snps.iter().enumerate() {
        if !in_weights(i) {
            continue;
        }
        let (eff, other) = if weight_complemented(i) {
            (complement(snp.effect), complement(snp.non_effect))
        } else {
            (snp.effect, snp.non_effect)
        };
        let mut record = vec![
            snp.id.clone(),
            snp.chr.to_string(),
            eff.to_string(),
            other.to_string(),
        ];
        record.extend(test_data.weights.row(i).iter().map(|x| x.to_string()));
        record.push("1".to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;

    let mut writer = tsv_writer(&dir.join("weights.perf.tsv"))?;
    writer.write_record(["phenotype", "R2", "Pearson", "Spearman"])?;
    for (j, idp) in test_data.idp_ids.iter().enumerate() {
        writer.write_record([
            idp.clone(),
            test_data.cv_r2[j].to_string(),
            test_data.cv_pearson[j].to_string(),
            test_data.cv_spearman[j].to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Chromosome 1 is written as a labeled dense matrix, chromosome 2 as
/// upper triangle triplets.
fn write_covariance(test_data: &TestData, dir: &Path) -> Result<(), csv::Error> {
    for (c, chr) in CHROMOSOMES.iter().enumerate() {
        let snps: Vec<&TestSnp> = test_data.snps.iter().filter(|s| s.chr == *chr).collect();
        let cov = &test_data.covariance[c];

        let mut writer = tsv_writer(&dir.join(format!("cov.chr{}.snp_meta.tsv", chr)))?;
        writer.write_record(["snpid", "chr", "effect_allele", "non_effect_allele"])?;
        for snp in &snps {
            writer.write_record([
                snp.id.clone(),
                snp.chr.to_string(),
                snp.effect.to_string(),
                snp.non_effect.to_string(),
            ])?;
        }
        writer.flush()?;

        let mut writer = tsv_writer(&dir.join(format!("cov.chr{}.tsv", chr)))?;
        if c == 0 {
            let mut header = vec!["snpid".to_string()];
            header.extend(snps.iter().map(|s| s.id.clone()));
            writer.write_record(&header)?;
            for (i, row) in cov.row_iter().enumerate() {
                let mut record = vec![snps[i].id.clone()];
                record.extend(row.iter().map(|x| x.to_string()));
                writer.write_record(&record)?;
            }
        } else {
            writer.write_record(["i", "j", "value"])?;
            for i in 0..cov.nrows() {
                for j in i..cov.ncols() {
                    writer.write_record([i.to_string(), j.to_string(), cov[(i, j)].to_string()])?;
                }
            }
        }
        writer.flush()?;
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResultRow {
    #[serde(rename = "IDP")]
    pub idp: String,
    pub bhat: f64,
    pub pval: f64,
    pub pval_adj: f64,
    #[serde(default, skip_serializing)]
    pub pval_adj_emp: Option<f64>,
    pub nsnp_used: usize,
    pub nsnp_total: usize,
    #[serde(rename = "CV_R2")]
    pub cv_r2: f64,
    #[serde(rename = "CV_Pearson")]
    pub cv_pearson: f64,
    #[serde(rename = "CV_Spearman")]
    pub cv_spearman: f64,
}

/// Compute the marginal test directly from the simulated truth.
fn direct_results(test_data: &TestData) -> Vec<ResultRow> {
    let mut ids = Vec::new();
    let mut bhat = Vec::new();
    let mut zscore = Vec::new();
    let mut nsnp_used = Vec::new();
    let mut nsnp_total = Vec::new();
    let mut perf_idx = Vec::new();

    for j in 0..test_data.idp_ids.len() {
        if test_data.cv_spearman[j] < SPEARMAN_CUTOFF {
            continue;
        }
        let (mut d, mut numer_b, mut numer_z, mut used) = (0.0, 0.0, 0.0, 0);
        for (c, chr) in CHROMOSOMES.iter().enumerate() {
            let rows: Vec<usize> = (0..test_data.snps.len())
                .filter(|&i| test_data.snps[i].chr == *chr)
                .collect();
            let cov = &test_data.covariance[c];
            let w = DVector::from_iterator(
                rows.len(),
                rows.iter().map(|&i| {
                    if in_gwas(i) && in_weights(i) {
                        test_data.weights[(i, j)]
                    } else {
                        0.0
                    }
                }),
            );
            d += (w.transpose() * cov * &w)[(0, 0)];
            for (k, &i) in rows.iter().enumerate() {
                if w[k] == 0.0 {
                    continue;
                }
                let b = test_data.effect_size[i];
                let se = test_data.effect_size_se[i];
                numer_b += w[k] * cov[(k, k)] * b;
                numer_z += w[k] * cov[(k, k)].sqrt() * b / se;
                used += 1;
            }
        }
        if d == 0.0 {
            continue;
        }

        ids.push(test_data.idp_ids[j].clone());
        bhat.push(numer_b / d);
        zscore.push(numer_z / d.sqrt());
        nsnp_used.push(used);
        nsnp_total.push(
            (0..test_data.snps.len())
                .filter(|&i| in_weights(i) && test_data.weights[(i, j)] != 0.0)
                .count(),
        );
        perf_idx.push(j);
    }

    let (z_adj, _) = genomic_control(&zscore);
    (0..ids.len())
        .map(|k| ResultRow {
            idp: ids[k].clone(),
            bhat: bhat[k],
            pval: z2p(zscore[k]),
            pval_adj: z2p(z_adj[k]),
            pval_adj_emp: None,
            nsnp_used: nsnp_used[k],
            nsnp_total: nsnp_total[k],
            cv_r2: test_data.cv_r2[perf_idx[k]],
            cv_pearson: test_data.cv_pearson[perf_idx[k]],
            cv_spearman: test_data.cv_spearman[perf_idx[k]],
        })
        .collect()
}

fn write_direct_results(results: &Vec<ResultRow>, output_path: &Path) {
    let mut writer = csv::Writer::from_path(output_path).unwrap();
    for result in results {
        writer.serialize(result).unwrap();
    }
    writer.flush().unwrap();
}

/// How the simulated inputs land on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Text,
    /// GWAS as zstd, weights and chromosome 1 meta as parquet with integer
    /// chromosomes, performance and chromosome 2 meta as gzip.
    Compressed,
}

fn gzip_file(path: &Path) {
    let content = std::fs::read(path).unwrap();
    let gz_path = format!("{}.gz", path.display());
    let mut encoder = GzEncoder::new(File::create(gz_path).unwrap(), Compression::default());
    encoder.write_all(&content).unwrap();
    encoder.finish().unwrap();
    std::fs::remove_file(path).unwrap();
}

fn zstd_file(path: &Path) {
    let content = std::fs::read(path).unwrap();
    let zst_path = format!("{}.zst", path.display());
    std::fs::write(zst_path, zstd::stream::encode_all(&content[..], 0).unwrap()).unwrap();
    std::fs::remove_file(path).unwrap();
}

fn write_parquet(mut df: DataFrame, path: &Path) {
    ParquetWriter::new(File::create(path).unwrap())
        .finish(&mut df)
        .unwrap();
}

/// Weights as parquet, with zero weights stored as NaN.
fn write_weights_parquet(test_data: &TestData, dir: &Path) {
    let rows: Vec<usize> = (0..test_data.snps.len()).filter(|&i| in_weights(i)).collect();
    let alleles = |i: usize| {
        let snp = &test_data.snps[i];
        if weight_complemented(i) {
            (complement(snp.effect), complement(snp.non_effect))
        } else {
            (snp.effect, snp.non_effect)
        }
    };

    let mut columns = vec![
        Series::new(
            "snp".into(),
            rows.iter().map(|&i| test_data.snps[i].id.clone()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            "chromosome".into(),
            rows.iter().map(|&i| test_data.snps[i].chr as i64).collect::<Vec<_>>(),
        )
        .into(),
        Series::new("eff".into(), rows.iter().map(|&i| alleles(i).0).collect::<Vec<_>>()).into(),
        Series::new("ref".into(), rows.iter().map(|&i| alleles(i).1).collect::<Vec<_>>()).into(),
    ];
    for (j, idp) in test_data.idp_ids.iter().enumerate() {
        let values: Vec<f64> = rows
            .iter()
            .map(|&i| match test_data.weights[(i, j)] {
                x if x == 0.0 => f64::NAN,
                x => x,
            })
            .collect();
        columns.push(Series::new(idp.as_str().into(), values).into());
    }
    columns.push(Series::new("idp_no_performance".into(), vec![1.0; rows.len()]).into());

    write_parquet(DataFrame::new(columns).unwrap(), &dir.join("weights.parquet"));
}

/// Chromosome 1 meta as parquet with an integer chromosome column.
fn write_chr1_meta_parquet(test_data: &TestData, dir: &Path) {
    let snps: Vec<&TestSnp> = test_data.snps.iter().filter(|s| s.chr == CHROMOSOMES[0]).collect();
    let df = DataFrame::new(vec![
        Series::new("snpid".into(), snps.iter().map(|s| s.id.clone()).collect::<Vec<_>>()).into(),
        Series::new("chr".into(), snps.iter().map(|s| s.chr as i64).collect::<Vec<_>>()).into(),
        Series::new("effect_allele".into(), snps.iter().map(|s| s.effect).collect::<Vec<_>>())
            .into(),
        Series::new(
            "non_effect_allele".into(),
            snps.iter().map(|s| s.non_effect).collect::<Vec<_>>(),
        )
        .into(),
    ])
    .unwrap();
    write_parquet(df, &dir.join(format!("cov.chr{}.snp_meta.parquet", CHROMOSOMES[0])));
}

fn path_string(path: &Path) -> String {
    path.to_str().unwrap().to_string()
}

pub fn setup_test(
    dir: &Path,
    n_samples: usize,
    n_snps_per_chr: usize,
    n_idps: usize,
) -> InputArguments {
    setup_test_in_format(dir, n_samples, n_snps_per_chr, n_idps, InputFormat::Text)
}

pub fn setup_test_in_format(
    dir: &Path,
    n_samples: usize,
    n_snps_per_chr: usize,
    n_idps: usize,
    format: InputFormat,
) -> InputArguments {
    let test_data = build_test(n_samples, n_snps_per_chr, n_idps);
    write_gwas(&test_data, &dir.join("gwas.tsv")).unwrap();
    write_weights(&test_data, dir).unwrap();
    write_covariance(&test_data, dir).unwrap();
    write_direct_results(&direct_results(&test_data), &dir.join("direct_results.csv"));

    let mut args = default_arguments(dir);
    if format == InputFormat::Compressed {
        zstd_file(&dir.join("gwas.tsv"));
        args.gwas[0] = path_string(&dir.join("gwas.tsv.zst"));

        write_weights_parquet(&test_data, dir);
        std::fs::remove_file(dir.join("weights.tsv")).unwrap();
        gzip_file(&dir.join("weights.perf.tsv"));
        args.idp_weight[0] = path_string(&dir.join("weights.parquet"));

        write_chr1_meta_parquet(&test_data, dir);
        std::fs::remove_file(dir.join(format!("cov.chr{}.snp_meta.tsv", CHROMOSOMES[0]))).unwrap();
        gzip_file(&dir.join(format!("cov.chr{}.snp_meta.tsv", CHROMOSOMES[1])));
    }
    args
}

fn default_arguments(dir: &Path) -> InputArguments {
    InputArguments {
        genotype_covariance: path_string(&dir.join("cov.chr{chr_num}.tsv")),
        gwas: vec![
            path_string(&dir.join("gwas.tsv")),
            "snpid:rsid".to_string(),
            "chr:chrom".to_string(),
            "effect_allele:a1".to_string(),
            "non_effect_allele:a2".to_string(),
            "effect_size:beta".to_string(),
            "effect_size_se:se".to_string(),
            "pvalue:pval".to_string(),
        ],
        idp_weight: vec![
            path_string(&dir.join("weights.tsv")),
            "snpid:snp".to_string(),
            "chr:chromosome".to_string(),
            "effect_allele:eff".to_string(),
            "non_effect_allele:ref".to_string(),
        ],
        spearman_cutoff: SPEARMAN_CUTOFF,
        empirical_null: false,
        empirical_null_nrepeat: 1000,
        empirical_null_seed: 1,
        output_prefix: path_string(&dir.join("sbxcan")),
        num_threads: 2,
        capacity: 2,
        block_size: 3,
        quiet: true,
    }
}

/// GWAS column tokens that leave only z-scores, allele frequencies and
/// sample sizes to work with.
pub fn zscore_gwas_args(args: &InputArguments) -> Vec<String> {
    vec![
        args.gwas[0].clone(),
        "snpid:rsid".to_string(),
        "chr:chrom".to_string(),
        "effect_allele:a1".to_string(),
        "non_effect_allele:a2".to_string(),
        "zscore:z".to_string(),
        "allele_frequency:af".to_string(),
        "sample_size:n".to_string(),
    ]
}

pub fn read_results(path: &str) -> Vec<ResultRow> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let mut results = Vec::new();
    for result in reader.deserialize() {
        let result = result.unwrap();
        results.push(result);
    }
    results
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * b.abs().max(1e-12)
}

pub fn check_results(direct_results_path: &str, sbxcan_results_path: &str, check_bhat: bool) {
    let direct_results: HashMap<String, ResultRow> = read_results(direct_results_path)
        .into_iter()
        .map(|r| (r.idp.clone(), r))
        .collect();
    let sbxcan_results = read_results(sbxcan_results_path);

    assert_eq!(direct_results.len(), sbxcan_results.len());
    for pair in sbxcan_results.windows(2) {
        assert!(pair[0].pval <= pair[1].pval, "Results are not sorted by p-value");
    }

    for result in &sbxcan_results {
        let direct = direct_results
            .get(&result.idp)
            .unwrap_or_else(|| panic!("Unexpected IDP {}", result.idp));

        if check_bhat {
            assert!(
                close(result.bhat, direct.bhat),
                "bhat - Direct: {}, S-BrainXcan: {}",
                direct.bhat,
                result.bhat
            );
        }
        assert!(
            close(result.pval, direct.pval),
            "P - Direct: {}, S-BrainXcan: {}",
            direct.pval,
            result.pval
        );
        assert!(
            close(result.pval_adj, direct.pval_adj),
            "P adjusted - Direct: {}, S-BrainXcan: {}",
            direct.pval_adj,
            result.pval_adj
        );
        assert_eq!(result.nsnp_used, direct.nsnp_used, "nsnp_used of {}", result.idp);
        assert_eq!(result.nsnp_total, direct.nsnp_total, "nsnp_total of {}", result.idp);
        assert_eq!(result.cv_r2, direct.cv_r2);
        assert_eq!(result.cv_pearson, direct.cv_pearson);
        assert_eq!(result.cv_spearman, direct.cv_spearman);
    }
}
