use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::io::error::SbxcanError;

pub const CHR_PLACEHOLDER: &str = "{chr_num}";

const COMPRESSION_SUFFIXES: [&str; 2] = [".gz", ".zst"];
const TABLE_SUFFIXES: [&str; 4] = [".parquet", ".tsv", ".csv", ".txt"];

/// Sibling files that are located by naming convention rather than passed
/// on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanionKind {
    /// SNP order and alleles of a covariance block.
    SnpMeta,
    /// Cross-validated performance of the IDP prediction models.
    Performance,
}

impl CompanionKind {
    fn suffixes(self) -> &'static [&'static str] {
        match self {
            CompanionKind::SnpMeta => &[".snp_meta.parquet", ".snp_meta.tsv.gz", ".snp_meta.tsv"],
            CompanionKind::Performance => &[".perf.tsv.gz", ".perf.tsv"],
        }
    }
}

/// Fill the chromosome placeholder of a per-chromosome path template.
pub fn chromosome_path(template: &str, chr: u8) -> String {
    template.replace(CHR_PLACEHOLDER, &chr.to_string())
}

fn strip_compression(name: &str) -> &str {
    COMPRESSION_SUFFIXES
        .iter()
        .find_map(|s| name.strip_suffix(s))
        .unwrap_or(name)
}

fn strip_last_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(i) if i > 0 => &name[..i],
        _ => name,
    }
}

/// Candidate paths for a companion file, most preferred first.
pub fn companion_candidates(base: &Path, kind: CompanionKind) -> Vec<PathBuf> {
    let file_name = base
        .file_name()
        .and_then(|x| x.to_str())
        .unwrap_or_default();
    let uncompressed = strip_compression(file_name);
    let stem = match kind {
        CompanionKind::SnpMeta => strip_last_extension(uncompressed),
        CompanionKind::Performance => TABLE_SUFFIXES
            .iter()
            .find_map(|s| uncompressed.strip_suffix(s))
            .unwrap_or(uncompressed),
    };

    kind.suffixes()
        .iter()
        .map(|suffix| base.with_file_name(format!("{stem}{suffix}")))
        .collect()
}

/// Return the first companion candidate that exists on disk.
pub fn resolve_companion(base: &Path, kind: CompanionKind) -> Result<PathBuf> {
    let candidates = companion_candidates(base, kind);
    if let Some(found) = candidates.iter().find(|p| p.is_file()) {
        return Ok(found.clone());
    }

    let tried = candidates
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(SbxcanError::CompanionNotFound {
        base: base.display().to_string(),
        tried,
    }
    .into())
}

pub fn ensure_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(SbxcanError::FileNotFound(path.display().to_string()).into());
    }
    Ok(())
}
