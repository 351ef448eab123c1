use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use anyhow::{bail, Result};
use log::warn;

use crate::io::error::SbxcanError;
use crate::io::paths::ensure_file;

/// Fields the loaders know how to interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalColumn {
    Snpid,
    Chr,
    EffectAllele,
    NonEffectAllele,
    EffectSize,
    EffectSizeSe,
    Zscore,
    AlleleFrequency,
    SampleSize,
}

impl LogicalColumn {
    pub const ALL: [LogicalColumn; 9] = [
        LogicalColumn::Snpid,
        LogicalColumn::Chr,
        LogicalColumn::EffectAllele,
        LogicalColumn::NonEffectAllele,
        LogicalColumn::EffectSize,
        LogicalColumn::EffectSizeSe,
        LogicalColumn::Zscore,
        LogicalColumn::AlleleFrequency,
        LogicalColumn::SampleSize,
    ];

    /// Columns every SNP table must map.
    pub const SNP_KEYS: [LogicalColumn; 4] = [
        LogicalColumn::Snpid,
        LogicalColumn::Chr,
        LogicalColumn::EffectAllele,
        LogicalColumn::NonEffectAllele,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LogicalColumn::Snpid => "snpid",
            LogicalColumn::Chr => "chr",
            LogicalColumn::EffectAllele => "effect_allele",
            LogicalColumn::NonEffectAllele => "non_effect_allele",
            LogicalColumn::EffectSize => "effect_size",
            LogicalColumn::EffectSizeSe => "effect_size_se",
            LogicalColumn::Zscore => "zscore",
            LogicalColumn::AlleleFrequency => "allele_frequency",
            LogicalColumn::SampleSize => "sample_size",
        }
    }

    pub fn from_name(name: &str) -> Option<LogicalColumn> {
        LogicalColumn::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for LogicalColumn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A table path plus the source column name of each logical field, parsed
/// from `<path> <col:name>...` tokens.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub path: PathBuf,
    columns: HashMap<LogicalColumn, String>,
}

impl ColumnSpec {
    /// Parse command line tokens. In strict mode a logical name outside
    /// `allowed` is an error, otherwise it is skipped with a warning.
    pub fn parse(args: &[String], allowed: &[LogicalColumn], strict: bool) -> Result<Self> {
        let Some((path, pairs)) = args.split_first() else {
            bail!("Expected a file path followed by [col]:[name] pairs");
        };
        let path = PathBuf::from(path);
        ensure_file(&path)?;

        let mut columns = HashMap::new();
        for pair in pairs {
            let parts: Vec<&str> = pair.split(':').collect();
            let [col, name] = parts.as_slice() else {
                return Err(SbxcanError::MalformedColumnSpec(pair.clone()).into());
            };
            match LogicalColumn::from_name(col).filter(|c| allowed.contains(c)) {
                Some(column) => {
                    columns.insert(column, name.to_string());
                }
                None if strict => {
                    return Err(SbxcanError::UnknownColumn(col.to_string()).into());
                }
                None => warn!("Ignoring unrecognized column spec '{}'", pair),
            }
        }

        Ok(ColumnSpec { path, columns })
    }

    pub fn from_mapping(path: impl Into<PathBuf>, mapping: &[(LogicalColumn, &str)]) -> Self {
        ColumnSpec {
            path: path.into(),
            columns: mapping
                .iter()
                .map(|(c, name)| (*c, name.to_string()))
                .collect(),
        }
    }

    pub fn source(&self, column: LogicalColumn) -> Option<&str> {
        self.columns.get(&column).map(|x| x.as_str())
    }

    pub fn require(&self, column: LogicalColumn) -> Result<String> {
        self.source(column)
            .map(|x| x.to_string())
            .ok_or_else(|| SbxcanError::MissingMapping(column.to_string()).into())
    }
}

/// Source names of the columns that identify a SNP and its alleles.
#[derive(Debug, Clone, PartialEq)]
pub struct SnpColumns {
    pub snpid: String,
    pub chr: String,
    pub effect_allele: String,
    pub non_effect_allele: String,
}

impl SnpColumns {
    pub fn resolve(spec: &ColumnSpec) -> Result<Self> {
        Ok(SnpColumns {
            snpid: spec.require(LogicalColumn::Snpid)?,
            chr: spec.require(LogicalColumn::Chr)?,
            effect_allele: spec.require(LogicalColumn::EffectAllele)?,
            non_effect_allele: spec.require(LogicalColumn::NonEffectAllele)?,
        })
    }

    /// Covariance meta tables always use the canonical names.
    pub fn canonical() -> Self {
        SnpColumns {
            snpid: LogicalColumn::Snpid.name().to_string(),
            chr: LogicalColumn::Chr.name().to_string(),
            effect_allele: LogicalColumn::EffectAllele.name().to_string(),
            non_effect_allele: LogicalColumn::NonEffectAllele.name().to_string(),
        }
    }

    pub fn names(&self) -> [&str; 4] {
        [
            self.snpid.as_str(),
            self.chr.as_str(),
            self.effect_allele.as_str(),
            self.non_effect_allele.as_str(),
        ]
    }
}

/// How effect sizes are obtained from a GWAS table.
#[derive(Debug, Clone, PartialEq)]
pub enum EffectColumns {
    EffectSize {
        effect_size: String,
        effect_size_se: String,
    },
    Zscore {
        zscore: String,
        allele_frequency: String,
        sample_size: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GwasColumns {
    pub snp: SnpColumns,
    pub effect: EffectColumns,
}

impl GwasColumns {
    /// Pick effect-size mode when the mapped effect size column exists in
    /// the file, z-score mode when the mapped z-score column does, and
    /// require every column of the chosen mode.
    pub fn resolve(spec: &ColumnSpec, header: &[String]) -> Result<Self> {
        let in_header = |column: LogicalColumn| {
            spec.source(column)
                .is_some_and(|name| header.iter().any(|h| h == name))
        };

        let effect = if in_header(LogicalColumn::EffectSize) {
            EffectColumns::EffectSize {
                effect_size: spec.require(LogicalColumn::EffectSize)?,
                effect_size_se: spec.require(LogicalColumn::EffectSizeSe)?,
            }
        } else if in_header(LogicalColumn::Zscore) {
            EffectColumns::Zscore {
                zscore: spec.require(LogicalColumn::Zscore)?,
                allele_frequency: spec.require(LogicalColumn::AlleleFrequency)?,
                sample_size: spec.require(LogicalColumn::SampleSize)?,
            }
        } else {
            return Err(SbxcanError::MissingEffectColumns.into());
        };

        let columns = GwasColumns {
            snp: SnpColumns::resolve(spec)?,
            effect,
        };
        columns.check_header(header)?;
        Ok(columns)
    }

    fn check_header(&self, header: &[String]) -> Result<()> {
        let effect_names: Vec<&str> = match &self.effect {
            EffectColumns::EffectSize {
                effect_size,
                effect_size_se,
            } => vec![effect_size.as_str(), effect_size_se.as_str()],
            EffectColumns::Zscore {
                zscore,
                allele_frequency,
                sample_size,
            } => vec![
                zscore.as_str(),
                allele_frequency.as_str(),
                sample_size.as_str(),
            ],
        };
        for name in self.snp.names().into_iter().chain(effect_names) {
            if !header.iter().any(|h| h == name) {
                return Err(SbxcanError::MissingColumn(name.to_string()).into());
            }
        }
        Ok(())
    }
}
