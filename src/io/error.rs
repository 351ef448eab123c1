use thiserror::Error;

#[derive(Debug, Error)]
pub enum SbxcanError {
    #[error("Malformed column spec '{0}', expected [col]:[name]")]
    MalformedColumnSpec(String),

    #[error("Unknown column '{0}'")]
    UnknownColumn(String),

    #[error("Column: '{0}' not found in header")]
    MissingColumn(String),

    #[error("Need to have col = {0}")]
    MissingMapping(String),

    #[error("Cannot find the file: {0}")]
    FileNotFound(String),

    #[error("Need either effect_size or zscore in the GWAS file")]
    MissingEffectColumns,

    #[error("There are {0} rows with sample size < 0")]
    NegativeSampleSize(usize),

    #[error("There are {0} rows with allele frequency outside (0, 1)")]
    AlleleFrequencyOutOfRange(usize),

    #[error("Cannot parse '{value}' in column '{column}' as a number")]
    UnparsableValue { column: String, value: String },

    #[error("Covariance matrix has wrong shape, expected {expected} x {expected}, got {nrows} x {ncols}")]
    CovarianceShape {
        expected: usize,
        nrows: usize,
        ncols: usize,
    },

    #[error("No companion file found for {base}, tried: {tried}")]
    CompanionNotFound { base: String, tried: String },
}
