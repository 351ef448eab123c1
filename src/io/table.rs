use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use log::debug;
use polars::prelude::{DataType, ParquetReader, SerReader};

use crate::io::error::SbxcanError;
use crate::io::paths::ensure_file;

const MISSING_TOKENS: [&str; 7] = ["", "NA", "NaN", "nan", "NAN", ".", "None"];

/// Cells of one column. Missing values are `None`, never a NaN.
#[derive(Debug, Clone, PartialEq)]
pub enum Cells {
    Text(Vec<Option<String>>),
    Numeric(Vec<Option<f64>>),
}

impl Cells {
    fn len(&self) -> usize {
        match self {
            Cells::Text(x) => x.len(),
            Cells::Numeric(x) => x.len(),
        }
    }
}

/// A column-oriented table with named columns, as read from disk.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub header: Vec<String>,
    columns: Vec<Cells>,
    nrows: usize,
}

fn clean_token(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if MISSING_TOKENS.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

impl RawTable {
    pub fn new(header: Vec<String>, columns: Vec<Cells>) -> Self {
        let nrows = columns.first().map(|c| c.len()).unwrap_or(0);
        debug_assert!(columns.iter().all(|c| c.len() == nrows));
        RawTable {
            header,
            columns,
            nrows,
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.header.iter().any(|x| x == name)
    }

    fn column(&self, name: &str) -> Result<&Cells> {
        let idx = self
            .header
            .iter()
            .position(|x| x == name)
            .ok_or_else(|| SbxcanError::MissingColumn(name.to_string()))?;
        Ok(&self.columns[idx])
    }

    /// Column values as strings. Integral numbers are rendered without a
    /// decimal part, so a numeric chromosome column reads as "1", not "1.0".
    pub fn text(&self, name: &str) -> Result<Vec<Option<String>>> {
        Ok(match self.column(name)? {
            Cells::Text(values) => values.clone(),
            Cells::Numeric(values) => values.iter().map(|v| v.map(format_number)).collect(),
        })
    }

    pub fn numeric(&self, name: &str) -> Result<Vec<Option<f64>>> {
        match self.column(name)? {
            Cells::Numeric(values) => Ok(values.clone()),
            Cells::Text(values) => values
                .iter()
                .map(|v| match v {
                    None => Ok(None),
                    Some(s) => match s.parse::<f64>() {
                        Ok(x) if x.is_nan() => Ok(None),
                        Ok(x) => Ok(Some(x)),
                        Err(_) => Err(SbxcanError::UnparsableValue {
                            column: name.to_string(),
                            value: s.clone(),
                        }
                        .into()),
                    },
                })
                .collect(),
        }
    }
}

/// Read a table from a parquet file or a (possibly gzip/zstd compressed)
/// delimited text file.
pub fn read_table(path: impl AsRef<Path>) -> Result<RawTable> {
    let path = path.as_ref();
    ensure_file(path)?;

    let name = path
        .file_name()
        .and_then(|x| x.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let table = if name.ends_with(".parquet") {
        read_parquet(path)
    } else {
        read_decompressed(path, &name).and_then(|bytes| read_delimited(&bytes))
    };
    let table = table.with_context(|| format!("Error reading table: {}", path.display()))?;

    debug!(
        "Read {} rows and {} columns from {}",
        table.nrows(),
        table.header.len(),
        path.display()
    );
    Ok(table)
}

fn read_decompressed(path: &Path, name: &str) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut bytes = Vec::new();
    if name.ends_with(".gz") {
        MultiGzDecoder::new(file).read_to_end(&mut bytes)?;
    } else if name.ends_with(".zst") {
        bytes = zstd::stream::decode_all(file)?;
    } else {
        BufReader::with_capacity(8192, file).read_to_end(&mut bytes)?;
    }
    Ok(bytes)
}

/// Tab or comma when the header has one, whitespace runs when the header is
/// space separated, otherwise whatever the sniffer settles on.
fn detect_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    if first_line.contains(&b'\t') {
        return b'\t';
    }
    if first_line.contains(&b',') {
        return b',';
    }
    if first_line.trim_ascii().contains(&b' ') {
        return b' ';
    }
    csv_sniffer::Sniffer::new()
        .sniff_reader(Cursor::new(bytes))
        .map(|metadata| metadata.dialect.delimiter)
        .unwrap_or(b'\t')
}

fn collapse_whitespace(bytes: &[u8]) -> Vec<u8> {
    String::from_utf8_lossy(bytes)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join("\t"))
        .collect::<Vec<_>>()
        .join("\n")
        .into_bytes()
}

pub(crate) fn read_delimited(bytes: &[u8]) -> Result<RawTable> {
    let mut delimiter = detect_delimiter(bytes);
    let collapsed;
    let bytes = if delimiter == b' ' {
        delimiter = b'\t';
        collapsed = collapse_whitespace(bytes);
        collapsed.as_slice()
    } else {
        bytes
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let header: Vec<String> = reader.headers()?.iter().map(|x| x.to_string()).collect();
    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); header.len()];

    for result in reader.records() {
        let record = result?;
        for (column, value) in columns.iter_mut().zip(record.iter()) {
            column.push(clean_token(value));
        }
    }

    Ok(RawTable::new(
        header,
        columns.into_iter().map(Cells::Text).collect(),
    ))
}

fn read_parquet(path: &Path) -> Result<RawTable> {
    let file = File::open(path)?;
    let df = ParquetReader::new(file).finish()?;

    let mut header = Vec::with_capacity(df.width());
    let mut columns = Vec::with_capacity(df.width());
    for column in df.get_columns() {
        header.push(column.name().to_string());
        let series = column.as_materialized_series();
        let dtype = series.dtype();
        let cells = if dtype.is_float() || dtype.is_integer() {
            let cast = series.cast(&DataType::Float64)?;
            let values = cast.f64()?;
            Cells::Numeric(
                values
                    .into_iter()
                    .map(|v| v.filter(|x| !x.is_nan()))
                    .collect(),
            )
        } else {
            let cast = series.cast(&DataType::String)?;
            let values = cast.str()?;
            Cells::Text(values.into_iter().map(|v| v.and_then(clean_token)).collect())
        };
        columns.push(cells);
    }

    Ok(RawTable::new(header, columns))
}
