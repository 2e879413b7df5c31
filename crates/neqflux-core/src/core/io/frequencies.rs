use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrequencyListError {
    #[error("I/O error reading frequency file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error in frequency file: {0}")]
    Csv(#[from] csv::Error),
    #[error("Invalid frequency '{value}' on row {row}")]
    Invalid { row: usize, value: String },
    #[error("Frequency file '{0}' lists no frequencies")]
    Empty(String),
}

/// Reads a frequency list: the first whitespace-separated column of every non-comment row.
///
/// Frequencies must be positive and finite.
pub fn read_frequency_file(path: &Path) -> Result<Vec<f64>, FrequencyListError> {
    let display = path.display().to_string();
    let file = File::open(path).map_err(|e| FrequencyListError::Io {
        path: display.clone(),
        source: e,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut frequencies = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let row = record.position().map_or(row + 1, |p| p.line() as usize);
        let Some(first) = record.iter().find(|f| !f.is_empty()) else {
            continue;
        };
        let omega = parse_frequency(first).ok_or_else(|| FrequencyListError::Invalid {
            row,
            value: first.to_string(),
        })?;
        frequencies.push(omega);
    }
    if frequencies.is_empty() {
        return Err(FrequencyListError::Empty(display));
    }
    Ok(frequencies)
}

pub fn parse_frequency(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}
