//! The `.SIFlux` record file: a checkpoint of every completed flux evaluation.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use thiserror::Error;

use crate::core::io::records::write_flux_record;
use crate::core::tensor::{FluxIndex, FluxTensor};

/// Relative tolerance when matching a record's frequency.
pub const FREQUENCY_TOLERANCE: f64 = 1e-6;

/// Why cached flux data could not be used. Always recoverable: the caller recomputes.
#[derive(Debug, Error)]
pub enum CacheMiss {
    #[error("cache file '{0}' does not exist")]
    NoFile(String),
    #[error("I/O error reading cache: {0}")]
    Io(#[from] io::Error),
    #[error("no record for tag '{tag}' at omega={omega:e}")]
    FirstRecordNotFound { tag: String, omega: f64 },
    #[error("line {line}: file ends before all records were read")]
    UnexpectedEof { line: usize },
    #[error("line {line}: expected tag '{expected}', found '{found}'")]
    WrongTag {
        line: usize,
        expected: String,
        found: String,
    },
    #[error("line {line}: expected omega={expected:e}, found {found:e}")]
    WrongFrequency { line: usize, expected: f64, found: f64 },
    #[error("line {line}: expected {expected} values, found {found}")]
    TooFewQuantities {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: cannot parse '{token}'")]
    Malformed { line: usize, token: String },
}

fn same_frequency(found: f64, omega: f64) -> bool {
    (found - omega).abs() <= FREQUENCY_TOLERANCE * omega.abs()
}

/// Reads the flux tensor for `omega` from the record file at `path`.
///
/// The first record is located by scanning for a line whose tag is `tags[0]` and whose
/// frequency matches `omega`; the remaining records must follow it directly in canonical
/// `(transform, source, destination)` order. Nothing is returned unless every record is
/// present and well formed.
pub fn read_cached_flux(path: &Path, omega: f64, tags: &[String], layout: FluxIndex) -> Result<FluxTensor, CacheMiss> {
    if !path.exists() {
        return Err(CacheMiss::NoFile(path.display().to_string()));
    }
    let reader = BufReader::new(File::open(path)?);
    read_flux_records(reader, omega, tags, layout)
}

pub fn read_flux_records<R: BufRead>(
    reader: R,
    omega: f64,
    tags: &[String],
    layout: FluxIndex,
) -> Result<FluxTensor, CacheMiss> {
    let nq = layout.num_quantities;
    let first_tag = tags.first().map(String::as_str).unwrap_or_default();
    let mut lines = reader.lines().enumerate().map(|(i, l)| (i + 1, l));

    let mut current = None;
    for (line_number, line) in lines.by_ref() {
        let line = line?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 4 || tokens[1] != first_tag {
            continue;
        }
        if tokens[0].parse::<f64>().is_ok_and(|f| same_frequency(f, omega)) {
            current = Some((line_number, line));
            break;
        }
    }
    let Some(mut current) = current else {
        return Err(CacheMiss::FirstRecordNotFound {
            tag: first_tag.to_string(),
            omega,
        });
    };

    let mut values = vec![0.0; layout.len()];
    let mut last_line = current.0;
    for (n, (nt, nos, nod)) in layout.records().enumerate() {
        if n > 0 {
            let (line_number, line) = lines
                .next()
                .ok_or(CacheMiss::UnexpectedEof { line: last_line + 1 })?;
            current = (line_number, line?);
        }
        let (line_number, line) = &current;
        last_line = *line_number;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 + nq {
            return Err(CacheMiss::TooFewQuantities {
                line: *line_number,
                expected: nq,
                found: tokens.len().saturating_sub(3),
            });
        }
        let expected_tag = tags.get(nt).map(String::as_str).unwrap_or_default();
        if tokens[1] != expected_tag {
            return Err(CacheMiss::WrongTag {
                line: *line_number,
                expected: expected_tag.to_string(),
                found: tokens[1].to_string(),
            });
        }
        let found: f64 = parse(tokens[0], *line_number)?;
        if !same_frequency(found, omega) {
            return Err(CacheMiss::WrongFrequency {
                line: *line_number,
                expected: omega,
                found,
            });
        }
        let start = layout.index(nt, nos, nod, 0);
        for (slot, token) in values[start..start + nq].iter_mut().zip(&tokens[3..3 + nq]) {
            *slot = parse(token, *line_number)?;
        }
    }

    FluxTensor::from_values(layout, values).ok_or(CacheMiss::Malformed {
        line: last_line,
        token: String::new(),
    })
}

fn parse(token: &str, line: usize) -> Result<f64, CacheMiss> {
    token.parse().map_err(|_| CacheMiss::Malformed {
        line,
        token: token.to_string(),
    })
}

/// Writes one record per `(transform, source, destination)` in canonical order.
pub fn write_flux_records<W: Write>(writer: &mut W, omega: f64, tags: &[String], flux: &FluxTensor) -> io::Result<()> {
    for (nt, nos, nod) in flux.layout().records() {
        let tag = tags.get(nt).map(String::as_str).unwrap_or_default();
        write_flux_record(writer, omega, tag, nos, nod, flux.record(nt, nos, nod))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn tags() -> Vec<String> {
        vec!["t0".to_string(), "t1".to_string()]
    }

    fn tensor() -> FluxTensor {
        let layout = FluxIndex::new(2, 2, 2);
        let values = (0..layout.len()).map(|i| (i as f64 + 0.5) / 3.0 * 1e-7).collect();
        FluxTensor::from_values(layout, values).unwrap()
    }

    fn written(omega: f64) -> String {
        let mut out = Vec::new();
        write_flux_records(&mut out, omega, &tags(), &tensor()).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn write_then_read_reproduces_flux_exactly() {
        let mut text = written(0.2);
        text.push_str(&written(0.1 / 3.0));
        let flux = read_flux_records(Cursor::new(text.clone()), 0.1 / 3.0, &tags(), tensor().layout()).unwrap();
        assert_eq!(flux, tensor());
        let flux = read_flux_records(Cursor::new(text), 0.2 * (1.0 + 1e-8), &tags(), tensor().layout()).unwrap();
        assert_eq!(flux, tensor());
    }

    #[test]
    fn missing_frequency_is_reported() {
        let miss = read_flux_records(Cursor::new(written(0.2)), 0.3, &tags(), tensor().layout()).unwrap_err();
        assert!(matches!(miss, CacheMiss::FirstRecordNotFound { .. }));
    }

    #[test]
    fn truncated_file_is_reported() {
        let text: String = written(0.2).lines().take(5).map(|l| format!("{}\n", l)).collect();
        let miss = read_flux_records(Cursor::new(text), 0.2, &tags(), tensor().layout()).unwrap_err();
        assert!(matches!(miss, CacheMiss::UnexpectedEof { line: 6 }));
    }

    #[test]
    fn wrong_tag_is_reported() {
        let text = written(0.2).replacen(" t1 ", " tx ", 1);
        let miss = read_flux_records(Cursor::new(text), 0.2, &tags(), tensor().layout()).unwrap_err();
        assert!(matches!(miss, CacheMiss::WrongTag { line: 5, .. }));
    }

    #[test]
    fn wrong_frequency_is_reported() {
        let mut lines: Vec<String> = written(0.2).lines().map(String::from).collect();
        lines[2] = lines[2].replacen("2e-1", "3e-1", 1);
        let text = lines.join("\n");
        let miss = read_flux_records(Cursor::new(text), 0.2, &tags(), tensor().layout()).unwrap_err();
        assert!(matches!(miss, CacheMiss::WrongFrequency { line: 3, .. }));
    }

    #[test]
    fn short_records_are_reported_including_the_first() {
        let text = "2e-1 t0 11 1.0\n";
        let miss = read_flux_records(Cursor::new(text), 0.2, &tags(), tensor().layout()).unwrap_err();
        assert!(matches!(miss, CacheMiss::TooFewQuantities { line: 1, expected: 2, found: 1 }));
    }

    #[test]
    fn unparsable_values_are_reported() {
        let text = written(0.2).replacen(" 11 ", " 11 x", 1);
        let miss = read_flux_records(Cursor::new(text), 0.2, &tags(), tensor().layout()).unwrap_err();
        assert!(matches!(miss, CacheMiss::Malformed { line: 1, .. }));
    }

    #[test]
    fn absent_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let miss = read_cached_flux(&dir.path().join("none.SIFlux"), 0.2, &tags(), tensor().layout()).unwrap_err();
        assert!(matches!(miss, CacheMiss::NoFile(_)));
    }
}
