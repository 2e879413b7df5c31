use chrono::Local;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::records::{c_exp_signed, c_exp6, pair_label};
use crate::core::quantity::QuantitySet;
use crate::core::tensor::FluxTensor;

/// Host and local time recorded in output headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStamp {
    pub host: String,
    pub time: String,
}

impl RunStamp {
    pub fn now() -> Self {
        Self {
            host: host_name(),
            time: Local::now().format("%D::%T").to_string(),
        }
    }
}

fn host_name() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

/// Writes one block of frequency-integrated results.
///
/// # Arguments
///
/// * `writer` - Destination of the block.
/// * `stamp` - Host and time for the header line.
/// * `tags` - Transform tags, in flux-tensor order.
/// * `quantities` - The selected quantities; one (value, error) column pair each.
/// * `integrals` - Integrated flux tensor.
/// * `errors` - Error estimates with the same layout as `integrals`.
///
/// For every transform and destination the block lists one row per source object followed
/// by a `0j` row with the totals over sources.
///
/// # Errors
///
/// Returns any I/O error raised by `writer`.
pub fn write_integration_block<W: Write>(
    writer: &mut W,
    stamp: &RunStamp,
    tags: &[String],
    quantities: &QuantitySet,
    integrals: &FluxTensor,
    errors: &FluxTensor,
) -> io::Result<()> {
    writeln!(writer)?;
    writeln!(writer, "# neqflux run on {} ({})", stamp.host, stamp.time)?;
    writeln!(writer, "# data file columns: ")?;
    writeln!(writer, "# 1 transform tag")?;
    writeln!(writer, "# 2 (sourceObject, destObject) ")?;
    for (rank, quantity) in quantities.ranked() {
        let column = 3 + 2 * rank;
        writeln!(writer, "# ({},{}) {} (value,error)", column, column + 1, quantity)?;
    }

    let layout = integrals.layout();
    let nq = layout.num_quantities;
    for (nt, tag) in tags.iter().enumerate().take(layout.num_transforms) {
        for nod in 0..layout.num_objects {
            let mut total = vec![0.0; nq];
            let mut total_error = vec![0.0; nq];
            for nos in 0..layout.num_objects {
                write!(writer, "{} {} ", tag, pair_label(nos, nod))?;
                let values = integrals.record(nt, nos, nod);
                let errs = errors.record(nt, nos, nod);
                for q in 0..nq {
                    write!(
                        writer,
                        "{} {} ",
                        c_exp_signed(values[q], 16, 8),
                        c_exp_signed(errs[q], 16, 8)
                    )?;
                    total[q] += values[q];
                    total_error[q] += errs[q];
                }
                writeln!(writer)?;
            }
            write!(writer, "{} 0{} ", tag, nod + 1)?;
            for q in 0..nq {
                write!(writer, "{} {} ", c_exp6(total[q]), c_exp6(total_error[q]))?;
            }
            writeln!(writer)?;
        }
    }
    Ok(())
}

/// Appends a block of integrated results to `path`, creating the file if needed.
pub fn append_integration_block(
    path: &Path,
    stamp: &RunStamp,
    tags: &[String],
    quantities: &QuantitySet,
    integrals: &FluxTensor,
    errors: &FluxTensor,
) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    write_integration_block(&mut writer, stamp, tags, quantities, integrals, errors)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::quantity::Quantity;
    use crate::core::tensor::FluxIndex;

    fn stamp() -> RunStamp {
        RunStamp {
            host: "node1".to_string(),
            time: "01/02/26::03:04:05".to_string(),
        }
    }

    #[test]
    fn block_lists_each_source_and_destination_totals() {
        let quantities = QuantitySet::power_only().with(Quantity::ZForce);
        let layout = FluxIndex::new(1, 2, quantities.len());
        let integrals = FluxTensor::from_values(layout, vec![1.0, 0.1, 2.0, 0.2, 3.0, 0.3, 4.0, 0.4]).unwrap();
        let errors = FluxTensor::zeros(layout);
        let mut out = Vec::new();
        write_integration_block(&mut out, &stamp(), &["t0".to_string()], &quantities, &integrals, &errors).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "");
        assert_eq!(lines[1], "# neqflux run on node1 (01/02/26::03:04:05)");
        assert_eq!(lines[5], "# (3,4) power (value,error)");
        assert_eq!(lines[6], "# (5,6) z-force (value,error)");
        assert!(lines[7].starts_with("t0 11  +1.00000000e+00  +0.00000000e+00"));
        assert!(lines[8].starts_with("t0 21  +3.00000000e+00"));
        assert_eq!(
            lines[9],
            "t0 01 4.000000e+00 0.000000e+00 4.000000e-01 0.000000e+00 "
        );
        assert!(lines[10].starts_with("t0 12 "));
        assert_eq!(lines.len(), 13);
    }

    #[test]
    fn run_stamp_names_this_host() {
        let stamp = RunStamp::now();
        assert_eq!(stamp.host, gethostname::gethostname().to_string_lossy());
        assert_eq!(stamp.time.matches("::").count(), 1);
    }

    #[test]
    fn append_accumulates_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.out");
        let layout = FluxIndex::new(1, 1, 1);
        let tensor = FluxTensor::zeros(layout);
        for _ in 0..2 {
            append_integration_block(&path, &stamp(), &["a".to_string()], &QuantitySet::power_only(), &tensor, &tensor).unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("# neqflux run on").count(), 2);
    }
}
