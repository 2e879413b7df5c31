use std::io::{self, Write};

/// Formats `value` like C's `%.{precision}e`: mantissa, `e`, sign and at least two
/// exponent digits.
pub fn c_exp(value: f64, precision: usize) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let formatted = format!("{:.*e}", precision, value);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exponent.abs())
        }
        None => formatted,
    }
}

/// C's `%e`.
pub fn c_exp6(value: f64) -> String {
    c_exp(value, 6)
}

/// C's `%+{width}.{precision}e`: explicit sign, right aligned.
pub fn c_exp_signed(value: f64, width: usize, precision: usize) -> String {
    let body = c_exp(value, precision);
    let signed = if body.starts_with('-') || value.is_nan() {
        body
    } else {
        format!("+{}", body)
    };
    format!("{:>width$}", signed, width = width)
}

/// Shortest representation that parses back to exactly `value`.
pub fn round_trip(value: f64) -> String {
    format!("{:e}", value)
}

/// The `ij` pair label: one-based source and destination indices run together.
pub fn pair_label(source: usize, destination: usize) -> String {
    format!("{}{}", source + 1, destination + 1)
}

/// Writes one per-frequency PFT record: `tag omega ij v1 v2 ...`, each value followed by a
/// single space.
pub fn write_pft_record<W: Write>(
    writer: &mut W,
    tag: &str,
    omega: f64,
    source: usize,
    destination: usize,
    values: &[f64],
) -> io::Result<()> {
    write!(writer, "{} {} {} ", tag, c_exp6(omega), pair_label(source, destination))?;
    for v in values {
        write!(writer, "{} ", c_exp6(*v))?;
    }
    writeln!(writer)
}

/// Writes one flux cache record: `omega tag ij q1 q2 ...`.
pub fn write_flux_record<W: Write>(
    writer: &mut W,
    omega: f64,
    tag: &str,
    source: usize,
    destination: usize,
    values: &[f64],
) -> io::Result<()> {
    write!(writer, "{} {} {}", round_trip(omega), tag, pair_label(source, destination))?;
    for v in values {
        write!(writer, " {}", round_trip(*v))?;
    }
    writeln!(writer)
}
