use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid assignment '{0}'. Expected 'KEY=VALUE'.")]
    InvalidAssignment(String),

    #[error("Invalid temperature '{value}' for '{label}'. Expected a non-negative number of Kelvin.")]
    InvalidTemperature { label: String, value: String },

    #[error("Invalid point '{0}'. Expected three comma-separated numbers (e.g., '0,0,1.5').")]
    InvalidPoint(String),

    #[error("Component '{component}' cannot be empty in '{text}'.")]
    EmptyComponent {
        component: &'static str,
        text: String,
    },
}

/// Splits `KEY=VALUE` at the first `=`.
pub fn parse_assignment(text: &str) -> Result<(&str, &str), ParseError> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| ParseError::InvalidAssignment(text.to_string()))?;
    let (key, value) = (key.trim(), value.trim());
    if key.is_empty() {
        return Err(ParseError::EmptyComponent {
            component: "key",
            text: text.to_string(),
        });
    }
    if value.is_empty() {
        return Err(ParseError::EmptyComponent {
            component: "value",
            text: text.to_string(),
        });
    }
    Ok((key, value))
}

/// Parses `LABEL=KELVIN`.
pub fn parse_temperature(text: &str) -> Result<(String, f64), ParseError> {
    let (label, value) = parse_assignment(text)?;
    let kelvin = value
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite() && *t >= 0.0)
        .ok_or_else(|| ParseError::InvalidTemperature {
            label: label.to_string(),
            value: value.to_string(),
        })?;
    Ok((label.to_string(), kelvin))
}

/// Parses `x,y,z`.
pub fn parse_point(text: &str) -> Result<[f64; 3], ParseError> {
    let values: Vec<f64> = text
        .split(',')
        .map(|c| c.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| ParseError::InvalidPoint(text.to_string()))?;
    <[f64; 3]>::try_from(values).map_err(|_| ParseError::InvalidPoint(text.to_string()))
}
