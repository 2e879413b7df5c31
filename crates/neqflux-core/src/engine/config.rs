use nalgebra::Point3;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::cubature::CubatureSource;
use crate::core::physics::TemperatureProfile;
use crate::core::quantity::QuantitySet;
use crate::core::transform::{GTComplex, default_transforms};

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for {parameter}: {message}")]
    InvalidValue {
        parameter: &'static str,
        message: String,
    },
}

impl ConfigError {
    fn invalid(parameter: &'static str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            parameter,
            message: message.into(),
        }
    }
}

/// Everything the flux engine needs besides the geometry and the frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxConfig {
    /// Output files are `<file_base>.SIFlux`, `<file_base>.SIFlux.OPFT`, and so on.
    pub file_base: PathBuf,
    pub quantities: QuantitySet,
    pub transforms: Vec<GTComplex>,
    pub temperatures: TemperatureProfile,
    pub cubature: CubatureSource,
    /// Torque centre in each destination's body frame.
    pub torque_center: Point3<f64>,
    pub subtract_self_term: bool,
    pub use_existing_data: bool,
}

impl FluxConfig {
    pub fn tags(&self) -> Vec<String> {
        self.transforms.iter().map(|t| t.tag.clone()).collect()
    }

    pub fn output_path(&self, extension: &str) -> PathBuf {
        let mut name = self.file_base.clone().into_os_string();
        name.push(extension);
        PathBuf::from(name)
    }
}

#[derive(Default)]
pub struct FluxConfigBuilder {
    file_base: Option<PathBuf>,
    quantities: Option<QuantitySet>,
    transforms: Option<Vec<GTComplex>>,
    temperatures: Option<TemperatureProfile>,
    cubature: Option<CubatureSource>,
    torque_center: Option<Point3<f64>>,
    subtract_self_term: bool,
    use_existing_data: bool,
}

impl FluxConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_base(mut self, base: PathBuf) -> Self {
        self.file_base = Some(base);
        self
    }
    pub fn quantities(mut self, quantities: QuantitySet) -> Self {
        self.quantities = Some(quantities);
        self
    }
    pub fn transforms(mut self, transforms: Vec<GTComplex>) -> Self {
        self.transforms = Some(transforms);
        self
    }
    pub fn temperatures(mut self, temperatures: TemperatureProfile) -> Self {
        self.temperatures = Some(temperatures);
        self
    }
    pub fn cubature(mut self, source: CubatureSource) -> Self {
        self.cubature = Some(source);
        self
    }
    pub fn torque_center(mut self, center: Point3<f64>) -> Self {
        self.torque_center = Some(center);
        self
    }
    pub fn subtract_self_term(mut self, enabled: bool) -> Self {
        self.subtract_self_term = enabled;
        self
    }
    pub fn use_existing_data(mut self, enabled: bool) -> Self {
        self.use_existing_data = enabled;
        self
    }

    pub fn build(self) -> Result<FluxConfig, ConfigError> {
        let file_base = self
            .file_base
            .ok_or(ConfigError::MissingParameter("file_base"))?;
        let temperatures = self
            .temperatures
            .ok_or(ConfigError::MissingParameter("temperatures"))?;
        let quantities = self.quantities.unwrap_or_else(QuantitySet::power_only);
        let transforms = self.transforms.unwrap_or_else(default_transforms);

        if file_base.as_os_str().is_empty() {
            return Err(ConfigError::invalid("file_base", "must not be empty"));
        }
        if quantities.is_empty() {
            return Err(ConfigError::invalid("quantities", "at least one quantity must be selected"));
        }
        validate_transforms(&transforms)?;
        validate_temperatures(&temperatures)?;
        let cubature = self.cubature.unwrap_or_default();
        if let CubatureSource::Sphere { radius, num_points } = cubature {
            if !(radius > 0.0) || num_points == 0 {
                return Err(ConfigError::invalid(
                    "cubature",
                    format!("sphere needs a positive radius and point count, got {} and {}", radius, num_points),
                ));
            }
        }

        Ok(FluxConfig {
            file_base,
            quantities,
            transforms,
            temperatures,
            cubature,
            torque_center: self.torque_center.unwrap_or_else(Point3::origin),
            subtract_self_term: self.subtract_self_term,
            use_existing_data: self.use_existing_data,
        })
    }
}

fn validate_transforms(transforms: &[GTComplex]) -> Result<(), ConfigError> {
    if transforms.is_empty() {
        return Err(ConfigError::invalid("transforms", "at least one transform is required"));
    }
    let mut seen = HashSet::new();
    for transform in transforms {
        if transform.tag.is_empty() || transform.tag.chars().any(char::is_whitespace) {
            return Err(ConfigError::invalid(
                "transforms",
                format!("tag '{}' must be a single non-empty word", transform.tag),
            ));
        }
        if !seen.insert(transform.tag.as_str()) {
            return Err(ConfigError::invalid(
                "transforms",
                format!("duplicate tag '{}'", transform.tag),
            ));
        }
    }
    Ok(())
}

fn validate_temperatures(temperatures: &TemperatureProfile) -> Result<(), ConfigError> {
    let valid = |t: f64| t.is_finite() && t >= 0.0;
    if !valid(temperatures.environment) || !temperatures.objects.iter().copied().all(valid) {
        return Err(ConfigError::invalid(
            "temperatures",
            "temperatures must be finite and non-negative",
        ));
    }
    Ok(())
}

/// How the frequency integral is evaluated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntegrationStrategy {
    /// h-adaptive Gauss-Kronrod with per-component error control.
    /// With `omega_max` absent the integral runs to infinity.
    Adaptive {
        omega_max: Option<f64>,
        abs_tol: f64,
        rel_tol: f64,
        max_evals: usize,
    },
    /// Fixed composite Simpson rule with a trapezoid error estimate.
    TrapSimp { omega_max: f64, intervals: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationConfig {
    pub omega_min: f64,
    pub strategy: IntegrationStrategy,
}

impl IntegrationConfig {
    pub fn omega_max(&self) -> Option<f64> {
        match self.strategy {
            IntegrationStrategy::Adaptive { omega_max, .. } => omega_max,
            IntegrationStrategy::TrapSimp { omega_max, .. } => Some(omega_max),
        }
    }
}

pub const DEFAULT_ABS_TOL: f64 = 0.0;
pub const DEFAULT_REL_TOL: f64 = 1.0e-2;
pub const DEFAULT_MAX_EVALS: usize = 1000;
pub const DEFAULT_INTERVALS: usize = 20;

#[derive(Default)]
pub struct IntegrationConfigBuilder {
    omega_min: Option<f64>,
    omega_max: Option<f64>,
    abs_tol: Option<f64>,
    rel_tol: Option<f64>,
    max_evals: Option<usize>,
    intervals: Option<usize>,
    simpson: bool,
}

impl IntegrationConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn omega_min(mut self, omega: f64) -> Self {
        self.omega_min = Some(omega);
        self
    }
    pub fn omega_max(mut self, omega: f64) -> Self {
        self.omega_max = Some(omega);
        self
    }
    pub fn abs_tol(mut self, tol: f64) -> Self {
        self.abs_tol = Some(tol);
        self
    }
    pub fn rel_tol(mut self, tol: f64) -> Self {
        self.rel_tol = Some(tol);
        self
    }
    pub fn max_evals(mut self, evals: usize) -> Self {
        self.max_evals = Some(evals);
        self
    }
    /// Selects the Simpson/trapezoid strategy with the given number of intervals.
    pub fn intervals(mut self, intervals: usize) -> Self {
        self.intervals = Some(intervals);
        self.simpson = true;
        self
    }
    pub fn simpson(mut self, enabled: bool) -> Self {
        self.simpson = enabled;
        self
    }

    pub fn build(self) -> Result<IntegrationConfig, ConfigError> {
        let omega_min = self.omega_min.unwrap_or(0.0);
        if !omega_min.is_finite() || omega_min < 0.0 {
            return Err(ConfigError::invalid("omega_min", format!("{} is not a non-negative number", omega_min)));
        }
        if let Some(omega_max) = self.omega_max {
            if !omega_max.is_finite() || omega_max <= omega_min {
                return Err(ConfigError::invalid(
                    "omega_max",
                    format!("{} must be finite and greater than omega_min={}", omega_max, omega_min),
                ));
            }
        }

        let strategy = if self.simpson {
            let intervals = self.intervals.unwrap_or(DEFAULT_INTERVALS);
            if intervals == 0 {
                return Err(ConfigError::invalid("intervals", "must be at least 1"));
            }
            let omega_max = self.omega_max.ok_or(ConfigError::MissingParameter("omega_max"))?;
            IntegrationStrategy::TrapSimp { omega_max, intervals }
        } else {
            let abs_tol = self.abs_tol.unwrap_or(DEFAULT_ABS_TOL);
            let rel_tol = self.rel_tol.unwrap_or(DEFAULT_REL_TOL);
            if abs_tol < 0.0 || rel_tol < 0.0 || (abs_tol == 0.0 && rel_tol == 0.0) {
                return Err(ConfigError::invalid(
                    "tolerance",
                    format!("abs_tol={} rel_tol={}: need non-negative values, not both zero", abs_tol, rel_tol),
                ));
            }
            let max_evals = self.max_evals.unwrap_or(DEFAULT_MAX_EVALS);
            if max_evals < 15 {
                return Err(ConfigError::invalid("max_evals", "must allow at least one 15-point rule"));
            }
            IntegrationStrategy::Adaptive {
                omega_max: self.omega_max,
                abs_tol,
                rel_tol,
                max_evals,
            }
        };

        Ok(IntegrationConfig { omega_min, strategy })
    }
}
