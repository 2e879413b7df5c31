use crate::cli::{IntegrateArgs, RunArgs, SpectrumArgs};
use crate::error::{CliError, Result};
use crate::utils::parser;
use neqflux::core::cubature::{CubatureSource, DEFAULT_SPHERE_POINTS, DEFAULT_SPHERE_RADIUS};
use neqflux::core::geometry::Geometry;
use neqflux::core::io::frequencies::read_frequency_file;
use neqflux::core::physics::TemperatureProfile;
use neqflux::core::quantity::{Quantity, QuantitySet};
use neqflux::core::transform::load_transforms;
use neqflux::engine::config as core_config;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

const DEFAULT_ENVIRONMENT_TEMPERATURE: f64 = 0.0;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialTemperatureConfig {
    environment: Option<f64>,
    /// Object temperatures keyed by object label.
    objects: Option<BTreeMap<String, f64>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialCubatureConfig {
    sphere_radius: Option<f64>,
    sphere_points: Option<usize>,
    rule_file: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialIntegrationConfig {
    omega_min: Option<f64>,
    omega_max: Option<f64>,
    abs_tol: Option<f64>,
    rel_tol: Option<f64>,
    max_evals: Option<usize>,
    intervals: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialSpectrumConfig {
    frequencies: Option<Vec<f64>>,
    frequency_file: Option<PathBuf>,
}

/// A run configuration file: every key optional, command-line values win.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PartialRunConfig {
    file_base: Option<PathBuf>,
    transforms: Option<PathBuf>,
    quantities: Option<Vec<String>>,
    subtract_self_term: Option<bool>,
    use_existing_data: Option<bool>,
    torque_center: Option<[f64; 3]>,
    temperatures: Option<PartialTemperatureConfig>,
    cubature: Option<PartialCubatureConfig>,
    integration: Option<PartialIntegrationConfig>,
    spectrum: Option<PartialSpectrumConfig>,
}

impl PartialRunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::parsing(path, e))
    }

    /// The file at `path`, or an empty configuration when no file was given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::from_file)
    }

    pub fn merge_spectrum<G: Geometry>(
        mut self,
        args: &SpectrumArgs,
        geometry: &G,
    ) -> Result<(core_config::FluxConfig, Vec<f64>)> {
        let flux = self.merge_flux(&args.run, geometry)?;
        let spectrum = self.spectrum.take().unwrap_or_default();

        let frequencies = if !args.omega.is_empty() {
            args.omega.clone()
        } else if let Some(path) = args.omega_file.as_ref().or(spectrum.frequency_file.as_ref()) {
            read_frequency_file(path).map_err(|e| CliError::parsing(path, e))?
        } else if let Some(list) = spectrum.frequencies {
            list
        } else {
            return Err(CliError::Config(
                "A frequency list is required: use --omega, --omega-file or the [spectrum] section."
                    .to_string(),
            ));
        };
        if let Some(bad) = frequencies.iter().find(|w| !(w.is_finite() && **w > 0.0)) {
            return Err(CliError::Argument(format!("'{}' is not a positive frequency", bad)));
        }
        Ok((flux, frequencies))
    }

    pub fn merge_integration<G: Geometry>(
        mut self,
        args: &IntegrateArgs,
        geometry: &G,
    ) -> Result<(core_config::FluxConfig, core_config::IntegrationConfig)> {
        let flux = self.merge_flux(&args.run, geometry)?;
        let file = self.integration.take().unwrap_or_default();

        let mut builder = core_config::IntegrationConfigBuilder::new();
        if let Some(omega) = args.omega_min.or(file.omega_min) {
            builder = builder.omega_min(omega);
        }
        if let Some(omega) = args.omega_max.or(file.omega_max) {
            builder = builder.omega_max(omega);
        }
        if let Some(tol) = args.abs_tol.or(file.abs_tol) {
            builder = builder.abs_tol(tol);
        }
        if let Some(tol) = args.rel_tol.or(file.rel_tol) {
            builder = builder.rel_tol(tol);
        }
        if let Some(evals) = args.max_evals.or(file.max_evals) {
            builder = builder.max_evals(evals);
        }
        if let Some(intervals) = args.intervals.or(file.intervals) {
            builder = builder.intervals(intervals);
        }
        let integration = builder.build().map_err(|e| CliError::Config(e.to_string()))?;
        Ok((flux, integration))
    }

    fn merge_flux<G: Geometry>(&mut self, args: &RunArgs, geometry: &G) -> Result<core_config::FluxConfig> {
        self.apply_set_values(&args.set_values)?;

        let file_base = args
            .file_base
            .clone()
            .or_else(|| self.file_base.clone())
            .unwrap_or_else(|| args.geometry.with_extension(""));

        let mut builder = core_config::FluxConfigBuilder::new()
            .file_base(file_base)
            .quantities(Self::merge_quantities(&args.quantities, self.quantities.as_deref())?)
            .temperatures(Self::merge_temperatures(args, self.temperatures.take(), geometry)?)
            .cubature(Self::merge_cubature(args, self.cubature.take())?)
            .subtract_self_term(args.subtract_self_term || self.subtract_self_term.unwrap_or(false))
            .use_existing_data(args.use_existing_data || self.use_existing_data.unwrap_or(false));

        if let Some(center) = args.torque_center.or(self.torque_center) {
            builder = builder.torque_center(center.into());
        }
        if let Some(path) = args.transforms.as_ref().or(self.transforms.as_ref()) {
            debug!("Loading transforms from {:?}", path);
            let transforms = load_transforms(path).map_err(|e| CliError::parsing(path, e))?;
            builder = builder.transforms(transforms);
        }

        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    fn merge_quantities(cli_names: &[String], file_names: Option<&[String]>) -> Result<QuantitySet> {
        let names = if cli_names.is_empty() {
            file_names.unwrap_or_default()
        } else {
            cli_names
        };
        if names.is_empty() {
            return Ok(QuantitySet::power_only());
        }
        let mut set = QuantitySet::empty();
        for name in names {
            let quantity = Quantity::from_str(name).map_err(|e| CliError::Argument(e.to_string()))?;
            if !set.insert(quantity) {
                return Err(CliError::Argument(format!("'{}' cannot be selected for a flux run", name)));
            }
        }
        Ok(set)
    }

    fn merge_temperatures<G: Geometry>(
        args: &RunArgs,
        partial: Option<PartialTemperatureConfig>,
        geometry: &G,
    ) -> Result<TemperatureProfile> {
        let partial = partial.unwrap_or_default();
        let mut by_label = partial.objects.unwrap_or_default();
        by_label.extend(args.temperatures.iter().cloned());

        if by_label.is_empty() {
            return Err(CliError::Config(
                "At least one object temperature is required, via --temperature or [temperatures.objects]."
                    .to_string(),
            ));
        }
        if let Some(unknown) = by_label.keys().find(|label| geometry.object_index(label).is_none()) {
            return Err(CliError::Config(format!(
                "Temperature given for unknown object '{}'",
                unknown
            )));
        }

        let environment = args
            .environment_temperature
            .or(partial.environment)
            .unwrap_or(DEFAULT_ENVIRONMENT_TEMPERATURE);
        let objects = (0..geometry.num_objects())
            .map(|o| by_label.get(geometry.label(o)).copied().unwrap_or(environment))
            .collect();
        Ok(TemperatureProfile { environment, objects })
    }

    fn merge_cubature(args: &RunArgs, partial: Option<PartialCubatureConfig>) -> Result<CubatureSource> {
        if let Some(path) = &args.cubature_file {
            return Ok(CubatureSource::RuleFile(path.clone()));
        }
        let partial = partial.unwrap_or_default();
        let cli_sphere = args.sphere_radius.is_some() || args.sphere_points.is_some();
        let radius = args.sphere_radius.or(partial.sphere_radius);
        let points = args.sphere_points.or(partial.sphere_points);
        match partial.rule_file {
            Some(path) if radius.is_none() && points.is_none() => Ok(CubatureSource::RuleFile(path)),
            Some(_) if !cli_sphere => Err(CliError::Config(
                "`cubature.rule-file` cannot be combined with sphere settings.".to_string(),
            )),
            _ => Ok(CubatureSource::Sphere {
                radius: radius.unwrap_or(DEFAULT_SPHERE_RADIUS),
                num_points: points.unwrap_or(DEFAULT_SPHERE_POINTS),
            }),
        }
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let (key, value_str) =
                parser::parse_assignment(kv_pair).map_err(|e| CliError::Config(e.to_string()))?;

            match key {
                "file-base" => self.file_base = Some(PathBuf::from(value_str)),
                "transforms" => self.transforms = Some(PathBuf::from(value_str)),
                "subtract-self-term" => self.subtract_self_term = Some(parse_value(key, value_str)?),
                "use-existing-data" => self.use_existing_data = Some(parse_value(key, value_str)?),
                "temperatures.environment" => {
                    self.temperatures
                        .get_or_insert_with(Default::default)
                        .environment = Some(parse_value(key, value_str)?);
                }
                "cubature.sphere-radius" => {
                    self.cubature
                        .get_or_insert_with(Default::default)
                        .sphere_radius = Some(parse_value(key, value_str)?);
                }
                "cubature.sphere-points" => {
                    self.cubature
                        .get_or_insert_with(Default::default)
                        .sphere_points = Some(parse_value(key, value_str)?);
                }
                "integration.omega-min" => {
                    self.integration_mut().omega_min = Some(parse_value(key, value_str)?);
                }
                "integration.omega-max" => {
                    self.integration_mut().omega_max = Some(parse_value(key, value_str)?);
                }
                "integration.abs-tol" => {
                    self.integration_mut().abs_tol = Some(parse_value(key, value_str)?);
                }
                "integration.rel-tol" => {
                    self.integration_mut().rel_tol = Some(parse_value(key, value_str)?);
                }
                "integration.max-evals" => {
                    self.integration_mut().max_evals = Some(parse_value(key, value_str)?);
                }
                "integration.intervals" => {
                    self.integration_mut().intervals = Some(parse_value(key, value_str)?);
                }
                _ => {
                    if let Some(label) = key.strip_prefix("temperatures.objects.") {
                        let kelvin = parse_value(key, value_str)?;
                        self.temperatures
                            .get_or_insert_with(Default::default)
                            .objects
                            .get_or_insert_with(Default::default)
                            .insert(label.to_string(), kelvin);
                    } else {
                        return Err(CliError::Config(format!(
                            "Unsupported configuration key for --set: '{}'",
                            key
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn integration_mut(&mut self) -> &mut PartialIntegrationConfig {
        self.integration.get_or_insert_with(Default::default)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {}: {}", key, value)))
}
