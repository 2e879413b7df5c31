use crate::core::cubature::CubatureProvider;
use crate::core::geometry::Geometry;
use crate::core::io::output::{RunStamp, append_integration_block};
use crate::core::tensor::FluxTensor;
use crate::engine::config::{FluxConfig, IntegrationConfig};
use crate::engine::context::FluxContext;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::quadrature;
use tracing::{info, instrument, warn};

pub const OUTPUT_EXTENSION: &str = ".out";

#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationResult {
    pub integral: FluxTensor,
    pub error: FluxTensor,
    pub evaluations: usize,
    pub converged: bool,
}

/// Integrates the flux tensor over frequency and appends the result block to `<base>.out`.
///
/// Every integrand evaluation goes through the flux engine, so cached frequencies are read
/// back instead of recomputed.
///
/// # Errors
///
/// Returns the first engine error raised by an integrand evaluation, or an I/O error if the
/// result block cannot be written.
#[instrument(skip_all, name = "integration_workflow", fields(omega_min = integration.omega_min))]
pub fn run<G: Geometry>(
    geometry: &mut G,
    cubature: &dyn CubatureProvider,
    flux_config: &FluxConfig,
    integration: &IntegrationConfig,
    reporter: &ProgressReporter,
) -> Result<IntegrationResult, EngineError> {
    let mut context = FluxContext::new(geometry, cubature, flux_config, reporter)?;
    let layout = context.layout();

    reporter.report(Progress::PhaseStart {
        name: "Frequency integration",
    });
    info!(omega_max = ?integration.omega_max(), "Starting frequency integration.");

    let result = quadrature::integrate(
        |omega| context.get_flux(omega).map(FluxTensor::into_values),
        integration,
    )?;
    if !result.converged {
        warn!(
            evaluations = result.evaluations,
            "Integration stopped before reaching the requested tolerance."
        );
    }

    let into_tensor = |values: Vec<f64>| {
        let found = values.len();
        FluxTensor::from_values(layout, values).ok_or(EngineError::DimensionMismatch {
            what: "integrated flux",
            expected: layout.len(),
            found,
        })
    };
    let integral = into_tensor(result.integral)?;
    let error = into_tensor(result.error)?;

    let path = flux_config.output_path(OUTPUT_EXTENSION);
    append_integration_block(
        &path,
        &RunStamp::now(),
        &flux_config.tags(),
        &flux_config.quantities,
        &integral,
        &error,
    )
    .map_err(|e| EngineError::io(&path, e))?;

    reporter.report(Progress::PhaseFinish);
    info!(
        evaluations = result.evaluations,
        path = %path.display(),
        "Integration complete."
    );
    Ok(IntegrationResult {
        integral,
        error,
        evaluations: result.evaluations,
        converged: result.converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cubature::{CubatureSource, StandardCubature};
    use crate::core::dipole::material::Material;
    use crate::core::dipole::{DipoleGeometry, DipoleObject};
    use crate::core::physics::TemperatureProfile;
    use crate::core::transform::translation;
    use crate::engine::config::{FluxConfigBuilder, IntegrationConfigBuilder};
    use crate::engine::flux::FLUX_EXTENSION;
    use crate::engine::quadrature::OMEGA_FLOOR;
    use crate::workflows::spectrum;
    use nalgebra::{Point3, Vector3};
    use std::path::Path;

    fn dimer() -> DipoleGeometry {
        let material = Material::Constant { epsilon: [3.0, 1.5] };
        DipoleGeometry::new(vec![
            DipoleObject::new("A", material.clone(), vec![Point3::origin()], 0.01),
            DipoleObject::new("B", material, vec![Point3::origin()], 0.01)
                .at(translation(Vector3::new(0.0, 0.0, 1.5))),
        ])
        .unwrap()
    }

    fn flux_config(base: &Path) -> FluxConfig {
        FluxConfigBuilder::new()
            .file_base(base.to_path_buf())
            .temperatures(TemperatureProfile::uniform(1, 300.0, 0.0))
            .cubature(CubatureSource::Sphere {
                radius: 0.5,
                num_points: 110,
            })
            .use_existing_data(true)
            .build()
            .unwrap()
    }

    #[test]
    fn simpson_integration_matches_hand_rule_over_spectrum() {
        let dir = tempfile::tempdir().unwrap();
        let config = flux_config(&dir.path().join("dimer"));
        let integration = IntegrationConfigBuilder::new()
            .omega_min(0.1)
            .omega_max(0.5)
            .intervals(1)
            .build()
            .unwrap();
        let cubature = StandardCubature::new();
        let reporter = ProgressReporter::new();

        let mut geometry = dimer();
        let result = run(&mut geometry, &cubature, &config, &integration, &reporter).unwrap();
        assert_eq!(result.evaluations, 3);
        assert!(result.converged);

        let points = spectrum::run(&mut geometry, &cubature, &config, &[0.1, 0.3, 0.5], &reporter).unwrap();
        for i in 0..result.integral.values().len() {
            let f: Vec<f64> = points.iter().map(|p| p.flux.values()[i]).collect();
            let simpson = (f[0] + 4.0 * f[1] + f[2]) * 0.4 / 6.0;
            let trapezoid = (f[0] + 2.0 * f[1] + f[2]) * 0.4 / 4.0;
            assert!((result.integral.values()[i] - simpson).abs() <= 1e-12 * simpson.abs().max(1e-30));
            assert!((result.error.values()[i] - (simpson - trapezoid).abs()).abs() <= 1e-12 * simpson.abs().max(1e-30));
        }

        let records = std::fs::read_to_string(config.output_path(FLUX_EXTENSION)).unwrap();
        assert_eq!(records.lines().count(), 3 * 4, "spectrum reused every cached frequency");

        let out = std::fs::read_to_string(config.output_path(OUTPUT_EXTENSION)).unwrap();
        assert!(out.contains("# (3,4) power (value,error)"));
        assert!(out.lines().any(|l| l.starts_with("default 01 ")));
        assert!(out.lines().any(|l| l.starts_with("default 21 ")));
    }

    #[test]
    fn hot_object_loses_and_cold_object_gains_energy() {
        let dir = tempfile::tempdir().unwrap();
        let config = flux_config(&dir.path().join("dimer"));
        let integration = IntegrationConfigBuilder::new()
            .omega_min(0.05)
            .omega_max(1.0)
            .rel_tol(1e-1)
            .build()
            .unwrap();
        let result = run(
            &mut dimer(),
            &StandardCubature::new(),
            &config,
            &integration,
            &ProgressReporter::new(),
        )
        .unwrap();
        assert!(result.evaluations >= 15);
        assert!(result.integral.get(0, 0, 0, 0) < 0.0);
        assert!(result.integral.get(0, 0, 1, 0) > 0.0);
        assert!(result.integral.get(0, 1, 0, 0).abs() < 1e-300);
    }

    #[test]
    fn range_below_the_frequency_floor_is_a_single_floor_evaluation() {
        let dir = tempfile::tempdir().unwrap();
        let config = flux_config(&dir.path().join("low"));
        let integration = IntegrationConfigBuilder::new().omega_max(0.005).intervals(2).build().unwrap();
        let mut geometry = dimer();
        let cubature = StandardCubature::new();
        let reporter = ProgressReporter::new();
        let result = run(&mut geometry, &cubature, &config, &integration, &reporter).unwrap();
        assert_eq!(result.evaluations, 1);

        let floor = spectrum::run(&mut geometry, &cubature, &config, &[OMEGA_FLOOR], &reporter).unwrap();
        let absorbed = floor[0].flux.get(0, 0, 1, 0);
        assert!(absorbed > 0.0);
        assert!((result.integral.get(0, 0, 1, 0) - 0.005 * absorbed).abs() <= 1e-12 * absorbed);
        assert!(result.error.values().iter().all(|e| *e == 0.0));
    }
}
