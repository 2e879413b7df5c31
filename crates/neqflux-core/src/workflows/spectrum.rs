use crate::core::cubature::CubatureProvider;
use crate::core::geometry::Geometry;
use crate::core::tensor::FluxTensor;
use crate::engine::config::{ConfigError, FluxConfig};
use crate::engine::context::FluxContext;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use tracing::{info, instrument};

/// The flux tensor at one frequency of a spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumPoint {
    pub omega: f64,
    pub flux: FluxTensor,
}

/// Evaluates the flux tensor at every frequency in `frequencies`, in order.
///
/// Frequencies already present in the record file are read back when
/// `config.use_existing_data` is set.
///
/// # Errors
///
/// Returns [`ConfigError::MissingParameter`] for an empty frequency list and the first
/// engine error raised at any frequency. Frequencies completed before the failure keep their
/// records on disk.
#[instrument(skip_all, name = "spectrum_workflow", fields(frequencies = frequencies.len()))]
pub fn run<G: Geometry>(
    geometry: &mut G,
    cubature: &dyn CubatureProvider,
    config: &FluxConfig,
    frequencies: &[f64],
    reporter: &ProgressReporter,
) -> Result<Vec<SpectrumPoint>, EngineError> {
    if frequencies.is_empty() {
        return Err(ConfigError::MissingParameter("frequencies").into());
    }

    let mut context = FluxContext::new(geometry, cubature, config, reporter)?;
    reporter.report(Progress::PhaseStart { name: "Spectrum" });

    let mut spectrum = Vec::with_capacity(frequencies.len());
    for &omega in frequencies {
        let flux = context.get_flux(omega)?;
        spectrum.push(SpectrumPoint { omega, flux });
    }

    reporter.report(Progress::PhaseFinish);
    info!("Spectrum complete: {} frequencies.", spectrum.len());
    Ok(spectrum)
}
