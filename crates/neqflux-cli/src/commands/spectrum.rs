use super::{label_columns, load_geometry};
use crate::cli::SpectrumArgs;
use crate::config::PartialRunConfig;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use neqflux::{
    core::cubature::StandardCubature,
    engine::{flux::DSIPFT_EXTENSION, progress::ProgressReporter},
    workflows,
};
use tracing::info;

pub fn run(args: SpectrumArgs) -> Result<()> {
    let partial_config = PartialRunConfig::load(args.run.config.as_deref())?;
    let mut geometry = load_geometry(&args.run)?;

    info!("Merging configuration from file and CLI arguments...");
    let (flux_config, frequencies) = partial_config.merge_spectrum(&args, &geometry)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
    let cubature = StandardCubature::new();

    println!("Evaluating the flux at {} frequencies...", frequencies.len());
    info!("Invoking the core spectrum workflow...");
    let spectrum = workflows::spectrum::run(&mut geometry, &cubature, &flux_config, &frequencies, &reporter)?;

    let (computed, cached) = progress_handler.frequency_counts();
    info!(computed, cached, "Spectrum workflow finished.");

    let tags = flux_config.tags();
    let first_quantity = flux_config.quantities.iter().next();
    if let Some(quantity) = first_quantity {
        println!(
            "\nTotal {} per destination (transform '{}'):",
            quantity, tags[0]
        );
        println!("{:>14}{}", "omega", label_columns(&geometry).concat());
        for point in &spectrum {
            let layout = point.flux.layout();
            let row: String = (0..layout.num_objects)
                .map(|nod| {
                    let total: f64 = (0..layout.num_objects).map(|nos| point.flux.get(0, nos, nod, 0)).sum();
                    format!("{:>14.6e}", total)
                })
                .collect();
            println!("{:>14.6e}{}", point.omega, row);
        }
    }

    println!(
        "\n✓ {} frequencies computed, {} read from existing records.",
        computed, cached
    );
    println!(
        "  Per-frequency records: {}",
        flux_config.output_path(DSIPFT_EXTENSION).display()
    );
    Ok(())
}
