use super::{label_columns, load_geometry};
use crate::cli::IntegrateArgs;
use crate::config::PartialRunConfig;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use neqflux::{
    core::cubature::StandardCubature,
    engine::progress::ProgressReporter,
    workflows::{self, integrate::OUTPUT_EXTENSION},
};
use tracing::{info, warn};

pub fn run(args: IntegrateArgs) -> Result<()> {
    let partial_config = PartialRunConfig::load(args.run.config.as_deref())?;
    let mut geometry = load_geometry(&args.run)?;

    info!("Merging configuration from file and CLI arguments...");
    let (flux_config, integration) = partial_config.merge_integration(&args, &geometry)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
    let cubature = StandardCubature::new();

    println!("Integrating the flux over frequency...");
    info!("Invoking the core integration workflow...");
    let result = workflows::integrate::run(&mut geometry, &cubature, &flux_config, &integration, &reporter)?;

    let (computed, cached) = progress_handler.frequency_counts();
    if !result.converged {
        warn!("Integration did not reach the requested tolerance.");
        println!("Warning: the evaluation budget ran out before the requested tolerance was met.");
    }

    let layout = result.integral.layout();
    let labels = label_columns(&geometry);
    for (nt, tag) in flux_config.tags().iter().enumerate() {
        println!("\nTransform '{}':", tag);
        println!("{:>14}{}", "", labels.concat());
        for (rank, quantity) in flux_config.quantities.ranked() {
            let row: String = (0..layout.num_objects)
                .map(|nod| {
                    let total: f64 = (0..layout.num_objects)
                        .map(|nos| result.integral.get(nt, nos, nod, rank))
                        .sum();
                    format!("{:>14.6e}", total)
                })
                .collect();
            println!("{:>14}{}", quantity.to_string(), row);
        }
    }

    println!(
        "\n✓ {} flux evaluations ({} computed, {} read from existing records).",
        result.evaluations, computed, cached
    );
    println!(
        "  Integrated results appended to: {}",
        flux_config.output_path(OUTPUT_EXTENSION).display()
    );
    Ok(())
}
