pub mod integrate;
pub mod spectrum;

use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use neqflux::core::dipole::DipoleGeometry;
use neqflux::core::geometry::Geometry;
use tracing::info;

fn load_geometry(args: &RunArgs) -> Result<DipoleGeometry> {
    info!("Loading geometry from {:?}", &args.geometry);
    let geometry = DipoleGeometry::load(&args.geometry).map_err(|e| CliError::parsing(&args.geometry, e))?;
    info!(
        objects = geometry.num_objects(),
        basis_functions = geometry.total_basis_functions(),
        "Geometry loaded."
    );
    Ok(geometry)
}

/// Object labels padded to a common column width.
fn label_columns<G: Geometry>(geometry: &G) -> Vec<String> {
    (0..geometry.num_objects())
        .map(|o| format!("{:>14}", geometry.label(o)))
        .collect()
}
