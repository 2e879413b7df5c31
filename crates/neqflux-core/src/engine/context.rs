use std::collections::HashSet;
use tracing::{debug, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::config::{ConfigError, FluxConfig};
use super::error::EngineError;
use super::progress::ProgressReporter;
use super::rytov::RytovWorkspace;
use crate::core::cubature::CubatureProvider;
use crate::core::geometry::{CMatrix, Geometry, GeometryError, OverlapBlocks};
use crate::core::physics::TemperatureProfile;
use crate::core::tensor::FluxIndex;

/// Matrix blocks for the current frequency and transform.
///
/// `V`, `Sigma` and the self-interaction blocks depend only on the frequency; the
/// off-diagonal interaction blocks and the system inverse are refreshed for each transform.
#[derive(Debug, Clone)]
pub struct BlockStore {
    num_objects: usize,
    omega: Option<f64>,
    v: Vec<CMatrix>,
    sigma: Vec<CMatrix>,
    self_g: Vec<CMatrix>,
    mutual_g: Vec<CMatrix>,
    system_inverse: CMatrix,
}

impl BlockStore {
    pub fn new(num_objects: usize) -> Self {
        Self {
            num_objects,
            omega: None,
            v: Vec::new(),
            sigma: Vec::new(),
            self_g: Vec::new(),
            mutual_g: Vec::new(),
            system_inverse: CMatrix::zeros(0, 0),
        }
    }

    pub fn num_objects(&self) -> usize {
        self.num_objects
    }

    /// Frequency of the transform-independent blocks currently held.
    pub fn omega(&self) -> Option<f64> {
        self.omega
    }

    #[instrument(skip_all, name = "frequency_blocks", fields(omega = omega))]
    pub fn assemble_frequency_blocks<G: Geometry + ?Sized>(
        &mut self,
        geometry: &G,
        omega: f64,
        temperatures: &TemperatureProfile,
    ) -> Result<(), EngineError> {
        let objects: Vec<usize> = (0..self.num_objects).collect();

        let assemble = |&o: &usize| -> Result<(OverlapBlocks, Option<CMatrix>), GeometryError> {
            let overlap = geometry.assemble_overlap_blocks(o, omega, temperatures)?;
            let self_block = match geometry.mate(o) {
                Some(_) => None,
                None => Some(geometry.assemble_g_block(o, o, omega)?),
            };
            Ok((overlap, self_block))
        };

        #[cfg(feature = "parallel")]
        let iterator = objects.par_iter();
        #[cfg(not(feature = "parallel"))]
        let iterator = objects.iter();

        let results: Vec<Result<_, GeometryError>> = iterator.map(assemble).collect();

        self.v.clear();
        self.sigma.clear();
        self.self_g.clear();
        for (o, result) in results.into_iter().enumerate() {
            let (overlap, self_block) = result?;
            let n = geometry.num_basis_functions(o);
            check_shape("V block", &overlap.v, n, n)?;
            check_shape("Sigma block", &overlap.sigma, n, n)?;
            let self_block = match (self_block, geometry.mate(o)) {
                (Some(block), _) => block,
                (None, Some(mate)) if mate < o => {
                    debug!(object = o, mate, "Reusing self-interaction block of identical object");
                    self.self_g[mate].clone()
                }
                (None, _) => {
                    return Err(EngineError::Internal(format!(
                        "object {} names a mate that is not an earlier object",
                        o
                    )));
                }
            };
            check_shape("self G block", &self_block, n, n)?;
            self.v.push(overlap.v);
            self.sigma.push(overlap.sigma);
            self.self_g.push(self_block);
        }
        self.omega = Some(omega);
        Ok(())
    }

    /// Assembles the off-diagonal interaction blocks and the system inverse for the current
    /// pose of `geometry`.
    #[instrument(skip_all, name = "transform_blocks")]
    pub fn assemble_transform_blocks<G: Geometry + ?Sized>(&mut self, geometry: &G, omega: f64) -> Result<(), EngineError> {
        let no = self.num_objects;
        let pairs: Vec<(usize, usize)> = (0..no)
            .flat_map(|a| ((a + 1)..no).map(move |b| (a, b)))
            .collect();

        #[cfg(feature = "parallel")]
        let iterator = pairs.par_iter();
        #[cfg(not(feature = "parallel"))]
        let iterator = pairs.iter();

        let results: Vec<Result<CMatrix, GeometryError>> = iterator
            .map(|&(a, b)| geometry.assemble_g_block(a, b, omega))
            .collect();

        self.mutual_g.clear();
        for (&(a, b), result) in pairs.iter().zip(results) {
            let block = result?;
            check_shape(
                "G block",
                &block,
                geometry.num_basis_functions(a),
                geometry.num_basis_functions(b),
            )?;
            self.mutual_g.push(block);
        }

        let inverse = geometry.assemble_system_inverse(omega)?;
        let nbf = geometry.total_basis_functions();
        check_shape("system inverse", &inverse, nbf, nbf)?;
        self.system_inverse = inverse;
        Ok(())
    }

    /// Interaction block between objects `a <= b`.
    pub fn g_block(&self, a: usize, b: usize) -> Option<&CMatrix> {
        if a == b {
            return self.self_g.get(a);
        }
        if a > b || b >= self.num_objects {
            return None;
        }
        // Pairs are stored row by row over the strict upper triangle.
        let index = a * (2 * self.num_objects - a - 1) / 2 + (b - a - 1);
        self.mutual_g.get(index)
    }

    pub fn v(&self, object: usize) -> Option<&CMatrix> {
        self.v.get(object)
    }

    pub fn sigma(&self, object: usize) -> Option<&CMatrix> {
        self.sigma.get(object)
    }

    pub fn system_inverse(&self) -> &CMatrix {
        &self.system_inverse
    }
}

fn check_shape(what: &'static str, block: &CMatrix, rows: usize, cols: usize) -> Result<(), EngineError> {
    if block.nrows() != rows {
        return Err(EngineError::DimensionMismatch {
            what,
            expected: rows,
            found: block.nrows(),
        });
    }
    if block.ncols() != cols {
        return Err(EngineError::DimensionMismatch {
            what,
            expected: cols,
            found: block.ncols(),
        });
    }
    Ok(())
}

/// State of one flux run: the geometry, its collaborators, and the reusable block store and
/// Rytov workspace.
pub struct FluxContext<'a, G: Geometry> {
    pub(crate) geometry: &'a mut G,
    pub(crate) cubature: &'a dyn CubatureProvider,
    pub(crate) config: &'a FluxConfig,
    pub(crate) reporter: &'a ProgressReporter<'a>,
    pub(crate) blocks: BlockStore,
    pub(crate) workspace: RytovWorkspace,
    layout: FluxIndex,
}

impl<'a, G: Geometry> FluxContext<'a, G> {
    pub fn new(
        geometry: &'a mut G,
        cubature: &'a dyn CubatureProvider,
        config: &'a FluxConfig,
        reporter: &'a ProgressReporter<'a>,
    ) -> Result<Self, EngineError> {
        let num_objects = geometry.num_objects();
        if num_objects == 0 {
            return Err(GeometryError::NoObjects.into());
        }
        if config.temperatures.objects.len() > num_objects {
            return Err(ConfigError::InvalidValue {
                parameter: "temperatures",
                message: format!(
                    "{} object temperatures given for {} objects",
                    config.temperatures.objects.len(),
                    num_objects
                ),
            }
            .into());
        }

        let labels: HashSet<&str> = (0..num_objects).map(|o| geometry.label(o)).collect();
        for transform in &config.transforms {
            if let Some(unknown) = transform.moves.iter().find(|m| !labels.contains(m.label.as_str())) {
                return Err(GeometryError::UnknownLabel(unknown.label.clone()).into());
            }
        }

        let layout = FluxIndex::new(config.transforms.len(), num_objects, config.quantities.len());
        let workspace = RytovWorkspace::new(geometry.total_basis_functions());
        Ok(Self {
            geometry,
            cubature,
            config,
            reporter,
            blocks: BlockStore::new(num_objects),
            workspace,
            layout,
        })
    }

    pub fn layout(&self) -> FluxIndex {
        self.layout
    }

    pub fn config(&self) -> &FluxConfig {
        self.config
    }

    pub fn geometry(&self) -> &G {
        self.geometry
    }
}
