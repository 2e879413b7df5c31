//! Flux evaluation at one frequency: the cache lookup, the transform and source sweeps, and
//! the output records.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use nalgebra::Point3;
use tracing::{debug, info, instrument};

use super::cache::{CacheMiss, read_cached_flux, write_flux_records};
use super::config::ConfigError;
use super::context::FluxContext;
use super::error::EngineError;
use super::pft::Excitation;
use super::pft::displacement::get_jdepft;
use super::pft::dsi::{DsiSurface, get_dsipft_trace};
use super::pft::overlap::get_opft;
use super::progress::Progress;
use crate::core::geometry::Geometry;
use crate::core::io::records::write_pft_record;
use crate::core::tensor::FluxTensor;
use crate::core::transform::GTComplex;

pub const FLUX_EXTENSION: &str = ".SIFlux";
pub const OPFT_EXTENSION: &str = ".SIFlux.OPFT";
pub const JDEPFT_EXTENSION: &str = ".SIFlux.JDEPFT";
pub const DSIPFT_EXTENSION: &str = ".SIFlux.DSIPFT";

/// Per-method PFT lines queued during one frequency evaluation.
#[derive(Debug, Default)]
struct PendingRecords {
    opft: Vec<u8>,
    jdepft: Vec<u8>,
    dsipft: Vec<u8>,
}

impl<G: Geometry> FluxContext<'_, G> {
    /// Flux tensor at `omega`, from the record file when allowed and possible, otherwise
    /// computed and appended to every output file.
    ///
    /// # Errors
    ///
    /// Returns an error for a non-positive frequency, a singular system, a failing
    /// collaborator, or output that cannot be written. Nothing is written for a frequency
    /// that fails.
    #[instrument(skip_all, name = "get_flux", fields(omega = omega))]
    pub fn get_flux(&mut self, omega: f64) -> Result<FluxTensor, EngineError> {
        if !(omega.is_finite() && omega > 0.0) {
            return Err(ConfigError::InvalidValue {
                parameter: "omega",
                message: format!("{} is not a positive frequency", omega),
            }
            .into());
        }

        let config = self.config;
        let tags = config.tags();
        let cache_path = config.output_path(FLUX_EXTENSION);
        if config.use_existing_data {
            match read_cached_flux(&cache_path, omega, &tags, self.layout()) {
                Ok(flux) => {
                    info!(omega, "Flux read from record file");
                    self.reporter.report(Progress::FrequencyDone { omega, cached: true });
                    return Ok(flux);
                }
                Err(CacheMiss::NoFile(path)) => debug!(%path, "No flux record file yet"),
                Err(miss) => info!(%miss, "Flux records unusable; recomputing"),
            }
        }

        info!(omega, transforms = tags.len(), "Computing flux");
        self.reporter.report(Progress::PhaseStart { name: "Flux evaluation" });
        self.reporter.report(Progress::TaskStart {
            total_steps: (config.transforms.len() * self.geometry.num_objects()) as u64,
        });

        self.blocks
            .assemble_frequency_blocks(&*self.geometry, omega, &config.temperatures)?;

        let mut flux = FluxTensor::zeros(self.layout());
        let mut pending = PendingRecords::default();
        self.sweep_transforms(omega, &mut flux, &mut pending)?;

        self.reporter.report(Progress::TaskFinish);

        let mut records = Vec::new();
        write_flux_records(&mut records, omega, &tags, &flux).map_err(|e| EngineError::io(&cache_path, e))?;
        for (extension, bytes) in [
            (OPFT_EXTENSION, &pending.opft),
            (JDEPFT_EXTENSION, &pending.jdepft),
            (DSIPFT_EXTENSION, &pending.dsipft),
            (FLUX_EXTENSION, &records),
        ] {
            append(&config.output_path(extension), bytes)?;
        }

        self.reporter.report(Progress::PhaseFinish);
        self.reporter.report(Progress::FrequencyDone { omega, cached: false });
        Ok(flux)
    }

    fn sweep_transforms(
        &mut self,
        omega: f64,
        flux: &mut FluxTensor,
        pending: &mut PendingRecords,
    ) -> Result<(), EngineError> {
        let config = self.config;
        for (nt, transform) in config.transforms.iter().enumerate() {
            debug!(tag = %transform.tag, "Applying transform");
            let result = match self.geometry.apply_transform(transform) {
                Ok(()) => self.evaluate_transform(nt, transform, omega, flux, pending),
                Err(e) => Err(e.into()),
            };
            self.geometry.revert_transform();
            result?;
        }
        Ok(())
    }

    /// Evaluates every source and destination with the geometry already in `transform`'s pose.
    fn evaluate_transform(
        &mut self,
        nt: usize,
        transform: &GTComplex,
        omega: f64,
        flux: &mut FluxTensor,
        pending: &mut PendingRecords,
    ) -> Result<(), EngineError> {
        let config = self.config;
        let num_objects = self.geometry.num_objects();
        self.blocks.assemble_transform_blocks(&*self.geometry, omega)?;

        let surfaces: Vec<DsiSurface> = (0..num_objects)
            .map(|d| {
                DsiSurface::for_destination(
                    &*self.geometry,
                    self.cubature,
                    &config.cubature,
                    d,
                    &config.torque_center,
                )
            })
            .collect::<Result<_, _>>()?;
        let centers: Vec<Point3<f64>> = surfaces.iter().map(|s| s.torque_center).collect();

        for nos in 0..num_objects {
            let rytov = self
                .workspace
                .build(&self.blocks, nos, omega, config.subtract_self_term)?;
            let geometry = &*self.geometry;

            let opft = get_opft(geometry, omega, Excitation::Rytov(rytov))?;
            let jdepft = get_jdepft(geometry, omega, Excitation::Rytov(rytov), None, &centers)?;

            for nod in 0..num_objects {
                let dsipft = get_dsipft_trace(geometry, omega, &surfaces[nod], rytov)?;

                let mut opft_values = opft.pft[nod].values().to_vec();
                opft_values.extend_from_slice(&opft.jxe_torque[nod]);
                let tag = transform.tag.as_str();
                let queue = |buffer: &mut Vec<u8>, values: &[f64]| {
                    write_pft_record(buffer, tag, omega, nos, nod, values)
                        .map_err(|e| EngineError::Internal(format!("formatting PFT record: {}", e)))
                };
                queue(&mut pending.opft, &opft_values)?;
                queue(&mut pending.jdepft, jdepft[nod].values())?;
                queue(&mut pending.dsipft, dsipft.values())?;

                let record = flux.record_mut(nt, nos, nod);
                for (rank, quantity) in config.quantities.ranked() {
                    record[rank] = dsipft[quantity];
                }
            }
            self.reporter.report(Progress::TaskIncrement);
        }
        Ok(())
    }
}

fn append(path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| EngineError::io(path, e))?;
    file.write_all(bytes).map_err(|e| EngineError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cubature::{CubatureSource, StandardCubature, sphere_rule};
    use crate::core::dipole::material::Material;
    use crate::core::dipole::{DipoleGeometry, DipoleObject};
    use crate::core::fields::{FieldSample, IncidentField};
    use crate::core::geometry::{CMatrix, GeometryError, IncidentKernels, OverlapBlocks, PftKernels, TorqueKernels};
    use crate::core::physics::TemperatureProfile;
    use crate::core::quantity::{Quantity, QuantitySet};
    use crate::core::transform::{GTComplex, translation};
    use crate::engine::config::{FluxConfig, FluxConfigBuilder};
    use crate::engine::context::BlockStore;
    use crate::engine::progress::ProgressReporter;
    use crate::engine::rytov::RytovWorkspace;
    use nalgebra::{Isometry3, Vector3};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn clusters() -> DipoleGeometry {
        let material = Material::Constant { epsilon: [4.0, 1.0] };
        DipoleGeometry::new(vec![
            DipoleObject::sphere("s1", material.clone(), 0.1, 0.1),
            DipoleObject::sphere("s2", material, 0.1, 0.1).at(translation(Vector3::new(1.0, 0.0, 0.0))),
        ])
        .unwrap()
    }

    fn hot_first() -> TemperatureProfile {
        TemperatureProfile {
            environment: 0.0,
            objects: vec![300.0, 0.0],
        }
    }

    /// Counts block assemblies and can be told to fail them.
    ///
    /// Transforms compose until reverted, and the x-position of the second object is logged
    /// at every system inverse assembly.
    struct CountingGeometry {
        inner: DipoleGeometry,
        assemblies: AtomicUsize,
        fail: bool,
        offsets: Vec<Isometry3<f64>>,
        system_positions: Mutex<Vec<f64>>,
    }

    impl CountingGeometry {
        fn new(inner: DipoleGeometry) -> Self {
            let offsets = vec![Isometry3::identity(); inner.num_objects()];
            Self {
                inner,
                assemblies: AtomicUsize::new(0),
                fail: false,
                offsets,
                system_positions: Mutex::new(Vec::new()),
            }
        }

        fn count(&self) -> Result<(), GeometryError> {
            self.assemblies.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GeometryError::InvalidObject {
                    label: "s1".to_string(),
                    message: "assembly disabled".to_string(),
                });
            }
            Ok(())
        }
    }

    impl Geometry for CountingGeometry {
        fn num_objects(&self) -> usize {
            self.inner.num_objects()
        }
        fn label(&self, object: usize) -> &str {
            self.inner.label(object)
        }
        fn num_basis_functions(&self, object: usize) -> usize {
            self.inner.num_basis_functions(object)
        }
        fn mate(&self, object: usize) -> Option<usize> {
            self.inner.mate(object)
        }
        fn apply_transform(&mut self, transform: &GTComplex) -> Result<(), GeometryError> {
            for m in &transform.moves {
                let index = self
                    .inner
                    .object_index(&m.label)
                    .ok_or_else(|| GeometryError::UnknownLabel(m.label.clone()))?;
                self.offsets[index] = m.motion * self.offsets[index];
            }
            let mut absolute = GTComplex::identity(transform.tag.clone());
            for (object, offset) in self.offsets.iter().enumerate() {
                absolute = absolute.with_move(self.inner.label(object), *offset);
            }
            self.inner.apply_transform(&absolute)
        }
        fn revert_transform(&mut self) {
            self.offsets.fill(Isometry3::identity());
            self.inner.revert_transform()
        }
        fn object_pose(&self, object: usize) -> Isometry3<f64> {
            self.inner.object_pose(object)
        }
        fn assemble_overlap_blocks(
            &self,
            object: usize,
            omega: f64,
            temperatures: &TemperatureProfile,
        ) -> Result<OverlapBlocks, GeometryError> {
            self.count()?;
            self.inner.assemble_overlap_blocks(object, omega, temperatures)
        }
        fn assemble_g_block(&self, a: usize, b: usize, omega: f64) -> Result<CMatrix, GeometryError> {
            self.count()?;
            self.inner.assemble_g_block(a, b, omega)
        }
        fn assemble_system_inverse(&self, omega: f64) -> Result<CMatrix, GeometryError> {
            self.count()?;
            self.system_positions
                .lock()
                .unwrap()
                .push(self.inner.object_pose(1).translation.vector.x);
            self.inner.assemble_system_inverse(omega)
        }
        fn basis_field(&self, object: usize, basis: usize, omega: f64, x: &Point3<f64>) -> FieldSample {
            self.inner.basis_field(object, basis, omega, x)
        }
        fn overlap_kernels(&self, object: usize, omega: f64) -> Result<PftKernels, GeometryError> {
            self.inner.overlap_kernels(object, omega)
        }
        fn jxe_torque_kernels(&self, object: usize, omega: f64) -> Result<TorqueKernels, GeometryError> {
            self.inner.jxe_torque_kernels(object, omega)
        }
        fn displacement_kernels(
            &self,
            object: usize,
            omega: f64,
            torque_center: &Point3<f64>,
        ) -> Result<PftKernels, GeometryError> {
            self.inner.displacement_kernels(object, omega, torque_center)
        }
        fn incident_kernels(
            &self,
            object: usize,
            omega: f64,
            incident: &dyn IncidentField,
            torque_center: &Point3<f64>,
        ) -> Result<IncidentKernels, GeometryError> {
            self.inner.incident_kernels(object, omega, incident, torque_center)
        }
    }

    fn config(base: &Path, use_existing_data: bool) -> FluxConfig {
        FluxConfigBuilder::new()
            .file_base(base.to_path_buf())
            .temperatures(hot_first())
            .quantities(QuantitySet::power_only())
            .cubature(CubatureSource::Sphere {
                radius: 0.4,
                num_points: 110,
            })
            .use_existing_data(use_existing_data)
            .build()
            .unwrap()
    }

    fn run(geometry: &mut CountingGeometry, config: &FluxConfig, omega: f64) -> Result<FluxTensor, EngineError> {
        let cubature = StandardCubature::new();
        let reporter = ProgressReporter::new();
        let mut context = FluxContext::new(geometry, &cubature, config, &reporter)?;
        context.get_flux(omega)
    }

    #[test]
    fn flux_run_writes_records_and_is_served_from_cache_afterwards() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("spheres");

        let mut first = CountingGeometry::new(clusters());
        let flux = run(&mut first, &config(&base, false), 0.1).unwrap();
        assert!(first.assemblies.load(Ordering::SeqCst) > 0);
        assert_eq!(flux.layout().len(), 4);
        assert!(flux.get(0, 0, 1, 0) > 0.0, "cold object absorbs");
        assert!(flux.get(0, 0, 0, 0) < 0.0, "hot object emits");

        let dsi = std::fs::read_to_string(config(&base, false).output_path(DSIPFT_EXTENSION)).unwrap();
        assert!(dsi.lines().next().unwrap().starts_with("default 1.000000e-01 11 "));
        assert_eq!(dsi.lines().count(), 4);
        let opft = std::fs::read_to_string(config(&base, false).output_path(OPFT_EXTENSION)).unwrap();
        assert_eq!(opft.lines().next().unwrap().split_whitespace().count(), 3 + 8 + 3);

        let mut second = CountingGeometry::new(clusters());
        let cached = run(&mut second, &config(&base, true), 0.1).unwrap();
        assert_eq!(cached, flux);
        assert_eq!(second.assemblies.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cache_miss_recomputes_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("run");
        let mut geometry = CountingGeometry::new(clusters());
        run(&mut geometry, &config(&base, true), 0.1).unwrap();
        run(&mut geometry, &config(&base, true), 0.2).unwrap();
        let records = std::fs::read_to_string(config(&base, true).output_path(FLUX_EXTENSION)).unwrap();
        assert_eq!(records.lines().count(), 8);
    }

    #[test]
    fn failed_frequency_writes_nothing_and_restores_pose() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("broken");
        let mut geometry = CountingGeometry::new(clusters());
        geometry.fail = true;
        let result = run(&mut geometry, &config(&base, false), 0.1);
        assert!(matches!(result, Err(EngineError::Geometry(_))));
        for extension in [FLUX_EXTENSION, OPFT_EXTENSION, JDEPFT_EXTENSION, DSIPFT_EXTENSION] {
            assert!(!config(&base, false).output_path(extension).exists());
        }
        assert_eq!(geometry.object_pose(1), clusters().object_pose(1));
    }

    #[test]
    fn every_transform_starts_from_the_reference_pose() {
        let dir = tempfile::tempdir().unwrap();
        let step = translation(Vector3::new(1.0, 0.0, 0.0));
        let config = FluxConfigBuilder::new()
            .file_base(dir.path().join("shifted"))
            .temperatures(hot_first())
            .quantities(QuantitySet::power_only())
            .cubature(CubatureSource::Sphere {
                radius: 0.4,
                num_points: 110,
            })
            .transforms(vec![
                GTComplex::identity("first").with_move("s2", step),
                GTComplex::identity("second").with_move("s2", step),
            ])
            .build()
            .unwrap();
        let mut geometry = CountingGeometry::new(clusters());
        let flux = run(&mut geometry, &config, 0.1).unwrap();

        assert_eq!(*geometry.system_positions.lock().unwrap(), vec![2.0, 2.0]);
        let (first, second) = (flux.get(0, 0, 1, 0), flux.get(1, 0, 1, 0));
        assert_close(first, second, first.abs(), 1e-10, "power into the shifted object");
        assert_eq!(geometry.object_pose(1), clusters().object_pose(1));
    }

    #[test]
    fn non_positive_frequency_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut geometry = CountingGeometry::new(clusters());
        let result = run(&mut geometry, &config(&dir.path().join("x"), false), 0.0);
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    /// Offset of the torque centre from each object's centre, across the line joining them.
    const TORQUE_ARM: f64 = 0.3;

    struct Evaluation {
        opft: Vec<crate::core::quantity::Pft>,
        jdepft: Vec<crate::core::quantity::Pft>,
        dsipft: Vec<crate::core::quantity::Pft>,
        total_outflow: f64,
    }

    fn evaluate_all_methods(omega: f64) -> Evaluation {
        let geometry = clusters();
        let mut store = BlockStore::new(2);
        store.assemble_frequency_blocks(&geometry, omega, &hot_first()).unwrap();
        store.assemble_transform_blocks(&geometry, omega).unwrap();
        let mut workspace = RytovWorkspace::new(geometry.total_basis_functions());
        let rytov = workspace.build(&store, 0, omega, false).unwrap().clone();

        let cubature = StandardCubature::new();
        let source = CubatureSource::Sphere {
            radius: 0.4,
            num_points: 600,
        };
        let surfaces: Vec<DsiSurface> = (0..2)
            .map(|d| DsiSurface::for_destination(&geometry, &cubature, &source, d, &Point3::new(0.0, TORQUE_ARM, 0.0)).unwrap())
            .collect();
        let centers: Vec<Point3<f64>> = surfaces.iter().map(|s| s.torque_center).collect();

        let opft = get_opft(&geometry, omega, Excitation::Rytov(&rytov)).unwrap().pft;
        let jdepft = get_jdepft(&geometry, omega, Excitation::Rytov(&rytov), None, &centers).unwrap();
        let dsipft = surfaces
            .iter()
            .map(|s| get_dsipft_trace(&geometry, omega, s, &rytov).unwrap())
            .collect();

        let enclosing = DsiSurface {
            rule: sphere_rule(Point3::new(0.5, 0.0, 0.0), 1.5, 800).unwrap(),
            torque_center: Point3::origin(),
        };
        let total = get_dsipft_trace(&geometry, omega, &enclosing, &rytov).unwrap();
        Evaluation {
            opft,
            jdepft,
            dsipft,
            total_outflow: -total[Quantity::AbsorbedPower],
        }
    }

    fn assert_close(a: f64, b: f64, scale: f64, tolerance: f64, what: &str) {
        assert!((a - b).abs() <= tolerance * scale, "{}: {} vs {} (scale {})", what, a, b, scale);
    }

    #[test]
    fn trace_methods_agree_on_every_destination() {
        let e = evaluate_all_methods(0.6);

        let absorbed = e.jdepft[1][Quantity::AbsorbedPower];
        assert!(absorbed > 0.0);
        assert_close(e.opft[1][Quantity::AbsorbedPower], absorbed, absorbed, 1e-8, "OPFT vs JDEPFT");

        for d in 0..2 {
            let lever = TORQUE_ARM * e.dsipft[d][Quantity::XForce];
            assert!(lever.abs() > 0.0);
            assert_close(e.dsipft[d][Quantity::ZTorque], lever, lever.abs(), 1e-3, "DSI torque lever");
            assert_close(e.jdepft[d][Quantity::ZTorque], lever, lever.abs(), 1e-3, "JDE torque lever");
        }

        let groups: [&[Quantity]; 3] = [&[Quantity::AbsorbedPower], &Quantity::FORCES, &Quantity::TORQUES];
        for group in groups {
            let scale = (0..2)
                .flat_map(|d| group.iter().map(move |q| (d, *q)))
                .map(|(d, q)| e.jdepft[d][q].abs().max(e.dsipft[d][q].abs()))
                .fold(0.0, f64::max);
            for d in 0..2 {
                for q in group {
                    assert_close(e.jdepft[d][*q], e.dsipft[d][*q], scale, 1e-4, &format!("{} on {}", q, d));
                }
            }
        }
    }

    #[test]
    fn flux_through_enclosing_sphere_is_the_sum_over_objects() {
        let e = evaluate_all_methods(0.6);
        let per_object: f64 = e.dsipft.iter().map(|p| -p[Quantity::AbsorbedPower]).sum();
        let scale = e.dsipft[0][Quantity::AbsorbedPower].abs();
        assert!(e.total_outflow > 0.0);
        assert_close(per_object, e.total_outflow, scale, 1e-6, "energy balance");
    }
}
