use nalgebra::Complex;
use tracing::{instrument, trace};

use super::context::BlockStore;
use super::error::EngineError;
use crate::core::geometry::CMatrix;

/// Scratch matrices for the Rytov builder, sized once per run.
///
/// The matrix returned by [`RytovWorkspace::build`] lives in this workspace and is valid
/// until the next build.
#[derive(Debug, Clone)]
pub struct RytovWorkspace {
    offsets: Vec<usize>,
    m1: CMatrix,
    m2: CMatrix,
    m3: CMatrix,
}

impl RytovWorkspace {
    pub fn new(num_basis_functions: usize) -> Self {
        Self {
            offsets: Vec::new(),
            m1: CMatrix::zeros(num_basis_functions, num_basis_functions),
            m2: CMatrix::zeros(num_basis_functions, num_basis_functions),
            m3: CMatrix::zeros(num_basis_functions, num_basis_functions),
        }
    }

    pub fn dimension(&self) -> usize {
        self.m3.nrows()
    }

    /// Builds the correlation matrix `R = W N W^H` of the currents induced by the
    /// fluctuations of object `source`, with `W = (1 + S^-1 V S^-1 G)^-1` and
    /// `N = S^-1 Sigma_source S^-1`. With `subtract_self_term`, `N` is subtracted from the
    /// result.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SingularMatrix`] when `W^-1` cannot be inverted, and
    /// [`EngineError::Internal`] if the block store is missing a block.
    #[instrument(level = "debug", skip_all, name = "rytov", fields(source = source, omega = omega))]
    pub fn build(
        &mut self,
        blocks: &BlockStore,
        source: usize,
        omega: f64,
        subtract_self_term: bool,
    ) -> Result<&CMatrix, EngineError> {
        let zero = Complex::new(0.0, 0.0);
        let one = Complex::new(1.0, 0.0);
        self.offsets = self.block_offsets(blocks)?;
        let sinv = blocks.system_inverse();
        if sinv.nrows() != self.dimension() {
            return Err(EngineError::DimensionMismatch {
                what: "system inverse",
                expected: self.dimension(),
                found: sinv.nrows(),
            });
        }

        // M1 = G
        self.m1.fill(zero);
        let no = blocks.num_objects();
        for a in 0..no {
            for b in a..no {
                let block = blocks
                    .g_block(a, b)
                    .ok_or_else(|| missing("G", a))?;
                let (ra, rb) = (self.offsets[a], self.offsets[b]);
                self.m1.view_mut((ra, rb), block.shape()).copy_from(block);
                if b > a {
                    self.m1.view_mut((rb, ra), (block.ncols(), block.nrows())).tr_copy_from(block);
                }
            }
        }

        // M2 = S^-1 G, M3 = V, M1 = V S^-1 G
        self.m2.gemm(one, sinv, &self.m1, zero);
        self.m3.fill(zero);
        for o in 0..no {
            let v = blocks.v(o).ok_or_else(|| missing("V", o))?;
            self.m3.view_mut((self.offsets[o], self.offsets[o]), v.shape()).copy_from(v);
        }
        self.m1.gemm(one, &self.m3, &self.m2, zero);

        // M3 = 1 + S^-1 V S^-1 G = W^-1, then W
        self.m3.gemm(one, sinv, &self.m1, zero);
        for i in 0..self.dimension() {
            self.m3[(i, i)] += one;
        }
        let lu = self.m3.clone().lu();
        if !lu.try_inverse_to(&mut self.m3) || !is_finite(&self.m3) {
            return Err(EngineError::SingularMatrix { omega, object: source });
        }
        trace!("Inverted W^-1");

        // M1 = N, M2 = W N, M1 = W^H, M3 = W N W^H
        self.load_source_correlation(blocks, source)?;
        self.m2.gemm(one, &self.m3, &self.m1, zero);
        self.m3.adjoint_to(&mut self.m1);
        self.m3.gemm(one, &self.m2, &self.m1, zero);

        if subtract_self_term {
            self.load_source_correlation(blocks, source)?;
            self.m3 -= &self.m1;
        }
        Ok(&self.m3)
    }

    /// Leaves `N = S^-1 Sigma_source S^-1` in `M1`, using `M2` as scratch.
    fn load_source_correlation(&mut self, blocks: &BlockStore, source: usize) -> Result<(), EngineError> {
        let zero = Complex::new(0.0, 0.0);
        let one = Complex::new(1.0, 0.0);
        let sigma = blocks.sigma(source).ok_or_else(|| missing("Sigma", source))?;
        let offset = self.offsets[source];
        self.m1.fill(zero);
        self.m1.view_mut((offset, offset), sigma.shape()).copy_from(sigma);
        let sinv = blocks.system_inverse();
        self.m2.gemm(one, sinv, &self.m1, zero);
        self.m1.gemm(one, &self.m2, sinv, zero);
        Ok(())
    }

    fn block_offsets(&self, blocks: &BlockStore) -> Result<Vec<usize>, EngineError> {
        let mut offsets = Vec::with_capacity(blocks.num_objects());
        let mut total = 0;
        for o in 0..blocks.num_objects() {
            offsets.push(total);
            total += blocks.v(o).ok_or_else(|| missing("V", o))?.nrows();
        }
        if total != self.dimension() {
            return Err(EngineError::DimensionMismatch {
                what: "Rytov workspace",
                expected: self.dimension(),
                found: total,
            });
        }
        Ok(offsets)
    }
}

fn missing(kind: &str, object: usize) -> EngineError {
    EngineError::Internal(format!("{} block of object {} has not been assembled", kind, object))
}

fn is_finite(m: &CMatrix) -> bool {
    m.iter().all(|z| z.re.is_finite() && z.im.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dipole::material::Material;
    use crate::core::dipole::{DipoleGeometry, DipoleObject};
    use crate::core::geometry::Geometry;
    use crate::core::physics::TemperatureProfile;
    use crate::core::transform::translation;
    use nalgebra::{Point3, Vector3};

    const TOLERANCE: f64 = 1e-9;

    fn geometry() -> DipoleGeometry {
        let material = Material::Constant { epsilon: [5.0, 2.0] };
        DipoleGeometry::new(vec![
            DipoleObject::sphere("hot", material.clone(), 0.3, 0.15),
            DipoleObject::sphere("cold", material, 0.3, 0.15)
                .at(translation(Vector3::new(1.0, 0.0, 0.0))),
        ])
        .unwrap()
    }

    fn blocks(geometry: &DipoleGeometry, omega: f64) -> BlockStore {
        let mut store = BlockStore::new(2);
        let temperatures = TemperatureProfile {
            environment: 0.0,
            objects: vec![300.0, 0.0],
        };
        store.assemble_frequency_blocks(geometry, omega, &temperatures).unwrap();
        store.assemble_transform_blocks(geometry, omega).unwrap();
        store
    }

    fn reference(geometry: &DipoleGeometry, store: &BlockStore, source: usize, omega: f64) -> (CMatrix, CMatrix) {
        let n = geometry.total_basis_functions();
        let mut g = CMatrix::zeros(n, n);
        let mut v = CMatrix::zeros(n, n);
        let mut sigma = CMatrix::zeros(n, n);
        for a in 0..2 {
            let oa = geometry.basis_offset(a);
            for b in 0..2 {
                let ob = geometry.basis_offset(b);
                let block = geometry.assemble_g_block(a, b, omega).unwrap();
                g.view_mut((oa, ob), block.shape()).copy_from(&block);
            }
            let vb = store.v(a).unwrap();
            v.view_mut((oa, oa), vb.shape()).copy_from(vb);
        }
        let os = geometry.basis_offset(source);
        let sb = store.sigma(source).unwrap();
        sigma.view_mut((os, os), sb.shape()).copy_from(sb);
        let sinv = store.system_inverse();
        let w_inv = CMatrix::identity(n, n) + sinv * &v * sinv * &g;
        let w = w_inv.try_inverse().unwrap();
        let nm = sinv * sigma * sinv;
        (&w * &nm * w.adjoint(), nm)
    }

    fn max_difference(a: &CMatrix, b: &CMatrix) -> f64 {
        (a - b).iter().map(|z| z.norm()).fold(0.0, f64::max)
    }

    #[test]
    fn rytov_matrix_matches_dense_formula() {
        let geometry = geometry();
        let omega = 0.8;
        let store = blocks(&geometry, omega);
        let (expected, _) = reference(&geometry, &store, 0, omega);
        let mut workspace = RytovWorkspace::new(geometry.total_basis_functions());
        let rytov = workspace.build(&store, 0, omega, false).unwrap();
        let scale = expected.iter().map(|z| z.norm()).fold(0.0, f64::max);
        assert!(scale > 0.0);
        assert!(max_difference(rytov, &expected) < TOLERANCE * scale);
    }

    #[test]
    fn rytov_matrix_is_hermitian() {
        let geometry = geometry();
        let store = blocks(&geometry, 0.5);
        let mut workspace = RytovWorkspace::new(geometry.total_basis_functions());
        let rytov = workspace.build(&store, 0, 0.5, false).unwrap().clone();
        let scale = rytov.iter().map(|z| z.norm()).fold(0.0, f64::max);
        assert!(max_difference(&rytov, &rytov.adjoint()) < TOLERANCE * scale);
    }

    #[test]
    fn self_term_subtraction_removes_source_correlation() {
        let geometry = geometry();
        let omega = 0.5;
        let store = blocks(&geometry, omega);
        let (full, n) = reference(&geometry, &store, 0, omega);
        let mut workspace = RytovWorkspace::new(geometry.total_basis_functions());
        let subtracted = workspace.build(&store, 0, omega, true).unwrap().clone();
        let scale = full.iter().map(|z| z.norm()).fold(0.0, f64::max);
        assert!(max_difference(&subtracted, &(&full - &n)) < TOLERANCE * scale);

        // N is positive semi-definite, so the correction lowers the trace.
        assert!(n.diagonal().iter().all(|z| z.re >= 0.0 && z.im.abs() < TOLERANCE * scale));
        assert!(subtracted.trace().re < full.trace().re);
    }

    #[test]
    fn cold_source_yields_zero_correlation() {
        let geometry = geometry();
        let store = blocks(&geometry, 0.5);
        let mut workspace = RytovWorkspace::new(geometry.total_basis_functions());
        let rytov = workspace.build(&store, 1, 0.5, false).unwrap();
        assert!(rytov.iter().all(|z| z.norm() == 0.0));
    }

    #[test]
    fn workspace_of_wrong_size_is_rejected() {
        let geometry = geometry();
        let store = blocks(&geometry, 0.5);
        let mut workspace = RytovWorkspace::new(3);
        assert!(matches!(
            workspace.build(&store, 0, 0.5, false),
            Err(EngineError::DimensionMismatch { .. })
        ));
    }

    /// One basis function with `W^-1 = 1 + V G = 0`.
    struct Resonant;

    impl Geometry for Resonant {
        fn num_objects(&self) -> usize {
            1
        }
        fn label(&self, _object: usize) -> &str {
            "r"
        }
        fn num_basis_functions(&self, _object: usize) -> usize {
            1
        }
        fn apply_transform(&mut self, _transform: &crate::core::transform::GTComplex) -> Result<(), crate::core::geometry::GeometryError> {
            Ok(())
        }
        fn revert_transform(&mut self) {}
        fn object_pose(&self, _object: usize) -> nalgebra::Isometry3<f64> {
            nalgebra::Isometry3::identity()
        }
        fn assemble_overlap_blocks(
            &self,
            _object: usize,
            _omega: f64,
            _temperatures: &TemperatureProfile,
        ) -> Result<crate::core::geometry::OverlapBlocks, crate::core::geometry::GeometryError> {
            Ok(crate::core::geometry::OverlapBlocks {
                v: CMatrix::from_element(1, 1, Complex::new(-1.0, 0.0)),
                sigma: CMatrix::from_element(1, 1, Complex::new(1.0, 0.0)),
            })
        }
        fn assemble_g_block(&self, _a: usize, _b: usize, _omega: f64) -> Result<CMatrix, crate::core::geometry::GeometryError> {
            Ok(CMatrix::from_element(1, 1, Complex::new(1.0, 0.0)))
        }
        fn assemble_system_inverse(&self, _omega: f64) -> Result<CMatrix, crate::core::geometry::GeometryError> {
            Ok(CMatrix::identity(1, 1))
        }
        fn basis_field(&self, _object: usize, _basis: usize, _omega: f64, _x: &Point3<f64>) -> crate::core::fields::FieldSample {
            crate::core::fields::FieldSample::zero()
        }
    }

    #[test]
    fn singular_system_is_reported() {
        let mut store = BlockStore::new(1);
        store
            .assemble_frequency_blocks(&Resonant, 0.3, &TemperatureProfile::uniform(1, 300.0, 0.0))
            .unwrap();
        store.assemble_transform_blocks(&Resonant, 0.3).unwrap();
        let mut workspace = RytovWorkspace::new(1);
        assert!(matches!(
            workspace.build(&store, 0, 0.3, false),
            Err(EngineError::SingularMatrix { object: 0, .. })
        ));
    }
}
