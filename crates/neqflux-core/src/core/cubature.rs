use nalgebra::{Isometry3, Point3, Vector3};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CubatureError {
    #[error("Cubature rule is empty")]
    EmptyRule,
    #[error("Invalid sphere cubature: radius {radius}, {num_points} points")]
    InvalidSphere { radius: f64, num_points: usize },
    #[error("I/O error reading cubature file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed cubature file '{path}' at row {row}: {message}")]
    Malformed {
        path: String,
        row: usize,
        message: String,
    },
    #[error("CSV error in cubature file: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubaturePoint {
    pub x: Point3<f64>,
    pub n: Vector3<f64>,
    pub w: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CubatureRule {
    pub points: Vec<CubaturePoint>,
}

impl CubatureRule {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sum of the weights, i.e. the area of the surface the rule covers.
    pub fn area(&self) -> f64 {
        self.points.iter().map(|p| p.w).sum()
    }
}

pub const DEFAULT_SPHERE_RADIUS: f64 = 5.0;
pub const DEFAULT_SPHERE_POINTS: usize = 110;

/// Where a displaced surface comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum CubatureSource {
    /// A sphere of the given radius centred on the destination object.
    Sphere { radius: f64, num_points: usize },
    /// A rule file of `x y z nx ny nz w` rows in the destination's body frame.
    RuleFile(PathBuf),
}

impl Default for CubatureSource {
    fn default() -> Self {
        CubatureSource::Sphere {
            radius: DEFAULT_SPHERE_RADIUS,
            num_points: DEFAULT_SPHERE_POINTS,
        }
    }
}

pub trait CubatureProvider: Sync {
    /// Returns the rule for `source` mapped into world coordinates by `pose`.
    fn rule(&self, source: &CubatureSource, pose: &Isometry3<f64>) -> Result<CubatureRule, CubatureError>;
}

/// Product Gauss-Legendre (polar) x trapezoid (azimuthal) spheres and file-based rules.
///
/// Rule files are parsed once and kept for the lifetime of the provider.
#[derive(Debug, Default)]
pub struct StandardCubature {
    file_rules: Mutex<HashMap<PathBuf, Arc<Vec<CubaturePoint>>>>,
}

impl StandardCubature {
    pub fn new() -> Self {
        Self::default()
    }

    fn body_frame_rule(&self, path: &Path) -> Result<Arc<Vec<CubaturePoint>>, CubatureError> {
        if let Ok(cache) = self.file_rules.lock() {
            if let Some(points) = cache.get(path) {
                return Ok(Arc::clone(points));
            }
        }
        let points = Arc::new(read_rule_file(path)?);
        if let Ok(mut cache) = self.file_rules.lock() {
            cache.insert(path.to_path_buf(), Arc::clone(&points));
        }
        Ok(points)
    }
}

impl CubatureProvider for StandardCubature {
    fn rule(&self, source: &CubatureSource, pose: &Isometry3<f64>) -> Result<CubatureRule, CubatureError> {
        let rule = match source {
            CubatureSource::Sphere { radius, num_points } => {
                sphere_rule(Point3::from(pose.translation.vector), *radius, *num_points)?
            }
            CubatureSource::RuleFile(path) => {
                let points = self.body_frame_rule(path)?;
                CubatureRule {
                    points: points
                        .iter()
                        .map(|p| CubaturePoint {
                            x: pose.transform_point(&p.x),
                            n: pose.transform_vector(&p.n),
                            w: p.w,
                        })
                        .collect(),
                }
            }
        };
        if rule.is_empty() {
            return Err(CubatureError::EmptyRule);
        }
        Ok(rule)
    }
}

/// Nodes and weights of the `n`-point Gauss-Legendre rule on `[-1, 1]`, ascending.
pub fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut nodes = vec![0.0; n];
    let mut weights = vec![0.0; n];
    let m = n.div_ceil(2);
    for i in 0..m {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        for _ in 0..100 {
            let (p, d) = legendre_with_derivative(n, x);
            let dx = p / d;
            x -= dx;
            if dx.abs() < 1e-15 {
                break;
            }
        }
        let (_, dp) = legendre_with_derivative(n, x);
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        nodes[i] = -x;
        nodes[n - 1 - i] = x;
        weights[i] = w;
        weights[n - 1 - i] = w;
    }
    (nodes, weights)
}

fn legendre_with_derivative(n: usize, x: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = x;
    if n == 0 {
        return (1.0, 0.0);
    }
    for k in 2..=n {
        let kf = k as f64;
        let p2 = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
        p0 = p1;
        p1 = p2;
    }
    let d = n as f64 * (x * p1 - p0) / (x * x - 1.0);
    (p1, d)
}

/// A sphere rule with at least `num_points` points.
pub fn sphere_rule(center: Point3<f64>, radius: f64, num_points: usize) -> Result<CubatureRule, CubatureError> {
    if !(radius > 0.0) || num_points == 0 {
        return Err(CubatureError::InvalidSphere { radius, num_points });
    }
    let n_theta = ((num_points as f64 / 2.0).sqrt().ceil() as usize).max(2);
    let n_phi = 2 * n_theta;
    let (nodes, weights) = gauss_legendre(n_theta);
    let d_phi = 2.0 * PI / n_phi as f64;

    let mut points = Vec::with_capacity(n_theta * n_phi);
    for (cos_theta, w_theta) in nodes.iter().zip(&weights) {
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        for j in 0..n_phi {
            let phi = j as f64 * d_phi;
            let n = Vector3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), *cos_theta);
            points.push(CubaturePoint {
                x: center + n * radius,
                n,
                w: radius * radius * w_theta * d_phi,
            });
        }
    }
    debug!(n_theta, n_phi, radius, "Built sphere cubature rule");
    Ok(CubatureRule { points })
}

fn read_rule_file(path: &Path) -> Result<Vec<CubaturePoint>, CubatureError> {
    let display = path.display().to_string();
    let file = File::open(path).map_err(|e| CubatureError::Io {
        path: display.clone(),
        source: e,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut points = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let row = record.position().map_or(row + 1, |p| p.line() as usize);
        let fields: Vec<&str> = record.iter().filter(|f| !f.is_empty()).collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < 7 {
            return Err(CubatureError::Malformed {
                path: display.clone(),
                row,
                message: format!("expected 7 columns, found {}", fields.len()),
            });
        }
        let mut v = [0.0; 7];
        for (slot, field) in v.iter_mut().zip(&fields) {
            *slot = field.parse().map_err(|_| CubatureError::Malformed {
                path: display.clone(),
                row,
                message: format!("invalid number '{}'", field),
            })?;
        }
        points.push(CubaturePoint {
            x: Point3::new(v[0], v[1], v[2]),
            n: Vector3::new(v[3], v[4], v[5]),
            w: v[6],
        });
    }
    if points.is_empty() {
        return Err(CubatureError::EmptyRule);
    }
    debug!(path = %path.display(), points = points.len(), "Read cubature rule file");
    Ok(points)
}
