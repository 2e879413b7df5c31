use nalgebra::{Isometry3, Translation3, Unit, UnitQuaternion, Vector3};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_TAG: &str = "default";

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("I/O error reading transform file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Duplicate transform tag '{0}'")]
    DuplicateTag(String),
    #[error("Rotation axis must be non-zero")]
    ZeroAxis,
}

/// A rigid motion applied to one object, identified by its label.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMove {
    pub label: String,
    pub motion: Isometry3<f64>,
}

/// A tagged set of rigid motions applied together to a geometry.
///
/// Objects not mentioned keep their reference pose. The tag is the key under which flux
/// records are written and looked up.
#[derive(Debug, Clone, PartialEq)]
pub struct GTComplex {
    pub tag: String,
    pub moves: Vec<ObjectMove>,
}

impl GTComplex {
    pub fn identity(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            moves: Vec::new(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.moves
            .iter()
            .all(|m| m.motion == Isometry3::identity())
    }

    pub fn with_move(mut self, label: impl Into<String>, motion: Isometry3<f64>) -> Self {
        self.moves.push(ObjectMove {
            label: label.into(),
            motion,
        });
        self
    }

    pub fn motion_for(&self, label: &str) -> Option<&Isometry3<f64>> {
        self.moves.iter().find(|m| m.label == label).map(|m| &m.motion)
    }
}

/// The single identity transform used when no transform list is given.
pub fn default_transforms() -> Vec<GTComplex> {
    vec![GTComplex::identity(DEFAULT_TAG)]
}

pub fn translation(displacement: Vector3<f64>) -> Isometry3<f64> {
    Isometry3::from_parts(Translation3::from(displacement), UnitQuaternion::identity())
}

/// Rotation by `angle_degrees` about `axis` through the origin.
pub fn rotation(axis: Vector3<f64>, angle_degrees: f64) -> Result<Isometry3<f64>, TransformError> {
    let axis = Unit::try_new(axis, 1e-12).ok_or(TransformError::ZeroAxis)?;
    Ok(Isometry3::from_parts(
        Translation3::identity(),
        UnitQuaternion::from_axis_angle(&axis, angle_degrees.to_radians()),
    ))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TransformSpec {
    pub tag: String,
    #[serde(default, rename = "move")]
    pub moves: Vec<MoveSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct MoveSpec {
    pub object: String,
    #[serde(default)]
    pub displacement: Option<[f64; 3]>,
    #[serde(default)]
    pub rotation_axis: Option<[f64; 3]>,
    #[serde(default)]
    pub rotation_angle: Option<f64>,
}

impl TryFrom<TransformSpec> for GTComplex {
    type Error = TransformError;

    fn try_from(spec: TransformSpec) -> Result<Self, Self::Error> {
        let mut gtc = GTComplex::identity(spec.tag);
        for m in spec.moves {
            let mut motion = Isometry3::identity();
            if let Some(d) = m.displacement {
                motion = translation(Vector3::from(d)) * motion;
            }
            if let Some(angle) = m.rotation_angle {
                let axis = m.rotation_axis.map(Vector3::from).unwrap_or_else(Vector3::z);
                motion = rotation(axis, angle)? * motion;
            }
            gtc = gtc.with_move(m.object, motion);
        }
        Ok(gtc)
    }
}

/// Parses a transform file.
///
/// Each non-comment line describes one transform:
///
/// ```text
/// TRANS d10 OBJECT Sphere2 DISP 0 0 10 ROT 0 0 1 45
/// ```
///
/// `DISP dx dy dz` and `ROT ax ay az degrees` act on the most recent `OBJECT` and compose
/// in the order written. Rotations are about the origin.
pub fn parse_transforms(content: &str) -> Result<Vec<GTComplex>, TransformError> {
    let mut transforms: Vec<GTComplex> = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let err = |message: String| TransformError::Parse {
            line: line_no,
            message,
        };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let mut cursor = 0;
        let mut next = || {
            let t = tokens.get(cursor).copied();
            cursor += 1;
            t
        };

        match next() {
            Some(kw) if kw.eq_ignore_ascii_case("TRANS") => {}
            Some(other) => return Err(err(format!("expected TRANS, found '{}'", other))),
            None => continue,
        }
        let tag = next().ok_or_else(|| err("missing transform tag".to_string()))?;
        if transforms.iter().any(|t| t.tag == tag) {
            return Err(TransformError::DuplicateTag(tag.to_string()));
        }

        let mut gtc = GTComplex::identity(tag);
        let mut current: Option<(String, Isometry3<f64>)> = None;

        while let Some(kw) = next() {
            let mut numbers = |n: usize| -> Result<Vec<f64>, TransformError> {
                (0..n)
                    .map(|_| {
                        let tok = next().ok_or_else(|| err(format!("'{}' needs {} numbers", kw, n)))?;
                        tok.parse::<f64>()
                            .map_err(|_| err(format!("invalid number '{}'", tok)))
                    })
                    .collect()
            };
            match kw.to_ascii_uppercase().as_str() {
                "OBJECT" => {
                    let label = next().ok_or_else(|| err("missing object label".to_string()))?;
                    if let Some((label, motion)) = current.take() {
                        gtc = gtc.with_move(label, motion);
                    }
                    current = Some((label.to_string(), Isometry3::identity()));
                }
                "DISP" | "DISPLACED" => {
                    let v = numbers(3)?;
                    let (_, motion) = current
                        .as_mut()
                        .ok_or_else(|| err("DISP before OBJECT".to_string()))?;
                    *motion = translation(Vector3::new(v[0], v[1], v[2])) * *motion;
                }
                "ROT" | "ROTATED" => {
                    let v = numbers(4)?;
                    let rot = rotation(Vector3::new(v[0], v[1], v[2]), v[3])?;
                    let (_, motion) = current
                        .as_mut()
                        .ok_or_else(|| err("ROT before OBJECT".to_string()))?;
                    *motion = rot * *motion;
                }
                other => return Err(err(format!("unknown keyword '{}'", other))),
            }
        }
        if let Some((label, motion)) = current.take() {
            gtc = gtc.with_move(label, motion);
        }
        transforms.push(gtc);
    }

    Ok(transforms)
}

pub fn load_transforms(path: &Path) -> Result<Vec<GTComplex>, TransformError> {
    let content = fs::read_to_string(path).map_err(|e| TransformError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_transforms(&content)
}
