use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(PointId);
id_newtype!(ShotId);

impl PointId {
    /// Fresh id for a newly added point.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Tools,
    Sequence,
    Overhead,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub shot_id: ShotId,
    pub projection: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point: Option<[f64; 3]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeodeticPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundControlPoint {
    pub id: PointId,
    #[serde(default)]
    pub observations: Vec<Observation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<GeodeticPosition>,
}

impl GroundControlPoint {
    pub fn empty(id: PointId) -> Self {
        Self {
            id,
            observations: Vec::new(),
            position: None,
        }
    }
}

/// Pair of reconstruction indices an analysis run was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReconstructionPair {
    pub a: usize,
    #[serde(default)]
    pub b: Option<usize>,
}

impl ReconstructionPair {
    pub const DEFAULT: Self = Self { a: 0, b: Some(1) };

    pub fn new(a: usize, b: Option<usize>) -> Self {
        Self { a, b }
    }

    /// Tag used in analysis output file names, e.g. `0x1` or `0xNone`.
    pub fn file_tag(&self) -> String {
        match self.b {
            Some(b) => format!("{}x{}", self.a, b),
            None => format!("{}xNone", self.a),
        }
    }
}

impl fmt::Display for ReconstructionPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraShotCount {
    pub camera_id: String,
    pub shots: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconstructionOption {
    Reconstruction {
        index: usize,
        camera_counts: Vec<CameraShotCount>,
    },
    NoReconstruction,
}

impl ReconstructionOption {
    pub fn label(&self) -> String {
        match self {
            Self::Reconstruction {
                index,
                camera_counts,
            } => {
                let cameras = camera_counts
                    .iter()
                    .map(|count| format!("{}({})", count.camera_id, count.shots))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("REC#{index}: {cameras}")
            }
            Self::NoReconstruction => "None (3d-to-2d)".to_string(),
        }
    }
}
