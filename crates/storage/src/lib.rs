use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

use shared::domain::{
    CameraShotCount, GroundControlPoint, PointId, ReconstructionOption, ReconstructionPair, ShotId,
};

pub const POINTS_FILE_NAME: &str = "ground_control_points.json";
pub const RECONSTRUCTION_FILE_NAME: &str = "reconstruction.json";
pub const SEQUENCES_FILE_NAME: &str = "sequences.json";

/// File layout of an annotation project directory.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PointsDocument {
    #[serde(default)]
    points: Vec<GroundControlPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShotReprojection {
    pub error: f64,
}

/// `point_id -> shot_id -> reprojection` as written by the analysis process.
pub type Reprojections = BTreeMap<PointId, BTreeMap<ShotId, ShotReprojection>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisOutput {
    pub shot_std: HashMap<ShotId, f64>,
    pub reprojections: Reprojections,
}

#[derive(Debug, Deserialize)]
struct StoredReconstruction {
    #[serde(default)]
    shots: BTreeMap<String, StoredShot>,
}

#[derive(Debug, Deserialize)]
struct StoredShot {
    camera: String,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn points_path(&self) -> PathBuf {
        self.root.join(POINTS_FILE_NAME)
    }

    pub fn shot_std_path(&self, pair: ReconstructionPair) -> PathBuf {
        self.root.join(format!("shots_std_{}.csv", pair.file_tag()))
    }

    pub fn reprojections_path(&self, pair: ReconstructionPair) -> PathBuf {
        self.root
            .join(format!("gcp_reprojections_{}.json", pair.file_tag()))
    }

    pub fn reconstruction_path(&self) -> PathBuf {
        self.root.join(RECONSTRUCTION_FILE_NAME)
    }

    pub fn sequences_path(&self) -> PathBuf {
        self.root.join(SEQUENCES_FILE_NAME)
    }

    /// Reads both analysis outputs for `pair`. Missing files read as empty tables.
    pub fn load_analysis_output(&self, pair: ReconstructionPair) -> Result<AnalysisOutput> {
        let shot_std = load_shot_std(&self.shot_std_path(pair))?;
        let reprojections = load_reprojections(&self.reprojections_path(pair))?;
        debug!(
            %pair,
            shots = shot_std.len(),
            points = reprojections.len(),
            "loaded analysis output"
        );
        Ok(AnalysisOutput {
            shot_std,
            reprojections,
        })
    }

    pub fn load_reconstruction_options(&self) -> Result<Vec<ReconstructionOption>> {
        load_reconstruction_options(&self.reconstruction_path())
    }

    pub fn load_sequences(&self) -> Result<BTreeMap<String, Vec<ShotId>>> {
        let path = self.sequences_path();
        let Some(raw) = read_optional(&path)? else {
            return Ok(BTreeMap::new());
        };
        serde_json::from_str(&raw)
            .with_context(|| format!("malformed sequence list '{}'", path.display()))
    }
}

pub fn load_points(path: &Path) -> Result<Vec<GroundControlPoint>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read points file '{}'", path.display()))?;
    let document: PointsDocument = serde_json::from_str(&raw)
        .with_context(|| format!("malformed points file '{}'", path.display()))?;
    Ok(document.points)
}

/// Writes the points document, sorted by id.
pub fn save_points(path: &Path, points: &[GroundControlPoint]) -> Result<()> {
    let mut points = points.to_vec();
    points.sort_by(|left, right| left.id.cmp(&right.id));
    let raw = serde_json::to_string_pretty(&PointsDocument { points })?;

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            format!("failed to create parent directory '{}'", parent.display())
        })?;
    }
    fs::write(path, raw)
        .with_context(|| format!("failed to write points file '{}'", path.display()))?;
    Ok(())
}

/// Sibling copy named after the destination's directory: `.../foo/x.json` -> `.../foo/foo.json`.
///
/// Relative parents such as `.` are resolved against the working directory
/// to find the name; the returned path stays relative.
pub fn mirror_path(path: &Path) -> Option<PathBuf> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let resolved = std::path::absolute(parent).ok()?;
    let dirname = resolved.file_name()?.to_str()?;
    Some(parent.join(format!("{dirname}.json")))
}

/// Saves `points` to `path` and to its mirror path. Returns every path written.
pub fn save_points_with_mirror(path: &Path, points: &[GroundControlPoint]) -> Result<Vec<PathBuf>> {
    save_points(path, points)?;
    let mut written = vec![path.to_path_buf()];
    if let Some(mirror) = mirror_path(path) {
        save_points(&mirror, points)?;
        written.push(mirror);
    }
    Ok(written)
}

pub fn load_shot_std(path: &Path) -> Result<HashMap<ShotId, f64>> {
    let Some(raw) = read_optional(path)? else {
        return Ok(HashMap::new());
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(raw.as_bytes());

    let mut shot_std = HashMap::new();
    for (line, record) in reader.records().enumerate() {
        let record = record
            .with_context(|| format!("malformed shot std table '{}'", path.display()))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let (Some(shot), Some(std), None) = (record.get(0), record.get(1), record.get(2)) else {
            anyhow::bail!(
                "expected 'shot_id,std' on line {} of '{}'",
                line + 1,
                path.display()
            );
        };
        let std: f64 = std.parse().with_context(|| {
            format!(
                "invalid std value '{std}' on line {} of '{}'",
                line + 1,
                path.display()
            )
        })?;
        shot_std.insert(ShotId::from(shot), std);
    }
    Ok(shot_std)
}

pub fn load_reprojections(path: &Path) -> Result<Reprojections> {
    let Some(raw) = read_optional(path)? else {
        return Ok(Reprojections::new());
    };
    serde_json::from_str(&raw)
        .with_context(|| format!("malformed reprojection document '{}'", path.display()))
}

pub fn load_reconstruction_options(path: &Path) -> Result<Vec<ReconstructionOption>> {
    let mut options = Vec::new();

    if let Some(raw) = read_optional(path)? {
        let reconstructions: Vec<StoredReconstruction> = serde_json::from_str(&raw)
            .with_context(|| format!("malformed reconstruction file '{}'", path.display()))?;
        for (index, reconstruction) in reconstructions.into_iter().enumerate() {
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for shot in reconstruction.shots.into_values() {
                *counts.entry(shot.camera).or_default() += 1;
            }
            options.push(ReconstructionOption::Reconstruction {
                index,
                camera_counts: counts
                    .into_iter()
                    .map(|(camera_id, shots)| CameraShotCount { camera_id, shots })
                    .collect(),
            });
        }
    }

    options.push(ReconstructionOption::NoReconstruction);
    Ok(options)
}

/// Time elapsed since `path` was last written, or `None` if it does not exist.
pub fn file_age(path: &Path, now: DateTime<Utc>) -> Result<Option<Duration>> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to stat '{}'", path.display()))
        }
    };
    let modified: DateTime<Utc> = metadata
        .modified()
        .with_context(|| format!("no modification time for '{}'", path.display()))?
        .into();
    Ok(Some((now - modified).to_std().unwrap_or(Duration::ZERO)))
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read '{}'", path.display())),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
