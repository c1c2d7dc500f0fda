//! Analysis results per reconstruction pair and the external process that produces them.

use std::{
    collections::{BTreeMap, HashMap},
    ffi::OsString,
    path::PathBuf,
    process::ExitStatus,
    time::Duration,
};

use async_trait::async_trait;
use shared::domain::{PointId, ReconstructionPair, ShotId};
use storage::{AnalysisOutput, Reprojections};
use thiserror::Error;
use tokio::process::Command;
use tracing::info;

use crate::point_store::PointStore;

/// Analysis refuses to run unless the points file was written within this window.
pub const SAVE_STALENESS_LIMIT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to start analysis process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("analysis process exited with {status}")]
    ProcessFailed { status: ExitStatus },
    #[error("analysis process failed: {0}")]
    Runner(String),
    #[error("failed to load analysis results for {pair}: {source:#}")]
    LoadResults {
        pair: ReconstructionPair,
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefusalReason {
    NeverSaved,
    NotSavedRecently { elapsed: Duration },
}

impl RefusalReason {
    pub fn message(&self) -> String {
        match self {
            Self::NeverSaved => {
                "No saved ground_control_points.json found; save before running the analysis"
                    .to_string()
            }
            Self::NotSavedRecently { elapsed } => format!(
                "Please save to ground_control_points.json before running the analysis (last save {}s ago)",
                elapsed.as_secs()
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisOutcome {
    Completed { pair: ReconstructionPair },
    Refused(RefusalReason),
}

/// Refuses when the save is older than [`SAVE_STALENESS_LIMIT`] or missing.
pub fn check_save_freshness(age: Option<Duration>) -> Result<(), RefusalReason> {
    match age {
        None => Err(RefusalReason::NeverSaved),
        Some(elapsed) if elapsed > SAVE_STALENESS_LIMIT => {
            Err(RefusalReason::NotSavedRecently { elapsed })
        }
        Some(_) => Ok(()),
    }
}

/// Resolves the requested pair: `b` is dropped when it names the trailing
/// "no reconstruction" option or lies beyond it.
pub fn resolve_pair(a: usize, b: Option<usize>, option_count: usize) -> ReconstructionPair {
    let last_real = option_count.saturating_sub(1);
    ReconstructionPair::new(a, b.filter(|b| *b < last_real))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub project_path: PathBuf,
    pub pair: ReconstructionPair,
    pub rigid: bool,
    pub covariance: bool,
}

impl AnalysisRequest {
    pub fn arguments(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            self.project_path.clone().into_os_string(),
            "--rec_a".into(),
            self.pair.a.to_string().into(),
        ];
        if let Some(b) = self.pair.b {
            args.push("--rec_b".into());
            args.push(b.to_string().into());
        }
        if self.rigid {
            args.push("--rigid".into());
        }
        if self.covariance {
            args.push("--covariance".into());
        }
        args
    }
}

#[async_trait]
pub trait AnalysisRunner: Send + Sync {
    async fn run(&self, request: &AnalysisRequest) -> Result<(), AnalysisError>;
}

/// Runs `<program> <script> <request arguments>` and waits for it to exit.
#[derive(Debug, Clone)]
pub struct ProcessAnalysisRunner {
    program: PathBuf,
    script: Option<PathBuf>,
}

impl ProcessAnalysisRunner {
    pub fn new(program: impl Into<PathBuf>, script: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            script,
        }
    }

    pub fn command_line(&self, request: &AnalysisRequest) -> Vec<OsString> {
        let mut line = vec![self.program.clone().into_os_string()];
        if let Some(script) = &self.script {
            line.push(script.clone().into_os_string());
        }
        line.extend(request.arguments());
        line
    }
}

#[async_trait]
impl AnalysisRunner for ProcessAnalysisRunner {
    async fn run(&self, request: &AnalysisRequest) -> Result<(), AnalysisError> {
        let mut command = Command::new(&self.program);
        if let Some(script) = &self.script {
            command.arg(script);
        }
        command.args(request.arguments());

        info!(
            pair = %request.pair,
            rigid = request.rigid,
            covariance = request.covariance,
            "starting analysis process"
        );
        let status = command.status().await.map_err(AnalysisError::Spawn)?;
        if !status.success() {
            return Err(AnalysisError::ProcessFailed { status });
        }
        Ok(())
    }
}

/// Results of one analysis run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisResults {
    pub shot_std: HashMap<ShotId, f64>,
    pub reprojections: Reprojections,
}

impl From<AnalysisOutput> for AnalysisResults {
    fn from(output: AnalysisOutput) -> Self {
        Self {
            shot_std: output.shot_std,
            reprojections: output.reprojections,
        }
    }
}

impl AnalysisResults {
    pub fn has_reprojections(&self) -> bool {
        !self.reprojections.is_empty()
    }

    /// Largest per-shot error of `point_id`.
    pub fn point_error(&self, point_id: &PointId) -> Option<f64> {
        self.reprojections
            .get(point_id)?
            .values()
            .map(|shot| shot.error)
            .filter(|error| !error.is_nan())
            .fold(None, |worst, error| match worst {
                Some(worst) if worst >= error => Some(worst),
                _ => Some(error),
            })
    }

    pub fn point_errors(&self) -> BTreeMap<PointId, f64> {
        self.reprojections
            .keys()
            .filter_map(|id| self.point_error(id).map(|error| (id.clone(), error)))
            .collect()
    }

    /// Point with the largest error among those still in `store`; ties go to
    /// the smallest id.
    pub fn worst_point(&self, store: &PointStore) -> Option<PointId> {
        let mut worst: Option<(PointId, f64)> = None;
        for (id, error) in self.point_errors() {
            if !store.contains(&id) {
                continue;
            }
            if worst.as_ref().map_or(true, |(_, worst_error)| error > *worst_error) {
                worst = Some((id, error));
            }
        }
        worst.map(|(id, _)| id)
    }

    /// Shot among `shots` contributing the largest error for `point_id`.
    pub fn shot_with_max_error(&self, point_id: &PointId, shots: &[ShotId]) -> Option<ShotId> {
        let per_shot = self.reprojections.get(point_id)?;
        let mut worst: Option<(&ShotId, f64)> = None;
        for shot_id in shots {
            let Some(reprojection) = per_shot.get(shot_id) else {
                continue;
            };
            if reprojection.error.is_nan() {
                continue;
            }
            if worst.map_or(true, |(_, worst_error)| reprojection.error > worst_error) {
                worst = Some((shot_id, reprojection.error));
            }
        }
        worst.map(|(shot_id, _)| shot_id.clone())
    }
}

/// Last loaded results, one entry per reconstruction pair.
#[derive(Debug, Clone, Default)]
pub struct AnalysisResultCache {
    entries: HashMap<ReconstructionPair, AnalysisResults>,
}

impl AnalysisResultCache {
    pub fn get(&self, pair: ReconstructionPair) -> Option<&AnalysisResults> {
        self.entries.get(&pair)
    }

    /// Swaps in the whole entry for `pair`; other pairs are untouched.
    pub fn replace(&mut self, pair: ReconstructionPair, results: AnalysisResults) {
        self.entries.insert(pair, results);
    }

    pub fn pairs(&self) -> Vec<ReconstructionPair> {
        let mut pairs: Vec<_> = self.entries.keys().copied().collect();
        pairs.sort();
        pairs
    }
}

#[cfg(test)]
#[path = "tests/analysis_tests.rs"]
mod tests;
