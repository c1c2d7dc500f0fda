//! Session controller for ground-control-point annotation.
//!
//! [`SyncController`] owns the canonical points, the current selection and the
//! analysis results, and is the only thing that mutates them. Every mutation is
//! applied first and then fanned out to all registered views as a
//! [`SessionSnapshot`] taken after the mutation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use shared::{
    domain::{PointId, ReconstructionOption, ReconstructionPair, ShotId, ViewId, ViewKind},
    protocol::{SyncPayload, ToolsEvent},
};
use storage::Storage;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod analysis;
pub mod chooser;
pub mod point_store;
pub mod session;
pub mod views;

pub use analysis::{
    check_save_freshness, resolve_pair, AnalysisError, AnalysisOutcome, AnalysisRequest,
    AnalysisResultCache, AnalysisResults, AnalysisRunner, ProcessAnalysisRunner, RefusalReason,
    SAVE_STALENESS_LIMIT,
};
pub use chooser::{FirstSortedChooser, RandomShotChooser, ShotChooser};
pub use point_store::PointStore;
pub use session::{SessionSnapshot, SessionState};
pub use views::{View, ViewRegistry};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("unknown point {0}")]
    UnknownPoint(PointId),
    #[error("unknown view {0:?}")]
    UnknownView(ViewId),
    #[error("view {0:?} is not a sequence view")]
    NotASequenceView(ViewId),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("{0:#}")]
    Storage(#[from] anyhow::Error),
}

pub struct SyncController {
    storage: Storage,
    points: PointStore,
    session: SessionState,
    analysis: AnalysisResultCache,
    active_pair: ReconstructionPair,
    reconstruction_options: Vec<ReconstructionOption>,
    views: ViewRegistry,
    runner: Box<dyn AnalysisRunner>,
    chooser: Box<dyn ShotChooser>,
}

impl SyncController {
    pub fn new(
        storage: Storage,
        views: ViewRegistry,
        runner: Box<dyn AnalysisRunner>,
        chooser: Box<dyn ShotChooser>,
    ) -> Self {
        Self {
            storage,
            points: PointStore::new(),
            session: SessionState::default(),
            analysis: AnalysisResultCache::default(),
            active_pair: ReconstructionPair::DEFAULT,
            reconstruction_options: Vec::new(),
            views,
            runner,
            chooser,
        }
    }

    /// Reads reconstruction options, any saved points and the default pair's
    /// prior analysis output. Missing files leave the session empty.
    pub fn load_initial_state(&mut self) -> Result<(), ControllerError> {
        self.reconstruction_options = self.storage.load_reconstruction_options()?;

        let points_path = self.storage.points_path();
        if points_path.exists() {
            self.load_points(&points_path)?;
        }
        self.reload_analysis(ReconstructionPair::DEFAULT)?;

        info!(
            project = %self.storage.root().display(),
            points = self.points.len(),
            reconstructions = self.reconstruction_options.len(),
            "session initialized"
        );
        Ok(())
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn points(&self) -> &PointStore {
        &self.points
    }

    pub fn selected_point(&self) -> Option<&PointId> {
        self.session.selected_point()
    }

    pub fn active_pair(&self) -> ReconstructionPair {
        self.active_pair
    }

    pub fn analysis(&self) -> &AnalysisResultCache {
        &self.analysis
    }

    pub fn active_results(&self) -> Option<&AnalysisResults> {
        self.analysis.get(self.active_pair)
    }

    pub fn reconstruction_options(&self) -> &[ReconstructionOption] {
        &self.reconstruction_options
    }

    pub fn views(&self) -> &ViewRegistry {
        &self.views
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            points: self.points.observation_map(),
            selected_point: self.session.selected_point().cloned(),
            active_pair: self.active_pair,
            shot_std: self
                .active_results()
                .map(|results| results.shot_std.clone())
                .unwrap_or_default(),
        }
    }

    pub fn sync_payload(&self) -> SyncPayload {
        self.snapshot().sync_payload()
    }

    /// Creates an empty point and selects it.
    pub fn add_point(&mut self) -> PointId {
        let id = self.points.add_point();
        info!(point_id = %id, "added point");
        self.apply_selection(Some(id.clone()));
        id
    }

    /// Removes the currently selected point. Without a selection nothing happens.
    pub fn remove_point(&mut self) -> Option<PointId> {
        let id = self.session.take_selected()?;
        self.points.remove_point(&id);
        info!(point_id = %id, "removed point");
        self.broadcast_points();
        Some(id)
    }

    pub fn select_point(&mut self, point_id: Option<PointId>) -> Result<(), ControllerError> {
        if let Some(id) = &point_id {
            if !self.points.contains(id) {
                return Err(ControllerError::UnknownPoint(id.clone()));
            }
        }
        self.apply_selection(point_id);
        Ok(())
    }

    /// Replaces every point with the contents of `path`.
    pub fn load_points(&mut self, path: &Path) -> Result<(), ControllerError> {
        let points = storage::load_points(path)?;
        self.points.replace_all(points);
        let dangling = self
            .session
            .selected_point()
            .is_some_and(|id| !self.points.contains(id));
        if dangling {
            self.session.select(None);
        }
        info!(path = %path.display(), points = self.points.len(), "loaded points");

        let snapshot = self.snapshot();
        for (_, view) in self.views.iter_mut() {
            view.display_points(&snapshot);
            view.populate_image_list(&snapshot);
        }
        Ok(())
    }

    /// Writes the points to `path` and its mirror; returns the paths written.
    pub fn save_points(&self, path: &Path) -> Result<Vec<PathBuf>, ControllerError> {
        let written = storage::save_points_with_mirror(path, &self.points.to_vec())?;
        info!(path = %path.display(), points = self.points.len(), "saved points");
        Ok(written)
    }

    /// Runs the external analysis for `(a, b)` and reloads its results.
    ///
    /// Blocks the controller until the process exits. Refuses to start unless
    /// the points file was saved within [`SAVE_STALENESS_LIMIT`] of `now`.
    /// On failure the cached results stay as they were.
    pub async fn run_analysis(
        &mut self,
        a: usize,
        b: Option<usize>,
        rigid: bool,
        covariance: bool,
        now: DateTime<Utc>,
    ) -> Result<AnalysisOutcome, ControllerError> {
        let age = storage::file_age(&self.storage.points_path(), now)?;
        if let Err(reason) = check_save_freshness(age) {
            warn!(reason = %reason.message(), "analysis refused");
            return Ok(AnalysisOutcome::Refused(reason));
        }

        let pair = resolve_pair(a, b, self.reconstruction_options.len());
        let request = AnalysisRequest {
            project_path: self.storage.root().to_path_buf(),
            pair,
            rigid,
            covariance,
        };
        self.runner.run(&request).await?;
        self.reload_analysis(pair)?;

        let snapshot = self.snapshot();
        for (_, view) in self.views.of_kind_mut(ViewKind::Sequence) {
            view.populate_image_list(&snapshot);
        }
        info!(%pair, "analysis done");
        Ok(AnalysisOutcome::Completed { pair })
    }

    pub async fn analyze_rigid(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<AnalysisOutcome, ControllerError> {
        let ReconstructionPair { a, b } = ReconstructionPair::DEFAULT;
        self.run_analysis(a, b, true, false, now).await
    }

    pub async fn analyze_flex(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<AnalysisOutcome, ControllerError> {
        let ReconstructionPair { a, b } = ReconstructionPair::DEFAULT;
        self.run_analysis(a, b, false, false, now).await
    }

    /// Sends every sequence view that is not already showing the selected
    /// point to one of its shots observing it.
    pub fn jump_to_selected(&mut self) {
        let Some(selected) = self.session.selected_point() else {
            return;
        };
        let observing = self.points.shots_observing(selected);

        for (view_id, view) in self.views.of_kind_mut(ViewKind::Sequence) {
            let already_visible = view
                .current_shot()
                .is_some_and(|shot| observing.contains(shot));
            if already_visible {
                continue;
            }
            let candidates: Vec<ShotId> = view
                .navigable_shots()
                .iter()
                .filter(|shot| observing.contains(*shot))
                .cloned()
                .collect();
            if let Some(target) = self.chooser.choose(&candidates) {
                debug!(?view_id, shot_id = %target, "jumping to selected point");
                view.navigate_to(&target);
            }
        }
    }

    /// Selects the point with the largest reprojection error and shows each
    /// sequence view's worst shot for it.
    pub fn jump_to_worst(&mut self) -> Option<PointId> {
        let Some(results) = self
            .analysis
            .get(self.active_pair)
            .filter(|results| results.has_reprojections())
        else {
            warn!(
                pair = %self.active_pair,
                "no point reprojections available; can't jump to worst point"
            );
            return None;
        };
        let Some(worst) = results.worst_point(&self.points) else {
            warn!(
                pair = %self.active_pair,
                "reprojection data only covers removed points; can't jump to worst point"
            );
            return None;
        };
        self.session.select(Some(worst.clone()));
        info!(point_id = %worst, "jumping to worst point");

        let snapshot = SessionSnapshot {
            points: self.points.observation_map(),
            selected_point: Some(worst.clone()),
            active_pair: self.active_pair,
            shot_std: results.shot_std.clone(),
        };
        for (view_id, view) in self.views.iter_mut() {
            view.display_points(&snapshot);
            if view.kind() != ViewKind::Sequence {
                continue;
            }
            if let Some(shot_id) = results.shot_with_max_error(&worst, view.navigable_shots()) {
                debug!(?view_id, %shot_id, "showing worst shot");
                view.navigate_to(&shot_id);
            }
        }
        Some(worst)
    }

    /// Keeps at most one sequence view as the geolocation source.
    pub fn on_tracking_toggled(
        &mut self,
        source: ViewId,
        enabled: bool,
    ) -> Result<(), ControllerError> {
        match self.views.get(source).map(|view| view.kind()) {
            None => return Err(ControllerError::UnknownView(source)),
            Some(ViewKind::Sequence) => {}
            Some(_) => return Err(ControllerError::NotASequenceView(source)),
        }

        for (view_id, view) in self.views.of_kind_mut(ViewKind::Sequence) {
            if view_id == source {
                view.set_tracking_enabled(enabled);
            } else if enabled && view.is_tracking() {
                view.set_tracking_enabled(false);
            }
        }
        debug!(?source, enabled, "tracking source updated");
        Ok(())
    }

    pub fn refocus_overhead_views(&mut self, latitude: f64, longitude: f64) {
        for (_, view) in self.views.of_kind_mut(ViewKind::Overhead) {
            view.recenter(latitude, longitude);
        }
    }

    /// Applies an event from the tools panel and re-sends it the full state,
    /// whether or not the event succeeded.
    pub fn handle_tools_event(&mut self, event: ToolsEvent) -> Result<(), ControllerError> {
        info!(?event, "tools view event");
        let result = match event {
            ToolsEvent::SelectPoint { point_id } => self.select_point(point_id),
            ToolsEvent::DeleteSelected => {
                self.remove_point();
                Ok(())
            }
            ToolsEvent::AddPoint => {
                self.add_point();
                Ok(())
            }
        };

        let snapshot = self.snapshot();
        for (_, view) in self.views.of_kind_mut(ViewKind::Tools) {
            view.display_points(&snapshot);
        }
        result
    }

    pub fn note_image_shown(
        &mut self,
        view_id: ViewId,
        shot_id: ShotId,
    ) -> Result<(), ControllerError> {
        let view = self
            .views
            .get_mut(view_id)
            .ok_or(ControllerError::UnknownView(view_id))?;
        view.note_current_shot(shot_id);
        Ok(())
    }

    /// Re-sends the full state to one view, e.g. after it (re)connects.
    pub fn resync_view(&mut self, view_id: ViewId) -> Result<(), ControllerError> {
        let snapshot = self.snapshot();
        let view = self
            .views
            .get_mut(view_id)
            .ok_or(ControllerError::UnknownView(view_id))?;
        view.display_points(&snapshot);
        view.populate_image_list(&snapshot);
        Ok(())
    }

    fn apply_selection(&mut self, point_id: Option<PointId>) {
        self.session.select(point_id);
        let snapshot = self.snapshot();
        for (_, view) in self.views.iter_mut() {
            view.display_points(&snapshot);
            if let Some(id) = &snapshot.selected_point {
                view.highlight_point(id, false);
            }
        }
    }

    fn broadcast_points(&mut self) {
        let snapshot = self.snapshot();
        debug!(views = self.views.len(), "broadcasting points");
        for (_, view) in self.views.iter_mut() {
            view.display_points(&snapshot);
        }
    }

    fn reload_analysis(&mut self, pair: ReconstructionPair) -> Result<(), AnalysisError> {
        let output = self
            .storage
            .load_analysis_output(pair)
            .map_err(|source| AnalysisError::LoadResults { pair, source })?;
        self.analysis.replace(pair, output.into());
        self.active_pair = pair;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
