use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use shared::{
    domain::{Observation, PointId, ReconstructionPair, ShotId},
    protocol::{ImageListEntry, SyncPayload},
};

/// Selection owned by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    selected_point: Option<PointId>,
}

impl SessionState {
    pub fn selected_point(&self) -> Option<&PointId> {
        self.selected_point.as_ref()
    }

    pub fn select(&mut self, point_id: Option<PointId>) {
        self.selected_point = point_id;
    }

    pub fn take_selected(&mut self) -> Option<PointId> {
        self.selected_point.take()
    }
}

/// State handed to every view after a mutation. Views only ever see copies.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub points: BTreeMap<PointId, Vec<Observation>>,
    pub selected_point: Option<PointId>,
    pub active_pair: ReconstructionPair,
    pub shot_std: HashMap<ShotId, f64>,
}

impl SessionSnapshot {
    pub fn sync_payload(&self) -> SyncPayload {
        SyncPayload {
            points: self.points.clone(),
            selected_point: self.selected_point.clone(),
            sent_at: Utc::now(),
        }
    }

    /// Points restricted to observations in `shots`; points with none left are omitted.
    pub fn points_in(&self, shots: &[ShotId]) -> BTreeMap<PointId, Vec<Observation>> {
        self.points
            .iter()
            .filter_map(|(id, observations)| {
                let visible: Vec<Observation> = observations
                    .iter()
                    .filter(|obs| shots.contains(&obs.shot_id))
                    .cloned()
                    .collect();
                (!visible.is_empty()).then(|| (id.clone(), visible))
            })
            .collect()
    }

    pub fn image_list(&self, shots: &[ShotId]) -> Vec<ImageListEntry> {
        shots
            .iter()
            .map(|shot_id| ImageListEntry {
                shot_id: shot_id.clone(),
                observation_count: self
                    .points
                    .values()
                    .filter(|observations| observations.iter().any(|obs| &obs.shot_id == shot_id))
                    .count(),
                std: self.shot_std.get(shot_id).copied(),
            })
            .collect()
    }
}
