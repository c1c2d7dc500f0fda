//! Canonical point data for an annotation session.

use std::collections::{BTreeMap, HashSet};

use shared::domain::{GroundControlPoint, Observation, PointId, ShotId};
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointStore {
    points: BTreeMap<PointId, GroundControlPoint>,
}

impl PointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an empty point under a fresh id.
    pub fn add_point(&mut self) -> PointId {
        let mut id = PointId::generate();
        while self.points.contains_key(&id) {
            id = PointId::generate();
        }
        self.points
            .insert(id.clone(), GroundControlPoint::empty(id.clone()));
        id
    }

    pub fn remove_point(&mut self, id: &PointId) -> Option<GroundControlPoint> {
        self.points.remove(id)
    }

    pub fn contains(&self, id: &PointId) -> bool {
        self.points.contains_key(id)
    }

    pub fn get(&self, id: &PointId) -> Option<&GroundControlPoint> {
        self.points.get(id)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Replaces every point. A later duplicate id wins; repeated shots within
    /// one point keep their first observation.
    pub fn replace_all(&mut self, points: Vec<GroundControlPoint>) {
        self.points.clear();
        for mut point in points {
            let mut seen = HashSet::new();
            let before = point.observations.len();
            point
                .observations
                .retain(|obs| seen.insert(obs.shot_id.clone()));
            if point.observations.len() != before {
                warn!(
                    point_id = %point.id,
                    dropped = before - point.observations.len(),
                    "dropped duplicate observations for the same shot"
                );
            }
            self.points.insert(point.id.clone(), point);
        }
    }

    pub fn to_vec(&self) -> Vec<GroundControlPoint> {
        self.points.values().cloned().collect()
    }

    pub fn observation_map(&self) -> BTreeMap<PointId, Vec<Observation>> {
        self.points
            .iter()
            .map(|(id, point)| (id.clone(), point.observations.clone()))
            .collect()
    }

    pub fn shots_observing(&self, id: &PointId) -> HashSet<ShotId> {
        self.points
            .get(id)
            .map(|point| {
                point
                    .observations
                    .iter()
                    .map(|obs| obs.shot_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}
