//! Views backed by WebSocket clients. Every instruction becomes a
//! [`ViewUpdate`] on the view's broadcast channel; connections subscribe to it.

use controller::{SessionSnapshot, View};
use shared::{
    domain::{PointId, ShotId, ViewKind},
    protocol::ViewUpdate,
};
use tokio::sync::broadcast;
use tracing::debug;

pub type ViewChannel = broadcast::Sender<ViewUpdate>;

const CHANNEL_CAPACITY: usize = 64;

pub fn view_channel() -> ViewChannel {
    broadcast::channel(CHANNEL_CAPACITY).0
}

fn push(channel: &ViewChannel, update: ViewUpdate) {
    // no subscriber just means the front end isn't connected yet
    if channel.send(update).is_err() {
        debug!("view update dropped; no connected clients");
    }
}

pub struct ToolsView {
    channel: ViewChannel,
}

impl ToolsView {
    pub fn new(channel: ViewChannel) -> Self {
        Self { channel }
    }
}

impl View for ToolsView {
    fn kind(&self) -> ViewKind {
        ViewKind::Tools
    }

    fn display_points(&mut self, snapshot: &SessionSnapshot) {
        push(&self.channel, ViewUpdate::Sync(snapshot.sync_payload()));
    }
}

/// An image sequence. Keeps a mirror of what the front end was told to show.
pub struct SequenceView {
    name: String,
    shots: Vec<ShotId>,
    current: Option<ShotId>,
    tracking: bool,
    channel: ViewChannel,
}

impl SequenceView {
    pub fn new(name: impl Into<String>, shots: Vec<ShotId>, channel: ViewChannel) -> Self {
        Self {
            name: name.into(),
            shots,
            current: None,
            tracking: false,
            channel,
        }
    }
}

impl View for SequenceView {
    fn kind(&self) -> ViewKind {
        ViewKind::Sequence
    }

    fn display_points(&mut self, snapshot: &SessionSnapshot) {
        push(
            &self.channel,
            ViewUpdate::DisplayPoints {
                points: snapshot.points_in(&self.shots),
                selected_point: snapshot.selected_point.clone(),
            },
        );
    }

    fn populate_image_list(&mut self, snapshot: &SessionSnapshot) {
        push(
            &self.channel,
            ViewUpdate::ImageList {
                pair: Some(snapshot.active_pair),
                images: snapshot.image_list(&self.shots),
            },
        );
    }

    fn highlight_point(&mut self, point_id: &PointId, zoom: bool) {
        push(
            &self.channel,
            ViewUpdate::Highlight {
                point_id: point_id.clone(),
                zoom,
            },
        );
    }

    fn navigate_to(&mut self, shot_id: &ShotId) {
        self.current = Some(shot_id.clone());
        push(
            &self.channel,
            ViewUpdate::ShowImage {
                shot_id: shot_id.clone(),
            },
        );
    }

    fn set_tracking_enabled(&mut self, enabled: bool) {
        self.tracking = enabled;
        push(&self.channel, ViewUpdate::TrackingEnabled { enabled });
    }

    fn navigable_shots(&self) -> &[ShotId] {
        &self.shots
    }

    fn current_shot(&self) -> Option<&ShotId> {
        self.current.as_ref()
    }

    fn note_current_shot(&mut self, shot_id: ShotId) {
        debug!(sequence = %self.name, %shot_id, "front end changed image");
        self.current = Some(shot_id);
    }

    fn is_tracking(&self) -> bool {
        self.tracking
    }
}

pub struct OverheadView {
    name: String,
    channel: ViewChannel,
}

impl OverheadView {
    pub fn new(name: impl Into<String>, channel: ViewChannel) -> Self {
        Self {
            name: name.into(),
            channel,
        }
    }
}

impl View for OverheadView {
    fn kind(&self) -> ViewKind {
        ViewKind::Overhead
    }

    fn display_points(&mut self, snapshot: &SessionSnapshot) {
        push(
            &self.channel,
            ViewUpdate::DisplayPoints {
                points: snapshot.points.clone(),
                selected_point: snapshot.selected_point.clone(),
            },
        );
    }

    fn highlight_point(&mut self, point_id: &PointId, zoom: bool) {
        push(
            &self.channel,
            ViewUpdate::Highlight {
                point_id: point_id.clone(),
                zoom,
            },
        );
    }

    fn recenter(&mut self, latitude: f64, longitude: f64) {
        debug!(overhead = %self.name, latitude, longitude, "recentering map");
        push(
            &self.channel,
            ViewUpdate::Recenter {
                latitude,
                longitude,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::{BTreeMap, HashMap};

    use shared::domain::{Observation, ReconstructionPair};

    fn observation(shot: &str) -> Observation {
        Observation {
            shot_id: ShotId::from(shot),
            projection: [0.1, 0.2],
            point: None,
        }
    }

    fn snapshot() -> SessionSnapshot {
        let mut points = BTreeMap::new();
        points.insert(PointId::from("p1"), vec![observation("s1"), observation("s9")]);
        points.insert(PointId::from("p2"), vec![observation("s9")]);
        SessionSnapshot {
            points,
            selected_point: Some(PointId::from("p1")),
            active_pair: ReconstructionPair::DEFAULT,
            shot_std: HashMap::from([(ShotId::from("s1"), 0.25)]),
        }
    }

    #[test]
    fn sequence_view_only_shows_its_own_observations() {
        let channel = view_channel();
        let mut rx = channel.subscribe();
        let mut view = SequenceView::new(
            "left",
            vec![ShotId::from("s1"), ShotId::from("s2")],
            channel,
        );

        view.display_points(&snapshot());
        match rx.try_recv().expect("update") {
            ViewUpdate::DisplayPoints { points, selected_point } => {
                assert_eq!(points.len(), 1);
                assert_eq!(points[&PointId::from("p1")], vec![observation("s1")]);
                assert_eq!(selected_point, Some(PointId::from("p1")));
            }
            other => panic!("unexpected update {other:?}"),
        }
    }

    #[test]
    fn sequence_image_list_carries_pair_and_std() {
        let channel = view_channel();
        let mut rx = channel.subscribe();
        let mut view = SequenceView::new(
            "left",
            vec![ShotId::from("s1"), ShotId::from("s2")],
            channel,
        );

        view.populate_image_list(&snapshot());
        match rx.try_recv().expect("update") {
            ViewUpdate::ImageList { pair, images } => {
                assert_eq!(pair, Some(ReconstructionPair::DEFAULT));
                assert_eq!(images[0].observation_count, 1);
                assert_eq!(images[0].std, Some(0.25));
                assert_eq!(images[1].observation_count, 0);
                assert_eq!(images[1].std, None);
            }
            other => panic!("unexpected update {other:?}"),
        }
    }

    #[test]
    fn sequence_view_mirrors_navigation_and_tracking() {
        let channel = view_channel();
        let mut rx = channel.subscribe();
        let mut view = SequenceView::new("left", vec![ShotId::from("s1")], channel);

        view.navigate_to(&ShotId::from("s1"));
        view.set_tracking_enabled(true);

        assert_eq!(view.current_shot(), Some(&ShotId::from("s1")));
        assert!(view.is_tracking());
        assert_eq!(
            rx.try_recv().expect("show"),
            ViewUpdate::ShowImage {
                shot_id: ShotId::from("s1")
            }
        );
        assert_eq!(
            rx.try_recv().expect("tracking"),
            ViewUpdate::TrackingEnabled { enabled: true }
        );
    }

    #[test]
    fn tools_view_receives_full_sync() {
        let channel = view_channel();
        let mut rx = channel.subscribe();
        let mut view = ToolsView::new(channel);

        view.display_points(&snapshot());
        match rx.try_recv().expect("update") {
            ViewUpdate::Sync(payload) => {
                assert_eq!(payload.points.len(), 2);
                assert_eq!(payload.selected_point, Some(PointId::from("p1")));
            }
            other => panic!("unexpected update {other:?}"),
        }
    }

    #[test]
    fn pushing_without_subscribers_is_harmless() {
        let mut view = OverheadView::new("site", view_channel());
        view.recenter(47.1, 8.5);
        view.display_points(&snapshot());
    }
}
