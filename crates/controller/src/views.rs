//! Views attached to a session and the instructions the controller can send them.

use shared::domain::{PointId, ShotId, ViewId, ViewKind};

use crate::session::SessionSnapshot;

/// A rendering surface. Capabilities a view lacks keep the default no-op.
pub trait View: Send {
    fn kind(&self) -> ViewKind;

    fn display_points(&mut self, _snapshot: &SessionSnapshot) {}

    fn populate_image_list(&mut self, _snapshot: &SessionSnapshot) {}

    fn highlight_point(&mut self, _point_id: &PointId, _zoom: bool) {}

    fn navigate_to(&mut self, _shot_id: &ShotId) {}

    fn set_tracking_enabled(&mut self, _enabled: bool) {}

    fn recenter(&mut self, _latitude: f64, _longitude: f64) {}

    /// Shots this view can browse, in display order.
    fn navigable_shots(&self) -> &[ShotId] {
        &[]
    }

    fn current_shot(&self) -> Option<&ShotId> {
        None
    }

    /// Records a shot the front end switched to on its own.
    fn note_current_shot(&mut self, _shot_id: ShotId) {}

    fn is_tracking(&self) -> bool {
        false
    }
}

#[derive(Default)]
pub struct ViewRegistry {
    views: Vec<(ViewId, Box<dyn View>)>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, view: Box<dyn View>) -> ViewId {
        let id = ViewId(self.views.len());
        self.views.push((id, view));
        id
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn get(&self, id: ViewId) -> Option<&dyn View> {
        self.views
            .iter()
            .find(|(view_id, _)| *view_id == id)
            .map(|(_, view)| view.as_ref())
    }

    pub fn get_mut(&mut self, id: ViewId) -> Option<&mut (dyn View + 'static)> {
        self.views
            .iter_mut()
            .find(|(view_id, _)| *view_id == id)
            .map(|(_, view)| view.as_mut())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ViewId, &mut (dyn View + 'static))> {
        self.views.iter_mut().map(|(id, view)| (*id, view.as_mut()))
    }

    pub fn of_kind_mut(
        &mut self,
        kind: ViewKind,
    ) -> impl Iterator<Item = (ViewId, &mut (dyn View + 'static))> {
        self.iter_mut().filter(move |(_, view)| view.kind() == kind)
    }
}
