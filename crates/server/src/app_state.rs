use shared::domain::ViewId;

use crate::{api::ViewSummary, bridge::ControllerHandle, views::ViewChannel};

pub(crate) struct ViewEndpoint {
    pub(crate) summary: ViewSummary,
    pub(crate) channel: ViewChannel,
}

pub(crate) struct AppState {
    pub(crate) controller: ControllerHandle,
    pub(crate) views: Vec<ViewEndpoint>,
}

impl AppState {
    pub(crate) fn view(&self, view_id: ViewId) -> Option<&ViewEndpoint> {
        self.views
            .iter()
            .find(|endpoint| endpoint.summary.view_id == view_id)
    }
}
