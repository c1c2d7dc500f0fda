use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{Observation, PointId, ReconstructionPair, ShotId},
    error::ApiError,
};

/// Discrete events the tools panel sends back to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ToolsEvent {
    #[serde(rename = "select_cp")]
    SelectPoint {
        #[serde(default)]
        point_id: Option<PointId>,
    },
    #[serde(rename = "delCP")]
    DeleteSelected,
    #[serde(rename = "addCP")]
    AddPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum SequenceEvent {
    #[serde(rename = "image_shown")]
    ImageShown { shot_id: ShotId },
    #[serde(rename = "track_toggled")]
    TrackToggled { enabled: bool },
}

/// Full state pushed to the tools panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPayload {
    pub points: BTreeMap<PointId, Vec<Observation>>,
    pub selected_point: Option<PointId>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageListEntry {
    pub shot_id: ShotId,
    pub observation_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ViewUpdate {
    Sync(SyncPayload),
    DisplayPoints {
        points: BTreeMap<PointId, Vec<Observation>>,
        selected_point: Option<PointId>,
    },
    ImageList {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pair: Option<ReconstructionPair>,
        images: Vec<ImageListEntry>,
    },
    Highlight {
        point_id: PointId,
        zoom: bool,
    },
    ShowImage {
        shot_id: ShotId,
    },
    TrackingEnabled {
        enabled: bool,
    },
    Recenter {
        latitude: f64,
        longitude: f64,
    },
    Error(ApiError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tools_events_use_panel_event_names() {
        let select: ToolsEvent =
            serde_json::from_str(r#"{"event": "select_cp", "point_id": "p7"}"#).expect("select");
        assert_eq!(
            select,
            ToolsEvent::SelectPoint {
                point_id: Some(PointId::from("p7"))
            }
        );

        let delete: ToolsEvent = serde_json::from_str(r#"{"event": "delCP"}"#).expect("delete");
        assert_eq!(delete, ToolsEvent::DeleteSelected);

        let add: ToolsEvent = serde_json::from_str(r#"{"event": "addCP"}"#).expect("add");
        assert_eq!(add, ToolsEvent::AddPoint);
    }

    #[test]
    fn select_without_point_clears_selection() {
        let event: ToolsEvent =
            serde_json::from_str(r#"{"event": "select_cp", "point_id": null}"#).expect("select");
        assert_eq!(event, ToolsEvent::SelectPoint { point_id: None });
    }

    #[test]
    fn view_updates_are_tagged() {
        let update = ViewUpdate::ShowImage {
            shot_id: ShotId::from("s3"),
        };
        let value = serde_json::to_value(&update).expect("json");
        assert_eq!(value["type"], "show_image");
        assert_eq!(value["payload"]["shot_id"], "s3");
    }

    #[test]
    fn error_updates_compare_by_code_and_message() {
        let update = ViewUpdate::Error(ApiError::new(
            crate::error::ErrorCode::Validation,
            "invalid event",
        ));
        let json = serde_json::to_string(&update).expect("json");
        let decoded: ViewUpdate = serde_json::from_str(&json).expect("decode");
        assert_eq!(decoded, update);
        assert_ne!(
            decoded,
            ViewUpdate::Error(ApiError::internal("invalid event"))
        );
    }
}
