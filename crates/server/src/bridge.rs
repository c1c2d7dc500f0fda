//! The task that owns the [`SyncController`]. Handlers talk to it through
//! [`ControllerHandle`]; commands run one at a time, in arrival order.

use std::path::PathBuf;

use chrono::Utc;
use controller::{AnalysisOutcome, ControllerError, SyncController};
use shared::{
    domain::{PointId, ReconstructionOption, ViewId},
    error::{ApiError, ErrorCode},
    protocol::{SequenceEvent, SyncPayload, ToolsEvent},
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info};

const COMMAND_QUEUE_CAPACITY: usize = 128;

pub type Reply<T> = oneshot::Sender<T>;
type Outcome<T> = Result<T, ControllerError>;

pub enum ControllerCommand {
    State {
        reply: Reply<SyncPayload>,
    },
    Reconstructions {
        reply: Reply<Vec<ReconstructionOption>>,
    },
    AddPoint {
        reply: Reply<PointId>,
    },
    RemoveSelected {
        reply: Reply<Option<PointId>>,
    },
    Select {
        point_id: Option<PointId>,
        reply: Reply<Outcome<()>>,
    },
    LoadPoints {
        path: Option<PathBuf>,
        reply: Reply<Outcome<PathBuf>>,
    },
    SavePoints {
        path: Option<PathBuf>,
        reply: Reply<Outcome<Vec<PathBuf>>>,
    },
    RunAnalysis {
        rec_a: usize,
        rec_b: Option<usize>,
        rigid: bool,
        covariance: bool,
        reply: Reply<Outcome<AnalysisOutcome>>,
    },
    AnalyzeRigid {
        reply: Reply<Outcome<AnalysisOutcome>>,
    },
    AnalyzeFlex {
        reply: Reply<Outcome<AnalysisOutcome>>,
    },
    JumpToSelected {
        reply: Reply<()>,
    },
    JumpToWorst {
        reply: Reply<Option<PointId>>,
    },
    RefocusOverhead {
        latitude: f64,
        longitude: f64,
        reply: Reply<()>,
    },
    Tools {
        event: ToolsEvent,
        reply: Reply<Outcome<()>>,
    },
    Sequence {
        view_id: ViewId,
        event: SequenceEvent,
        reply: Reply<Outcome<()>>,
    },
    Resync {
        view_id: ViewId,
        reply: Reply<Outcome<()>>,
    },
}

impl ControllerCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::State { .. } => "state",
            Self::Reconstructions { .. } => "reconstructions",
            Self::AddPoint { .. } => "add_point",
            Self::RemoveSelected { .. } => "remove_selected",
            Self::Select { .. } => "select",
            Self::LoadPoints { .. } => "load_points",
            Self::SavePoints { .. } => "save_points",
            Self::RunAnalysis { .. } => "run_analysis",
            Self::AnalyzeRigid { .. } => "analyze_rigid",
            Self::AnalyzeFlex { .. } => "analyze_flex",
            Self::JumpToSelected { .. } => "jump_to_selected",
            Self::JumpToWorst { .. } => "jump_to_worst",
            Self::RefocusOverhead { .. } => "refocus_overhead",
            Self::Tools { .. } => "tools_event",
            Self::Sequence { .. } => "sequence_event",
            Self::Resync { .. } => "resync",
        }
    }
}

#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<ControllerCommand>,
}

impl ControllerHandle {
    /// Queues a command built around a fresh reply channel and waits for the answer.
    pub async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> ControllerCommand,
    ) -> Result<T, ApiError> {
        let (reply, answer) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| controller_unavailable())?;
        answer.await.map_err(|_| controller_unavailable())
    }
}

fn controller_unavailable() -> ApiError {
    ApiError::new(ErrorCode::Unavailable, "session controller is not running")
}

pub fn spawn_controller(controller: SyncController) -> (ControllerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let task = tokio::spawn(run(controller, rx));
    (ControllerHandle { tx }, task)
}

async fn run(mut controller: SyncController, mut rx: mpsc::Receiver<ControllerCommand>) {
    while let Some(command) = rx.recv().await {
        debug!(command = command.name(), "controller command");
        execute(&mut controller, command).await;
    }
    info!("controller task stopped");
}

async fn execute(controller: &mut SyncController, command: ControllerCommand) {
    match command {
        ControllerCommand::State { reply } => {
            let _ = reply.send(controller.sync_payload());
        }
        ControllerCommand::Reconstructions { reply } => {
            let _ = reply.send(controller.reconstruction_options().to_vec());
        }
        ControllerCommand::AddPoint { reply } => {
            let _ = reply.send(controller.add_point());
        }
        ControllerCommand::RemoveSelected { reply } => {
            let _ = reply.send(controller.remove_point());
        }
        ControllerCommand::Select { point_id, reply } => {
            let _ = reply.send(controller.select_point(point_id));
        }
        ControllerCommand::LoadPoints { path, reply } => {
            let path = path.unwrap_or_else(|| controller.storage().points_path());
            let result = controller.load_points(&path).map(|()| path);
            let _ = reply.send(result);
        }
        ControllerCommand::SavePoints { path, reply } => {
            let path = path.unwrap_or_else(|| controller.storage().points_path());
            let _ = reply.send(controller.save_points(&path));
        }
        ControllerCommand::RunAnalysis {
            rec_a,
            rec_b,
            rigid,
            covariance,
            reply,
        } => {
            let result = controller
                .run_analysis(rec_a, rec_b, rigid, covariance, Utc::now())
                .await;
            let _ = reply.send(result);
        }
        ControllerCommand::AnalyzeRigid { reply } => {
            let _ = reply.send(controller.analyze_rigid(Utc::now()).await);
        }
        ControllerCommand::AnalyzeFlex { reply } => {
            let _ = reply.send(controller.analyze_flex(Utc::now()).await);
        }
        ControllerCommand::JumpToSelected { reply } => {
            controller.jump_to_selected();
            let _ = reply.send(());
        }
        ControllerCommand::JumpToWorst { reply } => {
            let _ = reply.send(controller.jump_to_worst());
        }
        ControllerCommand::RefocusOverhead {
            latitude,
            longitude,
            reply,
        } => {
            controller.refocus_overhead_views(latitude, longitude);
            let _ = reply.send(());
        }
        ControllerCommand::Tools { event, reply } => {
            let _ = reply.send(controller.handle_tools_event(event));
        }
        ControllerCommand::Sequence {
            view_id,
            event,
            reply,
        } => {
            let result = match event {
                SequenceEvent::ImageShown { shot_id } => {
                    controller.note_image_shown(view_id, shot_id)
                }
                SequenceEvent::TrackToggled { enabled } => {
                    controller.on_tracking_toggled(view_id, enabled)
                }
            };
            let _ = reply.send(result);
        }
        ControllerCommand::Resync { view_id, reply } => {
            let _ = reply.send(controller.resync_view(view_id));
        }
    }
}
