use std::{collections::BTreeMap, net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use clap::Parser;
use controller::{ProcessAnalysisRunner, RandomShotChooser, SyncController, ViewRegistry};
use shared::{
    domain::{ShotId, ViewId, ViewKind},
    error::{ApiError, ErrorCode},
    protocol::{SequenceEvent, SyncPayload, ToolsEvent, ViewUpdate},
};
use storage::Storage;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod bridge;
mod config;
mod views;

use api::{
    HttpError, LoadedResponse, PointResponse, PointsFileRequest, ReconstructionEntry,
    RefocusRequest, RunAnalysisRequest, SavedResponse, SelectRequest, ViewSummary,
};
use app_state::{AppState, ViewEndpoint};
use bridge::{spawn_controller, ControllerCommand, Reply};
use config::{load_settings, Settings, DEFAULT_CONFIG_FILE};
use views::{view_channel, OverheadView, SequenceView, ToolsView};

#[derive(Debug, Parser)]
#[command(name = "gcp-annotation-server", about = "Ground control point annotation session")]
struct Args {
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[arg(long)]
    project_path: Option<PathBuf>,
    #[arg(long)]
    bind: Option<String>,
    #[arg(long)]
    analysis_program: Option<String>,
    #[arg(long)]
    analysis_script: Option<PathBuf>,
    /// Extra overhead map views, by name.
    #[arg(long = "overhead")]
    overhead_views: Vec<String>,
}

impl Args {
    fn apply(self, mut settings: Settings) -> Settings {
        if let Some(v) = self.project_path {
            settings.project_path = v;
        }
        if let Some(v) = self.bind {
            settings.bind_addr = v;
        }
        if let Some(v) = self.analysis_program {
            settings.analysis_program = v;
        }
        if let Some(v) = self.analysis_script {
            settings.analysis_script = Some(v);
        }
        settings.overhead_views.extend(self.overhead_views);
        settings
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = load_settings(&args.config);
    let settings = args.apply(settings);

    let storage = Storage::new(&settings.project_path);
    let sequences = if settings.sequences.is_empty() {
        storage.load_sequences()?
    } else {
        settings.sequences.clone()
    };
    let (registry, endpoints) = build_views(&sequences, &settings.overhead_views);

    let runner =
        ProcessAnalysisRunner::new(&settings.analysis_program, settings.analysis_script.clone());
    let mut controller = SyncController::new(
        storage,
        registry,
        Box::new(runner),
        Box::new(RandomShotChooser),
    );
    controller.load_initial_state()?;

    let (handle, _controller_task) = spawn_controller(controller);
    let state = AppState {
        controller: handle,
        views: endpoints,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, project = %settings.project_path.display(), "annotation server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Registers the tools panel, one view per sequence and the overhead maps,
/// in that order, each with its own push channel.
fn build_views(
    sequences: &BTreeMap<String, Vec<ShotId>>,
    overhead_views: &[String],
) -> (ViewRegistry, Vec<ViewEndpoint>) {
    let mut registry = ViewRegistry::new();
    let mut endpoints = Vec::new();

    let channel = view_channel();
    let view_id = registry.register(Box::new(ToolsView::new(channel.clone())));
    endpoints.push(endpoint(view_id, ViewKind::Tools, "tools", channel));

    for (name, shots) in sequences {
        let channel = view_channel();
        let view = SequenceView::new(name.clone(), shots.clone(), channel.clone());
        let view_id = registry.register(Box::new(view));
        endpoints.push(endpoint(view_id, ViewKind::Sequence, name, channel));
    }

    for name in overhead_views {
        let channel = view_channel();
        let view_id = registry.register(Box::new(OverheadView::new(name.clone(), channel.clone())));
        endpoints.push(endpoint(view_id, ViewKind::Overhead, name, channel));
    }

    info!(views = registry.len(), "views registered");
    (registry, endpoints)
}

fn endpoint(
    view_id: ViewId,
    kind: ViewKind,
    name: &str,
    channel: views::ViewChannel,
) -> ViewEndpoint {
    ViewEndpoint {
        summary: ViewSummary {
            view_id,
            kind,
            name: name.to_string(),
        },
        channel,
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/views", get(list_views))
        .route("/state", get(session_state))
        .route("/reconstructions", get(reconstructions))
        .route("/points", post(add_point))
        .route("/points/selected", axum::routing::delete(remove_selected))
        .route("/points/load", post(load_points))
        .route("/points/save", post(save_points))
        .route("/selection", put(select_point))
        .route("/analysis", post(run_analysis))
        .route("/analysis/rigid", post(analyze_rigid))
        .route("/analysis/flex", post(analyze_flex))
        .route("/jump/selected", post(jump_to_selected))
        .route("/jump/worst", post(jump_to_worst))
        .route("/overhead/refocus", post(refocus_overhead))
        .route("/ws/:view_id", get(ws_handler))
        .with_state(state)
}

async fn ask<T>(
    state: &AppState,
    command: impl FnOnce(Reply<T>) -> ControllerCommand,
) -> Result<T, HttpError> {
    state
        .controller
        .request(command)
        .await
        .map_err(api::unavailable)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_views(State(state): State<Arc<AppState>>) -> Json<Vec<ViewSummary>> {
    Json(
        state
            .views
            .iter()
            .map(|endpoint| endpoint.summary.clone())
            .collect(),
    )
}

async fn session_state(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SyncPayload>, HttpError> {
    let payload = ask(&state, |reply| ControllerCommand::State { reply }).await?;
    Ok(Json(payload))
}

async fn reconstructions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ReconstructionEntry>>, HttpError> {
    let options = ask(&state, |reply| ControllerCommand::Reconstructions { reply }).await?;
    Ok(Json(options.into_iter().map(ReconstructionEntry::from).collect()))
}

async fn add_point(State(state): State<Arc<AppState>>) -> Result<Json<PointResponse>, HttpError> {
    let point_id = ask(&state, |reply| ControllerCommand::AddPoint { reply }).await?;
    Ok(Json(PointResponse {
        point_id: Some(point_id),
    }))
}

async fn remove_selected(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PointResponse>, HttpError> {
    let point_id = ask(&state, |reply| ControllerCommand::RemoveSelected { reply }).await?;
    Ok(Json(PointResponse { point_id }))
}

async fn select_point(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SelectRequest>,
) -> Result<StatusCode, HttpError> {
    ask(&state, |reply| ControllerCommand::Select {
        point_id: req.point_id,
        reply,
    })
    .await?
    .map_err(api::controller_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn load_points(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PointsFileRequest>,
) -> Result<Json<LoadedResponse>, HttpError> {
    let path = ask(&state, |reply| ControllerCommand::LoadPoints {
        path: req.path,
        reply,
    })
    .await?
    .map_err(api::controller_error)?;
    Ok(Json(LoadedResponse { path }))
}

async fn save_points(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PointsFileRequest>,
) -> Result<Json<SavedResponse>, HttpError> {
    let written = ask(&state, |reply| ControllerCommand::SavePoints {
        path: req.path,
        reply,
    })
    .await?
    .map_err(api::controller_error)?;
    Ok(Json(SavedResponse { written }))
}

async fn run_analysis(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RunAnalysisRequest>,
) -> Result<Json<api::AnalysisResponse>, HttpError> {
    let outcome = ask(&state, |reply| ControllerCommand::RunAnalysis {
        rec_a: req.rec_a,
        rec_b: req.rec_b,
        rigid: req.rigid,
        covariance: req.covariance,
        reply,
    })
    .await?
    .map_err(api::controller_error)?;
    api::analysis_response(outcome)
}

async fn analyze_rigid(
    State(state): State<Arc<AppState>>,
) -> Result<Json<api::AnalysisResponse>, HttpError> {
    let outcome = ask(&state, |reply| ControllerCommand::AnalyzeRigid { reply })
        .await?
        .map_err(api::controller_error)?;
    api::analysis_response(outcome)
}

async fn analyze_flex(
    State(state): State<Arc<AppState>>,
) -> Result<Json<api::AnalysisResponse>, HttpError> {
    let outcome = ask(&state, |reply| ControllerCommand::AnalyzeFlex { reply })
        .await?
        .map_err(api::controller_error)?;
    api::analysis_response(outcome)
}

async fn jump_to_selected(State(state): State<Arc<AppState>>) -> Result<StatusCode, HttpError> {
    ask(&state, |reply| ControllerCommand::JumpToSelected { reply }).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn jump_to_worst(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PointResponse>, HttpError> {
    let point_id = ask(&state, |reply| ControllerCommand::JumpToWorst { reply }).await?;
    Ok(Json(PointResponse { point_id }))
}

async fn refocus_overhead(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefocusRequest>,
) -> Result<StatusCode, HttpError> {
    ask(&state, |reply| ControllerCommand::RefocusOverhead {
        latitude: req.latitude,
        longitude: req.longitude,
        reply,
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(view_id): Path<usize>,
) -> Result<impl IntoResponse, HttpError> {
    let view_id = ViewId(view_id);
    if state.view(view_id).is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiError::new(ErrorCode::NotFound, "view not found")),
        ));
    }
    Ok(ws.on_upgrade(move |socket| ws_connection(state, socket, view_id)))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket, view_id: ViewId) {
    use futures::{SinkExt, StreamExt};

    let Some(endpoint) = state.view(view_id) else {
        return;
    };
    let kind = endpoint.summary.kind;
    let channel = endpoint.channel.clone();

    let (mut sender, mut receiver) = socket.split();
    let mut updates = channel.subscribe();

    let send_task = tokio::spawn(async move {
        loop {
            let update = match updates.recv().await {
                Ok(update) => update,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(?view_id, skipped, "view connection fell behind");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&update) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // subscribed first, so the resync lands on this connection
    match state
        .controller
        .request(|reply| ControllerCommand::Resync { view_id, reply })
        .await
    {
        Ok(Ok(())) => info!(?view_id, ?kind, "view connected"),
        Ok(Err(error)) => warn!(?view_id, %error, "resync failed"),
        Err(error) => warn!(?view_id, %error, "resync failed"),
    }

    while let Some(Ok(message)) = receiver.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        if let Err(error) = handle_frame(&state, view_id, kind, &text).await {
            let _ = channel.send(ViewUpdate::Error(error));
        }
    }

    send_task.abort();
    debug!(?view_id, "view disconnected");
}

async fn handle_frame(
    state: &AppState,
    view_id: ViewId,
    kind: ViewKind,
    text: &str,
) -> Result<(), ApiError> {
    let result = match kind {
        ViewKind::Tools => {
            let event: ToolsEvent = serde_json::from_str(text).map_err(invalid_frame)?;
            state
                .controller
                .request(|reply| ControllerCommand::Tools { event, reply })
                .await?
        }
        ViewKind::Sequence => {
            let event: SequenceEvent = serde_json::from_str(text).map_err(invalid_frame)?;
            debug!(?view_id, ?event, "sequence view event");
            state
                .controller
                .request(|reply| ControllerCommand::Sequence {
                    view_id,
                    event,
                    reply,
                })
                .await?
        }
        ViewKind::Overhead => {
            debug!(?view_id, "ignoring frame from overhead view");
            return Ok(());
        }
    };
    result.map_err(api::api_error)
}

fn invalid_frame(error: serde_json::Error) -> ApiError {
    ApiError::new(ErrorCode::Validation, format!("invalid event: {error}"))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
