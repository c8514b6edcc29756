use crate::dispatch;
use crate::BroadcastMessage;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use cast_player::PlaybackController;
use cast_proto::protocol::{Broadcast, Command, ItemRequest};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    controller: Arc<PlaybackController>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
}

#[derive(Deserialize)]
struct QueueBody {
    #[serde(flatten)]
    item: ItemRequest,
    #[serde(default)]
    first: bool,
}

#[derive(Deserialize)]
struct StopBody {
    #[serde(default)]
    stop_browsing: bool,
}

#[derive(Deserialize)]
struct SeekBody {
    #[serde(default = "default_forward")]
    forward: bool,
    #[serde(default)]
    long: bool,
}

fn default_forward() -> bool {
    true
}

type Reply = Result<Json<Broadcast>, (StatusCode, Json<Broadcast>)>;

pub fn router(controller: Arc<PlaybackController>, broadcast_tx: broadcast::Sender<BroadcastMessage>) -> Router {
    let app_state = HttpState {
        controller,
        broadcast_tx,
    };

    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/queue", get(get_queue).post(post_queue))
        .route("/api/history", get(get_history))
        .route("/api/play", post(play))
        .route("/api/stop", post(stop))
        .route("/api/next", post(next))
        .route("/api/prev", post(prev))
        .route("/api/pause", post(pause))
        .route("/api/subtitles/toggle", post(toggle_subtitles))
        .route("/api/subtitles/delay/:direction", post(subtitle_delay))
        .route("/api/volume/:direction", post(volume))
        .route("/api/seek", post(seek))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    controller: Arc<PlaybackController>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(controller, broadcast_tx);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

/// Run `command` and turn the controller's answer into an HTTP reply.
async fn run(state: &HttpState, command: Command) -> Reply {
    info!("HTTP API: {:?}", command);
    let reply = dispatch::apply(&state.controller, command).await;
    match reply {
        Broadcast::Error { .. } => Err((StatusCode::SERVICE_UNAVAILABLE, Json(reply))),
        Broadcast::State { .. } => {
            let _ = state.broadcast_tx.send(BroadcastMessage::StateUpdated);
            Ok(Json(reply))
        }
        _ => Ok(Json(reply)),
    }
}

fn parse_direction(direction: &str) -> Result<bool, (StatusCode, Json<Broadcast>)> {
    match direction {
        "up" => Ok(true),
        "down" => Ok(false),
        other => Err((
            StatusCode::BAD_REQUEST,
            Json(Broadcast::Error {
                message: format!("direction must be 'up' or 'down', got '{}'", other),
            }),
        )),
    }
}

/// A blank body means no argument; anything else has to be valid JSON.
fn optional_body<T: DeserializeOwned>(body: &[u8]) -> Result<Option<T>, (StatusCode, Json<Broadcast>)> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body).map(Some).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(Broadcast::Error {
                message: format!("invalid request body: {}", e),
            }),
        )
    })
}

async fn get_state(State(state): State<HttpState>) -> Reply {
    run(&state, Command::GetState).await
}

async fn get_queue(State(state): State<HttpState>) -> Reply {
    run(&state, Command::ListQueue).await
}

async fn get_history(State(state): State<HttpState>) -> Reply {
    run(&state, Command::ListHistory).await
}

async fn post_queue(State(state): State<HttpState>, Json(body): Json<QueueBody>) -> Reply {
    let command = Command::Queue {
        item: body.item,
        first: body.first,
    };
    run(&state, command).await
}

async fn play(State(state): State<HttpState>, body: Bytes) -> Reply {
    let item = optional_body::<ItemRequest>(&body)?;
    run(&state, Command::Play { item }).await
}

async fn stop(State(state): State<HttpState>, body: Bytes) -> Reply {
    let stop_browsing = optional_body::<StopBody>(&body)?
        .map(|body| body.stop_browsing)
        .unwrap_or(false);
    run(&state, Command::Stop { stop_browsing }).await
}

async fn next(State(state): State<HttpState>) -> Reply {
    run(&state, Command::Next).await
}

async fn prev(State(state): State<HttpState>) -> Reply {
    run(&state, Command::Prev).await
}

async fn pause(State(state): State<HttpState>) -> Reply {
    run(&state, Command::PlayPause).await
}

async fn toggle_subtitles(State(state): State<HttpState>) -> Reply {
    run(&state, Command::ToggleSubtitle).await
}

async fn subtitle_delay(State(state): State<HttpState>, Path(direction): Path<String>) -> Reply {
    let command = if parse_direction(&direction)? {
        Command::IncreaseSubtitleDelay
    } else {
        Command::DecreaseSubtitleDelay
    };
    run(&state, command).await
}

async fn volume(State(state): State<HttpState>, Path(direction): Path<String>) -> Reply {
    let increase = parse_direction(&direction)?;
    run(&state, Command::ChangeVolume { increase }).await
}

async fn seek(State(state): State<HttpState>, Json(body): Json<SeekBody>) -> Reply {
    let command = Command::Seek {
        forward: body.forward,
        long: body.long,
    };
    run(&state, command).await
}
