/// mpv as the external player: one process per launched item, driven over its
/// JSON IPC socket with separated reader/writer tasks.
///
/// Architecture:
///
/// ```text
///   MpvLauncher::launch()
///         │
///         ├── waiter_task   ← owns the child; on exit (or kill) fires ExitNotifier
///         └── MpvSession    ← connects lazily to the IPC socket
///                 ├── writer_task   ← receives PendingRequest via mpsc, serialises → socket
///                 └── reader_task   ← reads JSON lines from socket
///                                        └── response (has request_id) → matched oneshot::Sender
/// ```
///
/// Platform notes:
/// - Unix:   Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use async_trait::async_trait;
use cast_player::session::volume_percent;
use cast_player::{
    Action, ExitNotifier, LaunchOptions, PlayerCommand, PlayerError, PlayerLauncher,
    PlayerSession, SessionId,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

/// Subtitle delay step for the delay actions, in seconds.
const SUB_DELAY_STEP: f64 = 0.25;

// ── global request-id counter ─────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

// ── internal channel types ────────────────────────────────────────────────────

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

// ── IPC handle ────────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.  Use `send()` to fire a command
/// and await the response.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(tokio::time::Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    #[cfg(unix)]
    async fn connect(socket: &str) -> anyhow::Result<Self> {
        let stream = UnixStream::connect(socket).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self::start_io_tasks(BufReader::new(read_half), write_half))
    }

    #[cfg(windows)]
    async fn connect(socket: &str) -> anyhow::Result<Self> {
        let pipe_path = format!(r"\\.\pipe\{}", socket);
        let pipe = ClientOptions::new().open(&pipe_path)?;
        let (read_half, write_half) = tokio::io::split(pipe);
        Ok(Self::start_io_tasks(BufReader::new(read_half), write_half))
    }

    fn start_io_tasks<R, W>(reader: BufReader<R>, writer: W) -> Self
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
        W: tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        // req_id → reply channel.  Shared between writer (inserts) and reader (resolves).
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

        tokio::spawn(writer_task(writer, cmd_rx, pending.clone()));
        tokio::spawn(reader_task(reader, pending));

        Self { tx: cmd_tx }
    }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                let mut map = pending.lock().await;
                for (_, tx) in map.drain() {
                    let _ = tx.send(Err(anyhow::anyhow!("mpv IPC connection closed")));
                }
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) else {
                    // Unsolicited event; the process waiter tracks lifetime.
                    debug!("mpv reader: event {}", trimmed);
                    continue;
                };

                let mut map = pending.lock().await;
                if let Some(tx) = map.remove(&req_id) {
                    let _ = tx.send(response_result(req_id, val));
                } else {
                    debug!("mpv reader: response for unknown req={}", req_id);
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                let mut map = pending.lock().await;
                for (_, tx) in map.drain() {
                    let _ = tx.send(Err(anyhow::anyhow!("mpv IPC read error: {}", e)));
                }
                break;
            }
        }
    }
}

fn response_result(req_id: u64, val: Value) -> anyhow::Result<Value> {
    if val["error"].as_str() == Some("success") {
        debug!("mpv reader: response req={} ok", req_id);
        Ok(val)
    } else {
        let err = val["error"].as_str().unwrap_or("unknown error").to_string();
        debug!("mpv reader: response req={} err={}", req_id, err);
        Err(anyhow::anyhow!("mpv error: {}", err))
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register reply channel before writing so reader can match it
        {
            let mut map = pending.lock().await;
            map.insert(req.req_id, req.reply);
        }
        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            let mut map = pending.lock().await;
            if let Some(tx) = map.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── command mapping ───────────────────────────────────────────────────────────

/// The IPC command for a controller command.
pub fn command_json(command: PlayerCommand) -> Value {
    match command {
        PlayerCommand::Stop => json!(["quit"]),
        PlayerCommand::PlayPause => json!(["cycle", "pause"]),
        PlayerCommand::ShowSubtitles => json!(["set_property", "sub-visibility", true]),
        PlayerCommand::HideSubtitles => json!(["set_property", "sub-visibility", false]),
        PlayerCommand::Seek(seconds) => json!(["seek", seconds, "relative"]),
        PlayerCommand::SetVolume(volume) => {
            json!(["set_property", "volume", volume_percent(volume)])
        }
        PlayerCommand::Action(Action::IncreaseSubtitleDelay) => {
            json!(["add", "sub-delay", SUB_DELAY_STEP])
        }
        PlayerCommand::Action(Action::DecreaseSubtitleDelay) => {
            json!(["add", "sub-delay", -SUB_DELAY_STEP])
        }
    }
}

/// Command line for one launch, not including the binary.
pub fn launch_args(path: &Path, session: SessionId, options: &LaunchOptions) -> Vec<String> {
    let mut args = vec![
        path.display().to_string(),
        cast_proto::platform::mpv_socket_arg(session.0),
        format!("--volume={}", options.volume_percent()),
        "--volume-max=200".to_string(),
    ];
    for track in &options.subtitles {
        args.push(format!("--sub-file={}", track.display()));
    }
    if !options.subtitles_visible {
        args.push("--sub-visibility=no".to_string());
    }
    if options.hide_background {
        args.push("--fullscreen".to_string());
        args.push("--background=color".to_string());
    }
    args
}

// ── session ───────────────────────────────────────────────────────────────────

/// One running mpv process.  Dropping the session kills the process.
pub struct MpvSession {
    id: SessionId,
    socket: String,
    alive: Arc<AtomicBool>,
    handle: Mutex<Option<MpvHandle>>,
    _kill: oneshot::Sender<()>,
}

impl MpvSession {
    /// The IPC handle, connecting on first use or after the connection broke.
    async fn handle(&self) -> Result<MpvHandle, PlayerError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(PlayerError::SessionDead);
        }
        let mut slot = self.handle.lock().await;
        if let Some(handle) = slot.as_ref().filter(|h| !h.is_closed()) {
            return Ok(handle.clone());
        }
        let handle = MpvHandle::connect(&self.socket)
            .await
            .map_err(|e| self.fault(e))?;
        info!("mpv {}: connected to IPC socket", self.id);
        *slot = Some(handle.clone());
        Ok(handle)
    }

    async fn send(&self, command: Value) -> Result<Value, PlayerError> {
        let handle = self.handle().await?;
        match handle.send(command).await {
            Ok(value) => Ok(value),
            Err(e) => {
                if handle.is_closed() {
                    *self.handle.lock().await = None;
                }
                Err(self.fault(e))
            }
        }
    }

    fn fault(&self, e: anyhow::Error) -> PlayerError {
        if self.alive.load(Ordering::SeqCst) {
            PlayerError::Transport(e.to_string())
        } else {
            PlayerError::SessionDead
        }
    }
}

#[async_trait]
impl PlayerSession for MpvSession {
    async fn execute(&self, command: PlayerCommand) -> cast_player::Result<()> {
        self.send(command_json(command)).await.map(|_| ())
    }

    async fn ping(&self) -> cast_player::Result<()> {
        self.send(json!(["get_property", "volume"])).await.map(|_| ())
    }
}

// ── launcher ──────────────────────────────────────────────────────────────────

pub struct MpvLauncher {
    binary: PathBuf,
}

impl MpvLauncher {
    pub fn new() -> anyhow::Result<Self> {
        let binary = cast_proto::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;
        info!("mpv: using {:?}", binary);
        Ok(Self::with_binary(binary))
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl PlayerLauncher for MpvLauncher {
    async fn launch(
        &self,
        session: SessionId,
        path: &Path,
        options: &LaunchOptions,
        on_exit: ExitNotifier,
    ) -> cast_player::Result<Arc<dyn PlayerSession>> {
        let socket = cast_proto::platform::mpv_socket_name(session.0);
        #[cfg(unix)]
        let _ = tokio::fs::remove_file(&socket).await;

        let args = launch_args(path, session, options);
        info!("mpv {}: spawning {:?}", session, args);
        let child = tokio::process::Command::new(&self.binary)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlayerError::Launch(format!("{}: {}", self.binary.display(), e)))?;

        let alive = Arc::new(AtomicBool::new(true));
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(waiter_task(
            child,
            kill_rx,
            alive.clone(),
            socket.clone(),
            on_exit,
        ));

        Ok(Arc::new(MpvSession {
            id: session,
            socket,
            alive,
            handle: Mutex::new(None),
            _kill: kill_tx,
        }))
    }
}

// ── waiter task ───────────────────────────────────────────────────────────────

/// Owns the child until it exits.  A fired or dropped `kill` ends it early.
async fn waiter_task(
    mut child: tokio::process::Child,
    kill: oneshot::Receiver<()>,
    alive: Arc<AtomicBool>,
    socket: String,
    on_exit: ExitNotifier,
) {
    let session = on_exit.session();
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill => {
            debug!("mpv {}: session released, killing process", session);
            if let Err(e) = child.kill().await {
                warn!("mpv {}: kill failed: {}", session, e);
            }
            child.wait().await
        }
    };
    alive.store(false, Ordering::SeqCst);

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            warn!("mpv {}: wait failed: {}", session, e);
            None
        }
    };
    info!("mpv {}: process exited with {:?}", session, code);

    #[cfg(unix)]
    let _ = tokio::fs::remove_file(&socket).await;
    #[cfg(not(unix))]
    let _ = socket;

    on_exit.notify(code);
}
