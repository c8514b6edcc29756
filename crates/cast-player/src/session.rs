//! Contracts for the collaborators the controller drives: the external
//! player launcher, a live player session, and the media store.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::controller::WorkerEvent;
use crate::error::Result;

/// Identifies one launch of the external player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Player key actions that have no dedicated command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    IncreaseSubtitleDelay,
    DecreaseSubtitleDelay,
}

/// Everything the controller can ask of a running player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerCommand {
    Stop,
    PlayPause,
    ShowSubtitles,
    HideSubtitles,
    /// Relative seek in seconds; negative goes back.
    Seek(f64),
    /// Volume on the controller scale, 0.0 ..= 2.0.
    SetVolume(f32),
    Action(Action),
}

/// Options a player is started with.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchOptions {
    /// Controller scale, 0.0 ..= 2.0 with 1.0 as unity gain.
    pub volume: f32,
    pub subtitles: Vec<PathBuf>,
    pub subtitles_visible: bool,
    pub hide_background: bool,
}

impl LaunchOptions {
    /// Volume as a percentage of unity gain (1.0 → 100).
    pub fn volume_percent(&self) -> i64 {
        volume_percent(self.volume)
    }
}

pub fn volume_percent(volume: f32) -> i64 {
    (volume.clamp(0.0, 2.0) * 100.0).round() as i64
}

/// Hands a player's exit back to the controller.  Consumed on use, so a
/// session can report its exit at most once.
#[derive(Debug)]
pub struct ExitNotifier {
    session: SessionId,
    tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl ExitNotifier {
    pub(crate) fn new(session: SessionId, tx: mpsc::UnboundedSender<WorkerEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Safe to call from any thread or task, including non-runtime threads.
    pub fn notify(self, code: Option<i32>) {
        let event = WorkerEvent::PlayerExited {
            session: self.session,
            code,
        };
        if self.tx.send(event).is_err() {
            debug!("player {} exited after the controller shut down", self.session);
        }
    }
}

/// A live external player.
#[async_trait]
pub trait PlayerSession: Send + Sync {
    async fn execute(&self, command: PlayerCommand) -> Result<()>;

    /// Readiness probe for the control channel.  Transport errors mean "not
    /// yet"; `SessionDead` means "never".
    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait PlayerLauncher: Send + Sync {
    /// Start the player on `path`.  The launcher must call `on_exit` exactly
    /// once when that player goes away.
    async fn launch(
        &self,
        session: SessionId,
        path: &Path,
        options: &LaunchOptions,
        on_exit: ExitNotifier,
    ) -> Result<Arc<dyn PlayerSession>>;
}

/// Existence check run right before an item is launched.
pub trait MediaStore: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
}

/// The local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStore;

impl MediaStore for LocalStore {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}
