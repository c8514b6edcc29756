//! Fakes shared by the daemon's unit tests.

use async_trait::async_trait;
use cast_player::{
    ExitNotifier, LaunchOptions, MediaStore, PlaybackController, PlayerLauncher, PlayerSession,
    SessionId,
};
use cast_proto::config::PlayerConfig;
use std::path::Path;
use std::sync::Arc;

/// Fails every launch.
pub struct NoPlayer;

#[async_trait]
impl PlayerLauncher for NoPlayer {
    async fn launch(
        &self,
        _session: SessionId,
        path: &Path,
        _options: &LaunchOptions,
        _on_exit: ExitNotifier,
    ) -> cast_player::Result<Arc<dyn PlayerSession>> {
        Err(cast_player::PlayerError::Launch(path.display().to_string()))
    }
}

/// A store in which no media exists.
pub struct Nothing;

impl MediaStore for Nothing {
    fn exists(&self, _path: &Path) -> bool {
        false
    }
}

/// A controller that can never start playback.
pub fn idle_controller() -> PlaybackController {
    PlaybackController::new(PlayerConfig::default(), Arc::new(NoPlayer), Arc::new(Nothing))
}
