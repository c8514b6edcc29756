use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::PlayerError;
use crate::item::Item;
use crate::session::{Action, PlayerCommand, PlayerSession, SessionId};

/// The controller's grip on the player that is currently running.
///
/// Every command goes through [`PlayerHandle::execute`], which makes "is there
/// still a player to talk to" a single check.  Once the session reports itself
/// dead the handle stops forwarding anything.
pub struct PlayerHandle {
    id: SessionId,
    item: Item,
    session: Arc<dyn PlayerSession>,
    alive: AtomicBool,
}

impl PlayerHandle {
    pub fn new(id: SessionId, item: Item, session: Arc<dyn PlayerSession>) -> Self {
        Self {
            id,
            item,
            session,
            alive: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn item(&self) -> &Item {
        &self.item
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Forward `command`.  Returns true only when the player accepted it.
    pub async fn execute(&self, command: PlayerCommand) -> bool {
        if !self.is_alive() {
            debug!("player {}: dropping {:?}, session is dead", self.id, command);
            return false;
        }
        debug!("player {}: executing {:?}", self.id, command);
        match self.session.execute(command).await {
            Ok(()) => true,
            Err(PlayerError::SessionDead) => {
                warn!("player {}: session died, {:?} not delivered", self.id, command);
                self.alive.store(false, Ordering::SeqCst);
                false
            }
            Err(e) => {
                warn!("player {}: {:?} failed: {}", self.id, command, e);
                false
            }
        }
    }

    pub async fn stop(&self) -> bool {
        self.execute(PlayerCommand::Stop).await
    }

    pub async fn play_pause(&self) -> bool {
        self.execute(PlayerCommand::PlayPause).await
    }

    pub async fn show_subtitles(&self) -> bool {
        self.execute(PlayerCommand::ShowSubtitles).await
    }

    pub async fn hide_subtitles(&self) -> bool {
        self.execute(PlayerCommand::HideSubtitles).await
    }

    pub async fn seek(&self, seconds: f64) -> bool {
        self.execute(PlayerCommand::Seek(seconds)).await
    }

    pub async fn set_volume(&self, volume: f32) -> bool {
        self.execute(PlayerCommand::SetVolume(volume)).await
    }

    pub async fn action(&self, action: Action) -> bool {
        self.execute(PlayerCommand::Action(action)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Accepts commands until it is told it died.
    #[derive(Default)]
    struct ScriptedSession {
        received: Mutex<Vec<PlayerCommand>>,
        dead: AtomicBool,
        flaky: AtomicBool,
    }

    #[async_trait]
    impl PlayerSession for ScriptedSession {
        async fn execute(&self, command: PlayerCommand) -> crate::Result<()> {
            if self.dead.load(Ordering::SeqCst) {
                return Err(PlayerError::SessionDead);
            }
            if self.flaky.load(Ordering::SeqCst) {
                return Err(PlayerError::Transport("broken pipe".into()));
            }
            self.received.lock().unwrap().push(command);
            Ok(())
        }

        async fn ping(&self) -> crate::Result<()> {
            Ok(())
        }
    }

    fn handle_with(session: Arc<ScriptedSession>) -> PlayerHandle {
        PlayerHandle::new(SessionId(1), Item::new("a.mp4"), session)
    }

    #[tokio::test]
    async fn forwards_commands_while_alive() {
        let session = Arc::new(ScriptedSession::default());
        let handle = handle_with(session.clone());

        assert!(handle.seek(-30.0).await);
        assert!(handle.set_volume(1.5).await);
        assert!(handle.action(Action::IncreaseSubtitleDelay).await);
        assert_eq!(
            *session.received.lock().unwrap(),
            vec![
                PlayerCommand::Seek(-30.0),
                PlayerCommand::SetVolume(1.5),
                PlayerCommand::Action(Action::IncreaseSubtitleDelay),
            ]
        );
    }

    #[tokio::test]
    async fn transport_errors_are_reported_not_fatal() {
        let session = Arc::new(ScriptedSession::default());
        let handle = handle_with(session.clone());

        session.flaky.store(true, Ordering::SeqCst);
        assert!(!handle.play_pause().await);
        assert!(handle.is_alive());

        session.flaky.store(false, Ordering::SeqCst);
        assert!(handle.play_pause().await);
    }

    #[tokio::test]
    async fn dead_session_stops_forwarding() {
        let session = Arc::new(ScriptedSession::default());
        let handle = handle_with(session.clone());

        session.dead.store(true, Ordering::SeqCst);
        assert!(!handle.stop().await);
        assert!(!handle.is_alive());

        session.dead.store(false, Ordering::SeqCst);
        assert!(!handle.show_subtitles().await);
        assert!(session.received.lock().unwrap().is_empty());
    }
}
