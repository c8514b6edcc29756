#![allow(dead_code)]

use async_trait::async_trait;
use cast_player::sync::{poll_until, SyncPolicy};
use cast_player::{
    ExitNotifier, Item, LaunchOptions, MediaStore, PlaybackController, PlayerCommand,
    PlayerError, PlayerLauncher, PlayerSession, SessionId, SubtitleFinder,
};
use cast_proto::config::PlayerConfig;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub fn test_config() -> PlayerConfig {
    PlayerConfig {
        default_volume: 1.0,
        hide_background: false,
        loop_last: false,
        stop_timeout_ms: 1000,
        ready_timeout_ms: 200,
        poll_interval_ms: 5,
    }
}

pub struct NoSubtitles;

impl SubtitleFinder for NoSubtitles {
    fn find(&self, _media: &Path) -> Vec<PathBuf> {
        Vec::new()
    }
}

pub fn media_path(name: &str) -> PathBuf {
    PathBuf::from(format!("/media/{name}.mkv"))
}

/// A resolved item at `/media/<name>.mkv`.
pub fn item(name: &str) -> Item {
    Item::new(name).with_resolved_path(media_path(name), &NoSubtitles)
}

pub fn playlist_item(name: &str, playlist: &str) -> Item {
    item(name).with_playlist(playlist)
}

pub fn sources(items: &[Item]) -> Vec<String> {
    items.iter().map(|i| i.source().to_string()).collect()
}

// ── media store ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    paths: Mutex<HashSet<PathBuf>>,
}

impl MemoryStore {
    pub fn with(names: &[&str]) -> Arc<Self> {
        let store = Self::default();
        for name in names {
            store.insert(name);
        }
        Arc::new(store)
    }

    pub fn insert(&self, name: &str) {
        self.paths.lock().unwrap().insert(media_path(name));
    }

    pub fn remove(&self, name: &str) {
        self.paths.lock().unwrap().remove(&media_path(name));
    }
}

impl MediaStore for MemoryStore {
    fn exists(&self, path: &Path) -> bool {
        self.paths.lock().unwrap().contains(path)
    }
}

// ── player ────────────────────────────────────────────────────────────────────

/// How a fake player's control channel behaves after launch.
#[derive(Debug, Clone, Copy, Default)]
pub enum ControlChannel {
    /// Up as soon as the player is.
    #[default]
    Ready,
    /// Refuses pings and commands for this long.
    ReadyAfter(Duration),
    /// Never comes up; every call is a transport error.
    Unreachable,
    /// Reports the session dead on every ping.
    Dead,
}

/// Records every command; exits when told to stop unless `ignore_stop` is set.
pub struct FakeSession {
    pub id: SessionId,
    pub path: PathBuf,
    pub options: LaunchOptions,
    commands: Mutex<Vec<PlayerCommand>>,
    on_exit: Mutex<Option<ExitNotifier>>,
    ignore_stop: bool,
    refuse: AtomicBool,
    channel: ControlChannel,
    launched_at: Instant,
    pings: AtomicUsize,
}

impl FakeSession {
    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    fn channel_up(&self) -> bool {
        match self.channel {
            ControlChannel::Ready => true,
            ControlChannel::ReadyAfter(delay) => self.launched_at.elapsed() >= delay,
            ControlChannel::Unreachable | ControlChannel::Dead => false,
        }
    }

    pub fn commands(&self) -> Vec<PlayerCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn stop_count(&self) -> usize {
        self.commands()
            .iter()
            .filter(|c| **c == PlayerCommand::Stop)
            .count()
    }

    /// Make every further command fail with a transport error.
    pub fn refuse_commands(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn has_exited(&self) -> bool {
        self.on_exit.lock().unwrap().is_none()
    }

    /// Simulate the media reaching its end.  The notification comes from a
    /// foreign thread, the way a transport callback would deliver it.
    pub fn finish(&self) {
        let notifier = self.on_exit.lock().unwrap().take();
        if let Some(notifier) = notifier {
            std::thread::spawn(move || notifier.notify(Some(0)))
                .join()
                .unwrap();
        }
    }
}

#[async_trait]
impl PlayerSession for FakeSession {
    async fn execute(&self, command: PlayerCommand) -> cast_player::Result<()> {
        if self.has_exited() {
            return Err(PlayerError::SessionDead);
        }
        if self.refuse.load(Ordering::SeqCst) || !self.channel_up() {
            return Err(PlayerError::Transport("refused".into()));
        }
        self.commands.lock().unwrap().push(command);
        if command == PlayerCommand::Stop && !self.ignore_stop {
            if let Some(notifier) = self.on_exit.lock().unwrap().take() {
                notifier.notify(None);
            }
        }
        Ok(())
    }

    async fn ping(&self) -> cast_player::Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        match self.channel {
            ControlChannel::Dead => Err(PlayerError::SessionDead),
            _ if self.channel_up() => Ok(()),
            _ => Err(PlayerError::Transport("control channel not up".into())),
        }
    }
}

#[derive(Default)]
pub struct FakeLauncher {
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    failing: Mutex<HashSet<PathBuf>>,
    ignore_stop: AtomicBool,
    channel: Mutex<ControlChannel>,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Players launched from now on keep running when told to stop.
    pub fn ignore_stop(&self) {
        self.ignore_stop.store(true, Ordering::SeqCst);
    }

    /// Control channel behaviour of players launched from now on.
    pub fn control_channel(&self, channel: ControlChannel) {
        *self.channel.lock().unwrap() = channel;
    }

    pub fn succeed_on(&self, name: &str) {
        self.failing.lock().unwrap().remove(&media_path(name));
    }

    pub fn fail_on(&self, name: &str) {
        self.failing.lock().unwrap().insert(media_path(name));
    }

    pub fn launch_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn session(&self, n: usize) -> Arc<FakeSession> {
        Arc::clone(&self.sessions.lock().unwrap()[n])
    }

    pub fn last(&self) -> Arc<FakeSession> {
        let sessions = self.sessions.lock().unwrap();
        Arc::clone(sessions.last().expect("nothing launched"))
    }

    /// Launched paths, oldest first, as item names.
    pub fn launched(&self) -> Vec<String> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .map(|s| {
                s.path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
            .collect()
    }
}

#[async_trait]
impl PlayerLauncher for FakeLauncher {
    async fn launch(
        &self,
        session: SessionId,
        path: &Path,
        options: &LaunchOptions,
        on_exit: ExitNotifier,
    ) -> cast_player::Result<Arc<dyn PlayerSession>> {
        if self.failing.lock().unwrap().contains(path) {
            return Err(PlayerError::Launch(format!("cannot open {}", path.display())));
        }
        assert_eq!(on_exit.session(), session);
        let fake = Arc::new(FakeSession {
            id: session,
            path: path.to_path_buf(),
            options: options.clone(),
            commands: Mutex::new(Vec::new()),
            on_exit: Mutex::new(Some(on_exit)),
            ignore_stop: self.ignore_stop.load(Ordering::SeqCst),
            refuse: AtomicBool::new(false),
            channel: *self.channel.lock().unwrap(),
            launched_at: Instant::now(),
            pings: AtomicUsize::new(0),
        });
        self.sessions.lock().unwrap().push(Arc::clone(&fake));
        Ok(fake)
    }
}

// ── waiting ───────────────────────────────────────────────────────────────────

fn patience() -> SyncPolicy {
    SyncPolicy::from_millis(2000, 5)
}

pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub async fn wait_for_launches(launcher: &FakeLauncher, count: usize) -> bool {
    poll_until(patience(), move || async move { launcher.launch_count() >= count }).await
}

pub async fn wait_for_idle(controller: &PlaybackController) -> bool {
    poll_until(patience(), move || async move { !controller.is_playing().await }).await
}

pub async fn wait_for_playing(controller: &PlaybackController, name: &str) -> bool {
    poll_until(patience(), move || async move {
        controller
            .now_playing()
            .await
            .map(|item| item.source() == name)
            .unwrap_or(false)
    })
    .await
}

pub struct Harness {
    pub controller: PlaybackController,
    pub launcher: Arc<FakeLauncher>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new(existing: &[&str]) -> Self {
        Self::with_config(test_config(), existing)
    }

    pub fn with_config(config: PlayerConfig, existing: &[&str]) -> Self {
        let launcher = FakeLauncher::new();
        let store = MemoryStore::with(existing);
        let controller = PlaybackController::new(
            config,
            Arc::clone(&launcher) as Arc<dyn PlayerLauncher>,
            Arc::clone(&store) as Arc<dyn MediaStore>,
        );
        Self {
            controller,
            launcher,
            store,
        }
    }

    /// Let the current player reach its end and wait for `next` (if any) to
    /// start playing.
    pub async fn finish_current(&self, next: Option<&str>) {
        let launched = self.launcher.launch_count();
        self.launcher.last().finish();
        match next {
            Some(name) => {
                assert!(wait_for_launches(&self.launcher, launched + 1).await);
                assert!(wait_for_playing(&self.controller, name).await);
            }
            None => assert!(wait_for_idle(&self.controller).await),
        }
    }
}
