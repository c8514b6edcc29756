/// PlaybackController: queue/history sequencing around one external player.
///
/// All mutable state sits behind a single `tokio::sync::Mutex`.  Public
/// methods lock it, mutate, and wake the worker.  The worker task is the only
/// place that starts players, and player exit notifications are delivered to
/// it through the same event channel as wake-ups, so every Idle/Playing
/// transition happens in one serialized loop:
///
/// ```text
///   play / queue / next / prev ──► Wake ─────────┐
///                                                ├──► worker ──► launcher
///   ExitNotifier (player process gone) ──► PlayerExited ┘
/// ```
///
/// The worker starts an item when it is Idle, autoplay is on, and there is
/// something to play: a browsing history cursor wins over the queue head.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use cast_proto::config::PlayerConfig;
use cast_proto::protocol::PlayerSnapshot;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::handle::PlayerHandle;
use crate::history::History;
use crate::item::Item;
use crate::queue::Queue;
use crate::session::{
    Action, ExitNotifier, LaunchOptions, MediaStore, PlayerCommand, PlayerLauncher,
    PlayerSession, SessionId,
};
use crate::sync::{poll_until, probe_until, ProbeOutcome, SyncPolicy};

const VOLUME_STEP: f32 = 0.1;
const MIN_VOLUME: f32 = 0.0;
const MAX_VOLUME: f32 = 2.0;
const SHORT_SEEK_SECS: f64 = 30.0;
const LONG_SEEK_SECS: f64 = 300.0;

// ── worker events ─────────────────────────────────────────────────────────────

/// Inputs of the worker loop.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    /// Re-evaluate whether something should start playing.
    Wake,
    /// The player launched as `session` is gone.
    PlayerExited {
        session: SessionId,
        code: Option<i32>,
    },
}

// ── shared state ──────────────────────────────────────────────────────────────

struct ControllerState {
    queue: Queue,
    history: History,
    /// `Some` exactly while Playing.
    current: Option<PlayerHandle>,
    autoplay: bool,
    volume: f32,
    subtitles_enabled: bool,
    /// Set once, at teardown.
    stopped: bool,
}

impl ControllerState {
    fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    fn has_work(&self) -> bool {
        !self.is_playing()
            && self.autoplay
            && (!self.queue.is_empty() || self.history.is_browsing())
    }

    fn enqueue(&mut self, item: Item, first: bool) {
        info!("controller: queue {}", item);
        let position = self.queue.insert(item, first);
        debug!(
            "controller: queued at {} of {} (first={})",
            position,
            self.queue.len(),
            first
        );
    }
}

struct Shared {
    config: PlayerConfig,
    state: Mutex<ControllerState>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    launcher: Arc<dyn PlayerLauncher>,
    store: Arc<dyn MediaStore>,
    next_session: AtomicU64,
}

impl Shared {
    fn wake(&self) {
        // The worker holds the receiver for as long as `Shared` lives.
        let _ = self.events.send(WorkerEvent::Wake);
    }

    async fn is_playing(&self) -> bool {
        self.state.lock().await.is_playing()
    }

    fn stop_policy(&self) -> SyncPolicy {
        SyncPolicy::from_millis(self.config.stop_timeout_ms, self.config.poll_interval_ms)
    }

    fn ready_policy(&self) -> SyncPolicy {
        SyncPolicy::from_millis(self.config.ready_timeout_ms, self.config.poll_interval_ms)
    }

    // ── worker loop ───────────────────────────────────────────────────────────

    async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<WorkerEvent>) {
        info!("controller: worker started");
        loop {
            {
                let mut state = self.state.lock().await;
                if state.stopped {
                    break;
                }
                if state.has_work() {
                    let launched = self.start_next(&mut state).await;
                    drop(state);
                    if let Some((id, session)) = launched {
                        self.await_control_channel(id, session).await;
                    }
                    continue;
                }
            }

            match events.recv().await {
                Some(WorkerEvent::Wake) => {}
                Some(WorkerEvent::PlayerExited { session, code }) => {
                    self.on_exit(session, code).await;
                }
                None => break,
            }
        }
        info!("controller: worker stopped");
    }

    /// Pick the next candidate and launch it.  Returns the new session when a
    /// player was started; `None` means the candidate was consumed without
    /// playing and the caller should look again.
    async fn start_next(
        &self,
        state: &mut ControllerState,
    ) -> Option<(SessionId, Arc<dyn PlayerSession>)> {
        let from_history = state.history.is_browsing();
        let item = if from_history {
            debug!(
                "controller: picking item from history at index {}",
                state.history.index()
            );
            match state.history.current_item() {
                Some(item) => item.clone(),
                None => {
                    state.history.stop_browsing();
                    return None;
                }
            }
        } else {
            state.queue.pop_front()?
        };

        let path = match item.resolved_path().filter(|p| self.store.exists(p)) {
            Some(path) => path.to_path_buf(),
            None => {
                error!("controller: file not found: {}", item);
                if from_history {
                    state.history.remove(item.id());
                    state.history.stop_browsing();
                }
                return None;
            }
        };

        if !from_history {
            state.history.push(item.clone());
        }

        let id = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        let options = LaunchOptions {
            volume: state.volume,
            subtitles: item.subtitle_tracks().to_vec(),
            subtitles_visible: state.subtitles_enabled,
            hide_background: self.config.hide_background,
        };
        debug!("controller: opening {} as player {} with {:?}", item, id, options);

        let on_exit = ExitNotifier::new(id, self.events.clone());
        match self.launcher.launch(id, &path, &options, on_exit).await {
            Ok(session) => {
                info!("controller: player {} started for {}", id, item);
                state.current = Some(PlayerHandle::new(id, item, Arc::clone(&session)));
                Some((id, session))
            }
            Err(e) => {
                error!("controller: failed to launch {}: {}", item, e);
                if from_history {
                    state.history.next();
                }
                None
            }
        }
    }

    /// Wait for a fresh player's control channel.  Failures are logged only:
    /// a player that never comes up still reports its exit.
    async fn await_control_channel(&self, id: SessionId, session: Arc<dyn PlayerSession>) {
        let outcome = probe_until(self.ready_policy(), || {
            let session = Arc::clone(&session);
            async move { session.ping().await }
        })
        .await;

        match outcome {
            ProbeOutcome::Ready => debug!("controller: player {} control channel ready", id),
            ProbeOutcome::TimedOut => {
                error!("controller: couldn't reach player {} control channel", id)
            }
            ProbeOutcome::Abandoned(e) => {
                error!("controller: player {} died while starting: {}", id, e)
            }
        }
    }

    async fn on_exit(&self, session: SessionId, code: Option<i32>) {
        let mut state = self.state.lock().await;
        if state.current.as_ref().map(|h| h.id()) != Some(session) {
            debug!("controller: exit of player {} already handled", session);
            return;
        }
        info!("controller: player {} stopped (code {:?})", session, code);

        let loop_last = self.config.loop_last;
        if state.history.is_browsing() {
            // Replay the oldest entry forever rather than falling back to an
            // empty queue.
            let hold = loop_last && state.history.index() == 0 && state.queue.is_empty();
            if !hold {
                state.history.next();
            }
        } else if loop_last && state.queue.is_empty() && state.autoplay {
            if let Some(last) = state.history.current_item().cloned() {
                debug!("controller: looping {}", last);
                state.queue.push_back(last);
            }
        }
        state.current = None;
    }
}

// ── public controller ─────────────────────────────────────────────────────────

/// Sequences items onto one external player.
///
/// Must be created inside a tokio runtime; the worker task runs until
/// [`PlaybackController::shutdown`].
pub struct PlaybackController {
    shared: Arc<Shared>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackController {
    pub fn new(
        config: PlayerConfig,
        launcher: Arc<dyn PlayerLauncher>,
        store: Arc<dyn MediaStore>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = ControllerState {
            queue: Queue::new(),
            history: History::new(),
            current: None,
            autoplay: false,
            volume: config.default_volume.clamp(MIN_VOLUME, MAX_VOLUME),
            subtitles_enabled: true,
            stopped: false,
        };
        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(state),
            events: events_tx,
            launcher,
            store,
            next_session: AtomicU64::new(1),
        });
        let worker = tokio::spawn(Arc::clone(&shared).run(events_rx));

        Self {
            shared,
            worker: std::sync::Mutex::new(Some(worker)),
        }
    }

    /// Turn autoplay on.  With an item, cancel browsing and put it first in
    /// line (after queued items of its own playlist); without one, resume.
    /// Never interrupts a playing item.
    pub async fn play(&self, item: Option<Item>) {
        let mut state = self.shared.state.lock().await;
        state.autoplay = true;
        if let Some(item) = item {
            state.history.stop_browsing();
            state.enqueue(item, true);
        }
        drop(state);
        self.shared.wake();
    }

    pub async fn queue(&self, item: Item, first: bool) {
        let mut state = self.shared.state.lock().await;
        state.enqueue(item, first);
        if state.autoplay {
            drop(state);
            self.shared.wake();
        }
    }

    /// Stop the current player and turn autoplay off.  Waits a bounded time
    /// for the player's exit to be observed; returns whether the controller
    /// is Idle afterwards.
    pub async fn stop(&self, stop_browsing: bool) -> bool {
        let (target, delivered) = {
            let mut state = self.shared.state.lock().await;
            let Some(handle) = state.current.as_ref() else {
                debug!("controller: already stopped");
                return true;
            };
            let target = handle.id();
            let delivered = handle.stop().await;
            if stop_browsing {
                state.history.stop_browsing();
            }
            info!("controller: stopping player {} ...", target);
            state.autoplay = false;
            (target, delivered)
        };

        // A player still bringing up its control channel refuses commands,
        // so the stop is repeated until one is accepted.
        let delivered = AtomicBool::new(delivered);
        let delivered = &delivered;
        let shared: &Shared = &self.shared;
        let stopped = poll_until(shared.stop_policy(), move || async move {
            let state = shared.state.lock().await;
            match state.current.as_ref() {
                Some(handle) if handle.id() == target => {
                    if !delivered.load(Ordering::Relaxed) && handle.stop().await {
                        debug!("controller: player {} accepted stop", target);
                        delivered.store(true, Ordering::Relaxed);
                    }
                    false
                }
                _ => true,
            }
        })
        .await;
        if !stopped {
            error!("controller: cannot stop player {}", target);
        }
        stopped
    }

    /// Go back one history entry.  While Playing, the entry being played is
    /// the reference point: whatever the exit transition did to the cursor,
    /// playback resumes on the entry just before it.
    pub async fn prev(&self) {
        let playing_index = {
            let mut state = self.shared.state.lock().await;
            if !state.history.can_prev() {
                debug!("controller: no previous item");
                return;
            }
            if !state.is_playing() {
                state.history.prev();
                state.autoplay = true;
                drop(state);
                self.shared.wake();
                return;
            }
            state.history.index()
        };

        if !self.stop(false).await {
            warn!("controller: prev ignored, player did not stop");
            return;
        }

        let mut state = self.shared.state.lock().await;
        let target = playing_index.saturating_sub(1);
        while state.history.index() > target && state.history.prev() {}
        debug!(
            "controller: prev resumes history at index {}",
            state.history.index()
        );
        state.autoplay = true;
        drop(state);
        self.shared.wake();
    }

    /// Skip to whatever follows the current item.
    pub async fn next(&self) {
        self.stop(false).await;
        self.play(None).await;
    }

    pub async fn play_pause(&self) {
        let state = self.shared.state.lock().await;
        if let Some(handle) = state.current.as_ref() {
            handle.play_pause().await;
            return;
        }
        drop(state);
        self.play(None).await;
    }

    pub async fn toggle_subtitle(&self) {
        let mut state = self.shared.state.lock().await;
        state.subtitles_enabled = !state.subtitles_enabled;
        let enabled = state.subtitles_enabled;
        if let Some(handle) = state.current.as_ref() {
            if enabled {
                handle.show_subtitles().await;
            } else {
                handle.hide_subtitles().await;
            }
        }
    }

    pub async fn increase_subtitle_delay(&self) {
        self.execute(PlayerCommand::Action(Action::IncreaseSubtitleDelay))
            .await;
    }

    pub async fn decrease_subtitle_delay(&self) {
        self.execute(PlayerCommand::Action(Action::DecreaseSubtitleDelay))
            .await;
    }

    /// Step the volume by 0.1 within [0, 2].  The new value is kept only if
    /// the running player accepted it.
    pub async fn change_volume(&self, increase: bool) {
        let mut state = self.shared.state.lock().await;
        let step = if increase { VOLUME_STEP } else { -VOLUME_STEP };
        let volume = (state.volume + step).clamp(MIN_VOLUME, MAX_VOLUME);
        let accepted = match state.current.as_ref() {
            Some(handle) => handle.set_volume(volume).await,
            None => false,
        };
        if accepted {
            debug!("controller: volume {:.2} → {:.2}", state.volume, volume);
            state.volume = volume;
        }
    }

    /// ±30 s, or ±5 min when `long`.
    pub async fn seek(&self, forward: bool, long: bool) {
        let magnitude = if long { LONG_SEEK_SECS } else { SHORT_SEEK_SECS };
        let seconds = if forward { magnitude } else { -magnitude };
        self.execute(PlayerCommand::Seek(seconds)).await;
    }

    /// Forward `command` to the running player.  False when Idle or when the
    /// player refused it.
    pub async fn execute(&self, command: PlayerCommand) -> bool {
        let state = self.shared.state.lock().await;
        match state.current.as_ref() {
            Some(handle) => handle.execute(command).await,
            None => false,
        }
    }

    // ── read-only views ───────────────────────────────────────────────────────

    pub async fn list_queue(&self) -> Vec<Item> {
        self.shared.state.lock().await.queue.items().cloned().collect()
    }

    pub async fn list_history(&self) -> Vec<Item> {
        self.shared.state.lock().await.history.items().to_vec()
    }

    /// History cursor and browsing flag.
    pub async fn history_position(&self) -> (usize, bool) {
        let state = self.shared.state.lock().await;
        (state.history.index(), state.history.is_browsing())
    }

    pub async fn is_playing(&self) -> bool {
        self.shared.is_playing().await
    }

    pub async fn now_playing(&self) -> Option<Item> {
        let state = self.shared.state.lock().await;
        state.current.as_ref().map(|h| h.item().clone())
    }

    pub async fn volume(&self) -> f32 {
        self.shared.state.lock().await.volume
    }

    pub async fn autoplay(&self) -> bool {
        self.shared.state.lock().await.autoplay
    }

    pub async fn subtitles_enabled(&self) -> bool {
        self.shared.state.lock().await.subtitles_enabled
    }

    pub async fn snapshot(&self) -> PlayerSnapshot {
        let state = self.shared.state.lock().await;
        PlayerSnapshot {
            now_playing: state.current.as_ref().map(|h| h.item().summary()),
            autoplay: state.autoplay,
            volume: state.volume,
            subtitles_enabled: state.subtitles_enabled,
            queue_len: state.queue.len(),
            history_len: state.history.len(),
            history_index: state.history.index(),
            browsing: state.history.is_browsing(),
        }
    }

    // ── teardown ──────────────────────────────────────────────────────────────

    /// Stop any running player, then end the worker and wait for it.
    /// Later calls return immediately.
    pub async fn shutdown(&self) {
        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(worker) = worker else {
            return;
        };

        info!("controller: shutting down");
        self.stop(false).await;

        self.shared.state.lock().await.stopped = true;
        self.shared.wake();
        if let Err(e) = worker.await {
            warn!("controller: worker ended abnormally: {}", e);
        }

        let mut state = self.shared.state.lock().await;
        if let Some(handle) = state.current.take() {
            warn!(
                "controller: player {} still running at shutdown, releasing it",
                handle.id()
            );
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(worker) = worker {
            warn!("controller: dropped without shutdown, aborting worker");
            worker.abort();
        }
    }
}
