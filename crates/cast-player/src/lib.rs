//! Playback orchestration for a single external media player.
//!
//! [`PlaybackController`] owns a [`Queue`] of pending items and a navigable
//! [`History`] of played ones.  A single worker task pulls the next item,
//! launches it through a [`PlayerLauncher`], and reacts to the player's exit
//! notification to decide what plays next.

pub mod controller;
pub mod error;
pub mod handle;
pub mod history;
pub mod item;
pub mod queue;
pub mod session;
pub mod sync;

pub use controller::PlaybackController;
pub use error::{PlayerError, Result};
pub use handle::PlayerHandle;
pub use history::History;
pub use item::{Item, ItemId, SiblingSubtitles, SubtitleFinder};
pub use queue::Queue;
pub use session::{
    Action, ExitNotifier, LaunchOptions, LocalStore, MediaStore, PlayerCommand, PlayerLauncher,
    PlayerSession, SessionId,
};
