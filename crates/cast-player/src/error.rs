use thiserror::Error;

/// Faults raised by an external player session or its control channel.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// The player process is gone; nothing sent to it will ever succeed.
    #[error("player session is dead")]
    SessionDead,

    /// The control channel failed or is not up yet.
    #[error("player control transport error: {0}")]
    Transport(String),

    /// The player could not be started at all.
    #[error("failed to launch player: {0}")]
    Launch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlayerError {
    /// Whether retrying against the same session is pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PlayerError::SessionDead)
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
