use serde::{Deserialize, Serialize};

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.  Clients check this on connect and can refuse to talk to an
/// incompatible daemon.
pub const PROTOCOL_VERSION: u32 = 1;

/// An item as a client describes it: the daemon resolves the local path and
/// discovers subtitles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRequest {
    pub source: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub playlist_id: Option<String>,
}

impl ItemRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            title: None,
            playlist_id: None,
        }
    }
}

/// Messages sent from clients to the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    /// Resume autoplay, or play `item` right away (ahead of the rest of the
    /// queue, grouped with its playlist).
    Play {
        #[serde(default)]
        item: Option<ItemRequest>,
    },
    Queue {
        item: ItemRequest,
        #[serde(default)]
        first: bool,
    },
    Stop {
        #[serde(default)]
        stop_browsing: bool,
    },
    Next,
    Prev,
    PlayPause,
    ToggleSubtitle,
    IncreaseSubtitleDelay,
    DecreaseSubtitleDelay,
    ChangeVolume { increase: bool },
    Seek { forward: bool, long: bool },
    ListQueue,
    ListHistory,
    GetState,
}

/// Messages sent from the daemon to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// Sent immediately on connect: protocol version + state snapshot.
    Hello {
        protocol_version: u32,
        state: PlayerSnapshot,
    },
    State {
        data: PlayerSnapshot,
    },
    Queue {
        items: Vec<ItemSummary>,
    },
    History {
        items: Vec<ItemSummary>,
        index: usize,
        browsing: bool,
    },
    Log {
        message: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: u64,
    pub source: String,
    pub title: Option<String>,
    pub playlist_id: Option<String>,
    /// Whether the item has been resolved to a local file.
    pub local: bool,
}

/// What the controller is doing right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlayerSnapshot {
    pub now_playing: Option<ItemSummary>,
    pub autoplay: bool,
    pub volume: f32,
    pub subtitles_enabled: bool,
    pub queue_len: usize,
    pub history_len: usize,
    pub history_index: usize,
    pub browsing: bool,
}

/// Wrapper for socket communication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(Command),
    Broadcast(Broadcast),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        if data.len() < 4 {
            anyhow::bail!("Insufficient data for length header");
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < 4 + len {
            anyhow::bail!("Insufficient data for message");
        }
        let msg: Self = serde_json::from_slice(&data[4..4 + len])?;
        Ok((msg, 4 + len))
    }
}

/// Largest frame body accepted from a peer.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// One unit pulled off a byte stream by [`FrameDecoder`].
#[derive(Debug)]
pub enum Frame {
    Message(Message),
    /// A complete frame whose body is not a valid message.  It has been
    /// consumed; later frames are unaffected.
    Malformed(String),
}

/// Splits a byte stream into length-prefixed frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes received but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// The next complete frame, or `None` until more bytes arrive.  Fails
    /// when the peer announces a frame above [`MAX_FRAME_LEN`]; the stream
    /// cannot be resynchronised after that.
    pub fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        let Some(header) = self.buf.get(..4) else {
            return Ok(None);
        };
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("frame of {} bytes exceeds limit of {}", len, MAX_FRAME_LEN);
        }
        if self.buf.len() < 4 + len {
            return Ok(None);
        }

        let frame = match serde_json::from_slice::<Message>(&self.buf[4..4 + len]) {
            Ok(message) => Frame::Message(message),
            Err(e) => Frame::Malformed(e.to_string()),
        };
        self.buf.drain(..4 + len);
        Ok(Some(frame))
    }
}
