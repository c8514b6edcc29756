use crate::dispatch;
use crate::BroadcastMessage;
use cast_player::PlaybackController;
use cast_proto::protocol::{Broadcast, Frame, FrameDecoder, Message};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub fn start_server(
    bind_address: String,
    port: u16,
    controller: Arc<PlaybackController>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);
        match TcpListener::bind(&addr).await {
            Ok(listener) => {
                info!("socket: listening at {}", addr);
                serve(listener, controller, broadcast_tx).await;
            }
            Err(e) => error!("socket: cannot bind {}: {}", addr, e),
        }
    })
}

/// Accept clients on `listener` until the task is dropped.
pub(crate) async fn serve(
    listener: TcpListener,
    controller: Arc<PlaybackController>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
) {
    let mut last_id = 0usize;
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("socket: accept failed: {}", e);
                continue;
            }
        };
        last_id += 1;
        let client = Client {
            id: last_id,
            controller: Arc::clone(&controller),
            broadcast_tx: broadcast_tx.clone(),
        };
        let events = broadcast_tx.subscribe();
        info!("socket: client {} connected from {}", client.id, peer);

        tokio::spawn(async move {
            if let Err(e) = client.run(stream, events).await {
                warn!("socket: client {} dropped: {:#}", client.id, e);
            }
            info!("socket: client {} disconnected", client.id);
        });
    }
}

struct Client {
    id: usize,
    controller: Arc<PlaybackController>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
}

impl Client {
    async fn run(
        &self,
        stream: TcpStream,
        mut events: broadcast::Receiver<BroadcastMessage>,
    ) -> anyhow::Result<()> {
        let (mut reader, mut writer) = stream.into_split();
        send(&mut writer, dispatch::hello(&self.controller).await).await?;

        let mut decoder = FrameDecoder::new();
        let mut chunk = [0u8; 4096];
        loop {
            tokio::select! {
                read = reader.read(&mut chunk) => {
                    let n = read?;
                    if n == 0 {
                        return Ok(());
                    }
                    decoder.extend(&chunk[..n]);
                    self.answer_frames(&mut decoder, &mut writer).await?;
                }
                event = events.recv() => match event {
                    Ok(BroadcastMessage::StateUpdated) => {
                        send(&mut writer, dispatch::state(&self.controller).await).await?;
                    }
                    Ok(BroadcastMessage::Log(message)) => {
                        send(&mut writer, Broadcast::Log { message }).await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("socket: client {} missed {} broadcasts", self.id, n);
                        send(&mut writer, dispatch::state(&self.controller).await).await?;
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                },
            }
        }
    }

    /// Reply to every complete frame buffered in `decoder`.  A frame that
    /// does not parse gets an error reply; an oversized one ends the
    /// connection.
    async fn answer_frames(
        &self,
        decoder: &mut FrameDecoder,
        writer: &mut OwnedWriteHalf,
    ) -> anyhow::Result<()> {
        loop {
            let frame = match decoder.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(e) => {
                    let message = e.to_string();
                    send(writer, Broadcast::Error { message }).await?;
                    return Err(e);
                }
            };

            let reply = match frame {
                Frame::Message(Message::Command(command)) => {
                    info!("socket: client {} sent {:?}", self.id, command);
                    dispatch::apply(&self.controller, command).await
                }
                Frame::Message(Message::Broadcast(_)) => {
                    debug!("socket: client {} sent a broadcast, ignored", self.id);
                    continue;
                }
                Frame::Malformed(reason) => {
                    warn!("socket: client {} sent a malformed frame: {}", self.id, reason);
                    Broadcast::Error {
                        message: format!("malformed frame: {}", reason),
                    }
                }
            };

            let changed = matches!(reply, Broadcast::State { .. });
            send(writer, reply).await?;
            if changed {
                let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
            }
        }
    }
}

async fn send(writer: &mut OwnedWriteHalf, broadcast: Broadcast) -> anyhow::Result<()> {
    let encoded = Message::Broadcast(broadcast).encode()?;
    writer.write_all(&encoded).await?;
    Ok(())
}
