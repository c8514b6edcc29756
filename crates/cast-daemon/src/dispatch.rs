use cast_player::{Item, PlaybackController, SiblingSubtitles};
use cast_proto::protocol::{Broadcast, Command, ItemRequest, ItemSummary};
use tracing::debug;

/// Build a controller item from a client request.  Local sources are
/// resolved and get their sibling subtitles discovered here.
pub fn item_from_request(request: ItemRequest) -> Item {
    let mut item = Item::from_source(request.source, &SiblingSubtitles);
    if let Some(title) = request.title {
        item = item.with_title(title);
    }
    if let Some(playlist) = request.playlist_id {
        item = item.with_playlist(playlist);
    }
    item
}

/// Apply one client command and produce the reply for the client.  Listing
/// commands answer with the list, everything else with the resulting state.
pub async fn apply(controller: &PlaybackController, command: Command) -> Broadcast {
    match command {
        Command::Play { item } => controller.play(item.map(item_from_request)).await,
        Command::Queue { item, first } => {
            controller.queue(item_from_request(item), first).await
        }
        Command::Stop { stop_browsing } => {
            if !controller.stop(stop_browsing).await {
                return Broadcast::Error {
                    message: "player did not stop in time".to_string(),
                };
            }
        }
        Command::Next => controller.next().await,
        Command::Prev => controller.prev().await,
        Command::PlayPause => controller.play_pause().await,
        Command::ToggleSubtitle => controller.toggle_subtitle().await,
        Command::IncreaseSubtitleDelay => controller.increase_subtitle_delay().await,
        Command::DecreaseSubtitleDelay => controller.decrease_subtitle_delay().await,
        Command::ChangeVolume { increase } => controller.change_volume(increase).await,
        Command::Seek { forward, long } => controller.seek(forward, long).await,
        Command::ListQueue => return queue_listing(controller).await,
        Command::ListHistory => return history_listing(controller).await,
        Command::GetState => {}
    }
    state(controller).await
}

pub async fn state(controller: &PlaybackController) -> Broadcast {
    Broadcast::State {
        data: controller.snapshot().await,
    }
}

pub async fn hello(controller: &PlaybackController) -> Broadcast {
    Broadcast::Hello {
        protocol_version: cast_proto::protocol::PROTOCOL_VERSION,
        state: controller.snapshot().await,
    }
}

pub async fn queue_listing(controller: &PlaybackController) -> Broadcast {
    Broadcast::Queue {
        items: summaries(&controller.list_queue().await),
    }
}

pub async fn history_listing(controller: &PlaybackController) -> Broadcast {
    let items = summaries(&controller.list_history().await);
    let (index, browsing) = controller.history_position().await;
    debug!("dispatch: history has {} entries", items.len());
    Broadcast::History {
        items,
        index,
        browsing,
    }
}

fn summaries(items: &[Item]) -> Vec<ItemSummary> {
    items.iter().map(Item::summary).collect()
}
