mod dispatch;
mod http;
mod logging;
mod mpv;
mod socket;
#[cfg(test)]
mod testing;

use cast_player::{LocalStore, MediaStore, PlaybackController, PlayerLauncher};
use cast_proto::config::Config;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "castd", about = "Media playback daemon driving mpv")]
struct Args {
    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use the mpv found on PATH instead of one shipped beside the binary
    #[arg(long)]
    system_deps: bool,
}

#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    StateUpdated,
    Log(String),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup broadcast channel first so we can use it for logging
    let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(100);

    let data_dir = cast_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("castd.log");

    logging::init(&log_path, broadcast_tx.clone())?;
    info!("Log file: {:?}", log_path);

    cast_proto::platform::set_use_system_deps(args.system_deps);

    let config_path = args.config.unwrap_or_else(Config::config_path);
    let config = Config::load_from(&config_path)?;
    info!("Config loaded from: {:?}", config_path);

    let launcher: Arc<dyn PlayerLauncher> = Arc::new(mpv::MpvLauncher::new()?);
    let store: Arc<dyn MediaStore> = Arc::new(LocalStore);
    let controller = Arc::new(PlaybackController::new(
        config.player.clone(),
        launcher,
        store,
    ));

    let _socket_handle = socket::start_server(
        config.daemon.bind_address.clone(),
        config.daemon.port,
        controller.clone(),
        broadcast_tx.clone(),
    );

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            controller.clone(),
            broadcast_tx.clone(),
        );
    }

    info!("Daemon initialised, waiting for clients");
    tokio::signal::ctrl_c().await?;

    info!("Interrupted, shutting down");
    controller.shutdown().await;
    Ok(())
}
