use crate::BroadcastMessage;
use std::fmt::Write as _;
use std::path::Path;
use tokio::sync::broadcast;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const DEFAULT_FILTER: &str = "info,cast_daemon=debug,cast_player=debug";

/// Log to `log_path`, and forward warnings and errors to connected clients.
/// `RUST_LOG` overrides the default filter.
pub fn init(log_path: &Path, clients: broadcast::Sender<BroadcastMessage>) -> anyhow::Result<()> {
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(log_file).with_ansi(false))
        .with(ClientLogLayer::new(clients))
        .with(filter)
        .try_init()?;
    Ok(())
}

/// Turns WARN and ERROR events into `BroadcastMessage::Log` lines.
pub struct ClientLogLayer {
    clients: broadcast::Sender<BroadcastMessage>,
}

impl ClientLogLayer {
    pub fn new(clients: broadcast::Sender<BroadcastMessage>) -> Self {
        Self { clients }
    }
}

impl<S: Subscriber> Layer<S> for ClientLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > Level::WARN {
            return;
        }

        let mut line = LogLine::default();
        event.record(&mut line);
        let text = format!(
            "{} {} {}: {}{}",
            chrono::Local::now().format("%H:%M:%S"),
            meta.level(),
            meta.target(),
            line.message,
            line.fields
        );
        // nobody listening is fine
        let _ = self.clients.send(BroadcastMessage::Log(text));
    }
}

/// The event message, plus the remaining fields as ` key=value` pairs.
#[derive(Default)]
struct LogLine {
    message: String,
    fields: String,
}

impl Visit for LogLine {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
