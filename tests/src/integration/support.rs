//! Fixtures shared by the integration tests.

use std::fmt;
use std::sync::{Arc, Once};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use typed_bus::{BusConfig, InMemoryPubSub, MessageBus, RunningDispatcher};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub seq: u64,
}
typed_bus::bincode_message!(Ping, "it.Ping");

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub id: String,
}
typed_bus::bincode_message!(Ack, "it.Ack");

/// Never registered on the receiving side.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Orphan {
    pub note: String,
}
typed_bus::bincode_message!(Orphan, "it.Orphan");

/// Claims the `it.Ping` identifier with a different layout.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Impostor {
    pub label: String,
}
typed_bus::bincode_message!(Impostor, "it.Ping");

static LOGGING: Once = Once::new();

pub fn init_logging() {
    LOGGING.call_once(|| {
        let config = bus_telemetry::TelemetryConfig::from_env();
        // A subscriber may already be installed by the harness.
        let _ = bus_telemetry::init_logging(&config);
    });
}

/// Two buses over one store: the publishing side knows no types, the
/// receiving side has `Ping` and `Ack` registered.
pub struct Pair {
    pub store: Arc<InMemoryPubSub>,
    pub sender: MessageBus<InMemoryPubSub>,
    pub receiver: MessageBus<InMemoryPubSub>,
}

impl Pair {
    pub fn new() -> Self {
        init_logging();
        let config = BusConfig::default();
        let store = Arc::new(InMemoryPubSub::with_buffer(config.subscription_buffer));
        let sender = MessageBus::new(Arc::clone(&store), &config).unwrap();
        let receiver = MessageBus::new(Arc::clone(&store), &config).unwrap();
        receiver.register_type::<Ping>().unwrap();
        receiver.register_type::<Ack>().unwrap();
        Self {
            store,
            sender,
            receiver,
        }
    }
}

/// Wait until `count` deliveries were either dispatched or dropped.
pub async fn settle(running: &RunningDispatcher, count: u64) {
    timeout(Duration::from_secs(5), async {
        loop {
            let stats = running.stats();
            if stats.dispatched + stats.dropped() >= count {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("dispatcher did not settle");
}

/// Records the `drop` field of every log event.
#[derive(Clone, Default)]
pub struct DropLog(Arc<Mutex<Vec<String>>>);

impl DropLog {
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

impl<S: Subscriber> Layer<S> for DropLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut field = DropField(None);
        event.record(&mut field);
        if let Some(kind) = field.0 {
            self.0.lock().push(kind);
        }
    }
}

struct DropField(Option<String>);

impl Visit for DropField {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "drop" {
            self.0 = Some(format!("{value:?}"));
        }
    }
}
