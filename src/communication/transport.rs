use crate::communication::messages::{
    decode_emergency_report, decode_position_report, decode_preemption_request,
    decode_signal_broadcast, SignalStateBroadcast, SignalStateTable,
};
use crate::error::Result;
use crate::global_variables::{
    AMQP_CONNECTION_TIMEOUT_MS, EXCHANGE_INTERSECTION_SNAPSHOTS, EXCHANGE_SIGNAL_STATES,
    QUEUE_EMERGENCY_REPORTS, QUEUE_POSITION_REPORTS, QUEUE_PREEMPTION_REQUESTS,
};
use crate::shared_data::{current_timestamp, Snapshot};
use crate::simulation_engine::coordinator::IntersectionCoordinator;
use crate::simulation_engine::onboard_unit::OnboardOutput;
use amiquip::{
    Channel, Connection, ConsumerMessage, ConsumerOptions, Exchange, ExchangeDeclareOptions,
    ExchangeType, FieldTable, Publish, QueueDeclareOptions,
};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, watch};
use tokio::task;

/// How often a blocked consumer wakes up to look at the shutdown signal.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Longest wait for blocking transport tasks once a service has stopped.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Set to `true` (or dropped) when the consumers should stop.
pub type Shutdown = watch::Receiver<bool>;

/// Where a consumer reads its records from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source<'a> {
    /// Named work queue shared by every consumer; each record goes to one.
    Queue(&'a str),
    /// Fanout exchange; each consumer gets its own exclusive queue and sees
    /// every record.
    Fanout(&'a str),
}

impl std::fmt::Display for Source<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Source::Queue(name) => write!(f, "queue '{}'", name),
            Source::Fanout(name) => write!(f, "exchange '{}'", name),
        }
    }
}

fn shutdown_requested(shutdown: &Shutdown) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

/// Adds the default handshake timeout to `amqp_url` unless it sets its own.
pub fn with_connection_timeout(amqp_url: &str) -> String {
    if amqp_url.contains("connection_timeout=") {
        return amqp_url.to_string();
    }
    let separator = if amqp_url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}connection_timeout={}",
        amqp_url, separator, AMQP_CONNECTION_TIMEOUT_MS
    )
}

fn connect(amqp_url: &str) -> Result<Connection> {
    Ok(Connection::insecure_open(&with_connection_timeout(amqp_url))?)
}

fn declare_fanout<'a>(channel: &'a Channel, exchange: &str) -> Result<Exchange<'a>> {
    Ok(channel.exchange_declare(
        ExchangeType::Fanout,
        exchange,
        ExchangeDeclareOptions::default(),
    )?)
}

/// Consumes `source` until the broker closes it or `shutdown` fires, passing
/// every body to `handle`. Every delivery is acked, including ones the
/// handler drops.
pub fn consume<F>(amqp_url: &str, source: Source, shutdown: Shutdown, mut handle: F) -> Result<()>
where
    F: FnMut(&[u8]),
{
    if shutdown_requested(&shutdown) {
        return Ok(());
    }
    let mut connection = connect(amqp_url)?;
    let channel = connection.open_channel(None)?;
    let queue = match source {
        Source::Queue(name) => channel.queue_declare(name, QueueDeclareOptions::default())?,
        Source::Fanout(exchange) => {
            let exchange = declare_fanout(&channel, exchange)?;
            // server-named, gone with this connection
            let queue = channel.queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
            )?;
            queue.bind(&exchange, "", FieldTable::new())?;
            queue
        }
    };
    let consumer = queue.consume(ConsumerOptions::default())?;
    log::info!("Listening for records on {} via '{}'", source, queue.name());

    while !shutdown_requested(&shutdown) {
        match consumer.receiver().recv_timeout(POLL_INTERVAL) {
            Ok(ConsumerMessage::Delivery(delivery)) => {
                handle(delivery.body.as_slice());
                consumer.ack(delivery)?;
            }
            Ok(other) => {
                log::warn!("Consumer on {} ended: {:?}", source, other);
                break;
            }
            Err(e) if e.is_timeout() => {}
            Err(_) => {
                log::warn!("Consumer on {} disconnected", source);
                break;
            }
        }
    }
    log::info!("Closing consumer on {}", source);
    connection.close()?;
    Ok(())
}

/// Serializes `record` as JSON and publishes it on `exchange`.
pub fn publish_json<T: Serialize>(exchange: &Exchange, routing_key: &str, record: &T) -> Result<()> {
    let body = serde_json::to_vec(record)?;
    exchange.publish(Publish::new(&body, routing_key))?;
    Ok(())
}

/// Runs `service` on a fresh multi-threaded runtime. Once it returns, the
/// shutdown signal fires and blocking transport tasks get `SHUTDOWN_GRACE`
/// to finish before the runtime is torn down regardless.
pub fn run_service<F, Fut>(service: F) -> Result<()>
where
    F: FnOnce(Shutdown) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let runtime = Runtime::new()?;
    let (trigger, shutdown) = watch::channel(false);
    let result = runtime.block_on(service(shutdown));
    // no receivers left is fine
    let _ = trigger.send(true);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

/// Feeds decoded position reports into the coordinator.
pub async fn listen_position_reports(
    amqp_url: String,
    coordinator: Arc<IntersectionCoordinator>,
    shutdown: Shutdown,
) -> Result<()> {
    task::spawn_blocking(move || {
        consume(&amqp_url, Source::Queue(QUEUE_POSITION_REPORTS), shutdown, |body| {
            match decode_position_report(body) {
                Ok(report) => coordinator.apply_external_position_report(&report),
                Err(e) => log::warn!("Dropping position report: {}", e),
            }
        })
    })
    .await?
}

/// Feeds decoded emergency reports into the coordinator.
pub async fn listen_emergency_reports(
    amqp_url: String,
    coordinator: Arc<IntersectionCoordinator>,
    shutdown: Shutdown,
) -> Result<()> {
    task::spawn_blocking(move || {
        consume(&amqp_url, Source::Queue(QUEUE_EMERGENCY_REPORTS), shutdown, |body| {
            match decode_emergency_report(body) {
                Ok(report) => coordinator.apply_external_emergency_report(&report),
                Err(e) => log::warn!("Dropping emergency report: {}", e),
            }
        })
    })
    .await?
}

/// Arms preemptions requested directly over the bus.
pub async fn listen_preemption_requests(
    amqp_url: String,
    coordinator: Arc<IntersectionCoordinator>,
    shutdown: Shutdown,
) -> Result<()> {
    task::spawn_blocking(move || {
        consume(&amqp_url, Source::Queue(QUEUE_PREEMPTION_REQUESTS), shutdown, |body| {
            let request = match decode_preemption_request(body) {
                Ok(request) => request,
                Err(e) => {
                    log::warn!("Dropping preemption request: {}", e);
                    return;
                }
            };
            if let Err(e) = coordinator.apply_preemption_request(&request, current_timestamp()) {
                log::warn!("Ignoring preemption request for {}: {}", request.target_direction, e);
            }
        })
    })
    .await?
}

/// Keeps `table` in step with the signal-state broadcasts.
pub async fn listen_signal_states(
    amqp_url: String,
    table: Arc<Mutex<SignalStateTable>>,
    shutdown: Shutdown,
) -> Result<()> {
    task::spawn_blocking(move || {
        consume(&amqp_url, Source::Fanout(EXCHANGE_SIGNAL_STATES), shutdown, |body| {
            match decode_signal_broadcast(body) {
                Ok(broadcast) => table
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .apply(&broadcast),
                Err(e) => log::warn!("Dropping signal broadcast: {}", e),
            }
        })
    })
    .await?
}

/// Publishes every snapshot received on `rx`, followed by the matching
/// signal-state broadcast. Returns when the sending side is dropped.
pub async fn publish_snapshots(amqp_url: String, mut rx: mpsc::Receiver<Snapshot>) -> Result<()> {
    task::spawn_blocking(move || -> Result<()> {
        let mut connection = connect(&amqp_url)?;
        let channel = connection.open_channel(None)?;
        let snapshots = declare_fanout(&channel, EXCHANGE_INTERSECTION_SNAPSHOTS)?;
        let signal_states = declare_fanout(&channel, EXCHANGE_SIGNAL_STATES)?;
        while let Some(snapshot) = rx.blocking_recv() {
            publish_json(&snapshots, "", &snapshot)?;
            publish_json(&signal_states, "", &SignalStateBroadcast::from(&snapshot))?;
        }
        connection.close()?;
        Ok(())
    })
    .await?
}

/// Publishes the reports an on-board unit produces.
pub async fn publish_vehicle_reports(
    amqp_url: String,
    mut rx: mpsc::Receiver<OnboardOutput>,
) -> Result<()> {
    task::spawn_blocking(move || -> Result<()> {
        let mut connection = connect(&amqp_url)?;
        let channel = connection.open_channel(None)?;
        for queue in [QUEUE_POSITION_REPORTS, QUEUE_EMERGENCY_REPORTS] {
            channel.queue_declare(queue, QueueDeclareOptions::default())?;
        }
        let direct = Exchange::direct(&channel);
        while let Some(output) = rx.blocking_recv() {
            publish_json(&direct, QUEUE_POSITION_REPORTS, &output.position)?;
            if let Some(emergency) = &output.emergency {
                publish_json(&direct, QUEUE_EMERGENCY_REPORTS, emergency)?;
                log::info!(
                    "Vehicle {} sent emergency report at {:.1} m",
                    emergency.vehicle_id,
                    output.distance_m
                );
            }
        }
        connection.close()?;
        Ok(())
    })
    .await?
}
