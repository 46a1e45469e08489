use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use evtbus::{config_from_env, init_logging, Envelope, EventBus, TokioBackend, VERSION};

const EVT_TICK: u16 = 1;
const EVT_SENSOR: u16 = 7;

struct SensorTotals {
    readings: AtomicU64,
    sum: AtomicU64,
}

fn on_sensor(envelope: &Envelope, totals: &SensorTotals) {
    let value = envelope
        .payload()
        .get(..2)
        .map(|bytes| u16::from_le_bytes([bytes[0], bytes[1]]))
        .unwrap_or_default();
    totals.readings.fetch_add(1, Ordering::Relaxed);
    totals.sum.fetch_add(u64::from(value), Ordering::Relaxed);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    tracing::info!("evtbus {}", VERSION);

    let config = config_from_env()?;
    let backend = Arc::new(TokioBackend::with_config(config));
    let bus = EventBus::new(backend.clone());
    bus.init()?;

    let totals = Arc::new(SensorTotals {
        readings: AtomicU64::new(0),
        sum: AtomicU64::new(0),
    });
    bus.subscribe_with_context(EVT_SENSOR, on_sensor, totals.clone())?;
    let tick = bus.subscribe(EVT_TICK, |envelope: &Envelope| {
        tracing::info!("tick {:?}", envelope.payload());
    })?;

    for i in 0..4u8 {
        bus.publish(EVT_TICK, &[i])?;
        bus.publish(EVT_SENSOR, &(u16::from(i) * 100).to_le_bytes())?;
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    bus.unsubscribe(tick);
    bus.publish(EVT_TICK, &[0xFF])?;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let stats = backend.stats();
    tracing::info!(
        "Dispatched {} events, {} heartbeats, {} sensor readings (sum {})",
        stats.events_dispatched,
        stats.beat_count,
        totals.readings.load(Ordering::Relaxed),
        totals.sum.load(Ordering::Relaxed)
    );

    backend.shutdown().await;
    Ok(())
}
