use navigate_sensorhub_hal::bus::i2c::I2CBus;
use navigate_sensorhub_hal::config::UnitEntry;
use navigate_sensorhub_hal::header::LengthField;
use navigate_sensorhub_hal::{
    init_tracing, load_hal_config, HalError, RxHandler, SensorHubHal,
};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

fn chunk_logger(unit: usize) -> Arc<dyn RxHandler> {
    Arc::new(move |chunk: &[u8], t_us: u64| match LengthField::parse(chunk) {
        Some(field) => debug!(
            "[unit{}] {} byte chunk of {} byte packet (continuation={}) at {}us",
            unit,
            chunk.len(),
            field.cargo_len,
            field.continuation,
            t_us
        ),
        None => warn!("[unit{}] chunk too short for a header: {:?}", unit, chunk),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=debug to see every delivered chunk
    init_tracing();

    info!("[SensorHubHal] starting up...");

    // Load configuration from CONFIG_PATH or default
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string());
    let hal_config_path = format!("{}/hal.toml", config_path);
    let config = load_hal_config(&hal_config_path)?;
    info!("[config] loaded {} ({} unit(s))", hal_config_path, config.unit_count());

    let bus = I2CBus::new(&config.bus.path).map_err(HalError::from)?;
    info!("[i2c] using {}", bus.path());

    // Reset and boot lines are not wired to the host on this board
    let hal = SensorHubHal::init(&config, Box::new(bus), Vec::new())?;

    let units: Vec<UnitEntry> = if config.units.is_empty() {
        vec![UnitEntry {
            id: 0,
            address: None,
            dfu_address: None,
            dfu_mode: false,
        }]
    } else {
        config.units.clone()
    };
    for entry in &units {
        hal.reset(entry.id, entry.dfu_mode, Some(chunk_logger(entry.id)))
            .await?;
    }

    match config.events.data_ready_interval_ms {
        Some(period_ms) => {
            let bridge = hal.event_bridge();
            let unit_count = hal.unit_count();
            info!("[main] synthesizing data-ready every {}ms", period_ms);
            tokio::spawn(async move {
                let mut tick = interval(Duration::from_millis(period_ms));
                loop {
                    tick.tick().await;
                    for unit in 0..unit_count {
                        bridge.signal_unit(unit);
                    }
                }
            });
        }
        None => warn!("[main] no data-ready source configured; only direct transfers will run"),
    }

    let mut report = interval(Duration::from_secs(5));
    loop {
        report.tick().await;
        match hal.stats().to_json() {
            Ok(json) => info!("[stats] {}", json),
            Err(e) => error!("[stats] serialization failed: {}", e),
        }
    }
}
