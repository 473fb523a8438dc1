use std::sync::Arc;
use tokio::time::sleep;
use tracing::info;

use crate::bus::transport::BusTransport;
use crate::config::TimingConfig;
use crate::registry::{RxHandler, Unit};

/// Reset a unit into normal or DFU mode while holding the bus lock.
///
/// The handler is registered and the unit's address switched before the
/// reset pulse. Afterwards the transport is flagged for reinitialization,
/// since the device reset can leave the peripheral mid-transfer.
pub async fn reset_unit(
    transport: &BusTransport,
    unit: &Unit,
    dfu_mode: bool,
    handler: Option<Arc<dyn RxHandler>>,
    timing: &TimingConfig,
) {
    let mut bus = transport.lock().await;

    unit.set_handler(handler);
    let address = unit.addresses().for_mode(dfu_mode);
    bus.set_address(unit.id(), address);

    unit.with_lines(|lines| lines.hold_in_reset(dfu_mode));
    sleep(timing.reset_delay()).await;
    unit.with_lines(|lines| lines.release_reset());

    if dfu_mode {
        // Bootloader needs time before it answers on the bus
        sleep(timing.dfu_boot_delay()).await;
    }

    bus.request_reinit();
    drop(bus);

    info!(
        "[sequencer] unit {} reset into {} mode at {:#04x}",
        unit.id().index(),
        if dfu_mode { "dfu" } else { "normal" },
        address
    );
}
