//! Desk simulation: the whole node on an in-memory radio and collector.
//!
//! Boots with an empty settings store, provisions itself from a simulated
//! broadcast and reports until a restart is requested or Ctrl-C.

use anyhow::{bail, Context};
use fossor::prelude::*;
use fossor::sim::{self, OsRandom, SessionScript, SimRadio, SimTransport};
use fossor_common::{ProvisioningKind, ProvisioningPayload, PASSWORD_LEN, SSID_LEN};
use std::sync::Arc;

fn desk_broadcast(kind: ProvisioningKind) -> ProvisioningPayload {
    let mut ssid = [0u8; SSID_LEN];
    ssid[..8].copy_from_slice(b"desk-net");
    let mut password = [0u8; PASSWORD_LEN];
    password[..12].copy_from_slice(b"correcthorse");
    ProvisioningPayload {
        kind,
        ssid,
        password,
        bssid_set: true,
        bssid: [0x02, 0x00, 0x5e, 0x10, 0x00, 0x01],
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fossor::init_logging();

    let config = Config::load_or_default().context("loading config.ron")?;
    log::info!("desk node starting, mean interval {} min", config.mean_interval_minutes);

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let radio = Arc::new(SimRadio::with_events(
        tx.clone(),
        Some(desk_broadcast(config.provisioning.kind)),
    ));
    let transport = Arc::new(SimTransport::always(SessionScript::Acknowledge));
    let (ctx, handles) = sim::context(config, radio, transport, Arc::new(OsRandom));

    let manager = Arc::new(ConnectivityManager::new(ctx, tokio::runtime::Handle::current())?);
    tokio::spawn(sim::run_event_pump(manager.clone(), rx));
    tx.send(NetworkEvent::AssociationStarted)?;

    tokio::select! {
        _ = handles.restart.requested().wait() => {
            bail!("restart requested: {}", handles.restart.reasons().join(", "));
        }
        res = tokio::signal::ctrl_c() => {
            res?;
            let log = handles.transport.log();
            log::info!(
                "shutting down in state {:?} after {} delivered reports",
                manager.state(),
                log.delivered.len()
            );
        }
    }
    Ok(())
}
