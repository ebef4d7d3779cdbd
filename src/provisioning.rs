//! Out-of-band provisioning: listen for a credentials broadcast, apply it,
//! and wait for the listener to acknowledge receipt to the sender.
//!
//! Events reach the flow synchronously from the connectivity manager's
//! dispatcher through [`ProvisioningFlow::handle`]. The flow's own task,
//! [`ProvisioningFlow::run`], only waits on the resulting signals.

use crate::event::NetworkEvent;
use crate::platform::{NodeContext, PlatformError};
use crate::signal::Flag;
use fossor_common::{Credentials, MacAddr, ProvisioningPayload};
use std::fmt;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProvisioningError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

pub struct ProvisioningFlow {
    ctx: NodeContext,
    /// Set once the listener has acknowledged the broadcast.
    done: Flag,
    /// Association edge, consumed by the waiting task.
    connected: Flag,
    /// A credentials broadcast has been applied.
    received: Flag,
}

impl ProvisioningFlow {
    pub fn new(ctx: NodeContext) -> Self {
        Self {
            ctx,
            done: Flag::new(),
            connected: Flag::new(),
            received: Flag::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.is_set()
    }

    pub fn credentials_received(&self) -> bool {
        self.received.is_set()
    }

    /// Start the listener and wait for the acknowledgment. The listener is
    /// stopped before returning.
    pub async fn run(&self) -> Result<(), ProvisioningError> {
        let kind = self.ctx.config.provisioning.kind;
        let timeout = self.ctx.config.provisioning_timeout();

        self.ctx.listener.start(kind)?;
        info!("provisioning: listening for {:?} broadcast", kind);

        let mut deadline = timeout.map(|t| Instant::now() + t);
        loop {
            tokio::select! {
                _ = self.done.wait() => break,
                _ = self.connected.wait() => {
                    self.connected.clear();
                    info!("provisioning: WiFi connected to access point");
                }
                _ = sleep_until(deadline) => {
                    if self.received.is_set() {
                        // credentials are in, only the ack is outstanding
                        deadline = None;
                        continue;
                    }
                    warn!("provisioning: no credentials yet, restarting listener");
                    if let Err(e) = self.ctx.listener.stop() {
                        warn!("provisioning: {}", e);
                    }
                    self.ctx.listener.start(kind)?;
                    deadline = timeout.map(|t| Instant::now() + t);
                }
            }
        }

        info!("provisioning: smartconfig over");
        self.ctx.listener.stop()?;
        Ok(())
    }

    /// React to one network event. Never blocks.
    pub fn handle(&self, event: &NetworkEvent) {
        match event {
            NetworkEvent::ProvisioningScanDone => info!("provisioning: scan done"),
            NetworkEvent::ProvisioningChannelFound => info!("provisioning: found channel"),
            NetworkEvent::ProvisioningCredentialsFound(payload) => {
                if let Err(e) = self.apply(payload) {
                    error!("provisioning: credentials not applied: {}", e);
                }
            }
            NetworkEvent::ProvisioningAckSent => {
                info!("provisioning: ack sent");
                self.done.set();
            }
            _ => {}
        }
    }

    /// The station got an address while the flow was alive.
    pub fn on_associated(&self) {
        self.connected.set();
    }

    pub fn connection_lost(&self) {
        self.connected.clear();
    }

    fn apply(&self, payload: &ProvisioningPayload) -> Result<(), ProvisioningError> {
        info!("provisioning: got SSID and password");

        let pin = self.ctx.config.provisioning.set_target_bssid;
        let credentials = Credentials::from_payload(payload, pin);
        info!("provisioning: SSID: {}", credentials.display_ssid());
        if let Some(bssid) = credentials.bssid() {
            info!("provisioning: target BSSID: {}", MacAddr(&bssid));
        }

        if payload.kind.carries_reserved_data() {
            match self.ctx.listener.reserved_data() {
                Ok(data) => info!("provisioning: RVD_DATA: {}", Hex(&data)),
                Err(e) => warn!("provisioning: {}", e),
            }
        }

        self.received.set();

        // Not associated yet is the common case here.
        if let Err(e) = self.ctx.network.disconnect() {
            debug!("provisioning: {}", e);
        }
        self.ctx.network.apply_credentials(&credentials)?;
        self.ctx.network.connect()?;
        Ok(())
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

struct Hex<'a>(&'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::sim::{test_context_with, RadioCall};
    use fossor_common::{ProvisioningKind, PASSWORD_LEN, SSID_LEN};
    use std::sync::Arc;
    use std::time::Duration;

    fn payload(kind: ProvisioningKind, bssid_set: bool) -> ProvisioningPayload {
        let mut ssid = [0u8; SSID_LEN];
        ssid[..5].copy_from_slice(b"att\0c");
        let mut password = [0u8; PASSWORD_LEN];
        password[..4].copy_from_slice(&[0xff, 0x00, 0x7f, b'x']);
        ProvisioningPayload {
            kind,
            ssid,
            password,
            bssid_set,
            bssid: [0xde, 0xad, 0xbe, 0xef, 0x00, 0x01],
        }
    }

    fn flow_with(config: Config) -> (Arc<ProvisioningFlow>, crate::sim::SimHandles) {
        let (ctx, sim) = test_context_with(config, []);
        (Arc::new(ProvisioningFlow::new(ctx)), sim)
    }

    #[test]
    fn credentials_reach_the_stack_byte_for_byte() {
        let (flow, sim) = flow_with(Config::default());
        let sent = payload(ProvisioningKind::EspTouch, true);

        flow.handle(&NetworkEvent::ProvisioningCredentialsFound(sent.clone()));

        let applied = sim.radio.applied().pop().unwrap();
        assert_eq!(applied.ssid(), &sent.ssid);
        assert_eq!(applied.password(), &sent.password);
        // not pinned unless configured
        assert_eq!(applied.bssid(), None);
        assert_eq!(
            sim.radio.calls(),
            vec![RadioCall::Disconnect, RadioCall::Apply, RadioCall::Connect]
        );
        assert!(flow.credentials_received());
    }

    #[test]
    fn bssid_is_pinned_only_when_enabled_and_valid() {
        let mut config = Config::default();
        config.provisioning.set_target_bssid = true;

        let (flow, sim) = flow_with(config.clone());
        flow.handle(&NetworkEvent::ProvisioningCredentialsFound(payload(
            ProvisioningKind::EspTouch,
            true,
        )));
        assert_eq!(
            sim.radio.applied().pop().unwrap().bssid(),
            Some([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01])
        );

        let (flow, sim) = flow_with(config);
        flow.handle(&NetworkEvent::ProvisioningCredentialsFound(payload(
            ProvisioningKind::EspTouch,
            false,
        )));
        assert_eq!(sim.radio.applied().pop().unwrap().bssid(), None);
    }

    #[test]
    fn reserved_data_is_read_only_for_v2() {
        let (flow, sim) = flow_with(Config::default());
        flow.handle(&NetworkEvent::ProvisioningCredentialsFound(payload(
            ProvisioningKind::EspTouch,
            false,
        )));
        assert_eq!(sim.radio.reserved_reads(), 0);

        flow.handle(&NetworkEvent::ProvisioningCredentialsFound(payload(
            ProvisioningKind::EspTouchV2,
            false,
        )));
        assert_eq!(sim.radio.reserved_reads(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_ends_on_ack_and_stops_the_listener() {
        let (flow, sim) = flow_with(Config::default());
        let task = tokio::spawn({
            let flow = flow.clone();
            async move { flow.run().await }
        });
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!task.is_finished());
        assert!(sim.radio.listening());

        flow.on_associated();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!task.is_finished());

        flow.handle(&NetworkEvent::ProvisioningAckSent);
        assert_eq!(task.await.unwrap(), Ok(()));
        assert!(flow.is_done());
        assert!(!sim.radio.listening());
        assert_eq!(sim.radio.listener_starts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn without_timeout_the_listener_waits_forever() {
        let (flow, sim) = flow_with(Config::default());
        let task = tokio::spawn({
            let flow = flow.clone();
            async move { flow.run().await }
        });
        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        assert!(!task.is_finished());
        assert_eq!(sim.radio.listener_starts(), 1);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_restarts_the_listener_until_credentials_arrive() {
        let mut config = Config::default();
        config.provisioning.timeout_secs = Some(60);
        let (flow, sim) = flow_with(config);
        let task = tokio::spawn({
            let flow = flow.clone();
            async move { flow.run().await }
        });

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(sim.radio.listener_starts(), 3);

        flow.handle(&NetworkEvent::ProvisioningCredentialsFound(payload(
            ProvisioningKind::EspTouch,
            false,
        )));
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(sim.radio.listener_starts(), 3);

        flow.handle(&NetworkEvent::ProvisioningAckSent);
        assert_eq!(task.await.unwrap(), Ok(()));
    }

    #[test]
    fn hex_is_lowercase_and_padded() {
        assert_eq!(Hex(&[0x00, 0x0a, 0xff]).to_string(), "000aff");
    }
}
