//! Network association state machine.
//!
//! [`ConnectivityManager::handle`] is called from the network stack's own
//! event-dispatch context, so it never blocks: anything long-running is
//! spawned onto the runtime behind a single-instance [`TaskSlot`].

use crate::event::{disconnect_reason, NetworkEvent};
use crate::interval::{InvalidMean, PoissonInterval};
use crate::platform::NodeContext;
use crate::provisioning::ProvisioningFlow;
use crate::report::ReportLoop;
use crate::signal::{Flag, SlotPolicy, TaskSlot};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Idle,
    Associating,
    Provisioning,
    Associated,
}

pub struct ConnectivityManager {
    ctx: NodeContext,
    runtime: Handle,
    interval: PoissonInterval,
    state: watch::Sender<ConnectivityState>,
    associated: Arc<Flag>,
    flow: Mutex<Option<Arc<ProvisioningFlow>>>,
    provisioning: TaskSlot,
    report: TaskSlot,
}

impl ConnectivityManager {
    pub fn new(ctx: NodeContext, runtime: Handle) -> Result<Self, InvalidMean> {
        let interval = PoissonInterval::new(ctx.config.mean_interval_minutes)?;
        let (state, _) = watch::channel(ConnectivityState::Idle);
        Ok(Self {
            ctx,
            runtime,
            interval,
            state,
            associated: Arc::new(Flag::new()),
            flow: Mutex::new(None),
            provisioning: TaskSlot::new("provisioning", SlotPolicy::Reusable),
            report: TaskSlot::new("report", SlotPolicy::Once),
        })
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }

    /// Level signal for "the station holds an address".
    pub fn associated(&self) -> Arc<Flag> {
        self.associated.clone()
    }

    pub fn provisioning_running(&self) -> bool {
        self.provisioning.is_running()
    }

    pub fn report_started(&self) -> bool {
        self.report.was_started()
    }

    pub fn handle(&self, event: NetworkEvent) {
        match event {
            NetworkEvent::AssociationStarted => self.on_start(),
            NetworkEvent::Disconnected { reason } => self.on_disconnected(reason),
            NetworkEvent::AddressAcquired { ip } => {
                info!("connectivity: got ip: {}", ip);
                self.on_associated();
            }
            provisioning => match self.current_flow() {
                Some(flow) => flow.handle(&provisioning),
                None => debug!("connectivity: {:?} with no provisioning flow", provisioning),
            },
        }
    }

    fn on_start(&self) {
        match self.ctx.network.stored_credentials() {
            Some(stored) if stored.is_configured() => {
                info!("connectivity: stored credentials for {}", stored.display_ssid());
                self.set_state(ConnectivityState::Associating);
                if let Err(e) = self.ctx.network.connect() {
                    warn!("connectivity: {}", e);
                }
            }
            _ => {
                info!("connectivity: no stored credentials, provisioning");
                self.start_provisioning();
            }
        }
    }

    fn on_disconnected(&self, reason: u8) {
        warn!(
            "connectivity: disconnected, reason {} ({})",
            reason,
            disconnect_reason(reason)
        );
        self.associated.clear();

        if self.provisioning.is_running() {
            if let Some(flow) = self.current_flow() {
                flow.connection_lost();
            }
            self.set_state(ConnectivityState::Provisioning);
        } else {
            self.set_state(ConnectivityState::Associating);
        }

        if let Err(e) = self.ctx.network.connect() {
            warn!("connectivity: reconnect not queued: {}", e);
        }
    }

    fn on_associated(&self) {
        self.associated.set();
        self.set_state(ConnectivityState::Associated);

        if let Some(flow) = self.current_flow() {
            flow.on_associated();
        }

        let report = ReportLoop::new(self.ctx.clone(), self.interval);
        self.report.spawn(&self.runtime, async move {
            if let Err(e) = report.run().await {
                error!("connectivity: report loop ended: {}", e);
            }
        });
    }

    fn start_provisioning(&self) {
        let flow = Arc::new(ProvisioningFlow::new(self.ctx.clone()));
        let task = flow.clone();
        if self.provisioning.spawn(&self.runtime, async move {
            if let Err(e) = task.run().await {
                error!("connectivity: provisioning failed: {}", e);
            }
        }) {
            *self.lock_flow() = Some(flow);
            self.set_state(ConnectivityState::Provisioning);
        }
    }

    fn current_flow(&self) -> Option<Arc<ProvisioningFlow>> {
        self.lock_flow().clone()
    }

    fn lock_flow(&self) -> std::sync::MutexGuard<'_, Option<Arc<ProvisioningFlow>>> {
        self.flow.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, next: ConnectivityState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!("connectivity: {:?} -> {:?}", prev, next);
        }
    }
}
