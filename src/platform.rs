//! Seams between the node's state machines and the hardware.
//!
//! The device firmware implements these over ESP-IDF; [`crate::sim`] has
//! in-memory versions for tests and the desk simulation. A [`NodeContext`]
//! bundles one of each and is cloned into every task at spawn time.

use crate::config::Config;
use crate::session::{SessionError, SessionEventSink, SessionParams};
use fossor_common::{Credentials, ProvisioningKind, RESERVED_DATA_LEN};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{op} failed: {detail}")]
pub struct PlatformError {
    pub op: &'static str,
    pub detail: String,
}

impl PlatformError {
    pub fn new(op: &'static str, detail: impl Into<String>) -> Self {
        Self {
            op,
            detail: detail.into(),
        }
    }
}

/// Source of uniformly distributed 32-bit words.
pub trait RandomSource: Send + Sync {
    fn next_u32(&self) -> u32;
}

/// The WiFi station driver. Calls return once the request is queued;
/// outcomes arrive later as [`crate::event::NetworkEvent`]s.
pub trait NetworkStack: Send + Sync {
    /// Credentials held by the driver's persistent settings store, if any.
    fn stored_credentials(&self) -> Option<Credentials>;

    /// Ask the driver to associate with the configured network.
    fn connect(&self) -> Result<(), PlatformError>;

    fn disconnect(&self) -> Result<(), PlatformError>;

    /// Replace the station configuration. The driver persists it.
    fn apply_credentials(&self, credentials: &Credentials) -> Result<(), PlatformError>;
}

/// The out-of-band broadcast listener used for provisioning.
pub trait ProvisioningListener: Send + Sync {
    fn start(&self, kind: ProvisioningKind) -> Result<(), PlatformError>;

    fn stop(&self) -> Result<(), PlatformError>;

    /// Vendor data block from the last V2 broadcast.
    fn reserved_data(&self) -> Result<[u8; RESERVED_DATA_LEN], PlatformError>;
}

/// Factory for secure publish sessions.
pub trait SecureTransport: Send + Sync {
    /// Construct a client and register `events` as its only event entry
    /// point. The client is not started.
    fn open(
        &self,
        params: &SessionParams,
        events: SessionEventSink,
    ) -> Result<Box<dyn TransportSession>, SessionError>;
}

/// One client built by [`SecureTransport::open`]. Dropping it destroys the
/// client and releases everything it holds.
pub trait TransportSession: Send {
    fn start(&mut self) -> Result<(), SessionError>;

    /// Queue one message. Returns the message id the acknowledgment will
    /// carry.
    fn enqueue(&mut self, topic: &str, payload: &[u8], qos: u8, retain: bool) -> Result<i32, SessionError>;

    fn stop(&mut self) -> Result<(), SessionError>;
}

/// The process-level restart used as the only recovery for fatal errors.
pub trait RestartHandle: Send + Sync {
    fn restart_process(&self, reason: &str);
}

/// Everything a task needs, handed over at spawn time.
#[derive(Clone)]
pub struct NodeContext {
    pub config: Arc<Config>,
    pub session: Arc<SessionParams>,
    pub network: Arc<dyn NetworkStack>,
    pub listener: Arc<dyn ProvisioningListener>,
    pub transport: Arc<dyn SecureTransport>,
    pub random: Arc<dyn RandomSource>,
    pub restart: Arc<dyn RestartHandle>,
}
