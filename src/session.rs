//! Secure publish session: one mutually authenticated connection that
//! delivers exactly one report and is then torn down.
//!
//! The transport's callbacks write the session phase into a [`SessionStatus`]
//! cell through a [`SessionEventSink`]; the publishing task is the only
//! reader. It polls the cell with a bounded wait, so it never blocks longer
//! than the configured poll interval without re-checking.

use crate::event::SessionEvent;
use crate::platform::{NodeContext, TransportSession};
use fossor_common::{ReportBody, QOS, RETAIN, TOPIC};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The client object could not be built.
    #[error("client not created: {0}")]
    Construct(String),
    #[error("client not started: {0}")]
    Start(String),
    #[error("report could not be queued: {0}")]
    Enqueue(String),
    #[error("client did not stop cleanly: {0}")]
    Stop(String),
    /// The secure channel reported a protocol-level failure.
    #[error("protocol error on secure channel")]
    Protocol,
}

impl SessionError {
    /// Fatal errors are not recovered in-process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Protocol)
    }
}

/// Non-fatal terminal states of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Acknowledged,
    /// The link dropped before the report was acknowledged.
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionPhase {
    Idle = 0,
    Connected = 1,
    Acknowledged = 2,
    Disconnected = 3,
    ProtocolError = 4,
}

impl SessionPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SessionPhase::Connected,
            2 => SessionPhase::Acknowledged,
            3 => SessionPhase::Disconnected,
            4 => SessionPhase::ProtocolError,
            _ => SessionPhase::Idle,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionPhase::Acknowledged | SessionPhase::Disconnected | SessionPhase::ProtocolError
        )
    }

    /// Phase after `event`, or `None` if the event does not move it.
    /// Terminal phases are final, except that a protocol error always wins.
    fn next(self, event: &SessionEvent) -> Option<SessionPhase> {
        match (self, event) {
            (SessionPhase::ProtocolError, _) => None,
            (_, SessionEvent::ProtocolError { .. }) => Some(SessionPhase::ProtocolError),
            (phase, _) if phase.is_terminal() => None,
            (SessionPhase::Idle, SessionEvent::Connected) => Some(SessionPhase::Connected),
            (SessionPhase::Connected, SessionEvent::Connected) => None,
            (_, SessionEvent::Published { .. }) => Some(SessionPhase::Acknowledged),
            (_, SessionEvent::Disconnected) => Some(SessionPhase::Disconnected),
            _ => None,
        }
    }
}

/// Single-writer, single-reader phase cell for one session.
#[derive(Debug)]
pub struct SessionStatus {
    phase: AtomicU8,
    changed: Notify,
}

impl SessionStatus {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(SessionPhase::Idle as u8),
            changed: Notify::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn apply(&self, event: &SessionEvent) -> Option<SessionPhase> {
        let updated = self
            .phase
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                SessionPhase::from_u8(raw).next(event).map(|p| p as u8)
            })
            .ok()
            .map(|_| self.phase());
        if updated.is_some() {
            // notify_one keeps a permit if the reader is not parked yet
            self.changed.notify_one();
        }
        updated
    }

    /// Wait until the phase changes or `limit` passes.
    async fn wait_change(&self, limit: Duration) {
        let _ = tokio::time::timeout(limit, self.changed.notified()).await;
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// The one event entry point a transport gets for the life of a session.
#[derive(Debug, Clone)]
pub struct SessionEventSink {
    status: Arc<SessionStatus>,
}

impl SessionEventSink {
    pub fn new(status: Arc<SessionStatus>) -> Self {
        Self { status }
    }

    pub fn dispatch(&self, event: SessionEvent) {
        match &event {
            SessionEvent::Connected => info!("session: connected to collector"),
            SessionEvent::Published { msg_id } => info!("session: entropy received [msg_id={}]", msg_id),
            SessionEvent::Disconnected => info!("session: disconnected"),
            SessionEvent::ProtocolError { detail } => error!("session: protocol error: {}", detail),
        }
        if self.status.apply(&event).is_none() {
            debug!("session: {:?} ignored in phase {:?}", event, self.status.phase());
        }
    }
}

/// PEM material for the mutually authenticated channel.
#[derive(Clone)]
pub struct TlsMaterial {
    /// Trust anchor for the collector's certificate chain.
    pub ca_cert: String,
    pub client_cert: String,
    pub private_key: String,
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("ca_cert", &format_args!("{} bytes", self.ca_cert.len()))
            .field("client_cert", &format_args!("{} bytes", self.client_cert.len()))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SessionParams {
    pub broker_uri: String,
    pub port: u16,
    pub tls: TlsMaterial,
}

impl SessionParams {
    pub fn new(broker: &crate::config::Broker, tls: TlsMaterial) -> Self {
        Self {
            broker_uri: broker.uri.clone(),
            port: broker.port,
            tls,
        }
    }
}

/// Deliver `body` over a fresh session and tear the session down.
///
/// A protocol error requests a process restart through the context's
/// [`crate::platform::RestartHandle`] before returning
/// [`SessionError::Protocol`].
pub async fn publish(ctx: &NodeContext, body: ReportBody) -> Result<SessionOutcome, SessionError> {
    let status = Arc::new(SessionStatus::new());

    let mut client = ctx
        .transport
        .open(&ctx.session, SessionEventSink::new(status.clone()))
        .map_err(|e| {
            error!("session: MQTT client not created: {}", e);
            e
        })?;

    if let Err(e) = client.start() {
        error!("session: MQTT client not started: {}", e);
        return Err(e);
    }

    let poll = ctx.config.poll_interval();
    let mut sent = false;
    let result = loop {
        match status.phase() {
            SessionPhase::Idle => {}
            SessionPhase::Connected => {
                if !sent {
                    sent = true;
                    info!("session: sending entropy");
                    match client.enqueue(TOPIC, body.as_bytes(), QOS, RETAIN) {
                        Ok(msg_id) => debug!("session: report queued [msg_id={}]", msg_id),
                        Err(e) => {
                            error!("session: entropy not queued: {}", e);
                            break Err(e);
                        }
                    }
                }
            }
            SessionPhase::Acknowledged => break Ok(SessionOutcome::Acknowledged),
            SessionPhase::Disconnected => break Ok(SessionOutcome::Disconnected),
            SessionPhase::ProtocolError => {
                error!("session: EJECT! restarting device");
                ctx.restart.restart_process("protocol error on secure session");
                return Err(SessionError::Protocol);
            }
        }
        status.wait_change(poll).await;
    };

    teardown(client);
    result
}

fn teardown(mut client: Box<dyn TransportSession>) {
    if let Err(e) = client.stop() {
        warn!("session: {}", e);
    }
    drop(client);
    debug!("session: client destroyed");
}
