//! Core of a self-provisioning entropy reporting node.
//!
//! The node joins a WiFi network (provisioning itself over a broadcast when
//! it has no credentials), then forever waits a Poisson-distributed interval,
//! draws 64 random bits and publishes them over a fresh mutually
//! authenticated session. Hardware sits behind the traits in [`platform`];
//! the device firmware and [`sim`] provide implementations.

#[macro_use]
mod logging;

pub mod config;
pub mod connectivity;
pub mod entropy;
pub mod event;
pub mod interval;
pub mod platform;
pub mod provisioning;
pub mod report;
pub mod session;
pub mod signal;
pub mod sim;

#[cfg(feature = "desk")]
pub use logging::init as init_logging;

pub mod prelude {
    pub use crate::{
        config::Config,
        connectivity::{ConnectivityManager, ConnectivityState},
        event::{NetworkEvent, SessionEvent},
        platform::{
            NetworkStack, NodeContext, PlatformError, ProvisioningListener, RandomSource, RestartHandle,
            SecureTransport, TransportSession,
        },
        session::{SessionError, SessionEventSink, SessionParams, TlsMaterial},
    };
}
