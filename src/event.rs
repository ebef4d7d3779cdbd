//! The closed set of events the node reacts to.
//!
//! Network and provisioning events are consumed by the connectivity
//! manager's dispatcher; session events by the dispatcher of the publish
//! session that registered for them.

use fossor_common::ProvisioningPayload;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// The station interface came up.
    AssociationStarted,
    /// Association failed or the link dropped. `reason` is the driver's
    /// 802.11 reason code.
    Disconnected { reason: u8 },
    AddressAcquired { ip: Ipv4Addr },
    ProvisioningScanDone,
    ProvisioningChannelFound,
    ProvisioningCredentialsFound(ProvisioningPayload),
    /// The listener has confirmed receipt to the provisioning app.
    ProvisioningAckSent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Published { msg_id: i32 },
    Disconnected,
    ProtocolError { detail: String },
}

/// Symbolic name for a station disconnect reason code.
pub fn disconnect_reason(reason: u8) -> &'static str {
    match reason {
        2 => "AUTH_EXPIRE",
        3 => "AUTH_LEAVE",
        4 => "ASSOC_EXPIRE",
        5 => "ASSOC_TOOMANY",
        6 => "NOT_AUTHED",
        7 => "NOT_ASSOCED",
        8 => "ASSOC_LEAVE",
        15 => "4WAY_HANDSHAKE_TIMEOUT",
        23 => "802_1X_AUTH_FAILED",
        200 => "BEACON_TIMEOUT",
        201 => "NO_AP_FOUND",
        202 => "AUTH_FAIL",
        203 => "ASSOC_FAIL",
        204 => "HANDSHAKE_TIMEOUT",
        205 => "CONNECTION_FAIL",
        _ => "UNKNOWN",
    }
}
