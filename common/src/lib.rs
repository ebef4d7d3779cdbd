//! Wire-level types shared between the node core and the device firmware.
//!
//! Nothing in here touches a network or a clock. The crate builds without
//! `std` so the firmware can pull in the same record layouts the host tests
//! exercise.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod credentials;
pub mod report;

pub use credentials::{
    Bssid, Credentials, CredentialsError, DisplayBytes, MacAddr, ProvisioningKind, ProvisioningPayload,
    BSSID_LEN, PASSWORD_LEN, RESERVED_DATA_LEN, SSID_LEN,
};
pub use report::{EntropyReport, ReportBody, DEFAULT_PORT, MAX_BODY_LEN, QOS, RETAIN, TOPIC};
