//! Network credentials as delivered by the provisioning broadcast.
//!
//! Every field is kept at its fixed on-air width. Network names and secrets
//! are byte strings, not text: they may contain NUL or non-printable bytes
//! and are copied verbatim from the decoded broadcast into the association
//! request.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Width of the network name field.
pub const SSID_LEN: usize = 32;
/// Width of the secret field.
pub const PASSWORD_LEN: usize = 64;
/// Width of a MAC-style access point identifier.
pub const BSSID_LEN: usize = 6;
/// Width of the vendor data block carried by ESP-TOUCH V2 broadcasts.
pub const RESERVED_DATA_LEN: usize = 33;

pub type Bssid = [u8; BSSID_LEN];

/// Broadcast scheme the provisioning listener is tuned to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisioningKind {
    #[default]
    EspTouch,
    AirKiss,
    EspTouchAirKiss,
    EspTouchV2,
}

impl ProvisioningKind {
    /// Only the V2 scheme has room for the extra vendor block.
    pub fn carries_reserved_data(self) -> bool {
        matches!(self, ProvisioningKind::EspTouchV2)
    }
}

/// A decoded "credentials found" broadcast.
#[derive(Clone, PartialEq, Eq)]
pub struct ProvisioningPayload {
    pub kind: ProvisioningKind,
    pub ssid: [u8; SSID_LEN],
    pub password: [u8; PASSWORD_LEN],
    pub bssid_set: bool,
    pub bssid: Bssid,
}

impl fmt::Debug for ProvisioningPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisioningPayload")
            .field("kind", &self.kind)
            .field("ssid", &DisplayBytes(&self.ssid))
            .field("password", &"<redacted>")
            .field("bssid_set", &self.bssid_set)
            .field("bssid", &MacAddr(&self.bssid))
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialsError {
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

impl fmt::Display for CredentialsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialsError::TooLong { field, len, max } => {
                write!(f, "{field} is {len} bytes, at most {max} allowed")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CredentialsError {}

/// Credentials handed to the network stack for an association request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    ssid: [u8; SSID_LEN],
    password: [u8; PASSWORD_LEN],
    bssid: Option<Bssid>,
}

impl Credentials {
    /// Build credentials from variable-length byte strings, zero padded to
    /// the field widths.
    pub fn new(ssid: &[u8], password: &[u8]) -> Result<Self, CredentialsError> {
        if ssid.len() > SSID_LEN {
            return Err(CredentialsError::TooLong {
                field: "ssid",
                len: ssid.len(),
                max: SSID_LEN,
            });
        }
        if password.len() > PASSWORD_LEN {
            return Err(CredentialsError::TooLong {
                field: "password",
                len: password.len(),
                max: PASSWORD_LEN,
            });
        }

        let mut creds = Self::from_raw([0; SSID_LEN], [0; PASSWORD_LEN], None);
        creds.ssid[..ssid.len()].copy_from_slice(ssid);
        creds.password[..password.len()].copy_from_slice(password);
        Ok(creds)
    }

    pub fn from_raw(ssid: [u8; SSID_LEN], password: [u8; PASSWORD_LEN], bssid: Option<Bssid>) -> Self {
        Self {
            ssid,
            password,
            bssid,
        }
    }

    /// Decode a provisioning broadcast. The target BSSID is only pinned when
    /// the broadcast marked it valid and the caller opted in.
    pub fn from_payload(payload: &ProvisioningPayload, pin_bssid: bool) -> Self {
        let bssid = (pin_bssid && payload.bssid_set).then_some(payload.bssid);
        Self::from_raw(payload.ssid, payload.password, bssid)
    }

    pub fn ssid(&self) -> &[u8; SSID_LEN] {
        &self.ssid
    }

    pub fn password(&self) -> &[u8; PASSWORD_LEN] {
        &self.password
    }

    pub fn bssid(&self) -> Option<Bssid> {
        self.bssid
    }

    /// A stored configuration counts as present when the name field is not
    /// empty, i.e. its first byte is not NUL.
    pub fn is_configured(&self) -> bool {
        self.ssid[0] != 0
    }

    /// Printable view of the network name for log lines.
    pub fn display_ssid(&self) -> DisplayBytes<'_> {
        DisplayBytes(&self.ssid)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.display_ssid())
            .field("password", &"<redacted>")
            .field("bssid", &self.bssid.as_ref().map(MacAddr))
            .finish()
    }
}

/// Prints a byte string up to its first NUL, escaping anything that is not
/// printable ASCII.
pub struct DisplayBytes<'a>(pub &'a [u8]);

impl fmt::Display for DisplayBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(self.0.len());
        for &b in &self.0[..end] {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for DisplayBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// `AA:BB:CC:DD:EE:FF` formatting for a BSSID.
pub struct MacAddr<'a>(pub &'a Bssid);

impl fmt::Display for MacAddr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl fmt::Debug for MacAddr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(ssid: &[u8], password: &[u8]) -> ProvisioningPayload {
        let mut p = ProvisioningPayload {
            kind: ProvisioningKind::EspTouch,
            ssid: [0; SSID_LEN],
            password: [0; PASSWORD_LEN],
            bssid_set: true,
            bssid: [0x24, 0x0a, 0xc4, 0x00, 0x01, 0x02],
        };
        p.ssid[..ssid.len()].copy_from_slice(ssid);
        p.password[..password.len()].copy_from_slice(password);
        p
    }

    #[test]
    fn decoding_keeps_embedded_nul_and_control_bytes() {
        let mut ssid = [0u8; SSID_LEN];
        for (i, b) in ssid.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(7);
        }
        let mut password = [0xffu8; PASSWORD_LEN];
        password[10] = 0;
        password[11] = 0x1b;

        let mut p = payload(b"", b"");
        p.ssid = ssid;
        p.password = password;

        let creds = Credentials::from_payload(&p, false);
        assert_eq!(creds.ssid(), &ssid);
        assert_eq!(creds.password(), &password);
    }

    #[test]
    fn bssid_is_pinned_only_when_set_and_requested() {
        let p = payload(b"home", b"hunter22");
        assert_eq!(Credentials::from_payload(&p, false).bssid(), None);
        assert_eq!(Credentials::from_payload(&p, true).bssid(), Some(p.bssid));

        let mut unset = p.clone();
        unset.bssid_set = false;
        assert_eq!(Credentials::from_payload(&unset, true).bssid(), None);
    }

    #[test]
    fn new_rejects_oversized_fields() {
        let long_ssid = [b'a'; SSID_LEN + 1];
        assert_eq!(
            Credentials::new(&long_ssid, b"pw"),
            Err(CredentialsError::TooLong {
                field: "ssid",
                len: SSID_LEN + 1,
                max: SSID_LEN
            })
        );

        let long_pw = [b'a'; PASSWORD_LEN + 1];
        assert!(Credentials::new(b"net", &long_pw).is_err());
        assert!(Credentials::new(&[b'a'; SSID_LEN], &[b'b'; PASSWORD_LEN]).is_ok());
    }

    #[test]
    fn empty_name_is_not_configured() {
        assert!(!Credentials::new(b"", b"secret").unwrap().is_configured());
        assert!(Credentials::new(b"x", b"").unwrap().is_configured());
    }

    #[test]
    fn debug_output_hides_the_secret() {
        let creds = Credentials::new(b"cafe\x01", b"topsecret").unwrap();
        let shown = format!("{creds:?}");
        assert!(shown.contains("cafe\\x01"));
        assert!(!shown.contains("topsecret"));

        let shown = format!("{:?}", payload(b"cafe", b"topsecret"));
        assert!(!shown.contains("topsecret"));
        assert!(shown.contains("24:0A:C4:00:01:02"));
    }

    #[test]
    fn only_v2_carries_reserved_data() {
        assert!(ProvisioningKind::EspTouchV2.carries_reserved_data());
        assert!(!ProvisioningKind::EspTouch.carries_reserved_data());
        assert!(!ProvisioningKind::AirKiss.carries_reserved_data());
    }
}
