//! The entropy report record and the fixed publish parameters.

use core::fmt::{self, Write};
use serde::{Deserialize, Serialize};

/// Topic every report is published to.
pub const TOPIC: &str = "entropy/zero";
/// "At least once" delivery.
pub const QOS: u8 = 1;
pub const RETAIN: bool = false;
/// MQTT over TLS.
pub const DEFAULT_PORT: u16 = 8883;
/// Upper bound on the serialized body.
pub const MAX_BODY_LEN: usize = 64;

/// One report as it appears on the wire: `{"entropy": <u64>}`.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntropyReport {
    pub entropy: u64,
}

impl EntropyReport {
    pub fn new(entropy: u64) -> Self {
        Self { entropy }
    }

    /// Serialize into the compact body the collector expects.
    pub fn body(&self) -> ReportBody {
        let mut body = ReportBody::empty();
        // 34 bytes at most, so the fixed buffer always fits.
        let _ = write!(body, "{{\"entropy\": {}}}", self.entropy);
        body
    }

    /// Parse a body received by a collector.
    #[cfg(feature = "std")]
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// Fixed-capacity buffer holding a serialized report.
#[derive(Clone)]
pub struct ReportBody {
    buf: [u8; MAX_BODY_LEN],
    len: usize,
}

impl ReportBody {
    fn empty() -> Self {
        Self {
            buf: [0; MAX_BODY_LEN],
            len: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Write for ReportBody {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.len + s.len();
        if end > MAX_BODY_LEN {
            return Err(fmt::Error);
        }
        self.buf[self.len..end].copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }
}

// Bodies carry entropy; keep them out of debug output.
impl fmt::Debug for ReportBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReportBody({} bytes)", self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_matches_wire_format() {
        assert_eq!(EntropyReport::new(0).body().as_bytes(), b"{\"entropy\": 0}");
        assert_eq!(
            EntropyReport::new(u64::MAX).body().as_bytes(),
            b"{\"entropy\": 18446744073709551615}"
        );
    }

    #[test]
    fn largest_body_fits() {
        let body = EntropyReport::new(u64::MAX).body();
        assert!(body.len() <= MAX_BODY_LEN);
        assert!(!body.is_empty());
    }

    #[test]
    fn collector_reads_back_the_value() {
        let value = 0xDEAD_BEEF_0BAD_F00D;
        let body = EntropyReport::new(value).body();
        assert_eq!(EntropyReport::parse(body.as_bytes()).unwrap().entropy, value);
    }

    #[test]
    fn overflow_is_refused() {
        let mut body = ReportBody::empty();
        assert!(body.write_str(&"x".repeat(MAX_BODY_LEN)).is_ok());
        assert!(body.write_str("y").is_err());
        assert_eq!(body.len(), MAX_BODY_LEN);
    }

    #[test]
    fn debug_does_not_leak_the_body() {
        let body = EntropyReport::new(123_456_789).body();
        assert!(!format!("{body:?}").contains("123456789"));
    }
}
