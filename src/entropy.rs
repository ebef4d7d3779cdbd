use crate::platform::RandomSource;
use fossor_common::{EntropyReport, ReportBody};
use std::fmt;

/// 64 bits of fresh randomness for one report cycle.
///
/// Not `Clone` or `Copy`: a value is drawn, turned into exactly one report
/// body and gone. `Debug` never shows the bits.
pub struct EntropyValue(u64);

impl EntropyValue {
    /// Two 32-bit draws, the first one in the high half.
    pub fn draw(random: &dyn RandomSource) -> Self {
        let high = u64::from(random.next_u32());
        let low = u64::from(random.next_u32());
        Self((high << 32) | low)
    }

    pub fn into_body(self) -> ReportBody {
        EntropyReport::new(self.0).body()
    }
}

impl fmt::Debug for EntropyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EntropyValue(<redacted>)")
    }
}
