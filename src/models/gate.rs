//! Daily pre-scan quality gate counters.

use serde::{Deserialize, Serialize};

/// Failed attempts allowed per day before the UI should stop offering scans.
pub const GATE_DAILY_ATTEMPTS: u32 = 3;

/// Counter stored at `users/{uid}/gate/{YYYY-MM-DD}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateCounter {
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub passed: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl GateCounter {
    /// Attempts left today. Advisory: nothing server-side enforces it.
    pub fn remaining(&self) -> u32 {
        GATE_DAILY_ATTEMPTS.saturating_sub(self.failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_never_goes_negative() {
        let mut counter = GateCounter::default();
        assert_eq!(counter.remaining(), 3);
        counter.failed = 2;
        assert_eq!(counter.remaining(), 1);
        counter.failed = 7;
        assert_eq!(counter.remaining(), 0);
    }
}
