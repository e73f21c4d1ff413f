//! Parser health counters.

use serde::Serialize;

/// Cumulative parse statistics owned by one parser instance.
///
/// Counters only ever grow; there is no reset. A rising unknown ratio is
/// the earliest signal that the model prompt and the parser have drifted
/// apart.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParserMetrics {
    pub total_outputs: u64,
    pub degraded_outputs: u64,
    pub unknown_outputs: u64,
}

impl ParserMetrics {
    /// Record one parse outcome.
    pub fn record(&mut self, degraded: bool, unknown: bool) {
        self.total_outputs += 1;
        if degraded {
            self.degraded_outputs += 1;
        }
        if unknown {
            self.unknown_outputs += 1;
        }
    }

    /// Share of parses that produced an UNKNOWN sentinel.
    pub fn unknown_ratio(&self) -> f64 {
        if self.total_outputs == 0 {
            0.0
        } else {
            self.unknown_outputs as f64 / self.total_outputs as f64
        }
    }
}
