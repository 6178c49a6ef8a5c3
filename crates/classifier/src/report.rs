//! Per-frame recognition result

use std::fmt;
use std::time::Duration;

use inference_engine::RankedLabel;
use serde::{Deserialize, Serialize};

/// Ranked labels for one frame plus the interpreter time it took
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    /// Sequence number of the source frame
    pub sequence: u64,
    /// Interpreter wall-clock time in milliseconds
    pub elapsed_ms: u64,
    /// Most confident first
    pub top: Vec<RankedLabel>,
}

impl Recognition {
    pub fn new(sequence: u64, elapsed: Duration, top: Vec<RankedLabel>) -> Self {
        Self {
            sequence,
            elapsed_ms: elapsed.as_millis() as u64,
            top,
        }
    }

    /// Best label, if any
    pub fn best(&self) -> Option<&RankedLabel> {
        self.top.first()
    }
}

impl fmt::Display for Recognition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Recognition: {} msec \n", self.elapsed_ms)?;
        for entry in &self.top {
            write!(f, "\n   {}: {:.6}", entry.label, entry.score)?;
        }
        Ok(())
    }
}
