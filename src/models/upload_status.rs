//! Progress of a single upload workflow run.

use serde::{Serialize, Serializer, ser::SerializeMap};
use std::fmt;

/// Workflow phases, in the order they complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UploadPhase {
    Cover,
    StepImages,
    Files,
    Database,
    Complete,
}

impl UploadPhase {
    pub const ALL: [UploadPhase; 5] = [
        UploadPhase::Cover,
        UploadPhase::StepImages,
        UploadPhase::Files,
        UploadPhase::Database,
        UploadPhase::Complete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UploadPhase::Cover => "Cover",
            UploadPhase::StepImages => "Step Images",
            UploadPhase::Files => "Files",
            UploadPhase::Database => "Database",
            UploadPhase::Complete => "Complete",
        }
    }
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase -> done flags. Starts all-false; flags only ever flip to true.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UploadStatus {
    done: [bool; 5],
}

impl UploadStatus {
    pub fn is_done(&self, phase: UploadPhase) -> bool {
        self.done[phase as usize]
    }

    pub fn mark(&mut self, phase: UploadPhase) {
        self.done[phase as usize] = true;
    }

    /// Last phase marked done, if any.
    pub fn last_completed(&self) -> Option<UploadPhase> {
        UploadPhase::ALL
            .into_iter()
            .rev()
            .find(|phase| self.is_done(*phase))
    }

    pub fn is_complete(&self) -> bool {
        self.is_done(UploadPhase::Complete)
    }
}

impl Serialize for UploadStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(UploadPhase::ALL.len()))?;
        for phase in UploadPhase::ALL {
            map.serialize_entry(phase.as_str(), &self.is_done(phase))?;
        }
        map.end()
    }
}
