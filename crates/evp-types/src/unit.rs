use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubRunId {
    pub run: RunId,
    pub subrun: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId {
    pub subrun: SubRunId,
    pub event: u32,
}

impl SubRunId {
    pub fn new(run: u32, subrun: u32) -> Self {
        Self {
            run: RunId(run),
            subrun,
        }
    }
}

impl EventId {
    pub fn new(run: u32, subrun: u32, event: u32) -> Self {
        Self {
            subrun: SubRunId::new(run, subrun),
            event,
        }
    }

    pub fn run(&self) -> RunId {
        self.subrun.run
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run: {}", self.0)
    }
}

impl fmt::Display for SubRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} subRun: {}", self.run, self.subrun)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} event: {}", self.subrun, self.event)
    }
}
