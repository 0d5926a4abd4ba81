use crate::stats::RunReport;

/// Progress reported by the sync worker.
///
/// A pass emits one `Started`, any number of `Extend`/`Advance` pairs and one
/// `Finished`. Consumers may treat `Extend` as growing the expected amount of
/// work and `Advance` as completing some of it; the two need not balance when
/// a pass is cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Started,
    Extend(u64),
    Advance(u64),
    Finished(RunReport),
}

impl SyncEvent {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }

    /// The report carried by `Finished`.
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::Finished(report) => Some(report),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => write!(f, "sync started"),
            Self::Extend(n) => write!(f, "+{n} to do"),
            Self::Advance(n) => write!(f, "{n} done"),
            Self::Finished(report) if report.cancelled => write!(f, "sync cancelled"),
            Self::Finished(report) => write!(f, "sync finished, {} updates", report.updates),
        }
    }
}

/// Running tally of the events seen by a consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub total: u64,
    pub done: u64,
}

impl Progress {
    pub fn apply(&mut self, event: &SyncEvent) {
        match event {
            SyncEvent::Started => *self = Self::default(),
            SyncEvent::Extend(n) => self.total += n,
            SyncEvent::Advance(n) => self.done += n,
            SyncEvent::Finished(_) => {}
        }
    }
}
