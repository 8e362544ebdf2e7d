/// Identifier of a goroutine in the traced runtime
pub type GoroutineId = u64;

/// Opaque handle to an event in the decoder's event arena.
///
/// Handles are only ever compared for equality; they are never resolved back
/// into events by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub usize);

/// The scheduling facts the utilization builder cares about
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// The number of processors available to the runtime changed
    ProcessorCountChanged { procs: u64 },
    /// A stop-the-world phase started
    StwStart,
    /// A stop-the-world phase ended
    StwEnd,
    /// A goroutine started performing GC assist work
    AssistStart { goroutine: GoroutineId },
    /// A goroutine finished performing GC assist work
    AssistDone { goroutine: GoroutineId },
    /// A goroutine started running.
    ///
    /// `stop_link` names the later event at which this run ends, if the
    /// decoder resolved one.
    GoroutineScheduled {
        goroutine: GoroutineId,
        label: Option<String>,
        stop_link: Option<EventId>,
    },
    /// Any other scheduling instant, identified by its own handle so it can be
    /// matched against a previously recorded `stop_link`
    Other { goroutine: GoroutineId, id: EventId },
}

/// A timestamped trace event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Timestamp in nanoseconds
    pub ts: i64,
    pub kind: EventKind,
}

impl Event {
    pub fn new(ts: i64, kind: EventKind) -> Self {
        Self { ts, kind }
    }
}

/// Returns whether a goroutine label marks a background mark worker.
///
/// Workers are labelled `"GC (dedicated)"`, `"GC (fractional)"` and so on.
/// Idle workers only soak up otherwise idle processors and are not counted
/// against the mutator.
pub fn is_background_mark_worker(label: &str) -> bool {
    label.starts_with("GC ") && label != "GC (idle)"
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("GC (dedicated)", true)]
    #[case("GC (fractional)", true)]
    #[case("GC (idle)", false)]
    #[case("GC", false)]
    #[case("worker", false)]
    #[case("", false)]
    fn test_background_mark_worker_labels(#[case] label: &str, #[case] expected: bool) {
        assert_eq!(is_background_mark_worker(label), expected);
    }

    #[test]
    fn test_event_ids_compare_by_value() {
        assert_eq!(EventId(7), EventId(7));
        assert_ne!(EventId(7), EventId(8));
    }
}
