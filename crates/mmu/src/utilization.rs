use std::collections::{HashMap, HashSet};

use crate::event::{is_background_mark_worker, Event, EventId, EventKind, GoroutineId};

/// A change in mutator utilization at a particular time.
///
/// A mutator utilization function is a time-ordered sequence of these
/// points; each point's utilization holds until the next point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MutatorUtil {
    /// Timestamp in nanoseconds
    pub time: i64,
    /// Mean mutator utilization starting at `time`, in `[0, 1]`
    pub util: f64,
}

impl MutatorUtil {
    pub fn new(time: i64, util: f64) -> Self {
        Self { time, util }
    }
}

/// Scheduling state tracked while scanning the event stream
struct UtilizationBuilder {
    gomaxprocs: u64,
    stw_depth: i64,
    /// Processors currently attributed to GC work (assists and background mark)
    gc_procs: i64,
    assisting: HashSet<GoroutineId>,
    bg_mark: HashSet<GoroutineId>,
    /// The event that will end each goroutine's current run
    stop_events: HashMap<GoroutineId, EventId>,
    out: Vec<MutatorUtil>,
}

impl UtilizationBuilder {
    fn new(start: i64) -> Self {
        Self {
            gomaxprocs: 1,
            stw_depth: 0,
            gc_procs: 0,
            assisting: HashSet::new(),
            bg_mark: HashSet::new(),
            stop_events: HashMap::new(),
            out: vec![MutatorUtil::new(start, 1.0)],
        }
    }

    /// Applies an event to the scheduling state.
    ///
    /// Returns false if the event cannot change utilization, in which case no
    /// point should be emitted for it.
    fn apply(&mut self, kind: &EventKind) -> bool {
        match kind {
            EventKind::ProcessorCountChanged { procs } => {
                self.gomaxprocs = (*procs).max(1);
            }
            EventKind::StwStart => self.stw_depth += 1,
            EventKind::StwEnd => self.stw_depth -= 1,
            EventKind::AssistStart { goroutine } => {
                self.gc_procs += 1;
                self.assisting.insert(*goroutine);
            }
            EventKind::AssistDone { goroutine } => {
                self.gc_procs -= 1;
                self.assisting.remove(goroutine);
            }
            EventKind::GoroutineScheduled {
                goroutine,
                label,
                stop_link,
            } => {
                if label.as_deref().map_or(false, is_background_mark_worker) {
                    self.bg_mark.insert(*goroutine);
                    self.gc_procs += 1;
                }
                // Resumed while still charged to an assist.
                if self.assisting.contains(goroutine) {
                    self.gc_procs += 1;
                }
                match stop_link {
                    Some(link) => {
                        self.stop_events.insert(*goroutine, *link);
                    }
                    None => {
                        self.stop_events.remove(goroutine);
                    }
                }
            }
            EventKind::Other { goroutine, id } => {
                if self.stop_events.get(goroutine) != Some(id) {
                    return false;
                }
                // Blocked during an assist.
                if self.assisting.contains(goroutine) {
                    self.gc_procs -= 1;
                }
                if self.bg_mark.remove(goroutine) {
                    self.gc_procs -= 1;
                }
                self.stop_events.remove(goroutine);
            }
        }
        true
    }

    fn current_utilization(&self) -> f64 {
        let procs = if self.stw_depth > 0 {
            self.gomaxprocs as f64
        } else {
            self.gc_procs as f64
        };
        // Traces that begin mid-assist can drive the counter out of range.
        (1.0 - procs / self.gomaxprocs as f64).clamp(0.0, 1.0)
    }

    fn push(&mut self, time: i64, util: f64) {
        if let Some(&last) = self.out.last() {
            if util == last.util {
                return;
            }
            if time == last.time {
                // Keep the lowest utilization seen at a timestamp.
                if util > last.util {
                    return;
                }
                self.out.pop();
            }
        }
        self.out.push(MutatorUtil::new(time, util));
    }

    /// Closes the function with a zero-utilization point at `end`.
    fn finish(mut self, end: i64) -> Vec<MutatorUtil> {
        if self.out.last().map_or(false, |last| last.time == end) {
            self.out.pop();
        }
        // Equal-time replacements can leave neighbours with the same value.
        self.out.dedup_by(|next, prev| next.util == prev.util);
        self.out.push(MutatorUtil::new(end, 0.0));
        self.out
    }
}

/// Returns the mutator utilization function for the given events.
///
/// The events must be ordered by timestamp. The function starts at the first
/// event with utilization 1 and always ends with a 0-utilization point at the
/// last event's timestamp, which marks the end of the measured horizon.
/// Outside of those bounds the function is undefined.
///
/// An empty event slice yields an empty function.
pub fn mutator_utilization(events: &[Event]) -> Vec<MutatorUtil> {
    let (Some(first), Some(last)) = (events.first(), events.last()) else {
        return Vec::new();
    };

    let mut builder = UtilizationBuilder::new(first.ts);
    for event in events {
        if builder.apply(&event.kind) {
            let util = builder.current_utilization();
            builder.push(event.ts, util);
        }
    }
    let out = builder.finish(last.ts);

    log::debug!(
        "Built {} utilization points from {} events",
        out.len(),
        events.len()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind::*;

    fn ev(ts: i64, kind: EventKind) -> Event {
        Event::new(ts, kind)
    }

    fn points(util: &[MutatorUtil]) -> Vec<(i64, f64)> {
        util.iter().map(|u| (u.time, u.util)).collect()
    }

    #[test]
    fn test_empty_events() {
        assert!(mutator_utilization(&[]).is_empty());
    }

    #[test]
    fn test_single_event_collapses_to_terminal() {
        let util = mutator_utilization(&[ev(42, StwEnd)]);
        assert_eq!(points(&util), vec![(42, 0.0)]);
    }

    #[test]
    fn test_stop_the_world() {
        let events = vec![
            ev(0, ProcessorCountChanged { procs: 4 }),
            ev(100, StwStart),
            ev(150, StwEnd),
            ev(1000, StwStart),
        ];
        let util = mutator_utilization(&events);
        assert_eq!(
            points(&util),
            vec![(0, 1.0), (100, 0.0), (150, 1.0), (1000, 0.0)]
        );
    }

    #[test]
    fn test_nested_stop_the_world() {
        let events = vec![
            ev(0, StwStart),
            ev(10, StwStart),
            ev(20, StwEnd),
            ev(30, StwEnd),
            ev(40, ProcessorCountChanged { procs: 2 }),
        ];
        let util = mutator_utilization(&events);
        assert_eq!(points(&util), vec![(0, 0.0), (30, 1.0), (40, 0.0)]);
    }

    #[test]
    fn test_assists_scale_with_gomaxprocs() {
        let events = vec![
            ev(0, ProcessorCountChanged { procs: 4 }),
            ev(10, AssistStart { goroutine: 1 }),
            ev(20, AssistStart { goroutine: 2 }),
            ev(30, AssistDone { goroutine: 1 }),
            ev(40, AssistDone { goroutine: 2 }),
            ev(100, StwEnd),
        ];
        let util = mutator_utilization(&events);
        assert_eq!(
            points(&util),
            vec![(0, 1.0), (10, 0.75), (20, 0.5), (30, 0.75), (40, 1.0), (100, 0.0)]
        );
    }

    #[test]
    fn test_background_mark_worker_until_stop_event() {
        let events = vec![
            ev(0, ProcessorCountChanged { procs: 2 }),
            ev(
                10,
                GoroutineScheduled {
                    goroutine: 7,
                    label: Some("GC (dedicated)".to_string()),
                    stop_link: Some(EventId(3)),
                },
            ),
            // Unrelated scheduling instant: no point.
            ev(15, Other { goroutine: 8, id: EventId(2) }),
            ev(20, Other { goroutine: 7, id: EventId(3) }),
            ev(50, StwEnd),
        ];
        let util = mutator_utilization(&events);
        assert_eq!(
            points(&util),
            vec![(0, 1.0), (10, 0.5), (20, 1.0), (50, 0.0)]
        );
    }

    #[test]
    fn test_idle_mark_worker_is_mutator_time() {
        let events = vec![
            ev(0, ProcessorCountChanged { procs: 2 }),
            ev(
                10,
                GoroutineScheduled {
                    goroutine: 7,
                    label: Some("GC (idle)".to_string()),
                    stop_link: Some(EventId(2)),
                },
            ),
            ev(20, Other { goroutine: 7, id: EventId(2) }),
            ev(50, StwEnd),
        ];
        let util = mutator_utilization(&events);
        assert_eq!(points(&util), vec![(0, 1.0), (50, 0.0)]);
    }

    #[test]
    fn test_assisting_goroutine_blocks_and_resumes() {
        let events = vec![
            ev(0, ProcessorCountChanged { procs: 2 }),
            ev(
                5,
                GoroutineScheduled {
                    goroutine: 1,
                    label: None,
                    stop_link: Some(EventId(3)),
                },
            ),
            ev(10, AssistStart { goroutine: 1 }),
            // Blocks mid-assist.
            ev(20, Other { goroutine: 1, id: EventId(3) }),
            // Resumes, still charged to the assist.
            ev(
                30,
                GoroutineScheduled {
                    goroutine: 1,
                    label: None,
                    stop_link: Some(EventId(6)),
                },
            ),
            ev(40, AssistDone { goroutine: 1 }),
            ev(50, Other { goroutine: 1, id: EventId(6) }),
            ev(60, StwEnd),
        ];
        let util = mutator_utilization(&events);
        assert_eq!(
            points(&util),
            vec![(0, 1.0), (10, 0.5), (20, 1.0), (30, 0.5), (40, 1.0), (60, 0.0)]
        );
    }

    #[test]
    fn test_equal_timestamps_keep_lowest_utilization() {
        let events = vec![
            ev(0, ProcessorCountChanged { procs: 2 }),
            ev(10, StwStart),
            ev(10, StwEnd),
            ev(20, StwEnd),
        ];
        let util = mutator_utilization(&events);
        assert_eq!(points(&util), vec![(0, 1.0), (10, 0.0), (20, 0.0)]);
    }

    #[test]
    fn test_equal_timestamp_replacement_removes_redundant_point() {
        let events = vec![
            ev(0, StwStart),
            ev(10, StwEnd),
            ev(10, StwStart),
            ev(20, StwEnd),
            ev(30, StwStart),
        ];
        let util = mutator_utilization(&events);
        // The blip at t=10 is swallowed by the tie-break.
        assert_eq!(points(&util), vec![(0, 0.0), (20, 1.0), (30, 0.0)]);
        for pair in util.windows(2) {
            assert!(pair[0].time < pair[1].time);
        }
    }

    #[test]
    fn test_zero_processor_count_is_treated_as_one() {
        let events = vec![
            ev(0, ProcessorCountChanged { procs: 0 }),
            ev(10, AssistStart { goroutine: 1 }),
            ev(20, AssistDone { goroutine: 1 }),
            ev(30, StwEnd),
        ];
        let util = mutator_utilization(&events);
        assert_eq!(points(&util), vec![(0, 1.0), (10, 0.0), (20, 1.0), (30, 0.0)]);
    }

    #[test]
    fn test_unmatched_assist_done_is_clamped() {
        let events = vec![
            ev(0, AssistDone { goroutine: 1 }),
            ev(10, StwStart),
            ev(20, StwEnd),
        ];
        let util = mutator_utilization(&events);
        assert!(util.iter().all(|u| (0.0..=1.0).contains(&u.util)));
    }

    #[test]
    fn test_logs_summary() {
        testing_logger::setup();

        mutator_utilization(&[ev(0, StwStart), ev(10, StwEnd)]);

        testing_logger::validate(|captured_logs| {
            assert_eq!(captured_logs.len(), 1);
            assert_eq!(captured_logs[0].level, log::Level::Debug);
            assert_eq!(
                captured_logs[0].body,
                "Built 2 utilization points from 2 events"
            );
        });
    }
}
