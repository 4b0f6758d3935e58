use std::sync::Arc;

use log::info;
use serde::Serialize;
use uuid::Uuid;

use crate::detect::Tag;
use crate::stats::{bump, SessionStats};

/// The same tag seen again within this window is the same physical event
/// read across two polling ticks.
pub const DEBOUNCE_MS: i64 = 1_200;

/// One armed countdown, between a pop and its paired stop.
#[derive(Debug, Clone)]
pub struct ArenaSession {
    pub event_id: Uuid,
    pub started_at_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Pop,
    Stop,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Pop => "arena_pop",
            EventKind::Stop => "arena_stop",
        }
    }
}

/// What the dispatcher is asked to deliver.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub kind: EventKind,
    pub event_id: Uuid,
    pub duration_sec: u32,
}

/// Domain events surfaced to the (out-of-scope) UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArenaEvent {
    PopDetected { duration_sec: u32 },
    StopDetected,
}

/// Everything one classified screenshot caused. Empty on ignores.
#[derive(Debug, Default)]
pub struct Transition {
    pub dispatch: Option<DispatchRequest>,
    pub event: Option<ArenaEvent>,
    /// Tagged screenshots are disposable once acted on; untagged ones are
    /// kept.
    pub delete_screenshot: bool,
}

#[derive(Debug)]
enum SessionState {
    Idle,
    Armed(ArenaSession),
}

/// Pop/stop pairing state machine. Exclusively owns its session fields;
/// there is exactly one of these per listener.
pub struct EventCorrelator {
    state: SessionState,
    last_tag: Option<Tag>,
    last_tag_at_ms: i64,
    /// Precomputed via [`crate::config::AppConfig::adjusted_duration`].
    duration_sec: u32,
    stats: Arc<SessionStats>,
}

impl EventCorrelator {
    pub fn new(duration_sec: u32, stats: Arc<SessionStats>) -> Self {
        Self {
            state: SessionState::Idle,
            last_tag: None,
            last_tag_at_ms: 0,
            duration_sec,
            stats,
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, SessionState::Armed(_))
    }

    pub fn session(&self) -> Option<&ArenaSession> {
        match &self.state {
            SessionState::Armed(session) => Some(session),
            SessionState::Idle => None,
        }
    }

    /// Force back to `Idle`, e.g. when the user pauses listening. A stop
    /// for the dropped session will read as a no-op afterwards.
    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.last_tag = None;
        self.last_tag_at_ms = 0;
    }

    /// Feed one classified screenshot through the state machine.
    pub fn handle(&mut self, tag: Tag, now_ms: i64) -> Transition {
        if tag == Tag::NoTag {
            bump(&self.stats.ignored_no_tag);
            return Transition::default();
        }

        // Same physical event, re-read on the next tick.
        if self.last_tag == Some(tag) && now_ms - self.last_tag_at_ms < DEBOUNCE_MS {
            bump(&self.stats.ignored_duplicate);
            return Transition::default();
        }
        self.last_tag = Some(tag);
        self.last_tag_at_ms = now_ms;

        match (tag, &self.state) {
            (Tag::Pop, SessionState::Idle) => self.arm(now_ms),
            (Tag::Stop, SessionState::Armed(_)) => self.disarm(),
            // Pop while armed / stop while idle carries no actionable tag.
            _ => {
                bump(&self.stats.ignored_duplicate);
                Transition::default()
            }
        }
    }

    fn arm(&mut self, now_ms: i64) -> Transition {
        let event_id = Uuid::new_v4();
        let duration_sec = self.duration_sec;
        self.state = SessionState::Armed(ArenaSession {
            event_id,
            started_at_ms: now_ms,
        });
        bump(&self.stats.pop);
        info!("arena pop: countdown={duration_sec}s (eventId={event_id})");

        Transition {
            dispatch: Some(DispatchRequest {
                kind: EventKind::Pop,
                event_id,
                duration_sec,
            }),
            event: Some(ArenaEvent::PopDetected { duration_sec }),
            delete_screenshot: true,
        }
    }

    fn disarm(&mut self) -> Transition {
        let SessionState::Armed(session) = std::mem::replace(&mut self.state, SessionState::Idle)
        else {
            return Transition::default();
        };
        bump(&self.stats.stop);
        info!("arena stop (eventId={})", session.event_id);

        Transition {
            dispatch: Some(DispatchRequest {
                kind: EventKind::Stop,
                event_id: session.event_id,
                duration_sec: 0,
            }),
            event: Some(ArenaEvent::StopDetected),
            delete_screenshot: true,
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn correlator() -> EventCorrelator {
        EventCorrelator::new(37, Arc::new(SessionStats::default()))
    }

    #[test]
    fn pop_then_stop_pairs_one_event_id() {
        let mut c = correlator();

        let pop = c.handle(Tag::Pop, 0);
        let pop_req = pop.dispatch.expect("pop dispatched");
        assert_eq!(pop_req.kind, EventKind::Pop);
        assert_eq!(pop_req.duration_sec, 37);
        assert_eq!(pop.event, Some(ArenaEvent::PopDetected { duration_sec: 37 }));
        assert!(pop.delete_screenshot);
        assert!(c.is_armed());

        let stop = c.handle(Tag::Stop, 30_000);
        let stop_req = stop.dispatch.expect("stop dispatched");
        assert_eq!(stop_req.kind, EventKind::Stop);
        assert_eq!(stop_req.duration_sec, 0);
        assert_eq!(stop_req.event_id, pop_req.event_id);
        assert_eq!(stop.event, Some(ArenaEvent::StopDetected));
        assert!(!c.is_armed());
    }

    #[test]
    fn never_two_pops_without_intervening_stop() {
        let mut c = correlator();
        let tags = [Tag::Pop, Tag::Pop, Tag::Stop, Tag::Pop, Tag::Pop, Tag::Stop, Tag::Stop];

        let mut pending_pop = false;
        let mut t = 0;
        for tag in tags {
            let transition = c.handle(tag, t);
            t += 10_000; // well past the debounce window
            if let Some(req) = transition.dispatch {
                match req.kind {
                    EventKind::Pop => {
                        assert!(!pending_pop, "two pops without an intervening stop");
                        pending_pop = true;
                    }
                    EventKind::Stop => {
                        assert!(pending_pop, "stop without a pop");
                        pending_pop = false;
                    }
                }
            }
        }
    }

    #[test]
    fn event_ids_never_reused_across_sessions() {
        let mut c = correlator();
        let first = c.handle(Tag::Pop, 0).dispatch.unwrap().event_id;
        c.handle(Tag::Stop, 10_000);
        let second = c.handle(Tag::Pop, 20_000).dispatch.unwrap().event_id;
        assert_ne!(first, second);
    }

    #[test]
    fn identical_tags_within_debounce_collapse() {
        let mut c = correlator();
        assert!(c.handle(Tag::Pop, 0).dispatch.is_some());
        // 0.5s later: same physical pop re-read across two ticks
        let dup = c.handle(Tag::Pop, 500);
        assert!(dup.dispatch.is_none());
        assert!(!dup.delete_screenshot);
        assert_eq!(c.stats.ignored_duplicate.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn identical_tags_past_debounce_both_process() {
        let mut c = correlator();
        assert!(c.handle(Tag::Pop, 0).dispatch.is_some());
        // 1.5s later the debounce has lapsed, but a pop while armed is
        // still ignored by state.
        let second = c.handle(Tag::Pop, 1_500);
        assert!(second.dispatch.is_none());

        // Stop/stop across the window: the first disarms, the second is a
        // no-op in Idle.
        assert!(c.handle(Tag::Stop, 10_000).dispatch.is_some());
        assert!(c.handle(Tag::Stop, 11_500).dispatch.is_none());
    }

    #[test]
    fn stop_while_idle_is_a_no_op() {
        let mut c = correlator();
        let transition = c.handle(Tag::Stop, 0);
        assert!(transition.dispatch.is_none());
        assert!(transition.event.is_none());
        assert!(!transition.delete_screenshot);
        assert!(!c.is_armed());
    }

    #[test]
    fn no_tag_only_counts() {
        let mut c = correlator();
        let transition = c.handle(Tag::NoTag, 0);
        assert!(transition.dispatch.is_none());
        assert_eq!(c.stats.ignored_no_tag.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn dispatched_duration_is_the_configured_one() {
        let mut c = EventCorrelator::new(12, Arc::new(SessionStats::default()));
        let req = c.handle(Tag::Pop, 0).dispatch.unwrap();
        assert_eq!(req.duration_sec, 12);
    }

    #[test]
    fn reset_forces_idle_and_drops_session() {
        let mut c = correlator();
        c.handle(Tag::Pop, 0);
        assert!(c.is_armed());
        c.reset();
        assert!(!c.is_armed());
        // The stop for the dropped session no longer dispatches.
        assert!(c.handle(Tag::Stop, 10_000).dispatch.is_none());
    }
}
