use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{Tag, TagClassifier};

/// A second screenshot within this window of a pop is read as the stop.
const STOP_WINDOW: Duration = Duration::from_secs(5);

/// Timestamp-proximity heuristic carried over from earlier revisions of the
/// detector: the addon screenshots exactly twice per arena (queue pop, then
/// gate open), so a screenshot arriving shortly after a pop must be the stop.
/// Pixel content is never inspected. Opt-in via config; the border
/// classifier is the authoritative strategy.
#[derive(Debug, Default)]
pub struct ProximityClassifier {
    last_pop: Mutex<Option<Instant>>,
}

impl TagClassifier for ProximityClassifier {
    fn classify(&self, _image_bytes: &[u8]) -> Tag {
        let mut last_pop = self.last_pop.lock().unwrap();
        match *last_pop {
            Some(at) if at.elapsed() < STOP_WINDOW => {
                *last_pop = None;
                Tag::Stop
            }
            _ => {
                *last_pop = Some(Instant::now());
                Tag::Pop
            }
        }
    }
}
