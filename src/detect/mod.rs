mod border;
mod proximity;

pub use border::BorderClassifier;
pub use proximity::ProximityClassifier;

use std::sync::Arc;

use serde::Serialize;

use crate::config::DetectionStrategy;

/// Classification of one screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Pop,
    Stop,
    NoTag,
}

/// Pluggable classification strategy. Implementations must not do I/O and
/// must never panic past this boundary; an unreadable image is `NoTag`.
pub trait TagClassifier: Send + Sync {
    fn classify(&self, image_bytes: &[u8]) -> Tag;
}

pub fn classifier_for(strategy: DetectionStrategy) -> Arc<dyn TagClassifier> {
    match strategy {
        DetectionStrategy::Border => Arc::new(BorderClassifier::default()),
        DetectionStrategy::Proximity => Arc::new(ProximityClassifier::default()),
    }
}
