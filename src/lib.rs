pub mod config;
pub mod correlator;
pub mod credentials;
pub mod detect;
pub mod error;
pub mod janitor;
pub mod listener;
pub mod push;
pub mod stats;
pub mod timesync;
pub mod watcher;

pub use config::{AppConfig, ConfigStore, DetectionStrategy};
pub use correlator::{ArenaEvent, DispatchRequest, EventCorrelator, EventKind};
pub use credentials::Credentials;
pub use detect::{classifier_for, Tag, TagClassifier};
pub use error::DispatchError;
pub use listener::ListenerController;
pub use push::{DispatchOutcome, PushDispatcher, RetryPolicy};
pub use stats::{SessionStats, StatsSnapshot};
pub use timesync::TimeSync;
pub use watcher::{ScreenshotEvent, ScreenshotWatcher};

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
