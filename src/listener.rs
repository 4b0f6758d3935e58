use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::correlator::{ArenaEvent, DispatchRequest, EventCorrelator};
use crate::credentials::Credentials;
use crate::detect::{classifier_for, TagClassifier};
use crate::janitor;
use crate::now_ms;
use crate::push::PushDispatcher;
use crate::stats::{bump, SessionStats, StatsSnapshot};
use crate::timesync::TimeSync;
use crate::watcher::ScreenshotWatcher;

const TICK_INTERVAL: Duration = Duration::from_secs(1);
/// A screenshot older than this at processing time is a leftover, not a
/// live signal.
const STALE_AFTER_MS: i64 = 5_000;

/// Owns the poll loop and the dispatcher task. `start` spawns both;
/// `stop` cancels them, which also aborts pending retries and deferred
/// deletions, and drops the session state so resuming never replays a
/// stale stop.
pub struct ListenerController {
    handle: Option<JoinHandle<()>>,
    dispatch_handle: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
    stats: Arc<SessionStats>,
}

impl ListenerController {
    pub fn new(stats: Arc<SessionStats>) -> Self {
        Self {
            handle: None,
            dispatch_handle: None,
            cancel: None,
            stats,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn start(
        &mut self,
        config: AppConfig,
        creds: Credentials,
        events: mpsc::UnboundedSender<ArenaEvent>,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("listener already active");
        }

        let cancel = CancellationToken::new();
        let timesync = TimeSync::new(creds.mirror_url.clone());
        let dispatcher = PushDispatcher::new(
            creds,
            config.pairing_id.clone(),
            timesync,
            self.stats.clone(),
            cancel.child_token(),
        );

        // Single consumer, so a session's pop is always delivered before
        // its stop.
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let dispatch_handle = tokio::spawn(dispatch_loop(
            dispatcher,
            dispatch_rx,
            cancel.child_token(),
        ));

        let mut watcher = ScreenshotWatcher::new(&config.game_folder, self.stats.clone());
        watcher.prime();
        let classifier = classifier_for(config.detection);
        let correlator = EventCorrelator::new(config.adjusted_duration(), self.stats.clone());

        info!(
            "listener starting (detection={:?}, countdown={}s)",
            config.detection, config.countdown_time
        );
        let handle = tokio::spawn(listen_loop(
            watcher,
            classifier,
            correlator,
            dispatch_tx,
            events,
            self.stats.clone(),
            cancel.clone(),
        ));

        self.handle = Some(handle);
        self.dispatch_handle = Some(dispatch_handle);
        self.cancel = Some(cancel);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(handle) = self.handle.take() {
            handle.await.context("listener loop task failed to join")?;
        }
        if let Some(handle) = self.dispatch_handle.take() {
            handle.await.context("dispatch task failed to join")?;
        }
        info!("{}", self.stats.summary_line());
        Ok(())
    }
}

async fn listen_loop(
    mut watcher: ScreenshotWatcher,
    classifier: Arc<dyn TagClassifier>,
    mut correlator: EventCorrelator,
    dispatch_tx: mpsc::UnboundedSender<DispatchRequest>,
    events_tx: mpsc::UnboundedSender<ArenaEvent>,
    stats: Arc<SessionStats>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                process_tick(
                    &mut watcher,
                    &classifier,
                    &mut correlator,
                    &dispatch_tx,
                    &events_tx,
                    &stats,
                    &cancel,
                )
                .await;
            }
            _ = cancel.cancelled() => {
                info!("listener loop shutting down");
                break;
            }
        }
    }
}

/// One tick: poll, gate on staleness, classify off-thread, run the state
/// machine, fan out its effects. Nothing here may take the loop down.
async fn process_tick(
    watcher: &mut ScreenshotWatcher,
    classifier: &Arc<dyn TagClassifier>,
    correlator: &mut EventCorrelator,
    dispatch_tx: &mpsc::UnboundedSender<DispatchRequest>,
    events_tx: &mpsc::UnboundedSender<ArenaEvent>,
    stats: &Arc<SessionStats>,
    cancel: &CancellationToken,
) {
    let Some(shot) = watcher.poll() else {
        return;
    };

    let now = now_ms();
    if now - shot.modified_at_ms > STALE_AFTER_MS {
        bump(&stats.ignored_stale);
        return;
    }

    let bytes = match tokio::fs::read(&shot.path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("could not read screenshot {}: {err}", shot.path.display());
            return;
        }
    };

    // Image decode is the one CPU-heavy step on the tick path.
    let tag = {
        let classifier = Arc::clone(classifier);
        match tokio::task::spawn_blocking(move || classifier.classify(&bytes)).await {
            Ok(tag) => tag,
            Err(err) => {
                error!("classifier worker join failed: {err}");
                return;
            }
        }
    };

    let transition = correlator.handle(tag, now);

    if let Some(request) = transition.dispatch {
        if dispatch_tx.send(request).is_err() {
            warn!("dispatch channel closed; event not sent");
        }
    }
    if let Some(event) = transition.event {
        // The UI side may be gone; detection carries on regardless.
        let _ = events_tx.send(event);
    }
    if transition.delete_screenshot {
        janitor::delete_later(shot.path.clone(), cancel.child_token());
    }
}

async fn dispatch_loop(
    dispatcher: PushDispatcher,
    mut rx: mpsc::UnboundedReceiver<DispatchRequest>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            request = rx.recv() => {
                match request {
                    Some(request) => {
                        dispatcher.dispatch(&request).await;
                    }
                    None => break,
                }
            }
            _ = cancel.cancelled() => {
                info!("dispatch loop shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs::{self, File};
    use std::sync::atomic::Ordering;
    use std::time::{Duration as StdDuration, SystemTime};

    use tempfile::TempDir;

    use crate::config::DetectionStrategy;

    #[tokio::test]
    async fn stale_screenshot_is_dropped_before_classification() {
        let dir = TempDir::new().unwrap();
        let shots = dir.path().join("Screenshots");
        fs::create_dir_all(&shots).unwrap();

        // Written after the process started, but the loop only gets to it
        // 8 seconds later.
        let path = shots.join("WoWScrnShot_083029.png");
        fs::write(&path, b"left over from a slow tick").unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - StdDuration::from_secs(8))
            .unwrap();

        let stats = Arc::new(SessionStats::default());
        let mut watcher = ScreenshotWatcher::new(dir.path(), stats.clone())
            .with_process_start(now_ms() - 60_000);
        let classifier = classifier_for(DetectionStrategy::Border);
        let mut correlator = EventCorrelator::new(37, stats.clone());
        let (dispatch_tx, mut dispatch_rx) = mpsc::unbounded_channel();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        process_tick(
            &mut watcher,
            &classifier,
            &mut correlator,
            &dispatch_tx,
            &events_tx,
            &stats,
            &cancel,
        )
        .await;

        assert_eq!(stats.ignored_stale.load(Ordering::Relaxed), 1);
        assert!(dispatch_rx.try_recv().is_err(), "stale shot must not dispatch");
        assert!(events_rx.try_recv().is_err(), "stale shot must not surface");
        assert!(path.exists(), "stale shot is dropped, not deleted");
    }
}
