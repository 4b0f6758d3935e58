mod payload;
mod retry;

pub use payload::{canonical_payload, mirror_payload, sign, PayloadInput};
pub use retry::RetryPolicy;

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::correlator::DispatchRequest;
use crate::credentials::Credentials;
use crate::error::DispatchError;
use crate::now_ms;
use crate::stats::{bump, SessionStats};
use crate::timesync::TimeSync;

const PRIMARY_TIMEOUT: Duration = Duration::from_secs(10);
const MIRROR_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Primary endpoint accepted the event (mirror result irrelevant).
    Delivered,
    /// Primary failed but the mirror write landed.
    PartiallyDelivered,
    Failed,
}

/// Signs and delivers one event to the primary endpoint (with retry) and
/// the mirror store (single attempt, best effort). Never raises into the
/// caller; the outcome value and the error counter carry the result.
pub struct PushDispatcher {
    creds: Credentials,
    pairing_id: String,
    timesync: TimeSync,
    policy: RetryPolicy,
    stats: Arc<SessionStats>,
    cancel: CancellationToken,
}

impl PushDispatcher {
    pub fn new(
        creds: Credentials,
        pairing_id: String,
        timesync: TimeSync,
        stats: Arc<SessionStats>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            creds,
            pairing_id,
            timesync,
            policy: RetryPolicy::default(),
            stats,
            cancel,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn dispatch(&self, request: &DispatchRequest) -> DispatchOutcome {
        let server_time_ms = self.timesync.server_time_ms().await;
        let offset_ms = self.timesync.offset_ms().await;
        let input = PayloadInput {
            kind: request.kind,
            event_id: request.event_id,
            pairing_id: &self.pairing_id,
            duration_sec: request.duration_sec,
            server_time_ms,
            offset_ms,
        };

        let primary = self.deliver_primary(&input).await;
        let mirror = self.deliver_mirror(&input).await;

        let outcome = match (&primary, &mirror) {
            (Ok(()), _) => DispatchOutcome::Delivered,
            (Err(_), Ok(())) => DispatchOutcome::PartiallyDelivered,
            (Err(_), Err(_)) => DispatchOutcome::Failed,
        };

        if let Err(err) = &primary {
            // One error per event, however many retries it took.
            bump(&self.stats.errors);
            warn!(
                "{} not delivered to primary (eventId={}): {err}",
                request.kind.as_str(),
                request.event_id
            );
        }
        if let Err(err) = &mirror {
            warn!(
                "{} mirror write failed (eventId={}): {err}",
                request.kind.as_str(),
                request.event_id
            );
        }
        info!(
            "{} dispatch (eventId={}) -> {outcome:?}",
            request.kind.as_str(),
            request.event_id
        );
        outcome
    }

    async fn deliver_primary(&self, input: &PayloadInput<'_>) -> Result<(), DispatchError> {
        let Some(url) = self.creds.push_url() else {
            return Err(DispatchError::ConfigMissing("push url"));
        };
        let Some(secret) = self.creds.secret() else {
            return Err(DispatchError::ConfigMissing("secret"));
        };

        let canonical = canonical_payload(input)
            .map_err(|err| DispatchError::Permanent(err.to_string()))?;
        let signature = sign(secret, &canonical);
        let body = canonical.into_bytes();

        let mut attempt: u32 = 1;
        loop {
            let url = url.to_string();
            let signature = signature.clone();
            let bytes = body.clone();
            let result =
                tokio::task::spawn_blocking(move || post_primary(&url, &signature, &bytes)).await;

            let err = match result {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(err)) => err,
                Err(join_err) => DispatchError::Transient(join_err.to_string()),
            };
            warn!(
                "push attempt {attempt}/{} failed: {err}",
                self.policy.attempts
            );
            if !self.policy.should_retry(attempt, &err) {
                return Err(err);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.policy.backoff(attempt)) => {}
                _ = self.cancel.cancelled() => {
                    return Err(DispatchError::Transient("cancelled while backing off".into()));
                }
            }
            attempt += 1;
        }
    }

    async fn deliver_mirror(&self, input: &PayloadInput<'_>) -> Result<(), DispatchError> {
        let Some(base) = self.creds.mirror_url() else {
            return Err(DispatchError::ConfigMissing("mirror url"));
        };
        if self.pairing_id.is_empty() {
            return Err(DispatchError::ConfigMissing("pairing id"));
        }

        let url = format!(
            "{}/arena_events/{}/current.json",
            base.trim_end_matches('/'),
            safe_pairing_id(&self.pairing_id)
        );
        let body = mirror_payload(input, now_ms()).to_string().into_bytes();

        tokio::task::spawn_blocking(move || put_mirror(&url, &body))
            .await
            .map_err(|join_err| DispatchError::Transient(join_err.to_string()))?
    }
}

/// Mirror paths cannot contain ':', so it becomes '_'.
fn safe_pairing_id(raw: &str) -> String {
    raw.replace(':', "_")
}

fn agent_with_timeout(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

fn post_primary(url: &str, signature: &str, body: &[u8]) -> Result<(), DispatchError> {
    let result = agent_with_timeout(PRIMARY_TIMEOUT)
        .post(url)
        .header("Content-Type", "application/json; charset=utf-8")
        .header("X-Signature", signature)
        .send(body);

    match result {
        Ok(response) if response.status().as_u16() == 200 => Ok(()),
        Ok(response) => Err(DispatchError::Transient(format!(
            "HTTP {}",
            response.status()
        ))),
        Err(err) => Err(DispatchError::from_ureq(err)),
    }
}

fn put_mirror(url: &str, body: &[u8]) -> Result<(), DispatchError> {
    let result = agent_with_timeout(MIRROR_TIMEOUT)
        .put(url)
        .header("Content-Type", "application/json; charset=utf-8")
        .send(body);

    match result {
        Ok(response) if response.status().is_success() => Ok(()),
        Ok(response) => Err(DispatchError::Transient(format!(
            "HTTP {}",
            response.status()
        ))),
        Err(err) => Err(DispatchError::from_ureq(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_id_is_path_sanitized() {
        assert_eq!(safe_pairing_id("desk:top:1"), "desk_top_1");
        assert_eq!(safe_pairing_id("plain"), "plain");
    }
}
