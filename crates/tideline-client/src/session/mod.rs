use std::sync::Arc;
use std::time::Duration;

use preview_proto::{BufferId, QueryRequest, QueryResponse, RevivalToken, VersionMarker};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{ContentApplier, ContentUpdate, PreviewSurface};
use crate::config::PageConfig;
use crate::transport::{PreviewTransport, TransportError};

pub mod revival;

pub use revival::RevivalClient;

/// Lower bound on the delay between revival attempts, so revival can never
/// busy-loop faster than this even when the poll interval is configured
/// very low.
pub const REVIVE_RETRY_FLOOR: Duration = Duration::from_millis(600);

#[derive(Debug, Error)]
pub enum SyncError {
    /// A poll was issued while a previous request was still outstanding.
    /// This breaks the single-outstanding-request invariant and indicates a
    /// scheduling bug, not a runtime failure.
    #[error("poll issued while a previous request is still outstanding")]
    ConcurrencyViolation,
}

/// Sync session states. The loop has no terminal state while the page stays
/// open; `Disconnected` hands control to revival, which either navigates
/// away or stalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Polling,
    AwaitingResponse,
    Disconnected,
    Reviving,
}

/// Mutable session bundle: buffer identity, version marker, revival token,
/// and the page-supplied knobs.
///
/// Owned by the sync session and handed to revival by mutable borrow; never
/// ambient. Identity and marker only change at state-transition points, so
/// no request can observe a half-updated bundle.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub buffer_id: BufferId,
    pub timestamp: Option<VersionMarker>,
    /// Populated only while the session is `Disconnected` or `Reviving`.
    pub revival_token: Option<RevivalToken>,
    pub poll_interval: Duration,
    pub mathjax: bool,
}

impl SessionContext {
    pub fn from_config(config: &PageConfig) -> Self {
        Self {
            buffer_id: config.buffer_id.clone(),
            timestamp: config.timestamp.clone(),
            revival_token: None,
            poll_interval: config.poll_interval,
            mathjax: config.mathjax,
        }
    }
}

/// One retry schedule for both poll and revival loops: a fixed interval,
/// optionally bounded below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    interval: Duration,
    floor: Option<Duration>,
}

impl RetryPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            floor: None,
        }
    }

    pub fn floor_bounded(interval: Duration, floor: Duration) -> Self {
        Self {
            interval,
            floor: Some(floor),
        }
    }

    pub fn delay(&self) -> Duration {
        match self.floor {
            Some(floor) => self.interval.max(floor),
            None => self.interval,
        }
    }
}

/// Outcome of one completed poll.
#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Content has not advanced; nothing was touched.
    Unchanged,
    /// Fresh content was applied and the marker advanced.
    Applied,
    /// The server declared the session gone.
    Disconnected,
    /// The transport failed; the next poll runs on the same schedule.
    TransportFailed,
    /// A response arrived after the machine had already left
    /// `AwaitingResponse`; it was discarded.
    Stale,
}

/// How a session run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Revival succeeded; the page was told to navigate to the new view.
    Revived(BufferId),
    /// The server declared disconnect with no revival token ever issued.
    /// Live sync has stopped; the user must reload.
    Stalled,
}

/// The poll loop and its state machine.
///
/// Drives query requests against the transport, interprets statuses, hands
/// content to the applier, and on a server-declared disconnect hands the
/// session to [`RevivalClient`]. At most one request is ever outstanding.
pub struct SyncSession<T, S> {
    transport: Arc<T>,
    applier: ContentApplier<S>,
    revival: RevivalClient<T, S>,
    context: SessionContext,
    state: SessionState,
    in_flight: bool,
    /// Most recent `revivable_key` seen in an `OK` payload; becomes the
    /// session's revival token if the server later declares disconnect.
    candidate_key: Option<RevivalToken>,
}

impl<T, S> SyncSession<T, S>
where
    T: PreviewTransport,
    S: PreviewSurface,
{
    pub fn new(transport: Arc<T>, surface: Arc<S>, context: SessionContext) -> Self {
        let applier = ContentApplier::new(surface.clone(), context.mathjax);
        let revival = RevivalClient::new(
            transport.clone(),
            surface,
            RetryPolicy::floor_bounded(context.poll_interval, REVIVE_RETRY_FLOOR),
        );
        Self {
            transport,
            applier,
            revival,
            context,
            state: SessionState::Idle,
            in_flight: false,
            candidate_key: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Transitions `Idle` to `Polling`. The first query fires one poll
    /// interval later.
    pub fn start(&mut self) {
        debug_assert_eq!(self.state, SessionState::Idle);
        self.state = SessionState::Polling;
        debug!(
            target: "preview.sync",
            buffer_id = %self.context.buffer_id,
            interval_ms = self.context.poll_interval.as_millis() as u64,
            "sync session started"
        );
    }

    /// Builds the next query request and marks it outstanding.
    ///
    /// Rejects the call when a previous request has not completed; that can
    /// only happen through a scheduling bug.
    pub fn tick(&mut self) -> Result<QueryRequest, SyncError> {
        if self.in_flight {
            return Err(SyncError::ConcurrencyViolation);
        }
        debug_assert_eq!(self.state, SessionState::Polling);
        self.state = SessionState::AwaitingResponse;
        self.in_flight = true;
        Ok(QueryRequest {
            buffer_id: self.context.buffer_id.clone(),
            timestamp: self.context.timestamp.clone(),
        })
    }

    /// Interprets one query response. Statuses are evaluated in isolation;
    /// a response arriving after the machine left `AwaitingResponse` is
    /// discarded, since revival owns the identity from that point.
    pub async fn on_response(&mut self, response: QueryResponse) -> PollOutcome {
        self.in_flight = false;
        if self.state != SessionState::AwaitingResponse {
            debug!(target: "preview.sync", state = ?self.state, "discarding stale query response");
            return PollOutcome::Stale;
        }
        match response {
            QueryResponse::Unchanged => {
                self.state = SessionState::Polling;
                PollOutcome::Unchanged
            }
            QueryResponse::Ok {
                filename,
                dirname,
                html_part,
                timestamp,
                revivable_key,
            } => {
                let update = ContentUpdate {
                    filename,
                    dirname,
                    html_part,
                };
                self.applier.apply(&update).await;
                // Marker adopted only after the surface has settled.
                self.context.timestamp = Some(timestamp);
                self.candidate_key = revivable_key;
                self.state = SessionState::Polling;
                PollOutcome::Applied
            }
            QueryResponse::Disconnected => {
                self.state = SessionState::Disconnected;
                self.context.revival_token = self.candidate_key.take();
                info!(
                    target: "preview.sync",
                    revivable = self.context.revival_token.is_some(),
                    "server declared disconnect"
                );
                PollOutcome::Disconnected
            }
        }
    }

    /// Handles a failed query request. A transport error is ambiguous (it
    /// could be client-side network loss), so it never marks the session
    /// disconnected; the next poll runs on the same schedule. Servers that
    /// restart declare `DISCONNECTED` explicitly.
    pub fn on_transport_failure(&mut self, error: TransportError) -> PollOutcome {
        self.in_flight = false;
        if self.state != SessionState::AwaitingResponse {
            debug!(target: "preview.sync", state = ?self.state, "discarding stale transport failure");
            return PollOutcome::Stale;
        }
        debug!(
            target: "preview.sync",
            error = %error,
            "query transport failure; retrying on schedule"
        );
        self.state = SessionState::Polling;
        PollOutcome::TransportFailed
    }

    /// Issues one query and routes its result through the machine.
    pub async fn poll_once(&mut self) -> Result<PollOutcome, SyncError> {
        let request = self.tick()?;
        let _guard = crate::telemetry::PerfGuard::new("sync.poll");
        match self.transport.query(&request).await {
            Ok(response) => Ok(self.on_response(response).await),
            Err(error) => Ok(self.on_transport_failure(error)),
        }
    }

    /// Runs the session until revival navigates away or the session stalls.
    ///
    /// The loop sleeps one poll interval, polls once, and repeats; on a
    /// server-declared disconnect it hands over to revival, the only
    /// recovery path once the original session is gone.
    pub async fn run(&mut self) -> Result<SessionEnd, SyncError> {
        self.start();
        loop {
            tokio::time::sleep(self.context.poll_interval).await;
            if self.poll_once().await? == PollOutcome::Disconnected {
                break;
            }
        }

        if self.context.revival_token.is_none() {
            warn!(
                target: "preview.sync",
                buffer_id = %self.context.buffer_id,
                "disconnected with no revival token; live sync stopped, reload required"
            );
            return Ok(SessionEnd::Stalled);
        }

        self.state = SessionState::Reviving;
        match self.revival.run(&mut self.context).await {
            Some(buffer_id) => Ok(SessionEnd::Revived(buffer_id)),
            None => Ok(SessionEnd::Stalled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_policy_returns_its_interval() {
        let policy = RetryPolicy::fixed(Duration::from_millis(500));
        assert_eq!(policy.delay(), Duration::from_millis(500));
    }

    #[test]
    fn floor_bounds_a_low_interval() {
        let policy = RetryPolicy::floor_bounded(Duration::from_millis(100), REVIVE_RETRY_FLOOR);
        assert_eq!(policy.delay(), Duration::from_millis(600));
    }

    #[test]
    fn floor_defers_to_a_slower_interval() {
        let policy = RetryPolicy::floor_bounded(Duration::from_millis(2000), REVIVE_RETRY_FLOOR);
        assert_eq!(policy.delay(), Duration::from_millis(2000));
    }

    #[test]
    fn context_from_config_starts_without_token() {
        let config = crate::config::PageConfig::from_embedded(
            r#"{"buffer_id": "b1", "timestamp": "t0", "poll_interval_ms": 250}"#,
        )
        .expect("config");
        let context = SessionContext::from_config(&config);
        assert_eq!(context.buffer_id, BufferId::new("b1"));
        assert_eq!(context.timestamp, Some(VersionMarker::new("t0")));
        assert!(context.revival_token.is_none());
        assert_eq!(context.poll_interval, Duration::from_millis(250));
    }
}
