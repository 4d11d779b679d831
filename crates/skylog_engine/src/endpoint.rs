//! Remote sync endpoint abstraction.

use crate::config::Credentials;
use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use skylog_protocol::{Event, RemoteWindowResult, SubmitOutcome};
use std::collections::VecDeque;

/// A remote endpoint handles network communication with the sync service.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, mock for testing, etc.). Implementations are
/// responsible for mapping transport-level failures onto [`SyncError`].
pub trait RemoteEndpoint: Send + Sync {
    /// Submits a batch of events, returning one outcome per event in
    /// batch order.
    fn submit_batch(
        &self,
        events: &[Event],
        credentials: &Credentials,
        client_version: &str,
        game_version: &str,
        game_build: &str,
    ) -> SyncResult<Vec<SubmitOutcome>>;

    /// Queries the remote window `[start, end]` for this profile's
    /// flight records.
    fn query_window(
        &self,
        credentials: &Credentials,
        start: Option<DateTime<Utc>>,
        end: DateTime<Utc>,
    ) -> SyncResult<RemoteWindowResult>;

    /// Fetches the current remote discard list of event kind names.
    fn fetch_discard_list(&self) -> SyncResult<Vec<String>>;
}

/// One recorded `submit_batch` call, for assertions in tests.
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    /// Events submitted, in batch order.
    pub events: Vec<Event>,
    /// Game version tag sent with the batch.
    pub game_version: String,
    /// Game build tag sent with the batch.
    pub game_build: String,
}

/// A mock endpoint for testing.
///
/// Responses are scripted per call with the `push_*` methods; when no
/// scripted response remains, submissions succeed and window queries
/// return an empty window echoing the requested bounds. Every call is
/// recorded for later inspection.
#[derive(Debug, Default)]
pub struct MockEndpoint {
    submit_responses: Mutex<VecDeque<SyncResult<Vec<SubmitOutcome>>>>,
    window_responses: Mutex<VecDeque<SyncResult<RemoteWindowResult>>>,
    discard_list: Mutex<Option<Vec<String>>>,
    fail_discard_fetch: Mutex<bool>,
    submissions: Mutex<Vec<RecordedSubmission>>,
    window_requests: Mutex<Vec<(Option<DateTime<Utc>>, DateTime<Utc>)>>,
}

impl MockEndpoint {
    /// Creates a mock endpoint with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next `submit_batch` response.
    pub fn push_submit_response(&self, response: SyncResult<Vec<SubmitOutcome>>) {
        self.submit_responses.lock().push_back(response);
    }

    /// Scripts the next `query_window` response.
    pub fn push_window_response(&self, response: SyncResult<RemoteWindowResult>) {
        self.window_responses.lock().push_back(response);
    }

    /// Sets the discard list returned by `fetch_discard_list`.
    pub fn set_discard_list(&self, kinds: Vec<String>) {
        *self.discard_list.lock() = Some(kinds);
    }

    /// Makes `fetch_discard_list` fail until reset.
    pub fn fail_discard_fetch(&self, fail: bool) {
        *self.fail_discard_fetch.lock() = fail;
    }

    /// Returns all recorded submissions.
    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.lock().clone()
    }

    /// Returns all recorded window requests as `(start, end)` pairs.
    pub fn window_requests(&self) -> Vec<(Option<DateTime<Utc>>, DateTime<Utc>)> {
        self.window_requests.lock().clone()
    }
}

impl RemoteEndpoint for MockEndpoint {
    fn submit_batch(
        &self,
        events: &[Event],
        _credentials: &Credentials,
        _client_version: &str,
        game_version: &str,
        game_build: &str,
    ) -> SyncResult<Vec<SubmitOutcome>> {
        self.submissions.lock().push(RecordedSubmission {
            events: events.to_vec(),
            game_version: game_version.into(),
            game_build: game_build.into(),
        });

        match self.submit_responses.lock().pop_front() {
            Some(response) => response,
            None => Ok(events.iter().map(|_| SubmitOutcome::success()).collect()),
        }
    }

    fn query_window(
        &self,
        _credentials: &Credentials,
        start: Option<DateTime<Utc>>,
        end: DateTime<Utc>,
    ) -> SyncResult<RemoteWindowResult> {
        self.window_requests.lock().push((start, end));

        match self.window_responses.lock().pop_front() {
            Some(response) => response,
            None => Ok(RemoteWindowResult::empty(start.unwrap_or(end), end)),
        }
    }

    fn fetch_discard_list(&self) -> SyncResult<Vec<String>> {
        if *self.fail_discard_fetch.lock() {
            return Err(SyncError::transport_retryable("discard fetch failed"));
        }
        Ok(self.discard_list.lock().clone().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn creds() -> Credentials {
        Credentials::new("JAMESON", "k3y")
    }

    #[test]
    fn unscripted_submit_succeeds_per_event() {
        let endpoint = MockEndpoint::new();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let events = vec![
            Event::new("Jump", now, "JAMESON"),
            Event::new("Scan", now, "JAMESON"),
        ];

        let outcomes = endpoint
            .submit_batch(&events, &creds(), "skylog test", "4.1", "r309")
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(SubmitOutcome::is_success));
        assert_eq!(endpoint.submissions().len(), 1);
        assert_eq!(endpoint.submissions()[0].game_build, "r309");
    }

    #[test]
    fn scripted_responses_are_consumed_in_order() {
        let endpoint = MockEndpoint::new();
        endpoint.push_submit_response(Err(SyncError::transport_retryable("down")));
        endpoint.push_submit_response(Ok(vec![SubmitOutcome::success()]));

        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let events = vec![Event::new("Jump", now, "JAMESON")];

        assert!(endpoint
            .submit_batch(&events, &creds(), "t", "v", "b")
            .is_err());
        assert!(endpoint
            .submit_batch(&events, &creds(), "t", "v", "b")
            .is_ok());
    }

    #[test]
    fn unscripted_window_echoes_bounds() {
        let endpoint = MockEndpoint::new();
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 8, 0, 0, 0).unwrap();

        let window = endpoint.query_window(&creds(), Some(start), end).unwrap();
        assert_eq!(window.window_start, start);
        assert_eq!(window.window_end, end);
        assert!(window.events.is_empty());
        assert_eq!(endpoint.window_requests(), vec![(Some(start), end)]);
    }

    #[test]
    fn discard_fetch_failure() {
        let endpoint = MockEndpoint::new();
        endpoint.set_discard_list(vec!["Music".into()]);
        assert_eq!(endpoint.fetch_discard_list().unwrap(), vec!["Music"]);

        endpoint.fail_discard_fetch(true);
        assert!(endpoint.fetch_discard_list().is_err());
    }
}
