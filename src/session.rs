//! Session state shared between the read pump and the reader's callers.
//!
//! A `SharedSession` pairs the mutable [`SessionState`] with a broadcast
//! channel of accepted readings. Only the pipeline and the service mutate
//! it; everything else gets snapshots and subscriptions.

use crate::port::SerialConfig;
use crate::reading::Reading;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Readings buffered per subscriber before the slowest one starts lagging.
const READING_BUFFER_SIZE: usize = 64;

/// Link lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// State of one connect/disconnect cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SessionState {
    pub connection_status: ConnectionStatus,
    /// Weight of the last accepted reading.
    pub current_weight: Option<f64>,
    /// Stability of the last accepted reading.
    pub is_stable: bool,
    pub last_error: Option<String>,
    /// Line parameters locked in by the prober.
    pub active_config: Option<SerialConfig>,
    /// Readings accepted since the current connect attempt began.
    pub readings_accepted: u64,
}

impl SessionState {
    /// Weight to record for a weighing: present only while stable.
    pub fn stable_weight(&self) -> Option<f64> {
        if self.is_stable {
            self.current_weight
        } else {
            None
        }
    }

    fn clear_reading(&mut self) {
        self.current_weight = None;
        self.is_stable = false;
    }
}

/// Cloneable handle to the session state and its reading channel.
#[derive(Debug, Clone)]
pub struct SharedSession {
    state: Arc<Mutex<SessionState>>,
    readings: broadcast::Sender<Reading>,
}

impl SharedSession {
    pub fn new() -> Self {
        let (readings, _) = broadcast::channel(READING_BUFFER_SIZE);
        Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            readings,
        }
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.state.lock().connection_status
    }

    pub fn current_weight(&self) -> Option<f64> {
        self.state.lock().current_weight
    }

    pub fn is_stable(&self) -> bool {
        self.state.lock().is_stable
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    pub fn active_config(&self) -> Option<SerialConfig> {
        self.state.lock().active_config
    }

    pub fn stable_weight(&self) -> Option<f64> {
        self.state.lock().stable_weight()
    }

    /// Live stream of accepted readings, starting from the next one.
    pub fn subscribe(&self) -> BroadcastStream<Reading> {
        BroadcastStream::new(self.readings.subscribe())
    }

    /// Apply an accepted reading and publish it.
    ///
    /// Weight and stability change together under one lock.
    pub(crate) fn accept(&self, reading: Reading) {
        {
            let mut state = self.state.lock();
            state.current_weight = Some(reading.weight_kg);
            state.is_stable = reading.stable;
            state.readings_accepted += 1;
        }
        // Ignore send errors - they just mean no active subscribers
        let _ = self.readings.send(reading);
    }

    /// Enter `Connecting` with a clean slate.
    pub(crate) fn begin_connect(&self) {
        let mut state = self.state.lock();
        state.clear_reading();
        state.connection_status = ConnectionStatus::Connecting;
        state.active_config = None;
        state.last_error = None;
        state.readings_accepted = 0;
    }

    /// Enter `Connected` unless the read loop has already faulted.
    ///
    /// `fault` is checked under the state lock. A fault recorded after the
    /// check reaches `stream_fault` once `Connected` is visible, so no
    /// fault is lost during the handover. On refusal the recorded message
    /// is returned and the state stays `Connecting`.
    pub(crate) fn mark_connected(
        &self,
        config: SerialConfig,
        fault: &OnceCell<String>,
    ) -> Result<(), String> {
        let mut state = self.state.lock();
        if let Some(message) = fault.get() {
            return Err(message.clone());
        }
        state.connection_status = ConnectionStatus::Connected;
        state.active_config = Some(config);
        Ok(())
    }

    /// Drop back to `Disconnected`, recording `error` when one is given.
    pub(crate) fn reset(&self, error: Option<String>) {
        let mut state = self.state.lock();
        state.clear_reading();
        state.connection_status = ConnectionStatus::Disconnected;
        state.active_config = None;
        if error.is_some() {
            state.last_error = error;
        }
    }

    /// React to the read loop dying on a transport fault.
    ///
    /// Only a live connection is torn down; during probing the prober
    /// discards the candidate itself.
    pub(crate) fn stream_fault(&self, message: String) {
        let mut state = self.state.lock();
        if state.connection_status == ConnectionStatus::Connected {
            state.clear_reading();
            state.connection_status = ConnectionStatus::Disconnected;
            state.active_config = None;
            state.last_error = Some(message);
        }
    }
}

impl Default for SharedSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_default_state() {
        let session = SharedSession::new();
        let state = session.snapshot();
        assert_eq!(state.connection_status, ConnectionStatus::Disconnected);
        assert_eq!(state.current_weight, None);
        assert!(!state.is_stable);
        assert_eq!(state.active_config, None);
    }

    #[test]
    fn test_accept_updates_weight_and_stability_together() {
        let session = SharedSession::new();
        session.accept(Reading::new(120.0, false, "US+0001200"));
        assert_eq!(session.current_weight(), Some(120.0));
        assert!(!session.is_stable());
        assert_eq!(session.stable_weight(), None);

        session.accept(Reading::new(125.0, true, "ST+0001250"));
        assert_eq!(session.stable_weight(), Some(125.0));
        assert_eq!(session.snapshot().readings_accepted, 2);
    }

    #[test]
    fn test_begin_connect_clears_previous_session() {
        let session = SharedSession::new();
        session.accept(Reading::new(1.0, true, "ST+0000010"));
        session.reset(Some("boom".into()));
        session.begin_connect();

        let state = session.snapshot();
        assert_eq!(state.connection_status, ConnectionStatus::Connecting);
        assert_eq!(state.current_weight, None);
        assert_eq!(state.last_error, None);
    }

    #[test]
    fn test_reset_keeps_error_unless_replaced() {
        let session = SharedSession::new();
        session.reset(Some("no port".into()));
        session.reset(None);
        assert_eq!(session.last_error().as_deref(), Some("no port"));
    }

    #[test]
    fn test_stream_fault_ignored_while_connecting() {
        let session = SharedSession::new();
        session.begin_connect();
        session.stream_fault("parity error".into());
        assert_eq!(session.connection_status(), ConnectionStatus::Connecting);
        assert_eq!(session.last_error(), None);
    }

    #[test]
    fn test_stream_fault_tears_down_connection() {
        let session = SharedSession::new();
        session.begin_connect();
        session
            .mark_connected(SerialConfig::default(), &OnceCell::new())
            .unwrap();
        session.accept(Reading::new(10.0, true, "ST+0000100"));
        session.stream_fault("framing error".into());

        let state = session.snapshot();
        assert_eq!(state.connection_status, ConnectionStatus::Disconnected);
        assert_eq!(state.current_weight, None);
        assert_eq!(state.active_config, None);
        assert_eq!(state.last_error.as_deref(), Some("framing error"));
    }

    #[test]
    fn test_connect_refused_after_recorded_fault() {
        let session = SharedSession::new();
        session.begin_connect();
        let fault = OnceCell::new();
        fault.set("Serial stream closed by the device".to_string()).unwrap();
        session.stream_fault("Serial stream closed by the device".into());

        let refused = session.mark_connected(SerialConfig::default(), &fault);

        assert_eq!(
            refused,
            Err("Serial stream closed by the device".to_string())
        );
        assert_eq!(session.connection_status(), ConnectionStatus::Connecting);
        assert_eq!(session.active_config(), None);
    }

    #[tokio::test]
    async fn test_subscribers_see_readings_in_order() {
        let session = SharedSession::new();
        let mut stream = session.subscribe();
        session.accept(Reading::new(10.0, true, "a"));
        session.accept(Reading::new(20.0, true, "b"));

        assert_eq!(stream.next().await.unwrap().unwrap().weight_kg, 10.0);
        assert_eq!(stream.next().await.unwrap().unwrap().weight_kg, 20.0);
    }

    #[test]
    fn test_subscriber_waits_for_next_reading() {
        let session = SharedSession::new();
        session.accept(Reading::new(1.0, true, "before subscribe"));

        let mut stream = session.subscribe();
        let mut next = tokio_test::task::spawn(stream.next());
        tokio_test::assert_pending!(next.poll());

        session.accept(Reading::new(5.0, true, "ST+0000050"));
        assert!(next.is_woken());
        let item = tokio_test::assert_ready!(next.poll());
        assert_eq!(item.unwrap().unwrap().weight_kg, 5.0);
    }
}
