//! The read pump: one cancellable task per opened port.
//!
//! The pump owns the receive stream and a fresh [`LineFramer`], decodes every
//! framed line and feeds accepted readings into the [`SharedSession`]. It
//! counts accepted readings so the prober can judge a candidate
//! configuration while the same task keeps running after the link is up.

use crate::port::ByteStream;
use crate::reading::{decode_line, LineFramer};
use crate::session::SharedSession;
use futures::StreamExt;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Handle to a running read loop.
///
/// Dropping the handle cancels the loop, which releases the stream.
#[derive(Debug)]
pub struct ReadPump {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
    valid_readings: Arc<AtomicUsize>,
    fault: Arc<OnceCell<String>>,
}

impl ReadPump {
    /// Start pumping `stream` through `framer` into `session`.
    pub fn spawn(stream: ByteStream, framer: LineFramer, session: SharedSession) -> Self {
        let cancel_token = CancellationToken::new();
        let valid_readings = Arc::new(AtomicUsize::new(0));
        let fault = Arc::new(OnceCell::new());

        let handle = tokio::spawn(read_loop(
            stream,
            framer,
            session,
            cancel_token.clone(),
            Arc::clone(&valid_readings),
            Arc::clone(&fault),
        ));

        Self {
            cancel_token,
            handle,
            valid_readings,
            fault,
        }
    }

    /// Readings accepted since this pump started.
    pub fn valid_readings(&self) -> usize {
        self.valid_readings.load(Ordering::SeqCst)
    }

    /// Whether the stream errored or ended.
    pub fn has_faulted(&self) -> bool {
        self.fault.get().is_some()
    }

    /// Why the stream stopped, once it has.
    pub fn fault(&self) -> Option<&str> {
        self.fault.get().map(String::as_str)
    }

    /// Fault record shared with the read loop.
    ///
    /// It is filled before the session hears about the fault, so a reader
    /// holding the session lock sees either the record or a later fault call.
    pub(crate) fn fault_record(&self) -> &OnceCell<String> {
        &self.fault
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the pending read and wait for the task to exit.
    pub async fn stop(mut self) {
        self.cancel_token.cancel();
        if let Err(e) = (&mut self.handle).await {
            warn!("Read pump task failed to join: {}", e);
        }
    }
}

impl Drop for ReadPump {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn read_loop(
    mut stream: ByteStream,
    mut framer: LineFramer,
    session: SharedSession,
    cancel_token: CancellationToken,
    valid_readings: Arc<AtomicUsize>,
    fault: Arc<OnceCell<String>>,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                debug!("Read pump cancelled");
                break;
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                for line in framer.push(&chunk) {
                    match decode_line(&line) {
                        Ok(reading) => {
                            trace!("Accepted {} from {:?}", reading, line);
                            session.accept(reading);
                            valid_readings.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(rejection) => trace!("Dropped line: {}", rejection),
                    }
                }
            }
            Some(Err(e)) => {
                warn!("Serial stream fault: {}", e);
                report_fault(&fault, &session, format!("Serial stream fault: {e}"));
                break;
            }
            None => {
                debug!("Serial stream ended");
                report_fault(
                    &fault,
                    &session,
                    "Serial stream closed by the device".to_string(),
                );
                break;
            }
        }
    }
}

fn report_fault(fault: &OnceCell<String>, session: &SharedSession, message: String) {
    let _ = fault.set(message.clone());
    session.stream_fault(message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortError;
    use crate::session::ConnectionStatus;
    use futures::stream;
    use tokio_stream::wrappers::ReceiverStream;

    fn scripted(chunks: Vec<Result<Vec<u8>, PortError>>) -> ByteStream {
        stream::iter(chunks).chain(stream::pending()).boxed()
    }

    #[tokio::test(start_paused = true)]
    async fn test_counts_only_accepted_lines() {
        let session = SharedSession::new();
        let pump = ReadPump::spawn(
            scripted(vec![
                Ok(b"ST,GS,+0000010kg\nnoise\nST,GS,+70000kg\n".to_vec()),
                Ok(b"US+0000200\n".to_vec()),
            ]),
            LineFramer::default(),
            session.clone(),
        );

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(pump.valid_readings(), 2);
        assert_eq!(session.current_weight(), Some(20.0));
        assert!(!session.is_stable());
        assert!(!pump.has_faulted());

        pump.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_read() {
        let pump = ReadPump::spawn(scripted(vec![]), LineFramer::default(), SharedSession::new());
        assert!(!pump.is_finished());
        pump.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fault_ends_loop() {
        let session = SharedSession::new();
        session.begin_connect();
        session
            .mark_connected(crate::port::SerialConfig::default(), &OnceCell::new())
            .unwrap();

        let pump = ReadPump::spawn(
            scripted(vec![
                Ok(b"ST,GS,+0000010kg\n".to_vec()),
                Err(PortError::Io(std::io::Error::other("parity error"))),
            ]),
            LineFramer::default(),
            session.clone(),
        );

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(pump.has_faulted());
        assert!(pump.fault().unwrap().contains("parity error"));
        assert!(pump.is_finished());
        assert_eq!(session.connection_status(), ConnectionStatus::Disconnected);
        assert!(session.last_error().unwrap().contains("parity error"));
        pump.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_of_stream_is_recorded() {
        let pump = ReadPump::spawn(
            stream::empty().boxed(),
            LineFramer::default(),
            SharedSession::new(),
        );

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(pump.fault(), Some("Serial stream closed by the device"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_releases_stream() {
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<Vec<u8>, PortError>>(4);
        let pump = ReadPump::spawn(
            ReceiverStream::new(rx).boxed(),
            LineFramer::default(),
            SharedSession::new(),
        );
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(!tx.is_closed());

        drop(pump);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(tx.is_closed());
    }
}
