//! Stream driver: reconnect loop around the transport.
//!
//! Each connection starts at the shared latest cursor. After a failure:
//! - [`FailureClass::SkipForward`]: bump the cursor by one microsecond and reconnect at once.
//!   Reconnecting at the exact position that broke tends to break again.
//! - [`FailureClass::Retry`]: reconnect at the same cursor after the configured backoff. The
//!   backoff grows while consecutive connections make no progress and resets once they do.
//! - [`FailureClass::Fatal`]: return the error.

use crate::config::ReconnectionConfig;
use crate::cursor::RunState;
use crate::dispatcher::EventHandler;
use crate::transport::{FailureClass, Transport, TransportError};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::Instrument;

pub struct StreamDriver {
    transport: Arc<dyn Transport>,
    handler: Arc<dyn EventHandler>,
    state: Arc<RunState>,
    reconnection: ReconnectionConfig,
    span: tracing::Span,
}

impl StreamDriver {
    pub fn new(
        transport: Arc<dyn Transport>,
        handler: Arc<dyn EventHandler>,
        state: Arc<RunState>,
        reconnection: ReconnectionConfig,
    ) -> Self {
        Self {
            transport,
            handler,
            state,
            reconnection,
            span: tracing::info_span!("driver"),
        }
    }

    /// Run until `shutdown` flips to true (returns `Ok`) or a fatal failure (returns `Err`).
    ///
    /// Cancellation is only observed between events, so the event being dispatched always
    /// finishes.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), TransportError> {
        self.run_inner(shutdown).instrument(self.span.clone()).await
    }

    async fn run_inner(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), TransportError> {
        let mut retries: u32 = 0;
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }
            let cursor = self.state.latest_cursor();
            tracing::debug!(%cursor, lag_s = cursor.lag().as_secs_f64(), "connecting");

            let result = tokio::select! {
                r = self.transport.connect_and_read(cursor, self.handler.as_ref()) => r,
                _ = shutdown.changed() => {
                    tracing::info!(latest_cursor = %self.state.latest_cursor(), "stopping stream");
                    return Ok(());
                }
            };

            if self.state.latest_cursor() != cursor {
                retries = 0;
            }

            let err = match result {
                Ok(()) => TransportError::ReadLoop("stream ended".into()),
                Err(e) => e,
            };
            match err.class() {
                FailureClass::SkipForward => {
                    let failed_at = self.state.latest_cursor();
                    let next = self.state.skip_forward();
                    tracing::error!(
                        latest_cursor = %failed_at,
                        next_cursor = %next,
                        reason = %err,
                        "failed to read from websocket, skipping to the next cursor"
                    );
                }
                FailureClass::Retry => {
                    retries = retries.saturating_add(1);
                    let delay = self.retry_delay(retries);
                    tracing::warn!(
                        latest_cursor = %self.state.latest_cursor(),
                        retries,
                        delay_ms = delay.as_millis() as u64,
                        reason = %err,
                        "failed to read from websocket, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::select! {
                            _ = sleep(delay) => {}
                            _ = shutdown.changed() => return Ok(()),
                        }
                    }
                }
                FailureClass::Fatal => {
                    tracing::error!(
                        latest_cursor = %self.state.latest_cursor(),
                        reason = %err,
                        "stream failed"
                    );
                    return Err(err);
                }
            }
        }
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.reconnection.backoff(attempt);
        if base.is_zero() || self.reconnection.jitter.is_zero() {
            return base;
        }
        let jitter_us = u64::try_from(self.reconnection.jitter.as_micros()).unwrap_or(u64::MAX);
        base + Duration::from_micros(rand::thread_rng().gen_range(0..=jitter_us))
    }
}
