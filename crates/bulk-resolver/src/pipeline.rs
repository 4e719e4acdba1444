use bytes::BytesMut;
use std::collections::VecDeque;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};

use dns_wire::protocol::deserialise::parse_response;
use dns_wire::protocol::serialise::build_query;
use dns_wire::protocol::tracker::TransactionTracker;
use dns_wire::protocol::types::{RecordType, Response};

use crate::input::{Hostnames, Next};
use crate::metrics::Metrics;
use crate::transport::Transport;

/// How long to keep listening for replies once the input has run dry,
/// unless configured otherwise.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Settings {
    /// Record type to ask for.
    pub qtype: RecordType,
    /// Most hostnames to read before sending and then draining replies.
    pub shots: usize,
    /// Pause after every send, and the longest wait for the next
    /// hostname.
    pub delay: Duration,
    /// How long to wait for a straggling reply after the input ends.
    pub drain_timeout: Duration,
    /// Only print addresses: no CNAMEs, no NXDOMAINs.
    pub address_only: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            qtype: RecordType::A,
            shots: 4,
            delay: Duration::from_micros(1500),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            address_only: false,
        }
    }
}

/// Reads hostnames, fires off queries in bursts, and writes out the
/// records from whatever replies come back.
///
/// There is no retransmission: a query which gets no reply by the
/// time the input is exhausted and the drain timeout has passed is
/// simply forgotten.
pub struct Pipeline {
    transport: Transport,
    tracker: TransactionTracker,
    settings: Settings,
    metrics: Metrics,
}

impl Pipeline {
    pub fn new(mut transport: Transport, settings: Settings) -> Self {
        transport.set_delay(settings.delay);

        Self {
            transport,
            tracker: TransactionTracker::new(),
            settings,
            metrics: Metrics::new(),
        }
    }

    /// Resolve every hostname in `input`, writing one line per record
    /// to `output`.
    ///
    /// # Errors
    ///
    /// If reading the input or writing the output fails.  Network
    /// failures are logged and counted, but do not stop the run.
    pub async fn run<R, W>(mut self, input: R, mut output: W) -> io::Result<Metrics>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut hostnames = Hostnames::new(input);
        let mut burst = VecDeque::new();
        let mut ended = false;

        loop {
            burst.clear();
            for _ in 0..self.settings.shots {
                match hostnames.next(self.settings.delay).await? {
                    Next::Name(hostname) => self.build(&hostname, &mut burst),
                    Next::Idle => break,
                    Next::End => {
                        ended = true;
                        break;
                    }
                }
            }

            self.send(&mut burst).await;

            loop {
                if ended && !self.transport.poll(self.settings.drain_timeout).await {
                    output.flush().await?;
                    return Ok(self.finish());
                }

                match self.transport.recv() {
                    Ok(Some(reply)) => {
                        self.metrics.reply_received();
                        self.handle_reply(&reply, &mut output).await?;
                    }
                    Ok(None) => {
                        if !ended {
                            break;
                        }
                    }
                    Err(error) => {
                        self.metrics.receive_error();
                        tracing::warn!(%error, "receive failed");
                        if ended && error.is_closed() {
                            output.flush().await?;
                            return Ok(self.finish());
                        }
                        if !ended {
                            break;
                        }
                    }
                }
            }

            output.flush().await?;
        }
    }

    fn build(&mut self, hostname: &str, burst: &mut VecDeque<BytesMut>) {
        match build_query(&mut self.tracker, hostname, self.settings.qtype) {
            Ok(query) => {
                self.metrics.query_built();
                burst.push_back(query);
            }
            Err(error) => {
                self.metrics.encode_failure();
                tracing::warn!(%hostname, %error, "skipping hostname");
            }
        }
    }

    async fn send(&mut self, burst: &mut VecDeque<BytesMut>) {
        let queued = burst.len();

        if let Err(error) = self.transport.send(burst).await {
            tracing::error!(%error, dropped = burst.len(), "send failed");
        }

        self.metrics.burst_sent(queued - burst.len(), burst.len());
        burst.clear();
    }

    async fn handle_reply<W: AsyncWrite + Unpin>(
        &mut self,
        reply: &[u8],
        output: &mut W,
    ) -> io::Result<()> {
        match parse_response(reply, &mut self.tracker) {
            Ok(Some(response)) => {
                self.metrics.reply_accepted();
                self.write_response(&response, output).await
            }
            Ok(None) => {
                self.metrics.reply_uncorrelated();
                tracing::trace!(len = reply.len(), "discarding uncorrelated reply");
                Ok(())
            }
            Err(error) => {
                self.metrics.reply_malformed();
                tracing::debug!(id = ?error.id(), %error, "discarding malformed reply");
                Ok(())
            }
        }
    }

    async fn write_response<W: AsyncWrite + Unpin>(
        &mut self,
        response: &Response,
        output: &mut W,
    ) -> io::Result<()> {
        for (key, value) in response.records.iter() {
            if self.settings.address_only && !value.is_address() {
                continue;
            }

            let line = format!("{}\t\t{key}\t{value}\n", response.name);
            output.write_all(line.as_bytes()).await?;
            self.metrics.record_written();
        }

        Ok(())
    }

    fn finish(mut self) -> Metrics {
        self.metrics.queries_unanswered = self.tracker.len() as u64;
        self.metrics
    }
}
