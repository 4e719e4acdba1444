/// Counters from a run of the pipeline.  The pipeline builds this
/// structure as it goes, and hands it back when input is exhausted.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Metrics {
    /// Queries built and registered with the tracker.
    pub queries_built: u64,
    /// Hostnames which could not be encoded.
    pub encode_failures: u64,
    /// Queries handed to the socket.
    pub queries_sent: u64,
    /// Queries dropped because a send failed.
    pub queries_dropped: u64,
    /// Bursts which were cut short by a send failure.
    pub send_failures: u64,
    /// Datagrams read from the socket.
    pub replies_received: u64,
    /// Replies matched to an outstanding query.
    pub replies_accepted: u64,
    /// Replies which matched no outstanding query.
    pub replies_uncorrelated: u64,
    /// Replies which could not be parsed.
    pub replies_malformed: u64,
    pub receive_errors: u64,
    /// Output lines written.
    pub records_written: u64,
    /// Queries still outstanding when the pipeline stopped waiting.
    pub queries_unanswered: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            queries_built: 0,
            encode_failures: 0,
            queries_sent: 0,
            queries_dropped: 0,
            send_failures: 0,
            replies_received: 0,
            replies_accepted: 0,
            replies_uncorrelated: 0,
            replies_malformed: 0,
            receive_errors: 0,
            records_written: 0,
            queries_unanswered: 0,
        }
    }

    pub fn query_built(&mut self) {
        self.queries_built += 1;
    }

    pub fn encode_failure(&mut self) {
        self.encode_failures += 1;
    }

    pub fn burst_sent(&mut self, sent: usize, dropped: usize) {
        self.queries_sent += sent as u64;
        if dropped > 0 {
            self.queries_dropped += dropped as u64;
            self.send_failures += 1;
        }
    }

    pub fn reply_received(&mut self) {
        self.replies_received += 1;
    }

    pub fn reply_accepted(&mut self) {
        self.replies_accepted += 1;
    }

    pub fn reply_uncorrelated(&mut self) {
        self.replies_uncorrelated += 1;
    }

    pub fn reply_malformed(&mut self) {
        self.replies_malformed += 1;
    }

    pub fn receive_error(&mut self) {
        self.receive_errors += 1;
    }

    pub fn record_written(&mut self) {
        self.records_written += 1;
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_sent_counts_failures_once() {
        let mut metrics = Metrics::new();
        metrics.burst_sent(4, 0);
        metrics.burst_sent(1, 3);

        assert_eq!(5, metrics.queries_sent);
        assert_eq!(3, metrics.queries_dropped);
        assert_eq!(1, metrics.send_failures);
    }
}
