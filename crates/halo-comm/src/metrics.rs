//! Lifetime communication counters, updated as cycles run.

/// Plain counters accumulated by a [`BufferSystem`](crate::BufferSystem)
/// over its lifetime.
///
/// Byte counts cover message payloads only; the unknown-size policy's
/// eight-byte size headers are not included.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommStats {
    /// Completed communication cycles.
    pub cycles: u64,
    /// Messages handed to the transport.
    pub messages_sent: u64,
    /// Payload bytes handed to the transport.
    pub bytes_sent: u64,
    /// Completed receives surfaced to the caller.
    pub messages_received: u64,
    /// Payload bytes received.
    pub bytes_received: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        assert_eq!(CommStats::default(), CommStats {
            cycles: 0,
            messages_sent: 0,
            bytes_sent: 0,
            messages_received: 0,
            bytes_received: 0,
        });
    }
}
