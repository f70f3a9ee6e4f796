//! Overlap configuration for [`CallbackBufferSystem`](crate::CallbackBufferSystem).

/// Controls whether buffer packing and unpacking overlap across a
/// bounded pool of worker threads.
///
/// In either parallel mode the call into the transport layer stays
/// serialized behind a mutex; only callback execution runs
/// concurrently. Serial mode runs everything on the calling thread in
/// registration order.
#[derive(Clone, Debug)]
pub struct OverlapConfig {
    /// Run pack callbacks across worker threads during
    /// `start_communication()`.
    pub parallel_pack: bool,
    /// Run unpack callbacks across worker threads during `wait()`.
    pub parallel_unpack: bool,
    /// Worker pool size. `None` = auto-detect
    /// (`available_parallelism / 2`, clamped to `[2, 16]`).
    pub workers: Option<usize>,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            parallel_pack: false,
            parallel_unpack: false,
            workers: None,
        }
    }
}

impl OverlapConfig {
    /// Overlap both phases with an auto-detected pool size.
    pub fn parallel() -> Self {
        Self {
            parallel_pack: true,
            parallel_unpack: true,
            workers: None,
        }
    }

    /// Resolve the actual worker count, applying auto-detection if
    /// `None`. Explicit values are clamped to `[1, 64]`.
    pub fn resolved_worker_count(&self) -> usize {
        match self.workers {
            Some(n) => n.clamp(1, 64),
            None => {
                let cpus = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4);
                (cpus / 2).clamp(2, 16)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_serial() {
        let cfg = OverlapConfig::default();
        assert!(!cfg.parallel_pack);
        assert!(!cfg.parallel_unpack);
    }

    #[test]
    fn resolved_worker_count_clamps_zero() {
        let cfg = OverlapConfig {
            workers: Some(0),
            ..OverlapConfig::default()
        };
        assert_eq!(cfg.resolved_worker_count(), 1);
    }

    #[test]
    fn resolved_worker_count_clamps_large() {
        let cfg = OverlapConfig {
            workers: Some(500),
            ..OverlapConfig::default()
        };
        assert_eq!(cfg.resolved_worker_count(), 64);
    }

    #[test]
    fn resolved_worker_count_auto_in_range() {
        let count = OverlapConfig::parallel().resolved_worker_count();
        assert!((2..=16).contains(&count), "auto count {count} out of [2,16]");
    }
}
