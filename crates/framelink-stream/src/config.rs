use std::fmt;
use std::sync::Arc;

use framelink_frame::{BufferPool, FrameConfig, HeapPool};

/// What a queued write path does when its queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaturationPolicy {
    /// Block the submitting thread until a slot frees.
    #[default]
    Block,
    /// Fail the call immediately with `RpcError::QueueFull`.
    Reject,
}

/// Configuration for a [`Stream`](crate::Stream).
#[derive(Clone)]
pub struct StreamConfig {
    /// Framing limits and per-frame deadlines.
    pub frame: FrameConfig,
    /// Source of every buffer the stream hands out or reads into.
    pub pool: Arc<dyn BufferPool>,
    /// `None` writes on the submitting thread under a lock. `Some(n)` hands
    /// frames to a dedicated writer thread through a queue of `n` slots.
    pub write_queue_capacity: Option<usize>,
    /// Behaviour of a full write queue.
    pub saturation: SaturationPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            pool: Arc::new(HeapPool),
            write_queue_capacity: None,
            saturation: SaturationPolicy::default(),
        }
    }
}

impl StreamConfig {
    pub fn with_frame(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_pool(mut self, pool: Arc<dyn BufferPool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_write_queue(mut self, capacity: usize, saturation: SaturationPolicy) -> Self {
        self.write_queue_capacity = Some(capacity);
        self.saturation = saturation;
        self
    }
}

impl fmt::Debug for StreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConfig")
            .field("frame", &self.frame)
            .field("pool", &"<dyn BufferPool>")
            .field("write_queue_capacity", &self.write_queue_capacity)
            .field("saturation", &self.saturation)
            .finish()
    }
}
