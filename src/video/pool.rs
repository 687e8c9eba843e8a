use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::PoolError;
use crate::video::types::{FrameSize, PixelBuffer, PixelFormat};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Bounded pool of reusable pixel buffers of one size and format.
///
/// Cloning shares the pool. `acquire` never blocks; once `capacity` buffers
/// are out it fails until one is released.
#[derive(Debug, Clone)]
pub struct PixelBufferPool {
    id: u64,
    size: FrameSize,
    format: PixelFormat,
    capacity: usize,
    state: Arc<Mutex<PoolState>>,
}

#[derive(Debug, Default)]
struct PoolState {
    free: Vec<Vec<u8>>,
    outstanding: usize,
}

impl PixelBufferPool {
    pub fn new(size: FrameSize, format: PixelFormat, capacity: usize) -> Self {
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Pixel buffer pool {}: {}x{} {:?}, capacity {}",
            id, size.width, size.height, format, capacity
        );
        Self {
            id,
            size,
            format,
            capacity,
            state: Arc::new(Mutex::new(PoolState::default())),
        }
    }

    pub fn frame_size(&self) -> FrameSize {
        self.size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn bytes_per_row(&self) -> usize {
        self.size.width as usize * self.format.bytes_per_pixel()
    }

    /// Buffers currently leased out
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    /// Buffers that can be acquired right now
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.lock().outstanding)
    }

    pub fn acquire(&self) -> Result<PixelBuffer, PoolError> {
        let mut state = self.lock();
        if state.outstanding >= self.capacity {
            return Err(PoolError::Exhausted {
                capacity: self.capacity,
            });
        }

        let bytes_per_row = self.bytes_per_row();
        let data = state
            .free
            .pop()
            .unwrap_or_else(|| vec![0u8; bytes_per_row * self.size.height as usize]);
        state.outstanding += 1;

        Ok(PixelBuffer::from_parts(
            self.size,
            self.format,
            bytes_per_row,
            data,
            self.id,
        ))
    }

    /// Return a leased buffer so its memory can be recycled
    pub fn release(&self, buffer: PixelBuffer) {
        if buffer.pool_id() != self.id {
            warn!("Dropping pixel buffer released to foreign pool {}", self.id);
            return;
        }

        let mut state = self.lock();
        state.outstanding = state.outstanding.saturating_sub(1);

        let expected_len = self.bytes_per_row() * self.size.height as usize;
        let data = buffer.into_data();
        if data.len() == expected_len {
            state.free.push(data);
        } else {
            warn!(
                "Discarding pixel buffer of {} bytes (pool expects {})",
                data.len(),
                expected_len
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
