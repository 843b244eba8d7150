//! Shared CUDA context — device initialization, stream acquisition, and a
//! bucketed device-buffer pool.
//!
//! The context is the boundary to the two collaborator capabilities the
//! conversion stage consumes:
//!
//! - **allocator**: [`GpuContext::alloc`] returns an owned [`DeviceBuffer`];
//!   freed buffers are returned through [`GpuContext::recycle`].  Buckets
//!   are power-of-two sized, so a warm pipeline satisfies every frame
//!   without touching the driver allocator.
//! - **stream pool**: [`GpuContext::acquire_stream`] forks a stream off the
//!   device's default stream; each operator instance acquires one at start
//!   and issues all of its per-frame work onto it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cudarc::driver::{CudaDevice, CudaSlice, CudaStream, CudaView, CudaViewMut, DevicePtr, DeviceSlice};
use tracing::{debug, info};

use crate::error::{ConvertError, Result};

/// Smallest pool bucket.  Requests below this still consume one bucket.
const MIN_BUCKET_BYTES: usize = 256;

/// Buffers retained per bucket before overflow frees back to the driver.
const MAX_BUFFERS_PER_BUCKET: usize = 8;

#[inline]
fn bucket_for(size: usize) -> usize {
    size.max(MIN_BUCKET_BYTES).next_power_of_two()
}

// ─── Device buffer handle ────────────────────────────────────────────────────

/// An owned device allocation handed out by the pool.
///
/// The wrapped [`CudaSlice`] is bucket-sized and may exceed the logical
/// length; `len` is what the requester asked for.  Dropping the handle
/// frees the device memory unless it was returned via
/// [`GpuContext::recycle`] first.
#[derive(Debug)]
pub struct DeviceBuffer {
    slice: CudaSlice<u8>,
    len: usize,
}

impl DeviceBuffer {
    /// Raw CUDA device pointer as a `u64` (suitable for kernel launches).
    ///
    /// Valid only while this handle is alive; callers must not free it or
    /// use it on another CUDA context.
    #[inline]
    pub fn device_ptr(&self) -> u64 {
        *self.slice.device_ptr() as u64
    }

    /// Logical length in bytes (what was requested from the pool).
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bucket capacity in bytes (≥ `len`).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slice.len()
    }

    /// Size-checked read view of the first `bytes` bytes.
    pub fn view(&self, bytes: usize) -> Result<CudaView<'_, u8>> {
        if bytes > self.len {
            return Err(ConvertError::InternalConsistency(format!(
                "device buffer view of {bytes} B exceeds logical length {} B",
                self.len
            )));
        }
        Ok(self.slice.slice(0..bytes))
    }

    /// Size-checked write view of the first `bytes` bytes.
    pub fn view_mut(&mut self, bytes: usize) -> Result<CudaViewMut<'_, u8>> {
        if bytes > self.len {
            return Err(ConvertError::InternalConsistency(format!(
                "device buffer view of {bytes} B exceeds logical length {} B",
                self.len
            )));
        }
        Ok(self.slice.slice_mut(0..bytes))
    }
}

// ─── Pool internals ──────────────────────────────────────────────────────────

/// Free buffers grouped by bucket size.
#[derive(Debug)]
struct BucketedPool {
    free: HashMap<usize, Vec<CudaSlice<u8>>>,
}

impl BucketedPool {
    fn new() -> Self {
        Self {
            free: HashMap::new(),
        }
    }

    fn take(&mut self, bucket: usize) -> Option<CudaSlice<u8>> {
        self.free.get_mut(&bucket).and_then(Vec::pop)
    }

    /// Returns the buffer back if the bucket is already full.
    fn put(&mut self, buf: CudaSlice<u8>) -> Option<CudaSlice<u8>> {
        let entry = self.free.entry(buf.len()).or_default();
        if entry.len() >= MAX_BUFFERS_PER_BUCKET {
            Some(buf)
        } else {
            entry.push(buf);
            None
        }
    }
}

/// Lock-free pool access counters.
#[derive(Debug, Default)]
pub struct PoolStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub recycled: AtomicU64,
    pub overflows: AtomicU64,
}

impl PoolStats {
    /// Fraction of allocations served from the pool.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }
}

// ─── GPU context ─────────────────────────────────────────────────────────────

/// Long-lived GPU context shared by every operator on one device.
#[derive(Debug)]
pub struct GpuContext {
    device: Arc<CudaDevice>,
    pool: Mutex<BucketedPool>,
    pub pool_stats: PoolStats,
}

impl GpuContext {
    /// Initialize the context on the given CUDA device ordinal.
    pub fn new(device_ordinal: usize) -> Result<Arc<Self>> {
        let device = CudaDevice::new(device_ordinal)?;
        info!(ordinal = device_ordinal, "CUDA device initialized");
        Ok(Arc::new(Self {
            device,
            pool: Mutex::new(BucketedPool::new()),
            pool_stats: PoolStats::default(),
        }))
    }

    /// Access the underlying `CudaDevice`.
    #[inline]
    pub fn device(&self) -> &Arc<CudaDevice> {
        &self.device
    }

    /// Stream-pool capability: fork a dedicated stream for one operator.
    pub fn acquire_stream(&self) -> Result<CudaStream> {
        let stream = self.device.fork_default_stream()?;
        debug!("execution stream acquired");
        Ok(stream)
    }

    /// Allocator capability: `bytes` of device memory, pooled when possible.
    ///
    /// Failure is surfaced as [`ConvertError::Allocation`] and is fatal to
    /// the requesting frame; it is never retried here.
    pub fn alloc(&self, bytes: usize) -> Result<DeviceBuffer> {
        let bucket = bucket_for(bytes);

        {
            let mut pool = self.pool.lock().unwrap();
            if let Some(slice) = pool.take(bucket) {
                self.pool_stats.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(DeviceBuffer { slice, len: bytes });
            }
        }

        self.pool_stats.misses.fetch_add(1, Ordering::Relaxed);
        let slice = self
            .device
            .alloc_zeros::<u8>(bucket)
            .map_err(|source| ConvertError::Allocation { bytes, source })?;
        Ok(DeviceBuffer { slice, len: bytes })
    }

    /// Return a buffer to the pool for future reuse.
    pub fn recycle(&self, buf: DeviceBuffer) {
        let mut pool = self.pool.lock().unwrap();
        if let Some(rejected) = pool.put(buf.slice) {
            self.pool_stats.overflows.fetch_add(1, Ordering::Relaxed);
            drop(rejected);
        } else {
            self.pool_stats.recycled.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Block until all device work issued so far has completed.
    ///
    /// Used at the scratch-reuse boundary: a new frame must not overwrite
    /// scratch memory that a previous frame's in-flight work may still read.
    pub fn synchronize(&self) -> Result<()> {
        self.device.synchronize()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_are_power_of_two_with_floor() {
        assert_eq!(bucket_for(1), MIN_BUCKET_BYTES);
        assert_eq!(bucket_for(256), 256);
        assert_eq!(bucket_for(257), 512);
        assert_eq!(bucket_for(1920 * 1080 * 3), (1920 * 1080 * 3usize).next_power_of_two());
    }
}
