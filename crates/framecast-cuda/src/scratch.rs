//! Lazily-grown device scratch arenas.
//!
//! Each [`ScratchBuffer`] is the single owner of one resizable device
//! allocation.  The conversion stage owns three of them — resize output,
//! channel-reorder output, and host→device staging — and reuses them across
//! frames.  Capacity is monotone: a scratch buffer's capacity is always ≥
//! the largest size it has ever been asked to hold during the operator's
//! active lifetime.
//!
//! Growing discards prior contents; every scratch region is fully
//! overwritten before it is read, so nothing is preserved or copied.

use std::sync::Arc;

use cudarc::driver::{CudaDevice, CudaSlice, CudaView, DevicePtr, DeviceSlice};
use tracing::info;

use framecast_core::error::{ConvertError, Result};

/// Single-owner device arena that grows but never shrinks.
pub struct ScratchBuffer {
    device: Arc<CudaDevice>,
    label: &'static str,
    buf: Option<CudaSlice<u8>>,
}

impl ScratchBuffer {
    /// Create an empty arena; no device memory is held until the first
    /// [`ensure_capacity`](Self::ensure_capacity).
    pub fn new(device: Arc<CudaDevice>, label: &'static str) -> Self {
        Self {
            device,
            label,
            buf: None,
        }
    }

    /// Current capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.as_ref().map_or(0, DeviceSlice::len)
    }

    /// Grow to at least `bytes`.  A no-op when capacity already suffices;
    /// otherwise the old allocation is dropped and a fresh one takes its
    /// place (contents undefined).  Failure is fatal to the requesting
    /// frame and surfaced as [`ConvertError::Allocation`].
    pub fn ensure_capacity(&mut self, bytes: usize) -> Result<()> {
        if bytes <= self.capacity() {
            return Ok(());
        }
        let old = self.capacity();
        // Scratch contents never survive growth; the old arena goes first.
        self.buf = None;
        let slice = self
            .device
            .alloc_zeros::<u8>(bytes)
            .map_err(|source| ConvertError::Allocation { bytes, source })?;
        self.buf = Some(slice);
        info!(
            scratch = self.label,
            old_bytes = old,
            new_bytes = bytes,
            "scratch arena grown"
        );
        Ok(())
    }

    /// Raw device pointer for a kernel that writes/reads `bytes` bytes.
    ///
    /// Size-checked: asking for more than the current capacity is a stage
    /// bug, not an allocation failure.
    pub fn device_ptr(&self, bytes: usize) -> Result<u64> {
        match &self.buf {
            Some(slice) if bytes <= slice.len() => Ok(*slice.device_ptr() as u64),
            _ => Err(ConvertError::InternalConsistency(format!(
                "scratch '{}' asked for {bytes} B view but holds {} B",
                self.label,
                self.capacity()
            ))),
        }
    }

    /// Size-checked read view of the first `bytes` bytes, for
    /// device-to-device or device-to-host copies.
    pub fn view(&self, bytes: usize) -> Result<CudaView<'_, u8>> {
        match &self.buf {
            Some(slice) if bytes <= slice.len() => Ok(slice.slice(0..bytes)),
            _ => Err(ConvertError::InternalConsistency(format!(
                "scratch '{}' asked for {bytes} B view but holds {} B",
                self.label,
                self.capacity()
            ))),
        }
    }

    /// Synchronous host→device copy into the head of the arena, growing it
    /// first if needed.  Blocks until the staged bytes are device-visible,
    /// so dependent device work may be issued immediately after.
    pub fn stage_from_host(&mut self, data: &[u8]) -> Result<u64> {
        self.ensure_capacity(data.len())?;
        let slice = self
            .buf
            .as_mut()
            .ok_or_else(|| ConvertError::InternalConsistency(format!(
                "scratch '{}' empty after ensure_capacity",
                self.label
            )))?;
        let mut view = slice.slice_mut(0..data.len());
        self.device.htod_sync_copy_into(data, &mut view)?;
        Ok(*slice.device_ptr() as u64)
    }
}

impl std::fmt::Debug for ScratchBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchBuffer")
            .field("label", &self.label)
            .field("capacity", &self.capacity())
            .finish()
    }
}
