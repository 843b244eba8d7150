//! Frame and tensor contract types.
//!
//! # Ownership model
//!
//! A [`FrameBuffer`] owns its backing memory — either host bytes or a
//! device allocation obtained through [`crate::context::GpuContext`].  It is
//! exclusively owned by whichever stage currently holds it (input message →
//! orchestrator → resize → convert → output message) and is never aliased by
//! two stages at once.  Stages that need to hand a *borrowed* device region
//! to a kernel use [`DeviceImage`], a non-owning view whose lifetime is tied
//! to the owner.
//!
//! # Invariants
//!
//! 1. A `FrameBuffer`'s memory is at least `desc.byte_size()` bytes.
//! 2. Plane offsets/strides in a [`FrameDesc`] are derived once from the
//!    format and never hand-edited afterwards.

use crate::context::DeviceBuffer;

// ─── Pixel formats ───────────────────────────────────────────────────────────

/// Named pixel format of a frame, as configured by `in_format`/`out_format`.
///
/// Every variant documents its memory layout and byte-size formula so that
/// buffer sizing is deterministic and auditable.  An unrecognized name is
/// not a variant here — it fails format parsing with
/// [`crate::error::ConvertError::UnknownFormat`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FormatKind {
    /// Packed interleaved uint8 RGB: `[R G B R G B …]`, row-major.
    /// Total: `rows × cols × 3` bytes.
    Rgb888,

    /// Packed interleaved uint8 RGBA: `[R G B A …]`, row-major.
    /// Total: `rows × cols × 4` bytes.
    Rgba8888,

    /// Channel-agnostic uint8 samples (grayscale when single-channel).
    /// Total: `rows × cols × channels` bytes; the channel count comes from
    /// the tensor that carries the data, defaulting to 1.
    Uint8,

    /// Channel-agnostic float32 samples.
    /// Total: `rows × cols × channels × 4` bytes.
    Float32,

    /// Planar 4:2:0 YUV: full-resolution Y plane followed by quarter-size
    /// U and V planes (one chroma sample per 2×2 luma block).
    /// Total: `rows×cols + 2 × ⌈rows/2⌉×⌈cols/2⌉` bytes.
    Yuv420,

    /// Semi-planar 4:2:0: full-resolution Y plane followed by one
    /// interleaved `[U V U V …]` plane at half resolution.
    /// Total: `rows×cols + ⌈rows/2⌉ × 2⌈cols/2⌉` bytes.
    Nv12,
}

impl FormatKind {
    /// Canonical configuration name for this format.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rgb888 => "rgb888",
            Self::Rgba8888 => "rgba8888",
            Self::Uint8 => "uint8",
            Self::Float32 => "float32",
            Self::Yuv420 => "yuv420",
            Self::Nv12 => "nv12",
        }
    }

    /// Bytes per channel-element (4 for float32, 1 otherwise).
    #[inline]
    pub const fn element_bytes(self) -> usize {
        match self {
            Self::Float32 => 4,
            _ => 1,
        }
    }

    /// Default channel count.  `Uint8`/`Float32` are channel-agnostic and
    /// default to 1; the actual count travels with the tensor descriptor.
    #[inline]
    pub const fn channels(self) -> usize {
        match self {
            Self::Rgb888 => 3,
            Self::Rgba8888 => 4,
            Self::Uint8 | Self::Float32 => 1,
            // Three color components, stored across sub-sampled planes.
            Self::Yuv420 | Self::Nv12 => 3,
        }
    }

    /// Whether the format stores channels in separate (sub-sampled) planes.
    #[inline]
    pub const fn is_planar(self) -> bool {
        matches!(self, Self::Yuv420 | Self::Nv12)
    }

    /// Whether a structured video buffer may carry this format.
    ///
    /// Mirrors the ingestion constraint of the video-buffer input path:
    /// packed RGB/RGBA capture or NV12 camera output.
    #[inline]
    pub const fn ingestible_as_video(self) -> bool {
        matches!(self, Self::Rgb888 | Self::Rgba8888 | Self::Nv12)
    }

    /// Plane layout for a frame of `rows × cols` with `channels` channels.
    ///
    /// Packed formats produce a single plane; 4:2:0 layouts produce the
    /// luma plane plus sub-sampled chroma plane(s) with ceiling-division
    /// extents for odd dimensions.
    pub fn plane_layout(self, rows: usize, cols: usize, channels: usize) -> Vec<ColorPlane> {
        let esize = self.element_bytes();
        match self {
            Self::Rgb888 | Self::Rgba8888 | Self::Uint8 | Self::Float32 => {
                let components = match self {
                    Self::Rgb888 => 3,
                    Self::Rgba8888 => 4,
                    _ => channels.max(1),
                };
                vec![ColorPlane {
                    offset: 0,
                    stride: cols * components * esize,
                    width: cols,
                    height: rows,
                    components,
                    element_bytes: esize,
                }]
            }
            Self::Yuv420 => {
                let cw = cols.div_ceil(2);
                let ch = rows.div_ceil(2);
                let y = ColorPlane {
                    offset: 0,
                    stride: cols,
                    width: cols,
                    height: rows,
                    components: 1,
                    element_bytes: 1,
                };
                let u = ColorPlane {
                    offset: y.byte_size(),
                    stride: cw,
                    width: cw,
                    height: ch,
                    components: 1,
                    element_bytes: 1,
                };
                let v = ColorPlane {
                    offset: u.offset + u.byte_size(),
                    ..u
                };
                vec![y, u, v]
            }
            Self::Nv12 => {
                let cw = cols.div_ceil(2);
                let ch = rows.div_ceil(2);
                let y = ColorPlane {
                    offset: 0,
                    stride: cols,
                    width: cols,
                    height: rows,
                    components: 1,
                    element_bytes: 1,
                };
                let uv = ColorPlane {
                    offset: y.byte_size(),
                    stride: 2 * cw,
                    width: cw,
                    height: ch,
                    components: 2,
                    element_bytes: 1,
                };
                vec![y, uv]
            }
        }
    }

    /// Exact byte count for a frame of this format.
    ///
    /// This is the sizing contract every scratch/output allocation goes
    /// through; sub-sampled planes are accounted plane-by-plane.
    pub fn required_bytes(self, rows: usize, cols: usize, channels: usize) -> usize {
        self.plane_layout(rows, cols, channels)
            .iter()
            .map(ColorPlane::byte_size)
            .sum()
    }
}

/// One contiguous memory region holding one channel or channel-group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorPlane {
    /// Byte offset of this plane from the frame base address.
    pub offset: usize,
    /// Row stride in bytes.
    pub stride: usize,
    /// Samples per row (an NV12 UV sample is one interleaved U/V pair).
    pub width: usize,
    /// Rows in this plane.
    pub height: usize,
    /// Interleaved components per sample (1 for Y/U/V, 2 for NV12 UV,
    /// 3/4 for packed RGB/RGBA).
    pub components: usize,
    /// Bytes per component element.
    pub element_bytes: usize,
}

impl ColorPlane {
    /// Total bytes occupied by this plane.
    #[inline]
    pub const fn byte_size(&self) -> usize {
        self.stride * self.height
    }
}

// ─── Resize interpolation policy ─────────────────────────────────────────────

/// Interpolation policy forwarded to the resampling kernel.
///
/// Raw numbering follows NPP's `NppiInterpolationMode` values, the
/// de-facto convention for this option in capture pipelines.  `from_raw`
/// returns `None` for a value outside the table; callers fall back to
/// [`ResizeMode::Cubic`] — a documented fallback, not a configuration
/// error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeMode {
    /// Nearest-neighbor (1).
    Nearest,
    /// Bilinear (2).
    Linear,
    /// Bicubic, Catmull-Rom weights (4). Also the fallback default.
    Cubic,
    /// Two-parameter cubic, B=1 C=0 (5).
    CubicBSpline,
    /// Two-parameter cubic, B=0 C=1/2 (6).
    CubicCatmullRom,
    /// Two-parameter cubic, B=1/2 C=3/10 (7).
    CubicB05C03,
    /// Super-sampling box filter (8); intended for downscaling.
    Super,
    /// Lanczos windowed sinc, order 2 (16).
    Lanczos,
    /// Lanczos windowed sinc, order 3 (17).
    Lanczos3,
}

impl ResizeMode {
    /// Decode a raw configuration value.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(Self::Nearest),
            2 => Some(Self::Linear),
            4 => Some(Self::Cubic),
            5 => Some(Self::CubicBSpline),
            6 => Some(Self::CubicCatmullRom),
            7 => Some(Self::CubicB05C03),
            8 => Some(Self::Super),
            16 => Some(Self::Lanczos),
            17 => Some(Self::Lanczos3),
            _ => None,
        }
    }

    /// Canonical raw value, as passed to the resampling kernel.
    pub const fn raw(self) -> i32 {
        match self {
            Self::Nearest => 1,
            Self::Linear => 2,
            Self::Cubic => 4,
            Self::CubicBSpline => 5,
            Self::CubicCatmullRom => 6,
            Self::CubicB05C03 => 7,
            Self::Super => 8,
            Self::Lanczos => 16,
            Self::Lanczos3 => 17,
        }
    }
}

// ─── Frame descriptors and buffers ──────────────────────────────────────────

/// Shape and layout of one frame: dimensions, format and derived planes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameDesc {
    pub rows: usize,
    pub cols: usize,
    pub channels: usize,
    pub format: FormatKind,
    pub planes: Vec<ColorPlane>,
}

impl FrameDesc {
    /// Build a descriptor, deriving the plane layout from the format.
    pub fn new(format: FormatKind, rows: usize, cols: usize, channels: usize) -> Self {
        let channels = match format {
            FormatKind::Rgb888 => 3,
            FormatKind::Rgba8888 => 4,
            FormatKind::Yuv420 | FormatKind::Nv12 => 3,
            FormatKind::Uint8 | FormatKind::Float32 => channels.max(1),
        };
        let planes = format.plane_layout(rows, cols, channels);
        Self {
            rows,
            cols,
            channels,
            format,
            planes,
        }
    }

    /// Exact byte count of a frame with this descriptor.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.planes.iter().map(ColorPlane::byte_size).sum()
    }
}

/// Backing memory of a [`FrameBuffer`].
#[derive(Debug)]
pub enum FrameMemory {
    /// Host-resident bytes; migrated to the device staging scratch before
    /// any kernel touches them.
    Host(Vec<u8>),
    /// Device-resident allocation owned by this frame.
    Device(DeviceBuffer),
}

/// A single frame plus the memory that backs it.
#[derive(Debug)]
pub struct FrameBuffer {
    pub desc: FrameDesc,
    pub memory: FrameMemory,
}

impl FrameBuffer {
    /// Wrap host bytes.  The caller guarantees `data.len() >= desc.byte_size()`.
    pub fn from_host(desc: FrameDesc, data: Vec<u8>) -> Self {
        Self {
            desc,
            memory: FrameMemory::Host(data),
        }
    }

    /// Wrap an owned device allocation.
    pub fn from_device(desc: FrameDesc, buffer: DeviceBuffer) -> Self {
        Self {
            desc,
            memory: FrameMemory::Device(buffer),
        }
    }

    /// Whether the backing memory is host-resident.
    #[inline]
    pub fn is_host(&self) -> bool {
        matches!(self.memory, FrameMemory::Host(_))
    }

    /// Bytes actually backing this frame.
    pub fn memory_len(&self) -> usize {
        match &self.memory {
            FrameMemory::Host(data) => data.len(),
            FrameMemory::Device(buf) => buf.len(),
        }
    }
}

/// Non-owning view of a device-resident frame, passed between stages and
/// into kernel launches.  Lifetime-bound to the owning buffer or scratch.
#[derive(Clone, Copy, Debug)]
pub struct DeviceImage<'a> {
    /// Raw device base address of the frame.
    pub ptr: u64,
    pub desc: &'a FrameDesc,
}

// ─── Message envelopes ───────────────────────────────────────────────────────

/// Input boundary: one message per tick from the pipeline framework.
///
/// Carries either a structured video buffer (format tagged, host- or
/// device-resident) or named generic tensors, or both; the orchestrator
/// searches in that order.
#[derive(Debug, Default)]
pub struct FrameMessage {
    pub video: Option<FrameBuffer>,
    pub tensors: Vec<(String, FrameBuffer)>,
}

impl FrameMessage {
    /// Message carrying a structured video buffer.
    pub fn from_video(frame: FrameBuffer) -> Self {
        Self {
            video: Some(frame),
            tensors: Vec::new(),
        }
    }

    /// Message carrying one named tensor.
    pub fn from_tensor(name: impl Into<String>, frame: FrameBuffer) -> Self {
        Self {
            video: None,
            tensors: vec![(name.into(), frame)],
        }
    }
}

/// Output boundary: one device tensor per tick under the configured name.
#[derive(Debug)]
pub struct TensorMessage {
    pub name: String,
    pub tensor: FrameBuffer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_sizes_are_rows_cols_channels() {
        assert_eq!(FormatKind::Rgb888.required_bytes(1080, 1920, 3), 1920 * 1080 * 3);
        assert_eq!(FormatKind::Rgba8888.required_bytes(4, 4, 4), 64);
        assert_eq!(FormatKind::Float32.required_bytes(8, 8, 1), 8 * 8 * 4);
        assert_eq!(FormatKind::Uint8.required_bytes(8, 8, 3), 8 * 8 * 3);
    }

    #[test]
    fn yuv420_sizes_account_for_subsampled_chroma() {
        // 4:2:0 — chroma planes are a quarter of the luma pixel count.
        assert_eq!(
            FormatKind::Yuv420.required_bytes(1080, 1920, 3),
            1920 * 1080 + 2 * 960 * 540
        );
        assert_eq!(
            FormatKind::Nv12.required_bytes(1080, 1920, 3),
            1920 * 1080 + 960 * 540 * 2
        );
    }

    #[test]
    fn odd_dimensions_round_chroma_extents_up() {
        let planes = FormatKind::Yuv420.plane_layout(5, 7, 3);
        assert_eq!(planes[1].width, 4);
        assert_eq!(planes[1].height, 3);
        assert_eq!(
            FormatKind::Yuv420.required_bytes(5, 7, 3),
            5 * 7 + 2 * 4 * 3
        );
    }

    #[test]
    fn plane_offsets_are_contiguous() {
        let planes = FormatKind::Nv12.plane_layout(1080, 1920, 3);
        assert_eq!(planes.len(), 2);
        assert_eq!(planes[0].offset, 0);
        assert_eq!(planes[1].offset, 1920 * 1080);
        assert_eq!(planes[1].components, 2);
    }

    #[test]
    fn frame_desc_forces_packed_channel_counts() {
        let desc = FrameDesc::new(FormatKind::Rgb888, 2, 2, 1);
        assert_eq!(desc.channels, 3);
        let desc = FrameDesc::new(FormatKind::Float32, 2, 2, 3);
        assert_eq!(desc.channels, 3);
        assert_eq!(desc.byte_size(), 2 * 2 * 3 * 4);
    }

    #[test]
    fn resize_mode_raw_round_trip() {
        for raw in [1, 2, 4, 5, 6, 7, 8, 16, 17] {
            let mode = ResizeMode::from_raw(raw).unwrap();
            assert_eq!(mode.raw(), raw);
        }
        // Undefined and out-of-table values have no mode; callers default
        // to cubic.
        assert_eq!(ResizeMode::from_raw(0), None);
        assert_eq!(ResizeMode::from_raw(3), None);
        assert_eq!(ResizeMode::from_raw(0x8000000), None);
    }
}
