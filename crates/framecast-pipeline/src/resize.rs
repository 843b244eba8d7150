//! Resize stage: per-plane geometric resampling at the destination
//! resolution, source pixel format preserved.
//!
//! The stage is a guaranteed no-op — no buffer copy, no scratch growth —
//! when resizing is disabled (either target dimension 0) or the target
//! equals the source dimensions.  Otherwise every color plane is resampled
//! independently, so planar/sub-sampled layouts keep their relative
//! sub-sampling, and only spatial dimensions change.

use cudarc::driver::CudaStream;
use tracing::debug;

use framecast_core::error::{ConvertError, Result};
use framecast_core::types::{DeviceImage, FormatKind, FrameDesc, ResizeMode};
use framecast_cuda::ConvertKernels;

/// Destination descriptor if resampling is needed, `None` for the no-op
/// path.  Pure planning — no allocation happens here.
pub(crate) fn plan_resize(desc: &FrameDesc, target_width: u32, target_height: u32) -> Option<FrameDesc> {
    if target_width == 0 || target_height == 0 {
        return None;
    }
    let (rows, cols) = (target_height as usize, target_width as usize);
    if rows == desc.rows && cols == desc.cols {
        return None;
    }
    Some(FrameDesc::new(desc.format, rows, cols, desc.channels))
}

/// Resample `src` to `dst_desc` dimensions at `dst_base` — normally a view
/// of the resize scratch, or the output tensor itself when the conversion
/// stage downstream is a passthrough.
pub(crate) fn run_resize(
    kernels: &ConvertKernels,
    stream: &CudaStream,
    src: DeviceImage<'_>,
    dst_base: u64,
    dst_desc: &FrameDesc,
    mode: ResizeMode,
) -> Result<()> {
    if src.desc.planes.len() != dst_desc.planes.len() {
        return Err(ConvertError::InternalConsistency(format!(
            "resize plane count mismatch: {} vs {}",
            src.desc.planes.len(),
            dst_desc.planes.len()
        )));
    }

    debug!(
        in_cols = src.desc.cols,
        in_rows = src.desc.rows,
        out_cols = dst_desc.cols,
        out_rows = dst_desc.rows,
        mode = ?mode,
        "resampling"
    );

    let float_data = src.desc.format == FormatKind::Float32;
    for (src_plane, dst_plane) in src.desc.planes.iter().zip(dst_desc.planes.iter()) {
        let esize = src_plane.element_bytes;
        let in_ptr = src.ptr + src_plane.offset as u64;
        let out_ptr = dst_base + dst_plane.offset as u64;
        let in_stride = (src_plane.stride / esize) as i32;
        let out_stride = (dst_plane.stride / esize) as i32;

        if float_data {
            kernels.resize_plane_f32(
                stream,
                in_ptr,
                src_plane.width as i32,
                src_plane.height as i32,
                in_stride,
                out_ptr,
                dst_plane.width as i32,
                dst_plane.height as i32,
                out_stride,
                src_plane.components as i32,
                mode.raw(),
            )?;
        } else {
            kernels.resize_plane_u8(
                stream,
                in_ptr,
                src_plane.width as i32,
                src_plane.height as i32,
                in_stride,
                out_ptr,
                dst_plane.width as i32,
                dst_plane.height as i32,
                out_stride,
                src_plane.components as i32,
                mode.raw(),
            )?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_target_disables_resizing() {
        let desc = FrameDesc::new(FormatKind::Rgb888, 1080, 1920, 3);
        assert!(plan_resize(&desc, 0, 0).is_none());
        assert!(plan_resize(&desc, 640, 0).is_none());
        assert!(plan_resize(&desc, 0, 480).is_none());
    }

    #[test]
    fn same_dimensions_are_a_no_op() {
        let desc = FrameDesc::new(FormatKind::Nv12, 1080, 1920, 3);
        assert!(plan_resize(&desc, 1920, 1080).is_none());
    }

    #[test]
    fn plan_keeps_format_and_subsampling() {
        let desc = FrameDesc::new(FormatKind::Yuv420, 1080, 1920, 3);
        let out = plan_resize(&desc, 640, 480).unwrap();
        assert_eq!(out.format, FormatKind::Yuv420);
        assert_eq!(out.rows, 480);
        assert_eq!(out.cols, 640);
        assert_eq!(out.planes.len(), 3);
        // Chroma stays quarter-size relative to the new luma plane.
        assert_eq!(out.planes[1].width, 320);
        assert_eq!(out.planes[1].height, 240);
    }
}
