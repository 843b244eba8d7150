//! Conversion stage: pixel-format/dtype conversion plus the final channel
//! permutation.
//!
//! Dispatch is a table lookup over the [`ConvertOp`] selected at
//! initialization.  When a channel permutation is configured the conversion
//! writes into the channel-reorder scratch and the permutation runs as the
//! final step into the output buffer — regardless of conversion class, on
//! the already-converted channel count.
//!
//! The [`reference`] module holds the scalar per-pixel semantics the CUDA
//! kernels embed, as plain Rust.  It is the executable definition used by
//! the unit tests and by the GPU comparison tests.

use cudarc::driver::CudaStream;

use framecast_core::error::{ConvertError, Result};
use framecast_core::types::{DeviceImage, FormatKind, FrameDesc};
use framecast_cuda::{ConvertKernels, ScratchBuffer};

use crate::catalogue::ConvertOp;

/// Immutable conversion parameters resolved at configuration time.
#[derive(Debug)]
pub(crate) struct ConvertParams<'a> {
    pub op: ConvertOp,
    pub scale_min: f32,
    pub scale_max: f32,
    pub alpha_value: u8,
    /// `None` = identity.
    pub channel_order: Option<&'a [usize]>,
}

/// Descriptor of the conversion output for a given input.
pub(crate) fn output_desc(op: ConvertOp, input: &FrameDesc, out_kind: FormatKind) -> FrameDesc {
    FrameDesc::new(
        out_kind,
        input.rows,
        input.cols,
        op.out_channels(input.channels),
    )
}

fn order_array(order: &[usize]) -> [i32; 4] {
    let mut arr = [0i32, 1, 2, 3];
    for (slot, &idx) in arr.iter_mut().zip(order.iter()) {
        *slot = idx as i32;
    }
    arr
}

/// Execute the selected conversion from `src` into the output buffer at
/// `out_ptr`.
///
/// `Passthrough` without a channel reorder never reaches this function —
/// the orchestrator aliases the input instead.  `Passthrough` *with* a
/// reorder degenerates to a bare permutation.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_convert(
    kernels: &ConvertKernels,
    stream: &CudaStream,
    channel_scratch: &mut ScratchBuffer,
    src: DeviceImage<'_>,
    out_desc: &FrameDesc,
    out_ptr: u64,
    params: &ConvertParams<'_>,
) -> Result<()> {
    let width = out_desc.cols as i32;
    let height = out_desc.rows as i32;
    let lo = params.scale_min;
    let hi = params.scale_max;

    // Bare permutation: the catalogue mapped the identity pair, the user
    // asked for a reorder.
    if params.op == ConvertOp::Passthrough {
        let order = params.channel_order.ok_or_else(|| {
            ConvertError::InternalConsistency(
                "passthrough without reorder reached the conversion stage".to_string(),
            )
        })?;
        return kernels.permute(
            stream,
            out_desc.format == FormatKind::Float32,
            src.ptr,
            out_ptr,
            width,
            height,
            out_desc.channels as i32,
            order_array(order),
        );
    }

    // With a reorder configured the conversion lands in scratch first.
    let convert_dst = match params.channel_order {
        Some(_) => {
            let bytes = out_desc.byte_size();
            channel_scratch.ensure_capacity(bytes)?;
            channel_scratch.device_ptr(bytes)?
        }
        None => out_ptr,
    };

    match params.op {
        ConvertOp::Passthrough => unreachable!("handled above"),
        ConvertOp::U8ToF32 => {
            let count = (src.desc.rows * src.desc.cols * src.desc.channels) as i32;
            kernels.u8_to_f32(stream, src.ptr, convert_dst, count, lo, hi)?;
        }
        ConvertOp::F32ToU8 => {
            let count = (src.desc.rows * src.desc.cols * src.desc.channels) as i32;
            kernels.f32_to_u8(stream, src.ptr, convert_dst, count, lo, hi)?;
        }
        ConvertOp::RgbToRgba => {
            kernels.rgb_to_rgba(stream, src.ptr, convert_dst, width, height, params.alpha_value)?;
        }
        ConvertOp::RgbaToRgb => {
            kernels.rgba_to_rgb(stream, src.ptr, convert_dst, width, height)?;
        }
        ConvertOp::RgbaToF32 => {
            kernels.rgba_to_f32_rgb(stream, src.ptr, convert_dst, width, height, lo, hi)?;
        }
        ConvertOp::RgbToYuv420 => {
            let planes = &out_desc.planes;
            kernels.rgb_to_yuv420(
                stream,
                src.ptr,
                convert_dst + planes[0].offset as u64,
                convert_dst + planes[1].offset as u64,
                convert_dst + planes[2].offset as u64,
                width,
                height,
                planes[0].stride as i32,
                planes[1].stride as i32,
            )?;
        }
        ConvertOp::Yuv420ToRgba | ConvertOp::Yuv420ToRgb => {
            let planes = &src.desc.planes;
            kernels.yuv420_to_rgbx(
                stream,
                src.ptr + planes[0].offset as u64,
                src.ptr + planes[1].offset as u64,
                src.ptr + planes[2].offset as u64,
                convert_dst,
                width,
                height,
                planes[0].stride as i32,
                planes[1].stride as i32,
                out_desc.channels as i32,
                params.alpha_value,
            )?;
        }
        ConvertOp::Nv12ToRgb => {
            let planes = &src.desc.planes;
            kernels.nv12_to_rgb(
                stream,
                src.ptr + planes[0].offset as u64,
                src.ptr + planes[1].offset as u64,
                convert_dst,
                width,
                height,
                planes[0].stride as i32,
                planes[1].stride as i32,
            )?;
        }
    }

    if let Some(order) = params.channel_order {
        kernels.permute(
            stream,
            out_desc.format == FormatKind::Float32,
            convert_dst,
            out_ptr,
            width,
            height,
            out_desc.channels as i32,
            order_array(order),
        )?;
    }

    Ok(())
}

// ─── Scalar reference semantics ─────────────────────────────────────────────

/// The per-pixel conversion semantics, as plain Rust.
///
/// These functions carry the exact formulas the CUDA kernels embed —
/// BT.601 full-range chroma matrix, `[0,255] ↔ [scale_min, scale_max]`
/// rescale with clipping, round-half-up quantization.  Tests validate the
/// formulas closed-form here, and the GPU comparison tests validate that
/// the kernels agree with them.
pub mod reference {
    /// Round-half-up quantization with clipping, matching the kernels'
    /// `to_u8`.
    #[inline]
    pub fn quantize(v: f32) -> u8 {
        (v + 0.5).max(0.0).min(255.0) as u8
    }

    /// u8 → f32: `[0,255]` mapped linearly onto `[lo, hi]`.
    #[inline]
    pub fn u8_to_f32(v: u8, lo: f32, hi: f32) -> f32 {
        lo + (v as f32 / 255.0) * (hi - lo)
    }

    /// f32 → u8: inverse-mapped from `[lo, hi]`, clipped to `[0,255]`.
    #[inline]
    pub fn f32_to_u8(v: f32, lo: f32, hi: f32) -> u8 {
        quantize((v - lo) / (hi - lo) * 255.0)
    }

    /// BT.601 full-range YCbCr → RGB.
    pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
        let yf = y as f32;
        let uf = u as f32 - 128.0;
        let vf = v as f32 - 128.0;
        [
            quantize(yf + 1.402 * vf),
            quantize(yf - 0.344_136 * uf - 0.714_136 * vf),
            quantize(yf + 1.772 * uf),
        ]
    }

    /// BT.601 full-range RGB → YCbCr component values (unquantized, with
    /// the +128 chroma bias applied).
    pub fn rgb_to_yuv_f(r: u8, g: u8, b: u8) -> [f32; 3] {
        let (rf, gf, bf) = (r as f32, g as f32, b as f32);
        [
            0.299 * rf + 0.587 * gf + 0.114 * bf,
            -0.168_736 * rf - 0.331_264 * gf + 0.5 * bf + 128.0,
            0.5 * rf - 0.418_688 * gf - 0.081_312 * bf + 128.0,
        ]
    }

    /// Packed RGB frame → planar YUV420 frame (2×2 box-averaged chroma),
    /// plane layout per `FormatKind::Yuv420`.
    pub fn rgb_frame_to_yuv420(rgb: &[u8], rows: usize, cols: usize) -> Vec<u8> {
        let cw = cols.div_ceil(2);
        let ch = rows.div_ceil(2);
        let mut out = vec![0u8; rows * cols + 2 * cw * ch];
        let (y_plane, chroma) = out.split_at_mut(rows * cols);
        let (u_plane, v_plane) = chroma.split_at_mut(cw * ch);

        for y in 0..rows {
            for x in 0..cols {
                let px = &rgb[(y * cols + x) * 3..][..3];
                y_plane[y * cols + x] = quantize(rgb_to_yuv_f(px[0], px[1], px[2])[0]);
            }
        }
        for by in 0..ch {
            for bx in 0..cw {
                let mut u_sum = 0.0f32;
                let mut v_sum = 0.0f32;
                let mut n = 0.0f32;
                for dy in 0..2 {
                    for dx in 0..2 {
                        let y = by * 2 + dy;
                        let x = bx * 2 + dx;
                        if y >= rows || x >= cols {
                            continue;
                        }
                        let px = &rgb[(y * cols + x) * 3..][..3];
                        let yuv = rgb_to_yuv_f(px[0], px[1], px[2]);
                        u_sum += yuv[1];
                        v_sum += yuv[2];
                        n += 1.0;
                    }
                }
                u_plane[by * cw + bx] = quantize(u_sum / n);
                v_plane[by * cw + bx] = quantize(v_sum / n);
            }
        }
        out
    }

    /// Planar YUV420 frame → packed RGB frame (nearest chroma up-sampling).
    pub fn yuv420_frame_to_rgb(yuv: &[u8], rows: usize, cols: usize) -> Vec<u8> {
        let cw = cols.div_ceil(2);
        let ch = rows.div_ceil(2);
        let y_plane = &yuv[..rows * cols];
        let u_plane = &yuv[rows * cols..rows * cols + cw * ch];
        let v_plane = &yuv[rows * cols + cw * ch..];

        let mut out = vec![0u8; rows * cols * 3];
        for y in 0..rows {
            for x in 0..cols {
                let ci = (y / 2) * cw + x / 2;
                let rgb = yuv_to_rgb(y_plane[y * cols + x], u_plane[ci], v_plane[ci]);
                out[(y * cols + x) * 3..][..3].copy_from_slice(&rgb);
            }
        }
        out
    }

    /// Semi-planar NV12 frame → packed RGB frame.
    pub fn nv12_frame_to_rgb(nv12: &[u8], rows: usize, cols: usize) -> Vec<u8> {
        let cw = cols.div_ceil(2);
        let y_plane = &nv12[..rows * cols];
        let uv_plane = &nv12[rows * cols..];

        let mut out = vec![0u8; rows * cols * 3];
        for y in 0..rows {
            for x in 0..cols {
                let ci = (y / 2) * (2 * cw) + (x / 2) * 2;
                let rgb = yuv_to_rgb(y_plane[y * cols + x], uv_plane[ci], uv_plane[ci + 1]);
                out[(y * cols + x) * 3..][..3].copy_from_slice(&rgb);
            }
        }
        out
    }

    /// RGB pixel → RGBA pixel with a uniform alpha fill.
    #[inline]
    pub fn rgb_to_rgba(px: [u8; 3], alpha: u8) -> [u8; 4] {
        [px[0], px[1], px[2], alpha]
    }

    /// Apply a channel permutation to one pixel: `out[c] = px[order[c]]`.
    pub fn permute<T: Copy>(px: &[T], order: &[usize]) -> Vec<T> {
        order.iter().map(|&i| px[i]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::reference::*;

    #[test]
    fn rescale_maps_domain_endpoints() {
        assert_eq!(u8_to_f32(0, 0.0, 1.0), 0.0);
        assert_eq!(u8_to_f32(255, 0.0, 1.0), 1.0);
        assert_eq!(u8_to_f32(0, -1.0, 1.0), -1.0);
        assert!((u8_to_f32(128, 0.0, 1.0) - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn inverse_rescale_clips_out_of_range() {
        // Clip, not wrap: values outside [lo, hi] saturate.
        assert_eq!(f32_to_u8(1.5, 0.0, 1.0), 255);
        assert_eq!(f32_to_u8(-0.5, 0.0, 1.0), 0);
        assert_eq!(f32_to_u8(0.0, 0.0, 1.0), 0);
        assert_eq!(f32_to_u8(1.0, 0.0, 1.0), 255);
    }

    #[test]
    fn rescale_round_trips_within_one_lsb() {
        for v in [0u8, 1, 17, 127, 128, 200, 254, 255] {
            let f = u8_to_f32(v, 0.0, 1.0);
            assert_eq!(f32_to_u8(f, 0.0, 1.0), v);
        }
    }

    #[test]
    fn chroma_matrix_fixed_points() {
        // Neutral gray has centered chroma.
        let yuv = rgb_to_yuv_f(128, 128, 128);
        assert!((yuv[0] - 128.0).abs() < 0.5);
        assert!((yuv[1] - 128.0).abs() < 0.5);
        assert!((yuv[2] - 128.0).abs() < 0.5);

        // Black and white map to the luma extremes.
        assert_eq!(quantize(rgb_to_yuv_f(0, 0, 0)[0]), 0);
        assert_eq!(quantize(rgb_to_yuv_f(255, 255, 255)[0]), 255);

        // And back: centered chroma reproduces the gray.
        assert_eq!(yuv_to_rgb(128, 128, 128), [128, 128, 128]);
    }

    #[test]
    fn alpha_fill_is_uniform_and_rgb_preserving() {
        // 2×2 all-black RGB, alpha_value 200 → alpha 200 everywhere, RGB 0.
        for _ in 0..4 {
            assert_eq!(rgb_to_rgba([0, 0, 0], 200), [0, 0, 0, 200]);
        }
    }

    #[test]
    fn channel_order_2_1_0_swaps_endpoints() {
        assert_eq!(permute(&[10u8, 20, 30], &[2, 1, 0]), vec![30, 20, 10]);
        assert_eq!(permute(&[1u8, 2, 3, 4], &[3, 2, 1, 0]), vec![4, 3, 2, 1]);
        // Identity leaves the pixel untouched.
        assert_eq!(permute(&[10u8, 20, 30], &[0, 1, 2]), vec![10, 20, 30]);
    }

    #[test]
    fn yuv420_round_trip_error_is_bounded() {
        // Smooth gradient: chroma sub-sampling may not cost more than
        // 6/255 per channel anywhere.
        let (rows, cols) = (16, 16);
        let mut rgb = vec![0u8; rows * cols * 3];
        for y in 0..rows {
            for x in 0..cols {
                let i = (y * cols + x) * 3;
                rgb[i] = (x * 4) as u8;
                rgb[i + 1] = (y * 4) as u8;
                rgb[i + 2] = ((x + y) * 2) as u8;
            }
        }

        let yuv = rgb_frame_to_yuv420(&rgb, rows, cols);
        let back = yuv420_frame_to_rgb(&yuv, rows, cols);

        let max_err = rgb
            .iter()
            .zip(back.iter())
            .map(|(&a, &b)| (a as i16 - b as i16).unsigned_abs())
            .max()
            .unwrap();
        assert!(max_err <= 6, "round-trip error {max_err} exceeds bound");
    }

    #[test]
    fn nv12_agrees_with_planar_yuv_on_shared_samples() {
        // Same luma/chroma values laid out semi-planar must decode to the
        // same RGB as the planar layout.
        let (rows, cols) = (4, 4);
        let cw = cols / 2;
        let ch = rows / 2;
        let y: Vec<u8> = (0..rows * cols).map(|i| (i * 16) as u8).collect();
        let u: Vec<u8> = (0..cw * ch).map(|i| 100 + (i * 10) as u8).collect();
        let v: Vec<u8> = (0..cw * ch).map(|i| 140 + (i * 10) as u8).collect();

        let mut planar = y.clone();
        planar.extend_from_slice(&u);
        planar.extend_from_slice(&v);

        let mut semi = y.clone();
        for i in 0..cw * ch {
            semi.push(u[i]);
            semi.push(v[i]);
        }

        assert_eq!(
            yuv420_frame_to_rgb(&planar, rows, cols),
            nv12_frame_to_rgb(&semi, rows, cols)
        );
    }
}
