//! End-to-end operator tests over synthetic frames, compared against the
//! scalar reference semantics.  These need a CUDA device and driver, so
//! they are ignored by default:
//!
//! ```bash
//! cargo test -p framecast-pipeline -- --ignored
//! ```

use std::sync::Arc;

use framecast_pipeline::context::GpuContext;
use framecast_pipeline::convert::reference;
use framecast_pipeline::error::ConvertError;
use framecast_pipeline::types::{
    FormatKind, FrameBuffer, FrameDesc, FrameMemory, FrameMessage,
};
use framecast_pipeline::{ConverterConfig, FormatConverter};

fn started(cfg: ConverterConfig) -> (Arc<GpuContext>, FormatConverter) {
    let ctx = GpuContext::new(0).expect("CUDA device 0");
    let mut converter = FormatConverter::new(cfg).unwrap();
    converter.start(ctx.clone()).unwrap();
    (ctx, converter)
}

fn device_frame(ctx: &GpuContext, kind: FormatKind, rows: usize, cols: usize, data: &[u8]) -> FrameBuffer {
    let desc = FrameDesc::new(kind, rows, cols, kind.channels());
    assert_eq!(data.len(), desc.byte_size());
    let mut buf = ctx.alloc(desc.byte_size()).unwrap();
    let mut view = buf.view_mut(data.len()).unwrap();
    ctx.device().htod_sync_copy_into(data, &mut view).unwrap();
    drop(view);
    FrameBuffer::from_device(desc, buf)
}

fn read_back(ctx: &GpuContext, tensor: &FrameBuffer) -> Vec<u8> {
    ctx.synchronize().unwrap();
    match &tensor.memory {
        FrameMemory::Device(buf) => {
            let view = buf.view(tensor.desc.byte_size()).unwrap();
            ctx.device().dtoh_sync_copy(&view).unwrap()
        }
        FrameMemory::Host(data) => data.clone(),
    }
}

fn gradient_rgb(rows: usize, cols: usize) -> Vec<u8> {
    let mut data = vec![0u8; rows * cols * 3];
    for y in 0..rows {
        for x in 0..cols {
            let i = (y * cols + x) * 3;
            data[i] = (x * 7 % 256) as u8;
            data[i + 1] = (y * 11 % 256) as u8;
            data[i + 2] = ((x + y) * 5 % 256) as u8;
        }
    }
    data
}

#[test]
#[ignore] // Requires CUDA
fn identity_conversion_is_byte_equal() {
    // Resize to the input's own dimensions is part of the no-op contract.
    let mut cfg = ConverterConfig::for_formats("rgb888", "rgb888");
    cfg.resize_width = 16;
    cfg.resize_height = 16;
    let (ctx, mut converter) = started(cfg);

    let data = gradient_rgb(16, 16);
    let msg = FrameMessage::from_video(device_frame(&ctx, FormatKind::Rgb888, 16, 16, &data));
    let out = converter.process(msg).unwrap();

    assert_eq!(out.tensor.desc.format, FormatKind::Rgb888);
    assert_eq!(read_back(&ctx, &out.tensor), data);
}

#[test]
#[ignore] // Requires CUDA
fn rgb_to_rgba_fills_alpha_uniformly() {
    let mut cfg = ConverterConfig::for_formats("rgb888", "rgba8888");
    cfg.alpha_value = 200;
    let (ctx, mut converter) = started(cfg);

    // 2×2 all-black RGB → RGBA with alpha 200 everywhere, RGB untouched.
    let msg = FrameMessage::from_video(device_frame(
        &ctx,
        FormatKind::Rgb888,
        2,
        2,
        &[0u8; 2 * 2 * 3],
    ));
    let out = converter.process(msg).unwrap();
    let bytes = read_back(&ctx, &out.tensor);

    assert_eq!(bytes.len(), 2 * 2 * 4);
    for px in bytes.chunks_exact(4) {
        assert_eq!(px, &[0, 0, 0, 200]);
    }
}

#[test]
#[ignore] // Requires CUDA
fn channel_order_permutes_after_conversion() {
    let mut cfg = ConverterConfig::for_formats("rgb888", "rgb888");
    cfg.channel_order = vec![2, 1, 0];
    let (ctx, mut converter) = started(cfg);

    let data: Vec<u8> = [10u8, 20, 30].repeat(4 * 4);
    let msg = FrameMessage::from_video(device_frame(&ctx, FormatKind::Rgb888, 4, 4, &data));
    let out = converter.process(msg).unwrap();

    for px in read_back(&ctx, &out.tensor).chunks_exact(3) {
        assert_eq!(px, &[30, 20, 10]);
    }
}

#[test]
#[ignore] // Requires CUDA
fn nv12_to_rgb_matches_the_reference_semantics() {
    let (ctx, mut converter) = started(ConverterConfig::for_formats("nv12", "rgb888"));

    let (rows, cols) = (8, 8);
    let mut nv12 = Vec::with_capacity(rows * cols * 3 / 2);
    for i in 0..rows * cols {
        nv12.push((i * 3 % 256) as u8);
    }
    for i in 0..(rows / 2) * (cols / 2) {
        nv12.push(90 + (i * 5 % 80) as u8); // U
        nv12.push(120 + (i * 7 % 80) as u8); // V
    }

    let msg = FrameMessage::from_video(device_frame(&ctx, FormatKind::Nv12, rows, cols, &nv12));
    let out = converter.process(msg).unwrap();
    let got = read_back(&ctx, &out.tensor);
    let want = reference::nv12_frame_to_rgb(&nv12, rows, cols);

    // Fast-math rounding on the device may differ by one quantization step.
    for (i, (&g, &w)) in got.iter().zip(want.iter()).enumerate() {
        assert!(
            (g as i16 - w as i16).abs() <= 1,
            "byte {i}: device {g} vs reference {w}"
        );
    }
}

#[test]
#[ignore] // Requires CUDA
fn u8_to_f32_rescale_matches_the_reference_semantics() {
    let mut cfg = ConverterConfig::for_formats("rgb888", "float32");
    cfg.scale_min = -1.0;
    cfg.scale_max = 1.0;
    let (ctx, mut converter) = started(cfg);

    let data = gradient_rgb(4, 4);
    let msg = FrameMessage::from_video(device_frame(&ctx, FormatKind::Rgb888, 4, 4, &data));
    let out = converter.process(msg).unwrap();

    assert_eq!(out.tensor.desc.format, FormatKind::Float32);
    assert_eq!(out.tensor.desc.channels, 3);

    let bytes = read_back(&ctx, &out.tensor);
    let floats: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    for (i, (&v, &f)) in data.iter().zip(floats.iter()).enumerate() {
        let want = reference::u8_to_f32(v, -1.0, 1.0);
        assert!((f - want).abs() < 1e-4, "element {i}: device {f} vs reference {want}");
    }
}

#[test]
#[ignore] // Requires CUDA
fn linear_resize_preserves_constant_frames() {
    let mut cfg = ConverterConfig::for_formats("rgb888", "rgb888");
    cfg.resize_width = 64;
    cfg.resize_height = 48;
    cfg.resize_mode = 2; // linear
    let (ctx, mut converter) = started(cfg);

    let msg = FrameMessage::from_video(device_frame(
        &ctx,
        FormatKind::Rgb888,
        16,
        16,
        &[100u8; 16 * 16 * 3],
    ));
    let out = converter.process(msg).unwrap();

    assert_eq!(out.tensor.desc.rows, 48);
    assert_eq!(out.tensor.desc.cols, 64);
    for (i, &b) in read_back(&ctx, &out.tensor).iter().enumerate() {
        assert!((b as i16 - 100).abs() <= 1, "byte {i} drifted to {b}");
    }
}

#[test]
#[ignore] // Requires CUDA
fn host_video_buffers_are_staged_and_converted() {
    let mut cfg = ConverterConfig::for_formats("rgb888", "rgba8888");
    cfg.alpha_value = 255;
    let (ctx, mut converter) = started(cfg);

    let data = gradient_rgb(8, 8);
    let desc = FrameDesc::new(FormatKind::Rgb888, 8, 8, 3);
    let msg = FrameMessage::from_video(FrameBuffer::from_host(desc, data.clone()));
    let out = converter.process(msg).unwrap();

    let bytes = read_back(&ctx, &out.tensor);
    for (src, dst) in data.chunks_exact(3).zip(bytes.chunks_exact(4)) {
        assert_eq!(&dst[..3], src);
        assert_eq!(dst[3], 255);
    }
}

#[test]
#[ignore] // Requires CUDA
fn scratch_capacity_is_monotone_across_growing_frames() {
    // Conversion + reorder: the convert result lands in the channel
    // scratch before the final permutation, so both arenas are exercised.
    let mut cfg = ConverterConfig::for_formats("rgb888", "rgba8888");
    cfg.channel_order = vec![2, 1, 0, 3];
    let (_ctx, mut converter) = started(cfg);

    let mut last_staging = 0;
    let mut last_channel = 0;
    for (rows, cols) in [(16, 16), (64, 64), (32, 32), (128, 128)] {
        let desc = FrameDesc::new(FormatKind::Rgb888, rows, cols, 3);
        let bytes = desc.byte_size();
        let msg = FrameMessage::from_video(FrameBuffer::from_host(desc, vec![0u8; bytes]));
        converter.process(msg).unwrap();

        let (_, channel, staging) = converter.scratch_capacities().unwrap();
        assert!(staging >= last_staging, "staging scratch shrank");
        assert!(channel >= last_channel, "channel scratch shrank");
        assert!(staging >= bytes, "staging scratch below the frame just staged");
        last_staging = staging;
        last_channel = channel;
    }
}

#[test]
#[ignore] // Requires CUDA
fn missing_input_leaves_the_operator_usable() {
    let (ctx, mut converter) = started(ConverterConfig::for_formats("rgb888", "rgb888"));

    let err = converter.process(FrameMessage::default()).unwrap_err();
    assert!(matches!(err, ConvertError::MissingInput(_)));
    assert!(err.is_frame_scoped());

    let data = gradient_rgb(4, 4);
    let msg = FrameMessage::from_video(device_frame(&ctx, FormatKind::Rgb888, 4, 4, &data));
    let out = converter.process(msg).unwrap();
    assert_eq!(read_back(&ctx, &out.tensor), data);
}

#[test]
#[ignore] // Requires CUDA
fn rgb_yuv420_round_trip_stays_within_the_documented_bound() {
    let (ctx, mut converter) = started(ConverterConfig::for_formats("rgb888", "yuv420"));
    let mut back_converter = FormatConverter::new(ConverterConfig::for_formats("yuv420", "rgb888")).unwrap();
    back_converter.start(ctx.clone()).unwrap();

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

    let msg = FrameMessage::from_video(device_frame(&ctx, FormatKind::Rgb888, rows, cols, &rgb));
    let yuv = converter.process(msg).unwrap();

    let back_msg = FrameMessage::from_tensor("", yuv.tensor);
    let out = back_converter.process(back_msg).unwrap();
    let bytes = read_back(&ctx, &out.tensor);

    let max_err = rgb
        .iter()
        .zip(bytes.iter())
        .map(|(&a, &b)| (a as i16 - b as i16).unsigned_abs())
        .max()
        .unwrap();
    assert!(max_err <= 6, "round-trip error {max_err} exceeds the documented bound");
}
