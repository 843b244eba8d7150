//! Frame orchestrator: the per-frame entry point of the conversion stage.
//!
//! # Lifecycle
//!
//! The operator replaces virtual lifecycle hooks with an explicit
//! four-phase contract driven by the external scheduler:
//!
//! 1. [`FormatConverter::new`] — configure: resolve formats and the
//!    conversion operation through the catalogue; every configuration
//!    error surfaces here and aborts startup.
//! 2. [`FormatConverter::start`] — acquire one execution stream from the
//!    stream pool, NVRTC-compile the kernel module, create the scratch
//!    arenas.
//! 3. [`FormatConverter::process`] — one frame per tick.
//! 4. [`FormatConverter::stop`] — drain the stream and release runtime
//!    resources; idempotent.
//!
//! # Per-frame state machine
//!
//! `Idle → (HostStaged) → Resized → Converted → Emitted`, advanced in
//! fixed order on a single stream.  Intra-frame ordering comes from stream
//! order alone; the host blocks only for the synchronous host→device
//! staging copy and for the scratch-reuse barrier at the top of each frame
//! (a new frame must not overwrite scratch a previous frame's in-flight
//! work may still read).

use std::sync::Arc;
use std::time::Instant;

use cudarc::driver::CudaStream;
use tracing::{debug, info, warn};

use framecast_core::context::{DeviceBuffer, GpuContext};
use framecast_core::error::{ConvertError, Result};
use framecast_core::types::{
    DeviceImage, FormatKind, FrameBuffer, FrameMemory, FrameMessage, ResizeMode, TensorMessage,
};
use framecast_cuda::{ConvertKernels, ScratchBuffer, StageMetrics};

use crate::catalogue::{parse_format, ConvertOp};
use crate::config::ConverterConfig;
use crate::convert::{output_desc, run_convert, ConvertParams};
use crate::resize::{plan_resize, run_resize};

/// Progress of the current frame through the fixed stage order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    HostStaged,
    Resized,
    Converted,
    Emitted,
}

/// Host-side latency accumulators, one per stage.
#[derive(Debug, Default)]
pub struct ConverterMetrics {
    pub staging: StageMetrics,
    pub resize: StageMetrics,
    pub convert: StageMetrics,
}

/// Resources that exist only between `start` and `stop`.
#[derive(Debug)]
struct Runtime {
    ctx: Arc<GpuContext>,
    stream: CudaStream,
    kernels: ConvertKernels,
    resize_scratch: ScratchBuffer,
    channel_scratch: ScratchBuffer,
    staging_scratch: ScratchBuffer,
    /// Input buffer of the frame most recently processed, parked until the
    /// next scratch-reuse barrier so in-flight kernels never read freed
    /// memory.
    in_flight: Option<DeviceBuffer>,
}

/// The conversion-stage operator.
#[derive(Debug)]
pub struct FormatConverter {
    config: ConverterConfig,
    in_kind: FormatKind,
    out_kind: FormatKind,
    op: ConvertOp,
    resize_mode: ResizeMode,
    /// `None` = identity (including an explicitly-configured identity).
    channel_order: Option<Vec<usize>>,
    runtime: Option<Runtime>,
    state: FrameState,
    frames: u64,
    pub metrics: ConverterMetrics,
}

impl FormatConverter {
    /// Configure the operator.  All catalogue lookups happen here, once;
    /// an unmapped format pair or a bad channel order never becomes a
    /// per-frame error.
    pub fn new(config: ConverterConfig) -> Result<Self> {
        let in_kind = parse_format(&config.in_format)?;
        let out_kind = parse_format(&config.out_format)?;
        let op = ConvertOp::select(in_kind, out_kind)?;

        let resize_mode = match ResizeMode::from_raw(config.resize_mode) {
            Some(mode) => mode,
            None => {
                if config.resize_mode != 0 {
                    // Documented fallback: a typo in the configuration is
                    // not reported as an error.
                    warn!(
                        raw = config.resize_mode,
                        "unrecognized resize_mode, falling back to cubic"
                    );
                }
                ResizeMode::Cubic
            }
        };

        let channel_order = resolve_channel_order(&config.channel_order, op, in_kind, out_kind)?;

        Ok(Self {
            config,
            in_kind,
            out_kind,
            op,
            resize_mode,
            channel_order,
            runtime: None,
            state: FrameState::Idle,
            frames: 0,
            metrics: ConverterMetrics::default(),
        })
    }

    /// Convenience: configure straight from a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Self::new(ConverterConfig::from_toml_str(text)?)
    }

    /// Acquire runtime resources: one stream from the pool, the compiled
    /// kernel module, and the three scratch arenas.
    pub fn start(&mut self, ctx: Arc<GpuContext>) -> Result<()> {
        if self.runtime.is_some() {
            return Err(ConvertError::InternalConsistency(
                "start called on a running converter".to_string(),
            ));
        }

        let stream = ctx.acquire_stream()?;
        let kernels = ConvertKernels::compile(ctx.device())?;
        let device = ctx.device().clone();

        self.runtime = Some(Runtime {
            stream,
            kernels,
            resize_scratch: ScratchBuffer::new(device.clone(), "resize"),
            channel_scratch: ScratchBuffer::new(device.clone(), "channel"),
            staging_scratch: ScratchBuffer::new(device, "staging"),
            ctx,
            in_flight: None,
        });

        info!(
            in_format = self.in_kind.name(),
            out_format = self.out_kind.name(),
            op = ?self.op,
            "format converter started"
        );
        Ok(())
    }

    /// Process one frame.
    ///
    /// Frame-scoped failures ([`ConvertError::is_frame_scoped`]) leave the
    /// operator fully usable for the next tick; scratch contents are
    /// undefined after an abandoned frame but are always overwritten before
    /// being read again.
    pub fn process(&mut self, msg: FrameMessage) -> Result<TensorMessage> {
        let rt = self.runtime.as_mut().ok_or_else(|| {
            ConvertError::InternalConsistency("process called before start".to_string())
        })?;

        self.state = FrameState::Idle;

        // Scratch-reuse barrier: everything the previous frame issued has
        // drained, so scratch may be rewritten and its parked input freed.
        rt.ctx.synchronize()?;
        rt.in_flight = None;

        let input = take_input(msg, self.in_kind, &self.config.in_tensor_name)?;
        if input.memory_len() < input.desc.byte_size() {
            return Err(ConvertError::MissingInput(
                "input buffer is smaller than its descriptor claims",
            ));
        }

        let FrameBuffer {
            desc: in_desc,
            memory,
        } = input;

        // ── Host→device staging (synchronous) ───────────────────────────
        let (src_ptr, mut device_in) = match memory {
            FrameMemory::Host(data) => {
                let t0 = Instant::now();
                let ptr = rt.staging_scratch.stage_from_host(&data)?;
                self.metrics.staging.record(t0.elapsed().as_secs_f64() * 1e3);
                self.state = FrameState::HostStaged;
                (ptr, None)
            }
            FrameMemory::Device(buf) => {
                let ptr = buf.device_ptr();
                (ptr, Some(buf))
            }
        };

        let passthrough_clean = self.op == ConvertOp::Passthrough && self.channel_order.is_none();

        // ── Resize (possibly a no-op) ───────────────────────────────────
        let resize_plan = plan_resize(&in_desc, self.config.resize_width, self.config.resize_height);

        // For a clean passthrough the resample lands directly in the output
        // tensor; otherwise it lands in the resize scratch for the
        // conversion stage to consume.
        let mut passthrough_out: Option<DeviceBuffer> = None;
        let (work_ptr, work_desc) = match resize_plan {
            Some(resized_desc) => {
                let t0 = Instant::now();
                let bytes = resized_desc.byte_size();
                let dst_base = if passthrough_clean {
                    let out = rt.ctx.alloc(bytes)?;
                    let ptr = out.device_ptr();
                    passthrough_out = Some(out);
                    ptr
                } else {
                    rt.resize_scratch.ensure_capacity(bytes)?;
                    rt.resize_scratch.device_ptr(bytes)?
                };
                run_resize(
                    &rt.kernels,
                    &rt.stream,
                    DeviceImage {
                        ptr: src_ptr,
                        desc: &in_desc,
                    },
                    dst_base,
                    &resized_desc,
                    self.resize_mode,
                )?;
                self.metrics.resize.record(t0.elapsed().as_secs_f64() * 1e3);
                (dst_base, resized_desc)
            }
            None => (src_ptr, in_desc),
        };
        self.state = FrameState::Resized;

        // ── Convert ─────────────────────────────────────────────────────
        let t0 = Instant::now();
        let out_desc = output_desc(self.op, &work_desc, self.out_kind);
        if let Some(order) = &self.channel_order {
            if order.len() != out_desc.channels {
                return Err(ConvertError::InternalConsistency(format!(
                    "channel order {:?} does not match the {}-channel output of this frame",
                    order, out_desc.channels
                )));
            }
        }

        let out_buf = if passthrough_clean {
            match (passthrough_out, device_in.take()) {
                // Resized: the output tensor was already the resample target.
                (Some(out), parked) => {
                    device_in = parked;
                    out
                }
                // Device input, nothing to do: alias the input buffer.
                (None, Some(buf)) => buf,
                // Host input, nothing to do: one device copy out of the
                // staging scratch.  The staging copy was synchronous and no
                // kernel has been issued this frame, so there is no
                // in-flight work to order against.
                (None, None) => {
                    let bytes = out_desc.byte_size();
                    let mut out = rt.ctx.alloc(bytes)?;
                    let src_view = rt.staging_scratch.view(bytes)?;
                    let mut dst_view = out.view_mut(bytes)?;
                    rt.ctx.device().dtod_copy(&src_view, &mut dst_view)?;
                    drop(dst_view);
                    out
                }
            }
        } else {
            let out = rt.ctx.alloc(out_desc.byte_size())?;
            run_convert(
                &rt.kernels,
                &rt.stream,
                &mut rt.channel_scratch,
                DeviceImage {
                    ptr: work_ptr,
                    desc: &work_desc,
                },
                &out_desc,
                out.device_ptr(),
                &ConvertParams {
                    op: self.op,
                    scale_min: self.config.scale_min,
                    scale_max: self.config.scale_max,
                    alpha_value: self.config.alpha_value,
                    channel_order: self.channel_order.as_deref(),
                },
            )?;
            out
        };
        self.metrics.convert.record(t0.elapsed().as_secs_f64() * 1e3);
        self.state = FrameState::Converted;

        // Park the consumed input until the next barrier; kernels issued
        // this frame may still be reading it.
        rt.in_flight = device_in;

        // ── Emit ────────────────────────────────────────────────────────
        self.frames += 1;
        self.state = FrameState::Emitted;
        debug!(frame = self.frames, rows = out_desc.rows, cols = out_desc.cols, "frame emitted");

        Ok(TensorMessage {
            name: self.config.out_tensor_name.clone(),
            tensor: FrameBuffer::from_device(out_desc, out_buf),
        })
    }

    /// Release runtime resources.  Idempotent; safe to call on a converter
    /// that never started.
    pub fn stop(&mut self) {
        if let Some(rt) = self.runtime.take() {
            if let Err(e) = rt.ctx.synchronize() {
                warn!(error = %e, "device drain failed during stop");
            }
            info!(frames = self.frames, "format converter stopped");
        }
    }

    /// The operation the catalogue selected at configuration time.
    pub fn op(&self) -> ConvertOp {
        self.op
    }

    /// Resolved interpolation policy (after the documented cubic fallback).
    pub fn resize_mode(&self) -> ResizeMode {
        self.resize_mode
    }

    /// Progress of the most recent frame.
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Frames emitted since start.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Whether `start` has been called (and `stop` has not).
    pub fn is_started(&self) -> bool {
        self.runtime.is_some()
    }

    /// Capacities of the (resize, channel, staging) scratch arenas.
    /// `None` before start.  Capacities never shrink while running.
    pub fn scratch_capacities(&self) -> Option<(usize, usize, usize)> {
        self.runtime.as_ref().map(|rt| {
            (
                rt.resize_scratch.capacity(),
                rt.channel_scratch.capacity(),
                rt.staging_scratch.capacity(),
            )
        })
    }
}

impl Drop for FormatConverter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Validate and normalize the configured permutation.
///
/// Empty and explicit-identity orders become `None`; anything else must
/// address every channel of the (nominal) output exactly once each index
/// being in range.  Planar destinations cannot be permuted.
fn resolve_channel_order(
    order: &[usize],
    op: ConvertOp,
    in_kind: FormatKind,
    out_kind: FormatKind,
) -> Result<Option<Vec<usize>>> {
    if order.is_empty() {
        return Ok(None);
    }

    let expected = op.out_channels(in_kind.channels());
    let invalid = order.len() != expected
        || order.iter().any(|&i| i >= expected)
        || out_kind.is_planar();
    if invalid {
        return Err(ConvertError::InvalidChannelOrder {
            expected,
            got: order.to_vec(),
        });
    }

    if order.iter().enumerate().all(|(i, &o)| i == o) {
        return Ok(None);
    }
    Ok(Some(order.to_vec()))
}

/// Pick the frame to convert out of the incoming message.
///
/// A video buffer is recognized when it is tagged with the configured input
/// format and that format is video-ingestible; otherwise the tensors are
/// searched by the configured name (empty name matches the first tensor
/// carrying the input format).  Neither present → `MissingInput`, and the
/// operator stays usable for the next tick.
fn take_input(
    msg: FrameMessage,
    in_kind: FormatKind,
    tensor_name: &str,
) -> Result<FrameBuffer> {
    if let Some(video) = msg.video {
        if video.desc.format == in_kind && in_kind.ingestible_as_video() {
            return Ok(video);
        }
        debug!(
            format = video.desc.format.name(),
            "video buffer not recognized for this configuration, searching tensors"
        );
    }

    for (name, tensor) in msg.tensors {
        if (tensor_name.is_empty() || name == tensor_name) && tensor.desc.format == in_kind {
            return Ok(tensor);
        }
    }

    Err(ConvertError::MissingInput(
        "message carries neither a recognized video buffer nor the configured input tensor",
    ))
}
