//! CUDA conversion kernels — resampling, dtype rescale, channel-count and
//! chroma conversions, channel permutation.
//!
//! All transforms execute on-device via NVRTC-compiled kernels.
//! No CPU-side pixel manipulation.
//!
//! # Kernel compilation
//!
//! CUDA C source is compiled to PTX **once** at operator start via NVRTC.
//! The PTX is loaded into the `CudaDevice` as a named module and function
//! handles are resolved once, then reused for every frame.
//!
//! # Color space
//!
//! YUV420/NV12 ↔ RGB use **BT.601 full-range** coefficients (the JPEG
//! YCbCr convention).  Changing color matrices requires editing the kernel
//! source — the matrix is not a runtime parameter.
//!
//! # Numeric policy
//!
//! - u8 → f32 maps `[0,255]` linearly onto `[scale_min, scale_max]`.
//! - f32 → u8 inverse-maps and **clips** to `[0,255]`; never wraps.
//! - Chroma is up-sampled nearest (one sample per 2×2 luma block) in the
//!   →RGB direction and down-sampled by 2×2 box average in the →YUV
//!   direction.

use std::sync::Arc;

use cudarc::driver::{CudaDevice, CudaFunction, CudaStream, LaunchAsync, LaunchConfig};
use tracing::info;

use framecast_core::error::{ConvertError, Result};

// ─── CUDA C kernel source ────────────────────────────────────────────────────

/// CUDA C source for the whole conversion module.
///
/// Compiled to PTX once via NVRTC at operator start.
const CONVERT_CUDA_SRC: &str = r#"
// ============================================================================
// Shared helpers
// ============================================================================

__device__ __forceinline__ int clampi(int v, int lo, int hi)
{
    return v < lo ? lo : (v > hi ? hi : v);
}

__device__ __forceinline__ unsigned char to_u8(float v)
{
    return (unsigned char)fminf(fmaxf(v + 0.5f, 0.0f), 255.0f);
}

// BT.601 full-range YCbCr -> RGB.
__device__ __forceinline__ void yuv_to_rgb_f(
    float Y, float U, float V, float* r, float* g, float* b)
{
    float u = U - 128.0f;
    float v = V - 128.0f;
    *r = Y + 1.402f * v;
    *g = Y - 0.344136f * u - 0.714136f * v;
    *b = Y + 1.772f * u;
}

// BT.601 full-range RGB -> YCbCr (bias applied by callers for U/V).
__device__ __forceinline__ float rgb_to_y_f(float r, float g, float b)
{
    return 0.299f * r + 0.587f * g + 0.114f * b;
}

__device__ __forceinline__ float rgb_to_u_f(float r, float g, float b)
{
    return -0.168736f * r - 0.331264f * g + 0.5f * b + 128.0f;
}

__device__ __forceinline__ float rgb_to_v_f(float r, float g, float b)
{
    return 0.5f * r - 0.418688f * g - 0.081312f * b + 128.0f;
}

// Two-parameter (Mitchell-Netravali) cubic weight.
__device__ __forceinline__ float cubic_weight(float x, float B, float C)
{
    float ax = fabsf(x);
    if (ax < 1.0f) {
        return ((12.0f - 9.0f * B - 6.0f * C) * ax * ax * ax
              + (-18.0f + 12.0f * B + 6.0f * C) * ax * ax
              + (6.0f - 2.0f * B)) / 6.0f;
    }
    if (ax < 2.0f) {
        return ((-B - 6.0f * C) * ax * ax * ax
              + (6.0f * B + 30.0f * C) * ax * ax
              + (-12.0f * B - 48.0f * C) * ax
              + (8.0f * B + 24.0f * C)) / 6.0f;
    }
    return 0.0f;
}

// Lanczos windowed sinc, order a.
__device__ __forceinline__ float lanczos_weight(float x, int a)
{
    float ax = fabsf(x);
    if (ax < 1e-6f) return 1.0f;
    if (ax >= (float)a) return 0.0f;
    float pix = 3.14159265358979f * x;
    return (float)a * sinf(pix) * sinf(pix / (float)a) / (pix * pix);
}

// ============================================================================
// Per-plane resampling
//
// One thread per destination sample.  `channels` interleaved components per
// sample, strides in elements.  Mode values follow the NPP interpolation
// numbering: 1 nearest, 2 linear, 5/6/7 two-parameter cubic variants,
// 8 super-sampling box, 16/17 Lanczos-2/3; everything else resolves to the
// cubic default (mode 4).
// ============================================================================

#define RESIZE_PLANE_BODY(LOAD, STORE)                                   \
    int ox = blockIdx.x * blockDim.x + threadIdx.x;                             \
    int oy = blockIdx.y * blockDim.y + threadIdx.y;                             \
    if (ox >= out_w || oy >= out_h) return;                                     \
    float sx = (float)in_w / (float)out_w;                                      \
    float sy = (float)in_h / (float)out_h;                                      \
    float fx = ((float)ox + 0.5f) * sx - 0.5f;                                  \
    float fy = ((float)oy + 0.5f) * sy - 0.5f;                                  \
    for (int c = 0; c < channels; ++c) {                                        \
        float acc = 0.0f;                                                       \
        if (mode == 1) {                                                        \
            int ix = clampi((int)(((float)ox + 0.5f) * sx), 0, in_w - 1);       \
            int iy = clampi((int)(((float)oy + 0.5f) * sy), 0, in_h - 1);       \
            acc = LOAD(iy, ix, c);                                              \
        } else if (mode == 2) {                                                 \
            int x0 = (int)floorf(fx);                                           \
            int y0 = (int)floorf(fy);                                           \
            float tx = fx - (float)x0;                                          \
            float ty = fy - (float)y0;                                          \
            int x1 = clampi(x0 + 1, 0, in_w - 1);                               \
            int y1 = clampi(y0 + 1, 0, in_h - 1);                               \
            x0 = clampi(x0, 0, in_w - 1);                                       \
            y0 = clampi(y0, 0, in_h - 1);                                       \
            float a = LOAD(y0, x0, c) * (1.0f - tx) + LOAD(y0, x1, c) * tx;     \
            float b = LOAD(y1, x0, c) * (1.0f - tx) + LOAD(y1, x1, c) * tx;     \
            acc = a * (1.0f - ty) + b * ty;                                     \
        } else if (mode == 8) {                                                 \
            int x0 = clampi((int)floorf((float)ox * sx), 0, in_w - 1);          \
            int y0 = clampi((int)floorf((float)oy * sy), 0, in_h - 1);          \
            int x1 = clampi((int)ceilf((float)(ox + 1) * sx) - 1, x0, in_w - 1);\
            int y1 = clampi((int)ceilf((float)(oy + 1) * sy) - 1, y0, in_h - 1);\
            float sum = 0.0f;                                                   \
            int n = 0;                                                          \
            for (int iy = y0; iy <= y1; ++iy)                                   \
                for (int ix = x0; ix <= x1; ++ix) {                             \
                    sum += LOAD(iy, ix, c);                                     \
                    ++n;                                                        \
                }                                                               \
            acc = sum / (float)n;                                               \
        } else if (mode == 16 || mode == 17) {                                  \
            int a = (mode == 16) ? 2 : 3;                                       \
            int x0 = (int)floorf(fx) - a + 1;                                   \
            int y0 = (int)floorf(fy) - a + 1;                                   \
            float sum = 0.0f;                                                   \
            float wsum = 0.0f;                                                  \
            for (int iy = y0; iy < y0 + 2 * a; ++iy)                            \
                for (int ix = x0; ix < x0 + 2 * a; ++ix) {                      \
                    float w = lanczos_weight(fx - (float)ix, a)                 \
                            * lanczos_weight(fy - (float)iy, a);                \
                    int cx = clampi(ix, 0, in_w - 1);                           \
                    int cy = clampi(iy, 0, in_h - 1);                           \
                    sum += w * LOAD(cy, cx, c);                                 \
                    wsum += w;                                                  \
                }                                                               \
            acc = sum / wsum;                                                   \
        } else {                                                                \
            float B = 0.0f, C = 0.5f;                                           \
            if (mode == 5) { B = 1.0f; C = 0.0f; }                              \
            else if (mode == 7) { B = 0.5f; C = 0.3f; }                         \
            int x0 = (int)floorf(fx) - 1;                                       \
            int y0 = (int)floorf(fy) - 1;                                       \
            float sum = 0.0f;                                                   \
            float wsum = 0.0f;                                                  \
            for (int iy = y0; iy < y0 + 4; ++iy)                                \
                for (int ix = x0; ix < x0 + 4; ++ix) {                          \
                    float w = cubic_weight(fx - (float)ix, B, C)                \
                            * cubic_weight(fy - (float)iy, B, C);               \
                    int cx = clampi(ix, 0, in_w - 1);                           \
                    int cy = clampi(iy, 0, in_h - 1);                           \
                    sum += w * LOAD(cy, cx, c);                                 \
                    wsum += w;                                                  \
                }                                                               \
            acc = sum / wsum;                                                   \
        }                                                                       \
        STORE(oy, ox, c, acc);                                                  \
    }

#define LOAD_U8(y, x, c)  ((float)input[(y) * in_stride + (x) * channels + (c)])
#define STORE_U8(y, x, c, v) \
    output[(y) * out_stride + (x) * channels + (c)] = to_u8(v)

#define LOAD_F32(y, x, c) (input[(y) * in_stride + (x) * channels + (c)])
#define STORE_F32(y, x, c, v) \
    output[(y) * out_stride + (x) * channels + (c)] = (v)

extern "C" __global__ void resize_plane_u8(
    const unsigned char* __restrict__ input,
    unsigned char*       __restrict__ output,
    int in_w, int in_h, int in_stride,
    int out_w, int out_h, int out_stride,
    int channels, int mode)
{
    RESIZE_PLANE_BODY(LOAD_U8, STORE_U8)
}

extern "C" __global__ void resize_plane_f32(
    const float* __restrict__ input,
    float*       __restrict__ output,
    int in_w, int in_h, int in_stride,
    int out_w, int out_h, int out_stride,
    int channels, int mode)
{
    RESIZE_PLANE_BODY(LOAD_F32, STORE_F32)
}

// ============================================================================
// Element-wise dtype rescale (1D grid)
// ============================================================================

extern "C" __global__ void u8_to_f32(
    const unsigned char* __restrict__ input,
    float*               __restrict__ output,
    int count, float scale_min, float scale_max)
{
    int i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i >= count) return;
    output[i] = scale_min + ((float)input[i] / 255.0f) * (scale_max - scale_min);
}

extern "C" __global__ void f32_to_u8(
    const float*   __restrict__ input,
    unsigned char* __restrict__ output,
    int count, float scale_min, float scale_max)
{
    int i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i >= count) return;
    float t = (input[i] - scale_min) / (scale_max - scale_min) * 255.0f;
    output[i] = to_u8(t);
}

// ============================================================================
// Channel-count changes (packed uint8, 2D grid)
// ============================================================================

extern "C" __global__ void rgb_to_rgba(
    const unsigned char* __restrict__ input,
    unsigned char*       __restrict__ output,
    int width, int height, int alpha)
{
    int x = blockIdx.x * blockDim.x + threadIdx.x;
    int y = blockIdx.y * blockDim.y + threadIdx.y;
    if (x >= width || y >= height) return;

    int si = (y * width + x) * 3;
    int di = (y * width + x) * 4;
    output[di    ] = input[si    ];
    output[di + 1] = input[si + 1];
    output[di + 2] = input[si + 2];
    output[di + 3] = (unsigned char)alpha;
}

extern "C" __global__ void rgba_to_rgb(
    const unsigned char* __restrict__ input,
    unsigned char*       __restrict__ output,
    int width, int height)
{
    int x = blockIdx.x * blockDim.x + threadIdx.x;
    int y = blockIdx.y * blockDim.y + threadIdx.y;
    if (x >= width || y >= height) return;

    int si = (y * width + x) * 4;
    int di = (y * width + x) * 3;
    output[di    ] = input[si    ];
    output[di + 1] = input[si + 1];
    output[di + 2] = input[si + 2];
}

// Fused alpha-drop + rescale: packed RGBA u8 -> packed RGB f32.
extern "C" __global__ void rgba_to_f32_rgb(
    const unsigned char* __restrict__ input,
    float*               __restrict__ output,
    int width, int height, float scale_min, float scale_max)
{
    int x = blockIdx.x * blockDim.x + threadIdx.x;
    int y = blockIdx.y * blockDim.y + threadIdx.y;
    if (x >= width || y >= height) return;

    int si = (y * width + x) * 4;
    int di = (y * width + x) * 3;
    float span = scale_max - scale_min;
    output[di    ] = scale_min + ((float)input[si    ] / 255.0f) * span;
    output[di + 1] = scale_min + ((float)input[si + 1] / 255.0f) * span;
    output[di + 2] = scale_min + ((float)input[si + 2] / 255.0f) * span;
}

// ============================================================================
// Chroma conversions (2D grid, one thread per luma pixel)
// ============================================================================

// Planar YUV420 -> packed RGB or RGBA (out_channels selects, alpha fills).
extern "C" __global__ void yuv420_to_rgbx(
    const unsigned char* __restrict__ y_plane,
    const unsigned char* __restrict__ u_plane,
    const unsigned char* __restrict__ v_plane,
    unsigned char*       __restrict__ output,
    int width, int height, int y_stride, int c_stride,
    int out_channels, int alpha)
{
    int x = blockIdx.x * blockDim.x + threadIdx.x;
    int y = blockIdx.y * blockDim.y + threadIdx.y;
    if (x >= width || y >= height) return;

    int ci = (y >> 1) * c_stride + (x >> 1);
    float r, g, b;
    yuv_to_rgb_f((float)y_plane[y * y_stride + x],
                 (float)u_plane[ci],
                 (float)v_plane[ci],
                 &r, &g, &b);

    int di = (y * width + x) * out_channels;
    output[di    ] = to_u8(r);
    output[di + 1] = to_u8(g);
    output[di + 2] = to_u8(b);
    if (out_channels == 4) output[di + 3] = (unsigned char)alpha;
}

// Semi-planar NV12 -> packed RGB.
extern "C" __global__ void nv12_to_rgb(
    const unsigned char* __restrict__ y_plane,
    const unsigned char* __restrict__ uv_plane,
    unsigned char*       __restrict__ output,
    int width, int height, int y_stride, int uv_stride)
{
    int x = blockIdx.x * blockDim.x + threadIdx.x;
    int y = blockIdx.y * blockDim.y + threadIdx.y;
    if (x >= width || y >= height) return;

    int ci = (y >> 1) * uv_stride + (x >> 1) * 2;
    float r, g, b;
    yuv_to_rgb_f((float)y_plane[y * y_stride + x],
                 (float)uv_plane[ci],
                 (float)uv_plane[ci + 1],
                 &r, &g, &b);

    int di = (y * width + x) * 3;
    output[di    ] = to_u8(r);
    output[di + 1] = to_u8(g);
    output[di + 2] = to_u8(b);
}

// Packed RGB -> planar YUV420.  Chroma is the 2x2 box average, written by
// the thread on the even (x, y) corner of each block.
extern "C" __global__ void rgb_to_yuv420(
    const unsigned char* __restrict__ input,
    unsigned char* __restrict__ y_plane,
    unsigned char* __restrict__ u_plane,
    unsigned char* __restrict__ v_plane,
    int width, int height, int y_stride, int c_stride)
{
    int x = blockIdx.x * blockDim.x + threadIdx.x;
    int y = blockIdx.y * blockDim.y + threadIdx.y;
    if (x >= width || y >= height) return;

    int si = (y * width + x) * 3;
    float r = (float)input[si];
    float g = (float)input[si + 1];
    float b = (float)input[si + 2];

    y_plane[y * y_stride + x] = to_u8(rgb_to_y_f(r, g, b));

    if ((x & 1) == 0 && (y & 1) == 0) {
        float u_sum = rgb_to_u_f(r, g, b);
        float v_sum = rgb_to_v_f(r, g, b);
        int n = 1;
        for (int dy = 0; dy <= 1; ++dy)
            for (int dx = 0; dx <= 1; ++dx) {
                if (dx == 0 && dy == 0) continue;
                int px = x + dx;
                int py = y + dy;
                if (px >= width || py >= height) continue;
                int pi = (py * width + px) * 3;
                float pr = (float)input[pi];
                float pg = (float)input[pi + 1];
                float pb = (float)input[pi + 2];
                u_sum += rgb_to_u_f(pr, pg, pb);
                v_sum += rgb_to_v_f(pr, pg, pb);
                ++n;
            }
        int ci = (y >> 1) * c_stride + (x >> 1);
        u_plane[ci] = to_u8(u_sum / (float)n);
        v_plane[ci] = to_u8(v_sum / (float)n);
    }
}

// ============================================================================
// Channel permutation (packed layouts, applied as the final step)
// ============================================================================

extern "C" __global__ void permute_u8(
    const unsigned char* __restrict__ input,
    unsigned char*       __restrict__ output,
    int width, int height, int channels,
    int o0, int o1, int o2, int o3)
{
    int x = blockIdx.x * blockDim.x + threadIdx.x;
    int y = blockIdx.y * blockDim.y + threadIdx.y;
    if (x >= width || y >= height) return;

    int order[4] = { o0, o1, o2, o3 };
    int base = (y * width + x) * channels;
    for (int c = 0; c < channels; ++c)
        output[base + c] = input[base + order[c]];
}

extern "C" __global__ void permute_f32(
    const float* __restrict__ input,
    float*       __restrict__ output,
    int width, int height, int channels,
    int o0, int o1, int o2, int o3)
{
    int x = blockIdx.x * blockDim.x + threadIdx.x;
    int y = blockIdx.y * blockDim.y + threadIdx.y;
    if (x >= width || y >= height) return;

    int order[4] = { o0, o1, o2, o3 };
    int base = (y * width + x) * channels;
    for (int c = 0; c < channels; ++c)
        output[base + c] = input[base + order[c]];
}
"#;

const MODULE_NAME: &str = "framecast_convert";

/// All NVRTC function names — compiled and resolved once.
const KERNEL_NAMES: &[&str] = &[
    "resize_plane_u8",
    "resize_plane_f32",
    "u8_to_f32",
    "f32_to_u8",
    "rgb_to_rgba",
    "rgba_to_rgb",
    "rgba_to_f32_rgb",
    "yuv420_to_rgbx",
    "nv12_to_rgb",
    "rgb_to_yuv420",
    "permute_u8",
    "permute_f32",
];

// ─── Compiled kernel handles ─────────────────────────────────────────────────

/// Holds resolved function handles for every conversion kernel.
///
/// Created once at operator start, reused for every frame.
/// **No per-frame PTX recompilation.**
#[derive(Debug)]
pub struct ConvertKernels {
    _device: Arc<CudaDevice>,
    resize_plane_u8: CudaFunction,
    resize_plane_f32: CudaFunction,
    u8_to_f32: CudaFunction,
    f32_to_u8: CudaFunction,
    rgb_to_rgba: CudaFunction,
    rgba_to_rgb: CudaFunction,
    rgba_to_f32_rgb: CudaFunction,
    yuv420_to_rgbx: CudaFunction,
    nv12_to_rgb: CudaFunction,
    rgb_to_yuv420: CudaFunction,
    permute_u8: CudaFunction,
    permute_f32: CudaFunction,
}

impl ConvertKernels {
    /// Compile the CUDA C source via NVRTC and resolve kernel handles.
    ///
    /// Call once at operator start.  All subsequent launches reuse the
    /// compiled module — zero recompilation cost per frame.
    pub fn compile(device: &Arc<CudaDevice>) -> Result<Self> {
        let ptx = cudarc::nvrtc::compile_ptx_with_opts(
            CONVERT_CUDA_SRC,
            cudarc::nvrtc::CompileOptions {
                ftz: Some(true),
                prec_div: Some(false),
                prec_sqrt: Some(false),
                ..Default::default()
            },
        )?;

        device.load_ptx(ptx, MODULE_NAME, KERNEL_NAMES)?;

        let get_fn = |name: &str| -> Result<CudaFunction> {
            device.get_func(MODULE_NAME, name).ok_or_else(|| {
                ConvertError::InternalConsistency(format!(
                    "kernel function '{name}' not found in module '{MODULE_NAME}'"
                ))
            })
        };

        let kernels = Self {
            _device: Arc::clone(device),
            resize_plane_u8: get_fn("resize_plane_u8")?,
            resize_plane_f32: get_fn("resize_plane_f32")?,
            u8_to_f32: get_fn("u8_to_f32")?,
            f32_to_u8: get_fn("f32_to_u8")?,
            rgb_to_rgba: get_fn("rgb_to_rgba")?,
            rgba_to_rgb: get_fn("rgba_to_rgb")?,
            rgba_to_f32_rgb: get_fn("rgba_to_f32_rgb")?,
            yuv420_to_rgbx: get_fn("yuv420_to_rgbx")?,
            nv12_to_rgb: get_fn("nv12_to_rgb")?,
            rgb_to_yuv420: get_fn("rgb_to_yuv420")?,
            permute_u8: get_fn("permute_u8")?,
            permute_f32: get_fn("permute_f32")?,
        };

        info!(
            kernels = KERNEL_NAMES.len(),
            module = MODULE_NAME,
            "NVRTC conversion module compiled"
        );
        Ok(kernels)
    }

    // ── Resampling ──────────────────────────────────────────────────────

    /// Resample one interleaved u8 plane.  Strides are in elements.
    ///
    /// # Safety contract (checked by callers)
    ///
    /// `in_ptr`/`out_ptr` must cover `in_h × in_stride` and
    /// `out_h × out_stride` u8 elements on this device, and must remain
    /// alive until the stream is synchronized.
    #[allow(clippy::too_many_arguments)]
    pub fn resize_plane_u8(
        &self,
        stream: &CudaStream,
        in_ptr: u64,
        in_w: i32,
        in_h: i32,
        in_stride: i32,
        out_ptr: u64,
        out_w: i32,
        out_h: i32,
        out_stride: i32,
        channels: i32,
        mode: i32,
    ) -> Result<()> {
        let config = launch_config_2d(out_w as u32, out_h as u32);
        // SAFETY: pointers are valid device pointers covering the extents
        // above; grid covers [0..out_w) × [0..out_h).
        unsafe {
            self.resize_plane_u8.clone().launch_on_stream(
                stream,
                config,
                (
                    in_ptr, out_ptr, in_w, in_h, in_stride, out_w, out_h, out_stride, channels,
                    mode,
                ),
            )?;
        }
        Ok(())
    }

    /// Resample one interleaved f32 plane.  Strides are in elements.
    #[allow(clippy::too_many_arguments)]
    pub fn resize_plane_f32(
        &self,
        stream: &CudaStream,
        in_ptr: u64,
        in_w: i32,
        in_h: i32,
        in_stride: i32,
        out_ptr: u64,
        out_w: i32,
        out_h: i32,
        out_stride: i32,
        channels: i32,
        mode: i32,
    ) -> Result<()> {
        let config = launch_config_2d(out_w as u32, out_h as u32);
        // SAFETY: as resize_plane_u8, with f32 elements.
        unsafe {
            self.resize_plane_f32.clone().launch_on_stream(
                stream,
                config,
                (
                    in_ptr, out_ptr, in_w, in_h, in_stride, out_w, out_h, out_stride, channels,
                    mode,
                ),
            )?;
        }
        Ok(())
    }

    // ── Dtype rescale ───────────────────────────────────────────────────

    /// `count` u8 elements → f32, `[0,255]` mapped onto `[lo, hi]`.
    pub fn u8_to_f32(
        &self,
        stream: &CudaStream,
        in_ptr: u64,
        out_ptr: u64,
        count: i32,
        lo: f32,
        hi: f32,
    ) -> Result<()> {
        let config = launch_config_1d(count as usize);
        // SAFETY: in_ptr holds `count` u8, out_ptr holds `count` f32 slots.
        unsafe {
            self.u8_to_f32
                .clone()
                .launch_on_stream(stream, config, (in_ptr, out_ptr, count, lo, hi))?;
        }
        Ok(())
    }

    /// `count` f32 elements → u8, inverse-mapped from `[lo, hi]` and clipped.
    pub fn f32_to_u8(
        &self,
        stream: &CudaStream,
        in_ptr: u64,
        out_ptr: u64,
        count: i32,
        lo: f32,
        hi: f32,
    ) -> Result<()> {
        let config = launch_config_1d(count as usize);
        // SAFETY: in_ptr holds `count` f32, out_ptr holds `count` u8 slots.
        unsafe {
            self.f32_to_u8
                .clone()
                .launch_on_stream(stream, config, (in_ptr, out_ptr, count, lo, hi))?;
        }
        Ok(())
    }

    // ── Channel-count changes ───────────────────────────────────────────

    /// Packed RGB → RGBA with a uniform alpha fill.
    pub fn rgb_to_rgba(
        &self,
        stream: &CudaStream,
        in_ptr: u64,
        out_ptr: u64,
        width: i32,
        height: i32,
        alpha: u8,
    ) -> Result<()> {
        let config = launch_config_2d(width as u32, height as u32);
        // SAFETY: in covers w*h*3 u8, out covers w*h*4 u8.
        unsafe {
            self.rgb_to_rgba.clone().launch_on_stream(
                stream,
                config,
                (in_ptr, out_ptr, width, height, alpha as i32),
            )?;
        }
        Ok(())
    }

    /// Packed RGBA → RGB (alpha dropped).
    pub fn rgba_to_rgb(
        &self,
        stream: &CudaStream,
        in_ptr: u64,
        out_ptr: u64,
        width: i32,
        height: i32,
    ) -> Result<()> {
        let config = launch_config_2d(width as u32, height as u32);
        // SAFETY: in covers w*h*4 u8, out covers w*h*3 u8.
        unsafe {
            self.rgba_to_rgb
                .clone()
                .launch_on_stream(stream, config, (in_ptr, out_ptr, width, height))?;
        }
        Ok(())
    }

    /// Fused packed RGBA u8 → packed RGB f32 (alpha dropped, then rescaled).
    pub fn rgba_to_f32_rgb(
        &self,
        stream: &CudaStream,
        in_ptr: u64,
        out_ptr: u64,
        width: i32,
        height: i32,
        lo: f32,
        hi: f32,
    ) -> Result<()> {
        let config = launch_config_2d(width as u32, height as u32);
        // SAFETY: in covers w*h*4 u8, out covers w*h*3 f32.
        unsafe {
            self.rgba_to_f32_rgb.clone().launch_on_stream(
                stream,
                config,
                (in_ptr, out_ptr, width, height, lo, hi),
            )?;
        }
        Ok(())
    }

    // ── Chroma conversions ──────────────────────────────────────────────

    /// Planar YUV420 → packed RGB (`out_channels == 3`) or RGBA (4, alpha
    /// filled).
    #[allow(clippy::too_many_arguments)]
    pub fn yuv420_to_rgbx(
        &self,
        stream: &CudaStream,
        y_ptr: u64,
        u_ptr: u64,
        v_ptr: u64,
        out_ptr: u64,
        width: i32,
        height: i32,
        y_stride: i32,
        c_stride: i32,
        out_channels: i32,
        alpha: u8,
    ) -> Result<()> {
        let config = launch_config_2d(width as u32, height as u32);
        // SAFETY: plane pointers cover their sub-sampled extents; out covers
        // w*h*out_channels u8.
        unsafe {
            self.yuv420_to_rgbx.clone().launch_on_stream(
                stream,
                config,
                (
                    y_ptr,
                    u_ptr,
                    v_ptr,
                    out_ptr,
                    width,
                    height,
                    y_stride,
                    c_stride,
                    out_channels,
                    alpha as i32,
                ),
            )?;
        }
        Ok(())
    }

    /// Semi-planar NV12 → packed RGB.
    #[allow(clippy::too_many_arguments)]
    pub fn nv12_to_rgb(
        &self,
        stream: &CudaStream,
        y_ptr: u64,
        uv_ptr: u64,
        out_ptr: u64,
        width: i32,
        height: i32,
        y_stride: i32,
        uv_stride: i32,
    ) -> Result<()> {
        let config = launch_config_2d(width as u32, height as u32);
        // SAFETY: Y covers h×y_stride, UV covers ⌈h/2⌉×uv_stride, out covers
        // w*h*3 u8.
        unsafe {
            self.nv12_to_rgb.clone().launch_on_stream(
                stream,
                config,
                (y_ptr, uv_ptr, out_ptr, width, height, y_stride, uv_stride),
            )?;
        }
        Ok(())
    }

    /// Packed RGB → planar YUV420 with 2×2 box-averaged chroma.
    #[allow(clippy::too_many_arguments)]
    pub fn rgb_to_yuv420(
        &self,
        stream: &CudaStream,
        in_ptr: u64,
        y_ptr: u64,
        u_ptr: u64,
        v_ptr: u64,
        width: i32,
        height: i32,
        y_stride: i32,
        c_stride: i32,
    ) -> Result<()> {
        let config = launch_config_2d(width as u32, height as u32);
        // SAFETY: in covers w*h*3 u8; planes cover their sub-sampled extents.
        // Chroma writes land only on even (x, y) corners.
        unsafe {
            self.rgb_to_yuv420.clone().launch_on_stream(
                stream,
                config,
                (in_ptr, y_ptr, u_ptr, v_ptr, width, height, y_stride, c_stride),
            )?;
        }
        Ok(())
    }

    // ── Channel permutation ─────────────────────────────────────────────

    /// Permute packed channels: `out[c] = in[order[c]]`.  `order` is padded
    /// to four entries; entries past `channels` are ignored by the kernel.
    pub fn permute(
        &self,
        stream: &CudaStream,
        float_data: bool,
        in_ptr: u64,
        out_ptr: u64,
        width: i32,
        height: i32,
        channels: i32,
        order: [i32; 4],
    ) -> Result<()> {
        let config = launch_config_2d(width as u32, height as u32);
        let func = if float_data {
            self.permute_f32.clone()
        } else {
            self.permute_u8.clone()
        };
        // SAFETY: in/out each cover w*h*channels elements of the selected
        // element type; order entries below `channels` are in-range.
        unsafe {
            func.launch_on_stream(
                stream,
                config,
                (
                    in_ptr, out_ptr, width, height, channels, order[0], order[1], order[2],
                    order[3],
                ),
            )?;
        }
        Ok(())
    }
}

// ─── Stage metrics ───────────────────────────────────────────────────────────

/// Accumulated per-stage latency metrics.
#[derive(Debug, Default)]
pub struct StageMetrics {
    /// Total stage execution time in milliseconds.
    pub total_ms: f64,
    /// Number of frames measured.
    pub frame_count: u64,
}

impl StageMetrics {
    /// Record a new measurement.
    pub fn record(&mut self, elapsed_ms: f64) {
        self.total_ms += elapsed_ms;
        self.frame_count += 1;
    }

    /// Average stage latency in milliseconds.
    pub fn avg_ms(&self) -> f64 {
        if self.frame_count == 0 {
            0.0
        } else {
            self.total_ms / self.frame_count as f64
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Standard 2D launch config: 16×16 blocks.
fn launch_config_2d(width: u32, height: u32) -> LaunchConfig {
    let block = (16u32, 16u32, 1u32);
    LaunchConfig {
        grid_dim: (width.div_ceil(block.0), height.div_ceil(block.1), 1),
        block_dim: block,
        shared_mem_bytes: 0,
    }
}

/// Standard 1D launch config: 256 threads per block.
fn launch_config_1d(count: usize) -> LaunchConfig {
    let block = 256u32;
    LaunchConfig {
        grid_dim: ((count as u32).div_ceil(block), 1, 1),
        block_dim: (block, 1, 1),
        shared_mem_bytes: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_names_match_source() {
        for name in KERNEL_NAMES {
            let needle = format!("__global__ void {name}(");
            assert!(
                CONVERT_CUDA_SRC.contains(&needle),
                "kernel '{name}' missing from CUDA source"
            );
        }
    }

    #[test]
    fn launch_configs_cover_the_grid() {
        let cfg = launch_config_2d(1920, 1080);
        assert_eq!(cfg.grid_dim, (120, 68, 1));
        let cfg = launch_config_1d(1000);
        assert_eq!(cfg.grid_dim, (4, 1, 1));
    }
}
