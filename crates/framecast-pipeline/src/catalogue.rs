//! Format catalogue: name → descriptor, (source, destination) → operation.
//!
//! Pure lookup tables built from `match` arms — no mutable state, every
//! lookup deterministic and side-effect-free.  The catalogue intentionally
//! does not chain conversions: a pair without a direct transform fails at
//! initialization with `UnsupportedConversion`, never per frame.

use framecast_core::error::{ConvertError, Result};
use framecast_core::types::FormatKind;

/// Resolve a configured format name.
pub fn parse_format(name: &str) -> Result<FormatKind> {
    match name {
        "rgb888" => Ok(FormatKind::Rgb888),
        "rgba8888" => Ok(FormatKind::Rgba8888),
        "uint8" => Ok(FormatKind::Uint8),
        "float32" => Ok(FormatKind::Float32),
        "yuv420" => Ok(FormatKind::Yuv420),
        "nv12" => Ok(FormatKind::Nv12),
        other => Err(ConvertError::UnknownFormat(other.to_string())),
    }
}

/// One specific (source, destination) transform.
///
/// Selected exactly once at initialization; per-frame dispatch is a table
/// lookup over this tag, never a format comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConvertOp {
    /// Source and destination formats are identical; the stage aliases the
    /// input (unless a channel reorder is requested).
    Passthrough,
    /// Element-wise u8 → f32 rescale onto `[scale_min, scale_max]`.
    /// Channel-agnostic: `rgb888 → float32` resolves here too.
    U8ToF32,
    /// Element-wise f32 → u8 inverse rescale, clipped to `[0, 255]`.
    F32ToU8,
    /// Packed RGB → RGBA, alpha filled with `alpha_value`.
    RgbToRgba,
    /// Packed RGBA → RGB, alpha dropped.
    RgbaToRgb,
    /// Fused RGBA u8 → RGB f32: alpha dropped, then rescaled.
    RgbaToF32,
    /// Packed RGB → planar YUV 4:2:0 (box-averaged chroma).
    RgbToYuv420,
    /// Planar YUV 4:2:0 → packed RGBA (alpha filled).
    Yuv420ToRgba,
    /// Planar YUV 4:2:0 → packed RGB.
    Yuv420ToRgb,
    /// Semi-planar NV12 → packed RGB.
    Nv12ToRgb,
}

impl ConvertOp {
    /// The unique operation for a (source, destination) pair.
    pub fn select(from: FormatKind, to: FormatKind) -> Result<Self> {
        use FormatKind::*;
        match (from, to) {
            (a, b) if a == b => Ok(Self::Passthrough),
            (Rgb888, Rgba8888) => Ok(Self::RgbToRgba),
            (Rgba8888, Rgb888) => Ok(Self::RgbaToRgb),
            (Uint8, Float32) | (Rgb888, Float32) => Ok(Self::U8ToF32),
            (Float32, Uint8) => Ok(Self::F32ToU8),
            (Rgba8888, Float32) => Ok(Self::RgbaToF32),
            (Rgb888, Yuv420) => Ok(Self::RgbToYuv420),
            (Yuv420, Rgba8888) => Ok(Self::Yuv420ToRgba),
            (Yuv420, Rgb888) => Ok(Self::Yuv420ToRgb),
            (Nv12, Rgb888) => Ok(Self::Nv12ToRgb),
            (from, to) => Err(ConvertError::UnsupportedConversion { from, to }),
        }
    }

    /// Channel count of the output for an input with `in_channels`.
    pub fn out_channels(self, in_channels: usize) -> usize {
        match self {
            Self::Passthrough | Self::U8ToF32 | Self::F32ToU8 => in_channels,
            Self::RgbToRgba | Self::Yuv420ToRgba => 4,
            Self::RgbaToRgb | Self::RgbaToF32 => 3,
            Self::RgbToYuv420 => 3,
            Self::Yuv420ToRgb | Self::Nv12ToRgb => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FormatKind::*;

    const ALL: [FormatKind; 6] = [Rgb888, Rgba8888, Uint8, Float32, Yuv420, Nv12];

    #[test]
    fn known_names_parse() {
        for kind in ALL {
            assert_eq!(parse_format(kind.name()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        match parse_format("bogus") {
            Err(ConvertError::UnknownFormat(name)) => assert_eq!(name, "bogus"),
            other => panic!("expected UnknownFormat, got {other:?}"),
        }
    }

    #[test]
    fn identity_pairs_are_passthrough() {
        for kind in ALL {
            assert_eq!(ConvertOp::select(kind, kind).unwrap(), ConvertOp::Passthrough);
        }
    }

    #[test]
    fn every_table_cell_resolves_as_documented() {
        // The complete supported table; every other pair must be rejected.
        let supported = [
            (Rgb888, Rgba8888, ConvertOp::RgbToRgba),
            (Rgba8888, Rgb888, ConvertOp::RgbaToRgb),
            (Uint8, Float32, ConvertOp::U8ToF32),
            (Rgb888, Float32, ConvertOp::U8ToF32),
            (Float32, Uint8, ConvertOp::F32ToU8),
            (Rgba8888, Float32, ConvertOp::RgbaToF32),
            (Rgb888, Yuv420, ConvertOp::RgbToYuv420),
            (Yuv420, Rgba8888, ConvertOp::Yuv420ToRgba),
            (Yuv420, Rgb888, ConvertOp::Yuv420ToRgb),
            (Nv12, Rgb888, ConvertOp::Nv12ToRgb),
        ];

        for (from, to, op) in supported {
            assert_eq!(ConvertOp::select(from, to).unwrap(), op, "{from:?}→{to:?}");
        }

        for from in ALL {
            for to in ALL {
                let in_table = from == to
                    || supported.iter().any(|&(f, t, _)| f == from && t == to);
                let result = ConvertOp::select(from, to);
                if in_table {
                    assert!(result.is_ok(), "{from:?}→{to:?} should resolve");
                } else {
                    assert!(
                        matches!(
                            result,
                            Err(ConvertError::UnsupportedConversion { .. })
                        ),
                        "{from:?}→{to:?} should be rejected"
                    );
                }
            }
        }
    }

    #[test]
    fn output_channel_counts() {
        assert_eq!(ConvertOp::RgbToRgba.out_channels(3), 4);
        assert_eq!(ConvertOp::RgbaToRgb.out_channels(4), 3);
        assert_eq!(ConvertOp::RgbaToF32.out_channels(4), 3);
        assert_eq!(ConvertOp::U8ToF32.out_channels(3), 3);
        assert_eq!(ConvertOp::U8ToF32.out_channels(1), 1);
        assert_eq!(ConvertOp::Passthrough.out_channels(4), 4);
        assert_eq!(ConvertOp::Nv12ToRgb.out_channels(3), 3);
    }
}
