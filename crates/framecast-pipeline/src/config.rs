//! Configuration surface of the conversion stage.
//!
//! Deserialized once from a `[converter]` TOML table (or built in code) and
//! immutable afterwards.  Field names and defaults follow the operator's
//! established configuration vocabulary.

use serde::Deserialize;

use framecast_core::error::{ConvertError, Result};

/// Recognized options of the conversion stage.
#[derive(Debug, Clone, Deserialize)]
pub struct ConverterConfig {
    /// Source format name.
    #[serde(default = "default_in_format")]
    pub in_format: String,

    /// Destination format name.
    pub out_format: String,

    /// Tensor name searched on the input message when no video buffer is
    /// present.  Empty matches the first tensor.
    #[serde(default)]
    pub in_tensor_name: String,

    /// Name the output tensor is emitted under.
    #[serde(default)]
    pub out_tensor_name: String,

    /// Lower bound of the float rescale range.
    #[serde(default = "default_scale_min")]
    pub scale_min: f32,

    /// Upper bound of the float rescale range.
    #[serde(default = "default_scale_max")]
    pub scale_max: f32,

    /// Alpha channel fill value for conversions that add an alpha channel.
    #[serde(default = "default_alpha_value")]
    pub alpha_value: u8,

    /// Desired output width; 0 leaves the width unchanged.
    #[serde(default)]
    pub resize_width: u32,

    /// Desired output height; 0 leaves the height unchanged.
    #[serde(default)]
    pub resize_height: u32,

    /// Raw interpolation-mode value (NPP numbering).  0 and unrecognized
    /// values resolve to the cubic default.
    #[serde(default)]
    pub resize_mode: i32,

    /// Output channel permutation; empty means identity for the channel
    /// count in use.
    #[serde(default)]
    pub channel_order: Vec<usize>,
}

fn default_in_format() -> String {
    "rgb888".to_string()
}

fn default_scale_min() -> f32 {
    0.0
}

fn default_scale_max() -> f32 {
    1.0
}

fn default_alpha_value() -> u8 {
    255
}

impl ConverterConfig {
    /// Minimal configuration for a (source, destination) pair; every other
    /// field takes its default.
    pub fn for_formats(in_format: &str, out_format: &str) -> Self {
        Self {
            in_format: in_format.to_string(),
            out_format: out_format.to_string(),
            in_tensor_name: String::new(),
            out_tensor_name: String::new(),
            scale_min: default_scale_min(),
            scale_max: default_scale_max(),
            alpha_value: default_alpha_value(),
            resize_width: 0,
            resize_height: 0,
            resize_mode: 0,
            channel_order: Vec::new(),
        }
    }

    /// Parse the `[converter]` table out of a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let value: toml::Value = toml::from_str(text)
            .map_err(|e| ConvertError::Config(format!("not valid TOML: {e}")))?;
        value
            .get("converter")
            .cloned()
            .ok_or_else(|| ConvertError::Config("missing the [converter] table".to_string()))?
            .try_into()
            .map_err(|e| ConvertError::Config(format!("invalid [converter] table: {e}")))
    }

    /// Load a configuration file.
    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConvertError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg = ConverterConfig::from_toml_str(
            r#"
[converter]
out_format = "rgb888"
"#,
        )
        .unwrap();

        assert_eq!(cfg.in_format, "rgb888");
        assert_eq!(cfg.out_format, "rgb888");
        assert_eq!(cfg.in_tensor_name, "");
        assert_eq!(cfg.out_tensor_name, "");
        assert_eq!(cfg.scale_min, 0.0);
        assert_eq!(cfg.scale_max, 1.0);
        assert_eq!(cfg.alpha_value, 255);
        assert_eq!(cfg.resize_width, 0);
        assert_eq!(cfg.resize_height, 0);
        assert_eq!(cfg.resize_mode, 0);
        assert!(cfg.channel_order.is_empty());
    }

    #[test]
    fn full_table_round_trips() {
        let cfg = ConverterConfig::from_toml_str(
            r#"
[converter]
in_format = "nv12"
out_format = "rgb888"
in_tensor_name = "source_video"
out_tensor_name = "tensor"
scale_min = -1.0
scale_max = 1.0
alpha_value = 200
resize_width = 640
resize_height = 480
resize_mode = 2
channel_order = [2, 1, 0]
"#,
        )
        .unwrap();

        assert_eq!(cfg.in_format, "nv12");
        assert_eq!(cfg.out_tensor_name, "tensor");
        assert_eq!(cfg.scale_min, -1.0);
        assert_eq!(cfg.alpha_value, 200);
        assert_eq!(cfg.resize_width, 640);
        assert_eq!(cfg.resize_mode, 2);
        assert_eq!(cfg.channel_order, vec![2, 1, 0]);
    }

    #[test]
    fn missing_table_is_an_error() {
        assert!(ConverterConfig::from_toml_str("[other]\nx = 1\n").is_err());
    }
}
