//! The configuration record passed to the session at start-up.
//!
//! The JSON schema follows the current field names (`auth_name`, `logData`,
//! motion limits present); the older names that still appear in config files
//! in the field are accepted as deserialization aliases.

use serde::{Deserialize, Serialize};

fn default_scale() -> f64 {
    1.0
}

fn default_axis() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// Per-axis sign/scale multipliers; use -1 to flip an axis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OutputAxes {
    #[serde(default = "default_axis")]
    pub x: f64,
    #[serde(default = "default_axis")]
    pub y: f64,
    #[serde(default = "default_axis")]
    pub z: f64,
}

impl Default for OutputAxes {
    fn default() -> Self {
        Self {
            x: 1.0,
            y: 1.0,
            z: 1.0,
        }
    }
}

/// Target coordinate frame as translation plus XYZ-intrinsic Euler radians,
/// expressing the target relative to the source/world frame.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TargetFrame {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub x_rot: f64,
    #[serde(default)]
    pub y_rot: f64,
    #[serde(default)]
    pub z_rot: f64,
}

/// Legacy target frame block with rotations in degrees.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TargetFrameDegrees {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub x_rot_deg: f64,
    #[serde(default)]
    pub y_rot_deg: f64,
    #[serde(default)]
    pub z_rot_deg: f64,
}

impl TargetFrameDegrees {
    pub fn to_radians(&self) -> TargetFrame {
        TargetFrame {
            x: self.x,
            y: self.y,
            z: self.z,
            x_rot: self.x_rot_deg.to_radians(),
            y_rot: self.y_rot_deg.to_radians(),
            z_rot: self.z_rot_deg.to_radians(),
        }
    }
}

/// Static credentials block (`authCredentials` in config files).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Which derived sections the debug JSON printer emits.
///
/// Only affects the daemon's stdout output; `PoseProvider::get_*` always
/// return full records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LogData {
    #[serde(default = "default_true")]
    pub absolute_input: bool,
    #[serde(default)]
    pub delta_input: bool,
    #[serde(default)]
    pub absolute_transformed: bool,
    #[serde(default)]
    pub delta_transformed: bool,
    #[serde(default)]
    pub velocity: bool,
}

impl Default for LogData {
    fn default() -> Self {
        Self {
            absolute_input: true,
            delta_input: false,
            absolute_transformed: false,
            delta_transformed: false,
            velocity: false,
        }
    }
}

/// Which orientation representations the debug JSON printer includes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LogDataFormat {
    #[serde(default = "default_true")]
    pub quaternion: bool,
    #[serde(default)]
    pub rotation_vector: bool,
    #[serde(default)]
    pub euler_radian: bool,
    #[serde(default)]
    pub euler_degree: bool,
}

impl Default for LogDataFormat {
    fn default() -> Self {
        Self {
            quaternion: true,
            rotation_vector: false,
            euler_radian: false,
            euler_degree: false,
        }
    }
}

/// Configuration for pose transformation, output shaping, credentials, and
/// the safety pipeline. One immutable record per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    #[serde(rename = "logData", alias = "logFormats", alias = "includeFormats")]
    pub log_data: LogData,

    #[serde(rename = "logDataFormat", alias = "includeOrientation")]
    pub log_data_format: LogDataFormat,

    /// Position multiplier applied on output (e.g. 1000 for millimeters).
    pub scale: f64,

    #[serde(rename = "outputAxes")]
    pub output_axes: OutputAxes,

    #[serde(rename = "targetFrame", skip_serializing_if = "Option::is_none")]
    pub target_frame: Option<TargetFrame>,

    /// Degree-based legacy form; wins over `targetFrame` when both appear.
    #[serde(rename = "targetFramePose", skip_serializing_if = "Option::is_none")]
    pub target_frame_pose: Option<TargetFrameDegrees>,

    #[serde(rename = "authCredentials", skip_serializing_if = "Option::is_none")]
    pub auth_credentials: Option<AuthCredentials>,

    #[serde(alias = "ble_name", skip_serializing_if = "Option::is_none")]
    pub auth_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub upsample_to_frequency_hz: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_frequency_hz: Option<f64>,

    /// Maximum velocity in m/s; poses exceeding it are clamped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vel_limit: Option<f64>,

    /// Maximum acceleration in m/s², symmetric (applies to deceleration).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acc_limit: Option<f64>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_data: LogData::default(),
            log_data_format: LogDataFormat::default(),
            scale: default_scale(),
            output_axes: OutputAxes::default(),
            target_frame: None,
            target_frame_pose: None,
            auth_credentials: None,
            auth_name: None,
            auth_code: None,
            upsample_to_frequency_hz: None,
            rate_limit_frequency_hz: None,
            vel_limit: None,
            acc_limit: None,
        }
    }
}

impl OutputConfig {
    /// The target frame to transform into, resolving the degree-based legacy
    /// block. Identity when neither form is configured.
    pub fn effective_target_frame(&self) -> TargetFrame {
        if let Some(deg) = &self.target_frame_pose {
            return deg.to_radians();
        }
        self.target_frame.unwrap_or_default()
    }

    /// Static credentials: flat `auth_*` fields win over the
    /// `authCredentials` block.
    pub fn credentials(&self) -> (Option<&str>, Option<&str>) {
        let nested = self.auth_credentials.as_ref();
        let name = self
            .auth_name
            .as_deref()
            .or_else(|| nested.and_then(|a| a.name.as_deref()));
        let code = self
            .auth_code
            .as_deref()
            .or_else(|| nested.and_then(|a| a.code.as_deref()));
        (name, code)
    }
}
