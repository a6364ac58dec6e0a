//! Shared types and event definitions for televoodoo.

mod config;

pub use config::{
    AuthCredentials, LogData, LogDataFormat, OutputAxes, OutputConfig, TargetFrame,
    TargetFrameDegrees,
};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 6-DoF pose: position in meters plus orientation as a scalar-last unit
/// quaternion.
///
/// `movement_start` marks the first pose of a new gesture; all
/// origin-relative state downstream (transform origin, limiter reference,
/// resampler buffer) is reset when it is set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pose {
    #[serde(default)]
    pub movement_start: bool,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub qx: f64,
    #[serde(default)]
    pub qy: f64,
    #[serde(default)]
    pub qz: f64,
    #[serde(default = "default_qw")]
    pub qw: f64,
}

fn default_qw() -> f64 {
    1.0
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            movement_start: false,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            qx: 0.0,
            qy: 0.0,
            qz: 0.0,
            qw: 1.0,
        }
    }
}

impl Pose {
    /// Position as `[x, y, z]`.
    pub fn position(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Orientation as `[qx, qy, qz, qw]` (scalar-last).
    pub fn quaternion(&self) -> [f64; 4] {
        [self.qx, self.qy, self.qz, self.qw]
    }
}

/// A pose as it travels through the processing pipeline.
///
/// `limited` is set to `Some(true)` when the motion limiter clamped the
/// position of this sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoseSample {
    #[serde(flatten)]
    pub pose: Pose,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limited: Option<bool>,
}

impl From<Pose> for PoseSample {
    fn from(pose: Pose) -> Self {
        Self {
            pose,
            limited: None,
        }
    }
}

/// Payload of a pose event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoseData {
    pub absolute_input: PoseSample,
}

/// Command names carried by CMD messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandName {
    Recording,
    KeepRecording,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    HelloTimeout,
    InvalidHello,
    ConnectionClosed,
    ServerShutdown,
    Timeout,
}

/// Why a connection attempt was rejected before a session was installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    BadCode,
    Busy,
    VersionMismatch,
}

/// Event delivered from the host runtime to the user callback.
///
/// Serialized one compact JSON object per line when the daemon logs to
/// stdout, e.g. `{"type":"pose","data":{"absolute_input":{...}}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Pose {
        data: PoseData,
    },
    Command {
        name: CommandName,
        value: bool,
    },
    Session {
        name: String,
        code: String,
        transport: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
    },
    Connected {
        client: String,
        session_id: u32,
    },
    Disconnected {
        reason: DisconnectReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client: Option<String>,
    },
    SessionRejected {
        client: String,
        reason: RejectReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_version: Option<u8>,
    },
    Error {
        message: String,
    },
    Warn {
        message: String,
    },
    MotionLimitWarning {
        message: String,
        reasons: Vec<String>,
    },
    ResamplingEnabled {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        upsample_to_hz: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rate_limit_hz: Option<f64>,
        regulated: bool,
    },
    MotionLimitingEnabled {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        vel_limit: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        acc_limit: Option<f64>,
    },
    ServerStarting {
        name: String,
        tcp_port: u16,
        beacon_port: u16,
        ip: String,
    },
    BeaconStarted {
        name: String,
        beacon_port: u16,
        tcp_port: u16,
        broadcast_addresses: Vec<String>,
    },
    ServerListening {
        ip: String,
        tcp_port: u16,
        beacon_port: u16,
        code: String,
    },
    ServerStopped,
    ConnectionAccepted {
        client: String,
    },
    BleAdvertising {
        name: String,
    },
    BleAuthOk,
    BleAuthFailed,
    BleControl {
        cmd: String,
    },
    Heartbeat,
    UsbSetupInfo {
        message: String,
        ios_setup: String,
        android_setup: String,
    },
}

impl Event {
    /// Build a pose event from a pipeline sample.
    pub fn pose(sample: PoseSample) -> Self {
        Event::Pose {
            data: PoseData {
                absolute_input: sample,
            },
        }
    }

    /// The pose sample carried by this event, if it is a pose event.
    pub fn pose_sample(&self) -> Option<&PoseSample> {
        match self {
            Event::Pose { data } => Some(&data.absolute_input),
            _ => None,
        }
    }

    /// Events emitted at stream rate; suppressed from stdout in quiet mode.
    pub fn is_high_frequency(&self) -> bool {
        matches!(self, Event::Pose { .. } | Event::Heartbeat)
    }
}

/// Sink for events produced by transports and the pipeline.
///
/// Invoked on whichever task produced the event; implementations must be
/// prepared for concurrent calls and must not block for long.
pub type EventSink = Arc<dyn Fn(Event) + Send + Sync>;
