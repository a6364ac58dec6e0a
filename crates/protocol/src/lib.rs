//! Televoodoo binary wire protocol, shared by all transports.
//!
//! All messages are little-endian and begin with a 6-byte header: the ASCII
//! magic `"TELE"`, a message type byte, and a protocol version byte. Over
//! TCP each message is wrapped with a 2-byte length prefix covering the
//! whole message; over UDP and BLE each datagram/characteristic write
//! carries exactly one unframed message.

use bitflags::bitflags;
use serde_json::{Map, Value};
use thiserror::Error;
use types::Pose;

/// ASCII magic at the start of every message.
pub const MAGIC: [u8; 4] = *b"TELE";

pub const PROTOCOL_VERSION: u8 = 1;
pub const MIN_SUPPORTED_VERSION: u8 = 1;
pub const MAX_SUPPORTED_VERSION: u8 = 1;

/// Default TCP data port.
pub const TCP_DATA_PORT: u16 = 50000;
/// Default UDP beacon broadcast port.
pub const UDP_BEACON_PORT: u16 = 50001;

pub const HEADER_SIZE: usize = 6;
pub const HELLO_SIZE: usize = 18;
pub const ACK_SIZE: usize = 12;
pub const POSE_SIZE: usize = 46;
pub const BYE_SIZE: usize = 10;
pub const CMD_SIZE: usize = 8;
pub const HEARTBEAT_SIZE: usize = 14;
pub const HAPTIC_SIZE: usize = 12;
pub const BEACON_HEADER_SIZE: usize = 10;
pub const CONFIG_HEADER_SIZE: usize = 8;

/// Auth codes are exactly 6 bytes on the wire, null-padded.
pub const CODE_LEN: usize = 6;

/// TCP length prefix size.
pub const FRAME_PREFIX_SIZE: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("buffer too short: got {actual} bytes, need {expected}")]
    TooShort { expected: usize, actual: usize },
    #[error("bad magic")]
    BadMagic,
    #[error("unknown message type {0}")]
    UnknownType(u8),
    #[error("unknown ACK status {0}")]
    UnknownAckStatus(u8),
    #[error("unknown command type {0}")]
    UnknownCmdType(u8),
    #[error("invalid payload: {0}")]
    BadPayload(String),
}

/// Message type IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    Hello = 1,
    Ack = 2,
    Pose = 3,
    Bye = 4,
    Cmd = 5,
    Heartbeat = 6,
    Haptic = 7,
    Beacon = 8,
    Config = 9,
}

impl MsgType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Hello),
            2 => Some(Self::Ack),
            3 => Some(Self::Pose),
            4 => Some(Self::Bye),
            5 => Some(Self::Cmd),
            6 => Some(Self::Heartbeat),
            7 => Some(Self::Haptic),
            8 => Some(Self::Beacon),
            9 => Some(Self::Config),
            _ => None,
        }
    }
}

/// ACK status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AckStatus {
    Ok = 0,
    BadCode = 1,
    Busy = 2,
    VersionMismatch = 3,
}

impl AckStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ok),
            1 => Some(Self::BadCode),
            2 => Some(Self::Busy),
            3 => Some(Self::VersionMismatch),
            _ => None,
        }
    }
}

/// Command type IDs carried by CMD messages; values are boolean 0/1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CmdType {
    Recording = 1,
    KeepRecording = 2,
}

impl CmdType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Recording),
            2 => Some(Self::KeepRecording),
            _ => None,
        }
    }
}

bitflags! {
    /// POSE flags byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PoseFlags: u8 {
        const MOVEMENT_START = 0x01;
    }
}

/// Common message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub msg_type: MsgType,
    pub version: u8,
}

/// Parse the common header, validating magic and message type.
pub fn parse_header(buf: &[u8]) -> Result<Header, ProtocolError> {
    if buf.len() < HEADER_SIZE {
        return Err(ProtocolError::TooShort {
            expected: HEADER_SIZE,
            actual: buf.len(),
        });
    }
    if buf[0..4] != MAGIC {
        return Err(ProtocolError::BadMagic);
    }
    let msg_type = MsgType::from_u8(buf[4]).ok_or(ProtocolError::UnknownType(buf[4]))?;
    Ok(Header {
        msg_type,
        version: buf[5],
    })
}

/// HELLO (tracker → host): session id plus the bearer code.
///
/// The header version is preserved so the session layer can answer an
/// unsupported version with ACK VERSION_MISMATCH instead of a parse error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub session_id: u32,
    pub code: String,
    pub version: u8,
}

/// ACK (host → tracker).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub status: AckStatus,
    pub min_version: u8,
    pub max_version: u8,
}

impl Ack {
    pub fn new(status: AckStatus) -> Self {
        Self {
            status,
            min_version: MIN_SUPPORTED_VERSION,
            max_version: MAX_SUPPORTED_VERSION,
        }
    }
}

/// POSE (tracker → host).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseMsg {
    pub seq: u16,
    pub timestamp_us: u64,
    pub flags: PoseFlags,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub qx: f32,
    pub qy: f32,
    pub qz: f32,
    pub qw: f32,
}

impl PoseMsg {
    pub fn movement_start(&self) -> bool {
        self.flags.contains(PoseFlags::MOVEMENT_START)
    }

    /// Widen to the pipeline pose representation.
    pub fn to_pose(&self) -> Pose {
        Pose {
            movement_start: self.movement_start(),
            x: f64::from(self.x),
            y: f64::from(self.y),
            z: f64::from(self.z),
            qx: f64::from(self.qx),
            qy: f64::from(self.qy),
            qz: f64::from(self.qz),
            qw: f64::from(self.qw),
        }
    }
}

/// BYE (tracker → host, and host → tracker on shutdown).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bye {
    pub session_id: u32,
}

/// CMD (tracker → host).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cmd {
    pub cmd_type: CmdType,
    pub value: u8,
}

/// HEARTBEAT (host → tracker, BLE only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub counter: u32,
    pub uptime_ms: u32,
}

/// HAPTIC (host → tracker). Intensity is clamped to `[0, 1]` on pack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Haptic {
    pub intensity: f32,
    pub channel: u8,
}

impl Haptic {
    pub fn new(intensity: f32) -> Self {
        Self {
            intensity: intensity.clamp(0.0, 1.0),
            channel: 0,
        }
    }
}

/// BEACON (host → broadcast, UDP only): discovery payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beacon {
    pub tcp_port: u16,
    pub name: String,
}

/// CONFIG (host → tracker): a JSON object payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigMsg {
    pub config: Map<String, Value>,
}

/// A parsed wire message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello(Hello),
    Ack(Ack),
    Pose(PoseMsg),
    Bye(Bye),
    Cmd(Cmd),
    Heartbeat(Heartbeat),
    Haptic(Haptic),
    Beacon(Beacon),
    Config(ConfigMsg),
}

fn need(buf: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if buf.len() < expected {
        return Err(ProtocolError::TooShort {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn u16_at(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn u32_at(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn u64_at(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

fn f32_at(buf: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn header_bytes(msg_type: MsgType) -> [u8; HEADER_SIZE] {
    [
        MAGIC[0],
        MAGIC[1],
        MAGIC[2],
        MAGIC[3],
        msg_type as u8,
        PROTOCOL_VERSION,
    ]
}

impl Message {
    /// Parse one unframed message. Buffers shorter than the fixed layout,
    /// wrong magic, or unrecognized message types are rejected.
    pub fn parse(buf: &[u8]) -> Result<Message, ProtocolError> {
        let header = parse_header(buf)?;
        match header.msg_type {
            MsgType::Hello => {
                need(buf, HELLO_SIZE)?;
                let session_id = u32_at(buf, 6);
                let raw = &buf[10..10 + CODE_LEN];
                let end = raw.iter().position(|&b| b == 0).unwrap_or(CODE_LEN);
                let code = std::str::from_utf8(&raw[..end])
                    .map_err(|e| ProtocolError::BadPayload(format!("code not UTF-8: {e}")))?
                    .to_string();
                Ok(Message::Hello(Hello {
                    session_id,
                    code,
                    version: header.version,
                }))
            }
            MsgType::Ack => {
                need(buf, ACK_SIZE)?;
                let status =
                    AckStatus::from_u8(buf[6]).ok_or(ProtocolError::UnknownAckStatus(buf[6]))?;
                Ok(Message::Ack(Ack {
                    status,
                    min_version: buf[8],
                    max_version: buf[9],
                }))
            }
            MsgType::Pose => {
                need(buf, POSE_SIZE)?;
                Ok(Message::Pose(PoseMsg {
                    seq: u16_at(buf, 6),
                    timestamp_us: u64_at(buf, 8),
                    flags: PoseFlags::from_bits_truncate(buf[16]),
                    x: f32_at(buf, 18),
                    y: f32_at(buf, 22),
                    z: f32_at(buf, 26),
                    qx: f32_at(buf, 30),
                    qy: f32_at(buf, 34),
                    qz: f32_at(buf, 38),
                    qw: f32_at(buf, 42),
                }))
            }
            MsgType::Bye => {
                need(buf, BYE_SIZE)?;
                Ok(Message::Bye(Bye {
                    session_id: u32_at(buf, 6),
                }))
            }
            MsgType::Cmd => {
                need(buf, CMD_SIZE)?;
                let cmd_type =
                    CmdType::from_u8(buf[6]).ok_or(ProtocolError::UnknownCmdType(buf[6]))?;
                Ok(Message::Cmd(Cmd {
                    cmd_type,
                    value: buf[7],
                }))
            }
            MsgType::Heartbeat => {
                need(buf, HEARTBEAT_SIZE)?;
                Ok(Message::Heartbeat(Heartbeat {
                    counter: u32_at(buf, 6),
                    uptime_ms: u32_at(buf, 10),
                }))
            }
            MsgType::Haptic => {
                need(buf, HAPTIC_SIZE)?;
                Ok(Message::Haptic(Haptic {
                    intensity: f32_at(buf, 6),
                    channel: buf[10],
                }))
            }
            MsgType::Beacon => {
                need(buf, BEACON_HEADER_SIZE)?;
                let tcp_port = u16_at(buf, 6);
                let name_len = buf[8] as usize;
                need(buf, BEACON_HEADER_SIZE + name_len)?;
                let name = String::from_utf8_lossy(
                    &buf[BEACON_HEADER_SIZE..BEACON_HEADER_SIZE + name_len],
                )
                .into_owned();
                Ok(Message::Beacon(Beacon { tcp_port, name }))
            }
            MsgType::Config => {
                need(buf, CONFIG_HEADER_SIZE)?;
                let config_len = u16_at(buf, 6) as usize;
                need(buf, CONFIG_HEADER_SIZE + config_len)?;
                let raw = &buf[CONFIG_HEADER_SIZE..CONFIG_HEADER_SIZE + config_len];
                let value: Value = serde_json::from_slice(raw)
                    .map_err(|e| ProtocolError::BadPayload(format!("config JSON: {e}")))?;
                match value {
                    Value::Object(config) => Ok(Message::Config(ConfigMsg { config })),
                    other => Err(ProtocolError::BadPayload(format!(
                        "config is not an object: {other}"
                    ))),
                }
            }
        }
    }

    /// Pack this message into its unframed wire form.
    pub fn pack(&self) -> Vec<u8> {
        match self {
            Message::Hello(hello) => {
                let mut buf = Vec::with_capacity(HELLO_SIZE);
                buf.extend_from_slice(&header_bytes(MsgType::Hello));
                buf.extend_from_slice(&hello.session_id.to_le_bytes());
                let mut code = [0u8; CODE_LEN];
                let bytes = hello.code.as_bytes();
                let len = bytes.len().min(CODE_LEN);
                code[..len].copy_from_slice(&bytes[..len]);
                buf.extend_from_slice(&code);
                buf.extend_from_slice(&0u16.to_le_bytes());
                buf
            }
            Message::Ack(ack) => {
                let mut buf = Vec::with_capacity(ACK_SIZE);
                buf.extend_from_slice(&header_bytes(MsgType::Ack));
                buf.push(ack.status as u8);
                buf.push(0);
                buf.push(ack.min_version);
                buf.push(ack.max_version);
                buf.extend_from_slice(&0u16.to_le_bytes());
                buf
            }
            Message::Pose(pose) => {
                let mut buf = Vec::with_capacity(POSE_SIZE);
                buf.extend_from_slice(&header_bytes(MsgType::Pose));
                buf.extend_from_slice(&pose.seq.to_le_bytes());
                buf.extend_from_slice(&pose.timestamp_us.to_le_bytes());
                buf.push(pose.flags.bits());
                buf.push(0);
                for v in [pose.x, pose.y, pose.z, pose.qx, pose.qy, pose.qz, pose.qw] {
                    buf.extend_from_slice(&v.to_le_bytes());
                }
                buf
            }
            Message::Bye(bye) => {
                let mut buf = Vec::with_capacity(BYE_SIZE);
                buf.extend_from_slice(&header_bytes(MsgType::Bye));
                buf.extend_from_slice(&bye.session_id.to_le_bytes());
                buf
            }
            Message::Cmd(cmd) => {
                let mut buf = Vec::with_capacity(CMD_SIZE);
                buf.extend_from_slice(&header_bytes(MsgType::Cmd));
                buf.push(cmd.cmd_type as u8);
                buf.push(cmd.value);
                buf
            }
            Message::Heartbeat(hb) => {
                let mut buf = Vec::with_capacity(HEARTBEAT_SIZE);
                buf.extend_from_slice(&header_bytes(MsgType::Heartbeat));
                buf.extend_from_slice(&hb.counter.to_le_bytes());
                buf.extend_from_slice(&hb.uptime_ms.to_le_bytes());
                buf
            }
            Message::Haptic(haptic) => {
                let mut buf = Vec::with_capacity(HAPTIC_SIZE);
                buf.extend_from_slice(&header_bytes(MsgType::Haptic));
                buf.extend_from_slice(&haptic.intensity.clamp(0.0, 1.0).to_le_bytes());
                buf.push(haptic.channel);
                buf.push(0);
                buf
            }
            Message::Beacon(beacon) => {
                let name = beacon.name.as_bytes();
                let name_len = name.len().min(u8::MAX as usize);
                let mut buf = Vec::with_capacity(BEACON_HEADER_SIZE + name_len);
                buf.extend_from_slice(&header_bytes(MsgType::Beacon));
                buf.extend_from_slice(&beacon.tcp_port.to_le_bytes());
                buf.push(name_len as u8);
                buf.push(0);
                buf.extend_from_slice(&name[..name_len]);
                buf
            }
            Message::Config(config) => {
                let json = serde_json::to_vec(&config.config).unwrap_or_else(|_| b"{}".to_vec());
                let config_len = json.len().min(u16::MAX as usize);
                let mut buf = Vec::with_capacity(CONFIG_HEADER_SIZE + config_len);
                buf.extend_from_slice(&header_bytes(MsgType::Config));
                buf.extend_from_slice(&(config_len as u16).to_le_bytes());
                buf.extend_from_slice(&json[..config_len]);
                buf
            }
        }
    }
}

/// True if a HELLO version falls inside the supported range.
pub fn is_version_supported(version: u8) -> bool {
    (MIN_SUPPORTED_VERSION..=MAX_SUPPORTED_VERSION).contains(&version)
}

/// Wrap an unframed message for TCP: 2-byte little-endian length prefix
/// covering the whole message (header included).
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let len = payload.len().min(u16::MAX as usize);
    let mut buf = Vec::with_capacity(FRAME_PREFIX_SIZE + len);
    buf.extend_from_slice(&(len as u16).to_le_bytes());
    buf.extend_from_slice(&payload[..len]);
    buf
}

/// Decode a TCP frame length prefix.
pub fn frame_length(prefix: [u8; FRAME_PREFIX_SIZE]) -> usize {
    u16::from_le_bytes(prefix) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(msg: Message) {
        let packed = msg.pack();
        let parsed = Message::parse(&packed).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_hello_roundtrip() {
        roundtrip(Message::Hello(Hello {
            session_id: 0x1122_3344,
            code: "ABC123".into(),
            version: PROTOCOL_VERSION,
        }));
    }

    #[test]
    fn test_hello_short_code_padded() {
        let msg = Message::Hello(Hello {
            session_id: 7,
            code: "AB".into(),
            version: PROTOCOL_VERSION,
        });
        let packed = msg.pack();
        assert_eq!(packed.len(), HELLO_SIZE);
        // Null padding after the two code bytes
        assert_eq!(&packed[10..16], b"AB\0\0\0\0");
        assert_eq!(Message::parse(&packed).unwrap(), msg);
    }

    #[test]
    fn test_ack_roundtrip_and_size() {
        for status in [
            AckStatus::Ok,
            AckStatus::BadCode,
            AckStatus::Busy,
            AckStatus::VersionMismatch,
        ] {
            let msg = Message::Ack(Ack::new(status));
            assert_eq!(msg.pack().len(), ACK_SIZE);
            roundtrip(msg);
        }
    }

    #[test]
    fn test_pose_roundtrip() {
        roundtrip(Message::Pose(PoseMsg {
            seq: 65535,
            timestamp_us: u64::MAX / 3,
            flags: PoseFlags::MOVEMENT_START,
            x: 1.25,
            y: -2.5,
            z: 0.001,
            qx: 0.0,
            qy: 0.7071,
            qz: 0.0,
            qw: 0.7071,
        }));
    }

    #[test]
    fn test_pose_literal_bytes() {
        // 46-byte POSE: seq=1, flags=movement_start, position (1, 2, 3),
        // identity quaternion
        let mut buf = vec![0x54, 0x45, 0x4C, 0x45, 0x03, 0x01];
        buf.extend_from_slice(&[0x01, 0x00]);
        buf.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]);
        buf.extend_from_slice(&[0x01, 0x00]);
        for v in [1.0f32, 2.0, 3.0, 0.0, 0.0, 0.0, 1.0] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(buf.len(), POSE_SIZE);

        let Message::Pose(pose) = Message::parse(&buf).unwrap() else {
            panic!("expected POSE");
        };
        assert_eq!(pose.seq, 1);
        assert_eq!(pose.timestamp_us, 0x7766_5544_3322_1100);
        assert!(pose.movement_start());
        assert_eq!(pose.x, 1.0);
        assert_eq!(pose.y, 2.0);
        assert_eq!(pose.z, 3.0);
        assert_eq!(pose.qw, 1.0);

        let widened = pose.to_pose();
        assert!(widened.movement_start);
        assert_eq!(widened.position(), [1.0, 2.0, 3.0]);
        assert_eq!(widened.quaternion(), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_bye_cmd_heartbeat_roundtrip() {
        roundtrip(Message::Bye(Bye {
            session_id: 0xDEAD_BEEF,
        }));
        roundtrip(Message::Cmd(Cmd {
            cmd_type: CmdType::Recording,
            value: 1,
        }));
        roundtrip(Message::Cmd(Cmd {
            cmd_type: CmdType::KeepRecording,
            value: 0,
        }));
        roundtrip(Message::Heartbeat(Heartbeat {
            counter: u32::MAX,
            uptime_ms: 123_456,
        }));
    }

    #[test]
    fn test_haptic_roundtrip() {
        roundtrip(Message::Haptic(Haptic {
            intensity: 0.5,
            channel: 2,
        }));
    }

    #[test]
    fn test_haptic_clamped_on_pack() {
        let packed = Message::Haptic(Haptic {
            intensity: 7.5,
            channel: 0,
        })
        .pack();
        assert_eq!(packed.len(), HAPTIC_SIZE);
        let Message::Haptic(haptic) = Message::parse(&packed).unwrap() else {
            panic!("expected HAPTIC");
        };
        assert_eq!(haptic.intensity, 1.0);
    }

    #[test]
    fn test_beacon_roundtrip() {
        let msg = Message::Beacon(Beacon {
            tcp_port: 50000,
            name: "voodooA7".into(),
        });
        let packed = msg.pack();
        assert_eq!(packed.len(), BEACON_HEADER_SIZE + 8);
        roundtrip(msg);
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Map::new();
        config.insert("scale".into(), Value::from(1000.0));
        config.insert("haptic".into(), Value::from(true));
        roundtrip(Message::Config(ConfigMsg { config }));
    }

    #[test]
    fn test_wrong_magic_rejected_for_all_types() {
        for msg_type in 1..=9u8 {
            let mut buf = vec![b'X', b'E', b'L', b'E', msg_type, 1];
            buf.resize(64, 0);
            assert_eq!(Message::parse(&buf), Err(ProtocolError::BadMagic));
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut buf = MAGIC.to_vec();
        buf.push(0xAA);
        buf.push(1);
        buf.resize(64, 0);
        assert_eq!(Message::parse(&buf), Err(ProtocolError::UnknownType(0xAA)));
    }

    #[test]
    fn test_short_buffers_rejected() {
        assert!(matches!(
            Message::parse(b"TEL"),
            Err(ProtocolError::TooShort { .. })
        ));
        // Valid header but truncated body
        let packed = Message::Pose(PoseMsg {
            seq: 0,
            timestamp_us: 0,
            flags: PoseFlags::empty(),
            x: 0.0,
            y: 0.0,
            z: 0.0,
            qx: 0.0,
            qy: 0.0,
            qz: 0.0,
            qw: 1.0,
        })
        .pack();
        assert!(matches!(
            Message::parse(&packed[..POSE_SIZE - 1]),
            Err(ProtocolError::TooShort { .. })
        ));
    }

    #[test]
    fn test_legacy_short_ack_rejected() {
        // Some early peers packed 8-byte ACKs; 12 bytes is mandatory.
        let packed = Message::Ack(Ack::new(AckStatus::Ok)).pack();
        assert!(matches!(
            Message::parse(&packed[..8]),
            Err(ProtocolError::TooShort { .. })
        ));
    }

    #[test]
    fn test_unknown_hello_version_parses() {
        // Version checking is the session layer's job (VERSION_MISMATCH ACK),
        // not a parse error.
        let mut packed = Message::Hello(Hello {
            session_id: 1,
            code: "ABC123".into(),
            version: PROTOCOL_VERSION,
        })
        .pack();
        packed[5] = 99;
        let Message::Hello(hello) = Message::parse(&packed).unwrap() else {
            panic!("expected HELLO");
        };
        assert_eq!(hello.version, 99);
        assert!(!is_version_supported(hello.version));
    }

    #[test]
    fn test_framing_roundtrip_arbitrary_chunks() {
        let messages = vec![
            Message::Hello(Hello {
                session_id: 42,
                code: "XYZ789".into(),
                version: PROTOCOL_VERSION,
            }),
            Message::Pose(PoseMsg {
                seq: 2,
                timestamp_us: 99,
                flags: PoseFlags::empty(),
                x: 0.5,
                y: 0.25,
                z: -0.125,
                qx: 0.0,
                qy: 0.0,
                qz: 0.0,
                qw: 1.0,
            }),
            Message::Bye(Bye { session_id: 42 }),
        ];

        let mut stream = Vec::new();
        for msg in &messages {
            stream.extend_from_slice(&frame(&msg.pack()));
        }

        // Re-read the frames regardless of how the bytes were chunked on the
        // way in; a flat buffer models the reassembled stream.
        for chunk_size in [1usize, 3, 7, stream.len()] {
            let mut assembled = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                assembled.extend_from_slice(chunk);
            }

            let mut offset = 0;
            let mut decoded = Vec::new();
            while offset < assembled.len() {
                let len = frame_length([assembled[offset], assembled[offset + 1]]);
                offset += FRAME_PREFIX_SIZE;
                decoded.push(Message::parse(&assembled[offset..offset + len]).unwrap());
                offset += len;
            }
            assert_eq!(decoded, messages);
        }
    }

    #[test]
    fn test_frame_prefix_is_payload_length() {
        let payload = Message::Ack(Ack::new(AckStatus::Ok)).pack();
        let framed = frame(&payload);
        assert_eq!(framed.len(), FRAME_PREFIX_SIZE + ACK_SIZE);
        assert_eq!(frame_length([framed[0], framed[1]]), ACK_SIZE);
    }
}
