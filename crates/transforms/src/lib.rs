//! Pose transformation for televoodoo.
//!
//! [`PoseProvider`] turns raw tracker events into target-frame poses,
//! origin-anchored deltas, and instantaneous velocities. The quaternion
//! kernel lives in [`quat`].

pub mod quat;

use nalgebra::{Quaternion, Vector3};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Instant;
use types::{Event, OutputConfig, Pose};

use quat::Frame;

/// Default minimum dt for velocity computation (seconds).
pub const DEFAULT_MIN_DT: f64 = 0.001;

/// Absolute pose in the target frame with all orientation representations.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AbsolutePose {
    pub movement_start: bool,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub qx: f64,
    pub qy: f64,
    pub qz: f64,
    pub qw: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    pub x_rot: f64,
    pub y_rot: f64,
    pub z_rot: f64,
    pub x_rot_deg: f64,
    pub y_rot_deg: f64,
    pub z_rot_deg: f64,
}

/// Pose delta relative to the current gesture origin, in the target frame.
///
/// `qx..qw` carry the current absolute orientation for convenience.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeltaPose {
    pub movement_start: bool,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    pub dqx: f64,
    pub dqy: f64,
    pub dqz: f64,
    pub dqw: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    pub x_rot: f64,
    pub y_rot: f64,
    pub z_rot: f64,
    pub x_rot_deg: f64,
    pub y_rot_deg: f64,
    pub z_rot_deg: f64,
    pub qx: f64,
    pub qy: f64,
    pub qz: f64,
    pub qw: f64,
}

/// Instantaneous linear and angular velocity between consecutive poses.
///
/// Linear units follow the configured scale (`scale=1000` yields mm/s);
/// angular velocity is the rotation-vector derivative in rad/s.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Velocity {
    pub movement_start: bool,
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
    pub wx: f64,
    pub wy: f64,
    pub wz: f64,
    pub dt: f64,
}

/// Target-frame transform built once per call: translation and the inverse
/// of the frame rotation.
struct TargetTransform {
    translation: Vector3<f64>,
    inv_rotation: Quaternion<f64>,
}

/// Provides transformed pose data from teleoperation events.
///
/// Handles coordinate frame remapping (target frame, axis flips, scaling),
/// origin-anchored delta computation, and velocity derivation. On any pose
/// with `movement_start` set, the origin and the velocity reference are
/// re-anchored to that pose.
pub struct PoseProvider {
    config: OutputConfig,
    origin: Option<Pose>,
    prev: Option<(Pose, Instant)>,
}

impl PoseProvider {
    pub fn new(config: OutputConfig) -> Self {
        Self {
            config,
            origin: None,
            prev: None,
        }
    }

    /// Clear the stored origin pose and the velocity reference.
    pub fn reset_origin(&mut self) {
        self.origin = None;
        self.prev = None;
    }

    fn target(&self) -> TargetTransform {
        let frame = self.config.effective_target_frame();
        let rotation = quat::from_euler_xyz(frame.x_rot, frame.y_rot, frame.z_rot);
        TargetTransform {
            translation: Vector3::new(frame.x, frame.y, frame.z),
            inv_rotation: quat::conjugate(rotation),
        }
    }

    fn scale_axes(&self, v: Vector3<f64>) -> (f64, f64, f64) {
        let axes = self.config.output_axes;
        let scale = self.config.scale;
        (
            v.x * axes.x * scale,
            v.y * axes.y * scale,
            v.z * axes.z * scale,
        )
    }

    fn input_quat(pose: &Pose) -> Quaternion<f64> {
        quat::from_xyzw(pose.qx, pose.qy, pose.qz, pose.qw)
    }

    /// Transformed absolute pose, or `None` if the event is not a pose
    /// event.
    pub fn get_absolute(&mut self, evt: &Event) -> Option<AbsolutePose> {
        let pose = evt.pose_sample()?.pose;
        if pose.movement_start {
            self.origin = Some(pose);
        }

        let tt = self.target();
        let p = Vector3::new(pose.x, pose.y, pose.z) - tt.translation;
        let tp = quat::rotate_vector(p, tt.inv_rotation);
        let q_rel = quat::multiply(tt.inv_rotation, Self::input_quat(&pose));

        let (x, y, z) = self.scale_axes(tp);
        let [qx, qy, qz, qw] = quat::to_xyzw(q_rel);
        let rv = quat::to_rotvec(q_rel);
        let (x_rot, y_rot, z_rot) = quat::to_euler_xyz(q_rel);

        Some(AbsolutePose {
            movement_start: pose.movement_start,
            x,
            y,
            z,
            qx,
            qy,
            qz,
            qw,
            rx: rv.x,
            ry: rv.y,
            rz: rv.z,
            x_rot,
            y_rot,
            z_rot,
            x_rot_deg: x_rot.to_degrees(),
            y_rot_deg: y_rot.to_degrees(),
            z_rot_deg: z_rot.to_degrees(),
        })
    }

    /// Pose delta from the gesture origin, or `None` if the event is not a
    /// pose event or no origin has been seen yet.
    pub fn get_delta(&mut self, evt: &Event) -> Option<DeltaPose> {
        let pose = evt.pose_sample()?.pose;
        if pose.movement_start {
            self.origin = Some(pose);
        }
        let origin = self.origin?;

        let tt = self.target();
        let d = Vector3::new(
            pose.x - origin.x,
            pose.y - origin.y,
            pose.z - origin.z,
        );
        let dd = quat::rotate_vector(d, tt.inv_rotation);
        let (dx, dy, dz) = self.scale_axes(dd);

        let origin_q = quat::multiply(tt.inv_rotation, Self::input_quat(&origin));
        let current_q = quat::multiply(tt.inv_rotation, Self::input_quat(&pose));
        let q_delta = quat::delta(origin_q, current_q, Frame::Base);

        let [dqx, dqy, dqz, dqw] = quat::to_xyzw(q_delta);
        let rv = quat::to_rotvec(q_delta);
        let (x_rot, y_rot, z_rot) = quat::to_euler_xyz(q_delta);
        let [qx, qy, qz, qw] = quat::to_xyzw(current_q);

        Some(DeltaPose {
            movement_start: pose.movement_start,
            dx,
            dy,
            dz,
            dqx,
            dqy,
            dqz,
            dqw,
            rx: rv.x,
            ry: rv.y,
            rz: rv.z,
            x_rot,
            y_rot,
            z_rot,
            x_rot_deg: x_rot.to_degrees(),
            y_rot_deg: y_rot.to_degrees(),
            z_rot_deg: z_rot.to_degrees(),
            qx,
            qy,
            qz,
            qw,
        })
    }

    /// Instantaneous velocity with the default 1 ms minimum dt.
    pub fn get_velocity(&mut self, evt: &Event) -> Option<Velocity> {
        self.get_velocity_min_dt(evt, DEFAULT_MIN_DT)
    }

    /// Instantaneous velocity from consecutive pose events.
    ///
    /// Returns `None` for non-pose events and when the elapsed time is below
    /// `min_dt` (guards the division). On `movement_start` the reference is
    /// re-anchored and zero velocities are returned.
    pub fn get_velocity_min_dt(&mut self, evt: &Event, min_dt: f64) -> Option<Velocity> {
        let pose = evt.pose_sample()?.pose;
        self.velocity_for_pose(&pose, Instant::now(), min_dt)
    }

    fn velocity_for_pose(&mut self, pose: &Pose, now: Instant, min_dt: f64) -> Option<Velocity> {
        if pose.movement_start {
            self.origin = Some(*pose);
            self.prev = Some((*pose, now));
            return Some(Velocity {
                movement_start: true,
                vx: 0.0,
                vy: 0.0,
                vz: 0.0,
                wx: 0.0,
                wy: 0.0,
                wz: 0.0,
                dt: 0.0,
            });
        }

        let Some((prev_pose, prev_ts)) = self.prev else {
            self.prev = Some((*pose, now));
            return None;
        };

        let dt = now.saturating_duration_since(prev_ts).as_secs_f64();
        if dt < min_dt {
            return None;
        }

        let tt = self.target();
        let d = Vector3::new(
            pose.x - prev_pose.x,
            pose.y - prev_pose.y,
            pose.z - prev_pose.z,
        );
        let dd = quat::rotate_vector(d, tt.inv_rotation);
        let (dx, dy, dz) = self.scale_axes(dd);

        let prev_q = quat::multiply(tt.inv_rotation, Self::input_quat(&prev_pose));
        let current_q = quat::multiply(tt.inv_rotation, Self::input_quat(pose));
        let q_delta = quat::delta(prev_q, current_q, Frame::Base);
        let rv = quat::to_rotvec(q_delta);

        self.prev = Some((*pose, now));

        Some(Velocity {
            movement_start: false,
            vx: dx / dt,
            vy: dy / dt,
            vz: dz / dt,
            wx: rv.x / dt,
            wy: rv.y / dt,
            wz: rv.z / dt,
            dt,
        })
    }

    /// Transform a pose into the map-shaped record used by the daemon's
    /// JSON log output. Sections are gated by `logData`, orientation
    /// representations by `logDataFormat`.
    pub fn transform(&mut self, pose: &Pose) -> Map<String, Value> {
        if pose.movement_start {
            self.origin = Some(*pose);
        }

        let fmt = self.config.log_data_format;
        let input_q = Self::input_quat(pose);

        let mut absolute_input = Map::new();
        absolute_input.insert("movement_start".into(), pose.movement_start.into());
        absolute_input.insert("x".into(), pose.x.into());
        absolute_input.insert("y".into(), pose.y.into());
        absolute_input.insert("z".into(), pose.z.into());
        if fmt.quaternion {
            insert_quat(&mut absolute_input, "q", quat::to_xyzw(input_q));
        }
        if fmt.rotation_vector {
            insert_rotvec(&mut absolute_input, quat::to_rotvec(input_q));
        }
        if fmt.euler_radian || fmt.euler_degree {
            insert_euler(&mut absolute_input, quat::to_euler_xyz(input_q), fmt.euler_radian, fmt.euler_degree);
        }

        let tt = self.target();
        let p = Vector3::new(pose.x, pose.y, pose.z) - tt.translation;
        let tp = quat::rotate_vector(p, tt.inv_rotation);
        let q_rel = quat::multiply(tt.inv_rotation, input_q);
        let (tx, ty, tz) = self.scale_axes(tp);

        let mut absolute_transformed = Map::new();
        absolute_transformed.insert("movement_start".into(), pose.movement_start.into());
        absolute_transformed.insert("x".into(), tx.into());
        absolute_transformed.insert("y".into(), ty.into());
        absolute_transformed.insert("z".into(), tz.into());
        if fmt.quaternion {
            insert_quat(&mut absolute_transformed, "q", quat::to_xyzw(q_rel));
        }
        if fmt.rotation_vector {
            insert_rotvec(&mut absolute_transformed, quat::to_rotvec(q_rel));
        }
        if fmt.euler_radian || fmt.euler_degree {
            insert_euler(&mut absolute_transformed, quat::to_euler_xyz(q_rel), fmt.euler_radian, fmt.euler_degree);
        }

        let mut delta_input = None;
        let mut delta_transformed = None;
        if let Some(origin) = self.origin {
            let d = Vector3::new(
                pose.x - origin.x,
                pose.y - origin.y,
                pose.z - origin.z,
            );

            let mut raw = Map::new();
            raw.insert("dx".into(), d.x.into());
            raw.insert("dy".into(), d.y.into());
            raw.insert("dz".into(), d.z.into());
            delta_input = Some(raw);

            let dd = quat::rotate_vector(d, tt.inv_rotation);
            let (dx, dy, dz) = self.scale_axes(dd);
            let origin_q = quat::multiply(tt.inv_rotation, Self::input_quat(&origin));
            let q_delta = quat::delta(origin_q, q_rel, Frame::Base);

            let mut map = Map::new();
            map.insert("dx".into(), dx.into());
            map.insert("dy".into(), dy.into());
            map.insert("dz".into(), dz.into());
            if fmt.quaternion {
                insert_quat(&mut map, "dq", quat::to_xyzw(q_delta));
                insert_quat(&mut map, "q", quat::to_xyzw(q_rel));
            }
            if fmt.rotation_vector {
                insert_rotvec(&mut map, quat::to_rotvec(q_delta));
            }
            if fmt.euler_radian || fmt.euler_degree {
                insert_euler(&mut map, quat::to_euler_xyz(q_rel), fmt.euler_radian, fmt.euler_degree);
            }
            delta_transformed = Some(map);
        }

        let log = self.config.log_data;
        let mut result = Map::new();
        if log.absolute_input {
            result.insert("absolute_input".into(), Value::Object(absolute_input));
        }
        if log.delta_input {
            if let Some(map) = delta_input {
                result.insert("delta_input".into(), Value::Object(map));
            }
        }
        if log.absolute_transformed {
            result.insert(
                "absolute_transformed".into(),
                Value::Object(absolute_transformed),
            );
        }
        if log.delta_transformed {
            if let Some(map) = delta_transformed {
                result.insert("delta_transformed".into(), Value::Object(map));
            }
        }
        if log.velocity {
            if let Some(velocity) = self.velocity_for_pose(pose, Instant::now(), DEFAULT_MIN_DT) {
                if let Ok(value) = serde_json::to_value(velocity) {
                    result.insert("velocity".into(), value);
                }
            }
        }
        result
    }
}

fn insert_quat(map: &mut Map<String, Value>, prefix: &str, [x, y, z, w]: [f64; 4]) {
    map.insert(format!("{prefix}x"), x.into());
    map.insert(format!("{prefix}y"), y.into());
    map.insert(format!("{prefix}z"), z.into());
    map.insert(format!("{prefix}w"), w.into());
}

fn insert_rotvec(map: &mut Map<String, Value>, rv: Vector3<f64>) {
    map.insert("rx".into(), rv.x.into());
    map.insert("ry".into(), rv.y.into());
    map.insert("rz".into(), rv.z.into());
}

fn insert_euler(
    map: &mut Map<String, Value>,
    (x_rot, y_rot, z_rot): (f64, f64, f64),
    radians: bool,
    degrees: bool,
) {
    if radians {
        map.insert("x_rot".into(), x_rot.into());
        map.insert("y_rot".into(), y_rot.into());
        map.insert("z_rot".into(), z_rot.into());
    }
    if degrees {
        map.insert("x_rot_deg".into(), x_rot.to_degrees().into());
        map.insert("y_rot_deg".into(), y_rot.to_degrees().into());
        map.insert("z_rot_deg".into(), z_rot.to_degrees().into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;
    use std::time::Duration;
    use types::{OutputAxes, TargetFrame};

    fn pose_event(movement_start: bool, x: f64, y: f64, z: f64) -> Event {
        Event::pose(
            Pose {
                movement_start,
                x,
                y,
                z,
                ..Pose::default()
            }
            .into(),
        )
    }

    #[test]
    fn test_identity_frame_passthrough() {
        let mut provider = PoseProvider::new(OutputConfig::default());
        let absolute = provider
            .get_absolute(&pose_event(false, 0.125, -2.5, 3.0))
            .unwrap();
        // With identity target frame, unit axes, and scale 1, positions are
        // bit-identical
        assert_eq!(absolute.x, 0.125);
        assert_eq!(absolute.y, -2.5);
        assert_eq!(absolute.z, 3.0);
        assert_relative_eq!(absolute.qw, 1.0, epsilon = 1e-12);
        assert_relative_eq!(absolute.rx, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_non_pose_event_ignored() {
        let mut provider = PoseProvider::new(OutputConfig::default());
        assert!(provider.get_absolute(&Event::ServerStopped).is_none());
        assert!(provider.get_delta(&Event::BleAuthOk).is_none());
        assert!(provider.get_velocity(&Event::Heartbeat).is_none());
    }

    #[test]
    fn test_axis_flip_negates_only_x() {
        let mut config = OutputConfig::default();
        config.output_axes = OutputAxes {
            x: -1.0,
            y: 1.0,
            z: 1.0,
        };
        let mut provider = PoseProvider::new(config);
        let absolute = provider
            .get_absolute(&pose_event(false, 1.0, 2.0, 3.0))
            .unwrap();
        assert_eq!(absolute.x, -1.0);
        assert_eq!(absolute.y, 2.0);
        assert_eq!(absolute.z, 3.0);

        let _ = provider.get_delta(&pose_event(true, 1.0, 2.0, 3.0));
        let delta = provider
            .get_delta(&pose_event(false, 1.5, 2.5, 3.5))
            .unwrap();
        assert_relative_eq!(delta.dx, -0.5, epsilon = 1e-12);
        assert_relative_eq!(delta.dy, 0.5, epsilon = 1e-12);
        assert_relative_eq!(delta.dz, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_scale_applied_to_position() {
        let mut config = OutputConfig::default();
        config.scale = 1000.0;
        let mut provider = PoseProvider::new(config);
        let absolute = provider
            .get_absolute(&pose_event(false, 0.001, 0.002, 0.0))
            .unwrap();
        assert_relative_eq!(absolute.x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(absolute.y, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_delta_requires_origin() {
        let mut provider = PoseProvider::new(OutputConfig::default());
        assert!(provider.get_delta(&pose_event(false, 1.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn test_first_delta_after_origin_is_zero() {
        let mut provider = PoseProvider::new(OutputConfig::default());
        let delta = provider
            .get_delta(&pose_event(true, 0.4, -0.2, 0.9))
            .unwrap();
        assert!(delta.movement_start);
        assert_relative_eq!(delta.dx, 0.0, epsilon = 1e-12);
        assert_relative_eq!(delta.dy, 0.0, epsilon = 1e-12);
        assert_relative_eq!(delta.dz, 0.0, epsilon = 1e-12);
        assert_relative_eq!(delta.dqw.abs(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(delta.rx, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_delta_tracks_origin() {
        let mut provider = PoseProvider::new(OutputConfig::default());
        let _ = provider.get_delta(&pose_event(true, 1.0, 1.0, 1.0));
        let delta = provider
            .get_delta(&pose_event(false, 1.1, 0.9, 1.0))
            .unwrap();
        assert_relative_eq!(delta.dx, 0.1, epsilon = 1e-9);
        assert_relative_eq!(delta.dy, -0.1, epsilon = 1e-9);
        assert_relative_eq!(delta.dz, 0.0, epsilon = 1e-9);

        // A new movement_start re-anchors the origin
        let _ = provider.get_delta(&pose_event(true, 5.0, 5.0, 5.0));
        let delta = provider
            .get_delta(&pose_event(false, 5.0, 5.2, 5.0))
            .unwrap();
        assert_relative_eq!(delta.dx, 0.0, epsilon = 1e-9);
        assert_relative_eq!(delta.dy, 0.2, epsilon = 1e-9);
    }

    #[test]
    fn test_target_frame_rotation() {
        let mut config = OutputConfig::default();
        config.target_frame = Some(TargetFrame {
            z_rot: FRAC_PI_2,
            ..TargetFrame::default()
        });
        let mut provider = PoseProvider::new(config);
        // Target frame rotated +90° about Z: world +X maps to target -Y
        let absolute = provider
            .get_absolute(&pose_event(false, 1.0, 0.0, 0.0))
            .unwrap();
        assert_relative_eq!(absolute.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(absolute.y, -1.0, epsilon = 1e-9);
        assert_relative_eq!(absolute.z, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_target_frame_translation() {
        let mut config = OutputConfig::default();
        config.target_frame = Some(TargetFrame {
            x: 0.5,
            ..TargetFrame::default()
        });
        let mut provider = PoseProvider::new(config);
        let absolute = provider
            .get_absolute(&pose_event(false, 1.0, 0.0, 0.0))
            .unwrap();
        assert_relative_eq!(absolute.x, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_velocity_zero_on_movement_start() {
        let mut provider = PoseProvider::new(OutputConfig::default());
        let t0 = Instant::now();
        let velocity = provider
            .velocity_for_pose(
                &Pose {
                    movement_start: true,
                    ..Pose::default()
                },
                t0,
                DEFAULT_MIN_DT,
            )
            .unwrap();
        assert!(velocity.movement_start);
        assert_eq!(velocity.vx, 0.0);
        assert_eq!(velocity.wz, 0.0);
        assert_eq!(velocity.dt, 0.0);
    }

    #[test]
    fn test_linear_velocity_scaled_units() {
        let mut config = OutputConfig::default();
        config.scale = 1000.0;
        let mut provider = PoseProvider::new(config);

        let t0 = Instant::now();
        let start = Pose {
            movement_start: true,
            ..Pose::default()
        };
        let _ = provider.velocity_for_pose(&start, t0, DEFAULT_MIN_DT);

        let moved = Pose {
            x: 0.1,
            ..Pose::default()
        };
        let t1 = t0 + Duration::from_millis(100);
        let velocity = provider
            .velocity_for_pose(&moved, t1, DEFAULT_MIN_DT)
            .unwrap();
        // 0.1 m over 100 ms at scale 1000 => 1000 mm/s
        assert_relative_eq!(velocity.vx, 1000.0, epsilon = 1e-6);
        assert_relative_eq!(velocity.vy, 0.0, epsilon = 1e-9);
        assert_relative_eq!(velocity.dt, 0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_angular_velocity_about_z() {
        let mut provider = PoseProvider::new(OutputConfig::default());
        let t0 = Instant::now();
        let start = Pose {
            movement_start: true,
            ..Pose::default()
        };
        let _ = provider.velocity_for_pose(&start, t0, DEFAULT_MIN_DT);

        let q = quat::from_rotvec(Vector3::new(0.0, 0.0, 0.1));
        let [qx, qy, qz, qw] = quat::to_xyzw(q);
        let rotated = Pose {
            qx,
            qy,
            qz,
            qw,
            ..Pose::default()
        };
        let t1 = t0 + Duration::from_millis(100);
        let velocity = provider
            .velocity_for_pose(&rotated, t1, DEFAULT_MIN_DT)
            .unwrap();
        assert_relative_eq!(velocity.wz, 1.0, epsilon = 1e-6);
        assert_relative_eq!(velocity.wx, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_velocity_min_dt_guard() {
        let mut provider = PoseProvider::new(OutputConfig::default());
        let t0 = Instant::now();
        let start = Pose {
            movement_start: true,
            ..Pose::default()
        };
        let _ = provider.velocity_for_pose(&start, t0, DEFAULT_MIN_DT);

        let moved = Pose {
            x: 0.1,
            ..Pose::default()
        };
        let t1 = t0 + Duration::from_micros(100);
        assert!(provider
            .velocity_for_pose(&moved, t1, DEFAULT_MIN_DT)
            .is_none());
    }

    #[test]
    fn test_transform_default_sections() {
        let mut provider = PoseProvider::new(OutputConfig::default());
        let out = provider.transform(&Pose {
            x: 1.0,
            ..Pose::default()
        });
        // Default logData: only absolute_input; default format: quaternion
        assert!(out.contains_key("absolute_input"));
        assert!(!out.contains_key("absolute_transformed"));
        assert!(!out.contains_key("delta_transformed"));
        let input = out["absolute_input"].as_object().unwrap();
        assert!(input.contains_key("qw"));
        assert!(!input.contains_key("rx"));
        assert!(!input.contains_key("x_rot"));
    }

    #[test]
    fn test_transform_enabled_sections_and_formats() {
        let mut config = OutputConfig::default();
        config.log_data.delta_transformed = true;
        config.log_data.absolute_transformed = true;
        config.log_data_format.rotation_vector = true;
        config.log_data_format.euler_degree = true;
        let mut provider = PoseProvider::new(config);

        let _ = provider.transform(&Pose {
            movement_start: true,
            ..Pose::default()
        });
        let out = provider.transform(&Pose {
            x: 0.25,
            ..Pose::default()
        });

        let transformed = out["absolute_transformed"].as_object().unwrap();
        assert!(transformed.contains_key("rx"));
        assert!(transformed.contains_key("x_rot_deg"));
        assert!(!transformed.contains_key("x_rot"));

        let delta = out["delta_transformed"].as_object().unwrap();
        assert_relative_eq!(delta["dx"].as_f64().unwrap(), 0.25, epsilon = 1e-12);
        assert!(delta.contains_key("dqw"));
    }
}
