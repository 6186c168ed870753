//! Per-frame results and their wire representation.
//!
//! Field names on the wire carry unit suffixes (`x_m`, `theta_deg`, ...)
//! that consumers already depend on. Values are in the target model's units
//! (millimetres for the shipped models) regardless of the suffix.

use serde::{Deserialize, Serialize};

/// Outcome for one target in one frame; serialized as its integer code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
#[repr(i32)]
pub enum VisionStatus {
    #[default]
    NoTargetFound = 0,
    TargetFound = 1,
    ProcessingError = 2,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unknown vision status code {0}")]
pub struct UnknownStatus(pub i32);

impl From<VisionStatus> for i32 {
    fn from(status: VisionStatus) -> Self {
        status as i32
    }
}

impl TryFrom<i32> for VisionStatus {
    type Error = UnknownStatus;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(VisionStatus::NoTargetFound),
            1 => Ok(VisionStatus::TargetFound),
            2 => Ok(VisionStatus::ProcessingError),
            other => Err(UnknownStatus(other)),
        }
    }
}

/// Pose record for one target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VisionData {
    pub status: VisionStatus,
    /// Position in the frame's left-to-right order; not transmitted.
    #[serde(skip)]
    pub target_id: i32,
    #[serde(rename = "x_m")]
    pub x: f64,
    #[serde(rename = "y_m")]
    pub y: f64,
    #[serde(rename = "z_m")]
    pub z: f64,
    #[serde(rename = "roll_deg")]
    pub roll: f64,
    #[serde(rename = "pitch_deg")]
    pub pitch: f64,
    #[serde(rename = "yaw_deg")]
    pub yaw: f64,
    /// Target center, `-1` at the left edge and `1` at the right edge.
    #[serde(rename = "imageX_px")]
    pub image_x: f64,
    /// Target center, `-1` at the bottom edge and `1` at the top edge.
    #[serde(rename = "imageY_px")]
    pub image_y: f64,
    /// Bearing from the shooter to the target, positive to the left.
    #[serde(rename = "theta_deg")]
    pub theta: f64,
    /// Planar distance from the shooter to the target.
    #[serde(rename = "dist_m")]
    pub distance: f64,
}

/// Everything one camera reports for one frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireMessage")]
pub struct VisionMessage {
    #[serde(rename = "cameraId")]
    pub camera_id: i32,
    pub packets: Vec<VisionData>,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(rename = "cameraId")]
    camera_id: i32,
    #[serde(default)]
    packets: Vec<VisionData>,
}

impl From<WireMessage> for VisionMessage {
    fn from(wire: WireMessage) -> Self {
        VisionMessage::new(wire.camera_id, wire.packets)
    }
}

impl VisionMessage {
    /// Wrap packets, numbering them in the order given.
    pub fn new(camera_id: i32, mut packets: Vec<VisionData>) -> Self {
        for (id, packet) in packets.iter_mut().enumerate() {
            packet.target_id = id as i32;
        }
        Self { camera_id, packets }
    }

    pub fn found(&self) -> impl Iterator<Item = &VisionData> {
        self.packets
            .iter()
            .filter(|p| p.status == VisionStatus::TargetFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn sample(status: VisionStatus, x: f64) -> VisionData {
        VisionData {
            status,
            target_id: 0,
            x,
            y: -20.5,
            z: 2410.0,
            roll: 1.5,
            pitch: -3.25,
            yaw: 12.0,
            image_x: -0.4,
            image_y: 0.125,
            theta: -4.75,
            distance: 2411.25,
        }
    }

    #[test]
    fn message_survives_the_wire() {
        let msg = VisionMessage::new(
            1,
            vec![
                sample(VisionStatus::TargetFound, 215.0),
                sample(VisionStatus::NoTargetFound, 340.0),
            ],
        );
        let text = serde_json::to_string(&msg).unwrap();
        let back: VisionMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.packets[1].target_id, 1);
    }

    #[test]
    fn wire_field_names_are_fixed() {
        let msg = VisionMessage::new(3, vec![sample(VisionStatus::ProcessingError, 1.0)]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["cameraId"], json!(3));
        let packet = value["packets"][0].as_object().unwrap();
        let mut keys: Vec<&str> = packet.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            [
                "dist_m",
                "imageX_px",
                "imageY_px",
                "pitch_deg",
                "roll_deg",
                "status",
                "theta_deg",
                "x_m",
                "y_m",
                "yaw_deg",
                "z_m"
            ]
        );
        assert_eq!(packet["status"], Value::from(2));
    }

    #[test]
    fn unknown_status_code_is_rejected() {
        let raw = r#"{"cameraId":0,"packets":[{"status":7,"x_m":0,"y_m":0,"z_m":0,
            "roll_deg":0,"pitch_deg":0,"yaw_deg":0,"imageX_px":0,"imageY_px":0,
            "theta_deg":0,"dist_m":0}]}"#;
        let err = serde_json::from_str::<VisionMessage>(raw).unwrap_err();
        assert!(err.to_string().contains("unknown vision status code 7"));
    }

    #[test]
    fn found_skips_other_statuses() {
        let msg = VisionMessage::new(
            0,
            vec![
                sample(VisionStatus::TargetFound, 0.0),
                sample(VisionStatus::ProcessingError, 0.0),
                sample(VisionStatus::TargetFound, 0.0),
            ],
        );
        assert_eq!(msg.found().count(), 2);
    }
}
