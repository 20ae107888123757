// Flight mode numbers per ArduPilot vehicle type.
//
// Binary logs record MODE.Mode / MODE.ModeNum as numbers, so `--mode LOITER`
// needs the vehicle's table to know which number LOITER is.

use std::fmt;

use crate::message::RawRecord;

const COPTER_MODES: &[(&str, u8)] = &[
    ("STABILIZE", 0),
    ("ACRO", 1),
    ("ALT_HOLD", 2),
    ("AUTO", 3),
    ("GUIDED", 4),
    ("LOITER", 5),
    ("RTL", 6),
    ("CIRCLE", 7),
    ("POSITION", 8),
    ("LAND", 9),
    ("OF_LOITER", 10),
    ("DRIFT", 11),
    ("SPORT", 13),
    ("FLIP", 14),
    ("AUTOTUNE", 15),
    ("POSHOLD", 16),
    ("BRAKE", 17),
    ("THROW", 18),
    ("AVOID_ADSB", 19),
    ("GUIDED_NOGPS", 20),
    ("SMART_RTL", 21),
    ("FLOWHOLD", 22),
    ("FOLLOW", 23),
    ("ZIGZAG", 24),
    ("SYSTEMID", 25),
    ("AUTOROTATE", 26),
    ("AUTO_RTL", 27),
    ("TURTLE", 28),
];

const PLANE_MODES: &[(&str, u8)] = &[
    ("MANUAL", 0),
    ("CIRCLE", 1),
    ("STABILIZE", 2),
    ("TRAINING", 3),
    ("ACRO", 4),
    ("FBWA", 5),
    ("FBWB", 6),
    ("CRUISE", 7),
    ("AUTOTUNE", 8),
    ("AUTO", 10),
    ("RTL", 11),
    ("LOITER", 12),
    ("TAKEOFF", 13),
    ("AVOID_ADSB", 14),
    ("GUIDED", 15),
    ("INITIALISING", 16),
    ("QSTABILIZE", 17),
    ("QHOVER", 18),
    ("QLOITER", 19),
    ("QLAND", 20),
    ("QRTL", 21),
    ("QAUTOTUNE", 22),
    ("QACRO", 23),
    ("THERMAL", 24),
    ("LOITERALTQLAND", 25),
];

const ROVER_MODES: &[(&str, u8)] = &[
    ("MANUAL", 0),
    ("ACRO", 1),
    ("LEARNING", 2),
    ("STEERING", 3),
    ("HOLD", 4),
    ("LOITER", 5),
    ("FOLLOW", 6),
    ("SIMPLE", 7),
    ("DOCK", 8),
    ("CIRCLE", 9),
    ("AUTO", 10),
    ("RTL", 11),
    ("SMART_RTL", 12),
    ("GUIDED", 15),
    ("INITIALISING", 16),
];

const SUB_MODES: &[(&str, u8)] = &[
    ("STABILIZE", 0),
    ("ACRO", 1),
    ("ALT_HOLD", 2),
    ("AUTO", 3),
    ("GUIDED", 4),
    ("CIRCLE", 7),
    ("SURFACE", 9),
    ("POSHOLD", 16),
    ("MANUAL", 19),
];

const TRACKER_MODES: &[(&str, u8)] = &[
    ("MANUAL", 0),
    ("STOP", 1),
    ("SCAN", 2),
    ("SERVO_TEST", 3),
    ("AUTO", 10),
    ("INITIALISING", 16),
];

/// Mode names compare without case, spaces or underscores ("Alt Hold" == "ALT_HOLD").
pub fn normalize_mode_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | ' ' | '-'))
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vehicle {
    Copter,
    Plane,
    Rover,
    Sub,
    Tracker,
}

impl fmt::Display for Vehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Vehicle::Copter => "Copter",
            Vehicle::Plane => "Plane",
            Vehicle::Rover => "Rover",
            Vehicle::Sub => "Sub",
            Vehicle::Tracker => "AntennaTracker",
        };
        f.write_str(name)
    }
}

impl Vehicle {
    /// From the firmware banner logged as a MSG record, e.g. "ArduCopter V4.5.1 (a1b2c3d4)".
    pub fn from_firmware(banner: &str) -> Option<Self> {
        let banner = banner.trim_start();
        if banner.contains("Rover") {
            Some(Vehicle::Rover)
        } else if banner.contains("Plane") {
            Some(Vehicle::Plane)
        } else if banner.contains("Copter") {
            Some(Vehicle::Copter)
        } else if banner.starts_with("ArduSub") {
            Some(Vehicle::Sub)
        } else if banner.starts_with("AntennaTracker") {
            Some(Vehicle::Tracker)
        } else {
            None
        }
    }

    /// From the `BT` (APM_BUILD) field of a VER record.
    pub fn from_build_type(build: u64) -> Option<Self> {
        match build {
            1 => Some(Vehicle::Rover),
            2 | 13 => Some(Vehicle::Copter),
            3 => Some(Vehicle::Plane),
            4 => Some(Vehicle::Tracker),
            7 => Some(Vehicle::Sub),
            _ => None,
        }
    }

    /// The vehicle a record announces, if it is a firmware MSG or a VER record.
    pub fn detect(record: &RawRecord) -> Option<Self> {
        match record.msg_type.as_str() {
            "MSG" => record
                .fields
                .get("Message")
                .and_then(|m| m.as_str())
                .and_then(Self::from_firmware),
            "VER" => record
                .fields
                .get("BT")
                .and_then(|bt| bt.as_u64())
                .and_then(Self::from_build_type),
            _ => None,
        }
    }

    fn modes(&self) -> &'static [(&'static str, u8)] {
        match self {
            Vehicle::Copter => COPTER_MODES,
            Vehicle::Plane => PLANE_MODES,
            Vehicle::Rover => ROVER_MODES,
            Vehicle::Sub => SUB_MODES,
            Vehicle::Tracker => TRACKER_MODES,
        }
    }

    /// Mode number for a (normalized) mode name.
    pub fn mode_number(&self, name: &str) -> Option<u8> {
        self.modes()
            .iter()
            .find(|(mode, _)| normalize_mode_name(mode) == name)
            .map(|(_, number)| *number)
    }
}
