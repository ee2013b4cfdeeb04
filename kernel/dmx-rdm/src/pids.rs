//! Standard RDM parameter ID (PID) constants used by the always-registered
//! set and by the controller's own requests.
//!
//! Manufacturer-specific PIDs occupy `0x8000..=0xFFDF` and are not named
//! here; they are registered by the caller of [`crate::param_store`].

#![allow(missing_docs)]

pub const DISC_UNIQUE_BRANCH: u16 = 0x0001;
pub const DISC_MUTE: u16 = 0x0002;
pub const DISC_UN_MUTE: u16 = 0x0003;

pub const PROXIED_DEVICES: u16 = 0x0010;
pub const PROXIED_DEVICE_COUNT: u16 = 0x0011;
pub const COMMS_STATUS: u16 = 0x0015;

pub const QUEUED_MESSAGE: u16 = 0x0020;
pub const STATUS_MESSAGES: u16 = 0x0030;
pub const STATUS_ID_DESCRIPTION: u16 = 0x0031;
pub const CLEAR_STATUS_ID: u16 = 0x0032;
pub const SUB_DEVICE_STATUS_REPORT_THRESHOLD: u16 = 0x0033;

pub const SUPPORTED_PARAMETERS: u16 = 0x0050;
pub const PARAMETER_DESCRIPTION: u16 = 0x0051;

pub const DEVICE_INFO: u16 = 0x0060;
pub const PRODUCT_DETAIL_ID_LIST: u16 = 0x0070;
pub const DEVICE_MODEL_DESCRIPTION: u16 = 0x0080;
pub const MANUFACTURER_LABEL: u16 = 0x0081;
pub const DEVICE_LABEL: u16 = 0x0082;
pub const FACTORY_DEFAULTS: u16 = 0x0090;
pub const LANGUAGE_CAPABILITIES: u16 = 0x00A0;
pub const LANGUAGE: u16 = 0x00B0;
pub const SOFTWARE_VERSION_LABEL: u16 = 0x00C0;
pub const BOOT_SOFTWARE_VERSION_ID: u16 = 0x00C1;
pub const BOOT_SOFTWARE_VERSION_LABEL: u16 = 0x00C2;

pub const DMX_PERSONALITY: u16 = 0x00E0;
pub const DMX_PERSONALITY_DESCRIPTION: u16 = 0x00E1;
pub const DMX_START_ADDRESS: u16 = 0x00F0;
pub const SLOT_INFO: u16 = 0x0120;
pub const SLOT_DESCRIPTION: u16 = 0x0121;
pub const DEFAULT_SLOT_VALUE: u16 = 0x0122;

pub const SENSOR_DEFINITION: u16 = 0x0200;
pub const SENSOR_VALUE: u16 = 0x0201;
pub const RECORD_SENSORS: u16 = 0x0202;

pub const DEVICE_HOURS: u16 = 0x0400;
pub const LAMP_HOURS: u16 = 0x0401;
pub const LAMP_STRIKES: u16 = 0x0402;
pub const LAMP_STATE: u16 = 0x0403;
pub const LAMP_ON_MODE: u16 = 0x0404;
pub const DEVICE_POWER_CYCLES: u16 = 0x0405;

pub const DISPLAY_INVERT: u16 = 0x0500;
pub const DISPLAY_LEVEL: u16 = 0x0501;

pub const PAN_INVERT: u16 = 0x0600;
pub const TILT_INVERT: u16 = 0x0601;
pub const PAN_TILT_SWAP: u16 = 0x0602;
pub const REAL_TIME_CLOCK: u16 = 0x0603;

pub const IDENTIFY_DEVICE: u16 = 0x1000;
pub const RESET_DEVICE: u16 = 0x1001;
pub const POWER_STATE: u16 = 0x1010;
pub const PERFORM_SELF_TEST: u16 = 0x1020;
pub const SELF_TEST_DESCRIPTION: u16 = 0x1021;
pub const CAPTURE_PRESET: u16 = 0x1030;
pub const PRESET_PLAYBACK: u16 = 0x1031;

/// The PIDs every RDM responder registers regardless of device class.
///
/// `DMX_START_ADDRESS` is included unconditionally here; [`crate::port`]
/// only actually registers it when the active personality's footprint is
/// nonzero.
pub const ALWAYS_REQUIRED: &[u16] = &[
    DISC_UNIQUE_BRANCH,
    DISC_MUTE,
    DISC_UN_MUTE,
    DEVICE_INFO,
    SOFTWARE_VERSION_LABEL,
    IDENTIFY_DEVICE,
    DMX_START_ADDRESS,
    DEVICE_LABEL,
    DMX_PERSONALITY,
    DMX_PERSONALITY_DESCRIPTION,
    PARAMETER_DESCRIPTION,
    QUEUED_MESSAGE,
    SUPPORTED_PARAMETERS,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_required_has_no_duplicates() {
        for (i, a) in ALWAYS_REQUIRED.iter().enumerate() {
            for b in &ALWAYS_REQUIRED[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
