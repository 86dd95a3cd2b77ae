use std::fmt::Display;

/// Google's vendor ID, used by every device in accessory mode.
pub const AOA_VID: u16 = 0x18d1;

/// Product ID of a device in accessory mode.
pub const ACCESSORY_PID: u16 = 0x2d00;

/// Product ID of a device in accessory mode with the Android debug bridge also enabled.
pub const ACCESSORY_ADB_PID: u16 = 0x2d01;

const ACCESSORY_MODES: &[(UsbId, DeviceMode)] = &[
    (aoa_dev(ACCESSORY_PID), DeviceMode::Accessory),
    (aoa_dev(ACCESSORY_ADB_PID), DeviceMode::AccessoryAdb),
];

const fn aoa_dev(pid: u16) -> UsbId {
    UsbId { vid: AOA_VID, pid }
}

/// A USB vendor ID and product ID pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UsbId {
    pub vid: u16,
    pub pid: u16,
}

impl Display for UsbId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vid, self.pid)
    }
}

/// Modes a device can be in, as far as its USB ID tells us.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceMode {
    Accessory,
    AccessoryAdb,
    /// Not (yet) in accessory mode. May or may not support AOA; only a GET_PROTOCOL request can
    /// tell.
    Other,
}

impl DeviceMode {
    pub fn is_accessory(self) -> bool {
        matches!(self, DeviceMode::Accessory | DeviceMode::AccessoryAdb)
    }
}

impl Display for DeviceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DeviceMode::Accessory => write!(f, "accessory"),
            DeviceMode::AccessoryAdb => write!(f, "accessory+adb"),
            DeviceMode::Other => write!(f, "other"),
        }
    }
}

/// Find a device's mode based on its USB ID.
pub fn identify_device(id: UsbId) -> DeviceMode {
    ACCESSORY_MODES
        .iter()
        .find(|(candidate, _)| *candidate == id)
        .map_or(DeviceMode::Other, |&(_, mode)| mode)
}
