use crate::device_ids::{DeviceMode, UsbId, identify_device};
use crate::protocol::{self, Error};
use crate::session::ClaimedHandle;
use crate::transport::{HandleOf, Transport, UsbDevice};
use log::{debug, info, warn};
use std::time::Duration;

fn enumerate<T: Transport>(transport: &T) -> Result<Vec<T::Device>, Error> {
    transport.enumerate().map_err(|e| Error::DeviceIoError {
        source: e,
        action: "enumerating devices",
    })
}

/// Open the first attached device that is already in accessory mode. Matching devices that
/// can't be opened are skipped.
pub fn find_accessory_device<T: Transport>(transport: &T) -> Result<Option<HandleOf<T>>, Error> {
    for device in enumerate(transport)? {
        let id = match device.id() {
            Ok(id) => id,
            Err(e) => {
                debug!("Skipping device without readable descriptor: {e}");
                continue;
            }
        };

        if !identify_device(id).is_accessory() {
            continue;
        }

        match device.open() {
            Ok(handle) => {
                info!("Found accessory-mode device {id}");
                return Ok(Some(handle));
            }
            Err(e) => warn!("Skipping accessory-mode device {id}: {e}"),
        }
    }

    Ok(None)
}

/// Probe every attached device with GET_PROTOCOL and return the first one that speaks the
/// accessory protocol, with interface 0 claimed if possible. Devices that don't match are
/// released and closed before moving on.
pub fn find_candidate_device<T: Transport>(
    transport: &T,
    control_timeout: Duration,
) -> Result<Option<ClaimedHandle<HandleOf<T>>>, Error> {
    for device in enumerate(transport)? {
        let name = describe(&device);

        let mut handle = match device.open() {
            Ok(handle) => ClaimedHandle::new(handle, 0),
            Err(e) => {
                debug!("Can't open {name}: {e}");
                continue;
            }
        };

        if let Err(e) = handle.claim() {
            debug!("Can't claim interface 0 of {name}: {e}");
        }

        match protocol::get_protocol(handle.handle(), control_timeout) {
            Ok(version) if version >= 1 => {
                info!("Found {name} supporting accessory protocol version {version}");
                return Ok(Some(handle));
            }
            Ok(_) => debug!("{name} does not support the accessory protocol"),
            Err(e) => debug!("{name} did not answer GET_PROTOCOL: {e}"),
        }
    }

    Ok(None)
}

fn describe(device: &impl UsbDevice) -> String {
    match device.id() {
        Ok(id) => format!("device {id}"),
        Err(_) => format!(
            "device at bus {} address {}",
            device.bus_number(),
            device.address()
        ),
    }
}

/// What we know about an attached device without changing its mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceSummary {
    pub id: Option<UsbId>,
    pub bus_number: u8,
    pub address: u8,
    pub mode: DeviceMode,
    /// Accessory protocol version, if probed and the device answered.
    pub protocol: Option<u16>,
}

/// Summarize every attached device. With `probe` set, devices not yet in accessory mode are also
/// asked for their protocol version using that control timeout.
pub fn list_devices<T: Transport>(
    transport: &T,
    probe: Option<Duration>,
) -> Result<Vec<DeviceSummary>, Error> {
    let summaries = enumerate(transport)?
        .iter()
        .map(|device| {
            let id = device.id().ok();
            let mode = id.map_or(DeviceMode::Other, identify_device);
            let protocol = match probe {
                Some(timeout) if !mode.is_accessory() => device
                    .open()
                    .ok()
                    .and_then(|handle| protocol::get_protocol(&handle, timeout).ok()),
                _ => None,
            };

            DeviceSummary {
                id,
                bus_number: device.bus_number(),
                address: device.address(),
                mode,
                protocol,
            }
        })
        .collect();

    Ok(summaries)
}
