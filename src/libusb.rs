use crate::device_ids::UsbId;
use crate::transport::{
    AltSetting, Backend, ConfigDescriptor, EndpointDescriptor, Interface, Transport, UsbDevice,
    UsbHandle,
};
use rusb::{Context, Device, DeviceHandle, UsbContext};
use std::time::Duration;

/// The production backend: libusb, through rusb. Each context is an independent libusb session.
#[derive(Copy, Clone, Debug, Default)]
pub struct LibUsb;

impl Backend for LibUsb {
    type Context = Context;

    fn create_context(&self) -> rusb::Result<Context> {
        Context::new()
    }
}

impl Transport for Context {
    type Device = Device<Context>;

    fn enumerate(&self) -> rusb::Result<Vec<Device<Context>>> {
        // The libusb device list is freed when the DeviceList drops at the end of this call; the
        // Device values we keep hold their own references.
        Ok(UsbContext::devices(self)?.iter().collect())
    }
}

impl UsbDevice for Device<Context> {
    type Handle = DeviceHandle<Context>;

    fn id(&self) -> rusb::Result<UsbId> {
        let descriptor = self.device_descriptor()?;
        Ok(UsbId {
            vid: descriptor.vendor_id(),
            pid: descriptor.product_id(),
        })
    }

    fn bus_number(&self) -> u8 {
        Device::bus_number(self)
    }

    fn address(&self) -> u8 {
        Device::address(self)
    }

    fn open(&self) -> rusb::Result<DeviceHandle<Context>> {
        Device::open(self)
    }
}

impl UsbHandle for DeviceHandle<Context> {
    fn claim_interface(&mut self, interface: u8) -> rusb::Result<()> {
        DeviceHandle::claim_interface(self, interface)
    }

    fn release_interface(&mut self, interface: u8) -> rusb::Result<()> {
        DeviceHandle::release_interface(self, interface)
    }

    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        DeviceHandle::read_control(self, request_type, request, value, index, buf, timeout)
    }

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        DeviceHandle::write_control(self, request_type, request, value, index, buf, timeout)
    }

    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        DeviceHandle::read_bulk(self, endpoint, buf, timeout)
    }

    fn write_bulk(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize> {
        DeviceHandle::write_bulk(self, endpoint, buf, timeout)
    }

    fn config_descriptor(&self, index: u8) -> rusb::Result<Option<ConfigDescriptor>> {
        match self.device().config_descriptor(index) {
            Ok(config) => Ok(Some(convert_config(&config))),
            Err(rusb::Error::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn convert_config(config: &rusb::ConfigDescriptor) -> ConfigDescriptor {
    ConfigDescriptor {
        interfaces: config
            .interfaces()
            .map(|interface| Interface {
                alt_settings: interface
                    .descriptors()
                    .map(|alt| AltSetting {
                        endpoints: alt
                            .endpoint_descriptors()
                            .map(|ep| EndpointDescriptor {
                                address: ep.address(),
                                transfer_type: ep.transfer_type(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect(),
    }
}
