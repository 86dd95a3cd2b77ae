//! The USB host access we need from a provider, plus a provider-neutral descriptor model.
//!
//! Errors are reported as [rusb::Error] regardless of provider, so that timeouts and disconnects
//! mean the same thing everywhere.

use crate::device_ids::UsbId;
pub use rusb::{Direction, TransferType};
use std::time::Duration;

/// Creates transport contexts. A [Bridge](crate::bridge::Bridge) creates one context per
/// initialization and drops it on deinitialization.
pub trait Backend {
    type Context: Transport;

    fn create_context(&self) -> rusb::Result<Self::Context>;
}

/// An initialized provider runtime that can enumerate attached devices.
pub trait Transport {
    type Device: UsbDevice;

    /// Snapshot of currently attached devices, in whatever order the provider yields them.
    fn enumerate(&self) -> rusb::Result<Vec<Self::Device>>;
}

/// The handle type produced by devices of transport `T`.
pub type HandleOf<T> = <<T as Transport>::Device as UsbDevice>::Handle;

pub trait UsbDevice {
    type Handle: UsbHandle;

    fn id(&self) -> rusb::Result<UsbId>;
    fn bus_number(&self) -> u8;
    fn address(&self) -> u8;
    fn open(&self) -> rusb::Result<Self::Handle>;
}

/// An open device. Dropping the handle closes it.
///
/// A zero `timeout` waits forever.
pub trait UsbHandle {
    fn claim_interface(&mut self, interface: u8) -> rusb::Result<()>;
    fn release_interface(&mut self, interface: u8) -> rusb::Result<()>;

    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize>;

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> rusb::Result<usize>;

    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize>;
    fn write_bulk(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize>;

    /// Configuration descriptor number `index`, or [None] if the device has no such configuration.
    fn config_descriptor(&self, index: u8) -> rusb::Result<Option<ConfigDescriptor>>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigDescriptor {
    pub interfaces: Vec<Interface>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Interface {
    pub alt_settings: Vec<AltSetting>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AltSetting {
    pub endpoints: Vec<EndpointDescriptor>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub address: u8,
    pub transfer_type: TransferType,
}

impl EndpointDescriptor {
    pub fn bulk(address: u8) -> Self {
        Self {
            address,
            transfer_type: TransferType::Bulk,
        }
    }

    /// Bit 7 of the address selects the direction.
    pub fn direction(&self) -> Direction {
        if self.address & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

impl ConfigDescriptor {
    /// A configuration with a single interface and alternate setting holding `endpoints`.
    pub fn single_interface(endpoints: Vec<EndpointDescriptor>) -> Self {
        Self {
            interfaces: vec![Interface {
                alt_settings: vec![AltSetting { endpoints }],
            }],
        }
    }
}
