//! In-memory USB provider for exercising the bridge without hardware.
//!
//! Every device operation is recorded as a [MockEvent] so tests can check what was sent and that
//! everything opened was closed again.

use crate::device_ids::{ACCESSORY_PID, AOA_VID, UsbId};
use crate::protocol::AoaRequest;
use crate::transport::{
    Backend, ConfigDescriptor, EndpointDescriptor, Transport, UsbDevice, UsbHandle,
};
use byteorder::{ByteOrder, LE};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockEvent {
    ContextCreated,
    ContextDestroyed,
    Opened(usize),
    Closed(usize),
    Claimed(usize, u8),
    Released(usize, u8),
    ControlIn {
        device: usize,
        request: u8,
        index: u16,
    },
    ControlOut {
        device: usize,
        request: u8,
        index: u16,
        data: Vec<u8>,
    },
    BulkIn {
        device: usize,
        endpoint: u8,
        capacity: usize,
    },
    BulkOut {
        device: usize,
        endpoint: u8,
        data: Vec<u8>,
    },
}

/// Behaviour of one simulated device.
#[derive(Clone, Debug)]
pub struct MockDevice {
    pub id: UsbId,
    /// Answer to GET_PROTOCOL; [None] stalls the request like a device without AOA support.
    pub protocol: Option<u16>,
    /// Answer GET_PROTOCOL with a single byte instead of two.
    pub short_protocol_reply: bool,
    pub config: Option<ConfigDescriptor>,
    pub open_error: Option<rusb::Error>,
    pub claim_error: Option<rusb::Error>,
    pub string_error: Option<rusb::Error>,
    pub start_error: Option<rusb::Error>,
    /// ID the device takes on after a successful START.
    pub reenumerate_as: Option<UsbId>,
    /// Results handed out by successive bulk reads. Once empty, reads time out.
    pub reads: VecDeque<rusb::Result<Vec<u8>>>,
    pub write_error: Option<rusb::Error>,
}

impl MockDevice {
    /// A device with the usual accessory-mode endpoints: bulk IN 0x81, bulk OUT 0x02.
    fn with_id(id: UsbId) -> Self {
        Self {
            id,
            protocol: None,
            short_protocol_reply: false,
            config: Some(ConfigDescriptor::single_interface(vec![
                EndpointDescriptor::bulk(0x81),
                EndpointDescriptor::bulk(0x02),
            ])),
            open_error: None,
            claim_error: None,
            string_error: None,
            start_error: None,
            reenumerate_as: None,
            reads: VecDeque::new(),
            write_error: None,
        }
    }

    /// Already in accessory mode.
    pub fn accessory() -> Self {
        Self::with_id(UsbId {
            vid: AOA_VID,
            pid: ACCESSORY_PID,
        })
    }

    /// Speaks AOA `protocol` and comes back as an accessory after START.
    pub fn candidate(id: UsbId, protocol: u16) -> Self {
        Self {
            protocol: Some(protocol),
            reenumerate_as: Some(UsbId {
                vid: AOA_VID,
                pid: ACCESSORY_PID,
            }),
            ..Self::with_id(id)
        }
    }

    /// Doesn't know about AOA at all.
    pub fn unsupported(id: UsbId) -> Self {
        Self {
            config: None,
            ..Self::with_id(id)
        }
    }
}

#[derive(Debug, Default)]
struct MockBus {
    devices: Vec<MockDevice>,
    events: Vec<MockEvent>,
    context_error: Option<rusb::Error>,
    enumerate_error: Option<rusb::Error>,
}

/// Shared handle to a simulated bus. Clones see the same devices and event log.
#[derive(Clone, Debug, Default)]
pub struct MockBackend {
    bus: Rc<RefCell<MockBus>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device; returns its index, used in [MockEvent]s.
    pub fn add_device(&self, device: MockDevice) -> usize {
        let mut bus = self.bus.borrow_mut();
        bus.devices.push(device);
        bus.devices.len() - 1
    }

    pub fn fail_context(&self, error: rusb::Error) {
        self.bus.borrow_mut().context_error = Some(error);
    }

    pub fn fail_enumerate(&self, error: rusb::Error) {
        self.bus.borrow_mut().enumerate_error = Some(error);
    }

    /// Change a device's behaviour after it was added.
    pub fn update_device(&self, index: usize, f: impl FnOnce(&mut MockDevice)) {
        f(&mut self.bus.borrow_mut().devices[index]);
    }

    pub fn device_id(&self, index: usize) -> UsbId {
        self.bus.borrow().devices[index].id
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.bus.borrow().events.clone()
    }

    /// `(index, payload)` of every SEND_STRING request, in order.
    pub fn sent_strings(&self) -> Vec<(u16, Vec<u8>)> {
        self.bus
            .borrow()
            .events
            .iter()
            .filter_map(|event| match event {
                MockEvent::ControlOut {
                    request, index, data, ..
                } if *request == u8::from(AoaRequest::ACCESSORY_SEND_STRING) => {
                    Some((*index, data.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn start_requests(&self) -> usize {
        self.count(|event| {
            matches!(event, MockEvent::ControlOut { request, .. }
                if *request == u8::from(AoaRequest::ACCESSORY_START))
        })
    }

    /// Handles opened and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::Opened(_)))
            - self.count(|e| matches!(e, MockEvent::Closed(_)))
    }

    /// Interfaces claimed and not yet released.
    pub fn claimed_interfaces(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::Claimed(..)))
            - self.count(|e| matches!(e, MockEvent::Released(..)))
    }

    pub fn live_contexts(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::ContextCreated))
            - self.count(|e| matches!(e, MockEvent::ContextDestroyed))
    }

    fn count(&self, f: impl Fn(&MockEvent) -> bool) -> usize {
        self.bus.borrow().events.iter().filter(|e| f(e)).count()
    }

    fn record(&self, event: MockEvent) {
        self.bus.borrow_mut().events.push(event);
    }
}

impl Backend for MockBackend {
    type Context = MockContext;

    fn create_context(&self) -> rusb::Result<MockContext> {
        if let Some(e) = self.bus.borrow().context_error {
            return Err(e);
        }
        self.record(MockEvent::ContextCreated);
        Ok(MockContext {
            backend: self.clone(),
        })
    }
}

pub struct MockContext {
    backend: MockBackend,
}

impl Drop for MockContext {
    fn drop(&mut self) {
        self.backend.record(MockEvent::ContextDestroyed);
    }
}

impl Transport for MockContext {
    type Device = MockDeviceRef;

    fn enumerate(&self) -> rusb::Result<Vec<MockDeviceRef>> {
        let bus = self.backend.bus.borrow();
        if let Some(e) = bus.enumerate_error {
            return Err(e);
        }
        Ok((0..bus.devices.len())
            .map(|index| MockDeviceRef {
                backend: self.backend.clone(),
                index,
            })
            .collect())
    }
}

pub struct MockDeviceRef {
    backend: MockBackend,
    index: usize,
}

impl MockDeviceRef {
    fn with<R>(&self, f: impl FnOnce(&MockDevice) -> R) -> R {
        f(&self.backend.bus.borrow().devices[self.index])
    }
}

impl UsbDevice for MockDeviceRef {
    type Handle = MockHandle;

    fn id(&self) -> rusb::Result<UsbId> {
        Ok(self.with(|d| d.id))
    }

    fn bus_number(&self) -> u8 {
        1
    }

    fn address(&self) -> u8 {
        u8::try_from(self.index + 1).unwrap_or(u8::MAX)
    }

    fn open(&self) -> rusb::Result<MockHandle> {
        if let Some(e) = self.with(|d| d.open_error) {
            return Err(e);
        }
        self.backend.record(MockEvent::Opened(self.index));
        Ok(MockHandle {
            backend: self.backend.clone(),
            index: self.index,
        })
    }
}

pub struct MockHandle {
    backend: MockBackend,
    index: usize,
}

impl MockHandle {
    fn with<R>(&self, f: impl FnOnce(&mut MockDevice) -> R) -> R {
        f(&mut self.backend.bus.borrow_mut().devices[self.index])
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.backend.record(MockEvent::Closed(self.index));
    }
}

impl UsbHandle for MockHandle {
    fn claim_interface(&mut self, interface: u8) -> rusb::Result<()> {
        if let Some(e) = self.with(|d| d.claim_error) {
            return Err(e);
        }
        self.backend
            .record(MockEvent::Claimed(self.index, interface));
        Ok(())
    }

    fn release_interface(&mut self, interface: u8) -> rusb::Result<()> {
        self.backend
            .record(MockEvent::Released(self.index, interface));
        Ok(())
    }

    fn read_control(
        &self,
        _request_type: u8,
        request: u8,
        _value: u16,
        index: u16,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> rusb::Result<usize> {
        self.backend.record(MockEvent::ControlIn {
            device: self.index,
            request,
            index,
        });

        match AoaRequest::try_from(request) {
            Ok(AoaRequest::ACCESSORY_GET_PROTOCOL) => {
                let (version, short) = self.with(|d| (d.protocol, d.short_protocol_reply));
                let version = version.ok_or(rusb::Error::Pipe)?;
                if buf.len() < 2 {
                    return Err(rusb::Error::Overflow);
                }
                LE::write_u16(buf, version);
                Ok(if short { 1 } else { 2 })
            }
            _ => Err(rusb::Error::Pipe),
        }
    }

    fn write_control(
        &self,
        _request_type: u8,
        request: u8,
        _value: u16,
        index: u16,
        buf: &[u8],
        _timeout: Duration,
    ) -> rusb::Result<usize> {
        self.backend.record(MockEvent::ControlOut {
            device: self.index,
            request,
            index,
            data: buf.to_vec(),
        });

        match AoaRequest::try_from(request) {
            Ok(AoaRequest::ACCESSORY_SEND_STRING) => match self.with(|d| d.string_error) {
                Some(e) => Err(e),
                None => Ok(buf.len()),
            },
            Ok(AoaRequest::ACCESSORY_START) => self.with(|d| match d.start_error {
                Some(e) => Err(e),
                None => {
                    if let Some(id) = d.reenumerate_as {
                        d.id = id;
                    }
                    Ok(0)
                }
            }),
            _ => Err(rusb::Error::Pipe),
        }
    }

    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], _timeout: Duration) -> rusb::Result<usize> {
        self.backend.record(MockEvent::BulkIn {
            device: self.index,
            endpoint,
            capacity: buf.len(),
        });

        let data = self
            .with(|d| d.reads.pop_front())
            .unwrap_or(Err(rusb::Error::Timeout))?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    fn write_bulk(&self, endpoint: u8, buf: &[u8], _timeout: Duration) -> rusb::Result<usize> {
        self.backend.record(MockEvent::BulkOut {
            device: self.index,
            endpoint,
            data: buf.to_vec(),
        });

        match self.with(|d| d.write_error) {
            Some(e) => Err(e),
            None => Ok(buf.len()),
        }
    }

    fn config_descriptor(&self, index: u8) -> rusb::Result<Option<ConfigDescriptor>> {
        if index != 0 {
            return Ok(None);
        }
        Ok(self.with(|d| d.config.clone()))
    }
}
