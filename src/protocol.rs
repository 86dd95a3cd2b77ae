use crate::endpoints::ResolveError;
use crate::handshake::HandshakeError;
use crate::identity::{BoundedString, StringKind};
use crate::transport::UsbHandle;
use byteorder::{ByteOrder, LE};
use log::trace;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use rusb::{Direction, Recipient, RequestType};
use std::time::Duration;
use thiserror::Error;

/// Vendor requests defined by the Android Open Accessory protocol.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[allow(non_camel_case_types)] // Names from the AOA documentation
pub enum AoaRequest {
    ACCESSORY_GET_PROTOCOL = 51,
    ACCESSORY_SEND_STRING = 52,
    ACCESSORY_START = 53,
}

fn vendor_request_type(direction: Direction) -> u8 {
    rusb::request_type(direction, RequestType::Vendor, Recipient::Device)
}

/// Ask the device which version of the accessory protocol it speaks. 0 means none; anything else
/// means we can go ahead with the handshake.
pub fn get_protocol(handle: &impl UsbHandle, timeout: Duration) -> Result<u16, Error> {
    let mut response = [0u8; 2];
    let len = handle
        .read_control(
            vendor_request_type(Direction::In),
            AoaRequest::ACCESSORY_GET_PROTOCOL.into(),
            0,
            0,
            &mut response,
            timeout,
        )
        .map_err(|e| Error::DeviceIoError {
            source: e,
            action: "querying accessory protocol version",
        })?;

    if len < response.len() {
        return Err(Error::ResponseTooShort {
            expected: response.len(),
            actual: len,
        });
    }

    let version = LE::read_u16(&response);
    trace!("Device reports accessory protocol version {version}");
    Ok(version)
}

/// Send one identity string. The payload includes the NUL terminator.
pub fn send_string(
    handle: &impl UsbHandle,
    kind: StringKind,
    value: &BoundedString,
    timeout: Duration,
) -> Result<(), Error> {
    let payload = value.to_payload();
    handle
        .write_control(
            vendor_request_type(Direction::Out),
            AoaRequest::ACCESSORY_SEND_STRING.into(),
            0,
            kind.into(),
            &payload,
            timeout,
        )
        .map_err(|e| Error::DeviceIoError {
            source: e,
            action: "sending identity string",
        })?;

    trace!("Sent {kind} string ({} bytes)", payload.len());
    Ok(())
}

/// Tell the device to re-enumerate in accessory mode.
pub fn start(handle: &impl UsbHandle, timeout: Duration) -> Result<(), rusb::Error> {
    handle.write_control(
        vendor_request_type(Direction::Out),
        AoaRequest::ACCESSORY_START.into(),
        0,
        0,
        &[],
        timeout,
    )?;
    Ok(())
}

/// Map the result of a bulk transfer into an appropriate error, keeping timeouts distinct.
pub(crate) fn map_transfer(
    r: rusb::Result<usize>,
    action: &'static str,
) -> Result<usize, Error> {
    match r {
        Ok(len) => Ok(len),
        Err(rusb::Error::Timeout) => Err(Error::Timeout { action }),
        Err(e) => Err(Error::DeviceIoError { source: e, action }),
    }
}

/// Coarse outcome of an operation, for callers that only care which way it went.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Status {
    Ok,
    NoDevice,
    SystemError,
    Timeout,
}

impl Status {
    pub fn of<T>(result: &Result<T, Error>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(e) => e.status(),
        }
    }
}

/// All errors that can happen while connecting to or talking with an accessory.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("no accessory is connected")]
    NoDevice,

    #[error("USB transfer timed out while {action}")]
    Timeout { action: &'static str },

    #[error("USB transaction error while {action}")]
    DeviceIoError {
        source: rusb::Error,
        action: &'static str,
    },

    #[error("device response was {actual} bytes, expected at least {expected}")]
    ResponseTooShort { expected: usize, actual: usize },

    #[error("could not find bulk endpoints")]
    ResolveError(#[from] ResolveError),

    #[error("accessory handshake failed")]
    HandshakeError(#[from] HandshakeError),

    #[error("wait was cancelled")]
    Cancelled,
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Error::NoDevice => Status::NoDevice,
            Error::Timeout { .. } => Status::Timeout,
            _ => Status::SystemError,
        }
    }
}
