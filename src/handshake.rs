use crate::config::{BridgeConfig, StringPolicy};
use crate::delay::Delay;
use crate::endpoints::resolve_from_handle;
use crate::identity::{AccessoryIdentity, StringKind};
use crate::locator::{find_accessory_device, find_candidate_device};
use crate::protocol::{self, Error};
use crate::session::{ClaimedHandle, Session};
use crate::transport::{HandleOf, Transport, UsbHandle};
use log::{debug, info, warn};
use std::fmt::Display;
use thiserror::Error;

/// Steps of the switch into accessory mode, in the order they happen.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    LocatingAccessory,
    LocatingCandidate,
    SendingIdentity,
    Starting,
    AwaitingReEnumeration,
    Connected,
    Failed(FailReason),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FailReason {
    NoDevice,
    SystemError,
}

impl Display for HandshakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            HandshakeState::Idle => write!(f, "idle"),
            HandshakeState::LocatingAccessory => write!(f, "locating accessory"),
            HandshakeState::LocatingCandidate => write!(f, "locating candidate"),
            HandshakeState::SendingIdentity => write!(f, "sending identity"),
            HandshakeState::Starting => write!(f, "starting accessory mode"),
            HandshakeState::AwaitingReEnumeration => write!(f, "awaiting re-enumeration"),
            HandshakeState::Connected => write!(f, "connected"),
            HandshakeState::Failed(reason) => write!(f, "failed ({reason:?})"),
        }
    }
}

/// One pass through the handshake. Nothing here retries; to try again, run a new handshake.
pub struct Handshake<'a, T: Transport> {
    transport: &'a T,
    identity: &'a AccessoryIdentity,
    config: &'a BridgeConfig,
    delay: &'a dyn Delay,
    state: HandshakeState,
}

impl<'a, T: Transport> Handshake<'a, T> {
    pub fn new(
        transport: &'a T,
        identity: &'a AccessoryIdentity,
        config: &'a BridgeConfig,
        delay: &'a dyn Delay,
    ) -> Self {
        Self {
            transport,
            identity,
            config,
            delay,
            state: HandshakeState::Idle,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Connect to a device in accessory mode, switching one into it first if necessary. On
    /// failure, every handle opened along the way has been released and closed.
    pub fn run(&mut self) -> Result<Session<HandleOf<T>>, Error> {
        let result = self.connect();
        match &result {
            Ok(_) => self.enter(HandshakeState::Connected),
            Err(Error::HandshakeError(e)) => self.enter(HandshakeState::Failed(e.reason())),
            Err(_) => self.enter(HandshakeState::Failed(FailReason::SystemError)),
        }
        result
    }

    fn enter(&mut self, state: HandshakeState) {
        debug!("Handshake: {} -> {}", self.state, state);
        self.state = state;
    }

    fn connect(&mut self) -> Result<Session<HandleOf<T>>, Error> {
        self.enter(HandshakeState::LocatingAccessory);
        if let Some(handle) = find_accessory_device(self.transport)? {
            info!("Device already in accessory mode");
            return open_session(handle);
        }

        self.enter(HandshakeState::LocatingCandidate);
        let mut candidate = find_candidate_device(self.transport, self.config.control_timeout)?
            .ok_or(HandshakeError::NoDevice)?;

        if let Err(e) = candidate.claim() {
            warn!("Continuing without interface 0 claimed: {e}");
        }
        self.delay.wait(self.config.settle_delay)?;

        self.enter(HandshakeState::SendingIdentity);
        self.send_identity(&candidate)?;

        self.enter(HandshakeState::Starting);
        protocol::start(candidate.handle(), self.config.control_timeout)
            .map_err(|source| HandshakeError::StartFailed { source })?;
        drop(candidate);

        self.enter(HandshakeState::AwaitingReEnumeration);
        info!(
            "Waiting {:?} for device to re-enumerate in accessory mode",
            self.config.reenumeration_delay
        );
        self.delay.wait(self.config.reenumeration_delay)?;

        let handle =
            find_accessory_device(self.transport)?.ok_or(HandshakeError::NotReEnumerated)?;
        open_session(handle)
    }

    fn send_identity(&self, candidate: &ClaimedHandle<HandleOf<T>>) -> Result<(), Error> {
        for (kind, value) in self.identity.fields() {
            let result = protocol::send_string(
                candidate.handle(),
                kind,
                value,
                self.config.control_timeout,
            );

            match (result, self.config.string_policy) {
                (Ok(()), _) => {}
                (Err(e), StringPolicy::BestEffort) => {
                    warn!("Device rejected {kind} string, continuing: {e}");
                }
                (Err(Error::DeviceIoError { source, .. }), StringPolicy::AbortOnFailure) => {
                    return Err(HandshakeError::StringRejected { kind, source }.into());
                }
                (Err(e), StringPolicy::AbortOnFailure) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Claim interface 0 of a device in accessory mode and find its bulk endpoints.
fn open_session<H: UsbHandle>(handle: H) -> Result<Session<H>, Error> {
    let mut handle = ClaimedHandle::new(handle, 0);
    handle.claim().map_err(|e| Error::DeviceIoError {
        source: e,
        action: "claiming accessory interface",
    })?;

    let endpoints = resolve_from_handle(handle.handle())?;
    info!("Connected to accessory, endpoints {endpoints}");
    Ok(Session::new(handle, endpoints))
}

/// Ways the handshake itself can fail, as opposed to errors from the layers below it.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HandshakeError {
    #[error("no device in accessory mode or supporting the accessory protocol")]
    NoDevice,

    #[error("device rejected {kind} string")]
    StringRejected {
        kind: StringKind,
        source: rusb::Error,
    },

    #[error("device rejected START request")]
    StartFailed { source: rusb::Error },

    #[error("device did not come back in accessory mode")]
    NotReEnumerated,
}

impl HandshakeError {
    pub fn reason(&self) -> FailReason {
        match self {
            HandshakeError::NoDevice | HandshakeError::NotReEnumerated => FailReason::NoDevice,
            HandshakeError::StringRejected { .. } | HandshakeError::StartFailed { .. } => {
                FailReason::SystemError
            }
        }
    }
}
