use crate::config::BridgeConfig;
use crate::delay::{Delay, ThreadDelay};
use crate::endpoints::EndpointPair;
use crate::handshake::Handshake;
use crate::identity::AccessoryIdentity;
use crate::protocol::Error;
use crate::session::Session;
use crate::transport::{Backend, HandleOf};
use log::{debug, info};
use std::time::Duration;

/// Owns everything needed to talk to one accessory: the transport context and, once connected,
/// the session. Dropping the bridge deinitializes it.
pub struct Bridge<B: Backend> {
    backend: B,
    config: BridgeConfig,
    delay: Box<dyn Delay + Send + Sync>,
    identity: AccessoryIdentity,
    // Declared before `context` so it drops first.
    session: Option<Session<HandleOf<B::Context>>>,
    context: Option<B::Context>,
}

impl<B: Backend> Bridge<B> {
    pub fn new(backend: B, config: BridgeConfig) -> Self {
        Self {
            backend,
            config,
            delay: Box::new(ThreadDelay::default()),
            identity: AccessoryIdentity::default(),
            session: None,
            context: None,
        }
    }

    /// Replace how the handshake waits, e.g. with a cancellable [ThreadDelay] or
    /// [NoDelay](crate::delay::NoDelay).
    pub fn with_delay(mut self, delay: impl Delay + Send + Sync + 'static) -> Self {
        self.delay = Box::new(delay);
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Identity used by the most recent [initialize](Self::initialize).
    pub fn identity(&self) -> &AccessoryIdentity {
        &self.identity
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn endpoints(&self) -> Option<EndpointPair> {
        self.session.as_ref().map(Session::endpoints)
    }

    /// Create a transport context and connect to an accessory, switching a device into accessory
    /// mode if none is attached yet. Any previous connection is closed first. If this fails, the
    /// bridge is left deinitialized with nothing held open.
    pub fn initialize(&mut self, identity: AccessoryIdentity) -> Result<(), Error> {
        self.deinitialize();
        self.identity = identity;

        let context = self
            .backend
            .create_context()
            .map_err(|e| Error::DeviceIoError {
                source: e,
                action: "creating USB context",
            })?;

        let session = Handshake::new(&context, &self.identity, &self.config, self.delay.as_ref())
            .run()?;

        info!("Accessory ready");
        self.session = Some(session);
        self.context = Some(context);
        Ok(())
    }

    /// Release the interface, close the device and destroy the context. Safe to call any number
    /// of times.
    pub fn deinitialize(&mut self) {
        if self.session.take().is_some() {
            debug!("Closed accessory session");
        }
        if self.context.take().is_some() {
            debug!("Destroyed transport context");
        }
    }

    fn session(&self) -> Result<&Session<HandleOf<B::Context>>, Error> {
        self.session.as_ref().ok_or(Error::NoDevice)
    }

    /// Read whatever the accessory sends next into `buf`, waiting at most `timeout` (zero waits
    /// forever). Fails with [Error::NoDevice] when not connected.
    pub fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, Error> {
        self.session()?.read(buf, timeout)
    }

    /// Write `buf` to the accessory, waiting at most `timeout` (zero waits forever). Fails with
    /// [Error::NoDevice] when not connected. After a timeout part of `buf` may have been sent.
    pub fn write(&self, buf: &[u8], timeout: Duration) -> Result<usize, Error> {
        self.session()?.write(buf, timeout)
    }
}

impl<B: Backend> Drop for Bridge<B> {
    fn drop(&mut self) {
        self.deinitialize();
    }
}

