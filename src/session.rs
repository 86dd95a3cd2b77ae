use crate::endpoints::EndpointPair;
use crate::protocol::{Error, map_transfer};
use crate::transport::UsbHandle;
use log::{trace, warn};
use std::time::Duration;

/// An open handle that releases its interface (if claimed) before closing.
pub struct ClaimedHandle<H: UsbHandle> {
    handle: H,
    interface: u8,
    claimed: bool,
}

impl<H: UsbHandle> ClaimedHandle<H> {
    /// Wrap `handle` without claiming anything yet.
    pub fn new(handle: H, interface: u8) -> Self {
        Self {
            handle,
            interface,
            claimed: false,
        }
    }

    /// Claim the interface. Does nothing if we already hold it.
    pub fn claim(&mut self) -> rusb::Result<()> {
        if !self.claimed {
            self.handle.claim_interface(self.interface)?;
            self.claimed = true;
        }
        Ok(())
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }
}

impl<H: UsbHandle> Drop for ClaimedHandle<H> {
    fn drop(&mut self) {
        if self.claimed {
            if let Err(e) = self.handle.release_interface(self.interface) {
                warn!("Failed to release interface {}: {e}", self.interface);
            }
        }
    }
}

/// A device in accessory mode with its bulk endpoints resolved.
pub struct Session<H: UsbHandle> {
    handle: ClaimedHandle<H>,
    endpoints: EndpointPair,
}

impl<H: UsbHandle> Session<H> {
    pub fn new(handle: ClaimedHandle<H>, endpoints: EndpointPair) -> Self {
        Self { handle, endpoints }
    }

    pub fn endpoints(&self) -> EndpointPair {
        self.endpoints
    }

    /// One bulk IN transfer into `buf`. Returns how many bytes arrived, which may be fewer than
    /// `buf.len()`. A zero `timeout` blocks until data arrives.
    pub fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, Error> {
        let len = map_transfer(
            self.handle
                .handle()
                .read_bulk(self.endpoints.in_address(), buf, timeout),
            "reading from accessory",
        )?;
        trace!("Read {len} of {} bytes", buf.len());
        Ok(len)
    }

    /// One bulk OUT transfer from `buf`. Returns how many bytes were accepted.
    ///
    /// On a timeout the device may already have accepted part of `buf`; the partial count is
    /// not reported.
    pub fn write(&self, buf: &[u8], timeout: Duration) -> Result<usize, Error> {
        let len = map_transfer(
            self.handle
                .handle()
                .write_bulk(self.endpoints.out_address(), buf, timeout),
            "writing to accessory",
        )?;
        trace!("Wrote {len} of {} bytes", buf.len());
        Ok(len)
    }
}
