use crate::protocol::Error;
use crate::transport::{ConfigDescriptor, Direction, TransferType, UsbHandle};
use std::fmt::Display;
use thiserror::Error;

/// Addresses of the bulk endpoints used for accessory traffic. Only [resolve] creates these, so
/// both addresses are always real endpoints.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EndpointPair {
    in_address: u8,
    out_address: u8,
}

impl EndpointPair {
    /// Endpoint we read from (device to host).
    pub fn in_address(&self) -> u8 {
        self.in_address
    }

    /// Endpoint we write to (host to device).
    pub fn out_address(&self) -> u8 {
        self.out_address
    }
}

impl Display for EndpointPair {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "in={:#04x} out={:#04x}", self.in_address, self.out_address)
    }
}

/// Pick the bulk endpoints out of the first alternate setting of the first interface of
/// `config`. The first bulk endpoint in each direction wins.
pub fn resolve(config: Option<&ConfigDescriptor>) -> Result<EndpointPair, ResolveError> {
    let config = config.ok_or(ResolveError::NoConfiguration)?;
    let interface = config.interfaces.first().ok_or(ResolveError::NoInterface)?;
    let alt = interface
        .alt_settings
        .first()
        .ok_or(ResolveError::NoAltSetting)?;

    let mut in_address = None;
    let mut out_address = None;
    for ep in alt
        .endpoints
        .iter()
        .filter(|ep| ep.transfer_type == TransferType::Bulk)
    {
        let slot = match ep.direction() {
            Direction::In => &mut in_address,
            Direction::Out => &mut out_address,
        };
        if slot.is_none() {
            *slot = Some(ep.address);
        }
    }

    Ok(EndpointPair {
        in_address: in_address.ok_or(ResolveError::MissingEndpoint(Direction::In))?,
        out_address: out_address.ok_or(ResolveError::MissingEndpoint(Direction::Out))?,
    })
}

/// Fetch configuration 0 from an open device and [resolve] its endpoints.
pub fn resolve_from_handle(handle: &impl UsbHandle) -> Result<EndpointPair, Error> {
    let config = handle
        .config_descriptor(0)
        .map_err(|e| Error::DeviceIoError {
            source: e,
            action: "reading configuration descriptor",
        })?;
    resolve(config.as_ref()).map_err(Into::into)
}

/// Ways a device's descriptors can fail to describe an accessory interface.
#[derive(Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResolveError {
    #[error("device has no configuration descriptor")]
    NoConfiguration,

    #[error("configuration has no interfaces")]
    NoInterface,

    #[error("first interface has no alternate settings")]
    NoAltSetting,

    #[error("no bulk {0:?} endpoint on first interface")]
    MissingEndpoint(Direction),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{AltSetting, EndpointDescriptor, Interface};

    fn config(endpoints: Vec<EndpointDescriptor>) -> ConfigDescriptor {
        ConfigDescriptor::single_interface(endpoints)
    }

    #[test]
    fn first_match_per_direction_wins() {
        let cfg = config(vec![
            EndpointDescriptor::bulk(0x81),
            EndpointDescriptor::bulk(0x02),
            EndpointDescriptor::bulk(0x83),
        ]);
        let pair = resolve(Some(&cfg)).unwrap();
        assert_eq!(pair.in_address(), 0x81);
        assert_eq!(pair.out_address(), 0x02);
    }

    #[test]
    fn non_bulk_endpoints_are_skipped() {
        let cfg = config(vec![
            EndpointDescriptor {
                address: 0x81,
                transfer_type: TransferType::Interrupt,
            },
            EndpointDescriptor {
                address: 0x01,
                transfer_type: TransferType::Isochronous,
            },
            EndpointDescriptor::bulk(0x85),
            EndpointDescriptor::bulk(0x04),
        ]);
        let pair = resolve(Some(&cfg)).unwrap();
        assert_eq!((pair.in_address(), pair.out_address()), (0x85, 0x04));
    }

    #[test]
    fn only_first_interface_is_considered() {
        let cfg = ConfigDescriptor {
            interfaces: vec![
                Interface {
                    alt_settings: vec![AltSetting {
                        endpoints: vec![EndpointDescriptor::bulk(0x81)],
                    }],
                },
                Interface {
                    alt_settings: vec![AltSetting {
                        endpoints: vec![EndpointDescriptor::bulk(0x02)],
                    }],
                },
            ],
        };
        assert_eq!(
            resolve(Some(&cfg)),
            Err(ResolveError::MissingEndpoint(Direction::Out))
        );
    }

    #[test]
    fn missing_structure_is_an_error() {
        assert_eq!(resolve(None), Err(ResolveError::NoConfiguration));
        assert_eq!(
            resolve(Some(&ConfigDescriptor::default())),
            Err(ResolveError::NoInterface)
        );

        let no_alt = ConfigDescriptor {
            interfaces: vec![Interface::default()],
        };
        assert_eq!(resolve(Some(&no_alt)), Err(ResolveError::NoAltSetting));
    }

    #[test]
    fn one_direction_only_is_an_error() {
        let only_in = config(vec![
            EndpointDescriptor::bulk(0x81),
            EndpointDescriptor::bulk(0x82),
        ]);
        assert_eq!(
            resolve(Some(&only_in)),
            Err(ResolveError::MissingEndpoint(Direction::Out))
        );

        let only_out = config(vec![EndpointDescriptor::bulk(0x01)]);
        assert_eq!(
            resolve(Some(&only_out)),
            Err(ResolveError::MissingEndpoint(Direction::In))
        );
    }
}
