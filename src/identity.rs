use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt::Display;

/// Longest string, in bytes and excluding the NUL terminator, that we send for any identity field.
pub const MAX_FIELD_LEN: usize = 999;

/// The string kinds an accessory announces, in the order they are sent. The discriminant is the
/// `wIndex` of the matching SEND_STRING request.
#[repr(u16)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
pub enum StringKind {
    Manufacturer = 0,
    Model = 1,
    Description = 2,
    Version = 3,
    Uri = 4,
    Serial = 5,
}

impl StringKind {
    pub const ALL: [StringKind; 6] = [
        StringKind::Manufacturer,
        StringKind::Model,
        StringKind::Description,
        StringKind::Version,
        StringKind::Uri,
        StringKind::Serial,
    ];
}

impl Display for StringKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            StringKind::Manufacturer => "manufacturer",
            StringKind::Model => "model",
            StringKind::Description => "description",
            StringKind::Version => "version",
            StringKind::Uri => "URI",
            StringKind::Serial => "serial",
        };
        f.write_str(name)
    }
}

/// A string of at most [MAX_FIELD_LEN] bytes containing no NUL.
///
/// Longer input is cut at the last character boundary that fits, and anything after an embedded
/// NUL is dropped since the device would stop reading there anyway.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoundedString(String);

impl BoundedString {
    pub fn new(value: &str) -> Self {
        let value = value.split('\0').next().unwrap_or_default();
        if value.len() <= MAX_FIELD_LEN {
            return Self(value.to_owned());
        }

        let mut end = MAX_FIELD_LEN;
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        Self(value[..end].to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The bytes sent on the wire: the string followed by a single NUL.
    pub fn to_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.0.len() + 1);
        payload.extend_from_slice(self.0.as_bytes());
        payload.push(0);
        payload
    }
}

impl From<&str> for BoundedString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Display for BoundedString {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strings identifying us to the device. Android uses them to pick (or offer to install) the app
/// that handles this accessory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessoryIdentity {
    manufacturer: BoundedString,
    model: BoundedString,
    description: BoundedString,
    version: BoundedString,
    uri: BoundedString,
    serial: BoundedString,
}

impl AccessoryIdentity {
    /// Build an identity from optional fields. Missing fields are sent as empty strings.
    pub fn new(
        manufacturer: Option<&str>,
        model: Option<&str>,
        description: Option<&str>,
        version: Option<&str>,
        uri: Option<&str>,
        serial: Option<&str>,
    ) -> Self {
        let field = |value: Option<&str>| value.map(BoundedString::new).unwrap_or_default();
        Self {
            manufacturer: field(manufacturer),
            model: field(model),
            description: field(description),
            version: field(version),
            uri: field(uri),
            serial: field(serial),
        }
    }

    pub fn field(&self, kind: StringKind) -> &BoundedString {
        match kind {
            StringKind::Manufacturer => &self.manufacturer,
            StringKind::Model => &self.model,
            StringKind::Description => &self.description,
            StringKind::Version => &self.version,
            StringKind::Uri => &self.uri,
            StringKind::Serial => &self.serial,
        }
    }

    /// All fields in SEND_STRING order.
    pub fn fields(&self) -> impl Iterator<Item = (StringKind, &BoundedString)> {
        StringKind::ALL.into_iter().map(|kind| (kind, self.field(kind)))
    }
}
