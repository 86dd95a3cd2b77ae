/// Recognize devices that are already in accessory mode based on USB IDs.
pub mod device_ids;

/// Identity strings an accessory announces to the device.
pub mod identity;

/// Send Android Open Accessory vendor requests, and the errors that can result.
pub mod protocol;

/// Traits a USB provider implements, and the descriptor types they share.
pub mod transport;

/// [transport] implementation backed by libusb.
pub mod libusb;

/// [transport] implementation that simulates devices in memory.
pub mod mock;

/// Find accessory-mode devices and devices that can be switched into accessory mode.
pub mod locator;

/// Find the bulk endpoints of an accessory.
pub mod endpoints;

/// Timings and policies for connecting to an accessory.
pub mod config;

/// Waits between handshake steps, optionally cancellable from another thread.
pub mod delay;

/// Switch a device into accessory mode.
pub mod handshake;

/// Bulk transfers over a claimed accessory interface.
pub mod session;

/// Connect to an accessory and exchange data with it.
pub mod bridge;
