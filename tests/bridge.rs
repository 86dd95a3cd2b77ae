use aoa_bridge::bridge::Bridge;
use aoa_bridge::config::{BridgeConfig, StringPolicy};
use aoa_bridge::delay::{CancelToken, Delay, NoDelay, ThreadDelay};
use aoa_bridge::device_ids::UsbId;
use aoa_bridge::endpoints::ResolveError;
use aoa_bridge::handshake::HandshakeError;
use aoa_bridge::identity::AccessoryIdentity;
use aoa_bridge::mock::{MockBackend, MockDevice, MockEvent};
use aoa_bridge::protocol::{Error, Status};
use aoa_bridge::transport::{ConfigDescriptor, Direction, EndpointDescriptor};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PHONE: UsbId = UsbId {
    vid: 0x04e8,
    pid: 0x6860,
};

const KEYBOARD: UsbId = UsbId {
    vid: 0x046d,
    pid: 0xc31c,
};

const TIMEOUT: Duration = Duration::from_millis(100);

fn bridge(backend: &MockBackend) -> Bridge<MockBackend> {
    Bridge::new(backend.clone(), BridgeConfig::default()).with_delay(NoDelay)
}

fn identity() -> AccessoryIdentity {
    AccessoryIdentity::new(
        Some("ACME"),
        Some("Widget"),
        Some("A test accessory"),
        Some("1.0"),
        Some("https://example.com/widget"),
        Some("0001"),
    )
}

fn assert_nothing_held(backend: &MockBackend) {
    assert_eq!(backend.open_handles(), 0, "handles left open");
    assert_eq!(backend.claimed_interfaces(), 0, "interfaces left claimed");
    assert_eq!(backend.live_contexts(), 0, "contexts left alive");
}

#[test]
fn accessory_is_used_directly() {
    let backend = MockBackend::new();
    backend.add_device(MockDevice::accessory());

    let mut bridge = bridge(&backend);
    bridge.initialize(identity()).unwrap();

    assert!(bridge.is_connected());
    let endpoints = bridge.endpoints().unwrap();
    assert_eq!(endpoints.in_address(), 0x81);
    assert_eq!(endpoints.out_address(), 0x02);

    assert!(backend.sent_strings().is_empty());
    assert_eq!(backend.start_requests(), 0);
    assert_eq!(backend.open_handles(), 1);
    assert_eq!(backend.claimed_interfaces(), 1);
}

#[test]
fn candidate_goes_through_full_handshake() {
    let backend = MockBackend::new();
    let phone = backend.add_device(MockDevice::candidate(PHONE, 2));

    let mut bridge = bridge(&backend);
    bridge.initialize(identity()).unwrap();
    assert!(bridge.is_connected());

    let strings = backend.sent_strings();
    let indices: Vec<u16> = strings.iter().map(|(index, _)| *index).collect();
    assert_eq!(indices, [0, 1, 2, 3, 4, 5]);
    assert_eq!(strings[0].1, b"ACME\0");
    assert_eq!(strings[1].1, b"Widget\0");
    assert_eq!(strings[4].1, b"https://example.com/widget\0");
    assert_eq!(strings[5].1, b"0001\0");

    assert_eq!(backend.start_requests(), 1);
    assert_eq!(backend.device_id(phone).pid, 0x2d00);

    // The candidate handle was closed before the accessory was opened again.
    let events = backend.events();
    let first_close = events
        .iter()
        .position(|e| *e == MockEvent::Closed(phone))
        .unwrap();
    let last_open = events
        .iter()
        .rposition(|e| *e == MockEvent::Opened(phone))
        .unwrap();
    assert!(first_close < last_open);

    assert_eq!(backend.open_handles(), 1);
    assert_eq!(backend.claimed_interfaces(), 1);
}

#[test]
fn absent_identity_fields_are_sent_empty() {
    let backend = MockBackend::new();
    backend.add_device(MockDevice::candidate(PHONE, 1));

    let mut bridge = bridge(&backend);
    let identity = AccessoryIdentity::new(Some("ACME"), None, None, None, None, None);
    bridge.initialize(identity).unwrap();

    let strings = backend.sent_strings();
    assert_eq!(strings.len(), 6);
    assert_eq!(strings[0].1, b"ACME\0");
    assert!(strings[1..].iter().all(|(_, payload)| payload == b"\0"));
}

#[test]
fn long_identity_field_is_truncated_on_the_wire() {
    let backend = MockBackend::new();
    backend.add_device(MockDevice::candidate(PHONE, 2));

    let long = "m".repeat(1200);
    let mut bridge = bridge(&backend);
    bridge
        .initialize(AccessoryIdentity::new(Some(&long), None, None, None, None, None))
        .unwrap();

    let payload = &backend.sent_strings()[0].1;
    assert_eq!(payload.len(), 1000);
    assert_eq!(payload[999], 0);
}

#[test]
fn devices_without_aoa_are_released_and_skipped() {
    let backend = MockBackend::new();
    let keyboard = backend.add_device(MockDevice::unsupported(KEYBOARD));
    let old_phone = backend.add_device(MockDevice::candidate(PHONE, 0));
    let phone = backend.add_device(MockDevice::candidate(PHONE, 2));

    let mut bridge = bridge(&backend);
    bridge.initialize(identity()).unwrap();

    let events = backend.events();
    for skipped in [keyboard, old_phone] {
        assert!(events.contains(&MockEvent::Released(skipped, 0)));
        assert!(events.contains(&MockEvent::Closed(skipped)));
    }
    let control_targets: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            MockEvent::ControlOut { device, .. } => Some(*device),
            _ => None,
        })
        .collect();
    assert_eq!(control_targets.len(), 7);
    assert!(control_targets.iter().all(|&device| device == phone));
    assert_eq!(backend.device_id(keyboard), KEYBOARD);
}

#[test]
fn accessory_that_fails_to_open_is_skipped() {
    let backend = MockBackend::new();
    let mut broken = MockDevice::accessory();
    broken.open_error = Some(rusb::Error::Access);
    backend.add_device(broken);
    let good = backend.add_device(MockDevice::accessory());

    let mut bridge = bridge(&backend);
    bridge.initialize(identity()).unwrap();

    assert!(backend.events().contains(&MockEvent::Opened(good)));
    assert_eq!(backend.open_handles(), 1);
}

#[test]
fn no_device_fails_and_cleans_up() {
    let backend = MockBackend::new();
    backend.add_device(MockDevice::unsupported(KEYBOARD));

    let mut bridge = bridge(&backend);
    let result = bridge.initialize(identity());

    assert_eq!(Status::of(&result), Status::SystemError);
    assert!(matches!(
        result,
        Err(Error::HandshakeError(HandshakeError::NoDevice))
    ));
    assert!(!bridge.is_connected());
    assert_nothing_held(&backend);
}

#[test]
fn failed_start_closes_candidate() {
    let backend = MockBackend::new();
    let mut phone = MockDevice::candidate(PHONE, 2);
    phone.start_error = Some(rusb::Error::Pipe);
    backend.add_device(phone);

    let mut bridge = bridge(&backend);
    let result = bridge.initialize(identity());

    assert!(matches!(
        result,
        Err(Error::HandshakeError(HandshakeError::StartFailed { .. }))
    ));
    assert_eq!(backend.sent_strings().len(), 6);
    assert_nothing_held(&backend);
}

#[test]
fn device_that_never_reenumerates_fails() {
    let backend = MockBackend::new();
    let mut phone = MockDevice::candidate(PHONE, 2);
    phone.reenumerate_as = None;
    backend.add_device(phone);

    let mut bridge = bridge(&backend);
    let result = bridge.initialize(identity());

    assert!(matches!(
        result,
        Err(Error::HandshakeError(HandshakeError::NotReEnumerated))
    ));
    assert_eq!(backend.start_requests(), 1);
    assert_nothing_held(&backend);
}

#[test]
fn rejected_strings_are_ignored_by_default() {
    let backend = MockBackend::new();
    let mut phone = MockDevice::candidate(PHONE, 2);
    phone.string_error = Some(rusb::Error::Pipe);
    backend.add_device(phone);

    let mut bridge = bridge(&backend);
    bridge.initialize(identity()).unwrap();

    assert_eq!(backend.sent_strings().len(), 6);
    assert_eq!(backend.start_requests(), 1);
    assert!(bridge.is_connected());
}

#[test]
fn strict_policy_stops_at_first_rejected_string() {
    let backend = MockBackend::new();
    let mut phone = MockDevice::candidate(PHONE, 2);
    phone.string_error = Some(rusb::Error::Pipe);
    backend.add_device(phone);

    let config = BridgeConfig::default().string_policy(StringPolicy::AbortOnFailure);
    let mut bridge = Bridge::new(backend.clone(), config).with_delay(NoDelay);
    let result = bridge.initialize(identity());

    assert!(matches!(
        result,
        Err(Error::HandshakeError(HandshakeError::StringRejected { .. }))
    ));
    assert_eq!(backend.sent_strings().len(), 1);
    assert_eq!(backend.start_requests(), 0);
    assert_nothing_held(&backend);
}

#[test]
fn accessory_without_out_endpoint_fails_to_resolve() {
    let backend = MockBackend::new();
    let mut accessory = MockDevice::accessory();
    accessory.config = Some(ConfigDescriptor::single_interface(vec![
        EndpointDescriptor::bulk(0x81),
    ]));
    backend.add_device(accessory);

    let mut bridge = bridge(&backend);
    let result = bridge.initialize(identity());

    assert!(matches!(
        result,
        Err(Error::ResolveError(ResolveError::MissingEndpoint(
            Direction::Out
        )))
    ));
    assert_eq!(Status::of(&result), Status::SystemError);
    assert_nothing_held(&backend);
}

#[test]
fn accessory_that_cannot_be_claimed_fails() {
    let backend = MockBackend::new();
    let mut accessory = MockDevice::accessory();
    accessory.claim_error = Some(rusb::Error::Busy);
    backend.add_device(accessory);

    let mut bridge = bridge(&backend);
    let result = bridge.initialize(identity());

    assert!(matches!(result, Err(Error::DeviceIoError { .. })));
    assert_nothing_held(&backend);
}

#[test]
fn context_creation_failure_is_a_system_error() {
    let backend = MockBackend::new();
    backend.fail_context(rusb::Error::NoMem);

    let mut bridge = bridge(&backend);
    let result = bridge.initialize(identity());

    assert_eq!(Status::of(&result), Status::SystemError);
    assert_nothing_held(&backend);
}

#[test]
fn enumeration_failure_is_a_system_error() {
    let backend = MockBackend::new();
    backend.fail_enumerate(rusb::Error::Io);

    let mut bridge = bridge(&backend);
    let result = bridge.initialize(identity());

    assert_eq!(Status::of(&result), Status::SystemError);
    assert_nothing_held(&backend);
}

#[test]
fn read_and_write_need_a_session() {
    let backend = MockBackend::new();
    backend.add_device(MockDevice::accessory());

    let mut bridge = bridge(&backend);
    let mut buf = [0u8; 16];
    assert!(matches!(bridge.read(&mut buf, TIMEOUT), Err(Error::NoDevice)));
    assert!(matches!(bridge.write(b"hi", TIMEOUT), Err(Error::NoDevice)));

    bridge.initialize(identity()).unwrap();
    bridge.deinitialize();

    assert_eq!(Status::of(&bridge.read(&mut buf, TIMEOUT)), Status::NoDevice);
    assert_eq!(Status::of(&bridge.write(b"hi", TIMEOUT)), Status::NoDevice);
}

#[test]
fn deinitialize_is_idempotent() {
    let backend = MockBackend::new();
    backend.add_device(MockDevice::accessory());

    let mut bridge = bridge(&backend);
    bridge.deinitialize();
    bridge.deinitialize();
    assert!(!bridge.is_connected());

    bridge.initialize(identity()).unwrap();
    bridge.deinitialize();
    assert_nothing_held(&backend);
    bridge.deinitialize();
    assert_nothing_held(&backend);
    assert!(bridge.endpoints().is_none());
}

#[test]
fn dropping_bridge_releases_everything() {
    let backend = MockBackend::new();
    backend.add_device(MockDevice::accessory());

    {
        let mut bridge = bridge(&backend);
        bridge.initialize(identity()).unwrap();
        assert_eq!(backend.live_contexts(), 1);
    }

    assert_nothing_held(&backend);
}

#[test]
fn reinitialize_replaces_previous_session() {
    let backend = MockBackend::new();
    backend.add_device(MockDevice::accessory());

    let mut bridge = bridge(&backend);
    bridge.initialize(identity()).unwrap();
    bridge.initialize(AccessoryIdentity::default()).unwrap();

    assert_eq!(backend.open_handles(), 1);
    assert_eq!(backend.claimed_interfaces(), 1);
    assert_eq!(backend.live_contexts(), 1);
    assert_eq!(bridge.identity(), &AccessoryIdentity::default());
}

#[test]
fn transfers_use_resolved_endpoints() {
    let backend = MockBackend::new();
    let mut accessory = MockDevice::accessory();
    accessory.reads.push_back(Ok(b"pong".to_vec()));
    let index = backend.add_device(accessory);

    let mut bridge = bridge(&backend);
    bridge.initialize(identity()).unwrap();

    assert_eq!(bridge.write(b"ping", TIMEOUT).unwrap(), 4);
    let mut buf = [0u8; 64];
    let len = bridge.read(&mut buf, TIMEOUT).unwrap();
    assert_eq!(&buf[..len], b"pong");

    let events = backend.events();
    assert!(events.contains(&MockEvent::BulkOut {
        device: index,
        endpoint: 0x02,
        data: b"ping".to_vec(),
    }));
    assert!(events.contains(&MockEvent::BulkIn {
        device: index,
        endpoint: 0x81,
        capacity: 64,
    }));
}

#[test]
fn short_read_reports_actual_length() {
    let backend = MockBackend::new();
    let mut accessory = MockDevice::accessory();
    accessory.reads.push_back(Ok(vec![1, 2, 3]));
    backend.add_device(accessory);

    let mut bridge = bridge(&backend);
    bridge.initialize(identity()).unwrap();

    let mut buf = [0u8; 512];
    assert_eq!(bridge.read(&mut buf, TIMEOUT).unwrap(), 3);
}

#[test]
fn provider_timeouts_surface_as_timeouts() {
    let backend = MockBackend::new();
    let index = backend.add_device(MockDevice::accessory());

    let mut bridge = bridge(&backend);
    bridge.initialize(identity()).unwrap();

    // No queued data, so the mock times out.
    let mut buf = [0u8; 8];
    assert_eq!(Status::of(&bridge.read(&mut buf, TIMEOUT)), Status::Timeout);

    backend.update_device(index, |d| d.write_error = Some(rusb::Error::Timeout));
    assert_eq!(Status::of(&bridge.write(b"x", TIMEOUT)), Status::Timeout);
}

#[test]
fn failed_write_is_still_recorded() {
    let backend = MockBackend::new();
    let index = backend.add_device(MockDevice::accessory());

    let mut bridge = bridge(&backend);
    bridge.initialize(identity()).unwrap();

    backend.update_device(index, |d| d.write_error = Some(rusb::Error::Timeout));
    assert!(bridge.write(b"lost", TIMEOUT).is_err());
    assert!(backend.events().contains(&MockEvent::BulkOut {
        device: index,
        endpoint: 0x02,
        data: b"lost".to_vec(),
    }));
}

#[test]
fn candidate_that_fails_to_open_does_not_stop_connect() {
    let backend = MockBackend::new();
    let mut broken = MockDevice::candidate(PHONE, 2);
    broken.open_error = Some(rusb::Error::Access);
    backend.add_device(broken);
    let phone = backend.add_device(MockDevice::candidate(PHONE, 2));

    let mut bridge = bridge(&backend);
    bridge.initialize(identity()).unwrap();

    assert!(bridge.is_connected());
    assert_eq!(backend.sent_strings().len(), 6);
    assert_eq!(backend.device_id(phone).pid, 0x2d00);
}

#[test]
fn other_provider_errors_are_system_errors() {
    let backend = MockBackend::new();
    let index = backend.add_device(MockDevice::accessory());

    let mut bridge = bridge(&backend);
    bridge.initialize(identity()).unwrap();

    backend.update_device(index, |d| {
        d.reads.push_back(Err(rusb::Error::NoDevice));
        d.write_error = Some(rusb::Error::Pipe);
    });

    let mut buf = [0u8; 8];
    assert_eq!(Status::of(&bridge.read(&mut buf, TIMEOUT)), Status::SystemError);
    assert_eq!(Status::of(&bridge.write(b"x", TIMEOUT)), Status::SystemError);
}

#[derive(Clone, Default)]
struct RecordingDelay(Arc<Mutex<Vec<Duration>>>);

impl Delay for RecordingDelay {
    fn wait(&self, duration: Duration) -> Result<(), Error> {
        self.0.lock().unwrap().push(duration);
        Ok(())
    }
}

#[test]
fn handshake_waits_use_configured_delays() {
    let backend = MockBackend::new();
    backend.add_device(MockDevice::candidate(PHONE, 2));

    let delay = RecordingDelay::default();
    let config = BridgeConfig::default()
        .settle_delay(Duration::from_millis(7))
        .reenumeration_delay(Duration::from_millis(1500));
    let mut bridge = Bridge::new(backend.clone(), config).with_delay(delay.clone());
    bridge.initialize(identity()).unwrap();

    assert_eq!(
        *delay.0.lock().unwrap(),
        [Duration::from_millis(7), Duration::from_millis(1500)]
    );
}

#[test]
fn direct_connection_does_not_wait() {
    let backend = MockBackend::new();
    backend.add_device(MockDevice::accessory());

    let delay = RecordingDelay::default();
    let mut bridge =
        Bridge::new(backend.clone(), BridgeConfig::default()).with_delay(delay.clone());
    bridge.initialize(identity()).unwrap();

    assert!(delay.0.lock().unwrap().is_empty());
}

#[test]
fn cancelled_wait_aborts_handshake() {
    let backend = MockBackend::new();
    backend.add_device(MockDevice::candidate(PHONE, 2));

    let token = CancelToken::new();
    token.cancel();
    let mut bridge = Bridge::new(backend.clone(), BridgeConfig::default())
        .with_delay(ThreadDelay::new(token));
    let result = bridge.initialize(identity());

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(backend.sent_strings().is_empty());
    assert_nothing_held(&backend);
}
