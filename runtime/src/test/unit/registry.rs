use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use test_case::test_case;

use tessera_device::{Device, DeviceType};

use crate::host::platform;
use crate::{DeviceFactoryRegistry, DeviceSpec, Error, HostConfig};

#[test_case("host", "HOST", None; "bare backend")]
#[test_case("Host", "HOST", None; "mixed case")]
#[test_case("host:gpu", "HOST", Some(DeviceType::Gpu); "with type")]
#[test_case(" host : CPU ", "HOST", Some(DeviceType::Cpu); "whitespace")]
#[test_case("my_backend:accelerator", "MY_BACKEND", Some(DeviceType::Accelerator); "custom backend")]
fn parse_device_spec(text: &str, backend: &str, device_type: Option<DeviceType>) {
    let spec: DeviceSpec = text.parse().unwrap();
    assert_eq!(spec.backend, backend);
    assert_eq!(spec.device_type, device_type);
}

#[test_case(""; "empty")]
#[test_case(":gpu"; "missing backend")]
#[test_case("host:fpga"; "unknown type")]
#[test_case("ho st"; "not an identifier")]
fn reject_device_spec(text: &str) {
    let error = text.parse::<DeviceSpec>().unwrap_err();
    assert!(matches!(error, Error::InvalidDeviceSpec { .. }), "{error}");
}

#[test]
fn display_is_canonical() {
    assert_eq!(DeviceSpec::host().to_string(), "HOST");
    assert_eq!(DeviceSpec::host_of_type(DeviceType::Gpu).to_string(), "HOST:GPU");
    let reparsed: DeviceSpec = "host:gpu".parse::<DeviceSpec>().unwrap().to_string().parse().unwrap();
    assert_eq!(reparsed, DeviceSpec::host_of_type(DeviceType::Gpu));
}

#[test]
fn host_backend_is_registered() {
    let registry = DeviceFactoryRegistry::new();
    assert_eq!(registry.backends(), vec!["HOST".to_string()]);

    let gpu = registry.device(&DeviceSpec::host_of_type(DeviceType::Gpu)).unwrap();
    assert!(gpu.is_gpu());
    assert_eq!(registry.device(&DeviceSpec::host_of_type(DeviceType::Gpu)).unwrap(), gpu);
}

#[test]
fn unknown_backend_is_unsupported() {
    let registry = DeviceFactoryRegistry::new();
    let error = registry.device(&"cuda".parse().unwrap()).unwrap_err();
    assert!(matches!(error, Error::UnsupportedDevice { ref device } if device == "CUDA"), "{error}");
}

#[test]
fn custom_factory_is_called_once_per_spec() {
    let registry = DeviceFactoryRegistry::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    registry.register_factory(
        "fake",
        Arc::new(move |spec: &DeviceSpec| -> crate::Result<Device> {
            counter.fetch_add(1, Ordering::SeqCst);
            let config = HostConfig::builder().name("fake").device_type(spec.device_type.unwrap_or_default()).build();
            Ok(platform(config).devices().map_err(|source| Error::Device { source })?.remove(0))
        }),
    );
    assert_eq!(registry.backends(), vec!["FAKE".to_string(), "HOST".to_string()]);

    let spec: DeviceSpec = "FAKE:gpu".parse().unwrap();
    let first = registry.device(&spec).unwrap();
    let second = registry.device(&spec).unwrap();
    assert_eq!(first, second);
    assert!(first.name().starts_with("fake"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    registry.device(&"fake".parse().unwrap()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    registry.clear();
    registry.device(&spec).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn concurrent_lookups_share_one_device() {
    let registry = Arc::new(DeviceFactoryRegistry::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    registry.register_factory(
        "slow",
        Arc::new(move |_: &DeviceSpec| -> crate::Result<Device> {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(10));
            Ok(platform(HostConfig::default()).devices().map_err(|source| Error::Device { source })?.remove(0))
        }),
    );

    let spec: DeviceSpec = "slow".parse().unwrap();
    let devices: Vec<Device> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8).map(|_| scope.spawn(|| registry.device(&spec).unwrap())).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(devices.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
#[tracing_test::traced_test]
fn device_creation_is_logged() {
    let registry = DeviceFactoryRegistry::new();
    registry.device(&DeviceSpec::host()).unwrap();
    assert!(logs_contain("device created"));
}
