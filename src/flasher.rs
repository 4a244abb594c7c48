use crate::{DeviceError, Error, FirmwareBundle, Programmer};
use sha2::{Digest, Sha256};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// The only partition this entry point ever programs.
pub const BOOT_PARTITION: &str = "boot";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct FlashOptions {
    /// Opaque device identifier, passed through to the transport.
    pub device_selector: String,
    /// Deadline for the whole flashing transaction.
    pub timeout: Duration,
}

impl FlashOptions {
    pub fn new(device_selector: impl Into<String>, timeout: Duration) -> Self {
        FlashOptions {
            device_selector: device_selector.into(),
            timeout,
        }
    }
}

/// Program the bundle's boot partition onto the selected device.
///
/// Resolves the [`BOOT_PARTITION`] payload, then hands it to the
/// programmer exactly once. The transport call runs on a worker thread
/// and is given at most `opts.timeout`; past the deadline the worker is
/// abandoned (in-flight transfers cannot be aborted) and
/// [`Error::Timeout`] is returned. On any failure the device state is
/// indeterminate and the caller must re-verify or retry.
pub fn flash<P>(bundle: &FirmwareBundle, opts: &FlashOptions, programmer: P) -> Result<(), Error>
where
    P: Programmer + Send + 'static,
{
    let payload = bundle.get_part_data(BOOT_PARTITION).map_err(|e| {
        Error::invalid_manifest(
            format!("bundle does not declare a {:?} partition", BOOT_PARTITION),
            Some(e),
        )
    })?;
    if payload.is_empty() {
        return Err(Error::invalid_manifest(
            format!("{:?} partition payload is empty", BOOT_PARTITION),
            None,
        ));
    }

    log::info!(
        "Flashing {:?} ({} bytes, sha256 {}) to {:?}",
        BOOT_PARTITION,
        payload.len(),
        hex::encode(Sha256::digest(payload)),
        opts.device_selector
    );

    let payload = payload.to_vec();
    let selector = opts.device_selector.clone();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(programmer.program(&selector, &payload));
    });

    let start = Instant::now();
    match rx.recv_timeout(opts.timeout) {
        Ok(Ok(())) => {
            log::info!("Flash done in {:?}", start.elapsed());
            Ok(())
        }
        Ok(Err(e)) => Err(Error::FlashFailed(e)),
        Err(RecvTimeoutError::Timeout) => Err(Error::Timeout),
        // The worker dropped the sender without reporting, i.e. the
        // transport panicked mid-call.
        Err(RecvTimeoutError::Disconnected) => Err(Error::FlashFailed(DeviceError::new(
            -1,
            "flashing transport aborted",
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MockProgrammer {
        calls: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
        result_code: i32,
        delay: Option<Duration>,
    }

    impl MockProgrammer {
        fn failing(code: i32) -> Self {
            MockProgrammer {
                result_code: code,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<(String, Vec<u8>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Programmer for MockProgrammer {
        fn program(&self, selector: &str, payload: &[u8]) -> Result<(), DeviceError> {
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            self.calls
                .lock()
                .unwrap()
                .push((selector.to_string(), payload.to_vec()));
            match self.result_code {
                0 => Ok(()),
                code => Err(DeviceError::from(code)),
            }
        }
    }

    fn bundle_with_boot(payload: &[u8]) -> FirmwareBundle {
        let mut bundle = FirmwareBundle::new("fw");
        bundle.insert_part(BOOT_PARTITION, payload.to_vec());
        bundle
    }

    fn opts() -> FlashOptions {
        FlashOptions::new("/dev/ttyUSB0", Duration::from_secs(5))
    }

    #[test]
    fn boot_payload_reaches_the_device_untouched() {
        let bundle = bundle_with_boot(&[0x01, 0x02, 0x03]);
        let programmer = MockProgrammer::default();

        flash(&bundle, &opts(), programmer.clone()).unwrap();

        assert_eq!(
            programmer.calls(),
            vec![("/dev/ttyUSB0".to_string(), vec![0x01, 0x02, 0x03])]
        );
    }

    #[test]
    fn missing_boot_partition_never_touches_the_device() {
        let bundle = FirmwareBundle::new("fw");
        let programmer = MockProgrammer::default();

        let err = flash(&bundle, &opts(), programmer.clone()).unwrap_err();
        match err {
            Error::InvalidManifest { source, .. } => {
                assert!(matches!(
                    source.as_deref(),
                    Some(Error::PartitionNotFound(name)) if name.as_str() == BOOT_PARTITION
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(programmer.calls().is_empty());
    }

    #[test]
    fn empty_boot_partition_never_touches_the_device() {
        let bundle = bundle_with_boot(&[]);
        let programmer = MockProgrammer::default();

        let err = flash(&bundle, &opts(), programmer.clone()).unwrap_err();
        assert!(matches!(err, Error::InvalidManifest { source: None, .. }));
        assert!(programmer.calls().is_empty());
    }

    #[test]
    fn nonzero_device_code_maps_to_flash_failed() {
        let bundle = bundle_with_boot(&[0xaa]);
        let programmer = MockProgrammer::failing(1);

        let err = flash(&bundle, &opts(), programmer.clone()).unwrap_err();
        match err {
            Error::FlashFailed(device) => assert_eq!(device.code, 1),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(programmer.calls().len(), 1);
    }

    #[test]
    fn sequential_calls_are_independent_transactions() {
        let bundle = bundle_with_boot(&[0x42]);
        let programmer = MockProgrammer::default();

        flash(&bundle, &opts(), programmer.clone()).unwrap();
        flash(&bundle, &opts(), programmer.clone()).unwrap();

        assert_eq!(programmer.calls().len(), 2);
    }

    #[test]
    fn slow_transport_hits_the_deadline() {
        let bundle = bundle_with_boot(&[0x01]);
        let programmer = MockProgrammer {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        };
        let opts = FlashOptions::new("usb:1-4", Duration::from_millis(20));

        assert!(matches!(
            flash(&bundle, &opts, programmer),
            Err(Error::Timeout)
        ));
    }

    #[test]
    fn panicking_transport_maps_to_flash_failed() {
        struct PanickingProgrammer;
        impl Programmer for PanickingProgrammer {
            fn program(&self, _: &str, _: &[u8]) -> Result<(), DeviceError> {
                panic!("transport blew up");
            }
        }

        let bundle = bundle_with_boot(&[0x01]);
        assert!(matches!(
            flash(&bundle, &opts(), PanickingProgrammer),
            Err(Error::FlashFailed(_))
        ));
    }
}
