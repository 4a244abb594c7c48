mod bundle;
mod error;
mod flasher;
mod programmer;

pub use bundle::{FirmwareBundle, FirmwarePart};
pub use error::{DeviceError, Error};
pub use flasher::{flash, FlashOptions, BOOT_PARTITION, DEFAULT_TIMEOUT};
pub use programmer::{DummyProgrammer, Programmer, RawFlashFn, VendorProgrammer};
