use crate::DeviceError;
use std::ffi::CString;
use std::os::raw::{c_char, c_int};

/// One flashing transaction against a concrete transport. `selector`
/// is an opaque device identifier; `payload` is transmitted as-is.
/// Implementations block until the device is programmed or the
/// transport gives up.
pub trait Programmer {
    fn program(&self, selector: &str, payload: &[u8]) -> Result<(), DeviceError>;
}

/// Raw signature of the vendor flashing routine: nul-terminated device
/// selector, payload pointer, payload length in bytes. Zero is success.
pub type RawFlashFn = unsafe extern "C" fn(*const c_char, *const u8, usize) -> c_int;

/// Adapter from the vendor routine to [`Programmer`]. How the symbol is
/// obtained (static linking, `dlopen`) is the caller's concern.
pub struct VendorProgrammer {
    flash_fn: RawFlashFn,
}

impl VendorProgrammer {
    /// # Safety
    ///
    /// `flash_fn` must be a valid vendor flashing entry point that only
    /// reads `payload_len` bytes from the payload pointer and does not
    /// retain either pointer past the call.
    pub unsafe fn from_raw(flash_fn: RawFlashFn) -> Self {
        VendorProgrammer { flash_fn }
    }
}

impl Programmer for VendorProgrammer {
    fn program(&self, selector: &str, payload: &[u8]) -> Result<(), DeviceError> {
        let selector = CString::new(selector)
            .map_err(|_| DeviceError::new(-1, "device selector contains NUL"))?;

        let code = unsafe { (self.flash_fn)(selector.as_ptr(), payload.as_ptr(), payload.len()) };
        match code {
            0 => Ok(()),
            code => Err(DeviceError::from(code)),
        }
    }
}

/// Transport that programs nothing and always succeeds. Backs the CLI
/// dry-run mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyProgrammer;

impl Programmer for DummyProgrammer {
    fn program(&self, selector: &str, payload: &[u8]) -> Result<(), DeviceError> {
        log::info!(
            "Dry run: would flash {} bytes to {:?}",
            payload.len(),
            selector
        );
        Ok(())
    }
}
