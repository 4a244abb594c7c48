use env_logger::Env;
use fwflash::{
    flash, DummyProgrammer, Error, FirmwareBundle, FlashOptions, RawFlashFn, VendorProgrammer,
    DEFAULT_TIMEOUT,
};
use main_error::MainError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use structopt::StructOpt;

/// Symbol resolved from the vendor transport library.
const FLASH_SYMBOL: &[u8] = b"fw_flash";

#[derive(StructOpt)]
struct Target {
    /// Device selector, passed through to the flashing transport
    #[structopt(short, long)]
    device: String,
    /// Flashing deadline in seconds, defaults to 60
    #[structopt(long)]
    timeout_secs: Option<u64>,
}

#[derive(StructOpt)]
struct FlashOpt {
    #[structopt(flatten)]
    target: Target,
    /// Bundle directory containing manifest.json
    #[structopt(parse(from_os_str))]
    bundle: PathBuf,
    /// Vendor transport shared library
    #[structopt(long, parse(from_os_str))]
    transport: Option<PathBuf>,
    /// Resolve and log the payload without programming the device
    #[structopt(long)]
    dry_run: bool,
}

#[derive(StructOpt)]
struct InspectOpt {
    /// Bundle directory containing manifest.json
    #[structopt(parse(from_os_str))]
    bundle: PathBuf,
}

#[derive(StructOpt)]
enum Opt {
    /// Flash the bundle's boot partition to a device
    Flash(FlashOpt),
    /// List the partitions declared by a bundle
    Inspect(InspectOpt),
}

impl Target {
    fn options(&self) -> FlashOptions {
        let timeout = self
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);
        FlashOptions::new(&self.device, timeout)
    }
}

fn load_transport(path: &Path) -> Result<VendorProgrammer, MainError> {
    let lib = unsafe { libloading::Library::new(path) }
        .map_err(|e| format!("failed to load transport library: {e}"))?;
    let flash_fn: RawFlashFn = {
        let symbol = unsafe { lib.get::<RawFlashFn>(FLASH_SYMBOL) }
            .map_err(|e| format!("transport library has no fw_flash symbol: {e}"))?;
        *symbol
    };
    // Keep the library mapped for the lifetime of the process; the raw
    // fn pointer must not outlive it.
    std::mem::forget(lib);
    Ok(unsafe { VendorProgrammer::from_raw(flash_fn) })
}

fn run_flash(opt: FlashOpt) -> Result<(), MainError> {
    let bundle = FirmwareBundle::load(&opt.bundle)?;
    log::info!("Loaded bundle {:?}", bundle.name);
    let options = opt.target.options();

    if opt.dry_run {
        flash(&bundle, &options, DummyProgrammer)?;
    } else {
        let transport = opt
            .transport
            .ok_or("no --transport library given (use --dry-run to skip programming)")?;
        flash(&bundle, &options, load_transport(&transport)?)?;
    }

    log::info!("Success");
    Ok(())
}

fn inspect(opt: InspectOpt) -> Result<(), Error> {
    let bundle = FirmwareBundle::load(&opt.bundle)?;
    log::info!(
        "Bundle {:?} version {} platform {}",
        bundle.name,
        bundle.version.as_deref().unwrap_or("-"),
        bundle.platform.as_deref().unwrap_or("-")
    );
    for part in bundle.parts() {
        log::info!("  {} ({} bytes)", part.name, part.data.len());
    }
    Ok(())
}

#[paw::main]
fn main(args: Opt) -> Result<(), MainError> {
    env_logger::Builder::from_env(Env::default().default_filter_or("fwflash=info"))
        .format_timestamp(None)
        .init();

    match args {
        Opt::Flash(opt) => run_flash(opt)?,
        Opt::Inspect(opt) => inspect(opt)?,
    };

    Ok(())
}
