/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Builder;
use log::{LevelFilter, error, info, warn};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use strum_macros::AsRefStr;
use suota::connection::backend::{BlePort, find_peripheral};
use suota::core::config::DEFAULT_BLOCK_SIZE;
use suota::core::memory::{Gpio, MemorySettings, MemoryTarget};
use suota::core::store::{DirStore, FirmwareStore};
use suota::core::utilities::{parse_number, xor_checksum};
use suota::{Device, DeviceInfo, Error, ProgressSink, Result, UpdateConfig, Variant};

#[derive(Debug, Parser)]
#[command(name = "suota-cli", version, about = "Firmware update over Bluetooth LE (SUOTA / SPOTA)")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the images in a firmware directory
    List {
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
    /// Send an image to a device
    Update(UpdateArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum, AsRefStr)]
enum Memory {
    #[strum(serialize = "SPI flash")]
    Spi,
    #[strum(serialize = "I2C EEPROM")]
    I2c,
    #[strum(serialize = "System RAM")]
    SystemRam,
    #[strum(serialize = "Retention RAM")]
    RetentionRam,
}

#[derive(Debug, Args)]
struct UpdateArgs {
    /// Advertised name of the device
    #[arg(short, long)]
    name: String,
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,
    /// Image file name inside the firmware directory
    #[arg(short, long)]
    image: String,
    /// Use the older SPOTA procedure
    #[arg(long)]
    spota: bool,
    #[arg(long, value_enum, default_value_t = Memory::Spi)]
    memory: Memory,
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,
    #[arg(long, value_parser = number, default_value = "0")]
    image_bank: u32,
    /// SPOTA patch base address in external memory
    #[arg(long, value_parser = number, default_value = "0")]
    patch_base: u32,
    #[arg(long, value_parser = number, default_value = "0x50")]
    i2c_address: u32,
    #[arg(long)]
    miso: Option<Gpio>,
    #[arg(long)]
    mosi: Option<Gpio>,
    #[arg(long)]
    cs: Option<Gpio>,
    #[arg(long)]
    sck: Option<Gpio>,
    #[arg(long)]
    scl: Option<Gpio>,
    #[arg(long)]
    sda: Option<Gpio>,
    /// Ask the device to reboot into the new image
    #[arg(long)]
    reboot: bool,
    /// Read the MTU characteristic again after an MTU change
    #[arg(long)]
    mtu_reread: bool,
    /// Seconds to wait for any single answer from the device
    #[arg(long, default_value_t = 30)]
    timeout: u64,
    /// Seconds to scan for the device
    #[arg(long, default_value_t = 10)]
    scan: u64,
}

fn number(s: &str) -> std::result::Result<u32, String> {
    parse_number(s).map_err(|e| e.to_string())
}

impl UpdateArgs {
    fn variant(&self) -> Variant {
        if self.spota { Variant::Spota } else { Variant::Suota }
    }

    fn memory_settings(&self) -> Result<MemorySettings> {
        let target = match self.memory {
            Memory::SystemRam => MemoryTarget::SystemRam,
            Memory::RetentionRam => MemoryTarget::RetentionRam,
            Memory::Spi => match MemoryTarget::DEFAULT_SPI {
                MemoryTarget::Spi { miso, mosi, cs, sck } => MemoryTarget::Spi {
                    miso: self.miso.unwrap_or(miso),
                    mosi: self.mosi.unwrap_or(mosi),
                    cs: self.cs.unwrap_or(cs),
                    sck: self.sck.unwrap_or(sck),
                },
                other => other,
            },
            Memory::I2c => match MemoryTarget::DEFAULT_I2C {
                MemoryTarget::I2c { scl, sda, .. } => MemoryTarget::I2c {
                    address: self.i2c_address,
                    scl: self.scl.unwrap_or(scl),
                    sda: self.sda.unwrap_or(sda),
                },
                other => other,
            },
        };
        let image_bank = u8::try_from(self.image_bank).map_err(|_| {
            Error::Validation(format!("image bank {} out of range", self.image_bank))
        })?;

        Ok(MemorySettings {
            target,
            image_bank,
            patch_base_address: self.patch_base,
        })
    }

    fn config(&self) -> Result<UpdateConfig> {
        Ok(UpdateConfig {
            variant: self.variant(),
            block_size: self.block_size,
            memory: self.memory_settings()?,
            reboot_on_success: self.reboot,
            mtu_reread_workaround: self.mtu_reread,
            operation_timeout: Duration::from_secs(self.timeout),
        })
    }
}

/// Prints progress on one line and device information as it arrives.
#[derive(Default)]
struct ConsoleSink {
    last_percent: Option<u8>,
}

impl ProgressSink for ConsoleSink {
    fn progress(&mut self, percent: u8, chunk: usize, total: usize) {
        if self.last_percent == Some(percent) {
            return;
        }
        self.last_percent = Some(percent);
        print!("\rProgress: {:>3}% ({}/{})", percent, chunk, total);
        if percent == 100 {
            println!();
        }
        let _ = std::io::stdout().flush();
    }

    fn log(&mut self, line: &str) {
        info!("{}", line);
    }

    fn device_info(&mut self, info: &DeviceInfo) {
        let unknown = || "unknown".to_string();
        println!("Manufacturer:      {}", info.manufacturer.clone().unwrap_or_else(unknown));
        println!("Model number:      {}", info.model_number.clone().unwrap_or_else(unknown));
        println!("Firmware revision: {}", info.firmware_revision.clone().unwrap_or_else(unknown));
        println!("Software revision: {}", info.software_revision.clone().unwrap_or_else(unknown));
        if let Some(version) = info.suota_version {
            println!("SUOTA version:     {}", version);
        }
        if let Some(size) = info.patch_data_size {
            println!("Patch data size:   {}", size);
        }
        if let Some(mtu) = info.mtu {
            println!("MTU:               {}", mtu);
        }
        if let Some(psm) = info.l2cap_psm {
            println!("L2CAP PSM:         {:#06x}", psm);
        }
    }
}

fn list(dir: PathBuf) -> Result<()> {
    let store = DirStore::new(dir);
    let names = store.list()?;
    if names.is_empty() {
        println!("No images in {}", store.root().display());
        return Ok(());
    }
    for name in names {
        let data = store.open(&name)?;
        let digest = Sha256::digest(&data);
        println!(
            "{:<32} {:>8} bytes  crc {:#04x}  sha256 {}",
            name,
            data.len(),
            xor_checksum(&data),
            hex::encode(digest)
        );
    }
    Ok(())
}

async fn update(args: UpdateArgs) -> Result<()> {
    let config = args.config()?;
    let store = DirStore::new(&args.dir);
    let image = store.load(&args.image, config.variant)?;
    // Reject bad parameters before scanning
    config.validate(&image)?;

    info!(
        "{} update of {} ({} bytes, sha256 {}) to {} in {}",
        config.variant,
        args.image,
        image.original_len(),
        hex::encode(image.sha256()),
        args.name,
        args.memory.as_ref()
    );

    let peripheral = find_peripheral(&args.name, Duration::from_secs(args.scan)).await?;
    let port = BlePort::connect(peripheral).await?;
    let mut device = Device::init(Box::new(port)).await?;

    let abort = device.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, aborting update");
            abort.abort();
        }
    });

    let mut sink = ConsoleSink::default();
    let result = device.update(image, config, &mut sink).await;
    device.close().await?;
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::List { dir } => list(dir),
        Command::Update(args) => update(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.code() {
                Some(code) => error!("{} [{:#06x}]", e, code),
                None => error!("{}", e),
            }
            ExitCode::FAILURE
        }
    }
}
