/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::error::{Error, Result};
use crate::fota::Variant;
use std::fmt;
use std::str::FromStr;

/// A pin as `P<port>_<pin>`, sent to the device as `(port << 4) | pin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gpio {
    pub port: u8,
    pub pin: u8,
}

impl Gpio {
    pub const fn new(port: u8, pin: u8) -> Self {
        Gpio { port, pin }
    }

    pub fn code(&self) -> u8 {
        ((self.port & 0x0F) << 4) | (self.pin & 0x0F)
    }
}

impl fmt::Display for Gpio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}_{}", self.port, self.pin)
    }
}

impl FromStr for Gpio {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid =
            || Error::Validation(format!("'{}' is not a GPIO (expected P<port>_<pin>)", s));

        let rest = s.trim().strip_prefix(['P', 'p']).ok_or_else(invalid)?;
        let (port, pin) = rest.split_once('_').ok_or_else(invalid)?;
        let digits = |v: &str| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit());
        if !digits(port) || !digits(pin) {
            return Err(invalid());
        }

        let port: u8 = port.parse().map_err(|_| invalid())?;
        let pin: u8 = pin.parse().map_err(|_| invalid())?;
        if port > 0x0F || pin > 0x0F {
            return Err(invalid());
        }
        Ok(Gpio { port, pin })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryTarget {
    SystemRam,
    RetentionRam,
    Spi {
        miso: Gpio,
        mosi: Gpio,
        cs: Gpio,
        sck: Gpio,
    },
    I2c {
        address: u32,
        scl: Gpio,
        sda: Gpio,
    },
}

impl MemoryTarget {
    pub const DEFAULT_SPI: MemoryTarget = MemoryTarget::Spi {
        miso: Gpio::new(0, 5),
        mosi: Gpio::new(0, 6),
        cs: Gpio::new(0, 3),
        sck: Gpio::new(0, 0),
    };

    pub const DEFAULT_I2C: MemoryTarget = MemoryTarget::I2c {
        address: 0x50,
        scl: Gpio::new(0, 2),
        sda: Gpio::new(0, 3),
    };

    /// Memory type code, the high byte of the memory-device register.
    /// The two variants use different codes for external memories.
    pub fn type_code(&self, variant: Variant) -> u8 {
        match (self, variant) {
            (MemoryTarget::SystemRam, _) => 0x00,
            (MemoryTarget::RetentionRam, _) => 0x01,
            (MemoryTarget::I2c { .. }, Variant::Suota) => 0x12,
            (MemoryTarget::Spi { .. }, Variant::Suota) => 0x13,
            (MemoryTarget::I2c { .. }, Variant::Spota) => 0x02,
            (MemoryTarget::Spi { .. }, Variant::Spota) => 0x03,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, MemoryTarget::Spi { .. } | MemoryTarget::I2c { .. })
    }

    /// GPIO-map register value. RAM targets have no pins to map.
    pub fn gpio_map_value(&self) -> Option<u32> {
        match *self {
            MemoryTarget::Spi { miso, mosi, cs, sck } => Some(
                (miso.code() as u32) << 24
                    | (mosi.code() as u32) << 16
                    | (cs.code() as u32) << 8
                    | sck.code() as u32,
            ),
            MemoryTarget::I2c { address, scl, sda } => {
                Some((address & 0xFFFF) << 16 | (scl.code() as u32) << 8 | sda.code() as u32)
            }
            MemoryTarget::SystemRam | MemoryTarget::RetentionRam => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MemoryTarget::SystemRam => "System RAM",
            MemoryTarget::RetentionRam => "Retention RAM",
            MemoryTarget::Spi { .. } => "SPI",
            MemoryTarget::I2c { .. } => "I2C",
        }
    }
}

/// Where the image goes on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySettings {
    pub target: MemoryTarget,
    /// SUOTA only. 0 lets the device pick the older bank.
    pub image_bank: u8,
    /// SPOTA only, external memories only. Masked to 24 bits.
    pub patch_base_address: u32,
}

impl Default for MemorySettings {
    fn default() -> Self {
        MemorySettings {
            target: MemoryTarget::DEFAULT_SPI,
            image_bank: 0,
            patch_base_address: 0,
        }
    }
}

impl MemorySettings {
    /// Memory-device register value: type code in the high byte, bank or
    /// patch base address in the low 24 bits.
    pub fn mem_dev_value(&self, variant: Variant) -> u32 {
        let code = (self.target.type_code(variant) as u32) << 24;
        match variant {
            Variant::Suota => code | self.image_bank as u32,
            Variant::Spota if self.target.is_external() => {
                code | (self.patch_base_address & 0x00FF_FFFF)
            }
            Variant::Spota => code,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let MemoryTarget::I2c { address, .. } = self.target {
            if address > 0xFFFF {
                return Err(Error::Validation(format!(
                    "I2C device address {:#x} does not fit in 16 bits",
                    address
                )));
            }
        }
        Ok(())
    }
}
