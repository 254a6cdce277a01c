/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::core::image::FirmwareImage;
use crate::core::memory::MemorySettings;
use crate::error::{Error, Result};
use crate::fota::Variant;
use std::time::Duration;

pub const DEFAULT_BLOCK_SIZE: usize = 240;
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct UpdateConfig {
    pub variant: Variant,
    /// SUOTA only; SPOTA always sends the image as one block.
    pub block_size: usize,
    pub memory: MemorySettings,
    pub reboot_on_success: bool,
    /// Re-read the MTU characteristic once after an MTU change, for stacks
    /// that report the new MTU late.
    pub mtu_reread_workaround: bool,
    /// Longest wait for any single transport event.
    pub operation_timeout: Duration,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        UpdateConfig {
            variant: Variant::Suota,
            block_size: DEFAULT_BLOCK_SIZE,
            memory: MemorySettings::default(),
            reboot_on_success: false,
            mtu_reread_workaround: false,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

impl UpdateConfig {
    pub fn suota() -> Self {
        UpdateConfig::default()
    }

    pub fn spota() -> Self {
        UpdateConfig { variant: Variant::Spota, ..Default::default() }
    }

    /// Checks everything that can be rejected before the link is touched.
    pub fn validate(&self, image: &FirmwareImage) -> Result<()> {
        if self.variant == Variant::Suota && self.block_size == 0 {
            return Err(Error::Validation("block size cannot be zero".into()));
        }
        if self.variant == Variant::Suota && self.block_size > u16::MAX as usize {
            return Err(Error::Validation(format!(
                "block size {} does not fit the 16-bit patch length register",
                self.block_size
            )));
        }
        if self.operation_timeout.is_zero() {
            return Err(Error::Validation("operation timeout cannot be zero".into()));
        }
        if image.is_empty() {
            return Err(Error::Validation("firmware image is empty".into()));
        }
        if image.variant() != self.variant {
            return Err(Error::Validation(format!(
                "image was prepared for {} but the update uses {}",
                image.variant(),
                self.variant
            )));
        }
        if self.variant == Variant::Spota && image.len() > u16::MAX as usize {
            return Err(Error::Validation(format!(
                "{} bytes do not fit the 16-bit patch length register",
                image.len()
            )));
        }
        self.memory.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::MemoryTarget;

    #[test]
    fn defaults_match_stock_application() {
        let config = UpdateConfig::default();
        assert_eq!(config.variant, Variant::Suota);
        assert_eq!(config.block_size, 240);
        assert_eq!(config.memory.target, MemoryTarget::DEFAULT_SPI);
        assert_eq!(config.memory.image_bank, 0);
        assert!(!config.reboot_on_success);
        assert_eq!(config.operation_timeout, Duration::from_secs(30));
    }

    #[test]
    fn zero_block_size_is_rejected_for_suota_only() {
        let image = FirmwareImage::new(vec![1, 2, 3], Variant::Suota).unwrap();
        let config = UpdateConfig { block_size: 0, ..UpdateConfig::suota() };
        assert!(matches!(config.validate(&image), Err(Error::Validation(_))));

        let image = FirmwareImage::new(vec![1, 2, 3], Variant::Spota).unwrap();
        let config = UpdateConfig { block_size: 0, ..UpdateConfig::spota() };
        assert!(config.validate(&image).is_ok());
    }

    #[test]
    fn spota_image_must_fit_patch_length() {
        let image = FirmwareImage::new(vec![0; 0x1_0000], Variant::Spota).unwrap();
        assert!(matches!(UpdateConfig::spota().validate(&image), Err(Error::Validation(_))));

        let image = FirmwareImage::new(vec![0; 0xFFFF], Variant::Spota).unwrap();
        assert!(UpdateConfig::spota().validate(&image).is_ok());
    }

    #[test]
    fn variant_mismatch_is_rejected() {
        let image = FirmwareImage::new(vec![1], Variant::Spota).unwrap();
        assert!(matches!(UpdateConfig::suota().validate(&image), Err(Error::Validation(_))));
    }
}
