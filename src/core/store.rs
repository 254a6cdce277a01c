/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
use crate::core::image::FirmwareImage;
use crate::error::{Error, Result};
use crate::fota::Variant;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// Source of firmware images, addressed by name.
pub trait FirmwareStore {
    fn list(&self) -> Result<Vec<String>>;
    fn open(&self, name: &str) -> Result<Vec<u8>>;

    fn load(&self, name: &str, variant: Variant) -> Result<FirmwareImage> {
        FirmwareImage::new(self.open(name)?, variant)
    }
}

/// Images stored as regular files in one directory.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FirmwareStore for DirStore {
    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort_by_key(|n| n.to_lowercase());
        debug!("Found {} images in {}", names.len(), self.root.display());
        Ok(names)
    }

    fn open(&self, name: &str) -> Result<Vec<u8>> {
        // Names are plain file names, never paths
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            return Err(Error::Validation(format!("'{}' is not an image name", name)));
        }
        Ok(fs::read(self.root.join(name))?)
    }
}
