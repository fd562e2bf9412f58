/// Objects that implement reading and writing OPC packages.
///
/// This module provides the OpcPackage type, an in-memory, order-preserving
/// container of package parts. Parts are opaque byte blobs keyed by
/// normalized part name; all structural interpretation (relationships,
/// content types, presentation topology) lives in the layers above.
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::opc::error::{OpcError, Result};
use crate::opc::partname;

/// An OPC package held fully in memory.
///
/// The package records the insertion order of its parts and repacks them in
/// that order on save, so an unmodified load/save round-trip reproduces the
/// original member sequence. A part deleted and later recreated is appended
/// at the end, not restored to its original position.
#[derive(Debug)]
pub struct OpcPackage {
    /// All parts in the package, keyed by normalized part name
    parts: HashMap<String, Vec<u8>>,

    /// Part names in insertion order; parallel to `parts`
    order: Vec<String>,
}

impl OpcPackage {
    /// Create a new empty package.
    pub fn new() -> Self {
        Self {
            parts: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Open a package from a file.
    ///
    /// # Arguments
    /// * `path` - Path to the package file (.pptx, .potx, etc.)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(OpcError::PackageNotFound(path.display().to_string()));
        }
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Load a package from a byte slice.
    ///
    /// Fails with `CorruptArchive` when the bytes are not a valid ZIP
    /// archive.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_reader(Cursor::new(data))
    }

    /// Load a package from a reader.
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive =
            ZipArchive::new(reader).map_err(|e| OpcError::CorruptArchive(e.to_string()))?;

        let mut package = Self::new();
        for index in 0..archive.len() {
            let mut file = archive
                .by_index(index)
                .map_err(|e| OpcError::CorruptArchive(e.to_string()))?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            package.write(&name, data);
        }
        Ok(package)
    }

    /// List all part names in insertion order.
    pub fn list(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Check if a part exists in the package.
    pub fn has(&self, name: &str) -> bool {
        self.parts.contains_key(partname::normalize(name))
    }

    /// Read a part's bytes.
    ///
    /// # Arguments
    /// * `name` - The part name, with or without a leading slash
    pub fn read(&self, name: &str) -> Result<&[u8]> {
        self.parts
            .get(partname::normalize(name))
            .map(Vec::as_slice)
            .ok_or_else(|| OpcError::PartNotFound(name.to_string()))
    }

    /// Write a part, replacing any existing bytes.
    ///
    /// A name is registered in the insertion order exactly once, when it is
    /// first introduced; overwriting keeps the original position.
    pub fn write(&mut self, name: &str, data: Vec<u8>) {
        let key = partname::normalize(name).to_string();
        if !self.parts.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.parts.insert(key, data);
    }

    /// Delete a part, removing it from both the map and the order list.
    pub fn delete(&mut self, name: &str) {
        let key = partname::normalize(name);
        if self.parts.remove(key).is_some() {
            self.order.retain(|entry| entry != key);
        }
    }

    /// Get an iterator over `(name, bytes)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.order
            .iter()
            .filter_map(|name| self.parts.get(name).map(|data| (name.as_str(), data.as_slice())))
    }

    /// Get the number of parts in the package.
    pub fn part_count(&self) -> usize {
        self.order.len()
    }

    /// Serialize the package to bytes.
    ///
    /// Repacks every currently-present part in recorded insertion order with
    /// Deflate compression.
    pub fn save_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, data) in self.iter() {
            writer.start_file(name, options)?;
            writer.write_all(data)?;
        }
        Ok(writer.finish()?.into_inner())
    }

    /// Write the package to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.save_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

impl Default for OpcPackage {
    fn default() -> Self {
        Self::new()
    }
}
