//! `memory` defines the two byte stores on the breadboard: a 16 KiB RAM
//! in the low address space and a 32 KiB ROM in the high half holding
//! the program image and the interrupt vectors.

use std::fs;
use std::path::Path;

use log::debug;
use thiserror::Error;


/// Full size of the 16 bit address space.
pub const MAX_SIZE: usize = 1 << 16;

/// Number of bytes of RAM, mapped at 0x0000-0x3FFF.
pub const RAM_SIZE: usize = 0x4000;

/// First address the ROM decodes. The ROM covers 0x8000-0xFFFF.
pub const ROM_START: u16 = 0x8000;

/// Number of bytes of ROM.
pub const ROM_SIZE: usize = 0x8000;

/// `MemoryError` defines the failures the byte stores can report.
/// Out of range accesses indicate a routing bug in the caller, not a
/// fault of the emulated program.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// The address is outside the store's decoded range.
    #[error("OutOfRange: address {addr:#06X} outside {region}")]
    OutOfRange {
        /// Name of the store which rejected the access.
        region: &'static str,
        /// The offending address.
        addr: u16,
    },

    /// The ROM image file couldn't be read.
    #[error("BadRomFile: {path}: {source}")]
    BadRomFile {
        /// Path of the file that failed.
        path: String,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// The ROM image directory couldn't be read.
    #[error("BadRomDirectory: {path}: {source}")]
    BadRomDirectory {
        /// Path of the directory that failed.
        path: String,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
}

/// `Ram` is the read/write store at 0x0000-0x3FFF. Bytes read as zero
/// until written.
#[must_use]
pub struct Ram {
    bytes: Box<[u8; RAM_SIZE]>,
}

impl Default for Ram {
    fn default() -> Self {
        Self::new()
    }
}

impl Ram {
    /// new returns a zero filled `Ram`.
    pub fn new() -> Self {
        Self {
            bytes: Box::new([0; RAM_SIZE]),
        }
    }

    /// Read the byte at `addr`.
    ///
    /// # Errors
    /// `OutOfRange` if `addr` is outside the RAM window. The bus is
    /// expected to only route in-range addresses here.
    pub fn read(&self, addr: u16) -> Result<u8, MemoryError> {
        match self.bytes.get(usize::from(addr)) {
            Some(b) => Ok(*b),
            None => Err(MemoryError::OutOfRange {
                region: "RAM",
                addr,
            }),
        }
    }

    /// Write the byte at `addr`.
    ///
    /// # Errors
    /// `OutOfRange` if `addr` is outside the RAM window.
    pub fn write(&mut self, addr: u16, val: u8) -> Result<(), MemoryError> {
        match self.bytes.get_mut(usize::from(addr)) {
            Some(b) => {
                *b = val;
                Ok(())
            }
            None => Err(MemoryError::OutOfRange {
                region: "RAM",
                addr,
            }),
        }
    }

    /// `power_on` clears the store back to all zeros.
    pub fn power_on(&mut self) {
        self.bytes.fill(0);
    }
}

/// `Rom` is the read only store at 0x8000-0xFFFF. Contents are
/// established by the loaders once at startup; unloaded cells read as
/// zero. Writes arriving over the bus are dropped before they get here.
#[must_use]
pub struct Rom {
    bytes: Box<[u8; ROM_SIZE]>,
}

impl Default for Rom {
    fn default() -> Self {
        Self::new()
    }
}

impl Rom {
    /// new returns an empty (all zero) `Rom`.
    pub fn new() -> Self {
        Self {
            bytes: Box::new([0; ROM_SIZE]),
        }
    }

    /// Read the byte at `addr`.
    ///
    /// # Errors
    /// `OutOfRange` if `addr` is below the ROM window. The bus is
    /// expected to only route in-range addresses here.
    pub fn read(&self, addr: u16) -> Result<u8, MemoryError> {
        if addr < ROM_START {
            return Err(MemoryError::OutOfRange {
                region: "ROM",
                addr,
            });
        }
        Ok(self.bytes[usize::from(addr - ROM_START)])
    }

    /// `load_bytes` places `data` contiguously starting at `offset`.
    /// Target addresses wrap modulo 64k; bytes whose target falls
    /// outside the ROM window are skipped.
    pub fn load_bytes(&mut self, data: &[u8], offset: u16) {
        for (i, b) in data.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let addr = offset.wrapping_add(i as u16);
            if addr >= ROM_START {
                self.bytes[usize::from(addr - ROM_START)] = *b;
            }
        }
    }

    /// `load_from_file` reads the whole file and places it at `offset`
    /// (the ROM start when `None`). Programs are expected to carry their
    /// entry point in the reset vector at 0xFFFC/0xFFFD.
    ///
    /// # Errors
    /// `BadRomFile` if the file is missing or unreadable.
    pub fn load_from_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        offset: Option<u16>,
    ) -> Result<(), MemoryError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| MemoryError::BadRomFile {
            path: path.display().to_string(),
            source,
        })?;
        let offset = offset.unwrap_or(ROM_START);
        debug!(
            "loading {} bytes from {} at {offset:#06X}",
            data.len(),
            path.display()
        );
        self.load_bytes(&data, offset);
        Ok(())
    }

    /// `load_from_directory` loads every regular file in `dir` in ASCII
    /// sorted order. A basename ending in `_HHHH` (4 hex digits before
    /// the extension) selects the load address; anything else loads at
    /// the ROM start.
    ///
    /// # Errors
    /// `BadRomDirectory` if the directory can't be enumerated and
    /// `BadRomFile` for any file that can't be read.
    pub fn load_from_directory<P: AsRef<Path>>(&mut self, dir: P) -> Result<(), MemoryError> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|source| MemoryError::BadRomDirectory {
            path: dir.display().to_string(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| MemoryError::BadRomDirectory {
                path: dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        for path in files {
            let offset = Self::load_addr_for(&path);
            self.load_from_file(&path, Some(offset))?;
        }
        Ok(())
    }

    // Derive the load address from a trailing `_HHHH` hex suffix in the
    // file stem, defaulting to the ROM start.
    fn load_addr_for(path: &Path) -> u16 {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return ROM_START;
        };
        if let Some((_, suffix)) = stem.rsplit_once('_') {
            if suffix.len() == 4 {
                if let Ok(addr) = u16::from_str_radix(suffix, 16) {
                    return addr;
                }
            }
        }
        ROM_START
    }
}
