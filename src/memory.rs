//! Flat simulated memory.
//!
//! Backs the whole address space of the simulated target with a single byte
//! buffer. Multi-byte accesses are assembled here, in the byte order fixed
//! when the memory is created (the boot-time value of the CPSR E bit); the
//! core facade forwards accesses without reordering anything.

/// Byte order used for half-word and word assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    /// Least significant byte at the lowest address.
    Little,
    /// Most significant byte at the lowest address.
    Big,
}

/// Errors produced by the memory object.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// The access touches an address outside of the backing buffer.
    #[error("access of {width} byte(s) at {address:#010x} is outside of the {size} byte memory")]
    OutOfBounds {
        /// First address of the failing access.
        address: u32,
        /// Access width in bytes.
        width: u8,
        /// Total memory extent in bytes.
        size: usize,
    },
}

/// A flat, bounds-checked memory of fixed size.
#[derive(Debug, Clone)]
pub struct Memory {
    data: Vec<u8>,
    endianness: Endianness,
}

impl Memory {
    /// Allocate a zero-filled memory of `size` bytes.
    pub fn new(size: usize, endianness: Endianness) -> Self {
        Memory {
            data: vec![0; size],
            endianness,
        }
    }

    /// Total byte extent.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Byte order used for multi-byte accesses.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    fn check(&self, address: u32, width: u8) -> Result<usize, MemoryError> {
        let start = address as usize;
        match start.checked_add(width as usize) {
            Some(end) if end <= self.data.len() => Ok(start),
            _ => Err(MemoryError::OutOfBounds {
                address,
                width,
                size: self.data.len(),
            }),
        }
    }

    /// Read one byte.
    pub fn read_byte(&self, address: u32) -> Result<u8, MemoryError> {
        let start = self.check(address, 1)?;
        Ok(self.data[start])
    }

    /// Read a half-word, assembled in the configured byte order.
    pub fn read_half(&self, address: u32) -> Result<u16, MemoryError> {
        let start = self.check(address, 2)?;
        let bytes = [self.data[start], self.data[start + 1]];
        Ok(match self.endianness {
            Endianness::Little => u16::from_le_bytes(bytes),
            Endianness::Big => u16::from_be_bytes(bytes),
        })
    }

    /// Read a word, assembled in the configured byte order.
    pub fn read_word(&self, address: u32) -> Result<u32, MemoryError> {
        let start = self.check(address, 4)?;
        let bytes = [
            self.data[start],
            self.data[start + 1],
            self.data[start + 2],
            self.data[start + 3],
        ];
        Ok(match self.endianness {
            Endianness::Little => u32::from_le_bytes(bytes),
            Endianness::Big => u32::from_be_bytes(bytes),
        })
    }

    /// Write one byte.
    pub fn write_byte(&mut self, address: u32, value: u8) -> Result<(), MemoryError> {
        let start = self.check(address, 1)?;
        self.data[start] = value;
        Ok(())
    }

    /// Write a half-word in the configured byte order.
    pub fn write_half(&mut self, address: u32, value: u16) -> Result<(), MemoryError> {
        let start = self.check(address, 2)?;
        let bytes = match self.endianness {
            Endianness::Little => value.to_le_bytes(),
            Endianness::Big => value.to_be_bytes(),
        };
        self.data[start..start + 2].copy_from_slice(&bytes);
        Ok(())
    }

    /// Write a word in the configured byte order.
    pub fn write_word(&mut self, address: u32, value: u32) -> Result<(), MemoryError> {
        let start = self.check(address, 4)?;
        let bytes = match self.endianness {
            Endianness::Little => value.to_le_bytes(),
            Endianness::Big => value.to_be_bytes(),
        };
        self.data[start..start + 4].copy_from_slice(&bytes);
        Ok(())
    }
}
