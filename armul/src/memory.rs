//! Flat byte-addressed memory, little-endian, with configurable behaviour
//! for out-of-bounds access.

use tracing::warn;

use crate::mode::MemoryMode;

/// The fixed size of the machine's address space.
pub const MEMORY_SIZE: usize = 65536;

/// Raised when an out-of-bounds access is fatal, i.e. the machine is
/// running in [`MemoryMode::Strict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfBounds {
    pub address: u32,
}

impl std::fmt::Display for OutOfBounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "memory access out of bounds at address {:#010x}", self.address)
    }
}

impl std::error::Error for OutOfBounds {}

#[derive(Debug, Clone)]
pub struct Memory {
    bytes: Vec<u8>,
    mode: MemoryMode,
}

impl Memory {
    #[must_use]
    pub fn new(mode: MemoryMode) -> Self {
        Self { bytes: vec![0; MEMORY_SIZE], mode }
    }

    /// Loads the program image starting at address 0.
    pub fn load_program(&mut self, words: &[u32]) {
        for (i, word) in words.iter().enumerate() {
            let addr = i * 4;
            self.bytes[addr..addr + 4].copy_from_slice(&word.to_le_bytes());
        }
    }

    fn in_bounds(&self, address: u32) -> bool {
        (address as usize) + 4 <= self.bytes.len()
    }

    /// Reads a little-endian word at `address`.
    ///
    /// # Errors
    ///
    /// In [`MemoryMode::Strict`], returns [`OutOfBounds`] if the access
    /// falls outside the address space. In [`MemoryMode::Compliant`], an
    /// out-of-bounds read logs a diagnostic and returns `0`.
    pub fn read_word(&self, address: u32) -> Result<u32, OutOfBounds> {
        if !self.in_bounds(address) {
            return self.handle_out_of_bounds(address, 0);
        }
        let addr = address as usize;
        Ok(u32::from_le_bytes(self.bytes[addr..addr + 4].try_into().unwrap()))
    }

    /// Writes a little-endian word at `address`.
    ///
    /// # Errors
    ///
    /// In [`MemoryMode::Strict`], returns [`OutOfBounds`] if the access
    /// falls outside the address space. In [`MemoryMode::Compliant`], an
    /// out-of-bounds write logs a diagnostic and is silently dropped.
    pub fn write_word(&mut self, address: u32, value: u32) -> Result<(), OutOfBounds> {
        if !self.in_bounds(address) {
            self.handle_out_of_bounds(address, ())?;
            return Ok(());
        }
        let addr = address as usize;
        self.bytes[addr..addr + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn handle_out_of_bounds<T: Default>(&self, address: u32, default: T) -> Result<T, OutOfBounds> {
        match self.mode {
            MemoryMode::Strict => Err(OutOfBounds { address }),
            MemoryMode::Compliant => {
                warn!(address, "memory access out of bounds, ignoring");
                Ok(default)
            }
        }
    }

    /// Iterates over every non-zero word in memory, in address order, for
    /// the post-halt memory dump.
    pub fn nonzero_words(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.bytes.chunks_exact(4).enumerate().filter_map(|(i, chunk)| {
            let word = u32::from_le_bytes(chunk.try_into().unwrap());
            (word != 0).then(|| (i as u32 * 4, word))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn word_round_trips() {
        let mut mem = Memory::new(MemoryMode::Compliant);
        mem.write_word(4, 0x1234_5678).unwrap();
        assert_eq!(mem.read_word(4).unwrap(), 0x1234_5678);
    }

    #[test]
    fn compliant_out_of_bounds_read_returns_zero() {
        let mem = Memory::new(MemoryMode::Compliant);
        assert_eq!(mem.read_word(MEMORY_SIZE as u32).unwrap(), 0);
    }

    #[test]
    fn strict_out_of_bounds_read_errors() {
        let mem = Memory::new(MemoryMode::Strict);
        assert!(mem.read_word(MEMORY_SIZE as u32).is_err());
    }

    #[test]
    fn nonzero_words_skips_zero_entries() {
        let mut mem = Memory::new(MemoryMode::Compliant);
        mem.write_word(8, 42).unwrap();
        let found: Vec<_> = mem.nonzero_words().collect();
        assert_eq!(found, vec![(8, 42)]);
    }
}
