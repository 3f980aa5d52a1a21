/// Size of a switchable cartridge ROM bank.
pub const ROM_BANK_SIZE: usize = 0x4000;
/// Size of an external (cartridge) RAM bank.
pub const RAM_BANK_SIZE: usize = 0x2000;

/// A fixed-size block of bytes addressed relative to its own base.
///
/// Routing an absolute bus address to a bank offset is the caller's job, so an
/// offset outside the bank is a bug and panics like any slice index would.
#[derive(Clone, PartialEq, Eq)]
pub struct MemoryBank {
    data: Box<[u8]>,
}

impl MemoryBank {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size].into_boxed_slice(),
        }
    }

    /// Build a bank holding a copy of `bytes`, zero-padded up to `size`.
    pub fn from_bytes(bytes: &[u8], size: usize) -> Self {
        let mut bank = Self::new(size);
        let n = bytes.len().min(size);
        bank.data[..n].copy_from_slice(&bytes[..n]);
        bank
    }

    #[inline]
    pub fn read(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    #[inline]
    pub fn write(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }

    /// Copy all of `other` into this bank starting at `at`.
    pub fn load(&mut self, other: &MemoryBank, at: usize) {
        let end = at + other.len();
        self.data[at..end].copy_from_slice(&other.data);
    }

    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for MemoryBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBank")
            .field("len", &self.data.len())
            .finish()
    }
}
