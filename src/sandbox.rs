/*! A linear byte region a [`crate::generator::Generator`] relocates functions
into (`spec.md` §4.F). Grounded on `Sandbox`/`SandboxImpl`/`WatermarkAllocator`
in `examples/original_source/src/transform/generator.cpp`'s `makeSandbox`:
`allocate(size)` carves a contiguous, ever-advancing slice out of a fixed
backing buffer and never reclaims it, which is exactly a watermark allocator's
contract. Unlike the C++, the backing store here is a boxed byte buffer rather
than an `mmap`'d region, since marking memory executable and then jumping into
it is out of scope beyond a bare function-pointer call (see [`crate::generator`]).
*/

use crate::error::AllocationError;

/// A contiguous region handed out by [`Sandbox::allocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    address: u64,
    size: u32,
}

impl Slot {
    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

/// What an allocator backing a [`Sandbox`] must provide: a base address and a
/// capacity, with allocation itself left to the watermark strategy in
/// [`Sandbox::allocate`]. Named so a different allocation strategy (e.g. a
/// free-list) could implement the trait without touching `Sandbox`, per
/// `spec.md` §4.F's "backed by a chosen allocator (e.g. watermark)".
pub trait SandboxAllocator {
    fn base_address(&self) -> u64;
    fn capacity(&self) -> u64;
}

/// A boxed byte buffer standing in for the `mmap`'d region
/// `MemoryBacking` wraps in `original_source`. Its base address is its first
/// byte's address as a `usize`, same as the C++ backing treats the pointer
/// returned by `mmap` as the base of its address space.
pub struct MemoryBacking {
    bytes: Box<[u8]>,
    base: u64,
}

impl MemoryBacking {
    pub fn new(capacity: usize) -> Self {
        let bytes = vec![0u8; capacity].into_boxed_slice();
        let base = bytes.as_ptr() as u64;
        MemoryBacking { bytes, base }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl SandboxAllocator for MemoryBacking {
    fn base_address(&self) -> u64 {
        self.base
    }

    fn capacity(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// A watermark allocator over a [`MemoryBacking`]: every `allocate` call
/// hands out the next `size` bytes and advances the watermark, never
/// revisiting freed space, mirroring `WatermarkAllocator<MemoryBacking>` in
/// `original_source`.
pub struct Sandbox {
    backing: MemoryBacking,
    watermark: u64,
}

impl Sandbox {
    pub fn new(backing: MemoryBacking) -> Self {
        Sandbox {
            watermark: 0,
            backing,
        }
    }

    /// `makeSandbox`: a ten-megabyte backing region, the constant
    /// `generator.cpp` hardcodes (`10 * 0x1000 * 0x1000`).
    pub fn with_default_capacity() -> Self {
        Sandbox::new(MemoryBacking::new(10 * 0x1000 * 0x1000))
    }

    pub fn backing(&self) -> &MemoryBacking {
        &self.backing
    }

    pub fn backing_mut(&mut self) -> &mut MemoryBacking {
        &mut self.backing
    }

    /// Carve out `size` contiguous bytes starting at the current watermark
    /// and advance it. Fails once the backing region's capacity is
    /// exhausted, per `spec.md` §7's "sandbox allocation failure".
    pub fn allocate(&mut self, size: u32) -> Result<Slot, AllocationError> {
        let capacity = self.backing.capacity();
        let requested = size as u64;
        if self.watermark + requested > capacity {
            return Err(AllocationError {
                requested: size,
                watermark: self.watermark,
                capacity,
            });
        }
        let slot = Slot {
            address: self.backing.base_address() + self.watermark,
            size,
        };
        self.watermark += requested;
        Ok(slot)
    }

    pub fn address_of(&self, slot: Slot) -> u64 {
        slot.address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_contiguous_and_advance_the_watermark() {
        let mut sandbox = Sandbox::new(MemoryBacking::new(64));
        let a = sandbox.allocate(16).unwrap();
        let b = sandbox.allocate(8).unwrap();
        assert_eq!(a.address() + a.size() as u64, b.address());
    }

    #[test]
    fn allocation_beyond_capacity_fails() {
        let mut sandbox = Sandbox::new(MemoryBacking::new(16));
        assert!(sandbox.allocate(8).is_ok());
        assert!(sandbox.allocate(16).is_err());
    }
}
