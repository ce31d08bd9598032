//! Region registry: the raw blobs backing a pool.
//!
//! Every blob is one host allocation of `block_size × blocks` bytes. Blobs are
//! append-only: growth adds a new blob and never touches the existing ones, so
//! every address handed out stays valid until the registry is released.
//!
//! This is the only module that talks to the host allocator, and the only one
//! allowed to use `unsafe`.
#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::{self, NonNull};

use crate::error::PoolError;

/// Alignment of every blob. Matches the guarantee of the system `malloc`.
pub const BLOB_ALIGN: usize = 2 * std::mem::size_of::<usize>();

/// Address of one block handed out by a pool.
///
/// A `Block` is a plain address: copying it does not copy the memory, and
/// dropping it does not return it. Give it back with `Pool::dealloc`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Block(NonNull<u8>);

// SAFETY: a `Block` is only an address. The pool never reads or writes
// through it except in `zero`, which the checkout protocol makes exclusive.
unsafe impl Send for Block {}
// SAFETY: see above.
unsafe impl Sync for Block {}

impl Block {
    /// Wrap a raw address, typically one previously obtained from
    /// [`Block::as_ptr`].
    #[must_use]
    pub const fn from_non_null(ptr: NonNull<u8>) -> Self {
        Self(ptr)
    }

    /// Raw pointer to the first byte of the block.
    #[must_use]
    pub const fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    /// Non-null pointer to the first byte of the block.
    #[must_use]
    pub const fn as_non_null(self) -> NonNull<u8> {
        self.0
    }

    /// Numeric address of the block.
    #[must_use]
    pub fn addr(self) -> usize {
        self.0.addr().get()
    }

    /// Fill `len` bytes starting at this block with zeros.
    ///
    /// The pool calls this only on a block it has just checked out and
    /// confirmed with [`RegionRegistry::owns`] while holding the registry, so
    /// the slot is live and no other owner can touch it.
    pub(crate) fn zero(self, len: usize) {
        // SAFETY: the caller checked that the block starts a `len`
        // (= block_size) slot of a live blob and keeps the registry borrowed,
        // so the blob cannot be freed during the write. Checkout gives
        // exclusive access until the address reaches the caller.
        unsafe { ptr::write_bytes(self.0.as_ptr(), 0, len) };
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block({:#x})", self.addr())
    }
}

/// One contiguous host allocation owned by a registry.
pub struct Blob {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: a blob exclusively owns its allocation; the registry never hands out
// references into it, only addresses.
unsafe impl Send for Blob {}
// SAFETY: shared access only reads `ptr` and `layout`.
unsafe impl Sync for Blob {}

impl Blob {
    /// Allocate room for `blocks` blocks of `block_size` bytes.
    fn allocate(block_size: usize, blocks: usize) -> Result<Self, PoolError> {
        let failure = PoolError::AllocationFailure { block_size, blocks };
        if block_size == 0 || blocks == 0 {
            return Err(PoolError::InvalidArgument(format!(
                "blob of {blocks} x {block_size} bytes is empty"
            )));
        }
        let bytes = block_size.checked_mul(blocks).ok_or(failure.clone())?;
        let layout = Layout::from_size_align(bytes, BLOB_ALIGN).map_err(|_| failure.clone())?;
        // SAFETY: `layout` has a non-zero size, checked above.
        let raw = unsafe { alloc::alloc(layout) };
        let ptr = NonNull::new(raw).ok_or(failure)?;
        Ok(Self { ptr, layout })
    }

    /// Address of the first byte.
    #[must_use]
    pub fn base(&self) -> usize {
        self.ptr.addr().get()
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    /// Whether the blob spans zero bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    /// Whether `addr` is the start of a `block_size` slot inside this blob.
    #[must_use]
    pub fn holds_slot(&self, addr: usize, block_size: usize) -> bool {
        addr.checked_sub(self.base())
            .is_some_and(|offset| offset < self.len() && offset % block_size == 0)
    }

    /// Every whole `block_size` slot of the blob, lowest address first.
    ///
    /// A trailing partial stride is skipped; it cannot occur for blobs made
    /// by the registry, which are always an exact multiple of the block size.
    pub fn slots(&self, block_size: usize) -> impl ExactSizeIterator<Item = Block> + '_ {
        let count = self.len() / block_size.max(1);
        (0..count).map(move |i| {
            // SAFETY: `i * block_size < count * block_size <= len`, so the
            // offset stays inside this allocation.
            Block(unsafe { self.ptr.add(i * block_size) })
        })
    }
}

impl Drop for Blob {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from `alloc::alloc` with exactly this layout and
        // is freed only here.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("base", &format_args!("{:#x}", self.base()))
            .field("len", &self.len())
            .finish()
    }
}

/// Ordered, append-only sequence of blobs for one block size.
#[derive(Debug)]
pub struct RegionRegistry {
    block_size: usize,
    blobs: Vec<Blob>,
}

impl RegionRegistry {
    /// Create a registry holding one blob of `capacity` blocks.
    pub fn create(block_size: usize, capacity: usize) -> Result<Self, PoolError> {
        let mut registry = Self {
            block_size,
            blobs: Vec::new(),
        };
        registry.grow(capacity)?;
        Ok(registry)
    }

    /// Append a new blob of `extra_blocks` blocks and return it.
    ///
    /// Existing blobs are never moved or resized.
    pub fn grow(&mut self, extra_blocks: usize) -> Result<&Blob, PoolError> {
        self.blobs
            .try_reserve(1)
            .map_err(|_| PoolError::AllocationFailure {
                block_size: std::mem::size_of::<Blob>(),
                blocks: 1,
            })?;
        let blob = Blob::allocate(self.block_size, extra_blocks)?;
        self.blobs.push(blob);
        Ok(&self.blobs[self.blobs.len() - 1])
    }

    /// Drop the most recent blob after its partition failed.
    pub fn discard_last(&mut self) {
        self.blobs.pop();
    }

    /// Free every blob. Returns how many were released.
    pub fn release_all(&mut self) -> usize {
        let released = self.blobs.len();
        self.blobs.clear();
        released
    }

    /// Block size every blob is carved into.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// All live blobs, oldest first.
    #[must_use]
    pub fn blobs(&self) -> &[Blob] {
        &self.blobs
    }

    /// Total bytes held across all blobs.
    #[must_use]
    pub fn reserved_bytes(&self) -> usize {
        self.blobs.iter().map(Blob::len).sum()
    }

    /// Whether `addr` is a slot start inside any live blob.
    #[must_use]
    pub fn owns(&self, addr: usize) -> bool {
        self.blobs
            .iter()
            .any(|blob| blob.holds_slot(addr, self.block_size))
    }
}
