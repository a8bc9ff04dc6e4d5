//! Bump allocator for emitted binary structures
//!
//! Chunks get addresses in allocation order and are never freed. A chunk's
//! bytes stay patchable until [`Arena::finalize`] consumes the arena, which
//! lets a parent record the address of a child that is allocated after it.

use crate::error::{FormatError, Result};

/// Opaque handle to an allocated chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkHandle(usize);

#[derive(Debug)]
struct Chunk {
    address: u64,
    bytes: Vec<u8>,
}

/// Append-only arena of patchable byte chunks
#[derive(Debug, Default)]
pub struct Arena {
    chunks: Vec<Chunk>,
    /// Address of the next allocation
    next: u64,
}

impl Arena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `size` zeroed bytes at the next address
    pub fn allocate(&mut self, size: usize) -> ChunkHandle {
        let handle = ChunkHandle(self.chunks.len());
        self.chunks.push(Chunk {
            address: self.next,
            bytes: vec![0u8; size],
        });
        self.next += size as u64;
        handle
    }

    /// Allocate `size` bytes whose address is a multiple of `align`
    ///
    /// A filler chunk is inserted first when the next address is misaligned.
    pub fn allocate_padded(&mut self, size: usize, align: u64) -> ChunkHandle {
        let padding = padding_for(self.next, align);
        if padding > 0 {
            self.allocate(padding as usize);
        }
        self.allocate(size)
    }

    /// Allocate a chunk holding a copy of `data`
    pub fn allocate_bytes(&mut self, data: &[u8]) -> ChunkHandle {
        let handle = self.allocate(data.len());
        self.chunks[handle.0].bytes.copy_from_slice(data);
        handle
    }

    /// Address of an allocated chunk
    #[inline]
    pub fn address(&self, handle: ChunkHandle) -> u64 {
        self.chunks[handle.0].address
    }

    /// Bytes of an allocated chunk
    #[inline]
    pub fn bytes(&self, handle: ChunkHandle) -> &[u8] {
        &self.chunks[handle.0].bytes
    }

    /// Mutable bytes of an allocated chunk
    #[inline]
    pub fn bytes_mut(&mut self, handle: ChunkHandle) -> &mut [u8] {
        &mut self.chunks[handle.0].bytes
    }

    /// Overwrite bytes of a chunk starting at `offset`
    pub fn patch(&mut self, handle: ChunkHandle, offset: usize, data: &[u8]) -> Result<()> {
        let chunk = &mut self.chunks[handle.0];
        let end = offset
            .checked_add(data.len())
            .filter(|end| *end <= chunk.bytes.len())
            .ok_or(FormatError::BoundsExceeded {
                offset: offset as u64,
                size: data.len() as u64,
                len: chunk.bytes.len() as u64,
            })?;
        chunk.bytes[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Overwrite a little-endian `u32` inside a chunk, typically a pointer
    pub fn patch_u32(&mut self, handle: ChunkHandle, offset: usize, value: u32) -> Result<()> {
        self.patch(handle, offset, &value.to_le_bytes())
    }

    /// Overwrite bytes at an absolute address
    ///
    /// The patched range must lie within a single chunk.
    pub fn patch_at(&mut self, address: u64, data: &[u8]) -> Result<()> {
        let out_of_range = FormatError::BoundsExceeded {
            offset: address,
            size: data.len() as u64,
            len: self.next,
        };
        // Addresses are monotonic, so the owning chunk is the last one starting at or before `address`
        let index = self.chunks.partition_point(|c| c.address <= address);
        let Some(index) = index.checked_sub(1) else {
            return Err(out_of_range);
        };
        let chunk = &self.chunks[index];
        if address + data.len() as u64 > chunk.address + chunk.bytes.len() as u64 {
            return Err(out_of_range);
        }
        let offset = (address - chunk.address) as usize;
        self.patch(ChunkHandle(index), offset, data)
    }

    /// Total bytes allocated, which is also the next address
    #[inline]
    pub fn len(&self) -> u64 {
        self.next
    }

    /// Whether nothing was allocated yet
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.next == 0
    }

    /// Number of chunks, filler chunks included
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Drop every chunk allocated after the first `chunk_count`
    ///
    /// The next allocation reuses the address of the first dropped chunk.
    /// Handles to dropped chunks must not be used afterwards.
    pub fn truncate(&mut self, chunk_count: usize) {
        if let Some(first) = self.chunks.get(chunk_count) {
            self.next = first.address;
            self.chunks.truncate(chunk_count);
        }
    }

    /// Concatenate every chunk in allocation order
    ///
    /// Chunk addresses are byte offsets into the returned buffer.
    pub fn finalize(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.next as usize);
        for chunk in self.chunks {
            debug_assert_eq!(chunk.address, out.len() as u64);
            out.extend_from_slice(&chunk.bytes);
        }
        out
    }
}

/// Bytes needed to move `position` to the next multiple of `align`
#[inline]
pub(crate) fn padding_for(position: u64, align: u64) -> u64 {
    if align <= 1 {
        return 0;
    }
    (align - position % align) % align
}
