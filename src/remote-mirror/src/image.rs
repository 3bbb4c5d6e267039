//! Memory Image Provider
//!
//! A foreign memory reader implementation over byte segments placed at
//! target addresses, for reading dumps and snapshots through the same
//! function-table boundary a live target would use.
//!
//! Consumers never read the image directly: [`MemoryImage::function_table`]
//! hands out `extern "C"` callbacks for a [`CMemoryReader`] to wrap.
//! Every successful read returns a fresh heap copy together with a free
//! function, and the image counts copies that have not been freed yet.
//!
//! [`CMemoryReader`]: crate::CMemoryReader

use std::collections::HashMap;
use std::ffi::{c_char, c_void};
use std::fs::File;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use memmap2::Mmap;
use tracing::debug;

use crate::ffi::{FreeBytesFunction, MemoryReaderImpl};
use crate::{Error, RemoteAddress, Result};

/// Bytes backing a segment
enum Backing {
    Owned(Box<[u8]>),
    Mapped(Mmap),
}

/// A contiguous run of target memory
pub struct Segment {
    base: u64,
    backing: Backing,
}

impl Segment {
    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn len(&self) -> u64 {
        self.bytes().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    /// One past the last address in the segment
    pub fn end(&self) -> u64 {
        self.base + self.len()
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.backing, Backing::Mapped(_))
    }

    fn bytes(&self) -> &[u8] {
        match &self.backing {
            Backing::Owned(bytes) => &bytes[..],
            Backing::Mapped(mmap) => &mmap[..],
        }
    }

    fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.end()
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("base", &format_args!("{:#x}", self.base))
            .field("len", &self.len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

/// Target memory assembled from segments and a symbol table.
pub struct MemoryImage {
    pointer_size: u8,
    size_size: u8,
    max_string_length: u64,
    /// Sorted by base, non-overlapping
    segments: Vec<Segment>,
    symbols: HashMap<String, u64>,
    live_reads: AtomicUsize,
}

impl MemoryImage {
    /// Longest string the length query scans for a terminator by default
    pub const DEFAULT_MAX_STRING_LENGTH: u64 = 4096;

    /// Create an empty image for a target with the given pointer width.
    ///
    /// The size type width defaults to the pointer width.
    pub fn new(pointer_size: u8) -> Result<Self> {
        if pointer_size == 0 {
            return Err(Error::InvalidPointerSize(pointer_size));
        }

        Ok(Self {
            pointer_size,
            size_size: pointer_size,
            max_string_length: Self::DEFAULT_MAX_STRING_LENGTH,
            segments: Vec::new(),
            symbols: HashMap::new(),
            live_reads: AtomicUsize::new(0),
        })
    }

    pub fn with_size_size(mut self, size_size: u8) -> Self {
        self.size_size = size_size;
        self
    }

    pub fn with_max_string_length(mut self, max_string_length: u64) -> Self {
        self.max_string_length = max_string_length;
        self
    }

    pub fn pointer_size(&self) -> u8 {
        self.pointer_size
    }

    pub fn size_size(&self) -> u8 {
        self.size_size
    }

    pub fn max_string_length(&self) -> u64 {
        self.max_string_length
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Place `bytes` at `base`.
    pub fn add_segment(&mut self, base: u64, bytes: Vec<u8>) -> Result<()> {
        self.insert(Segment {
            base,
            backing: Backing::Owned(bytes.into_boxed_slice()),
        })
    }

    /// Map a file read-only and place its contents at `base`.
    pub fn map_file<P: AsRef<Path>>(&mut self, base: u64, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::open(path)?;
        // SAFETY: mapped read-only; the file is not expected to be truncated
        // while the image is alive.
        let mmap = unsafe { Mmap::map(&file) }?;

        debug!(
            path = %path.display(),
            base = %RemoteAddress::new(base),
            len = mmap.len(),
            "Mapped image segment"
        );

        self.insert(Segment {
            base,
            backing: Backing::Mapped(mmap),
        })
    }

    pub fn define_symbol(&mut self, name: impl Into<String>, address: u64) {
        self.symbols.insert(name.into(), address);
    }

    pub fn symbol(&self, name: &str) -> Option<u64> {
        self.symbols.get(name).copied()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Copies handed out by reads that have not been freed yet.
    pub fn live_reads(&self) -> usize {
        self.live_reads.load(Ordering::SeqCst)
    }

    /// The function table serving this image.
    ///
    /// The table's context points at `self`: the image must not move or be
    /// dropped while any reader built from the table, or any buffer read
    /// through one, is still alive.
    pub fn function_table(&self) -> MemoryReaderImpl {
        MemoryReaderImpl {
            reader_context: self as *const Self as *mut c_void,
            get_pointer_size: Some(image_pointer_size),
            get_size_size: Some(image_size_size),
            read_bytes: Some(image_read_bytes),
            get_string_length: Some(image_string_length),
            get_symbol_address: Some(image_symbol_address),
        }
    }

    fn insert(&mut self, segment: Segment) -> Result<()> {
        let len = segment.len();
        if segment.base.checked_add(len).is_none() {
            return Err(Error::SegmentOutOfRange {
                base: segment.base,
                len,
            });
        }

        let overlaps = self
            .segments
            .iter()
            .any(|s| segment.base < s.end() && s.base < segment.end());
        if overlaps {
            return Err(Error::OverlappingSegment {
                base: segment.base,
                len,
            });
        }

        let index = self.segments.partition_point(|s| s.base < segment.base);
        debug!(
            base = %RemoteAddress::new(segment.base),
            len,
            "Added image segment"
        );
        self.segments.insert(index, segment);
        Ok(())
    }

    fn segment_at(&self, address: u64) -> Option<&Segment> {
        let index = self.segments.partition_point(|s| s.base <= address);
        let segment = self.segments.get(index.checked_sub(1)?)?;
        segment.contains(address).then_some(segment)
    }

    /// The bytes of `[address, address + size)`, if one segment holds all of them.
    fn locate(&self, address: u64, size: u64) -> Option<&[u8]> {
        let index = self.segments.partition_point(|s| s.base <= address);
        let segment = self.segments.get(index.checked_sub(1)?)?;
        let start = usize::try_from(address - segment.base).ok()?;
        let end = start.checked_add(usize::try_from(size).ok()?)?;
        segment.bytes().get(start..end)
    }

    /// Bytes before the first NUL at `address`, or 0 if there is no
    /// terminator within the scan limit and the segment.
    fn string_length(&self, address: u64) -> u64 {
        let Some(segment) = self.segment_at(address) else {
            return 0;
        };
        let start = (address - segment.base) as usize;
        let limit = usize::try_from(self.max_string_length).unwrap_or(usize::MAX);
        let window = &segment.bytes()[start..];
        let window = &window[..window.len().min(limit)];

        window
            .iter()
            .position(|&b| b == 0)
            .map_or(0, |len| len as u64)
    }
}

impl std::fmt::Debug for MemoryImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryImage")
            .field("pointer_size", &self.pointer_size)
            .field("size_size", &self.size_size)
            .field("segments", &self.segments)
            .field("symbols", &self.symbols.len())
            .finish_non_exhaustive()
    }
}

/// A heap copy handed out by `image_read_bytes`; freed by `image_free_bytes`.
struct Allocation {
    bytes: Box<[u8]>,
    live_reads: *const AtomicUsize,
}

unsafe fn image<'a>(context: *mut c_void) -> &'a MemoryImage {
    &*(context as *const MemoryImage)
}

unsafe extern "C" fn image_pointer_size(context: *mut c_void) -> u8 {
    image(context).pointer_size
}

unsafe extern "C" fn image_size_size(context: *mut c_void) -> u8 {
    image(context).size_size
}

unsafe extern "C" fn image_read_bytes(
    context: *mut c_void,
    address: u64,
    size: u64,
    out_free_bytes: *mut Option<FreeBytesFunction>,
    out_free_context: *mut *mut c_void,
) -> *const c_void {
    let image = image(context);
    let Some(bytes) = image.locate(address, size) else {
        return ptr::null();
    };

    let allocation = Box::new(Allocation {
        bytes: bytes.into(),
        live_reads: &image.live_reads,
    });
    image.live_reads.fetch_add(1, Ordering::SeqCst);

    let data = allocation.bytes.as_ptr();
    *out_free_bytes = Some(image_free_bytes);
    *out_free_context = Box::into_raw(allocation).cast();
    data.cast()
}

unsafe extern "C" fn image_free_bytes(_bytes: *const c_void, context: *mut c_void) {
    let allocation = Box::from_raw(context.cast::<Allocation>());
    (*allocation.live_reads).fetch_sub(1, Ordering::SeqCst);
}

unsafe extern "C" fn image_string_length(context: *mut c_void, address: u64) -> u64 {
    image(context).string_length(address)
}

unsafe extern "C" fn image_symbol_address(
    context: *mut c_void,
    name: *const c_char,
    name_length: u64,
) -> u64 {
    let Ok(len) = usize::try_from(name_length) else {
        return 0;
    };
    if name.is_null() {
        return 0;
    }
    let name = std::slice::from_raw_parts(name.cast::<u8>(), len);

    std::str::from_utf8(name)
        .ok()
        .and_then(|name| image(context).symbol(name))
        .unwrap_or(0)
}
