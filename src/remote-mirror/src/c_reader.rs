//! Function-table memory reader
//!
//! [`CMemoryReader`] implements [`MemoryReader`] by forwarding every call to
//! a [`MemoryReaderImpl`] supplied from the other side of a C ABI boundary.

use std::ffi::{c_char, c_void};
use std::ptr::{self, NonNull};

use tracing::{debug, trace, warn};

use crate::ffi::{
    FreeBytesFunction, GetStringLengthFunction, GetSymbolAddressFunction, MemoryReaderImpl,
    PointerSizeFunction, ReadBytesFunction, ReaderContext, SizeSizeFunction,
};
use crate::{BorrowedBytes, Error, MemoryReader, ReleaseAction, RemoteAddress, Result};

/// A [`MemoryReader`] backed by a foreign function table.
///
/// The table is validated once, in [`new`](Self::new), and never changes
/// afterwards. The reader itself keeps no mutable state, so it is exactly
/// as thread-safe as the functions behind it.
#[derive(Debug)]
pub struct CMemoryReader {
    context: ReaderContext,
    get_pointer_size: PointerSizeFunction,
    get_size_size: SizeSizeFunction,
    read_bytes: ReadBytesFunction,
    get_string_length: GetStringLengthFunction,
    get_symbol_address: GetSymbolAddressFunction,
}

// SAFETY: `new` requires the table to be callable from any thread the reader
// is moved to or shared with.
unsafe impl Send for CMemoryReader {}
unsafe impl Sync for CMemoryReader {}

impl CMemoryReader {
    /// Wrap a foreign function table.
    ///
    /// Fails if any slot is unset, or if the target reports a pointer size
    /// of zero. The pointer size function is called once here.
    ///
    /// # Safety
    /// - every function in `table` must have the documented signature and
    ///   must not unwind
    /// - the functions and `reader_context` must stay valid for as long as
    ///   the reader, and any buffer read through it, is alive
    /// - if the reader is shared between threads, the functions must be
    ///   safe to call concurrently with the same context
    pub unsafe fn new(table: MemoryReaderImpl) -> Result<Self> {
        let get_pointer_size = table
            .get_pointer_size
            .ok_or(Error::MissingFunction("getPointerSize"))?;
        let get_size_size = table
            .get_size_size
            .ok_or(Error::MissingFunction("getSizeSize"))?;
        let read_bytes = table
            .read_bytes
            .ok_or(Error::MissingFunction("readBytes"))?;
        let get_string_length = table
            .get_string_length
            .ok_or(Error::MissingFunction("getStringLength"))?;
        let get_symbol_address = table
            .get_symbol_address
            .ok_or(Error::MissingFunction("getSymbolAddress"))?;

        let pointer_size = get_pointer_size(table.reader_context);
        if pointer_size == 0 {
            warn!("Memory reader table reports a zero pointer size");
            return Err(Error::InvalidPointerSize(pointer_size));
        }

        debug!(
            pointer_size,
            context = ?table.reader_context,
            "Foreign memory reader ready"
        );

        Ok(Self {
            context: table.reader_context,
            get_pointer_size,
            get_size_size,
            read_bytes,
            get_string_length,
            get_symbol_address,
        })
    }

    /// Length of the string at `address` as reported by the target.
    ///
    /// Zero means there is no readable string there.
    pub fn string_length(&self, address: RemoteAddress) -> u64 {
        unsafe { (self.get_string_length)(self.context, address.address_data()) }
    }
}

impl MemoryReader for CMemoryReader {
    fn pointer_size(&self) -> u8 {
        unsafe { (self.get_pointer_size)(self.context) }
    }

    fn size_size(&self) -> u8 {
        unsafe { (self.get_size_size)(self.context) }
    }

    fn symbol_address(&self, name: &str) -> RemoteAddress {
        let address_data = unsafe {
            (self.get_symbol_address)(
                self.context,
                name.as_ptr().cast::<c_char>(),
                name.len() as u64,
            )
        };
        RemoteAddress::new(address_data)
    }

    fn read_string(&self, address: RemoteAddress) -> Option<Vec<u8>> {
        let length = self.string_length(address);
        if length == 0 {
            return None;
        }

        let bytes = self.read_bytes(address, length)?;
        Some(bytes.copy_and_release())
    }

    fn read_bytes(&self, address: RemoteAddress, size: u64) -> Option<BorrowedBytes> {
        let Ok(len) = usize::try_from(size) else {
            trace!(%address, size, "Read size exceeds host address width");
            return None;
        };

        let mut free_bytes: Option<FreeBytesFunction> = None;
        let mut free_context: *mut c_void = ptr::null_mut();
        let bytes = unsafe {
            (self.read_bytes)(
                self.context,
                address.address_data(),
                size,
                &mut free_bytes,
                &mut free_context,
            )
        };

        let Some(ptr) = NonNull::new(bytes.cast_mut().cast::<u8>()) else {
            trace!(%address, size, "Foreign read failed");
            return None;
        };

        let release = match free_bytes {
            Some(free) => {
                let pending = ForeignRelease {
                    free,
                    bytes,
                    context: free_context,
                };
                ReleaseAction::new(move || pending.invoke())
            }
            None => {
                trace!(%address, size, "Foreign read kept ownership of its buffer");
                ReleaseAction::noop()
            }
        };

        // SAFETY: the foreign side keeps `size` bytes at `ptr` alive until
        // its free function runs, which only the release action does.
        Some(unsafe { BorrowedBytes::from_raw_parts(ptr, len, release) })
    }
}

/// A pending call to a foreign free function.
struct ForeignRelease {
    free: FreeBytesFunction,
    bytes: *const c_void,
    context: *mut c_void,
}

// SAFETY: covered by the thread-safety requirement on `CMemoryReader::new`.
unsafe impl Send for ForeignRelease {}

impl ForeignRelease {
    fn invoke(self) {
        unsafe { (self.free)(self.bytes, self.context) }
    }
}
