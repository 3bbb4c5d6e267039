//! C ABI of the memory reader function table
//!
//! A foreign implementation supplies one [`MemoryReaderImpl`]: an opaque
//! context plus one function pointer per reader operation. Every function
//! takes the context as its first argument. Nothing in this ABI unwinds or
//! returns errors. Failure is a null pointer, a zero length or a zero
//! address.
//!
//! Layout (C):
//!
//! ```c
//! typedef void (*FreeBytesFunction)(const void *bytes, void *context);
//!
//! typedef struct MemoryReaderImpl {
//!   void *reader_context;
//!   uint8_t (*getPointerSize)(void *reader_context);
//!   uint8_t (*getSizeSize)(void *reader_context);
//!   const void *(*readBytes)(void *reader_context, uint64_t address,
//!                            uint64_t size, FreeBytesFunction *outFreeBytes,
//!                            void **outFreeContext);
//!   uint64_t (*getStringLength)(void *reader_context, uint64_t address);
//!   uint64_t (*getSymbolAddress)(void *reader_context, const char *name,
//!                                uint64_t name_length);
//! } MemoryReaderImpl;
//! ```

use std::ffi::{c_char, c_void};
use std::ptr;

/// Opaque token owned by the foreign implementation.
///
/// Passed back unchanged on every call. Never inspected or freed here.
pub type ReaderContext = *mut c_void;

/// Returns a buffer from `readBytes` to its producer.
pub type FreeBytesFunction = unsafe extern "C" fn(bytes: *const c_void, context: *mut c_void);

pub type PointerSizeFunction = unsafe extern "C" fn(reader_context: ReaderContext) -> u8;

pub type SizeSizeFunction = unsafe extern "C" fn(reader_context: ReaderContext) -> u8;

/// Reads `size` bytes at `address`.
///
/// On success returns a non-null pointer and stores the function and
/// context needed to free it in the out parameters. On failure returns
/// null; the out parameters are then ignored.
pub type ReadBytesFunction = unsafe extern "C" fn(
    reader_context: ReaderContext,
    address: u64,
    size: u64,
    out_free_bytes: *mut Option<FreeBytesFunction>,
    out_free_context: *mut *mut c_void,
) -> *const c_void;

/// Length of the string at `address`, or 0 if there is none.
pub type GetStringLengthFunction =
    unsafe extern "C" fn(reader_context: ReaderContext, address: u64) -> u64;

/// Address of the named symbol, or 0. `name` is not NUL-terminated.
pub type GetSymbolAddressFunction = unsafe extern "C" fn(
    reader_context: ReaderContext,
    name: *const c_char,
    name_length: u64,
) -> u64;

/// Function table supplied by a foreign memory reader implementation.
///
/// Unset slots are null (`None`). [`CMemoryReader::new`] rejects tables
/// with unset slots.
///
/// [`CMemoryReader::new`]: crate::CMemoryReader::new
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MemoryReaderImpl {
    pub reader_context: ReaderContext,
    pub get_pointer_size: Option<PointerSizeFunction>,
    pub get_size_size: Option<SizeSizeFunction>,
    pub read_bytes: Option<ReadBytesFunction>,
    pub get_string_length: Option<GetStringLengthFunction>,
    pub get_symbol_address: Option<GetSymbolAddressFunction>,
}

impl Default for MemoryReaderImpl {
    fn default() -> Self {
        Self {
            reader_context: ptr::null_mut(),
            get_pointer_size: None,
            get_size_size: None,
            read_bytes: None,
            get_string_length: None,
            get_symbol_address: None,
        }
    }
}
