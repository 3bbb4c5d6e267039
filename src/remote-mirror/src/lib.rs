//! # remote-mirror
//!
//! Read the memory of a target process or memory image without linking
//! against it.
//!
//! The crate is built around two pieces:
//! - [`MemoryReader`], the contract every memory source implements
//! - [`CMemoryReader`], an adapter that implements the contract on top of a
//!   table of plain `extern "C"` function pointers ([`MemoryReaderImpl`])
//!
//! Bytes returned by a read are owned by whoever produced them. They come
//! back as [`BorrowedBytes`], which must be handed back with
//! [`BorrowedBytes::release`] exactly once.
//!
//! [`MemoryImage`] is a ready-made producer: byte segments placed at target
//! addresses plus a symbol table, exposed only through a function table.
//!
//! ## Example
//!
//! ```
//! use remote_mirror::{CMemoryReader, MemoryImage, MemoryReader, RemoteAddress};
//!
//! # fn main() -> remote_mirror::Result<()> {
//! let mut image = MemoryImage::new(8)?;
//! image.add_segment(0x1000, b"hello\0world\0".to_vec())?;
//! image.define_symbol("greeting", 0x1000);
//!
//! // The image outlives the reader for the rest of this scope.
//! let reader = unsafe { CMemoryReader::new(image.function_table())? };
//!
//! let greeting = reader.symbol_address("greeting");
//! assert_eq!(reader.read_string(greeting).as_deref(), Some(&b"hello"[..]));
//! assert_eq!(reader.symbol_address("missing"), RemoteAddress::INVALID);
//!
//! let bytes = reader.read_bytes(RemoteAddress::new(0x1006), 5).unwrap();
//! assert_eq!(bytes.as_slice(), b"world");
//! bytes.release();
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod buffer;
pub mod c_reader;
pub mod ffi;
pub mod image;
pub mod reader;

#[cfg(test)]
mod mock;

#[doc(inline)]
pub use address::RemoteAddress;
#[doc(inline)]
pub use buffer::{BorrowedBytes, ReleaseAction};
#[doc(inline)]
pub use c_reader::CMemoryReader;
#[doc(inline)]
pub use ffi::{FreeBytesFunction, MemoryReaderImpl, ReaderContext};
#[doc(inline)]
pub use image::MemoryImage;
#[doc(inline)]
pub use reader::MemoryReader;

/// Errors from building readers and images
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("No {0} implementation in memory reader table")]
    MissingFunction(&'static str),

    #[error("Invalid target pointer size {0}")]
    InvalidPointerSize(u8),

    #[error("Segment at {base:#x} ({len} bytes) overlaps an existing segment")]
    OverlappingSegment { base: u64, len: u64 },

    #[error("Segment at {base:#x} ({len} bytes) wraps past the end of the address space")]
    SegmentOutOfRange { base: u64, len: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::MissingFunction("readBytes");
        assert_eq!(
            err.to_string(),
            "No readBytes implementation in memory reader table"
        );

        let err = Error::OverlappingSegment {
            base: 0x1000,
            len: 16,
        };
        assert!(err.to_string().contains("0x1000"));
    }
}
