//! Memory Reader Trait
//!
//! Core abstraction for reading target memory, independent of how the
//! memory is obtained (live process, dump file, foreign callbacks).

use crate::{BorrowedBytes, RemoteAddress};
use byteorder::{ByteOrder, NativeEndian};

/// Trait for reading memory from a target.
///
/// Every operation is independent and may be called in any order, any
/// number of times. Failures are values: a sentinel address, `None`, or
/// `false`. Nothing here is an error in the `Result` sense.
pub trait MemoryReader {
    /// Target pointer width in bytes. Stable for the reader's lifetime.
    fn pointer_size(&self) -> u8;

    /// Target `size_t` width in bytes. May differ from the pointer width.
    fn size_size(&self) -> u8;

    /// Resolve a symbol, or [`RemoteAddress::INVALID`] if it is unknown.
    fn symbol_address(&self, name: &str) -> RemoteAddress;

    /// Read the string at `address`.
    ///
    /// The bytes are returned verbatim, embedded zero bytes included.
    fn read_string(&self, address: RemoteAddress) -> Option<Vec<u8>>;

    /// Read `size` bytes at `address`.
    ///
    /// `None` means nothing was read and there is nothing to release. On
    /// success the caller owns the buffer until it calls
    /// [`BorrowedBytes::release`].
    fn read_bytes(&self, address: RemoteAddress, size: u64) -> Option<BorrowedBytes>;

    /// Read exactly `dest.len()` bytes into `dest`.
    fn read_into(&self, address: RemoteAddress, dest: &mut [u8]) -> bool {
        let Some(bytes) = self.read_bytes(address, dest.len() as u64) else {
            return false;
        };
        let complete = bytes.len() == dest.len();
        if complete {
            dest.copy_from_slice(bytes.as_slice());
        }
        bytes.release();
        complete
    }

    /// Read a native-endian u32
    fn read_u32(&self, address: RemoteAddress) -> Option<u32> {
        let mut buf = [0u8; 4];
        self.read_into(address, &mut buf)
            .then(|| NativeEndian::read_u32(&buf))
    }

    /// Read a native-endian u64
    fn read_u64(&self, address: RemoteAddress) -> Option<u64> {
        let mut buf = [0u8; 8];
        self.read_into(address, &mut buf)
            .then(|| NativeEndian::read_u64(&buf))
    }

    /// Read a target pointer of [`pointer_size`](Self::pointer_size) width.
    fn read_pointer(&self, address: RemoteAddress) -> Option<RemoteAddress> {
        let raw = match self.pointer_size() {
            4 => u64::from(self.read_u32(address)?),
            8 => self.read_u64(address)?,
            _ => return None,
        };
        Some(RemoteAddress::new(raw))
    }

    /// Read the string at `address`, replacing invalid UTF-8.
    fn read_utf8(&self, address: RemoteAddress) -> Option<String> {
        self.read_string(address)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl<R: MemoryReader + ?Sized> MemoryReader for &R {
    fn pointer_size(&self) -> u8 {
        (**self).pointer_size()
    }

    fn size_size(&self) -> u8 {
        (**self).size_size()
    }

    fn symbol_address(&self, name: &str) -> RemoteAddress {
        (**self).symbol_address(name)
    }

    fn read_string(&self, address: RemoteAddress) -> Option<Vec<u8>> {
        (**self).read_string(address)
    }

    fn read_bytes(&self, address: RemoteAddress, size: u64) -> Option<BorrowedBytes> {
        (**self).read_bytes(address, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A reader over a local byte vector
    struct SliceReader {
        base: u64,
        data: Vec<u8>,
        pointer_size: u8,
    }

    impl SliceReader {
        fn new(base: u64, data: Vec<u8>, pointer_size: u8) -> Self {
            Self {
                base,
                data,
                pointer_size,
            }
        }
    }

    impl MemoryReader for SliceReader {
        fn pointer_size(&self) -> u8 {
            self.pointer_size
        }

        fn size_size(&self) -> u8 {
            self.pointer_size
        }

        fn symbol_address(&self, name: &str) -> RemoteAddress {
            match name {
                "base" => RemoteAddress::new(self.base),
                _ => RemoteAddress::INVALID,
            }
        }

        fn read_string(&self, address: RemoteAddress) -> Option<Vec<u8>> {
            let start = address.address_data().checked_sub(self.base)? as usize;
            let rest = self.data.get(start..)?;
            let end = rest.iter().position(|&b| b == 0)?;
            Some(rest[..end].to_vec())
        }

        fn read_bytes(&self, address: RemoteAddress, size: u64) -> Option<BorrowedBytes> {
            let start = address.address_data().checked_sub(self.base)? as usize;
            let bytes = self.data.get(start..start.checked_add(size as usize)?)?;
            Some(BorrowedBytes::from_vec(bytes.to_vec()))
        }
    }

    #[test]
    fn test_read_into_copies_exact_size() {
        let reader = SliceReader::new(0x1000, vec![1, 2, 3, 4, 5], 8);
        let mut dest = [0u8; 3];
        assert!(reader.read_into(RemoteAddress::new(0x1001), &mut dest));
        assert_eq!(dest, [2, 3, 4]);
    }

    #[test]
    fn test_read_into_failure_leaves_dest() {
        let reader = SliceReader::new(0x1000, vec![1, 2], 8);
        let mut dest = [0xaa; 4];
        assert!(!reader.read_into(RemoteAddress::new(0x1000), &mut dest));
        assert_eq!(dest, [0xaa; 4]);
    }

    #[test]
    fn test_read_integers_native_endian() {
        let data = 0x1122_3344_5566_7788u64.to_ne_bytes().to_vec();
        let reader = SliceReader::new(0x2000, data, 8);

        assert_eq!(
            reader.read_u64(RemoteAddress::new(0x2000)),
            Some(0x1122_3344_5566_7788)
        );
        assert!(reader.read_u32(RemoteAddress::new(0x2000)).is_some());
        assert_eq!(reader.read_u64(RemoteAddress::new(0x2001)), None);
    }

    #[test]
    fn test_read_pointer_follows_pointer_size() {
        let mut data = 0xdead_beefu32.to_ne_bytes().to_vec();
        data.extend_from_slice(&[0; 4]);

        let narrow = SliceReader::new(0x3000, data.clone(), 4);
        assert_eq!(
            narrow.read_pointer(RemoteAddress::new(0x3000)),
            Some(RemoteAddress::new(0xdead_beef))
        );

        let odd = SliceReader::new(0x3000, data, 2);
        assert_eq!(odd.read_pointer(RemoteAddress::new(0x3000)), None);
    }

    #[test]
    fn test_read_utf8_is_lossy() {
        let reader = SliceReader::new(0x4000, vec![b'o', b'k', 0xff, 0], 8);
        assert_eq!(
            reader.read_utf8(RemoteAddress::new(0x4000)).as_deref(),
            Some("ok\u{fffd}")
        );
    }

    fn resolve<R: MemoryReader>(reader: R, name: &str) -> RemoteAddress {
        reader.symbol_address(name)
    }

    #[test]
    fn test_reference_forwards() {
        let reader = SliceReader::new(0x5000, vec![0; 8], 8);
        let by_ref: &dyn MemoryReader = &reader;
        assert_eq!(resolve(by_ref, "base"), RemoteAddress::new(0x5000));
        assert_eq!(resolve(&reader, "nope"), RemoteAddress::INVALID);
    }
}
