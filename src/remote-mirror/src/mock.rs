//! Mock Memory Reader Table
//!
//! A counting foreign implementation for testing the function-table
//! boundary. Reads hand out pointers straight into `memory`, each with its
//! own boxed free context, so frees can be matched to reads and told apart
//! from the reader context.

use std::ffi::{c_char, c_void};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::ffi::{FreeBytesFunction, MemoryReaderImpl};

pub struct MockTarget {
    pub pointer_size: u8,
    pub size_size: u8,
    pub base: u64,
    pub memory: Vec<u8>,
    /// Fixed reply for the length query; `None` scans for a NUL.
    pub string_length: Option<u64>,
    pub symbols: Vec<(String, u64)>,
    pub fail_reads: bool,
    /// Succeed reads without handing out a free function.
    pub omit_free: bool,
    pointer_size_calls: AtomicUsize,
    reads: AtomicUsize,
    handed_out: Mutex<Vec<(usize, usize)>>,
    frees: Mutex<Vec<(usize, usize)>>,
    symbol_queries: Mutex<Vec<Vec<u8>>>,
}

impl MockTarget {
    pub fn new(pointer_size: u8, base: u64, memory: Vec<u8>) -> Self {
        Self {
            pointer_size,
            size_size: pointer_size,
            base,
            memory,
            string_length: None,
            symbols: Vec::new(),
            fail_reads: false,
            omit_free: false,
            pointer_size_calls: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            handed_out: Mutex::new(Vec::new()),
            frees: Mutex::new(Vec::new()),
            symbol_queries: Mutex::new(Vec::new()),
        }
    }

    pub fn table(&self) -> MemoryReaderImpl {
        MemoryReaderImpl {
            reader_context: self.context_addr() as *mut c_void,
            get_pointer_size: Some(mock_pointer_size),
            get_size_size: Some(mock_size_size),
            read_bytes: Some(mock_read_bytes),
            get_string_length: Some(mock_string_length),
            get_symbol_address: Some(mock_symbol_address),
        }
    }

    pub fn context_addr(&self) -> usize {
        self as *const Self as usize
    }

    pub fn pointer_size_calls(&self) -> usize {
        self.pointer_size_calls.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// (bytes, free context) pairs returned by successful reads, in order.
    /// The free context is zero when the read omitted its free function.
    pub fn handed_out(&self) -> Vec<(usize, usize)> {
        self.handed_out.lock().unwrap().clone()
    }

    /// (bytes, free context) pairs passed to the free function, in order.
    pub fn frees(&self) -> Vec<(usize, usize)> {
        self.frees.lock().unwrap().clone()
    }

    pub fn symbol_queries(&self) -> Vec<Vec<u8>> {
        self.symbol_queries.lock().unwrap().clone()
    }

    fn range(&self, address: u64, size: u64) -> Option<(usize, usize)> {
        let start = usize::try_from(address.checked_sub(self.base)?).ok()?;
        let end = start.checked_add(usize::try_from(size).ok()?)?;
        (end <= self.memory.len()).then_some((start, end))
    }
}

/// Per-read free context; points back at the target that handed it out.
struct FreeToken {
    target: *const MockTarget,
}

unsafe fn target<'a>(context: *mut c_void) -> &'a MockTarget {
    &*(context as *const MockTarget)
}

unsafe extern "C" fn mock_pointer_size(context: *mut c_void) -> u8 {
    let target = target(context);
    target.pointer_size_calls.fetch_add(1, Ordering::SeqCst);
    target.pointer_size
}

unsafe extern "C" fn mock_size_size(context: *mut c_void) -> u8 {
    target(context).size_size
}

unsafe extern "C" fn mock_read_bytes(
    context: *mut c_void,
    address: u64,
    size: u64,
    out_free_bytes: *mut Option<FreeBytesFunction>,
    out_free_context: *mut *mut c_void,
) -> *const c_void {
    let target = target(context);
    target.reads.fetch_add(1, Ordering::SeqCst);

    if target.fail_reads {
        return ptr::null();
    }
    let Some((start, _)) = target.range(address, size) else {
        return ptr::null();
    };

    let bytes = target.memory.as_ptr().add(start);
    let free_context = if target.omit_free {
        *out_free_bytes = None;
        ptr::null_mut()
    } else {
        let token = Box::into_raw(Box::new(FreeToken { target }));
        *out_free_bytes = Some(mock_free_bytes);
        *out_free_context = token.cast();
        token
    };

    target
        .handed_out
        .lock()
        .unwrap()
        .push((bytes as usize, free_context as usize));
    bytes.cast()
}

unsafe extern "C" fn mock_free_bytes(bytes: *const c_void, context: *mut c_void) {
    let token = Box::from_raw(context.cast::<FreeToken>());
    (*token.target)
        .frees
        .lock()
        .unwrap()
        .push((bytes as usize, context as usize));
}

unsafe extern "C" fn mock_string_length(context: *mut c_void, address: u64) -> u64 {
    let target = target(context);
    if let Some(length) = target.string_length {
        return length;
    }

    let Some((start, _)) = target.range(address, 0) else {
        return 0;
    };
    target.memory[start..]
        .iter()
        .position(|&b| b == 0)
        .map_or(0, |len| len as u64)
}

unsafe extern "C" fn mock_symbol_address(
    context: *mut c_void,
    name: *const c_char,
    name_length: u64,
) -> u64 {
    let target = target(context);
    let name = std::slice::from_raw_parts(name.cast::<u8>(), name_length as usize);
    target.symbol_queries.lock().unwrap().push(name.to_vec());

    target
        .symbols
        .iter()
        .find(|(symbol, _)| symbol.as_bytes() == name)
        .map_or(0, |&(_, address)| address)
}
