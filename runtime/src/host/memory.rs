//! Byte-addressed host memory shared by work-items.
//!
//! Storage is a slice of `AtomicU8` so concurrent work-items can read and
//! write without `unsafe`; kernels that race on the same bytes get a
//! well-defined (if arbitrary) result. Read-modify-write atomics are
//! serialised by one `parking_lot` mutex per allocation.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;
use tessera_dtype::{DType, Value};

pub struct Memory {
    bytes: Box<[AtomicU8]>,
    atomics: Mutex<()>,
}

impl Memory {
    pub fn new(len: usize) -> Self {
        Self { bytes: (0..len).map(|_| AtomicU8::new(0)).collect(), atomics: Mutex::new(()) }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    fn range(&self, offset: isize, len: usize) -> Result<std::ops::Range<usize>, String> {
        let start = usize::try_from(offset).map_err(|_| format!("access at negative offset {offset}"))?;
        match start.checked_add(len) {
            Some(end) if end <= self.bytes.len() => Ok(start..end),
            _ => Err(format!("out-of-bounds access of {len} bytes at offset {start} (allocation is {} bytes)", self.len())),
        }
    }

    pub fn read_into(&self, offset: isize, out: &mut [u8]) -> Result<(), String> {
        let range = self.range(offset, out.len())?;
        for (dst, src) in out.iter_mut().zip(&self.bytes[range]) {
            *dst = src.load(Ordering::Relaxed);
        }
        Ok(())
    }

    pub fn read(&self, offset: isize, len: usize) -> Result<Vec<u8>, String> {
        let mut out = vec![0; len];
        self.read_into(offset, &mut out)?;
        Ok(out)
    }

    pub fn write(&self, offset: isize, data: &[u8]) -> Result<(), String> {
        let range = self.range(offset, data.len())?;
        for (dst, &src) in self.bytes[range].iter().zip(data) {
            dst.store(src, Ordering::Relaxed);
        }
        Ok(())
    }

    pub fn load(&self, dtype: &DType, offset: isize) -> Result<Value, String> {
        let mut raw = [0u8; 64];
        let size = dtype.bytes();
        if size <= raw.len() {
            self.read_into(offset, &mut raw[..size])?;
            Ok(Value::decode(dtype, &raw[..size]))
        } else {
            Ok(Value::decode(dtype, &self.read(offset, size)?))
        }
    }

    pub fn store(&self, offset: isize, value: &Value) -> Result<(), String> {
        self.write(offset, &value.to_bytes())
    }

    /// Applies `update` to the value at `offset` atomically and returns the old value.
    pub fn atomic_update(
        &self,
        dtype: &DType,
        offset: isize,
        update: impl FnOnce(&Value) -> Result<Value, String>,
    ) -> Result<Value, String> {
        let _guard = self.atomics.lock();
        let old = self.load(dtype, offset)?;
        let new = update(&old)?;
        self.store(offset, &new)?;
        Ok(old)
    }

    pub fn fill(&self, offset: usize, len: usize, pattern: &[u8]) -> Result<(), String> {
        let range = self.range(offset as isize, len)?;
        for (i, byte) in self.bytes[range].iter().enumerate() {
            byte.store(pattern[i % pattern.len()], Ordering::Relaxed);
        }
        Ok(())
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory").field("len", &self.len()).finish()
    }
}
