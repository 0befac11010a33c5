//! Constant pool bookkeeping for the builder.

use std::collections::HashMap;

use super::BuildError;
use crate::artifact::format;
use crate::artifact::PoolEntry;
use crate::model::Constant;

/// Insertion-ordered pool with an index for reuse.
///
/// Symbols (names, descriptors) are always shared. Value constants are shared only when
/// `share_constants` is set.
#[derive(Debug, Default)]
pub(crate) struct ConstantPool {
    entries: Vec<PoolEntry>,
    index: HashMap<PoolEntry, u16>,
    share_constants: bool,
}

impl ConstantPool {
    pub(crate) fn new(share_constants: bool) -> Self {
        Self { entries: Vec::new(), index: HashMap::new(), share_constants }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn push(&mut self, entry: PoolEntry, shared: bool) -> Result<u16, BuildError> {
        if shared {
            if let Some(&idx) = self.index.get(&entry) {
                return Ok(idx);
            }
        }
        if self.entries.len() >= format::MAX_POOL_ENTRIES {
            return Err(BuildError::LimitExceeded {
                what: "constant pool entries",
                limit: format::MAX_POOL_ENTRIES,
            });
        }
        let idx = self.entries.len() as u16;
        if shared {
            self.index.insert(entry.clone(), idx);
        }
        self.entries.push(entry);
        Ok(idx)
    }

    pub(crate) fn utf8(&mut self, text: &str) -> Result<u16, BuildError> {
        if text.len() > usize::from(u16::MAX) {
            return Err(BuildError::LimitExceeded {
                what: "utf8 entry bytes",
                limit: usize::from(u16::MAX),
            });
        }
        self.push(PoolEntry::Utf8(text.to_string()), true)
    }

    pub(crate) fn constant(&mut self, value: &Constant) -> Result<u16, BuildError> {
        let entry = match value {
            Constant::Str(s) => PoolEntry::Str(self.utf8(s)?),
            Constant::Int(v) => PoolEntry::Int(*v),
            Constant::Bool(v) => PoolEntry::Bool(*v),
        };
        self.push(entry, self.share_constants)
    }

    pub(crate) fn external(
        &mut self,
        target: &str,
        method: &str,
        descriptor: &str,
    ) -> Result<u16, BuildError> {
        let entry = PoolEntry::ExternalRef {
            target: self.utf8(target)?,
            method: self.utf8(method)?,
            descriptor: self.utf8(descriptor)?,
        };
        self.push(entry, true)
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.entries.len() as u16).to_le_bytes());
        for entry in &self.entries {
            match entry {
                PoolEntry::Utf8(text) => {
                    out.push(format::TAG_UTF8);
                    out.extend_from_slice(&(text.len() as u16).to_le_bytes());
                    out.extend_from_slice(text.as_bytes());
                }
                PoolEntry::Str(utf8) => {
                    out.push(format::TAG_STRING);
                    out.extend_from_slice(&utf8.to_le_bytes());
                }
                PoolEntry::Int(v) => {
                    out.push(format::TAG_INT);
                    out.extend_from_slice(&v.to_le_bytes());
                }
                PoolEntry::Bool(v) => {
                    out.push(format::TAG_BOOL);
                    out.push(u8::from(*v));
                }
                PoolEntry::ExternalRef { target, method, descriptor } => {
                    out.push(format::TAG_EXTERNAL_REF);
                    out.extend_from_slice(&target.to_le_bytes());
                    out.extend_from_slice(&method.to_le_bytes());
                    out.extend_from_slice(&descriptor.to_le_bytes());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_are_always_shared() {
        let mut pool = ConstantPool::new(false);
        let a = pool.utf8("println").unwrap();
        let b = pool.utf8("println").unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn constants_share_only_when_enabled() {
        let hello = Constant::from("hello");

        let mut shared = ConstantPool::new(true);
        let a = shared.constant(&hello).unwrap();
        let b = shared.constant(&hello).unwrap();
        assert_eq!(a, b);

        let mut separate = ConstantPool::new(false);
        let a = separate.constant(&hello).unwrap();
        let b = separate.constant(&hello).unwrap();
        assert_ne!(a, b);
        // The backing utf8 symbol is still shared.
        assert_eq!(separate.len(), 3);
    }

    #[test]
    fn encode_writes_count_then_entries() {
        let mut pool = ConstantPool::new(true);
        pool.constant(&Constant::Int(7)).unwrap();
        pool.constant(&Constant::Bool(true)).unwrap();
        let mut out = Vec::new();
        pool.encode(&mut out);
        assert_eq!(&out[..2], &2u16.to_le_bytes());
        assert_eq!(out[2], format::TAG_INT);
        assert_eq!(&out[3..11], &7i64.to_le_bytes());
        assert_eq!(&out[11..], &[format::TAG_BOOL, 1]);
    }
}
