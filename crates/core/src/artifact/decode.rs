//! Artifact decoder: bytes back into a structured [`DecodedUnit`].
//!
//! Decoding checks structure only (magic, version, pool references, opcodes). Type and stack
//! checks belong to whichever host verifies the unit.

use thiserror::Error;

use super::format::{self, kind_from_byte, parse_descriptor};
use crate::model::{Constant, MemberKind, Signature};

/// Structural decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("bad magic; not a unit artifact")]
    BadMagic,
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),
    #[error("unexpected end of artifact at offset {offset} (needed {needed} more bytes)")]
    UnexpectedEof { offset: usize, needed: usize },
    #[error("unknown constant pool tag {tag} at offset {offset}")]
    UnknownPoolTag { tag: u8, offset: usize },
    #[error("pool entry #{index} is not valid UTF-8")]
    InvalidUtf8 { index: usize },
    #[error("pool index #{index} does not refer to a {expected} entry")]
    BadPoolIndex { index: u16, expected: &'static str },
    #[error("malformed descriptor {0:?}")]
    BadDescriptor(String),
    #[error("unknown member kind {0}")]
    UnknownMemberKind(u8),
    #[error("unknown opcode 0x{opcode:02x} in member {member}")]
    UnknownOpcode { opcode: u8, member: String },
    #[error("{0} trailing bytes after the last member")]
    TrailingBytes(usize),
}

/// A constant pool entry as stored on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PoolEntry {
    Utf8(String),
    /// String constant; refers to a `Utf8` entry.
    Str(u16),
    Int(i64),
    Bool(bool),
    ExternalRef { target: u16, method: u16, descriptor: u16 },
}

impl PoolEntry {
    pub fn tag_name(&self) -> &'static str {
        match self {
            PoolEntry::Utf8(_) => "utf8",
            PoolEntry::Str(_) => "string",
            PoolEntry::Int(_) => "int",
            PoolEntry::Bool(_) => "bool",
            PoolEntry::ExternalRef { .. } => "external_ref",
        }
    }
}

/// A decoded instruction; operands are pool indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    LoadReceiver,
    InvokeBaseInitializer,
    LoadConstant(u16),
    InvokeExternal(u16),
    Return,
}

/// A resolved view of an `ExternalRef` pool entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRef {
    pub target: String,
    pub method: String,
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMember {
    pub kind: MemberKind,
    pub flags: u16,
    pub name: String,
    pub signature: Signature,
    pub code: Vec<Op>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedUnit {
    pub version: u16,
    pub flags: u16,
    pub name: String,
    pub base: String,
    pub pool: Vec<PoolEntry>,
    pub members: Vec<DecodedMember>,
}

impl DecodedUnit {
    pub fn is_public(&self) -> bool {
        self.flags & format::UNIT_PUBLIC != 0
    }

    pub fn is_instantiable(&self) -> bool {
        self.flags & format::UNIT_INSTANTIABLE != 0
    }

    pub fn member(&self, kind: MemberKind, name: &str) -> Option<&DecodedMember> {
        self.members.iter().find(|m| m.kind == kind && m.name == name)
    }

    pub fn initializer(&self) -> Option<&DecodedMember> {
        self.members.iter().find(|m| m.kind == MemberKind::Initializer)
    }

    /// The constant a `LoadConstant` operand points at.
    pub fn constant(&self, index: u16) -> Option<Constant> {
        match self.pool.get(usize::from(index))? {
            PoolEntry::Str(utf8) => self.utf8(*utf8).map(|s| Constant::Str(s.to_string())),
            PoolEntry::Int(v) => Some(Constant::Int(*v)),
            PoolEntry::Bool(v) => Some(Constant::Bool(*v)),
            _ => None,
        }
    }

    /// The external reference an `InvokeExternal` operand points at.
    pub fn external(&self, index: u16) -> Option<ExternalRef> {
        match self.pool.get(usize::from(index))? {
            PoolEntry::ExternalRef { target, method, descriptor } => Some(ExternalRef {
                target: self.utf8(*target)?.to_string(),
                method: self.utf8(*method)?.to_string(),
                signature: parse_descriptor(self.utf8(*descriptor)?)?,
            }),
            _ => None,
        }
    }

    pub fn utf8(&self, index: u16) -> Option<&str> {
        match self.pool.get(usize::from(index))? {
            PoolEntry::Utf8(s) => Some(s),
            _ => None,
        }
    }

    /// Human-readable rendering of one instruction, used by disassembly listings.
    pub fn render_op(&self, op: &Op) -> String {
        match op {
            Op::LoadReceiver => "load_receiver".to_string(),
            Op::InvokeBaseInitializer => format!("invoke_base_initializer {}", self.base),
            Op::LoadConstant(idx) => match self.constant(*idx) {
                Some(Constant::Str(s)) => format!("load_constant #{idx} {s:?}"),
                Some(Constant::Int(v)) => format!("load_constant #{idx} {v}"),
                Some(Constant::Bool(v)) => format!("load_constant #{idx} {v}"),
                None => format!("load_constant #{idx} <invalid>"),
            },
            Op::InvokeExternal(idx) => match self.external(*idx) {
                Some(ext) => format!(
                    "invoke_external #{idx} {}::{}{}",
                    ext.target,
                    ext.method,
                    format::descriptor(&ext.signature)
                ),
                None => format!("invoke_external #{idx} <invalid>"),
            },
            Op::Return => "return".to_string(),
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.bytes.len() - self.pos;
        if remaining < n {
            return Err(DecodeError::UnexpectedEof { offset: self.pos, needed: n - remaining });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i64(&mut self) -> Result<i64, DecodeError> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(i64::from_le_bytes(buf))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

/// Decode artifact bytes.
pub fn decode(bytes: &[u8]) -> Result<DecodedUnit, DecodeError> {
    let mut r = Reader::new(bytes);

    if r.take(format::MAGIC.len()).map_err(|_| DecodeError::BadMagic)? != format::MAGIC {
        return Err(DecodeError::BadMagic);
    }
    let version = r.u16()?;
    if version != format::FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let flags = r.u16()?;
    let name_idx = r.u16()?;
    let base_idx = r.u16()?;

    let pool = read_pool(&mut r)?;
    check_pool_refs(&pool)?;

    let lookup_utf8 = |index: u16| -> Result<String, DecodeError> {
        match pool.get(usize::from(index)) {
            Some(PoolEntry::Utf8(s)) => Ok(s.clone()),
            _ => Err(DecodeError::BadPoolIndex { index, expected: "utf8" }),
        }
    };

    let name = lookup_utf8(name_idx)?;
    let base = lookup_utf8(base_idx)?;

    let member_count = r.u16()?;
    let mut members = Vec::with_capacity(usize::from(member_count));
    for _ in 0..member_count {
        let kind_byte = r.u8()?;
        let kind = kind_from_byte(kind_byte).ok_or(DecodeError::UnknownMemberKind(kind_byte))?;
        let member_flags = r.u16()?;
        let member_name = lookup_utf8(r.u16()?)?;
        let descriptor = lookup_utf8(r.u16()?)?;
        let signature =
            parse_descriptor(&descriptor).ok_or(DecodeError::BadDescriptor(descriptor))?;
        let code_len = r.u32()? as usize;
        let code_bytes = r.take(code_len)?;
        let code = read_code(code_bytes, &pool, &member_name)?;
        members.push(DecodedMember {
            kind,
            flags: member_flags,
            name: member_name,
            signature,
            code,
        });
    }

    if r.remaining() != 0 {
        return Err(DecodeError::TrailingBytes(r.remaining()));
    }

    Ok(DecodedUnit { version, flags, name, base, pool, members })
}

fn read_pool(r: &mut Reader<'_>) -> Result<Vec<PoolEntry>, DecodeError> {
    let count = r.u16()?;
    let mut pool = Vec::with_capacity(usize::from(count));
    for index in 0..usize::from(count) {
        let offset = r.pos;
        let entry = match r.u8()? {
            format::TAG_UTF8 => {
                let len = usize::from(r.u16()?);
                let raw = r.take(len)?;
                let text = std::str::from_utf8(raw)
                    .map_err(|_| DecodeError::InvalidUtf8 { index })?;
                PoolEntry::Utf8(text.to_string())
            }
            format::TAG_STRING => PoolEntry::Str(r.u16()?),
            format::TAG_INT => PoolEntry::Int(r.i64()?),
            format::TAG_BOOL => PoolEntry::Bool(r.u8()? != 0),
            format::TAG_EXTERNAL_REF => PoolEntry::ExternalRef {
                target: r.u16()?,
                method: r.u16()?,
                descriptor: r.u16()?,
            },
            tag => return Err(DecodeError::UnknownPoolTag { tag, offset }),
        };
        pool.push(entry);
    }
    Ok(pool)
}

/// Every cross-reference inside the pool must land on a `Utf8` entry, and external
/// descriptors must parse.
fn check_pool_refs(pool: &[PoolEntry]) -> Result<(), DecodeError> {
    let utf8 = |index: u16| match pool.get(usize::from(index)) {
        Some(PoolEntry::Utf8(s)) => Ok(s.as_str()),
        _ => Err(DecodeError::BadPoolIndex { index, expected: "utf8" }),
    };
    for entry in pool {
        match entry {
            PoolEntry::Str(idx) => {
                utf8(*idx)?;
            }
            PoolEntry::ExternalRef { target, method, descriptor } => {
                utf8(*target)?;
                utf8(*method)?;
                let text = utf8(*descriptor)?;
                if parse_descriptor(text).is_none() {
                    return Err(DecodeError::BadDescriptor(text.to_string()));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn read_code(bytes: &[u8], pool: &[PoolEntry], member: &str) -> Result<Vec<Op>, DecodeError> {
    let mut r = Reader::new(bytes);
    let mut code = Vec::new();
    while r.remaining() > 0 {
        let op = match r.u8()? {
            format::OP_LOAD_RECEIVER => Op::LoadReceiver,
            format::OP_INVOKE_BASE_INIT => Op::InvokeBaseInitializer,
            format::OP_LOAD_CONSTANT => {
                let index = r.u16()?;
                match pool.get(usize::from(index)) {
                    Some(PoolEntry::Str(_) | PoolEntry::Int(_) | PoolEntry::Bool(_)) => {}
                    _ => return Err(DecodeError::BadPoolIndex { index, expected: "constant" }),
                }
                Op::LoadConstant(index)
            }
            format::OP_INVOKE_EXTERNAL => {
                let index = r.u16()?;
                match pool.get(usize::from(index)) {
                    Some(PoolEntry::ExternalRef { .. }) => {}
                    _ => {
                        return Err(DecodeError::BadPoolIndex { index, expected: "external_ref" })
                    }
                }
                Op::InvokeExternal(index)
            }
            format::OP_RETURN => Op::Return,
            opcode => {
                return Err(DecodeError::UnknownOpcode { opcode, member: member.to_string() })
            }
        };
        code.push(op);
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_unit_bytes() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&format::MAGIC);
        out.extend_from_slice(&format::FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(format::UNIT_PUBLIC | format::UNIT_INSTANTIABLE).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // name
        out.extend_from_slice(&1u16.to_le_bytes()); // base
        out.extend_from_slice(&2u16.to_le_bytes()); // pool count
        for text in ["Empty", "unit.Object"] {
            out.push(format::TAG_UTF8);
            out.extend_from_slice(&(text.len() as u16).to_le_bytes());
            out.extend_from_slice(text.as_bytes());
        }
        out.extend_from_slice(&0u16.to_le_bytes()); // members
        out
    }

    #[test]
    fn decodes_hand_written_minimal_unit() {
        let unit = decode(&minimal_unit_bytes()).expect("decode");
        assert_eq!(unit.name, "Empty");
        assert_eq!(unit.base, "unit.Object");
        assert!(unit.is_public());
        assert!(unit.is_instantiable());
        assert!(unit.members.is_empty());
        assert!(unit.initializer().is_none());
    }

    #[test]
    fn rejects_bad_magic_and_empty_input() {
        assert_eq!(decode(b""), Err(DecodeError::BadMagic));
        assert_eq!(decode(b"NOPE...."), Err(DecodeError::BadMagic));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = minimal_unit_bytes();
        bytes[4] = 9;
        assert_eq!(decode(&bytes), Err(DecodeError::UnsupportedVersion(9)));
    }

    #[test]
    fn rejects_truncated_input() {
        let bytes = minimal_unit_bytes();
        let err = decode(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEof { .. }), "got {err:?}");
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = minimal_unit_bytes();
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        assert_eq!(decode(&bytes), Err(DecodeError::TrailingBytes(2)));
    }

    #[test]
    fn rejects_name_pointing_outside_pool() {
        let mut bytes = minimal_unit_bytes();
        // name idx lives right after magic + version + flags
        bytes[8..10].copy_from_slice(&7u16.to_le_bytes());
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::BadPoolIndex { index: 7, expected: "utf8" })
        );
    }
}
