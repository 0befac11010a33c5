//! Wire constants for the unit artifact format.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! magic "DLU1" | version u16 | flags u16 | name idx u16 | base idx u16
//! pool_count u16 | pool entries (tag u8 + payload)
//! member_count u16 | members (kind u8, flags u16, name idx u16, descriptor idx u16,
//!                             code_len u32, code bytes)
//! ```

use crate::model::{MemberKind, SemanticType, Signature};

pub const MAGIC: [u8; 4] = *b"DLU1";
pub const FORMAT_VERSION: u16 = 1;

/// Unit header flags.
pub const UNIT_PUBLIC: u16 = 0x0001;
pub const UNIT_INSTANTIABLE: u16 = 0x0002;

/// Member flags.
pub const MEMBER_PUBLIC: u16 = 0x0001;

/// Member kind bytes.
pub const KIND_INITIALIZER: u8 = 1;
pub const KIND_METHOD: u8 = 2;

/// Constant pool tags.
pub const TAG_UTF8: u8 = 1;
pub const TAG_STRING: u8 = 2;
pub const TAG_INT: u8 = 3;
pub const TAG_BOOL: u8 = 4;
pub const TAG_EXTERNAL_REF: u8 = 5;

/// Opcodes.
pub const OP_LOAD_RECEIVER: u8 = 0x01;
pub const OP_INVOKE_BASE_INIT: u8 = 0x02;
pub const OP_LOAD_CONSTANT: u8 = 0x03;
pub const OP_INVOKE_EXTERNAL: u8 = 0x04;
pub const OP_RETURN: u8 = 0x05;

/// Pool indices and counts are u16 on the wire.
pub const MAX_POOL_ENTRIES: usize = u16::MAX as usize;
pub const MAX_MEMBERS: usize = u16::MAX as usize;

pub fn kind_byte(kind: MemberKind) -> u8 {
    match kind {
        MemberKind::Initializer => KIND_INITIALIZER,
        MemberKind::Method => KIND_METHOD,
    }
}

pub fn kind_from_byte(byte: u8) -> Option<MemberKind> {
    match byte {
        KIND_INITIALIZER => Some(MemberKind::Initializer),
        KIND_METHOD => Some(MemberKind::Method),
        _ => None,
    }
}

fn type_code(ty: SemanticType) -> char {
    match ty {
        SemanticType::Void => 'V',
        SemanticType::Int => 'I',
        SemanticType::Bool => 'Z',
        SemanticType::String => 'S',
    }
}

fn type_from_code(code: char) -> Option<SemanticType> {
    match code {
        'V' => Some(SemanticType::Void),
        'I' => Some(SemanticType::Int),
        'Z' => Some(SemanticType::Bool),
        'S' => Some(SemanticType::String),
        _ => None,
    }
}

/// Render a signature as a descriptor string, e.g. `(S)V`.
pub fn descriptor(signature: &Signature) -> String {
    let mut out = String::with_capacity(signature.params.len() + 3);
    out.push('(');
    out.extend(signature.params.iter().map(|p| type_code(*p)));
    out.push(')');
    out.push(type_code(signature.returns));
    out
}

/// Parse a descriptor string. `V` is only valid in return position.
pub fn parse_descriptor(text: &str) -> Option<Signature> {
    let rest = text.strip_prefix('(')?;
    let (params, ret) = rest.split_once(')')?;
    let params = params
        .chars()
        .map(|c| type_from_code(c).filter(|t| *t != SemanticType::Void))
        .collect::<Option<Vec<_>>>()?;
    let mut ret_chars = ret.chars();
    let returns = type_from_code(ret_chars.next()?)?;
    if ret_chars.next().is_some() {
        return None;
    }
    Some(Signature::new(params, returns))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_renders_params_and_return() {
        assert_eq!(descriptor(&Signature::nullary()), "()V");
        assert_eq!(descriptor(&Signature::consumer(SemanticType::String)), "(S)V");
        let sig = Signature::new(vec![SemanticType::Int, SemanticType::Bool], SemanticType::String);
        assert_eq!(descriptor(&sig), "(IZ)S");
        assert_eq!(parse_descriptor("(IZ)S"), Some(sig));
    }

    #[test]
    fn parse_descriptor_rejects_malformed_text() {
        assert_eq!(parse_descriptor(""), None);
        assert_eq!(parse_descriptor("S)V"), None);
        assert_eq!(parse_descriptor("(S"), None);
        assert_eq!(parse_descriptor("(V)V"), None);
        assert_eq!(parse_descriptor("(Q)V"), None);
        assert_eq!(parse_descriptor("()VV"), None);
        assert_eq!(parse_descriptor("()"), None);
    }

    #[test]
    fn kind_bytes_are_stable() {
        assert_eq!(kind_byte(MemberKind::Initializer), 1);
        assert_eq!(kind_from_byte(2), Some(MemberKind::Method));
        assert_eq!(kind_from_byte(9), None);
    }
}
