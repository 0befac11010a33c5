//! Unit builder: [`UnitDescription`] in, [`BinaryArtifact`] out.
//!
//! Building is a pure, deterministic transformation. Equal descriptions built with equal
//! options and catalogs produce byte-identical artifacts. Any failure aborts the whole build;
//! there is no partially-built output.
//!
//! Bodies are transcribed linearly. The instruction set has no control flow, so a body must
//! end in exactly one `Return`.

pub mod capabilities;
mod pool;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::artifact::{format, BinaryArtifact};
use crate::model::{
    Instruction, MemberDescription, MemberKind, Signature, UnitDescription, Visibility,
};

pub use capabilities::{CapabilityCatalog, CapabilityId};
use pool::ConstantPool;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("Invalid {what} name {name:?}")]
    InvalidName { what: &'static str, name: String },

    #[error("Duplicate {kind} member {name:?}")]
    DuplicateMember { kind: &'static str, name: String },

    #[error("Invalid initializer {name:?}: {detail}")]
    InvalidInitializer { name: String, detail: String },

    #[error("Unresolved external capability {target}::{method}{descriptor} in member {member:?}")]
    UnresolvedCapability { member: String, target: String, method: String, descriptor: String },

    #[error("Malformed body in member {member:?}: {detail}")]
    MalformedBody { member: String, detail: String },

    #[error("Too many {what} (limit {limit})")]
    LimitExceeded { what: &'static str, limit: usize },
}

/// Tunables that affect the emitted bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Share one pool slot between identical value constants.
    #[serde(default = "default_pool_constants")]
    pub pool_constants: bool,
}

fn default_pool_constants() -> bool {
    true
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { pool_constants: default_pool_constants() }
    }
}

/// Builder configured with a capability catalog and options.
#[derive(Debug, Clone)]
pub struct UnitBuilder {
    catalog: CapabilityCatalog,
    options: BuildOptions,
}

impl Default for UnitBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitBuilder {
    /// Builder over the standard capability catalog with default options.
    pub fn new() -> Self {
        Self { catalog: CapabilityCatalog::standard(), options: BuildOptions::default() }
    }

    pub fn with_catalog(mut self, catalog: CapabilityCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn catalog(&self) -> &CapabilityCatalog {
        &self.catalog
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Encode `description` into an artifact.
    pub fn build(&self, description: &UnitDescription) -> Result<BinaryArtifact, BuildError> {
        check_name("unit", &description.name)?;
        check_name("base", &description.base)?;
        check_unique_members(&description.members)?;
        check_initializers(&description.members)?;
        if description.members.len() > format::MAX_MEMBERS {
            return Err(BuildError::LimitExceeded { what: "members", limit: format::MAX_MEMBERS });
        }

        let mut pool = ConstantPool::new(self.options.pool_constants);
        let name_idx = pool.utf8(&description.name)?;
        let base_idx = pool.utf8(&description.base)?;

        let mut members = Vec::new();
        for member in &description.members {
            self.emit_member(member, &mut pool, &mut members)?;
        }

        let mut flags = format::UNIT_INSTANTIABLE;
        if description.visibility == Visibility::Public {
            flags |= format::UNIT_PUBLIC;
        }

        let mut out = Vec::with_capacity(16 + members.len());
        out.extend_from_slice(&format::MAGIC);
        out.extend_from_slice(&format::FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&name_idx.to_le_bytes());
        out.extend_from_slice(&base_idx.to_le_bytes());
        pool.encode(&mut out);
        out.extend_from_slice(&(description.members.len() as u16).to_le_bytes());
        out.extend_from_slice(&members);

        debug!(
            unit = %description.name,
            bytes = out.len(),
            pool_entries = pool.len(),
            members = description.members.len(),
            "unit built"
        );
        Ok(BinaryArtifact::from_bytes(out))
    }

    fn emit_member(
        &self,
        member: &MemberDescription,
        pool: &mut ConstantPool,
        out: &mut Vec<u8>,
    ) -> Result<(), BuildError> {
        let default_body;
        let is_initializer = member.kind == MemberKind::Initializer;
        let body: &[Instruction] = if is_initializer && member.body.is_empty() {
            default_body = default_initializer_body();
            &default_body
        } else {
            &member.body
        };
        check_linear_body(&member.name, body)?;

        let name_idx = pool.utf8(&member.name)?;
        let descriptor_idx = pool.utf8(&format::descriptor(&member.signature))?;

        let mut code = Vec::with_capacity(body.len() * 3);
        for instruction in body {
            self.emit_instruction(&member.name, instruction, pool, &mut code)?;
        }
        let code_len = u32::try_from(code.len()).map_err(|_| BuildError::LimitExceeded {
            what: "code bytes per member",
            limit: u32::MAX as usize,
        })?;

        out.push(format::kind_byte(member.kind));
        out.extend_from_slice(&format::MEMBER_PUBLIC.to_le_bytes());
        out.extend_from_slice(&name_idx.to_le_bytes());
        out.extend_from_slice(&descriptor_idx.to_le_bytes());
        out.extend_from_slice(&code_len.to_le_bytes());
        out.extend_from_slice(&code);
        Ok(())
    }

    fn emit_instruction(
        &self,
        member: &str,
        instruction: &Instruction,
        pool: &mut ConstantPool,
        code: &mut Vec<u8>,
    ) -> Result<(), BuildError> {
        match instruction {
            Instruction::LoadReceiver => code.push(format::OP_LOAD_RECEIVER),
            Instruction::InvokeBaseInitializer => code.push(format::OP_INVOKE_BASE_INIT),
            Instruction::LoadConstant { value } => {
                let idx = pool.constant(value)?;
                code.push(format::OP_LOAD_CONSTANT);
                code.extend_from_slice(&idx.to_le_bytes());
            }
            Instruction::InvokeExternal { target, method, signature } => {
                let id = self.catalog.lookup(target, method, signature).ok_or_else(|| {
                    BuildError::UnresolvedCapability {
                        member: member.to_string(),
                        target: target.clone(),
                        method: method.clone(),
                        descriptor: format::descriptor(signature),
                    }
                })?;
                let idx = pool.external(&id.target, &id.method, &id.descriptor())?;
                code.push(format::OP_INVOKE_EXTERNAL);
                code.extend_from_slice(&idx.to_le_bytes());
            }
            Instruction::Return => code.push(format::OP_RETURN),
        }
        Ok(())
    }
}

/// Build with the standard catalog and default options.
pub fn build(description: &UnitDescription) -> Result<BinaryArtifact, BuildError> {
    UnitBuilder::new().build(description)
}

/// Load the receiver, call the base initializer, return.
pub fn default_initializer_body() -> Vec<Instruction> {
    vec![Instruction::LoadReceiver, Instruction::InvokeBaseInitializer, Instruction::Return]
}

fn check_name(what: &'static str, name: &str) -> Result<(), BuildError> {
    if name.trim().is_empty() || name.chars().any(char::is_whitespace) {
        return Err(BuildError::InvalidName { what, name: name.to_string() });
    }
    Ok(())
}

fn check_unique_members(members: &[MemberDescription]) -> Result<(), BuildError> {
    let mut seen = HashSet::new();
    for member in members {
        check_name("member", &member.name)?;
        if !seen.insert((member.kind, member.name.as_str())) {
            return Err(BuildError::DuplicateMember {
                kind: member.kind.as_str(),
                name: member.name.clone(),
            });
        }
    }
    Ok(())
}

/// At most one initializer, and it takes no arguments and returns nothing.
fn check_initializers(members: &[MemberDescription]) -> Result<(), BuildError> {
    let mut first: Option<&str> = None;
    for member in members.iter().filter(|m| m.kind == MemberKind::Initializer) {
        if member.signature != Signature::nullary() {
            return Err(BuildError::InvalidInitializer {
                name: member.name.clone(),
                detail: format!(
                    "signature must be ()V, found {}",
                    format::descriptor(&member.signature)
                ),
            });
        }
        if let Some(first) = first {
            return Err(BuildError::InvalidInitializer {
                name: member.name.clone(),
                detail: format!("unit already has initializer {first:?}"),
            });
        }
        first = Some(member.name.as_str());
    }
    Ok(())
}

fn check_linear_body(member: &str, body: &[Instruction]) -> Result<(), BuildError> {
    let malformed = |detail: &str| BuildError::MalformedBody {
        member: member.to_string(),
        detail: detail.to_string(),
    };
    match body.iter().position(|i| *i == Instruction::Return) {
        None if body.is_empty() => Err(malformed("body is empty")),
        None => Err(malformed("body does not end with return")),
        Some(pos) if pos + 1 != body.len() => Err(malformed("instructions after return")),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{decode, Op};
    use crate::model::{hello_world_unit, Constant, SemanticType};

    fn println_string() -> Instruction {
        let signature = Signature::consumer(SemanticType::String);
        Instruction::invoke_external("std.out", "println", signature)
    }

    #[test]
    fn build_is_deterministic() {
        let unit = hello_world_unit("HelloWorld", "Hello, World!");
        let first = build(&unit).unwrap();
        for _ in 0..5 {
            assert_eq!(build(&unit).unwrap().as_bytes(), first.as_bytes());
        }
    }

    #[test]
    fn default_initializer_gets_receiver_base_return() {
        let artifact = build(&hello_world_unit("HelloWorld", "hi")).unwrap();
        let unit = decode(artifact.as_bytes()).unwrap();
        let init = unit.initializer().expect("initializer");
        assert_eq!(init.code, vec![Op::LoadReceiver, Op::InvokeBaseInitializer, Op::Return]);
        assert!(unit.is_public());
        assert!(unit.is_instantiable());
    }

    #[test]
    fn custom_initializer_body_is_emitted_verbatim() {
        let body = vec![
            Instruction::LoadReceiver,
            Instruction::InvokeBaseInitializer,
            Instruction::load_constant("ready"),
            println_string(),
            Instruction::Return,
        ];
        let desc = UnitDescription::new("Custom").with_member(MemberDescription::initializer(body));
        let unit = decode(build(&desc).unwrap().as_bytes()).unwrap();
        let init = unit.initializer().unwrap();
        assert_eq!(init.code.len(), 5);
        assert!(matches!(init.code[2], Op::LoadConstant(_)));
        assert!(matches!(init.code[3], Op::InvokeExternal(_)));
    }

    #[test]
    fn method_body_resolves_constants_and_externals() {
        let artifact = build(&hello_world_unit("HelloWorld", "Hello, World!")).unwrap();
        let unit = decode(artifact.as_bytes()).unwrap();
        let say = unit.member(MemberKind::Method, "sayHello").unwrap();
        let Op::LoadConstant(c) = say.code[0] else { panic!("expected constant") };
        assert_eq!(unit.constant(c), Some(Constant::from("Hello, World!")));
        let Op::InvokeExternal(e) = say.code[1] else { panic!("expected external") };
        let ext = unit.external(e).unwrap();
        assert_eq!((ext.target.as_str(), ext.method.as_str()), ("std.out", "println"));
        assert_eq!(ext.signature, Signature::consumer(SemanticType::String));
    }

    #[test]
    fn unknown_capability_fails_fast() {
        let desc = UnitDescription::new("Broken").with_member(MemberDescription::method(
            "go",
            Signature::nullary(),
            vec![
                Instruction::load_constant("x"),
                Instruction::invoke_external(
                    "std.net",
                    "send",
                    Signature::consumer(SemanticType::String),
                ),
                Instruction::Return,
            ],
        ));
        match build(&desc) {
            Err(BuildError::UnresolvedCapability { member, target, method, descriptor }) => {
                assert_eq!(member, "go");
                assert_eq!(target, "std.net");
                assert_eq!(method, "send");
                assert_eq!(descriptor, "(S)V");
            }
            other => panic!("expected UnresolvedCapability, got {other:?}"),
        }
    }

    #[test]
    fn signature_mismatch_is_unresolved() {
        let desc = UnitDescription::new("Mismatch").with_member(MemberDescription::method(
            "go",
            Signature::nullary(),
            vec![
                Instruction::invoke_external("std.out", "println", Signature::nullary()),
                Instruction::Return,
            ],
        ));
        assert!(matches!(build(&desc), Err(BuildError::UnresolvedCapability { .. })));
    }

    #[test]
    fn empty_catalog_rejects_every_external() {
        let builder = UnitBuilder::new().with_catalog(CapabilityCatalog::new());
        let err = builder.build(&hello_world_unit("HelloWorld", "hi")).unwrap_err();
        assert!(matches!(err, BuildError::UnresolvedCapability { .. }));
    }

    #[test]
    fn pooling_option_changes_pool_size_only_for_repeated_constants() {
        let body = vec![
            Instruction::load_constant("twice"),
            println_string(),
            Instruction::load_constant("twice"),
            println_string(),
            Instruction::Return,
        ];
        let desc = UnitDescription::new("Twice").with_member(MemberDescription::method(
            "run",
            Signature::nullary(),
            body,
        ));
        let pooled = UnitBuilder::new().build(&desc).unwrap();
        let unpooled = UnitBuilder::new()
            .with_options(BuildOptions { pool_constants: false })
            .build(&desc)
            .unwrap();
        let pooled_unit = decode(pooled.as_bytes()).unwrap();
        let unpooled_unit = decode(unpooled.as_bytes()).unwrap();
        assert_eq!(unpooled_unit.pool.len(), pooled_unit.pool.len() + 1);
    }

    #[test]
    fn rejects_duplicate_members() {
        let method =
            MemberDescription::method("a", Signature::nullary(), vec![Instruction::Return]);
        let desc = UnitDescription::new("Dup").with_member(method.clone()).with_member(method);
        assert_eq!(
            build(&desc),
            Err(BuildError::DuplicateMember { kind: "method", name: "a".into() })
        );
    }

    #[test]
    fn rejects_initializer_with_parameters() {
        let mut init = MemberDescription::default_initializer();
        init.signature = Signature::consumer(SemanticType::String);
        let desc = UnitDescription::new("Takes").with_member(init);
        assert_eq!(
            build(&desc),
            Err(BuildError::InvalidInitializer {
                name: "<init>".into(),
                detail: "signature must be ()V, found (S)V".into(),
            })
        );

        let mut init = MemberDescription::default_initializer();
        init.signature = Signature::new(vec![], SemanticType::Int);
        let desc = UnitDescription::new("Gives").with_member(init);
        assert!(matches!(build(&desc), Err(BuildError::InvalidInitializer { .. })));
    }

    #[test]
    fn rejects_second_initializer_under_another_name() {
        let mut second = MemberDescription::default_initializer();
        second.name = "<init2>".into();
        let desc = UnitDescription::new("TwoInits")
            .with_member(MemberDescription::default_initializer())
            .with_member(second);
        let err = build(&desc).unwrap_err();
        assert_eq!(
            err,
            BuildError::InvalidInitializer {
                name: "<init2>".into(),
                detail: "unit already has initializer \"<init>\"".into(),
            }
        );
    }

    #[test]
    fn rejects_invalid_names() {
        assert!(matches!(
            build(&UnitDescription::new("")),
            Err(BuildError::InvalidName { what: "unit", .. })
        ));
        assert!(matches!(
            build(&UnitDescription::new("Has Space")),
            Err(BuildError::InvalidName { what: "unit", .. })
        ));
        let desc = UnitDescription::new("Ok").with_member(MemberDescription::method(
            " ",
            Signature::nullary(),
            vec![Instruction::Return],
        ));
        assert!(matches!(build(&desc), Err(BuildError::InvalidName { what: "member", .. })));
    }

    #[test]
    fn rejects_non_linear_or_unterminated_bodies() {
        let method = |body| {
            UnitDescription::new("Body")
                .with_member(MemberDescription::method("m", Signature::nullary(), body))
        };
        let empty = build(&method(vec![])).unwrap_err();
        assert!(matches!(empty, BuildError::MalformedBody { .. }));

        let unterminated = build(&method(vec![Instruction::LoadReceiver])).unwrap_err();
        assert!(unterminated.to_string().contains("does not end with return"));

        let trailing =
            build(&method(vec![Instruction::Return, Instruction::LoadReceiver])).unwrap_err();
        assert!(trailing.to_string().contains("instructions after return"));
    }

    #[test]
    fn unit_without_members_still_builds() {
        let artifact = build(&UnitDescription::new("Empty")).unwrap();
        let unit = decode(artifact.as_bytes()).unwrap();
        assert_eq!(unit.name, "Empty");
        assert!(unit.members.is_empty());
    }

    #[test]
    fn private_unit_clears_public_flag() {
        let desc = UnitDescription::new("Hidden").with_visibility(Visibility::Private);
        let unit = decode(build(&desc).unwrap().as_bytes()).unwrap();
        assert!(!unit.is_public());
        assert!(unit.is_instantiable());
    }
}
