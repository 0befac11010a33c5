//! Logical description of a unit before it is encoded.
//!
//! Everything here is plain data: the builder turns a [`UnitDescription`] into bytes, and
//! frontends can author descriptions as YAML/JSON through serde.

use serde::{Deserialize, Serialize};

/// Name of the implicit base unit every generated unit extends.
pub const DEFAULT_BASE: &str = "unit.Object";

/// Visibility of a generated unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// Whether a member is the designated initializer or a regular callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    Initializer,
    Method,
}

impl MemberKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberKind::Initializer => "initializer",
            MemberKind::Method => "method",
        }
    }
}

/// Semantic type of a parameter, a return value, or a stack value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Void,
    Int,
    Bool,
    String,
}

/// Ordered parameter types plus a return type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Signature {
    #[serde(default)]
    pub params: Vec<SemanticType>,
    #[serde(default = "void")]
    pub returns: SemanticType,
}

fn void() -> SemanticType {
    SemanticType::Void
}

impl Signature {
    pub fn new(params: Vec<SemanticType>, returns: SemanticType) -> Self {
        Self { params, returns }
    }

    /// `() -> void`, the shape of initializers and invocable entry points.
    pub fn nullary() -> Self {
        Self::new(Vec::new(), SemanticType::Void)
    }

    /// `(param) -> void`.
    pub fn consumer(param: SemanticType) -> Self {
        Self::new(vec![param], SemanticType::Void)
    }

    pub fn is_nullary(&self) -> bool {
        self.params.is_empty()
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::nullary()
    }
}

/// A constant value carried by [`Instruction::LoadConstant`].
///
/// Serialized untagged so descriptions can write `value: "Hello"` or `value: 42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Constant {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Constant {
    pub fn semantic_type(&self) -> SemanticType {
        match self {
            Constant::Bool(_) => SemanticType::Bool,
            Constant::Int(_) => SemanticType::Int,
            Constant::Str(_) => SemanticType::String,
        }
    }
}

impl From<&str> for Constant {
    fn from(value: &str) -> Self {
        Constant::Str(value.to_string())
    }
}

impl From<String> for Constant {
    fn from(value: String) -> Self {
        Constant::Str(value)
    }
}

impl From<i64> for Constant {
    fn from(value: i64) -> Self {
        Constant::Int(value)
    }
}

impl From<bool> for Constant {
    fn from(value: bool) -> Self {
        Constant::Bool(value)
    }
}

/// One step of a member body. Bodies are linear; there are no branch or loop variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    /// Push the receiver (the instance being initialized or invoked on).
    LoadReceiver,
    /// Pop the receiver and run the base unit's zero-argument initializer.
    InvokeBaseInitializer,
    /// Push a constant from the pool.
    LoadConstant { value: Constant },
    /// Call a host-provided capability such as `std.out::println`.
    InvokeExternal {
        target: String,
        method: String,
        #[serde(default)]
        signature: Signature,
    },
    /// Leave the current member.
    Return,
}

impl Instruction {
    pub fn load_constant(value: impl Into<Constant>) -> Self {
        Instruction::LoadConstant { value: value.into() }
    }

    pub fn invoke_external(
        target: impl Into<String>,
        method: impl Into<String>,
        signature: Signature,
    ) -> Self {
        Instruction::InvokeExternal { target: target.into(), method: method.into(), signature }
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::LoadReceiver => "load_receiver",
            Instruction::InvokeBaseInitializer => "invoke_base_initializer",
            Instruction::LoadConstant { .. } => "load_constant",
            Instruction::InvokeExternal { .. } => "invoke_external",
            Instruction::Return => "return",
        }
    }
}

/// A member of a unit: the initializer or a method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDescription {
    pub kind: MemberKind,
    pub name: String,
    #[serde(default)]
    pub signature: Signature,
    /// For initializers, an empty body means "use the default constructor body".
    #[serde(default)]
    pub body: Vec<Instruction>,
}

impl MemberDescription {
    /// Conventional name of the initializer member.
    pub const INITIALIZER_NAME: &'static str = "<init>";

    /// An initializer whose body the builder fills in (load receiver, call base, return).
    pub fn default_initializer() -> Self {
        Self::initializer(Vec::new())
    }

    pub fn initializer(body: Vec<Instruction>) -> Self {
        Self {
            kind: MemberKind::Initializer,
            name: Self::INITIALIZER_NAME.to_string(),
            signature: Signature::nullary(),
            body,
        }
    }

    pub fn method(name: impl Into<String>, signature: Signature, body: Vec<Instruction>) -> Self {
        Self { kind: MemberKind::Method, name: name.into(), signature, body }
    }
}

/// The full logical description of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDescription {
    pub name: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default = "default_base")]
    pub base: String,
    #[serde(default)]
    pub members: Vec<MemberDescription>,
}

fn default_base() -> String {
    DEFAULT_BASE.to_string()
}

impl UnitDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            base: default_base(),
            members: Vec::new(),
        }
    }

    /// Builder-style helper to append a member.
    pub fn with_member(mut self, member: MemberDescription) -> Self {
        self.members.push(member);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn member(&self, kind: MemberKind, name: &str) -> Option<&MemberDescription> {
        self.members.iter().find(|m| m.kind == kind && m.name == name)
    }
}

/// The classic smoke-test unit: a default initializer plus `sayHello()`, which prints
/// `message` on the standard output stream.
pub fn hello_world_unit(name: &str, message: &str) -> UnitDescription {
    UnitDescription::new(name).with_member(MemberDescription::default_initializer()).with_member(
        MemberDescription::method(
            "sayHello",
            Signature::nullary(),
            vec![
                Instruction::load_constant(message),
                Instruction::invoke_external(
                    "std.out",
                    "println",
                    Signature::consumer(SemanticType::String),
                ),
                Instruction::Return,
            ],
        ),
    )
}
