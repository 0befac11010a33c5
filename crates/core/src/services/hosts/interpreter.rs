use tracing::debug;

use super::{CapturedOutput, OutputSink, Stream};
use crate::artifact::format::descriptor;
use crate::artifact::{decode, BinaryArtifact, DecodedMember, DecodedUnit, ExternalRef, Op};
use crate::builder::{CapabilityCatalog, CapabilityId};
use crate::model::{Constant, MemberKind, SemanticType, Signature, DEFAULT_BASE};
use crate::services::loader::{InvokeError, Invoker, MaterializeError, Materializer};

/// A runtime value on the interpreter stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Receiver,
    Int(i64),
    Bool(bool),
    Str(String),
}

impl Value {
    fn render(&self) -> String {
        match self {
            Value::Receiver => "<receiver>".to_string(),
            Value::Int(v) => v.to_string(),
            Value::Bool(v) => v.to_string(),
            Value::Str(s) => s.clone(),
        }
    }
}

impl From<Constant> for Value {
    fn from(value: Constant) -> Self {
        match value {
            Constant::Int(v) => Value::Int(v),
            Constant::Bool(v) => Value::Bool(v),
            Constant::Str(s) => Value::Str(s),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    stream: Stream,
    newline: bool,
}

/// Linked instruction: pool references are already resolved.
#[derive(Debug, Clone)]
enum Step {
    LoadReceiver,
    InvokeBase,
    Push(Value),
    Call(Binding),
    Return,
}

/// Stack slot type used during verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Receiver,
    Typed(SemanticType),
}

#[derive(Debug)]
pub struct LoadedMember {
    kind: MemberKind,
    name: String,
    signature: Signature,
    steps: Vec<Step>,
}

impl LoadedMember {
    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

/// A verified, linked unit ready to be instantiated.
#[derive(Debug)]
pub struct LoadedUnit {
    name: String,
    base: String,
    public: bool,
    instantiable: bool,
    digest: String,
    members: Vec<LoadedMember>,
}

impl LoadedUnit {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    /// SHA-256 of the artifact this unit was materialized from.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn members(&self) -> &[LoadedMember] {
        &self.members
    }

    pub fn method(&self, name: &str) -> Option<&LoadedMember> {
        self.members.iter().find(|m| m.kind == MemberKind::Method && m.name == name)
    }

    fn initializer(&self) -> Option<&LoadedMember> {
        self.members.iter().find(|m| m.kind == MemberKind::Initializer)
    }
}

/// Reference host: verifies and links artifacts, then interprets member bodies.
///
/// Capabilities are linked against the host's own catalog, so an artifact built against a
/// richer catalog than the host provides fails to materialize.
#[derive(Debug, Clone)]
pub struct InterpreterHost {
    catalog: CapabilityCatalog,
    output: OutputSink,
}

impl Default for InterpreterHost {
    fn default() -> Self {
        Self::new()
    }
}

impl InterpreterHost {
    /// Host writing to the process's stdout/stderr.
    pub fn new() -> Self {
        Self { catalog: CapabilityCatalog::standard(), output: OutputSink::Stdio }
    }

    /// Host writing into an in-memory buffer.
    pub fn capturing() -> (Self, CapturedOutput) {
        let (sink, captured) = OutputSink::capture();
        (Self::new().with_output(sink), captured)
    }

    pub fn with_output(mut self, output: OutputSink) -> Self {
        self.output = output;
        self
    }

    pub fn with_catalog(mut self, catalog: CapabilityCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Instantiate `unit` and call the zero-argument method `member`, returning its result.
    pub fn call(&self, unit: &LoadedUnit, member: &str) -> Result<Option<Value>, InvokeError> {
        let method = unit.method(member).ok_or_else(|| InvokeError::NoSuchMember(member.into()))?;
        if !method.signature.is_nullary() {
            return Err(InvokeError::UnsupportedSignature {
                member: member.to_string(),
                descriptor: descriptor(&method.signature),
            });
        }
        self.instantiate(unit)?;
        debug!(unit = %unit.name, member, "invoking member");
        self.execute(method)
    }

    fn instantiate(&self, unit: &LoadedUnit) -> Result<(), InvokeError> {
        if !unit.instantiable {
            return Err(InvokeError::NotInstantiable(unit.name.clone()));
        }
        let init =
            unit.initializer().ok_or_else(|| InvokeError::NotInstantiable(unit.name.clone()))?;
        self.execute(init).map(|_| ())
    }

    fn execute(&self, member: &LoadedMember) -> Result<Option<Value>, InvokeError> {
        let fail = |detail: &str| InvokeError::Execution {
            member: member.name.clone(),
            detail: detail.to_string(),
        };
        let mut stack: Vec<Value> = Vec::new();
        for step in &member.steps {
            match step {
                Step::LoadReceiver => stack.push(Value::Receiver),
                Step::InvokeBase => match stack.pop() {
                    Some(Value::Receiver) => {}
                    _ => return Err(fail("base initializer needs the receiver")),
                },
                Step::Push(value) => stack.push(value.clone()),
                Step::Call(binding) => {
                    let arg = stack.pop().ok_or_else(|| fail("stack underflow"))?;
                    let mut text = arg.render();
                    if binding.newline {
                        text.push('\n');
                    }
                    self.output.write(binding.stream, &text)?;
                }
                Step::Return => {
                    return Ok(match member.signature.returns {
                        SemanticType::Void => None,
                        _ => stack.pop(),
                    });
                }
            }
        }
        Err(fail("fell off the end of the body"))
    }

    fn bind(&self, ext: &ExternalRef) -> Option<Binding> {
        let id = CapabilityId::new(&ext.target, &ext.method, ext.signature.clone());
        if !self.catalog.contains(&id) {
            return None;
        }
        if ext.signature.params.len() != 1 || ext.signature.returns != SemanticType::Void {
            return None;
        }
        let stream = match ext.target.as_str() {
            "std.out" => Stream::Out,
            "std.err" => Stream::Err,
            _ => return None,
        };
        let newline = match ext.method.as_str() {
            "println" => true,
            "print" => false,
            _ => return None,
        };
        Some(Binding { stream, newline })
    }

    fn verify_member(
        &self,
        unit: &DecodedUnit,
        member: &DecodedMember,
    ) -> Result<LoadedMember, MaterializeError> {
        let verify = |detail: String| MaterializeError::Verify {
            member: member.name.clone(),
            detail,
        };

        if member.kind == MemberKind::Initializer && member.signature != Signature::nullary() {
            return Err(verify(format!(
                "initializer must have signature ()V, found {}",
                descriptor(&member.signature)
            )));
        }

        let mut stack: Vec<Slot> = Vec::new();
        let mut steps = Vec::with_capacity(member.code.len());
        let mut base_called = false;

        for (pc, op) in member.code.iter().enumerate() {
            let step = match op {
                Op::LoadReceiver => {
                    stack.push(Slot::Receiver);
                    Step::LoadReceiver
                }
                Op::InvokeBaseInitializer => {
                    if member.kind != MemberKind::Initializer {
                        return Err(verify(format!(
                            "pc {pc}: base initializer invoked outside an initializer"
                        )));
                    }
                    if unit.base != DEFAULT_BASE {
                        return Err(MaterializeError::Link {
                            reference: format!("base unit {}", unit.base),
                        });
                    }
                    if stack.pop() != Some(Slot::Receiver) {
                        return Err(verify(format!(
                            "pc {pc}: base initializer needs the receiver on the stack"
                        )));
                    }
                    base_called = true;
                    Step::InvokeBase
                }
                Op::LoadConstant(idx) => {
                    let value = unit
                        .constant(*idx)
                        .ok_or_else(|| verify(format!("pc {pc}: #{idx} is not a constant")))?;
                    stack.push(Slot::Typed(value.semantic_type()));
                    Step::Push(Value::from(value))
                }
                Op::InvokeExternal(idx) => {
                    let ext = unit.external(*idx).ok_or_else(|| {
                        verify(format!("pc {pc}: #{idx} is not an external reference"))
                    })?;
                    let binding = self.bind(&ext).ok_or_else(|| MaterializeError::Link {
                        reference: format!(
                            "{}::{}{}",
                            ext.target,
                            ext.method,
                            descriptor(&ext.signature)
                        ),
                    })?;
                    for param in ext.signature.params.iter().rev() {
                        match stack.pop() {
                            Some(Slot::Typed(found)) if found == *param => {}
                            found => {
                                return Err(verify(format!(
                                    "pc {pc}: {}::{} expects {param:?}, found {found:?}",
                                    ext.target, ext.method
                                )))
                            }
                        }
                    }
                    Step::Call(binding)
                }
                Op::Return => {
                    if pc + 1 != member.code.len() {
                        return Err(verify(format!("pc {pc}: code after return")));
                    }
                    let returns = member.signature.returns;
                    if returns != SemanticType::Void
                        && stack.last() != Some(&Slot::Typed(returns))
                    {
                        return Err(verify(format!(
                            "pc {pc}: return needs a {returns:?} on the stack"
                        )));
                    }
                    Step::Return
                }
            };
            steps.push(step);
        }

        if member.code.last() != Some(&Op::Return) {
            return Err(verify("body falls off the end without return".to_string()));
        }
        if member.kind == MemberKind::Initializer && !base_called {
            return Err(verify("initializer never invokes the base initializer".to_string()));
        }

        Ok(LoadedMember {
            kind: member.kind,
            name: member.name.clone(),
            signature: member.signature.clone(),
            steps,
        })
    }
}

impl Materializer for InterpreterHost {
    type Unit = LoadedUnit;

    fn materialize(&self, artifact: &BinaryArtifact) -> Result<LoadedUnit, MaterializeError> {
        let decoded = decode(artifact.as_bytes())?;

        let initializers =
            decoded.members.iter().filter(|m| m.kind == MemberKind::Initializer).count();
        if initializers > 1 {
            return Err(MaterializeError::Verify {
                member: decoded.name.clone(),
                detail: format!("{initializers} initializers; at most one is allowed"),
            });
        }

        let members = decoded
            .members
            .iter()
            .map(|m| self.verify_member(&decoded, m))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(unit = %decoded.name, members = members.len(), "unit verified and linked");
        Ok(LoadedUnit {
            public: decoded.is_public(),
            instantiable: decoded.is_instantiable(),
            name: decoded.name,
            base: decoded.base,
            digest: artifact.digest(),
            members,
        })
    }

    fn name(&self) -> &'static str {
        "interpreter"
    }
}

impl Invoker for InterpreterHost {
    type Unit = LoadedUnit;

    fn invoke(&self, unit: &LoadedUnit, member: &str) -> Result<(), InvokeError> {
        self.call(unit, member).map(|_| ())
    }
}
