//! Runtime services: the dynamic loader and the hosts it can drive.

pub mod hosts;
pub mod loader;

pub use hosts::{CapturedOutput, InterpreterHost, LoadedUnit, OutputSink};
pub use loader::{
    DynamicLoader, EntryStatus, InvokeError, Invoker, LoaderError, MaterializeError, Materializer,
};
