//! Host implementations of the [`Materializer`](crate::services::loader::Materializer) and
//! [`Invoker`](crate::services::loader::Invoker) capabilities.
//!
//! The loader never depends on a concrete host. `InterpreterHost` is the reference host used by
//! the CLI and by round-trip tests.

pub mod interpreter;

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

pub use interpreter::{InterpreterHost, LoadedMember, LoadedUnit, Value};

/// Which stream a printing capability writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Out,
    Err,
}

#[derive(Debug, Default)]
struct Buffers {
    stdout: String,
    stderr: String,
}

/// In-memory copy of everything a host printed. Clones share the same buffers.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    inner: Arc<Mutex<Buffers>>,
}

impl CapturedOutput {
    pub fn stdout(&self) -> String {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).stdout.clone()
    }

    pub fn stderr(&self) -> String {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).stderr.clone()
    }

    fn push(&self, stream: Stream, text: &str) {
        let mut buffers = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match stream {
            Stream::Out => buffers.stdout.push_str(text),
            Stream::Err => buffers.stderr.push_str(text),
        }
    }
}

/// Destination for capability output.
#[derive(Debug, Clone, Default)]
pub enum OutputSink {
    /// The process's standard output and error.
    #[default]
    Stdio,
    Captured(CapturedOutput),
}

impl OutputSink {
    /// A capturing sink plus the handle to read it back.
    pub fn capture() -> (Self, CapturedOutput) {
        let captured = CapturedOutput::default();
        (OutputSink::Captured(captured.clone()), captured)
    }

    pub fn write(&self, stream: Stream, text: &str) -> std::io::Result<()> {
        match self {
            OutputSink::Stdio => match stream {
                Stream::Out => {
                    let mut out = std::io::stdout().lock();
                    out.write_all(text.as_bytes())?;
                    out.flush()
                }
                Stream::Err => {
                    let mut err = std::io::stderr().lock();
                    err.write_all(text.as_bytes())?;
                    err.flush()
                }
            },
            OutputSink::Captured(captured) => {
                captured.push(stream, text);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captured_sink_separates_streams() {
        let (sink, captured) = OutputSink::capture();
        sink.write(Stream::Out, "a").unwrap();
        sink.write(Stream::Err, "b").unwrap();
        sink.write(Stream::Out, "c").unwrap();
        assert_eq!(captured.stdout(), "ac");
        assert_eq!(captured.stderr(), "b");
    }
}
