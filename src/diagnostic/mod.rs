pub mod ansi;
pub mod json;

use crate::thread::ThreadError;
use crate::var::{VarError, HOLDER_CAPACITY};
use crate::vm::VmError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Where in a program a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// Pool slot of the thread.
    pub thread: usize,
    /// 1-based position of the instruction.
    pub pc: usize,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<&'static str>,
    pub message: String,
    pub location: Option<Location>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code: None,
            message: message.into(),
            location: None,
            notes: Vec::new(),
            suggestion: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Warning, ..Diagnostic::error(message) }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_location(mut self, thread: usize, pc: usize) -> Self {
        self.location = Some(Location { thread, pc });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

// ---- From impls for core error types ----

impl From<&VmError> for Diagnostic {
    fn from(e: &VmError) -> Self {
        let root = e.root();
        let mut d = Diagnostic::error(root.to_string()).with_code(e.code());

        if let VmError::Instruction { thread, pc, .. } = e {
            match thread {
                Some(handle) => d = d.with_location(handle.index(), *pc),
                None => d = d.with_note(format!("at instruction {pc}")),
            }
        }

        let suggestion = match root {
            VmError::Exhausted { pool, .. } => Some(format!("raise {pool}_capacity in the machine config")),
            VmError::Deadlock { .. } => {
                Some("keep at least one thread running that can resume the parked ones".to_string())
            }
            VmError::Thread(ThreadError::NotReady { .. }) => {
                Some("a thread can be joined once; create a new thread to run the sequence again".to_string())
            }
            VmError::Var(VarError::Pool { type_name, .. }) => Some(format!(
                "each payload type has {HOLDER_CAPACITY} holders; drop unused {type_name} values first"
            )),
            VmError::Var(VarError::MissingCapability { type_name, capability }) => {
                Some(format!("register {capability} for '{type_name}' where the payload type is declared"))
            }
            _ => None,
        };
        if let Some(s) = suggestion {
            d = d.with_suggestion(s);
        }
        d
    }
}
