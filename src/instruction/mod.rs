use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::thread::Thread;
use crate::vm::{VirtualMachine, VmError};

/// Opcode categories. The tag is metadata for tooling and compiler
/// bookkeeping; the machine never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionType {
    /// Arithmetic or any other computation.
    Calc,
    /// Marker with no effect, e.g. a jump target label.
    Tag,
    Jump,
    /// Jump if condition is true.
    Jict,
    /// Jump if condition is false.
    Jicf,
    /// Spawn a thread.
    Call,
    /// Wait for a thread.
    Join,
}

impl fmt::Display for InstructionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstructionType::Calc => "calc",
            InstructionType::Tag => "tag",
            InstructionType::Jump => "jump",
            InstructionType::Jict => "jict",
            InstructionType::Jicf => "jicf",
            InstructionType::Call => "call",
            InstructionType::Join => "join",
        };
        f.write_str(name)
    }
}

/// One unit of executable code.
///
/// `exec` receives the machine and the thread it runs on. By the time it is
/// called the thread's counter already points past this instruction, so a
/// [`Thread::jump`] inside `exec` chooses the next instruction directly.
/// The running thread is detached from the machine for the duration of the
/// call: looking it up through `vm` yields nothing.
pub trait Instruction: fmt::Debug {
    fn instruction_type(&self) -> InstructionType;

    fn exec(&self, vm: &mut VirtualMachine, thread: &mut Thread) -> Result<(), VmError>;
}

/// An ordered, read-only instruction sequence. Cloning shares it.
pub type Instructions = Rc<[Box<dyn Instruction>]>;
