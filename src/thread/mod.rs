use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::instruction::{Instruction, InstructionType, Instructions};
use crate::vm::{VirtualMachine, VmError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    /// Created, not yet joined.
    Ready,
    /// In a run queue and being stepped.
    Busy,
    /// Parked: still queued, skipped by the scheduler.
    Idle,
    Finish,
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThreadStatus::Ready => "ready",
            ThreadStatus::Busy => "busy",
            ThreadStatus::Idle => "idle",
            ThreadStatus::Finish => "finish",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThreadError {
    #[error("thread is {status}, only ready threads can be joined")]
    NotReady { status: ThreadStatus },
    #[error("thread has finished")]
    Finished,
    #[error("invalid thread transition: {from} -> {to}")]
    InvalidTransition { from: ThreadStatus, to: ThreadStatus },
}

/// A logical strand of control over an instruction sequence.
///
/// The program counter is 1-based and always within `[1, len + 1]`;
/// `len + 1` means the sequence is exhausted.
pub struct Thread {
    instructions: Instructions,
    pc: usize,
    status: ThreadStatus,
}

impl Thread {
    pub fn new(instructions: impl Into<Instructions>) -> Self {
        Thread { instructions: instructions.into(), pc: 1, status: ThreadStatus::Ready }
    }

    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.status == ThreadStatus::Finish
    }

    pub fn instructions(&self) -> &Instructions {
        &self.instructions
    }

    pub fn opcodes(&self) -> Vec<InstructionType> {
        self.instructions.iter().map(|i| i.instruction_type()).collect()
    }

    /// Moves the counter. Positions outside the sequence are clamped:
    /// `0` means the first instruction, anything past the end means "done".
    pub fn jump(&mut self, position: usize) {
        self.pc = position.clamp(1, self.len() + 1);
    }

    pub fn park(&mut self) -> Result<(), ThreadError> {
        self.transition(ThreadStatus::Busy, ThreadStatus::Idle)
    }

    /// Resumes a parked thread where it left off.
    pub fn resume(&mut self) -> Result<(), ThreadError> {
        self.transition(ThreadStatus::Idle, ThreadStatus::Busy)
    }

    pub(crate) fn mark_joined(&mut self) -> Result<(), ThreadError> {
        if self.status != ThreadStatus::Ready {
            return Err(ThreadError::NotReady { status: self.status });
        }
        self.status = ThreadStatus::Busy;
        Ok(())
    }

    fn transition(&mut self, from: ThreadStatus, to: ThreadStatus) -> Result<(), ThreadError> {
        if self.status != from {
            return Err(ThreadError::InvalidTransition { from: self.status, to });
        }
        self.status = to;
        Ok(())
    }

    /// Single step: runs the instruction under the counter.
    ///
    /// The counter moves first, then the instruction runs; once the counter
    /// is past the end the thread is finished. An empty or exhausted
    /// sequence finishes without running anything. If the instruction fails
    /// the counter is put back on it.
    pub fn exec(&mut self, vm: &mut VirtualMachine) -> Result<(), VmError> {
        if self.is_finished() {
            return Err(ThreadError::Finished.into());
        }
        if self.pc <= self.len() {
            let seq = Rc::clone(&self.instructions);
            let at = self.pc;
            self.pc += 1;
            if let Err(source) = run_one(&*seq[at - 1], vm, self) {
                self.pc = at;
                return Err(VmError::Instruction { thread: None, pc: at, source: Box::new(source) });
            }
        }
        if self.pc > self.len() {
            self.status = ThreadStatus::Finish;
        }
        Ok(())
    }

    /// Run to completion: executes from the counter to the end of the
    /// sequence, then rewinds to the first instruction. Status is left
    /// as it was.
    pub fn call(&mut self, vm: &mut VirtualMachine) -> Result<(), VmError> {
        let seq = Rc::clone(&self.instructions);
        while self.pc <= seq.len() {
            let at = self.pc;
            self.pc += 1;
            if let Err(source) = run_one(&*seq[at - 1], vm, self) {
                self.pc = at;
                return Err(VmError::Instruction { thread: None, pc: at, source: Box::new(source) });
            }
        }
        self.pc = 1;
        Ok(())
    }
}

fn run_one(instruction: &dyn Instruction, vm: &mut VirtualMachine, thread: &mut Thread) -> Result<(), VmError> {
    tracing::trace!(pc = thread.pc - 1, op = %instruction.instruction_type(), "exec");
    instruction.exec(vm, thread)
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("len", &self.len())
            .field("pc", &self.pc)
            .field("status", &self.status)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
