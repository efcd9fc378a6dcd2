//! Cooperative multi-thread VM core.
//!
//! A [`VirtualMachine`] owns a fixed-capacity pool of [`Var`]s and one of
//! [`Thread`]s. Threads are ordered sequences of [`Instruction`] objects
//! handed over by a front end; once joined they are advanced round-robin,
//! one instruction per thread per sweep, until every thread finishes.

pub mod diagnostic;
pub mod instruction;
pub mod pool;
pub mod thread;
pub mod var;
pub mod vm;

pub use instruction::{Instruction, InstructionType, Instructions};
pub use pool::{Handle, Pool, PoolError};
pub use thread::{Thread, ThreadError, ThreadStatus};
pub use var::{Capability, Payload, Var, VarError};
pub use vm::{
    RunOutcome, RunStats, ThreadHandle, VarHandle, VirtualMachine, VmConfig, VmError, VmResult,
};
