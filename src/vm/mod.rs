pub mod config;

use serde::Serialize;
use tracing::{debug, info, trace};

use crate::instruction::Instructions;
use crate::pool::{Handle, Pool, PoolError};
use crate::thread::{Thread, ThreadError, ThreadStatus};
use crate::var::{Var, VarError};

pub use config::{ConfigError, VmConfig};

pub type ThreadHandle = Handle<Thread>;
pub type VarHandle = Handle<Var>;

#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("{pool} pool exhausted ({capacity} slots)")]
    Exhausted { pool: &'static str, capacity: usize },
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Var(#[from] VarError),
    #[error(transparent)]
    Thread(#[from] ThreadError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown thread {0:?}")]
    UnknownThread(ThreadHandle),
    #[error("unknown var {0:?}")]
    UnknownVar(VarHandle),
    #[error("deadlock: all {parked} queued threads are parked")]
    Deadlock { parked: usize },
    #[error("scheduler entered from a running instruction")]
    Reentrant,
    #[error("instruction {pc} failed: {source}")]
    Instruction { thread: Option<ThreadHandle>, pc: usize, source: Box<VmError> },
}

pub type VmResult<T> = Result<T, VmError>;

impl VmError {
    /// Stable identifier for embedders that map errors to their own messages.
    pub fn code(&self) -> &'static str {
        match self {
            VmError::Exhausted { .. } => "SVM-P001",
            VmError::Pool(PoolError::Exhausted { .. }) => "SVM-P001",
            VmError::Pool(PoolError::InvalidHandle { .. }) => "SVM-P002",
            VmError::Var(VarError::Unusable) => "SVM-V001",
            VmError::Var(VarError::TypeMismatch { .. }) => "SVM-V002",
            VmError::Var(VarError::MissingCapability { .. }) => "SVM-V003",
            VmError::Var(VarError::Pool { source: PoolError::Exhausted { .. }, .. }) => "SVM-P001",
            VmError::Var(VarError::Pool { source: PoolError::InvalidHandle { .. }, .. }) => "SVM-P002",
            VmError::Thread(ThreadError::NotReady { .. }) => "SVM-T001",
            VmError::Thread(ThreadError::Finished) => "SVM-T002",
            VmError::Thread(ThreadError::InvalidTransition { .. }) => "SVM-T003",
            VmError::UnknownThread(_) => "SVM-M001",
            VmError::UnknownVar(_) => "SVM-M002",
            VmError::Deadlock { .. } => "SVM-M003",
            VmError::Config(_) => "SVM-M004",
            VmError::Reentrant => "SVM-M005",
            VmError::Instruction { source, .. } => source.code(),
        }
    }

    /// The innermost error, past any instruction wrappers.
    pub fn root(&self) -> &VmError {
        match self {
            VmError::Instruction { source, .. } => source.root(),
            other => other,
        }
    }

    fn on_thread(self, handle: ThreadHandle) -> Self {
        match self {
            VmError::Instruction { thread: None, pc, source } => {
                VmError::Instruction { thread: Some(handle), pc, source }
            }
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub sweeps: u64,
    pub steps: u64,
    pub reaped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every thread finished and was reclaimed.
    Drained,
    /// The sweep budget ran out with threads still queued.
    Pending,
}

// ── VM ───────────────────────────────────────────────────────────────

/// Cooperative scheduler over pooled threads and values.
///
/// Threads are stepped round-robin, one instruction each per sweep, in the
/// order they were joined. Everything runs on the caller's native thread.
pub struct VirtualMachine {
    config: VmConfig,
    vars: Pool<Var>,
    threads: Pool<Thread>,
    run_queue: Vec<ThreadHandle>,
    stats: RunStats,
    sweeping: bool,
}

impl Default for VirtualMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualMachine {
    pub fn new() -> Self {
        Self::build(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> VmResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: VmConfig) -> Self {
        VirtualMachine {
            config,
            vars: Pool::with_capacity(config.var_capacity),
            threads: Pool::with_capacity(config.thread_capacity),
            run_queue: Vec::new(),
            stats: RunStats::default(),
            sweeping: false,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    // ── Threads ──────────────────────────────────────────────────────

    pub fn create_thread(&mut self, instructions: impl Into<Instructions>) -> VmResult<ThreadHandle> {
        let thread = Thread::new(instructions);
        let len = thread.len();
        let handle = self.threads.alloc(thread).map_err(|e| exhausted("thread", e))?;
        debug!(thread = ?handle, len, "thread created");
        Ok(handle)
    }

    /// Appends a ready thread to the run queue. Anything else is rejected
    /// and the queue is left untouched.
    pub fn join_thread(&mut self, handle: ThreadHandle) -> VmResult<()> {
        let thread = self.threads.get_mut(handle).ok_or(VmError::UnknownThread(handle))?;
        thread.mark_joined()?;
        self.run_queue.push(handle);
        debug!(thread = ?handle, queued = self.run_queue.len(), "thread joined");
        Ok(())
    }

    pub fn park_thread(&mut self, handle: ThreadHandle) -> VmResult<()> {
        self.thread_mut(handle)?.park()?;
        Ok(())
    }

    pub fn resume_thread(&mut self, handle: ThreadHandle) -> VmResult<()> {
        self.thread_mut(handle)?.resume()?;
        Ok(())
    }

    /// `None` for reclaimed handles and for the thread currently executing.
    pub fn thread(&self, handle: ThreadHandle) -> Option<&Thread> {
        self.threads.get(handle)
    }

    fn thread_mut(&mut self, handle: ThreadHandle) -> VmResult<&mut Thread> {
        self.threads.get_mut(handle).ok_or(VmError::UnknownThread(handle))
    }

    pub fn run_queue(&self) -> &[ThreadHandle] {
        &self.run_queue
    }

    pub fn live_threads(&self) -> usize {
        self.threads.len()
    }

    // ── Vars ─────────────────────────────────────────────────────────

    pub fn create_var(&mut self, var: Var) -> VmResult<VarHandle> {
        let type_name = var.type_name();
        let handle = self.vars.alloc(var).map_err(|e| exhausted("var", e))?;
        debug!(var = ?handle, type_name, "var created");
        Ok(handle)
    }

    pub fn var(&self, handle: VarHandle) -> VmResult<&Var> {
        self.vars.get(handle).ok_or(VmError::UnknownVar(handle))
    }

    pub fn var_mut(&mut self, handle: VarHandle) -> VmResult<&mut Var> {
        self.vars.get_mut(handle).ok_or(VmError::UnknownVar(handle))
    }

    pub fn free_var(&mut self, handle: VarHandle) -> VmResult<Var> {
        let var = self.vars.free(handle).map_err(|_| VmError::UnknownVar(handle))?;
        debug!(var = ?handle, "var freed");
        Ok(var)
    }

    pub fn live_vars(&self) -> usize {
        self.vars.len()
    }

    // ── Scheduler ────────────────────────────────────────────────────

    /// Runs until the run queue drains.
    ///
    /// Fails with [`VmError::Deadlock`] when every queued thread is parked,
    /// since nothing could ever resume them.
    pub fn start(&mut self) -> VmResult<RunStats> {
        info!(threads = self.run_queue.len(), "scheduler started");
        while !self.run_queue.is_empty() {
            let stepped = self.sweep()?;
            if stepped == 0 && !self.run_queue.is_empty() {
                return Err(VmError::Deadlock { parked: self.run_queue.len() });
            }
        }
        info!(sweeps = self.stats.sweeps, steps = self.stats.steps, "scheduler drained");
        Ok(self.stats)
    }

    /// Runs at most `max_sweeps` sweeps.
    pub fn run_for(&mut self, max_sweeps: u64) -> VmResult<RunOutcome> {
        if self.sweeping {
            return Err(VmError::Reentrant);
        }
        for _ in 0..max_sweeps {
            if self.run_queue.is_empty() {
                break;
            }
            self.sweep()?;
        }
        self.reap()?;
        Ok(if self.run_queue.is_empty() { RunOutcome::Drained } else { RunOutcome::Pending })
    }

    /// One pass over the run queue: reclaim finished threads, then step
    /// every busy one once. Returns how many threads were stepped.
    ///
    /// Threads joined while the sweep is running are first stepped on the
    /// next sweep. If an instruction fails the error is returned at once;
    /// its thread stays on the failing instruction and the machine remains
    /// usable. Calling back into the scheduler from an instruction fails
    /// with [`VmError::Reentrant`].
    pub fn sweep(&mut self) -> VmResult<usize> {
        if self.sweeping {
            return Err(VmError::Reentrant);
        }
        self.sweeping = true;
        let result = self.step_queue();
        self.sweeping = false;
        result
    }

    fn step_queue(&mut self) -> VmResult<usize> {
        self.reap()?;
        self.stats.sweeps += 1;
        let queued = self.run_queue.len();
        let mut stepped = 0;
        for i in 0..queued {
            let Some(&handle) = self.run_queue.get(i) else {
                break;
            };
            let mut thread = self.threads.lend(handle)?;
            let result = if thread.status() == ThreadStatus::Busy {
                stepped += 1;
                self.stats.steps += 1;
                trace!(thread = ?handle, pc = thread.pc(), "step");
                thread.exec(self)
            } else {
                Ok(())
            };
            self.threads.restore(handle, thread)?;
            result.map_err(|e| e.on_thread(handle))?;
        }
        Ok(stepped)
    }

    fn reap(&mut self) -> VmResult<()> {
        let threads = &self.threads;
        let (finished, live): (Vec<ThreadHandle>, Vec<ThreadHandle>) = self
            .run_queue
            .iter()
            .copied()
            .partition(|&h| threads.get(h).is_some_and(Thread::is_finished));
        if finished.is_empty() {
            return Ok(());
        }
        self.run_queue = live;
        for handle in finished {
            self.threads.free(handle)?;
            self.stats.reaped += 1;
            debug!(thread = ?handle, "thread reaped");
        }
        Ok(())
    }
}

fn exhausted(pool: &'static str, err: PoolError) -> VmError {
    match err {
        PoolError::Exhausted { capacity } => VmError::Exhausted { pool, capacity },
        other => VmError::Pool(other),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
