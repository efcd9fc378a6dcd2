use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use strand::diagnostic::{ansi::AnsiRenderer, json, Diagnostic};
use strand::var::Integer;
use strand::{
    Instruction, InstructionType, RunOutcome, Thread, Var, VarHandle, VirtualMachine, VmConfig,
    VmError,
};

#[derive(Parser, Debug)]
#[command(name = "strand", version)]
#[command(about = "Run the built-in two-thread ping-pong program on the strand VM")]
struct Cli {
    /// Number of scheduler sweeps to run
    #[arg(long, default_value_t = 8)]
    sweeps: u64,

    /// JSON file with machine capacities
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    var_capacity: Option<usize>,

    #[arg(long)]
    thread_capacity: Option<usize>,

    /// Print the summary and any diagnostics as JSON
    #[arg(long)]
    json: bool,

    #[arg(long)]
    no_color: bool,
}

type Trace = Rc<RefCell<Vec<String>>>;

/// Counts how often it ran in a pooled integer and records its label.
#[derive(Debug)]
struct Tick {
    label: String,
    counter: VarHandle,
    trace: Trace,
}

impl Instruction for Tick {
    fn instruction_type(&self) -> InstructionType {
        InstructionType::Calc
    }

    fn exec(&self, vm: &mut VirtualMachine, _thread: &mut Thread) -> Result<(), VmError> {
        *vm.var_mut(self.counter)?.val_mut::<Integer>()? += 1;
        self.trace.borrow_mut().push(self.label.clone());
        Ok(())
    }
}

#[derive(Debug)]
struct Jump(usize);

impl Instruction for Jump {
    fn instruction_type(&self) -> InstructionType {
        InstructionType::Jump
    }

    fn exec(&self, _vm: &mut VirtualMachine, thread: &mut Thread) -> Result<(), VmError> {
        thread.jump(self.0);
        Ok(())
    }
}

struct Demo {
    vm: VirtualMachine,
    trace: Trace,
    counters: Vec<(String, VarHandle)>,
}

impl Demo {
    fn build(config: VmConfig) -> Result<Self, VmError> {
        let mut demo = Demo {
            vm: VirtualMachine::with_config(config)?,
            trace: Rc::new(RefCell::new(Vec::new())),
            counters: Vec::new(),
        };
        let th0 = vec![demo.tick("th0")?, Box::new(Jump(1)) as Box<dyn Instruction>];
        let th1 = vec![demo.tick("th1")?, demo.tick("Hello")?, Box::new(Jump(1)) as Box<dyn Instruction>];
        let th0 = demo.vm.create_thread(th0)?;
        let th1 = demo.vm.create_thread(th1)?;
        demo.vm.join_thread(th0)?;
        demo.vm.join_thread(th1)?;
        Ok(demo)
    }

    fn tick(&mut self, label: &str) -> Result<Box<dyn Instruction>, VmError> {
        let counter = self.vm.create_var(Var::make::<Integer>(0)?)?;
        self.counters.push((label.to_string(), counter));
        Ok(Box::new(Tick { label: label.to_string(), counter, trace: Rc::clone(&self.trace) }))
    }

    fn counts(&self) -> Result<Vec<(String, Integer)>, VmError> {
        self.counters
            .iter()
            .map(|(label, h)| Ok((label.clone(), *self.vm.var(*h)?.val::<Integer>()?)))
            .collect()
    }
}

fn load_config(cli: &Cli) -> Result<VmConfig, Diagnostic> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| Diagnostic::error(format!("cannot read {}: {e}", path.display())))?;
            VmConfig::from_json(&text).map_err(|e| Diagnostic::from(&VmError::from(e)))?
        }
        None => VmConfig::default(),
    };
    if let Some(n) = cli.var_capacity {
        config.var_capacity = n;
    }
    if let Some(n) = cli.thread_capacity {
        config.thread_capacity = n;
    }
    Ok(config)
}

fn run(cli: &Cli) -> Result<(), Diagnostic> {
    let config = load_config(cli)?;
    let mut demo = Demo::build(config).map_err(|e| Diagnostic::from(&e))?;
    let outcome = demo.vm.run_for(cli.sweeps).map_err(|e| Diagnostic::from(&e))?;
    let counts = demo.counts().map_err(|e| Diagnostic::from(&e))?;
    let stats = demo.vm.stats();
    let queued = demo.vm.run_queue().len();

    if cli.json {
        let emitted = demo.trace.borrow().clone();
        let counts: BTreeMap<String, Integer> = counts.into_iter().collect();
        let summary = serde_json::json!({
            "emitted": emitted,
            "counts": counts,
            "stats": stats,
            "outcome": match outcome { RunOutcome::Drained => "drained", RunOutcome::Pending => "pending" },
            "queued": queued,
        });
        println!("{summary}");
        return Ok(());
    }

    for label in demo.trace.borrow().iter() {
        println!("{label}");
    }
    let counts: Vec<String> = counts.iter().map(|(l, n)| format!("{l}:{n}")).collect();
    println!(
        "sweeps={} steps={} reaped={} queued={} counts={}",
        stats.sweeps,
        stats.steps,
        stats.reaped,
        queued,
        counts.join(",")
    );
    if outcome == RunOutcome::Pending {
        let d = Diagnostic::warning(format!("sweep budget spent with {queued} threads still queued"));
        eprint!("{}", AnsiRenderer { use_color: !cli.no_color }.render(&d));
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strand=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(d) => {
            if cli.json {
                eprintln!("{}", json::render(&d));
            } else {
                eprint!("{}", AnsiRenderer { use_color: !cli.no_color }.render(&d));
            }
            ExitCode::FAILURE
        }
    }
}
