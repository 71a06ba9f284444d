//! Execution trace facility.
//!
//! Records every register and memory access performed through the core
//! facade as one text line per event, tagged with the cycle counter, plus
//! whole-state snapshots after executed instructions. The sink is any
//! `Write`; without one, events are dropped but suspension nesting is still
//! tracked so `disable`/`enable` bracketing stays balanced.

use std::io::Write;

use crate::registers::Mode;

/// Direction of a traced access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The value was read.
    Read,
    /// The value was written.
    Write,
}

impl Access {
    fn tag(self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "write",
        }
    }
}

/// What a memory access was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    /// Instruction fetch performed by the core.
    OpcodeFetch,
    /// Any other data access.
    OtherAccess,
}

impl MemoryKind {
    fn tag(self) -> &'static str {
        match self {
            MemoryKind::OpcodeFetch => "fetch",
            MemoryKind::OtherAccess => "data",
        }
    }
}

/// The register named by a register event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracedRegister {
    /// A general register R0-R15.
    R(u8),
    /// The current program status word.
    Cpsr,
    /// The saved program status word of the event's mode.
    Spsr,
}

/// Event recorder with nested suspension.
pub struct Tracer {
    sink: Option<Box<dyn Write + Send>>,
    suspended: u32,
}

impl Tracer {
    /// A tracer that drops every event.
    pub fn disabled() -> Self {
        Tracer {
            sink: None,
            suspended: 0,
        }
    }

    /// A tracer writing one line per event to `sink`.
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Tracer {
            sink: Some(sink),
            suspended: 0,
        }
    }

    /// Whether events are currently recorded.
    pub fn is_active(&self) -> bool {
        self.sink.is_some() && self.suspended == 0
    }

    /// Suspend recording. Calls nest.
    pub fn disable(&mut self) {
        self.suspended += 1;
    }

    /// Resume recording. Must pair with a previous [`disable`](Self::disable).
    pub fn enable(&mut self) {
        debug_assert!(self.suspended > 0, "unbalanced trace enable");
        self.suspended = self.suspended.saturating_sub(1);
    }

    fn emit(&mut self, line: std::fmt::Arguments<'_>) {
        if self.suspended > 0 {
            return;
        }
        if let Some(sink) = self.sink.as_mut() {
            // Sink write failures are not surfaced.
            let _ = writeln!(sink, "{line}");
        }
    }

    /// Record a register event.
    ///
    /// `mode` names the bank the access went to; CPSR events carry no mode.
    pub fn register(
        &mut self,
        cycle: u32,
        access: Access,
        reg: TracedRegister,
        mode: Option<Mode>,
        value: u32,
    ) {
        let name = match reg {
            TracedRegister::R(r) => format!("r{r}"),
            TracedRegister::Cpsr => "cpsr".to_string(),
            TracedRegister::Spsr => "spsr".to_string(),
        };
        let mode = mode.map_or("-", Mode::name);
        self.emit(format_args!(
            "{cycle} reg {} {name} {mode} {value:08x}",
            access.tag()
        ));
    }

    /// Record a memory event. `width` is in bytes.
    pub fn memory(
        &mut self,
        cycle: u32,
        access: Access,
        width: u8,
        kind: MemoryKind,
        address: u32,
        value: u32,
    ) {
        self.emit(format_args!(
            "{cycle} mem {} {width} {} {address:08x} {value:08x}",
            access.tag(),
            kind.tag()
        ));
    }

    /// Record a rendered processor state block.
    pub fn state(&mut self, cycle: u32, dump: &[u8]) {
        if self.suspended > 0 {
            return;
        }
        if let Some(sink) = self.sink.as_mut() {
            let _ = writeln!(sink, "state cycle={cycle}");
            let _ = sink.write_all(dump);
        }
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("sink", &self.sink.is_some())
            .field("suspended", &self.suspended)
            .finish()
    }
}
