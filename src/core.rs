//! The ARM core facade.
//!
//! Presents a uniform, trace-instrumented view of the processor state to
//! the debugger stub and to the step primitive. The register file stores
//! the raw next-fetch address in R15; this facade is the single place that
//! applies the architectural read convention on top of it.

use std::io::Write;

use crate::exception::{self, Exception};
use crate::memory::{Memory, MemoryError};
use crate::registers::{register_name, Mode, RegisterFile};
use crate::trace::{Access, MemoryKind, TracedRegister, Tracer};

/// An ARMv5T processor core bound to a flat memory.
///
/// Construction immediately performs the RESET entry, so a fresh core is in
/// Supervisor mode with the next fetch at address zero and the cycle
/// counter cleared.
#[derive(Debug)]
pub struct ArmCore {
    cycle_count: u32,
    regs: RegisterFile,
    mem: Memory,
    trace: Tracer,
}

impl ArmCore {
    /// Create a core over `mem` with tracing off.
    pub fn new(mem: Memory) -> Self {
        Self::with_tracer(mem, Tracer::disabled())
    }

    /// Create a core over `mem`, recording accesses through `trace`.
    pub fn with_tracer(mem: Memory, trace: Tracer) -> Self {
        let mut core = ArmCore {
            cycle_count: 0,
            regs: RegisterFile::new(),
            mem,
            trace,
        };
        core.exception(Exception::Reset);
        core
    }

    /// Number of instruction fetches performed so far.
    pub fn cycle_count(&self) -> u32 {
        self.cycle_count
    }

    /// The mode currently encoded in CPSR\[4:0\].
    pub fn current_mode(&self) -> Mode {
        self.regs.mode()
    }

    /// Whether the current mode owns an SPSR.
    pub fn current_mode_has_spsr(&self) -> bool {
        self.regs.mode().has_spsr()
    }

    /// Whether the core runs in a privileged mode.
    pub fn in_a_privileged_mode(&self) -> bool {
        self.regs.mode().is_privileged()
    }

    /// Enter `exception`. Only RESET changes state; see [`exception::enter`].
    pub fn exception(&mut self, exception: Exception) {
        exception::enter(self, exception);
    }

    /// Read R`reg` from the current bank.
    ///
    /// R15 is stored as the address of the next fetch; architectural reads
    /// see that address plus 4 (the executing instruction's address plus 8,
    /// ARM manual A2-9) with bit 1 forced clear to stay halfword aligned.
    pub fn read_register(&mut self, reg: u8) -> u32 {
        let mut value = self.regs.read_register(reg);
        if reg == 15 {
            value = value.wrapping_add(4) & 0xFFFF_FFFD;
        }
        self.trace.register(
            self.cycle_count,
            Access::Read,
            TracedRegister::R(reg),
            Some(self.regs.mode()),
            value,
        );
        value
    }

    /// Read R`reg` from the USR bank, whatever the current mode.
    pub fn read_usr_register(&mut self, reg: u8) -> u32 {
        let mut value = self.regs.read_usr_register(reg);
        if reg == 15 {
            value = value.wrapping_add(4) & 0xFFFF_FFFD;
        }
        self.trace.register(
            self.cycle_count,
            Access::Read,
            TracedRegister::R(reg),
            Some(Mode::Usr),
            value,
        );
        value
    }

    /// Write R`reg` in the current bank. The value is stored verbatim,
    /// including for R15.
    pub fn write_register(&mut self, reg: u8, value: u32) {
        self.regs.write_register(reg, value);
        self.trace.register(
            self.cycle_count,
            Access::Write,
            TracedRegister::R(reg),
            Some(self.regs.mode()),
            value,
        );
    }

    /// Write R`reg` in the USR bank, whatever the current mode.
    pub fn write_usr_register(&mut self, reg: u8, value: u32) {
        self.regs.write_usr_register(reg, value);
        self.trace.register(
            self.cycle_count,
            Access::Write,
            TracedRegister::R(reg),
            Some(Mode::Usr),
            value,
        );
    }

    /// Read the CPSR.
    pub fn read_cpsr(&mut self) -> u32 {
        let value = self.regs.read_cpsr();
        self.trace
            .register(self.cycle_count, Access::Read, TracedRegister::Cpsr, None, value);
        value
    }

    /// Write the CPSR.
    pub fn write_cpsr(&mut self, value: u32) {
        self.regs.write_cpsr(value);
        self.trace
            .register(self.cycle_count, Access::Write, TracedRegister::Cpsr, None, value);
    }

    /// Read the SPSR of the current mode. Must not be called in USR or SYS.
    pub fn read_spsr(&mut self) -> u32 {
        let value = self.regs.read_spsr();
        self.trace.register(
            self.cycle_count,
            Access::Read,
            TracedRegister::Spsr,
            Some(self.regs.mode()),
            value,
        );
        value
    }

    /// Write the SPSR of the current mode. Must not be called in USR or SYS.
    pub fn write_spsr(&mut self, value: u32) {
        self.regs.write_spsr(value);
        self.trace.register(
            self.cycle_count,
            Access::Write,
            TracedRegister::Spsr,
            Some(self.regs.mode()),
            value,
        );
    }

    /// Fetch the next instruction word.
    ///
    /// Counts the cycle, reads the word R15 points at and advances R15 past
    /// it, so R15 keeps naming the next fetch address. The PC moves before
    /// the instruction is decoded; branches implement themselves by writing
    /// R15. A failed read still counts the cycle and advances the PC.
    pub fn fetch(&mut self) -> Result<u32, MemoryError> {
        self.cycle_count = self.cycle_count.wrapping_add(1);
        let address = self.read_register(15).wrapping_sub(4);
        let result = self.mem.read_word(address);
        if let Ok(value) = result {
            self.trace.memory(
                self.cycle_count,
                Access::Read,
                4,
                MemoryKind::OpcodeFetch,
                address,
                value,
            );
        }
        self.write_register(15, address.wrapping_add(4));
        result
    }

    /// Read a byte through the data path.
    pub fn read_byte(&mut self, address: u32) -> Result<u8, MemoryError> {
        let value = self.mem.read_byte(address)?;
        self.trace.memory(
            self.cycle_count,
            Access::Read,
            1,
            MemoryKind::OtherAccess,
            address,
            u32::from(value),
        );
        Ok(value)
    }

    /// Read a half-word through the data path. Byte order follows the boot
    /// endianness the memory was created with (CPSR bit 9 at reset).
    pub fn read_half(&mut self, address: u32) -> Result<u16, MemoryError> {
        let value = self.mem.read_half(address)?;
        self.trace.memory(
            self.cycle_count,
            Access::Read,
            2,
            MemoryKind::OtherAccess,
            address,
            u32::from(value),
        );
        Ok(value)
    }

    /// Read a word through the data path.
    pub fn read_word(&mut self, address: u32) -> Result<u32, MemoryError> {
        let value = self.mem.read_word(address)?;
        self.trace.memory(
            self.cycle_count,
            Access::Read,
            4,
            MemoryKind::OtherAccess,
            address,
            value,
        );
        Ok(value)
    }

    /// Write a byte through the data path.
    pub fn write_byte(&mut self, address: u32, value: u8) -> Result<(), MemoryError> {
        self.mem.write_byte(address, value)?;
        self.trace.memory(
            self.cycle_count,
            Access::Write,
            1,
            MemoryKind::OtherAccess,
            address,
            u32::from(value),
        );
        Ok(())
    }

    /// Write a half-word through the data path.
    pub fn write_half(&mut self, address: u32, value: u16) -> Result<(), MemoryError> {
        self.mem.write_half(address, value)?;
        self.trace.memory(
            self.cycle_count,
            Access::Write,
            2,
            MemoryKind::OtherAccess,
            address,
            u32::from(value),
        );
        Ok(())
    }

    /// Write a word through the data path.
    pub fn write_word(&mut self, address: u32, value: u32) -> Result<(), MemoryError> {
        self.mem.write_word(address, value)?;
        self.trace.memory(
            self.cycle_count,
            Access::Write,
            4,
            MemoryKind::OtherAccess,
            address,
            value,
        );
        Ok(())
    }

    /// Direct access to the backing memory, bypassing the trace
    /// instrumentation. The debugger's raw memory commands use this.
    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    /// Mutable direct access to the backing memory.
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.mem
    }

    /// Suspend trace recording. Calls nest.
    pub fn trace_disable(&mut self) {
        self.trace.disable();
    }

    /// Resume trace recording.
    pub fn trace_enable(&mut self) {
        self.trace.enable();
    }

    /// Record a state snapshot to the trace sink.
    ///
    /// The snapshot is rendered with tracing suspended, so the register
    /// reads it performs do not themselves appear as events.
    pub fn trace_state(&mut self) {
        if !self.trace.is_active() {
            return;
        }
        self.trace.disable();
        let mut dump = Vec::new();
        let render = self.print_state(&mut dump);
        self.trace.enable();
        if render.is_ok() {
            self.trace.state(self.cycle_count, &dump);
        }
    }

    /// Diagnostic dump of every mode's register bank.
    ///
    /// Walks USR, FIQ, IRQ, SVC, ABT, UND and SYS, printing sixteen
    /// registers per mode, five to a line, with the mode tag on every block
    /// but SYS and the CPSR appended to the USR block. Reads go through the
    /// facade, so R15 shows the +4 convention.
    pub fn print_state(&mut self, out: &mut dyn Write) -> std::io::Result<()> {
        for mode in Mode::ALL {
            if mode != Mode::Sys {
                write!(out, "{}:", mode.name())?;
            }
            for reg in 0..16u8 {
                if reg > 0 && reg % 5 == 0 {
                    write!(out, "\n    ")?;
                }
                let value = if mode == Mode::Usr {
                    self.read_usr_register(reg)
                } else {
                    self.read_register(reg)
                };
                write!(out, "   {:>3}={:08X}", register_name(reg), value)?;
            }
            if mode == Mode::Usr {
                let cpsr = self.read_cpsr();
                write!(out, "  CPSR={cpsr:08X}")?;
            }
            match mode {
                Mode::Usr | Mode::Fiq | Mode::Svc | Mode::Und => writeln!(out)?,
                Mode::Irq | Mode::Abt => write!(out, "          ")?,
                Mode::Sys => {}
            }
        }
        Ok(())
    }
}
