//! Exception entry.
//!
//! Only RESET is driven from here; the remaining vectors exist as values
//! returned by the step primitive and surfaced to the debugger as stop
//! codes.

use crate::core::ArmCore;

// CP15 register 1 EE bit. Not implemented below ARMv6, reads as zero.
const CP15_REG1_EE: u32 = 0;

const EXCEPTION_BIT_9: u32 = CP15_REG1_EE << 9;

/// The ARMv5T exception vectors, plus the codes the step primitive reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Exception {
    /// Processor reset.
    Reset = 1,
    /// Undefined instruction trap.
    UndefinedInstruction = 2,
    /// SWI / SVC instruction.
    SoftwareInterrupt = 3,
    /// Instruction fetch abort.
    PrefetchAbort = 4,
    /// Data access abort.
    DataAbort = 5,
    /// Normal interrupt.
    Irq = 6,
    /// Fast interrupt.
    Fiq = 7,
}

/// Drive the core into the architectural entry state for `exception`.
///
/// RESET selects Supervisor mode with IRQ and FIQ disabled, the Thumb bit
/// clear and the E bit copied from CP15, then points the next fetch at
/// address zero (ARM manual A2-18). Every other vector is accepted and
/// ignored here.
pub fn enter(core: &mut ArmCore, exception: Exception) {
    if exception == Exception::Reset {
        core.write_cpsr(0x1d3 | EXCEPTION_BIT_9);
        core.write_usr_register(15, 0);
    }
}
