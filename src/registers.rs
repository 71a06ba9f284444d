//! Banked register storage for an ARMv5T core.
//!
//! This module stores the raw architectural state: R0-R15, CPSR and the
//! per-mode SPSRs. It knows nothing about the PC read convention; that
//! adjustment lives in the [`ArmCore`](crate::ArmCore) facade so there is a
//! single place that lies about R15.

use bitfield::bitfield;

bitfield! {
    /// View of the current program status word.
    ///
    /// Only the fields the simulator acts on are broken out; the condition
    /// flags travel as part of the raw word.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Cpsr(u32);
    impl Debug;

    /// Processor mode, see [`Mode`].
    pub u8, mode_bits, set_mode_bits: 4, 0;
    /// Thumb execution state.
    pub thumb, set_thumb: 5;
    /// FIQ disable.
    pub fiq_disable, set_fiq_disable: 6;
    /// IRQ disable.
    pub irq_disable, set_irq_disable: 7;
    /// Data access endianness (the E bit).
    pub big_endian_data, set_big_endian_data: 9;
}

/// The seven ARMv5T processor modes, encoded as CPSR\[4:0\].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Mode {
    /// User
    Usr = 0x10,
    /// Fast interrupt
    Fiq = 0x11,
    /// Interrupt
    Irq = 0x12,
    /// Supervisor
    Svc = 0x13,
    /// Abort
    Abt = 0x17,
    /// Undefined
    Und = 0x1b,
    /// System
    Sys = 0x1f,
}

impl Mode {
    /// All modes, in encoding order. The state dump walks this list.
    pub const ALL: [Mode; 7] = [
        Mode::Usr,
        Mode::Fiq,
        Mode::Irq,
        Mode::Svc,
        Mode::Abt,
        Mode::Und,
        Mode::Sys,
    ];

    /// Decode a mode from the low five bits of a CPSR value.
    pub fn from_bits(bits: u8) -> Option<Mode> {
        match bits & 0x1f {
            0x10 => Some(Mode::Usr),
            0x11 => Some(Mode::Fiq),
            0x12 => Some(Mode::Irq),
            0x13 => Some(Mode::Svc),
            0x17 => Some(Mode::Abt),
            0x1b => Some(Mode::Und),
            0x1f => Some(Mode::Sys),
            _ => None,
        }
    }

    /// Every mode except USR is privileged.
    pub fn is_privileged(self) -> bool {
        self != Mode::Usr
    }

    /// A mode has an SPSR iff it is privileged and not SYS.
    pub fn has_spsr(self) -> bool {
        self.is_privileged() && self != Mode::Sys
    }

    /// Three letter tag used in the state dump.
    pub fn name(self) -> &'static str {
        match self {
            Mode::Usr => "USR",
            Mode::Fiq => "FIQ",
            Mode::Irq => "IRQ",
            Mode::Svc => "SVC",
            Mode::Abt => "ABT",
            Mode::Und => "UND",
            Mode::Sys => "SYS",
        }
    }
}

/// Display name of a general register, as used by the state dump.
pub fn register_name(reg: u8) -> &'static str {
    const NAMES: [&str; 16] = [
        "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12", "sp",
        "lr", "pc",
    ];
    NAMES[reg as usize]
}

/// The banked register file.
///
/// R0-R7 and R15 are shared by every mode. R8-R12 have a second bank for
/// FIQ. R13 and R14 are banked per mode, with USR and SYS sharing a bank.
/// FIQ, IRQ, SVC, ABT and UND each own an SPSR slot.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    common: [u32; 8],
    banked_r8_r12: [[u32; 5]; 2],
    banked_r13_r14: [[u32; 2]; 6],
    pc: u32,
    cpsr: u32,
    spsr: [u32; 5],
}

/// Bank index for R8-R12: FIQ owns the shadow copies.
fn high_bank(mode: Mode) -> usize {
    match mode {
        Mode::Fiq => 1,
        _ => 0,
    }
}

/// Bank index for R13-R14. USR and SYS share index 0.
fn low_bank(mode: Mode) -> usize {
    match mode {
        Mode::Usr | Mode::Sys => 0,
        Mode::Fiq => 1,
        Mode::Irq => 2,
        Mode::Svc => 3,
        Mode::Abt => 4,
        Mode::Und => 5,
    }
}

fn spsr_slot(mode: Mode) -> usize {
    match mode {
        Mode::Fiq => 0,
        Mode::Irq => 1,
        Mode::Svc => 2,
        Mode::Abt => 3,
        Mode::Und => 4,
        Mode::Usr | Mode::Sys => panic!("mode {} has no SPSR", mode.name()),
    }
}

impl RegisterFile {
    /// Create a register file with every register zeroed.
    ///
    /// The CPSR starts at zero, which does not encode a valid mode; the
    /// RESET entry performed by the core constructor establishes SVC before
    /// any instruction runs. Until then reads fall back to the USR bank.
    pub fn new() -> Self {
        RegisterFile {
            common: [0; 8],
            banked_r8_r12: [[0; 5]; 2],
            banked_r13_r14: [[0; 2]; 6],
            pc: 0,
            cpsr: 0,
            spsr: [0; 5],
        }
    }

    /// The mode currently selected by CPSR\[4:0\].
    ///
    /// Unpredictable mode encodings fall back to the USR bank; a valid
    /// mode is installed by the RESET entry before anything executes.
    pub fn mode(&self) -> Mode {
        Mode::from_bits(Cpsr(self.cpsr).mode_bits()).unwrap_or(Mode::Usr)
    }

    fn read_banked(&self, mode: Mode, reg: u8) -> u32 {
        match reg {
            0..=7 => self.common[reg as usize],
            8..=12 => self.banked_r8_r12[high_bank(mode)][reg as usize - 8],
            13 | 14 => self.banked_r13_r14[low_bank(mode)][reg as usize - 13],
            15 => self.pc,
            _ => panic!("register index {reg} out of range"),
        }
    }

    fn write_banked(&mut self, mode: Mode, reg: u8, value: u32) {
        match reg {
            0..=7 => self.common[reg as usize] = value,
            8..=12 => self.banked_r8_r12[high_bank(mode)][reg as usize - 8] = value,
            13 | 14 => self.banked_r13_r14[low_bank(mode)][reg as usize - 13] = value,
            15 => self.pc = value,
            _ => panic!("register index {reg} out of range"),
        }
    }

    /// Read a register from the bank of the current mode.
    pub fn read_register(&self, reg: u8) -> u32 {
        self.read_banked(self.mode(), reg)
    }

    /// Read a register from the USR bank, whatever the current mode.
    pub fn read_usr_register(&self, reg: u8) -> u32 {
        self.read_banked(Mode::Usr, reg)
    }

    /// Write a register in the bank of the current mode.
    pub fn write_register(&mut self, reg: u8, value: u32) {
        self.write_banked(self.mode(), reg, value);
    }

    /// Write a register in the USR bank, whatever the current mode.
    pub fn write_usr_register(&mut self, reg: u8, value: u32) {
        self.write_banked(Mode::Usr, reg, value);
    }

    /// Read the CPSR. Mode independent.
    pub fn read_cpsr(&self) -> u32 {
        self.cpsr
    }

    /// Write the CPSR. Mode independent; switching the mode bits switches
    /// the visible banks on the next register access.
    pub fn write_cpsr(&mut self, value: u32) {
        self.cpsr = value;
    }

    /// Read the SPSR of the current mode.
    ///
    /// Calling this in USR or SYS is a contract violation and panics; those
    /// modes have no saved status word.
    pub fn read_spsr(&self) -> u32 {
        self.spsr[spsr_slot(self.mode())]
    }

    /// Write the SPSR of the current mode. Same restriction as
    /// [`read_spsr`](Self::read_spsr).
    pub fn write_spsr(&mut self, value: u32) {
        self.spsr[spsr_slot(self.mode())] = value;
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        RegisterFile::new()
    }
}
