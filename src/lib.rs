//! A pedagogical ARMv5T instruction set simulator with a GDB remote stub.
//!
//! The crate models the processor-visible state of an ARMv5T core (the
//! banked register file, CPSR/SPSR and mode semantics, a flat memory and a
//! cycle counter) behind the [`ArmCore`] facade, which enforces the ARM
//! PC read convention (R15 reads as the executing instruction's address
//! plus 8) and records every access through a [`Tracer`]. Instruction
//! decoding is not part of the crate: execution goes through the
//! [`Stepper`] seam supplied by the embedder.
//!
//! The [`gdb`] module is a remote serial protocol stub over that facade.
//! It lets a stock `gdb` connect, inspect registers and memory, single
//! step and continue; software breakpoints work through the undefined
//! instruction pattern GDB plants when a target has no breakpoint
//! hardware.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use armv5_sim::{gdb, ArmCore, Endianness, Memory, Simulator};
//! use parking_lot::FairMutex;
//!
//! # fn decoder() -> Box<dyn armv5_sim::Stepper + Send> { unimplemented!() }
//! let core = ArmCore::new(Memory::new(0x1_0000, Endianness::Little));
//! let simulator = Arc::new(FairMutex::new(Simulator::new(core, decoder())));
//! gdb::run(gdb::CONNECTION_STRING, simulator).unwrap();
//! ```

#![warn(missing_docs)]

pub mod core;
pub mod exception;
pub mod gdb;
pub mod memory;
pub mod registers;
pub mod step;
pub mod trace;

pub use crate::core::ArmCore;
pub use crate::exception::Exception;
pub use crate::memory::{Endianness, Memory, MemoryError};
pub use crate::registers::{Cpsr, Mode, RegisterFile};
pub use crate::step::{Simulator, Stepper};
pub use crate::trace::Tracer;
