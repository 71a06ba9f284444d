//! GDB protocol command handlers.
//!
//! Every handler produces exactly one reply, except the kill request which
//! half-closes the connection instead. Register traffic performed on
//! behalf of the debugger is bracketed with `trace_disable`/`trace_enable`
//! so it does not pollute the execution trace; the raw memory commands
//! bypass the core facade entirely for the same reason.

use crate::core::ArmCore;
use crate::exception::Exception;
use crate::step::Simulator;

use super::packet::{self, ResponsePacket};
use super::parser::{Packet, QueryPacket};
use super::session::GdbSession;
use super::Connection;

/// The undefined-instruction pattern GDB plants as a software breakpoint
/// when the target offers no breakpoint hardware.
const SOFT_BREAKPOINT_MASK: u32 = 0xFFF0_00F0;
const SOFT_BREAKPOINT_PATTERN: u32 = 0xE7F0_00F0;

impl<C: Connection> GdbSession<C> {
    /// Route one parsed command to its handler.
    pub(super) fn handle(
        &mut self,
        simulator: &mut Simulator,
        packet: Packet,
    ) -> anyhow::Result<Option<ResponsePacket>> {
        let reply = match packet {
            Packet::HaltReason => self.stop_reply(),
            Packet::Continue => self.cont(simulator),
            Packet::SingleStep => self.step(simulator),
            Packet::ReadGeneralRegisters => read_general_registers(&mut simulator.core),
            Packet::WriteGeneralRegisters { regs, cpsr } => {
                write_general_registers(&mut simulator.core, &regs, cpsr)
            }
            Packet::ReadRegister(reg) => read_register(&mut simulator.core, reg),
            Packet::WriteRegister { reg, value } => {
                write_register(&mut simulator.core, reg, value)
            }
            Packet::ReadMemory { address, length } => {
                read_memory(&simulator.core, address, length)
            }
            Packet::WriteMemoryBinary {
                address,
                length,
                body,
            } => write_memory_binary(&mut simulator.core, address, length, &body),
            Packet::SelectThread { kind, id } => select_thread(kind, id),
            Packet::Query(query_packet) => query(query_packet),
            Packet::Kill => {
                tracing::info!("kill request, shutting down the write side");
                self.conn_mut().close_write()?;
                return Ok(None);
            }
        };
        Ok(Some(reply))
    }

    /// The `S`-code reply describing why the target last stopped.
    pub(super) fn stop_reply(&self) -> ResponsePacket {
        let payload = match self.target_exception {
            Some(Exception::UndefinedInstruction) => "S04",
            Some(Exception::PrefetchAbort | Exception::DataAbort) => "S10",
            _ => "S05",
        };
        ResponsePacket::from_payload(payload)
    }

    /// `c`: run until the next fetch would hit a software breakpoint.
    ///
    /// The stub implements no breakpoints of its own, so GDB plants an
    /// architecturally undefined instruction at each breakpoint address.
    /// Before every step the next instruction word is peeked (with tracing
    /// suspended; the peek must not appear in the trace) and the loop stops
    /// short of executing the planted pattern. GDB then swaps the original
    /// instruction back itself.
    fn cont(&mut self, simulator: &mut Simulator) -> ResponsePacket {
        let Simulator { core, stepper } = simulator;

        loop {
            core.trace_disable();
            let pc = core.read_register(15).wrapping_sub(4);
            let instruction = core.read_word(pc).unwrap_or(0);
            core.trace_enable();

            if instruction & SOFT_BREAKPOINT_MASK == SOFT_BREAKPOINT_PATTERN {
                break;
            }

            self.target_exception = stepper.step(core);
            core.trace_state();
        }

        self.stop_reply()
    }

    /// `s`: execute a single instruction.
    fn step(&mut self, simulator: &mut Simulator) -> ResponsePacket {
        let Simulator { core, stepper } = simulator;
        self.target_exception = stepper.step(core);
        core.trace_state();
        self.stop_reply()
    }
}

/// `g`: all general registers, eight FP placeholders, `fps`, CPSR.
fn read_general_registers(core: &mut ArmCore) -> ResponsePacket {
    let mut reply = ResponsePacket::new();

    core.trace_disable();
    for reg in 0..15u8 {
        reply.push_u32(core.read_register(reg));
    }
    // The stored PC is one fetch ahead; the debugger wants the raw value.
    reply.push_u32(core.read_register(15).wrapping_sub(4));
    // f0-f7 and fps are not implemented; GDB accepts `x` filler.
    for _ in 0..8 {
        reply.push_str("xxxxxxxxxxxxxxxxxxxxxxxx");
    }
    reply.push_str("xxxxxxxx");
    reply.push_u32(core.read_cpsr());
    core.trace_enable();

    reply
}

/// `G`: write R0-R15 and CPSR verbatim; FP fields were already dropped by
/// the parser.
fn write_general_registers(core: &mut ArmCore, regs: &[u32], cpsr: u32) -> ResponsePacket {
    core.trace_disable();
    for (reg, &value) in regs.iter().enumerate() {
        core.write_register(reg as u8, value);
    }
    core.write_cpsr(cpsr);
    core.trace_enable();
    tracing::debug!("wrote general registers, cpsr = {cpsr:08x}");

    ResponsePacket::from_payload("OK")
}

/// `p`: read a single register, with the PC read convention removed.
fn read_register(core: &mut ArmCore, reg: u32) -> ResponsePacket {
    // An index past the register file is a debugger bug, not an input
    // error; see the protocol error taxonomy.
    assert!(reg < 16, "register index {reg} out of range");
    let reg = reg as u8;

    core.trace_disable();
    let mut value = core.read_register(reg);
    if reg == 15 {
        value = value.wrapping_sub(4);
    }
    core.trace_enable();

    let mut reply = ResponsePacket::new();
    reply.push_u32(value);
    reply
}

/// `P`: write a single register verbatim.
fn write_register(core: &mut ArmCore, reg: u32, value: u32) -> ResponsePacket {
    assert!(reg < 16, "register index {reg} out of range");

    core.trace_disable();
    core.write_register(reg as u8, value);
    core.trace_enable();
    tracing::debug!("wrote {value:08x} to register {reg}");

    ResponsePacket::from_payload("OK")
}

/// `m`: read memory as hex pairs, stopping at the first failing byte.
///
/// A failing byte ends the reply early with success framing; GDB accepts
/// the short read and retries the remainder itself.
fn read_memory(core: &ArmCore, address: u32, length: u32) -> ResponsePacket {
    let memory = core.memory();

    let mut reply = ResponsePacket::new();
    let mut address = address;
    for _ in 0..length {
        match memory.read_byte(address) {
            Ok(byte) => reply.push_hex_byte(byte),
            Err(_) => break,
        }
        address = address.wrapping_add(1);
    }

    reply
}

/// `X`: binary write. Only the starting address is pre-checked; a failing
/// byte write stops the loop. Either condition answers `E02`.
fn write_memory_binary(
    core: &mut ArmCore,
    address: u32,
    length: u32,
    body: &[u8],
) -> ResponsePacket {
    let memory = core.memory_mut();

    tracing::debug!(
        "writing {length} bytes at {address:#010x}: {}",
        hex::encode(&body[..body.len().min(32)])
    );

    let mut write_ok = (address as usize) < memory.size();
    let mut decoded = packet::unescape(body);
    let mut address = address;
    let mut written = 0u32;
    while written < length && write_ok {
        match decoded.next() {
            Some(value) => {
                write_ok = memory.write_byte(address, value).is_ok();
                address = address.wrapping_add(1);
                written += 1;
            }
            None => break,
        }
    }

    if write_ok {
        ResponsePacket::from_payload("OK")
    } else {
        ResponsePacket::from_payload("E02")
    }
}

/// `H`: thread selection. A single thread is advertised, so only "any"
/// (0) and "all" (-1) are meaningful.
fn select_thread(kind: u8, id: i32) -> ResponsePacket {
    if (kind == b'c' || kind == b'g') && id < 1 && id > -2 {
        ResponsePacket::from_payload("OK")
    } else {
        ResponsePacket::from_payload("E01")
    }
}

/// `q`: the handful of queries GDB insists on.
fn query(packet: QueryPacket) -> ResponsePacket {
    let payload = match packet {
        QueryPacket::Offsets => "Text=0;Data=0;Bss=0",
        QueryPacket::Supported => "PacketSize=400",
        QueryPacket::TraceStatus => "T0;tnotrun:0",
        QueryPacket::Symbol | QueryPacket::Other => "",
    };
    ResponsePacket::from_payload(payload)
}
