//! Parser for GDB packet payloads.
//!
//! Packets have the wire format `$packet-data#checksum`; framing and
//! checksum live in [`super::packet`]. This parser turns the packet-data of
//! the commands the stub implements into a [`Packet`] value. Anything it
//! does not recognize earns the empty "not supported" reply.

use nom::branch::alt;
use nom::bytes::complete::take;
use nom::character::complete::{char, digit0};
use nom::combinator::{map_opt, opt};
use nom::multi::count;
use nom::number::complete::hex_u32;
use nom::IResult;

use super::packet::decode_u32;

/// A decoded command payload.
#[derive(Debug, PartialEq, Clone)]
pub enum Packet {
    /// Packet `?`
    HaltReason,
    /// Packet `c`
    Continue,
    /// Packet `s`
    SingleStep,
    /// Packet `g`
    ReadGeneralRegisters,
    /// Packet `G`. FP and `fps` fields of the layout are discarded during
    /// parsing; only R0-R15 and the CPSR survive.
    WriteGeneralRegisters {
        /// R0-R15, in order.
        regs: Vec<u32>,
        /// The CPSR value closing the layout.
        cpsr: u32,
    },
    /// Packet `p`. The index is ASCII decimal.
    ReadRegister(u32),
    /// Packet `P`. The index is hex.
    WriteRegister {
        /// Register index.
        reg: u32,
        /// Value, decoded from target byte order.
        value: u32,
    },
    /// Packet `m`
    ReadMemory {
        /// Start address.
        address: u32,
        /// Number of bytes requested.
        length: u32,
    },
    /// Packet `X`. The body is kept escaped; the handler resolves it while
    /// writing.
    WriteMemoryBinary {
        /// Start address.
        address: u32,
        /// Number of decoded bytes to store.
        length: u32,
        /// Escaped body bytes after the `:`.
        body: Vec<u8>,
    },
    /// Packet `H`
    SelectThread {
        /// Operation the selection applies to (`c` or `g`).
        kind: u8,
        /// Thread id, ASCII decimal, possibly negative.
        id: i32,
    },
    /// Packet `q`
    Query(QueryPacket),
    /// Packet `k`
    Kill,
}

/// The `q` sub-commands the stub answers.
#[derive(Debug, PartialEq, Clone)]
pub enum QueryPacket {
    /// `qOffsets`
    Offsets,
    /// `qSupported`, with any feature list.
    Supported,
    /// `qTStatus`
    TraceStatus,
    /// `qSymbol::`
    Symbol,
    /// Any other query; answered with the empty reply.
    Other,
}

/// Parse one packet payload.
pub fn parse_packet(input: &[u8]) -> anyhow::Result<Packet> {
    let result = alt((
        halt_reason,
        continue_packet,
        single_step,
        read_general_registers,
        write_general_registers,
        read_register,
        write_register,
        read_memory,
        write_memory_binary,
        select_thread,
        query,
        kill,
    ))(input);

    match result {
        Ok((_remaining, packet)) => Ok(packet),
        Err(e) => Err(anyhow::anyhow!("unrecognized packet: {e}")),
    }
}

/// ASCII decimal integer with optional sign, in the spirit of `atoi`:
/// missing digits read as zero and trailing bytes are left alone.
fn ascii_int(input: &[u8]) -> IResult<&[u8], i32> {
    let (input, sign) = opt(char('-'))(input)?;
    let (input, digits) = digit0(input)?;

    let mut value: i64 = 0;
    for &digit in digits {
        value = value * 10 + i64::from(digit - b'0');
        if value > i64::from(u32::MAX) {
            break;
        }
    }
    if sign.is_some() {
        value = -value;
    }

    Ok((input, value as i32))
}

/// Eight hex digits carrying a 32-bit value in target byte order.
fn hex_u32_target(input: &[u8]) -> IResult<&[u8], u32> {
    map_opt(take(8usize), decode_u32)(input)
}

fn halt_reason(input: &[u8]) -> IResult<&[u8], Packet> {
    let (input, _) = char('?')(input)?;

    Ok((input, Packet::HaltReason))
}

fn continue_packet(input: &[u8]) -> IResult<&[u8], Packet> {
    let (input, _) = char('c')(input)?;

    Ok((input, Packet::Continue))
}

fn single_step(input: &[u8]) -> IResult<&[u8], Packet> {
    let (input, _) = char('s')(input)?;

    Ok((input, Packet::SingleStep))
}

fn read_general_registers(input: &[u8]) -> IResult<&[u8], Packet> {
    let (input, _) = char('g')(input)?;

    Ok((input, Packet::ReadGeneralRegisters))
}

fn write_general_registers(input: &[u8]) -> IResult<&[u8], Packet> {
    let (input, _) = char('G')(input)?;

    let (input, regs) = count(hex_u32_target, 16)(input)?;

    // Eight 96-bit FP placeholders plus the 32-bit fps one: 25 words the
    // stub never implements. Skip without requiring valid hex, since the
    // debugger echoes them back as `x` filler.
    let (input, _) = take(200usize)(input)?;

    let (input, cpsr) = hex_u32_target(input)?;

    Ok((input, Packet::WriteGeneralRegisters { regs, cpsr }))
}

fn read_register(input: &[u8]) -> IResult<&[u8], Packet> {
    let (input, _) = char('p')(input)?;

    let (input, reg) = ascii_int(input)?;

    Ok((input, Packet::ReadRegister(reg as u32)))
}

fn write_register(input: &[u8]) -> IResult<&[u8], Packet> {
    let (input, _) = char('P')(input)?;

    let (input, reg) = hex_u32(input)?;

    let (input, _) = char('=')(input)?;

    let (input, value) = hex_u32_target(input)?;

    Ok((input, Packet::WriteRegister { reg, value }))
}

fn read_memory(input: &[u8]) -> IResult<&[u8], Packet> {
    let (input, _) = char('m')(input)?;

    let (input, address) = hex_u32(input)?;
    let (input, _) = char(',')(input)?;
    let (input, length) = hex_u32(input)?;

    Ok((input, Packet::ReadMemory { address, length }))
}

fn write_memory_binary(input: &[u8]) -> IResult<&[u8], Packet> {
    let (input, _) = char('X')(input)?;

    let (input, address) = hex_u32(input)?;
    let (input, _) = char(',')(input)?;
    let (input, length) = hex_u32(input)?;
    let (input, _) = char(':')(input)?;

    Ok((
        &input[input.len()..],
        Packet::WriteMemoryBinary {
            address,
            length,
            body: input.to_vec(),
        },
    ))
}

fn select_thread(input: &[u8]) -> IResult<&[u8], Packet> {
    let (input, _) = char('H')(input)?;

    let (input, kind) = opt(take(1usize))(input)?;
    let kind = kind.map_or(0, |k| k[0]);

    let (input, id) = ascii_int(input)?;

    Ok((input, Packet::SelectThread { kind, id }))
}

fn query(input: &[u8]) -> IResult<&[u8], Packet> {
    let (input, _) = char('q')(input)?;

    let packet = if input == b"Offsets" {
        QueryPacket::Offsets
    } else if input.starts_with(b"Supported") {
        QueryPacket::Supported
    } else if input == b"TStatus" {
        QueryPacket::TraceStatus
    } else if input == b"Symbol::" {
        QueryPacket::Symbol
    } else {
        QueryPacket::Other
    };

    Ok((&input[input.len()..], Packet::Query(packet)))
}

fn kill(input: &[u8]) -> IResult<&[u8], Packet> {
    let (input, _) = char('k')(input)?;

    Ok((input, Packet::Kill))
}
