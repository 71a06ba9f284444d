//! The GDB remote serial protocol wire codec.
//!
//! Packets travel as `$payload#cc`, where `cc` is the payload's byte sum
//! modulo 256 as two lowercase hex digits. Inbound frames are located in
//! the receive buffer and checked here; outbound replies are staged as a
//! payload and framed on encode. 32-bit values cross the wire as eight hex
//! digits in TARGET byte order, independent of the host.

use std::io::Write;

use memchr::memchr;

use crate::memory::Endianness;

/// Upper bound of a framed packet. `qSupported` advertises this to the
/// debugger as `PacketSize=400` (hex).
pub const MAX_PACKET_SIZE: usize = 1024;

/// Byte order of the simulated target, fixed at compile time.
pub const TARGET_ENDIANNESS: Endianness = Endianness::Little;

/// Scan `buf` for the next frame.
///
/// Returns how many leading bytes are fully consumed (junk outside framing,
/// including stray `+`/`-` acknowledgements, plus any complete frame) and
/// the frame found, not yet checksum-verified. A partial frame stays in the
/// buffer: only the bytes in front of its `$` are consumed.
pub fn feed(buf: &[u8]) -> (usize, Option<UncheckedPacket>) {
    let Some(start) = memchr(b'$', buf) else {
        return (buf.len(), None);
    };
    let Some(hash) = memchr(b'#', &buf[start..]).map(|i| start + i) else {
        return (start, None);
    };
    if buf.len() < hash + 3 {
        return (start, None);
    }
    let packet = UncheckedPacket {
        data: buf[start + 1..hash].to_vec(),
        checksum: [buf[hash + 1], buf[hash + 2]],
    };
    (hash + 3, Some(packet))
}

/// A received frame whose checksum has not been verified yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncheckedPacket {
    /// Raw payload between `$` and `#`. For `X` packets this still carries
    /// the escape bytes.
    pub data: Vec<u8>,
    /// The two checksum digits following `#`.
    pub checksum: [u8; 2],
}

impl UncheckedPacket {
    /// Checksum the payload should carry.
    pub fn expected_checksum(&self) -> u8 {
        checksum(&self.data)
    }

    /// Checksum the peer claimed, if its digits parse as hex.
    pub fn claimed_checksum(&self) -> Option<u8> {
        let digits = std::str::from_utf8(&self.checksum).ok()?;
        u8::from_str_radix(digits, 16).ok()
    }

    /// Verify the checksum, yielding the payload on success.
    pub fn check(self) -> Option<Vec<u8>> {
        (self.claimed_checksum() == Some(self.expected_checksum())).then_some(self.data)
    }
}

fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte))
}

/// An outbound reply, staged as a bare payload and framed on
/// [`encode`](Self::encode).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponsePacket {
    data: Vec<u8>,
}

impl ResponsePacket {
    /// An empty reply; framed, this is the protocol's "not supported"
    /// answer.
    pub fn new() -> Self {
        ResponsePacket {
            data: Vec::with_capacity(MAX_PACKET_SIZE),
        }
    }

    /// A reply carrying `payload`.
    pub fn from_payload(payload: impl Into<Vec<u8>>) -> Self {
        ResponsePacket {
            data: payload.into(),
        }
    }

    /// The staged payload.
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// Append literal text.
    pub fn push_str(&mut self, text: &str) {
        self.data.extend_from_slice(text.as_bytes());
    }

    /// Append one byte as two lowercase hex digits.
    pub fn push_hex_byte(&mut self, byte: u8) {
        self.data.extend_from_slice(hex::encode([byte]).as_bytes());
    }

    /// Append a 32-bit value as eight hex digits in target byte order.
    pub fn push_u32(&mut self, value: u32) {
        self.data.extend_from_slice(encode_u32(value).as_bytes());
    }

    /// Checksum over the staged payload.
    pub fn checksum(&self) -> u8 {
        checksum(&self.data)
    }

    /// Write the framed packet: `$`, payload, `#`, two checksum digits.
    pub fn encode<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(b"$")?;
        writer.write_all(&self.data)?;
        write!(writer, "#{:02x}", self.checksum())?;
        writer.flush()
    }
}

/// Encode a 32-bit value as eight lowercase hex digits in target byte
/// order.
pub fn encode_u32(value: u32) -> String {
    let bytes = match TARGET_ENDIANNESS {
        Endianness::Little => value.to_le_bytes(),
        Endianness::Big => value.to_be_bytes(),
    };
    hex::encode(bytes)
}

/// Decode eight hex digits in target byte order back into a value.
/// Symmetric with [`encode_u32`].
pub fn decode_u32(text: &[u8]) -> Option<u32> {
    let mut bytes = [0u8; 4];
    hex::decode_to_slice(text.get(..8)?, &mut bytes).ok()?;
    Some(match TARGET_ENDIANNESS {
        Endianness::Little => u32::from_le_bytes(bytes),
        Endianness::Big => u32::from_be_bytes(bytes),
    })
}

/// Iterate over an `X` packet body, resolving the binary escape: `0x7d`
/// marks the following byte as XORed with `0x20`.
pub fn unescape(body: &[u8]) -> Unescape<'_> {
    Unescape { rest: body }
}

/// Iterator returned by [`unescape`].
#[derive(Debug, Clone)]
pub struct Unescape<'a> {
    rest: &'a [u8],
}

impl Iterator for Unescape<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let (&first, rest) = self.rest.split_first()?;
        if first == 0x7d {
            // A lone trailing escape byte has nothing to resolve.
            let (&escaped, rest) = rest.split_first()?;
            self.rest = rest;
            Some(escaped ^ 0x20)
        } else {
            self.rest = rest;
            Some(first)
        }
    }
}
