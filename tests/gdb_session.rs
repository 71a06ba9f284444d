//! End-to-end GDB stub sessions over a scripted in-memory connection.
//!
//! Each test feeds pre-framed packets to a [`GdbSession`] and checks the
//! acknowledgement and reply stream byte for byte, recomputing checksums
//! instead of trusting any literal.

use std::io::{Cursor, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use armv5_sim::gdb::packet::encode_u32;
use armv5_sim::gdb::{Connection, GdbSession};
use armv5_sim::{ArmCore, Endianness, Exception, Memory, Simulator, Stepper, Tracer};
use parking_lot::FairMutex;

/// Transport double: scripted input, captured output, observable
/// half-close.
struct ScriptedConnection {
    input: Cursor<Vec<u8>>,
    output: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicBool>,
}

impl Read for ScriptedConnection {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for ScriptedConnection {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.output.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Connection for ScriptedConnection {
    fn close_write(&mut self) -> std::io::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
enum Event {
    Ack,
    Nak,
    Packet(Vec<u8>),
}

fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Frame a payload as `$payload#cc`.
fn frame(payload: &[u8]) -> Vec<u8> {
    let mut framed = vec![b'$'];
    framed.extend_from_slice(payload);
    framed.extend_from_slice(format!("#{:02x}", checksum(payload)).as_bytes());
    framed
}

/// Split the captured output back into acks, naks and verified packets.
fn parse_output(mut bytes: &[u8]) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some((&first, rest)) = bytes.split_first() {
        match first {
            b'+' => {
                events.push(Event::Ack);
                bytes = rest;
            }
            b'-' => {
                events.push(Event::Nak);
                bytes = rest;
            }
            b'$' => {
                let hash = rest.iter().position(|&b| b == b'#').expect("unterminated packet");
                let payload = &rest[..hash];
                let digits = std::str::from_utf8(&rest[hash + 1..hash + 3]).unwrap();
                assert_eq!(
                    u8::from_str_radix(digits, 16).unwrap(),
                    checksum(payload),
                    "reply checksum"
                );
                events.push(Event::Packet(payload.to_vec()));
                bytes = &rest[hash + 3..];
            }
            other => panic!("unexpected byte {other:#04x} in output"),
        }
    }
    events
}

fn reply(text: &str) -> Event {
    Event::Packet(text.as_bytes().to_vec())
}

/// A stepper that must never run.
fn unreachable_stepper() -> Box<dyn Stepper + Send> {
    Box::new(|_: &mut ArmCore| -> Option<Exception> {
        panic!("the step primitive must not be invoked")
    })
}

/// A stepper that fetches one instruction and reports a fixed exception.
fn fetching_stepper(
    exception: Option<Exception>,
    calls: Arc<AtomicU32>,
) -> Box<dyn Stepper + Send> {
    Box::new(move |core: &mut ArmCore| -> Option<Exception> {
        calls.fetch_add(1, Ordering::SeqCst);
        let _ = core.fetch();
        exception
    })
}

fn run_session(
    core: ArmCore,
    stepper: Box<dyn Stepper + Send>,
    input: Vec<u8>,
) -> (Vec<Event>, Arc<FairMutex<Simulator>>, Arc<AtomicBool>) {
    let simulator = Arc::new(FairMutex::new(Simulator::new(core, stepper)));
    let output = Arc::new(Mutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));
    let conn = ScriptedConnection {
        input: Cursor::new(input),
        output: Arc::clone(&output),
        closed: Arc::clone(&closed),
    };

    let mut session = GdbSession::new(conn, Arc::clone(&simulator));
    session.run().expect("session failed");

    let events = parse_output(&output.lock().unwrap());
    (events, simulator, closed)
}

fn fresh_core() -> ArmCore {
    ArmCore::new(Memory::new(64, Endianness::Little))
}

#[test]
fn read_general_registers_after_reset() {
    let (events, _, _) = run_session(fresh_core(), unreachable_stepper(), frame(b"g"));

    assert_eq!(events.len(), 2);
    assert_eq!(events[0], Event::Ack);
    let Event::Packet(payload) = &events[1] else {
        panic!("expected a reply packet");
    };

    // 16 general registers, 8 x 96-bit FP, fps, CPSR.
    assert_eq!(payload.len(), 16 * 8 + 8 * 24 + 8 + 8);
    assert_eq!(&payload[..8], b"00000000", "r0 after reset");
    assert_eq!(&payload[15 * 8..16 * 8], b"00000000", "stored pc after reset");
    assert_eq!(&payload[16 * 8], &b'x', "fp placeholders");
    assert_eq!(&payload[payload.len() - 8..], b"d3010000", "cpsr, target byte order");
}

#[test]
fn bad_checksum_requests_retransmission() {
    let (events, _, _) = run_session(fresh_core(), unreachable_stepper(), b"$g#00".to_vec());
    assert_eq!(events, [Event::Nak]);
}

#[test]
fn write_then_read_register() {
    let mut input = frame(b"P1=deadbeef");
    input.extend(frame(b"p1"));

    let (events, simulator, _) = run_session(fresh_core(), unreachable_stepper(), input);

    assert_eq!(
        events,
        [Event::Ack, reply("OK"), Event::Ack, reply("deadbeef")]
    );
    assert_eq!(simulator.lock().core.read_register(1), 0xefbeadde);
}

#[test]
fn pc_round_trips_without_the_read_convention() {
    let mut input = frame(format!("Pf={}", encode_u32(0x20)).as_bytes());
    input.extend(frame(b"p15"));

    let (events, _, _) = run_session(fresh_core(), unreachable_stepper(), input);

    assert_eq!(
        events,
        [
            Event::Ack,
            reply("OK"),
            Event::Ack,
            Event::Packet(encode_u32(0x20).into_bytes()),
        ]
    );
}

#[test]
fn binary_write_resolves_the_escape() {
    let mut payload = b"Xa,2:".to_vec();
    payload.extend([0x7d, 0x5d, 0x01]);

    let (events, simulator, _) = run_session(fresh_core(), unreachable_stepper(), frame(&payload));

    assert_eq!(events, [Event::Ack, reply("OK")]);
    let simulator = simulator.lock();
    assert_eq!(simulator.core.memory().read_byte(10), Ok(0x7d));
    assert_eq!(simulator.core.memory().read_byte(11), Ok(0x01));
}

#[test]
fn binary_write_past_the_end_fails() {
    // Memory is 64 bytes; 0x40 is the first address outside it.
    let mut payload = b"X40,1:".to_vec();
    payload.push(0x00);

    let (events, _, _) = run_session(fresh_core(), unreachable_stepper(), frame(&payload));
    assert_eq!(events, [Event::Ack, reply("E02")]);
}

#[test]
fn binary_write_stopped_mid_way_fails() {
    // Two bytes starting at the last valid address: the second write fails.
    let mut payload = b"X3f,2:".to_vec();
    payload.extend([0xaa, 0xbb]);

    let (events, simulator, _) = run_session(fresh_core(), unreachable_stepper(), frame(&payload));

    assert_eq!(events, [Event::Ack, reply("E02")]);
    assert_eq!(
        simulator.lock().core.memory().read_byte(0x3f),
        Ok(0xaa),
        "the in-range byte landed before the failure"
    );
}

#[test]
fn continue_stops_at_a_soft_breakpoint_without_stepping() {
    let mut memory = Memory::new(64, Endianness::Little);
    memory.write_word(0, 0xe7f000f0).unwrap();

    let (events, simulator, _) = run_session(
        ArmCore::new(memory),
        unreachable_stepper(),
        frame(b"c"),
    );

    assert_eq!(events, [Event::Ack, reply("S05")]);
    assert_eq!(simulator.lock().core.cycle_count(), 0, "no fetch happened");
}

#[test]
fn continue_steps_up_to_the_breakpoint() {
    let mut memory = Memory::new(64, Endianness::Little);
    memory.write_word(0, 0xe3a01001).unwrap();
    memory.write_word(4, 0xe3a02002).unwrap();
    memory.write_word(8, 0xe7ffdefe).unwrap(); // breakpoint pattern variant

    let calls = Arc::new(AtomicU32::new(0));
    let (events, simulator, _) = run_session(
        ArmCore::new(memory),
        fetching_stepper(None, Arc::clone(&calls)),
        frame(b"c"),
    );

    assert_eq!(events, [Event::Ack, reply("S05")]);
    assert_eq!(calls.load(Ordering::SeqCst), 2, "two instructions executed");
    let simulator = simulator.lock();
    assert_eq!(simulator.core.cycle_count(), 2);
}

#[test]
fn single_step_reports_stop_codes() {
    let test_data = [
        (None, "S05"),
        (Some(Exception::UndefinedInstruction), "S04"),
        (Some(Exception::PrefetchAbort), "S10"),
        (Some(Exception::DataAbort), "S10"),
        (Some(Exception::SoftwareInterrupt), "S05"),
    ];

    for (exception, code) in test_data {
        let mut input = frame(b"s");
        input.extend(frame(b"?"));

        let calls = Arc::new(AtomicU32::new(0));
        let (events, _, _) = run_session(
            fresh_core(),
            fetching_stepper(exception, Arc::clone(&calls)),
            input,
        );

        assert_eq!(
            events,
            [Event::Ack, reply(code), Event::Ack, reply(code)],
            "{exception:?} maps to {code} and is retained by ?"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn halt_reason_defaults_to_sigtrap() {
    let (events, _, _) = run_session(fresh_core(), unreachable_stepper(), frame(b"?"));
    assert_eq!(events, [Event::Ack, reply("S05")]);
}

#[test]
fn thread_selection() {
    let test_data = [
        (&b"Hg0"[..], "OK"),
        (b"Hc0", "OK"),
        (b"Hc-1", "OK"),
        (b"Hg2", "E01"),
        (b"Hg-2", "E01"),
        (b"Hx0", "E01"),
    ];

    for (payload, expected) in test_data {
        let (events, _, _) = run_session(fresh_core(), unreachable_stepper(), frame(payload));
        assert_eq!(
            events,
            [Event::Ack, reply(expected)],
            "{}",
            String::from_utf8_lossy(payload)
        );
    }
}

#[test]
fn standard_queries() {
    let test_data = [
        (&b"qOffsets"[..], "Text=0;Data=0;Bss=0"),
        (b"qSupported:multiprocess+;swbreak+", "PacketSize=400"),
        (b"qTStatus", "T0;tnotrun:0"),
        (b"qSymbol::", ""),
        (b"qfThreadInfo", ""),
    ];

    for (payload, expected) in test_data {
        let (events, _, _) = run_session(fresh_core(), unreachable_stepper(), frame(payload));
        assert_eq!(
            events,
            [Event::Ack, reply(expected)],
            "{}",
            String::from_utf8_lossy(payload)
        );
    }
}

#[test]
fn unknown_commands_get_the_empty_reply() {
    for payload in [&b"vMustReplyEmpty"[..], b"Z0,10,4", b"D"] {
        let (events, _, _) = run_session(fresh_core(), unreachable_stepper(), frame(payload));
        assert_eq!(
            events,
            [Event::Ack, reply("")],
            "{}",
            String::from_utf8_lossy(payload)
        );
    }
}

#[test]
fn read_memory_stops_at_the_first_failing_byte() {
    let mut memory = Memory::new(8, Endianness::Little);
    for address in 0..8 {
        memory.write_byte(address, 0x10 + address as u8).unwrap();
    }

    let mut input = frame(b"m4,8");
    input.extend(frame(b"m0,2"));

    let (events, _, _) = run_session(ArmCore::new(memory), unreachable_stepper(), input);

    assert_eq!(
        events,
        [
            Event::Ack,
            reply("14151617"),
            Event::Ack,
            reply("1011"),
        ],
        "the first read is cut short at the end of memory"
    );
}

#[test]
fn general_registers_round_trip() {
    let (events, _, _) = run_session(fresh_core(), unreachable_stepper(), frame(b"g"));
    let Event::Packet(g_payload) = &events[1] else {
        panic!("expected a reply packet");
    };

    let mut write_back = b"G".to_vec();
    write_back.extend_from_slice(g_payload);
    let mut input = frame(&write_back);
    input.extend(frame(b"g"));

    let (events, _, _) = run_session(fresh_core(), unreachable_stepper(), input);
    assert_eq!(
        events,
        [
            Event::Ack,
            reply("OK"),
            Event::Ack,
            Event::Packet(g_payload.clone()),
        ],
        "writing a read-back register file is a no-op"
    );
}

#[test]
fn kill_half_closes_the_connection() {
    let (events, _, closed) = run_session(fresh_core(), unreachable_stepper(), frame(b"k"));
    assert_eq!(events, [Event::Ack], "no reply to a kill request");
    assert!(closed.load(Ordering::SeqCst));
}

#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn breakpoint_peek_is_not_traced() {
    let mut memory = Memory::new(64, Endianness::Little);
    memory.write_word(0, 0xe7f000f0).unwrap();
    let sink = SharedSink::default();
    // The tracer only sees the RESET entry writes at cycle zero.
    let core = ArmCore::with_tracer(memory, Tracer::new(Box::new(sink.clone())));
    let reset_trace = sink.0.lock().unwrap().clone();

    let (events, _, _) = run_session(core, unreachable_stepper(), frame(b"c"));

    assert_eq!(events, [Event::Ack, reply("S05")]);
    assert_eq!(
        *sink.0.lock().unwrap(),
        reset_trace,
        "peeking the breakpoint adds no trace events"
    );
}

#[test]
fn single_step_records_a_state_snapshot() {
    let mut memory = Memory::new(64, Endianness::Little);
    memory.write_word(0, 0xe3a01001).unwrap();
    let sink = SharedSink::default();
    let core = ArmCore::with_tracer(memory, Tracer::new(Box::new(sink.clone())));

    let calls = Arc::new(AtomicU32::new(0));
    let (events, _, _) = run_session(core, fetching_stepper(None, calls), frame(b"s"));

    assert_eq!(events, [Event::Ack, reply("S05")]);
    let trace = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
    assert!(
        trace.contains("1 mem read 4 fetch 00000000 e3a01001"),
        "fetch event missing from:\n{trace}"
    );
    assert!(
        trace.contains("state cycle=1"),
        "state snapshot missing from:\n{trace}"
    );
}
