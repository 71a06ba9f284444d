//! One debugger connection.
//!
//! A session owns its transport and a handle on the shared simulator.
//! Bytes are collected into a receive buffer, framed packets are checksum
//! verified and acknowledged, and each verified command runs to completion
//! under the simulator mutex before its single reply goes out. GDB speaks
//! strictly request/reply, so there is never more than one packet in
//! flight per session.

use std::io::{Read, Write};
use std::sync::Arc;

use parking_lot::FairMutex;

use crate::exception::Exception;
use crate::step::Simulator;

use super::packet::{self, ResponsePacket, UncheckedPacket};
use super::parser::parse_packet;
use super::Connection;

/// A single GDB remote session over `C`.
pub struct GdbSession<C: Connection> {
    simulator: Arc<FairMutex<Simulator>>,
    conn: C,
    rx: Vec<u8>,
    /// Stop reason retained from the last step or continue, replayed by
    /// `?` queries.
    pub(super) target_exception: Option<Exception>,
}

impl<C: Connection> GdbSession<C> {
    /// Create a session for a freshly accepted connection.
    pub fn new(conn: C, simulator: Arc<FairMutex<Simulator>>) -> Self {
        GdbSession {
            simulator,
            conn,
            rx: Vec::with_capacity(packet::MAX_PACKET_SIZE),
            target_exception: None,
        }
    }

    /// Serve the connection until the peer hangs up.
    ///
    /// A kill request only half-closes our side; the session keeps
    /// draining until the peer closes, as the protocol expects.
    pub fn run(&mut self) -> anyhow::Result<()> {
        let mut chunk = [0u8; 512];

        loop {
            while let Some(packet) = self.next_packet() {
                self.process(packet)?;
            }

            let read = self.conn.read(&mut chunk)?;
            if read == 0 {
                tracing::debug!("peer closed the connection");
                return Ok(());
            }
            self.rx.extend_from_slice(&chunk[..read]);
        }
    }

    fn next_packet(&mut self) -> Option<UncheckedPacket> {
        let (consumed, packet) = packet::feed(&self.rx);
        self.rx.drain(..consumed);
        packet
    }

    /// Verify one frame, acknowledge it and dispatch its command.
    fn process(&mut self, packet: UncheckedPacket) -> anyhow::Result<()> {
        let expected = packet.expected_checksum();
        let claimed = packet.claimed_checksum();
        match packet.check() {
            Some(payload) => {
                self.conn.write_all(b"+")?;
                self.dispatch(&payload)?;
            }
            None => {
                tracing::warn!(
                    "checksum failed, expected {expected:02x} got {claimed:02x?}, \
                     requesting retransmission"
                );
                self.conn.write_all(b"-")?;
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        tracing::debug!("received packet: {:?}", String::from_utf8_lossy(payload));

        let simulator = Arc::clone(&self.simulator);
        let mut simulator = simulator.lock();

        let reply = match parse_packet(payload) {
            Ok(packet) => self.handle(&mut simulator, packet)?,
            Err(e) => {
                tracing::debug!("unsupported request ({e}), sending empty answer");
                Some(ResponsePacket::new())
            }
        };

        // The reply goes out while the mutex is still held, so replies of
        // concurrent sessions appear in handler order.
        if let Some(reply) = reply {
            tracing::debug!(
                "response: {:?}",
                String::from_utf8_lossy(reply.payload())
            );
            reply.encode(&mut self.conn)?;
        }
        Ok(())
    }

    pub(super) fn conn_mut(&mut self) -> &mut C {
        &mut self.conn
    }
}
