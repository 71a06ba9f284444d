//! GDB remote serial protocol front-end.
//!
//! The stub speaks the subset of the protocol a stock `gdb` needs to
//! inspect and drive the simulated core: register and memory access,
//! single step, continue-to-breakpoint and the standard startup queries.
//! [`run`] accepts TCP connections and serves one [`GdbSession`] per
//! client; every session shares the same [`Simulator`] behind a fair
//! mutex, so handlers from different debuggers never interleave.

mod handlers;
pub mod packet;
pub mod parser;
mod session;

pub use session::GdbSession;

use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;

use anyhow::Context;
use parking_lot::FairMutex;

use crate::step::Simulator;

/// Default listen address.
pub const CONNECTION_STRING: &str = "127.0.0.1:1337";

/// A byte transport that can half-close its write direction.
///
/// The kill request shuts down only our side, leaving the peer free to
/// finish reading; sessions in tests run over in-memory pipes that model
/// the same behavior.
pub trait Connection: Read + Write {
    /// Stop sending without tearing down the read direction.
    fn close_write(&mut self) -> std::io::Result<()>;
}

impl Connection for TcpStream {
    fn close_write(&mut self) -> std::io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

/// Serve GDB sessions forever.
///
/// Binds `addrs` and spawns one thread per accepted connection. Only a
/// failure to bind or accept ends the loop; individual session errors are
/// logged and do not affect other sessions.
pub fn run(addrs: impl ToSocketAddrs, simulator: Arc<FairMutex<Simulator>>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addrs).context("failed to bind the GDB listener")?;
    tracing::info!("listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().context("accept failed")?;
        tracing::info!("new connection from {peer}");

        let simulator = Arc::clone(&simulator);
        std::thread::spawn(move || {
            let mut session = GdbSession::new(stream, simulator);
            match session.run() {
                Ok(()) => tracing::info!("session with {peer} ended"),
                Err(e) => tracing::warn!("session with {peer} failed: {e:#}"),
            }
        });
    }
}
