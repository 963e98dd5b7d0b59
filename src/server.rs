//! TCP client server: command ingress and event egress
//!
//! Each connected client gets a reader loop (inbound command lines,
//! forwarded verbatim to the link supervisor) and a writer thread
//! (outbound JSON event lines drained from the client's queue).
//!
//! Commands are opaque strings understood only by the controller firmware;
//! no validation or parsing happens here.

use crate::error::{Error, Result};
use crate::events::ClientEvent;
use crate::registry::ClientRegistry;
use crate::supervisor::SupervisorHandle;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Per-client outbound event queue depth
const EVENT_QUEUE_CAPACITY: usize = 64;

/// Accept loop. Spawns one session thread per connected client; runs until
/// the shared running flag clears.
pub fn serve(
    bind_address: &str,
    registry: ClientRegistry,
    supervisor: SupervisorHandle,
    running: Arc<AtomicBool>,
) -> Result<()> {
    let listener = TcpListener::bind(bind_address)?;
    listener.set_nonblocking(true)?;
    log::info!("Client server listening on {}", bind_address);

    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                log::info!("Client connected: {}", addr);
                let registry = registry.clone();
                let supervisor = supervisor.clone();
                let running = Arc::clone(&running);
                let spawned = thread::Builder::new()
                    .name("client-session".to_string())
                    .spawn(move || {
                        if let Err(e) = run_session(stream, registry, supervisor, running) {
                            log::error!("Client session error ({}): {}", addr, e);
                        }
                        log::info!("Client disconnected: {}", addr);
                    });
                if let Err(e) = spawned {
                    log::error!("Failed to spawn client session: {}", e);
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // No connection pending
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                log::error!("Accept error: {}", e);
            }
        }
    }

    Ok(())
}

/// One client session: register, start the supervisor on first connect,
/// pump commands until disconnect, then unregister.
fn run_session(
    stream: TcpStream,
    registry: ClientRegistry,
    supervisor: SupervisorHandle,
    running: Arc<AtomicBool>,
) -> Result<()> {
    stream.set_nonblocking(false)?;

    let (tx, rx) = bounded(EVENT_QUEUE_CAPACITY);
    let client_id = registry.register(tx);

    // The link supervisor starts with the first client of the process
    match supervisor.ensure_started() {
        Ok(true) => log::info!("Link supervisor started by first client"),
        Ok(false) => {}
        Err(e) => log::error!("Failed to start link supervisor: {}", e),
    }

    let writer_stream = stream.try_clone()?;
    let writer_running = Arc::clone(&running);
    let writer = thread::Builder::new()
        .name("client-writer".to_string())
        .spawn(move || write_events(writer_stream, rx, writer_running))
        .map_err(|e| Error::Other(format!("Failed to spawn client writer: {}", e)))?;

    // Read timeout lets the loop notice shutdown between commands
    stream.set_read_timeout(Some(Duration::from_millis(500)))?;
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    while running.load(Ordering::Relaxed) {
        match reader.read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {
                let command = line.trim_end_matches(['\r', '\n']);
                if !command.is_empty() {
                    supervisor.send(command);
                }
                line.clear();
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                // Partial input stays in `line` for the next read
                continue;
            }
            Err(e) => {
                log::debug!("Client read error: {}", e);
                break;
            }
        }
    }

    // Unregister drops the send capability, which stops the writer thread
    registry.unregister(client_id);
    let _ = writer.join();
    Ok(())
}

/// Writer loop: serialize each event as a JSON line
fn write_events(mut stream: TcpStream, rx: Receiver<ClientEvent>, running: Arc<AtomicBool>) {
    loop {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(mut json) => {
                    json.push('\n');
                    if let Err(e) = stream.write_all(json.as_bytes()) {
                        log::debug!("Client write failed: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    log::error!("Event serialization failed: {}", e);
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
