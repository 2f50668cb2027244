//! The one place in this workspace with a real socket. Every sibling
//! crate keeps `Transport`/`Node` abstract (`submerge-net`'s own
//! `Node` only ever managed in-memory byte queues); the controller is
//! where those queues finally get plugged into TCP. Framing is a
//! 4-byte big-endian length prefix in front of `Envelope::to_bytes()`,
//! the same length-prefix idiom `submerge-net`'s `IOQueues` assumed an
//! outer transport would provide.
//!
//! Deliberately blocking `std::net` sockets, one OS thread per
//! connection, rather than an async runtime — the rest of this
//! workspace's concurrency (the agent fan-out pool, the watchdog) is
//! already built on plain threads plus `Mutex`/`Condvar`, and adding a
//! second concurrency model just for the wire would not buy anything.

use latticed_agent::Transport;
use latticed_base::{invalid_input, Result};
use latticed_nodes::ResourceTable;
use latticed_wire::Envelope;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

fn write_frame(stream: &mut TcpStream, bytes: &[u8]) -> Result<()> {
    let len = bytes.len() as u32;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(bytes)?;
    Ok(())
}

fn read_frame(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(invalid_input("frame exceeds maximum size"));
    }
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf)?;
    Ok(buf)
}

/// Outbound: the controller's half of the agent fan-out's `Transport`
/// collaborator boundary. Resolves a node name to its registered
/// `comm_address`/`port` on every call rather than caching a
/// connection, since an RPC round trip here is rare enough (one launch
/// or kill per job event, not a streaming protocol) that connection
/// reuse would add bookkeeping for no measurable benefit.
pub struct TcpTransport {
    nodes: Arc<ResourceTable>,
}

impl TcpTransport {
    pub fn new(nodes: Arc<ResourceTable>) -> TcpTransport {
        TcpTransport { nodes }
    }
}

impl Transport for TcpTransport {
    fn send(&self, node: &str, envelope: &Envelope, deadline: Duration) -> Result<Envelope> {
        let idx = self
            .nodes
            .lookup_by_name(node)
            .ok_or_else(|| invalid_input(format!("node {node} not registered")))?;
        let (comm_address, port) = self.nodes.with_node(idx, |n| (n.comm_address.clone(), n.port))?;
        let addr = (comm_address.as_str(), port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| invalid_input(format!("node {node} has no resolvable address")))?;

        let mut stream = TcpStream::connect_timeout(&addr, deadline)?;
        stream.set_read_timeout(Some(deadline))?;
        stream.set_write_timeout(Some(deadline))?;

        write_frame(&mut stream, &envelope.to_bytes()?)?;
        let reply_bytes = read_frame(&mut stream)?;
        Envelope::from_bytes(&reply_bytes)
    }
}

/// Inbound: blocks accepting connections on `bind_address`, one OS
/// thread per connection, dispatching every framed envelope it reads
/// to `handle` until the peer disconnects or a frame fails to parse.
pub fn serve(bind_address: &str, handle: impl Fn(&Envelope) -> Envelope + Send + Sync + 'static) -> Result<()> {
    let listener = TcpListener::bind(bind_address)?;
    info!(bind_address, "controller rpc server listening");
    let handle = Arc::new(handle);

    for incoming in listener.incoming() {
        let stream = match incoming {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "failed to accept connection");
                continue;
            }
        };
        let handle = handle.clone();
        std::thread::spawn(move || serve_connection(stream, handle));
    }
    Ok(())
}

fn serve_connection(mut stream: TcpStream, handle: Arc<dyn Fn(&Envelope) -> Envelope + Send + Sync>) {
    let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "unknown".to_string());
    debug!(peer, "connection accepted");
    loop {
        let frame = match read_frame(&mut stream) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(peer, error = %err, "connection closed");
                return;
            }
        };
        let envelope = match Envelope::from_bytes(&frame) {
            Ok(envelope) => envelope,
            Err(err) => {
                error!(peer, error = %err, "malformed envelope, closing connection");
                return;
            }
        };
        let reply = handle(&envelope);
        let reply_bytes = match reply.to_bytes() {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(peer, error = %err, "failed to encode reply, closing connection");
                return;
            }
        };
        if let Err(err) = write_frame(&mut stream, &reply_bytes) {
            debug!(peer, error = %err, "failed to write reply, closing connection");
            return;
        }
    }
}
