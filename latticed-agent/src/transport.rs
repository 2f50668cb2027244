use latticed_base::Result;
use latticed_wire::Envelope;
use std::time::Duration;

/// The collaborator boundary between the dispatch engine and whatever
/// actually talks to a node daemon. Generalizes `submerge-net`'s
/// `Node::send_msg`/`recv_msg` pair (one peer, one blocking round
/// trip) into a name-addressed, deadline-bounded call so the engine
/// can be driven by a real socket implementation in production and a
/// scripted fake in tests.
pub trait Transport: Send + Sync {
    /// Sends `envelope` to `node` and blocks for the reply, failing
    /// with `ErrorKind::TemporaryFailure` if `deadline` elapses first.
    fn send(&self, node: &str, envelope: &Envelope, deadline: Duration) -> Result<Envelope>;
}
