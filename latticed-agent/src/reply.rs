use latticed_base::ErrorKind;
use latticed_wire::{Envelope, RpcBody};

/// What a node daemon's reply means at the node-scoped level this
/// crate owns. Anything job-scoped (prolog/epilog failure, a job id
/// the node no longer recognizes as meaningfully distinct from
/// success) is read off the same reply by `latticed_sched`'s
/// `Scheduler::handle_launch_reply` — this crate never interprets the
/// job's fate, only the node's.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeReplyOutcome {
    Success,
    InvalidJobId,
    Timeout,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeReplyAction {
    MakeNodeIdle,
    AlreadyDone,
    MarkNoRespondAndRetry,
}

pub fn interpret(outcome: NodeReplyOutcome) -> NodeReplyAction {
    match outcome {
        NodeReplyOutcome::Success => NodeReplyAction::MakeNodeIdle,
        NodeReplyOutcome::InvalidJobId => NodeReplyAction::AlreadyDone,
        NodeReplyOutcome::Timeout => NodeReplyAction::MarkNoRespondAndRetry,
    }
}

/// Reads the universal `SlurmRc` reply envelope a node daemon sends
/// back for every RPC in this crate's scope. A malformed or
/// unexpected body is treated the same as a timeout: the node gets
/// retried rather than trusted.
pub fn classify_reply(envelope: &Envelope) -> NodeReplyOutcome {
    match envelope.decode_body() {
        Ok(RpcBody::SlurmRc { code, .. }) if code == 0 => NodeReplyOutcome::Success,
        Ok(RpcBody::SlurmRc { code, .. }) if code == ErrorKind::NotFound.wire_code() => {
            NodeReplyOutcome::InvalidJobId
        }
        _ => NodeReplyOutcome::Timeout,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use latticed_wire::JobId;
    use test_log::test;

    fn rc(code: i32) -> Envelope {
        Envelope::encode(&RpcBody::SlurmRc { code, message: String::new() }, Vec::new()).unwrap()
    }

    #[test]
    fn zero_code_is_success() {
        assert_eq!(classify_reply(&rc(0)), NodeReplyOutcome::Success);
        assert_eq!(interpret(NodeReplyOutcome::Success), NodeReplyAction::MakeNodeIdle);
    }

    #[test]
    fn not_found_code_is_invalid_job_id() {
        assert_eq!(classify_reply(&rc(ErrorKind::NotFound.wire_code())), NodeReplyOutcome::InvalidJobId);
        assert_eq!(interpret(NodeReplyOutcome::InvalidJobId), NodeReplyAction::AlreadyDone);
    }

    #[test]
    fn non_rc_body_is_treated_as_a_timeout() {
        let env = Envelope::encode(&RpcBody::KillJob { job_id: JobId::simple(1), hurry: false }, Vec::new()).unwrap();
        assert_eq!(classify_reply(&env), NodeReplyOutcome::Timeout);
    }
}
