use latticed_wire::RpcBody;

/// One RPC addressed to one node daemon, queued for dispatch.
#[derive(Clone, Debug)]
pub struct Task {
    pub job_id: u64,
    pub node: String,
    pub body: RpcBody,
    pub attempt: u32,
}

impl Task {
    pub fn new(job_id: u64, node: impl Into<String>, body: RpcBody) -> Task {
        Task { job_id, node: node.into(), body, attempt: 0 }
    }
}
