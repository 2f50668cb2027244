//! All inter-process communication — controller to client, controller
//! to node daemon — takes the form of one envelope type carrying a
//! typed body. Generalizes `submerge-net`'s `Msg`/`SpecificMsg` pair
//! (one common envelope, one variant enum for the specifics) from a
//! 3-message toy protocol to the RPC surface the controller and
//! agents need.
//!
//! Encoding goes through `rmp_serde` rather than hand-rolled
//! byte-swapping: MessagePack's own framing gives us the
//! length-prefixed, cross-platform-safe wire format the spec asks
//! for without reinventing int byte order.

use latticed_base::{Bitmap, Error, Result};
use serde::{Deserialize, Serialize};

/// The packed-bitmap wire shape: `(bit_count, word_count, word_array)`,
/// independent of the sending host's native word size.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PackedBitmap {
    pub bit_count: u64,
    pub word_count: u64,
    pub words: Vec<u64>,
}

impl From<&Bitmap> for PackedBitmap {
    fn from(b: &Bitmap) -> Self {
        let (bit_count, word_count, words) = b.pack();
        PackedBitmap { bit_count, word_count, words }
    }
}

impl TryFrom<&PackedBitmap> for Bitmap {
    type Error = Error;
    fn try_from(p: &PackedBitmap) -> Result<Bitmap> {
        Bitmap::unpack(p.bit_count, p.word_count, p.words.clone())
    }
}

/// A job id, optionally carrying an array-task index and/or a
/// heterogeneous-job component index, matching the id syntax forms in
/// the CLI surface (`123`, `123_5`, `123+1`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct JobId {
    pub base: u64,
    pub array_task: Option<u32>,
    pub het_component: Option<u32>,
}

impl JobId {
    pub fn simple(base: u64) -> JobId {
        JobId { base, array_task: None, het_component: None }
    }
}

/// Sentinel step ids, plus the ordinary positive integer case.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum StepId {
    BatchScript,
    Interactive,
    Extern,
    Id(u32),
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NodeCredentialWire {
    pub job_id: JobId,
    pub step_id: StepId,
    pub uid: u32,
    pub gid: u32,
    pub node_list: String,
    pub core_bitmaps_per_node: Vec<PackedBitmap>,
    pub memory_per_node: Vec<u64>,
    pub expiration_unix_ms: u64,
    pub signature: Vec<u8>,
}

/// The typed payload of a message. Names mirror the RPC message types
/// named in the spec (`REQUEST_BATCH_JOB_LAUNCH` -> `BatchJobLaunch`,
/// etc.); `*_RESPONSE` variants are the same request name with
/// `is_response` set true on the envelope rather than a doubled enum.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RpcBody {
    BatchJobLaunch {
        job_id: JobId,
        node_list: String,
        cpu_bitmap: PackedBitmap,
        credential: NodeCredentialWire,
        script: Vec<u8>,
        environment: Vec<(String, String)>,
    },
    LaunchTasks {
        job_id: JobId,
        step_id: StepId,
        node_list: String,
        tasks_per_node: Vec<u32>,
        credential: NodeCredentialWire,
    },
    SignalTasks {
        job_id: JobId,
        step_id: StepId,
        signal: i32,
    },
    TerminateTasks {
        job_id: JobId,
        step_id: StepId,
    },
    KillJob {
        job_id: JobId,
        hurry: bool,
    },
    KillTimelimit {
        job_id: JobId,
    },
    NodeRegistrationStatus {
        node_name: String,
        up_steps: Vec<(JobId, StepId)>,
    },
    Ping,
    Reconfigure,
    JobNotify {
        job_id: JobId,
        message: String,
    },
    Shutdown,
    /// The universal numeric-code-plus-message response, carrying an
    /// `latticed_base::ErrorKind` wire code on failure and `0` on
    /// success.
    SlurmRc {
        code: i32,
        message: String,
    },
}

impl RpcBody {
    pub fn msg_type(&self) -> MsgType {
        match self {
            RpcBody::BatchJobLaunch { .. } => MsgType::RequestBatchJobLaunch,
            RpcBody::LaunchTasks { .. } => MsgType::RequestLaunchTasks,
            RpcBody::SignalTasks { .. } => MsgType::RequestSignalTasks,
            RpcBody::TerminateTasks { .. } => MsgType::RequestTerminateTasks,
            RpcBody::KillJob { .. } => MsgType::RequestKillJob,
            RpcBody::KillTimelimit { .. } => MsgType::RequestKillTimelimit,
            RpcBody::NodeRegistrationStatus { .. } => MsgType::RequestNodeRegistrationStatus,
            RpcBody::Ping => MsgType::RequestPing,
            RpcBody::Reconfigure => MsgType::RequestReconfigure,
            RpcBody::JobNotify { .. } => MsgType::RequestJobNotify,
            RpcBody::Shutdown => MsgType::RequestShutdown,
            RpcBody::SlurmRc { .. } => MsgType::ResponseSlurmRc,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum MsgType {
    RequestBatchJobLaunch = 1,
    RequestLaunchTasks = 2,
    RequestSignalTasks = 3,
    RequestTerminateTasks = 4,
    RequestKillJob = 5,
    RequestKillTimelimit = 6,
    RequestNodeRegistrationStatus = 7,
    RequestPing = 8,
    RequestReconfigure = 9,
    RequestJobNotify = 10,
    RequestShutdown = 11,
    ResponseSlurmRc = 100,
}

pub const CURRENT_PROTOCOL_VERSION: u16 = 1;

/// `{protocol_version, msg_type, body_length, body, auth_cred}`, per
/// the wire envelope in the spec.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub protocol_version: u16,
    pub msg_type: MsgType,
    pub body: Vec<u8>,
    pub auth_cred: Vec<u8>,
}

impl Envelope {
    pub fn encode(body: &RpcBody, auth_cred: Vec<u8>) -> Result<Envelope> {
        let packed = rmp_serde::to_vec(body)?;
        Ok(Envelope {
            protocol_version: CURRENT_PROTOCOL_VERSION,
            msg_type: body.msg_type(),
            body: packed,
            auth_cred,
        })
    }

    pub fn decode_body(&self) -> Result<RpcBody> {
        Ok(rmp_serde::from_slice(&self.body)?)
    }

    pub fn body_length(&self) -> u32 {
        self.body.len() as u32
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Envelope> {
        Ok(rmp_serde::from_slice(buf)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn envelope_round_trips() {
        let body = RpcBody::KillJob { job_id: JobId::simple(42), hurry: false };
        let env = Envelope::encode(&body, vec![1, 2, 3]).unwrap();
        assert_eq!(env.msg_type, MsgType::RequestKillJob);
        let bytes = env.to_bytes().unwrap();
        let back = Envelope::from_bytes(&bytes).unwrap();
        match back.decode_body().unwrap() {
            RpcBody::KillJob { job_id, hurry } => {
                assert_eq!(job_id.base, 42);
                assert!(!hurry);
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn packed_bitmap_round_trips() {
        let mut b = Bitmap::alloc(20);
        b.set(3);
        b.set(19);
        let packed = PackedBitmap::from(&b);
        let back = Bitmap::try_from(&packed).unwrap();
        assert_eq!(b, back);
    }
}
