//! The `cancel` client: a `scancel`-equivalent binary over the wire
//! protocol in `latticed-wire`. Parses the job-id grammar and filter
//! flags, decides whether `has_default_opt()` applies, and turns the
//! result into the `RpcBody` the controller expects — nothing here
//! talks to a live cluster, which is `latticed-ctld`'s RPC server.

pub mod args;
pub mod filters;
pub mod jobid;
pub mod signal;

pub use args::CancelArgs;
pub use filters::{build_request, CancelRequest, Filters, StepScope};
pub use jobid::{JobIdSpec, StepSpec};
