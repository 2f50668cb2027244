//! Job submission, placement, and the job state machine. Generalizes
//! `submerge-txn`'s `Transaction { time, thunk, state }` record and its
//! small terminal-or-not `State` enum into the full job lifecycle this
//! controller drives, keeping the record-plus-state-machine shape but
//! replacing the OceanVista replication states entirely.

mod job;
mod scheduler;

#[cfg(test)]
mod test;

pub use job::{Job, JobFlags, JobState, SubmitRequest};
pub use scheduler::{
    LaunchReplyAction, LaunchReplyOutcome, Placement, Reservation, ReservationMap, Scheduler,
};
