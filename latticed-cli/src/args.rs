//! `cancel` flags, reproduced verbatim from the cluster's `scancel`.
//! Every flag that has a documented `SCANCEL_*` environment-variable
//! default is wired through clap's `env` attribute so an explicit flag
//! on the command line always wins over the environment, which wins
//! over the built-in default — clap's own precedence already matches
//! the spec's "explicit flag always wins" rule without extra code.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "lcancel", version, about = "Cancel or signal cluster jobs")]
pub struct CancelArgs {
    /// Restrict to jobs under this account.
    #[arg(short = 'A', long, env = "SCANCEL_ACCOUNT")]
    pub account: Option<String>,

    /// Signal only the batch step.
    #[arg(short = 'b', long, env = "SCANCEL_BATCH")]
    pub batch: bool,

    /// Signal the batch step and every other step of the job.
    #[arg(short = 'f', long, env = "SCANCEL_FULL")]
    pub full: bool,

    /// Skip the burst-buffer stage-out before terminating.
    #[arg(short = 'H', long, env = "SCANCEL_HURRY")]
    pub hurry: bool,

    /// Ask for confirmation before canceling each job.
    #[arg(short = 'i', long, env = "SCANCEL_INTERACTIVE")]
    pub interactive: bool,

    /// Cluster name(s) to act on.
    #[arg(short = 'M', long = "clusters", env = "SLURM_CLUSTERS")]
    pub clusters: Option<String>,

    /// Restrict to jobs with this job name.
    #[arg(short = 'n', long, env = "SCANCEL_NAME")]
    pub name: Option<String>,

    /// Restrict to jobs in this partition.
    #[arg(short = 'p', long, env = "SCANCEL_PARTITION")]
    pub partition: Option<String>,

    /// Suppress "cancelled" messages.
    #[arg(short = 'Q', long)]
    pub quiet: bool,

    /// Restrict to jobs under this QOS.
    #[arg(short = 'q', long, env = "SCANCEL_QOS")]
    pub qos: Option<String>,

    /// Restrict to jobs using this reservation.
    #[arg(short = 'R', long)]
    pub reservation: Option<String>,

    /// Signal number or name to send instead of terminating the job.
    #[arg(short = 's', long)]
    pub signal: Option<String>,

    /// Restrict to jobs in one of these states (comma-separated).
    #[arg(short = 't', long = "state", env = "SCANCEL_STATE")]
    pub state: Option<String>,

    /// Restrict to jobs owned by this user.
    #[arg(short = 'u', long, env = "SCANCEL_USER")]
    pub user: Option<String>,

    /// Restrict to jobs running on this node list.
    #[arg(short = 'w', long = "nodelist")]
    pub nodelist: Option<String>,

    /// Restrict to jobs owned by the invoking user.
    #[arg(long)]
    pub me: bool,

    /// Forward the cancellation to a federation sibling cluster.
    #[arg(long)]
    pub sibling: Option<String>,

    /// Restrict to jobs submitted under this workload characterization key.
    #[arg(long, env = "SCANCEL_WCKEY")]
    pub wckey: Option<String>,

    /// Job id(s) to act on; each may use any of the six accepted forms.
    pub job_ids: Vec<String>,
}
