//! Filter resolution and the `has_default_opt()` heuristic, reproduced
//! exactly from `scancel`: when no filter was given, the command acts
//! only on the job ids listed on the command line. When at least one
//! filter is given, the command instead acts on every job matching
//! the filters, and bare job ids (if any) narrow that set further
//! rather than being required.

use crate::args::CancelArgs;
use crate::jobid::{self, JobIdSpec};
use crate::signal::parse_signal;
use latticed_base::{invalid_input, Result};

#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub account: Option<String>,
    pub name: Option<String>,
    pub partition: Option<String>,
    pub qos: Option<String>,
    pub reservation: Option<String>,
    pub states: Vec<String>,
    pub user: Option<String>,
    pub nodelist: Option<String>,
    pub me: bool,
    pub wckey: Option<String>,
}

impl Filters {
    fn from_args(args: &CancelArgs) -> Filters {
        Filters {
            account: args.account.clone(),
            name: args.name.clone(),
            partition: args.partition.clone(),
            qos: args.qos.clone(),
            reservation: args.reservation.clone(),
            states: args
                .state
                .as_deref()
                .map(|s| s.split(',').map(|t| t.trim().to_ascii_uppercase()).collect())
                .unwrap_or_default(),
            user: args.user.clone(),
            nodelist: args.nodelist.clone(),
            me: args.me,
            wckey: args.wckey.clone(),
        }
    }

    /// `has_default_opt()`: true when none of the filtering options
    /// were given, meaning the command must act only on explicitly
    /// listed job ids.
    pub fn has_default_opt(&self) -> bool {
        self.account.is_none()
            && self.name.is_none()
            && self.partition.is_none()
            && self.qos.is_none()
            && self.reservation.is_none()
            && self.states.is_empty()
            && self.user.is_none()
            && self.nodelist.is_none()
            && !self.me
            && self.wckey.is_none()
    }
}

#[derive(Debug, Clone)]
pub enum StepScope {
    /// Plain job id, no `-b`/`-f` given: terminate the whole job.
    WholeJob,
    /// `-b`: the batch step only.
    BatchOnly,
    /// `-f`: batch step plus every other step.
    Full,
}

#[derive(Debug, Clone)]
pub struct CancelRequest {
    pub job_ids: Vec<JobIdSpec>,
    pub filters: Filters,
    pub step_scope: StepScope,
    pub signal: Option<i32>,
    pub hurry: bool,
    pub interactive: bool,
    pub quiet: bool,
    pub clusters: Option<String>,
    pub sibling: Option<String>,
}

pub fn build_request(args: &CancelArgs) -> Result<CancelRequest> {
    if args.batch && args.full {
        return Err(invalid_input("-b and -f are mutually exclusive"));
    }

    let job_ids = args
        .job_ids
        .iter()
        .map(|s| jobid::parse(s))
        .collect::<Result<Vec<_>>>()?;

    let filters = Filters::from_args(args);

    if filters.has_default_opt() && job_ids.is_empty() {
        return Err(invalid_input("no job id and no filter given; nothing to cancel"));
    }

    let signal = match &args.signal {
        Some(s) => Some(parse_signal(s).map_err(invalid_input)?),
        None => None,
    };

    let step_scope = if args.batch {
        StepScope::BatchOnly
    } else if args.full {
        StepScope::Full
    } else {
        StepScope::WholeJob
    };

    Ok(CancelRequest {
        job_ids,
        filters,
        step_scope,
        signal,
        hurry: args.hurry,
        interactive: args.interactive,
        quiet: args.quiet,
        clusters: args.clusters.clone(),
        sibling: args.sibling.clone(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;
    use test_log::test;

    fn parse(argv: &[&str]) -> CancelArgs {
        let mut full = vec!["lcancel"];
        full.extend_from_slice(argv);
        CancelArgs::parse_from(full)
    }

    #[test]
    fn bare_job_id_with_no_filters_is_accepted() {
        let args = parse(&["123"]);
        let req = build_request(&args).unwrap();
        assert_eq!(req.job_ids, vec![JobIdSpec::Simple(123)]);
        assert!(req.filters.has_default_opt());
    }

    #[test]
    fn no_job_id_and_no_filter_is_rejected() {
        let args = parse(&[]);
        assert!(build_request(&args).is_err());
    }

    #[test]
    fn a_filter_alone_is_accepted_without_any_job_id() {
        let args = parse(&["-u", "alice"]);
        let req = build_request(&args).unwrap();
        assert!(req.job_ids.is_empty());
        assert!(!req.filters.has_default_opt());
        assert_eq!(req.filters.user, Some("alice".to_string()));
    }

    #[test]
    fn batch_and_full_together_is_rejected() {
        let args = parse(&["-b", "-f", "123"]);
        assert!(build_request(&args).is_err());
    }

    #[test]
    fn signal_flag_resolves_through_the_signal_module() {
        let args = parse(&["-s", "KILL", "123"]);
        let req = build_request(&args).unwrap();
        assert_eq!(req.signal, Some(9));
    }

    #[test]
    fn me_flag_counts_as_a_filter() {
        let args = parse(&["--me"]);
        let req = build_request(&args).unwrap();
        assert!(!req.filters.has_default_opt());
        assert!(req.filters.me);
    }

    #[test]
    fn explicit_flag_overrides_inherited_environment() {
        std::env::set_var("SCANCEL_USER", "from-env");
        let args = parse(&["-u", "from-flag"]);
        std::env::remove_var("SCANCEL_USER");
        assert_eq!(args.user, Some("from-flag".to_string()));
    }
}
