//! Job-id syntax accepted by `cancel`, grounded directly on
//! `scancel`'s `_xlate_job_step_ids`: a base 10 job id, optionally
//! followed by one array/het/step suffix. Array range and "all tasks"
//! forms describe a filter the controller resolves against its live
//! job table, not a single id, so they carry no `latticed_wire::JobId`
//! of their own.

use latticed_base::{invalid_input, Result};
use latticed_wire::{JobId, StepId};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepSpec {
    Id(u32),
    Batch,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JobIdSpec {
    /// `123`
    Simple(u64),
    /// `123_5`
    ArrayTask(u64, u32),
    /// `123_*`
    ArrayAll(u64),
    /// `123_[1-10:2]`, already expanded to concrete task ids
    ArrayRange(u64, Vec<u32>),
    /// `123+1`
    HetComponent(u64, u32),
    /// `123.0` / `123.batch`
    Step(u64, StepSpec),
}

impl JobIdSpec {
    pub fn base(&self) -> u64 {
        match self {
            JobIdSpec::Simple(b)
            | JobIdSpec::ArrayTask(b, _)
            | JobIdSpec::ArrayAll(b)
            | JobIdSpec::ArrayRange(b, _)
            | JobIdSpec::HetComponent(b, _)
            | JobIdSpec::Step(b, _) => *b,
        }
    }

    /// The discrete forms translate directly onto the wire `JobId`.
    /// The two array-filter forms describe a set, not a single id.
    pub fn as_wire_job_id(&self) -> Option<JobId> {
        match self {
            JobIdSpec::Simple(base) => Some(JobId::simple(*base)),
            JobIdSpec::ArrayTask(base, task) => {
                Some(JobId { base: *base, array_task: Some(*task), het_component: None })
            }
            JobIdSpec::HetComponent(base, comp) => {
                Some(JobId { base: *base, array_task: None, het_component: Some(*comp) })
            }
            JobIdSpec::Step(base, _) => Some(JobId::simple(*base)),
            JobIdSpec::ArrayAll(_) | JobIdSpec::ArrayRange(_, _) => None,
        }
    }

    pub fn step_id(&self) -> Option<StepId> {
        match self {
            JobIdSpec::Step(_, StepSpec::Batch) => Some(StepId::BatchScript),
            JobIdSpec::Step(_, StepSpec::Id(n)) => Some(StepId::Id(*n)),
            _ => None,
        }
    }
}

pub fn parse(input: &str) -> Result<JobIdSpec> {
    let invalid = || invalid_input(format!("invalid job id {input:?}"));

    let digit_count = input.chars().take_while(|c| c.is_ascii_digit()).count();
    if digit_count == 0 {
        return Err(invalid());
    }
    let base: u64 = input[..digit_count].parse().map_err(|_| invalid())?;
    if base == 0 {
        return Err(invalid());
    }
    let rest = &input[digit_count..];

    if rest.is_empty() {
        return Ok(JobIdSpec::Simple(base));
    }
    if rest == "_*" {
        return Ok(JobIdSpec::ArrayAll(base));
    }
    if let Some(after) = rest.strip_prefix("_[") {
        let close = after.find(']').ok_or_else(invalid)?;
        let (range_body, tail) = after.split_at(close);
        if !tail[1..].is_empty() {
            return Err(invalid());
        }
        let tasks = parse_array_range(range_body).map_err(|_| invalid())?;
        return Ok(JobIdSpec::ArrayRange(base, tasks));
    }
    if let Some(after) = rest.strip_prefix('_') {
        let task: u32 = after.parse().map_err(|_| invalid())?;
        return Ok(JobIdSpec::ArrayTask(base, task));
    }
    if let Some(after) = rest.strip_prefix('+') {
        let comp: u32 = after.parse().map_err(|_| invalid())?;
        return Ok(JobIdSpec::HetComponent(base, comp));
    }
    if let Some(after) = rest.strip_prefix('.') {
        if after == "batch" {
            return Ok(JobIdSpec::Step(base, StepSpec::Batch));
        }
        let step: u32 = after.parse().map_err(|_| invalid())?;
        return Ok(JobIdSpec::Step(base, StepSpec::Id(step)));
    }
    Err(invalid())
}

fn parse_array_range(body: &str) -> Result<Vec<u32>> {
    let mut tasks = Vec::new();
    for part in body.split(',') {
        match part.split_once('-') {
            Some((lo, hi_stride)) => {
                let lo: u32 = lo.parse()?;
                let (hi, stride) = match hi_stride.split_once(':') {
                    Some((hi, stride)) => (hi.parse::<u32>()?, stride.parse::<u32>()?),
                    None => (hi_stride.parse::<u32>()?, 1),
                };
                if stride == 0 || lo > hi {
                    return Err(invalid_input(format!("invalid array range {part:?}")));
                }
                let mut task = lo;
                while task <= hi {
                    tasks.push(task);
                    task += stride;
                }
            }
            None => tasks.push(part.parse()?),
        }
    }
    Ok(tasks)
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn simple_form() {
        assert_eq!(parse("123").unwrap(), JobIdSpec::Simple(123));
    }

    #[test]
    fn array_task_form() {
        assert_eq!(parse("123_5").unwrap(), JobIdSpec::ArrayTask(123, 5));
    }

    #[test]
    fn array_all_form() {
        assert_eq!(parse("123_*").unwrap(), JobIdSpec::ArrayAll(123));
    }

    #[test]
    fn array_range_form_expands_with_stride() {
        assert_eq!(parse("123_[1-10:2]").unwrap(), JobIdSpec::ArrayRange(123, vec![1, 3, 5, 7, 9]));
    }

    #[test]
    fn array_range_form_without_stride_is_contiguous() {
        assert_eq!(parse("123_[1-3]").unwrap(), JobIdSpec::ArrayRange(123, vec![1, 2, 3]));
    }

    #[test]
    fn het_component_form() {
        assert_eq!(parse("123+1").unwrap(), JobIdSpec::HetComponent(123, 1));
    }

    #[test]
    fn numeric_step_form() {
        assert_eq!(parse("123.0").unwrap(), JobIdSpec::Step(123, StepSpec::Id(0)));
    }

    #[test]
    fn batch_step_form() {
        assert_eq!(parse("123.batch").unwrap(), JobIdSpec::Step(123, StepSpec::Batch));
    }

    #[test]
    fn zero_job_id_is_rejected() {
        assert!(parse("0").is_err());
    }

    #[test]
    fn garbage_suffix_is_rejected() {
        assert!(parse("123_abc").is_err());
        assert!(parse("123xyz").is_err());
    }

    #[test]
    fn discrete_forms_translate_to_a_wire_job_id() {
        let spec = parse("123_5").unwrap();
        let job_id = spec.as_wire_job_id().unwrap();
        assert_eq!(job_id.base, 123);
        assert_eq!(job_id.array_task, Some(5));
    }

    #[test]
    fn array_filter_forms_have_no_single_wire_job_id() {
        assert!(parse("123_*").unwrap().as_wire_job_id().is_none());
        assert!(parse("123_[1-2]").unwrap().as_wire_job_id().is_none());
    }
}
