use clap::Parser;
use latticed_cli::filters::StepScope;
use latticed_cli::{build_request, CancelArgs};
use latticed_wire::{RpcBody, StepId};
use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = CancelArgs::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &CancelArgs) -> latticed_base::Result<()> {
    let request = build_request(args)?;

    for spec in &request.job_ids {
        if request.interactive && !confirm(spec)? {
            continue;
        }

        let body = rpc_body_for(&request, spec);

        if !request.quiet {
            println!("cancelling job {}", spec.base());
        }
        tracing::debug!(job_id = spec.base(), rpc = ?body.msg_type(), "built cancel rpc");
    }

    if request.job_ids.is_empty() {
        tracing::debug!(filters = ?request.filters, "cancel request has no discrete job ids, filters only");
    }

    Ok(())
}

fn rpc_body_for(request: &latticed_cli::CancelRequest, spec: &latticed_cli::JobIdSpec) -> RpcBody {
    let job_id = spec.as_wire_job_id().unwrap_or_else(|| latticed_wire::JobId::simple(spec.base()));

    if let Some(signal) = request.signal {
        let step_id = spec.step_id().unwrap_or(StepId::BatchScript);
        return RpcBody::SignalTasks { job_id, step_id, signal };
    }

    match request.step_scope {
        StepScope::BatchOnly => RpcBody::TerminateTasks { job_id, step_id: StepId::BatchScript },
        StepScope::Full | StepScope::WholeJob => RpcBody::KillJob { job_id, hurry: request.hurry },
    }
}

fn confirm(spec: &latticed_cli::JobIdSpec) -> latticed_base::Result<bool> {
    print!("Cancel job {}? [y/N] ", spec.base());
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
