use clap::Parser;
use latticed_ctld::{Config, Controller};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Parser)]
#[command(name = "latticed-ctld", version, about = "Cluster controller daemon")]
struct Args {
    /// Path to the controller's TOML configuration file.
    #[arg(long, env = "LATTICED_CTLD_CONFIG", default_value = "/etc/latticed/ctld.toml")]
    config: String,

    /// How often the scheduler re-runs placement, in milliseconds.
    #[arg(long, env = "LATTICED_CTLD_SCHEDULE_INTERVAL_MS", default_value_t = 1000)]
    schedule_interval_ms: u64,
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> latticed_base::Result<()> {
    let config = Config::load(&args.config)?;
    let bind_address = config.bind_address.clone();
    let controller = Arc::new(Controller::new(config)?);
    controller.mark_running();

    let ticker = controller.clone();
    let interval = Duration::from_millis(args.schedule_interval_ms);
    std::thread::spawn(move || loop {
        std::thread::sleep(interval);
        if let Err(err) = ticker.schedule_tick(now_ms()) {
            tracing::warn!(error = %err, "schedule tick failed");
        }
    });

    let rpc_controller = controller.clone();
    latticed_ctld::serve(&bind_address, move |envelope| rpc_controller.handle_rpc(envelope, now_ms()))
}
