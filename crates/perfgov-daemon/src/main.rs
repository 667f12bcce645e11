use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use perfgov_core::tracing_config::targets;
use perfgov_core::{Clock, GovernorError, GovernorResult, SystemClock};
use perfgov_daemon::{
    CliCommand, CliInput, GovernorBuilder, GovernorConfig, GovernorRuntime, HostMetricsProvider,
    LogBroadcaster, SignalCoordinator, TickRateMeter, TomlConfigStore, USAGE, init_subscriber,
    parse_cli_args,
};
use tracing::{error, info, warn};

/// Pace of the built-in host loop; each iteration is one tick.
const TICK_INTERVAL: Duration = Duration::from_millis(50);
const FORCE_EXIT_CODE: i32 = 130;

fn main() -> ExitCode {
    let input = match parse_cli_args(std::env::args().skip(1)) {
        Ok(input) => input,
        Err(error) => {
            eprintln!("perfgov: {error}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    match input.command {
        CliCommand::Help => {
            print!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        CliCommand::Version => {
            println!("perfgov {}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        CliCommand::Run | CliCommand::CheckConfig => {}
    }

    if let Err(error) = init_subscriber(input.verbosity(), input.no_color) {
        eprintln!("perfgov: {error}");
    }

    let result = match input.command {
        CliCommand::CheckConfig => check_config(&input),
        _ => run(&input),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(target: targets::RUNTIME, %error, "perfgov exiting with error");
            eprintln!("perfgov: {error}");
            ExitCode::FAILURE
        }
    }
}

fn open_store(input: &CliInput) -> GovernorResult<Arc<TomlConfigStore>> {
    let store = TomlConfigStore::open(&input.config_path, std::env::vars())?;
    info!(
        target: targets::CONFIG,
        path = %input.config_path.display(),
        env_overrides = ?store.env_keys_used(),
        "configuration store opened"
    );
    Ok(Arc::new(store))
}

fn check_config(input: &CliInput) -> GovernorResult<()> {
    let store = open_store(input)?;
    let config = GovernorConfig::from_store(store.as_ref())?;
    perfgov_daemon::emit_config_loaded(&config, "check", &store.warnings());
    let json = serde_json::to_string_pretty(&config).map_err(json_error)?;
    println!("{json}");
    Ok(())
}

fn run(input: &CliInput) -> GovernorResult<()> {
    let store = open_store(input)?;
    let process_memory_limit_gb = GovernorConfig::from_store(store.as_ref())?
        .hardware
        .process_memory_limit_gb;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ticks = Arc::new(TickRateMeter::new(Arc::clone(&clock)));
    let metrics = Arc::new(HostMetricsProvider::new(
        Arc::clone(&ticks),
        process_memory_limit_gb,
    ));
    let governor = Arc::new(
        GovernorBuilder::new(metrics)
            .broadcaster(Arc::new(LogBroadcaster))
            .config_store(Arc::clone(&store) as Arc<dyn perfgov_core::ConfigStore>)
            .clock(clock)
            .config_warnings(store.warnings())
            .build()?,
    );
    if let Some(mode) = input.manual {
        governor.enable_manual_mode(mode)?;
    }

    let signals = Arc::new(SignalCoordinator::new());
    signals.register_signals()?;
    let runtime = GovernorRuntime::start(Arc::clone(&governor))?;

    loop {
        ticks.record_tick();
        if signals.is_shutting_down() {
            break;
        }
        if signals.take_reload_requested() {
            match governor.reload_configuration() {
                Ok(()) => {
                    for warning in store.warnings() {
                        warn!(
                            target: targets::CONFIG,
                            reason_code = %warning.reason_code,
                            field = %warning.field,
                            "{}",
                            warning.message
                        );
                    }
                }
                Err(error) => warn!(
                    target: targets::CONFIG,
                    %error,
                    "configuration reload failed; previous configuration stays active"
                ),
            }
        }
        if signals.take_status_dump_requested() {
            match serde_json::to_string(&governor.status()) {
                Ok(status) => info!(target: targets::RUNTIME, %status, "governor status"),
                Err(error) => warn!(target: targets::RUNTIME, %error, "failed to serialize status"),
            }
        }
        thread::sleep(TICK_INTERVAL);
    }

    info!(
        target: targets::RUNTIME,
        signal = signals.shutdown_signal(),
        "stopping governor"
    );
    let stopper = thread::Builder::new()
        .name("perfgov-shutdown".to_owned())
        .spawn(move || runtime.shutdown())
        .map_err(GovernorError::Io)?;
    while !stopper.is_finished() {
        if signals.is_force_exit_requested() {
            warn!(target: targets::RUNTIME, "forced exit before shutdown completed");
            std::process::exit(FORCE_EXIT_CODE);
        }
        thread::sleep(TICK_INTERVAL);
    }
    if stopper.join().is_err() {
        warn!(target: targets::RUNTIME, "shutdown thread panicked");
    }
    signals.stop_signal_listener();
    info!(target: targets::RUNTIME, stats = ?governor.stats(), "governor stopped");
    Ok(())
}

fn json_error(error: serde_json::Error) -> GovernorError {
    GovernorError::SubsystemError {
        subsystem: "cli",
        source: Box::new(io::Error::other(error.to_string())),
    }
}
