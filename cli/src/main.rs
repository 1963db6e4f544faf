use clap::Parser;
use pbench_cli::app;
use pbench_cli::commands::cli;
use pbench_core::api::{CliError, RunError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = app::resolve_config(args.config.as_deref())?;
    init_tracing(&cfg.logging).map_err(CliError::Config)?;

    match args.command {
        cli::Commands::Run(run_args) => app::run_stage_graph(run_args, cfg).await,
        cli::Commands::Plan(plan_args) => app::print_plan(&plan_args),
    }
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 0: success
    // 2: run cancelled (returned as a normal exit code, not as an error)
    // 11: config error
    // 20: output directory / IO error
    // 30: stage graph error
    // 50: internal/uncategorized
    match e {
        CliError::Config(_) => 11,
        CliError::Run(re) => match re {
            RunError::UnknownStage(_) => 30,
            RunError::OutputDir { .. } => 20,
        },
        CliError::Graph(_) => 30,
        CliError::Client(_) => 20,
        CliError::Io(_) => 20,
        CliError::Anyhow(_) => 50,
    }
}

fn init_tracing(logging: &pbench_core::api::LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("pbench"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("pbench.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
