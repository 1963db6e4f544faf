use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use pbench_core::api::{
    load_default, load_file, load_stage_graph, AppConfig, CliError, RunOptions, StageGraph,
    StageRunner,
};
use pbench_plugins::factory::build_client_factory;

use crate::commands::cli::{PlanArgs, RunArgs};
use crate::signal::shutdown_signal;

/// Exit code of a run whose shared cancellation fired.
pub const EXIT_CANCELLED: i32 = 2;

pub fn resolve_config(path: Option<&Path>) -> Result<AppConfig, CliError> {
    let cfg = match path {
        Some(path) => load_file(path).map(|mut cfg| {
            pbench_core::api::apply_env_overrides(&mut cfg);
            cfg
        }),
        None => load_default(),
    };
    cfg.map_err(|e| CliError::Config(e.to_string()))
}

/// Command line flags override config file and environment.
pub fn apply_run_args(cfg: &mut AppConfig, args: &RunArgs) {
    if let Some(server) = &args.server {
        cfg.client.server_url = server.clone();
    }
    if let Some(user) = &args.user {
        cfg.client.user = user.clone();
    }
    if let Some(dir) = &args.output_dir {
        cfg.run.output_root = Some(dir.display().to_string());
    }
    if let Some(timeout) = args.timeout {
        cfg.run.timeout_ms = Some(timeout);
    }
    if let Some(grace) = args.shutdown_grace {
        cfg.run.shutdown_grace_ms = grace;
    }
    if !args.client_tags.is_empty() {
        cfg.client.client_tags = args.client_tags.clone();
    }
}

pub async fn run_stage_graph(args: RunArgs, mut cfg: AppConfig) -> Result<i32, CliError> {
    apply_run_args(&mut cfg, &args);

    let loaded = load_stage_graph(&args.stage_file)?;
    let factory = build_client_factory(&cfg).map_err(|e| CliError::Config(e.to_string()))?;
    let runner = StageRunner::new(Arc::new(loaded.graph), factory)
        .with_options(RunOptions::from_config(&cfg));

    let report = runner
        .run(&loaded.root, &CancellationToken::new(), shutdown_signal())
        .await?;

    println!(
        "{} queries, {} failed, results in {}",
        report.results.len(),
        report.failed_queries(),
        report.output_dir.display()
    );
    match &report.cancellation {
        Some(cause) => {
            eprintln!("run cancelled: {cause}");
            Ok(EXIT_CANCELLED)
        }
        None => Ok(0),
    }
}

pub fn print_plan(args: &PlanArgs) -> Result<i32, CliError> {
    let loaded = load_stage_graph(&args.stage_file)?;
    print!("{}", render_plan(&loaded.graph, &loaded.root));
    Ok(0)
}

/// One line per execution layer, listing each stage with its work items.
pub fn render_plan(graph: &StageGraph, root: &str) -> String {
    let mut out = String::new();
    let Some(root_index) = graph.index_of(root) else {
        return out;
    };
    for (depth, layer) in graph.layers(root_index).iter().enumerate() {
        let stages: Vec<String> = layer
            .iter()
            .map(|&index| {
                let stage = graph.stage(index);
                format!(
                    "{} ({} queries, {} files)",
                    stage.id,
                    stage.queries.len(),
                    stage.query_files.len()
                )
            })
            .collect();
        let _ = writeln!(out, "layer {}: {}", depth, stages.join(", "));
    }
    out
}
