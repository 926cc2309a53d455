//! Stateful, coverage-guided fuzzer for StarkNet contracts.
//!
//! **Modes**
//! - Property mode (default): call `tayt_*` view functions after every call and
//!   report sequences that make one return 0.
//! - Exception mode (`--exception-mode`): report sequences that trigger one of
//!   the program's catalogued assertion failures.
//!
//! Execution happens in an external service reached over JSON-RPC
//! (`--rpc-url`). Interrupting the run still writes the coverage report when
//! `--coverage` is set.
use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use tayt::args::Args;
use tayt::compile::Compiler;
use tayt::coverage_report::CoverageReport;
use tayt::rpc::RpcExecutionClient;
use tayt_core::fuzz::{CoverageAccumulator, FuzzReport, FuzzRunner};
use tayt_core::ClassHash;
use tayt_types::CompiledArtifact;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

type ClassTable = Arc<Mutex<HashMap<ClassHash, Arc<CompiledArtifact>>>>;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn write_coverage(coverage: &CoverageAccumulator, classes: &ClassTable) {
    let report = CoverageReport::build(&coverage.snapshot(), &classes.lock(), Path::new("."));
    if let Err(e) = report.write_to(Path::new(".")) {
        error!("{e:#}");
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let compiler = Compiler::new(&args.compiler, args.cairo_path.clone());
    let target = Arc::new(compiler.load(&args.target)?);

    if args.get_class_hash {
        let client = RpcExecutionClient::new(&args.rpc_url);
        let class_hash = client
            .class_hash(&target)
            .with_context(|| format!("compute class hash via {}", client.endpoint()))?;
        println!("{}", class_hash.to_hex_string());
        return Ok(ExitCode::FAILURE);
    }

    let declared = args
        .declare
        .iter()
        .map(|path| compiler.load(path).map(Arc::new))
        .collect::<Result<Vec<_>>>()?;

    let config = args.to_config();
    let coverage = Arc::new(CoverageAccumulator::new());
    let classes: ClassTable = Arc::default();
    let target_name = args.target.display().to_string();
    info!(
        target = %target_name,
        mode = %config.mode,
        seed = config.seed,
        rpc = %args.rpc_url,
        "starting fuzzer"
    );

    let job = tokio::task::spawn_blocking({
        let coverage = Arc::clone(&coverage);
        let classes = Arc::clone(&classes);
        let rpc_url = args.rpc_url.clone();
        move || -> Result<FuzzReport> {
            let mut client = RpcExecutionClient::new(&rpc_url);
            let mut runner = FuzzRunner::new(&mut client, config, coverage);
            let deployment = runner.setup(target, &declared)?;
            classes.lock().extend(deployment.classes.clone());
            runner.run(&deployment, &target_name)
        }
    });

    let report = tokio::select! {
        joined = job => joined.context("fuzzing task panicked")??,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            if args.coverage {
                write_coverage(&coverage, &classes);
            }
            // The blocking fuzz thread cannot be cancelled; dropping the
            // runtime would wait on it forever.
            std::process::exit(1);
        }
    };

    if args.coverage {
        write_coverage(&coverage, &classes);
    }
    info!(
        iterations = report.iterations,
        findings = report.findings.len(),
        remaining = report.remaining.len(),
        covered = report.covered_instructions,
        elapsed_ms = report.elapsed_ms,
        "fuzzing finished"
    );
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
