//! Workflow verifier CLI.
//!
//! Validates, hardens and runs verification workflows. Run records land in
//! the configured record directory (`.verifier/runs` by default).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use signal_hook::consts::{SIGINT, SIGTERM};

use verifier::core::hardener::{HardenAction, HardenOptions};
use verifier::core::types::{Diagnostic, Severity, partition};
use verifier::core::validator::validate_with;
use verifier::exit_codes;
use verifier::io::agent::AgentCommandExecutor;
use verifier::io::command::ShellCommandExecutor;
use verifier::io::config::{DEFAULT_CONFIG_PATH, VerifierConfig, load_config, write_config};
use verifier::io::run_log::write_run;
use verifier::io::session::BrowserSession;
use verifier::io::ui_bridge::HttpUiBridgeDriver;
use verifier::io::workflow_store::{load_workflow, render_workflow, write_workflow};
use verifier::logging;
use verifier::prepare::{StructuralError, harden_workflow, prepare};
use verifier::scheduler::{CancelFlag, Executors, RunOptions, RunOutcome, RunReport, run_workflow};

#[derive(Parser)]
#[command(
    name = "verifier",
    version,
    about = "Validate, harden and run verification workflows"
)]
struct Cli {
    /// Config file; missing means defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print diagnostics; exits 1 when any is fatal.
    Validate {
        workflow: PathBuf,
        /// Print diagnostics as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Rewrite a draft workflow so its verification is deterministic.
    Harden {
        workflow: PathBuf,
        /// Overwrite the input file.
        #[arg(long, conflicts_with = "out")]
        write: bool,
        /// Write the hardened workflow here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Prepare and execute a workflow.
    Run {
        workflow: PathBuf,
        /// Execute the workflow as written.
        #[arg(long)]
        no_harden: bool,
    },
    /// Write the default config file.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    logging::init(logging::CLI_DEFAULT_FILTER);
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Validate { workflow, json } => {
            let config = load_config(&cli.config)?;
            cmd_validate(&config, &workflow, json)
        }
        Command::Harden {
            workflow,
            write,
            out,
        } => {
            let config = load_config(&cli.config)?;
            let target = if write { Some(workflow.clone()) } else { out };
            cmd_harden(&config, &workflow, target.as_deref())
        }
        Command::Run {
            workflow,
            no_harden,
        } => {
            let config = load_config(&cli.config)?;
            cmd_run(&config, &workflow, !no_harden)
        }
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        eprintln!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::INVALID);
    }
    write_config(path, &VerifierConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

#[derive(Serialize)]
struct DiagnosticsView<'a> {
    fatal: &'a [Diagnostic],
    advisory: &'a [Diagnostic],
}

fn cmd_validate(config: &VerifierConfig, path: &Path, json: bool) -> Result<i32> {
    let workflow = load_workflow(path)?;
    let markers = &config.hardener.stateful_endpoint_markers;
    let (fatal, advisory) = partition(validate_with(&workflow, markers));
    if json {
        let view = DiagnosticsView {
            fatal: &fatal,
            advisory: &advisory,
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_diagnostics(fatal.iter().chain(&advisory));
        println!("{} fatal, {} advisory", fatal.len(), advisory.len());
    }
    Ok(if fatal.is_empty() {
        exit_codes::OK
    } else {
        exit_codes::INVALID
    })
}

fn cmd_harden(config: &VerifierConfig, path: &Path, target: Option<&Path>) -> Result<i32> {
    let workflow = load_workflow(path)?;
    let options = HardenOptions::new(config.hardener.clone());
    let (hardened, report, remaining) = harden_workflow(&workflow, &options);

    match target {
        Some(target) => {
            write_workflow(target, &hardened)?;
            eprintln!("wrote {}", target.display());
        }
        None => print!("{}", render_workflow(&hardened)?),
    }
    for action in &report.actions {
        eprintln!("{}", describe_action(action));
    }
    let (fatal, _) = partition(remaining);
    if !fatal.is_empty() {
        eprintln!("hardened workflow still has fatal diagnostics:");
        for diagnostic in &fatal {
            eprintln!("  {}", describe_diagnostic(diagnostic));
        }
        return Ok(exit_codes::INVALID);
    }
    Ok(exit_codes::OK)
}

fn cmd_run(config: &VerifierConfig, path: &Path, harden: bool) -> Result<i32> {
    let workflow = load_workflow(path)?;
    let options = HardenOptions::new(config.hardener.clone());
    let prepared = match prepare(&workflow, harden, &options) {
        Ok(prepared) => prepared,
        Err(err) => {
            if let Some(structural) = err.downcast_ref::<StructuralError>() {
                print_diagnostics(structural.diagnostics.iter());
                return Ok(exit_codes::INVALID);
            }
            return Err(err);
        }
    };
    for action in &prepared.hardening.actions {
        eprintln!("{}", describe_action(action));
    }

    let root = std::env::current_dir().context("read current directory")?;
    let executors = Executors {
        commands: ShellCommandExecutor::new(
            &root,
            config.interpreters.clone(),
            config.output_limit_bytes,
        ),
        ui_bridge: HttpUiBridgeDriver::new(&config.ui_bridge.base_url, config.output_limit_bytes),
        agent: AgentCommandExecutor::new(
            config.agent.command.clone(),
            &root,
            config.output_limit_bytes,
        ),
    };
    let session = BrowserSession::new();
    let run_options = RunOptions::from_config(config, &session);

    let cancel = CancelFlag::new();
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, cancel.handle())
            .with_context(|| format!("register signal {signal}"))?;
    }

    let report = run_workflow(&prepared.workflow, &executors, &run_options, &cancel);
    let paths = write_run(&config.record_dir, &report)?;
    print_report(&report);
    println!("record: {}", paths.report_path.display());
    Ok(exit_code(&report.outcome))
}

fn exit_code(outcome: &RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Success { .. } => exit_codes::OK,
        RunOutcome::StructuralError { .. } => exit_codes::INVALID,
        RunOutcome::SetupFailure { .. } => exit_codes::SETUP_FAILED,
        RunOutcome::IterationsExhausted { .. } => exit_codes::EXHAUSTED,
        RunOutcome::CompletionFailure { .. } => exit_codes::COMPLETION_FAILED,
        RunOutcome::Cancelled { .. } => exit_codes::CANCELLED,
    }
}

fn print_report(report: &RunReport) {
    println!("run {} ({})", report.run_id, report.workflow);
    for record in &report.iterations {
        let verdict = if record.gate.passed() { "pass" } else { "fail" };
        println!("  iteration {}: gate {verdict}", record.iteration);
        for unmet in record.gate.unmet() {
            println!("    unmet {}", unmet.id);
        }
    }
    match &report.outcome {
        RunOutcome::Success { iterations } => println!("success after {iterations} iteration(s)"),
        RunOutcome::StructuralError { diagnostics } => {
            println!("structural error");
            print_diagnostics(diagnostics.iter());
        }
        RunOutcome::SetupFailure { step_id } => println!("setup failed at {step_id}"),
        RunOutcome::IterationsExhausted { iterations, unmet } => {
            let ids: Vec<&str> = unmet.iter().map(|step| step.id.as_str()).collect();
            println!(
                "iterations exhausted after {iterations}; unmet: {}",
                ids.join(", ")
            );
        }
        RunOutcome::CompletionFailure { step_id } => println!("completion failed at {step_id}"),
        RunOutcome::Cancelled { phase, next_step } => {
            println!("cancelled in {phase} before {next_step}");
        }
    }
}

fn print_diagnostics<'a>(diagnostics: impl Iterator<Item = &'a Diagnostic>) {
    for diagnostic in diagnostics {
        println!("{}", describe_diagnostic(diagnostic));
    }
}

fn describe_diagnostic(diagnostic: &Diagnostic) -> String {
    let severity = match diagnostic.severity {
        Severity::Fatal => "fatal",
        Severity::Advisory => "advisory",
    };
    let kind = serde_json::to_value(diagnostic.kind)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default();
    match &diagnostic.step_id {
        Some(id) => format!("{severity}\t{kind}\t{id}: {}", diagnostic.message),
        None => format!("{severity}\t{kind}\t{}", diagnostic.message),
    }
}

fn describe_action(action: &HardenAction) -> String {
    match action {
        HardenAction::NormalizedType { step_id, from, to } => {
            format!("normalized {step_id}: {from} -> {to}")
        }
        HardenAction::RenamedDuplicateId { from, to } => format!("renamed duplicate {from} -> {to}"),
        HardenAction::FixedPhase { step_id, phase } => format!("set phase of {step_id} to {phase}"),
        HardenAction::RepairedField {
            step_id,
            field,
            detail,
        } => format!(
            "repaired {field} of {}: {detail}",
            step_id.as_deref().unwrap_or("workflow")
        ),
        HardenAction::Dropped { step_id, reason } => format!("dropped {step_id}: {reason}"),
        HardenAction::MovedToVerification { step_id } => format!("moved {step_id} to verification"),
        HardenAction::WrappedAsPrompt { step_id } => format!("wrapped {step_id} as a prompt"),
        HardenAction::Converted {
            source,
            rule,
            replacements,
            residual,
        } => format!(
            "converted {source} via {rule} into {}{}",
            replacements.join(", "),
            if *residual { " (subjective residual kept)" } else { "" }
        ),
        HardenAction::Strengthened { step_id, expected } => {
            format!("strengthened {step_id} to expect {expected}")
        }
        HardenAction::AddedCoverage {
            source,
            goal,
            step_ids,
        } => format!("covered goal of {source} ({goal}) with {}", step_ids.join(", ")),
        HardenAction::InjectedNavigation { source, step_id } => {
            format!("injected navigation {step_id} from {source}")
        }
        HardenAction::AddedFallbackCheck { step_id } => format!("added fallback check {step_id}"),
        HardenAction::RepairedGate { gate_id, required } => {
            format!("gate {gate_id} requires {}", required.join(", "))
        }
    }
}
