//! `strider` – run a legged-robot RL policy on a simulated robot.
//!
//! 1. Loads `~/.strider/config.toml` (with `STRIDER_*` overrides) and the
//!    selected `[robots.<name>]` table; an optional first argument overrides
//!    the robot name.
//! 2. Builds the policy backend, the telemetry CSV writer and the controller.
//! 3. Starts the `strider-control` thread and the keyboard input thread.
//! 4. Intercepts **Ctrl-C** to request an emergency reset and stop the loop.

mod config;
mod input;

use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

use strider_hal::SimRobot;
use strider_middleware::telemetry_sink::DEFAULT_BUFFER;
use strider_middleware::{CsvTelemetryWriter, NullSink, TelemetrySink, operator_channel};
use strider_runtime::{ControlLoop, Controller, LoopConfig, LoopSummary, build_policy, init_tracing};
use strider_types::{ControlError, PhaseRequest};

fn main() {
    let _tracing = init_tracing("strider");

    print_banner();

    match run() {
        Ok(summary) => print_summary(&summary),
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<LoopSummary, ControlError> {
    let mut cfg = config::load().map_err(|e| ControlError::config("runtime config", e))?;
    if let Some(robot) = std::env::args().nth(1) {
        cfg.robot = robot;
    }
    println!(
        "  Robot {} from {}",
        cfg.robot.bold(),
        cfg.robots_file.display().to_string().dimmed()
    );

    let params = config::load_robot(&cfg.robots_file, &cfg.robot)?;
    let base_dir = cfg.robots_file.parent().unwrap_or(Path::new("."));
    let policy = build_policy(&params, base_dir)?;

    let (sink, writer): (Box<dyn TelemetrySink>, Option<CsvTelemetryWriter>) = if cfg.telemetry {
        let (sink, writer) = CsvTelemetryWriter::spawn(
            &cfg.telemetry_dir,
            &cfg.robot,
            params.num_of_dofs,
            DEFAULT_BUFFER,
        )?;
        println!("  Telemetry → {}", writer.path().display().to_string().bold());
        (Box::new(sink), Some(writer))
    } else {
        (Box::new(NullSink), None)
    };

    let robot = SimRobot::builder(params.num_of_dofs)
        .with_id(cfg.robot.clone())
        .with_dt(params.dt)
        .with_torque_limits(params.torque_limits.clone())
        .build();

    let mut loop_config = LoopConfig::from_params(&params);
    if let Some(period) = cfg.loop_period() {
        loop_config.period = period;
    }

    let (operator, receiver) = operator_channel();
    let controller = Controller::new(params, policy, receiver, sink)?;
    let control = ControlLoop::spawn(controller, robot, loop_config)?;
    let shutdown = control.shutdown_flag();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let ctrlc_operator = operator.clone();
    let ctrlc_shutdown = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – emergency reset and shutdown …".yellow().bold());
        ctrlc_operator.request(PhaseRequest::Emergency);
        ctrlc_shutdown.store(true, Ordering::Release);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; use 'q' to exit");
    }

    input::print_keymap();
    if let Err(e) = input::spawn(operator, Arc::clone(&shutdown)) {
        warn!(error = %e, "Failed to start keyboard thread; Ctrl-C still stops the robot");
    }

    let summary = control.join();
    if let Some(writer) = writer {
        match writer.join() {
            Ok(rows) => info!(rows, "telemetry closed"),
            Err(e) => warn!(error = %e, "telemetry writer failed"),
        }
    }
    summary
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("  {} {}", "strider".bold().cyan(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Legged-robot policy runtime");
    println!();
}

fn print_summary(summary: &LoopSummary) {
    let stats = &summary.stats;
    println!();
    println!("{}", "Session summary".bold().underline());
    println!("  ticks            {}", stats.ticks);
    println!("  policy steps     {}", stats.policy_steps);
    println!("  final phase      {}", summary.final_phase);
    println!("  tick overruns    {}", summary.overruns);
    let faults = stats.sensing_faults + stats.inference_faults + stats.rejected_commands;
    let line = format!(
        "  faults           sensing {} / inference {} / rejected {} / trips {}",
        stats.sensing_faults, stats.inference_faults, stats.rejected_commands, stats.fault_trips
    );
    if faults == 0 {
        println!("{}", line.green());
    } else {
        println!("{}", line.yellow());
    }
    if summary.telemetry_dropped > 0 {
        println!(
            "{}",
            format!("  telemetry dropped {}", summary.telemetry_dropped).yellow()
        );
    }
}
