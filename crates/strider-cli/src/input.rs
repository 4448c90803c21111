//! Operator keyboard thread.
//!
//! Reads lines with `rustyline` and feeds every mapped key to the
//! [`OperatorHandle`] (see [`strider_middleware::keymap`]).  `q`, `quit` or
//! `exit` end the session; Ctrl-C at the prompt or end of input request an
//! emergency reset before ending it.

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use strider_middleware::{KeyAction, OperatorHandle, line_actions};
use strider_types::PhaseRequest;
use tracing::{debug, warn};

/// What one input line asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum LineCommand {
    Quit,
    Help,
    Keys(Vec<KeyAction>),
}

pub fn parse_line(line: &str) -> LineCommand {
    match line.trim() {
        "q" | "quit" | "exit" => LineCommand::Quit,
        "?" | "h" | "help" => LineCommand::Help,
        _ => LineCommand::Keys(line_actions(line)),
    }
}

/// Start the input thread.  It exits on quit or once `shutdown` is seen
/// after a line is read.
pub fn spawn(operator: OperatorHandle, shutdown: Arc<AtomicBool>) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("strider-input".to_string())
        .spawn(move || run(operator, &shutdown))
}

fn run(operator: OperatorHandle, shutdown: &AtomicBool) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            warn!(error = %e, "keyboard input unavailable");
            return;
        }
    };

    while !shutdown.load(Ordering::Acquire) {
        match editor.readline(&format!("{} ", "strider>".bold().cyan())) {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                match parse_line(&line) {
                    LineCommand::Quit => {
                        println!("{}", "Halting robot and exiting.".green());
                        shutdown.store(true, Ordering::Release);
                    }
                    LineCommand::Help => print_keymap(),
                    LineCommand::Keys(actions) => {
                        for action in actions {
                            operator.apply(action);
                        }
                        let intent = operator.intent();
                        debug!(x = intent.x, y = intent.y, yaw = intent.yaw, "operator intent");
                        println!(
                            "  intent  x {:+.2}  y {:+.2}  yaw {:+.2}",
                            intent.x, intent.y, intent.yaw
                        );
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("{}", "⚠  Emergency reset requested – shutting down …".yellow().bold());
                operator.request(PhaseRequest::Emergency);
                shutdown.store(true, Ordering::Release);
            }
            Err(e) => {
                warn!(error = %e, "input read failed");
                shutdown.store(true, Ordering::Release);
            }
        }
    }
}

pub fn print_keymap() {
    println!();
    println!("{}", "Operator keys".bold().underline());
    println!("  {}      – stand up and start the policy", "0".bold().cyan());
    println!("  {}      – stand down", "1".bold().cyan());
    println!("  {}      – emergency reset to idle", "e".bold().cyan());
    println!("  {}    – forward speed ±0.1", "w s".bold().cyan());
    println!("  {}    – lateral speed ±0.1", "j l".bold().cyan());
    println!("  {}    – yaw rate ±0.1", "a d".bold().cyan());
    println!("  {}  – zero the intent", "space".bold().cyan());
    println!("  {}      – halt and exit", "q".bold().cyan());
    println!("  Keys may be combined on one line (e.g. {}).", "ww".bold());
    println!();
}
