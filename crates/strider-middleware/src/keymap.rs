//! Keyboard mapping for operator input.
//!
//! | Key | Action |
//! |---|---|
//! | `0` | start (stand up) |
//! | `1` | stop (stand down) |
//! | `e` | emergency reset to Idle |
//! | `w` / `s` | forward speed ±0.1 m/s |
//! | `j` / `l` | lateral speed ±0.1 m/s |
//! | `a` / `d` | yaw rate ±0.1 rad/s |
//! | space | zero the intent |
//!
//! Keys are case-insensitive.

use strider_types::PhaseRequest;

/// Intent increment applied per key press.
pub const INTENT_STEP: f64 = 0.1;

/// What a single key press does.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyAction {
    Request(PhaseRequest),
    /// Add these deltas to the latched intent.
    Nudge { x: f64, y: f64, yaw: f64 },
    ZeroIntent,
}

/// Decode one key.  Unmapped keys return `None`.
pub fn key_action(key: char) -> Option<KeyAction> {
    let nudge = |x, y, yaw| Some(KeyAction::Nudge { x, y, yaw });
    match key.to_ascii_lowercase() {
        '0' => Some(KeyAction::Request(PhaseRequest::Start)),
        '1' => Some(KeyAction::Request(PhaseRequest::Stop)),
        'e' => Some(KeyAction::Request(PhaseRequest::Emergency)),
        'w' => nudge(INTENT_STEP, 0.0, 0.0),
        's' => nudge(-INTENT_STEP, 0.0, 0.0),
        'j' => nudge(0.0, INTENT_STEP, 0.0),
        'l' => nudge(0.0, -INTENT_STEP, 0.0),
        'a' => nudge(0.0, 0.0, INTENT_STEP),
        'd' => nudge(0.0, 0.0, -INTENT_STEP),
        ' ' => Some(KeyAction::ZeroIntent),
        _ => None,
    }
}

/// Decode every mapped key of a line of input, in order.  An input line
/// consisting only of whitespace counts as a single space.
pub fn line_actions(line: &str) -> Vec<KeyAction> {
    if !line.is_empty() && line.trim().is_empty() {
        return vec![KeyAction::ZeroIntent];
    }
    line.trim().chars().filter_map(key_action).collect()
}
