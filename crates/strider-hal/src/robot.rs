//! [`RobotInterface`] – the only contract between the control core and the
//! actuator transport.
//!
//! Backends (real fieldbus drivers, simulators, log replayers) implement this
//! trait; the control loop only ever talks to the trait, so a backend can be
//! swapped without touching observation, policy or phase logic.

use strider_types::{ControlError, RobotCommand, RobotState};

/// A legged robot the control loop can sense and command.
///
/// Both calls are made on the control thread once per tick and must not block
/// beyond the transport's own latency.
pub trait RobotInterface: Send {
    /// Stable identifier for this backend, e.g. `"sim"` or `"a1_udp"`.
    fn id(&self) -> &str;

    /// Read one tick of sensing.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Hardware`] when the transport cannot deliver a
    /// reading.
    fn read_state(&mut self) -> Result<RobotState, ControlError>;

    /// Forward one command to the actuators.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Hardware`] when the command cannot be applied
    /// (transport closed, wrong joint count).
    fn write_command(&mut self, command: &RobotCommand) -> Result<(), ControlError>;
}

/// Build the [`ControlError::Hardware`] value a backend reports for a
/// command whose arrays do not match its joint count.
pub fn joint_count_error(component: &str, expected: usize, command: &RobotCommand) -> ControlError {
    ControlError::Hardware {
        component: component.to_string(),
        details: format!(
            "command addresses {} joints, backend has {expected}",
            command.num_dofs()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal in-process backend used only for tests.
    struct RecordingRobot {
        state: RobotState,
        written: Vec<RobotCommand>,
    }

    impl RobotInterface for RecordingRobot {
        fn id(&self) -> &str {
            "recording"
        }

        fn read_state(&mut self) -> Result<RobotState, ControlError> {
            Ok(self.state.clone())
        }

        fn write_command(&mut self, command: &RobotCommand) -> Result<(), ControlError> {
            if !command.is_complete(self.state.num_dofs()) {
                return Err(joint_count_error(self.id(), self.state.num_dofs(), command));
            }
            self.written.push(command.clone());
            Ok(())
        }
    }

    #[test]
    fn trait_object_reads_and_writes() {
        let mut robot: Box<dyn RobotInterface> = Box::new(RecordingRobot {
            state: RobotState::new(3),
            written: Vec::new(),
        });
        assert_eq!(robot.read_state().unwrap().num_dofs(), 3);
        robot.write_command(&RobotCommand::zeroed(3)).unwrap();
        let err = robot.write_command(&RobotCommand::zeroed(2)).unwrap_err();
        assert!(matches!(err, ControlError::Hardware { .. }));
        assert!(err.to_string().contains("2 joints"));
    }
}
