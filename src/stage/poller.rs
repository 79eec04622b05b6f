//! The stage worker's loop body.

use super::{GrblBoard, StageCommand, StageError, StageLink, StageState, StageStatus};
use crate::cell::{CommandCell, LatestCell};
use crate::config::{secs, StageConfig};
use crate::recorder::CsvRecorder;
use crate::time_manager::TimeManager;

use log::warn;
use std::time::Duration;

/// What one polling tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PollOutcome {
    /// No status report arrived this tick.
    NoStatus,
    /// The controller is moving or its buffers are full; any pending command
    /// stays in the mailbox.
    Busy(StageState),
    /// Ready, but nobody asked for a move.
    NoCommand,
    /// A move command was written to the controller.
    Moved(StageCommand),
    /// A move command was taken but fell outside the travel envelope.
    Dropped(StageCommand),
}

/// Polls the controller, publishes its status, and executes move commands
/// when the controller can take them.
pub struct StagePoller<L: StageLink> {
    board: GrblBoard<L>,
    status_cell: LatestCell<StageStatus>,
    commands: CommandCell,
    min_rx_free: u32,
    max_status_timeouts: u32,
    consecutive_timeouts: u32,
    poll_interval: Duration,
    time: TimeManager,
    recorder: Option<CsvRecorder>,
}

impl<L: StageLink> StagePoller<L> {
    /// Makes a poller around an already started controller.
    pub fn new(
        board: GrblBoard<L>,
        config: &StageConfig,
        status_cell: LatestCell<StageStatus>,
        commands: CommandCell,
    ) -> Self {
        let mut time = TimeManager::new("StageThread");
        time.start();
        Self {
            board,
            status_cell,
            commands,
            min_rx_free: config.min_rx_free,
            max_status_timeouts: config.max_status_timeouts,
            consecutive_timeouts: 0,
            poll_interval: secs(config.poll_interval),
            time,
            recorder: None,
        }
    }

    /// Records every status report to `recorder`.
    pub fn with_recorder(mut self, recorder: Option<CsvRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// One paced iteration of the worker loop.
    pub fn run_once(&mut self) -> Result<PollOutcome, StageError> {
        self.time.tick();
        let outcome = self.step()?;
        self.time.wait_until(self.poll_interval);
        Ok(outcome)
    }

    /// Reads the status, publishes it, and moves if a fresh command is
    /// waiting and the controller is idle with buffer room.
    pub fn step(&mut self) -> Result<PollOutcome, StageError> {
        let status = match self.board.read_status() {
            Ok(status) => {
                self.consecutive_timeouts = 0;
                status
            }
            Err(StageError::StatusTimeout { discarded }) => {
                self.consecutive_timeouts += 1;
                warn!(
                    "No stage status ({} lines discarded, {} in a row).",
                    discarded, self.consecutive_timeouts
                );
                if self.consecutive_timeouts >= self.max_status_timeouts {
                    return Err(StageError::StatusTimeout { discarded });
                }
                return Ok(PollOutcome::NoStatus);
            }
            Err(e) => return Err(e),
        };

        self.status_cell.publish(status);
        if let Some(rec) = self.recorder.as_mut() {
            rec.record(format_args!(
                "{:.6},{},{:.3},{:.3},{:.3}",
                status.timestamp, status.state, status.x, status.y, status.z
            ));
        }

        if status.state != StageState::Idle || !status.has_headroom(self.min_rx_free) {
            return Ok(PollOutcome::Busy(status.state));
        }

        match self.commands.take_fresh() {
            None => Ok(PollOutcome::NoCommand),
            Some(cmd) => {
                if self.board.move_to(cmd.x, cmd.y)? {
                    Ok(PollOutcome::Moved(cmd))
                } else {
                    Ok(PollOutcome::Dropped(cmd))
                }
            }
        }
    }

    /// The controller underneath.
    pub fn board(&self) -> &GrblBoard<L> {
        &self.board
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::grbl::tests::{fast_config, ScriptedLink};

    fn poller_with(lines: &[&str]) -> (StagePoller<ScriptedLink>, LatestCell<StageStatus>, CommandCell) {
        let config = fast_config();
        let status = LatestCell::new(StageStatus::default());
        let commands = CommandCell::new();
        let board = GrblBoard::new(ScriptedLink::with_responses(lines), &config);
        let poller = StagePoller::new(board, &config, status.clone(), commands.clone());
        (poller, status, commands)
    }

    #[test]
    fn idle_with_headroom_executes_exactly_once() {
        let (mut poller, status, commands) = poller_with(&[
            "<Idle|WPos:-50.000,-50.000,0.000|Bf:15,128>",
            "<Idle|WPos:-50.000,-50.000,0.000|Bf:14,100>",
        ]);
        commands.submit(-60.0, -55.0);

        let first = poller.step().unwrap();
        assert!(matches!(first, PollOutcome::Moved(StageCommand { x, y, .. }) if x == -60.0 && y == -55.0));
        assert!(status.read().valid);

        assert_eq!(poller.step().unwrap(), PollOutcome::NoCommand);
        assert_eq!(poller.board().link().commands(), vec!["G1X-60.000Y-55.000"]);
    }

    #[test]
    fn busy_controller_keeps_command_pending() {
        let (mut poller, _status, commands) = poller_with(&[
            "<Run|WPos:-50.000,-50.000,0.000|Bf:15,128>",
            "<Idle|WPos:-50.000,-50.000,0.000|Bf:15,10>",
            "<Idle|WPos:-50.000,-50.000,0.000|Bf:15,128>",
        ]);
        commands.submit(-60.0, -60.0);

        assert_eq!(poller.step().unwrap(), PollOutcome::Busy(StageState::Run));
        // Receive buffer nearly full.
        assert_eq!(poller.step().unwrap(), PollOutcome::Busy(StageState::Idle));
        assert!(matches!(poller.step().unwrap(), PollOutcome::Moved(_)));
        assert_eq!(poller.board().link().commands().len(), 1);
    }

    #[test]
    fn out_of_envelope_command_is_dropped() {
        let (mut poller, _status, commands) =
            poller_with(&["<Idle|WPos:-50.000,-50.000,0.000|Bf:15,128>"]);
        commands.submit(10.0, -60.0);

        assert!(matches!(poller.step().unwrap(), PollOutcome::Dropped(_)));
        assert!(poller.board().link().commands().is_empty());
        assert!(commands.take_fresh().is_none());
    }

    #[test]
    fn repeated_status_timeouts_become_fatal() {
        let (mut poller, status, _commands) = poller_with(&[]);
        let limit = fast_config().max_status_timeouts;

        for _ in 1..limit {
            assert_eq!(poller.step().unwrap(), PollOutcome::NoStatus);
        }
        assert!(matches!(
            poller.step(),
            Err(StageError::StatusTimeout { .. })
        ));
        assert!(!status.read().valid);
    }
}
