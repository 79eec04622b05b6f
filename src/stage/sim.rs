//! A GRBL controller that lives in memory, for running the rig without a
//! stage attached.

use super::{StageError, StageLink, StageState};
use crate::config::StageConfig;

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

const PLANNER_BLOCKS: u32 = 15;
const RX_BUFFER: u32 = 128;

/// Answers like a GRBL board: acknowledges settings, reports status on `?`,
/// homes to the pull-off corner, and carries out moves after a few status
/// reports in `Run`. Starts out in alarm, the way a board with hard limits
/// enabled powers up.
#[derive(Debug)]
pub struct SimulatedGrbl {
    state: StageState,
    x: f64,
    y: f64,
    target: (f64, f64),
    home_corner: f64,
    // Status reports left before the current motion finishes.
    remaining: u32,
    reports_per_motion: u32,
    partial: Vec<u8>,
    outbox: VecDeque<String>,
    idle_read: Duration,
}

impl SimulatedGrbl {
    /// A board whose homing cycle ends at the configured pull-off corner.
    pub fn new(config: &StageConfig) -> Self {
        Self {
            state: StageState::Alarm,
            x: 0.0,
            y: 0.0,
            target: (0.0, 0.0),
            home_corner: -(config.homing_pull_off as f64),
            remaining: 0,
            reports_per_motion: 2,
            partial: Vec::new(),
            outbox: VecDeque::new(),
            idle_read: Duration::from_millis(1),
        }
    }

    /// How many status reports a move or homing cycle stays busy for.
    pub fn reports_per_motion(mut self, n: u32) -> Self {
        self.reports_per_motion = n;
        self
    }

    /// Current position, for tests.
    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// Current state, for tests.
    pub fn state(&self) -> StageState {
        self.state
    }

    fn report(&mut self) {
        // Advance any motion in progress by one report.
        if matches!(self.state, StageState::Run | StageState::Homing) {
            if self.remaining == 0 {
                (self.x, self.y) = self.target;
                if self.state == StageState::Homing {
                    self.outbox.push_back("ok".to_owned());
                }
                self.state = StageState::Idle;
            } else {
                self.remaining -= 1;
            }
        }

        let word = match self.state {
            StageState::Idle => "Idle",
            StageState::Run => "Run",
            StageState::Homing => "Home",
            StageState::Alarm => "Alarm",
            StageState::Jogging => "Jog",
        };
        let (planner, rx) = match self.state {
            StageState::Run => (PLANNER_BLOCKS - 1, RX_BUFFER - 20),
            _ => (PLANNER_BLOCKS, RX_BUFFER),
        };
        self.outbox.push_back(format!(
            "<{}|WPos:{:.3},{:.3},0.000|Bf:{},{}>",
            word, self.x, self.y, planner, rx
        ));
    }

    fn execute(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        if line == "$H" {
            self.state = StageState::Homing;
            self.target = (self.home_corner, self.home_corner);
            self.remaining = self.reports_per_motion;
            // GRBL acknowledges homing only once the cycle completes.
            return;
        }

        if let Some(rest) = line.strip_prefix("G1X") {
            if self.state == StageState::Alarm {
                self.outbox.push_back("error:9".to_owned());
                return;
            }
            let target = rest
                .split_once('Y')
                .and_then(|(x, y)| Some((x.parse().ok()?, y.parse().ok()?)));
            match target {
                Some(t) => {
                    self.target = t;
                    self.state = StageState::Run;
                    self.remaining = self.reports_per_motion;
                    self.outbox.push_back("ok".to_owned());
                }
                None => self.outbox.push_back("error:2".to_owned()),
            }
            return;
        }

        self.outbox.push_back("ok".to_owned());
    }
}

impl StageLink for SimulatedGrbl {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), StageError> {
        for &c in bytes {
            match c {
                // Real-time status query, needs no line terminator.
                b'?' => self.report(),
                b'\n' => {
                    let line = String::from_utf8_lossy(&self.partial).into_owned();
                    self.partial.clear();
                    self.execute(&line);
                }
                _ => self.partial.push(c),
            }
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<String>, StageError> {
        match self.outbox.pop_front() {
            Some(line) => Ok(Some(line)),
            None => {
                // Stand in for the serial read timeout.
                thread::sleep(self.idle_read);
                Ok(None)
            }
        }
    }

    fn discard_input(&mut self) -> Result<(), StageError> {
        self.outbox.clear();
        Ok(())
    }
}
