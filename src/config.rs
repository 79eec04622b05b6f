//! The rig configuration file.
//!
//! Configuration is one [ron] document with a section per subsystem. Every
//! field has a default equal to the value the rig has historically run with,
//! so a file containing just `()` is a complete configuration:
//!
//! ```text
//! (
//!     stage: (port: Some("/dev/ttyACM0"), max_travel_x: 550.0),
//!     camera: (threshold: 100),
//!     stimulus: (
//!         random_seed: 7,
//!         trials: [
//!             (name: "slow", type: "CylinderBars", settings: Some({"rotation_speed": 10.0})),
//!             (name: "dark", type: "UniformField", settings: Some({"level": "0"})),
//!         ],
//!     ),
//! )
//! ```
//!
//! [`RigConfig::validate()`] runs before any worker starts; a bad value is a
//! fatal [`ConfigError`].

use crate::stage::grbl::Envelope;

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Seconds as a [`Duration`]. Negative or non-finite values become zero.
pub fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Problems loading or validating the configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io(PathBuf, std::io::Error),
    /// The file is not valid RON for [`RigConfig`].
    Ron(ron::de::SpannedError),
    /// A trial's settings do not fit its type.
    Settings(String, ron::Error),
    /// A value is out of range, or something required is missing.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ConfigError as CE;
        let msg = match self {
            CE::Io(path, error) => Cow::from(format!("cannot read {}: {}", path.display(), error)),
            CE::Ron(error) => Cow::from(format!("ron error: {}", error)),
            CE::Settings(trial, error) => {
                Cow::from(format!("bad settings for trial {:?}: {}", trial, error))
            }
            CE::Invalid(what) => Cow::from(format!("invalid configuration: {}", what)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for ConfigError {}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    /// Controller and connection.
    pub stage: StageConfig,
    /// Frame capture and detection.
    pub camera: CameraConfig,
    /// Pose fusion.
    pub tracker: TrackerConfig,
    /// Trial sequence.
    pub stimulus: StimulusConfig,
    /// Output files.
    pub record: RecordConfig,
}

impl RigConfig {
    /// Reads and parses the file at `path`. Does not validate.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_owned(), e))?;
        Self::parse(&text)
    }

    /// Parses a configuration document. Does not validate.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        ron::from_str(text).map_err(ConfigError::Ron)
    }

    /// Checks every value the rig relies on being in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stage.validate()?;
        self.camera.validate()?;
        self.tracker.validate()?;
        self.stimulus.validate()
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

/// The motion controller and the serial link to it. Times are in seconds,
/// distances in millimeters, rates in millimeters per minute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Serial port. When unset the operator is asked to pick one.
    pub port: Option<String>,
    /// Serial speed.
    pub baud_rate: u32,
    /// How long the controller takes to come back after the port opens.
    pub reset_delay: f64,
    /// Upper bound on a single blocking serial read.
    pub read_timeout: f64,
    /// How long a single command may wait for its `ok`.
    pub ack_timeout: f64,
    /// How long a status query may go unanswered.
    pub status_timeout: f64,
    /// Consecutive unanswered status queries before the stage worker fails.
    pub max_status_timeouts: u32,
    /// Pause between sending `$H` and the first status query.
    pub settle_delay: f64,
    /// How long homing may take before giving up.
    pub home_timeout: f64,
    /// Home even if the controller is not in alarm.
    pub home_on_startup: bool,
    /// `$10`: which fields the status report carries. 2 selects work
    /// position plus buffer state.
    pub status_report_mask: u32,
    /// `$100`.
    pub steps_per_mm_x: u32,
    /// `$101`.
    pub steps_per_mm_y: u32,
    /// `$110` and `$111`, mm/min.
    pub max_velocity: u32,
    /// mm/s².
    pub max_acceleration: u32,
    /// `$27`, mm.
    pub homing_pull_off: u32,
    /// Milliseconds.
    pub homing_debounce: u32,
    /// `$24`, mm/min.
    pub homing_feed_rate: u32,
    /// `$25`, mm/min.
    pub homing_seek_rate: u32,
    /// `$130`, mm.
    pub max_travel_x: f64,
    /// `$131`, mm.
    pub max_travel_y: f64,
    /// Feed rate for moves.
    pub feed_rate: u32,
    /// Free receive buffer bytes the controller must report before it is
    /// sent another move.
    pub min_rx_free: u32,
    /// Target duration of one stage worker iteration. Zero polls as fast as
    /// the controller answers.
    pub poll_interval: f64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 400_000,
            reset_delay: 2.0,
            read_timeout: 0.05,
            ack_timeout: 2.0,
            status_timeout: 0.5,
            max_status_timeouts: 20,
            settle_delay: 0.1,
            home_timeout: 60.0,
            home_on_startup: false,
            status_report_mask: 2,
            steps_per_mm_x: 40,
            steps_per_mm_y: 40,
            max_velocity: 10_000,
            max_acceleration: 200,
            homing_pull_off: 20,
            homing_debounce: 250,
            homing_feed_rate: 1000,
            homing_seek_rate: 2000,
            max_travel_x: 600.0,
            max_travel_y: 600.0,
            feed_rate: 10_000,
            min_rx_free: 32,
            poll_interval: 0.0,
        }
    }
}

impl StageConfig {
    /// Homing leaves the machine at `-pull_off` on both axes, and it can
    /// travel `max_travel` from the limit switches.
    pub fn envelope(&self) -> Envelope {
        let pull_off = self.homing_pull_off as f64;
        Envelope {
            x_min: -self.max_travel_x,
            x_max: -pull_off,
            y_min: -self.max_travel_y,
            y_max: -pull_off,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let pull_off = self.homing_pull_off as f64;
        if self.max_travel_x <= pull_off || self.max_travel_y <= pull_off {
            return Err(invalid("stage max travel must exceed the homing pull-off"));
        }
        if self.baud_rate == 0 {
            return Err(invalid("stage baud rate must be positive"));
        }
        if self.status_timeout <= 0.0 || self.ack_timeout <= 0.0 {
            return Err(invalid("stage timeouts must be positive"));
        }
        if self.max_status_timeouts == 0 {
            return Err(invalid("stage max_status_timeouts must be at least 1"));
        }
        Ok(())
    }
}

/// Frame capture and subject detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Live camera index, used with the `camera` feature.
    pub device: u32,
    /// Requested capture width.
    pub frame_width: u32,
    /// Requested capture height.
    pub frame_height: u32,
    /// Box blur size in pixels. The same number of pixels is cropped off
    /// every edge afterwards.
    pub blur_size: u32,
    /// Pixels darker than this are foreground.
    pub threshold: u8,
    /// Fewest contour points that count as a subject.
    pub min_contour: usize,
    /// Camera scale, used to turn pixel offsets into millimeters.
    pub pixels_per_mm: f64,
    /// Target duration of one vision worker iteration. Zero runs as fast as
    /// frames arrive.
    pub loop_duration: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: 0,
            frame_width: 200,
            frame_height: 200,
            blur_size: 10,
            threshold: 110,
            min_contour: 5,
            pixels_per_mm: 9.1051,
            loop_duration: 0.0,
        }
    }
}

impl CameraConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(invalid("camera frame size must be positive"));
        }
        if 2 * self.blur_size >= self.frame_width.min(self.frame_height) {
            return Err(invalid("camera blur crop leaves nothing of the frame"));
        }
        if !(self.pixels_per_mm > 0.0) {
            return Err(invalid("camera pixels_per_mm must be positive"));
        }
        Ok(())
    }
}

/// The main loop: pose fusion, stage correction and operator input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Target duration of one main loop iteration.
    pub loop_duration: f64,
    /// Stop after this many seconds. Runs until quit when unset.
    pub max_duration: Option<f64>,
    /// Degrees. Jumps larger than this are taken as a half-turn flip of the
    /// fitted ellipse.
    pub unwrap_threshold: f64,
    /// Samples in the heading moving average.
    pub average_len: usize,
    /// Corrections smaller than this are not sent, in millimeters.
    pub min_move: f64,
    /// Largest correction sent in one step, in millimeters.
    pub max_move: f64,
    /// Sign applied to the camera x offset to move the stage.
    pub stage_x_sign: f64,
    /// Sign applied to the camera y offset to move the stage.
    pub stage_y_sign: f64,
    /// Stage units to display units.
    pub display_scale: f64,
    /// Height of the eye point above the floor, display units.
    pub eye_height: f64,
    /// Whether the stage follows the subject from the start.
    pub tracking: bool,
    /// Manual jog distance per key press, in millimeters.
    pub jog_step: f64,
    /// Seconds between periodic status lines.
    pub status_interval: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            loop_duration: 8e-3,
            max_duration: None,
            unwrap_threshold: 150.0,
            average_len: 5,
            min_move: 1.0,
            max_move: 40.0,
            stage_x_sign: -1.0,
            stage_y_sign: 1.0,
            display_scale: 1e-3,
            eye_height: 0.0,
            tracking: true,
            jog_step: 5.0,
            status_interval: 1.0,
        }
    }
}

impl TrackerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(90.0..180.0).contains(&self.unwrap_threshold) {
            return Err(invalid("tracker unwrap_threshold must be in [90, 180)"));
        }
        if self.average_len == 0 {
            return Err(invalid("tracker average_len must be at least 1"));
        }
        if self.min_move < 0.0 || self.max_move < self.min_move {
            return Err(invalid("tracker needs 0 <= min_move <= max_move"));
        }
        if self.max_duration.is_some_and(|d| d <= 0.0) {
            return Err(invalid("tracker max_duration must be positive"));
        }
        Ok(())
    }
}

/// One trial in the stimulus rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialDef {
    /// Unique name, used in logs and recordings.
    pub name: String,
    /// Which kind of trial to build, e.g. `"CylinderBars"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific settings. Missing fields take the type's defaults.
    #[serde(default)]
    pub settings: Option<ron::Value>,
}

impl TrialDef {
    /// Decodes the settings blob into a trial type's settings struct.
    pub fn settings<T>(&self) -> Result<T, ConfigError>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        match &self.settings {
            None => Ok(T::default()),
            Some(value) => value
                .clone()
                .into_rust()
                .map_err(|e| ConfigError::Settings(self.name.clone(), e)),
        }
    }
}

/// The stimulus sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StimulusConfig {
    /// Background shown between trials: a grey level or `0xRRGGBB`.
    pub interleave_color: String,
    /// Seconds of interleave between trials.
    pub interleave_duration: f64,
    /// Seed for the trial shuffle.
    pub random_seed: u64,
    /// Trials in configuration order. Each block plays them all once.
    pub trials: Vec<TrialDef>,
}

impl Default for StimulusConfig {
    fn default() -> Self {
        Self {
            interleave_color: "0.5".to_owned(),
            interleave_duration: 1.0,
            random_seed: 0,
            trials: vec![TrialDef {
                name: "bars".to_owned(),
                kind: "CylinderBars".to_owned(),
                settings: None,
            }],
        }
    }
}

impl StimulusConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.trials.is_empty() {
            return Err(invalid("at least one trial must be configured"));
        }
        for (i, trial) in self.trials.iter().enumerate() {
            if self.trials[..i].iter().any(|t| t.name == trial.name) {
                return Err(invalid(format!("trial name {:?} is used twice", trial.name)));
            }
        }
        if self.interleave_duration < 0.0 {
            return Err(invalid("interleave_duration must not be negative"));
        }
        Ok(())
    }
}

/// Data recording.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    /// Directory for the CSV logs. Nothing is recorded when unset.
    pub dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_is_a_valid_config() {
        let config = RigConfig::parse("()").unwrap();
        assert_eq!(config, RigConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = RigConfig::parse(
            r#"(
                stage: (port: Some("/dev/ttyUSB0"), max_travel_x: 550.0),
                tracker: (max_duration: Some(15.0)),
            )"#,
        )
        .unwrap();

        assert_eq!(config.stage.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.stage.max_travel_x, 550.0);
        assert_eq!(config.stage.baud_rate, 400_000);
        assert_eq!(config.tracker.max_duration, Some(15.0));
        assert_eq!(config.camera, CameraConfig::default());
    }

    #[test]
    fn envelope_runs_from_max_travel_to_pull_off() {
        let env = StageConfig::default().envelope();
        assert_eq!((env.x_min, env.x_max), (-600.0, -20.0));
        assert_eq!((env.y_min, env.y_max), (-600.0, -20.0));
    }

    #[test]
    fn trial_settings_decode_with_defaults() {
        #[derive(Debug, Default, Deserialize)]
        #[serde(default)]
        struct Settings {
            speed: f64,
            periods: u32,
        }

        let config = RigConfig::parse(
            r#"(stimulus: (trials: [
                (name: "a", type: "X", settings: Some({"speed": 2.5})),
                (name: "b", type: "X"),
            ]))"#,
        )
        .unwrap();

        let a: Settings = config.stimulus.trials[0].settings().unwrap();
        assert_eq!((a.speed, a.periods), (2.5, 0));
        let b: Settings = config.stimulus.trials[1].settings().unwrap();
        assert_eq!(b.speed, 0.0);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut config = RigConfig::default();
        config.tracker.unwrap_threshold = 180.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = RigConfig::default();
        config.camera.blur_size = 100;
        assert!(config.validate().is_err());

        let mut config = RigConfig::default();
        config.stimulus.trials.clear();
        assert!(config.validate().is_err());

        let mut config = RigConfig::default();
        let dup = config.stimulus.trials[0].clone();
        config.stimulus.trials.push(dup);
        assert!(config.validate().is_err());
    }

    #[test]
    fn reads_from_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "(camera: (threshold: 90))").unwrap();

        let config = RigConfig::from_path(file.path()).unwrap();
        assert_eq!(config.camera.threshold, 90);
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert!(matches!(RigConfig::parse("(stage: ("), Err(ConfigError::Ron(_))));
        assert!(matches!(
            RigConfig::from_path("/definitely/not/here.ron"),
            Err(ConfigError::Io(_, _))
        ));
    }

    #[test]
    fn secs_saturates_bad_input_to_zero() {
        assert_eq!(secs(0.25), Duration::from_millis(250));
        assert_eq!(secs(-1.0), Duration::ZERO);
        assert_eq!(secs(f64::NAN), Duration::ZERO);
    }
}
