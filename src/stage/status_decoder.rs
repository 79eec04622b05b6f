//! Parses the controller's answer to a `?` status query.
//!
//! Two report layouts are accepted:
//!
//! ```text
//! <Idle|WPos:-20.000,-35.125,0.000|Bf:15,128>
//! <Idle|MPos:0.000,0.000,0.000,WPos:0.000,0.000,0.000>
//! ```
//!
//! The first is what the rig configures newer firmware to send; the second is
//! the older format, which carries no buffer state. Anything after the fields
//! we need is ignored.

use super::{BufferState, StageState};

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag},
    character::complete::{char, u32},
    combinator::{map, value},
    error::Error,
    multi::many0,
    number::complete::double,
    sequence::{preceded, separated_pair, tuple},
    Finish, IResult,
};

use std::str::FromStr;

/// The fields of one status report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusReport {
    /// Machine state.
    pub state: StageState,
    /// Work position, mm.
    pub x: f64,
    /// Y, mm.
    pub y: f64,
    /// Z, mm.
    pub z: f64,
    /// The `Bf:` field, when present.
    pub buffer: Option<BufferState>,
}

fn parse_state(s: &str) -> IResult<&str, StageState> {
    alt((
        value(StageState::Idle, tag("Idle")),
        value(StageState::Run, tag("Run")),
        value(StageState::Homing, tag("Home")),
        value(StageState::Alarm, tag("Alarm")),
        value(StageState::Jogging, tag("Jog")),
    ))(s)
}

fn parse_position(s: &str) -> IResult<&str, (f64, f64, f64)> {
    preceded(
        alt((tag("WPos:"), tag("MPos:"))),
        tuple((double, preceded(char(','), double), preceded(char(','), double))),
    )(s)
}

fn parse_buffer(s: &str) -> IResult<&str, BufferState> {
    map(
        preceded(tag("Bf:"), separated_pair(u32, char(','), u32)),
        |(planner_blocks, rx_free)| BufferState {
            planner_blocks,
            rx_free,
        },
    )(s)
}

// Any `|Key:value` field after the position; only `Bf` is kept.
fn parse_extra_field(s: &str) -> IResult<&str, Option<BufferState>> {
    preceded(
        char('|'),
        alt((map(parse_buffer, Some), value(None, is_not("|>")))),
    )(s)
}

fn parse_status_report(s: &str) -> IResult<&str, StatusReport> {
    map(
        tuple((
            preceded(char('<'), parse_state),
            preceded(char('|'), parse_position),
            many0(parse_extra_field),
        )),
        |(state, (x, y, z), extras)| StatusReport {
            state,
            x,
            y,
            z,
            buffer: extras.into_iter().flatten().next(),
        },
    )(s)
}

impl FromStr for StatusReport {
    type Err = Error<String>;

    /// Finds the report anywhere in the line, since the controller sometimes
    /// prefixes it with leftovers from earlier output.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let start = s.find('<').unwrap_or(0);
        match parse_status_report(&s[start..]).finish() {
            Ok((_remaining, report)) => Ok(report),
            Err(Error { input, code }) => Err(Error {
                input: input.to_string(),
                code,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_work_position_with_buffers() {
        let s = "<Idle|WPos:-20.000,-35.125,0.000|Bf:15,128>";

        let (leftover, res) = parse_status_report(s).unwrap();

        assert_eq!(leftover, ">");
        assert_eq!(
            res,
            StatusReport {
                state: StageState::Idle,
                x: -20.0,
                y: -35.125,
                z: 0.0,
                buffer: Some(BufferState {
                    planner_blocks: 15,
                    rx_free: 128,
                }),
            }
        );
    }

    #[test]
    fn parses_older_machine_position_format() {
        let res: StatusReport = "<Run|MPos:-100.500,-2.250,0.000,WPos:-100.500,-2.250,0.000>"
            .parse()
            .unwrap();

        assert_eq!(res.state, StageState::Run);
        assert_eq!((res.x, res.y, res.z), (-100.5, -2.25, 0.0));
        assert_eq!(res.buffer, None);
    }

    #[test]
    fn parses_truncated_older_format() {
        let res: StatusReport = "<Alarm|MPos:0.000,0.000,0.000".parse().unwrap();
        assert_eq!(res.state, StageState::Alarm);
        assert_eq!(res.buffer, None);
    }

    #[test]
    fn finds_buffer_among_other_fields() {
        let res: StatusReport = "<Jog|WPos:1.000,2.000,3.000|FS:500,0|Bf:10,90>"
            .parse()
            .unwrap();
        assert_eq!(res.state, StageState::Jogging);
        assert_eq!(
            res.buffer,
            Some(BufferState {
                planner_blocks: 10,
                rx_free: 90
            })
        );
    }

    #[test]
    fn homing_keyword_maps_to_homing() {
        let res: StatusReport = "<Home|WPos:0.000,0.000,0.000|Bf:15,128>".parse().unwrap();
        assert_eq!(res.state, StageState::Homing);
    }

    #[test]
    fn skips_leading_noise() {
        let res: StatusReport = "ok<Idle|WPos:1.000,1.000,0.000|Bf:15,128>".parse().unwrap();
        assert_eq!(res.state, StageState::Idle);
    }

    #[test]
    fn rejects_other_output() {
        assert!("ok".parse::<StatusReport>().is_err());
        assert!("error:9".parse::<StatusReport>().is_err());
        assert!("Grbl 1.1h ['$' for help]".parse::<StatusReport>().is_err());
        assert!("<Hold:0|WPos:0.000,0.000,0.000>".parse::<StatusReport>().is_err());
        assert!("<Idle|WPos:abc>".parse::<StatusReport>().is_err());
    }
}
