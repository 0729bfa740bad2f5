//! Typed wire frames for both protocol directions.
//!
//! Frames are single lines of space-separated tokens; the first token is
//! the verb. Decoding never fails on an unrecognised verb: it yields an
//! `Unknown` variant and the receiver decides to ignore it.

use std::fmt;
use std::str::SplitWhitespace;

/// Errors produced while decoding a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The line contained no tokens.
    #[error("empty frame")]
    Empty,

    /// A required argument was not present.
    #[error("{verb}: missing {argument}")]
    MissingArgument {
        /// Frame verb.
        verb: &'static str,
        /// Name of the absent argument.
        argument: &'static str,
    },

    /// An argument could not be parsed.
    #[error("{verb}: invalid {argument} `{value}`")]
    InvalidArgument {
        /// Frame verb.
        verb: &'static str,
        /// Name of the argument.
        argument: &'static str,
        /// Raw token.
        value: String,
    },

    /// A `BEEP` carried no tone steps, or a frequency without a duration.
    #[error("BEEP: tone sequence must be non-empty (frequency, duration) pairs")]
    IncompleteToneSequence,
}

/// Frames sent by a device to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFrame {
    /// `HELLO <callsign> [<firmwareHash>]`
    Hello {
        /// Device callsign.
        callsign: String,
        /// Hash of the running firmware partition, if reported.
        firmware: Option<String>,
    },
    /// `BUTTON`: the user pressed the device button.
    Button,
    /// Any other verb, kept verbatim.
    Unknown(String),
}

impl DeviceFrame {
    /// Decodes one line.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Empty`] for a blank line and
    /// [`FrameError::MissingArgument`] for a `HELLO` without a callsign.
    pub fn decode(line: &str) -> Result<Self, FrameError> {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            None => Err(FrameError::Empty),
            Some("HELLO") => {
                let callsign = tokens.next().ok_or(FrameError::MissingArgument {
                    verb: "HELLO",
                    argument: "callsign",
                })?;
                Ok(Self::Hello {
                    callsign: callsign.to_string(),
                    firmware: tokens.next().map(str::to_string),
                })
            }
            // Firmware sends `BUTTON <idx>`; the index is not used.
            Some("BUTTON") => Ok(Self::Button),
            Some(_) => Ok(Self::Unknown(line.trim().to_string())),
        }
    }
}

impl fmt::Display for DeviceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hello {
                callsign,
                firmware: Some(fw),
            } => write!(f, "HELLO {callsign} {fw}"),
            Self::Hello {
                callsign,
                firmware: None,
            } => write!(f, "HELLO {callsign}"),
            Self::Button => f.write_str("BUTTON"),
            Self::Unknown(raw) => f.write_str(raw),
        }
    }
}

/// Requested indicator output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedState {
    /// Light on.
    On,
    /// Light off.
    Off,
}

impl LedState {
    /// Returns `true` for [`LedState::On`].
    #[must_use]
    pub const fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

/// One step of a tone sequence. A frequency of zero is silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneStep {
    /// Tone frequency in Hz.
    pub frequency: u32,
    /// How long to hold the tone, in milliseconds.
    pub duration_ms: u64,
}

impl ToneStep {
    /// Creates a step.
    #[must_use]
    pub const fn new(frequency: u32, duration_ms: u64) -> Self {
        Self {
            frequency,
            duration_ms,
        }
    }
}

/// Frames sent by the server to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// `WELCOME <sessionId>`
    Welcome(String),
    /// `ERROR <text>`; the socket closes after it.
    Error(String),
    /// `OTA <version>`; the device must reflash, the socket closes after it.
    Ota(String),
    /// `LED <idx> <ON|OFF> [durMs]`
    Led {
        /// Indicator index.
        index: u8,
        /// Requested state.
        state: LedState,
        /// Auto-off delay when turning on.
        duration_ms: Option<u64>,
    },
    /// `BEEP <idx> <repeat> <freq> <dur> [<freq> <dur> ...]`
    Beep {
        /// Speaker index.
        index: u8,
        /// How many times to play the sequence.
        repeat: u32,
        /// Tone steps in playback order.
        steps: Vec<ToneStep>,
    },
    /// Any other verb, kept verbatim.
    Unknown(String),
}

impl ServerFrame {
    /// Decodes one line.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] for blank lines and for `LED`/`BEEP`
    /// frames whose arguments do not parse.
    pub fn decode(line: &str) -> Result<Self, FrameError> {
        let mut tokens = line.split_whitespace();
        let Some(verb) = tokens.next() else {
            return Err(FrameError::Empty);
        };
        match verb {
            "WELCOME" => Ok(Self::Welcome(rest(tokens))),
            "ERROR" => Ok(Self::Error(rest(tokens))),
            "OTA" => Ok(Self::Ota(rest(tokens))),
            "LED" => {
                let index = required(&mut tokens, "LED", "index")?;
                let state = match tokens.next() {
                    Some("ON") => LedState::On,
                    Some("OFF") => LedState::Off,
                    Some(other) => {
                        return Err(FrameError::InvalidArgument {
                            verb: "LED",
                            argument: "state",
                            value: other.to_string(),
                        });
                    }
                    None => {
                        return Err(FrameError::MissingArgument {
                            verb: "LED",
                            argument: "state",
                        });
                    }
                };
                let duration_ms = tokens
                    .next()
                    .map(|t| parse_token(t, "LED", "duration"))
                    .transpose()?;
                Ok(Self::Led {
                    index,
                    state,
                    duration_ms,
                })
            }
            "BEEP" => {
                let index = required(&mut tokens, "BEEP", "index")?;
                let repeat = required(&mut tokens, "BEEP", "repeat")?;
                let mut steps = Vec::new();
                while let Some(freq) = tokens.next() {
                    let frequency = parse_token(freq, "BEEP", "frequency")?;
                    let dur = tokens.next().ok_or(FrameError::IncompleteToneSequence)?;
                    let duration_ms = parse_token(dur, "BEEP", "duration")?;
                    steps.push(ToneStep::new(frequency, duration_ms));
                }
                if steps.is_empty() {
                    return Err(FrameError::IncompleteToneSequence);
                }
                Ok(Self::Beep {
                    index,
                    repeat,
                    steps,
                })
            }
            _ => Ok(Self::Unknown(line.trim().to_string())),
        }
    }
}

impl fmt::Display for ServerFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Welcome(id) => write!(f, "WELCOME {id}"),
            Self::Error(text) => write!(f, "ERROR {text}"),
            Self::Ota(version) => write!(f, "OTA {version}"),
            Self::Led {
                index,
                state,
                duration_ms,
            } => {
                let state = if state.is_on() { "ON" } else { "OFF" };
                write!(f, "LED {index} {state}")?;
                match duration_ms {
                    Some(ms) if *ms > 0 => write!(f, " {ms}"),
                    _ => Ok(()),
                }
            }
            Self::Beep {
                index,
                repeat,
                steps,
            } => {
                write!(f, "BEEP {index} {repeat}")?;
                for step in steps {
                    write!(f, " {} {}", step.frequency, step.duration_ms)?;
                }
                Ok(())
            }
            Self::Unknown(raw) => f.write_str(raw),
        }
    }
}

fn rest(tokens: SplitWhitespace<'_>) -> String {
    tokens.collect::<Vec<_>>().join(" ")
}

fn required<T: std::str::FromStr>(
    tokens: &mut SplitWhitespace<'_>,
    verb: &'static str,
    argument: &'static str,
) -> Result<T, FrameError> {
    let token = tokens
        .next()
        .ok_or(FrameError::MissingArgument { verb, argument })?;
    parse_token(token, verb, argument)
}

fn parse_token<T: std::str::FromStr>(
    token: &str,
    verb: &'static str,
    argument: &'static str,
) -> Result<T, FrameError> {
    token.parse().map_err(|_| FrameError::InvalidArgument {
        verb,
        argument,
        value: token.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn hello_with_and_without_firmware() {
        assert_eq!(
            DeviceFrame::decode("HELLO W1AW"),
            Ok(DeviceFrame::Hello {
                callsign: "W1AW".to_string(),
                firmware: None
            })
        );
        assert_eq!(
            DeviceFrame::decode("HELLO W1AW 9f86d081\n"),
            Ok(DeviceFrame::Hello {
                callsign: "W1AW".to_string(),
                firmware: Some("9f86d081".to_string())
            })
        );
    }

    #[test]
    fn hello_without_callsign_is_malformed() {
        assert_eq!(
            DeviceFrame::decode("HELLO"),
            Err(FrameError::MissingArgument {
                verb: "HELLO",
                argument: "callsign"
            })
        );
    }

    #[test]
    fn button_tolerates_index() {
        assert_eq!(DeviceFrame::decode("BUTTON"), Ok(DeviceFrame::Button));
        assert_eq!(DeviceFrame::decode("BUTTON 1"), Ok(DeviceFrame::Button));
    }

    #[test]
    fn unknown_verbs_are_kept() {
        assert_eq!(
            DeviceFrame::decode("STATUS ok"),
            Ok(DeviceFrame::Unknown("STATUS ok".to_string()))
        );
        assert_eq!(DeviceFrame::decode("   "), Err(FrameError::Empty));
    }

    #[test]
    fn led_frames() {
        assert_eq!(
            ServerFrame::decode("LED 1 ON 2000"),
            Ok(ServerFrame::Led {
                index: 1,
                state: LedState::On,
                duration_ms: Some(2000)
            })
        );
        assert_eq!(
            ServerFrame::decode("LED 1 OFF"),
            Ok(ServerFrame::Led {
                index: 1,
                state: LedState::Off,
                duration_ms: None
            })
        );
        assert!(matches!(
            ServerFrame::decode("LED 1 10 FF0000 1000"),
            Err(FrameError::InvalidArgument {
                argument: "state",
                ..
            })
        ));
    }

    #[test]
    fn beep_frame_pairs_steps() {
        let Ok(ServerFrame::Beep {
            index,
            repeat,
            steps,
        }) = ServerFrame::decode("BEEP 1 2 440 200 0 100")
        else {
            panic!("expected beep");
        };
        assert_eq!(index, 1);
        assert_eq!(repeat, 2);
        assert_eq!(steps, vec![ToneStep::new(440, 200), ToneStep::new(0, 100)]);
    }

    #[test]
    fn beep_rejects_dangling_frequency() {
        assert_eq!(
            ServerFrame::decode("BEEP 1 2 440 200 330"),
            Err(FrameError::IncompleteToneSequence)
        );
        assert_eq!(
            ServerFrame::decode("BEEP 1 2"),
            Err(FrameError::IncompleteToneSequence)
        );
    }

    #[test]
    fn server_frames_encode_to_wire_text() {
        let led = ServerFrame::Led {
            index: 1,
            state: LedState::On,
            duration_ms: Some(5000),
        };
        assert_eq!(led.to_string(), "LED 1 ON 5000");
        assert_eq!(ServerFrame::Ota("abc".to_string()).to_string(), "OTA abc");
        assert_eq!(
            ServerFrame::Error("device not known".to_string()).to_string(),
            "ERROR device not known"
        );
    }

    #[test]
    fn error_text_keeps_spaces() {
        assert_eq!(
            ServerFrame::decode("ERROR device not known"),
            Ok(ServerFrame::Error("device not known".to_string()))
        );
    }
}
