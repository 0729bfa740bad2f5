//! Device actuators: one LED and one speaker.
//!
//! [`Panel`] interprets `LED` and `BEEP` frames and reports the resulting
//! actuator state through an [`Indicator`]. Timing is deadline based:
//! the owner asks for [`Panel::next_deadline`], sleeps until it, and calls
//! [`Panel::poll`].

use std::time::Duration;

use tokio::time::Instant;

use super::timer::{ScheduledTask, earliest};
use crate::protocol::{LedState, ServerFrame, ToneStep};

/// Index of the only LED and the only speaker the panel drives.
pub const ACTUATOR_INDEX: u8 = 1;

/// Output side of the panel.
pub trait Indicator: Send {
    /// LED turned on or off.
    fn led(&mut self, on: bool);

    /// Reported tone, `0` for silence. Called whether or not audio is
    /// muted.
    fn tone(&mut self, frequency: u32);

    /// Local audio output, `0` to stop. Only called while unmuted, plus
    /// once with `0` when muting.
    fn speaker(&mut self, _frequency: u32) {}

    /// Connection state changed.
    fn connected(&mut self, _connected: bool) {}
}

#[derive(Debug, Default)]
struct Speaker {
    steps: Vec<ToneStep>,
    cursor: usize,
    repeat: u32,
    current: u32,
    next: ScheduledTask,
}

/// LED + speaker state machine.
#[derive(Debug)]
pub struct Panel<I> {
    indicator: I,
    led_on: bool,
    led_off: ScheduledTask,
    speaker: Speaker,
    muted: bool,
}

impl<I: Indicator> Panel<I> {
    /// Creates a panel with the LED off and the speaker silent.
    pub fn new(indicator: I, muted: bool) -> Self {
        Self {
            indicator,
            led_on: false,
            led_off: ScheduledTask::new(),
            speaker: Speaker::default(),
            muted,
        }
    }

    /// The indicator the panel reports to.
    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    /// Current LED state.
    pub fn led_on(&self) -> bool {
        self.led_on
    }

    /// Tone currently playing, `0` for silence.
    pub fn tone(&self) -> u32 {
        self.speaker.current
    }

    /// Whether local audio is muted.
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Applies an actuation frame. Returns `false` for frames the panel
    /// does not handle.
    pub fn apply(&mut self, frame: &ServerFrame, now: Instant) -> bool {
        match frame {
            ServerFrame::Led {
                index: ACTUATOR_INDEX,
                state,
                duration_ms,
            } => {
                self.set_led(*state, duration_ms.unwrap_or(0), now);
                true
            }
            ServerFrame::Beep {
                index: ACTUATOR_INDEX,
                repeat,
                steps,
            } => {
                self.start_beep(*repeat, steps.clone(), now);
                true
            }
            _ => false,
        }
    }

    /// Sets the LED. Turning it on with a positive duration schedules an
    /// auto-off; any earlier auto-off is cancelled.
    pub fn set_led(&mut self, state: LedState, duration_ms: u64, now: Instant) {
        self.led_off.cancel();
        self.write_led(state.is_on());
        if state.is_on() && duration_ms > 0 {
            self.led_off
                .schedule(now + Duration::from_millis(duration_ms));
        }
    }

    /// Starts a tone sequence, replacing whatever was playing.
    ///
    /// The sequence plays `repeat` times; a repeat of `0` plays it once.
    pub fn start_beep(&mut self, repeat: u32, steps: Vec<ToneStep>, now: Instant) {
        self.speaker.next.cancel();
        self.speaker.steps = steps;
        self.speaker.cursor = 0;
        self.speaker.repeat = repeat;
        self.play_step(now);
    }

    /// Local button press: cancels every timer, turns the LED off and
    /// silences the speaker.
    pub fn press(&mut self) {
        self.led_off.cancel();
        self.write_led(false);
        self.reset_speaker();
    }

    /// Mutes or unmutes local audio. The reported tone is unaffected.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        if muted {
            self.indicator.speaker(0);
        }
    }

    /// Reports a connection state change.
    pub fn set_connected(&mut self, connected: bool) {
        self.indicator.connected(connected);
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        earliest(self.led_off.deadline(), self.speaker.next.deadline())
    }

    /// Fires the deadlines due at `now`. Plays at most one tone step per
    /// call; if the next step is already due, [`Panel::next_deadline`]
    /// reports it and the owner polls again.
    pub fn poll(&mut self, now: Instant) {
        if self.led_off.take_due(now).is_some() {
            self.write_led(false);
        }
        // Each step is scheduled from the previous deadline, not from
        // `now`, so a late poll does not stretch the sequence.
        if let Some(at) = self.speaker.next.take_due(now) {
            self.play_step(at);
        }
    }

    fn play_step(&mut self, now: Instant) {
        if self.speaker.cursor >= self.speaker.steps.len() {
            if self.speaker.repeat > 0 {
                self.speaker.repeat -= 1;
            }
            if self.speaker.repeat == 0 {
                self.finish_sequence();
                return;
            }
            self.speaker.cursor = 0;
        }
        let Some(step) = self.speaker.steps.get(self.speaker.cursor).copied() else {
            self.finish_sequence();
            return;
        };
        self.start_note(step.frequency);
        self.speaker
            .next
            .schedule(now + Duration::from_millis(step.duration_ms));
        self.speaker.cursor += 1;
    }

    fn finish_sequence(&mut self) {
        self.speaker.next.cancel();
        if self.speaker.current != 0 {
            self.start_note(0);
        }
    }

    fn reset_speaker(&mut self) {
        self.speaker.next.cancel();
        self.speaker.steps.clear();
        self.speaker.cursor = 0;
        self.speaker.repeat = 0;
        self.start_note(0);
    }

    fn start_note(&mut self, frequency: u32) {
        self.speaker.current = frequency;
        if !self.muted {
            self.indicator.speaker(frequency);
        }
        self.indicator.tone(frequency);
    }

    fn write_led(&mut self, on: bool) {
        self.led_on = on;
        self.indicator.led(on);
    }
}
