//! Sustain retention
//!
//! Sustain is a three-state machine: idle, sustaining because the pedal is
//! down (momentary), or sustaining because latch mode is on. The latch mode
//! is therefore never stored apart from the state: latched mode always means
//! sustain is active.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::midi::RawMessage;

/// Pedal value treated as fully depressed in momentary mode
const PEDAL_DOWN: u8 = 127;

/// How the sustain pedal drives sustain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SustainMode {
    /// Sustain follows the pedal (recommended)
    #[default]
    Momentary,
    /// Sustain stays on regardless of the pedal
    Latched,
}

impl fmt::Display for SustainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SustainMode::Momentary => f.write_str("momentary"),
            SustainMode::Latched => f.write_str("latched"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SustainState {
    #[default]
    Idle,
    Sustaining(SustainMode),
}

impl SustainState {
    pub fn is_active(self) -> bool {
        matches!(self, SustainState::Sustaining(_))
    }

    pub fn mode(self) -> SustainMode {
        match self {
            SustainState::Sustaining(SustainMode::Latched) => SustainMode::Latched,
            _ => SustainMode::Momentary,
        }
    }

    /// State after a sustain pedal message
    ///
    /// Any value other than 127 counts as released in momentary mode.
    pub fn on_pedal(self, value: u8) -> Self {
        match self {
            SustainState::Sustaining(SustainMode::Latched) => self,
            _ if value == PEDAL_DOWN => SustainState::Sustaining(SustainMode::Momentary),
            _ => SustainState::Idle,
        }
    }

    /// State after the operator selects a sustain mode
    pub fn with_mode(self, mode: SustainMode) -> Self {
        match (self.mode(), mode) {
            (current, requested) if current == requested => self,
            (_, SustainMode::Latched) => SustainState::Sustaining(SustainMode::Latched),
            (_, SustainMode::Momentary) => SustainState::Idle,
        }
    }
}

/// Notes with a withheld note-off, unique, kept in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeldNotes(Vec<u8>);

impl HeldNotes {
    /// Hold a note; holding an already-held note is a no-op
    pub fn insert(&mut self, note: u8) -> bool {
        if self.0.contains(&note) {
            return false;
        }
        self.0.push(note);
        true
    }

    pub fn remove(&mut self, note: u8) -> bool {
        match self.0.iter().position(|&held| held == note) {
            Some(index) => {
                self.0.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, note: u8) -> bool {
        self.0.contains(&note)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.0)
    }
}

impl super::Router {
    /// Handle CC 64 from the input
    pub(super) fn on_sustain_pedal(&mut self, value: u8) -> Vec<RawMessage> {
        let next = self.sustain.on_pedal(value);
        debug!("Sustain pedal value={} ({:?} -> {:?})", value, self.sustain, next);
        self.enter(next)
    }

    /// Select momentary or latched sustain
    ///
    /// Leaving latched mode releases every held note. Selecting the mode
    /// already in effect changes nothing.
    pub fn set_sustain_mode(&mut self, mode: SustainMode) -> Vec<RawMessage> {
        let next = self.sustain.with_mode(mode);
        if next != self.sustain {
            debug!("Sustain mode {} -> {}", self.sustain.mode(), mode);
        }
        self.enter(next)
    }

    /// Release every held note now, leaving the sustain state as it is
    pub fn release_all(&mut self) -> Vec<RawMessage> {
        let released: Vec<RawMessage> = self
            .held_notes
            .take()
            .into_iter()
            .map(|note| self.note_off(note))
            .collect();

        if !released.is_empty() {
            debug!("Released {} held note(s)", released.len());
        }
        released
    }

    fn enter(&mut self, next: SustainState) -> Vec<RawMessage> {
        self.sustain = next;
        if next.is_active() {
            Vec::new()
        } else {
            self.release_all()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pedal_drives_momentary_sustain() {
        let state = SustainState::Idle.on_pedal(127);
        assert_eq!(state, SustainState::Sustaining(SustainMode::Momentary));

        assert_eq!(state.on_pedal(0), SustainState::Idle);
        assert_eq!(state.on_pedal(126), SustainState::Idle);
    }

    #[test]
    fn test_latched_ignores_pedal() {
        let state = SustainState::Idle.with_mode(SustainMode::Latched);
        assert_eq!(state.on_pedal(0), state);
        assert_eq!(state.on_pedal(127), state);
        assert_eq!(state.mode(), SustainMode::Latched);
    }

    #[test]
    fn test_mode_changes() {
        let momentary_down = SustainState::Sustaining(SustainMode::Momentary);

        assert_eq!(momentary_down.with_mode(SustainMode::Momentary), momentary_down);
        assert_eq!(
            momentary_down.with_mode(SustainMode::Latched),
            SustainState::Sustaining(SustainMode::Latched)
        );
        assert_eq!(
            SustainState::Sustaining(SustainMode::Latched).with_mode(SustainMode::Momentary),
            SustainState::Idle
        );
    }

    #[test]
    fn test_held_notes_are_unique_and_ordered() {
        let mut held = HeldNotes::default();
        assert!(held.insert(67));
        assert!(held.insert(60));
        assert!(!held.insert(67));

        assert_eq!(held.as_slice(), &[67, 60]);
        assert!(held.remove(67));
        assert!(!held.remove(67));
        assert_eq!(held.len(), 1);
        assert!(held.contains(60));
    }
}
