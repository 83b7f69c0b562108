//! Audio-session interruption events and recovery states.

use std::fmt;

/// External OS-level audio event delivered to the engine by the host's
/// platform layer. The engine never polls the platform directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Another app claimed the audio device; the session is suspended.
    InterruptionBegan,
    /// The interruption ended. `should_resume` carries the platform's
    /// resume hint; without it the engine stays interrupted.
    InterruptionEnded { should_resume: bool },
    /// Soft focus-loss signal; observers are notified but no state changes.
    FocusLost,
    /// The device-level audio subsystem was reset; the whole audio graph
    /// must be rebuilt.
    MediaServicesReset,
    /// Headphones or a Bluetooth device were attached or detached.
    RouteChanged,
}

/// Recovery state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    /// Recording and/or playing normally.
    Active,
    /// Externally suspended, waiting for a resume hint.
    Interrupted,
    /// Terminal; no further operations are valid.
    TornDown,
}

/// Interruption notification pushed to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionKind {
    Began,
    Ended,
    Blocked,
}

impl InterruptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterruptionKind::Began => "began",
            InterruptionKind::Ended => "ended",
            InterruptionKind::Blocked => "blocked",
        }
    }
}

impl fmt::Display for InterruptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
