use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// BOLT's current operating mode. Process-wide — a build pipeline switches
/// the mode to `Build` while it runs and restores the previous mode when the
/// callback fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Companion,
    Code,
    Build,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Companion => write!(f, "companion"),
            Self::Code => write!(f, "code"),
            Self::Build => write!(f, "build"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "companion" => Ok(Self::Companion),
            "code" => Ok(Self::Code),
            "build" => Ok(Self::Build),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// Shared mode cell. Replaces a mutable module global so tests can hold an
/// explicit handle and assert transitions.
#[derive(Debug)]
pub struct ModeState {
    inner: RwLock<Mode>,
}

impl ModeState {
    pub fn new(initial: Mode) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    pub fn get(&self) -> Mode {
        *self.inner.read().unwrap()
    }

    /// Set the mode, returning the previous value.
    pub fn set(&self, mode: Mode) -> Mode {
        let mut guard = self.inner.write().unwrap();
        std::mem::replace(&mut *guard, mode)
    }
}

impl Default for ModeState {
    fn default() -> Self {
        Self::new(Mode::Companion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_returns_previous_mode() {
        let state = ModeState::default();
        assert_eq!(state.get(), Mode::Companion);
        let prev = state.set(Mode::Build);
        assert_eq!(prev, Mode::Companion);
        assert_eq!(state.get(), Mode::Build);
    }

    #[test]
    fn mode_parses_from_lowercase() {
        assert_eq!("code".parse::<Mode>().unwrap(), Mode::Code);
        assert!("COMPANION".parse::<Mode>().is_err());
    }
}
