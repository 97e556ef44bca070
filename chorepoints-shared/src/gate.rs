use std::fmt;

use crate::error::{DomainError, Precondition};

pub const PIN_LEN: usize = 4;

/// A validated four-digit parent PIN.
#[derive(Clone, PartialEq, Eq)]
pub struct Pin(String);

impl Pin {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        if raw.len() == PIN_LEN && raw.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Pin(raw.to_string()))
        } else {
            Err(DomainError::precondition(Precondition::InvalidPin))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keep the code itself out of logs.
impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin(****)")
    }
}

/// Proof that the parent console was unlocked. Only [`AccessGate`] hands
/// these out; parent-only operations take one by reference.
#[derive(Debug, Clone)]
pub struct ParentConsole {
    _private: (),
}

/// Holds the household PIN. No PIN means the console has not been set up.
#[derive(Debug, Clone, Default)]
pub struct AccessGate {
    pin: Option<Pin>,
}

impl AccessGate {
    pub fn new(pin: Option<Pin>) -> Self {
        Self { pin }
    }

    /// Build from the raw stored value. A malformed stored value is treated as
    /// a set PIN that only matches itself, so it never opens the console by
    /// accident.
    pub fn from_stored(raw: Option<&str>) -> Self {
        let pin = raw.map(|s| Pin(s.to_string()));
        Self { pin }
    }

    pub fn is_setup_mode(&self) -> bool {
        self.pin.is_none()
    }

    pub fn pin(&self) -> Option<&Pin> {
        self.pin.as_ref()
    }

    /// Replace the PIN. There is no old-PIN check at this layer.
    pub fn set_pin(&mut self, raw: &str) -> Result<ParentConsole, DomainError> {
        self.pin = Some(Pin::parse(raw)?);
        Ok(ParentConsole { _private: () })
    }

    /// Strict comparison; always `false` while no PIN is stored.
    pub fn verify_pin(&self, input: &str) -> bool {
        match &self.pin {
            Some(pin) => pin.0 == input,
            None => false,
        }
    }

    pub fn unlock(&self, input: &str) -> Option<ParentConsole> {
        self.verify_pin(input)
            .then_some(ParentConsole { _private: () })
    }
}
