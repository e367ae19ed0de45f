use crate::core::domain::error::ValidationError;

/// Requested high-availability state of a guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaState {
    Started,
    Stopped,
    Enabled,
    Disabled,
    Ignored,
}

impl HaState {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            HaState::Started => "started",
            HaState::Stopped => "stopped",
            HaState::Enabled => "enabled",
            HaState::Disabled => "disabled",
            HaState::Ignored => "ignored",
        }
    }

    pub(crate) fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "started" => Ok(HaState::Started),
            "stopped" => Ok(HaState::Stopped),
            "enabled" => Ok(HaState::Enabled),
            "disabled" => Ok(HaState::Disabled),
            "ignored" => Ok(HaState::Ignored),
            _ => Err(ValidationError::field(
                "hastate",
                format!("unknown ha state '{raw}'"),
            )),
        }
    }
}

impl std::fmt::Display for HaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
