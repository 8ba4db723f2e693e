//! Service control codes and the accepted-control set.

use bitflags::bitflags;

/// Control requests the OS can deliver to a running service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCode {
    Stop,
    Pause,
    Continue,
    Interrogate,
    Shutdown,
    ParamChange,
    NetBindChange,
    HardwareProfile,
    PowerEvent,
    SessionChange,
}

impl ControlCode {
    /// Numeric value forwarded to the hosted control handler; matches
    /// the OS service-control numbering.
    pub fn code(self) -> u32 {
        match self {
            ControlCode::Stop => 1,
            ControlCode::Pause => 2,
            ControlCode::Continue => 3,
            ControlCode::Interrogate => 4,
            ControlCode::Shutdown => 5,
            ControlCode::ParamChange => 6,
            ControlCode::NetBindChange => 7,
            ControlCode::HardwareProfile => 12,
            ControlCode::PowerEvent => 13,
            ControlCode::SessionChange => 14,
        }
    }
}

bitflags! {
    /// Which control requests the service tells the OS it accepts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AcceptedControls: u32 {
        const STOP             = 1 << 0;
        const SHUTDOWN         = 1 << 1;
        const PAUSE_CONTINUE   = 1 << 2;
        const PARAM_CHANGE     = 1 << 3;
        const NETBIND_CHANGE   = 1 << 4;
        const HARDWARE_PROFILE = 1 << 5;
        const POWER_EVENT      = 1 << 6;
        const SESSION_CHANGE   = 1 << 7;
    }
}

impl AcceptedControls {
    /// Parse a `|`-delimited token list; unrecognized tokens are
    /// ignored. `None` or an empty list yields the default set.
    pub fn parse(list: Option<&str>) -> Self {
        let Some(list) = list else {
            return Self::default();
        };
        let mut accepted = AcceptedControls::empty();
        for token in list.split('|').map(str::trim) {
            match token.to_ascii_lowercase().as_str() {
                "stop" => accepted |= Self::STOP,
                "shutdown" => accepted |= Self::SHUTDOWN,
                "pause" => accepted |= Self::PAUSE_CONTINUE,
                "param" => accepted |= Self::PARAM_CHANGE,
                "netbind" => accepted |= Self::NETBIND_CHANGE,
                "hardware" => accepted |= Self::HARDWARE_PROFILE,
                "power" => accepted |= Self::POWER_EVENT,
                "session" => accepted |= Self::SESSION_CHANGE,
                "" => {}
                other => log::debug!("Ignoring unknown service control token: {}", other),
            }
        }
        if accepted.is_empty() {
            Self::default()
        } else {
            accepted
        }
    }

    pub fn accepts(self, code: ControlCode) -> bool {
        match code {
            ControlCode::Stop => self.contains(Self::STOP),
            ControlCode::Shutdown => self.contains(Self::SHUTDOWN),
            ControlCode::Pause | ControlCode::Continue => self.contains(Self::PAUSE_CONTINUE),
            ControlCode::ParamChange => self.contains(Self::PARAM_CHANGE),
            ControlCode::NetBindChange => self.contains(Self::NETBIND_CHANGE),
            ControlCode::HardwareProfile => self.contains(Self::HARDWARE_PROFILE),
            ControlCode::PowerEvent => self.contains(Self::POWER_EVENT),
            ControlCode::SessionChange => self.contains(Self::SESSION_CHANGE),
            ControlCode::Interrogate => true,
        }
    }
}

impl Default for AcceptedControls {
    fn default() -> Self {
        Self::STOP | Self::SHUTDOWN
    }
}
