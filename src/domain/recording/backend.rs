//! Backend tier selection

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Error when an unknown backend name is provided
#[derive(Debug, Clone, Error)]
#[error("Invalid backend: \"{input}\". Valid backends are: native, helper")]
pub struct BackendParseError {
    pub input: String,
}

/// Capture backend tier, chosen once per recorder instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendKind {
    /// In-process capture through the platform audio framework
    #[default]
    Native,
    /// External helper executable driven by command-line directives
    Helper,
}

impl BackendKind {
    /// Pick the tier from a capability signal
    pub const fn from_capability(native_available: bool) -> Self {
        if native_available {
            Self::Native
        } else {
            Self::Helper
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Helper => "helper",
        }
    }
}

impl FromStr for BackendKind {
    type Err = BackendParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "helper" | "fmedia" | "legacy" => Ok(Self::Helper),
            _ => Err(BackendParseError {
                input: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_selects_tier() {
        assert_eq!(BackendKind::from_capability(true), BackendKind::Native);
        assert_eq!(BackendKind::from_capability(false), BackendKind::Helper);
    }

    #[test]
    fn parse_names() {
        assert_eq!("Native".parse::<BackendKind>().unwrap(), BackendKind::Native);
        assert_eq!("legacy".parse::<BackendKind>().unwrap(), BackendKind::Helper);
        assert!("cloud".parse::<BackendKind>().is_err());
    }
}
