use crate::core::domain::error::{ProxmoxError, ProxmoxResult};
use serde::Deserialize;

/// Response of `GET /version`.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub repoid: Option<String>,
}

/// Parsed PVE version; attribute encoding branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses `8.1.4` style strings; a `-release` suffix on the last
    /// component is tolerated.
    pub fn parse(raw: &str) -> ProxmoxResult<Self> {
        let mut parts = raw.split('.').map(|p| {
            p.split('-')
                .next()
                .unwrap_or(p)
                .parse::<u32>()
                .map_err(|_| ProxmoxError::Transport(format!("unparseable version '{raw}'")))
        });
        let major = parts.next().transpose()?.ok_or_else(|| {
            ProxmoxError::Transport(format!("unparseable version '{raw}'"))
        })?;
        let minor = parts.next().transpose()?.unwrap_or(0);
        let patch = parts.next().transpose()?.unwrap_or(0);
        Ok(Self {
            major,
            minor,
            patch,
        })
    }

    /// `ciupgrade` only exists since PVE 8.
    pub(crate) fn supports_ci_upgrade(&self) -> bool {
        self.major >= 8
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
