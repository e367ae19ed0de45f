use crate::core::domain::error::ProxmoxResult;
use crate::core::domain::value_object::{ProxmoxHost, ProxmoxPort};
use url::Url;

/// Base URL of the API endpoint, derived from host, port and TLS choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxmoxUrl(Url);

impl ProxmoxUrl {
    pub fn new(host: &ProxmoxHost, port: ProxmoxPort, secure: bool) -> ProxmoxResult<Self> {
        let scheme = if secure { "https" } else { "http" };
        let url = Url::parse(&format!("{scheme}://{}:{}/", host.as_str(), port.value()))?;
        Ok(Self(url))
    }

    pub(crate) fn new_unchecked(raw: &str) -> Self {
        Self(Url::parse(raw).expect("caller guarantees a parseable url"))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Joins an API path onto the base, e.g. `api2/json/access/ticket`.
    pub(crate) fn with_path(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.0.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::value_object::{ProxmoxHost, ProxmoxPort};

    #[test]
    fn test_url_construction() {
        let host = ProxmoxHost::new_unchecked("pve.example.org");
        let url = ProxmoxUrl::new(&host, ProxmoxPort::new_unchecked(8006), true).unwrap();
        assert_eq!(url.as_str(), "https://pve.example.org:8006/");
        assert_eq!(
            url.with_path("/api2/json/version"),
            "https://pve.example.org:8006/api2/json/version"
        );
    }
}
