use std::collections::BTreeMap;

use crate::core::domain::codec::{parse_device, DeviceString};
use crate::core::domain::error::ValidationError;

/// Host entropy source backing a VirtIO RNG device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RngSource {
    Random,
    URandom,
    HwRng,
}

impl RngSource {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            RngSource::Random => "/dev/random",
            RngSource::URandom => "/dev/urandom",
            RngSource::HwRng => "/dev/hwrng",
        }
    }

    pub(crate) fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "/dev/random" => Ok(RngSource::Random),
            "/dev/urandom" => Ok(RngSource::URandom),
            "/dev/hwrng" => Ok(RngSource::HwRng),
            _ => Err(ValidationError::field(
                "rng0.source",
                format!("unknown entropy source '{raw}'"),
            )),
        }
    }
}

/// VirtIO RNG device (`rng0` option).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtioRng {
    pub source: RngSource,
    /// Byte budget per period; unlimited when unset.
    pub max_bytes: Option<u32>,
    /// Period in milliseconds for the byte budget.
    pub period: Option<u32>,
    pub trailer: BTreeMap<String, String>,
}

impl VirtioRng {
    pub fn new(source: RngSource) -> Self {
        Self {
            source,
            max_bytes: None,
            period: None,
            trailer: BTreeMap::new(),
        }
    }

    pub(crate) fn to_api(&self) -> String {
        let mut ds = DeviceString::new();
        ds.pair("source", self.source.as_str())
            .opt("max_bytes", self.max_bytes)
            .opt("period", self.period)
            .trailer(&self.trailer);
        ds.finish()
    }

    pub(crate) fn from_api(raw: &str) -> Result<Self, ValidationError> {
        let mut map = parse_device(raw, "source");
        let source = RngSource::parse(&map.remove("source").unwrap_or_default())?;
        let max_bytes = map.remove("max_bytes").and_then(|v| v.parse().ok());
        let period = map.remove("period").and_then(|v| v.parse().ok());
        Ok(Self {
            source,
            max_bytes,
            period,
            trailer: map,
        })
    }
}
