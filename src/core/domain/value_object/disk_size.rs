use crate::core::domain::error::{ProxmoxResult, ValidationError};

const KIB_PER_MIB: u64 = 1024;
const KIB_PER_GIB: u64 = 1024 * 1024;
const KIB_PER_TIB: u64 = 1024 * 1024 * 1024;

/// Smallest disk PVE will allocate on any bus.
const MIN_KIB: u64 = 4 * KIB_PER_MIB;

pub(crate) fn validate_disk_size(size: &DiskSize) -> Result<(), ValidationError> {
    if size.0 < MIN_KIB {
        return Err(ValidationError::field(
            "size",
            format!("must be at least {} MiB", MIN_KIB / KIB_PER_MIB),
        ));
    }
    Ok(())
}

/// Capacity of a guest disk, kept in KiB so the `K`/`M`/`G`/`T` wire
/// suffixes round-trip exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DiskSize(u64);

impl DiskSize {
    pub fn from_gib(gib: u64) -> Self {
        Self(gib * KIB_PER_GIB)
    }

    pub fn from_mib(mib: u64) -> Self {
        Self(mib * KIB_PER_MIB)
    }

    pub(crate) fn from_kib(kib: u64) -> Self {
        Self(kib)
    }

    pub fn kib(&self) -> u64 {
        self.0
    }

    /// Whole GiB, rounded up; the `<storage>:<size>` create token is
    /// expressed in GiB.
    pub(crate) fn gib_ceil(&self) -> u64 {
        self.0.div_ceil(KIB_PER_GIB)
    }

    /// Parses a `size=` attribute. A bare number is taken as GiB, matching
    /// what the API accepts on create.
    pub(crate) fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        let (digits, factor) = match raw.chars().last() {
            Some('K') | Some('k') => (&raw[..raw.len() - 1], 1),
            Some('M') | Some('m') => (&raw[..raw.len() - 1], KIB_PER_MIB),
            Some('G') | Some('g') => (&raw[..raw.len() - 1], KIB_PER_GIB),
            Some('T') | Some('t') => (&raw[..raw.len() - 1], KIB_PER_TIB),
            _ => (raw, KIB_PER_GIB),
        };
        let value: u64 = digits
            .parse()
            .map_err(|_| ValidationError::Format(format!("invalid disk size '{raw}'")))?;
        Ok(Self(value * factor))
    }

    /// Formats with the largest suffix that divides evenly, as PVE does.
    pub(crate) fn to_api(self) -> String {
        if self.0 % KIB_PER_TIB == 0 {
            format!("{}T", self.0 / KIB_PER_TIB)
        } else if self.0 % KIB_PER_GIB == 0 {
            format!("{}G", self.0 / KIB_PER_GIB)
        } else if self.0 % KIB_PER_MIB == 0 {
            format!("{}M", self.0 / KIB_PER_MIB)
        } else {
            format!("{}K", self.0)
        }
    }

    /// The `+NG`/`+NM` growth delta for the resize endpoint. `None` when
    /// `self` does not exceed `current`.
    pub(crate) fn growth_from(self, current: DiskSize) -> Option<String> {
        if self.0 <= current.0 {
            return None;
        }
        Some(format!("+{}", DiskSize(self.0 - current.0).to_api()))
    }
}

impl std::fmt::Display for DiskSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_api())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_suffixes() {
        assert_eq!(DiskSize::parse("32G").unwrap(), DiskSize::from_gib(32));
        assert_eq!(DiskSize::parse("512M").unwrap(), DiskSize::from_mib(512));
        assert_eq!(DiskSize::parse("528K").unwrap(), DiskSize::from_kib(528));
        assert_eq!(DiskSize::parse("2T").unwrap(), DiskSize::from_gib(2048));
        assert_eq!(DiskSize::parse("8").unwrap(), DiskSize::from_gib(8));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(DiskSize::parse("").is_err());
        assert!(DiskSize::parse("G").is_err());
        assert!(DiskSize::parse("12X3").is_err());
    }

    #[test]
    fn test_format_picks_largest_suffix() {
        assert_eq!(DiskSize::from_gib(32).to_api(), "32G");
        assert_eq!(DiskSize::from_mib(4).to_api(), "4M");
        assert_eq!(DiskSize::from_mib(1536).to_api(), "1536M");
        assert_eq!(DiskSize::from_gib(2048).to_api(), "2T");
    }

    #[test]
    fn test_growth() {
        let small = DiskSize::from_gib(10);
        let big = DiskSize::from_gib(20);
        assert_eq!(big.growth_from(small).as_deref(), Some("+10G"));
        assert_eq!(small.growth_from(big), None);
        assert_eq!(small.growth_from(small), None);
    }

    #[test]
    fn test_minimum() {
        assert!(validate_disk_size(&DiskSize::from_mib(4)).is_ok());
        assert!(validate_disk_size(&DiskSize::from_mib(3)).is_err());
    }
}
