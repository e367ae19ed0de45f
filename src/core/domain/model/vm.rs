//! API response shapes for guest state endpoints.

use serde::Deserialize;
use serde_json::Value;

/// Runtime state from `/nodes/{node}/qemu/{vmid}/status/current`.
#[derive(Debug, Clone, Deserialize)]
pub struct VmStatusCurrent {
    /// `running`, `stopped` or `paused`.
    pub status: String,
    /// Active config lock (`clone`, `migrate`, …) when set.
    #[serde(default)]
    pub lock: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub qmpstatus: Option<String>,
    #[serde(default)]
    pub uptime: Option<u64>,
}

impl VmStatusCurrent {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }

    pub fn is_stopped(&self) -> bool {
        self.status == "stopped"
    }
}

/// One row of `/nodes/{node}/qemu/{vmid}/pending`.
#[derive(Debug, Clone, Deserialize)]
pub struct PendingChange {
    pub key: String,
    /// Currently active value.
    #[serde(default)]
    pub value: Option<Value>,
    /// Staged value awaiting the next restart.
    #[serde(default)]
    pub pending: Option<Value>,
    /// `1` when the key is staged for deletion.
    #[serde(default)]
    pub delete: Option<u8>,
}

impl PendingChange {
    /// True when this row actually stages a change.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some() || self.delete.unwrap_or(0) != 0
    }
}

/// One row of `/pools`.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolRow {
    pub poolid: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// One row of `/cluster/resources?type=vm`.
#[derive(Debug, Clone, Deserialize)]
pub struct GuestResource {
    pub vmid: u32,
    #[serde(rename = "type")]
    pub guest_type: String,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default)]
    pub hastate: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_detection() {
        let rows: Vec<PendingChange> = serde_json::from_value(serde_json::json!([
            {"key": "memory", "value": 2048, "pending": 4096},
            {"key": "sockets", "value": 1},
            {"key": "tablet", "value": 1, "delete": 1}
        ]))
        .unwrap();
        assert!(rows[0].is_pending());
        assert!(!rows[1].is_pending());
        assert!(rows[2].is_pending());
    }

    #[test]
    fn test_status_lock() {
        let status: VmStatusCurrent = serde_json::from_value(serde_json::json!({
            "status": "running",
            "lock": "clone"
        }))
        .unwrap();
        assert!(status.is_running());
        assert_eq!(status.lock.as_deref(), Some("clone"));
    }
}
