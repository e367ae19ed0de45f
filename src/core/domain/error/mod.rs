use thiserror::Error;

/// Result type alias for Proxmox operations.
pub type ProxmoxResult<T> = Result<T, ProxmoxError>;

/// Enumeration of possible errors.
///
/// Each variant corresponds to one recovery class: validation errors are
/// raised before any mutation happens, `VmLocked` may be retried later,
/// `UnableToUpdateWithoutReboot` leaves the choice of stopping the guest to
/// the caller, and `TaskFailed` carries the terminal `exitstatus` reported by
/// the node.
#[derive(Debug, Error)]
pub enum ProxmoxError {
    /// Local validation failed; no request was sent.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Authentication error (invalid credentials, expired ticket, 401/403).
    #[error("authentication error: {0}")]
    Authentication(String),

    /// The guest still reported a lock after all refresh retries.
    #[error("vm {vm_id} is locked ({lock})")]
    VmLocked { vm_id: u32, lock: String },

    /// A reboot is required to apply the change set but the caller asked us
    /// not to reboot.
    #[error("unable to update vm without rebooting")]
    UnableToUpdateWithoutReboot,

    /// An asynchronous task finished with a non-OK exit status.
    #[error("task {upid} failed: {exit_status}")]
    TaskFailed { upid: String, exit_status: String },

    /// Network failure, TLS failure or a 5xx response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The VM, node, pool or task does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The resource already exists (e.g. duplicate vmid on create).
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Validation-specific errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("cpu is required during creation")]
    CpuRequired,

    #[error("memory is required during creation")]
    MemoryRequired,

    #[error("field '{field}' is invalid: {message}")]
    Field { field: String, message: String },

    #[error("format error: {0}")]
    Format(String),

    #[error("constraint violation: {0}")]
    Constraint(String),
}

impl ValidationError {
    /// Shorthand for the common field/message case.
    pub(crate) fn field(field: &str, message: impl Into<String>) -> Self {
        ValidationError::Field {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ProxmoxError {
    fn from(err: serde_json::Error) -> Self {
        ProxmoxError::Transport(format!("malformed response body: {err}"))
    }
}

impl From<url::ParseError> for ProxmoxError {
    fn from(err: url::ParseError) -> Self {
        ProxmoxError::Validation(ValidationError::Format(err.to_string()))
    }
}
