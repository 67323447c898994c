//! Error types for psample operations.

use std::io;

/// Result type for psample operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the psample family.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations (open, bind, send, receive, setsockopt).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Kernel returned an error code.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Kernel error with operation context.
    #[error("{operation}: {message} (errno {errno})")]
    KernelWithContext {
        /// The operation that failed.
        operation: String,
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Message was truncated.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected message length.
        expected: usize,
        /// Actual bytes received.
        actual: usize,
    },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid attribute format.
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    /// A record is missing a mandatory attribute.
    #[error("missing attribute: {name}")]
    MissingAttribute {
        /// Name of the absent attribute.
        name: &'static str,
    },

    /// Generic netlink family is not registered in the kernel.
    #[error("generic netlink family not found: {name}")]
    FamilyNotFound {
        /// The family name that was looked up.
        name: String,
    },

    /// Multicast group is not advertised by the family.
    #[error("multicast group not found: {name}")]
    GroupNotFound {
        /// The group name that was looked up.
        name: String,
    },

    /// Capture sink failure.
    #[error("capture error: {0}")]
    Capture(String),

    /// A capture operation was requested before `pcap_init`.
    #[error("capture not initialized")]
    CaptureNotInitialized,

    /// `pcap_init` was called twice without `pcap_fini`.
    #[error("capture already initialized")]
    CaptureAlreadyInitialized,
}

impl From<pcap_file::PcapError> for Error {
    fn from(err: pcap_file::PcapError) -> Self {
        match err {
            pcap_file::PcapError::IoError(e) => Self::Io(e),
            other => Self::Capture(other.to_string()),
        }
    }
}

impl Error {
    /// Create a kernel error from an errno value.
    pub fn from_errno(errno: i32) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::Kernel {
            errno: -errno,
            message,
        }
    }

    /// Add context to this error.
    ///
    /// Wraps kernel errors with operation context. Other errors are returned unchanged.
    pub fn with_context(self, operation: impl Into<String>) -> Self {
        match self {
            Self::Kernel { errno, message } => Self::KernelWithContext {
                operation: operation.into(),
                errno,
                message,
            },
            other => other,
        }
    }

    /// Check if this is a "not found" error (ENOENT, ENODEV, unknown family or group).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => {
                matches!(*errno, 2 | 19) // ENOENT=2, ENODEV=19
            }
            Self::FamilyNotFound { .. } | Self::GroupNotFound { .. } => true,
            _ => false,
        }
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        match self.errno() {
            Some(errno) => matches!(errno, 1 | 13), // EPERM=1, EACCES=13
            None => false,
        }
    }

    /// Check if a non-blocking receive found the queue empty.
    pub fn is_would_block(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::WouldBlock)
    }

    /// Check if this is a protocol validation failure for a single message.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAttribute(_)
                | Self::InvalidMessage(_)
                | Self::Truncated { .. }
                | Self::MissingAttribute { .. }
        )
    }

    /// Get the errno value for kernel and OS errors.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => Some(*errno),
            Self::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }
}
