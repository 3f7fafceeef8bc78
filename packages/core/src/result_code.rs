//! The subset of LDAP result codes the routing and dispatch core's callers
//! need: a routing miss becomes `NoSuchObject`, an honored cancellation
//! becomes `Canceled`.

use std::fmt;

/// LDAP result codes used at the routing/dispatch boundary, with their
/// numeric protocol values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    /// The target DN is not covered by any registered workflow or entry.
    NoSuchObject,
    Busy,
    UnwillingToPerform,
    /// The operation was canceled before or during execution.
    Canceled,
    /// Any other protocol result code, carried numerically.
    Other(u16),
}

impl ResultCode {
    /// The numeric value used on the wire.
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::Success => 0,
            Self::NoSuchObject => 32,
            Self::Busy => 51,
            Self::UnwillingToPerform => 53,
            Self::Canceled => 118,
            Self::Other(code) => code,
        }
    }

    /// Maps a numeric value back to a result code.
    #[must_use]
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => Self::Success,
            32 => Self::NoSuchObject,
            51 => Self::Busy,
            53 => Self::UnwillingToPerform,
            118 => Self::Canceled,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::NoSuchObject => "no such object",
            Self::Busy => "busy",
            Self::UnwillingToPerform => "unwilling to perform",
            Self::Canceled => "canceled",
            Self::Other(code) => return write!(f, "result code {code}"),
        };
        f.write_str(name)
    }
}
