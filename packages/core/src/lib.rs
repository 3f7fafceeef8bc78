//! ldapflow Core — DN key space, operation contracts, and result codes
//! shared between the routing engine and its callers.

pub mod dn;
pub mod result_code;
pub mod traits;

pub use dn::{Dn, DnParseError, Rdn};
pub use result_code::ResultCode;
pub use traits::{CancelRequest, CancelResult, ClientConnection, Operation};
