mod audit_log;
mod payment;
mod router;
mod subscriber;

pub use audit_log::*;
pub use payment::*;
pub use router::*;
pub use subscriber::*;
