//! Session model: redacted secrets, Auth Service grants, user identity, and the installed record.

pub mod grant;
pub mod identity;
pub mod record;
pub mod secret;

pub use grant::*;
pub use identity::*;
pub use record::*;
pub use secret::*;
