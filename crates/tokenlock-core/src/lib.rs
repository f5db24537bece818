//! Physical-key session unlocking.
//!
//! A random per-user secret is written raw to the start of a removable block
//! device and recorded in a keyfile. Presenting the device later identifies
//! its owner; if that owner holds the single active login session, the key is
//! rotated and the session unlocked.

pub mod audit;
pub mod crypto;
pub mod device;
pub mod error;
pub mod inventory;
pub mod issuer;
pub mod manager;
pub mod matcher;
pub mod paths;
pub mod session;
pub mod settings;
pub mod store;
pub mod unlock;

pub use error::{Error, Result};
pub use manager::KeyManager;
pub use settings::KeySettings;
