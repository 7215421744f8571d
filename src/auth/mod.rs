pub mod accounts;
pub mod fingerprint;
pub mod hash;
pub mod session_manager;
