pub mod audit;
pub mod progress;
pub mod user;
