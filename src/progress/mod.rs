pub mod lessons;
pub mod timer;
