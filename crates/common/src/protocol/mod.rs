pub mod actions;
pub mod envelope;

pub use envelope::{Envelope, Status};
