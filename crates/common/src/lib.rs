// tandem-common: patch engine, document paths and wire types shared by the
// relay and its clients.

pub mod diff;
pub mod path;
pub mod protocol;
pub mod types;
