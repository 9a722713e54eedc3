//! Filesystem and socket helpers shared by the server and the CLI

pub mod path;
pub mod socket;
