//! `neobuild` command line: loads the host configuration, submits the
//! requested targets through the async bridge and waits for the result.

pub mod app;
mod logging;

pub use logging::init_logging;
