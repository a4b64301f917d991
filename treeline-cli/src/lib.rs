//! Command line front end for the treeline clustering engines.

pub mod cli;
pub mod logging;
