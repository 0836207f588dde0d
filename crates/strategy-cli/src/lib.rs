//! Demo CLI driving one turn of the strategy orchestration core end to end
//! against the scripted doubles in `strategy-testing`, trimmed from
//! `agtrace-cli`'s much larger multi-namespace surface down to the single
//! operation this core actually exposes to a terminal.

mod args;
mod commands;

pub use args::{Cli, Commands, OutputFormat};
pub use commands::run;
