pub mod args;
pub mod commands;
pub mod repl;

pub use args::{print_completions, Cli};
pub use repl::{run, VerbosityToggle};
