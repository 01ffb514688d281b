// Command-line front end

pub mod repl;

pub use repl::Repl;
