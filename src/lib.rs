// Library interface for the rsh shell and remote server
// This allows the binary, benchmarks and tests to share the modules

pub mod builtins;
pub mod daemon;
pub mod error;
pub mod executor;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod session;
pub mod signal;
