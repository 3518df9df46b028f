pub mod config;
pub mod delegation;
pub mod document;
pub mod error;
pub mod lsp;
pub mod mapping;
pub mod sync;

pub use error::{UtsushiError, UtsushiResult};
pub use lsp::Utsushi;

/// Initialize `env_logger` writing to stderr, filtered by `RUST_LOG`
/// (default `info`). Stdout is reserved for the LSP stream.
///
/// Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .try_init();
}
