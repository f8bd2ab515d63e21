//! # stategraph-cli
//!
//! Run the prebuilt agents against mock collaborators and inspect the
//! checkpoint database they write.
//!
//! ```text
//! stategraph [--config FILE] chat --thread ID [--db URL]
//! stategraph [--config FILE] task --task TEXT --criteria TEXT [--thread ID] [--db URL]
//! stategraph [--config FILE] threads [--db URL]
//! stategraph [--config FILE] history --thread ID [--db URL]
//! stategraph graph --agent chat|tools|worker
//! ```

pub mod commands;
pub mod config;

pub use commands::AgentKind;
pub use config::{open_checkpointer, CliConfig};
