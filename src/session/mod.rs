//! Session and conversation history management.
//!
//! This module provides in-memory session storage. Each session owns one
//! [`ConversationStore`] holding the model-facing turn log and the
//! user-facing display log. Nothing here survives a process restart.
//!
//! # Architecture
//!
//! - [`ConversationStore`]: append-only history for a single session
//! - [`Session`]: cheap handle to one session; exchanges on it run one at a time
//! - [`SessionStore`]: thread-safe registry of all live sessions
//!
//! # Example
//!
//! ```rust
//! use diagnosa::session::SessionStore;
//!
//! let store = SessionStore::default();
//! let session = store.initialize("tab-1");
//! session.conversation().append_user("01/01");
//!
//! let display = session.display();
//! assert_eq!(display.len(), 2);
//! ```

mod conversation;
mod store;

pub use conversation::{
    ConversationStore, DEFAULT_GREETING, DEFAULT_INSTRUCTION, DisplayEntry, DisplayRole,
    PrimingPair,
};
pub use store::{DEFAULT_IDLE_TIMEOUT, ExchangeSlot, Session, SessionStore};
