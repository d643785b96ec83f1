//! Server-rendered HTML for the chat page.
//!
//! The page is a plain form post with no client-side framework: a scrolling
//! message list, an optional failure notice and a single text input.

pub mod markdown;
pub mod page;

pub use markdown::{escape_html, render_markdown};
pub use page::ChatPage;
