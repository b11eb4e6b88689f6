//! The single-page chat client served from `/`.
//!
//! Inlined CSS and JavaScript, embedded at compile time via `include_str!`.
//! It talks to `/session/new`, `/chat`, `/generate_brd/{id}` and
//! `/export_brd/{id}` on the same origin and renders streamed replies as
//! they arrive.

pub const CHAT_HTML: &str = include_str!("../assets/chat.html");
