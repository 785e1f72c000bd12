//! Client core for a document-question-answering chat application.
//!
//! The crate models the browser-side presentation layer of such an app as a
//! headless library: a message transcript, file attachments with a per-file
//! upload lifecycle, multi-session history mirrored between a local JSON
//! cache and a remote history service, and the send pipeline tying them
//! together. Rendering is left to the embedder; the [`view`] module exposes
//! pure render state instead of widgets.

pub mod api;
pub mod config;
pub mod controllers;
pub mod logging;
pub mod models;
pub mod repositories;
pub mod services;
pub mod view;

pub use api::BackendClient;
pub use config::ClientConfig;
pub use controllers::{ChatController, SendOutcome};
pub use models::AppState;
pub use repositories::{InMemorySessionCache, JsonSessionCache, SessionStore};
