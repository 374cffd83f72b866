//! State synchronization for a course-scheduling client.
//!
//! Tracks per-term course cards, filters and sorts their sections, builds
//! schedule generation requests, and autosaves the cards to a remote
//! session store through a keyed debounce scheduler.

pub mod autosave;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod request;
pub mod sections;
pub mod state;
pub mod throttle;

pub use autosave::{Autosave, SaveState};
pub use client::{ApiClient, CourseApi};
pub use config::SyncConfig;
pub use error::{SyncError, ValidationError};
