//! Supabase Realtime change feed.
//!
//! ```text
//!  Realtime server ──postgres_changes──▶ ChannelTask (one tokio task per channel)
//!                                          │  RawChange
//!                                          ▼
//!                                     ChangeCallback
//!                                          │
//!                                          ▼
//!                               ChangeRouter::route → on_insert / on_update / on_delete
//! ```

pub mod channel;
pub mod client;
pub mod events;
pub mod protocol;
pub mod router;

pub use channel::{ChangeCallback, ChannelOptions};
pub use client::{RealtimeClient, Subscription};
pub use events::{ChangeTarget, EventFilter, RawChange};
pub use router::ChangeRouter;
