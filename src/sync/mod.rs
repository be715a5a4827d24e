//! State synchronization - Polls the simulation server and applies updates.
//!
//! ```text
//!  simulation server (HTTP + JSON)
//!          ↓  GET per resource
//! ┌─────────────────────────────────────────┐
//! │  PollLoop (one task per resource)       │
//! │  AwaitingResponse ⇄ Sleeping            │
//! └─────────────────────────────────────────┘
//!          ↓  decoded batch
//! ┌─────────────────────────────────────────┐
//! │  StateSyncClient                        │
//! │  resolve(id) → Handle → apply update    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! [`SyncDriver`] owns all loops and cancels them on shutdown or drop.

mod client;
mod driver;
mod poll_loop;

pub use client::{ApplyReport, StateSyncClient};
pub use driver::SyncDriver;
pub use poll_loop::{PollLoop, PollState, PollStatus};
