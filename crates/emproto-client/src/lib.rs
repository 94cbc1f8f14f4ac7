//! # EM Protocol Client
//!
//! This crate provides the protocol engine for EM-family AC charging
//! stations: a communicator that discovers EVSEs by listening on the
//! protocol's UDP port, keeps a live mirror of each device's state,
//! maintains login sessions, and issues commands (start/stop charging,
//! get/set configuration).
//!
//! ```no_run
//! use emproto_client::EmCommunicator;
//! use emproto_types::EventKind;
//!
//! # async fn run() -> emproto_types::EmResult<()> {
//! let communicator = EmCommunicator::new("my-app", false);
//! communicator.start().await?;
//!
//! let mut watcher = communicator.watch(None, &[EventKind::EvseAdded], 16);
//! while let Some(event) = watcher.recv().await {
//!     println!("discovered EVSE {}", event.evse.serial());
//! }
//! # Ok(())
//! # }
//! ```

pub mod communicator;
pub mod events;
pub mod evse;
mod handlers;
mod registry;

pub use communicator::{CommunicatorConfig, EmCommunicator};
pub use events::{Event, EventWatcher};
pub use evse::Evse;

pub use emproto_types as types;
