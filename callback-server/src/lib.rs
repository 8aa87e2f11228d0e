//! HTTP dispatch server for a UPnP control point.
//!
//! A control point needs to be reachable by the devices it talks to: GENA
//! event notifications arrive as `NOTIFY` requests on callback URLs, and
//! renderers pull local media over plain HTTP GET. This crate provides one
//! listener for both.
//!
//! # Overview
//!
//! - [`DispatchServer`]: binds a port from a configured range, owns the
//!   listener lifecycle ([`ServerState`]) and handles requests one at a time.
//! - [`Registry`]: exact-path tables of [`EventHandler`]s and published media
//!   files. Event handlers win when both claim a path.
//! - [`EventNotification`]: a validated NOTIFY with its property set and
//!   decoded LastChange instances.
//! - [`DispatchFailure`]: everything that goes wrong while dispatching,
//!   delivered on a channel instead of stopping the server.
//!
//! # Example
//!
//! ```no_run
//! use callback_server::{CallbackServerConfig, DispatchServer, EventNotification};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), callback_server::ServerError> {
//!     let (failure_tx, mut failure_rx) = mpsc::unbounded_channel();
//!     let mut server = DispatchServer::new(CallbackServerConfig::default(), failure_tx)?;
//!     server.start().await?;
//!
//!     // Publish a file for a renderer
//!     let url = server.add_media("/music/track.flac").await?;
//!     println!("SetAVTransportURI with {url}");
//!
//!     // Receive notifications for one subscription
//!     server
//!         .register_event_handler("/events/rendering", |n: EventNotification| {
//!             for instance in &n.changes {
//!                 if let Some(volume) = instance.property("Volume") {
//!                     println!("volume is now {:?}", volume.value());
//!                 }
//!             }
//!         })
//!         .await;
//!
//!     tokio::spawn(async move {
//!         while let Some(failure) = failure_rx.recv().await {
//!             eprintln!("dispatch failure: {failure}");
//!         }
//!     });
//!
//!     // server.stop().await;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
pub mod failure;
pub mod media;
pub mod router;
mod server;

pub use config::CallbackServerConfig;
pub use error::ServerError;
pub use failure::{DispatchFailure, FailureKind, RequestSummary};
pub use media::{media_path_for, MediaEntry};
pub use router::{EventHandler, EventNotification, Registry};
pub use server::{DispatchServer, ServerState};
