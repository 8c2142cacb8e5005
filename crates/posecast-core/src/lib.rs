//! # posecast-core
//!
//! Sampling loop, client registry and fan-out for the Posecast tracker
//! broadcaster.
//!
//! This crate provides the building blocks the server wires together:
//!
//! - **Ticker** - fixed-rate scheduling with reactive sleep correction
//! - **PoseSource** - the tracking driver interface, plus bundled sources
//! - **ClientRegistry** - connected sessions with snapshot iteration
//! - **Broadcaster** - per-tick fan-out that isolates failing sessions
//! - **PoseStreamer** - the sample, encode, broadcast tick
//! - **Relay** - client-to-client forwarding
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌─────────────┐   ┌────────────────┐
//! │  Ticker  │──▶│ PoseSource │──▶│ PoseEncoder │──▶│  Broadcaster   │
//! └──────────┘   └────────────┘   └─────────────┘   └────────────────┘
//!                                                           │ snapshot
//!                                                           ▼
//!                  connect / disconnect ──────────▶ ┌────────────────┐
//!                                                   │ ClientRegistry │
//!                                                   └────────────────┘
//! ```

pub mod broadcaster;
pub mod message;
pub mod registry;
pub mod relay;
pub mod session;
pub mod source;
pub mod streamer;
pub mod ticker;

pub use broadcaster::{BroadcastReport, Broadcaster};
pub use message::{Message, Payload};
pub use registry::ClientRegistry;
pub use relay::{Relay, RelayError};
pub use session::{ChannelSink, ClientSession, SendError, SessionId, SessionSink};
pub use source::{PlayArea, PoseSource, PoseSourceError, SimulatedPoseSource, StaticPoseSource};
pub use streamer::{PoseStreamer, StreamError, TickOutcome};
pub use ticker::{TickTiming, Ticker, TickerError, TickerStats};
