//! World-state model and sync orchestration between `worldsync-api` and
//! consumers (CLI, visualizers).
//!
//! - **[`WorldSync`]** - Lifecycle facade: [`start()`](WorldSync::start)
//!   loads an initial snapshot, spawns the message bridge, the highlight
//!   decay sweep and the poller, then connects the transport.
//!   [`stop()`](WorldSync::stop) tears all of it down.
//!
//! - **[`WorldStore`]** - Current snapshot, its summaries, freshness and
//!   highlights, published through `tokio::sync::watch` channels and vended
//!   as [`WorldStream<T>`] subscriptions. Delta batches go out on a
//!   broadcast channel.
//!
//! - **Summarizer / delta engine** - [`summarize_snapshot`] normalizes raw
//!   entities into [`EntitySummary`] values; [`compute_world_deltas`] turns
//!   two summary maps into typed [`Delta`] records.
//!
//! - **[`HighlightTracker`]** - Recently changed entity ids with TTL decay.
//!
//! - **[`SnapshotSource`]** - Where snapshots come from: the REST endpoint
//!   ([`HttpSnapshotSource`]) or fixed data ([`StaticSnapshotSource`]).

pub mod config;
pub mod delta;
pub mod demo;
pub mod error;
pub mod highlight;
pub mod model;
pub mod refresh;
pub mod source;
pub mod store;
pub mod stream;
pub mod summarize;
pub mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{REFRESH_PRESETS, SyncConfig};
pub use delta::{POSITION_TOLERANCE, compute_world_deltas};
pub use demo::demo_snapshot;
pub use error::CoreError;
pub use highlight::{HighlightEntry, HighlightMap, HighlightTracker};
pub use model::{
    Delta, DeltaKind, EntitySummary, Freshness, Position, SummaryMap,
};
pub use refresh::{RefreshOutcome, RefreshTrigger};
pub use source::{HttpSnapshotSource, SnapshotSource, StaticSnapshotSource};
pub use store::WorldStore;
pub use stream::WorldStream;
pub use summarize::{summarize_entity, summarize_snapshot};
pub use sync::{TaskPurpose, WorldSync};

// Wire types consumers need alongside the core API.
pub use worldsync_api::transport::{ConnectionState, ReconnectConfig};
pub use worldsync_api::{RawEdge, RawEntity, WorldSnapshot};
