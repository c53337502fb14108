//! # Frame in flight
//! The Frame in flight system consists out of 3 main components:
//! * `SeedInFlight`: The seed is the configuration of the Frame in flight system and ensures different seeds are not
//!   mixed or matched. To construct it you must pass the amount of frames that may be in flight at maximum, so that other
//!   systems can allocate enough resources to support that many frames in flight. It may not exceed [`FRAMES_LIMIT`].
//! * `FrameInFlight`: The index of the frame slot the CPU is currently populating. Only the
//!   [`FrameOrchestrator`] hands these out while drawing, as two frames with the same index must never be written while
//!   the GPU may still read the older one.
//! * `ResourceInFlight`: A resource that is allocated once per frame that may be in flight at the same time.
//!   `FrameInFlight` is used to index into the `ResourceInFlight` to get the replica of that particular frame.
//!
//! Every component stores the seed it was constructed with and asserts it is accessed with the same seed, which allows
//! indexing without bounds checks:
//! * `SeedInFlight.frames_in_flight <= FRAMES_LIMIT` checked during Seed construction
//! * `FrameInFlight.index < SeedInFlight.frames_in_flight` checked during `FrameInFlight` construction
//!
//! [`FrameOrchestrator`]: crate::orchestrator::FrameOrchestrator

mod frame;
mod resource;

pub use frame::*;
pub use resource::*;

/// Maximum amount of frames that may be in flight at the same time.
pub const FRAMES_LIMIT: u32 = 4;

/// Inline storage size of [`ResourceInFlight`], must be at least [`FRAMES_LIMIT`].
pub const FRAMES_SMALLVEC: usize = FRAMES_LIMIT as usize;
