//! Shared runtime plumbing for the Orbis renderer: synchronous event channels,
//! cooperative subsystem locks, and picking color allocation.

mod events;
mod lock;
mod picking;

pub use events::{EventChannel, ListenerId};
pub use lock::{Key, Lock, PlanetLocks};
pub use picking::{PickingColor, PickingRegistry};
