//! Terrain pipeline error types.

/// Errors from submitting work to the terrain pools.
///
/// Missing elevation data is not an error; it arrives as
/// [`ElevationResponse::NotExists`](crate::ElevationResponse::NotExists).
#[derive(Debug, thiserror::Error)]
pub enum TerrainError {
    /// The bounded request queue is full; retry on a later frame.
    #[error("terrain request queue is full ({0} in flight)")]
    QueueFull(u64),

    /// All worker threads have exited.
    #[error("terrain worker pool has shut down")]
    Disconnected,
}
