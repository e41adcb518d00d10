use thiserror::Error;

/// Errors surfaced by [`Engine`](crate::Engine) entry points.
///
/// Most misuse (vacated handles, scheduling nonsense) is deliberately a
/// no-op rather than an error; only conditions the caller can meaningfully
/// react to are reported.
#[derive(Debug, Error)]
pub enum Error {
    /// `start` was called while the engine was already running a coroutine
    /// program on this thread.
    #[error("engine is already running")]
    AlreadyRunning,
}
