//! Action protocol for exposing a local inference backend (chat, show, list)
//! to a host runtime.

pub mod adaptor;
pub mod api;
pub mod caller;
pub mod codec;
pub mod dispatch;
pub mod errors;
pub mod translate;
pub mod wire;

#[cfg(test)]
mod testing;

pub use adaptor::{ChatResponseFn, LlmAdaptor};
pub use dispatch::Dispatcher;
pub use errors::BackendError;
pub use tokio_util::sync::CancellationToken;
