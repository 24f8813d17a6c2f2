use tokio_util::sync::CancellationToken;

use crate::api::{
    ApiChatRequest, ApiChatResponse, ApiListResponse, ApiShowRequest, ApiShowResponse,
};
use crate::errors::BackendError;

/// Receives each (possibly partial) chat response in order. Returning an
/// error aborts the call and the error is returned from [`LlmAdaptor::chat`].
pub type ChatResponseFn<'a> = dyn FnMut(ApiChatResponse) -> Result<(), BackendError> + Send + 'a;

/// The operations an inference backend must support.
///
/// Implementations must return [`BackendError::Canceled`] promptly once
/// `cancel` fires, and must never run the chat callback concurrently with
/// itself.
#[allow(async_fn_in_trait)]
pub trait LlmAdaptor: Send + Sync {
    async fn chat(
        &self,
        cancel: &CancellationToken,
        req: &ApiChatRequest,
        f: &mut ChatResponseFn<'_>,
    ) -> Result<(), BackendError>;

    async fn show(
        &self,
        cancel: &CancellationToken,
        req: &ApiShowRequest,
    ) -> Result<ApiShowResponse, BackendError>;

    async fn list(&self, cancel: &CancellationToken) -> Result<ApiListResponse, BackendError>;
}
