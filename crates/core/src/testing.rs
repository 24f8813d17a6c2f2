use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use crate::adaptor::{ChatResponseFn, LlmAdaptor};
use crate::api::{
    ApiChatRequest, ApiChatResponse, ApiListResponse, ApiShowRequest, ApiShowResponse,
};
use crate::errors::BackendError;

/// Scripted backend that counts invocations.
pub(crate) struct SpyAdaptor {
    pub calls: AtomicUsize,
    pub chunks: Vec<ApiChatResponse>,
    pub chat_err: Option<BackendError>,
    pub show: Result<ApiShowResponse, BackendError>,
    pub list: Result<ApiListResponse, BackendError>,
    pub seen_chat: Mutex<Option<ApiChatRequest>>,
}

impl Default for SpyAdaptor {
    fn default() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            chunks: Vec::new(),
            chat_err: None,
            show: Ok(ApiShowResponse::default()),
            list: Ok(ApiListResponse::default()),
            seen_chat: Mutex::new(None),
        }
    }
}

impl SpyAdaptor {
    fn enter(&self, cancel: &CancellationToken) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(BackendError::Canceled);
        }
        Ok(())
    }
}

impl LlmAdaptor for SpyAdaptor {
    async fn chat(
        &self,
        cancel: &CancellationToken,
        req: &ApiChatRequest,
        f: &mut ChatResponseFn<'_>,
    ) -> Result<(), BackendError> {
        self.enter(cancel)?;
        *self.seen_chat.lock().unwrap() = Some(req.clone());
        for chunk in &self.chunks {
            f(chunk.clone())?;
        }
        match &self.chat_err {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn show(
        &self,
        cancel: &CancellationToken,
        _req: &ApiShowRequest,
    ) -> Result<ApiShowResponse, BackendError> {
        self.enter(cancel)?;
        self.show.clone()
    }

    async fn list(&self, cancel: &CancellationToken) -> Result<ApiListResponse, BackendError> {
        self.enter(cancel)?;
        self.list.clone()
    }
}
