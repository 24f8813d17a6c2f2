use anyhow::{Context, Result};
use bytes::Bytes;
use futures::{stream::FuturesUnordered, SinkExt, StreamExt};
use llm_core::codec;
use llm_core::wire::Action;
use llm_core::{CancellationToken, Dispatcher, LlmAdaptor};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, error, info, warn};

/// Reads length-delimited msgpack [`Action`]s from `reader` and writes one
/// reply frame per action to `writer`, in completion order.
///
/// Actions run concurrently. Once the input ends or `cancel` fires, in-flight
/// actions are cancelled and drained before returning.
pub async fn serve<A, R, W>(
    dispatcher: &Dispatcher<A>,
    reader: R,
    writer: W,
    cancel: &CancellationToken,
) -> Result<()>
where
    A: LlmAdaptor,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut frames = FramedRead::new(reader, LengthDelimitedCodec::new());
    let mut sink = FramedWrite::new(writer, LengthDelimitedCodec::new());
    let mut in_flight = FuturesUnordered::new();
    let mut reading = true;

    info!(target: "provider", "provider loop started");
    loop {
        if !reading && in_flight.is_empty() {
            break;
        }
        tokio::select! {
            frame = frames.next(), if reading => match frame {
                Some(Ok(buf)) => match codec::decode_strict::<Action>(&buf) {
                    Ok(action) => {
                        debug!(
                            target: "provider",
                            id = action.id,
                            operation = %action.operation,
                            "action received"
                        );
                        in_flight.push(async move {
                            dispatcher.handle_action(cancel, &action).await
                        });
                    }
                    Err(e) => warn!(target: "provider", "dropping undecodable frame: {}", e),
                },
                Some(Err(e)) => {
                    error!(target: "provider", "read frame: {}", e);
                    reading = false;
                    cancel.cancel();
                }
                None => {
                    info!(target: "provider", "input closed");
                    reading = false;
                    cancel.cancel();
                }
            },
            Some(resp) = in_flight.next() => {
                match codec::encode(&resp) {
                    Ok(buf) => sink.send(Bytes::from(buf)).await.context("write reply")?,
                    Err(e) => error!(target: "provider", id = resp.id, "encode reply: {}", e),
                }
            }
            _ = cancel.cancelled(), if reading => {
                info!(target: "provider", "shutdown requested");
                reading = false;
            }
            else => break,
        }
    }
    info!(target: "provider", "provider loop stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_core::api::{
        ApiChatRequest, ApiChatResponse, ApiListResponse, ApiMessage, ApiShowRequest,
        ApiShowResponse,
    };
    use llm_core::wire::{
        ChatRequest, ChatResponse, ListResponse, ProviderActionResponse, ProviderResponse,
        StatusError, OP_CHAT, OP_LIST,
    };
    use llm_core::{BackendError, ChatResponseFn};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    /// Answers chat immediately; list blocks until cancelled.
    struct SlowList;

    impl LlmAdaptor for SlowList {
        async fn chat(
            &self,
            _cancel: &CancellationToken,
            req: &ApiChatRequest,
            f: &mut ChatResponseFn<'_>,
        ) -> Result<(), BackendError> {
            f(ApiChatResponse {
                model: req.model.clone(),
                message: ApiMessage {
                    role: "assistant".into(),
                    content: "ok".into(),
                },
                done: true,
                ..Default::default()
            })
        }

        async fn show(
            &self,
            _cancel: &CancellationToken,
            _req: &ApiShowRequest,
        ) -> Result<ApiShowResponse, BackendError> {
            Ok(ApiShowResponse::default())
        }

        async fn list(&self, cancel: &CancellationToken) -> Result<ApiListResponse, BackendError> {
            cancel.cancelled().await;
            Err(BackendError::Canceled)
        }
    }

    fn frame(action: &Action) -> Vec<u8> {
        let body = codec::encode(action).unwrap();
        let mut out = (body.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(&body);
        out
    }

    async fn read_replies(buf: Vec<u8>) -> Vec<ProviderResponse> {
        let mut frames = FramedRead::new(&buf[..], LengthDelimitedCodec::new());
        let mut out = Vec::new();
        while let Some(f) = frames.next().await {
            out.push(codec::decode_strict(&f.unwrap()).unwrap());
        }
        out
    }

    fn decode_reply<T: serde::de::DeserializeOwned>(msg: &[u8]) -> Result<T, StatusError> {
        codec::decode_strict::<ProviderActionResponse<T>>(msg)
            .unwrap()
            .into_result()
    }

    #[tokio::test]
    async fn replies_are_tagged_with_action_ids() {
        let dispatcher = Dispatcher::new(SlowList);
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let (server_read, _server_write) = tokio::io::split(server);
        let mut out = Vec::new();
        let cancel = CancellationToken::new();

        let chat = ChatRequest {
            model: "m1".into(),
            ..Default::default()
        };
        client
            .write_all(&frame(&Action {
                id: 1,
                operation: OP_LIST.into(),
                msg: Bytes::new(),
            }))
            .await
            .unwrap();
        client
            .write_all(&frame(&Action {
                id: 2,
                operation: OP_CHAT.into(),
                msg: codec::encode(&chat).unwrap().into(),
            }))
            .await
            .unwrap();
        client.write_all(&[0, 0, 0, 2, 0xc1, 0xc1]).await.unwrap();
        client
            .write_all(&frame(&Action {
                id: 3,
                operation: "Llm.Pull".into(),
                msg: Bytes::new(),
            }))
            .await
            .unwrap();
        drop(client);

        tokio::time::timeout(
            Duration::from_secs(5),
            serve(&dispatcher, server_read, &mut out, &cancel),
        )
        .await
        .unwrap()
        .unwrap();

        let replies = read_replies(out).await;
        assert_eq!(replies.len(), 3);
        let by_id = |id: u64| replies.iter().find(|r| r.id == id).unwrap();

        let chat = decode_reply::<ChatResponse>(&by_id(2).msg).unwrap();
        assert_eq!(chat.message.content, "ok");

        // the blocked list call was cancelled when input closed
        let list = decode_reply::<ListResponse>(&by_id(1).msg).unwrap_err();
        assert_eq!(list.error, "canceled");

        let unknown = decode_reply::<ListResponse>(&by_id(3).msg).unwrap_err();
        assert_eq!(unknown.error, "Invalid method name: Llm.Pull");
    }

    #[tokio::test]
    async fn external_cancel_stops_the_loop() {
        let dispatcher = Dispatcher::new(SlowList);
        let (_client, server) = tokio::io::duplex(1024);
        let (server_read, _server_write) = tokio::io::split(server);
        let mut out = Vec::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        tokio::time::timeout(
            Duration::from_secs(5),
            serve(&dispatcher, server_read, &mut out, &cancel),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(out.is_empty());
    }
}
