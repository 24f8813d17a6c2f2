use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use llm_core::api::ApiChatResponse;
use llm_core::BackendError;
use serde_json::Value;

/// Splits a response body into newline-delimited records.
pub(crate) fn ndjson_lines<S, E>(body: S) -> impl Stream<Item = Result<Bytes, BackendError>>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BackendError>,
{
    async_stream::stream! {
        let mut body = Box::pin(body);
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(b) => {
                    buf.extend_from_slice(&b);
                    while let Some(pos) = twoway::find_bytes(&buf, b"\n") {
                        let line = buf.split_to(pos + 1).freeze();
                        yield Ok(line);
                    }
                }
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            }
        }
        if !buf.is_empty() {
            yield Ok(buf.freeze());
        }
    }
}

/// Parses one record of a chat reply. Blank records yield `None`; records
/// carrying an `error` field become errors.
pub(crate) fn parse_chat_line(line: &[u8]) -> Result<Option<ApiChatResponse>, BackendError> {
    let text = std::str::from_utf8(line).map_err(|e| BackendError::Decode(e.to_string()))?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let v: Value = serde_json::from_str(text).map_err(|e| BackendError::Decode(e.to_string()))?;
    if let Some(err) = v.get("error").and_then(Value::as_str) {
        return Err(BackendError::Other(err.to_string()));
    }
    serde_json::from_value(v)
        .map(Some)
        .map_err(|e| BackendError::Decode(e.to_string()))
}
