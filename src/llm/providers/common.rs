// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use futures::StreamExt;
use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::error::{ApiError, Result, UnfoldError};
use crate::llm::provider::{EventStream, StreamEvent};

/// Parse token counts from an arbitrary message by extracting the first numeric tokens.
pub(crate) fn parse_numeric_token_counts(message: &str) -> (u32, u32) {
    let numbers: Vec<u32> = message
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|s| s.parse().ok())
        .collect();

    match numbers.as_slice() {
        [current, limit, ..] => (*current, *limit),
        [single] => (*single, 0),
        _ => (0, 0),
    }
}

/// Parse numeric Retry-After header (seconds).
pub(crate) fn parse_retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
}

/// Construct a standardized server error.
pub(crate) fn server_error(status: u16, message: impl Into<String>) -> UnfoldError {
    UnfoldError::Api(ApiError::ServerError {
        status,
        message: message.into(),
    })
}

/// Split a byte stream into SSE records on `delimiter` and parse each record
/// with `parse`, which may emit zero or more events per record.
pub(crate) fn sse_event_stream<F>(
    response: reqwest::Response,
    delimiter: &'static str,
    mut parse: F,
) -> EventStream
where
    F: FnMut(&str) -> Vec<StreamEvent> + Send + 'static,
{
    let event_stream = response
        .bytes_stream()
        .map(|result| result.map_err(|e| UnfoldError::Api(ApiError::StreamError(e.to_string()))))
        .scan(String::new(), move |buffer, result| {
            let chunk = match result {
                Ok(bytes) => String::from_utf8_lossy(&bytes).replace("\r\n", "\n"),
                Err(e) => return futures::future::ready(Some(vec![Err(e)])),
            };

            buffer.push_str(&chunk);

            let mut events = Vec::new();
            while let Some(pos) = buffer.find(delimiter) {
                let record = buffer[..pos].to_string();
                *buffer = buffer[pos + delimiter.len()..].to_string();
                events.extend(parse(&record).into_iter().map(Ok));
            }

            futures::future::ready(Some(events))
        })
        .flat_map(futures::stream::iter);

    Box::pin(event_stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric_token_counts() {
        assert_eq!(
            parse_numeric_token_counts("prompt is too long: 215300 tokens > 200000 maximum"),
            (215300, 200000)
        );
        assert_eq!(parse_numeric_token_counts("limit 42"), (42, 0));
        assert_eq!(parse_numeric_token_counts("no numbers"), (0, 0));
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after_seconds(&headers), None);
        headers.insert(RETRY_AFTER, "30".parse().unwrap());
        assert_eq!(parse_retry_after_seconds(&headers), Some(30));
    }

    #[test]
    fn test_server_error() {
        let err = server_error(502, "bad gateway");
        assert!(matches!(
            err,
            UnfoldError::Api(ApiError::ServerError { status: 502, .. })
        ));
    }
}
