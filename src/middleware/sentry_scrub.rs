use sentry::protocol::{Event, Request as SentryRequest};
use std::sync::Arc;

use super::http_logger::is_sensitive_key;

/// Query keys that carry credentials (Gemini takes its key in the URL)
const SENSITIVE_QUERY_KEYS: &[&str] = &["key", "api_key", "token", "signature"];

/// Scrubs sensitive data from Sentry events before sending
pub fn scrub_sensitive_data(mut event: Event<'static>) -> Option<Event<'static>> {
    if let Some(request) = &mut event.request {
        scrub_request(request);
    }

    event.extra.retain(|k, _| !is_sensitive_key(k));

    for (_key, context) in event.contexts.iter_mut() {
        if let sentry::protocol::Context::Other(map) = context {
            map.retain(|k, _| !is_sensitive_key(k));
        }
    }

    for breadcrumb in event.breadcrumbs.values.iter_mut() {
        breadcrumb.data.retain(|k, _| !is_sensitive_key(k));
    }

    Some(event)
}

fn scrub_request(request: &mut SentryRequest) {
    for (name, value) in request.headers.iter_mut() {
        if is_sensitive_key(name) {
            *value = "[REDACTED]".to_string();
        }
    }

    if let Some(query_string) = &request.query_string {
        request.query_string = Some(scrub_query_string(query_string));
    }

    if let Some(data_str) = &request.data {
        if data_str.len() > 1024 || is_sensitive_key(data_str) {
            request.data = Some("[REDACTED - Contains sensitive or bulk data]".to_string());
        }
    }
}

fn scrub_query_string(query: &str) -> String {
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((k, _)) if SENSITIVE_QUERY_KEYS.contains(&k.to_lowercase().as_str()) => {
                format!("{k}=[REDACTED]")
            }
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Creates the `before_send` hook for Sentry ClientOptions
pub fn create_before_send() -> Arc<dyn Fn(Event<'static>) -> Option<Event<'static>> + Send + Sync>
{
    Arc::new(scrub_sensitive_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrub_query_string() {
        assert_eq!(
            scrub_query_string("key=AIza123&alt=json"),
            "key=[REDACTED]&alt=json"
        );
        assert_eq!(scrub_query_string("format=png"), "format=png");
    }

    #[test]
    fn test_scrub_event_request() {
        let mut event = Event::new();
        let mut request = SentryRequest::default();
        request
            .headers
            .insert("Authorization".to_string(), "Bearer r8_abc".to_string());
        request
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        request.query_string = Some("key=secret".to_string());
        event.request = Some(request);
        event
            .extra
            .insert("api_secret".to_string(), serde_json::json!("shh"));

        let event = scrub_sensitive_data(event).unwrap();
        let request = event.request.unwrap();

        assert_eq!(request.headers["Authorization"], "[REDACTED]");
        assert_eq!(request.headers["content-type"], "application/json");
        assert_eq!(request.query_string.as_deref(), Some("key=[REDACTED]"));
        assert!(event.extra.is_empty());
    }
}
