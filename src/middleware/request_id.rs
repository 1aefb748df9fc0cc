use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_ID_LEN: usize = 64;

/// Correlates one webhook call end to end: reuse the caller's request id
/// when it is well-formed, mint one otherwise, run the handler inside a
/// span carrying it, and echo it back on the response.
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id =
        incoming_id(&req).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = std::time::Instant::now();

    let span = tracing::info_span!("request", request_id = %request_id);
    let mut response = next.run(req).instrument(span).await;

    tracing::info!(
        request_id = %request_id,
        %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// 只接受受限字符集内的外部 ID，其余丢弃并重新生成，避免日志注入
fn incoming_id(req: &Request) -> Option<String> {
    let raw = req.headers().get(REQUEST_ID_HEADER)?.to_str().ok()?;
    let well_formed = (1..=MAX_ID_LEN).contains(&raw.len())
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    well_formed.then(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    fn request_with_id(id: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/webhook");
        if let Some(id) = id {
            builder = builder.header(REQUEST_ID_HEADER, id);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn well_formed_ids_are_reused() {
        let req = request_with_id(Some("abc-123_DEF"));
        assert_eq!(incoming_id(&req).as_deref(), Some("abc-123_DEF"));
    }

    #[test]
    fn missing_header_yields_none() {
        assert!(incoming_id(&request_with_id(None)).is_none());
    }

    #[test]
    fn hostile_or_oversized_ids_are_dropped() {
        let long = "x".repeat(MAX_ID_LEN + 1);
        for bad in ["", "has space", "semi;colon", long.as_str()] {
            let req = request_with_id(Some(bad));
            assert!(incoming_id(&req).is_none(), "accepted {bad:?}");
        }
    }
}
