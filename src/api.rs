use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time;
use tokio_stream::wrappers::{IntervalStream, ReceiverStream};
use tokio_stream::{Stream, StreamExt as _};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::feeds::memory::MemoryStore;
use crate::feeds::staleness;
use crate::history::{NewSavedNewsletter, NewsletterHistory, SavedNewsletter};
use crate::pipeline::{GenerationRequestBody, Orchestrator, RequestContext};
use crate::stream::event::encode;
use crate::stream::StreamEvent;

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
const KEEP_ALIVE_FRAME: &[u8] = b": keep-alive\n\n";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub store: Arc<MemoryStore>,
    pub history: Arc<NewsletterHistory>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/feeds", get(list_feeds))
        .route("/api/newsletter/generate", post(generate))
        .route("/api/newsletters", post(save_newsletter).get(list_newsletters))
        .route("/api/newsletters/{id}", get(get_newsletter))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(json!({ "error": msg.into() }))).into_response()
}

// ---------------- generation ----------------

async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<GenerationRequestBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return error_response(StatusCode::BAD_REQUEST, rej.body_text()),
    };
    let req = match body.validate() {
        Ok(r) => r,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, msg),
    };

    let ctx = RequestContext::from_headers(&headers);
    info!(
        target: "stream",
        request_id = %ctx.request_id,
        feeds = req.feed_ids.len(),
        "opening generation stream"
    );
    let rx = state.orchestrator.spawn(ctx, req);
    sse_response(rx)
}

/// Wrap the event receiver as a `text/event-stream` body. Dropping the body
/// (client disconnect) drops the receiver, which stops the pipeline.
fn sse_response(rx: mpsc::Receiver<StreamEvent>) -> Response {
    let frames = sse_frames(rx, KEEP_ALIVE_INTERVAL).map(Ok::<_, Infallible>);
    let mut resp = Response::new(Body::from_stream(frames));
    let h = resp.headers_mut();
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    h.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache, no-transform"));
    h.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    h.insert("x-accel-buffering", HeaderValue::from_static("no"));
    resp
}

/// Encoded events with a comment frame every `period` of silence, so proxies
/// keep the connection open during slow refreshes. Ends when the sender does.
fn sse_frames(rx: mpsc::Receiver<StreamEvent>, period: Duration) -> impl Stream<Item = Bytes> {
    let events = ReceiverStream::new(rx)
        .map(|ev| Some(Bytes::from(encode(&ev))))
        .chain(tokio_stream::once(None));
    let ticks = IntervalStream::new(time::interval_at(time::Instant::now() + period, period))
        .map(|_| Some(Bytes::from_static(KEEP_ALIVE_FRAME)));
    events.merge(ticks).map_while(|frame| frame)
}

// ---------------- feeds ----------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FeedOut {
    id: String,
    url: String,
    title: Option<String>,
    last_fetched_at: Option<DateTime<Utc>>,
    stale: bool,
}

async fn list_feeds(State(state): State<AppState>) -> Json<Vec<FeedOut>> {
    let feeds = state.store.feeds();
    let ids: Vec<String> = feeds.iter().map(|f| f.id.clone()).collect();
    let verdicts = staleness::evaluate(state.store.as_ref(), &ids, Utc::now()).await;

    let out = feeds
        .into_iter()
        .map(|f| {
            let stale = verdicts
                .iter()
                .find(|v| v.feed_id == f.id)
                .map_or(true, |v| v.needs_refresh);
            FeedOut {
                id: f.id,
                url: f.url,
                title: f.title,
                last_fetched_at: f.last_fetched_at,
                stale,
            }
        })
        .collect();
    Json(out)
}

// ---------------- saved newsletters ----------------

async fn save_newsletter(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<NewSavedNewsletter>, JsonRejection>,
) -> Response {
    let Json(new) = match body {
        Ok(b) => b,
        Err(rej) => return error_response(StatusCode::BAD_REQUEST, rej.body_text()),
    };
    if new.feed_ids.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "feedIds must be a non-empty array");
    }
    if new.content.is_null() {
        return error_response(StatusCode::BAD_REQUEST, "content is required");
    }
    let user_id = RequestContext::from_headers(&headers).user_id;
    let saved = state.history.save(new, user_id);
    info!(target: "stream", id = %saved.id, "newsletter saved");
    (StatusCode::CREATED, Json(saved)).into_response()
}

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

async fn list_newsletters(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Json<Vec<SavedNewsletter>> {
    let limit = q.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    Json(state.history.list_recent(limit))
}

async fn get_newsletter(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.history.get(&id) {
        Some(n) => Json(n).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "newsletter not found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::event::decode_line;

    #[tokio::test(start_paused = true)]
    async fn quiet_stream_gets_comment_frames_until_the_sender_finishes() {
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(35)).await;
            let _ = tx.send(StreamEvent::Complete).await;
        });

        let frames: Vec<Bytes> = sse_frames(rx, Duration::from_secs(15)).collect().await;
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0][..], KEEP_ALIVE_FRAME);
        assert_eq!(&frames[1][..], KEEP_ALIVE_FRAME);
        assert_eq!(frames[2], Bytes::from(encode(&StreamEvent::Complete)));
    }

    #[test]
    fn comment_frame_is_ignored_by_the_decoder() {
        let text = std::str::from_utf8(KEEP_ALIVE_FRAME).unwrap();
        assert!(text.lines().all(|line| decode_line(line).is_none()));
    }
}
