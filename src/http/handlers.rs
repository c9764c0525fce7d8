//! Axum HTTP handlers for the web server
//!
//! Provides the session-routing Model Context Protocol endpoint and general
//! metadata endpoints.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use axum_extra::TypedHeader;
use futures::{stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::SessionError;
use crate::mcp::{engine::EngineReply, rpc::is_json_rpc_error};
use crate::session::{classify, CloseReason, MessageKind, Session, SessionId};
use crate::AppState;

const EVENT_STREAM: &str = "text/event-stream";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub mcp_endpoint: &'static str,
    pub active_sessions: usize,
}

pub async fn root() -> &'static str {
    "MCP server is running. Use /mcp for requests."
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn discovery(State(state): State<AppState>) -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        mcp_endpoint: "/mcp",
        active_sessions: state.sessions.len(),
    })
}

/// `POST /mcp`: routes a message to its session, or opens a session for an
/// `initialize` request that carries no session id.
pub async fn mcp_post(
    State(state): State<AppState>,
    session_header: Option<TypedHeader<SessionId>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, SessionError> {
    let message: Value = serde_json::from_slice(&body).map_err(|_| SessionError::ParseError)?;
    let as_event_stream = prefers_event_stream(&headers);

    if let Some(TypedHeader(session_id)) = session_header {
        let Some(session) = state.sessions.get(&session_id) else {
            warn!(session_id = %session_id, "rejected message for unknown session");
            return Err(SessionError::InvalidRequest);
        };

        let reply = session.handle(message).await?;
        return Ok(render_reply(reply, as_event_stream));
    }

    if classify(&message) != MessageKind::Initialize {
        warn!("rejected message without session that is not an initialize request");
        return Err(SessionError::InvalidRequest);
    }

    let (session_id, session) = state.sessions.create();
    session.observe_close(state.sessions.observer());
    let pending = PendingHandshake::new(&session);
    let reply = match open_session(&state, &session, message).await {
        Ok(reply) => reply,
        Err(err) => {
            session.close(CloseReason::HandshakeRejected);
            return Err(err);
        }
    };

    if let EngineReply::Message(response) = &reply {
        if is_json_rpc_error(response) {
            session.close(CloseReason::HandshakeRejected);
            return Ok(render_reply(reply, as_event_stream));
        }
    }
    pending.complete();

    info!(
        session_id = %session_id,
        opened_at = %session.opened_at(),
        active_sessions = state.sessions.len(),
        "session initialized"
    );
    Ok((TypedHeader(session_id), render_reply(reply, as_event_stream)).into_response())
}

/// Closes a half-created session unless the handshake runs to completion,
/// including when the request future is dropped mid-handshake.
struct PendingHandshake<'a> {
    session: Option<&'a Session>,
}

impl<'a> PendingHandshake<'a> {
    fn new(session: &'a Session) -> Self {
        Self {
            session: Some(session),
        }
    }

    fn complete(mut self) {
        self.session = None;
    }
}

impl Drop for PendingHandshake<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if session.close(CloseReason::Disconnected) {
                warn!(session_id = %session.id(), "handshake abandoned before completion");
            }
        }
    }
}

async fn open_session(
    state: &AppState,
    session: &Session,
    message: Value,
) -> Result<EngineReply, SessionError> {
    session.bind_engine(state.engines.create_engine()).await?;
    session.handle(message).await
}

/// `GET /mcp`: attaches the session's server-to-client event stream.
pub async fn mcp_get(
    State(state): State<AppState>,
    session_header: Option<TypedHeader<SessionId>>,
    headers: HeaderMap,
) -> Result<Response, SessionError> {
    let session = known_session(&state, session_header)?;
    if !accepts_event_stream(&headers) {
        return Err(SessionError::NotAcceptable);
    }

    let events = session.open_stream()?;
    info!(session_id = %session.id(), "event stream attached");

    let sse = Sse::new(events.map(message_event))
        .keep_alive(KeepAlive::new().interval(state.sse_keep_alive));
    Ok(sse.into_response())
}

/// `DELETE /mcp`: terminates the session.
pub async fn mcp_delete(
    State(state): State<AppState>,
    session_header: Option<TypedHeader<SessionId>>,
) -> Result<StatusCode, SessionError> {
    let session = known_session(&state, session_header)?;
    session.close(CloseReason::Terminated);
    state.sessions.remove(session.id());
    Ok(StatusCode::OK)
}

fn known_session(
    state: &AppState,
    session_header: Option<TypedHeader<SessionId>>,
) -> Result<Arc<Session>, SessionError> {
    let Some(TypedHeader(session_id)) = session_header else {
        return Err(SessionError::MissingSession);
    };

    state.sessions.get(&session_id).ok_or_else(|| {
        warn!(session_id = %session_id, "unknown session id");
        SessionError::MissingSession
    })
}

fn render_reply(reply: EngineReply, as_event_stream: bool) -> Response {
    match reply {
        EngineReply::Accepted => StatusCode::ACCEPTED.into_response(),
        reply if as_event_stream => {
            let events = reply
                .into_messages()
                .into_iter()
                .map(message_event)
                .collect::<Vec<_>>();
            Sse::new(stream::iter(events)).into_response()
        }
        EngineReply::Message(response) => (StatusCode::OK, Json(response)).into_response(),
        EngineReply::Batch(responses) => {
            (StatusCode::OK, Json(Value::Array(responses))).into_response()
        }
    }
}

fn message_event(message: Value) -> Result<Event, axum::Error> {
    Event::default().event("message").json_data(message)
}

fn accept_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
}

/// Event-stream replies only when the client asks for them and not for JSON.
fn prefers_event_stream(headers: &HeaderMap) -> bool {
    accept_header(headers)
        .is_some_and(|accept| accept.contains(EVENT_STREAM) && !accept.contains("application/json"))
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    accept_header(headers)
        .map(|accept| accept.contains(EVENT_STREAM) || accept.contains("*/*"))
        .unwrap_or(true)
}
