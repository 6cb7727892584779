use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Form;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::errors::AppError;
use crate::models::{ChatForm, ChatTurn};
use crate::service::chat_service::ChatService;

const NDJSON_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// GET `/chat/` — the stored conversation, one JSON turn per line
pub async fn get_chat_handler(State(svc): State<ChatService>) -> Result<Response, AppError> {
    let turns = svc.get_messages().await?;
    let body = turns
        .iter()
        .map(ChatTurn::to_line)
        .collect::<Result<String, _>>()
        .map_err(AppError::Encode)?;
    Ok(([(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)], body).into_response())
}

/// POST `/chat/` — form field `prompt`; streams the user echo, then the reply
pub async fn post_chat_handler(
    State(svc): State<ChatService>,
    Form(form): Form<ChatForm>,
) -> Result<Response, AppError> {
    let events = svc.chat(form.prompt).await?;
    let lines = ReceiverStream::new(events)
        .map(|event| event.and_then(|turn| turn.to_line().map_err(AppError::Encode)));
    Ok((
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(lines),
    )
        .into_response())
}
