//! One handler per command. Each takes the inbound event (plus whatever
//! shared state it needs) and produces at most one reply action. Errors
//! surface to the dispatcher, which logs them and degrades to no reply.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::config::ImageSearchConfig;
use crate::dispatch::{ArgValue, InboundEvent, ReplyAction};
use crate::error::{BotError, Result};
use crate::upstream::{self, Fetch, TodoRecord};

const IMAGE_NOT_FOUND: &str = "Image not found";

/// Positional arguments of a text command: everything after the first
/// whitespace-separated token.
fn text_args(content: &str) -> Vec<&str> {
    content.split_whitespace().skip(1).collect()
}

pub fn ping(event: &InboundEvent) -> Result<ReplyAction> {
    Ok(ReplyAction::Text {
        channel_id: event.channel_id(),
        body: "Pong!".to_string(),
    })
}

/// Text form attaches the avatar as a PNG file; interaction form replies
/// with the precomputed display-avatar URL. The asymmetry is deliberate
/// and kept.
pub async fn avatar(fetcher: &dyn Fetch, event: &InboundEvent) -> Result<ReplyAction> {
    match event {
        InboundEvent::TextMessage {
            channel_id,
            author_avatar_url,
            ..
        } => {
            if author_avatar_url.is_empty() {
                return Err(BotError::Validation("author has no avatar URL".to_string()));
            }
            let bytes = fetcher.get_bytes(author_avatar_url).await?;
            Ok(ReplyAction::File {
                channel_id: *channel_id,
                filename: "avatar.png".to_string(),
                mime_type: "image/png".to_string(),
                bytes,
            })
        }
        InboundEvent::Interaction {
            channel_id,
            invoker_avatar_url,
            ..
        } => Ok(ReplyAction::Text {
            channel_id: *channel_id,
            body: invoker_avatar_url.clone(),
        }),
    }
}

/// The avatar URL at a fixed 2048px rendition.
pub fn avatar_url(event: &InboundEvent) -> Result<ReplyAction> {
    let url = match event {
        InboundEvent::TextMessage {
            author_avatar_url, ..
        } => author_avatar_url,
        InboundEvent::Interaction {
            invoker_avatar_url, ..
        } => invoker_avatar_url,
    };
    if url.is_empty() {
        return Err(BotError::Validation("invoker has no avatar URL".to_string()));
    }
    Ok(ReplyAction::Text {
        channel_id: event.channel_id(),
        body: format!("{}?size=2048", url),
    })
}

pub async fn todo(fetcher: &dyn Fetch, event: &InboundEvent) -> Result<ReplyAction> {
    match event {
        InboundEvent::TextMessage {
            channel_id, content, ..
        } => {
            // A non-numeric argument falls back to index 0, as the
            // original behavior had it.
            let index = text_args(content)
                .first()
                .and_then(|raw| raw.parse::<usize>().ok())
                .unwrap_or(0);

            let body = fetcher.get_bytes(upstream::TODO_API_BASE).await?;
            let todos: Vec<serde_json::Value> = serde_json::from_slice(&body)?;

            // Deliberate boundary, kept from the original: an index equal
            // to the list length passes this guard and fails at the
            // element access below.
            if index > todos.len() {
                return Ok(ReplyAction::None);
            }
            let todo = todos.get(index).ok_or_else(|| {
                BotError::Validation(format!("todo index {} out of range", index))
            })?;

            let pretty = serde_json::to_string_pretty(todo)?;
            Ok(ReplyAction::Text {
                channel_id: *channel_id,
                body: format!("```json\n{}```", pretty),
            })
        }
        InboundEvent::Interaction {
            channel_id, args, ..
        } => {
            let id = args
                .get("todo-id")
                .and_then(ArgValue::as_int)
                .ok_or_else(|| {
                    BotError::Validation("missing required option 'todo-id'".to_string())
                })?;

            let url = format!("{}/{}", upstream::TODO_API_BASE, id);
            let body = fetcher.get_bytes(&url).await?;

            // An unparseable record still gets a (blank) reply; only the
            // fetch itself degrades to silence.
            match serde_json::from_slice::<TodoRecord>(&body) {
                Ok(todo) => {
                    let status = if todo.completed {
                        "Completed"
                    } else {
                        "InProgress"
                    };
                    Ok(ReplyAction::Text {
                        channel_id: *channel_id,
                        body: format!("**{}**\nstatus: {}", todo.title, status),
                    })
                }
                Err(err) => {
                    warn!("todo record {} did not parse: {}", id, err);
                    Ok(ReplyAction::Text {
                        channel_id: *channel_id,
                        body: String::new(),
                    })
                }
            }
        }
    }
}

/// Image search. This command always produces some reply: upstream or
/// credential trouble yields the fixed fallback text instead of silence.
pub async fn image(
    fetcher: &dyn Fetch,
    config: Option<&ImageSearchConfig>,
    event: &InboundEvent,
) -> Result<ReplyAction> {
    let channel_id = event.channel_id();

    let query = match event {
        InboundEvent::TextMessage { content, .. } => text_args(content).join(" "),
        InboundEvent::Interaction { args, .. } => args
            .get("query")
            .and_then(ArgValue::as_str)
            .unwrap_or_default()
            .to_string(),
    };
    if query.is_empty() {
        return Err(BotError::Validation("missing required option 'query'".to_string()));
    }

    let Some(config) = config else {
        warn!("image search credentials are not configured");
        return Ok(ReplyAction::Text {
            channel_id,
            body: IMAGE_NOT_FOUND.to_string(),
        });
    };

    let body = match fetcher.get_bytes(&upstream::search_url(config, &query)).await {
        Ok(body) => body,
        Err(err) => {
            warn!("image search for '{}' failed: {}", query, err);
            return Ok(ReplyAction::Text {
                channel_id,
                body: IMAGE_NOT_FOUND.to_string(),
            });
        }
    };

    let body_text =
        upstream::first_image_link(&body).unwrap_or_else(|| IMAGE_NOT_FOUND.to_string());
    Ok(ReplyAction::Text {
        channel_id,
        body: body_text,
    })
}

/// Increments the shared counter and shows the new value as the bot's
/// presence. Nothing is sent to the channel.
pub fn count(counter: &AtomicU64, _event: &InboundEvent) -> Result<ReplyAction> {
    let value = counter.fetch_add(1, Ordering::SeqCst) + 1;
    Ok(ReplyAction::Presence {
        status: value.to_string(),
    })
}

/// Interaction form only; the text form stays silent.
pub fn basic(event: &InboundEvent) -> Result<ReplyAction> {
    match event {
        InboundEvent::Interaction { channel_id, .. } => Ok(ReplyAction::Text {
            channel_id: *channel_id,
            body: "Hey there! This is a basic command.".to_string(),
        }),
        InboundEvent::TextMessage { .. } => Ok(ReplyAction::None),
    }
}
