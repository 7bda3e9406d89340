use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tracing::warn;

use crate::config::ImageSearchConfig;
use crate::error::{BotError, Result};
use crate::handlers;
use crate::registry::Command;
use crate::upstream::Fetch;

/// Argument value carried by a structured interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Int(i64),
    Str(String),
}

impl ArgValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Int(value) => Some(*value),
            ArgValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(value) => Some(value),
            ArgValue::Int(_) => None,
        }
    }
}

/// An event delivered by the gateway, reduced to what handlers need.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    TextMessage {
        channel_id: u64,
        author_id: u64,
        author_is_bot: bool,
        content: String,
        /// PNG rendition of the author's avatar, no size query.
        author_avatar_url: String,
    },
    Interaction {
        command: String,
        channel_id: u64,
        /// Guild-member avatar preferred over the account avatar; empty
        /// if neither is present.
        invoker_avatar_url: String,
        args: HashMap<String, ArgValue>,
    },
}

impl InboundEvent {
    pub fn channel_id(&self) -> u64 {
        match self {
            InboundEvent::TextMessage { channel_id, .. } => *channel_id,
            InboundEvent::Interaction { channel_id, .. } => *channel_id,
        }
    }
}

/// The single reply an event may produce.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyAction {
    Text {
        channel_id: u64,
        body: String,
    },
    File {
        channel_id: u64,
        filename: String,
        mime_type: String,
        bytes: Vec<u8>,
    },
    Presence {
        status: String,
    },
    None,
}

/// Handler routes, one variant per command. The table from name to
/// variant is built once at startup from the registry.
#[derive(Debug, Clone, Copy)]
enum Route {
    Ping,
    Avatar,
    AvatarUrl,
    Todo,
    Image,
    Counter,
    Basic,
}

impl Route {
    fn for_name(name: &str) -> Option<Route> {
        match name {
            "ping" => Some(Route::Ping),
            "avatar" => Some(Route::Avatar),
            "avatarUrl" => Some(Route::AvatarUrl),
            "todo" => Some(Route::Todo),
            "image" => Some(Route::Image),
            "c" => Some(Route::Counter),
            "basic-command" => Some(Route::Basic),
            _ => None,
        }
    }
}

/// Routes inbound events to handlers. Owns the state handlers share:
/// the upstream fetcher, the optional image-search credentials, and the
/// presence counter.
pub struct Dispatcher {
    routes: HashMap<&'static str, Route>,
    fetcher: Arc<dyn Fetch>,
    image_search: Option<ImageSearchConfig>,
    counter: AtomicU64,
}

impl Dispatcher {
    /// Builds the lookup table from the registered command set. A
    /// command without a matching handler is a registration error.
    pub fn new(
        commands: &[Command],
        fetcher: Arc<dyn Fetch>,
        image_search: Option<ImageSearchConfig>,
    ) -> Result<Self> {
        let mut routes = HashMap::new();
        for command in commands {
            let route = Route::for_name(command.name).ok_or_else(|| {
                BotError::Registration(format!("command '{}' has no handler", command.name))
            })?;
            routes.insert(command.name, route);
        }
        Ok(Self {
            routes,
            fetcher,
            image_search,
            counter: AtomicU64::new(0),
        })
    }

    /// The dispatch contract: every event yields exactly one action, and
    /// a failing handler degrades to `None` without touching the event
    /// loop.
    pub async fn dispatch(&self, event: InboundEvent) -> ReplyAction {
        let name = match &event {
            // Never reply to bot-authored messages; this is the loop guard.
            InboundEvent::TextMessage {
                author_is_bot: true,
                ..
            } => return ReplyAction::None,
            InboundEvent::TextMessage { content, .. } => content
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string(),
            InboundEvent::Interaction { command, .. } => command.clone(),
        };

        let route = match self.routes.get(name.as_str()) {
            Some(route) => *route,
            None => return ReplyAction::None,
        };

        match self.run(route, &event).await {
            Ok(action) => action,
            Err(err) => {
                warn!("command '{}' degraded to no reply: {}", name, err);
                ReplyAction::None
            }
        }
    }

    async fn run(&self, route: Route, event: &InboundEvent) -> Result<ReplyAction> {
        match route {
            Route::Ping => handlers::ping(event),
            Route::Avatar => handlers::avatar(self.fetcher.as_ref(), event).await,
            Route::AvatarUrl => handlers::avatar_url(event),
            Route::Todo => handlers::todo(self.fetcher.as_ref(), event).await,
            Route::Image => {
                handlers::image(self.fetcher.as_ref(), self.image_search.as_ref(), event).await
            }
            Route::Counter => handlers::count(&self.counter, event),
            Route::Basic => handlers::basic(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;
    use crate::upstream;
    use async_trait::async_trait;

    struct StubFetcher {
        responses: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl Fetch for StubFetcher {
        async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| BotError::Upstream(format!("no stub for {}", url)))
        }
    }

    fn dispatcher(responses: Vec<(String, Vec<u8>)>) -> Dispatcher {
        dispatcher_with_search(responses, None)
    }

    fn dispatcher_with_search(
        responses: Vec<(String, Vec<u8>)>,
        image_search: Option<ImageSearchConfig>,
    ) -> Dispatcher {
        let fetcher = Arc::new(StubFetcher {
            responses: responses.into_iter().collect(),
        });
        Dispatcher::new(&registry::commands(), fetcher, image_search).unwrap()
    }

    fn text(content: &str) -> InboundEvent {
        InboundEvent::TextMessage {
            channel_id: 42,
            author_id: 7,
            author_is_bot: false,
            content: content.to_string(),
            author_avatar_url: "https://cdn.example/avatars/7/abc.png".to_string(),
        }
    }

    fn interaction(command: &str, args: Vec<(&str, ArgValue)>) -> InboundEvent {
        InboundEvent::Interaction {
            command: command.to_string(),
            channel_id: 42,
            invoker_avatar_url: "https://cdn.example/guilds/1/users/7/avatars/m.png".to_string(),
            args: args
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }

    fn todo_list(len: usize) -> Vec<u8> {
        let todos: Vec<serde_json::Value> = (0..len)
            .map(|i| serde_json::json!({"id": i + 1, "title": format!("todo {}", i + 1)}))
            .collect();
        serde_json::to_vec(&todos).unwrap()
    }

    #[tokio::test]
    async fn bot_authors_never_get_a_reply() {
        let dispatcher = dispatcher(vec![]);
        let event = InboundEvent::TextMessage {
            channel_id: 42,
            author_id: 999,
            author_is_bot: true,
            content: "ping".to_string(),
            author_avatar_url: String::new(),
        };
        assert_eq!(dispatcher.dispatch(event).await, ReplyAction::None);
    }

    #[tokio::test]
    async fn unknown_text_commands_are_silent() {
        let dispatcher = dispatcher(vec![]);
        assert_eq!(
            dispatcher.dispatch(text("frobnicate now")).await,
            ReplyAction::None
        );
        assert_eq!(dispatcher.dispatch(text("")).await, ReplyAction::None);
    }

    #[tokio::test]
    async fn ping_replies_pong() {
        let dispatcher = dispatcher(vec![]);
        assert_eq!(
            dispatcher.dispatch(text("ping")).await,
            ReplyAction::Text {
                channel_id: 42,
                body: "Pong!".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn counter_presence_is_strictly_increasing_and_sends_nothing() {
        let dispatcher = dispatcher(vec![]);
        for expected in 1..=3u64 {
            let action = dispatcher.dispatch(text("c")).await;
            assert_eq!(
                action,
                ReplyAction::Presence {
                    status: expected.to_string(),
                }
            );
        }
    }

    #[tokio::test]
    async fn todo_text_pretty_prints_the_indexed_element() {
        let dispatcher = dispatcher(vec![(upstream::TODO_API_BASE.to_string(), todo_list(2))]);
        let action = dispatcher.dispatch(text("todo 1")).await;
        match action {
            ReplyAction::Text { channel_id, body } => {
                assert_eq!(channel_id, 42);
                assert!(body.starts_with("```json\n"));
                assert!(body.ends_with("```"));
                assert!(body.contains("\"title\": \"todo 2\""));
            }
            other => panic!("expected text reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn todo_text_defaults_to_index_zero() {
        let dispatcher = dispatcher(vec![(upstream::TODO_API_BASE.to_string(), todo_list(2))]);
        for content in ["todo", "todo notanumber"] {
            let action = dispatcher.dispatch(text(content)).await;
            match action {
                ReplyAction::Text { body, .. } => assert!(body.contains("\"title\": \"todo 1\"")),
                other => panic!("expected text reply, got {:?}", other),
            }
        }
    }

    // The guard only rejects indexes strictly beyond the length; an index
    // equal to the length passes it and fails at the element access,
    // which the dispatch boundary turns into silence.
    #[tokio::test]
    async fn todo_text_boundary_at_list_length() {
        let dispatcher = dispatcher(vec![(upstream::TODO_API_BASE.to_string(), todo_list(2))]);
        assert_eq!(
            dispatcher.dispatch(text("todo 3")).await,
            ReplyAction::None,
            "index beyond the list is guarded"
        );
        assert_eq!(
            dispatcher.dispatch(text("todo 2")).await,
            ReplyAction::None,
            "index equal to the list length fails at access"
        );
    }

    #[tokio::test]
    async fn todo_text_upstream_failure_is_silent() {
        let dispatcher = dispatcher(vec![]);
        assert_eq!(dispatcher.dispatch(text("todo 0")).await, ReplyAction::None);
    }

    #[tokio::test]
    async fn todo_text_parse_failure_is_silent() {
        let dispatcher = dispatcher(vec![(
            upstream::TODO_API_BASE.to_string(),
            b"not json".to_vec(),
        )]);
        assert_eq!(dispatcher.dispatch(text("todo 0")).await, ReplyAction::None);
    }

    #[tokio::test]
    async fn todo_interaction_formats_in_progress_records() {
        let url = format!("{}/5", upstream::TODO_API_BASE);
        let body = br#"{"id":5,"title":"Buy milk","completed":false,"userId":1}"#.to_vec();
        let dispatcher = dispatcher(vec![(url, body)]);
        let event = interaction("todo", vec![("todo-id", ArgValue::Int(5))]);
        assert_eq!(
            dispatcher.dispatch(event).await,
            ReplyAction::Text {
                channel_id: 42,
                body: "**Buy milk**\nstatus: InProgress".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn todo_interaction_formats_completed_records() {
        let url = format!("{}/6", upstream::TODO_API_BASE);
        let body = br#"{"id":6,"title":"Walk dog","completed":true,"userId":1}"#.to_vec();
        let dispatcher = dispatcher(vec![(url, body)]);
        let event = interaction("todo", vec![("todo-id", ArgValue::Int(6))]);
        assert_eq!(
            dispatcher.dispatch(event).await,
            ReplyAction::Text {
                channel_id: 42,
                body: "**Walk dog**\nstatus: Completed".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn todo_interaction_parse_failure_replies_blank() {
        let url = format!("{}/7", upstream::TODO_API_BASE);
        let dispatcher = dispatcher(vec![(url, b"[1,2,3]".to_vec())]);
        let event = interaction("todo", vec![("todo-id", ArgValue::Int(7))]);
        assert_eq!(
            dispatcher.dispatch(event).await,
            ReplyAction::Text {
                channel_id: 42,
                body: String::new(),
            }
        );
    }

    #[tokio::test]
    async fn todo_interaction_fetch_failure_is_silent() {
        let dispatcher = dispatcher(vec![]);
        let event = interaction("todo", vec![("todo-id", ArgValue::Int(8))]);
        assert_eq!(dispatcher.dispatch(event).await, ReplyAction::None);
    }

    #[tokio::test]
    async fn todo_interaction_missing_option_is_silent() {
        let dispatcher = dispatcher(vec![]);
        let event = interaction("todo", vec![]);
        assert_eq!(dispatcher.dispatch(event).await, ReplyAction::None);
    }

    fn search_config() -> ImageSearchConfig {
        ImageSearchConfig {
            api_key: "k".to_string(),
            search_cx: "c".to_string(),
        }
    }

    #[tokio::test]
    async fn image_replies_with_the_first_link() {
        let config = search_config();
        let url = upstream::search_url(&config, "cats");
        let body = br#"{"items":[{"link":"http://x/y.png"}]}"#.to_vec();
        let dispatcher = dispatcher_with_search(vec![(url, body)], Some(config));
        let event = interaction("image", vec![("query", ArgValue::Str("cats".to_string()))]);
        assert_eq!(
            dispatcher.dispatch(event).await,
            ReplyAction::Text {
                channel_id: 42,
                body: "http://x/y.png".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn image_falls_back_when_results_are_empty_or_malformed() {
        for body in [&br#"{"items":[]}"#[..], &br#"{"searchInformation":{}}"#[..]] {
            let config = search_config();
            let url = upstream::search_url(&config, "cats");
            let dispatcher = dispatcher_with_search(vec![(url, body.to_vec())], Some(config));
            let event =
                interaction("image", vec![("query", ArgValue::Str("cats".to_string()))]);
            assert_eq!(
                dispatcher.dispatch(event).await,
                ReplyAction::Text {
                    channel_id: 42,
                    body: "Image not found".to_string(),
                }
            );
        }
    }

    #[tokio::test]
    async fn image_falls_back_when_credentials_are_missing() {
        let dispatcher = dispatcher(vec![]);
        let event = interaction("image", vec![("query", ArgValue::Str("cats".to_string()))]);
        assert_eq!(
            dispatcher.dispatch(event).await,
            ReplyAction::Text {
                channel_id: 42,
                body: "Image not found".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn image_with_no_query_is_silent() {
        let dispatcher = dispatcher_with_search(vec![], Some(search_config()));
        assert_eq!(dispatcher.dispatch(text("image")).await, ReplyAction::None);
        let event = interaction("image", vec![]);
        assert_eq!(dispatcher.dispatch(event).await, ReplyAction::None);
    }

    #[tokio::test]
    async fn image_text_form_joins_the_remaining_tokens() {
        let config = search_config();
        let url = upstream::search_url(&config, "red panda");
        let body = br#"{"items":[{"link":"http://x/rp.jpg"}]}"#.to_vec();
        let dispatcher = dispatcher_with_search(vec![(url, body)], Some(config));
        assert_eq!(
            dispatcher.dispatch(text("image red panda")).await,
            ReplyAction::Text {
                channel_id: 42,
                body: "http://x/rp.jpg".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn avatar_text_form_attaches_png_bytes() {
        let dispatcher = dispatcher(vec![(
            "https://cdn.example/avatars/7/abc.png".to_string(),
            vec![1, 2, 3],
        )]);
        assert_eq!(
            dispatcher.dispatch(text("avatar")).await,
            ReplyAction::File {
                channel_id: 42,
                filename: "avatar.png".to_string(),
                mime_type: "image/png".to_string(),
                bytes: vec![1, 2, 3],
            }
        );
    }

    #[tokio::test]
    async fn avatar_text_form_fetch_failure_is_silent() {
        let dispatcher = dispatcher(vec![]);
        assert_eq!(dispatcher.dispatch(text("avatar")).await, ReplyAction::None);
    }

    #[tokio::test]
    async fn avatar_interaction_replies_with_the_display_url() {
        let dispatcher = dispatcher(vec![]);
        let event = interaction("avatar", vec![]);
        assert_eq!(
            dispatcher.dispatch(event).await,
            ReplyAction::Text {
                channel_id: 42,
                body: "https://cdn.example/guilds/1/users/7/avatars/m.png".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn avatar_url_appends_the_2048_size() {
        let dispatcher = dispatcher(vec![]);
        assert_eq!(
            dispatcher.dispatch(text("avatarUrl")).await,
            ReplyAction::Text {
                channel_id: 42,
                body: "https://cdn.example/avatars/7/abc.png?size=2048".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn basic_command_is_interaction_only() {
        let dispatcher = dispatcher(vec![]);
        assert_eq!(
            dispatcher.dispatch(text("basic-command")).await,
            ReplyAction::None
        );
        match dispatcher.dispatch(interaction("basic-command", vec![])).await {
            ReplyAction::Text { body, .. } => assert!(!body.is_empty()),
            other => panic!("expected text reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unregistered_command_fails_dispatcher_construction() {
        let commands = vec![crate::registry::Command {
            name: "bogus",
            description: "no handler exists for this",
            params: vec![],
        }];
        let fetcher = Arc::new(StubFetcher {
            responses: HashMap::new(),
        });
        match Dispatcher::new(&commands, fetcher, None) {
            Err(err) => assert!(matches!(err, BotError::Registration(_))),
            Ok(_) => panic!("expected construction to fail"),
        }
    }
}
