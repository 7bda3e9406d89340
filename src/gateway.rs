//! Serenity binding: translates gateway events into [`InboundEvent`]s,
//! runs them through the dispatcher, and applies the resulting action.

use std::collections::HashMap;
use std::sync::Arc;

use serenity::async_trait;
use serenity::builder::{
    CreateAttachment, CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage,
};
use serenity::client::{Context, EventHandler};
use serenity::gateway::ActivityData;
use serenity::model::application::{
    Command as GlobalCommand, CommandInteraction, Interaction, ResolvedValue,
};
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::ChannelId;
use serenity::model::user::User;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::dispatch::{ArgValue, Dispatcher, InboundEvent, ReplyAction};
use crate::error::BotError;
use crate::registry::Command;

pub struct Handler {
    dispatcher: Arc<Dispatcher>,
    commands: Vec<Command>,
    fatal: mpsc::Sender<BotError>,
}

impl Handler {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        commands: Vec<Command>,
        fatal: mpsc::Sender<BotError>,
    ) -> Self {
        Self {
            dispatcher,
            commands,
            fatal,
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("Connected as {}", ready.user.name);

        let schema: Vec<_> = self
            .commands
            .iter()
            .map(Command::to_create_command)
            .collect();

        // A rejected schema must stop the process; serving a stale or
        // partial command set is worse than not serving at all.
        if let Err(err) = GlobalCommand::set_global_commands(&ctx.http, schema).await {
            let _ = self
                .fatal
                .send(BotError::Registration(err.to_string()))
                .await;
            ctx.shard.shutdown_clean();
            return;
        }

        info!(
            "Registered {} commands. Bot is now running.",
            self.commands.len()
        );
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let event = InboundEvent::TextMessage {
            channel_id: msg.channel_id.get(),
            author_id: msg.author.id.get(),
            author_is_bot: msg.author.bot,
            content: msg.content.clone(),
            author_avatar_url: png_avatar_url(&msg.author),
        };
        let action = self.dispatcher.dispatch(event).await;
        apply_to_channel(&ctx, action).await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };

        let event = InboundEvent::Interaction {
            command: command.data.name.clone(),
            channel_id: command.channel_id.get(),
            invoker_avatar_url: display_avatar_url(
                command.member.as_ref().and_then(|member| member.avatar_url()),
                command.user.avatar_url(),
            ),
            args: interaction_args(&command),
        };
        let action = self.dispatcher.dispatch(event).await;
        respond_to_interaction(&ctx, &command, action).await;
    }
}

/// PNG rendition of a user's avatar, or the default avatar for users
/// without one.
fn png_avatar_url(user: &User) -> String {
    match user.avatar.as_ref() {
        Some(hash) => format!("https://cdn.discordapp.com/avatars/{}/{}.png", user.id, hash),
        None => user.default_avatar_url(),
    }
}

/// The guild-member avatar wins over the account avatar; with neither
/// present the URL is empty.
fn display_avatar_url(member_avatar: Option<String>, user_avatar: Option<String>) -> String {
    member_avatar.or(user_avatar).unwrap_or_default()
}

/// Only the two option types the registry declares are extracted.
fn interaction_args(command: &CommandInteraction) -> HashMap<String, ArgValue> {
    let mut args = HashMap::new();
    for option in command.data.options() {
        match option.value {
            ResolvedValue::Integer(value) => {
                args.insert(option.name.to_string(), ArgValue::Int(value));
            }
            ResolvedValue::String(value) => {
                args.insert(option.name.to_string(), ArgValue::Str(value.to_string()));
            }
            _ => {}
        }
    }
    args
}

/// Applies an action for a text-message event. Send failures are logged
/// and never propagated into the event loop.
async fn apply_to_channel(ctx: &Context, action: ReplyAction) {
    match action {
        ReplyAction::Text { channel_id, body } => {
            if let Err(err) = ChannelId::new(channel_id).say(&ctx.http, body).await {
                error!("failed to send message to channel {}: {}", channel_id, err);
            }
        }
        ReplyAction::File {
            channel_id,
            filename,
            bytes,
            ..
        } => {
            let message = CreateMessage::new().add_file(CreateAttachment::bytes(bytes, filename));
            if let Err(err) = ChannelId::new(channel_id)
                .send_message(&ctx.http, message)
                .await
            {
                error!("failed to send file to channel {}: {}", channel_id, err);
            }
        }
        ReplyAction::Presence { status } => {
            ctx.set_activity(Some(ActivityData::playing(status)));
        }
        ReplyAction::None => {}
    }
}

/// Applies an action as the response to a slash-command interaction.
async fn respond_to_interaction(ctx: &Context, command: &CommandInteraction, action: ReplyAction) {
    let message = match action {
        ReplyAction::Text { body, .. } => CreateInteractionResponseMessage::new().content(body),
        ReplyAction::File {
            filename, bytes, ..
        } => CreateInteractionResponseMessage::new()
            .add_file(CreateAttachment::bytes(bytes, filename)),
        ReplyAction::Presence { status } => {
            ctx.set_activity(Some(ActivityData::playing(status)));
            return;
        }
        ReplyAction::None => return,
    };

    if let Err(err) = command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await
    {
        error!(
            "failed to respond to interaction '{}': {}",
            command.data.name, err
        );
    }
}
