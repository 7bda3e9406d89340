use std::collections::HashSet;

use serenity::builder::{CreateCommand, CreateCommandOption};
use serenity::model::application::CommandOptionType;

use crate::error::{BotError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Integer,
    String,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

/// One entry of the fixed command set. Built once at startup, never
/// mutated.
#[derive(Debug, Clone)]
pub struct Command {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<Parameter>,
}

impl Command {
    /// Serenity schema for the global command upsert.
    pub fn to_create_command(&self) -> CreateCommand {
        let mut create = CreateCommand::new(self.name).description(self.description);
        for param in &self.params {
            let kind = match param.kind {
                ParamKind::Integer => CommandOptionType::Integer,
                ParamKind::String => CommandOptionType::String,
            };
            create = create.add_option(
                CreateCommandOption::new(kind, param.name, param.description)
                    .required(param.required),
            );
        }
        create
    }
}

/// The full command set declared to the platform at startup.
pub fn commands() -> Vec<Command> {
    vec![
        Command {
            name: "ping",
            description: "Replies with Pong!",
            params: vec![],
        },
        Command {
            name: "avatar",
            description: "Shows the invoker's avatar",
            params: vec![],
        },
        Command {
            name: "avatarUrl",
            description: "Shows the invoker's avatar URL at 2048px",
            params: vec![],
        },
        Command {
            name: "todo",
            description: "Looks up a record from the todo API",
            params: vec![Parameter {
                name: "todo-id",
                description: "Id of the todo record to fetch",
                kind: ParamKind::Integer,
                required: true,
            }],
        },
        Command {
            name: "image",
            description: "Searches for an image",
            params: vec![Parameter {
                name: "query",
                description: "What to search for",
                kind: ParamKind::String,
                required: true,
            }],
        },
        Command {
            name: "c",
            description: "Counts up in the bot's presence text",
            params: vec![],
        },
        Command {
            name: "basic-command",
            description: "A basic command",
            params: vec![],
        },
    ]
}

/// Rejects duplicate names and empty descriptions before anything is
/// sent to the platform. A partially registered set must never serve.
pub fn validate(commands: &[Command]) -> Result<()> {
    let mut seen = HashSet::new();
    for command in commands {
        if command.description.is_empty() {
            return Err(BotError::Registration(format!(
                "command '{}' has no description",
                command.name
            )));
        }
        if !seen.insert(command.name) {
            return Err(BotError::Registration(format!(
                "duplicate command name '{}'",
                command.name
            )));
        }
    }
    Ok(())
}
