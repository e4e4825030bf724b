//! Command registry and resolver shared by slash and prefix invocations.
//!
//! Each [`CommandDefinition`] owns one or more routes: its name plus any
//! aliases, every one a whitespace separated token path (`"eco give"`).
//! Prefix messages resolve by the longest route that prefixes the token
//! sequence; slash interactions resolve by their qualified name. Either way
//! the access policy is evaluated before a handler is handed out.
//!
//! The registry is generic over the handler types so it stays independent of
//! the chat framework: `I` is whatever the adapter needs to answer an
//! interaction, `M` the message handler.

use crate::{
    core::access::{AccessPolicy, ActorAttributes},
    errors::{Error, Result},
};
use std::collections::HashMap;

/// How a command was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    /// Slash command interaction
    Interaction,
    /// Prefixed text message
    Message,
}

/// Static description of a command.
#[derive(Debug, Clone)]
pub struct CommandDefinition<I, M> {
    /// Primary route, e.g. `work` or `debug sessions view`
    pub name: String,
    pub description: String,
    /// Alternate routes
    pub aliases: Vec<String>,
    pub access: AccessPolicy,
    pub on_interaction: Option<I>,
    pub on_message: Option<M>,
}

impl<I, M> CommandDefinition<I, M> {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            aliases: Vec::new(),
            access: AccessPolicy::default(),
            on_interaction: None,
            on_message: None,
        }
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    #[must_use]
    pub fn access(mut self, access: AccessPolicy) -> Self {
        self.access = access;
        self
    }

    #[must_use]
    pub fn interaction(mut self, handler: I) -> Self {
        self.on_interaction = Some(handler);
        self
    }

    #[must_use]
    pub fn message(mut self, handler: M) -> Self {
        self.on_message = Some(handler);
        self
    }

    fn routes(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .map(|route| tokenize(route))
    }
}

/// Lowercased whitespace separated tokens of a route.
fn tokenize(route: &str) -> Vec<String> {
    route.split_whitespace().map(str::to_lowercase).collect()
}

/// A command found for a token sequence.
#[derive(Debug)]
pub struct Resolved<'r, I, M> {
    pub command: &'r CommandDefinition<I, M>,
    /// Tokens after the matched route
    pub args: Vec<String>,
}

/// Why nothing was dispatched. None of these are surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No route matches
    Unresolved,
    /// The command has no handler for this kind of invocation
    NoHandler,
    /// An access predicate failed
    AccessDenied,
}

/// Handler selected for an invocation.
#[derive(Debug)]
pub enum Routed<'r, I, M> {
    Interaction {
        command: &'r CommandDefinition<I, M>,
        handler: &'r I,
    },
    Message {
        command: &'r CommandDefinition<I, M>,
        handler: &'r M,
        args: Vec<String>,
    },
    Ignored(IgnoreReason),
}

/// All commands of the bot, immutable once built.
#[derive(Debug)]
pub struct CommandRegistry<I, M> {
    commands: Vec<CommandDefinition<I, M>>,
    routes: HashMap<Vec<String>, usize>,
    longest_route: usize,
}

impl<I, M> Default for CommandRegistry<I, M> {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            routes: HashMap::new(),
            longest_route: 0,
        }
    }
}

impl<I, M> CommandRegistry<I, M> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a command. Fails when one of its routes is empty or already taken.
    pub fn register(&mut self, command: CommandDefinition<I, M>) -> Result<()> {
        let routes: Vec<Vec<String>> = command.routes().collect();

        for (position, route) in routes.iter().enumerate() {
            if route.is_empty() {
                return Err(Error::Command {
                    message: format!("Command '{}' has an empty route", command.name),
                });
            }
            if self.routes.contains_key(route) || routes[..position].contains(route) {
                return Err(Error::DuplicateRoute {
                    route: route.join(" "),
                });
            }
        }

        let index = self.commands.len();
        for route in routes {
            self.longest_route = self.longest_route.max(route.len());
            self.routes.insert(route, index);
        }
        self.commands.push(command);
        Ok(())
    }

    /// Registered commands in registration order.
    pub fn commands(&self) -> impl Iterator<Item = &CommandDefinition<I, M>> {
        self.commands.iter()
    }

    /// Finds the command whose route is the longest prefix of `tokens`.
    pub fn resolve<S: AsRef<str>>(&self, tokens: &[S]) -> Option<Resolved<'_, I, M>> {
        let lowered: Vec<String> = tokens
            .iter()
            .take(self.longest_route)
            .map(|token| token.as_ref().to_lowercase())
            .collect();

        (1..=lowered.len()).rev().find_map(|len| {
            self.routes.get(&lowered[..len]).map(|&index| Resolved {
                command: &self.commands[index],
                args: tokens[len..]
                    .iter()
                    .map(|token| token.as_ref().to_string())
                    .collect(),
            })
        })
    }

    /// Finds a command by its exact route, as slash interactions name it.
    pub fn find(&self, route: &str) -> Option<&CommandDefinition<I, M>> {
        self.routes
            .get(&tokenize(route))
            .map(|&index| &self.commands[index])
    }

    /// Selects the handler for a prefix message.
    pub fn route_message<S: AsRef<str>>(
        &self,
        tokens: &[S],
        actor: &ActorAttributes,
    ) -> Routed<'_, I, M> {
        let Some(Resolved { command, args }) = self.resolve(tokens) else {
            return Routed::Ignored(IgnoreReason::Unresolved);
        };
        let Some(handler) = command.on_message.as_ref() else {
            return Routed::Ignored(IgnoreReason::NoHandler);
        };
        if !command.access.allows(actor) {
            return Routed::Ignored(IgnoreReason::AccessDenied);
        }
        Routed::Message {
            command,
            handler,
            args,
        }
    }

    /// Selects the handler for a slash interaction named `route`.
    pub fn route_interaction(&self, route: &str, actor: &ActorAttributes) -> Routed<'_, I, M> {
        let Some(command) = self.find(route) else {
            return Routed::Ignored(IgnoreReason::Unresolved);
        };
        let Some(handler) = command.on_interaction.as_ref() else {
            return Routed::Ignored(IgnoreReason::NoHandler);
        };
        if !command.access.allows(actor) {
            return Routed::Ignored(IgnoreReason::AccessDenied);
        }
        Routed::Interaction { command, handler }
    }

    /// Whether `actor` may run the slash command named `qualified`.
    ///
    /// A subcommand with a definition of its own follows that definition's
    /// policy; other subcommands follow their root command.
    pub fn allows_interaction(&self, qualified: &str, actor: &ActorAttributes) -> bool {
        if let Some(command) = self.find(qualified) {
            return command.access.allows(actor);
        }
        let root = qualified.split_whitespace().next().unwrap_or(qualified);
        matches!(
            self.route_interaction(root, actor),
            Routed::Interaction { .. }
        )
    }

    /// Selects the handler matching `invocation`.
    pub fn route<S: AsRef<str>>(
        &self,
        invocation: Invocation,
        tokens: &[S],
        actor: &ActorAttributes,
    ) -> Routed<'_, I, M> {
        match invocation {
            Invocation::Message => self.route_message(tokens, actor),
            Invocation::Interaction => {
                let route = tokens
                    .iter()
                    .map(AsRef::as_ref)
                    .collect::<Vec<&str>>()
                    .join(" ");
                self.route_interaction(&route, actor)
            }
        }
    }
}

/// Splits a message into command tokens when it starts with `prefix`.
///
/// Returns `None` for messages that are not commands, including a bare
/// prefix.
#[must_use]
pub fn strip_prefix<'a>(content: &'a str, prefix: &str) -> Option<Vec<&'a str>> {
    let rest = content.trim_start().strip_prefix(prefix)?;
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    if tokens.is_empty() { None } else { Some(tokens) }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    type Registry = CommandRegistry<&'static str, &'static str>;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                CommandDefinition::new("eco", "economy overview")
                    .message("eco")
                    .interaction("eco-slash"),
            )
            .unwrap();
        registry
            .register(
                CommandDefinition::new("eco give", "give coins")
                    .alias("give")
                    .message("give"),
            )
            .unwrap();
        registry
            .register(
                CommandDefinition::new("debug sessions view", "list sessions")
                    .access(AccessPolicy::default().developer_only())
                    .message("debug"),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_longest_prefix_wins() {
        let registry = registry();
        let resolved = registry.resolve(&["eco", "give", "100"]).unwrap();
        assert_eq!(resolved.command.name, "eco give");
        assert_eq!(resolved.args, vec!["100"]);

        let resolved = registry.resolve(&["ECO", "balance"]).unwrap();
        assert_eq!(resolved.command.name, "eco");
        assert_eq!(resolved.args, vec!["balance"]);
    }

    #[test]
    fn test_alias_resolves_same_command() {
        let registry = registry();
        let resolved = registry.resolve(&["give", "@bob", "5"]).unwrap();
        assert_eq!(resolved.command.name, "eco give");
        assert_eq!(resolved.args, vec!["@bob", "5"]);
    }

    #[test]
    fn test_unknown_tokens_are_ignored() {
        let registry = registry();
        assert!(registry.resolve(&["hello", "there"]).is_none());
        assert!(registry.resolve::<&str>(&[]).is_none());
        assert!(matches!(
            registry.route_message(&["hello"], &ActorAttributes::default()),
            Routed::Ignored(IgnoreReason::Unresolved)
        ));
    }

    #[test]
    fn test_duplicate_routes_rejected() {
        let mut registry = registry();
        let err = registry
            .register(CommandDefinition::new("other", "").alias("ECO  give"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateRoute { route } if route == "eco give"));
        assert!(registry.find("other").is_none());

        let err = registry
            .register(CommandDefinition::<&str, &str>::new("twice", "").alias("twice"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateRoute { .. }));

        let err = registry
            .register(CommandDefinition::new("  ", ""))
            .unwrap_err();
        assert!(matches!(err, Error::Command { .. }));
    }

    #[test]
    fn test_access_is_checked_before_dispatch() {
        let registry = registry();
        let tokens = ["debug", "sessions", "view"];

        assert!(matches!(
            registry.route_message(&tokens, &ActorAttributes::default()),
            Routed::Ignored(IgnoreReason::AccessDenied)
        ));

        let developer = ActorAttributes {
            is_developer: true,
            ..ActorAttributes::default()
        };
        match registry.route_message(&tokens, &developer) {
            Routed::Message { handler, args, .. } => {
                assert_eq!(*handler, "debug");
                assert!(args.is_empty());
            }
            other => panic!("unexpected routing: {other:?}"),
        }
    }

    #[test]
    fn test_handler_matches_invocation() {
        let registry = registry();
        let actor = ActorAttributes::default();

        match registry.route(Invocation::Interaction, &["eco"], &actor) {
            Routed::Interaction { handler, .. } => assert_eq!(*handler, "eco-slash"),
            other => panic!("unexpected routing: {other:?}"),
        }
        match registry.route(Invocation::Message, &["eco"], &actor) {
            Routed::Message { handler, .. } => assert_eq!(*handler, "eco"),
            other => panic!("unexpected routing: {other:?}"),
        }
        assert!(matches!(
            registry.route(Invocation::Interaction, &["eco", "give"], &actor),
            Routed::Ignored(IgnoreReason::NoHandler)
        ));
    }

    #[test]
    fn test_subcommands_follow_their_own_definition() {
        let registry = registry();
        let actor = ActorAttributes::default();
        let developer = ActorAttributes {
            is_developer: true,
            ..ActorAttributes::default()
        };

        assert!(registry.allows_interaction("eco give", &actor));
        assert!(registry.allows_interaction("eco balance", &actor));
        assert!(!registry.allows_interaction("debug sessions view", &actor));
        assert!(registry.allows_interaction("debug sessions view", &developer));
        assert!(!registry.allows_interaction("debug sessions sync", &developer));
    }

    #[test]
    fn test_strip_prefix() {
        assert_eq!(strip_prefix("!work", "!"), Some(vec!["work"]));
        assert_eq!(
            strip_prefix("  !eco  give 5", "!"),
            Some(vec!["eco", "give", "5"])
        );
        assert_eq!(strip_prefix("!", "!"), None);
        assert_eq!(strip_prefix("work", "!"), None);
    }
}
