//! Typed event bus with per-handler fault isolation.
//!
//! Handlers subscribe by event name and run in registration order. Each call
//! is supervised: an error or a panic is turned into a [`HandlerFault`], handed
//! to the [`FaultReporter`], and delivery continues with the next handler.

use crate::errors::Result;
use futures::{FutureExt, future::BoxFuture};
use std::{
    collections::HashMap,
    fmt,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::{debug, error};

/// An event that can be routed by name and attributed to a guild and user.
pub trait BusEvent: Send + Sync {
    /// Name handlers subscribe to.
    fn name(&self) -> &'static str;

    /// Guild the event originated from, when known.
    fn guild_id(&self) -> Option<String> {
        None
    }

    /// User that caused the event, when known.
    fn user_id(&self) -> Option<String> {
        None
    }
}

/// A handler failure caught at the dispatch boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFault {
    pub event: &'static str,
    pub guild_id: Option<String>,
    pub user_id: Option<String>,
    pub error: String,
}

impl fmt::Display for HandlerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event `{}`", self.event)?;
        if let Some(guild_id) = &self.guild_id {
            write!(f, " in guild {guild_id}")?;
        }
        if let Some(user_id) = &self.user_id {
            write!(f, " by user {user_id}")?;
        }
        write!(f, ": {}", self.error)
    }
}

/// Receives handler faults, typically forwarding them to operators.
pub trait FaultReporter<S>: Send + Sync {
    fn report<'a>(&'a self, state: &'a S, fault: HandlerFault) -> BoxFuture<'a, ()>;
}

/// Reporter that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl<S: Sync> FaultReporter<S> for LogReporter {
    fn report<'a>(&'a self, _state: &'a S, fault: HandlerFault) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            error!("Handler fault: {}", fault);
        })
    }
}

type Handler<S, E> =
    Box<dyn for<'a> Fn(&'a S, &'a E) -> BoxFuture<'a, Result<()>> + Send + Sync>;

struct Subscription<S, E> {
    handler: Handler<S, E>,
    once: bool,
    fired: AtomicBool,
}

/// Event name to handlers, plus the reporter used for faults.
pub struct EventBus<S, E> {
    handlers: HashMap<&'static str, Vec<Subscription<S, E>>>,
    reporter: Arc<dyn FaultReporter<S>>,
}

impl<S, E> fmt::Debug for EventBus<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<S, E> EventBus<S, E>
where
    S: Sync,
    E: BusEvent,
{
    pub fn new(reporter: Arc<dyn FaultReporter<S>>) -> Self {
        Self {
            handlers: HashMap::new(),
            reporter,
        }
    }

    fn subscribe<F>(&mut self, name: &'static str, handler: F, once: bool)
    where
        F: for<'a> Fn(&'a S, &'a E) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.handlers.entry(name).or_default().push(Subscription {
            handler: Box::new(handler),
            once,
            fired: AtomicBool::new(false),
        });
    }

    /// Runs `handler` on every event called `name`.
    pub fn on<F>(&mut self, name: &'static str, handler: F)
    where
        F: for<'a> Fn(&'a S, &'a E) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.subscribe(name, handler, false);
    }

    /// Runs `handler` on the first event called `name` only.
    pub fn once<F>(&mut self, name: &'static str, handler: F)
    where
        F: for<'a> Fn(&'a S, &'a E) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.subscribe(name, handler, true);
    }

    /// Delivers `event` to its handlers in registration order and returns
    /// how many ran. Failing handlers are reported, never propagated.
    pub async fn emit(&self, state: &S, event: &E) -> usize {
        let name = event.name();
        let Some(subscriptions) = self.handlers.get(name) else {
            return 0;
        };

        let mut ran = 0;
        for subscription in subscriptions {
            if subscription.once && subscription.fired.swap(true, Ordering::SeqCst) {
                continue;
            }
            ran += 1;

            let outcome = AssertUnwindSafe((subscription.handler)(state, event))
                .catch_unwind()
                .await;

            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };

            let fault = HandlerFault {
                event: name,
                guild_id: event.guild_id(),
                user_id: event.user_id(),
                error,
            };
            debug!("Reporting handler fault: {}", fault);
            self.reporter.report(state, fault).await;
        }
        ran
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .map_or_else(
            || "handler panicked".to_string(),
            |message| format!("handler panicked: {message}"),
        )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]
    use super::*;
    use crate::errors::Error;
    use std::sync::Mutex;

    #[derive(Default)]
    struct State {
        log: Mutex<Vec<String>>,
        faults: Mutex<Vec<HandlerFault>>,
    }

    impl State {
        fn push(&self, entry: &str) {
            self.log.lock().unwrap().push(entry.to_string());
        }
    }

    enum TestEvent {
        Ready,
        Message { guild: String, user: String },
    }

    impl BusEvent for TestEvent {
        fn name(&self) -> &'static str {
            match self {
                Self::Ready => "ready",
                Self::Message { .. } => "message",
            }
        }

        fn guild_id(&self) -> Option<String> {
            match self {
                Self::Ready => None,
                Self::Message { guild, .. } => Some(guild.clone()),
            }
        }

        fn user_id(&self) -> Option<String> {
            match self {
                Self::Ready => None,
                Self::Message { user, .. } => Some(user.clone()),
            }
        }
    }

    struct Collect;

    impl FaultReporter<State> for Collect {
        fn report<'a>(&'a self, state: &'a State, fault: HandlerFault) -> BoxFuture<'a, ()> {
            Box::pin(async move { state.faults.lock().unwrap().push(fault) })
        }
    }

    fn first<'a>(state: &'a State, _event: &'a TestEvent) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            state.push("first");
            Ok(())
        })
    }

    fn failing<'a>(state: &'a State, _event: &'a TestEvent) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            state.push("failing");
            Err(Error::Command {
                message: "boom".to_string(),
            })
        })
    }

    fn panicking<'a>(_state: &'a State, _event: &'a TestEvent) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { panic!("kaboom") })
    }

    fn last<'a>(state: &'a State, _event: &'a TestEvent) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            state.push("last");
            Ok(())
        })
    }

    fn message() -> TestEvent {
        TestEvent::Message {
            guild: "g1".to_string(),
            user: "u1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_faults_are_isolated_and_reported() {
        let mut bus: EventBus<State, TestEvent> = EventBus::new(Arc::new(Collect));
        bus.on("message", first);
        bus.on("message", failing);
        bus.on("message", panicking);
        bus.on("message", last);

        let state = State::default();
        assert_eq!(bus.emit(&state, &message()).await, 4);

        assert_eq!(
            *state.log.lock().unwrap(),
            vec!["first", "failing", "last"]
        );
        let faults = state.faults.lock().unwrap();
        assert_eq!(faults.len(), 2);
        assert_eq!(faults[0].event, "message");
        assert_eq!(faults[0].guild_id.as_deref(), Some("g1"));
        assert_eq!(faults[0].user_id.as_deref(), Some("u1"));
        assert!(faults[0].error.contains("boom"));
        assert!(faults[1].error.contains("kaboom"));
    }

    #[tokio::test]
    async fn test_once_handlers_fire_once() {
        let mut bus: EventBus<State, TestEvent> = EventBus::new(Arc::new(Collect));
        bus.once("ready", first);
        bus.on("ready", last);

        let state = State::default();
        assert_eq!(bus.emit(&state, &TestEvent::Ready).await, 2);
        assert_eq!(bus.emit(&state, &TestEvent::Ready).await, 1);
        assert_eq!(*state.log.lock().unwrap(), vec!["first", "last", "last"]);
    }

    #[tokio::test]
    async fn test_unsubscribed_event_is_noop() {
        let bus: EventBus<State, TestEvent> = EventBus::new(Arc::new(LogReporter));
        assert_eq!(bus.emit(&State::default(), &message()).await, 0);
    }

    #[test]
    fn test_fault_display() {
        let fault = HandlerFault {
            event: "voice",
            guild_id: Some("g".to_string()),
            user_id: None,
            error: "db down".to_string(),
        };
        assert_eq!(fault.to_string(), "event `voice` in guild g: db down");
    }
}
