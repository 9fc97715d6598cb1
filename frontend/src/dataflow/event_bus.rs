//! Synchronous publish/subscribe bus
//!
//! Handlers are bound to one or more event kinds and run in subscription
//! order, synchronously, inside `publish`. The bus knows nothing about
//! payloads beyond the kind used for routing.
//!
//! Dispatch runs to completion: a `publish` issued by a handler is queued and
//! dispatched only after every handler of the in-progress event has run. A
//! panicking handler is isolated and reported to the error hook; the other
//! handlers for that event still run.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use std::str::FromStr;

/// Routing information an event type exposes to the bus.
pub trait BusEvent: 'static {
    type Kind: Copy + Eq + fmt::Debug + FromStr + 'static;

    fn kind(&self) -> Self::Kind;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// A handler that panicked while handling an event.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerFailure {
    pub subscription: SubscriptionId,
    pub event: String,
    pub message: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown event name '{0}'")]
pub struct UnknownEventName(pub String);

type Handler<E> = Rc<dyn Fn(&E)>;
type ErrorHook = Rc<dyn Fn(&HandlerFailure)>;

struct Subscription<E: BusEvent> {
    id: SubscriptionId,
    kinds: Vec<E::Kind>,
    handler: Handler<E>,
}

struct BusShared<E: BusEvent> {
    subscriptions: RefCell<Vec<Subscription<E>>>,
    queue: RefCell<VecDeque<E>>,
    dispatching: Cell<bool>,
    next_id: Cell<u64>,
    error_hook: RefCell<ErrorHook>,
}

pub struct EventBus<E: BusEvent> {
    shared: Rc<BusShared<E>>,
}

impl<E: BusEvent> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> EventBus<E> {
    pub fn new() -> Self {
        let default_hook: ErrorHook = Rc::new(|failure: &HandlerFailure| {
            log::warn!(
                "event handler {:?} failed on {}: {}",
                failure.subscription,
                failure.event,
                failure.message
            );
        });
        Self {
            shared: Rc::new(BusShared {
                subscriptions: RefCell::new(Vec::new()),
                queue: RefCell::new(VecDeque::new()),
                dispatching: Cell::new(false),
                next_id: Cell::new(1),
                error_hook: RefCell::new(default_hook),
            }),
        }
    }

    /// Binds `handler` to every kind in `kinds`. The handler runs at most once
    /// per published event even if several of its kinds match.
    pub fn subscribe(&self, kinds: &[E::Kind], handler: impl Fn(&E) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.shared.next_id.get());
        self.shared.next_id.set(id.0 + 1);
        self.shared.subscriptions.borrow_mut().push(Subscription {
            id,
            kinds: kinds.to_vec(),
            handler: Rc::new(handler),
        });
        id
    }

    /// Binds `handler` to a space-delimited family of event names.
    ///
    /// Nothing is bound if any name is unknown.
    pub fn subscribe_names(
        &self,
        names: &str,
        handler: impl Fn(&E) + 'static,
    ) -> Result<SubscriptionId, UnknownEventName> {
        let kinds = names
            .split_whitespace()
            .map(|name| {
                name.parse::<E::Kind>()
                    .map_err(|_| UnknownEventName(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.subscribe(&kinds, handler))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.shared.subscriptions.borrow_mut();
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.id != id);
        subscriptions.len() != before
    }

    pub fn subscriber_count(&self, kind: E::Kind) -> usize {
        self.shared
            .subscriptions
            .borrow()
            .iter()
            .filter(|subscription| subscription.kinds.contains(&kind))
            .count()
    }

    /// Replaces the hook that observes handler failures.
    pub fn set_error_hook(&self, hook: impl Fn(&HandlerFailure) + 'static) {
        *self.shared.error_hook.borrow_mut() = Rc::new(hook);
    }

    /// Delivers `event` to every handler bound to its kind.
    ///
    /// Called from inside a handler, the event is queued and delivered once
    /// the current dispatch has finished.
    pub fn publish(&self, event: E) {
        self.shared.queue.borrow_mut().push_back(event);
        if self.shared.dispatching.replace(true) {
            return;
        }

        let _guard = DispatchGuard(&self.shared.dispatching);
        loop {
            let next = self.shared.queue.borrow_mut().pop_front();
            match next {
                Some(event) => self.dispatch(&event),
                None => break,
            }
        }
    }

    fn dispatch(&self, event: &E) {
        let kind = event.kind();
        let handlers: Vec<(SubscriptionId, Handler<E>)> = self
            .shared
            .subscriptions
            .borrow()
            .iter()
            .filter(|subscription| subscription.kinds.contains(&kind))
            .map(|subscription| (subscription.id, Rc::clone(&subscription.handler)))
            .collect();

        for (id, handler) in handlers {
            if !self.is_subscribed(id) {
                continue;
            }
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                let failure = HandlerFailure {
                    subscription: id,
                    event: format!("{:?}", kind),
                    message: panic_message(panic.as_ref()),
                };
                let hook = Rc::clone(&*self.shared.error_hook.borrow());
                hook(&failure);
            }
        }
    }

    fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.shared
            .subscriptions
            .borrow()
            .iter()
            .any(|subscription| subscription.id == id)
    }
}

struct DispatchGuard<'a>(&'a Cell<bool>);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Ping {
        Left(u32),
        Right(u32),
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum PingKind {
        Left,
        Right,
    }

    impl FromStr for PingKind {
        type Err = ();

        fn from_str(value: &str) -> Result<Self, ()> {
            match value {
                "left" => Ok(PingKind::Left),
                "right" => Ok(PingKind::Right),
                _ => Err(()),
            }
        }
    }

    impl BusEvent for Ping {
        type Kind = PingKind;

        fn kind(&self) -> PingKind {
            match self {
                Ping::Left(_) => PingKind::Left,
                Ping::Right(_) => PingKind::Right,
            }
        }
    }

    fn log() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::<Ping>::new();
        let seen = log();

        for name in ["a", "b", "c"] {
            let seen = Rc::clone(&seen);
            bus.subscribe(&[PingKind::Left], move |event| {
                seen.borrow_mut().push(format!("{name}:{event:?}"))
            });
        }
        bus.publish(Ping::Left(1));
        bus.publish(Ping::Right(2));

        assert_eq!(*seen.borrow(), vec!["a:Left(1)", "b:Left(1)", "c:Left(1)"]);
    }

    #[test]
    fn test_late_subscriber_misses_past_events() {
        let bus = EventBus::<Ping>::new();
        let seen = log();
        bus.publish(Ping::Left(1));

        let sink = Rc::clone(&seen);
        bus.subscribe(&[PingKind::Left], move |event| {
            sink.borrow_mut().push(format!("{event:?}"))
        });
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_name_family_binding() {
        let bus = EventBus::<Ping>::new();
        let seen = log();

        let sink = Rc::clone(&seen);
        bus.subscribe_names("left right", move |event| {
            sink.borrow_mut().push(format!("{event:?}"))
        })
        .unwrap();
        bus.publish(Ping::Left(1));
        bus.publish(Ping::Right(2));
        assert_eq!(*seen.borrow(), vec!["Left(1)", "Right(2)"]);

        let error = bus.subscribe_names("left middle", |_| {}).unwrap_err();
        assert_eq!(error, UnknownEventName("middle".into()));
        assert_eq!(bus.subscriber_count(PingKind::Left), 1);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let bus = EventBus::<Ping>::new();
        let seen = log();
        let failures = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&failures);
        bus.set_error_hook(move |failure| sink.borrow_mut().push(failure.clone()));

        bus.subscribe(&[PingKind::Left], |_| panic!("view exploded"));
        let sink = Rc::clone(&seen);
        bus.subscribe(&[PingKind::Left], move |_| sink.borrow_mut().push("survivor".into()));

        bus.publish(Ping::Left(1));
        bus.publish(Ping::Left(2));

        assert_eq!(*seen.borrow(), vec!["survivor", "survivor"]);
        let failures = failures.borrow();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].message, "view exploded");
        assert_eq!(failures[0].event, "Left");
    }

    #[test]
    fn test_nested_publish_runs_after_current_dispatch() {
        let bus = EventBus::<Ping>::new();
        let seen = log();

        {
            let bus_handle = bus.clone();
            let sink = Rc::clone(&seen);
            bus.subscribe(&[PingKind::Left], move |event| {
                sink.borrow_mut().push(format!("first:{event:?}"));
                if let Ping::Left(n) = event {
                    bus_handle.publish(Ping::Right(*n));
                }
            });
        }
        {
            let sink = Rc::clone(&seen);
            bus.subscribe(&[PingKind::Left], move |event| {
                sink.borrow_mut().push(format!("second:{event:?}"))
            });
        }
        {
            let sink = Rc::clone(&seen);
            bus.subscribe(&[PingKind::Right], move |event| {
                sink.borrow_mut().push(format!("right:{event:?}"))
            });
        }

        bus.publish(Ping::Left(7));

        assert_eq!(
            *seen.borrow(),
            vec!["first:Left(7)", "second:Left(7)", "right:Right(7)"]
        );
    }

    #[test]
    fn test_unsubscribe_during_dispatch() {
        let bus = EventBus::<Ping>::new();
        let seen = log();
        let victim = Rc::new(Cell::new(None));

        {
            let bus_handle = bus.clone();
            let victim = Rc::clone(&victim);
            bus.subscribe(&[PingKind::Left], move |_| {
                if let Some(id) = victim.get() {
                    bus_handle.unsubscribe(id);
                }
            });
        }
        let sink = Rc::clone(&seen);
        let id = bus.subscribe(&[PingKind::Left], move |_| sink.borrow_mut().push("ran".into()));
        victim.set(Some(id));

        bus.publish(Ping::Left(1));
        assert!(seen.borrow().is_empty());
        assert!(!bus.unsubscribe(id));
    }
}
