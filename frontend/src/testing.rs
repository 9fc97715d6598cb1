//! Test doubles shared by the unit and scenario tests.

use crate::events::{AppEvent, AppEventBus, EventKind};
use crate::gateway::{DataGateway, TransportError};
use futures::channel::oneshot;
use shared::{ContextWindow, MatchRequest, MatchResult};
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

type Reply<T> = oneshot::Sender<Result<T, TransportError>>;

/// Gateway whose responses are handed out by the test, in any order.
#[derive(Clone, Default)]
pub(crate) struct ScriptedGateway {
    script: Rc<RefCell<Script>>,
}

#[derive(Default)]
struct Script {
    context_calls: Vec<(i64, i64)>,
    context_replies: Vec<Option<Reply<ContextWindow>>>,
    match_calls: Vec<MatchRequest>,
    match_replies: Vec<Option<Reply<MatchResult>>>,
}

impl ScriptedGateway {
    pub(crate) fn context_calls(&self) -> Vec<(i64, i64)> {
        self.script.borrow().context_calls.clone()
    }

    pub(crate) fn match_calls(&self) -> Vec<MatchRequest> {
        self.script.borrow().match_calls.clone()
    }

    pub(crate) fn reply_context(&self, call: usize, response: Result<ContextWindow, TransportError>) {
        let reply = self.script.borrow_mut().context_replies[call]
            .take()
            .expect("context call already answered");
        let _ = reply.send(response);
    }

    pub(crate) fn reply_match(&self, call: usize, response: Result<MatchResult, TransportError>) {
        let reply = self.script.borrow_mut().match_replies[call]
            .take()
            .expect("match call already answered");
        let _ = reply.send(response);
    }
}

impl DataGateway for ScriptedGateway {
    fn fetch_context(
        &self,
        position: i64,
        offset: i64,
    ) -> impl Future<Output = Result<ContextWindow, TransportError>> {
        let (reply, response) = oneshot::channel();
        {
            let mut script = self.script.borrow_mut();
            script.context_calls.push((position, offset));
            script.context_replies.push(Some(reply));
        }
        async move {
            response
                .await
                .unwrap_or_else(|_| Err(TransportError::Unreachable("reply dropped".into())))
        }
    }

    fn fetch_match(
        &self,
        request: &MatchRequest,
    ) -> impl Future<Output = Result<MatchResult, TransportError>> {
        let (reply, response) = oneshot::channel();
        {
            let mut script = self.script.borrow_mut();
            script.match_calls.push(request.clone());
            script.match_replies.push(Some(reply));
        }
        async move {
            response
                .await
                .unwrap_or_else(|_| Err(TransportError::Unreachable("reply dropped".into())))
        }
    }
}

/// Well-formed window starting at `left`; row `t` holds `t` in every cell.
pub(crate) fn context_window(left: i64, words: &[&str], cells: usize) -> ContextWindow {
    ContextWindow {
        left,
        right: left + words.len() as i64,
        data: (0..words.len()).map(|t| vec![t as f32; cells]).collect(),
        words: words.iter().map(|word| word.to_string()).collect(),
    }
}

pub(crate) fn record_events(bus: &AppEventBus) -> Rc<RefCell<Vec<AppEvent>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    bus.subscribe(&EventKind::ALL, move |event: &AppEvent| {
        sink.borrow_mut().push(event.clone())
    });
    seen
}

pub(crate) fn count(events: &Rc<RefCell<Vec<AppEvent>>>, kind: EventKind) -> usize {
    use crate::dataflow::event_bus::BusEvent;
    events
        .borrow()
        .iter()
        .filter(|event| event.kind() == kind)
        .count()
}

/// Lets spawned local tasks run until they block again.
pub(crate) async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
