//! Trailing-edge throttled task
//!
//! The first `schedule` call arms a timer; calls made while it is armed only
//! replace the pending arguments. When the timer fires the action runs once
//! with the most recent arguments, so the last input before a quiet period is
//! always executed and the action never runs more than once per interval.
//!
//! Timers are spawned with `tokio::task::spawn_local`, so scheduling must
//! happen inside a `LocalSet`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

pub struct Throttle<T: 'static> {
    interval: Duration,
    shared: Rc<ThrottleShared<T>>,
}

struct ThrottleShared<T> {
    pending: RefCell<Option<T>>,
    armed: Cell<bool>,
    runs: Cell<u64>,
    action: Box<dyn Fn(T)>,
}

impl<T> ThrottleShared<T> {
    fn run_pending(&self) {
        // Release the borrow before running, the action may schedule again.
        let args = self.pending.borrow_mut().take();
        if let Some(args) = args {
            self.runs.set(self.runs.get() + 1);
            (self.action)(args);
        }
    }
}

impl<T: 'static> Throttle<T> {
    pub fn new(interval: Duration, action: impl Fn(T) + 'static) -> Self {
        Self {
            interval,
            shared: Rc::new(ThrottleShared {
                pending: RefCell::new(None),
                armed: Cell::new(false),
                runs: Cell::new(0),
                action: Box::new(action),
            }),
        }
    }

    /// Records `args` as the latest input and arms the timer if it is idle.
    pub fn schedule(&self, args: T) {
        *self.shared.pending.borrow_mut() = Some(args);
        if self.shared.armed.replace(true) {
            return;
        }

        let shared = Rc::clone(&self.shared);
        let interval = self.interval;
        tokio::task::spawn_local(async move {
            tokio::time::sleep(interval).await;
            shared.armed.set(false);
            shared.run_pending();
        });
    }

    /// Runs the pending call right away instead of waiting for the timer.
    pub fn flush(&self) {
        self.shared.run_pending();
    }

    /// Drops the pending call; an armed timer then fires as a no-op.
    pub fn cancel(&self) {
        self.shared.pending.borrow_mut().take();
    }

    pub fn is_pending(&self) -> bool {
        self.shared.pending.borrow().is_some()
    }

    /// Number of times the action has executed.
    pub fn runs(&self) -> u64 {
        self.shared.runs.get()
    }
}

impl<T: 'static> Clone for Throttle<T> {
    fn clone(&self) -> Self {
        Self {
            interval: self.interval,
            shared: Rc::clone(&self.shared),
        }
    }
}
