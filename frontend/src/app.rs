//! Composition root: builds the bus, controller and coordinator from a config
//! and bootstraps the first context window.

use crate::config::{ConfigError, initial_state};
use crate::controller::{ControllerSettings, StateController, UiIntent};
use crate::coordinator::{ViewCoordinator, ViewSink};
use crate::dataflow::Relay;
use crate::events::AppEventBus;
use crate::gateway::{DataGateway, RequestError, RequestOutcome};
use futures::channel::mpsc::UnboundedReceiver;
use shared::AppConfig;
use std::cell::RefCell;
use std::rc::Rc;

pub struct App<G: DataGateway> {
    config: AppConfig,
    controller: StateController<G>,
    _coordinator: ViewCoordinator,
    intent_relay: Relay<UiIntent>,
    intents: RefCell<Option<UnboundedReceiver<UiIntent>>>,
}

impl<G: DataGateway> App<G> {
    pub fn new(config: AppConfig, gateway: G, sink: Rc<dyn ViewSink>) -> Result<Self, ConfigError> {
        let controller = StateController::new(
            initial_state(&config),
            gateway,
            AppEventBus::new(),
            ControllerSettings::from(&config.timing),
            config.session.meta_dims.clone(),
        )
        .map_err(|violation| ConfigError::Invalid(violation.to_string()))?;
        let coordinator = ViewCoordinator::attach(&controller, sink);
        let (intent_relay, intents) = Relay::new();

        Ok(Self {
            config,
            controller,
            _coordinator: coordinator,
            intent_relay,
            intents: RefCell::new(Some(intents)),
        })
    }

    pub fn controller(&self) -> &StateController<G> {
        &self.controller
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Input widgets send their intents here.
    pub fn intent_relay(&self) -> &Relay<UiIntent> {
        &self.intent_relay
    }

    /// Starts intent processing and loads the window at the configured
    /// position. Session brushes are applied once that window is in place,
    /// followed by an immediate selection.
    ///
    /// Must run inside a `LocalSet`.
    pub async fn start(&self) -> Result<RequestOutcome, RequestError> {
        if let Some(intents) = self.intents.borrow_mut().take() {
            let controller = self.controller.clone();
            tokio::task::spawn_local(async move { controller.process_intents(intents).await });
        }

        log::info!(
            "starting session '{}' ({}) at position {}",
            self.config.session.project,
            self.config.session.source,
            self.config.session.position
        );
        let outcome = self.controller.load_context(0).await?;
        if outcome == RequestOutcome::Applied {
            let session = &self.config.session;
            if let Err(error) = self.controller.set_word_brush(session.word_brush) {
                log::warn!("session word brush dropped: {}", error);
            }
            if let Err(error) = self.controller.set_zero_brush(session.zero_brush) {
                log::warn!("session zero brush dropped: {}", error);
            }
            self.controller.refresh_selection();
        }
        Ok(outcome)
    }
}
