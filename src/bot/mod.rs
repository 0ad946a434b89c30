use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::config::BotConfiguration;
use crate::platforms::{self, PlatformConnection};
use crate::types::{OutboundAction, PlatformEvent};

pub mod commands;
pub mod evaluator;
pub mod ledger;
pub mod moderation;
pub mod punishment;
pub mod rules;

use commands::CommandHandlers;
use evaluator::ViolationEvaluator;
use ledger::WarningLedger;
use moderation::{ModerationOutcome, ModerationPipeline};

const OUTBOUND_QUEUE_SIZE: usize = 256;

/// Core bot engine: owns the platform connection, the ledger and the
/// pipeline/command handlers that share it
pub struct ModerationBot {
    connection: Arc<RwLock<Box<dyn PlatformConnection>>>,
    ledger: Arc<WarningLedger>,
    pipeline: Arc<ModerationPipeline>,
    command_handlers: Arc<CommandHandlers>,
    tasks: Vec<JoinHandle<()>>,
}

impl ModerationBot {
    pub fn new(
        connection: Box<dyn PlatformConnection>,
        ledger: Arc<WarningLedger>,
        pipeline: ModerationPipeline,
        command_handlers: CommandHandlers,
    ) -> Self {
        Self {
            connection: Arc::new(RwLock::new(connection)),
            ledger,
            pipeline: Arc::new(pipeline),
            command_handlers: Arc::new(command_handlers),
            tasks: Vec::new(),
        }
    }

    /// Wire the rule store, ledger, pipeline and commands from configuration
    pub async fn from_config(
        config: &BotConfiguration,
        audit_channel_id: Option<String>,
        connection: Box<dyn PlatformConnection>,
    ) -> Self {
        let ledger = Arc::new(WarningLedger::load(&config.warnings_file).await);
        let rules = Arc::new(config.rule_store());
        if rules.is_empty() {
            warn!("Rule set is empty, only link and image checks are active");
        }

        let evaluator = ViolationEvaluator::new(rules)
            .with_image_override(config.image_overrides_rule_match);
        let pipeline = ModerationPipeline::new(evaluator, Arc::clone(&ledger), audit_channel_id);
        let command_handlers = CommandHandlers::new(Arc::clone(&ledger), config.leaderboard_size);

        Self::new(connection, ledger, pipeline, command_handlers)
    }

    pub fn ledger(&self) -> &Arc<WarningLedger> {
        &self.ledger
    }

    /// Connect and start the outbound dispatcher and the event processor
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting moderation bot...");

        let receiver = {
            let mut connection = self.connection.write().await;
            connection.connect().await
                .with_context(|| format!("Failed to connect to {}", connection.platform_name()))?;
            connection.get_event_receiver()
                .context("Connection did not provide an event receiver")?
        };

        let (outbound_tx, outbound_rx) = mpsc::channel::<OutboundAction>(OUTBOUND_QUEUE_SIZE);

        let dispatcher = Self::start_action_dispatcher(Arc::clone(&self.connection), outbound_rx);
        let processor = self.start_event_processor(receiver, outbound_tx);
        self.tasks.push(dispatcher);
        self.tasks.push(processor);

        info!("Moderation bot started");
        Ok(())
    }

    /// Executes queued outbound actions. Each action runs in its own task so
    /// a slow or failing platform call never holds up the next one.
    fn start_action_dispatcher(
        connection: Arc<RwLock<Box<dyn PlatformConnection>>>,
        mut outbound_rx: mpsc::Receiver<OutboundAction>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(action) = outbound_rx.recv().await {
                let connection = Arc::clone(&connection);
                tokio::spawn(async move {
                    let connection = connection.read().await;
                    match platforms::execute(&**connection, &action).await {
                        Ok(()) => debug!("Outbound {} completed", action.kind()),
                        Err(e) => error!("Outbound {} failed: {:#}", action.kind(), e),
                    }
                });
            }
            info!("Outbound dispatcher stopped");
        })
    }

    fn start_event_processor(
        &self,
        mut receiver: broadcast::Receiver<PlatformEvent>,
        outbound_tx: mpsc::Sender<OutboundAction>,
    ) -> JoinHandle<()> {
        let pipeline = Arc::clone(&self.pipeline);
        let command_handlers = Arc::clone(&self.command_handlers);

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        Self::handle_event(&pipeline, &command_handlers, event, &outbound_tx).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Event receiver lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Event receiver closed");
                        break;
                    }
                }
            }
        })
    }

    /// Route one platform event to the pipeline or the command handlers
    pub async fn handle_event(
        pipeline: &ModerationPipeline,
        command_handlers: &CommandHandlers,
        event: PlatformEvent,
        outbound: &mpsc::Sender<OutboundAction>,
    ) {
        match event {
            PlatformEvent::Message(message) => {
                let outcome = pipeline.process_message(&message, outbound).await;
                if outcome == ModerationOutcome::NoAction {
                    command_handlers.process_text_command(&message, outbound).await;
                }
            }
            PlatformEvent::Command(invocation) => {
                command_handlers.process_command(&invocation, outbound).await;
            }
        }
    }

    /// Health check for the connection
    pub async fn health_check(&self) -> bool {
        let connection = self.connection.read().await;
        let healthy = connection.is_connected().await;
        if !healthy {
            warn!("{} connection is unhealthy", connection.platform_name());
        }
        healthy
    }

    /// Stop processing and disconnect
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down moderation bot...");

        for task in self.tasks.drain(..) {
            task.abort();
        }

        let mut connection = self.connection.write().await;
        if let Err(e) = connection.disconnect().await {
            error!("Error disconnecting from {}: {}", connection.platform_name(), e);
        }

        info!("Moderation bot shutdown complete ({} users on the ledger)", self.ledger.len().await);
        Ok(())
    }
}
