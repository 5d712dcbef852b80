use std::sync::Arc;

use async_trait::async_trait;
use postbox_core::app::TaskGroup;
use postbox_core::domain::{Message, Publishing};
use postbox_core::impls::{InMemoryBroker, InMemoryInboxRepository, InMemoryOutboxRepository};
use postbox_core::inbox::{HandlerRegistry, MessageHandler, Processor, Receiver};
use postbox_core::outbox::{Dispatcher, PollableDataSource};
use postbox_core::polling::PollingPolicy;
use postbox_core::ports::Consumer;
use postbox_core::retry::{RetryPolicy, Retrier};
use postbox_core::{Logger, Result};
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, sleep};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize, Deserialize)]
struct UserCreated {
    name: String,
}

struct WelcomeHandler;

#[async_trait]
impl MessageHandler for WelcomeHandler {
    async fn handle(&self, message: &Message) -> Result<()> {
        let event: UserCreated = message.decode_json()?;
        println!("Welcome, {}!", event.name);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let logger = Logger::from_subscriber(tracing_subscriber::fmt().with_env_filter(filter).finish());

    let policy = PollingPolicy::default().with_polling_interval(Duration::from_millis(50));
    let outbox = Arc::new(InMemoryOutboxRepository::new());
    let inbox = Arc::new(InMemoryInboxRepository::new());
    let broker = InMemoryBroker::new();
    let mut tasks = TaskGroup::new();

    // (A) outbox side: poll the outbox table and publish to the broker
    let source = Arc::new(PollableDataSource::new(outbox.clone(), policy.clone(), logger.clone()));
    let retrier = Retrier::new(
        RetryPolicy::no_retries()
            .with_immediate_retries(2)
            .with_backoff(3, Duration::from_millis(100), 2.0),
    );
    let mut dispatcher = Dispatcher::new(source, Arc::new(broker.clone()), retrier, logger.clone());
    let mut failed = dispatcher.failed_publishings();
    dispatcher.start(&mut tasks).await?;

    // (B) inbox side: store deliveries, then run handlers
    let receiver = Receiver::new(inbox.clone(), logger.clone());
    receiver.receive(broker.listen().await?, &mut tasks);

    let mut handlers = HandlerRegistry::new();
    handlers.register("user.created", Arc::new(WelcomeHandler))?;
    let processor = Processor::new(inbox.clone(), Arc::new(handlers), policy, logger.clone());
    processor.start(&mut tasks);

    // (C) the application writes outbox rows next to its business rows
    for (id, name) in [("u-1", "ada"), ("u-2", "grace")] {
        let message = Message::json(id, "user.created", &UserCreated { name: name.to_string() })?;
        outbox.add(Publishing::new("users", message)).await?;
    }

    sleep(Duration::from_millis(500)).await;

    if let Some(failed) = failed.as_mut() {
        while let Ok(f) = failed.try_recv() {
            println!("failed publishing: id={} error={}", f.publishing.id(), f.error);
        }
    }
    tasks.shutdown_and_join().await;

    let (sent, received) = (outbox.counts().await, inbox.counts().await);
    logger
        .scope(async { tracing::info!(outbox = ?sent, inbox = ?received, "demo finished") })
        .await;
    Ok(())
}
