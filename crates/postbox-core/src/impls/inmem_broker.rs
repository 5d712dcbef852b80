//! InMemoryBroker - a publisher and a consumer joined by a channel.
//!
//! Everything sent through [`Publisher::send`] is recorded and, once someone
//! listens, handed to the listener as a [`Delivery`]. Acks and nacks are
//! recorded by message id. A nacked delivery is requeued unless requeueing
//! was switched off.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::domain::{Message, Publishing};
use crate::error::{Code, Error, Result};
use crate::ports::{Consumer, Deliveries, Delivery, Publisher};

#[derive(Default)]
struct BrokerState {
    sent: Vec<Publishing>,
    acked: Vec<String>,
    nacked: Vec<String>,
    listener: Option<mpsc::UnboundedSender<Box<dyn Delivery>>>,
    /// Messages sent before anyone listened.
    backlog: Vec<Message>,
}

#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    requeue_on_nack: bool,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
            requeue_on_nack: true,
        }
    }

    pub fn without_requeue(mut self) -> Self {
        self.requeue_on_nack = false;
        self
    }

    /// Push a delivery to the listener, e.g. to simulate a redelivery.
    pub async fn deliver(&self, message: Message) {
        let mut state = self.state.lock().await;
        self.deliver_locked(&mut state, message);
    }

    pub async fn sent(&self) -> Vec<Publishing> {
        self.state.lock().await.sent.clone()
    }

    pub async fn sent_count(&self, id: &str) -> usize {
        self.state.lock().await.sent.iter().filter(|p| p.id() == id).count()
    }

    pub async fn acked(&self) -> Vec<String> {
        self.state.lock().await.acked.clone()
    }

    pub async fn nacked(&self) -> Vec<String> {
        self.state.lock().await.nacked.clone()
    }

    fn deliver_locked(&self, state: &mut BrokerState, message: Message) {
        let Some(listener) = &state.listener else {
            state.backlog.push(message);
            return;
        };
        let delivery = InMemoryDelivery {
            message,
            broker: self.clone(),
        };
        if let Err(mpsc::error::SendError(delivery)) = listener.send(Box::new(delivery)) {
            // listener went away; keep the message for the next one
            state.listener = None;
            state.backlog.push(delivery.message().clone());
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for InMemoryBroker {
    async fn send(&self, publishing: &Publishing) -> Result<()> {
        let mut state = self.state.lock().await;
        state.sent.push(publishing.clone());
        self.deliver_locked(&mut state, publishing.message.clone());
        Ok(())
    }
}

#[async_trait]
impl Consumer for InMemoryBroker {
    async fn listen(&self) -> Result<Deliveries> {
        let mut state = self.state.lock().await;
        if state.listener.as_ref().is_some_and(|l| !l.is_closed()) {
            return Err(Error::new(Code::Exists)
                .with_op("impls.InMemoryBroker.listen")
                .with_message("a listener is already attached"));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.listener = Some(tx);
        for message in std::mem::take(&mut state.backlog) {
            self.deliver_locked(&mut state, message);
        }
        Ok(rx)
    }
}

struct InMemoryDelivery {
    message: Message,
    broker: InMemoryBroker,
}

#[async_trait]
impl Delivery for InMemoryDelivery {
    fn message(&self) -> &Message {
        &self.message
    }

    async fn ack(self: Box<Self>) -> Result<()> {
        let mut state = self.broker.state.lock().await;
        state.acked.push(self.message.id.clone());
        Ok(())
    }

    async fn nack(self: Box<Self>) -> Result<()> {
        let mut state = self.broker.state.lock().await;
        state.nacked.push(self.message.id.clone());
        if self.broker.requeue_on_nack {
            self.broker.deliver_locked(&mut state, self.message.clone());
        }
        Ok(())
    }
}
