//! Routing of commands to per-entity mailboxes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use event_store::{EventStore, PersistenceId};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::entity::{Entity, Journal};

type EntityFactory<E> = dyn Fn(&str) -> E + Send + Sync;

/// Routes commands to entities by id, activating them on demand.
///
/// Each entity gets an unbounded FIFO mailbox and a dedicated task that
/// replays the entity's journal before serving commands. Delivery within
/// one sender is in send order; nothing is guaranteed across senders.
pub struct Router<E: Entity> {
    inner: Arc<RouterInner<E>>,
}

impl<E: Entity> Clone for Router<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct RouterInner<E: Entity> {
    store: Arc<dyn EventStore>,
    factory: Box<EntityFactory<E>>,
    mailboxes: Mutex<HashMap<String, UnboundedSender<E::Command>>>,
}

impl<E: Entity> Router<E> {
    /// Creates a router over the given journal.
    ///
    /// The factory builds a blank entity for an id; recovered state is
    /// folded in afterwards from the journal.
    pub fn new(
        store: Arc<dyn EventStore>,
        factory: impl Fn(&str) -> E + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                store,
                factory: Box::new(factory),
                mailboxes: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Delivers a command to the entity's mailbox, activating the entity
    /// (and replaying its journal) if needed.
    pub fn send(&self, entity_id: &str, command: E::Command) {
        let mut command = command;
        for _ in 0..2 {
            let mailbox = self.mailbox(entity_id);
            match mailbox.send(command) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => {
                    // the previous instance stopped; clear the stale
                    // mailbox and retry against a fresh activation
                    self.deregister(entity_id, &mailbox);
                    command = returned;
                }
            }
        }
        tracing::error!(%entity_id, entity_type = E::entity_type(), "dropping command, mailbox unavailable");
    }

    /// Returns a cloneable handle that converts messages of type `M` into
    /// this entity's commands and delivers them.
    ///
    /// Used as the reply reference carried inside command envelopes.
    pub fn recipient<M, F>(&self, entity_id: &str, convert: F) -> Recipient<M>
    where
        M: Send + 'static,
        F: Fn(M) -> E::Command + Send + Sync + 'static,
    {
        let router = self.clone();
        let entity_id = entity_id.to_string();
        Recipient::new(move |message| router.send(&entity_id, convert(message)))
    }

    /// Delivers a command to every currently-active entity.
    ///
    /// Passive entities are not woken; stale mailboxes are skipped and
    /// cleaned up by the next directed send.
    pub fn broadcast(&self, make: impl Fn(&str) -> E::Command) {
        let mailboxes: Vec<(String, UnboundedSender<E::Command>)> = {
            let guard = self.inner.mailboxes.lock().unwrap();
            guard
                .iter()
                .map(|(id, tx)| (id.clone(), tx.clone()))
                .collect()
        };
        for (entity_id, mailbox) in mailboxes {
            let _ = mailbox.send(make(&entity_id));
        }
    }

    /// Number of currently-active entities.
    pub fn active_count(&self) -> usize {
        self.inner.mailboxes.lock().unwrap().len()
    }

    fn mailbox(&self, entity_id: &str) -> UnboundedSender<E::Command> {
        let mut mailboxes = self.inner.mailboxes.lock().unwrap();
        if let Some(sender) = mailboxes.get(entity_id) {
            return sender.clone();
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        mailboxes.insert(entity_id.to_string(), sender.clone());

        let entity = (self.inner.factory)(entity_id);
        let journal = Journal::new(
            self.inner.store.clone(),
            PersistenceId::of(E::entity_type(), entity_id),
        );
        let router = self.clone();
        let entity_id = entity_id.to_string();
        let mailbox = sender.clone();
        tokio::spawn(run_entity(router, entity_id, mailbox, entity, journal, receiver));

        sender
    }

    fn deregister(&self, entity_id: &str, mailbox: &UnboundedSender<E::Command>) {
        let mut mailboxes = self.inner.mailboxes.lock().unwrap();
        if let Some(current) = mailboxes.get(entity_id)
            && current.same_channel(mailbox)
        {
            mailboxes.remove(entity_id);
        }
    }
}

async fn run_entity<E: Entity>(
    router: Router<E>,
    entity_id: String,
    mailbox: UnboundedSender<E::Command>,
    mut entity: E,
    mut journal: Journal,
    mut commands: UnboundedReceiver<E::Command>,
) {
    match journal.replay().await {
        Ok(envelopes) => {
            for envelope in &envelopes {
                if let Err(error) = entity.recover(envelope) {
                    tracing::error!(
                        %error,
                        %entity_id,
                        entity_type = E::entity_type(),
                        "recovery failed, entity unavailable"
                    );
                    router.deregister(&entity_id, &mailbox);
                    return;
                }
            }
            if !envelopes.is_empty() {
                tracing::debug!(
                    %entity_id,
                    entity_type = E::entity_type(),
                    events = envelopes.len(),
                    "entity recovered"
                );
            }
            entity.on_recovered();
        }
        Err(error) => {
            tracing::error!(%error, %entity_id, entity_type = E::entity_type(), "replay failed");
            router.deregister(&entity_id, &mailbox);
            return;
        }
    }

    while let Some(command) = commands.recv().await {
        if let Err(error) = entity.handle(command, &mut journal).await {
            // fatal to this instance; the next send re-activates it from
            // the journal, so no partial state survives a failed append
            tracing::error!(%error, %entity_id, entity_type = E::entity_type(), "entity stopped");
            break;
        }
    }
    router.deregister(&entity_id, &mailbox);
}

/// A cloneable, typed handle for delivering messages to one entity.
pub struct Recipient<M> {
    deliver: Arc<dyn Fn(M) + Send + Sync>,
}

impl<M> Clone for Recipient<M> {
    fn clone(&self) -> Self {
        Self {
            deliver: self.deliver.clone(),
        }
    }
}

impl<M: Send + 'static> Recipient<M> {
    /// Wraps a delivery function. Tests use this to capture messages.
    pub fn new(deliver: impl Fn(M) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Delivers a message, fire-and-forget.
    pub fn tell(&self, message: M) {
        (self.deliver)(message)
    }
}

impl<M> std::fmt::Debug for Recipient<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Recipient")
    }
}
