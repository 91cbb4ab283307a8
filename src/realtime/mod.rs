//! Change notifications and live collections.
//!
//! Every successful write publishes a [`Change`]. A [`LiveCollection`] does
//! not patch itself from the change payload: any pending notification for its
//! collection triggers a full refetch, and whichever of a local update or a
//! refetch lands last is what the collection holds.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Ideas,
    Tasks,
    Subtasks,
    Tags,
    Profiles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub owner: String,
    pub collection: Collection,
    pub kind: ChangeKind,
    pub id: String,
}

impl Change {
    pub fn new(owner: &str, collection: Collection, kind: ChangeKind, id: &str) -> Self {
        Change {
            owner: owner.to_string(),
            collection,
            kind,
            id: id.to_string(),
        }
    }

    /// Subtask writes also invalidate the task list, which embeds subtasks.
    fn touches(&self, owner: &str, collection: Collection) -> bool {
        self.owner == owner
            && (self.collection == collection
                || (collection == Collection::Tasks && self.collection == Collection::Subtasks))
    }
}

/// Publish/subscribe fan-out. Clones share the same subscriber list.
#[derive(Clone, Default)]
pub struct ChangeFeed {
    subscribers: Arc<Mutex<Vec<Sender<Change>>>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();
        match self.subscribers.lock() {
            Ok(mut subs) => subs.push(tx),
            Err(e) => tracing::error!("change feed lock poisoned: {e}"),
        }
        Subscription { rx }
    }

    /// Deliver to every live subscriber; dropped subscribers are pruned.
    pub fn publish(&self, change: &Change) {
        let Ok(mut subs) = self.subscribers.lock() else {
            tracing::error!("change feed lock poisoned, dropping {change:?}");
            return;
        };
        subs.retain(|tx| tx.send(change.clone()).is_ok());
        tracing::trace!(
            "published {:?} {:?} {} to {} subscribers",
            change.kind,
            change.collection,
            change.id,
            subs.len()
        );
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map_or(0, |subs| subs.len())
    }
}

pub struct Subscription {
    rx: Receiver<Change>,
}

impl Subscription {
    /// Every change received so far, without blocking.
    pub fn drain(&self) -> Vec<Change> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(change) => out.push(change),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        out
    }
}

/// In-memory copy of one owner's collection, kept fresh by full refetches.
pub struct LiveCollection<T> {
    owner: String,
    collection: Collection,
    subscription: Subscription,
    items: Vec<T>,
}

impl<T> LiveCollection<T> {
    pub fn new(feed: &ChangeFeed, owner: &str, collection: Collection, items: Vec<T>) -> Self {
        LiveCollection {
            owner: owner.to_string(),
            collection,
            subscription: feed.subscribe(),
            items,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Optimistic local state.
    pub fn replace(&mut self, items: Vec<T>) {
        self.items = items;
    }

    /// Refetch with `fetch` if any relevant change arrived since the last
    /// call. Returns whether a refetch happened.
    pub fn sync(&mut self, fetch: impl FnOnce() -> Result<Vec<T>>) -> Result<bool> {
        let relevant = self
            .subscription
            .drain()
            .iter()
            .any(|c| c.touches(&self.owner, self.collection));
        if !relevant {
            return Ok(false);
        }
        self.items = fetch()?;
        tracing::debug!("refetched {:?} for {}", self.collection, self.owner);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_receives_each_change() {
        let feed = ChangeFeed::new();
        let a = feed.subscribe();
        let b = feed.subscribe();
        feed.publish(&Change::new("u", Collection::Ideas, ChangeKind::Insert, "1"));

        assert_eq!(a.drain().len(), 1);
        assert_eq!(b.drain().len(), 1);
        assert!(a.drain().is_empty());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let feed = ChangeFeed::new();
        let kept = feed.subscribe();
        drop(feed.subscribe());
        feed.publish(&Change::new("u", Collection::Tags, ChangeKind::Delete, "x"));
        assert_eq!(feed.subscriber_count(), 1);
        assert_eq!(kept.drain().len(), 1);
    }

    #[test]
    fn live_collection_refetches_only_on_relevant_change() {
        let feed = ChangeFeed::new();
        let mut live = LiveCollection::new(&feed, "u", Collection::Tasks, vec![1]);

        feed.publish(&Change::new("other", Collection::Tasks, ChangeKind::Insert, "t"));
        feed.publish(&Change::new("u", Collection::Ideas, ChangeKind::Insert, "i"));
        assert!(!live.sync(|| Ok(vec![9])).unwrap());
        assert_eq!(live.items(), &[1]);

        feed.publish(&Change::new("u", Collection::Subtasks, ChangeKind::Update, "s"));
        assert!(live.sync(|| Ok(vec![1, 2])).unwrap());
        assert_eq!(live.items(), &[1, 2]);
    }

    #[test]
    fn last_write_wins() {
        let feed = ChangeFeed::new();
        let mut live = LiveCollection::new(&feed, "u", Collection::Ideas, vec!["old"]);
        feed.publish(&Change::new("u", Collection::Ideas, ChangeKind::Update, "1"));

        live.replace(vec!["local"]);
        live.sync(|| Ok(vec!["remote"])).unwrap();
        assert_eq!(live.items(), &["remote"]);

        live.replace(vec!["local again"]);
        assert_eq!(live.items(), &["local again"]);
    }
}
