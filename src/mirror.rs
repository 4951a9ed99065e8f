//! Incremental mirroring of newest-first provider feeds into local storage.
//!
//! A walk loads what is already stored for the user, then pulls feed items one
//! at a time and persists each new one before asking for the next. The first
//! item that was already stored before the walk started ends it: since the
//! feed is ordered newest first, everything behind it is assumed to be
//! stored too, and the following pages are never requested.
//!
//! This relies on the provider keeping its order. An item backfilled behind
//! an already stored one is not picked up.

use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
    hash::Hash,
    sync::{Mutex, MutexGuard},
};

use anyhow::anyhow;
use log::{debug, info};
use thiserror::Error;

use crate::{
    domain::history::{
        LibraryTrack, PlayEvent, PlayKey, PlayedCursor, RecentlyPlayed, SavedKey, SavedTrack,
    },
    spotify::{client::SpotifyClient, error::ProviderError},
    storage::{error::StorageError, operations::Storage},
};

#[derive(Debug, Error)]
pub enum MirrorError {
    /// Fetching the feed failed. Items stored before the failure are kept.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Writing an item failed. Items stored before it are kept.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Item of a provider feed, identified per user by a natural key.
pub trait FeedItem {
    type Key: Eq + Hash + Clone + Debug;

    fn key(&self, user_id: &str) -> Self::Key;
}

/// Storage side of a mirror walk.
pub trait MirrorStore<T: FeedItem> {
    type Record: Clone;

    /// Every record stored for the user, by key.
    fn snapshot(&mut self, user_id: &str) -> Result<HashMap<T::Key, Self::Record>, StorageError>;

    /// Stores one item atomically. Returns `None` when its key is already
    /// present, in which case nothing was written.
    fn persist(&mut self, user_id: &str, item: &T) -> Result<Option<Self::Record>, StorageError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOutcome<K> {
    /// Reached an item that was already stored.
    Overlap(K),
    /// The feed ran out.
    Exhausted,
}

#[derive(Debug)]
pub struct MirrorReport<K, R> {
    /// Stored records after the walk, old and new.
    pub snapshot: HashMap<K, R>,
    /// Records added by this walk, in feed order.
    pub added: Vec<R>,
    pub outcome: MirrorOutcome<K>,
}

pub fn mirror<T, S, F>(
    store: &mut S,
    user_id: &str,
    feed: F,
) -> Result<MirrorReport<T::Key, S::Record>, MirrorError>
where
    T: FeedItem,
    S: MirrorStore<T>,
    F: IntoIterator<Item = Result<T, ProviderError>>,
{
    let mut snapshot = store.snapshot(user_id)?;
    debug!(
        "Mirroring for user {user_id}, {} records already stored",
        snapshot.len()
    );

    let mut added = Vec::new();
    let mut added_keys = HashSet::new();
    let mut outcome = MirrorOutcome::Exhausted;

    for item in feed {
        let item = item?;
        let key = item.key(user_id);

        if added_keys.contains(&key) {
            debug!("Feed repeated {key:?}, skipping");
            continue;
        }
        if snapshot.contains_key(&key) {
            outcome = MirrorOutcome::Overlap(key);
            break;
        }

        match store.persist(user_id, &item)? {
            Some(record) => {
                snapshot.insert(key.clone(), record.clone());
                added_keys.insert(key);
                added.push(record);
            }
            None => {
                // stored by someone else since the snapshot was taken
                outcome = MirrorOutcome::Overlap(key);
                break;
            }
        }
    }

    info!(
        "Mirrored {} new records for user {user_id}, {} stored in total",
        added.len(),
        snapshot.len()
    );

    Ok(MirrorReport {
        snapshot,
        added,
        outcome,
    })
}

impl FeedItem for RecentlyPlayed {
    type Key = PlayKey;

    fn key(&self, user_id: &str) -> PlayKey {
        self.to_play_event(user_id).key()
    }
}

impl FeedItem for LibraryTrack {
    type Key = SavedKey;

    fn key(&self, user_id: &str) -> SavedKey {
        SavedKey {
            user_id: user_id.to_string(),
            track_id: self.track.id.clone(),
        }
    }
}

impl MirrorStore<RecentlyPlayed> for Storage {
    type Record = PlayEvent;

    fn snapshot(&mut self, user_id: &str) -> Result<HashMap<PlayKey, PlayEvent>, StorageError> {
        self.play_snapshot(user_id)
    }

    fn persist(
        &mut self,
        user_id: &str,
        item: &RecentlyPlayed,
    ) -> Result<Option<PlayEvent>, StorageError> {
        let play = item.to_play_event(user_id);
        Ok(self
            .store_play_with_track(&play, &item.track)?
            .then_some(play))
    }
}

impl MirrorStore<LibraryTrack> for Storage {
    type Record = SavedTrack;

    fn snapshot(&mut self, user_id: &str) -> Result<HashMap<SavedKey, SavedTrack>, StorageError> {
        self.saved_snapshot(user_id)
    }

    fn persist(
        &mut self,
        user_id: &str,
        item: &LibraryTrack,
    ) -> Result<Option<SavedTrack>, StorageError> {
        let saved = item.to_saved_track(user_id);
        Ok(self
            .store_saved_with_track(&saved, &item.track)?
            .then_some(saved))
    }
}

fn lock<S>(store: &Mutex<S>) -> Result<MutexGuard<'_, S>, StorageError> {
    store
        .lock()
        .map_err(|e| StorageError::Internal(anyhow!("storage lock poisoned: {e}")))
}

/// Shared storage is locked per call, so the lock is not held while the
/// feed waits on the network.
impl<T, S> MirrorStore<T> for &Mutex<S>
where
    T: FeedItem,
    S: MirrorStore<T>,
{
    type Record = S::Record;

    fn snapshot(&mut self, user_id: &str) -> Result<HashMap<T::Key, S::Record>, StorageError> {
        let mut store = lock(self)?;
        MirrorStore::<T>::snapshot(&mut *store, user_id)
    }

    fn persist(&mut self, user_id: &str, item: &T) -> Result<Option<S::Record>, StorageError> {
        let mut store = lock(self)?;
        store.persist(user_id, item)
    }
}

pub type PlaysReport = MirrorReport<PlayKey, PlayEvent>;
pub type SavedReport = MirrorReport<SavedKey, SavedTrack>;

/// Mirrors the recently played feed. With a cursor only plays on its side
/// are walked; the early exit on stored plays still applies.
pub fn sync_recently_played<S>(
    client: &SpotifyClient,
    store: &mut S,
    user_id: &str,
    cursor: Option<PlayedCursor>,
) -> Result<PlaysReport, MirrorError>
where
    S: MirrorStore<RecentlyPlayed, Record = PlayEvent>,
{
    mirror(store, user_id, client.recently_played(cursor))
}

pub fn sync_saved_tracks<S>(
    client: &SpotifyClient,
    store: &mut S,
    user_id: &str,
) -> Result<SavedReport, MirrorError>
where
    S: MirrorStore<LibraryTrack, Record = SavedTrack>,
{
    mirror(store, user_id, client.saved_tracks())
}
