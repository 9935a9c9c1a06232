use chorus_core::ParticipantId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::participant::Participant;

/// A named set of participants that mutually receive each other's audio.
///
/// The room is passive membership state and never initiates negotiation.
/// Mutations take the exclusive lock; queries copy the membership under the
/// shared lock, so no caller ever iterates while holding it.
pub struct Room {
    id: String,
    participants: RwLock<HashMap<ParticipantId, Arc<Participant>>>,
}

impl Room {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            participants: RwLock::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn join(&self, participant: Arc<Participant>) {
        let mut members = self.participants.write().unwrap();
        members.insert(participant.id, participant);
        info!(room = %self.id, members = members.len(), "participant joined");
    }

    /// Remove a member. Leaving twice is a no-op.
    pub fn leave(&self, id: ParticipantId) {
        let mut members = self.participants.write().unwrap();
        if members.remove(&id).is_some() {
            info!(room = %self.id, members = members.len(), "participant left");
        }
    }

    /// Snapshot of the current members. A participant already marked stopped
    /// is excluded even when its leave has not landed yet.
    pub fn participants(&self) -> Vec<Arc<Participant>> {
        self.participants
            .read()
            .unwrap()
            .values()
            .filter(|p| !p.is_stopped())
            .cloned()
            .collect()
    }

    /// Snapshot of every member except `id`. This is the view used both to
    /// provision subscriptions and to fan packets out.
    pub fn others(&self, id: ParticipantId) -> Vec<Arc<Participant>> {
        self.participants
            .read()
            .unwrap()
            .values()
            .filter(|p| p.id != id && !p.is_stopped())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.participants.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
