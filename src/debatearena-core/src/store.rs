//! Persistence for debate sessions and everything recorded during them.
//!
//! [`DebateStore`] is the repository interface the engine talks to.
//! [`MemoryStore`] keeps everything in memory and can write the whole state
//! to a JSON snapshot file and read it back.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::argument_scoring::{ScoreRecord, ScoringRule};
use crate::error::DebateError;
use crate::participant::Role;
use crate::records::{Argument, ModeratorMessage, Topic};
use crate::scoring::RoundScoreRecord;
use crate::session::Session;

/// Read-modify-write applied to a session under the store's lock.
pub type SessionUpdate = Box<dyn FnOnce(&mut Session) -> Result<(), DebateError> + Send>;

/// Storage interface for debate persistence.
#[async_trait]
pub trait DebateStore: Send + Sync {
    async fn insert_topic(&self, topic: Topic) -> Result<(), DebateError>;

    async fn topic(&self, id: Uuid) -> Result<Option<Topic>, DebateError>;

    async fn insert_session(&self, session: Session) -> Result<(), DebateError>;

    async fn session(&self, id: Uuid) -> Result<Option<Session>, DebateError>;

    async fn sessions(&self) -> Result<Vec<Session>, DebateError>;

    /// Apply `update` atomically and return the updated session.
    ///
    /// If `update` fails the stored session is left unchanged.
    async fn update_session(&self, id: Uuid, update: SessionUpdate)
    -> Result<Session, DebateError>;

    async fn insert_roles(&self, roles: Vec<Role>) -> Result<(), DebateError>;

    async fn roles(&self, session_id: Uuid) -> Result<Vec<Role>, DebateError>;

    async fn insert_argument(&self, argument: Argument) -> Result<(), DebateError>;

    async fn argument(&self, id: Uuid) -> Result<Option<Argument>, DebateError>;

    /// Arguments of a session in the order they were stored.
    async fn arguments(&self, session_id: Uuid) -> Result<Vec<Argument>, DebateError>;

    async fn insert_moderator_message(&self, message: ModeratorMessage)
    -> Result<(), DebateError>;

    async fn moderator_messages(&self, session_id: Uuid)
    -> Result<Vec<ModeratorMessage>, DebateError>;

    /// Store one round's judge records together.
    async fn insert_round_scores(&self, records: Vec<RoundScoreRecord>)
    -> Result<(), DebateError>;

    async fn round_scores(&self, session_id: Uuid) -> Result<Vec<RoundScoreRecord>, DebateError>;

    async fn insert_scoring_rules(&self, rules: Vec<ScoringRule>) -> Result<(), DebateError>;

    async fn scoring_rules(&self, session_id: Uuid) -> Result<Vec<ScoringRule>, DebateError>;

    async fn insert_score_records(&self, records: Vec<ScoreRecord>) -> Result<(), DebateError>;

    async fn score_records(&self, argument_id: Uuid) -> Result<Vec<ScoreRecord>, DebateError>;
}

/// Complete store contents, as written to a snapshot file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub topics: BTreeMap<Uuid, Topic>,
    pub sessions: BTreeMap<Uuid, Session>,
    pub roles: Vec<Role>,
    pub arguments: Vec<Argument>,
    pub moderator_messages: Vec<ModeratorMessage>,
    pub round_scores: Vec<RoundScoreRecord>,
    pub scoring_rules: Vec<ScoringRule>,
    pub score_records: Vec<ScoreRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    /// Load a snapshot file, or start empty when it does not exist yet.
    pub async fn open(path: &Path) -> Result<Self, DebateError> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(Self::from_snapshot(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.state.read().await.clone()
    }

    /// Write the current state to `path` via a temp file and rename.
    pub async fn save(&self, path: &Path) -> Result<(), DebateError> {
        let json = {
            let state = self.state.read().await;
            serde_json::to_string_pretty(&*state)?
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json.as_bytes()).await?;
        fs::rename(&temp_path, path).await?;
        tracing::debug!(path = %path.display(), "store snapshot written");
        Ok(())
    }
}

#[async_trait]
impl DebateStore for MemoryStore {
    async fn insert_topic(&self, topic: Topic) -> Result<(), DebateError> {
        self.state.write().await.topics.insert(topic.id, topic);
        Ok(())
    }

    async fn topic(&self, id: Uuid) -> Result<Option<Topic>, DebateError> {
        Ok(self.state.read().await.topics.get(&id).cloned())
    }

    async fn insert_session(&self, session: Session) -> Result<(), DebateError> {
        self.state.write().await.sessions.insert(session.id, session);
        Ok(())
    }

    async fn session(&self, id: Uuid) -> Result<Option<Session>, DebateError> {
        Ok(self.state.read().await.sessions.get(&id).cloned())
    }

    async fn sessions(&self) -> Result<Vec<Session>, DebateError> {
        Ok(self.state.read().await.sessions.values().cloned().collect())
    }

    async fn update_session(
        &self,
        id: Uuid,
        update: SessionUpdate,
    ) -> Result<Session, DebateError> {
        let mut state = self.state.write().await;
        let stored = state
            .sessions
            .get_mut(&id)
            .ok_or(DebateError::SessionNotFound(id))?;

        let mut updated = stored.clone();
        update(&mut updated)?;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn insert_roles(&self, roles: Vec<Role>) -> Result<(), DebateError> {
        self.state.write().await.roles.extend(roles);
        Ok(())
    }

    async fn roles(&self, session_id: Uuid) -> Result<Vec<Role>, DebateError> {
        Ok(self
            .state
            .read()
            .await
            .roles
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn insert_argument(&self, argument: Argument) -> Result<(), DebateError> {
        self.state.write().await.arguments.push(argument);
        Ok(())
    }

    async fn argument(&self, id: Uuid) -> Result<Option<Argument>, DebateError> {
        Ok(self
            .state
            .read()
            .await
            .arguments
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn arguments(&self, session_id: Uuid) -> Result<Vec<Argument>, DebateError> {
        Ok(self
            .state
            .read()
            .await
            .arguments
            .iter()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn insert_moderator_message(
        &self,
        message: ModeratorMessage,
    ) -> Result<(), DebateError> {
        self.state.write().await.moderator_messages.push(message);
        Ok(())
    }

    async fn moderator_messages(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ModeratorMessage>, DebateError> {
        Ok(self
            .state
            .read()
            .await
            .moderator_messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn insert_round_scores(
        &self,
        records: Vec<RoundScoreRecord>,
    ) -> Result<(), DebateError> {
        self.state.write().await.round_scores.extend(records);
        Ok(())
    }

    async fn round_scores(&self, session_id: Uuid) -> Result<Vec<RoundScoreRecord>, DebateError> {
        Ok(self
            .state
            .read()
            .await
            .round_scores
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn insert_scoring_rules(&self, rules: Vec<ScoringRule>) -> Result<(), DebateError> {
        self.state.write().await.scoring_rules.extend(rules);
        Ok(())
    }

    async fn scoring_rules(&self, session_id: Uuid) -> Result<Vec<ScoringRule>, DebateError> {
        Ok(self
            .state
            .read()
            .await
            .scoring_rules
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn insert_score_records(&self, records: Vec<ScoreRecord>) -> Result<(), DebateError> {
        self.state.write().await.score_records.extend(records);
        Ok(())
    }

    async fn score_records(&self, argument_id: Uuid) -> Result<Vec<ScoreRecord>, DebateError> {
        Ok(self
            .state
            .read()
            .await
            .score_records
            .iter()
            .filter(|r| r.argument_id == argument_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::{Persona, Side};
    use crate::session::{Language, SessionParams, SessionStatus, Speed};
    use tempfile::TempDir;

    fn session() -> Session {
        Session::new(SessionParams {
            topic_id: Uuid::new_v4(),
            affirmative: Persona::new("Analytical", "Expert"),
            negative: Persona::new("Passionate", "Expert"),
            speed: Speed::Fast,
            rounds: 3,
            language: Language::En,
        })
    }

    #[tokio::test]
    async fn test_update_session_applies_atomically() {
        let store = MemoryStore::new();
        let s = session();
        let id = s.id;
        store.insert_session(s).await.unwrap();

        let updated = store
            .update_session(id, Box::new(|s: &mut Session| s.start()))
            .await
            .unwrap();
        assert_eq!(updated.status, SessionStatus::InProgress);

        let err = store.update_session(id, Box::new(|s: &mut Session| s.start())).await;
        assert!(matches!(err, Err(DebateError::InvalidTransition { .. })));
        let stored = store.session(id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::InProgress);
    }

    #[tokio::test]
    async fn test_failed_update_leaves_session_untouched() {
        let store = MemoryStore::new();
        let s = session();
        let id = s.id;
        store.insert_session(s).await.unwrap();

        let result = store
            .update_session(
                id,
                Box::new(|s: &mut Session| {
                    s.pause_requested = true;
                    Err(DebateError::InvalidRoundCount)
                }),
            )
            .await;
        assert!(result.is_err());
        assert!(!store.session(id).await.unwrap().unwrap().pause_requested);
    }

    #[tokio::test]
    async fn test_update_unknown_session() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        let result = store.update_session(id, Box::new(|_: &mut Session| Ok(()))).await;
        assert!(matches!(result, Err(DebateError::SessionNotFound(missing)) if missing == id));
    }

    #[tokio::test]
    async fn test_arguments_keep_insertion_order() {
        let store = MemoryStore::new();
        let session_id = Uuid::new_v4();
        let role = Uuid::new_v4();
        for (round, side) in [(1, Side::Affirmative), (1, Side::Negative), (2, Side::Affirmative)] {
            store
                .insert_argument(Argument::new(session_id, role, side, round, format!("r{}", round)))
                .await
                .unwrap();
        }
        store
            .insert_argument(Argument::new(Uuid::new_v4(), role, Side::Negative, 1, "other".into()))
            .await
            .unwrap();

        let args = store.arguments(session_id).await.unwrap();
        let order: Vec<_> = args.iter().map(|a| (a.round, a.side)).collect();
        assert_eq!(
            order,
            vec![(1, Side::Affirmative), (1, Side::Negative), (2, Side::Affirmative)]
        );
    }

    #[tokio::test]
    async fn test_snapshot_save_and_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/debates.json");

        let store = MemoryStore::new();
        let topic = Topic::new("Should AI be regulated?", "");
        let topic_id = topic.id;
        store.insert_topic(topic).await.unwrap();
        let s = session();
        let session_id = s.id;
        store.insert_session(s).await.unwrap();
        store.save(&path).await.unwrap();

        let reopened = MemoryStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.topic(topic_id).await.unwrap().unwrap().title,
            "Should AI be regulated?"
        );
        assert!(reopened.session(session_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_open_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::open(&dir.path().join("absent.json")).await.unwrap();
        assert!(store.sessions().await.unwrap().is_empty());
    }
}
