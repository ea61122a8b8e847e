//! Conversation registry: the single source of truth for which
//! conversations are active and the sole gatekeeper for conversation
//! mutation. State is memory-resident for the process lifetime; nothing
//! here suspends or retries. Errors are structural, never transient.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::models::{self, ReasoningEffort};

/// Fixed temperature applied when a reasoning model is selected.
const REASONING_TEMPERATURE: f64 = 1.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("You already have an active conversation in this channel. Please finish it before starting a new one.")]
    AlreadyActive,

    #[error("No active conversation found.")]
    NotFound,

    /// The acting user is not the conversation owner. Deliberately says
    /// nothing about the conversation itself.
    #[error("You are not allowed to do that.")]
    Unauthorized,

    #[error("There is not enough history to regenerate a response.")]
    InsufficientHistory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    Image(String),
}

/// Content of one turn. Conversion to a provider wire shape happens at the
/// collaborator boundary, never here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnContent {
    Text(String),
    Image(String),
    Mixed(Vec<ContentPart>),
}

impl TurnContent {
    pub fn is_empty(&self) -> bool {
        match self {
            TurnContent::Text(t) => t.trim().is_empty(),
            TurnContent::Image(url) => url.is_empty(),
            TurnContent::Mixed(parts) => parts.is_empty(),
        }
    }

    /// Prepend `preface` to the leading text of this content. Used to fold
    /// a persona into the first user turn for models that reject a system
    /// turn.
    fn with_preface(self, preface: &str) -> TurnContent {
        match self {
            TurnContent::Text(t) => TurnContent::Text(format!("{preface}\n\n{t}")),
            TurnContent::Image(url) => TurnContent::Mixed(vec![
                ContentPart::Text(preface.to_string()),
                ContentPart::Image(url),
            ]),
            TurnContent::Mixed(mut parts) => {
                match parts.first_mut() {
                    Some(ContentPart::Text(t)) => {
                        *t = format!("{preface}\n\n{t}");
                    }
                    _ => parts.insert(0, ContentPart::Text(preface.to_string())),
                }
                TurnContent::Mixed(parts)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: TurnRole,
    pub content: TurnContent,
}

/// Sampling parameters carried by a conversation. All optional; unset
/// values are omitted from provider calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenParams {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub seed: Option<i64>,
    pub reasoning_effort: Option<ReasoningEffort>,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: u64,
    pub channel_id: u64,
    /// The only user permitted to drive this conversation.
    pub owner_id: u64,
    pub model: String,
    pub persona: String,
    pub params: GenParams,
    /// Ordered, append-only turn history.
    pub turns: Vec<Turn>,
    pub paused: bool,
    /// Most recent provider response id, when the provider chains turns
    /// server-side.
    pub last_response_id: Option<String>,
    /// Ordered history of response ids; regeneration pops the newest so
    /// the next call chains from the prior one.
    pub response_ids: Vec<String>,
    /// `turns.len()` at the moment each response id was chained. The last
    /// entry is the prefix of `turns` the provider has acknowledged.
    pub chained_turns: Vec<usize>,
}

impl Conversation {
    /// Central inbound guard: paused conversations ignore new messages
    /// entirely (dropped, not queued), and only the owner may drive the
    /// exchange.
    pub fn accepts_inbound_from(&self, user_id: u64) -> bool {
        !self.paused && user_id == self.owner_id
    }

    /// Number of leading turns covered by the response chain. Turns past
    /// this point have not been acknowledged by the provider and must go
    /// into the next request, a turn kept from a failed call included.
    pub fn turns_acknowledged(&self) -> usize {
        self.chained_turns.last().copied().unwrap_or(0)
    }
}

pub struct NewConversation {
    pub owner_id: u64,
    pub channel_id: u64,
    pub model: String,
    pub persona: String,
    pub params: GenParams,
    pub first_prompt: TurnContent,
}

/// In-memory conversation store. All mutation goes through the named
/// operations below; callers never touch the map directly.
#[derive(Default)]
pub struct ConversationRegistry {
    next_id: AtomicU64,
    inner: Mutex<HashMap<u64, Conversation>>,
    /// Per-conversation locks serializing the append / provider-call /
    /// append sequence when events for one conversation overlap.
    locks: Mutex<HashMap<u64, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a conversation for `(owner, channel)`. Fails with
    /// `AlreadyActive` when one already exists for that pair.
    ///
    /// Persona policy, decided once here: reasoning models get the persona
    /// folded into the first user turn and run with a fixed temperature
    /// and no nucleus-sampling override; other models get a separate
    /// system turn.
    pub fn start_conversation(
        &self,
        req: NewConversation,
    ) -> Result<Conversation, RegistryError> {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        if inner
            .values()
            .any(|c| c.owner_id == req.owner_id && c.channel_id == req.channel_id)
        {
            return Err(RegistryError::AlreadyActive);
        }

        let mut params = req.params;
        let mut turns = Vec::new();
        if models::is_reasoning_model(&req.model) {
            params.temperature = Some(REASONING_TEMPERATURE);
            params.top_p = None;
            turns.push(Turn {
                role: TurnRole::User,
                content: req.first_prompt.with_preface(&req.persona),
            });
        } else {
            params.reasoning_effort = None;
            turns.push(Turn {
                role: TurnRole::System,
                content: TurnContent::Text(req.persona.clone()),
            });
            turns.push(Turn {
                role: TurnRole::User,
                content: req.first_prompt,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let conversation = Conversation {
            id,
            channel_id: req.channel_id,
            owner_id: req.owner_id,
            model: req.model,
            persona: req.persona,
            params,
            turns,
            paused: false,
            last_response_id: None,
            response_ids: Vec::new(),
            chained_turns: Vec::new(),
        };
        inner.insert(id, conversation.clone());
        Ok(conversation)
    }

    pub fn find(&self, id: u64) -> Option<Conversation> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        inner.get(&id).cloned()
    }

    /// The active-conversation invariant means at most one entry can
    /// match, so scan order does not matter.
    pub fn find_by_user_and_channel(&self, user_id: u64, channel_id: u64) -> Option<Conversation> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        inner
            .values()
            .find(|c| c.owner_id == user_id && c.channel_id == channel_id)
            .cloned()
    }

    pub fn append_turn(
        &self,
        id: u64,
        actor_id: u64,
        role: TurnRole,
        content: TurnContent,
    ) -> Result<Conversation, RegistryError> {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let conversation = inner.get_mut(&id).ok_or(RegistryError::NotFound)?;
        if actor_id != conversation.owner_id {
            return Err(RegistryError::Unauthorized);
        }
        conversation.turns.push(Turn { role, content });
        Ok(conversation.clone())
    }

    /// Record a provider response id after a successful generation call.
    pub fn chain_response(
        &self,
        id: u64,
        actor_id: u64,
        response_id: String,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let conversation = inner.get_mut(&id).ok_or(RegistryError::NotFound)?;
        if actor_id != conversation.owner_id {
            return Err(RegistryError::Unauthorized);
        }
        conversation.last_response_id = Some(response_id.clone());
        conversation.response_ids.push(response_id);
        conversation.chained_turns.push(conversation.turns.len());
        Ok(())
    }

    /// Remove the most recent user/assistant turn pair so the exchange can
    /// be re-issued. Also rolls back the newest response id so the next
    /// call chains from the prior one. Returns the dropped pair.
    pub fn regenerate_last_turn(
        &self,
        id: u64,
        actor_id: u64,
    ) -> Result<(Turn, Turn), RegistryError> {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let conversation = inner.get_mut(&id).ok_or(RegistryError::NotFound)?;
        if actor_id != conversation.owner_id {
            return Err(RegistryError::Unauthorized);
        }

        let n = conversation.turns.len();
        let pair_present = n >= 2
            && conversation.turns[n - 1].role == TurnRole::Assistant
            && conversation.turns[n - 2].role == TurnRole::User;
        if !pair_present {
            return Err(RegistryError::InsufficientHistory);
        }

        let assistant = conversation.turns.pop().expect("checked above");
        let user = conversation.turns.pop().expect("checked above");
        conversation.response_ids.pop();
        conversation.chained_turns.pop();
        conversation.last_response_id = conversation.response_ids.last().cloned();
        Ok((user, assistant))
    }

    pub fn set_paused(
        &self,
        id: u64,
        actor_id: u64,
        paused: bool,
    ) -> Result<Conversation, RegistryError> {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let conversation = inner.get_mut(&id).ok_or(RegistryError::NotFound)?;
        if actor_id != conversation.owner_id {
            return Err(RegistryError::Unauthorized);
        }
        conversation.paused = paused;
        Ok(conversation.clone())
    }

    pub fn end_conversation(&self, id: u64, actor_id: u64) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let conversation = inner.get(&id).ok_or(RegistryError::NotFound)?;
        if actor_id != conversation.owner_id {
            return Err(RegistryError::Unauthorized);
        }
        inner.remove(&id);
        drop(inner);
        let mut locks = self.locks.lock().expect("registry lock poisoned");
        locks.remove(&id);
        Ok(())
    }

    /// Lock serializing turn processing for one conversation. Hold it
    /// across the whole append / provider-call / append sequence.
    pub fn turn_lock(&self, id: u64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("registry lock poisoned");
        locks.entry(id).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: u64 = 100;
    const STRANGER: u64 = 200;
    const CHANNEL: u64 = 555;

    fn new_request(model: &str) -> NewConversation {
        NewConversation {
            owner_id: OWNER,
            channel_id: CHANNEL,
            model: model.to_string(),
            persona: "You are a helpful assistant.".to_string(),
            params: GenParams {
                temperature: Some(0.5),
                top_p: Some(0.8),
                ..GenParams::default()
            },
            first_prompt: TurnContent::Text("Hello!".to_string()),
        }
    }

    fn started(registry: &ConversationRegistry, model: &str) -> Conversation {
        registry.start_conversation(new_request(model)).unwrap()
    }

    #[test]
    fn test_start_seeds_system_and_user_turns() {
        let registry = ConversationRegistry::new();
        let convo = started(&registry, "gpt-4.1");
        assert_eq!(convo.turns.len(), 2);
        assert_eq!(convo.turns[0].role, TurnRole::System);
        assert_eq!(convo.turns[1].role, TurnRole::User);
        assert_eq!(convo.params.temperature, Some(0.5));
        assert_eq!(convo.params.top_p, Some(0.8));
    }

    #[test]
    fn test_start_reasoning_model_merges_persona_and_fixes_sampling() {
        let registry = ConversationRegistry::new();
        let convo = started(&registry, "o1");
        assert_eq!(convo.turns.len(), 1);
        assert_eq!(convo.turns[0].role, TurnRole::User);
        assert_eq!(
            convo.turns[0].content,
            TurnContent::Text("You are a helpful assistant.\n\nHello!".to_string())
        );
        assert_eq!(convo.params.temperature, Some(1.0));
        assert_eq!(convo.params.top_p, None);
    }

    #[test]
    fn test_second_start_in_same_channel_rejected() {
        let registry = ConversationRegistry::new();
        started(&registry, "gpt-4.1");
        let err = registry.start_conversation(new_request("gpt-4.1")).unwrap_err();
        assert_eq!(err, RegistryError::AlreadyActive);
    }

    #[test]
    fn test_same_user_different_channel_allowed() {
        let registry = ConversationRegistry::new();
        started(&registry, "gpt-4.1");
        let mut other = new_request("gpt-4.1");
        other.channel_id = CHANNEL + 1;
        assert!(registry.start_conversation(other).is_ok());
    }

    #[test]
    fn test_start_after_end_allowed() {
        let registry = ConversationRegistry::new();
        let convo = started(&registry, "gpt-4.1");
        registry.end_conversation(convo.id, OWNER).unwrap();
        assert!(registry.start_conversation(new_request("gpt-4.1")).is_ok());
    }

    #[test]
    fn test_append_by_stranger_unauthorized_and_history_unchanged() {
        let registry = ConversationRegistry::new();
        let convo = started(&registry, "gpt-4.1");
        let err = registry
            .append_turn(
                convo.id,
                STRANGER,
                TurnRole::User,
                TurnContent::Text("hijack".into()),
            )
            .unwrap_err();
        assert_eq!(err, RegistryError::Unauthorized);
        assert_eq!(registry.find(convo.id).unwrap().turns.len(), 2);
    }

    #[test]
    fn test_append_unknown_conversation_not_found() {
        let registry = ConversationRegistry::new();
        let err = registry
            .append_turn(99, OWNER, TurnRole::User, TurnContent::Text("x".into()))
            .unwrap_err();
        assert_eq!(err, RegistryError::NotFound);
    }

    #[test]
    fn test_regenerate_without_pair_insufficient() {
        let registry = ConversationRegistry::new();
        let convo = started(&registry, "gpt-4.1");
        // Seeded history has a trailing user turn but no assistant yet.
        let err = registry.regenerate_last_turn(convo.id, OWNER).unwrap_err();
        assert_eq!(err, RegistryError::InsufficientHistory);
        assert_eq!(registry.find(convo.id).unwrap().turns.len(), 2);
    }

    #[test]
    fn test_regenerate_removes_pair_and_rolls_back_response_id() {
        let registry = ConversationRegistry::new();
        let convo = started(&registry, "gpt-4.1");
        registry
            .append_turn(
                convo.id,
                OWNER,
                TurnRole::Assistant,
                TurnContent::Text("first answer".into()),
            )
            .unwrap();
        registry
            .chain_response(convo.id, OWNER, "resp_1".into())
            .unwrap();
        registry
            .append_turn(convo.id, OWNER, TurnRole::User, TurnContent::Text("more".into()))
            .unwrap();
        registry
            .append_turn(
                convo.id,
                OWNER,
                TurnRole::Assistant,
                TurnContent::Text("second answer".into()),
            )
            .unwrap();
        registry
            .chain_response(convo.id, OWNER, "resp_2".into())
            .unwrap();

        let (user, assistant) = registry.regenerate_last_turn(convo.id, OWNER).unwrap();
        assert_eq!(user.content, TurnContent::Text("more".into()));
        assert_eq!(assistant.content, TurnContent::Text("second answer".into()));

        let after = registry.find(convo.id).unwrap();
        assert_eq!(after.turns.len(), 3);
        assert_eq!(after.last_response_id, Some("resp_1".into()));
        assert_eq!(after.response_ids, vec!["resp_1".to_string()]);
    }

    #[test]
    fn test_chain_tracks_acknowledged_turns() {
        let registry = ConversationRegistry::new();
        let convo = started(&registry, "gpt-4.1");
        assert_eq!(convo.turns_acknowledged(), 0);

        registry
            .append_turn(
                convo.id,
                OWNER,
                TurnRole::Assistant,
                TurnContent::Text("first answer".into()),
            )
            .unwrap();
        registry
            .chain_response(convo.id, OWNER, "resp_1".into())
            .unwrap();
        assert_eq!(registry.find(convo.id).unwrap().turns_acknowledged(), 3);

        registry
            .append_turn(convo.id, OWNER, TurnRole::User, TurnContent::Text("more".into()))
            .unwrap();
        registry
            .append_turn(
                convo.id,
                OWNER,
                TurnRole::Assistant,
                TurnContent::Text("second answer".into()),
            )
            .unwrap();
        registry
            .chain_response(convo.id, OWNER, "resp_2".into())
            .unwrap();
        assert_eq!(registry.find(convo.id).unwrap().turns_acknowledged(), 5);

        registry.regenerate_last_turn(convo.id, OWNER).unwrap();
        let after = registry.find(convo.id).unwrap();
        assert_eq!(after.turns_acknowledged(), 3);
        assert_eq!(after.last_response_id, Some("resp_1".into()));
    }

    #[test]
    fn test_turn_kept_after_failed_call_stays_unacknowledged() {
        let registry = ConversationRegistry::new();
        let convo = started(&registry, "gpt-4.1");
        registry
            .append_turn(
                convo.id,
                OWNER,
                TurnRole::Assistant,
                TurnContent::Text("answer".into()),
            )
            .unwrap();
        registry
            .chain_response(convo.id, OWNER, "resp_1".into())
            .unwrap();

        // A user turn whose provider call failed stays in history but is
        // never acknowledged.
        let convo = registry
            .append_turn(convo.id, OWNER, TurnRole::User, TurnContent::Text("lost?".into()))
            .unwrap();
        assert_eq!(convo.turns[convo.turns_acknowledged()..].len(), 1);

        // The next inbound turn rides along with it.
        let convo = registry
            .append_turn(
                convo.id,
                OWNER,
                TurnRole::User,
                TurnContent::Text("still there?".into()),
            )
            .unwrap();
        let pending = &convo.turns[convo.turns_acknowledged()..];
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|t| t.role == TurnRole::User));
    }

    #[test]
    fn test_regenerate_by_stranger_unauthorized() {
        let registry = ConversationRegistry::new();
        let convo = started(&registry, "gpt-4.1");
        registry
            .append_turn(
                convo.id,
                OWNER,
                TurnRole::Assistant,
                TurnContent::Text("answer".into()),
            )
            .unwrap();
        let err = registry.regenerate_last_turn(convo.id, STRANGER).unwrap_err();
        assert_eq!(err, RegistryError::Unauthorized);
        assert_eq!(registry.find(convo.id).unwrap().turns.len(), 3);
    }

    #[test]
    fn test_pause_drops_inbound_and_resume_restores() {
        let registry = ConversationRegistry::new();
        let convo = started(&registry, "gpt-4.1");
        assert!(convo.accepts_inbound_from(OWNER));

        let paused = registry.set_paused(convo.id, OWNER, true).unwrap();
        assert!(paused.paused);
        assert!(!paused.accepts_inbound_from(OWNER));

        let resumed = registry.set_paused(convo.id, OWNER, false).unwrap();
        assert!(resumed.accepts_inbound_from(OWNER));
        assert!(!resumed.accepts_inbound_from(STRANGER));
    }

    #[test]
    fn test_end_then_operations_not_found() {
        let registry = ConversationRegistry::new();
        let convo = started(&registry, "gpt-4.1");
        registry.end_conversation(convo.id, OWNER).unwrap();
        assert_eq!(
            registry.set_paused(convo.id, OWNER, true).unwrap_err(),
            RegistryError::NotFound
        );
        assert_eq!(
            registry.end_conversation(convo.id, OWNER).unwrap_err(),
            RegistryError::NotFound
        );
        assert!(registry.find_by_user_and_channel(OWNER, CHANNEL).is_none());
    }

    #[test]
    fn test_end_by_stranger_unauthorized() {
        let registry = ConversationRegistry::new();
        let convo = started(&registry, "gpt-4.1");
        assert_eq!(
            registry.end_conversation(convo.id, STRANGER).unwrap_err(),
            RegistryError::Unauthorized
        );
        assert!(registry.find(convo.id).is_some());
    }

    #[test]
    fn test_preface_merging_for_mixed_content() {
        let content = TurnContent::Mixed(vec![
            ContentPart::Text("look at this".into()),
            ContentPart::Image("https://example.test/cat.png".into()),
        ]);
        let merged = content.with_preface("Be terse.");
        match merged {
            TurnContent::Mixed(parts) => {
                assert_eq!(parts[0], ContentPart::Text("Be terse.\n\nlook at this".into()));
                assert_eq!(parts.len(), 2);
            }
            other => panic!("expected mixed content, got {other:?}"),
        }
    }

    #[test]
    fn test_preface_merging_for_image_only_content() {
        let merged = TurnContent::Image("https://example.test/cat.png".into())
            .with_preface("Be terse.");
        match merged {
            TurnContent::Mixed(parts) => {
                assert_eq!(parts[0], ContentPart::Text("Be terse.".into()));
                assert_eq!(parts[1], ContentPart::Image("https://example.test/cat.png".into()));
            }
            other => panic!("expected mixed content, got {other:?}"),
        }
    }

    #[test]
    fn test_turn_lock_is_shared_per_conversation() {
        let registry = ConversationRegistry::new();
        let convo = started(&registry, "gpt-4.1");
        let a = registry.turn_lock(convo.id);
        let b = registry.turn_lock(convo.id);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
