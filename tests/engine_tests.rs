//! Tests for the dialogue engine state machine

mod common;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

use common::TestHarness;
use guided_dialog::{
    DialogueEngine, DialogueNode, DialogueStore, DomainError, DomainResult, DocumentStore,
    EngineConfig, MemoryDocumentStore, UserInput, VersionGuard, VersionedDoc,
};

fn node(id: &str, actions: &[&str], transitions: &[(&str, &str)]) -> DialogueNode {
    DialogueNode {
        id: id.to_string(),
        prompt: format!("prompt for {id}"),
        actions: actions.iter().map(|a| a.to_string()).collect(),
        transitions: transitions
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

/// The three-node script used throughout: start -> ask_name -> done
async fn seed_script(store: &DialogueStore) {
    store
        .save_node(&node(
            "start",
            &["ok", "cancel"],
            &[("ok", "ask_name"), ("cancel", "start")],
        ))
        .await
        .unwrap();
    store
        .save_node(&node("ask_name", &[], &[("answer", "done")]))
        .await
        .unwrap();
    store.save_node(&node("done", &[], &[])).await.unwrap();
}

#[tokio::test]
async fn empty_log_begins_at_entry_node_regardless_of_input() {
    let harness = TestHarness::new();
    seed_script(&harness.store).await;

    for input in [
        UserInput::Action("ok".to_string()),
        UserInput::Text("hello".to_string()),
    ] {
        let account_id = Uuid::new_v4();
        let result = harness.engine.advance(account_id, &input).await.unwrap();

        assert!(result.started);
        assert_eq!(result.message.text, "prompt for start");

        let (log, _) = harness.store.load_log(account_id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].node_id, "start");
        assert!(log[0].is_pending());
    }
}

#[tokio::test]
async fn scripted_walkthrough_advances_through_the_nodes() {
    let harness = TestHarness::new();
    seed_script(&harness.store).await;
    let account_id = Uuid::new_v4();

    // First event: conversation begins, start is pending
    harness
        .engine
        .advance(account_id, &UserInput::Action("ok".to_string()))
        .await
        .unwrap();

    // Second event: ok moves to ask_name
    let result = harness
        .engine
        .advance(account_id, &UserInput::Action("ok".to_string()))
        .await
        .unwrap();
    assert!(!result.started);
    assert_eq!(result.message.text, "prompt for ask_name");

    let (log, _) = harness.store.load_log(account_id).await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].node_id, "start");
    assert_eq!(log[0].chosen_action, "ok");
    assert_eq!(log[1].node_id, "ask_name");
    assert!(log[1].is_pending());

    // Third event: the free-text answer moves to done
    let result = harness
        .engine
        .advance(account_id, &UserInput::Text("Jane".to_string()))
        .await
        .unwrap();
    assert_eq!(result.message.text, "prompt for done");

    let (log, _) = harness.store.load_log(account_id).await.unwrap();
    assert_eq!(log.len(), 3);
    assert_eq!(log[1].answer_text, "Jane");
    assert_eq!(log[1].chosen_action, "");
    assert_eq!(log[2].node_id, "done");
    assert!(log[2].is_pending());
}

#[tokio::test]
async fn cancel_collapses_the_log_to_the_entered_node() {
    let harness = TestHarness::new();
    seed_script(&harness.store).await;
    let account_id = Uuid::new_v4();

    harness
        .engine
        .advance(account_id, &UserInput::Action("ok".to_string()))
        .await
        .unwrap();
    let result = harness
        .engine
        .advance(account_id, &UserInput::Action("cancel".to_string()))
        .await
        .unwrap();
    assert_eq!(result.message.text, "prompt for start");

    let (log, _) = harness.store.load_log(account_id).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].node_id, "start");
    assert!(log[0].is_pending());
}

#[tokio::test]
async fn unknown_transition_records_the_press_and_stalls() {
    let harness = TestHarness::new();
    seed_script(&harness.store).await;
    let account_id = Uuid::new_v4();

    harness
        .engine
        .advance(account_id, &UserInput::Action("ok".to_string()))
        .await
        .unwrap();

    let result = harness
        .engine
        .advance(account_id, &UserInput::Action("maybe".to_string()))
        .await;
    assert!(matches!(
        result,
        Err(DomainError::UnknownTransition { ref node_id, ref input })
            if node_id == "start" && input == "maybe"
    ));

    // The button press is recorded, no new pending entry is appended, and
    // the derivable current node is unchanged.
    let (log, _) = harness.store.load_log(account_id).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].node_id, "start");
    assert_eq!(log[0].chosen_action, "maybe");
    assert!(!log[0].is_pending());

    // A recognized edge: after the stall the next valid press still advances
    let result = harness
        .engine
        .advance(account_id, &UserInput::Action("ok".to_string()))
        .await
        .unwrap();
    assert_eq!(result.message.text, "prompt for ask_name");
}

#[tokio::test]
async fn duplicate_button_press_does_not_double_advance() {
    let harness = TestHarness::new();
    seed_script(&harness.store).await;
    let account_id = Uuid::new_v4();

    harness
        .engine
        .advance(account_id, &UserInput::Action("ok".to_string()))
        .await
        .unwrap();
    harness
        .engine
        .advance(account_id, &UserInput::Action("ok".to_string()))
        .await
        .unwrap();

    // The redelivered press finds ask_name pending, which has no "ok" edge,
    // so the conversation stays at ask_name instead of skipping past it.
    let duplicate = harness
        .engine
        .advance(account_id, &UserInput::Action("ok".to_string()))
        .await;
    assert!(matches!(
        duplicate,
        Err(DomainError::UnknownTransition { .. })
    ));

    let (log, _) = harness.store.load_log(account_id).await.unwrap();
    assert_eq!(log.last().unwrap().node_id, "ask_name");
}

#[tokio::test]
async fn concurrent_advances_for_one_account_are_serialized() {
    let harness = TestHarness::new();
    seed_script(&harness.store).await;
    let account_id = Uuid::new_v4();

    let first = {
        let engine = harness.engine.clone();
        tokio::spawn(async move {
            engine
                .advance(account_id, &UserInput::Action("ok".to_string()))
                .await
        })
    };
    let second = {
        let engine = harness.engine.clone();
        tokio::spawn(async move {
            engine
                .advance(account_id, &UserInput::Action("ok".to_string()))
                .await
        })
    };

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    // One event began the conversation, the other advanced it; neither
    // overwrote the other's contribution.
    let (log, _) = harness.store.load_log(account_id).await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].node_id, "start");
    assert_eq!(log[0].chosen_action, "ok");
    assert_eq!(log[1].node_id, "ask_name");
    assert!(log[1].is_pending());
}

/// Document store that fails the first N log writes with a conflict
struct ConflictingStore {
    inner: MemoryDocumentStore,
    remaining_conflicts: AtomicU32,
}

impl ConflictingStore {
    fn new(conflicts: u32) -> Self {
        Self {
            inner: MemoryDocumentStore::new(),
            remaining_conflicts: AtomicU32::new(conflicts),
        }
    }
}

#[async_trait]
impl DocumentStore for ConflictingStore {
    async fn get(&self, collection: &str, id: &str) -> DomainResult<Option<VersionedDoc>> {
        self.inner.get(collection, id).await
    }

    async fn put(
        &self,
        collection: &str,
        id: &str,
        value: Value,
        guard: VersionGuard,
    ) -> DomainResult<u64> {
        if collection == "response_logs" {
            let remaining = self.remaining_conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.remaining_conflicts
                    .store(remaining - 1, Ordering::SeqCst);
                return Err(DomainError::WriteConflict {
                    account_id: Uuid::nil(),
                });
            }
        }
        self.inner.put(collection, id, value, guard).await
    }

    async fn delete(&self, collection: &str, id: &str) -> DomainResult<()> {
        self.inner.delete(collection, id).await
    }

    async fn list_ids(&self, collection: &str, prefix: &str) -> DomainResult<Vec<String>> {
        self.inner.list_ids(collection, prefix).await
    }
}

async fn engine_over(conflicts: u32) -> (DialogueEngine, Arc<DialogueStore>) {
    let store = Arc::new(DialogueStore::new(Arc::new(ConflictingStore::new(
        conflicts,
    ))));
    seed_script(&store).await;
    (
        DialogueEngine::new(store.clone(), EngineConfig::default()),
        store,
    )
}

#[tokio::test]
async fn write_conflicts_are_retried_within_the_bound() {
    let (engine, store) = engine_over(2).await;
    let account_id = Uuid::new_v4();

    // Two conflicts, three attempts allowed: the advance succeeds
    let result = engine
        .advance(account_id, &UserInput::Text("hi".to_string()))
        .await
        .unwrap();
    assert!(result.started);

    let (log, _) = store.load_log(account_id).await.unwrap();
    assert_eq!(log.len(), 1);
}

#[tokio::test]
async fn exhausted_retries_surface_a_retryable_conflict() {
    let (engine, store) = engine_over(10).await;
    let account_id = Uuid::new_v4();

    let result = engine
        .advance(account_id, &UserInput::Text("hi".to_string()))
        .await;
    match result {
        Err(err) => assert!(err.is_retryable()),
        Ok(_) => panic!("expected exhausted retries to fail"),
    }

    let (log, _) = store.load_log(account_id).await.unwrap();
    assert!(log.is_empty());
}

#[tokio::test]
async fn terminal_node_stalls_on_any_further_input() {
    let harness = TestHarness::new();
    seed_script(&harness.store).await;
    let account_id = Uuid::new_v4();

    for input in [
        UserInput::Action("ok".to_string()),
        UserInput::Action("ok".to_string()),
        UserInput::Text("Jane".to_string()),
    ] {
        harness.engine.advance(account_id, &input).await.unwrap();
    }

    // done has an empty transition map: implicitly terminal
    let result = harness
        .engine
        .advance(account_id, &UserInput::Text("anything".to_string()))
        .await;
    assert!(matches!(result, Err(DomainError::UnknownTransition { .. })));

    let (log, _) = harness.store.load_log(account_id).await.unwrap();
    assert_eq!(log.last().unwrap().node_id, "done");
}
