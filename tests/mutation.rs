mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedTransport, Step};
use context_sync::error::{ErrorKind, SyncError};
use context_sync::mutation::{Collection, CollectionSpec};
use context_sync::revalidate::RevalidatingClient;
use context_sync_core::entity_cache::{keys, EntityCache};
use context_sync_core::models::{Method, Project, Task};
use context_sync_core::optimistic::{LocalId, Tracked};

struct Fixture {
    transport: Arc<ScriptedTransport>,
    cache: Arc<EntityCache>,
    projects: Arc<Collection<Project>>,
}

fn fixture() -> Fixture {
    let transport = ScriptedTransport::new();
    let client = Arc::new(RevalidatingClient::new(
        transport.clone(),
        "http://api.test",
        Duration::from_secs(5),
    ));
    let cache = Arc::new(EntityCache::new());
    let projects = Arc::new(Collection::new(
        CollectionSpec::projects(),
        client,
        cache.clone(),
    ));
    Fixture {
        transport,
        cache,
        projects,
    }
}

fn ids(items: &[Tracked<Project>]) -> Vec<String> {
    items
        .iter()
        .map(|t| t.entity.id.clone().unwrap_or_else(|| "<pending>".to_string()))
        .collect()
}

async fn seed(f: &Fixture, body: &str) {
    f.transport.respond(200, body);
    f.projects.refresh().await.unwrap();
}

/// Let spawned tasks run until `done` holds.
async fn settle_until(done: impl Fn() -> bool) {
    for _ in 0..100 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn test_create_is_visible_before_the_server_answers() {
    let f = fixture();
    seed(&f, r#"{"projects":[{"id":"a","title":"Alpha"}]}"#).await;
    let gate = f.transport.gated(200, r#"{"project":{"id":"n1","title":"New"}}"#);

    let projects = f.projects.clone();
    let pending = tokio::spawn(async move { projects.create(Project::draft("New")).await });
    settle_until(|| f.projects.pending() == 1).await;

    let view = f.projects.snapshot();
    assert_eq!(ids(&view), vec!["<pending>", "a"]);
    assert!(view[0].is_optimistic);
    assert!(LocalId::is_local(view[0].local_id.as_ref().unwrap().as_str()));

    let published = f.cache.get(&keys::projects()).unwrap().value;
    assert_eq!(published[0]["_optimistic"], true);
    assert_eq!(published[0]["title"], "New");

    gate.notify_one();
    let created = pending.await.unwrap().unwrap();
    assert_eq!(created.id.as_deref(), Some("n1"));

    let view = f.projects.snapshot();
    assert_eq!(ids(&view), vec!["n1", "a"]);
    assert!(!view[0].is_optimistic);
    assert_eq!(f.projects.pending(), 0);
}

#[tokio::test]
async fn test_invalid_draft_makes_no_request() {
    let f = fixture();
    let err = f.projects.create(Project::draft("   ")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(f.transport.requests().is_empty());
    assert!(f.projects.snapshot().is_empty());
}

#[tokio::test]
async fn test_network_failure_rolls_back_create() {
    let f = fixture();
    seed(&f, r#"[{"id":"a","title":"Alpha"},{"id":"b","title":"Beta"}]"#).await;
    let before = f.projects.snapshot();
    f.transport
        .push(Step::Fail(SyncError::network("connection refused")));

    let err = f.projects.create(Project::draft("New")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(f.projects.snapshot(), before);
}

#[tokio::test]
async fn test_malformed_success_payload_rolls_back() {
    let f = fixture();
    seed(&f, r#"[{"id":"a","title":"Alpha"}]"#).await;
    f.transport.respond(201, r#"{"ok":true}"#);

    let err = f.projects.create(Project::draft("New")).await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidResponse(_)));
    assert_eq!(ids(&f.projects.snapshot()), vec!["a"]);
}

#[tokio::test]
async fn test_update_failure_restores_previous_copy() {
    let f = fixture();
    seed(&f, r#"[{"id":"a","title":"Alpha"},{"id":"b","title":"Beta"}]"#).await;
    f.transport.respond(500, r#"{"error":"database locked"}"#);

    let mut draft = f.projects.snapshot()[1].entity.clone();
    draft.title = "Beta v2".to_string();
    let err = f.projects.update("b", draft).await.unwrap_err();

    assert!(matches!(err, SyncError::ServerRejected { status: 500, .. }));
    let view = f.projects.snapshot();
    assert_eq!(ids(&view), vec!["a", "b"]);
    assert_eq!(view[1].entity.title, "Beta");
    assert!(!view[1].is_optimistic);
}

#[tokio::test]
async fn test_update_is_promoted_in_place() {
    let f = fixture();
    seed(&f, r#"[{"id":"a","title":"Alpha"},{"id":"b","title":"Beta"}]"#).await;
    f.transport
        .respond(200, r#"{"id":"a","title":"Alpha v2","pinned":true}"#);

    let mut draft = f.projects.snapshot()[0].entity.clone();
    draft.title = "Alpha v2".to_string();
    let updated = f.projects.update("a", draft).await.unwrap();

    assert!(updated.pinned);
    let view = f.projects.snapshot();
    assert_eq!(ids(&view), vec!["a", "b"]);
    assert_eq!(view[0].entity.title, "Alpha v2");
    assert_eq!(f.transport.requests()[1].method, Method::Put);
}

#[tokio::test]
async fn test_create_racing_a_refresh_leaves_one_copy() {
    let f = fixture();
    seed(&f, r#"[{"id":"a","title":"Alpha"}]"#).await;
    let gate = f.transport.gated(200, r#"{"id":"n1","title":"New"}"#);
    // The refresh lands while the create is in flight and already contains it.
    f.transport
        .respond(200, r#"[{"id":"n1","title":"New"},{"id":"a","title":"Alpha"}]"#);

    let projects = f.projects.clone();
    let create = tokio::spawn(async move { projects.create(Project::draft("New")).await });
    settle_until(|| f.projects.pending() == 1).await;

    f.projects.refresh().await.unwrap();
    gate.notify_one();
    create.await.unwrap().unwrap();

    assert_eq!(ids(&f.projects.snapshot()), vec!["n1", "a"]);
}

#[tokio::test]
async fn test_concurrent_create_and_delete_settle_in_either_order() {
    // Create settles last.
    let f = fixture();
    seed(&f, r#"[{"id":"a","title":"Alpha"},{"id":"b","title":"Beta"}]"#).await;
    let gate = f.transport.gated(200, r#"{"id":"n1","title":"New"}"#);
    f.transport.respond(204, "");

    let projects = f.projects.clone();
    let create = tokio::spawn(async move { projects.create(Project::draft("New")).await });
    settle_until(|| f.projects.pending() == 1).await;
    f.projects.delete("b").await.unwrap();
    gate.notify_one();
    create.await.unwrap().unwrap();
    assert_eq!(ids(&f.projects.snapshot()), vec!["n1", "a"]);

    // Delete settles last.
    let f = fixture();
    seed(&f, r#"[{"id":"a","title":"Alpha"},{"id":"b","title":"Beta"}]"#).await;
    let gate = f.transport.gated(204, "");
    f.transport.respond(200, r#"{"id":"n1","title":"New"}"#);

    let projects = f.projects.clone();
    let delete = tokio::spawn(async move { projects.delete("b").await });
    settle_until(|| f.projects.pending() == 1).await;
    f.projects.create(Project::draft("New")).await.unwrap();
    gate.notify_one();
    delete.await.unwrap().unwrap();
    assert_eq!(ids(&f.projects.snapshot()), vec!["n1", "a"]);
}

#[tokio::test]
async fn test_failed_delete_restores_position() {
    let f = fixture();
    seed(
        &f,
        r#"[{"id":"a","title":"Alpha"},{"id":"b","title":"Beta"},{"id":"c","title":"Gamma"}]"#,
    )
    .await;
    f.transport.respond(503, "busy");

    let err = f.projects.delete("b").await.unwrap_err();
    assert!(matches!(err, SyncError::ServerRejected { status: 503, .. }));
    assert_eq!(ids(&f.projects.snapshot()), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_delete_of_missing_entity_counts_as_done() {
    let f = fixture();
    seed(&f, r#"[{"id":"a","title":"Alpha"}]"#).await;
    f.transport.respond(404, r#"{"detail":"not found"}"#);

    f.projects.delete("a").await.unwrap();
    assert!(f.projects.snapshot().is_empty());
}

#[tokio::test]
async fn test_close_aborts_in_flight_mutation() {
    let f = fixture();
    seed(&f, r#"[{"id":"a","title":"Alpha"}]"#).await;
    f.transport.push(Step::Hang);

    let projects = f.projects.clone();
    let create = tokio::spawn(async move { projects.create(Project::draft("New")).await });
    settle_until(|| f.projects.pending() == 1).await;

    f.projects.close();
    let err = create.await.unwrap().unwrap_err();
    assert!(matches!(err, SyncError::Aborted));
    assert_eq!(ids(&f.projects.snapshot()), vec!["a"]);
}

#[tokio::test]
async fn test_stacked_updates_roll_back_to_first_confirmed_copy() {
    let f = fixture();
    seed(&f, r#"[{"id":"a","title":"Alpha"},{"id":"b","title":"Beta"}]"#).await;
    let first_gate = f.transport.gated(200, r#"{"id":"a","title":"Alpha v1"}"#);
    let second_gate = f.transport.gated(500, r#"{"error":"conflict"}"#);

    let mut v1 = f.projects.snapshot()[0].entity.clone();
    v1.title = "Alpha v1".to_string();
    let mut v2 = v1.clone();
    v2.title = "Alpha v2".to_string();

    let projects = f.projects.clone();
    let first = tokio::spawn(async move { projects.update("a", v1).await });
    settle_until(|| f.transport.requests().len() == 2).await;
    let projects = f.projects.clone();
    let second = tokio::spawn(async move { projects.update("a", v2).await });
    settle_until(|| f.transport.requests().len() == 3).await;
    assert_eq!(f.projects.snapshot()[0].entity.title, "Alpha v2");

    first_gate.notify_one();
    first.await.unwrap().unwrap();
    second_gate.notify_one();
    second.await.unwrap().unwrap_err();

    let view = f.projects.snapshot();
    assert_eq!(ids(&view), vec!["a", "b"]);
    assert_eq!(view[0].entity.title, "Alpha v1");
    assert_eq!(f.projects.pending(), 0);
}

#[tokio::test]
async fn test_update_confirmed_under_failed_delete_comes_back_settled() {
    let f = fixture();
    seed(&f, r#"[{"id":"a","title":"Alpha"},{"id":"b","title":"Beta"}]"#).await;
    let update_gate = f.transport.gated(200, r#"{"id":"a","title":"Alpha v2"}"#);
    let delete_gate = f.transport.gated(503, "busy");

    let mut draft = f.projects.snapshot()[0].entity.clone();
    draft.title = "Alpha v2".to_string();
    let projects = f.projects.clone();
    let update = tokio::spawn(async move { projects.update("a", draft).await });
    settle_until(|| f.transport.requests().len() == 2).await;
    let projects = f.projects.clone();
    let delete = tokio::spawn(async move { projects.delete("a").await });
    settle_until(|| f.transport.requests().len() == 3).await;
    assert_eq!(ids(&f.projects.snapshot()), vec!["b"]);

    update_gate.notify_one();
    update.await.unwrap().unwrap();
    delete_gate.notify_one();
    delete.await.unwrap().unwrap_err();

    let view = f.projects.snapshot();
    assert_eq!(ids(&view), vec!["a", "b"]);
    assert_eq!(view[0].entity.title, "Alpha v2");
    assert!(view.iter().all(|t| !t.is_optimistic));
    assert_eq!(f.projects.pending(), 0);
}

#[tokio::test]
async fn test_task_mutation_clears_project_task_listing() {
    let transport = ScriptedTransport::new();
    let client = Arc::new(RevalidatingClient::new(
        transport.clone(),
        "http://api.test",
        Duration::from_secs(5),
    ));
    let tasks: Collection<Task> = Collection::new(
        CollectionSpec::project_tasks("p1"),
        client.clone(),
        Arc::new(EntityCache::new()),
    );
    transport.respond_with_etag(
        r#"{"tasks":[{"id":"t1","project_id":"p1","title":"Write docs"}]}"#,
        "\"v1\"",
    );
    tasks.refresh().await.unwrap();
    assert_eq!(
        client.validator_for(Method::Get, "/api/projects/p1/tasks").as_deref(),
        Some("\"v1\"")
    );

    transport.respond(
        200,
        r#"{"id":"t1","project_id":"p1","title":"Write better docs"}"#,
    );
    let mut draft = tasks.snapshot()[0].entity.clone();
    draft.title = "Write better docs".to_string();
    tasks.update("t1", draft).await.unwrap();

    assert_eq!(transport.requests()[1].url, "http://api.test/api/tasks/t1");
    assert_eq!(client.validator_for(Method::Get, "/api/projects/p1/tasks"), None);
}
