//! Integration tests for the submit / wait / clear flow.
//!
//! A small in-memory cluster stands behind `FakeRunner`: objects appear a
//! fixed delay after they are applied and vanish a fixed delay after they are
//! deleted, which is enough to exercise every wait on the paused clock.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use converge::fake::FakeRunner;
use converge::{
    CancellationToken, Client, ConvergeError, CountMatch, FieldMatch, Invocation, Lifecycle,
    ListFilter, LocalTemplateEngine, ManifestTemplate, Outcome, PollPolicy, Projection,
    ResourceIdentity, ScratchDir, Verb,
};
use tokio::time::Instant;

// =============================================================================
// Fake cluster
// =============================================================================

const APPEAR_AFTER: Duration = Duration::from_secs(4);
const VANISH_AFTER: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
struct Object {
    created: Instant,
    deleted: Option<Instant>,
}

impl Object {
    fn visible(&self, now: Instant) -> bool {
        now.duration_since(self.created) >= APPEAR_AFTER
            && self
                .deleted
                .map_or(true, |deleted| now.duration_since(deleted) < VANISH_AFTER)
    }

    fn phase(&self, now: Instant) -> &'static str {
        if now.duration_since(self.created) >= APPEAR_AFTER * 2 {
            "Running"
        } else {
            "Pending"
        }
    }
}

/// Objects keyed by name; only the `widget` kind is registered.
#[derive(Default)]
struct Cluster {
    objects: Mutex<HashMap<String, Object>>,
}

impl Cluster {
    fn handle(&self, inv: &Invocation) -> Result<String, converge::CommandError> {
        let now = Instant::now();
        let mut objects = self.objects.lock().unwrap();

        match inv.verb {
            Verb::Apply => {
                let manifest = std::fs::read_to_string(&inv.args[1]).unwrap();
                let name = manifest
                    .lines()
                    .find_map(|line| line.trim().strip_prefix("name: "))
                    .unwrap()
                    .to_string();
                objects.entry(name.clone()).or_insert(Object {
                    created: now,
                    deleted: None,
                });
                Ok(format!("widget.example.com/{name} created"))
            }
            _ if inv.args.first().map(String::as_str) != Some("widget") => {
                Err(FakeRunner::unknown_kind(inv))
            }
            Verb::Get if inv.args.len() >= 2 && !inv.args[1].starts_with('-') => {
                let name = &inv.args[1];
                match objects.get(name) {
                    Some(obj) if obj.visible(now) => {
                        if inv.args.iter().any(|a| a == "name") {
                            Ok(format!("widget.example.com/{name}"))
                        } else {
                            Ok(obj.phase(now).to_string())
                        }
                    }
                    _ => Err(FakeRunner::not_found(inv)),
                }
            }
            Verb::Get => {
                let mut names: Vec<&String> = objects
                    .iter()
                    .filter(|(_, obj)| obj.visible(now))
                    .map(|(name, _)| name)
                    .collect();
                names.sort();
                Ok(names
                    .into_iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(" "))
            }
            Verb::Delete => match objects.get_mut(&inv.args[1]) {
                Some(obj) if obj.visible(now) => {
                    obj.deleted.get_or_insert(now);
                    Ok(format!("widget.example.com \"{}\" deleted", inv.args[1]))
                }
                _ => Err(FakeRunner::not_found(inv)),
            },
            _ => Ok(String::new()),
        }
    }
}

fn setup() -> (Arc<FakeRunner>, Client) {
    let cluster = Cluster::default();
    let runner = Arc::new(FakeRunner::new(move |inv| cluster.handle(inv)));
    let client = Client::new(runner.clone());
    (runner, client)
}

fn write_template(dir: &Path) -> std::path::PathBuf {
    let source = dir.join("widget.yaml");
    std::fs::write(
        &source,
        "apiVersion: example.com/v1\nkind: Widget\nmetadata:\n  name: ${NAME}\n  namespace: ${NAMESPACE}\nspec:\n  size: ${SIZE}\n",
    )
    .unwrap();
    source
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_full_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_template(dir.path());
    let engine = LocalTemplateEngine::new(ScratchDir::new(dir.path().join("scratch")));
    let (runner, client) = setup();

    let mut w1 = client.resource(ResourceIdentity::namespaced("widget", "t1", "w1"));
    assert!(!w1.exists().await.unwrap());

    let started = Instant::now();
    let manifest = w1
        .apply_template_and_wait(
            &engine,
            &ManifestTemplate::new(&source)
                .param("NAME", "w1")
                .param("NAMESPACE", "t1")
                .param("SIZE", 3),
            PollPolicy::apply_retry(),
            PollPolicy::from_secs(1, 10),
        )
        .await
        .unwrap();

    assert_eq!(started.elapsed(), APPEAR_AFTER);
    assert!(manifest.document().contains("name: w1\n"));
    assert!(!manifest.document().contains("${"));
    assert_eq!(w1.lifecycle(), Lifecycle::Present);

    let phase = w1
        .wait_for_field(
            &Projection::jsonpath(".status.phase"),
            &FieldMatch::Equals("Running".into()),
            PollPolicy::from_secs(1, 10),
        )
        .await;
    assert!(matches!(phase, Outcome::Success(ref p) if p == "Running"));

    w1.clear(PollPolicy::from_secs(1, 10)).await.unwrap();
    assert_eq!(w1.lifecycle(), Lifecycle::Gone);
    assert!(!w1.exists().await.unwrap());

    // clearing again only issues the idempotent delete and one get
    let before = runner.calls();
    w1.clear(PollPolicy::from_secs(1, 10)).await.unwrap();
    assert_eq!(runner.calls() - before, 2);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_count_over_applied_set() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_template(dir.path());
    let engine = LocalTemplateEngine::new(ScratchDir::new(dir.path()));
    let (_runner, client) = setup();

    for name in ["w1", "w2", "w3"] {
        client
            .apply_template(
                &engine,
                &ManifestTemplate::new(&source)
                    .param("NAME", name)
                    .param("NAMESPACE", "t1")
                    .param("SIZE", 1),
                PollPolicy::apply_retry(),
            )
            .await
            .unwrap();
    }

    let widgets = client.resources("widget", Some("t1"));
    let outcome = widgets
        .wait_for_count(
            &ListFilter::new().label("app=widget"),
            CountMatch::Exactly(3),
            PollPolicy::from_secs(1, 10),
        )
        .await;
    assert!(matches!(outcome, Outcome::Success(3)));

    let handles = widgets.list(&ListFilter::new()).await.unwrap();
    let names: Vec<String> = handles.iter().map(|h| h.identity().name.clone()).collect();
    assert_eq!(names, ["w1", "w2", "w3"]);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_reports_last_observation() {
    let (_runner, client) = setup();
    let mut ghost = client.resource(ResourceIdentity::namespaced("widget", "t1", "ghost"));

    let started = Instant::now();
    let err = ghost
        .wait_until_present(PollPolicy::from_secs(3, 10))
        .await
        .into_result("ghost to appear")
        .unwrap_err();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(13));
    match err {
        ConvergeError::Timeout {
            what,
            last_observation,
            ..
        } => {
            assert_eq!(what, "ghost to appear");
            assert_eq!(last_observation, "not found");
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_unregistered_kind() {
    let (runner, client) = setup();
    let mut gadget = client.resource(ResourceIdentity::cluster("gadget", "g1"));

    assert!(gadget.wait_until_gone(PollPolicy::resource()).await.is_success());
    gadget.delete().await.unwrap();
    assert!(matches!(
        gadget.wait_until_present(PollPolicy::resource()).await,
        Outcome::Fatal(ConvergeError::UnknownKind(_))
    ));
    assert!(client
        .resources("gadget", None)
        .wait_until_empty(&ListFilter::new(), PollPolicy::resource())
        .await
        .is_success());
    assert_eq!(runner.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_aborts_wait() {
    let (_runner, client) = setup();
    let token = CancellationToken::new();
    let client = client.with_cancellation(token.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        token.cancel();
    });

    let started = Instant::now();
    let mut ghost = client.resource(ResourceIdentity::namespaced("widget", "t1", "ghost"));
    let outcome = ghost.wait_until_present(PollPolicy::from_secs(1, 600)).await;

    assert!(matches!(outcome, Outcome::Fatal(ConvergeError::Cancelled(_))));
    assert!(started.elapsed() < Duration::from_secs(6));
}
