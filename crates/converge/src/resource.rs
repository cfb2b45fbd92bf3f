//! Handles on individual resources and on sets of resources.
//!
//! Every query goes to the control plane through the [`Client`]; nothing is
//! cached between evaluations. Waits return an [`Outcome`] so callers decide
//! whether a timeout is fatal, while one-shot operations return `Result`.

use std::fmt;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::error::ConvergeError;
use crate::lifecycle::{Lifecycle, LifecycleEvent};
use crate::poll::{Convergence, Outcome};
use crate::policy::PollPolicy;
use crate::query::{parse_count, CountMatch, FieldMatch, Projection};
use crate::runner::{CommandError, FailureClass, Verb};
use crate::template::{Manifest, ManifestTemplate, TemplateEngine};

/// Kind, optional namespace and name of one object.
///
/// A `None` namespace marks a cluster-scoped object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceIdentity {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceIdentity {
    #[must_use]
    pub fn cluster(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: None,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn namespaced(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// `kind/name`, the form the CLI accepts as a single argument.
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Kind: {}, Name: {}, Namespace: {}>",
            self.kind,
            self.name,
            self.namespace.as_deref().unwrap_or_default()
        )
    }
}

/// Patch strategies understood by `patch --type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchType {
    Merge,
    Json,
    Strategic,
}

impl PatchType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Json => "json",
            Self::Strategic => "strategic",
        }
    }
}

/// A patch body together with its strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub patch_type: PatchType,
    pub body: Value,
}

impl Patch {
    /// JSON merge patch (RFC 7386).
    #[must_use]
    pub fn merge(body: Value) -> Self {
        Self {
            patch_type: PatchType::Merge,
            body,
        }
    }

    /// JSON patch (RFC 6902); `body` is the operation array.
    #[must_use]
    pub fn json(body: Value) -> Self {
        Self {
            patch_type: PatchType::Json,
            body,
        }
    }

    /// Strategic merge patch.
    #[must_use]
    pub fn strategic(body: Value) -> Self {
        Self {
            patch_type: PatchType::Strategic,
            body,
        }
    }
}

/// Handle on a single object plus the lifecycle this handle has observed.
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    client: Client,
    identity: ResourceIdentity,
    lifecycle: Lifecycle,
}

impl ResourceHandle {
    #[must_use]
    pub fn new(client: Client, identity: ResourceIdentity) -> Self {
        Self {
            client,
            identity,
            lifecycle: Lifecycle::Unknown,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Whether the object currently exists.
    ///
    /// # Errors
    ///
    /// Any failure other than not-found, including an unknown kind.
    pub async fn exists(&self) -> Result<bool, ConvergeError> {
        match get_name(&self.client, &self.identity).await {
            Ok(name) => Ok(!name.is_empty()),
            Err(e) if e.class() == FailureClass::NotFound => Ok(false),
            Err(e) => Err(ConvergeError::from_command(e, &self.identity.target())),
        }
    }

    /// Poll until a `get` returns the object.
    ///
    /// Not-found and transient failures keep polling; an unknown kind can
    /// never converge and is fatal.
    pub async fn wait_until_present(&mut self, policy: PollPolicy) -> Outcome<()> {
        let (client, identity) = (&self.client, &self.identity);
        let what = format!("{identity} to appear");
        let outcome = client
            .poller(policy)
            .wait_for(&what, || presence(client, identity))
            .await;

        self.record(&outcome, LifecycleEvent::Appeared);
        outcome
    }

    /// Poll until a `get` reports the object absent.
    ///
    /// An unknown kind counts as absent, so this converges after a single
    /// query for a never-created object.
    pub async fn wait_until_gone(&mut self, policy: PollPolicy) -> Outcome<()> {
        let (client, identity) = (&self.client, &self.identity);
        let what = format!("{identity} to be gone");
        let outcome = client
            .poller(policy)
            .wait_for(&what, || absence(client, identity))
            .await;

        self.record(&outcome, LifecycleEvent::Vanished);
        outcome
    }

    /// Issue a delete. Deleting an absent object, or one whose kind is not
    /// registered, succeeds.
    ///
    /// # Errors
    ///
    /// Any other command failure.
    pub async fn delete(&mut self) -> Result<(), ConvergeError> {
        let result = self
            .client
            .run(
                Verb::Delete,
                self.identity.namespace.as_deref(),
                [self.identity.kind.as_str(), self.identity.name.as_str()],
            )
            .await;

        match result {
            Ok(_) => {
                info!(
                    kind = %self.identity.kind,
                    name = %self.identity.name,
                    namespace = ?self.identity.namespace,
                    "Delete issued"
                );
                self.lifecycle = self.lifecycle.advance(LifecycleEvent::DeleteIssued);
                Ok(())
            }
            Err(e) if matches!(e.class(), FailureClass::NotFound | FailureClass::UnknownKind) => {
                debug!(resource = %self.identity, "Delete of absent object");
                self.lifecycle = self.lifecycle.advance(LifecycleEvent::Vanished);
                Ok(())
            }
            Err(e) => Err(ConvergeError::from_command(e, &self.identity.target())),
        }
    }

    /// Delete, then wait until the object is gone.
    ///
    /// # Errors
    ///
    /// Delete failures, or [`ConvergeError::Timeout`] if the object lingers.
    pub async fn clear(&mut self, policy: PollPolicy) -> Result<(), ConvergeError> {
        self.delete().await?;
        let what = format!("{} to be gone", self.identity);
        self.wait_until_gone(policy).await.into_result(&what)
    }

    /// Read a projection of the object's current representation.
    ///
    /// # Errors
    ///
    /// Classified command failures, or [`ConvergeError::Decode`] when a
    /// pointer projection cannot parse the output.
    pub async fn get(&self, projection: &Projection) -> Result<String, ConvergeError> {
        get_projection(&self.client, &self.identity, projection).await
    }

    /// Poll `projection` until `expected` matches it; yields the final value.
    ///
    /// A missing object or transient failure keeps polling.
    pub async fn wait_for_field(
        &self,
        projection: &Projection,
        expected: &FieldMatch,
        policy: PollPolicy,
    ) -> Outcome<String> {
        let (client, identity) = (&self.client, &self.identity);
        let what = format!("{projection} of {identity} {expected}");
        client
            .poller(policy)
            .wait_for(&what, || async move {
                match get_projection(client, identity, projection).await {
                    Ok(value) if expected.matches(&value) => Convergence::Converged(value),
                    Ok(value) => Convergence::NotYet(format!("{projection} is {value:?}")),
                    Err(e) => not_yet_or_fatal(e),
                }
            })
            .await
    }

    /// Poll `.status.readyReplicas` until it equals `expected`.
    pub async fn wait_for_ready_replicas(&self, expected: u32, policy: PollPolicy) -> Outcome<u32> {
        let (client, identity) = (&self.client, &self.identity);
        let projection = Projection::jsonpath(".status.readyReplicas");
        let what = format!("{identity} to have {expected} ready replicas");
        let projection = &projection;
        client
            .poller(policy)
            .wait_for(&what, || async move {
                let value = match get_projection(client, identity, projection).await {
                    Ok(value) => value,
                    Err(e) => return not_yet_or_fatal(e),
                };
                match parse_count(&value, "readyReplicas") {
                    Ok(ready) if ready == expected => Convergence::Converged(ready),
                    Ok(ready) => Convergence::NotYet(format!("{ready}/{expected} replicas ready")),
                    Err(e) => Convergence::Fatal(e),
                }
            })
            .await
    }

    /// Poll until a deployment or daemonset has fully rolled out.
    ///
    /// The desired count is read from the object on every poll, so a scale
    /// issued while waiting moves the target. Yields the desired count.
    pub async fn wait_for_rollout(&self, policy: PollPolicy) -> Outcome<u64> {
        let Some(workload) = Workload::of(&self.identity.kind) else {
            return Outcome::Fatal(ConvergeError::NoRolloutStatus(self.identity.kind.clone()));
        };
        let (client, identity) = (&self.client, &self.identity);
        let what = format!("{identity} to roll out");
        client
            .poller(policy)
            .wait_for(&what, || async move {
                let doc = match get_json(client, identity).await {
                    Ok(doc) => doc,
                    Err(e) => return not_yet_or_fatal(e),
                };
                let rollout = workload.rollout(&doc);
                if rollout.is_complete() {
                    Convergence::Converged(rollout.desired)
                } else {
                    Convergence::NotYet(rollout.to_string())
                }
            })
            .await
    }

    /// Fetch logs, optionally for one container.
    ///
    /// # Errors
    ///
    /// Classified command failures.
    pub async fn logs(&self, container: Option<&str>) -> Result<String, ConvergeError> {
        fetch_logs(&self.client, &self.identity, container).await
    }

    /// Poll logs until a line matches `pattern`; yields that line.
    pub async fn wait_for_log(
        &self,
        pattern: &Regex,
        container: Option<&str>,
        policy: PollPolicy,
    ) -> Outcome<String> {
        let (client, identity) = (&self.client, &self.identity);
        let what = format!("{identity} logs to match /{}/", pattern.as_str());
        client
            .poller(policy)
            .wait_for(&what, || async move {
                match fetch_logs(client, identity, container).await {
                    Ok(logs) => match logs.lines().find(|line| pattern.is_match(line)) {
                        Some(line) => Convergence::Converged(line.to_string()),
                        None => Convergence::NotYet(format!("{} log lines, none match", logs.lines().count())),
                    },
                    Err(e) => not_yet_or_fatal(e),
                }
            })
            .await
    }

    /// Apply a patch.
    ///
    /// # Errors
    ///
    /// Classified command failures; a rejected patch is
    /// [`ConvergeError::SemanticApply`].
    pub async fn patch(&self, patch: &Patch) -> Result<(), ConvergeError> {
        self.client
            .run(
                Verb::Patch,
                self.identity.namespace.as_deref(),
                [
                    self.identity.kind.clone(),
                    self.identity.name.clone(),
                    "--type".to_string(),
                    patch.patch_type.as_str().to_string(),
                    "-p".to_string(),
                    patch.body.to_string(),
                ],
            )
            .await
            .map_err(|e| ConvergeError::from_command(e, &self.identity.target()))?;
        info!(resource = %self.identity, patch_type = patch.patch_type.as_str(), "Patched");
        Ok(())
    }

    /// Set the replica count.
    ///
    /// # Errors
    ///
    /// Classified command failures.
    pub async fn scale(&self, replicas: u32) -> Result<(), ConvergeError> {
        self.client
            .run(
                Verb::Scale,
                self.identity.namespace.as_deref(),
                [self.identity.target(), format!("--replicas={replicas}")],
            )
            .await
            .map_err(|e| ConvergeError::from_command(e, &self.identity.target()))?;
        info!(resource = %self.identity, replicas, "Scaled");
        Ok(())
    }

    /// Submit the manifest that defines this object.
    ///
    /// # Errors
    ///
    /// See [`Client::apply_template`].
    pub async fn apply_template(
        &mut self,
        engine: &dyn TemplateEngine,
        template: &ManifestTemplate,
        retry: PollPolicy,
    ) -> Result<Manifest, ConvergeError> {
        let manifest = self.client.apply_template(engine, template, retry).await?;
        self.lifecycle = self.lifecycle.advance(LifecycleEvent::Submitted);
        Ok(manifest)
    }

    /// Submit, then wait for the object to appear.
    ///
    /// # Errors
    ///
    /// Submission failures, or the failed presence wait.
    pub async fn apply_template_and_wait(
        &mut self,
        engine: &dyn TemplateEngine,
        template: &ManifestTemplate,
        retry: PollPolicy,
        present: PollPolicy,
    ) -> Result<Manifest, ConvergeError> {
        let manifest = self.apply_template(engine, template, retry).await?;
        let what = format!("{} to appear", self.identity);
        self.wait_until_present(present).await.into_result(&what)?;
        Ok(manifest)
    }

    fn record<T>(&mut self, outcome: &Outcome<T>, converged: LifecycleEvent) {
        let event = if outcome.is_success() {
            converged
        } else {
            warn!(resource = %self.identity, state = %self.lifecycle, "Wait did not converge");
            LifecycleEvent::WaitFailed
        };
        self.lifecycle = self.lifecycle.advance(event);
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.identity.fmt(f)
    }
}

async fn get_name(client: &Client, identity: &ResourceIdentity) -> Result<String, CommandError> {
    client
        .run(
            Verb::Get,
            identity.namespace.as_deref(),
            [identity.kind.as_str(), identity.name.as_str(), "-o", "name"],
        )
        .await
}

async fn get_projection(
    client: &Client,
    identity: &ResourceIdentity,
    projection: &Projection,
) -> Result<String, ConvergeError> {
    let mut args = vec![identity.kind.clone(), identity.name.clone()];
    args.extend(projection.output_args());
    let output = client
        .run(Verb::Get, identity.namespace.as_deref(), args)
        .await
        .map_err(|e| ConvergeError::from_command(e, &identity.target()))?;
    projection.extract(&output)
}

async fn get_json(client: &Client, identity: &ResourceIdentity) -> Result<Value, ConvergeError> {
    let output = client
        .run(
            Verb::Get,
            identity.namespace.as_deref(),
            [identity.kind.as_str(), identity.name.as_str(), "-o", "json"],
        )
        .await
        .map_err(|e| ConvergeError::from_command(e, &identity.target()))?;
    serde_json::from_str(&output).map_err(|e| ConvergeError::decode(identity.target(), e))
}

async fn fetch_logs(
    client: &Client,
    identity: &ResourceIdentity,
    container: Option<&str>,
) -> Result<String, ConvergeError> {
    let mut args = vec![identity.target()];
    if let Some(container) = container {
        args.push("-c".to_string());
        args.push(container.to_string());
    }
    client
        .run(Verb::Logs, identity.namespace.as_deref(), args)
        .await
        .map_err(|e| ConvergeError::from_command(e, &identity.target()))
}

async fn presence(client: &Client, identity: &ResourceIdentity) -> Convergence<()> {
    match get_name(client, identity).await {
        Ok(name) if !name.is_empty() => Convergence::Converged(()),
        Ok(_) => Convergence::NotYet("get returned no object".to_string()),
        Err(e) => match e.class() {
            FailureClass::NotFound => Convergence::NotYet("not found".to_string()),
            FailureClass::Transient => Convergence::NotYet(e.to_string()),
            _ => Convergence::Fatal(ConvergeError::from_command(e, &identity.target())),
        },
    }
}

async fn absence(client: &Client, identity: &ResourceIdentity) -> Convergence<()> {
    match get_name(client, identity).await {
        Ok(name) => Convergence::NotYet(format!("still present as {name}")),
        Err(e) => match e.class() {
            FailureClass::NotFound | FailureClass::UnknownKind => Convergence::Converged(()),
            FailureClass::Transient => Convergence::NotYet(e.to_string()),
            _ => Convergence::Fatal(ConvergeError::from_command(e, &identity.target())),
        },
    }
}

fn not_yet_or_fatal<T>(err: ConvergeError) -> Convergence<T> {
    if err.is_not_found() || err.is_transient() {
        Convergence::NotYet(err.to_string())
    } else {
        Convergence::Fatal(err)
    }
}

/// Workload kinds that report rollout progress in their status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    Deployment,
    DaemonSet,
}

impl Workload {
    /// Recognise a kind as accepted by the CLI, e.g. `deploy`,
    /// `deployments.apps` or `ds`.
    #[must_use]
    pub fn of(kind: &str) -> Option<Self> {
        let kind = kind.to_ascii_lowercase();
        match kind.split('.').next().unwrap_or_default() {
            "deployment" | "deployments" | "deploy" => Some(Self::Deployment),
            "daemonset" | "daemonsets" | "ds" => Some(Self::DaemonSet),
            _ => None,
        }
    }

    /// Read rollout counters from an object's JSON representation.
    ///
    /// Absent status counters are zero. A deployment without
    /// `spec.replicas` wants one replica, as the API server defaults it.
    #[must_use]
    pub fn rollout(self, doc: &Value) -> Rollout {
        let field = |pointer: &str| doc.pointer(pointer).and_then(Value::as_u64);
        match self {
            Self::Deployment => Rollout {
                desired: field("/spec/replicas").unwrap_or(1),
                ready: field("/status/availableReplicas").unwrap_or(0),
                updated: field("/status/updatedReplicas").unwrap_or(0),
            },
            Self::DaemonSet => Rollout {
                desired: field("/status/desiredNumberScheduled").unwrap_or(0),
                ready: field("/status/numberReady").unwrap_or(0),
                updated: field("/status/updatedNumberScheduled").unwrap_or(0),
            },
        }
    }
}

/// Rollout counters of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rollout {
    pub desired: u64,
    pub ready: u64,
    pub updated: u64,
}

impl Rollout {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.ready == self.desired && self.updated == self.desired
    }
}

impl fmt::Display for Rollout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ready, {}/{} updated",
            self.ready, self.desired, self.updated, self.desired
        )
    }
}

/// Label and ordering constraints for a set query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    labels: Vec<String>,
    sort_by: Option<String>,
}

impl ListFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a label selector term, e.g. `app=collector` or `tier!=web`.
    /// Terms are combined with AND.
    #[must_use]
    pub fn label(mut self, selector: impl Into<String>) -> Self {
        self.labels.push(selector.into());
        self
    }

    /// Sort by a JSONPath field, e.g. `.metadata.name`.
    #[must_use]
    pub fn sort_by(mut self, path: impl Into<String>) -> Self {
        self.sort_by = Some(path.into());
        self
    }

    /// Oldest first.
    #[must_use]
    pub fn sort_by_creation(self) -> Self {
        self.sort_by(".metadata.creationTimestamp")
    }

    #[must_use]
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if !self.labels.is_empty() {
            args.push("-l".to_string());
            args.push(self.labels.join(","));
        }
        if let Some(path) = &self.sort_by {
            args.push(format!("--sort-by={path}"));
        }
        args
    }
}

/// Handle on every object of one kind in a namespace, or cluster-wide.
#[derive(Debug, Clone)]
pub struct ResourceSetHandle {
    client: Client,
    kind: String,
    namespace: Option<String>,
}

impl ResourceSetHandle {
    #[must_use]
    pub fn new(client: Client, kind: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            client,
            kind: kind.into(),
            namespace,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Names of the matching objects, in the order the CLI returned them.
    ///
    /// # Errors
    ///
    /// Classified command failures. An empty set is not an error.
    pub async fn names(&self, filter: &ListFilter) -> Result<Vec<String>, ConvergeError> {
        let output = self
            .query(filter, "jsonpath={.items[*].metadata.name}")
            .await?;
        Ok(output.split_whitespace().map(str::to_string).collect())
    }

    /// Handles for the matching objects.
    ///
    /// # Errors
    ///
    /// See [`ResourceSetHandle::names`].
    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<ResourceHandle>, ConvergeError> {
        let names = self.names(filter).await?;
        debug!(kind = %self.kind, namespace = ?self.namespace, count = names.len(), "Listed resources");
        Ok(names
            .into_iter()
            .map(|name| {
                self.client.resource(ResourceIdentity {
                    kind: self.kind.clone(),
                    namespace: self.namespace.clone(),
                    name,
                })
            })
            .collect())
    }

    /// Number of matching objects.
    ///
    /// # Errors
    ///
    /// See [`ResourceSetHandle::names`].
    pub async fn count(&self, filter: &ListFilter) -> Result<usize, ConvergeError> {
        Ok(self.names(filter).await?.len())
    }

    /// Poll until the number of matching objects satisfies `expected`.
    pub async fn wait_for_count(
        &self,
        filter: &ListFilter,
        expected: CountMatch,
        policy: PollPolicy,
    ) -> Outcome<usize> {
        let what = format!("{} {expected} {}", self.describe(filter), self.kind);
        self.client
            .poller(policy)
            .wait_for(&what, || async move {
                match self.count(filter).await {
                    Ok(count) if expected.matches(count) => Convergence::Converged(count),
                    Ok(count) => Convergence::NotYet(format!("{count} found")),
                    Err(e) => not_yet_or_fatal(e),
                }
            })
            .await
    }

    /// Poll until nothing matches. An unknown kind counts as empty.
    pub async fn wait_until_empty(&self, filter: &ListFilter, policy: PollPolicy) -> Outcome<()> {
        let what = format!("{} to be empty", self.describe(filter));
        self.client
            .poller(policy)
            .wait_for(&what, || async move {
                match self.names(filter).await {
                    Ok(names) if names.is_empty() => Convergence::Converged(()),
                    Ok(names) => Convergence::NotYet(format!("remaining: {}", names.join(" "))),
                    Err(ConvergeError::UnknownKind(_)) => Convergence::Converged(()),
                    Err(e) => not_yet_or_fatal(e),
                }
            })
            .await
    }

    /// Poll until at least one pod matches and every container of every
    /// matching pod reports ready. Yields the number of pods.
    ///
    /// A pod with no container statuses yet is not ready.
    pub async fn wait_for_pods_ready(&self, filter: &ListFilter, policy: PollPolicy) -> Outcome<usize> {
        let what = format!("{} to be ready", self.describe(filter));
        self.client
            .poller(policy)
            .wait_for(&what, || async move {
                let output = match self.query(filter, "json").await {
                    Ok(output) => output,
                    Err(e) => return not_yet_or_fatal(e),
                };
                match unready_pods(&output) {
                    Ok((0, _)) => Convergence::NotYet("no pods match".to_string()),
                    Ok((total, unready)) if unready.is_empty() => Convergence::Converged(total),
                    Ok((total, unready)) => Convergence::NotYet(format!(
                        "{}/{total} pods not ready: {}",
                        unready.len(),
                        unready.join(" ")
                    )),
                    Err(e) => Convergence::Fatal(e),
                }
            })
            .await
    }

    async fn query(&self, filter: &ListFilter, output: &str) -> Result<String, ConvergeError> {
        let mut args = vec![self.kind.clone()];
        args.extend(filter.args());
        args.push("-o".to_string());
        args.push(output.to_string());

        self.client
            .run(Verb::Get, self.namespace.as_deref(), args)
            .await
            .map_err(|e| ConvergeError::from_command(e, &self.kind))
    }

    fn describe(&self, filter: &ListFilter) -> String {
        let scope = self.namespace.as_deref().unwrap_or("cluster");
        if filter.labels.is_empty() {
            format!("{} in {scope}", self.kind)
        } else {
            format!("{} in {scope} matching {}", self.kind, filter.labels.join(","))
        }
    }
}

/// Total pods in a `-o json` list and the names of those not fully ready.
fn unready_pods(output: &str) -> Result<(usize, Vec<String>), ConvergeError> {
    let doc: Value =
        serde_json::from_str(output).map_err(|e| ConvergeError::decode("pod list", e))?;
    let items = doc
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| ConvergeError::decode("pod list", "missing items"))?;

    let unready = items
        .iter()
        .filter(|pod| {
            let statuses = pod
                .pointer("/status/containerStatuses")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            statuses.is_empty()
                || !statuses
                    .iter()
                    .all(|status| status.get("ready").and_then(Value::as_bool) == Some(true))
        })
        .map(|pod| {
            pod.pointer("/metadata/name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        })
        .collect();
    Ok((items.len(), unready))
}
