//! Declarative-resource convergence client.
//!
//! This crate drives a Kubernetes-style control plane through its CLI for
//! black-box tests: expand a manifest template, submit it with bounded
//! retries, then poll live state until a predicate holds.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use converge::{
//!     Client, ConvergeConfig, KubectlRunner, LocalTemplateEngine, ManifestTemplate, PollPolicy,
//!     ResourceIdentity, ScratchDir,
//! };
//!
//! # async fn example() -> Result<(), converge::ConvergeError> {
//! let config = ConvergeConfig::from_env();
//! let client = Client::new(Arc::new(KubectlRunner::from_config(&config)));
//! let engine = LocalTemplateEngine::new(ScratchDir::new(&config.scratch_dir));
//!
//! let mut widget = client.resource(ResourceIdentity::namespaced("widget", "t1", "w1"));
//! widget
//!     .apply_template_and_wait(
//!         &engine,
//!         &ManifestTemplate::new("fixtures/widget.yaml").param("NAME", "w1"),
//!         PollPolicy::apply_retry(),
//!         PollPolicy::resource(),
//!     )
//!     .await?;
//! widget.clear(PollPolicy::resource()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`CommandRunner`] is the only boundary to the cluster; [`KubectlRunner`]
//!   shells out, [`fake::FakeRunner`] scripts answers for tests
//! - [`TemplateEngine`] expands a [`ManifestTemplate`] into a [`Manifest`]
//! - [`Submitter`] retries transient expansion failures, never apply failures
//! - [`Poller`] evaluates a [`Convergence`] predicate under a [`PollPolicy`]
//! - [`ResourceHandle`] and [`ResourceSetHandle`] build the common waits on
//!   top of those pieces

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod fake;
pub mod lifecycle;
pub mod names;
pub mod poll;
pub mod policy;
pub mod query;
pub mod resource;
pub mod runner;
pub mod submit;
pub mod template;

pub use client::Client;
pub use config::ConvergeConfig;
pub use error::{ConfigError, ConvergeError, TemplateError};
pub use lifecycle::{Lifecycle, LifecycleEvent};
pub use names::NameGenerator;
pub use poll::{Convergence, Outcome, Poller};
pub use policy::{PolicySet, PollPolicy};
pub use query::{CountMatch, FieldMatch, Projection};
pub use resource::{
    ListFilter, Patch, PatchType, ResourceHandle, ResourceIdentity, ResourceSetHandle, Rollout,
    Workload,
};
pub use runner::{CommandError, CommandRunner, FailureClass, Identity, Invocation, KubectlRunner, Verb};
pub use submit::Submitter;
pub use template::{
    LocalTemplateEngine, Manifest, ManifestTemplate, ProcessTemplateEngine, ScratchDir,
    TemplateEngine,
};
pub use tokio_util::sync::CancellationToken;
