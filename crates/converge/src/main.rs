//! CLI for one-off convergence checks against a live cluster.
//!
//! Run `converge --help` for usage information.

// CLI binaries legitimately need println! for user output
#![allow(clippy::disallowed_macros)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use converge::{
    Client, ConvergeConfig, CountMatch, FieldMatch, KubectlRunner, ListFilter,
    LocalTemplateEngine, ManifestTemplate, PollPolicy, ProcessTemplateEngine, Projection,
    ResourceIdentity, ScratchDir, TemplateEngine,
};
use regex::Regex;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "converge")]
#[command(about = "Submit manifests and wait for cluster state to converge")]
#[command(version)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, env = "CONVERGE_CONFIG")]
    config: Option<PathBuf>,

    /// Namespace for namespaced resources
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// Run commands with the user kubeconfig instead of the admin one
    #[arg(long, global = true)]
    as_user: bool,

    /// Output format: json, text
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args, Clone)]
struct Target {
    /// Resource kind, e.g. deployment
    kind: String,

    /// Resource name
    name: String,
}

#[derive(Args, Clone, Copy)]
struct Wait {
    /// Seconds between polls (defaults to the configured resource policy)
    #[arg(long)]
    interval: Option<f64>,

    /// Seconds before giving up (defaults to the configured resource policy)
    #[arg(long)]
    timeout: Option<f64>,
}

/// Exactly one of these should be given; the first one set wins.
#[derive(Args)]
struct Expectation {
    /// Value must equal
    #[arg(long)]
    equals: Option<String>,

    /// Value must differ from
    #[arg(long)]
    not_equals: Option<String>,

    /// Value must contain
    #[arg(long)]
    contains: Option<String>,

    /// Value must not contain
    #[arg(long)]
    not_contains: Option<String>,

    /// Value must match the regular expression
    #[arg(long)]
    matches: Option<String>,

    /// Value must be non-empty
    #[arg(long)]
    non_empty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a resource exists (exit code 2 if absent, 1 on error)
    Exists {
        #[command(flatten)]
        target: Target,
    },

    /// Wait until a resource exists
    WaitPresent {
        #[command(flatten)]
        target: Target,

        #[command(flatten)]
        wait: Wait,
    },

    /// Wait until a resource is gone
    WaitGone {
        #[command(flatten)]
        target: Target,

        #[command(flatten)]
        wait: Wait,
    },

    /// Wait until a deployment or daemonset has fully rolled out
    WaitRollout {
        #[command(flatten)]
        target: Target,

        #[command(flatten)]
        wait: Wait,
    },

    /// Wait until every container of the labelled pods is ready
    WaitPods {
        /// Label selector term, repeatable (combined with AND)
        #[arg(short, long, required = true)]
        label: Vec<String>,

        #[command(flatten)]
        wait: Wait,
    },

    /// Print a field of a resource
    Get {
        #[command(flatten)]
        target: Target,

        /// JSONPath expression, e.g. .status.phase
        #[arg(long, conflicts_with = "pointer")]
        jsonpath: Option<String>,

        /// JSON pointer, e.g. /status/phase
        #[arg(long)]
        pointer: Option<String>,
    },

    /// Wait until a field of a resource satisfies an expectation
    WaitField {
        #[command(flatten)]
        target: Target,

        /// JSONPath expression, e.g. .status.phase
        #[arg(long)]
        jsonpath: String,

        #[command(flatten)]
        expect: Expectation,

        #[command(flatten)]
        wait: Wait,
    },

    /// Delete a resource; absent resources are not an error
    Delete {
        #[command(flatten)]
        target: Target,

        /// Also wait until the resource is gone
        #[arg(long)]
        wait: bool,

        #[command(flatten)]
        policy: Wait,
    },

    /// Expand a template and apply it
    Apply {
        /// Template file
        template: PathBuf,

        /// Template parameter (KEY=VALUE), repeatable
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Expand with the CLI's process verb instead of local substitution
        #[arg(long)]
        process: bool,

        /// Wait for KIND/NAME to appear after applying
        #[arg(long)]
        wait_for: Option<String>,

        #[command(flatten)]
        wait: Wait,
    },

    /// List resources of a kind
    List {
        /// Resource kind, e.g. pod
        kind: String,

        /// Label selector term, repeatable (combined with AND)
        #[arg(short, long)]
        label: Vec<String>,

        /// Sort oldest first
        #[arg(long)]
        by_creation: bool,

        /// Wait until at least this many resources match
        #[arg(long)]
        at_least: Option<usize>,

        #[command(flatten)]
        wait: Wait,
    },

    /// Wait until a log line matches a regular expression
    WaitLog {
        #[command(flatten)]
        target: Target,

        /// Regular expression to look for
        pattern: String,

        /// Container name
        #[arg(short = 'C', long)]
        container: Option<String>,

        #[command(flatten)]
        wait: Wait,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("info,converge=debug")
    } else {
        EnvFilter::new("warn,converge=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = match &cli.config {
        Some(path) => ConvergeConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?
            .apply_env(),
        None => ConvergeConfig::from_env(),
    };

    let client = Client::new(Arc::new(KubectlRunner::from_config(&config)));
    let client = if cli.as_user {
        client.as_user()
    } else {
        client
    };

    let app = App {
        client,
        config,
        namespace: cli.namespace,
        format: cli.format,
    };
    app.run(cli.command).await
}

struct App {
    client: Client,
    config: ConvergeConfig,
    namespace: Option<String>,
    format: OutputFormat,
}

impl App {
    async fn run(&self, command: Commands) -> Result<ExitCode> {
        match command {
            Commands::Exists { target } => {
                let exists = self.client.resource(self.identity(&target)).exists().await?;
                self.print(&exists.to_string(), &serde_json::json!({ "exists": exists }));
                return Ok(ExitCode::from(exists_status(exists)));
            }
            Commands::WaitPresent { target, wait } => {
                let mut handle = self.client.resource(self.identity(&target));
                let what = format!("{handle} to appear");
                handle
                    .wait_until_present(self.policy(wait)?)
                    .await
                    .into_result(&what)?;
                info!(resource = %handle, "Present");
            }
            Commands::WaitGone { target, wait } => {
                let mut handle = self.client.resource(self.identity(&target));
                let what = format!("{handle} to be gone");
                handle
                    .wait_until_gone(self.policy(wait)?)
                    .await
                    .into_result(&what)?;
                info!(resource = %handle, "Gone");
            }
            Commands::WaitRollout { target, wait } => {
                let handle = self.client.resource(self.identity(&target));
                let what = format!("{handle} to roll out");
                let desired = handle
                    .wait_for_rollout(self.policy(wait)?)
                    .await
                    .into_result(&what)?;
                self.print(&desired.to_string(), &serde_json::json!({ "replicas": desired }));
            }
            Commands::WaitPods { label, wait } => {
                let set = self.client.resources("pod", self.namespace.as_deref());
                let filter = label
                    .into_iter()
                    .fold(ListFilter::new(), |filter, term| filter.label(term));
                let what = "labelled pods to be ready";
                let ready = set
                    .wait_for_pods_ready(&filter, self.policy(wait)?)
                    .await
                    .into_result(what)?;
                self.print(&ready.to_string(), &serde_json::json!({ "pods": ready }));
            }
            Commands::Get {
                target,
                jsonpath,
                pointer,
            } => {
                let projection = match (jsonpath, pointer) {
                    (Some(expr), _) => Projection::jsonpath(expr),
                    (None, Some(pointer)) => Projection::pointer(pointer),
                    (None, None) => Projection::Raw,
                };
                let value = self
                    .client
                    .resource(self.identity(&target))
                    .get(&projection)
                    .await?;
                self.print(&value, &serde_json::json!({ "value": value }));
            }
            Commands::WaitField {
                target,
                jsonpath,
                expect,
                wait,
            } => {
                let handle = self.client.resource(self.identity(&target));
                let projection = Projection::jsonpath(jsonpath);
                let expected = field_match(expect)?;
                let what = format!("{projection} of {handle} {expected}");
                let value = handle
                    .wait_for_field(&projection, &expected, self.policy(wait)?)
                    .await
                    .into_result(&what)?;
                self.print(&value, &serde_json::json!({ "value": value }));
            }
            Commands::Delete {
                target,
                wait,
                policy,
            } => {
                let mut handle = self.client.resource(self.identity(&target));
                if wait {
                    handle.clear(self.policy(policy)?).await?;
                } else {
                    handle.delete().await?;
                }
                info!(resource = %handle, "Deleted");
            }
            Commands::Apply {
                template,
                params,
                process,
                wait_for,
                wait,
            } => {
                let scratch = ScratchDir::new(&self.config.scratch_dir);
                let engine: Box<dyn TemplateEngine> = if process {
                    Box::new(ProcessTemplateEngine::new(self.client.clone(), scratch))
                } else {
                    Box::new(LocalTemplateEngine::new(scratch))
                };
                let template = ManifestTemplate::new(template).params(params);
                let retry = self.config.policies.apply_retry;

                let manifest = match wait_for {
                    Some(target) => {
                        let (kind, name) = target
                            .split_once('/')
                            .ok_or_else(|| anyhow!("--wait-for expects KIND/NAME, got {target}"))?;
                        let mut handle = self.client.resource(self.identity(&Target {
                            kind: kind.to_string(),
                            name: name.to_string(),
                        }));
                        handle
                            .apply_template_and_wait(engine.as_ref(), &template, retry, self.policy(wait)?)
                            .await?
                    }
                    None => {
                        self.client
                            .apply_template(engine.as_ref(), &template, retry)
                            .await?
                    }
                };
                let path = manifest.path().display().to_string();
                self.print(&path, &serde_json::json!({ "manifest": path }));
            }
            Commands::List {
                kind,
                label,
                by_creation,
                at_least,
                wait,
            } => {
                let set = self.client.resources(kind, self.namespace.as_deref());
                let mut filter = label
                    .into_iter()
                    .fold(ListFilter::new(), |filter, term| filter.label(term));
                if by_creation {
                    filter = filter.sort_by_creation();
                }
                if let Some(n) = at_least {
                    let expected = CountMatch::AtLeast(n);
                    let what = format!("{expected} {}", set.kind());
                    set.wait_for_count(&filter, expected, self.policy(wait)?)
                        .await
                        .into_result(&what)?;
                }
                let names = set.names(&filter).await?;
                self.print(&names.join("\n"), &serde_json::json!({ "items": names }));
            }
            Commands::WaitLog {
                target,
                pattern,
                container,
                wait,
            } => {
                let handle = self.client.resource(self.identity(&target));
                let re = Regex::new(&pattern).with_context(|| format!("invalid pattern {pattern}"))?;
                let what = format!("{handle} logs to match /{pattern}/");
                let line = handle
                    .wait_for_log(&re, container.as_deref(), self.policy(wait)?)
                    .await
                    .into_result(&what)?;
                self.print(&line, &serde_json::json!({ "line": line }));
            }
        }
        Ok(ExitCode::SUCCESS)
    }

    fn identity(&self, target: &Target) -> ResourceIdentity {
        ResourceIdentity {
            kind: target.kind.clone(),
            namespace: self.namespace.clone(),
            name: target.name.clone(),
        }
    }

    fn policy(&self, wait: Wait) -> Result<PollPolicy> {
        let base = self.config.policies.resource;
        let secs = |value: Option<f64>, default: Duration| -> Result<Duration> {
            value.map_or(Ok(default), |s| {
                Duration::try_from_secs_f64(s).with_context(|| format!("invalid duration {s}"))
            })
        };
        Ok(PollPolicy::new(
            secs(wait.interval, base.interval)?,
            secs(wait.timeout, base.timeout)?,
        ))
    }

    fn print(&self, text: &str, json: &serde_json::Value) {
        match self.format {
            OutputFormat::Text => println!("{text}"),
            OutputFormat::Json => println!("{json}"),
        }
    }
}

/// Exit status of `exists` when the query succeeded. Errors exit with 1.
const ABSENT: u8 = 2;

fn exists_status(exists: bool) -> u8 {
    if exists {
        0
    } else {
        ABSENT
    }
}

fn field_match(expect: Expectation) -> Result<FieldMatch> {
    Ok(match expect {
        Expectation {
            equals: Some(v), ..
        } => FieldMatch::Equals(v),
        Expectation {
            not_equals: Some(v),
            ..
        } => FieldMatch::NotEquals(v),
        Expectation {
            contains: Some(v), ..
        } => FieldMatch::Contains(v),
        Expectation {
            not_contains: Some(v),
            ..
        } => FieldMatch::NotContains(v),
        Expectation {
            matches: Some(pattern),
            ..
        } => FieldMatch::Matches(
            Regex::new(&pattern).with_context(|| format!("invalid pattern {pattern}"))?,
        ),
        Expectation { non_empty: true, .. } => FieldMatch::NonEmpty,
        Expectation { .. } => bail!("no expectation given"),
    })
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {s}"))
}
