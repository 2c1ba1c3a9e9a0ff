use crate::{
  Action, CacheBackend, CacheResolver, ConcurrencyGroups, ContainerBuildAction,
  ContainerBuildBackend, CredentialProvider, DeployTarget, DocsDeployAction, Error, EventKind,
  ExpressionContext, JobExecutor, JobSignal, Plugin, PluginManager, Result, RunContext, RunId,
  RunSnapshot, RunStartedEvent, Runner, Scheduler, StatusReporter, TrellisSharedState,
  TriggerRequest, Workflow, WorkflowRunResult,
};
use serde::{Deserialize, Deserializer};
use std::{sync::Arc, time::Duration};

pub const CONTAINER_BUILD_ACTION: &str = "container-build";
pub const DOCS_DEPLOY_ACTION: &str = "docs-deploy";

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
  D: Deserializer<'de>,
{
  let value: Option<String> = Option::deserialize(deserializer)?;
  value
    .map(|value| humantime::parse_duration(&value).map_err(serde::de::Error::custom))
    .transpose()
}

/// Engine wide settings.
///
/// ```yaml
/// concurrency-limit: 8
/// default-branch: main
/// default-job-timeout: 1h
/// ```
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct EngineConfig {
  /// Jobs of one run executing at the same time
  pub concurrency_limit: usize,
  /// Fallback scope for cache lookups
  pub default_branch: String,
  /// Applies to jobs without their own `timeout`
  #[serde(deserialize_with = "deserialize_duration")]
  pub default_job_timeout: Option<Duration>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    EngineConfig {
      concurrency_limit: 4,
      default_branch: "main".to_string(),
      default_job_timeout: None,
    }
  }
}

impl EngineConfig {
  pub fn from_yaml(yaml: &str) -> Result<Self> {
    serde_yaml::from_str(yaml).map_err(|err| {
      Error::configuration_error(format!("Failed to parse engine config: {}", err))
    })
  }
}

impl TryFrom<&str> for EngineConfig {
  type Error = Error;

  fn try_from(yaml: &str) -> Result<Self> {
    Self::from_yaml(yaml)
  }
}

pub struct TrellisBuilder {
  runner: Option<Arc<dyn Runner>>,
  shared_state: TrellisSharedState,
  cache: Option<Arc<dyn CacheBackend>>,
  container_backend: Option<Arc<dyn ContainerBuildBackend>>,
  deploy_target: Option<Arc<dyn DeployTarget>>,
  credentials: Option<Arc<dyn CredentialProvider>>,
  config: EngineConfig,
  concurrency_limit: Option<usize>,
  default_branch: Option<String>,
  default_job_timeout: Option<Duration>,
}

impl TrellisBuilder {
  pub fn new() -> Self {
    TrellisBuilder {
      runner: None,
      shared_state: TrellisSharedState::new(),
      cache: None,
      container_backend: None,
      deploy_target: None,
      credentials: None,
      config: EngineConfig::default(),
      concurrency_limit: None,
      default_branch: None,
      default_job_timeout: None,
    }
  }

  pub fn runner<T>(mut self, runner: T) -> Self
  where
    T: Runner + 'static,
  {
    self.runner = Some(Arc::new(runner));
    self
  }

  pub fn plugin<P: Plugin + 'static>(self, plugin: P) -> Self {
    self.shared_state.register_plugin(plugin);
    self
  }

  pub fn action<T>(self, name: impl Into<String>, action: T) -> Self
  where
    T: Action + 'static,
  {
    self.shared_state.register_action(name, action);
    self
  }

  pub fn cache<T>(mut self, backend: T) -> Self
  where
    T: CacheBackend + 'static,
  {
    self.cache = Some(Arc::new(backend));
    self
  }

  /// Enables the `container-build` action.
  pub fn container_backend<T>(mut self, backend: T) -> Self
  where
    T: ContainerBuildBackend + 'static,
  {
    self.container_backend = Some(Arc::new(backend));
    self
  }

  /// Enables the `docs-deploy` action.
  pub fn deploy_target<T>(mut self, target: T) -> Self
  where
    T: DeployTarget + 'static,
  {
    self.deploy_target = Some(Arc::new(target));
    self
  }

  pub fn credentials<T>(mut self, provider: T) -> Self
  where
    T: CredentialProvider + 'static,
  {
    self.credentials = Some(Arc::new(provider));
    self
  }

  /// Base settings. The individual setters below take precedence regardless
  /// of call order.
  pub fn config(mut self, config: EngineConfig) -> Self {
    self.config = config;
    self
  }

  pub fn concurrency_limit(mut self, limit: usize) -> Self {
    self.concurrency_limit = Some(limit);
    self
  }

  pub fn default_branch(mut self, branch: impl Into<String>) -> Self {
    self.default_branch = Some(branch.into());
    self
  }

  pub fn default_job_timeout(mut self, timeout: Duration) -> Self {
    self.default_job_timeout = Some(timeout);
    self
  }

  pub fn build(self) -> Result<Trellis> {
    let runner = self
      .runner
      .ok_or_else(|| Error::init_error("Runner is required"))?;

    let mut config = self.config;
    if let Some(limit) = self.concurrency_limit {
      config.concurrency_limit = limit;
    }
    if let Some(branch) = self.default_branch {
      config.default_branch = branch;
    }
    if let Some(timeout) = self.default_job_timeout {
      config.default_job_timeout = Some(timeout);
    }

    if config.concurrency_limit == 0 {
      return Err(Error::init_error("Concurrency limit must be at least 1"));
    }

    if let Some(backend) = self.container_backend {
      self.shared_state.register_action(
        CONTAINER_BUILD_ACTION,
        ContainerBuildAction::new(backend, self.credentials.clone()),
      );
    }
    if let Some(target) = self.deploy_target {
      self.shared_state.register_action(
        DOCS_DEPLOY_ACTION,
        DocsDeployAction::new(target, self.credentials.clone()),
      );
    }

    log::trace!("Engine configured with {:?}", config);

    Ok(Trellis {
      runner,
      shared_state: self.shared_state,
      cache: self.cache,
      config,
    })
  }
}

impl Default for TrellisBuilder {
  fn default() -> Self {
    Self::new()
  }
}

/// The engine. Holds the runner, registered plugins and actions, and hands
/// out [`WorkflowRun`]s for matching trigger requests.
#[derive(Clone)]
pub struct Trellis {
  runner: Arc<dyn Runner>,
  shared_state: TrellisSharedState,
  cache: Option<Arc<dyn CacheBackend>>,
  config: EngineConfig,
}

impl Trellis {
  pub fn builder() -> TrellisBuilder {
    TrellisBuilder::new()
  }

  pub fn register_plugin<P: Plugin + 'static>(&self, plugin: P) {
    self.shared_state.register_plugin(plugin);
  }

  pub fn unregister_plugin(&self, name: &str) {
    self.shared_state.unregister_plugin(name);
  }

  pub fn register_action<T>(&self, name: impl Into<String>, action: T)
  where
    T: Action + 'static,
  {
    self.shared_state.register_action(name, action);
  }

  pub fn unregister_action(&self, name: &str) {
    self.shared_state.unregister_action(name);
  }

  pub fn actions(&self) -> crate::Actions {
    self.shared_state.actions()
  }

  pub fn plugins(&self) -> PluginManager {
    self.shared_state.plugins()
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Gates `request` on the workflow's triggers. Returns the run to start,
  /// or `None` when no trigger rule matches. Several matching events that
  /// `on.priority` does not rank are a configuration error.
  pub fn trigger(&self, workflow: &Workflow, request: TriggerRequest) -> Result<Option<WorkflowRun>> {
    if request.events.is_empty() {
      return Err(Error::configuration_error(
        "Trigger request carries no events",
      ));
    }

    let Some(event) = workflow.triggers.resolve(&request)? else {
      log::info!(
        "Workflow {} is not triggered by {:?} on branch {}",
        workflow.name.as_deref().unwrap_or("<unnamed>"),
        request.events,
        request.branch
      );
      return Ok(None);
    };

    let id = request.id.clone().unwrap_or_else(RunId::generate);
    let context = ExpressionContext::for_run(&id, event, &request);

    let concurrency = workflow.concurrency.as_ref().map(|concurrency| RunGroup {
      key: concurrency.group.render(context.data()),
      cancel_in_progress: concurrency.cancel_in_progress,
    });

    let plugins = self.shared_state.plugins();
    let reporter = StatusReporter::new(id.clone(), &workflow.jobs, plugins.clone());
    let cache = self.cache.as_ref().map(|backend| {
      CacheResolver::new(
        backend.clone(),
        &request.branch,
        &self.config.default_branch,
      )
    });

    let executor = JobExecutor {
      runner: self.runner.clone(),
      actions: self.shared_state.actions(),
      plugins,
      reporter,
      cache,
      default_timeout: self.config.default_job_timeout,
    };

    log::info!("Created run {} for {} event", id, event);

    Ok(Some(WorkflowRun {
      id,
      event,
      changed_files: request.changed_files,
      workflow: Arc::new(workflow.clone()),
      context,
      concurrency,
      signal: JobSignal::new(),
      executor,
      groups: self.shared_state.concurrency_groups(),
      concurrency_limit: self.config.concurrency_limit,
    }))
  }
}

struct RunGroup {
  key: String,
  cancel_in_progress: bool,
}

/// A triggered run. Nothing executes until [`run`](WorkflowRun::run) is
/// awaited; the signal and reporter handles stay usable from other tasks.
pub struct WorkflowRun {
  id: RunId,
  event: EventKind,
  changed_files: Vec<String>,
  workflow: Arc<Workflow>,
  context: ExpressionContext,
  concurrency: Option<RunGroup>,
  signal: JobSignal,
  executor: JobExecutor,
  groups: ConcurrencyGroups,
  concurrency_limit: usize,
}

impl WorkflowRun {
  pub fn id(&self) -> &RunId {
    &self.id
  }

  pub fn event(&self) -> EventKind {
    self.event
  }

  pub fn changed_files(&self) -> &[String] {
    &self.changed_files
  }

  pub fn concurrency_group(&self) -> Option<&str> {
    self.concurrency.as_ref().map(|group| group.key.as_str())
  }

  pub fn signal(&self) -> JobSignal {
    self.signal.clone()
  }

  pub fn cancel(&self) -> Result<()> {
    log::info!("Cancel requested for run {}", self.id);
    self.signal.cancel()
  }

  pub fn reporter(&self) -> StatusReporter {
    self.executor.reporter.clone()
  }

  pub fn snapshot(&self) -> RunSnapshot {
    self.executor.reporter.snapshot()
  }

  /// Waits for the run's concurrency group, then schedules every job to a
  /// terminal status.
  pub async fn run(self) -> WorkflowRunResult {
    let _lease = match &self.concurrency {
      Some(group) => Some(
        self
          .groups
          .acquire(
            group.key.clone(),
            self.id.clone(),
            self.signal.clone(),
            group.cancel_in_progress,
          )
          .await,
      ),
      None => None,
    };

    self.executor.plugins.on_run_started(RunStartedEvent {
      id: self.id.clone(),
      event: self.event,
      workflow: self.workflow.name.clone(),
      jobs: self.workflow.jobs.iter().map(|job| job.key.clone()).collect(),
    });

    let scheduler = Scheduler::new(self.concurrency_limit);
    scheduler
      .run(RunContext {
        id: self.id,
        event: self.event,
        workflow: self.workflow,
        context: self.context,
        signal: self.signal,
        executor: self.executor,
      })
      .await
  }
}
