use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error("Invalid workflow configuration: {0}")]
  ConfigurationError(String),

  #[error("Step failed: {0}")]
  StepFailure(String),

  #[error("Timed out after {0:?}")]
  Timeout(Duration),

  #[error("External backend error: {0}")]
  ExternalBackendError(String),

  #[error("Run was cancelled")]
  Cancelled,

  #[error("Error while running workflow: {0}")]
  InternalRuntimeError(String),

  #[error("Failed to initialize: {0}")]
  InitError(String),

  #[error("IO error: {0}")]
  IOError(#[from] std::io::Error),

  #[error("Error: {0}")]
  Error(String),
}

impl Error {
  pub fn configuration_error<T: ToString>(message: T) -> Self {
    Self::ConfigurationError(message.to_string())
  }

  pub fn step_failure<T: ToString>(message: T) -> Self {
    Self::StepFailure(message.to_string())
  }

  pub fn timeout(after: Duration) -> Self {
    Self::Timeout(after)
  }

  pub fn external_backend_error<T: ToString>(message: T) -> Self {
    Self::ExternalBackendError(message.to_string())
  }

  pub fn internal_runtime_error<T: ToString>(message: T) -> Self {
    Self::InternalRuntimeError(message.to_string())
  }

  pub fn init_error<T: ToString>(message: T) -> Self {
    Self::InitError(message.to_string())
  }

  pub fn io_error(source: std::io::Error) -> Self {
    Self::IOError(source)
  }

  pub fn error<T: ToString>(message: T) -> Self {
    Self::Error(message.to_string())
  }

  /// Load-time errors; no job may run when one of these is raised.
  pub fn is_fatal(&self) -> bool {
    matches!(self, Self::ConfigurationError(_) | Self::InitError(_))
  }
}

// implement PartialEq for Error so that we can compare errors in tests
impl PartialEq for Error {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Self::ConfigurationError(a), Self::ConfigurationError(b)) => a == b,
      (Self::StepFailure(a), Self::StepFailure(b)) => a == b,
      (Self::Timeout(a), Self::Timeout(b)) => a == b,
      (Self::ExternalBackendError(a), Self::ExternalBackendError(b)) => a == b,
      (Self::Cancelled, Self::Cancelled) => true,
      (Self::InternalRuntimeError(a), Self::InternalRuntimeError(b)) => a == b,
      (Self::InitError(a), Self::InitError(b)) => a == b,
      (Self::IOError(a), Self::IOError(b)) => a.kind() == b.kind(),
      (Self::Error(a), Self::Error(b)) => a == b,
      _ => false,
    }
  }
}
