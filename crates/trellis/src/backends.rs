//! Narrow interfaces to the systems a pipeline talks to but Trellis does not
//! implement: image builders, credential brokers and documentation hosts.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Opaque short-lived credential. Never printed, never serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
  pub fn new(token: impl Into<String>) -> Self {
    AccessToken(token.into())
  }

  pub fn secret(&self) -> &str {
    &self.0
  }
}

impl fmt::Debug for AccessToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("AccessToken(***)")
  }
}

#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
  async fn token(&self, audience: &str) -> Result<AccessToken>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildRequest {
  pub context: String,
  pub dockerfile: Option<String>,
  pub target: Option<String>,
  #[serde(default)]
  pub build_args: BTreeMap<String, String>,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub cache_from: Vec<String>,
  #[serde(default)]
  pub cache_to: Vec<String>,
  #[serde(default)]
  pub push: bool,
  /// Filled from the [`CredentialProvider`] right before the build.
  #[serde(skip)]
  pub token: Option<AccessToken>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildOutput {
  pub digest: String,
  pub pushed_tags: Vec<String>,
}

/// Builds (and optionally pushes) a container image.
#[async_trait::async_trait]
pub trait ContainerBuildBackend: Send + Sync {
  async fn build(&self, request: BuildRequest) -> Result<BuildOutput>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployRequest {
  /// Directory holding the rendered site
  pub source: String,
  pub environment: Option<String>,
  #[serde(skip)]
  pub token: Option<AccessToken>,
}

/// Publishes a documentation site and returns its URL.
#[async_trait::async_trait]
pub trait DeployTarget: Send + Sync {
  async fn deploy(&self, request: DeployRequest) -> Result<String>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn token_is_redacted() {
    let request = BuildRequest {
      context: ".".to_string(),
      token: Some(AccessToken::new("ghs_secret")),
      ..Default::default()
    };

    let debug = format!("{:?}", request);
    assert!(!debug.contains("ghs_secret"));
    assert!(debug.contains("AccessToken(***)"));

    let json = serde_json::to_string(&request).unwrap();
    assert!(!json.contains("ghs_secret"));
    assert!(!json.contains("token"));
  }

  #[test]
  fn build_request_from_inputs() {
    let request: BuildRequest = serde_json::from_value(serde_json::json!({
      "context": "docker",
      "build-args": { "VERSION": "1.0" },
      "tags": ["app:latest"],
      "cache-from": ["type=gha"],
      "push": true,
    }))
    .unwrap();

    assert_eq!(request.context, "docker");
    assert_eq!(request.build_args.get("VERSION").unwrap(), "1.0");
    assert_eq!(request.cache_from, vec!["type=gha"]);
    assert!(request.push);
    assert!(request.token.is_none());
  }
}
