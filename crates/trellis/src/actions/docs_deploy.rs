use super::{Action, ActionContext};
use crate::{CredentialProvider, DeployRequest, DeployTarget, Error, Outputs, Result};
use std::sync::Arc;

const DEFAULT_AUDIENCE: &str = "docs";

/// `uses: docs-deploy`. Inputs: `source`, optional `environment` and
/// `audience`. Outputs `url`.
pub struct DocsDeployAction {
  target: Arc<dyn DeployTarget>,
  credentials: Option<Arc<dyn CredentialProvider>>,
}

impl DocsDeployAction {
  pub fn new(
    target: Arc<dyn DeployTarget>,
    credentials: Option<Arc<dyn CredentialProvider>>,
  ) -> Self {
    DocsDeployAction {
      target,
      credentials,
    }
  }
}

#[async_trait::async_trait]
impl Action for DocsDeployAction {
  async fn run(&self, ctx: ActionContext) -> Result<Outputs> {
    let mut request: DeployRequest = serde_json::from_value(ctx.inputs.clone())
      .map_err(|err| Error::step_failure(format!("Invalid docs-deploy inputs: {}", err)))?;

    if let Some(credentials) = &self.credentials {
      let audience = ctx.input("audience").unwrap_or(DEFAULT_AUDIENCE);
      request.token = Some(
        credentials
          .token(audience)
          .await
          .map_err(|err| Error::external_backend_error(format!("Credential provider: {}", err)))?,
      );
    }

    ctx.log(format!("Deploying `{}`", request.source));

    let url = self.target.deploy(request).await.map_err(|err| match err {
      Error::ExternalBackendError(_) => err,
      other => Error::external_backend_error(other.to_string()),
    })?;

    ctx.log(format!("Deployed to {}", url));

    let mut outputs = Outputs::new();
    outputs.insert("url".to_string(), url);

    Ok(outputs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::StepId;
  use serde_json::json;

  struct Pages;

  #[async_trait::async_trait]
  impl DeployTarget for Pages {
    async fn deploy(&self, request: DeployRequest) -> Result<String> {
      Ok(format!(
        "https://docs.example.com/{}",
        request.environment.unwrap_or_else(|| "latest".to_string())
      ))
    }
  }

  #[trellis_test::test]
  async fn deploys() {
    let action = DocsDeployAction::new(Arc::new(Pages), None);

    let outputs = action
      .run(ActionContext::new(
        StepId::new("run", "docs", 1),
        json!({ "source": "book", "environment": "preview" }),
      ))
      .await
      .unwrap();

    assert_eq!(
      outputs.get("url").unwrap(),
      "https://docs.example.com/preview"
    );
  }

  #[trellis_test::test]
  async fn missing_source() {
    let action = DocsDeployAction::new(Arc::new(Pages), None);

    let err = action
      .run(ActionContext::new(StepId::new("run", "docs", 1), json!({})))
      .await
      .unwrap_err();

    assert!(matches!(err, Error::StepFailure(_)));
  }
}
