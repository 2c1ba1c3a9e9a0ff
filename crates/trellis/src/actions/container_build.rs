use super::{Action, ActionContext};
use crate::{BuildRequest, ContainerBuildBackend, CredentialProvider, Error, Outputs, Result};
use std::sync::Arc;

const DEFAULT_AUDIENCE: &str = "registry";

/// `uses: container-build`. Inputs follow [`BuildRequest`] (`context`,
/// `dockerfile`, `target`, `build-args`, `tags`, `cache-from`, `cache-to`,
/// `push`), plus an optional `audience` for the registry token. Outputs
/// `digest` and `tags`.
pub struct ContainerBuildAction {
  backend: Arc<dyn ContainerBuildBackend>,
  credentials: Option<Arc<dyn CredentialProvider>>,
}

impl ContainerBuildAction {
  pub fn new(
    backend: Arc<dyn ContainerBuildBackend>,
    credentials: Option<Arc<dyn CredentialProvider>>,
  ) -> Self {
    ContainerBuildAction {
      backend,
      credentials,
    }
  }
}

#[async_trait::async_trait]
impl Action for ContainerBuildAction {
  async fn run(&self, ctx: ActionContext) -> Result<Outputs> {
    let mut request: BuildRequest = serde_json::from_value(ctx.inputs.clone())
      .map_err(|err| Error::step_failure(format!("Invalid container-build inputs: {}", err)))?;

    if request.push {
      if let Some(credentials) = &self.credentials {
        let audience = ctx.input("audience").unwrap_or(DEFAULT_AUDIENCE);
        let token = credentials.token(audience).await.map_err(|err| {
          log::error!("Failed to obtain registry token for {}: {}", ctx.id, err);
          Error::external_backend_error(format!("Credential provider: {}", err))
        })?;
        request.token = Some(token);
      }
    }

    ctx.log(format!(
      "Building image from `{}` with tags [{}]",
      request.context,
      request.tags.join(", ")
    ));

    let output = self.backend.build(request).await.map_err(|err| match err {
      Error::ExternalBackendError(_) => err,
      other => Error::external_backend_error(other.to_string()),
    })?;

    ctx.log(format!("Built image {}", output.digest));

    let mut outputs = Outputs::new();
    outputs.insert("digest".to_string(), output.digest);
    outputs.insert("tags".to_string(), output.pushed_tags.join(","));

    Ok(outputs)
  }
}
