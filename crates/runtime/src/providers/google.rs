//! Shared Vertex AI plumbing: project location and access tokens.

use crate::model::ProviderError;
use tokio::process::Command;

/// How Vertex AI requests are authenticated.
#[derive(Debug, Clone)]
pub enum GoogleAuth {
    /// A pre-fetched OAuth access token.
    AccessToken(String),
    /// Ask the local `gcloud` CLI for a token on every call.
    Gcloud,
}

impl std::fmt::Display for GoogleAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessToken(_) => write!(f, "access_token"),
            Self::Gcloud => write!(f, "gcloud"),
        }
    }
}

impl GoogleAuth {
    pub(crate) async fn token(&self, provider: &str) -> Result<String, ProviderError> {
        match self {
            Self::AccessToken(token) => Ok(token.clone()),
            Self::Gcloud => {
                let output = Command::new("gcloud")
                    .args(["auth", "print-access-token"])
                    .output()
                    .await
                    .map_err(|e| {
                        ProviderError::config(provider, format!("failed to run gcloud: {e}"))
                    })?;
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(ProviderError::config(
                        provider,
                        format!("gcloud auth print-access-token failed: {}", stderr.trim()),
                    ));
                }
                let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if token.is_empty() {
                    return Err(ProviderError::config(provider, "gcloud returned an empty token"));
                }
                Ok(token)
            }
        }
    }
}

/// A Google Cloud project and region hosting Vertex AI models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLocation {
    pub project_id: String,
    pub region: String,
}

impl VertexLocation {
    pub fn new(project_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            region: region.into(),
        }
    }

    /// Regional API host, e.g. `https://us-central1-aiplatform.googleapis.com`.
    pub fn host(&self) -> String {
        format!("https://{}-aiplatform.googleapis.com", self.region)
    }

    /// Path of a publisher model relative to the API host.
    pub fn model_path(&self, publisher: &str, model: &str) -> String {
        format!(
            "/v1/projects/{}/locations/{}/publishers/{}/models/{}",
            self.project_id, self.region, publisher, model
        )
    }
}
