//! Gemini on Vertex AI (`generateContent`).

use super::google::{GoogleAuth, VertexLocation};
use super::{Provider, Sampling, send_json, structured_call_action};
use crate::model::{
    ChatOptions, EngineResponse, Message, ProviderError, ProviderReply, Role, ToolSchema,
    split_system,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub(super) const DEFAULT_MODEL: &str = "gemini-1.5-pro";
const NAME: &str = "vertex_gemini";
const TOP_P: f32 = 0.95;

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_HARASSMENT",
];

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest<'a> {
    contents: Vec<ApiContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiSystem<'a>>,
    generation_config: ApiGenerationConfig,
    safety_settings: Vec<ApiSafetySetting>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTools<'a>>,
}

#[derive(Debug, Serialize)]
struct ApiContent<'a> {
    role: &'static str,
    parts: [ApiTextPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ApiSystem<'a> {
    parts: [ApiTextPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ApiTextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiGenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct ApiSafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiTools<'a> {
    function_declarations: Vec<ApiFunctionDeclaration<'a>>,
}

#[derive(Debug, Serialize)]
struct ApiFunctionDeclaration<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a ToolSchema> for ApiFunctionDeclaration<'a> {
    fn from(schema: &'a ToolSchema) -> Self {
        Self {
            name: &schema.name,
            description: &schema.description,
            parameters: &schema.parameters,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
}

#[derive(Debug, Deserialize)]
struct ApiCandidate {
    #[serde(default)]
    content: Option<ApiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseContent {
    #[serde(default)]
    parts: Vec<ApiResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    function_call: Option<ApiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

fn build_request<'a>(
    messages: &'a [Message],
    options: &'a ChatOptions,
    sampling: &Sampling,
) -> ApiRequest<'a> {
    let (system, turns) = split_system(messages);
    let contents = turns
        .into_iter()
        .map(|msg| ApiContent {
            role: match msg.role {
                Role::Assistant => "model",
                Role::User | Role::System => "user",
            },
            parts: [ApiTextPart { text: &msg.content }],
        })
        .collect();

    let tools = if options.tools.is_empty() {
        Vec::new()
    } else {
        vec![ApiTools {
            function_declarations: options
                .tools
                .iter()
                .map(ApiFunctionDeclaration::from)
                .collect(),
        }]
    };

    ApiRequest {
        contents,
        system_instruction: system
            .filter(|s| !s.trim().is_empty())
            .map(|text| ApiSystem {
                parts: [ApiTextPart { text }],
            }),
        generation_config: ApiGenerationConfig {
            max_output_tokens: sampling.max_tokens(options),
            temperature: sampling.temperature(options),
            top_p: TOP_P,
        },
        safety_settings: SAFETY_CATEGORIES
            .into_iter()
            .map(|category| ApiSafetySetting {
                category,
                threshold: "BLOCK_ONLY_HIGH",
            })
            .collect(),
        tools,
    }
}

fn response_to_reply(response: ApiResponse) -> Result<ProviderReply, ProviderError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(ProviderError::decode(NAME, "response has no candidates"));
    };

    let mut content = String::new();
    let mut actions = Vec::new();
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if let Some(text) = part.text {
            content.push_str(&text);
        }
        if let Some(call) = part.function_call {
            actions.push(structured_call_action(NAME, call.name, call.args));
        }
    }

    Ok(ProviderReply::Structured(EngineResponse::new(content, actions)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating a Vertex AI Gemini backend.
#[derive(Debug, Clone)]
pub struct VertexGeminiProviderBuilder {
    auth: GoogleAuth,
    location: VertexLocation,
    base_url: Option<String>,
    sampling: Sampling,
}

impl VertexGeminiProviderBuilder {
    pub fn new(auth: GoogleAuth, location: VertexLocation) -> Self {
        Self {
            auth,
            location,
            base_url: None,
            sampling: Sampling::new(DEFAULT_MODEL),
        }
    }

    /// Replace the regional host; the model path is still appended.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn build(self) -> VertexGeminiProvider {
        let host = self.base_url.unwrap_or_else(|| self.location.host());
        VertexGeminiProvider {
            client: reqwest::Client::new(),
            auth: self.auth,
            host: host.trim_end_matches('/').to_string(),
            location: self.location,
            sampling: self.sampling,
        }
    }
}

/// Gemini models served by Vertex AI.
pub struct VertexGeminiProvider {
    client: reqwest::Client,
    auth: GoogleAuth,
    host: String,
    location: VertexLocation,
    sampling: Sampling,
}

impl VertexGeminiProvider {
    pub fn builder(auth: GoogleAuth, location: VertexLocation) -> VertexGeminiProviderBuilder {
        VertexGeminiProviderBuilder::new(auth, location)
    }

    fn url(&self, model: &str) -> String {
        format!(
            "{}{}:generateContent",
            self.host,
            self.location.model_path("google", model)
        )
    }
}

#[async_trait]
impl Provider for VertexGeminiProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ProviderReply, ProviderError> {
        let token = self.auth.token(NAME).await?;
        let request = build_request(messages, options, &self.sampling);
        let req = self
            .client
            .post(self.url(self.sampling.model(options)))
            .bearer_auth(token);

        let response: ApiResponse = send_json(NAME, req, &request).await?;
        response_to_reply(response)
    }
}
