use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

use crate::descriptor::{ParamSpec, ToolCategory, ToolDescriptor};
use crate::error::ToolError;
use crate::sandbox::ExecutionContext;
use crate::tools::{parse_args, Tool};

pub const SERVER: &str = "api";
pub const DESCRIPTION: &str = "Outbound HTTP and GraphQL calls";

const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH"];

fn client(ctx: &ExecutionContext) -> Result<reqwest::Client, ToolError> {
    reqwest::Client::builder()
        .timeout(ctx.policy.timeout)
        .build()
        .map_err(|e| ToolError::Execution(e.to_string()))
}

/// Collect a response body, feeding the capture buffer and bounding the
/// payload by the policy's output cap.
async fn read_body(
    ctx: &ExecutionContext,
    response: reqwest::Response,
) -> Result<(String, bool), ToolError> {
    let text = response
        .text()
        .await
        .map_err(|e| ToolError::Execution(e.to_string()))?;
    ctx.capture(&text);
    let cap = ctx.policy.max_output_bytes;
    if text.len() > cap {
        let mut cut = cap;
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        Ok((text[..cut].to_string(), true))
    } else {
        Ok((text, false))
    }
}

#[derive(Deserialize)]
struct HttpRequestInput {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<serde_json::Value>,
}

fn default_method() -> String {
    "GET".into()
}

pub struct HttpRequestTool;

#[async_trait]
impl Tool for HttpRequestTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            server: SERVER.into(),
            name: "http_request".into(),
            description: "Send an HTTP request and return status and body".into(),
            parameters: vec![
                ParamSpec::required("url", "string", "Target URL"),
                ParamSpec::optional("method", "string", "HTTP method", json!("GET")),
                ParamSpec::optional("headers", "object", "Request headers", json!({})),
                ParamSpec::optional("body", "object", "JSON request body", json!(null)),
            ],
            category: ToolCategory::Network,
            timeout_secs: None,
        }
    }

    async fn execute(
        &self,
        ctx: ExecutionContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let input: HttpRequestInput = parse_args(args)?;

        let method = input.method.to_uppercase();
        if !ALLOWED_METHODS.contains(&method.as_str()) {
            return Err(ToolError::PolicyViolation(format!(
                "HTTP method not allowed: {}",
                method
            )));
        }
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|e| ToolError::Validation(e.to_string()))?;

        let mut request = client(&ctx)?.request(method, &input.url);
        for (key, value) in &input.headers {
            request = request.header(key, value);
        }
        if let Some(body) = &input.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;
        let status = response.status().as_u16();
        let (body, truncated) = read_body(&ctx, response).await?;

        Ok(json!({
            "status": status,
            "body": body,
            "body_truncated": truncated,
        }))
    }
}

#[derive(Deserialize)]
struct GraphqlQueryInput {
    endpoint: String,
    query: String,
    #[serde(default)]
    variables: Option<serde_json::Value>,
}

pub struct GraphqlQueryTool;

#[async_trait]
impl Tool for GraphqlQueryTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            server: SERVER.into(),
            name: "graphql_query".into(),
            description: "Run a GraphQL query against an endpoint".into(),
            parameters: vec![
                ParamSpec::required("endpoint", "string", "GraphQL endpoint URL"),
                ParamSpec::required("query", "string", "GraphQL query document"),
                ParamSpec::optional("variables", "object", "Query variables", json!(null)),
            ],
            category: ToolCategory::Network,
            timeout_secs: None,
        }
    }

    async fn execute(
        &self,
        ctx: ExecutionContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let input: GraphqlQueryInput = parse_args(args)?;

        let mut payload = json!({"query": input.query});
        if let Some(variables) = &input.variables {
            payload["variables"] = variables.clone();
        }

        let response = client(&ctx)?
            .post(&input.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;
        let status = response.status().as_u16();
        let (body, truncated) = read_body(&ctx, response).await?;

        let data: serde_json::Value = serde_json::from_str(&body).unwrap_or(json!({"raw": body}));
        Ok(json!({
            "status": status,
            "data": data,
            "body_truncated": truncated,
        }))
    }
}
