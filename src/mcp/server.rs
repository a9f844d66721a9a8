use crate::app::App;
use crate::errors::{ErrorCode, McpError, ToolError};
use crate::mcp::catalog::{tool_catalog, validate_tool_args};
use crate::mcp::prompts::{prompt_by_name, prompt_catalog, render_prompt};
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse, PromptGetParams, ToolCallParams};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

const PROTOCOL_VERSION: &str = "2025-06-18";
const SERVER_NAME: &str = "NextGen MCP Server";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct McpServer {
    app: Arc<App>,
}

impl McpServer {
    pub async fn new() -> Result<Self, ToolError> {
        let app = App::initialize()?;
        Ok(Self::with_app(Arc::new(app)))
    }

    pub fn with_app(app: Arc<App>) -> Self {
        Self { app }
    }

    async fn handle_initialize(&self) -> Value {
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {"listChanged": false},
                "prompts": {"listChanged": false},
            },
            "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
        })
    }

    async fn handle_tools_list(&self) -> Value {
        serde_json::json!({ "tools": tool_catalog() })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, McpError> {
        let params: ToolCallParams = serde_json::from_value(params)
            .map_err(|err| McpError::new(ErrorCode::InvalidParams, format!("Invalid params: {}", err)))?;
        if params.name.is_empty() {
            return Err(McpError::new(ErrorCode::InvalidParams, "Missing tool name"));
        }
        let args = if params.arguments.is_null() {
            Value::Object(Default::default())
        } else {
            params.arguments
        };

        validate_tool_args(&params.name, &args)?;

        let ctx = self
            .app
            .sessions
            .context(params.meta.conversation_id.as_deref(), params.meta.headers);
        let envelope = self
            .app
            .tool_executor
            .execute(&params.name, &ctx, args)
            .await
            .map_err(|err| McpError::from_tool_error(&params.name, &err))?;

        Ok(serde_json::json!({
            "content": [
                { "type": "text", "text": serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string()) }
            ],
            "structuredContent": envelope,
        }))
    }

    async fn handle_prompts_list(&self) -> Value {
        serde_json::json!({ "prompts": prompt_catalog() })
    }

    async fn handle_prompts_get(&self, params: Value) -> Result<Value, McpError> {
        let params: PromptGetParams = serde_json::from_value(params).unwrap_or_default();
        let prompt = prompt_by_name(&params.name).ok_or_else(|| {
            McpError::new(ErrorCode::InvalidParams, format!("Unknown prompt: {}", params.name))
        })?;
        Ok(render_prompt(&self.app.config.prompts_dir, prompt).await)
    }

    /// Answers one JSON-RPC message; notifications produce no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.method.starts_with("notifications/") && request.id.is_none() {
            return None;
        }
        let id = request.id?;
        let outcome = match request.method.as_str() {
            "notifications/initialized" => Ok(serde_json::json!({})),
            "initialize" => Ok(self.handle_initialize().await),
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => Ok(self.handle_tools_list().await),
            "tools/call" => self.handle_tools_call(request.params).await,
            "prompts/list" => Ok(self.handle_prompts_list().await),
            "prompts/get" => self.handle_prompts_get(request.params).await,
            _ => Err(McpError::new(ErrorCode::MethodNotFound, "Method not found")),
        };
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => JsonRpcResponse::from_error(id, err),
        })
    }

    /// Handles one line of the stdio stream and returns the serialized reply, if any.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        let response = match serde_json::from_str::<Value>(trimmed) {
            Err(_) => Some(JsonRpcResponse::failure(
                Value::Null,
                ErrorCode::ParseError.as_i32(),
                "Parse error".to_string(),
            )),
            Ok(parsed) => match serde_json::from_value::<JsonRpcRequest>(parsed) {
                Err(_) => Some(JsonRpcResponse::failure(
                    Value::Null,
                    ErrorCode::InvalidRequest.as_i32(),
                    "Invalid request".to_string(),
                )),
                Ok(request) => self.handle_request(request).await,
            },
        };
        response.map(|r| serde_json::to_string(&r).unwrap_or_default())
    }

    /// Line-delimited JSON-RPC loop until `reader` reaches EOF.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<(), ToolError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut writer = BufWriter::new(writer);
        while let Some(line) = lines.next_line().await? {
            if let Some(payload) = self.handle_line(&line).await {
                writer.write_all(payload.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
        Ok(())
    }

    pub async fn run_stdio(&self) -> Result<(), ToolError> {
        self.app.logger.info("Serving MCP over stdio", None);
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }
}

pub async fn run_stdio() -> Result<(), ToolError> {
    let server = McpServer::new().await?;
    server.run_stdio().await
}
