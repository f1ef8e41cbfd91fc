/*
 * Tinker - Sandboxed Tool-Calling Agent
 * File Path: src/dispatch.rs
 * Responsibility: Route tool requests through the registry into a uniform response envelope.
 */

use crate::llm::ToolRequest;
use crate::registry::{self, ToolCall};
use crate::tools::{self, ToolContext};
use std::sync::Arc;

/// The outcome of one dispatched request.
///
/// `Failure` is reserved for the dispatcher itself: unknown names, arguments
/// that break the schema, or a tool body that panicked. A tool reporting its
/// own `Error: ...` text still produces `Success`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResponse {
    Success { payload: String },
    Failure { message: String },
}

impl ToolResponse {
    pub fn success(payload: impl Into<String>) -> Self {
        Self::Success {
            payload: payload.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Success { payload } => payload,
            Self::Failure { message } => message,
        }
    }
}

/// Owns the tool context. The working root lives here and nowhere in the
/// request, so the model cannot redirect it.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    ctx: Arc<ToolContext>,
}

impl Dispatcher {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &ToolContext {
        &self.ctx
    }

    /// Never fails: every request maps to exactly one response.
    pub async fn dispatch(&self, request: &ToolRequest) -> ToolResponse {
        let Some(spec) = registry::find_tool(&request.name) else {
            tracing::warn!(name = %request.name, "unknown function requested");
            return ToolResponse::failure(format!("Unknown function: {}", request.name));
        };

        let call = match spec.validate(&request.args) {
            Ok(call) => call,
            Err(e) => {
                tracing::warn!(name = spec.name, error = %e, "rejected tool arguments");
                return ToolResponse::failure(format!(
                    "Invalid arguments for {}: {}",
                    spec.name, e
                ));
            }
        };

        let ctx = Arc::clone(&self.ctx);
        run_isolated(spec.name, async move { invoke(&ctx, call).await }).await
    }
}

/// Runs a tool body on its own task so a panic surfaces as a join error
/// instead of unwinding through the loop.
async fn run_isolated<F>(name: &str, body: F) -> ToolResponse
where
    F: Future<Output = tools::ToolResult> + Send + 'static,
{
    match tokio::spawn(body).await {
        Ok(Ok(payload)) => ToolResponse::success(payload),
        Ok(Err(tool_error)) => ToolResponse::success(tool_error.to_string()),
        Err(join_error) => {
            tracing::warn!(name, error = %join_error, "tool body failed");
            ToolResponse::failure(format!("Error calling {}: {}", name, join_error))
        }
    }
}

async fn invoke(ctx: &ToolContext, call: ToolCall) -> tools::ToolResult {
    match call {
        ToolCall::ListDirectory { directory } => tools::list_directory(ctx, directory.as_deref()),
        ToolCall::ReadFile { file_path } => tools::read_file(ctx, &file_path),
        ToolCall::RunScript { file_path, args } => tools::run_script(ctx, &file_path, &args).await,
        ToolCall::WriteFile { file_path, content } => {
            tools::write_file(ctx, &file_path, &content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::WorkingRoot;
    use crate::tools::ToolSettings;
    use serde_json::json;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn test_dispatcher() -> (TempDir, Dispatcher) {
        let dir = tempdir().unwrap();
        let root = WorkingRoot::new(dir.path()).unwrap();
        let settings = ToolSettings {
            interpreter: "sh".to_string(),
            ..ToolSettings::default()
        };
        (dir, Dispatcher::new(ToolContext::new(root, settings)))
    }

    #[tokio::test]
    async fn test_dispatch_unknown_function_is_failure() {
        let (_dir, dispatcher) = test_dispatcher();
        let response = dispatcher
            .dispatch(&ToolRequest::new("delete_everything", json!({})))
            .await;

        assert_eq!(
            response,
            ToolResponse::failure("Unknown function: delete_everything")
        );
    }

    #[tokio::test]
    async fn test_dispatch_rejects_invalid_arguments_without_running() {
        let (dir, dispatcher) = test_dispatcher();

        let missing = dispatcher
            .dispatch(&ToolRequest::new("write_file", json!({ "file_path": "notes.txt" })))
            .await;
        assert_eq!(
            missing,
            ToolResponse::failure("Invalid arguments for write_file: missing required parameter `content`")
        );
        assert!(!dir.path().join("notes.txt").exists());

        let injected_root = dispatcher
            .dispatch(&ToolRequest::new(
                "get_files_info",
                json!({ "directory": ".", "working_directory": "/" }),
            ))
            .await;
        assert!(!injected_root.is_success());
        assert!(injected_root.text().contains("unknown parameter `working_directory`"));
    }

    #[tokio::test]
    async fn test_dispatch_wraps_tool_errors_as_success() {
        let (_dir, dispatcher) = test_dispatcher();
        let response = dispatcher
            .dispatch(&ToolRequest::new(
                "get_file_content",
                json!({ "file_path": "../../etc/passwd" }),
            ))
            .await;

        assert_eq!(
            response,
            ToolResponse::success(
                "Error: Cannot read \"../../etc/passwd\" as it is outside the permitted working directory"
            )
        );
    }

    #[tokio::test]
    async fn test_dispatch_nonzero_exit_is_success_with_exit_line() {
        let (dir, dispatcher) = test_dispatcher();
        fs::write(dir.path().join("fail.py"), "echo broken >&2\nexit 2\n").unwrap();

        let response = dispatcher
            .dispatch(&ToolRequest::new("run_python_file", json!({ "file_path": "fail.py" })))
            .await;

        assert!(response.is_success());
        assert!(response.text().contains("STDERR: broken"));
        assert!(response.text().ends_with("Process exited with code 2.\n"));
    }

    #[tokio::test]
    async fn test_panicking_tool_body_becomes_failure() {
        let response = run_isolated("write_file", async {
            panic!("disk vanished");
        })
        .await;

        assert!(!response.is_success());
        assert!(
            response.text().starts_with("Error calling write_file: "),
            "unexpected response: {:?}",
            response
        );
        assert!(response.text().contains("panicked"));
    }

    #[tokio::test]
    async fn test_dispatch_write_then_read() {
        let (_dir, dispatcher) = test_dispatcher();

        let write = dispatcher
            .dispatch(&ToolRequest::new(
                "write_file",
                json!({ "file_path": "pkg/data.txt", "content": "v2" }),
            ))
            .await;
        assert_eq!(
            write,
            ToolResponse::success("Successfully wrote to \"pkg/data.txt\" (2 characters written)")
        );

        let read = dispatcher
            .dispatch(&ToolRequest::new("get_file_content", json!({ "file_path": "pkg/data.txt" })))
            .await;
        assert_eq!(read, ToolResponse::success("v2"));
    }
}
