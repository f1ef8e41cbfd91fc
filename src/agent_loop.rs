/*
 * Tinker - Sandboxed Tool-Calling Agent
 * File Path: src/agent_loop.rs
 * Responsibility: Native tool-calling conversation loop and its round budget.
 */

use crate::dispatch::Dispatcher;
use crate::llm::{ModelProvider, ModelTurn, ProviderRequest, TokenUsage, ToolRequest, Turn};
use crate::registry::FUNCTION_DECLARATIONS;
use anyhow::Context;

pub const DEFAULT_MAX_ROUNDS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Seed,
    AwaitingModel,
    ExecutingTools,
    Done,
}

/// How a run ended. Exhausting the round budget is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Answered(String),
    RoundBudgetExhausted { rounds: usize },
}

#[derive(Debug, Clone)]
pub struct LoopOptions<'a> {
    pub model: &'a str,
    pub system_instruction: &'a str,
    pub max_rounds: usize,
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub struct LoopReport {
    pub outcome: Outcome,
    pub state: LoopState,
    pub rounds: usize,
    pub transcript: Vec<Turn>,
    pub usage: TokenUsage,
}

struct Conversation {
    transcript: Vec<Turn>,
    state: LoopState,
    round: usize,
    usage: TokenUsage,
}

impl Conversation {
    fn seed(instruction: &str) -> Self {
        Self {
            transcript: vec![Turn::User(instruction.to_string())],
            state: LoopState::Seed,
            round: 0,
            usage: TokenUsage::default(),
        }
    }

    fn finish(self, outcome: Outcome) -> LoopReport {
        LoopReport {
            outcome,
            state: self.state,
            rounds: self.round,
            transcript: self.transcript,
            usage: self.usage,
        }
    }
}

/// Alternates between asking the model and executing the tools it requests
/// until it answers in plain text or `max_rounds` model calls have been made.
///
/// Tool requests are dispatched one at a time in the order received, and each
/// gets exactly one result turn before the next model call. Provider failures
/// abort the run.
pub async fn run_agent_loop(
    provider: &dyn ModelProvider,
    dispatcher: &Dispatcher,
    instruction: &str,
    options: &LoopOptions<'_>,
) -> anyhow::Result<LoopReport> {
    let mut conversation = Conversation::seed(instruction);
    conversation.state = LoopState::AwaitingModel;

    while conversation.round < options.max_rounds {
        conversation.round += 1;
        tracing::debug!(round = conversation.round, max = options.max_rounds, "awaiting model");

        let response = provider
            .generate(ProviderRequest {
                model: options.model,
                transcript: &conversation.transcript,
                tools: &FUNCTION_DECLARATIONS,
                system_instruction: options.system_instruction,
            })
            .await
            .with_context(|| format!("Model call failed in round {}", conversation.round))?;

        if let Some(usage) = response.usage {
            conversation.usage.add(usage);
        }

        let requests = collect_requests(&response.turns);
        let answer = collect_text(&response.turns);
        conversation
            .transcript
            .extend(response.turns.into_iter().map(Turn::Model));

        if requests.is_empty() {
            conversation.state = LoopState::Done;
            return Ok(conversation.finish(Outcome::Answered(answer)));
        }

        conversation.state = LoopState::ExecutingTools;
        for request in requests {
            if options.verbose {
                println!("Calling function: {}({})", request.name, request.args);
            } else {
                println!(" - Calling function: {}", request.name);
            }

            let response = dispatcher.dispatch(&request).await;
            if options.verbose {
                println!("-> {}", response.text());
            }

            conversation.transcript.push(Turn::ToolResult {
                name: request.name,
                response,
            });
        }
        conversation.state = LoopState::AwaitingModel;
    }

    tracing::warn!(rounds = conversation.round, "round budget exhausted without a final answer");
    let rounds = conversation.round;
    Ok(conversation.finish(Outcome::RoundBudgetExhausted { rounds }))
}

fn collect_requests(turns: &[ModelTurn]) -> Vec<ToolRequest> {
    turns
        .iter()
        .filter_map(|turn| match turn {
            ModelTurn::ToolRequests(calls) => Some(calls.iter().cloned()),
            ModelTurn::Text(_) => None,
        })
        .flatten()
        .collect()
}

fn collect_text(turns: &[ModelTurn]) -> String {
    turns
        .iter()
        .filter_map(|turn| match turn {
            ModelTurn::Text(text) => Some(text.as_str()),
            ModelTurn::ToolRequests(_) => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ToolResponse;
    use crate::llm::ProviderResponse;
    use crate::sandbox::WorkingRoot;
    use crate::tools::{ToolContext, ToolSettings};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::{TempDir, tempdir};

    /// Replays canned responses and records how long the transcript was on
    /// every call.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<ProviderResponse>>,
        seen_lengths: Mutex<Vec<usize>>,
    }

    impl ScriptedProvider {
        fn new(turns: Vec<Vec<ModelTurn>>) -> Self {
            Self {
                responses: Mutex::new(
                    turns
                        .into_iter()
                        .map(|turns| ProviderResponse {
                            turns,
                            usage: Some(TokenUsage {
                                prompt_tokens: 10,
                                response_tokens: 2,
                            }),
                        })
                        .collect(),
                ),
                seen_lengths: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen_lengths.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        async fn generate(&self, request: ProviderRequest<'_>) -> anyhow::Result<ProviderResponse> {
            self.seen_lengths.lock().unwrap().push(request.transcript.len());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }
    }

    struct AlwaysListProvider {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl ModelProvider for AlwaysListProvider {
        async fn generate(&self, _request: ProviderRequest<'_>) -> anyhow::Result<ProviderResponse> {
            *self.calls.lock().unwrap() += 1;
            Ok(ProviderResponse {
                turns: vec![ModelTurn::ToolRequests(vec![ToolRequest::new(
                    "get_files_info",
                    json!({}),
                )])],
                usage: None,
            })
        }
    }

    fn test_dispatcher() -> (TempDir, Dispatcher) {
        let dir = tempdir().unwrap();
        let root = WorkingRoot::new(dir.path()).unwrap();
        (dir, Dispatcher::new(ToolContext::new(root, ToolSettings::default())))
    }

    fn options(max_rounds: usize) -> LoopOptions<'static> {
        LoopOptions {
            model: "fake-model",
            system_instruction: "be helpful",
            max_rounds,
            verbose: false,
        }
    }

    #[tokio::test]
    async fn test_loop_lists_root_then_answers() {
        let (dir, dispatcher) = test_dispatcher();
        std::fs::write(dir.path().join("main.py"), "print('hi')\n").unwrap();
        let list = ToolRequest::new("get_files_info", json!({ "directory": "." }));
        let provider = ScriptedProvider::new(vec![
            vec![ModelTurn::ToolRequests(vec![list.clone()])],
            vec![ModelTurn::Text("Done".to_string())],
        ]);

        let report = run_agent_loop(
            &provider,
            &dispatcher,
            "list files in the project root",
            &options(DEFAULT_MAX_ROUNDS),
        )
        .await
        .unwrap();

        assert_eq!(report.outcome, Outcome::Answered("Done".to_string()));
        assert_eq!(report.state, LoopState::Done);
        assert_eq!(report.rounds, 2);
        assert_eq!(
            report.transcript,
            vec![
                Turn::User("list files in the project root".to_string()),
                Turn::Model(ModelTurn::ToolRequests(vec![list])),
                Turn::ToolResult {
                    name: "get_files_info".to_string(),
                    response: ToolResponse::success("main.py: file_size=12 bytes, is_dir=false"),
                },
                Turn::Model(ModelTurn::Text("Done".to_string())),
            ]
        );
        assert_eq!(*provider.seen_lengths.lock().unwrap(), vec![1, 3]);
        assert_eq!(
            report.usage,
            TokenUsage {
                prompt_tokens: 20,
                response_tokens: 4
            }
        );
    }

    #[tokio::test]
    async fn test_loop_halts_at_round_cap() {
        let (_dir, dispatcher) = test_dispatcher();
        let provider = AlwaysListProvider {
            calls: Mutex::new(0),
        };

        let report = run_agent_loop(&provider, &dispatcher, "loop forever", &options(5))
            .await
            .unwrap();

        assert_eq!(report.outcome, Outcome::RoundBudgetExhausted { rounds: 5 });
        assert_eq!(report.rounds, 5);
        assert_eq!(*provider.calls.lock().unwrap(), 5);
        assert_ne!(report.state, LoopState::Done);
        // One user turn, then a request turn and a result turn per round.
        assert_eq!(report.transcript.len(), 1 + 5 * 2);
    }

    #[tokio::test]
    async fn test_loop_runs_every_request_in_a_batch() {
        let (dir, dispatcher) = test_dispatcher();
        let provider = ScriptedProvider::new(vec![
            vec![
                ModelTurn::Text("Writing then checking.".to_string()),
                ModelTurn::ToolRequests(vec![
                    ToolRequest::new("no_such_tool", json!({})),
                    ToolRequest::new("write_file", json!({ "file_path": "a.txt", "content": "abc" })),
                    ToolRequest::new("get_file_content", json!({ "file_path": "a.txt" })),
                ]),
            ],
            vec![ModelTurn::Text("All set.".to_string())],
        ]);

        let report = run_agent_loop(&provider, &dispatcher, "write a.txt", &options(3))
            .await
            .unwrap();

        assert_eq!(report.outcome, Outcome::Answered("All set.".to_string()));
        let results: Vec<_> = report
            .transcript
            .iter()
            .filter_map(|turn| match turn {
                Turn::ToolResult { name, response } => Some((name.as_str(), response.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, "no_such_tool");
        assert!(!results[0].1.is_success());
        assert!(results[1].1.is_success());
        assert_eq!(results[2].1, ToolResponse::success("abc"));
        assert!(dir.path().join("a.txt").exists());
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_loop_propagates_provider_failure() {
        let (_dir, dispatcher) = test_dispatcher();
        let provider = ScriptedProvider::new(Vec::new());

        let err = run_agent_loop(&provider, &dispatcher, "hello", &options(3))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("script exhausted"));
    }

    #[test]
    fn test_collect_text_joins_only_text_turns() {
        let turns = vec![
            ModelTurn::Text("one".to_string()),
            ModelTurn::ToolRequests(Vec::new()),
            ModelTurn::Text("two".to_string()),
        ];
        assert_eq!(collect_text(&turns), "one\ntwo");
        assert!(collect_requests(&turns).is_empty());
    }
}
