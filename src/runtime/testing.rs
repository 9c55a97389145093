//! Mock implementations for testing
//!
//! These mocks enable cycle-level testing without real I/O.

use super::traits::*;
use super::{CycleHandle, StreamEvent};
use crate::llm::{
    GenerationDelta, LlmError, LlmRequest, LlmStream, StreamChunk, ToolCallFragment,
};
use crate::state_machine::CycleOutcome;
use crate::tools::{Tool, ToolContext, ToolError, ToolRegistry};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Mock Model Client
// ============================================================================

/// One scripted generation
#[derive(Debug, Clone)]
pub enum MockGeneration {
    /// Yield these items, then end the stream
    Chunks(Vec<Result<StreamChunk, LlmError>>),
    /// Fail to open the stream
    Refuse(LlmError),
    /// Yield these chunks, then never finish
    Stall(Vec<StreamChunk>),
}

/// Mock model client that plays queued generations
pub struct MockModelClient {
    generations: Mutex<VecDeque<MockGeneration>>,
    configured: bool,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockModelClient {
    pub fn new() -> Self {
        Self {
            generations: Mutex::new(VecDeque::new()),
            configured: true,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    pub fn queue(&self, generation: MockGeneration) -> &Self {
        self.generations.lock().unwrap().push_back(generation);
        self
    }

    /// Queue a text answer split into the given deltas
    pub fn queue_text(&self, deltas: &[&str]) -> &Self {
        let mut chunks: Vec<_> = deltas
            .iter()
            .map(|d| Ok(StreamChunk::Delta(GenerationDelta::text(*d))))
            .collect();
        chunks.push(Ok(done()));
        self.queue(MockGeneration::Chunks(chunks))
    }

    /// Queue a generation that requests the given tools, in order
    pub fn queue_tool_calls(&self, calls: &[(&str, &str, Value)]) -> &Self {
        let mut chunks = Vec::new();
        for (index, (id, name, args)) in (0u32..).zip(calls) {
            let raw = args.to_string();
            let (head, tail) = raw.split_at(raw.len() / 2);
            chunks.push(Ok(StreamChunk::Delta(GenerationDelta::tool_call(
                ToolCallFragment {
                    index,
                    id: Some((*id).to_string()),
                    name: Some((*name).to_string()),
                    arguments: Some(head.to_string()),
                },
            ))));
            chunks.push(Ok(StreamChunk::Delta(GenerationDelta::tool_call(
                ToolCallFragment {
                    index,
                    id: None,
                    name: None,
                    arguments: Some(tail.to_string()),
                },
            ))));
        }
        chunks.push(Ok(done()));
        self.queue(MockGeneration::Chunks(chunks))
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn done() -> StreamChunk {
    StreamChunk::Done {
        finish_reason: Some("stop".to_string()),
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn generate_stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.generations.lock().unwrap().pop_front();
        match next {
            Some(MockGeneration::Chunks(items)) => Ok(futures::stream::iter(items).boxed()),
            Some(MockGeneration::Refuse(error)) => Err(error),
            Some(MockGeneration::Stall(chunks)) => Ok(futures::stream::iter(chunks.into_iter().map(Ok))
                .chain(futures::stream::pending())
                .boxed()),
            None => Err(LlmError::network("No mock generation queued")),
        }
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }
}

// ============================================================================
// Mock Tools
// ============================================================================

/// Shared log of tool invocations, in call order
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Tool that always returns the same text
pub struct StaticTool {
    pub name: &'static str,
    pub reply: &'static str,
    pub log: CallLog,
}

#[async_trait]
impl Tool for StaticTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> String {
        format!("Mock {}", self.name)
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn run(&self, _input: Map<String, Value>, _ctx: ToolContext) -> Result<String, ToolError> {
        self.log.lock().unwrap().push(self.name.to_string());
        Ok(self.reply.to_string())
    }
}

/// Tool whose backend always errors
pub struct FailingTool {
    pub log: CallLog,
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "GmailAssistant"
    }

    fn description(&self) -> String {
        "Mock mail backend that is down".to_string()
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({ "type": "object" })
    }

    async fn run(&self, _input: Map<String, Value>, _ctx: ToolContext) -> Result<String, ToolError> {
        self.log.lock().unwrap().push("GmailAssistant".to_string());
        Err(ToolError::Failed("connection reset by peer".to_string()))
    }
}

/// Tool that only returns once cancelled
pub struct BlockingTool {
    pub cancelled: Arc<AtomicBool>,
}

#[async_trait]
impl Tool for BlockingTool {
    fn name(&self) -> &str {
        "slow_lookup"
    }

    fn description(&self) -> String {
        "Never finishes on its own".to_string()
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({ "type": "object" })
    }

    async fn run(&self, _input: Map<String, Value>, ctx: ToolContext) -> Result<String, ToolError> {
        ctx.cancel.cancelled().await;
        self.cancelled.store(true, Ordering::SeqCst);
        Err(ToolError::Cancelled)
    }
}

/// Drain a cycle's events and wait for its outcome
pub async fn collect(handle: CycleHandle) -> (Vec<StreamEvent>, CycleOutcome) {
    let CycleHandle {
        mut events,
        outcome,
    } = handle;
    let mut collected = Vec::new();
    while let Some(event) = events.recv().await {
        collected.push(event);
    }
    (collected, outcome.await.unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{DispatchError, SessionManager, DEFAULT_SESSION_ID};
    use crate::transcript::{Turn, GREETING_MESSAGE_ID};
    use serde_json::json;

    struct Fixture {
        model: Arc<MockModelClient>,
        log: CallLog,
        manager: SessionManager,
    }

    fn fixture_with(model: MockModelClient, extra: Vec<Arc<dyn Tool>>) -> Fixture {
        let model = Arc::new(model);
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(StaticTool {
            name: "CalendarAssistant",
            reply: "No events today",
            log: Arc::clone(&log),
        }));
        registry.register(Arc::new(StaticTool {
            name: "ContactsAssistant",
            reply: "Ada: ada@example.com",
            log: Arc::clone(&log),
        }));
        registry.register(Arc::new(FailingTool {
            log: Arc::clone(&log),
        }));
        for tool in extra {
            registry.register(tool);
        }

        let manager = SessionManager::new(
            Arc::clone(&model) as Arc<dyn ModelClient>,
            Arc::new(ToolRegistryExecutor::new(registry)),
        );
        Fixture {
            model,
            log,
            manager,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MockModelClient::new(), Vec::new())
    }

    async fn run(f: &Fixture, text: &str) -> (Vec<StreamEvent>, CycleOutcome) {
        let handle = f
            .manager
            .start_cycle(DEFAULT_SESSION_ID, text.to_string())
            .await
            .unwrap();
        collect(handle).await
    }

    fn kinds(turns: &[Turn]) -> Vec<&'static str> {
        turns.iter().map(Turn::kind).collect()
    }

    // ========================================================================
    // Scenarios
    // ========================================================================

    #[tokio::test]
    async fn test_direct_answer() {
        let f = fixture();
        f.model.queue_text(&["4"]);

        let (events, outcome) = run(&f, "What is 2+2?").await;

        let CycleOutcome::Completed { message_id, content } = outcome else {
            panic!("Expected completion, got {outcome:?}");
        };
        assert_eq!(content, "4");
        assert_eq!(
            events,
            vec![
                StreamEvent::Content {
                    data: "4".to_string()
                },
                StreamEvent::FinalMessage {
                    message_id,
                    content: "4".to_string(),
                    tool_calls: vec![]
                },
                StreamEvent::StreamEnd { error: None },
            ]
        );

        let transcript = f.manager.transcript(DEFAULT_SESSION_ID).await;
        assert_eq!(kinds(&transcript), vec!["assistant", "user", "assistant"]);
        assert_eq!(transcript[1], Turn::user("What is 2+2?"));
    }

    #[tokio::test]
    async fn test_calendar_tool_round_trip() {
        let f = fixture();
        f.model
            .queue_tool_calls(&[("call_1", "CalendarAssistant", json!({"date": "today"}))])
            .queue_text(&["You have ", "no events today."]);

        let (events, outcome) = run(&f, "What's on my calendar today?").await;
        assert!(matches!(outcome, CycleOutcome::Completed { .. }));

        let types: Vec<_> = events.iter().map(StreamEvent::event_type).collect();
        assert_eq!(
            types,
            vec![
                "tool_call_requested",
                "tool_result",
                "content",
                "content",
                "final_message",
                "stream_end"
            ]
        );

        match &events[0] {
            StreamEvent::ToolCallRequested { tool_calls, .. } => {
                assert_eq!(tool_calls.len(), 1);
                assert_eq!(tool_calls[0].name, "CalendarAssistant");
                assert_eq!(tool_calls[0].arguments["date"], "today");
            }
            other => panic!("Expected tool_call_requested, got {other:?}"),
        }
        assert_eq!(
            events[1],
            StreamEvent::ToolResult {
                tool_call_id: "call_1".to_string(),
                tool_name: "CalendarAssistant".to_string(),
                content: "No events today".to_string()
            }
        );
        assert!(matches!(
            &events[4],
            StreamEvent::FinalMessage { content, .. } if content == "You have no events today."
        ));

        let transcript = f.manager.transcript(DEFAULT_SESSION_ID).await;
        assert_eq!(
            kinds(&transcript[1..]),
            vec!["user", "assistant", "tool_result", "assistant"]
        );

        // The second pass sees the tool result
        let requests = f.model.recorded_requests();
        assert_eq!(requests.len(), 2);
        assert!(matches!(requests[1].turns.last(), Some(Turn::ToolResult { .. })));
        assert!(requests[0].system.contains("CalendarAssistant"));
        assert_eq!(requests[0].tools.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_tool_still_completes() {
        let f = fixture();
        f.model
            .queue_tool_calls(&[("call_1", "WeatherAssistant", json!({"city": "Paris"}))])
            .queue_text(&["I can't check the weather."]);

        let (events, outcome) = run(&f, "Weather in Paris?").await;
        assert!(matches!(outcome, CycleOutcome::Completed { .. }));
        assert!(events.contains(&StreamEvent::ToolResult {
            tool_call_id: "call_1".to_string(),
            tool_name: "WeatherAssistant".to_string(),
            content: "Tool 'WeatherAssistant' not found".to_string()
        }));
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::FinalMessage { .. })));
    }

    #[tokio::test]
    async fn test_model_unreachable_leaves_transcript_untouched() {
        let f = fixture();
        f.model
            .queue(MockGeneration::Refuse(LlmError::network("Connection refused")));

        let before = f.manager.transcript(DEFAULT_SESSION_ID).await;
        let (events, outcome) = run(&f, "Hello?").await;

        assert!(matches!(outcome, CycleOutcome::Failed { .. }));
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::StreamEnd { error: Some(error) } => {
                assert_eq!(error.kind, "model_unavailable");
                assert!(error.message.contains("Connection refused"));
                assert!(error.retryable);
            }
            other => panic!("Expected failing stream_end, got {other:?}"),
        }
        assert_eq!(f.manager.transcript(DEFAULT_SESSION_ID).await, before);
    }

    #[tokio::test]
    async fn test_dispatch_surfaces_model_unavailable() {
        let f = fixture();
        f.model
            .queue(MockGeneration::Refuse(LlmError::server_error("Server error: overloaded")));

        let err = f
            .manager
            .dispatch(DEFAULT_SESSION_ID, "Hello?".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::ModelUnavailable(_)));
        assert_eq!(f.manager.transcript(DEFAULT_SESSION_ID).await.len(), 1);
    }

    // ========================================================================
    // Failure handling
    // ========================================================================

    #[tokio::test]
    async fn test_failing_tool_does_not_abort_cycle() {
        let f = fixture();
        f.model
            .queue_tool_calls(&[
                ("call_1", "GmailAssistant", json!({"query": "unread"})),
                ("call_2", "CalendarAssistant", json!({})),
            ])
            .queue_text(&["Mail is down, but your calendar is clear."]);

        let (events, outcome) = run(&f, "Any mail or meetings?").await;
        assert!(matches!(outcome, CycleOutcome::Completed { .. }));

        let results: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ToolResult { tool_call_id, content, .. } => {
                    Some((tool_call_id.as_str(), content.as_str()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            results,
            vec![
                (
                    "call_1",
                    "Error executing tool GmailAssistant: connection reset by peer"
                ),
                ("call_2", "No events today"),
            ]
        );
        assert_eq!(
            *f.log.lock().unwrap(),
            vec!["GmailAssistant", "CalendarAssistant"]
        );
    }

    #[tokio::test]
    async fn test_mid_stream_failure_rolls_back() {
        let f = fixture();
        f.model.queue(MockGeneration::Chunks(vec![
            Ok(StreamChunk::Delta(GenerationDelta::text("Partial"))),
            Err(LlmError::network("Stream read error: reset")),
        ]));

        let (events, outcome) = run(&f, "Tell me a story").await;
        assert!(matches!(outcome, CycleOutcome::Failed { .. }));
        assert_eq!(
            events[0],
            StreamEvent::Content {
                data: "Partial".to_string()
            }
        );
        assert!(matches!(
            events.last(),
            Some(StreamEvent::StreamEnd { error: Some(_) })
        ));
        assert_eq!(f.manager.transcript(DEFAULT_SESSION_ID).await.len(), 1);
    }

    #[tokio::test]
    async fn test_truncated_stream_is_failure() {
        let f = fixture();
        f.model.queue(MockGeneration::Chunks(vec![Ok(StreamChunk::Delta(
            GenerationDelta::text("cut"),
        ))]));

        let (_, outcome) = run(&f, "Hi").await;
        assert!(matches!(outcome, CycleOutcome::Failed { .. }));
        assert_eq!(f.manager.transcript(DEFAULT_SESSION_ID).await.len(), 1);
    }

    #[tokio::test]
    async fn test_final_pass_failure_discards_tool_round() {
        let f = fixture();
        f.model
            .queue_tool_calls(&[("call_1", "CalendarAssistant", json!({}))])
            .queue(MockGeneration::Refuse(LlmError::rate_limit("slow down")));

        let (events, outcome) = run(&f, "Calendar?").await;
        assert!(matches!(outcome, CycleOutcome::Failed { .. }));
        assert!(!events
            .iter()
            .any(|e| matches!(e, StreamEvent::FinalMessage { .. })));
        assert_eq!(f.manager.transcript(DEFAULT_SESSION_ID).await.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_generation_commits_user_turn() {
        let f = fixture();
        f.model.queue(MockGeneration::Chunks(vec![Ok(done())]));

        let (events, outcome) = run(&f, "...").await;
        assert_eq!(outcome, CycleOutcome::Empty);
        assert_eq!(events, vec![StreamEvent::StreamEnd { error: None }]);

        let transcript = f.manager.transcript(DEFAULT_SESSION_ID).await;
        assert_eq!(kinds(&transcript), vec!["assistant", "user"]);
    }

    #[tokio::test]
    async fn test_second_pass_tool_requests_not_executed() {
        let f = fixture();
        f.model
            .queue_tool_calls(&[("call_1", "CalendarAssistant", json!({}))])
            .queue_tool_calls(&[("call_2", "ContactsAssistant", json!({}))]);

        let (events, outcome) = run(&f, "Invite Ada to my free slot").await;
        assert!(matches!(outcome, CycleOutcome::Completed { .. }));
        assert!(matches!(
            &events[events.len() - 2],
            StreamEvent::FinalMessage { tool_calls, .. } if tool_calls[0].name == "ContactsAssistant"
        ));
        assert_eq!(*f.log.lock().unwrap(), vec!["CalendarAssistant"]);
        assert_eq!(f.model.recorded_requests().len(), 2);
    }

    // ========================================================================
    // Transcript growth
    // ========================================================================

    #[tokio::test]
    async fn test_transcript_growth_per_tool_count() {
        for k in 0..4usize {
            let f = fixture();
            if k == 0 {
                f.model.queue_text(&["plain"]);
            } else {
                let ids: Vec<String> = (0..k).map(|i| format!("call_{i}")).collect();
                let calls: Vec<_> = ids
                    .iter()
                    .map(|id| (id.as_str(), "CalendarAssistant", json!({})))
                    .collect();
                f.model.queue_tool_calls(&calls).queue_text(&["done"]);
            }

            let before = f.manager.transcript(DEFAULT_SESSION_ID).await.len();
            let (_, outcome) = run(&f, "go").await;
            assert!(matches!(outcome, CycleOutcome::Completed { .. }));
            let after = f.manager.transcript(DEFAULT_SESSION_ID).await.len();

            let expected = if k == 0 { 2 } else { 3 + k };
            assert_eq!(after - before, expected, "k = {k}");
        }
    }

    // ========================================================================
    // Sessions, busy and disconnect
    // ========================================================================

    #[tokio::test]
    async fn test_not_configured_is_rejected_up_front() {
        let f = fixture_with(MockModelClient::unconfigured(), Vec::new());
        let err = f
            .manager
            .start_cycle(DEFAULT_SESSION_ID, "hi".to_string())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DispatchError::Configuration(_)));
        assert!(f.model.recorded_requests().is_empty());
    }

    #[tokio::test]
    async fn test_busy_session_rejects_message_and_reset() {
        let f = fixture();
        f.model.queue(MockGeneration::Stall(vec![StreamChunk::Delta(
            GenerationDelta::text("Thinking"),
        )]));

        let mut handle = f
            .manager
            .start_cycle("s1", "first".to_string())
            .await
            .unwrap();
        assert_eq!(
            handle.events.recv().await,
            Some(StreamEvent::Content {
                data: "Thinking".to_string()
            })
        );
        assert!(f.manager.is_busy("s1").await);

        let second = f.manager.start_cycle("s1", "second".to_string()).await;
        assert!(matches!(second, Err(DispatchError::Busy)));
        assert!(matches!(f.manager.reset("s1").await, Err(DispatchError::Busy)));

        // Other sessions are unaffected
        f.model.queue_text(&["ok"]);
        let other = f.manager.start_cycle("s2", "hello".to_string()).await.unwrap();
        let (_, outcome) = collect(other).await;
        assert!(matches!(outcome, CycleOutcome::Completed { .. }));

        // Disconnect the first consumer
        let CycleHandle { events, outcome } = handle;
        drop(events);
        assert_eq!(outcome.await.unwrap(), CycleOutcome::Cancelled);
        assert_eq!(f.manager.transcript("s1").await.len(), 1);
        assert!(!f.manager.is_busy("s1").await);
    }

    #[tokio::test]
    async fn test_disconnect_during_tool_cancels_it() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let f = fixture_with(
            MockModelClient::new(),
            vec![Arc::new(BlockingTool {
                cancelled: Arc::clone(&cancelled),
            }) as Arc<dyn Tool>],
        );
        f.model
            .queue_tool_calls(&[("call_1", "slow_lookup", json!({}))]);

        let CycleHandle {
            mut events,
            outcome,
        } = f
            .manager
            .start_cycle(DEFAULT_SESSION_ID, "look it up".to_string())
            .await
            .unwrap();
        assert!(matches!(
            events.recv().await,
            Some(StreamEvent::ToolCallRequested { .. })
        ));
        drop(events);

        assert_eq!(outcome.await.unwrap(), CycleOutcome::Cancelled);
        assert!(cancelled.load(Ordering::SeqCst));
        assert_eq!(f.manager.transcript(DEFAULT_SESSION_ID).await.len(), 1);
        // No second pass was attempted
        assert_eq!(f.model.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_restores_greeting() {
        let f = fixture();
        f.model.queue_text(&["4"]);
        run(&f, "What is 2+2?").await;
        assert_eq!(f.manager.transcript(DEFAULT_SESSION_ID).await.len(), 3);

        f.manager.reset(DEFAULT_SESSION_ID).await.unwrap();
        f.manager.reset(DEFAULT_SESSION_ID).await.unwrap();

        let transcript = f.manager.transcript(DEFAULT_SESSION_ID).await;
        assert_eq!(transcript.len(), 1);
        match &transcript[0] {
            Turn::Assistant(turn) => assert_eq!(turn.message_id, GREETING_MESSAGE_ID),
            other => panic!("Expected greeting, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_session_reads_create_nothing() {
        let f = fixture();
        assert_eq!(f.manager.transcript("ghost").await.len(), 1);
        assert!(!f.manager.is_busy("ghost").await);
        f.manager.reset("ghost").await.unwrap();
        assert_eq!(f.manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_idle_sessions_evicted_at_limit() {
        let f = fixture();
        let manager = f.manager.with_max_sessions(2);
        f.model.queue(MockGeneration::Stall(vec![StreamChunk::Delta(
            GenerationDelta::text("Thinking"),
        )]));

        let mut busy = manager.start_cycle("busy", "first".to_string()).await.unwrap();
        assert!(busy.events.recv().await.is_some());

        f.model.queue_text(&["one"]);
        let (_, outcome) = collect(manager.start_cycle("a", "hi".to_string()).await.unwrap()).await;
        assert!(matches!(outcome, CycleOutcome::Completed { .. }));
        assert_eq!(manager.transcript("a").await.len(), 3);

        // Full: "a" is the only idle session, so it makes room for "b"
        f.model.queue_text(&["two"]);
        let (_, outcome) = collect(manager.start_cycle("b", "hi".to_string()).await.unwrap()).await;
        assert!(matches!(outcome, CycleOutcome::Completed { .. }));

        assert_eq!(manager.session_count().await, 2);
        assert_eq!(manager.transcript("a").await.len(), 1);
        assert_eq!(manager.transcript("b").await.len(), 3);
        assert!(manager.is_busy("busy").await);

        drop(busy);
    }

    #[tokio::test]
    async fn test_custom_greeting() {
        let model: Arc<dyn ModelClient> = Arc::new(MockModelClient::new());
        let tools = Arc::new(ToolRegistryExecutor::new(ToolRegistry::new()));
        let manager = SessionManager::new(model, tools).with_greeting("Hi! Ask me anything.");

        let transcript = manager.transcript("fresh").await;
        assert!(matches!(
            &transcript[0],
            Turn::Assistant(turn) if turn.text == "Hi! Ask me anything."
        ));
        assert!(manager.tool_definitions().is_empty());
    }
}
