use crate::application::task_service::TaskService;
use crate::application::tools::{ToolOutcome, dispatch_tool_call, task_tool_declarations};
use crate::domain::calendar::CalendarContext;
use crate::domain::models::{Message, Task};
use crate::domain::task_summary::generate_task_summary;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::gemini_client::{LanguageModel, ModelContent, ModelReply, ModelRequest};
use crate::infrastructure::transport::ApiTransport;
use chrono_tz::Tz;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info};

pub const FALLBACK_REPLY: &str = "Sorry, I encountered an error. Please try again.";
pub const CONTINUE_PROMPT: &str = "Continue";

const PRODUCTIVITY_KEYWORDS: [&str; 16] = [
    "progress",
    "completed",
    "complete",
    "stats",
    "statistics",
    "how many",
    "summary",
    "summarize",
    "productivity",
    "productive",
    "pending",
    "finished",
    "overview",
    "remaining",
    "done today",
    "how am i doing",
];

pub fn wants_task_summary(message: &str) -> bool {
    let lowered = message.to_lowercase();
    PRODUCTIVITY_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

pub trait AssistantObserver: Send + Sync {
    fn tasks_changed(&self) {}
    fn notify(&self, _message: &str) {}
}

#[derive(Debug, Default)]
pub struct NoopObserver;

impl AssistantObserver for NoopObserver {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Ignored,
    Replied(String),
    Fallback,
}

type CalendarProvider = Arc<dyn Fn() -> CalendarContext + Send + Sync>;

struct TurnGuard<'a>(&'a AtomicBool);

impl<'a> TurnGuard<'a> {
    fn acquire(busy: &'a AtomicBool) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(busy))
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ChatSession<M, T>
where
    M: LanguageModel,
    T: ApiTransport,
{
    model: Arc<M>,
    tasks: Arc<TaskService<T>>,
    observer: Arc<dyn AssistantObserver>,
    calendar: CalendarProvider,
    busy: AtomicBool,
    messages: Mutex<Vec<Message>>,
}

impl<M, T> ChatSession<M, T>
where
    M: LanguageModel,
    T: ApiTransport,
{
    pub fn new(model: Arc<M>, tasks: Arc<TaskService<T>>, zone: Option<Tz>) -> Self {
        Self {
            model,
            tasks,
            observer: Arc::new(NoopObserver),
            calendar: Arc::new(move || CalendarContext::now(zone)),
            busy: AtomicBool::new(false),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn AssistantObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_calendar_provider(mut self, calendar: CalendarProvider) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn messages(&self) -> Vec<Message> {
        self.transcript().clone()
    }

    pub async fn send(&self, input: &str, tasks: &[Task]) -> TurnOutcome {
        let text = input.trim();
        if text.is_empty() {
            return TurnOutcome::Ignored;
        }
        let Some(_turn) = TurnGuard::acquire(&self.busy) else {
            debug!("assistant is busy; ignoring message");
            return TurnOutcome::Ignored;
        };

        self.transcript().push(Message::user(text));
        let prompt = self.build_prompt(text, tasks);

        match self.run_turn(&prompt).await {
            Ok(reply) => {
                self.transcript().push(Message::ai(reply.clone()));
                TurnOutcome::Replied(reply)
            }
            Err(error) => {
                error!(%error, "assistant turn failed");
                self.transcript().push(Message::ai(FALLBACK_REPLY));
                TurnOutcome::Fallback
            }
        }
    }

    fn build_prompt(&self, text: &str, tasks: &[Task]) -> String {
        if tasks.is_empty() || !wants_task_summary(text) {
            return text.to_string();
        }
        let summary = generate_task_summary(tasks, &(self.calendar)());
        format!("{summary}\n\n{text}")
    }

    async fn run_turn(&self, prompt: &str) -> Result<String, InfraError> {
        let first = self
            .model
            .generate(&ModelRequest {
                contents: vec![ModelContent::user_text(prompt)],
                tools: task_tool_declarations(),
            })
            .await?;

        let ModelReply {
            text,
            function_calls,
        } = first;
        let Some(call) = function_calls.into_iter().next() else {
            return reply_text(text);
        };

        info!(tool = %call.name, "model requested a tool call");
        let outcome = dispatch_tool_call(&self.tasks, &call).await;
        if let ToolOutcome::Failed { message, .. } = &outcome {
            self.observer.notify(message);
        }
        if outcome.changed_tasks() {
            self.observer.tasks_changed();
        }

        let name = call.name.clone();
        let follow_up = ModelRequest {
            contents: vec![
                ModelContent::user_text(prompt),
                ModelContent::function_call(call),
                ModelContent::function_response(name, outcome.response()),
                ModelContent::user_text(CONTINUE_PROMPT),
            ],
            tools: Vec::new(),
        };
        reply_text(self.model.generate(&follow_up).await?.text)
    }

    fn transcript(&self) -> MutexGuard<'_, Vec<Message>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn reply_text(text: Option<String>) -> Result<String, InfraError> {
    text.ok_or_else(|| InfraError::Model("model reply had no text".to_string()))
}
