//! 运行过程事件：逐条披露日志条目与路由决定，用于流式展示

use serde::Serialize;

use crate::core::ErrorKind;
use crate::memory::LogEntry;
use crate::workflow::Step;

/// 单个过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// 步骤开始执行
    StepStarted { step: Step },
    /// 新追加的日志条目
    Entry { entry: LogEntry },
    /// 选出下一步
    Routed { from: Step, to: Step },
    /// 错误结果把流程送回 GenerateQuery
    Recovery {
        kind: ErrorKind,
        attempt: usize,
        max_retries: usize,
        detail: String,
    },
    /// 本次运行累计的 token 使用
    TokenUsage {
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
    },
    /// 运行结束，给出最终答案与耗时
    Done { answer: String, elapsed_ms: u64 },
    /// 运行因致命错误终止
    Error { kind: ErrorKind, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let ev = WorkflowEvent::Routed {
            from: Step::ExecuteQuery,
            to: Step::FormatAnswer,
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "routed");
        assert_eq!(v["from"], "execute_query");
        assert_eq!(v["to"], "format_answer");
    }

    #[test]
    fn test_entry_event_nests_entry() {
        let ev = WorkflowEvent::Entry {
            entry: LogEntry::FinalAnswer {
                text: "There are 2 orders.".into(),
            },
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "entry");
        assert_eq!(v["entry"]["type"], "final_answer");
    }

    #[test]
    fn test_done_event_carries_elapsed() {
        let ev = WorkflowEvent::Done {
            answer: "There are 2 orders.".into(),
            elapsed_ms: 42,
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "done");
        assert_eq!(v["elapsed_ms"], 42);
    }
}
