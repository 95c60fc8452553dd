//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预设回复；脚本用完后回显最后一条 User 消息作为最终回答。
//! 每次调用收到的消息都会被记录，便于测试断言某一步绑定了哪些动作。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::{Message, Role};

#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以给定回复序列创建
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(replies.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 迄今收到的全部请求
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        self.calls
            .lock()
            .map_err(|_| "mock call log poisoned".to_string())?
            .push(messages.to_vec());

        let next = self
            .script
            .lock()
            .map_err(|_| "mock script poisoned".to_string())?
            .pop_front();
        if let Some(reply) = next {
            return Ok(reply);
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        let reply = serde_json::json!({
            "tool": "submit_final_answer",
            "args": { "final_answer": format!("Echo from Mock: {}", last_user) }
        });
        Ok(reply.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replies_in_order() {
        let mock = MockLlmClient::scripted(["one", "two"]);
        let msgs = vec![Message::user("hi")];
        assert_eq!(mock.complete(&msgs).await.unwrap(), "one");
        assert_eq!(mock.complete(&msgs).await.unwrap(), "two");
        assert_eq!(mock.remaining(), 0);
        assert_eq!(mock.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_fallback_echo_is_final_answer_call() {
        let mock = MockLlmClient::new();
        let out = mock.complete(&[Message::user("hello")]).await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["tool"], "submit_final_answer");
        assert!(v["args"]["final_answer"].as_str().unwrap().contains("hello"));
    }
}
