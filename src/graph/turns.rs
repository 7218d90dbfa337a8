//! Sources of the user's reply to a clarifying question

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

/// Supplies the next user turn while a request is suspended on clarification
#[async_trait]
pub trait TurnSource: Send + Sync {
    /// Wait for the user's answer to `question`; `None` means no answer will come
    async fn next_turn(&self, question: &str) -> Option<String>;
}

/// Turn source for one-shot requests: the request parks on its first question
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFurtherTurns;

#[async_trait]
impl TurnSource for NoFurtherTurns {
    async fn next_turn(&self, _question: &str) -> Option<String> {
        None
    }
}

/// Turn source fed by a channel
///
/// Questions are published on `questions` when a sender is attached, so the
/// other side of the conversation can see what it is answering.
pub struct ChannelTurnSource {
    replies: Mutex<mpsc::Receiver<String>>,
    questions: Option<mpsc::Sender<String>>,
}

impl ChannelTurnSource {
    pub fn new(replies: mpsc::Receiver<String>) -> Self {
        Self {
            replies: Mutex::new(replies),
            questions: None,
        }
    }

    pub fn with_question_sink(mut self, questions: mpsc::Sender<String>) -> Self {
        self.questions = Some(questions);
        self
    }

    /// Create a source together with the sender used to answer it
    pub fn channel(buffer: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl TurnSource for ChannelTurnSource {
    async fn next_turn(&self, question: &str) -> Option<String> {
        if let Some(questions) = &self.questions {
            // A closed question sink does not prevent reading a reply
            let _ = questions.send(question.to_string()).await;
        }
        self.replies.lock().await.recv().await
    }
}
