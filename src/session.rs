//! In-memory conversation state and the send/append cycle around it.
//!
//! A session owns an append-only list of turns, the current draft, and a
//! busy flag guarding the single in-flight gateway call. Nothing here is
//! persisted; state lives for one UI session.

use crate::gateway::{CompletionGateway, GatewayError, GenerationParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
    /// A failure surfaced to the user, kept distinct from assistant output.
    Error,
}

/// One message in the conversation. Immutable once appended.
#[derive(Debug, Clone)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

pub struct ChatSession {
    pub turns: Vec<Turn>,
    pub draft: String,
    busy: bool,
    /// Fold prior turns into each prompt. Off by default: each gateway call
    /// is then a stateless single-turn exchange.
    forward_history: bool,
}

impl ChatSession {
    pub fn new(forward_history: bool) -> Self {
        Self {
            turns: Vec::new(),
            draft: String::new(),
            busy: false,
            forward_history,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Start a send. Returns the prompt to hand to the gateway, or `None`
    /// when the draft is empty/whitespace or a call is already outstanding.
    /// On `Some` the session is busy until [`ChatSession::settle`] runs.
    pub fn begin(&mut self) -> Option<String> {
        if self.busy || self.draft.trim().is_empty() {
            return None;
        }
        self.busy = true;
        if self.forward_history && !self.turns.is_empty() {
            Some(self.context_prompt())
        } else {
            Some(self.draft.clone())
        }
    }

    /// Apply the outcome of the gateway call started by [`ChatSession::begin`].
    ///
    /// Success appends the user turn followed by the assistant turn and
    /// clears the draft. Failure appends a single error turn and keeps the
    /// draft so the user can retry. Either way the session stops being busy.
    pub fn settle(&mut self, outcome: Result<String, GatewayError>) {
        match outcome {
            Ok(text) => {
                self.turns.push(Turn {
                    role: TurnRole::User,
                    text: std::mem::take(&mut self.draft),
                });
                self.turns.push(Turn {
                    role: TurnRole::Assistant,
                    text,
                });
            }
            Err(err) => {
                self.turns.push(Turn {
                    role: TurnRole::Error,
                    text: format!("Request failed: {err}"),
                });
            }
        }
        self.busy = false;
    }

    /// One full send cycle: guard checks, a single gateway call, settlement.
    /// No retries, no timeout; a hung gateway call keeps the session busy.
    pub async fn submit<G>(&mut self, gateway: &G, params: &GenerationParams)
    where
        G: CompletionGateway + ?Sized,
    {
        if let Some(prompt) = self.begin() {
            let outcome = gateway.generate(&prompt, params).await;
            self.settle(outcome);
        }
    }

    /// Render the conversation plus the pending draft as one prompt. Error
    /// turns are skipped; the provider never saw them.
    fn context_prompt(&self) -> String {
        let mut prompt = String::from("Conversation so far:\n");
        for turn in &self.turns {
            match turn.role {
                TurnRole::User => prompt.push_str(&format!("User: {}\n", turn.text)),
                TurnRole::Assistant => prompt.push_str(&format!("Assistant: {}\n", turn.text)),
                TurnRole::Error => {}
            }
        }
        prompt.push_str("\nCurrent message: ");
        prompt.push_str(&self.draft);
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Gateway returning a scripted outcome, counting calls.
    struct ScriptedGateway {
        reply: Result<String, ()>,
        calls: AtomicUsize,
    }

    impl ScriptedGateway {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionGateway for ScriptedGateway {
        async fn generate(
            &self,
            _prompt: &str,
            _params: &GenerationParams,
        ) -> Result<String, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(()) => Err(GatewayError::MalformedResponse),
            }
        }
    }

    #[tokio::test]
    async fn empty_draft_is_a_no_op() {
        let gateway = ScriptedGateway::ok("unused");
        let mut session = ChatSession::new(false);

        session.submit(&gateway, &GenerationParams::default()).await;
        session.draft = "   \n\t".to_string();
        session.submit(&gateway, &GenerationParams::default()).await;

        assert!(session.turns.is_empty());
        assert!(!session.is_busy());
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn busy_session_ignores_submit() {
        let gateway = ScriptedGateway::ok("unused");
        let mut session = ChatSession::new(false);
        session.draft = "Hello".to_string();

        let first = session.begin();
        assert!(first.is_some());
        assert!(session.is_busy());

        // A second submit while the first call is outstanding must not
        // reach the gateway.
        session.submit(&gateway, &GenerationParams::default()).await;
        assert_eq!(gateway.call_count(), 0);
        assert!(session.turns.is_empty());
    }

    #[tokio::test]
    async fn success_appends_user_then_assistant() {
        let gateway = ScriptedGateway::ok("OK");
        let mut session = ChatSession::new(false);
        session.draft = "Hello".to_string();

        session.submit(&gateway, &GenerationParams::default()).await;

        assert_eq!(session.turns.len(), 2);
        assert_eq!(session.turns[0].role, TurnRole::User);
        assert_eq!(session.turns[0].text, "Hello");
        assert_eq!(session.turns[1].role, TurnRole::Assistant);
        assert_eq!(session.turns[1].text, "OK");
        assert!(session.draft.is_empty());
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn failure_appends_one_error_turn() {
        let gateway = ScriptedGateway::failing();
        let mut session = ChatSession::new(false);
        session.draft = "Hello".to_string();

        session.submit(&gateway, &GenerationParams::default()).await;

        assert_eq!(session.turns.len(), 1);
        assert_eq!(session.turns[0].role, TurnRole::Error);
        assert!(!session.is_busy());
        assert!(session
            .turns
            .iter()
            .all(|t| t.role != TurnRole::Assistant));
    }

    #[tokio::test]
    async fn repeated_prompts_are_never_merged() {
        let gateway = ScriptedGateway::ok("pong");
        let mut session = ChatSession::new(false);

        session.draft = "ping".to_string();
        session.submit(&gateway, &GenerationParams::default()).await;
        session.draft = "ping".to_string();
        session.submit(&gateway, &GenerationParams::default()).await;

        assert_eq!(session.turns.len(), 4);
        assert_eq!(gateway.call_count(), 2);
        assert_eq!(session.turns[0].text, "ping");
        assert_eq!(session.turns[2].text, "ping");
    }

    #[tokio::test]
    async fn end_to_end_arithmetic_exchange() {
        let gateway = ScriptedGateway::ok("4");
        let mut session = ChatSession::new(false);
        assert!(session.turns.is_empty());
        assert!(session.draft.is_empty());
        assert!(!session.is_busy());

        session.draft = "2+2?".to_string();
        session.submit(&gateway, &GenerationParams::default()).await;

        assert_eq!(session.turns.len(), 2);
        assert_eq!(session.turns[0].text, "2+2?");
        assert_eq!(session.turns[1].text, "4");
        assert!(session.draft.is_empty());
        assert!(!session.is_busy());
    }

    #[test]
    fn history_forwarding_builds_a_transcript() {
        let mut session = ChatSession::new(true);
        session.turns.push(Turn {
            role: TurnRole::User,
            text: "2+2?".to_string(),
        });
        session.turns.push(Turn {
            role: TurnRole::Assistant,
            text: "4".to_string(),
        });
        session.draft = "and doubled?".to_string();

        let prompt = session.begin().unwrap();
        assert!(prompt.contains("User: 2+2?"));
        assert!(prompt.contains("Assistant: 4"));
        assert!(prompt.ends_with("Current message: and doubled?"));
    }

    #[test]
    fn single_turn_mode_sends_the_draft_verbatim() {
        let mut session = ChatSession::new(false);
        session.turns.push(Turn {
            role: TurnRole::User,
            text: "earlier".to_string(),
        });
        session.draft = "just this".to_string();

        assert_eq!(session.begin().as_deref(), Some("just this"));
    }
}
