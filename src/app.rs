use std::sync::Arc;

use ratatui::style::Color;
use ratatui::widgets::ListState;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::gateway::{
    CompletionGateway, GatewayError, GeminiClient, GenerationParams, OllamaClient, RelayClient,
};
use crate::provider::Provider;
use crate::session::{ChatSession, Turn, TurnRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// The one knob the old duplicated UIs varied on: light vs dark styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    pub fn fg(&self) -> Color {
        match self {
            Theme::Dark => Color::White,
            Theme::Light => Color::Black,
        }
    }

    pub fn bg(&self) -> Color {
        match self {
            Theme::Dark => Color::Reset,
            Theme::Light => Color::White,
        }
    }

    pub fn accent(&self) -> Color {
        match self {
            Theme::Dark => Color::Cyan,
            Theme::Light => Color::Blue,
        }
    }

    pub fn dim(&self) -> Color {
        match self {
            Theme::Dark => Color::DarkGray,
            Theme::Light => Color::Gray,
        }
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub theme: Theme,

    // Conversation
    pub session: ChatSession,
    pub cursor: usize, // cursor position in the draft, in chars
    pub pending: Option<JoinHandle<Result<String, GatewayError>>>,

    // Chat viewport
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Model picker state
    pub show_model_picker: bool,
    pub available_models: Vec<String>,
    pub model_picker_state: ListState,

    // Provider state
    pub current_provider: Provider,
    pub show_provider_picker: bool,
    pub provider_picker_state: ListState,

    // API key input state
    pub show_api_key_input: bool,
    pub api_key_input: String,
    pub api_key_input_cursor: usize,

    // Resolved settings
    pub selected_model: String,
    pub gemini_key: Option<String>,
    pub ollama_url: String,
    pub relay_url: String,
    pub params: GenerationParams,
}

impl App {
    pub fn new(config: &Config) -> Self {
        let current_provider = config.provider();

        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            theme: Theme::Dark,

            session: ChatSession::new(config.forward_history),
            cursor: 0,
            pending: None,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            animation_frame: 0,

            show_model_picker: false,
            available_models: Vec::new(),
            model_picker_state: ListState::default(),

            current_provider,
            show_provider_picker: false,
            provider_picker_state: ListState::default(),

            show_api_key_input: false,
            api_key_input: String::new(),
            api_key_input_cursor: 0,

            selected_model: config.model_for(current_provider),
            gemini_key: config.gemini_key(),
            ollama_url: config.ollama_url(),
            relay_url: config.relay_url(),
            params: config.generation(),
        }
    }

    /// Build the gateway for the active provider. `None` means Gemini is
    /// selected but no key is configured.
    pub fn build_gateway(&self) -> Option<Arc<dyn CompletionGateway>> {
        let gateway: Arc<dyn CompletionGateway> = match self.current_provider {
            Provider::Gemini => {
                let key = self.gemini_key.as_ref()?;
                Arc::new(GeminiClient::new(key, &self.selected_model))
            }
            Provider::Ollama => {
                Arc::new(OllamaClient::new(&self.ollama_url, &self.selected_model))
            }
            Provider::Relay => Arc::new(RelayClient::new(&self.relay_url)),
        };
        Some(gateway)
    }

    /// Kick off a send if the session guards allow it. The gateway call runs
    /// on a background task; [`App::poll_pending`] settles it.
    pub fn begin_submit(&mut self) {
        if self.pending.is_some() {
            return;
        }

        let Some(gateway) = self.build_gateway() else {
            if !self.session.is_busy() && !self.session.draft.trim().is_empty() {
                self.session.turns.push(Turn {
                    role: TurnRole::Error,
                    text: "Gemini API key not configured. Press 'P' to set one.".to_string(),
                });
                self.scroll_to_bottom();
            }
            return;
        };

        if let Some(prompt) = self.session.begin() {
            let params = self.params.clone();
            self.pending = Some(tokio::spawn(async move {
                gateway.generate(&prompt, &params).await
            }));
            self.scroll_to_bottom();
        }
    }

    /// Settle the in-flight gateway call once its task has finished.
    pub async fn poll_pending(&mut self) {
        let finished = self
            .pending
            .as_ref()
            .map(|handle| handle.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }

        if let Some(handle) = self.pending.take() {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(err) => Err(GatewayError::Provider {
                    status: 500,
                    message: format!("worker task failed: {err}"),
                }),
            };
            self.session.settle(outcome);
            self.cursor = self.session.draft.chars().count().min(self.cursor);
            self.scroll_to_bottom();
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Chat scrolling
    pub fn scroll_down(&mut self) {
        let max_scroll = self.total_chat_lines().saturating_sub(self.chat_height);
        if self.chat_scroll < max_scroll {
            self.chat_scroll = self.chat_scroll.saturating_add(1);
        }
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_to_top(&mut self) {
        self.chat_scroll = 0;
    }

    /// Scroll so the newest turn (or the "Thinking..." line) is visible.
    pub fn scroll_to_bottom(&mut self) {
        let total_lines = self.total_chat_lines();
        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        if total_lines > visible_height {
            self.chat_scroll = total_lines.saturating_sub(visible_height);
        } else {
            self.chat_scroll = 0;
        }
    }

    /// Wrapped line count of the transcript at the current chat width.
    fn total_chat_lines(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        for turn in &self.session.turns {
            total_lines += 1; // Role line ("You:", "AI:", "Error:")
            for line in turn.text.lines() {
                // Character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                if char_count == 0 {
                    total_lines += 1;
                } else {
                    total_lines += ((char_count / wrap_width) + 1) as u16;
                }
            }
            total_lines += 1; // Blank line after message
        }

        if self.session.is_busy() {
            total_lines += 2; // "AI:" + "Thinking..."
        }

        total_lines
    }

    // Model picker methods
    pub fn model_picker_nav_down(&mut self) {
        let len = self.available_models.len();
        if len > 0 {
            let i = self.model_picker_state.selected().unwrap_or(0);
            self.model_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        if let Some(i) = self.model_picker_state.selected() {
            if let Some(model) = self.available_models.get(i) {
                self.selected_model = model.clone();
                self.show_model_picker = false;
                let _ = Config::save_model(&self.selected_model);
            }
        }
    }

    // Provider picker methods
    pub fn provider_picker_nav_down(&mut self) {
        let len = Provider::all().len();
        if len > 0 {
            let i = self.provider_picker_state.selected().unwrap_or(0);
            self.provider_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn provider_picker_nav_up(&mut self) {
        let i = self.provider_picker_state.selected().unwrap_or(0);
        self.provider_picker_state.select(Some(i.saturating_sub(1)));
    }

    /// Switch provider, resetting the model to that provider's default and
    /// persisting the choice.
    pub fn select_provider(&mut self, provider: Provider) {
        self.current_provider = provider;
        self.selected_model = provider.default_model().to_string();
        let mut config = Config::load().unwrap_or_else(|_| Config::new());
        config.provider = Some(provider.as_str().to_string());
        config.model = Some(self.selected_model.clone());
        let _ = config.save();
    }

    /// Where the active provider's credentials come from, for the header.
    pub fn key_source(&self, provider: Provider) -> Option<&'static str> {
        match provider {
            Provider::Gemini => {
                if std::env::var("GEMINI_API_KEY").is_ok() {
                    Some("env")
                } else if self.gemini_key.is_some() {
                    Some("config")
                } else {
                    None
                }
            }
            Provider::Ollama => Some("local"),
            Provider::Relay => Some("relay"),
        }
    }

    /// Store a key entered in the TUI: config file only, never the source.
    pub fn apply_api_key(&mut self, key: String) {
        let mut config = Config::load().unwrap_or_else(|_| Config::new());
        config.gemini_api_key = Some(key.clone());
        config.provider = Some(Provider::Gemini.as_str().to_string());
        let _ = config.save();

        self.gemini_key = Some(key);
        self.select_provider(Provider::Gemini);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_app() -> App {
        App::new(&Config::new())
    }

    #[test]
    fn gemini_without_key_has_no_gateway() {
        let mut app = test_app();
        app.gemini_key = None;
        app.current_provider = Provider::Gemini;
        assert!(app.build_gateway().is_none());

        app.current_provider = Provider::Ollama;
        assert!(app.build_gateway().is_some());
    }

    #[test]
    fn missing_key_surfaces_an_error_turn_instead_of_sending() {
        let mut app = test_app();
        app.gemini_key = None;
        app.current_provider = Provider::Gemini;
        app.session.draft = "hello".to_string();

        app.begin_submit();

        assert!(app.pending.is_none());
        assert!(!app.session.is_busy());
        assert_eq!(app.session.turns.len(), 1);
        assert_eq!(app.session.turns[0].role, TurnRole::Error);
    }

    #[test]
    fn transcript_line_count_tracks_wrapping() {
        let mut app = test_app();
        app.chat_width = 10;
        app.session.turns.push(Turn {
            role: TurnRole::User,
            text: "a".repeat(25),
        });

        // role line + 3 wrapped lines + trailing blank
        assert_eq!(app.total_chat_lines(), 5);
    }
}
