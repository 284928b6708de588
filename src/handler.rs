use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, InputMode};
use crate::gateway::{GeminiClient, OllamaClient};
use crate::provider::Provider;
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await?,
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global quit, works in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    // Popups take the keyboard while open, in priority order
    if app.show_api_key_input {
        handle_api_key_input(app, key);
        return Ok(());
    }
    if app.show_provider_picker {
        handle_provider_picker(app, key);
        return Ok(());
    }
    if app.show_model_picker {
        handle_model_picker(app, key);
        return Ok(());
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key).await?,
        InputMode::Editing => handle_editing_mode(app, key),
    }

    Ok(())
}

fn handle_api_key_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.show_api_key_input = false;
            app.api_key_input.clear();
            app.api_key_input_cursor = 0;
        }
        KeyCode::Enter => {
            if !app.api_key_input.is_empty() {
                let entered = std::mem::take(&mut app.api_key_input);
                app.apply_api_key(entered);
            }
            app.show_api_key_input = false;
            app.api_key_input_cursor = 0;
        }
        KeyCode::Backspace => {
            if app.api_key_input_cursor > 0 {
                app.api_key_input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.api_key_input, app.api_key_input_cursor);
                app.api_key_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.api_key_input_cursor = app.api_key_input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.api_key_input.chars().count();
            app.api_key_input_cursor = (app.api_key_input_cursor + 1).min(char_count);
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.api_key_input, app.api_key_input_cursor);
            app.api_key_input.insert(byte_pos, c);
            app.api_key_input_cursor += 1;
        }
        _ => {}
    }
}

fn handle_provider_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.show_provider_picker = false;
        }
        KeyCode::Char('j') | KeyCode::Down => {
            app.provider_picker_nav_down();
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.provider_picker_nav_up();
        }
        KeyCode::Enter => {
            if let Some(i) = app.provider_picker_state.selected() {
                let providers = Provider::all();
                if let Some(&provider) = providers.get(i) {
                    if provider == Provider::Gemini && app.key_source(provider).is_none() {
                        // No key yet: collect one before switching
                        app.show_api_key_input = true;
                        app.api_key_input.clear();
                        app.api_key_input_cursor = 0;
                    } else {
                        app.select_provider(provider);
                    }
                    app.show_provider_picker = false;
                }
            }
        }
        _ => {}
    }
}

fn handle_model_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.show_model_picker = false;
        }
        KeyCode::Char('j') | KeyCode::Down => {
            app.model_picker_nav_down();
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.model_picker_nav_up();
        }
        KeyCode::Enter => {
            app.select_model();
        }
        _ => {}
    }
}

async fn handle_normal_mode(app: &mut App, key: KeyEvent) -> Result<()> {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Back into the input box
        KeyCode::Char('i') | KeyCode::Char('/') | KeyCode::Tab => {
            app.input_mode = InputMode::Editing;
            app.cursor = app.session.draft.chars().count();
        }

        // Transcript scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
        KeyCode::Char('g') => app.scroll_to_top(),
        KeyCode::Char('G') => app.scroll_to_bottom(),

        // Theme toggle
        KeyCode::Char('t') => app.theme = app.theme.toggled(),

        // Open model picker
        KeyCode::Char('M') => {
            let models = match app.current_provider {
                Provider::Gemini => GeminiClient::list_models(),
                Provider::Ollama => {
                    OllamaClient::new(&app.ollama_url, &app.selected_model)
                        .list_models()
                        .await
                        .unwrap_or_default()
                }
                Provider::Relay => Vec::new(),
            };
            app.available_models = models;
            if !app.available_models.is_empty() {
                // Select current model if in list, otherwise first
                let current_idx = app
                    .available_models
                    .iter()
                    .position(|m| m == &app.selected_model)
                    .unwrap_or(0);
                app.model_picker_state.select(Some(current_idx));
                app.show_model_picker = true;
            }
        }

        // Open provider picker
        KeyCode::Char('P') => {
            let current_idx = Provider::all()
                .iter()
                .position(|p| *p == app.current_provider)
                .unwrap_or(0);
            app.provider_picker_state.select(Some(current_idx));
            app.show_provider_picker = true;
        }

        _ => {}
    }
    Ok(())
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    // While a call is outstanding the draft is frozen; it is what gets
    // appended as the user turn when the call settles.
    if app.session.is_busy() {
        if key.code == KeyCode::Esc {
            app.input_mode = InputMode::Normal;
        }
        return;
    }

    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            app.begin_submit();
        }
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.session.draft, app.cursor);
                app.session.draft.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.session.draft.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.session.draft, app.cursor);
                app.session.draft.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.session.draft.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.session.draft.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.session.draft, app.cursor);
            app.session.draft.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_to_byte_index_handles_multibyte() {
        let s = "añc";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 1), 1);
        assert_eq!(char_to_byte_index(s, 2), 3);
        assert_eq!(char_to_byte_index(s, 5), s.len());
    }
}
