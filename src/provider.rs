#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    Ollama,
    Relay,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::Ollama => "ollama",
            Provider::Relay => "relay",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gemini" => Some(Provider::Gemini),
            "ollama" => Some(Provider::Ollama),
            "relay" => Some(Provider::Relay),
            _ => None,
        }
    }

    pub fn all() -> Vec<Provider> {
        vec![Provider::Gemini, Provider::Ollama, Provider::Relay]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Gemini => "Gemini (Google)",
            Provider::Ollama => "Ollama (Local)",
            Provider::Relay => "Relay (gemchat serve)",
        }
    }

    /// Model used when the config names none.
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini-2.0-flash-exp",
            Provider::Ollama => "llama3.2:latest",
            // The relay picks its own model; the client-side name is cosmetic.
            Provider::Relay => "relay",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_strings() {
        for provider in Provider::all() {
            assert_eq!(Provider::from_str(provider.as_str()), Some(provider));
        }
        assert_eq!(Provider::from_str("GEMINI"), Some(Provider::Gemini));
        assert_eq!(Provider::from_str("unknown"), None);
    }
}
