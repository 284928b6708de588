use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod gateway;
mod handler;
mod provider;
mod relay;
mod session;
mod tui;
mod ui;

use app::App;
use config::Config;
use gateway::{CompletionGateway, GeminiClient, OllamaClient, RelayClient};
use provider::Provider;
use relay::RelayState;
use session::{ChatSession, TurnRole};

#[derive(Parser)]
#[command(name = "gemchat")]
#[command(about = "Terminal chat client and local relay for Gemini-style generative AI APIs")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat {
        /// Provider to use (gemini, ollama, relay)
        #[arg(short, long)]
        provider: Option<String>,
        /// Model to use
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Send one prompt and print the reply
    Ask {
        /// The message to send
        prompt: String,
        /// Provider to use (gemini, ollama, relay)
        #[arg(short, long)]
        provider: Option<String>,
        /// Model to use
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Run the local HTTP relay in front of a provider
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8787")]
        addr: SocketAddr,
        /// Upstream provider (gemini or ollama)
        #[arg(short, long)]
        provider: Option<String>,
        /// Model to use
        #[arg(short, long)]
        model: Option<String>,
    },
    /// List models available from the active provider
    Models {
        /// Provider to query (gemini, ollama)
        #[arg(short, long)]
        provider: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load().unwrap_or_else(|_| Config::new());

    match cli.command {
        None => run_chat(config).await,
        Some(Commands::Chat { provider, model }) => {
            apply_overrides(&mut config, provider, model)?;
            run_chat(config).await
        }
        Some(Commands::Ask {
            prompt,
            provider,
            model,
        }) => {
            init_tracing();
            apply_overrides(&mut config, provider, model)?;
            run_ask(&config, prompt).await
        }
        Some(Commands::Serve {
            addr,
            provider,
            model,
        }) => {
            init_tracing();
            apply_overrides(&mut config, provider, model)?;
            run_serve(&config, addr).await
        }
        Some(Commands::Models { provider }) => {
            init_tracing();
            apply_overrides(&mut config, provider, None)?;
            run_models(&config).await
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn apply_overrides(
    config: &mut Config,
    provider: Option<String>,
    model: Option<String>,
) -> Result<()> {
    if let Some(name) = provider {
        let parsed = Provider::from_str(&name)
            .ok_or_else(|| anyhow!("unknown provider '{name}' (expected gemini, ollama or relay)"))?;
        config.provider = Some(parsed.as_str().to_string());
        // A configured model likely belongs to the previous provider; fall
        // back to the new provider's default unless -m overrides it.
        config.model = None;
    }
    if let Some(model) = model {
        config.model = Some(model);
    }
    Ok(())
}

fn build_gateway(config: &Config) -> Result<Arc<dyn CompletionGateway>> {
    let provider = config.provider();
    let model = config.model_for(provider);

    let gateway: Arc<dyn CompletionGateway> = match provider {
        Provider::Gemini => {
            let key = config.gemini_key().ok_or_else(|| {
                anyhow!(
                    "Gemini API key not set. Export GEMINI_API_KEY or add \
                     gemini_api_key to the config file."
                )
            })?;
            Arc::new(GeminiClient::new(&key, &model))
        }
        Provider::Ollama => Arc::new(OllamaClient::new(&config.ollama_url(), &model)),
        Provider::Relay => Arc::new(RelayClient::new(&config.relay_url())),
    };
    Ok(gateway)
}

async fn run_chat(config: Config) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();
    let mut app = App::new(&config);

    let result = run_chat_loop(&mut terminal, &mut events, &mut app).await;

    tui::restore()?;
    result
}

async fn run_chat_loop(
    terminal: &mut tui::Tui,
    events: &mut tui::EventHandler,
    app: &mut App,
) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        if let Some(event) = events.next().await {
            handler::handle_event(app, event).await?;
        }

        app.poll_pending().await;
    }
    Ok(())
}

async fn run_ask(config: &Config, prompt: String) -> Result<()> {
    let gateway = build_gateway(config)?;

    let mut session = ChatSession::new(config.forward_history);
    session.draft = prompt;
    session.submit(gateway.as_ref(), &config.generation()).await;

    for turn in &session.turns {
        match turn.role {
            TurnRole::Assistant => println!("{}", turn.text),
            TurnRole::Error => bail!("{}", turn.text),
            TurnRole::User => {}
        }
    }
    Ok(())
}

async fn run_serve(config: &Config, addr: SocketAddr) -> Result<()> {
    if config.provider() == Provider::Relay {
        bail!("serve needs a real upstream; point it at gemini or ollama");
    }

    let gateway = build_gateway(config)?;
    relay::serve(addr, RelayState::new(gateway, config.generation())).await
}

async fn run_models(config: &Config) -> Result<()> {
    match config.provider() {
        Provider::Gemini => {
            for model in GeminiClient::list_models() {
                println!("{model}");
            }
        }
        Provider::Ollama => {
            let client = OllamaClient::new(&config.ollama_url(), "");
            match client.list_models().await {
                Ok(models) if models.is_empty() => {
                    println!("No models found. Pull one with: ollama pull llama3.2");
                }
                Ok(models) => {
                    for model in models {
                        println!("{model}");
                    }
                }
                Err(err) => {
                    bail!("could not reach Ollama ({err}). Is it running? Try: ollama serve");
                }
            }
        }
        Provider::Relay => {
            println!("The relay uses whichever model its upstream was started with.");
        }
    }
    Ok(())
}
