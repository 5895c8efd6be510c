//! Picobot entry point: wiring and lifecycle.
//!
//! With no arguments the bot runs as a daemon: the agent loop and transport
//! proxy are spawned, transports attach to the hub, and Ctrl-C triggers a
//! graceful shutdown. With arguments the joined text is processed once in
//! direct mode and the reply is printed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::sync::watch;
use tracing::info;

use picobot::agent::AgentLoop;
use picobot::channels::TransportProxy;
use picobot::config::{expand_home, Config};
use picobot::hub::Hub;
use picobot::memory::onnx::{ModelConfig, OnnxEmbeddingEngine};
use picobot::memory::{FileMemory, OnnxEmbedder, PersistentMemory};
use picobot::providers::{LLMProvider, OpenAIProvider};
use picobot::session::SessionManager;
use picobot::tools::{MessageTool, ToolRegistry, WriteMemoryTool};
use picobot::utils::init_logging;

/// Deadline for a direct-mode turn.
const DIRECT_TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;
    init_logging(&config.logging);

    let workspace = config.workspace_path();
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("creating workspace at {}", workspace.display()))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let hub = Arc::new(Hub::new());

    let file_memory = Arc::new(FileMemory::new(&workspace)?);
    let sessions = Arc::new(SessionManager::new(&workspace)?);
    sessions.load_all().await;

    let persistent = build_persistent_memory(&config, shutdown_rx.clone())?;
    let provider = build_provider(&config)?;

    let mut tools = ToolRegistry::new();
    tools.register(Box::new(MessageTool::new(Arc::clone(&hub))));
    tools.register(Box::new(WriteMemoryTool::new(Arc::clone(&file_memory))));
    let tools = Arc::new(tools);

    let agent = Arc::new(AgentLoop::new(
        &config,
        Arc::clone(&hub),
        provider,
        tools,
        sessions,
        file_memory,
        persistent,
        shutdown_rx.clone(),
    ));

    // Direct mode: treat CLI arguments as one message and print the reply.
    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        let reply = agent.process_direct(&args.join(" "), DIRECT_TIMEOUT).await?;
        println!("{}", reply);
        return Ok(());
    }

    let proxy = TransportProxy::new(Arc::clone(&hub), shutdown_rx);
    let proxy_handle = tokio::spawn(proxy.run());
    let agent_handle = {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move { agent.run().await })
    };

    info!("Picobot running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;

    info!("Shutting down");
    shutdown_tx.send(true).ok();
    hub.close();
    let _ = tokio::time::timeout(Duration::from_secs(5), agent_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), proxy_handle).await;

    Ok(())
}

/// Build the persistent memory store when enabled.
///
/// A misconfigured embedder or database is fatal at startup; the running
/// system never sees a half-initialized memory.
fn build_persistent_memory(
    config: &Config,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<Option<Arc<PersistentMemory>>> {
    let mem = &config.memory;
    if !mem.enabled {
        return Ok(None);
    }
    if mem.embed_type != "onnx" {
        bail!("unknown embed type: {}", mem.embed_type);
    }

    let model_config = ModelConfig::new(
        expand_home(&mem.onnx_model_path),
        expand_home(&mem.onnx_tokenizer_path),
    );
    let engine = OnnxEmbeddingEngine::new(model_config)
        .context("initializing ONNX embedder")?
        .with_shutdown(shutdown);
    let embedder = Arc::new(OnnxEmbedder::new(engine));

    let store = PersistentMemory::open(
        &expand_home(&mem.db_path),
        embedder,
        mem.threshold,
        mem.top_k,
    )
    .context("initializing memory database")?;

    info!(embedder = %mem.embed_type, "Persistent memory store initialized");
    Ok(Some(Arc::new(store)))
}

fn build_provider(config: &Config) -> anyhow::Result<Arc<dyn LLMProvider>> {
    let Some(openai) = &config.providers.openai else {
        bail!("no provider configured: set providers.openai in config.json");
    };
    if openai.api_key.is_empty() {
        bail!("providers.openai.apiKey is empty");
    }

    let provider = if openai.api_base.is_empty() {
        OpenAIProvider::new(&openai.api_key)
    } else {
        OpenAIProvider::with_base_url(&openai.api_key, &openai.api_base, openai.timeout)
    };
    Ok(Arc::new(provider))
}
