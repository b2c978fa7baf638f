use anyhow::{Context, Result};
use appscript_agent::agent::Agent;
use appscript_agent::config::{inference_api_key, Args};
use appscript_agent::llm::ChatCompletionsClient;
use appscript_agent::sandbox::LocalSandbox;
use appscript_agent::server::{router, AppState, GitConfigSource};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let addr = args.socket_addr()?;

    let api_key = inference_api_key()
        .context("No inference API key configured. Set LLM_API_KEY (or OPENROUTER_API_KEY).")?;
    let inference = ChatCompletionsClient::new(&args.inference_url, api_key)?;

    let sandbox_root = args.sandbox_root();
    std::fs::create_dir_all(&sandbox_root).with_context(|| {
        format!(
            "Failed to create sandbox root '{}'",
            sandbox_root.display()
        )
    })?;
    let sandbox = LocalSandbox::new(&sandbox_root);

    let agent = Agent::new(Arc::new(inference), Arc::new(sandbox), args.model.clone());
    let app = router(AppState {
        agent,
        git: GitConfigSource::Environment,
    });

    info!(%addr, model = %args.model, sandbox = %sandbox_root.display(), "agent listening");
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failure")?;

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
