//! ML Inference Server Main
//!
//! Loads both models, then serves the HTTP API

use ml_inference_server::{start_hyper_http_server, ModelContext, ServerConfig, ServerState};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = ServerConfig::load_or_default(&config_path)?;

    // Initialize tracing
    let log_level = match config.monitoring.log_level.to_lowercase().as_str() {
        "trace" => "ml_inference_server=trace,trace",
        "debug" => "ml_inference_server=debug,debug",
        "info" => "ml_inference_server=info,info",
        "warn" => "ml_inference_server=warn,warn",
        "error" => "ml_inference_server=error,error",
        _ => "ml_inference_server=info,info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .without_time()
        .init();

    println!("🚀 ML Inference Server");
    if Path::new(&config_path).exists() {
        println!("📄 Config: {}", config_path);
    } else {
        println!("⚠️  {} not found, using default configuration", config_path);
    }
    println!("📊 Log Level: {}", config.monitoring.log_level);
    println!("📡 Bind Address: {}", config.network.bind_address);
    println!("===============================");

    // The listener never starts without both models
    let models = ModelContext::load(
        &config.models,
        &config.onnx,
        &config.generation,
        &config.embedding,
    )?;

    println!("✅ Models loaded successfully!");
    println!("🛑 Press Ctrl+C to stop");

    let state = ServerState::new(Arc::new(config), Arc::new(models));
    start_hyper_http_server(state).await?;

    Ok(())
}
