use std::sync::Arc;

use sidekick_engine::prelude::*;
use sidekick_engine::vendors::ollama::OllamaProvider;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), EngineError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let model = std::env::args().nth(1).unwrap_or_else(|| "llama3".to_string());
    let client = ChatClient::new(Arc::new(OllamaProvider::from_env()))?;

    let handle = client.send_message(
        OutgoingMessage::new("Stream a short greeting, then a two-item list.", model),
        |delta| print!("{delta}"),
    )?;
    let outcome = handle.finish().await?;
    println!();

    let mut parser = ContentParser::new();
    for block in parser.parse(&outcome.text) {
        println!("{block:?}");
    }
    if let Some(payload) = detect_file_edit(&outcome.text, false) {
        println!("file edit: {} file(s)", payload.files.len());
    }
    Ok(())
}
