use std::sync::Arc;

use sidekick_engine::prelude::*;
use sidekick_engine::vendors::ollama::OllamaProvider;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), EngineError> {
    let client = ChatClient::new(Arc::new(OllamaProvider::from_env()))?;
    for name in client.fetch_model_names().await? {
        println!("{name}");
    }
    Ok(())
}
