#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

//! Client for OpenAI-compatible chat completion APIs.
//!
//! ```no_run
//! use llm_chat_openai::{ChatClient, Message};
//!
//! # async fn run() -> llm_chat_openai::Result<()> {
//! let client = ChatClient::new("sk-...")?;
//! let completion = client
//!     .send("gpt-4o", &[Message::user("What is the capital of Indonesia?")], None)
//!     .await?;
//! println!("{}", completion.content().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod accumulate;
pub mod client;
pub mod completion;
pub mod config;
pub mod decode;
pub mod error;
pub mod http;
pub mod logging;
pub mod message;
pub mod options;
pub mod request;
pub mod routing;
pub mod stream;

pub use accumulate::ChunkAccumulator;
pub use client::{ChatApi, ChatClient};
pub use completion::{
    Choice, ChunkChoice, Completion, CompletionChunk, Delta, ModelInfo, ModelList, ToolCall,
    Usage,
};
pub use config::Config;
pub use error::{Error, Result};
pub use http::AuthConfig;
pub use message::{ContentPart, ImageDetail, Message, Role};
pub use options::{
    ChatOptions, FunctionDefinition, Prediction, ResponseFormat, Tool, ToolChoice,
};
pub use request::ModelTarget;
pub use routing::{FallbackRouter, FallbackSupport};
pub use stream::ChunkStream;
pub use tokio_util::sync::CancellationToken;
