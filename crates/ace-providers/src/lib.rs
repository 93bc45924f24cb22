//! # ace-providers
//!
//! Concrete capabilities for the ACE learning pipeline:
//! - `OpenAiEmbedder` for `EmbeddingService`
//! - `AnthropicInsightExtractor` for `InsightExtractor`
//! - `CommandAgentExecutor` for `AgentExecutor`
//! - `GitProbe` for `WorkspaceProbe`
//!
//! No call is retried here.

pub mod anthropic;
pub mod command;
pub mod credentials;
pub mod git;
mod http;
pub mod openai;

pub use anthropic::AnthropicInsightExtractor;
pub use command::CommandAgentExecutor;
pub use git::GitProbe;
pub use openai::OpenAiEmbedder;
