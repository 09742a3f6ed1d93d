pub mod budget;
pub mod io;
pub mod llm;
pub mod models;
pub mod pipeline;

pub use budget::{BudgetConfig, Budgets, ConnectionLimiter, RateBudget, RateLimiter};
pub use io::{ChunkStore, StoreError};
pub use llm::{
    BpeTokenCounter, CompletionClient, ConfigError, OpenAiClient, OpenAiConfig, RequestError,
    parse_response, verify_quote,
};
pub use models::{Candidate, Chunk, NewChunk, PValue};
pub use pipeline::{
    ChunkError, ChunkProcessor, PipelineConfig, RequestExecutor, RunSummary, ShutdownSignal,
    run_pipeline,
};
