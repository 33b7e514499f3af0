//! Wire types of the HTTP API

pub mod http;

pub use http::{
    CompileRubricRequest, CompileRubricResponse, EmbedChunksRequest, EmbedChunksResponse,
    ExtractEvidenceRequest, HealthResponse, HttpErrorResponse, SearchChunksRequest,
    SearchChunksResponse, SearchResult, TestEmbeddingsRequest, TestEmbeddingsResponse,
    TestLlmRequest, TestLlmResponse,
};
