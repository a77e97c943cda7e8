//! # context-retrieval
//!
//! A Rust web service for contextual document retrieval: documents are split
//! into overlapping chunks, each chunk is embedded (optionally alongside an
//! LLM-generated "context" string situating it in the whole document), and
//! queries run a two-stage pipeline combining vector similarity with an
//! optional cross-encoder rerank.
//!
//! ## Architecture
//!
//! ```text
//!             ┌──────────────┐
//!             │   Document    │
//!             └──────┬───────┘
//!                    ▼
//!          ┌───────────────────┐
//!          │      Chunker      │  overlapping token windows
//!          └────────┬──────────┘
//!                   ▼
//!          ┌───────────────────┐
//!          │ Context generation │  chat model situates each chunk
//!          └────────┬──────────┘
//!                   ▼
//!          ┌───────────────────┐
//!          │     Embedding     │  content + context vectors
//!          └────────┬──────────┘
//!                   ▼
//!          ┌───────────────────┐       ┌──────────────┐
//!          │    Chunk store    │◄──────┤    Query      │
//!          └────────┬──────────┘       └──────┬───────┘
//!                   │                         │ embed once
//!                   ▼                         ▼
//!          ┌─────────────────────────────────────────┐
//!          │  Stage 1: combined-similarity prefilter │
//!          │  0.6 × content + 0.4 × context          │
//!          │  threshold filter → top-k               │
//!          └────────────────────┬────────────────────┘
//!                               ▼
//!          ┌─────────────────────────────────────────┐
//!          │  Stage 2: cross-encoder rerank          │
//!          │  (optional, positional scores)          │
//!          └────────────────────┬────────────────────┘
//!                               ▼
//!                       ordered results
//! ```
//!
//! Every model the pipeline touches (chat, embedding, reranker) is loaded
//! lazily through a shared resource cache that deduplicates concurrent
//! loads per `(name, kind)` key and evicts idle resources on a periodic
//! sweep.
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, providers, and cache policy
//! - [`error`] - Error taxonomy shared by the core and mapped to HTTP statuses
//! - [`models`] - Shared data types: `Chunk`, `ScoredChunk`, `ModelKind`, request/response types
//! - [`chunking`] - Overlapping token chunker and situating-context generation
//! - [`llm`] - Inference runtime trait plus Ollama/OpenAI-compatible HTTP adapters
//! - [`resources`] - Lazy-loading, idle-evicting model resource cache
//! - [`retrieval`] - Scoring primitives and the two-stage retrieval orchestrator
//! - [`store`] - Persisted chunk store with Stage-1-equivalent similarity search
//! - [`api`] - Axum HTTP handlers for chunking, ingest, retrieval, and model management
//! - [`state`] - Shared application state wiring config, runtime, cache, and store

pub mod api;
pub mod chunking;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod resources;
pub mod retrieval;
pub mod state;
pub mod store;
