//! Genflow infrastructure adapters.
//!
//! Implements the [`domain::GenerationProvider`] port for a Gemini-style
//! `generateContent` HTTP API and the [`domain::AssetRelay`] port for an HTTP
//! relay endpoint. Additional providers are added as new modules in this
//! crate without any changes to the `orchestrator` crate.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** All HTTP transport, request formatting, response
//! parsing and status-code interpretation live here. Each adapter makes
//! exactly one HTTP attempt per call; rotation, retry and capability fallback
//! belong to the orchestrator.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`client`] | shared `reqwest` client construction and base-URL checks |
//! | [`status`] | HTTP status / error body → [`domain::ProviderError`] mapping |
//! | [`wire`] | `generateContent` request and response bodies |
//! | [`gemini`] | `GeminiProvider` |
//! | [`relay`] | `HttpAssetRelay` |

#![warn(missing_docs)]

pub mod client;
pub mod gemini;
pub mod relay;
pub mod status;
pub mod wire;

pub use client::ClientError;
pub use gemini::{GeminiConfig, GeminiProvider};
pub use relay::HttpAssetRelay;
