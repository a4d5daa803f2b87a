//! # Snippet Client Library
//!
//! This library implements the client side of the remote snippet protocol: the
//! server asks the client to call a named function on a named game class,
//! optionally on a specific object, and the client runs it against its local
//! world and reports the result.
//!
//! ## Request Flow
//!
//! Every request travels the same pipeline:
//!
//! 1. **Front door** (`service`): the snippet is queued until the next frame tick
//! 2. **Overrides** (`builtins`): a small case-insensitive table may rewrite the
//!    request or handle it completely
//! 3. **Dispatch** (`dispatcher`): the class and member are resolved in the
//!    capability registry, arguments are translated and checked, the member runs
//! 4. **Response** (`response`): scalar results are sent back reliably under the
//!    request's correlation id; fire-and-forget requests send nothing
//!
//! Failures at any step are logged once by the front door and end the request
//! without a response. The requester owns timeouts.
//!
//! ## Module Organization
//!
//! ### Host Interfaces (`host`, `registry`, `scheduler`)
//! - Remote and local handles, the dynamic `Value` and `Instance` types
//! - Collaborator traits for identity translation, object lookup, presentation,
//!   scheduling and player feedback
//! - The capability registry with declared member parameter shapes
//! - A frame scheduler driven by explicit ticks
//!
//! ### Pipeline (`service`, `builtins`, `dispatcher`, `translator`, `response`)
//! - The snippet front door and its `SnippetOutcome`
//! - The override table (`SetDisplayName`, race menus, `SkympHacks`)
//! - Static and instance dispatch
//! - Wire value to native value translation
//! - Finish message construction
//!
//! ### Runtime (`world`, `network`)
//! - An in-memory world implementing every collaborator trait, plus the
//!   standard capability surface
//! - The UDP client loop that connects, feeds snippets in, ticks the scheduler
//!   and drains outbound finish messages
//!
//! ## Threading
//!
//! All state is shared through `Rc`, so the client runs on a current-thread
//! runtime inside a `tokio::task::LocalSet`.

pub mod builtins;
pub mod dispatcher;
pub mod error;
pub mod host;
pub mod network;
pub mod registry;
pub mod response;
pub mod scheduler;
pub mod service;
pub mod translator;
pub mod world;
