//! # World Viewer Client Library
//!
//! Client side of a shared, server-authoritative game world. The viewer keeps
//! a local replica of every player (position, facing, animation phase, name,
//! avatar), renders it as a scrolling scene centred on the local player, and
//! turns keyboard input into movement intents for the server.
//!
//! ## Architecture Overview
//!
//! Everything happens on one cooperative frame loop. Each iteration:
//! 1. drains transport events and applies server messages to the replica,
//! 2. turns this frame's key edges into outgoing `move` / `stop` intents,
//! 3. draws the world (once joined and the background is decoded),
//! 4. yields to the window host until the next frame.
//!
//! Nothing preempts a step, so the renderer always observes whole updates.
//! The two pieces of work that happen elsewhere only hand results back:
//! the WebSocket lives on its own thread behind channels, and image payloads
//! decode on worker threads into [`avatars::FrameHandle`]s that the renderer
//! checks without waiting.
//!
//! ## Module Organization
//!
//! ### Avatars Module (`avatars`)
//! - Base64 / `data:` URL image decoding
//! - Promise-like frame handles (pending, ready, failed)
//! - Avatar registry with per-facing frame sequences
//!
//! ### Game Module (`game`)
//! - World replica keyed by player id
//! - Reducer applying join, movement, join/leave and failure messages
//! - Sorted player roster
//!
//! ### Input Module (`input`)
//! - Arrow and WASD keys to movement intents
//! - Viewer-local toggles
//!
//! ### Network Module (`network`)
//! - WebSocket transport thread
//! - Session state: connection status, join handshake, surfaced errors
//! - The per-frame `Client` loop
//!
//! ### Rendering Module (`rendering`)
//! - Camera and sprite frame selection
//! - Render loop state (waiting, active)
//! - macroquad canvas and HUD overlay
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! # async fn start() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = Client::new("wss://example.com", "Tim", "world.jpg")?;
//! client.run().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Design Notes
//!
//! ### Server Authority
//! The viewer never moves a player on its own. Positions change only when a
//! `players_moved` message arrives; there is no prediction or smoothing.
//!
//! ### Tolerating Gaps
//! A player whose avatar is unknown or still decoding is skipped for that
//! frame and drawn as soon as the data is there. Messages that fail to parse
//! are logged and dropped without touching the replica.

pub mod avatars;
pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
