//! # medimated
//!
//! A Linux daemon for a home medication dispenser: servo-driven doors,
//! indicator LEDs, two override buttons and a 16x2 character display,
//! mirroring door states stored in a Firebase Realtime Database.
//!
//! ## Features
//!
//! - **Async Architecture**: Built on Tokio, one task per watched door
//! - **Remote Mirroring**: Each door follows its `door/<name>` flag in the database
//! - **Manual Overrides**: Close-all and open-all buttons write back to the database
//! - **Status Display**: Dispensing banners and an idle medication summary
//! - **Simulated Backend**: Runs without hardware for testing
//!
//! ## Architecture
//!
//! The daemon uses a provider-based dependency injection system with:
//! - [`SystemCoordinator`](coordinator::SystemCoordinator) - Main lifecycle manager
//! - [`EventBus`](event::EventBus) - Inter-service communication
//! - [`AppState`](app_context::AppState) - Shared application state
//! - Service providers for modular functionality
//!
//! ## Example
//!
//! ```no_run
//! use medimated::{application::Application, config::ConfigManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config_manager = ConfigManager::load(None).await?;
//!     Application::builder()
//!         .with_config_manager(config_manager)
//!         .build()
//!         .await?
//!         .run()
//!         .await
//! }
//! ```

pub mod app_context;
pub mod application;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod display;
pub mod error;
pub mod event;
pub mod hardware;
pub mod indicators;
pub mod providers;
pub mod remote;
pub mod schedule;
pub mod slots;
pub mod task_manager;
