//! GATT Protocol Module
//!
//! Implements the GUI synchronization protocol spoken over a single
//! GATT characteristic.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  GuiProtocolHandler                      │
//! │  (Per-connection state machine - public API)             │
//! └──────┬──────────────┬──────────────┬────────────────────┘
//!        │              │              │
//!        ▼              ▼              ▼
//! ┌───────────┐  ┌────────────┐  ┌───────────┐
//! │   Wire    │  │  Assembly  │  │  Writer   │
//! │           │  │            │  │           │
//! │ - Packet  │  │ - Chunk    │  │ - Coalesce│
//! │   codec   │  │   reassembly│ │ - Retries │
//! └───────────┘  └────────────┘  └───────────┘
//!        │
//!        ▼
//! ┌───────────┐  ┌────────────┐
//! │ Requests  │  │ Transport  │
//! │ - Id pool │  │ - GATT seam│
//! └───────────┘  └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`wire`] - Binary packet framing and the tagged value codec
//! - [`assembly`] - Reassembly of length-announced multi-chunk messages
//! - [`writer`] - Coalescing send queue with bounded retries
//! - [`requests`] - Request id generation and reply correlation
//! - [`transport`] - Byte-pipe trait the connection owner implements
//! - [`handler`] - The synchronization state machine tying it together

pub mod assembly;
pub mod handler;
pub mod requests;
pub mod transport;
pub mod wire;
pub mod writer;

// Re-export the handler surface for convenience
pub use handler::{GuiProtocolHandler, ProtocolConfig, ProtocolEvent, SyncState};
pub use transport::{Transport, GUI_CHARACTERISTIC_UUID, SERVICE_UUID};
