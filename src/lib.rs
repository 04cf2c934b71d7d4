//! BLE GUI Client
//!
//! Client-side implementation of a BLE "remote GUI" protocol: an
//! embedded device describes its control surface as a JSON document,
//! the client mirrors it as a typed control tree, and both sides
//! exchange value updates over a single GATT characteristic.
//!
//! The crate is transport-agnostic. Implement [`Transport`] over your
//! platform's GATT API, feed notification payloads into
//! [`GuiProtocolHandler::handle_notification`], and drive user edits
//! through [`GuiProtocolHandler::submit_local_change`].

pub mod domain;
pub mod infrastructure;

pub use domain::path::ControlPath;
pub use domain::settings::{CollisionPolicy, LogSettings, Settings, SettingsService};
pub use domain::tree::{ChangeOrigin, ControlKind, ControlTree, NodeId, TreeChange, TreeError};
pub use domain::value::{ColorChannels, RgbwColor, Value, ValueKind};
pub use infrastructure::gatt::{
    GuiProtocolHandler, ProtocolConfig, ProtocolEvent, SyncState, Transport,
    GUI_CHARACTERISTIC_UUID, SERVICE_UUID,
};
