//! Domain Layer
//!
//! Device-independent model of the control surface: values, paths, the
//! control tree, the GUI description schema, and persisted settings.

pub mod path;
pub mod schema;
pub mod settings;
pub mod tree;
pub mod value;
