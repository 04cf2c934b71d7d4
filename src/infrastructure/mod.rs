pub mod gatt;
pub mod logging;
