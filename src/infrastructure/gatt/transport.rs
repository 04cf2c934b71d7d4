//! Transport Seam
//!
//! The protocol core never talks to a Bluetooth stack directly. The
//! connection owner implements [`Transport`] over whatever GATT API it
//! uses and feeds received notification payloads into the handler.

use anyhow::Result;

/// Control-surface BLE Service UUID of the device.
pub const SERVICE_UUID: &str = "a6a2fc07-815c-4262-97a9-1cef5181a1e4";

/// GUI protocol characteristic UUID - client writes and device
/// notifications both travel over it.
pub const GUI_CHARACTERISTIC_UUID: &str = "013201e4-0873-4377-8bff-9a2389af3884";

/// One logical byte pipe to the device.
///
/// `send_bytes` resolves once the transport acknowledges (or rejects) the
/// write; the send queue relies on that to keep a single write in flight.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn send_bytes(&mut self, bytes: &[u8]) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Transport;

    /// Records every successful write; can be told to fail upcoming sends.
    #[derive(Default)]
    pub struct MockTransport {
        pub sent: Vec<Vec<u8>>,
        pub fail_next: u32,
    }

    impl Transport for MockTransport {
        async fn send_bytes(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
            if self.fail_next > 0 {
                self.fail_next -= 1;
                anyhow::bail!("simulated transport failure");
            }
            self.sent.push(bytes.to_vec());
            Ok(())
        }
    }
}
