//! Synchronization Handler
//!
//! The protocol state machine for one connection. On start it requests
//! the device's GUI description, parses the reply into a control tree,
//! then keeps local and remote state in step: local edits go out as
//! SetValue packets through the coalescing writer, unsolicited
//! UpdateValue pushes are applied to the tree, and echoes of our own
//! writes are discarded.
//!
//! Everything here runs on the connection's single logical flow; the
//! handler owns all per-connection state and is never reentered while a
//! callback for the same connection is executing.

use crate::domain::path::ControlPath;
use crate::domain::schema;
use crate::domain::settings::{CollisionPolicy, Settings};
use crate::domain::tree::{ChangeOrigin, ControlTree, TreeChange};
use crate::domain::value::Value;
use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::assembly::MessageAssembler;
use super::requests::RequestTracker;
use super::transport::Transport;
use super::wire::{self, ClientOpcode, PacketReader, ServerOpcode, WireError};
use super::writer::CoalescingWriter;

/// Coalescing channel for bootstrap requests. Value updates coalesce on
/// their control's wire path instead, so coalescing stays per-control.
const REQUEST_GUI_CHANNEL: &str = "request-gui";

/// Tunables for one protocol handler instance.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Name given to the local tree root; typically the device name.
    pub root_name: String,
    pub max_send_retries: u32,
    pub collision_policy: CollisionPolicy,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            root_name: "device".to_string(),
            max_send_retries: 10,
            collision_policy: CollisionPolicy::default(),
        }
    }
}

impl ProtocolConfig {
    /// Build a config from persisted settings.
    pub fn from_settings(root_name: impl Into<String>, settings: &Settings) -> Self {
        Self {
            root_name: root_name.into(),
            max_send_retries: settings.max_send_retries,
            collision_policy: settings.request_id_collision,
        }
    }
}

/// Where the handler stands in the bootstrap handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    AwaitingBootstrap,
    Synced,
}

/// Events surfaced to the connection owner (typically the UI layer).
#[derive(Debug, Clone)]
pub enum ProtocolEvent {
    StateChanged(SyncState),
    /// The control tree was (re)built from a device description.
    BootstrapReady,
    /// The device (or another client) changed a control. The path is
    /// relative to the tree root, as it came over the wire.
    RemoteChange { path: ControlPath, value: Value },
}

/// A GUI description reply being reassembled from notification chunks.
struct PendingGuiData {
    assembler: MessageAssembler,
    request_id: u32,
    own: bool,
}

pub struct GuiProtocolHandler<T: Transport> {
    transport: T,
    config: ProtocolConfig,
    state: SyncState,
    requests: RequestTracker,
    writer: CoalescingWriter,
    pending_gui_data: Option<PendingGuiData>,
    tree: ControlTree,
    local_edits: mpsc::UnboundedReceiver<TreeChange>,
    events: mpsc::UnboundedSender<ProtocolEvent>,
}

impl<T: Transport> GuiProtocolHandler<T> {
    pub fn new(
        transport: T,
        config: ProtocolConfig,
        events: mpsc::UnboundedSender<ProtocolEvent>,
    ) -> Self {
        let requests = RequestTracker::new(config.collision_policy);
        let writer = CoalescingWriter::new(config.max_send_retries);
        let (tree, local_edits) = Self::fresh_tree(&config.root_name);
        Self {
            transport,
            config,
            state: SyncState::Idle,
            requests,
            writer,
            pending_gui_data: None,
            tree,
            local_edits,
            events,
        }
    }

    fn fresh_tree(root_name: &str) -> (ControlTree, mpsc::UnboundedReceiver<TreeChange>) {
        let mut tree = ControlTree::new(root_name);
        let (tx, rx) = mpsc::unbounded_channel();
        tree.set_change_sink(tx);
        (tree, rx)
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn tree(&self) -> &ControlTree {
        &self.tree
    }

    /// Request the GUI description. Call once notifications are enabled on
    /// the characteristic, and again after a reconnect.
    pub async fn start(&mut self) -> Result<()> {
        let request_id = self.requests.next_request_id()?;
        let packet = wire::packet_header(ClientOpcode::RequestGui, request_id);
        self.set_state(SyncState::AwaitingBootstrap);
        info!(request_id, "requesting GUI description");
        self.writer.enqueue(REQUEST_GUI_CHANNEL, packet);
        self.writer.drain(&mut self.transport).await;
        Ok(())
    }

    /// Apply a user edit to the tree and transmit it to the device.
    /// `path` is relative to the tree root, matching the wire form.
    pub async fn submit_local_change(&mut self, path: &ControlPath, value: Value) -> Result<()> {
        let full = path.prefixed(self.tree.root_name());
        self.tree.set_by_path(&full, value, ChangeOrigin::Local)?;
        self.flush_local_edits().await
    }

    /// Encode and queue every change the tree has bubbled up.
    async fn flush_local_edits(&mut self) -> Result<()> {
        while let Ok(change) = self.local_edits.try_recv() {
            let Some(wire_path) = change.path.without_first() else {
                warn!(path = %change.path, "change event on the tree root itself, ignoring");
                continue;
            };
            let request_id = self.requests.next_request_id()?;
            let channel = wire_path.to_wire();
            let mut packet = wire::packet_header(ClientOpcode::SetValue, request_id);
            wire::put_string(&mut packet, &channel);
            wire::put_value(&mut packet, &change.value);
            debug!(path = %channel, request_id, "queueing SetValue");
            self.writer.enqueue(&channel, packet);
        }
        self.writer.drain(&mut self.transport).await;
        Ok(())
    }

    /// Feed one raw notification payload from the transport. Malformed
    /// packets are logged and dropped; the connection stays up.
    pub async fn handle_notification(&mut self, data: &[u8]) {
        if let Err(err) = self.process_notification(data) {
            warn!(error = %err, "dropping malformed packet");
        }
    }

    fn process_notification(&mut self, data: &[u8]) -> Result<(), WireError> {
        // While a reassembly is pending every chunk belongs to it and is
        // never interpreted as a new packet header.
        if let Some(pending) = self.pending_gui_data.as_mut() {
            pending.assembler.append(data)?;
            self.try_finish_gui_data();
            return Ok(());
        }

        let mut reader = PacketReader::new(data);
        match ServerOpcode::try_from(reader.read_u8()?)? {
            ServerOpcode::GuiData => self.handle_gui_data(&mut reader),
            ServerOpcode::UpdateValue => self.handle_update_value(&mut reader),
        }
    }

    fn handle_gui_data(&mut self, reader: &mut PacketReader<'_>) -> Result<(), WireError> {
        let request_id = reader.read_u32()?;
        let total_len = reader.read_u32()? as usize;
        let own = self.requests.is_pending(request_id);
        debug!(request_id, total_len, own, "GUI data header received");
        let assembler = MessageAssembler::new(total_len, reader.read_remaining())?;
        self.pending_gui_data = Some(PendingGuiData {
            assembler,
            request_id,
            own,
        });
        self.try_finish_gui_data();
        Ok(())
    }

    fn try_finish_gui_data(&mut self) {
        let Some(pending) = self.pending_gui_data.as_mut() else {
            return;
        };
        let Some(payload) = pending.assembler.take_complete() else {
            return;
        };
        let request_id = pending.request_id;
        let own = pending.own;
        self.pending_gui_data = None;

        if !own {
            // Reassembled so its chunks were consumed, but it answers a
            // request some other client issued.
            debug!(request_id, "discarding GUI data for a foreign request");
            return;
        }
        self.requests.resolve(request_id);
        self.apply_gui_document(&payload);
    }

    fn apply_gui_document(&mut self, payload: &[u8]) {
        let document = match schema::parse_gui_document(payload) {
            Ok(document) => document,
            Err(err) => {
                warn!(error = %err, "GUI description is not valid JSON, staying unsynced");
                return;
            }
        };
        match schema::build_tree(&self.config.root_name, &document) {
            Ok(mut tree) => {
                let (tx, rx) = mpsc::unbounded_channel();
                tree.set_change_sink(tx);
                self.tree = tree;
                self.local_edits = rx;
                self.set_state(SyncState::Synced);
                info!("control tree synchronized");
                let _ = self.events.send(ProtocolEvent::BootstrapReady);
            }
            Err(err) => warn!(error = %err, "GUI description rejected"),
        }
    }

    fn handle_update_value(&mut self, reader: &mut PacketReader<'_>) -> Result<(), WireError> {
        let request_id = reader.read_u32()?;
        if self.requests.resolve(request_id) {
            // Echo of our own SetValue; local state is already authoritative.
            debug!(request_id, "discarding echo of own value update");
            return Ok(());
        }

        let path = ControlPath::from_wire(&reader.read_string()?);
        let value = reader.read_value()?;
        let full = path.prefixed(self.tree.root_name());
        match self
            .tree
            .set_by_path(&full, value.clone(), ChangeOrigin::Remote)
        {
            Ok(()) => {
                debug!(path = %path, "applied remote value update");
                let _ = self.events.send(ProtocolEvent::RemoteChange { path, value });
            }
            Err(err) => warn!(path = %path, error = %err, "rejected remote value update"),
        }
        Ok(())
    }

    /// Synchronously invalidate all per-connection state. The tree itself
    /// is torn down by the connection owner.
    pub fn disconnect(&mut self) {
        self.requests.clear();
        self.writer.clear();
        self.pending_gui_data = None;
        self.set_state(SyncState::Idle);
        info!("discarded pending requests and queued writes");
    }

    fn set_state(&mut self, state: SyncState) {
        if self.state != state {
            self.state = state;
            let _ = self.events.send(ProtocolEvent::StateChanged(state));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::gatt::transport::testing::MockTransport;

    fn handler() -> (
        GuiProtocolHandler<MockTransport>,
        mpsc::UnboundedReceiver<ProtocolEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = ProtocolConfig {
            root_name: "ship".to_string(),
            ..Default::default()
        };
        (
            GuiProtocolHandler::new(MockTransport::default(), config, tx),
            rx,
        )
    }

    /// Request id from an encoded client packet header.
    fn sent_request_id(packet: &[u8]) -> u32 {
        u32::from_be_bytes([packet[1], packet[2], packet[3], packet[4]])
    }

    fn gui_data_packet(request_id: u32, json: &str) -> Vec<u8> {
        let mut packet = vec![0u8]; // GuiData
        packet.extend_from_slice(&request_id.to_be_bytes());
        packet.extend_from_slice(&(json.len() as u32).to_be_bytes());
        packet.extend_from_slice(json.as_bytes());
        packet
    }

    fn update_value_packet(request_id: u32, path: &str, value: &Value) -> Vec<u8> {
        let mut packet = vec![1u8]; // UpdateValue
        packet.extend_from_slice(&request_id.to_be_bytes());
        wire::put_string(&mut packet, path);
        wire::put_value(&mut packet, value);
        packet
    }

    const POWER_DOC: &str =
        r#"{"type":"root","elements":[{"type":"checkbox","name":"Power","value":1}]}"#;

    async fn bootstrap(
        handler: &mut GuiProtocolHandler<MockTransport>,
    ) -> u32 {
        handler.start().await.unwrap();
        let request_id = sent_request_id(&handler.transport.sent[0]);
        handler
            .handle_notification(&gui_data_packet(request_id, POWER_DOC))
            .await;
        request_id
    }

    #[tokio::test]
    async fn bootstrap_builds_tree_from_own_reply() {
        let (mut handler, mut events) = handler();
        assert_eq!(handler.state(), SyncState::Idle);
        handler.start().await.unwrap();
        assert_eq!(handler.state(), SyncState::AwaitingBootstrap);
        assert_eq!(handler.transport.sent.len(), 1);
        assert_eq!(handler.transport.sent[0][0], 0); // RequestGui

        let request_id = sent_request_id(&handler.transport.sent[0]);
        handler
            .handle_notification(&gui_data_packet(request_id, POWER_DOC))
            .await;

        assert_eq!(handler.state(), SyncState::Synced);
        assert_eq!(
            handler
                .tree()
                .value_by_path(&ControlPath::from_wire("ship,Power")),
            Some(&Value::Boolean(true))
        );
        // StateChanged(AwaitingBootstrap), StateChanged(Synced), BootstrapReady
        let mut saw_ready = false;
        while let Ok(event) = events.try_recv() {
            saw_ready |= matches!(event, ProtocolEvent::BootstrapReady);
        }
        assert!(saw_ready);
    }

    #[tokio::test]
    async fn fragmented_gui_data_reassembles() {
        let (mut handler, _events) = handler();
        handler.start().await.unwrap();
        let request_id = sent_request_id(&handler.transport.sent[0]);

        let packet = gui_data_packet(request_id, POWER_DOC);
        // Header plus first three JSON bytes, then the rest in small chunks.
        let (first, rest) = packet.split_at(9 + 3);
        handler.handle_notification(first).await;
        assert_eq!(handler.state(), SyncState::AwaitingBootstrap);
        for chunk in rest.chunks(5) {
            handler.handle_notification(chunk).await;
        }
        assert_eq!(handler.state(), SyncState::Synced);
    }

    #[tokio::test]
    async fn foreign_gui_data_is_consumed_and_discarded() {
        let (mut handler, _events) = handler();
        handler.start().await.unwrap();
        handler
            .handle_notification(&gui_data_packet(0xDEAD_BEEF, POWER_DOC))
            .await;
        // Not our request: fully reassembled but never applied.
        assert_eq!(handler.state(), SyncState::AwaitingBootstrap);
    }

    #[tokio::test]
    async fn local_edit_sends_set_value() {
        let (mut handler, _events) = handler();
        bootstrap(&mut handler).await;
        handler.transport.sent.clear();

        let path = ControlPath::from_wire("Power");
        handler
            .submit_local_change(&path, Value::Boolean(false))
            .await
            .unwrap();

        assert_eq!(handler.transport.sent.len(), 1);
        let packet = &handler.transport.sent[0];
        assert_eq!(packet[0], 1); // SetValue
        let mut reader = PacketReader::new(&packet[5..]);
        assert_eq!(reader.read_string().unwrap(), "Power");
        assert_eq!(reader.read_value().unwrap(), Value::Boolean(false));
        assert_eq!(
            handler
                .tree()
                .value_by_path(&ControlPath::from_wire("ship,Power")),
            Some(&Value::Boolean(false))
        );
    }

    #[tokio::test]
    async fn own_update_value_echo_is_discarded() {
        let (mut handler, mut events) = handler();
        bootstrap(&mut handler).await;
        handler.transport.sent.clear();
        while events.try_recv().is_ok() {}

        let path = ControlPath::from_wire("Power");
        handler
            .submit_local_change(&path, Value::Boolean(false))
            .await
            .unwrap();
        let request_id = sent_request_id(&handler.transport.sent[0]);

        handler
            .handle_notification(&update_value_packet(
                request_id,
                "Power",
                &Value::Boolean(false),
            ))
            .await;

        // No re-notification, value untouched.
        assert!(events.try_recv().is_err());
        assert_eq!(
            handler
                .tree()
                .value_by_path(&ControlPath::from_wire("ship,Power")),
            Some(&Value::Boolean(false))
        );
        // The echo resolved the pending id: a replay is now foreign.
        assert!(!handler.requests.is_pending(request_id));
    }

    #[tokio::test]
    async fn foreign_update_value_applies_and_notifies_once() {
        let (tx, mut events) = mpsc::unbounded_channel();
        let config = ProtocolConfig {
            root_name: "ship".to_string(),
            ..Default::default()
        };
        let mut handler = GuiProtocolHandler::new(MockTransport::default(), config, tx);
        handler.start().await.unwrap();
        let request_id = sent_request_id(&handler.transport.sent[0]);
        let doc = r#"{"type":"root","elements":[
            {"type":"range","name":"Brightness","min":0,"max":255,"value":0}
        ]}"#;
        handler
            .handle_notification(&gui_data_packet(request_id, doc))
            .await;
        while events.try_recv().is_ok() {}

        handler
            .handle_notification(&update_value_packet(99, "Brightness", &Value::Number(128)))
            .await;

        assert_eq!(
            handler
                .tree()
                .value_by_path(&ControlPath::from_wire("ship,Brightness")),
            Some(&Value::Number(128))
        );
        match events.try_recv().unwrap() {
            ProtocolEvent::RemoteChange { path, value } => {
                assert_eq!(path, ControlPath::from_wire("Brightness"));
                assert_eq!(value, Value::Number(128));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(events.try_recv().is_err());
        // No SetValue went back out for a remote-originated change.
        assert_eq!(handler.transport.sent.len(), 1);
    }

    #[tokio::test]
    async fn rapid_local_edits_coalesce_per_control() {
        let (mut handler, _events) = handler();
        handler.start().await.unwrap();
        let request_id = sent_request_id(&handler.transport.sent[0]);
        let doc = r#"{"type":"root","elements":[
            {"type":"range","name":"Warp","min":0,"max":255,"value":0}
        ]}"#;
        handler
            .handle_notification(&gui_data_packet(request_id, doc))
            .await;
        handler.transport.sent.clear();

        // Make the transport refuse while edits pile up, then recover.
        handler.transport.fail_next = 2;
        let path = ControlPath::from_wire("Warp");
        for brightness in [10, 20, 30] {
            handler
                .tree
                .set_by_path(
                    &path.prefixed("ship"),
                    Value::Number(brightness),
                    ChangeOrigin::Local,
                )
                .unwrap();
        }
        handler.flush_local_edits().await.unwrap();

        // One write on the wire, carrying only the newest value.
        assert_eq!(handler.transport.sent.len(), 1);
        let packet = &handler.transport.sent[0];
        let mut reader = PacketReader::new(&packet[5..]);
        assert_eq!(reader.read_string().unwrap(), "Warp");
        assert_eq!(reader.read_value().unwrap(), Value::Number(30));
    }

    #[tokio::test]
    async fn malformed_packets_are_ignored() {
        let (mut handler, _events) = handler();
        bootstrap(&mut handler).await;

        handler.handle_notification(&[7, 0, 0]).await; // unknown kind
        handler.handle_notification(&[1, 0, 0]).await; // truncated UpdateValue
        handler.handle_notification(&[]).await;

        assert_eq!(handler.state(), SyncState::Synced);
        assert_eq!(
            handler
                .tree()
                .value_by_path(&ControlPath::from_wire("ship,Power")),
            Some(&Value::Boolean(true))
        );
    }

    #[tokio::test]
    async fn type_mismatched_remote_update_is_rejected() {
        let (mut handler, mut events) = handler();
        bootstrap(&mut handler).await;
        while events.try_recv().is_ok() {}

        handler
            .handle_notification(&update_value_packet(99, "Power", &Value::Number(3)))
            .await;

        assert!(events.try_recv().is_err());
        assert_eq!(
            handler
                .tree()
                .value_by_path(&ControlPath::from_wire("ship,Power")),
            Some(&Value::Boolean(true))
        );
    }

    #[tokio::test]
    async fn disconnect_discards_inflight_state() {
        let (mut handler, _events) = handler();
        handler.start().await.unwrap();
        let request_id = sent_request_id(&handler.transport.sent[0]);
        assert!(handler.requests.is_pending(request_id));

        handler.disconnect();
        assert_eq!(handler.state(), SyncState::Idle);
        assert!(!handler.requests.is_pending(request_id));
        assert!(handler.writer.is_empty());

        // A late reply to the old request is now foreign and ignored.
        handler
            .handle_notification(&gui_data_packet(request_id, POWER_DOC))
            .await;
        assert_eq!(handler.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn restart_after_disconnect_bootstraps_again() {
        let (mut handler, _events) = handler();
        bootstrap(&mut handler).await;
        handler.disconnect();
        handler.transport.sent.clear();

        handler.start().await.unwrap();
        assert_eq!(handler.state(), SyncState::AwaitingBootstrap);
        let request_id = sent_request_id(&handler.transport.sent[0]);
        handler
            .handle_notification(&gui_data_packet(request_id, POWER_DOC))
            .await;
        assert_eq!(handler.state(), SyncState::Synced);
    }
}
