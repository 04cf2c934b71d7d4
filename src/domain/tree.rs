//! Control Tree
//!
//! The hierarchical namespace of controls the device describes. Nodes are
//! stored in an arena and addressed by handles; each node keeps a
//! non-owning back-reference to its parent for path computation, while
//! ownership flows strictly parent to child.
//!
//! Local (user-originated) mutations bubble upward to a single registered
//! sink so the synchronization layer can transmit them. Remote-originated
//! mutations are applied silently to avoid echo loops.

use crate::domain::path::ControlPath;
use crate::domain::value::{ColorChannels, Value, ValueKind};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Handle to one node in a [`ControlTree`]. Handles are never reused
/// within a tree's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// What caused a mutation. Remote-originated sets must not be re-broadcast
/// toward the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    Local,
    Remote,
}

/// The interactive control kinds a leaf can be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlKind {
    Range { min: i32, max: i32 },
    Checkbox,
    Radio { items: Vec<String> },
    DropDown { items: Vec<String> },
    Button,
    NumberField { read_only: bool },
    TextField { max_length: i32 },
    Password { max_length: i32 },
    RgbwRange { channels: ColorChannels },
}

impl ControlKind {
    /// The value kind this control stores.
    pub fn expected_kind(&self) -> ValueKind {
        match self {
            ControlKind::Range { .. }
            | ControlKind::Radio { .. }
            | ControlKind::DropDown { .. }
            | ControlKind::NumberField { .. } => ValueKind::Number,
            ControlKind::Checkbox | ControlKind::Button => ValueKind::Boolean,
            ControlKind::TextField { .. } | ControlKind::Password { .. } => ValueKind::String,
            ControlKind::RgbwRange { .. } => ValueKind::Rgbw,
        }
    }
}

#[derive(Debug, Clone)]
enum NodeBody {
    Group {
        collapsed: Option<bool>,
        children: Vec<NodeId>,
    },
    Control {
        kind: ControlKind,
        value: Value,
    },
}

/// One node: a named group or a named control holding a value.
#[derive(Debug, Clone)]
pub struct ControlNode {
    name: String,
    parent: Option<NodeId>,
    body: NodeBody,
}

impl ControlNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_group(&self) -> bool {
        matches!(self.body, NodeBody::Group { .. })
    }

    /// The collapse hint from the device description, groups only.
    pub fn collapsed(&self) -> Option<bool> {
        match &self.body {
            NodeBody::Group { collapsed, .. } => *collapsed,
            NodeBody::Control { .. } => None,
        }
    }

    pub fn kind(&self) -> Option<&ControlKind> {
        match &self.body {
            NodeBody::Control { kind, .. } => Some(kind),
            NodeBody::Group { .. } => None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.body {
            NodeBody::Control { value, .. } => Some(value),
            NodeBody::Group { .. } => None,
        }
    }
}

/// A local mutation delivered to the registered change sink.
#[derive(Debug, Clone)]
pub struct TreeChange {
    /// Absolute path of the changed control, root name included.
    pub path: ControlPath,
    pub value: Value,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("path segment '{segment}' does not match node '{node}'")]
    PathMismatch { segment: String, node: String },
    #[error("no node at path '{0}'")]
    UnknownPath(ControlPath),
    #[error("'{0}' is a group, not a control")]
    NotAControl(String),
    #[error("'{0}' is not a group")]
    NotAGroup(String),
    #[error("a child named '{0}' already exists")]
    DuplicateChild(String),
    #[error("wrong value type for '{name}': expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: ValueKind,
        actual: ValueKind,
    },
    #[error("value {value} out of range [{min}, {max}]")]
    OutOfRange { value: i32, min: i32, max: i32 },
    #[error("selection index {index} out of bounds ({count} items)")]
    IndexOutOfBounds { index: i32, count: usize },
    #[error("stale node handle")]
    StaleHandle,
}

/// The per-connection tree of controls.
pub struct ControlTree {
    // Removed nodes leave a tombstone so handles stay stable.
    nodes: Vec<Option<ControlNode>>,
    root: NodeId,
    sink: Option<mpsc::UnboundedSender<TreeChange>>,
}

impl ControlTree {
    /// Create a tree whose root is an empty group named `root_name`.
    pub fn new(root_name: impl Into<String>) -> Self {
        let root = ControlNode {
            name: root_name.into(),
            parent: None,
            body: NodeBody::Group {
                collapsed: None,
                children: Vec::new(),
            },
        };
        Self {
            nodes: vec![Some(root)],
            root: NodeId(0),
            sink: None,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_name(&self) -> &str {
        // The root is created in `new` and never removed.
        self.node(self.root).map(|n| n.name()).unwrap_or_default()
    }

    /// Register the single sink local changes bubble up to.
    pub fn set_change_sink(&mut self, sink: mpsc::UnboundedSender<TreeChange>) {
        self.sink = Some(sink);
    }

    pub fn node(&self, id: NodeId) -> Option<&ControlNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.node(id).map(|n| &n.body) {
            Some(NodeBody::Group { children, .. }) => children,
            _ => &[],
        }
    }

    /// Add a child group under `parent`.
    pub fn add_group(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        collapsed: Option<bool>,
    ) -> Result<NodeId, TreeError> {
        self.add_node(
            parent,
            name.into(),
            NodeBody::Group {
                collapsed,
                children: Vec::new(),
            },
        )
    }

    /// Add a child control under `parent` with its initial value.
    pub fn add_control(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        kind: ControlKind,
        initial: Value,
    ) -> Result<NodeId, TreeError> {
        let name = name.into();
        let expected = kind.expected_kind();
        if initial.kind() != expected {
            return Err(TreeError::TypeMismatch {
                name,
                expected,
                actual: initial.kind(),
            });
        }
        self.add_node(
            parent,
            name,
            NodeBody::Control {
                kind,
                value: initial,
            },
        )
    }

    fn add_node(
        &mut self,
        parent: NodeId,
        name: String,
        body: NodeBody,
    ) -> Result<NodeId, TreeError> {
        let parent_node = self.node(parent).ok_or(TreeError::StaleHandle)?;
        if !parent_node.is_group() {
            return Err(TreeError::NotAGroup(parent_node.name.clone()));
        }
        if self.get_child(parent, &name).is_some() {
            return Err(TreeError::DuplicateChild(name));
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(ControlNode {
            name,
            parent: Some(parent),
            body,
        }));
        if let Some(Some(ControlNode {
            body: NodeBody::Group { children, .. },
            ..
        })) = self.nodes.get_mut(parent.0)
        {
            children.push(id);
        }
        Ok(id)
    }

    /// Look up a direct child of `parent` by name.
    pub fn get_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|id| self.node(*id).map(|n| n.name.as_str()) == Some(name))
    }

    /// Remove a direct child (and its whole subtree). Returns whether a
    /// child with that name existed.
    pub fn remove_child(&mut self, parent: NodeId, name: &str) -> bool {
        let Some(child) = self.get_child(parent, name) else {
            return false;
        };
        if let Some(Some(ControlNode {
            body: NodeBody::Group { children, .. },
            ..
        })) = self.nodes.get_mut(parent.0)
        {
            children.retain(|id| *id != child);
        }
        self.tombstone(child);
        true
    }

    fn tombstone(&mut self, id: NodeId) {
        let descendants: Vec<NodeId> = self.children(id).to_vec();
        for child in descendants {
            self.tombstone(child);
        }
        if let Some(slot) = self.nodes.get_mut(id.0) {
            *slot = None;
        }
    }

    /// Absolute path from root to `id`, every ancestor name included.
    pub fn absolute_path(&self, id: NodeId) -> Option<ControlPath> {
        let mut names = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.node(current)?;
            names.push(node.name.clone());
            cursor = node.parent;
        }
        names.reverse();
        ControlPath::new(names)
    }

    /// Resolve an absolute path (root name first) to a node handle.
    pub fn get_by_path(&self, path: &ControlPath) -> Option<NodeId> {
        self.resolve(path).ok()
    }

    /// Convenience lookup of a control's current value.
    pub fn value_by_path(&self, path: &ControlPath) -> Option<&Value> {
        self.get_by_path(path)
            .and_then(|id| self.node(id))
            .and_then(ControlNode::value)
    }

    fn resolve(&self, path: &ControlPath) -> Result<NodeId, TreeError> {
        let segments = path.segments();
        let root = self.node(self.root).ok_or(TreeError::StaleHandle)?;
        if segments[0] != root.name {
            return Err(TreeError::PathMismatch {
                segment: segments[0].clone(),
                node: root.name.clone(),
            });
        }
        let mut current = self.root;
        for segment in &segments[1..] {
            current = self
                .get_child(current, segment)
                .ok_or_else(|| TreeError::UnknownPath(path.clone()))?;
        }
        Ok(current)
    }

    /// Validate and store a value at an absolute path.
    ///
    /// Local-origin mutations notify the registered sink with the full path
    /// and the new value; remote-origin mutations never re-broadcast.
    /// Buttons hold no state: a local button press only notifies, a remote
    /// one is accepted and ignored.
    pub fn set_by_path(
        &mut self,
        path: &ControlPath,
        value: Value,
        origin: ChangeOrigin,
    ) -> Result<(), TreeError> {
        let id = self.resolve(path)?;
        let node = self.node(id).ok_or(TreeError::StaleHandle)?;
        let Some(kind) = node.kind() else {
            return Err(TreeError::NotAControl(node.name.clone()));
        };

        let expected = kind.expected_kind();
        if value.kind() != expected {
            return Err(TreeError::TypeMismatch {
                name: node.name.clone(),
                expected,
                actual: value.kind(),
            });
        }
        match kind {
            ControlKind::Range { min, max } => {
                let n = value.as_number().unwrap_or_default();
                if n < *min || n > *max {
                    return Err(TreeError::OutOfRange {
                        value: n,
                        min: *min,
                        max: *max,
                    });
                }
            }
            ControlKind::Radio { items } | ControlKind::DropDown { items } => {
                let index = value.as_number().unwrap_or_default();
                if index < 0 || index as usize >= items.len() {
                    return Err(TreeError::IndexOutOfBounds {
                        index,
                        count: items.len(),
                    });
                }
            }
            ControlKind::Button => {
                // Stateless; forward the press locally, ignore it remotely.
                if origin == ChangeOrigin::Local {
                    self.notify_local_change(path, &value);
                }
                return Ok(());
            }
            _ => {}
        }

        if let Some(Some(ControlNode {
            body: NodeBody::Control { value: slot, .. },
            ..
        })) = self.nodes.get_mut(id.0)
        {
            *slot = value.clone();
        }
        if origin == ChangeOrigin::Local {
            self.notify_local_change(path, &value);
        }
        Ok(())
    }

    fn notify_local_change(&self, path: &ControlPath, value: &Value) {
        match &self.sink {
            Some(sink) => {
                let _ = sink.send(TreeChange {
                    path: path.clone(),
                    value: value.clone(),
                });
            }
            None => debug!(path = %path, "local change with no registered sink"),
        }
    }
}
