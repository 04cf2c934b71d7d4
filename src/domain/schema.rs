//! GUI Description Schema
//!
//! The device describes its control surface as a JSON document with a
//! `type` discriminator per node. This module holds the serde model of
//! that document and the builder that turns it into a [`ControlTree`].
//!
//! Unknown discriminators are skipped with a warning so newer firmware
//! can add element kinds without breaking older clients.

use crate::domain::tree::{ControlKind, ControlTree, NodeId, TreeError};
use crate::domain::value::{ColorChannels, RgbwColor, Value};
use serde::Deserialize;
use tracing::warn;

fn unlimited() -> i32 {
    -1
}

/// One element of the device GUI description.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GuiElement {
    /// Document root; its name is ignored, only its elements matter.
    Root {
        #[serde(default)]
        name: Option<String>,
        elements: Vec<GuiElement>,
    },
    Group {
        name: String,
        elements: Vec<GuiElement>,
        #[serde(default)]
        collapsed: Option<bool>,
    },
    Range {
        name: String,
        min: i32,
        max: i32,
        value: i32,
    },
    Checkbox {
        name: String,
        value: i32,
    },
    Radio {
        name: String,
        items: Vec<String>,
        #[serde(default)]
        value: i32,
    },
    Dropdown {
        name: String,
        items: Vec<String>,
        #[serde(default)]
        value: i32,
    },
    Button {
        name: String,
    },
    #[serde(rename = "numberfield_int32")]
    NumberFieldInt32 {
        name: String,
        value: i32,
        #[serde(default, rename = "readOnly")]
        read_only: bool,
    },
    Textfield {
        name: String,
        value: String,
        #[serde(default = "unlimited", rename = "maxLength")]
        max_length: i32,
    },
    Password {
        name: String,
        value: String,
        #[serde(default = "unlimited", rename = "maxLength")]
        max_length: i32,
    },
    Rgbwrange {
        name: String,
        /// Packed initial color, white in the top byte.
        value: u32,
        channel: String,
    },
    #[serde(other)]
    Unknown,
}

/// Parse a raw GUI description document.
pub fn parse_gui_document(json: &[u8]) -> Result<GuiElement, serde_json::Error> {
    serde_json::from_slice(json)
}

/// Build a fresh control tree from a parsed description. The tree root is
/// named `root_name` regardless of any name in the document.
pub fn build_tree(root_name: &str, document: &GuiElement) -> Result<ControlTree, TreeError> {
    let mut tree = ControlTree::new(root_name);
    let root = tree.root();
    populate(&mut tree, root, document)?;
    Ok(tree)
}

fn populate(tree: &mut ControlTree, parent: NodeId, element: &GuiElement) -> Result<(), TreeError> {
    match element {
        GuiElement::Root { elements, .. } => {
            for child in elements {
                populate(tree, parent, child)?;
            }
        }
        GuiElement::Group {
            name,
            elements,
            collapsed,
        } => {
            let group = tree.add_group(parent, name.clone(), *collapsed)?;
            for child in elements {
                populate(tree, group, child)?;
            }
        }
        GuiElement::Range {
            name,
            min,
            max,
            value,
        } => {
            tree.add_control(
                parent,
                name.clone(),
                ControlKind::Range {
                    min: *min,
                    max: *max,
                },
                Value::Number(*value),
            )?;
        }
        GuiElement::Checkbox { name, value } => {
            tree.add_control(
                parent,
                name.clone(),
                ControlKind::Checkbox,
                Value::Boolean(*value == 1),
            )?;
        }
        GuiElement::Radio { name, items, value } => {
            tree.add_control(
                parent,
                name.clone(),
                ControlKind::Radio {
                    items: items.clone(),
                },
                Value::Number(*value),
            )?;
        }
        GuiElement::Dropdown { name, items, value } => {
            tree.add_control(
                parent,
                name.clone(),
                ControlKind::DropDown {
                    items: items.clone(),
                },
                Value::Number(*value),
            )?;
        }
        GuiElement::Button { name } => {
            tree.add_control(
                parent,
                name.clone(),
                ControlKind::Button,
                Value::Boolean(false),
            )?;
        }
        GuiElement::NumberFieldInt32 {
            name,
            value,
            read_only,
        } => {
            tree.add_control(
                parent,
                name.clone(),
                ControlKind::NumberField {
                    read_only: *read_only,
                },
                Value::Number(*value),
            )?;
        }
        GuiElement::Textfield {
            name,
            value,
            max_length,
        } => {
            tree.add_control(
                parent,
                name.clone(),
                ControlKind::TextField {
                    max_length: *max_length,
                },
                Value::String(value.clone()),
            )?;
        }
        GuiElement::Password {
            name,
            value,
            max_length,
        } => {
            tree.add_control(
                parent,
                name.clone(),
                ControlKind::Password {
                    max_length: *max_length,
                },
                Value::String(value.clone()),
            )?;
        }
        GuiElement::Rgbwrange {
            name,
            value,
            channel,
        } => {
            tree.add_control(
                parent,
                name.clone(),
                ControlKind::RgbwRange {
                    channels: ColorChannels::from_spec(channel),
                },
                Value::Rgbw(RgbwColor::from_packed(*value)),
            )?;
        }
        GuiElement::Unknown => {
            warn!("skipping GUI element with unknown type");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::path::ControlPath;

    const FULL_DOCUMENT: &str = r#"{
        "type": "root",
        "name": "ignored",
        "elements": [
            {"type": "checkbox", "name": "Power", "value": 1},
            {"type": "group", "name": "Engines", "collapsed": true, "elements": [
                {"type": "range", "name": "Warp", "min": 0, "max": 255, "value": 10},
                {"type": "rgbwrange", "name": "Deflector", "value": 4278255360, "channel": "RGB"}
            ]},
            {"type": "radio", "name": "Mode", "items": ["Cruise", "Battle"], "value": 1},
            {"type": "dropdown", "name": "Profile", "items": ["A", "B", "C"]},
            {"type": "button", "name": "Reset"},
            {"type": "numberfield_int32", "name": "Crew", "value": 430, "readOnly": true},
            {"type": "textfield", "name": "Callsign", "value": "NCC-1701", "maxLength": 12},
            {"type": "password", "name": "Codes", "value": ""}
        ]
    }"#;

    #[test]
    fn full_document_builds_tree() {
        let document = parse_gui_document(FULL_DOCUMENT.as_bytes()).unwrap();
        let tree = build_tree("ship", &document).unwrap();

        assert_eq!(
            tree.value_by_path(&ControlPath::from_wire("ship,Power")),
            Some(&Value::Boolean(true))
        );
        assert_eq!(
            tree.value_by_path(&ControlPath::from_wire("ship,Engines,Warp")),
            Some(&Value::Number(10))
        );
        assert_eq!(
            tree.value_by_path(&ControlPath::from_wire("ship,Mode")),
            Some(&Value::Number(1))
        );
        // Dropdown selection defaults to the first item.
        assert_eq!(
            tree.value_by_path(&ControlPath::from_wire("ship,Profile")),
            Some(&Value::Number(0))
        );
        assert_eq!(
            tree.value_by_path(&ControlPath::from_wire("ship,Callsign")),
            Some(&Value::String("NCC-1701".into()))
        );

        let engines = tree
            .get_by_path(&ControlPath::from_wire("ship,Engines"))
            .unwrap();
        assert_eq!(tree.node(engines).unwrap().collapsed(), Some(true));

        // 0xFF00FF00 packed: white=0xFF, r=0x00, g=0xFF, b=0x00
        let deflector = tree
            .value_by_path(&ControlPath::from_wire("ship,Engines,Deflector"))
            .unwrap();
        assert_eq!(
            deflector,
            &Value::Rgbw(RgbwColor::new(0x00, 0xFF, 0x00, 0xFF))
        );
        let id = tree
            .get_by_path(&ControlPath::from_wire("ship,Engines,Deflector"))
            .unwrap();
        match tree.node(id).unwrap().kind() {
            Some(ControlKind::RgbwRange { channels }) => {
                assert!(channels.r && channels.g && channels.b && !channels.w);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn unknown_element_is_skipped() {
        let json = r#"{
            "type": "root",
            "elements": [
                {"type": "holodeck", "name": "Fancy"},
                {"type": "checkbox", "name": "Power", "value": 0}
            ]
        }"#;
        let document = parse_gui_document(json.as_bytes()).unwrap();
        let tree = build_tree("ship", &document).unwrap();
        assert!(tree
            .get_by_path(&ControlPath::from_wire("ship,Fancy"))
            .is_none());
        assert_eq!(
            tree.value_by_path(&ControlPath::from_wire("ship,Power")),
            Some(&Value::Boolean(false))
        );
    }

    #[test]
    fn number_field_read_only_flag() {
        let document = parse_gui_document(FULL_DOCUMENT.as_bytes()).unwrap();
        let tree = build_tree("ship", &document).unwrap();
        let id = tree
            .get_by_path(&ControlPath::from_wire("ship,Crew"))
            .unwrap();
        assert_eq!(
            tree.node(id).unwrap().kind(),
            Some(&ControlKind::NumberField { read_only: true })
        );
    }
}
