//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use ncd_tree::{NodeData, NodeId, Tree};
use xml::reader::{EventReader, XmlEvent as ReadEvent};
use xml::writer::{EmitterConfig, XmlEvent as WriteEvent};

use crate::{Codec, Error, Result};

/// XML codec, grounded in the `xml-rs` event reader/writer the example pack
/// uses for NETCONF/XML handling.
pub struct XmlCodec;

impl Codec for XmlCodec {
    fn parse(&self, tree: &mut Tree, input: &str) -> Result<NodeId> {
        let reader = EventReader::new(input.as_bytes());
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root: Option<NodeId> = None;

        for event in reader {
            match event? {
                ReadEvent::StartElement {
                    name, attributes, ..
                } => {
                    let data = NodeData {
                        name: name.local_name.clone(),
                        namespace: name.namespace.clone(),
                        value: None,
                        attributes: attributes
                            .iter()
                            .map(|a| (a.name.to_string(), a.value.clone()))
                            .collect(),
                        schema: None,
                    };
                    let id = tree.new_node(data);
                    if let Some(&parent) = stack.last() {
                        tree.append_child(parent, id)?;
                    } else if root.is_some() {
                        return Err(Error::MalformedDocument(
                            "document has more than one root element"
                                .to_owned(),
                        ));
                    } else {
                        root = Some(id);
                    }
                    stack.push(id);
                }
                ReadEvent::Characters(text) | ReadEvent::CData(text) => {
                    if let Some(&current) = stack.last() {
                        let node = tree.node_mut(current)?;
                        match &mut node.value {
                            Some(existing) => existing.push_str(&text),
                            None => node.value = Some(text),
                        }
                    }
                }
                ReadEvent::EndElement { .. } => {
                    stack.pop();
                }
                _ => {}
            }
        }

        root.ok_or_else(|| {
            Error::MalformedDocument("document has no root element".to_owned())
        })
    }

    fn serialize(&self, tree: &Tree, root: NodeId) -> Result<String> {
        write_document(tree, root, false)
    }

    fn serialize_pretty(&self, tree: &Tree, root: NodeId) -> Result<String> {
        write_document(tree, root, true)
    }
}

fn write_document(tree: &Tree, root: NodeId, indent: bool) -> Result<String> {
    let mut buf = Vec::new();
    {
        let mut writer = EmitterConfig::new()
            .perform_indent(indent)
            .write_document_declaration(false)
            .create_writer(&mut buf);
        write_node(tree, root, &mut writer)?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn write_node<W: std::io::Write>(
    tree: &Tree,
    id: NodeId,
    writer: &mut xml::writer::EventWriter<W>,
) -> Result<()> {
    let node = tree.node(id)?;
    let mut start = WriteEvent::start_element(node.name.as_str());
    if let Some(namespace) = &node.namespace {
        start = start.default_ns(namespace.as_str());
    }
    for (name, value) in &node.attributes {
        start = start.attr(name.as_str(), value.as_str());
    }
    writer.write(start)?;

    if let Some(value) = &node.value {
        writer.write(WriteEvent::characters(value))?;
    }
    for child in tree.children(id)? {
        write_node(tree, child, writer)?;
    }

    writer.write(WriteEvent::end_element())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_simple_document() {
        let codec = XmlCodec;
        let mut tree = Tree::new();
        let root = codec
            .parse(&mut tree, "<interfaces><interface>eth0</interface></interfaces>")
            .unwrap();

        let rendered = codec.serialize(&tree, root).unwrap();
        assert!(rendered.contains("<interfaces>"));
        assert!(rendered.contains("<interface>eth0</interface>"));
    }

    #[test]
    fn attributes_are_preserved() {
        let codec = XmlCodec;
        let mut tree = Tree::new();
        let root = codec
            .parse(
                &mut tree,
                r#"<rpc message-id="101"><get/></rpc>"#,
            )
            .unwrap();
        let data = tree.node(root).unwrap();
        assert_eq!(
            data.attributes,
            vec![("message-id".to_string(), "101".to_string())]
        );
    }

    #[test]
    fn multiple_roots_rejected() {
        let codec = XmlCodec;
        let mut tree = Tree::new();
        let result = codec.parse(&mut tree, "<a/><b/>");
        assert!(result.is_err());
    }
}
