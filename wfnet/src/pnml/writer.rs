use std::{fs, io, path::Path};

use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Writer,
};
use tracing::info;

use crate::error::Result;
use crate::net::{Net, Node, NodeKind, Position};

const NET_TYPE: &str = "http://www.pnml.org/version-2009/grammar/ptnet";

type XmlWriter = Writer<Vec<u8>>;

/// Serialize a net. Nodes are written before arcs, each group in insertion order.
pub fn write_string(net: &Net) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("pnml")))?;
    let mut net_tag = BytesStart::new("net");
    net_tag.push_attribute(("id", "net1"));
    net_tag.push_attribute(("type", NET_TYPE));
    writer.write_event(Event::Start(net_tag))?;

    for node in net.nodes() {
        _write_node(&mut writer, node)?;
    }
    for arc in net.arcs() {
        let mut tag = BytesStart::new("arc");
        tag.push_attribute(("id", arc.id().as_str()));
        tag.push_attribute(("source", arc.source_id().as_str()));
        tag.push_attribute(("target", arc.target_id().as_str()));
        writer.write_event(Event::Empty(tag))?;
    }

    writer.write_event(Event::End(BytesEnd::new("net")))?;
    writer.write_event(Event::End(BytesEnd::new("pnml")))?;
    String::from_utf8(writer.into_inner())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err).into())
}

pub fn write_file(net: &Net, path: &Path) -> Result<()> {
    let content = write_string(net)?;
    fs::write(path, content)?;
    info!(path = %path.display(), elements = net.len(), "Saved net.");
    Ok(())
}

fn _write_node(writer: &mut XmlWriter, node: &Node) -> Result<()> {
    let element = match node.kind() {
        NodeKind::Place(_) => "place",
        NodeKind::Transition(_) => "transition",
    };
    let mut tag = BytesStart::new(element);
    tag.push_attribute(("id", node.id().as_str()));
    writer.write_event(Event::Start(tag))?;

    if !node.name().is_empty() {
        _write_values(writer, &["name"], node.name())?;
    }
    if let NodeKind::Place(place) = node.kind() {
        let tokens = place.marking().tokens().to_string();
        _write_values(writer, &["initialMarking", "token"], &tokens)?;
    }
    _write_position(writer, node.position())?;

    writer.write_event(Event::End(BytesEnd::new(element)))?;
    Ok(())
}

/// Write `<a><b><value>text</value></b></a>` for the given wrapper elements.
fn _write_values(writer: &mut XmlWriter, wrappers: &[&str], text: &str) -> Result<()> {
    for wrapper in wrappers {
        writer.write_event(Event::Start(BytesStart::new(*wrapper)))?;
    }
    writer.write_event(Event::Start(BytesStart::new("value")))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new("value")))?;
    for wrapper in wrappers.iter().rev() {
        writer.write_event(Event::End(BytesEnd::new(*wrapper)))?;
    }
    Ok(())
}

fn _write_position(writer: &mut XmlWriter, position: Position) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("graphics")))?;
    let mut tag = BytesStart::new("position");
    tag.push_attribute(("x", position.x.to_string().as_str()));
    tag.push_attribute(("y", position.y.to_string().as_str()));
    writer.write_event(Event::Empty(tag))?;
    writer.write_event(Event::End(BytesEnd::new("graphics")))?;
    Ok(())
}
