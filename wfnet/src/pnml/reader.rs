use std::{fs, path::Path};

use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};
use tracing::{debug, info, warn};

use super::{LoadReport, ReadStatus};
use crate::error::Result;
use crate::net::{Marking, Net, Position};

const KNOWN_ELEMENTS: &[&str] = &[
    "pnml",
    "net",
    "page",
    "place",
    "transition",
    "arc",
    "name",
    "value",
    "text",
    "initialMarking",
    "token",
    "graphics",
    "position",
];

#[derive(Default)]
struct NodeRecord {
    id: Option<String>,
    name: Option<String>,
    marking: Option<String>,
    x: Option<String>,
    y: Option<String>,
}

#[derive(Default)]
struct ArcRecord {
    id: Option<String>,
    source: Option<String>,
    target: Option<String>,
}

enum Record {
    Place(NodeRecord),
    Transition(NodeRecord),
    Arc(ArcRecord),
}

#[derive(Default)]
struct PnmlReader {
    net: Net,
    status: ReadStatus,
    warnings: Vec<String>,
    path: Vec<String>,
    current: Option<Record>,
    arcs: Vec<(String, String, String)>,
}

/// Read a PNML document.
///
/// Never fails: problems are reported through the status bits and warnings of the report.
pub fn read_str(content: &str) -> LoadReport {
    PnmlReader::default().read(content)
}

/// Read a PNML file. Only failing to read the file itself is an error.
pub fn read_file(path: &Path) -> Result<LoadReport> {
    let content = fs::read_to_string(path)?;
    let report = read_str(&content);
    info!(
        path = %path.display(),
        elements = report.net.len(),
        accepted = report.accepted(),
        warnings = report.warnings.len(),
        "Loaded net."
    );
    Ok(report)
}

impl PnmlReader {
    fn read(mut self, content: &str) -> LoadReport {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);
        loop {
            match reader.read_event() {
                Ok(Event::Start(tag)) => self._start(&tag),
                Ok(Event::Empty(tag)) => {
                    self._start(&tag);
                    self._end();
                }
                Ok(Event::End(_)) => self._end(),
                Ok(Event::Text(text)) => match text.unescape() {
                    Ok(text) => self._text(&text),
                    Err(err) => {
                        self._flag(ReadStatus::READ_ERROR, format!("Unreadable text: {}", err));
                        break;
                    }
                },
                Ok(Event::Eof) => break,
                // declarations, comments, processing instructions
                Ok(_) => {}
                Err(err) => {
                    let position = reader.buffer_position();
                    self._flag(
                        ReadStatus::READ_ERROR,
                        format!("Malformed document at byte {}: {}", position, err),
                    );
                    break;
                }
            }
        }
        self._add_arcs();
        self.net.set_modified(false);
        LoadReport { net: self.net, status: self.status, warnings: self.warnings }
    }

    fn _start(&mut self, tag: &BytesStart) {
        let name = String::from_utf8_lossy(tag.local_name().as_ref()).into_owned();
        let known = KNOWN_ELEMENTS.contains(&name.as_str());
        if !known {
            self._flag(ReadStatus::UNKNOWN_ELEMENT, format!("Ignored unknown element <{}>.", name));
        }
        let attributes = if known { self._attributes(tag, &name) } else { Vec::new() };
        let attribute = |key: &str| {
            attributes.iter().find(|(k, _)| k == key).map(|(_, value)| value.clone())
        };

        match name.as_str() {
            "place" => {
                self.current =
                    Some(Record::Place(NodeRecord { id: attribute("id"), ..Default::default() }))
            }
            "transition" => {
                self.current = Some(Record::Transition(NodeRecord {
                    id: attribute("id"),
                    ..Default::default()
                }))
            }
            "arc" => {
                self.current = Some(Record::Arc(ArcRecord {
                    id: attribute("id"),
                    source: attribute("source"),
                    target: attribute("target"),
                }))
            }
            "position" if self._path_ends_with(&["graphics"]) => {
                if let Some(Record::Place(node) | Record::Transition(node)) = self.current.as_mut()
                {
                    node.x = attribute("x");
                    node.y = attribute("y");
                }
            }
            _ => {}
        }
        self.path.push(name);
    }

    fn _end(&mut self) {
        let Some(name) = self.path.pop() else { return };
        if !matches!(name.as_str(), "place" | "transition" | "arc") {
            return;
        }
        match self.current.take() {
            Some(Record::Place(node)) => self._finish_node(node, true),
            Some(Record::Transition(node)) => self._finish_node(node, false),
            Some(Record::Arc(arc)) => self._finish_arc(arc),
            None => {}
        }
    }

    fn _text(&mut self, text: &str) {
        let is_name = self._path_ends_with(&["name", "value"]) || self._path_ends_with(&["name", "text"]);
        let is_marking = self._path_ends_with(&["initialMarking", "token", "value"])
            || self._path_ends_with(&["initialMarking", "text"]);
        if let Some(Record::Place(node) | Record::Transition(node)) = self.current.as_mut() {
            if is_name {
                node.name = Some(text.to_string());
            } else if is_marking {
                node.marking = Some(text.to_string());
            }
        }
    }

    fn _attributes(&mut self, tag: &BytesStart, element: &str) -> Vec<(String, String)> {
        let mut result = Vec::new();
        for attr in tag.attributes() {
            let attr = match attr {
                Ok(attr) => attr,
                Err(err) => {
                    self._flag(
                        ReadStatus::INVALID_VALUE,
                        format!("Malformed attribute on <{}>: {}", element, err),
                    );
                    continue;
                }
            };
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            if !_known_attribute(element, &key) {
                self._flag(
                    ReadStatus::UNKNOWN_VALUE,
                    format!("Ignored unknown attribute '{}' on <{}>.", key, element),
                );
                continue;
            }
            match attr.unescape_value() {
                Ok(value) => result.push((key, value.into_owned())),
                Err(err) => self._flag(
                    ReadStatus::INVALID_VALUE,
                    format!("Unreadable attribute '{}' on <{}>: {}", key, element, err),
                ),
            }
        }
        result
    }

    fn _finish_node(&mut self, node: NodeRecord, is_place: bool) {
        let kind = if is_place { "place" } else { "transition" };
        let Some(id) = node.id else {
            self._flag(ReadStatus::MISSING_VALUE, format!("Skipped {} without id.", kind));
            return;
        };
        let (Some(x), Some(y)) = (node.x, node.y) else {
            self._flag(
                ReadStatus::MISSING_VALUE,
                format!("Skipped {} '{}' without position.", kind, id),
            );
            return;
        };
        let (Ok(x), Ok(y)) = (x.trim().parse::<i32>(), y.trim().parse::<i32>()) else {
            self._flag(
                ReadStatus::INVALID_VALUE,
                format!("Skipped {} '{}': invalid position ({}, {}).", kind, id, x, y),
            );
            return;
        };
        let position = Position::new(x, y);
        let name = node.name.unwrap_or_default();

        let res = if is_place {
            let marking = match node.marking.as_deref().map(str::trim) {
                None => Some(Marking::Empty),
                Some(value) => value.parse::<u8>().ok().and_then(|v| Marking::try_from(v).ok()),
            };
            let Some(marking) = marking else {
                self._flag(
                    ReadStatus::INVALID_VALUE,
                    format!(
                        "Skipped place '{}': invalid marking '{}'.",
                        id,
                        node.marking.unwrap_or_default()
                    ),
                );
                return;
            };
            self.net.add_place(id.as_str(), name, marking, position)
        } else {
            self.net.add_transition(id.as_str(), name, position)
        };
        if let Err(err) = res {
            self._flag(ReadStatus::INVALID_VALUE, format!("Skipped {} '{}': {}", kind, id, err));
        }
    }

    fn _finish_arc(&mut self, arc: ArcRecord) {
        match (arc.id, arc.source, arc.target) {
            (Some(id), Some(source), Some(target)) => self.arcs.push((id, source, target)),
            (id, _, _) => self._flag(
                ReadStatus::MISSING_VALUE,
                format!("Skipped arc '{}': source or target missing.", id.unwrap_or_default()),
            ),
        }
    }

    /// Arcs are added after all nodes so their order in the document does not matter.
    fn _add_arcs(&mut self) {
        for (id, source, target) in std::mem::take(&mut self.arcs) {
            if let Err(err) = self.net.add_arc(id.as_str(), &source, &target) {
                self._flag(ReadStatus::INVALID_VALUE, format!("Skipped arc '{}': {}", id, err));
            }
        }
    }

    fn _path_ends_with(&self, suffix: &[&str]) -> bool {
        self.path.len() >= suffix.len()
            && self.path[self.path.len() - suffix.len()..].iter().zip(suffix).all(|(a, b)| a == b)
    }

    fn _flag(&mut self, flag: ReadStatus, message: String) {
        if flag.accepted() {
            debug!("{}", message);
        } else {
            warn!("{}", message);
        }
        self.status |= flag;
        self.warnings.push(message);
    }
}

fn _known_attribute(element: &str, key: &str) -> bool {
    if key.starts_with("xmlns") {
        return true;
    }
    matches!(
        (element, key),
        ("net", "id" | "type")
            | ("page", "id")
            | ("place" | "transition", "id")
            | ("arc", "id" | "source" | "target")
            | ("position", "x" | "y")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ElementId;

    const SIMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<pnml>
  <net id="n1" type="http://www.pnml.org/version-2009/grammar/ptnet">
    <arc id="a1" source="p1" target="t1"/>
    <place id="p1">
      <name><value>Start</value></name>
      <initialMarking><token><value>1</value></token></initialMarking>
      <graphics><position x="10" y="20"/></graphics>
    </place>
    <transition id="t1">
      <graphics><position x="30" y="40"/></graphics>
    </transition>
  </net>
</pnml>"#;

    #[test]
    fn reads_nodes_and_deferred_arcs() {
        let report = read_str(SIMPLE);
        assert!(report.accepted(), "{:?}", report.warnings);
        assert_eq!(report.status, ReadStatus::empty());
        let net = &report.net;
        assert_eq!(net.node("p1").unwrap().name(), "Start");
        assert_eq!(net.place("p1").unwrap().marking(), Marking::Marked);
        assert_eq!(net.node("t1").unwrap().position(), Position::new(30, 40));
        assert_eq!(net.node("t1").unwrap().name(), "");
        assert_eq!(net.successors("p1").unwrap(), &[ElementId::from("a1")]);
        assert!(!net.is_modified());
    }

    #[test]
    fn missing_and_invalid_values_skip_the_element() {
        let content = r#"<pnml><net>
            <place><graphics><position x="1" y="1"/></graphics></place>
            <place id="p2"><name><value>no position</value></name></place>
            <place id="p3">
              <initialMarking><token><value>2</value></token></initialMarking>
              <graphics><position x="1" y="1"/></graphics>
            </place>
            <place id="p4"><graphics><position x="1" y="1"/></graphics></place>
            <transition id="t1"><graphics><position x="a" y="1"/></graphics></transition>
            <arc id="a1" source="p4"/>
            <arc id="a2" source="p4" target="p9"/>
        </net></pnml>"#;
        let report = read_str(content);
        assert!(!report.accepted());
        assert!(report.status.contains(ReadStatus::MISSING_VALUE | ReadStatus::INVALID_VALUE));
        assert!(!report.status.contains(ReadStatus::READ_ERROR));
        assert_eq!(report.warnings.len(), 6);
        // the rest of the file is still loaded
        assert_eq!(report.net.len(), 1);
        assert!(report.net.contains("p4"));
    }

    #[test]
    fn unknown_content_is_informational() {
        let content = r#"<pnml><net id="n" color="red">
            <toolspecific tool="x"><foo/></toolspecific>
            <place id="p1"><graphics><position x="0" y="0"/></graphics></place>
        </net></pnml>"#;
        let report = read_str(content);
        assert!(report.accepted());
        assert!(report.status.contains(ReadStatus::UNKNOWN_ELEMENT | ReadStatus::UNKNOWN_VALUE));
        assert!(report.net.contains("p1"));
    }

    #[test]
    fn malformed_document_is_a_read_error() {
        let content = r#"<pnml><net>
            <place id="p1"><graphics><position x="0" y="0"/></graphics></place>
            <transition id="t1"></place>
        </net></pnml>"#;
        let report = read_str(content);
        assert!(report.status.contains(ReadStatus::READ_ERROR));
        assert!(!report.accepted());
        assert!(report.net.contains("p1"));
    }

    #[test]
    fn rejected_connections_are_invalid_values() {
        let content = r#"<pnml><net>
            <place id="p1"><graphics><position x="0" y="0"/></graphics></place>
            <place id="p2"><graphics><position x="0" y="0"/></graphics></place>
            <place id="p2"><graphics><position x="5" y="5"/></graphics></place>
            <arc id="a1" source="p1" target="p2"/>
        </net></pnml>"#;
        let report = read_str(content);
        assert_eq!(report.status, ReadStatus::INVALID_VALUE);
        assert_eq!(report.warnings.len(), 2);
        assert_eq!(report.net.node("p2").unwrap().position(), Position::new(0, 0));
        assert!(report.net.arcs().next().is_none());
    }
}
