/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! QuickFIX XML dictionary loader.
//!
//! Reads the `<fix>` documents shipped with QuickFIX (`FIX44.xml`,
//! `FIXT11.xml`, `FIX50SP2.xml`, ...). Components are expanded inline, so
//! every message and group ends up as a flat, ordered member list.

use crate::error::DictionaryError;
use crate::schema::{
    Dictionary, FieldDef, FieldType, GroupDef, Member, MessageCategory, MessageDef, Version,
};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;
use xmltree::{Element, XMLNode};

trait XmlHelper {
    fn attribute(&self, name: &str) -> Result<&str, DictionaryError>;
    fn child_element(&self, name: &str) -> Result<&Element, DictionaryError>;
    fn child_elements(&self) -> impl Iterator<Item = &Element>;
}

impl XmlHelper for Element {
    fn attribute(&self, name: &str) -> Result<&str, DictionaryError> {
        self.attributes
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| DictionaryError::MissingAttribute {
                element: self.name.clone(),
                attribute: name.to_string(),
            })
    }

    fn child_element(&self, name: &str) -> Result<&Element, DictionaryError> {
        self.get_child(name)
            .ok_or_else(|| DictionaryError::MissingElement {
                parent: self.name.clone(),
                child: name.to_string(),
            })
    }

    fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(XMLNode::as_element)
    }
}

fn yes_no(value: &str) -> Result<bool, DictionaryError> {
    match value {
        "Y" | "YES" | "y" | "yes" => Ok(true),
        "N" | "NO" | "n" | "no" => Ok(false),
        other => Err(DictionaryError::InvalidAttribute {
            attribute: "required".to_string(),
            value: other.to_string(),
        }),
    }
}

fn number(element: &Element, name: &str) -> Result<u32, DictionaryError> {
    let raw = element.attribute(name)?;
    raw.parse().map_err(|_| DictionaryError::InvalidAttribute {
        attribute: name.to_string(),
        value: raw.to_string(),
    })
}

/// Resolves member elements into [`Member`]s, expanding components.
struct Resolver<'a> {
    fields_by_name: HashMap<&'a str, u32>,
    components: HashMap<&'a str, &'a Element>,
}

impl<'a> Resolver<'a> {
    fn tag(&self, name: &str) -> Result<u32, DictionaryError> {
        self.fields_by_name
            .get(name)
            .copied()
            .ok_or_else(|| DictionaryError::UnknownField(name.to_string()))
    }

    fn members(
        &self,
        parent: &'a Element,
        optional: bool,
        stack: &mut Vec<&'a str>,
    ) -> Result<Vec<Member>, DictionaryError> {
        let mut members = Vec::new();
        for child in parent.child_elements() {
            let name = child.attribute("name")?;
            let required = !optional
                && child
                    .attributes
                    .get("required")
                    .map(|r| yes_no(r))
                    .transpose()?
                    .unwrap_or(false);
            match child.name.as_str() {
                "field" => members.push(Member::field(self.tag(name)?, required)),
                "group" => {
                    let count_tag = self.tag(name)?;
                    let inner = self.members(child, false, stack)?;
                    members.push(Member::Group(GroupDef::new(count_tag, required, inner)));
                }
                "component" => {
                    if stack.contains(&name) {
                        return Err(DictionaryError::RecursiveComponent(name.to_string()));
                    }
                    let component = self
                        .components
                        .get(name)
                        .copied()
                        .ok_or_else(|| DictionaryError::UnknownComponent(name.to_string()))?;
                    stack.push(name);
                    let inner = self.members(component, optional || !required, stack)?;
                    stack.pop();
                    members.extend(inner);
                }
                _ => {}
            }
        }
        Ok(members)
    }
}

impl Dictionary {
    /// Parses a QuickFIX XML dictionary.
    ///
    /// # Errors
    /// Returns a `DictionaryError` if the document is malformed or refers to
    /// undeclared fields or components.
    pub fn from_quickfix_xml(xml: &str) -> Result<Self, DictionaryError> {
        let root = Element::parse(xml.as_bytes()).map_err(|e| DictionaryError::Xml(e.to_string()))?;

        let kind = root.attributes.get("type").map_or("FIX", String::as_str);
        let major = number(&root, "major")?;
        let minor = number(&root, "minor")?;
        let service_pack = root
            .attributes
            .get("servicepack")
            .and_then(|sp| sp.parse().ok())
            .unwrap_or(0);
        let version = Version::from_parts(kind, major, minor, service_pack).ok_or_else(|| {
            DictionaryError::UnsupportedVersion(format!("{kind} {major}.{minor} SP{service_pack}"))
        })?;

        let mut dict = Dictionary::new(version);

        let fields = root.child_element("fields")?;
        let mut fields_by_name = HashMap::new();
        for field in fields.child_elements() {
            let tag = number(field, "number")?;
            let name = field.attribute("name")?;
            let field_type: FieldType = field
                .attribute("type")?
                .parse()
                .unwrap_or(FieldType::String);
            let mut def = FieldDef::new(tag, name, field_type);
            let values: HashMap<String, String> = field
                .child_elements()
                .filter_map(|v| {
                    let value = v.attributes.get("enum")?;
                    let description = v.attributes.get("description").cloned().unwrap_or_default();
                    Some((value.clone(), description))
                })
                .collect();
            if !values.is_empty() {
                def = def.with_values(values);
            }
            fields_by_name.insert(name, tag);
            dict.add_field(def);
        }

        let components = match root.get_child("components") {
            Some(list) => list
                .child_elements()
                .map(|c| Ok((c.attribute("name")?, c)))
                .collect::<Result<HashMap<_, _>, DictionaryError>>()?,
            None => HashMap::new(),
        };
        let resolver = Resolver {
            fields_by_name,
            components,
        };
        let mut stack = Vec::new();

        if let Some(header) = root.get_child("header") {
            dict.set_header(&resolver.members(header, false, &mut stack)?);
        }
        if let Some(trailer) = root.get_child("trailer") {
            dict.set_trailer(&resolver.members(trailer, false, &mut stack)?);
        }

        for message in root.child_element("messages")?.child_elements() {
            let category = match message.attributes.get("msgcat").map(String::as_str) {
                Some("admin") => MessageCategory::Admin,
                _ => MessageCategory::App,
            };
            let members = resolver.members(message, false, &mut stack)?;
            dict.add_message(MessageDef::new(
                message.attribute("msgtype")?,
                message.attribute("name")?,
                category,
                members,
            ));
        }

        debug!(
            version = %dict.version,
            messages = dict.messages().count(),
            "loaded QuickFIX dictionary"
        );
        Ok(dict)
    }

    /// Reads and parses a QuickFIX XML dictionary file.
    ///
    /// # Errors
    /// Returns `DictionaryError::Io` if the file cannot be read, or any
    /// error of [`Dictionary::from_quickfix_xml`].
    pub fn from_quickfix_file(path: impl AsRef<Path>) -> Result<Self, DictionaryError> {
        let xml = std::fs::read_to_string(path)?;
        Self::from_quickfix_xml(&xml)
    }
}
