//! Typed option binding.
//!
//! Projects a configuration section into any `T: DeserializeOwned + Default`
//! through a serde `Deserializer` over the section tree:
//! - struct fields match keys case-insensitively
//! - leaf strings are parsed into the requested scalar type on demand
//! - sequences bind from index keys (`Args:0`, `Args:1`, ...)
//!
//! Binding never fails. Missing keys keep the field default, unknown keys are
//! ignored, and a value that cannot be parsed is dropped so its field keeps
//! the default. [`bind_with_diagnostics`] reports both cases.

use std::cell::RefCell;
use std::collections::{btree_map, BTreeMap};
use std::fmt;

use serde::de::{self, DeserializeOwned, DeserializeSeed, IntoDeserializer, Visitor};

use crate::config::merged::{join_path, MergedConfiguration, KEY_DELIMITER};

/// A value that was present but could not be bound to its field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedValue {
    pub key: String,
    pub reason: String,
}

/// What the binder ignored while projecting a section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindDiagnostics {
    /// Full key paths that matched no field.
    pub unmatched_keys: Vec<String>,
    /// Values dropped because they could not be parsed.
    pub rejected_values: Vec<RejectedValue>,
}

impl BindDiagnostics {
    pub fn is_clean(&self) -> bool {
        self.unmatched_keys.is_empty() && self.rejected_values.is_empty()
    }
}

/// Bind the section at `path` into `T`.
pub fn bind<T>(config: &MergedConfiguration, path: &str) -> T
where
    T: DeserializeOwned + Default,
{
    bind_with_diagnostics(config, path).0
}

/// Bind the section at `path` into `T` and report what was ignored.
pub fn bind_with_diagnostics<T>(config: &MergedConfiguration, path: &str) -> (T, BindDiagnostics)
where
    T: DeserializeOwned + Default,
{
    let section = config.section(path);
    let mut root = Node::default();
    if let Some(value) = section.value() {
        root.value = Some(value.to_string());
    }
    for (relative, value) in section.entries() {
        root.insert(relative, value);
    }

    let mut diagnostics = BindDiagnostics::default();
    loop {
        let unmatched = RefCell::new(Vec::new());
        let deserializer = NodeDeserializer {
            node: &root,
            path: String::new(),
            unmatched: &unmatched,
        };

        match T::deserialize(deserializer) {
            Ok(value) => {
                diagnostics.unmatched_keys = unmatched
                    .into_inner()
                    .into_iter()
                    .map(|key| join_path(section.path(), &key))
                    .collect();
                return (value, diagnostics);
            }
            Err(BindError {
                key: Some(key),
                message,
            }) if root.remove(&key) => {
                diagnostics.rejected_values.push(RejectedValue {
                    key: join_path(section.path(), &key),
                    reason: message,
                });
            }
            Err(err) => {
                diagnostics.rejected_values.push(RejectedValue {
                    key: section.path().to_string(),
                    reason: err.message,
                });
                return (T::default(), diagnostics);
            }
        }
    }
}

/// Section tree; children are keyed by lowercased segment.
#[derive(Debug, Default)]
struct Node {
    name: String,
    value: Option<String>,
    children: BTreeMap<String, Node>,
}

impl Node {
    fn insert(&mut self, relative: &str, value: &str) {
        let mut node = self;
        for segment in relative.split(KEY_DELIMITER) {
            node = node
                .children
                .entry(segment.to_ascii_lowercase())
                .or_insert_with(|| Node {
                    name: segment.to_string(),
                    ..Node::default()
                });
        }
        node.value = Some(value.to_string());
    }

    fn remove(&mut self, relative: &str) -> bool {
        let segments: Vec<String> = relative
            .split(KEY_DELIMITER)
            .map(str::to_ascii_lowercase)
            .collect();
        let Some((last, parents)) = segments.split_last() else {
            return false;
        };
        let mut node = self;
        for segment in parents {
            match node.children.get_mut(segment) {
                Some(child) => node = child,
                None => return false,
            }
        }
        node.children.remove(last).is_some()
    }

    /// Children with numeric names, in index order.
    fn indexed_children(&self) -> Vec<&Node> {
        let mut indexed: Vec<(usize, &Node)> = self
            .children
            .iter()
            .filter_map(|(key, child)| key.parse::<usize>().ok().map(|index| (index, child)))
            .collect();
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, child)| child).collect()
    }
}

#[derive(Debug)]
struct BindError {
    /// Relative path of the offending key, attached while unwinding.
    key: Option<String>,
    message: String,
}

impl BindError {
    fn at(mut self, path: &str) -> Self {
        if self.key.is_none() && !path.is_empty() {
            self.key = Some(path.to_string());
        }
        self
    }
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{key}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for BindError {}

impl de::Error for BindError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self {
            key: None,
            message: msg.to_string(),
        }
    }
}

struct NodeDeserializer<'a> {
    node: &'a Node,
    path: String,
    unmatched: &'a RefCell<Vec<String>>,
}

impl<'a> NodeDeserializer<'a> {
    fn child(&self, name: &str, node: &'a Node) -> Self {
        Self {
            node,
            path: join_path(&self.path, name),
            unmatched: self.unmatched,
        }
    }

    fn leaf(&self) -> Result<&'a str, BindError> {
        self.node
            .value
            .as_deref()
            .ok_or_else(|| de::Error::custom("expected a value, found a section"))
    }

    fn parse<T>(&self) -> Result<T, BindError>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        let raw = self.leaf()?;
        raw.trim()
            .parse()
            .map_err(|e| de::Error::custom(format!("invalid value `{raw}`: {e}")))
    }

    fn map_access(self, fields: Option<&'static [&'static str]>) -> NodeMapAccess<'a> {
        NodeMapAccess {
            entries: self.node.children.values(),
            fields,
            path: self.path,
            pending: None,
            unmatched: self.unmatched,
        }
    }
}

macro_rules! deserialize_parsed {
    ($($method:ident => $visit:ident: $ty:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
                let value: $ty = self.parse()?;
                visitor.$visit(value)
            }
        )*
    };
}

impl<'de, 'a> de::Deserializer<'de> for NodeDeserializer<'a> {
    type Error = BindError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        if !self.node.children.is_empty() {
            visitor.visit_map(self.map_access(None))
        } else if let Some(value) = &self.node.value {
            visitor.visit_str(value)
        } else {
            visitor.visit_unit()
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        let raw = self.leaf()?.trim();
        if raw.eq_ignore_ascii_case("true") {
            visitor.visit_bool(true)
        } else if raw.eq_ignore_ascii_case("false") {
            visitor.visit_bool(false)
        } else {
            Err(de::Error::custom(format!("invalid boolean `{raw}`")))
        }
    }

    deserialize_parsed! {
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
        deserialize_f32 => visit_f32: f32,
        deserialize_f64 => visit_f64: f64,
        deserialize_char => visit_char: char,
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_str(self.leaf()?)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_bytes(self.leaf()?.as_bytes())
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        let empty_leaf = self.node.children.is_empty()
            && self.node.value.as_deref().map_or(true, str::is_empty);
        if empty_leaf {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        if self.node.children.is_empty() && self.node.value.is_some() {
            return Err(de::Error::custom("expected indexed entries, found a value"));
        }
        let elements: Vec<NodeDeserializer<'a>> = self
            .node
            .indexed_children()
            .into_iter()
            .map(|child| self.child(&child.name, child))
            .collect();
        for (key, child) in &self.node.children {
            if key.parse::<usize>().is_err() {
                self.unmatched
                    .borrow_mut()
                    .push(join_path(&self.path, &child.name));
            }
        }
        visitor.visit_seq(NodeSeqAccess {
            elements: elements.into_iter(),
        })
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_map(self.map_access(None))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_map(self.map_access(Some(fields)))
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        let raw = self.leaf()?.trim();
        let variant = variants
            .iter()
            .copied()
            .find(|variant| variant.eq_ignore_ascii_case(raw))
            .unwrap_or(raw);
        visitor.visit_enum(IntoDeserializer::<BindError>::into_deserializer(variant))
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }
}

struct NodeMapAccess<'a> {
    entries: btree_map::Values<'a, String, Node>,
    /// Struct field names; `None` for free-form maps.
    fields: Option<&'static [&'static str]>,
    path: String,
    pending: Option<&'a Node>,
    unmatched: &'a RefCell<Vec<String>>,
}

impl<'de, 'a> de::MapAccess<'de> for NodeMapAccess<'a> {
    type Error = BindError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, Self::Error> {
        for child in self.entries.by_ref() {
            let key: &str = match self.fields {
                Some(fields) => match fields
                    .iter()
                    .copied()
                    .find(|field| field.eq_ignore_ascii_case(&child.name))
                {
                    Some(field) => field,
                    None => {
                        self.unmatched
                            .borrow_mut()
                            .push(join_path(&self.path, &child.name));
                        continue;
                    }
                },
                None => child.name.as_str(),
            };
            self.pending = Some(child);
            return seed
                .deserialize(IntoDeserializer::<BindError>::into_deserializer(key))
                .map(Some);
        }
        Ok(None)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value, Self::Error> {
        let child = self
            .pending
            .take()
            .ok_or_else(|| <BindError as de::Error>::custom("value requested before key"))?;
        let path = join_path(&self.path, &child.name);
        let deserializer = NodeDeserializer {
            node: child,
            path: path.clone(),
            unmatched: self.unmatched,
        };
        seed.deserialize(deserializer).map_err(|e| e.at(&path))
    }
}

struct NodeSeqAccess<'a> {
    elements: std::vec::IntoIter<NodeDeserializer<'a>>,
}

impl<'de, 'a> de::SeqAccess<'de> for NodeSeqAccess<'a> {
    type Error = BindError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Self::Error> {
        match self.elements.next() {
            Some(element) => {
                let path = element.path.clone();
                seed.deserialize(element).map(Some).map_err(|e| e.at(&path))
            }
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.elements.len())
    }
}
