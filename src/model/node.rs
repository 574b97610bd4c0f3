//! Dynamically typed tree value used by the management wire protocol.
//!
//! A [`ModelNode`] holds exactly one variant; the type tag and the payload
//! live in the same enum so they cannot disagree. Trees are built
//! incrementally by callers and produced by the codec on decode.

use std::fmt;

use thiserror::Error;

use super::keys;

/// The type tag of a [`ModelNode`], matching the wire type characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    BigDecimal,
    BigInteger,
    Boolean,
    Bytes,
    Double,
    Expression,
    Int,
    List,
    Long,
    Object,
    Property,
    String,
    Type,
    Undefined,
}

impl ModelType {
    /// The single-byte tag used by the binary encoding.
    pub const fn type_char(self) -> u8 {
        match self {
            ModelType::BigDecimal => b'd',
            ModelType::BigInteger => b'i',
            ModelType::Boolean => b'Z',
            ModelType::Bytes => b'b',
            ModelType::Double => b'D',
            ModelType::Expression => b'e',
            ModelType::Int => b'I',
            ModelType::List => b'l',
            ModelType::Long => b'J',
            ModelType::Object => b'o',
            ModelType::Property => b'p',
            ModelType::String => b's',
            ModelType::Type => b't',
            ModelType::Undefined => b'u',
        }
    }

    pub fn from_type_char(c: u8) -> Option<Self> {
        Some(match c {
            b'd' => ModelType::BigDecimal,
            b'i' => ModelType::BigInteger,
            b'Z' => ModelType::Boolean,
            b'b' => ModelType::Bytes,
            b'D' => ModelType::Double,
            b'e' => ModelType::Expression,
            b'I' => ModelType::Int,
            b'l' => ModelType::List,
            b'J' => ModelType::Long,
            b'o' => ModelType::Object,
            b'p' => ModelType::Property,
            b's' => ModelType::String,
            b't' => ModelType::Type,
            b'u' => ModelType::Undefined,
            _ => return None,
        })
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelType::BigDecimal => "BIG_DECIMAL",
            ModelType::BigInteger => "BIG_INTEGER",
            ModelType::Boolean => "BOOLEAN",
            ModelType::Bytes => "BYTES",
            ModelType::Double => "DOUBLE",
            ModelType::Expression => "EXPRESSION",
            ModelType::Int => "INT",
            ModelType::List => "LIST",
            ModelType::Long => "LONG",
            ModelType::Object => "OBJECT",
            ModelType::Property => "PROPERTY",
            ModelType::String => "STRING",
            ModelType::Type => "TYPE",
            ModelType::Undefined => "UNDEFINED",
        };
        f.write_str(name)
    }
}

/// Raised when a node holds a different variant than the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}, found {actual}")]
pub struct TypeMismatch {
    pub expected: ModelType,
    pub actual: ModelType,
}

impl TypeMismatch {
    fn new(expected: ModelType, actual: ModelType) -> Self {
        Self { expected, actual }
    }
}

/// A recursive, dynamically typed tree value.
///
/// Object entries keep insertion order end to end; equality is structural.
/// Big integers are stored as signed big-endian two's-complement bytes, big
/// decimals as their decimal string form, mirroring the wire encoding.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ModelNode {
    #[default]
    Undefined,
    Boolean(bool),
    Int(i32),
    Long(i64),
    BigInteger(Vec<u8>),
    Double(f64),
    BigDecimal(String),
    String(String),
    Bytes(Vec<u8>),
    Expression(String),
    List(Vec<ModelNode>),
    Object(Vec<(String, ModelNode)>),
    Property(String, Box<ModelNode>),
    Type(ModelType),
}

static UNDEFINED: ModelNode = ModelNode::Undefined;

impl ModelNode {
    /// A fresh undefined node.
    pub fn new() -> Self {
        ModelNode::Undefined
    }

    /// An empty object node.
    pub fn object() -> Self {
        ModelNode::Object(Vec::new())
    }

    /// An empty list node.
    pub fn list() -> Self {
        ModelNode::List(Vec::new())
    }

    pub fn node_type(&self) -> ModelType {
        match self {
            ModelNode::Undefined => ModelType::Undefined,
            ModelNode::Boolean(_) => ModelType::Boolean,
            ModelNode::Int(_) => ModelType::Int,
            ModelNode::Long(_) => ModelType::Long,
            ModelNode::BigInteger(_) => ModelType::BigInteger,
            ModelNode::Double(_) => ModelType::Double,
            ModelNode::BigDecimal(_) => ModelType::BigDecimal,
            ModelNode::String(_) => ModelType::String,
            ModelNode::Bytes(_) => ModelType::Bytes,
            ModelNode::Expression(_) => ModelType::Expression,
            ModelNode::List(_) => ModelType::List,
            ModelNode::Object(_) => ModelType::Object,
            ModelNode::Property(_, _) => ModelType::Property,
            ModelNode::Type(_) => ModelType::Type,
        }
    }

    pub fn is_defined(&self) -> bool {
        !matches!(self, ModelNode::Undefined)
    }

    // ------------------------------------------------------ object access

    /// Read access to a named child; missing children read as undefined.
    pub fn get(&self, name: &str) -> &ModelNode {
        match self {
            ModelNode::Object(entries) => entries
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v)
                .unwrap_or(&UNDEFINED),
            _ => &UNDEFINED,
        }
    }

    /// Fail-safe path lookup along `/`-separated names; any miss reads as
    /// undefined.
    pub fn get_path(&self, path: &str) -> &ModelNode {
        let mut current = self;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = current.get(part);
        }
        current
    }

    /// Mutable access to a named child, inserting an undefined entry if
    /// absent. An undefined node silently becomes an object.
    ///
    /// # Panics
    ///
    /// Panics if the node is defined and not an object; use
    /// [`try_get_mut`](Self::try_get_mut) when the receiver type is not
    /// statically known.
    pub fn get_mut(&mut self, name: &str) -> &mut ModelNode {
        let node_type = self.node_type();
        self.try_get_mut(name)
            .unwrap_or_else(|_| panic!("cannot add child '{name}' to a {node_type} node"))
    }

    /// Fallible variant of [`get_mut`](Self::get_mut): a defined non-object
    /// receiver reports the mismatch and stays untouched.
    pub fn try_get_mut(&mut self, name: &str) -> Result<&mut ModelNode, TypeMismatch> {
        if matches!(self, ModelNode::Undefined) {
            *self = ModelNode::object();
        }
        match self {
            ModelNode::Object(entries) => {
                let index = match entries.iter().position(|(k, _)| k == name) {
                    Some(i) => i,
                    None => {
                        entries.push((name.to_string(), ModelNode::Undefined));
                        entries.len() - 1
                    }
                };
                Ok(&mut entries[index].1)
            }
            other => Err(TypeMismatch::new(ModelType::Object, other.node_type())),
        }
    }

    /// Sets a named child, auto-vivifying an undefined node into an object.
    ///
    /// # Panics
    ///
    /// Panics if the node is defined and not an object; use
    /// [`try_insert`](Self::try_insert) when the receiver type is not
    /// statically known.
    pub fn insert(&mut self, name: &str, value: impl Into<ModelNode>) -> &mut Self {
        *self.get_mut(name) = value.into();
        self
    }

    /// Fallible variant of [`insert`](Self::insert).
    pub fn try_insert(
        &mut self,
        name: &str,
        value: impl Into<ModelNode>,
    ) -> Result<&mut Self, TypeMismatch> {
        *self.try_get_mut(name)? = value.into();
        Ok(self)
    }

    /// Removes and returns a named child.
    pub fn remove(&mut self, name: &str) -> Option<ModelNode> {
        match self {
            ModelNode::Object(entries) => entries
                .iter()
                .position(|(k, _)| k == name)
                .map(|i| entries.remove(i).1),
            _ => None,
        }
    }

    /// Appends to a list node, auto-vivifying an undefined node into a list.
    ///
    /// # Panics
    ///
    /// Panics if the node is defined and not a list; use
    /// [`try_push`](Self::try_push) when the receiver type is not statically
    /// known.
    pub fn push(&mut self, value: impl Into<ModelNode>) -> &mut Self {
        let node_type = self.node_type();
        self.try_push(value)
            .unwrap_or_else(|_| panic!("cannot append to a {node_type} node"))
    }

    /// Fallible variant of [`push`](Self::push): a defined non-list receiver
    /// reports the mismatch and stays untouched.
    pub fn try_push(&mut self, value: impl Into<ModelNode>) -> Result<&mut Self, TypeMismatch> {
        if matches!(self, ModelNode::Undefined) {
            *self = ModelNode::list();
        }
        match self {
            ModelNode::List(items) => items.push(value.into()),
            other => return Err(TypeMismatch::new(ModelType::List, other.node_type())),
        }
        Ok(self)
    }

    pub fn has(&self, name: &str) -> bool {
        matches!(self, ModelNode::Object(entries) if entries.iter().any(|(k, _)| k == name))
    }

    /// Whether a named child exists and is defined.
    pub fn has_defined(&self, name: &str) -> bool {
        self.has(name) && self.get(name).is_defined()
    }

    // ------------------------------------------------------ typed accessors

    pub fn as_bool(&self) -> Result<bool, TypeMismatch> {
        match self {
            ModelNode::Boolean(b) => Ok(*b),
            ModelNode::String(s) => s
                .parse()
                .map_err(|_| TypeMismatch::new(ModelType::Boolean, ModelType::String)),
            other => Err(TypeMismatch::new(ModelType::Boolean, other.node_type())),
        }
    }

    pub fn as_i32(&self) -> Result<i32, TypeMismatch> {
        match self {
            ModelNode::Int(i) => Ok(*i),
            ModelNode::Long(l) => {
                i32::try_from(*l).map_err(|_| TypeMismatch::new(ModelType::Int, ModelType::Long))
            }
            ModelNode::String(s) => s
                .parse()
                .map_err(|_| TypeMismatch::new(ModelType::Int, ModelType::String)),
            other => Err(TypeMismatch::new(ModelType::Int, other.node_type())),
        }
    }

    pub fn as_i64(&self) -> Result<i64, TypeMismatch> {
        match self {
            ModelNode::Int(i) => Ok(i64::from(*i)),
            ModelNode::Long(l) => Ok(*l),
            ModelNode::String(s) => s
                .parse()
                .map_err(|_| TypeMismatch::new(ModelType::Long, ModelType::String)),
            other => Err(TypeMismatch::new(ModelType::Long, other.node_type())),
        }
    }

    pub fn as_f64(&self) -> Result<f64, TypeMismatch> {
        match self {
            ModelNode::Int(i) => Ok(f64::from(*i)),
            ModelNode::Long(l) => Ok(*l as f64),
            ModelNode::Double(d) => Ok(*d),
            ModelNode::BigDecimal(s) | ModelNode::String(s) => s
                .parse()
                .map_err(|_| TypeMismatch::new(ModelType::Double, self.node_type())),
            other => Err(TypeMismatch::new(ModelType::Double, other.node_type())),
        }
    }

    /// Borrowed string content of a string or expression node.
    pub fn as_str(&self) -> Result<&str, TypeMismatch> {
        match self {
            ModelNode::String(s) | ModelNode::Expression(s) => Ok(s),
            other => Err(TypeMismatch::new(ModelType::String, other.node_type())),
        }
    }

    /// String rendering of scalar nodes; complex nodes are a mismatch.
    pub fn as_string(&self) -> Result<String, TypeMismatch> {
        match self {
            ModelNode::Boolean(b) => Ok(b.to_string()),
            ModelNode::Int(i) => Ok(i.to_string()),
            ModelNode::Long(l) => Ok(l.to_string()),
            ModelNode::Double(d) => Ok(d.to_string()),
            ModelNode::BigDecimal(s) => Ok(s.clone()),
            ModelNode::String(s) | ModelNode::Expression(s) => Ok(s.clone()),
            ModelNode::Type(t) => Ok(t.to_string()),
            other => Err(TypeMismatch::new(ModelType::String, other.node_type())),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8], TypeMismatch> {
        match self {
            ModelNode::Bytes(b) => Ok(b),
            other => Err(TypeMismatch::new(ModelType::Bytes, other.node_type())),
        }
    }

    pub fn as_list(&self) -> Result<&[ModelNode], TypeMismatch> {
        match self {
            ModelNode::List(items) => Ok(items),
            other => Err(TypeMismatch::new(ModelType::List, other.node_type())),
        }
    }

    /// A property node, or a single-entry object viewed as one.
    pub fn as_property(&self) -> Result<(&str, &ModelNode), TypeMismatch> {
        match self {
            ModelNode::Property(name, value) => Ok((name, value)),
            ModelNode::Object(entries) if entries.len() == 1 => {
                Ok((&entries[0].0, &entries[0].1))
            }
            other => Err(TypeMismatch::new(ModelType::Property, other.node_type())),
        }
    }

    /// Ordered name/value pairs of an object, or of a list whose elements
    /// are properties (or single-entry objects).
    pub fn as_property_list(&self) -> Result<Vec<(&str, &ModelNode)>, TypeMismatch> {
        match self {
            ModelNode::Object(entries) => {
                Ok(entries.iter().map(|(k, v)| (k.as_str(), v)).collect())
            }
            ModelNode::List(items) => items.iter().map(|item| item.as_property()).collect(),
            other => Err(TypeMismatch::new(ModelType::Object, other.node_type())),
        }
    }

    // ------------------------------------------------------ response envelope

    /// Whether this node is a response envelope with a non-success outcome.
    pub fn is_failure(&self) -> bool {
        self.has_defined(keys::OUTCOME)
            && self.get(keys::OUTCOME).as_str() != Ok(keys::SUCCESS)
    }

    /// The failure text of a failed envelope, with a fixed fallback when the
    /// server provided none.
    pub fn failure_description(&self) -> String {
        if self.has_defined(keys::FAILURE_DESCRIPTION) {
            let description = self.get(keys::FAILURE_DESCRIPTION);
            description
                .as_string()
                .unwrap_or_else(|_| description.to_string())
        } else {
            "No failure description available".to_string()
        }
    }
}

impl fmt::Display for ModelNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelNode::Undefined => write!(f, "undefined"),
            ModelNode::Boolean(b) => write!(f, "{b}"),
            ModelNode::Int(i) => write!(f, "{i}"),
            ModelNode::Long(l) => write!(f, "{l}L"),
            ModelNode::BigInteger(bytes) => {
                write!(f, "big integer 0x")?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            ModelNode::Double(d) => write!(f, "{d}"),
            ModelNode::BigDecimal(s) => write!(f, "big decimal {s}"),
            ModelNode::String(s) => write!(f, "\"{s}\""),
            ModelNode::Bytes(b) => write!(f, "bytes ({})", b.len()),
            ModelNode::Expression(s) => write!(f, "expression \"{s}\""),
            ModelNode::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            ModelNode::Object(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "\"{k}\" => {v}")?;
                }
                write!(f, "}}")
            }
            ModelNode::Property(name, value) => write!(f, "(\"{name}\" => {value})"),
            ModelNode::Type(t) => write!(f, "{t}"),
        }
    }
}

impl From<bool> for ModelNode {
    fn from(value: bool) -> Self {
        ModelNode::Boolean(value)
    }
}

impl From<i32> for ModelNode {
    fn from(value: i32) -> Self {
        ModelNode::Int(value)
    }
}

impl From<i64> for ModelNode {
    fn from(value: i64) -> Self {
        ModelNode::Long(value)
    }
}

impl From<f64> for ModelNode {
    fn from(value: f64) -> Self {
        ModelNode::Double(value)
    }
}

impl From<&str> for ModelNode {
    fn from(value: &str) -> Self {
        ModelNode::String(value.to_string())
    }
}

impl From<String> for ModelNode {
    fn from(value: String) -> Self {
        ModelNode::String(value)
    }
}

impl From<ModelType> for ModelNode {
    fn from(value: ModelType) -> Self {
        ModelNode::Type(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_envelope(description: &str) -> ModelNode {
        let mut node = ModelNode::object();
        node.insert(keys::OUTCOME, "failed");
        node.insert(keys::FAILURE_DESCRIPTION, description);
        node
    }

    #[test]
    fn get_on_missing_child_reads_undefined() {
        let mut node = ModelNode::object();
        node.insert("present", 42);
        assert!(!node.get("absent").is_defined());
        assert_eq!(node.get("present").as_i32(), Ok(42));
    }

    #[test]
    fn get_path_is_fail_safe() {
        let mut node = ModelNode::object();
        node.get_mut("a").insert("b", "deep");
        assert_eq!(node.get_path("a/b").as_str(), Ok("deep"));
        assert!(!node.get_path("a/x/y").is_defined());
        assert!(!node.get_path("no/such/path").is_defined());
    }

    #[test]
    fn get_mut_vivifies_undefined_into_object() {
        let mut node = ModelNode::new();
        node.get_mut("child").insert("leaf", true);
        assert_eq!(node.get_path("child/leaf").as_bool(), Ok(true));
    }

    #[test]
    fn push_vivifies_undefined_into_list() {
        let mut node = ModelNode::new();
        node.push("one").push("two");
        assert_eq!(node.as_list().map(<[_]>::len), Ok(2));
    }

    #[test]
    fn fallible_mutators_report_mismatches() {
        let mut node = ModelNode::Int(3);
        let err = node.try_insert("child", 1).unwrap_err();
        assert_eq!(err.expected, ModelType::Object);
        let err = node.try_push(1).unwrap_err();
        assert_eq!(err.expected, ModelType::List);
        // the receiver stays untouched on error
        assert_eq!(node, ModelNode::Int(3));

        let mut fresh = ModelNode::new();
        fresh.try_insert("child", 1).unwrap();
        assert_eq!(fresh.get("child").as_i32(), Ok(1));
    }

    #[test]
    fn object_keeps_insertion_order() {
        let mut node = ModelNode::object();
        node.insert("z", 1).insert("a", 2).insert("m", 3);
        let keys: Vec<&str> = node
            .as_property_list()
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn typed_accessors_reject_mismatches() {
        let node = ModelNode::from("not a number");
        let err = node.as_i32().unwrap_err();
        assert_eq!(err.expected, ModelType::Int);
        assert!(ModelNode::Boolean(true).as_list().is_err());
        assert!(ModelNode::list().as_bool().is_err());
    }

    #[test]
    fn numeric_accessors_parse_strings() {
        assert_eq!(ModelNode::from("17").as_i32(), Ok(17));
        assert_eq!(ModelNode::from("true").as_bool(), Ok(true));
        assert_eq!(ModelNode::BigDecimal("2.5".into()).as_f64(), Ok(2.5));
    }

    #[test]
    fn has_defined_distinguishes_undefined_entries() {
        let mut node = ModelNode::object();
        node.insert("defined", 1);
        node.insert("hollow", ModelNode::Undefined);
        assert!(node.has("hollow"));
        assert!(!node.has_defined("hollow"));
        assert!(node.has_defined("defined"));
    }

    #[test]
    fn failure_envelope_detection() {
        assert!(failed_envelope("boom").is_failure());
        assert_eq!(failed_envelope("boom").failure_description(), "boom");

        let mut ok = ModelNode::object();
        ok.insert(keys::OUTCOME, keys::SUCCESS);
        assert!(!ok.is_failure());

        let mut failed_without_text = ModelNode::object();
        failed_without_text.insert(keys::OUTCOME, "failed");
        assert_eq!(
            failed_without_text.failure_description(),
            "No failure description available"
        );
    }

    #[test]
    fn single_entry_object_reads_as_property() {
        let mut node = ModelNode::object();
        node.insert("subsystem", "datasources");
        let (name, value) = node.as_property().unwrap();
        assert_eq!(name, "subsystem");
        assert_eq!(value.as_str(), Ok("datasources"));
    }
}
