//! Addresses pointing into the remote management resource tree.

use std::fmt;

use thiserror::Error;

use super::node::ModelNode;

/// Raised when an address string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("malformed address: {address}")]
    Malformed { address: String },
    #[error("malformed segment '{segment}' in address: {address}")]
    MalformedSegment { segment: String, address: String },
}

/// An ordered sequence of name/value segments identifying a node in the
/// remote management tree. The empty sequence is the root. Segment order is
/// significant and preserved on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceAddress {
    segments: Vec<(String, String)>,
}

impl ResourceAddress {
    /// The empty (root) address.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses an address like `/subsystem=datasources/data-source=sample`.
    /// A missing leading slash is tolerated; empty input is the root.
    pub fn parse(address: &str) -> Result<Self, AddressError> {
        let trimmed = address.trim();
        let safe = trimmed.strip_prefix('/').unwrap_or(trimmed);
        if safe.is_empty() {
            return Ok(Self::root());
        }
        let mut parsed = Self::root();
        for segment in safe.split('/') {
            match segment.split_once('=') {
                Some((name, value)) if !name.is_empty() && !value.contains('=') => {
                    parsed.push(name, value);
                }
                _ => {
                    return Err(AddressError::MalformedSegment {
                        segment: segment.to_string(),
                        address: address.to_string(),
                    });
                }
            }
        }
        Ok(parsed)
    }

    /// Appends a segment, builder style.
    pub fn add(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    /// Appends a segment in place.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.segments.push((name.into(), value.into()));
    }

    /// The address without its last segment; the root is its own parent.
    pub fn parent(&self) -> ResourceAddress {
        let mut segments = self.segments.clone();
        segments.pop();
        ResourceAddress { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> impl Iterator<Item = (&str, &str)> {
        self.segments.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// The value of the first segment with the given name.
    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.segments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// The value of the last segment, if any.
    pub fn last_value(&self) -> Option<&str> {
        self.segments.last().map(|(_, v)| v.as_str())
    }

    /// The wire form: a list of single-entry objects.
    pub fn to_node(&self) -> ModelNode {
        let mut list = ModelNode::list();
        for (name, value) in &self.segments {
            let mut segment = ModelNode::object();
            segment.insert(name, value.as_str());
            list.push(segment);
        }
        list
    }

    /// Rebuilds an address from its wire form. Undefined nodes decode as the
    /// root address.
    pub fn from_node(node: &ModelNode) -> Result<Self, AddressError> {
        if !node.is_defined() {
            return Ok(Self::root());
        }
        let pairs = node.as_property_list().map_err(|_| AddressError::Malformed {
            address: node.to_string(),
        })?;
        let mut address = Self::root();
        for (name, value) in pairs {
            let value = value.as_string().map_err(|_| AddressError::MalformedSegment {
                segment: name.to_string(),
                address: node.to_string(),
            })?;
            address.push(name, value);
        }
        Ok(address)
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for (name, value) in &self.segments {
            write!(f, "/{name}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_display() {
        let address = ResourceAddress::parse("/subsystem=datasources/data-source=sample").unwrap();
        assert_eq!(address.len(), 2);
        assert_eq!(address.to_string(), "/subsystem=datasources/data-source=sample");
    }

    #[test]
    fn parse_tolerates_missing_leading_slash() {
        let address = ResourceAddress::parse("subsystem=logging").unwrap();
        assert_eq!(address.first_value("subsystem"), Some("logging"));
    }

    #[test]
    fn empty_input_is_root() {
        assert!(ResourceAddress::parse("").unwrap().is_empty());
        assert!(ResourceAddress::parse("/").unwrap().is_empty());
        assert_eq!(ResourceAddress::root().to_string(), "/");
    }

    #[test]
    fn malformed_segments_are_rejected() {
        assert!(ResourceAddress::parse("/subsystem").is_err());
        assert!(ResourceAddress::parse("/a=b/c").is_err());
        assert!(ResourceAddress::parse("/a=b=c").is_err());
    }

    #[test]
    fn wire_form_preserves_segment_order() {
        let address = ResourceAddress::root()
            .add("host", "primary")
            .add("server", "server-one");
        let decoded = ResourceAddress::from_node(&address.to_node()).unwrap();
        assert_eq!(decoded, address);
        assert_eq!(decoded.last_value(), Some("server-one"));
    }

    #[test]
    fn parent_of_root_is_root() {
        let address = ResourceAddress::root().add("deployment", "app.war");
        assert!(address.parent().is_empty());
        assert!(ResourceAddress::root().parent().is_empty());
    }
}
