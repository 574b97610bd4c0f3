//! Management operations and operation batches.

use std::fmt;

use super::address::ResourceAddress;
use super::keys;
use super::node::ModelNode;

/// A single named management action targeted at an address.
///
/// Built via [`Operation::builder`]; immutable once handed to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    name: String,
    address: ResourceAddress,
    parameters: ModelNode,
    headers: ModelNode,
}

impl Operation {
    /// A parameterless operation.
    pub fn new(name: impl Into<String>, address: ResourceAddress) -> Self {
        Self {
            name: name.into(),
            address,
            parameters: ModelNode::Undefined,
            headers: ModelNode::Undefined,
        }
    }

    pub fn builder(name: impl Into<String>, address: ResourceAddress) -> OperationBuilder {
        OperationBuilder {
            operation: Operation::new(name, address),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &ResourceAddress {
        &self.address
    }

    /// The named parameter, undefined when absent.
    pub fn param(&self, name: &str) -> &ModelNode {
        self.parameters.get(name)
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.parameters.has_defined(name)
    }

    /// Ordered parameter names.
    pub fn param_names(&self) -> Vec<&str> {
        self.parameters
            .as_property_list()
            .map(|pairs| pairs.into_iter().map(|(k, _)| k).collect())
            .unwrap_or_default()
    }

    pub fn has_headers(&self) -> bool {
        self.headers.is_defined()
    }

    pub fn headers(&self) -> &ModelNode {
        &self.headers
    }

    /// The wire form: `operation` and `address` entries, parameters inlined
    /// at the top level, `operation-headers` only when present.
    pub fn to_node(&self) -> ModelNode {
        let mut node = ModelNode::object();
        node.insert(keys::OP, self.name.as_str());
        node.insert(keys::ADDRESS, self.address.to_node());
        if let Ok(params) = self.parameters.as_property_list() {
            let pairs: Vec<(String, ModelNode)> = params
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect();
            for (name, value) in pairs {
                node.insert(&name, value);
            }
        }
        if self.headers.is_defined() {
            node.insert(keys::OPERATION_HEADERS, self.headers.clone());
        }
        node
    }
}

impl fmt::Display for Operation {
    /// CLI-style rendering, e.g. `/subsystem=logging:read-resource(recursive=true)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.name)?;
        if let Ok(params) = self.parameters.as_property_list() {
            if !params.is_empty() {
                write!(f, "(")?;
                for (i, (name, value)) in params.into_iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{name}={value}")?;
                }
                write!(f, ")")?;
            }
        }
        Ok(())
    }
}

/// Incremental [`Operation`] construction.
pub struct OperationBuilder {
    operation: Operation,
}

impl OperationBuilder {
    pub fn param(mut self, name: &str, value: impl Into<ModelNode>) -> Self {
        self.operation.parameters.insert(name, value);
        self
    }

    /// Appends to a list-valued parameter.
    pub fn param_list_entry(mut self, name: &str, value: impl Into<ModelNode>) -> Self {
        self.operation.parameters.get_mut(name).push(value);
        self
    }

    /// Replaces all parameters with the given payload node.
    pub fn payload(mut self, payload: ModelNode) -> Self {
        self.operation.parameters = payload;
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<ModelNode>) -> Self {
        self.operation.headers.insert(name, value);
        self
    }

    /// Adds a role to the `roles` operation header.
    pub fn run_as(mut self, role: &str) -> Self {
        self.operation.headers.get_mut(keys::ROLES).push(role);
        self
    }

    pub fn build(self) -> Operation {
        self.operation
    }
}

/// An ordered batch of operations executed as one wire round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Composite {
    steps: Vec<Operation>,
}

impl Composite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, step: Operation) -> Self {
        self.steps.push(step);
        self
    }

    pub fn push(&mut self, step: Operation) {
        self.steps.push(step);
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn steps(&self) -> impl Iterator<Item = &Operation> {
        self.steps.iter()
    }

    /// The wire form: a `composite` operation at the root address whose
    /// `steps` parameter lists the step nodes in order.
    pub fn to_node(&self) -> ModelNode {
        let mut node = ModelNode::object();
        node.insert(keys::OP, keys::COMPOSITE);
        node.insert(keys::ADDRESS, ResourceAddress::root().to_node());
        let steps = node.get_mut(keys::STEPS);
        *steps = ModelNode::list();
        for step in &self.steps {
            steps.push(step.to_node());
        }
        node
    }
}

impl FromIterator<Operation> for Composite {
    fn from_iter<T: IntoIterator<Item = Operation>>(iter: T) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "composite[")?;
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{step}")?;
        }
        write!(f, "]")
    }
}

/// Per-step response envelopes of a composite, index-aligned with the steps
/// of the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositeResult {
    steps: Vec<ModelNode>,
}

impl CompositeResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Decodes the `step-1`, `step-2`, ... keyed result object. Missing step
    /// keys decode as undefined envelopes so indices never shift; the result
    /// always has exactly `step_count` entries.
    pub fn from_result_node(result: &ModelNode, step_count: usize) -> Self {
        let steps = (1..=step_count)
            .map(|i| result.get(&format!("step-{i}")).clone())
            .collect();
        Self { steps }
    }

    pub fn step(&self, index: usize) -> Option<&ModelNode> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelNode> {
        self.steps.iter()
    }

    /// Whether any step envelope reports a non-success outcome.
    pub fn any_step_failed(&self) -> bool {
        self.steps.iter().any(ModelNode::is_failure)
    }
}

impl std::ops::Index<usize> for CompositeResult {
    type Output = ModelNode;

    fn index(&self, index: usize) -> &Self::Output {
        &self.steps[index]
    }
}
