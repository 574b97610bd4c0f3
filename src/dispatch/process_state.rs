//! Detection of reload/restart side effects in successful responses.
//!
//! A change to the management model can leave one or more managed processes
//! in a state where the change only takes effect after a reload or restart.
//! The server reports this through response headers, in a shape that depends
//! on the topology: a standalone process carries a `response-headers` object
//! directly in the envelope, a managed domain nests per-server headers under
//! `server-groups`. A strategy is selected once per session; [`NoopStrategy`]
//! stands in before the topology is known.

use std::fmt;

use tracing::trace;

use crate::model::{keys, ModelNode};

// ====================================================================== types

/// The attention a managed process requires after a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredState {
    ReloadRequired,
    RestartRequired,
}

impl RequiredState {
    /// Parses the `process-state` response header value. Values other than
    /// the two attention states (e.g. `running`) yield `None`.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            keys::RELOAD_REQUIRED => Some(RequiredState::ReloadRequired),
            keys::RESTART_REQUIRED => Some(RequiredState::RestartRequired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequiredState::ReloadRequired => keys::RELOAD_REQUIRED,
            RequiredState::RestartRequired => keys::RESTART_REQUIRED,
        }
    }
}

impl fmt::Display for RequiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One managed process that needs a reload or restart. Equality covers all
/// four fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerState {
    pub server_group: Option<String>,
    pub host: Option<String>,
    pub server: String,
    pub state: RequiredState,
}

impl ServerState {
    /// The single process of a standalone installation.
    pub fn standalone(state: RequiredState) -> Self {
        Self {
            server_group: None,
            host: None,
            server: "standalone".to_string(),
            state,
        }
    }

    /// A server inside a managed domain.
    pub fn domain(
        server_group: impl Into<String>,
        host: impl Into<String>,
        server: impl Into<String>,
        state: RequiredState,
    ) -> Self {
        Self {
            server_group: Some(server_group.into()),
            host: Some(host.into()),
            server: server.into(),
            state,
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.server_group, &self.host) {
            (Some(group), Some(host)) => {
                write!(f, "{group}/{host}/{}: {}", self.server, self.state)
            }
            _ => write!(f, "{}: {}", self.server, self.state),
        }
    }
}

/// The set of processes one response reported as needing attention, unique
/// by full [`ServerState`] identity. Empty means nothing needs attention.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessState {
    states: Vec<ServerState>,
}

impl ProcessState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a state unless an equal one is already present.
    pub fn insert(&mut self, state: ServerState) {
        if !self.states.contains(&state) {
            self.states.push(state);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServerState> {
        self.states.iter()
    }
}

impl IntoIterator for ProcessState {
    type Item = ServerState;
    type IntoIter = std::vec::IntoIter<ServerState>;

    fn into_iter(self) -> Self::IntoIter {
        self.states.into_iter()
    }
}

// ================================================================= strategies

/// Topology-specific extraction of process state from a response envelope.
///
/// `accepts` probes whether the envelope has the shape this strategy
/// understands without committing to a walk; `process` is a pure function
/// of the envelope.
pub trait ProcessStateStrategy {
    fn accepts(&self, response: &ModelNode) -> bool;
    fn process(&self, response: &ModelNode) -> ProcessState;
}

/// Accepts nothing. Used before the remote topology is known.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStrategy;

impl ProcessStateStrategy for NoopStrategy {
    fn accepts(&self, _response: &ModelNode) -> bool {
        false
    }

    fn process(&self, _response: &ModelNode) -> ProcessState {
        ProcessState::new()
    }
}

/// Standalone installation: the envelope carries `response-headers` directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandaloneStrategy;

impl ProcessStateStrategy for StandaloneStrategy {
    fn accepts(&self, response: &ModelNode) -> bool {
        response.has_defined(keys::RESPONSE_HEADERS)
    }

    fn process(&self, response: &ModelNode) -> ProcessState {
        let mut process_state = ProcessState::new();
        let header = response
            .get(keys::RESPONSE_HEADERS)
            .get(keys::PROCESS_STATE);
        if let Ok(value) = header.as_str() {
            if let Some(state) = RequiredState::from_wire(value) {
                trace!("standalone process reported {state}");
                process_state.insert(ServerState::standalone(state));
            }
        }
        process_state
    }
}

/// Managed domain: per-server headers are nested under
/// `server-groups.<group>.host.<host>.<server>.response.response-headers`.
///
/// The walk assumes exactly this nesting; an envelope with a different shape
/// yields an empty set rather than an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainStrategy;

impl ProcessStateStrategy for DomainStrategy {
    fn accepts(&self, response: &ModelNode) -> bool {
        response.has_defined(keys::SERVER_GROUPS)
    }

    fn process(&self, response: &ModelNode) -> ProcessState {
        let mut process_state = ProcessState::new();
        let groups = response.get(keys::SERVER_GROUPS);
        for (group, group_node) in groups.as_property_list().unwrap_or_default() {
            let hosts = group_node.get(keys::HOST);
            for (host, host_node) in hosts.as_property_list().unwrap_or_default() {
                for (server, server_node) in host_node.as_property_list().unwrap_or_default() {
                    let header = server_node
                        .get(keys::RESPONSE)
                        .get(keys::RESPONSE_HEADERS)
                        .get(keys::PROCESS_STATE);
                    if let Ok(value) = header.as_str() {
                        if let Some(state) = RequiredState::from_wire(value) {
                            trace!("server {group}/{host}/{server} reported {state}");
                            process_state.insert(ServerState::domain(group, host, server, state));
                        }
                    }
                }
            }
        }
        process_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standalone_response(state: &str) -> ModelNode {
        let mut headers = ModelNode::object();
        headers.insert(keys::PROCESS_STATE, state);
        let mut response = ModelNode::object();
        response.insert(keys::OUTCOME, keys::SUCCESS);
        response.insert(keys::RESULT, ModelNode::Undefined);
        response.insert(keys::RESPONSE_HEADERS, headers);
        response
    }

    fn domain_server(state: Option<&str>) -> ModelNode {
        let mut inner = ModelNode::object();
        inner.insert(keys::OUTCOME, keys::SUCCESS);
        if let Some(state) = state {
            let mut headers = ModelNode::object();
            headers.insert(keys::PROCESS_STATE, state);
            inner.insert(keys::RESPONSE_HEADERS, headers);
        }
        let mut server = ModelNode::object();
        server.insert(keys::RESPONSE, inner);
        server
    }

    fn domain_response() -> ModelNode {
        // main-server-group: two flagged servers on one host, one unflagged
        // on another.
        let mut primary = ModelNode::object();
        primary.insert("server-one", domain_server(Some(keys::RELOAD_REQUIRED)));
        primary.insert("server-two", domain_server(Some(keys::RELOAD_REQUIRED)));
        let mut secondary = ModelNode::object();
        secondary.insert("server-three", domain_server(None));

        let mut hosts = ModelNode::object();
        hosts.insert("primary", primary);
        hosts.insert("secondary", secondary);
        let mut group = ModelNode::object();
        group.insert(keys::HOST, hosts);
        let mut groups = ModelNode::object();
        groups.insert("main-server-group", group);

        let mut response = ModelNode::object();
        response.insert(keys::OUTCOME, keys::SUCCESS);
        response.insert(keys::SERVER_GROUPS, groups);
        response
    }

    #[test]
    fn standalone_detects_restart_required() {
        let response = standalone_response(keys::RESTART_REQUIRED);
        let strategy = StandaloneStrategy;
        assert!(strategy.accepts(&response));

        let state = strategy.process(&response);
        assert_eq!(state.len(), 1);
        let server = state.iter().next().unwrap();
        assert_eq!(server.state, RequiredState::RestartRequired);
        assert_eq!(server.server, "standalone");
        assert_eq!(server.server_group, None);
    }

    #[test]
    fn standalone_ignores_running_state() {
        let state = StandaloneStrategy.process(&standalone_response("running"));
        assert!(state.is_empty());
    }

    #[test]
    fn domain_walks_all_leaves() {
        let response = domain_response();
        let strategy = DomainStrategy;
        assert!(strategy.accepts(&response));
        assert!(!StandaloneStrategy.accepts(&response));

        let state = strategy.process(&response);
        assert_eq!(state.len(), 2);
        assert!(state
            .iter()
            .all(|s| s.state == RequiredState::ReloadRequired));
        assert!(state
            .iter()
            .any(|s| s.host.as_deref() == Some("primary") && s.server == "server-one"));
    }

    #[test]
    fn domain_walk_on_flat_tree_finds_nothing() {
        // Known edge case: the walk expects group -> host -> server nesting
        // and silently yields nothing when the tree is shallower.
        let mut groups = ModelNode::object();
        groups.insert("main-server-group", domain_server(Some(keys::RELOAD_REQUIRED)));
        let mut response = ModelNode::object();
        response.insert(keys::SERVER_GROUPS, groups);

        assert!(DomainStrategy.accepts(&response));
        assert!(DomainStrategy.process(&response).is_empty());
    }

    #[test]
    fn process_state_deduplicates_by_identity() {
        let mut state = ProcessState::new();
        state.insert(ServerState::standalone(RequiredState::ReloadRequired));
        state.insert(ServerState::standalone(RequiredState::ReloadRequired));
        state.insert(ServerState::standalone(RequiredState::RestartRequired));
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn noop_accepts_nothing() {
        let response = standalone_response(keys::RESTART_REQUIRED);
        assert!(!NoopStrategy.accepts(&response));
        assert!(NoopStrategy.process(&response).is_empty());
    }
}
