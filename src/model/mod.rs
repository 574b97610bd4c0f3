//! Value model for the management wire protocol: dynamically typed tree
//! nodes, resource addresses, operations and operation batches.

mod address;
mod node;
mod operation;

pub use self::address::{AddressError, ResourceAddress};
pub use self::node::{ModelNode, ModelType, TypeMismatch};
pub use self::operation::{Composite, CompositeResult, Operation, OperationBuilder};

/// Well-known keys of the management model.
pub mod keys {
    pub const ADDRESS: &str = "address";
    pub const COMPOSITE: &str = "composite";
    pub const FAILURE_DESCRIPTION: &str = "failure-description";
    pub const HOST: &str = "host";
    pub const OP: &str = "operation";
    pub const OPERATION_HEADERS: &str = "operation-headers";
    pub const OUTCOME: &str = "outcome";
    pub const PROCESS_STATE: &str = "process-state";
    pub const RELOAD_REQUIRED: &str = "reload-required";
    pub const RESPONSE: &str = "response";
    pub const RESPONSE_HEADERS: &str = "response-headers";
    pub const RESTART_REQUIRED: &str = "restart-required";
    pub const RESULT: &str = "result";
    pub const ROLES: &str = "roles";
    pub const SERVER_GROUPS: &str = "server-groups";
    pub const STEPS: &str = "steps";
    pub const SUCCESS: &str = "success";
}
