//! Async client for the DMR management protocol.
//!
//! Management operations are trees in a compact binary encoding, exchanged
//! as base64 text over HTTP. This crate provides the value model
//! ([`ModelNode`], [`Operation`], [`Composite`]), the wire codec, and the
//! [`Dispatcher`] that executes operations against a management endpoint:
//! transport selection, response classification, composite batching,
//! process-state detection and bounded polling.
//!
//! ```no_run
//! use dmr_client::{Dispatcher, Endpoints, Operation, ResourceAddress};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let dispatcher = Dispatcher::new(Endpoints::new("http://localhost:9990/management"));
//! let operation = Operation::builder("read-resource", ResourceAddress::parse("/subsystem=logging")?)
//!     .param("recursive", true)
//!     .build();
//! let result = dispatcher.execute(&operation).await?;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod dispatch;
pub mod error;
pub mod model;

pub use crate::dispatch::{
    download_url, download_url_for_path, Dispatcher, DomainStrategy, Endpoints, NoopStrategy,
    PollAttempt, Poller, ProcessState, ProcessStateStrategy, RequiredState, ServerState,
    StandaloneStrategy, POLL_INTERVAL,
};
pub use crate::error::{DispatchError, PollError, UrlError};
pub use crate::model::{
    Composite, CompositeResult, ModelNode, ModelType, Operation, OperationBuilder,
    ResourceAddress,
};
