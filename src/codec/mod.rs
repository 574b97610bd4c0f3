//! Wire codec: the compact binary encoding of model trees and the
//! processors that turn raw HTTP payloads into response envelopes.

mod binary;
mod payload;

pub use self::binary::{decode, encode, from_base64, to_base64, DecodeError, EncodeError};
pub use self::payload::{
    json_to_node, process_dmr, process_upload, HttpMethod, APPLICATION_DMR_ENCODED,
    APPLICATION_JSON,
};
