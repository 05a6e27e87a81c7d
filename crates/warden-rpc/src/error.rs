use jsonrpsee::types::ErrorObject;
use serde_json::json;
use warden_core::error::WardenError;

/// Map a domain error onto a JSON-RPC error object. The wire shape in the
/// `data` field mirrors §6's `{code, message, details?}` envelope even
/// though jsonrpsee's own `code`/`message` fields carry the JSON-RPC
/// framing — adapters reading `data` get the stable dotted code without
/// parsing the human-readable message.
pub fn to_rpc_error(err: WardenError) -> ErrorObject<'static> {
    let code = err.code();
    let http_status = err.http_status();
    let message = err.to_string();
    ErrorObject::owned(
        -32000,
        message,
        Some(json!({"code": code, "http_status": http_status})),
    )
}

pub fn invalid_params(msg: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(-32602, msg.into(), None::<()>)
}
