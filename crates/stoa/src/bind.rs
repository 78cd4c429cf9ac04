//! Input binding.
//!
//! Maps a raw request's fields into the handler's declared input shape:
//! query parameters first, then a JSON body, then path parameters, merged
//! into one object and deserialized. Scalars from path and query are
//! coerced by first reading them as JSON literals (so `:id` = `"123"` can
//! fill an integer field); if the coerced tree is rejected by the input
//! shape, the merge is retried with plain strings before the bind fails.
//!
//! [`Empty`] inputs short-circuit: binding is a no-op returning the zero
//! value without touching the request.

use crate::descriptor::RouteDescriptor;
use crate::error::BindError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::any::TypeId;
use stoa_core::Empty;
use stoa_engine::Exchange;

/// Produces the typed input for a request.
pub(crate) fn bind_input<In>(
    ex: &(dyn Exchange + '_),
    descriptor: &RouteDescriptor,
    handler: &str,
) -> Result<In, BindError>
where
    In: DeserializeOwned + 'static,
{
    let fail = |detail: String| {
        BindError::new(
            descriptor.path(),
            descriptor.method().clone(),
            handler,
            detail,
        )
    };

    if TypeId::of::<In>() == TypeId::of::<Empty>() {
        return serde_json::from_value(Value::Object(Map::new())).map_err(|e| fail(e.to_string()));
    }

    let mut coerced = Map::new();
    let mut raw = Map::new();

    for (key, value) in ex.query_pairs() {
        coerced.insert(key.clone(), coerce_scalar(&value));
        raw.insert(key, Value::String(value));
    }

    if has_json_body(ex) {
        match serde_json::from_slice::<Value>(ex.body()) {
            Ok(Value::Object(body)) => {
                for (key, value) in body {
                    coerced.insert(key.clone(), value.clone());
                    raw.insert(key, value);
                }
            }
            Ok(_) => return Err(fail("request body must be a JSON object".to_string())),
            Err(err) => return Err(fail(err.to_string())),
        }
    }

    for (key, value) in ex.path_params() {
        coerced.insert(key.clone(), coerce_scalar(value));
        raw.insert(key.clone(), Value::String(value.clone()));
    }

    match serde_json::from_value::<In>(Value::Object(coerced)) {
        Ok(input) => Ok(input),
        // A scalar that looked numeric may belong to a string field; retry
        // the merge with the raw strings before giving up.
        Err(first) => {
            serde_json::from_value::<In>(Value::Object(raw)).map_err(|_| fail(first.to_string()))
        }
    }
}

fn has_json_body(ex: &(dyn Exchange + '_)) -> bool {
    !ex.body().is_empty()
        && ex
            .content_type()
            .is_some_and(|ct| ct.split(';').next().unwrap_or("").trim().ends_with("json"))
}

/// Reads a path/query scalar as a JSON literal where possible.
fn coerce_scalar(text: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => value,
        _ => Value::String(text.to_string()),
    }
}
