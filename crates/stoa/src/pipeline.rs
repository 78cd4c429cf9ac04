//! Pipeline step construction.
//!
//! Builds the opaque steps a route's chain is made of: the main action
//! step (bind, validate, call, render) and the decorator wrapper. The
//! identity gate lives in [`crate::identify`]. Every step is closed over
//! its route descriptor and the process-wide error-mode settings; steps are
//! immutable after the registry freezes and run concurrently for
//! arbitrarily many requests.

use crate::bind::bind_input;
use crate::decorate::DecoratorFn;
use crate::descriptor::{IdentityDescriptor, RouteDescriptor};
use crate::error::BindError;
use crate::respond::{render_output, ErrorCodec, Respond, ResponseMode};
use http::StatusCode;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use stoa_core::{
    Context, ErrorMode, Fault, FaultBody, FaultKind, FaultResult, Identity, Validate,
};
use stoa_engine::{step, Exchange, Step};

use crate::identify::IDENTITY_KEY;
use crate::registry::Settings;

/// One registration under a route key, waiting for the freeze pass.
///
/// Decorator names stay unresolved until [`crate::Registry::freeze`] so
/// decorators may be added to the table after the handlers that reference
/// them; resolution still happens entirely at startup.
pub(crate) struct RouteRecord {
    pub(crate) descriptor: Arc<RouteDescriptor>,
    pub(crate) mode: Arc<ResponseMode>,
    pub(crate) identity: Option<IdentityDescriptor>,
    pub(crate) decorators: Vec<String>,
    pub(crate) main: Step,
}

/// Writes a fault using the route's declared codec.
///
/// Structured routes serialize the fault body with their own codec;
/// everything else degrades to a status-only response.
pub(crate) fn write_fault(
    ex: &mut (dyn Exchange + '_),
    fault: &Fault,
    mode: ErrorMode,
    codec: ErrorCodec,
) {
    let status = fault.status();
    let Some(body) = fault.to_body(mode) else {
        ex.set_status(status);
        return;
    };

    write_fault_body(ex, status, &body, codec);
}

fn write_fault_body(
    ex: &mut (dyn Exchange + '_),
    status: StatusCode,
    body: &FaultBody,
    codec: ErrorCodec,
) {
    let value = match serde_json::to_value(body) {
        Ok(value) => value,
        Err(err) => {
            tracing::error!(error = %err, "fault body serialization failed");
            ex.set_status(status);
            return;
        }
    };

    let written = match codec {
        ErrorCodec::Json => ex.write_json(status, &value),
        ErrorCodec::PureJson => ex.write_pure_json(status, &value),
        ErrorCodec::Xml => ex.write_xml(status, &value),
        ErrorCodec::StatusOnly => {
            ex.set_status(status);
            Ok(())
        }
    };

    if let Err(err) = written {
        tracing::error!(error = %err, "fault body write failed");
        ex.set_status(status);
    }
}

/// Writes a binding failure: 422, with diagnostic detail in development
/// mode only.
fn write_bind_error(
    ex: &mut (dyn Exchange + '_),
    err: &BindError,
    mode: ErrorMode,
    codec: ErrorCodec,
) {
    tracing::warn!(error = %err, "request binding failed");

    match mode {
        ErrorMode::Production => ex.set_status(StatusCode::UNPROCESSABLE_ENTITY),
        ErrorMode::Development => {
            let fault = Fault::unprocessable(err.to_string());
            let body = FaultBody {
                message: fault.message().to_string(),
                key: FaultKind::UnprocessableEntity.key().to_string(),
                stack: fault.stack().map(ToString::to_string),
            };
            write_fault_body(ex, StatusCode::UNPROCESSABLE_ENTITY, &body, codec);
        }
    }
}

/// Builds the main action step: bind, validate, call the business
/// function, render its output.
pub(crate) fn main_step<In, Out, H, Fut>(
    action: Arc<H>,
    descriptor: Arc<RouteDescriptor>,
    mode: Arc<ResponseMode>,
    settings: Arc<Settings>,
    handler: Arc<str>,
) -> Step
where
    In: DeserializeOwned + Validate + Send + 'static,
    Out: Respond,
    H: Fn(Context, In) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FaultResult<Out>> + Send + 'static,
{
    step(move |ex| {
        let action = Arc::clone(&action);
        let descriptor = Arc::clone(&descriptor);
        let mode = Arc::clone(&mode);
        let settings = Arc::clone(&settings);
        let handler = Arc::clone(&handler);

        Box::pin(async move {
            let error_mode = settings.error_mode();
            let codec = mode.error_codec();

            let input = match bind_input::<In>(&*ex, &descriptor, &handler) {
                Ok(input) => input,
                Err(err) => {
                    write_bind_error(ex, &err, error_mode, codec);
                    ex.abort();
                    return;
                }
            };

            // A failed validation always aborts; invalid inputs never reach
            // business code.
            if let Err(fault) = input.validate() {
                tracing::warn!(route = ex.route(), error = %fault, "input validation failed");
                write_fault(ex, &fault, error_mode, codec);
                ex.abort();
                return;
            }

            let identity = ex
                .value(IDENTITY_KEY)
                .and_then(|value| serde_json::from_value::<Identity>(value.clone()).ok());
            let ctx = Context::new(ex.method().clone(), ex.route(), ex.path())
                .with_headers(ex.headers().clone())
                .with_identity(identity)
                .with_values(ex.values().clone());
            let request_id = ctx.request_id();

            match action(ctx, input).await {
                Ok(out) => {
                    if let Err(fault) = render_output(&mode, &descriptor, out, ex) {
                        tracing::error!(
                            %request_id,
                            route = ex.route(),
                            error = %fault,
                            "response rendering failed"
                        );
                        write_fault(ex, &fault, error_mode, codec);
                        ex.abort();
                    }
                }
                Err(fault) => {
                    tracing::warn!(
                        %request_id,
                        route = ex.route(),
                        error = %fault,
                        "handler returned a fault"
                    );
                    write_fault(ex, &fault, error_mode, codec);
                    ex.abort();
                }
            }
        })
    })
}

/// Wraps a resolved decorator as a chain step.
pub(crate) fn decorator_step(
    name: Arc<str>,
    decorate: DecoratorFn,
    mode: Arc<ResponseMode>,
    settings: Arc<Settings>,
) -> Step {
    step(move |ex| {
        let name = Arc::clone(&name);
        let decorate = Arc::clone(&decorate);
        let mode = Arc::clone(&mode);
        let settings = Arc::clone(&settings);

        Box::pin(async move {
            if let Err(fault) = decorate(&mut *ex).await {
                tracing::warn!(decorator = %name, error = %fault, "decorator aborted the chain");
                write_fault(ex, &fault, settings.error_mode(), mode.error_codec());
                ex.abort();
            }
        })
    })
}
