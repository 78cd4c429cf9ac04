//! Identity gate.
//!
//! Routes whose documentation carries an `@authorize` line get an identity
//! gate prepended to their chain. The gate invokes the externally supplied
//! identifier function with the request and the required roles and
//! permissions; the identifier decides authentication and authorization on
//! its own. A returned fault maps to 401/403 (anything else degrades to
//! 500) and aborts the chain; a returned [`Identity`] is stored under
//! [`IDENTITY_KEY`] for later steps and the handler context.

use crate::descriptor::IdentityDescriptor;
use http::StatusCode;
use std::sync::Arc;
use stoa_core::{FaultKind, FaultResult, Identity};
use stoa_engine::{step, BoxFuture, Exchange, Step};

/// Request-scoped key under which the gate stores the caller's identity.
pub const IDENTITY_KEY: &str = "identity";

/// The externally supplied authentication/authorization function.
///
/// Receives the request view, the required roles, and the required
/// permissions. Returning `Err(Fault::unauthorized(..))` or
/// `Err(Fault::forbidden(..))` maps to the matching status.
pub type IdentifierFn = Arc<
    dyn for<'a> Fn(
            &'a (dyn Exchange + 'a),
            &'a [String],
            &'a [String],
        ) -> BoxFuture<'a, FaultResult<Identity>>
        + Send
        + Sync,
>;

/// Wraps a boxed-future closure as an [`IdentifierFn`].
pub fn identifier<F>(f: F) -> IdentifierFn
where
    F: for<'a> Fn(
            &'a (dyn Exchange + 'a),
            &'a [String],
            &'a [String],
        ) -> BoxFuture<'a, FaultResult<Identity>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Builds the gate step for a protected route.
pub(crate) fn gate_step(descriptor: Arc<IdentityDescriptor>, identify: IdentifierFn) -> Step {
    step(move |ex| {
        let descriptor = Arc::clone(&descriptor);
        let identify = Arc::clone(&identify);
        Box::pin(async move {
            let outcome = identify(&*ex, descriptor.roles(), descriptor.permissions()).await;
            match outcome {
                Ok(identity) => {
                    if let Ok(value) = serde_json::to_value(&identity) {
                        ex.set_value(IDENTITY_KEY, value);
                    }
                }
                Err(fault) => {
                    let status = match fault.kind() {
                        FaultKind::Unauthorized => StatusCode::UNAUTHORIZED,
                        FaultKind::Forbidden => StatusCode::FORBIDDEN,
                        _ => StatusCode::INTERNAL_SERVER_ERROR,
                    };
                    tracing::warn!(
                        route = ex.route(),
                        status = status.as_u16(),
                        "identification failed"
                    );
                    ex.set_status(status);
                    ex.abort();
                }
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor;
    use http::Method;
    use serde_json::json;
    use stoa_core::Fault;
    use stoa_engine::loopback::LoopbackExchange;

    fn protected() -> Arc<IdentityDescriptor> {
        let parsed = descriptor::parse("@authorize(admin:::read)\n[GET] /x 200 json", "handler")
            .unwrap();
        Arc::new(parsed.identity.unwrap())
    }

    #[tokio::test]
    async fn test_success_stores_identity() {
        let gate = gate_step(
            protected(),
            identifier(|_ex, roles, permissions| {
                let roles = roles.to_vec();
                let permissions = permissions.to_vec();
                Box::pin(async move {
                    assert_eq!(roles, ["admin"]);
                    assert_eq!(permissions, ["read"]);
                    let mut identity = Identity::new();
                    identity.insert("subject", json!("user-1"));
                    Ok(identity)
                })
            }),
        );

        let mut ex = LoopbackExchange::new(Method::GET, "/x");
        gate(&mut ex).await;

        assert!(!ex.is_aborted());
        let stored = ex.value(IDENTITY_KEY).unwrap();
        assert_eq!(stored["subject"], json!("user-1"));
    }

    #[tokio::test]
    async fn test_unauthorized_aborts_with_401() {
        let gate = gate_step(
            protected(),
            identifier(|_ex, _roles, _permissions| {
                Box::pin(async move { Err(Fault::unauthorized("no token")) })
            }),
        );

        let mut ex = LoopbackExchange::new(Method::GET, "/x");
        gate(&mut ex).await;

        assert!(ex.is_aborted());
        let response = ex.into_response();
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_forbidden_maps_to_403() {
        let gate = gate_step(
            protected(),
            identifier(|_ex, _roles, _permissions| {
                Box::pin(async move { Err(Fault::forbidden("wrong role")) })
            }),
        );

        let mut ex = LoopbackExchange::new(Method::GET, "/x");
        gate(&mut ex).await;

        let response = ex.into_response();
        assert_eq!(response.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_other_faults_degrade_to_500() {
        let gate = gate_step(
            protected(),
            identifier(|_ex, _roles, _permissions| {
                Box::pin(async move { Err(Fault::internal("directory down")) })
            }),
        );

        let mut ex = LoopbackExchange::new(Method::GET, "/x");
        gate(&mut ex).await;

        let response = ex.into_response();
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
