use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::{authorize, AccessRule};
use crate::app::AppState;
use crate::errors::AppError;
use crate::jwt::authenticate;

/// Middleware state: the app state plus the rule declared for the route group.
#[derive(Clone)]
pub struct Gate {
    state: AppState,
    rule: Arc<AccessRule>,
}

pub fn gate(state: &AppState, rule: AccessRule) -> Gate {
    Gate {
        state: state.clone(),
        rule: Arc::new(rule),
    }
}

/// Authenticates the caller, loads its principal and checks the route's rule.
///
/// Use with `axum::middleware::from_fn_with_state(gate(&state, rule), enforce)`.
pub async fn enforce(State(gate): State<Gate>, mut req: Request, next: Next) -> Result<Response, AppError> {
    let user = authenticate(&gate.state.pool, &gate.state.jwt, req.headers()).await?;
    let principal = gate.state.acl().principal(&user).await?;

    authorize(&principal, &gate.rule).await?;

    req.extensions_mut().insert(user);
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}
