use super::{AppError, AppState, auth::AuthCtx};
use axum::response::Response;
use axum::{
    extract::{OriginalUri, State},
    http::{Method, Request},
    middleware::Next,
};
use chorequest_shared::auth::Role;
use chorequest_shared::jwt::JwtClaims;
use percent_encoding::percent_decode_str;

pub async fn enforce_acl(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|orig| orig.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().clone();
    let Some(auth) = req.extensions().get::<AuthCtx>() else {
        return Err(AppError::unauthorized());
    };
    let claims = &auth.claims;

    let segs = segmented(&path);
    let family_prefix = ["api", "v1", "family", state.config.family_id.as_str()];
    if !segs.as_slice().starts_with(&family_prefix) {
        tracing::warn!(?segs, "ACL: path outside family scope");
        return Err(AppError::forbidden());
    }
    let rest = &segs[family_prefix.len()..];

    let decision = match claims.role {
        Role::Parent => allow_parent(&method, rest),
        Role::Child => allow_child(&method, rest, claims),
    };

    if let Err(err) = decision {
        tracing::warn!(
            method = %method,
            path = %path,
            username = %claims.sub,
            role = ?claims.role,
            token_child = ?claims.child_id,
            "ACL: no rule matched; denying"
        );
        return Err(err);
    }

    Ok(next.run(req).await)
}

fn allow_parent(method: &Method, rest: &[&str]) -> Result<(), AppError> {
    match rest {
        ["children"] if *method == Method::GET => Ok(()),
        ["household", "progress"] if *method == Method::GET => Ok(()),
        ["children", _, "ledger"] if *method == Method::GET => Ok(()),
        ["children", _, "streak"] if *method == Method::GET => Ok(()),
        ["children", _, "achievements"] if *method == Method::GET => Ok(()),
        ["children", _, "tasks"] if *method == Method::GET || *method == Method::POST => Ok(()),
        ["children", _, "tasks", _, action]
            if *method == Method::POST && (action == &"approve" || action == &"reject") =>
        {
            Ok(())
        }
        ["children", _, "tasks", _, "help", "resolve"] if *method == Method::POST => Ok(()),
        ["children", _, "tasks", _] if *method == Method::DELETE => Ok(()),
        ["approvals"] if *method == Method::GET => Ok(()),
        ["rewards"] if *method == Method::GET || *method == Method::POST => Ok(()),
        ["rewards", _, "deactivate"] if *method == Method::POST => Ok(()),
        ["children", _, "redemptions"] if *method == Method::GET => Ok(()),
        ["redemptions"] if *method == Method::GET => Ok(()),
        ["redemptions", _, action]
            if *method == Method::POST && (action == &"approve" || action == &"reject") =>
        {
            Ok(())
        }
        ["notifications"] if *method == Method::GET => Ok(()),
        ["notifications", "count"] if *method == Method::GET => Ok(()),
        ["notifications", id, "read"] if *method == Method::POST && id.parse::<i32>().is_ok() => {
            Ok(())
        }
        ["activity"] if *method == Method::GET => Ok(()),
        ["events"] if *method == Method::GET => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

fn allow_child(method: &Method, rest: &[&str], claims: &JwtClaims) -> Result<(), AppError> {
    match rest {
        ["children", child, "ledger"] if *method == Method::GET => ensure_child(claims, child),
        ["children", child, "streak"] if *method == Method::GET => ensure_child(claims, child),
        ["children", child, "achievements"] if *method == Method::GET => {
            ensure_child(claims, child)
        }
        ["children", child, "tasks"] if *method == Method::GET => ensure_child(claims, child),
        ["children", child, "tasks", _, "complete"] if *method == Method::POST => {
            ensure_child(claims, child)
        }
        ["children", child, "tasks", _, "help"] if *method == Method::POST => {
            ensure_child(claims, child)
        }
        ["children", child, "tasks", _, "help", "resolve"] if *method == Method::POST => {
            ensure_child(claims, child)
        }
        ["rewards"] if *method == Method::GET => Ok(()),
        ["rewards", "suggest"] if *method == Method::POST => Ok(()),
        ["children", child, "redemptions"]
            if *method == Method::GET || *method == Method::POST =>
        {
            ensure_child(claims, child)
        }
        // Ownership of the redemption itself is checked in the handler.
        ["redemptions", _, "remind"] if *method == Method::POST => Ok(()),
        ["notifications"] if *method == Method::GET => Ok(()),
        ["notifications", "count"] if *method == Method::GET => Ok(()),
        ["notifications", id, "read"] if *method == Method::POST && id.parse::<i32>().is_ok() => {
            Ok(())
        }
        ["activity"] if *method == Method::GET => Ok(()),
        ["events"] if *method == Method::GET => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

fn segmented(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn decode(seg: &str) -> String {
    percent_decode_str(seg).decode_utf8_lossy().to_string()
}

fn ensure_child(claims: &JwtClaims, seg: &str) -> Result<(), AppError> {
    let expected = claims.child_id.as_ref().ok_or_else(AppError::forbidden)?;
    let provided = decode(seg);
    if expected == &provided {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}
