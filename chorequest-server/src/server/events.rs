use std::convert::Infallible;

use axum::Extension;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use chorequest_shared::api::ServerEvent;
use chorequest_shared::auth::Role;
use chorequest_shared::jwt::JwtClaims;
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use super::AppState;
use super::auth::AuthCtx;

/// Streams change events to the caller until the client disconnects or the
/// server shuts down. Events carry just enough for clients to know what to
/// refetch; they are not a transcript of state.
pub(crate) async fn api_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.subscribe_events();
    let claims = auth.claims.clone();
    let shutdown = state.shutdown_token();

    let stream = BroadcastStream::new(rx)
        .filter_map(move |item| {
            let out = match item {
                Ok(ev) if visible_to(&claims, &ev) => encode_event(&ev),
                // Lagged receivers lose events; clients resync on the next one.
                _ => None,
            };
            async move { out }
        })
        .take_until(shutdown.cancelled_owned())
        .map(Ok::<Event, Infallible>);

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Parents see every event. Children only see events scoped to their own
/// child id; the pending-approvals counter is a parent concern.
fn visible_to(claims: &JwtClaims, ev: &ServerEvent) -> bool {
    match claims.role {
        Role::Parent => true,
        Role::Child => match ev {
            ServerEvent::LedgerUpdated { child_id, .. }
            | ServerEvent::ActivityAdded { child_id } => {
                claims.child_id.as_deref() == Some(child_id.as_str())
            }
            ServerEvent::PendingCount { .. } => false,
        },
    }
}

fn encode_event(ev: &ServerEvent) -> Option<Event> {
    match serde_json::to_string(ev) {
        Ok(json) => Some(Event::default().data(json)),
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize server event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role, child_id: Option<&str>) -> JwtClaims {
        JwtClaims {
            sub: "user".into(),
            jti: "jti".into(),
            exp: i64::MAX / 2,
            role,
            child_id: child_id.map(str::to_string),
            family_id: "fam".into(),
        }
    }

    #[test]
    fn parent_sees_everything() {
        let c = claims(Role::Parent, None);
        assert!(visible_to(&c, &ServerEvent::PendingCount { count: 3 }));
        assert!(visible_to(
            &c,
            &ServerEvent::LedgerUpdated {
                child_id: "ala".into(),
                balance: 10,
                level: 1,
            }
        ));
        assert!(visible_to(
            &c,
            &ServerEvent::ActivityAdded {
                child_id: "ala".into()
            }
        ));
    }

    #[test]
    fn child_sees_only_own_events() {
        let c = claims(Role::Child, Some("ala"));
        assert!(visible_to(
            &c,
            &ServerEvent::LedgerUpdated {
                child_id: "ala".into(),
                balance: 10,
                level: 1,
            }
        ));
        assert!(!visible_to(
            &c,
            &ServerEvent::LedgerUpdated {
                child_id: "ola".into(),
                balance: 10,
                level: 1,
            }
        ));
        assert!(!visible_to(&c, &ServerEvent::PendingCount { count: 1 }));
        assert!(!visible_to(
            &c,
            &ServerEvent::ActivityAdded {
                child_id: "ola".into()
            }
        ));
    }

    #[test]
    fn events_encode_with_type_tag() {
        let ev = ServerEvent::PendingCount { count: 2 };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"type\":\"pending_count\""));
        assert!(encode_event(&ev).is_some());
    }
}
