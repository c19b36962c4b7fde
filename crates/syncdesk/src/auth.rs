// ── Bearer-token authentication ──
//
// Tokens resolve against a static table loaded from `[auth.tokens]`.
// They are held as secrets so the table never prints them. With an
// empty table every caller is anonymous; broadcast ingress still
// demands an identity and rejects them.

use std::collections::HashMap;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

use secrecy::{ExposeSecret, SecretString};
use syncdesk_core::Actor;

use crate::error::ApiError;

/// Header carrying the caller's browser-tab session.
pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Debug, Default)]
pub struct TokenTable {
    entries: Vec<(SecretString, Actor)>,
}

impl TokenTable {
    pub fn new(actors: HashMap<String, Actor>) -> Self {
        let entries = actors
            .into_iter()
            .map(|(token, actor)| (SecretString::from(token), actor))
            .collect();
        Self { entries }
    }

    pub fn is_open(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, token: &str) -> Option<&Actor> {
        self.entries
            .iter()
            .find(|(secret, _)| secret.expose_secret() == token)
            .map(|(_, actor)| actor)
    }

    /// Resolve the caller from the `Authorization` header, falling back to
    /// a `token` query parameter (EventSource cannot set headers).
    pub fn authenticate(
        &self,
        headers: &HeaderMap,
        query_token: Option<&str>,
    ) -> Result<Actor, ApiError> {
        let session = headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        if self.is_open() {
            return Ok(Actor {
                session_id: session,
                ..Actor::default()
            });
        }

        let token = bearer(headers).or(query_token).ok_or(ApiError::Unauthorized)?;
        let mut actor = self.lookup(token).cloned().ok_or(ApiError::Unauthorized)?;
        if session.is_some() {
            actor.session_id = session;
        }
        Ok(actor)
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(token.trim())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn table() -> TokenTable {
        TokenTable::new(HashMap::from([("tok-ana".to_owned(), Actor::new("u1", "Ana"))]))
    }

    #[test]
    fn bearer_header_resolves_the_actor() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok-ana"));
        headers.insert(SESSION_HEADER, HeaderValue::from_static("tab-1"));

        let actor = table().authenticate(&headers, None).expect("known token");
        assert_eq!(actor.user_id.as_deref(), Some("u1"));
        assert_eq!(actor.session_id.as_deref(), Some("tab-1"));
    }

    #[test]
    fn query_token_is_accepted() {
        let actor = table()
            .authenticate(&HeaderMap::new(), Some("tok-ana"))
            .expect("query token");
        assert_eq!(actor.user_name.as_deref(), Some("Ana"));
    }

    #[test]
    fn unknown_or_missing_tokens_are_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer nope"));
        assert!(matches!(
            table().authenticate(&headers, None),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            table().authenticate(&HeaderMap::new(), None),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn debug_output_hides_tokens() {
        let rendered = format!("{:?}", table());
        assert!(!rendered.contains("tok-ana"));
        assert!(rendered.contains("Ana"));
    }

    #[test]
    fn open_table_yields_anonymous_callers() {
        let actor = TokenTable::default()
            .authenticate(&HeaderMap::new(), None)
            .expect("open");
        assert_eq!(actor, Actor::default());
    }
}
