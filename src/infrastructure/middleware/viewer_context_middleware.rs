// ViewerContext Middleware - creates the request-scoped viewer and injects it into extensions

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::infrastructure::database::DatabaseInterface;
use crate::infrastructure::security::parse_authorization;
use crate::infrastructure::viewer::ViewerContext;

/// Trait for application state that can resolve tokens to users
pub trait HasDatabase {
    fn database(&self) -> &Arc<dyn DatabaseInterface>;
}

/// Resolve the `Authorization` header into a ViewerContext.
/// No header means an anonymous viewer; a malformed or unknown token is rejected with 401.
pub async fn viewer_context_middleware<T>(
    State(app_state): State<T>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError>
where
    T: HasDatabase + Clone + Send + Sync + 'static,
{
    let token = extract_token(request.headers())?;
    let viewer_context = create_viewer_context(app_state.database().as_ref(), token).await?;

    let span = tracing::info_span!(
        "request",
        request_id = %viewer_context.request_id,
        user_id = viewer_context.user_id(),
    );
    request.extensions_mut().insert(Arc::new(viewer_context));

    Ok(next.run(request).instrument(span).await)
}

fn extract_token(headers: &HeaderMap) -> AppResult<Option<String>> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid token header.".to_string()))?;
    parse_authorization(value)
        .map(|token| Some(token.to_string()))
        .ok_or_else(|| AppError::Unauthorized("Invalid token header.".to_string()))
}

async fn create_viewer_context(
    db: &dyn DatabaseInterface,
    token: Option<String>,
) -> AppResult<ViewerContext> {
    let request_id = format!("req-{}", Uuid::new_v4());
    match token {
        Some(token) => {
            let user = db
                .get_user_by_token(&token)
                .await?
                .ok_or_else(|| AppError::Unauthorized("Invalid token.".to_string()))?;
            debug!(user_id = user.id, "Authenticated request");
            Ok(ViewerContext::authenticated(user, request_id))
        }
        None => Ok(ViewerContext::anonymous(request_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_token_variants() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers).unwrap(), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Token abc123"));
        assert_eq!(extract_token(&headers).unwrap(), Some("abc123".to_string()));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(extract_token(&headers).unwrap(), Some("xyz".to_string()));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert!(matches!(
            extract_token(&headers),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_token_is_rejected() {
        let db = crate::infrastructure::SqliteDatabase::new_in_memory()
            .await
            .unwrap();
        let result = create_viewer_context(&db, Some("missing".into())).await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));

        let anonymous = create_viewer_context(&db, None).await.unwrap();
        assert!(!anonymous.is_authenticated());
        assert!(anonymous.request_id.starts_with("req-"));
    }
}
