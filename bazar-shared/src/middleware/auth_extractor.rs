use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::errors::{AppError, ErrorCode};
use crate::types::auth::{AuthUser, Claims};

/// Verify an HS256 token and return its claims.
///
/// One routine for every entry point: the REST extractor below and the
/// Socket.IO handshake both go through here.
pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::new(ErrorCode::TokenExpired, "token has expired")
        }
        _ => AppError::new(ErrorCode::TokenInvalid, format!("invalid token: {e}")),
    })?;

    if token_data.claims.is_expired() {
        return Err(AppError::new(ErrorCode::TokenExpired, "token has expired"));
    }

    Ok(token_data.claims)
}

/// Token secret carried in request extensions, inserted by the service
/// router so REST requests verify against the same configured secret as the
/// socket handshake.
#[derive(Clone)]
pub struct JwtSecret(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)?;
        let secret = match parts.extensions.get::<JwtSecret>() {
            Some(secret) => secret.0.clone(),
            None => std::env::var("JWT_SECRET")
                .unwrap_or_else(|_| "development-secret-change-in-production".to_string()),
        };
        let claims = decode_claims(&token, &secret)?;

        Ok(AuthUser::from(claims))
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "missing authorization header"))?
        .to_str()
        .map_err(|_| AppError::new(ErrorCode::Unauthorized, "invalid authorization header"))?;

    if !auth_header.starts_with("Bearer ") {
        return Err(AppError::new(ErrorCode::Unauthorized, "authorization header must use Bearer scheme"));
    }

    Ok(auth_header[7..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::auth::UserRole;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    fn make_token(claims: &Claims, secret: &str) -> String {
        encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn roundtrip_token() {
        let secret = "test-secret";
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, UserRole::User, 3600);
        let token = make_token(&claims, secret);

        let decoded = decode_claims(&token, secret).unwrap();
        assert_eq!(decoded.sub, user_id);
        assert_eq!(decoded.jti, claims.jti);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let claims = Claims::new(Uuid::new_v4(), UserRole::User, 3600);
        let token = make_token(&claims, "secret-a");

        let err = decode_claims(&token, "secret-b").unwrap_err();
        assert_eq!(err.code_str(), ErrorCode::TokenInvalid.code());
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = Claims::new(Uuid::new_v4(), UserRole::User, -600);
        let token = make_token(&claims, "test-secret");

        let err = decode_claims(&token, "test-secret").unwrap_err();
        assert_eq!(err.code_str(), ErrorCode::TokenExpired.code());
    }

    #[test]
    fn bearer_scheme_required() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", "Token abc".parse().unwrap());
        assert!(extract_bearer_token(&headers).is_err());

        headers.insert("Authorization", "Bearer abc".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc");
    }

    #[tokio::test]
    async fn extractor_verifies_against_the_request_scoped_secret() {
        let secret = "service-config-secret";
        let claims = Claims::new(Uuid::new_v4(), UserRole::User, 3600);
        let token = make_token(&claims, secret);

        // The secret differs from the env default, so extraction only
        // succeeds if the extension-carried secret is the one consulted.
        let mut req = axum::http::Request::builder()
            .header("Authorization", format!("Bearer {token}"))
            .body(())
            .unwrap();
        req.extensions_mut().insert(JwtSecret(secret.to_string()));
        let (mut parts, _) = req.into_parts();

        let user = AuthUser::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(user.id, claims.sub);
    }

    #[tokio::test]
    async fn extractor_rejects_token_not_matching_the_scoped_secret() {
        let claims = Claims::new(Uuid::new_v4(), UserRole::User, 3600);
        let token = make_token(&claims, "some-other-secret");

        let mut req = axum::http::Request::builder()
            .header("Authorization", format!("Bearer {token}"))
            .body(())
            .unwrap();
        req.extensions_mut()
            .insert(JwtSecret("service-config-secret".to_string()));
        let (mut parts, _) = req.into_parts();

        let err = AuthUser::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(err.code_str(), ErrorCode::TokenInvalid.code());
    }
}
