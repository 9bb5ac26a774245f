use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::{ready, Ready};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;

/// HS256 claims issued by the storefront's auth layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub exp: usize,
}

/// Recipient scope taken from a validated bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub Uuid);

/// Bearer token authentication for the notification routes
#[derive(Clone)]
pub struct JwtAuth {
    key: Arc<DecodingKey>,
}

impl JwtAuth {
    pub fn new(secret: &str) -> Self {
        Self {
            key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
        }
    }
}

fn authenticate(key: &DecodingKey, header: Option<&str>) -> Result<AuthenticatedUser, AppError> {
    let header =
        header.ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = header.strip_prefix("Bearer ").ok_or_else(|| {
        AppError::Unauthorized("Invalid Authorization header format".to_string())
    })?;

    let token_data = decode::<Claims>(token, key, &Validation::new(Algorithm::HS256)).map_err(
        |e| {
            tracing::warn!("JWT validation failed: {}", e);
            AppError::Unauthorized("Invalid token".to_string())
        },
    )?;

    let user_id = Uuid::parse_str(&token_data.claims.sub).map_err(|e| {
        tracing::warn!("Invalid user id in token: {}", e);
        AppError::Unauthorized("Invalid token: malformed user id".to_string())
    })?;

    Ok(AuthenticatedUser(user_id))
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = JwtAuthService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthService {
            service: Rc::new(service),
            key: self.key.clone(),
        }))
    }
}

pub struct JwtAuthService<S> {
    service: Rc<S>,
    key: Arc<DecodingKey>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let key = self.key.clone();

        Box::pin(async move {
            let header = req
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok());
            let user = authenticate(&key, header)?;

            req.extensions_mut().insert(user);

            service.call(req).await
        })
    }
}

impl actix_web::FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        match req.extensions().get::<AuthenticatedUser>() {
            Some(user) => ready(Ok(*user)),
            None => ready(Err(
                AppError::Unauthorized("User not authenticated".to_string()).into(),
            )),
        }
    }
}
