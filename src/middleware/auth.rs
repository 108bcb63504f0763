use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, FromRequest, HttpMessage, HttpRequest,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;

use crate::models::User;
use crate::services::auth_service::{verify_token, Claims};
use crate::state::AppState;
use crate::utils::AppError;

fn app_state(req: &HttpRequest) -> Result<&web::Data<AppState>, AppError> {
    req.app_data::<web::Data<AppState>>()
        .ok_or_else(|| AppError::Internal("Application state missing".to_string()))
}

/// Claims of the bearer token, if any. A present but malformed or expired token is an error.
pub fn token_claims(req: &HttpRequest) -> Result<Option<Claims>, AppError> {
    let Some(header_value) = req.headers().get(actix_web::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let token = header_value
        .to_str()
        .ok()
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid token format".to_string()))?;

    verify_token(token, &app_state(req)?.config.jwt).map(Some)
}

/// Holds verified claims against the stored account. The stored role wins over the signed one.
pub fn check_account(mut claims: Claims, account: Option<User>) -> Result<Claims, AppError> {
    let user = account.ok_or_else(|| AppError::Unauthorized("Account no longer exists".to_string()))?;
    if !user.is_active {
        return Err(AppError::Forbidden("Account is inactive".to_string()));
    }
    claims.role = user.role;
    claims.email = user.email;
    Ok(claims)
}

/// Resolves the caller: token first, then the account it names.
pub async fn authenticate(req: &HttpRequest) -> Result<Option<Claims>, AppError> {
    // Already resolved by AuthMiddleware for this request
    let resolved = req.extensions().get::<Claims>().cloned();
    if resolved.is_some() {
        return Ok(resolved);
    }

    let Some(claims) = token_claims(req)? else {
        return Ok(None);
    };
    let account = app_state(req)?.find_account(&claims.sub).await?;
    check_account(claims, account).map(Some)
}

pub fn require_admin(claims: &Claims) -> Result<(), AppError> {
    if claims.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Admin access required".to_string()))
    }
}

async fn signed_in(req: &HttpRequest, admin_only: bool) -> Result<Claims, AppError> {
    let claims = authenticate(req)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Missing authorization token".to_string()))?;
    if admin_only {
        require_admin(&claims)?;
    }
    Ok(claims)
}

/// Rejects requests without a valid token; optionally requires the admin role.
pub struct AuthMiddleware {
    admin_only: bool,
}

impl AuthMiddleware {
    pub fn authenticated() -> Self {
        Self { admin_only: false }
    }

    pub fn admin() -> Self {
        Self { admin_only: true }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
            admin_only: self.admin_only,
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    admin_only: bool,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let admin_only = self.admin_only;

        Box::pin(async move {
            let checked = signed_in(req.request(), admin_only).await;
            match checked {
                Ok(claims) => {
                    req.extensions_mut().insert(claims);
                    service.call(req).await
                }
                Err(e) => {
                    log::warn!("🔒 {} {} rejected: {}", req.method(), req.path(), e);
                    Err(e.into())
                }
            }
        })
    }
}

/// Claims of the caller when a valid token was sent; anonymous otherwise.
pub struct MaybeUser(pub Option<Claims>);

impl MaybeUser {
    /// Private entries are visible to any active signed-in account
    pub fn can_see_private(&self) -> bool {
        self.0.is_some()
    }
}

impl FromRequest for MaybeUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move { authenticate(&req).await.map(MaybeUser) })
    }
}

/// Signed-in admin; 401 without a token, 403 for other roles or inactive accounts.
pub struct AdminUser(pub Claims);

impl FromRequest for AdminUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move { signed_in(&req, true).await.map(AdminUser) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::state::test_account;
    use actix_web::test::TestRequest;

    async fn request_with(accounts: Vec<User>, header: Option<String>) -> HttpRequest {
        let state = AppState::for_tests_with(accounts).await;
        let mut req = TestRequest::default().app_data(web::Data::new(state));
        if let Some(h) = header {
            req = req.insert_header(("Authorization", h));
        }
        req.to_http_request()
    }

    #[actix_web::test]
    async fn no_header_is_anonymous() {
        let req = request_with(Vec::new(), None).await;
        assert!(token_claims(&req).unwrap().is_none());
        assert!(authenticate(&req).await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn bearer_token_yields_claims() {
        let (user, bearer) = test_account("reader@archive.org", Role::User);
        let req = request_with(vec![user], Some(bearer)).await;
        let claims = authenticate(&req).await.unwrap().unwrap();
        assert_eq!(claims.email, "reader@archive.org");
        assert!(!claims.is_admin());
    }

    #[actix_web::test]
    async fn malformed_header_is_rejected() {
        let req = request_with(Vec::new(), Some("Token abc".into())).await;
        assert!(matches!(token_claims(&req), Err(AppError::Unauthorized(_))));

        let req = request_with(Vec::new(), Some("Bearer not-a-jwt".into())).await;
        assert!(matches!(authenticate(&req).await, Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn stored_account_overrides_claims() {
        let (mut user, _) = test_account("clerk@archive.org", Role::Admin);
        let claims = Claims {
            sub: user.id_hex(),
            email: "old@archive.org".into(),
            role: Role::Admin,
            iat: 0,
            exp: 0,
            jti: "jti".into(),
            aud: "archive-api".into(),
            iss: "constitutional-archive".into(),
        };

        assert!(matches!(check_account(claims.clone(), None), Err(AppError::Unauthorized(_))));

        user.role = Role::User;
        let demoted = check_account(claims.clone(), Some(user.clone())).unwrap();
        assert_eq!(demoted.role, Role::User);
        assert_eq!(demoted.email, "clerk@archive.org");
        assert!(require_admin(&demoted).is_err());

        user.is_active = false;
        assert!(matches!(check_account(claims, Some(user)), Err(AppError::Forbidden(_))));
    }

    #[actix_web::test]
    async fn deleted_or_inactive_accounts_are_rejected() {
        let (_, gone_bearer) = test_account("gone@archive.org", Role::Admin);
        let req = request_with(Vec::new(), Some(gone_bearer)).await;
        let err = MaybeUser::from_request(&req, &mut Payload::None).await.err().unwrap();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let (mut inactive, bearer) = test_account("inactive@archive.org", Role::Admin);
        inactive.is_active = false;
        let req = request_with(vec![inactive], Some(bearer)).await;
        let err = AdminUser::from_request(&req, &mut Payload::None).await.err().unwrap();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = MaybeUser::from_request(&req, &mut Payload::None).await.err().unwrap();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[actix_web::test]
    async fn admin_extractor_uses_stored_role() {
        let (user, bearer) = test_account("reader@archive.org", Role::User);
        let req = request_with(vec![user], Some(bearer)).await;
        let err = AdminUser::from_request(&req, &mut Payload::None).await.err().unwrap();
        assert!(matches!(err, AppError::Forbidden(_)));

        let (admin, bearer) = test_account("admin@archive.org", Role::Admin);
        let req = request_with(vec![admin.clone()], Some(bearer.clone())).await;
        assert!(AdminUser::from_request(&req, &mut Payload::None).await.is_ok());

        // Token still says admin, the stored account no longer does
        let mut demoted = admin;
        demoted.role = Role::User;
        let req = request_with(vec![demoted], Some(bearer)).await;
        let err = AdminUser::from_request(&req, &mut Payload::None).await.err().unwrap();
        assert!(matches!(err, AppError::Forbidden(_)));

        let req = request_with(Vec::new(), None).await;
        let err = AdminUser::from_request(&req, &mut Payload::None).await.err().unwrap();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
