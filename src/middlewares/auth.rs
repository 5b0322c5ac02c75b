use crate::error::{AppError, AppResult};
use crate::utils::{JwtService, Role};
use actix_web::http::Method;
use actix_web::{
    Error, HttpMessage, HttpRequest,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use futures_util::future::LocalBoxFuture;
use std::future::{Ready, ready};

/// 通过认证的调用方，写入请求扩展
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_role(&self, role: Role) -> AppResult<()> {
        if self.role == role || self.is_admin() {
            Ok(())
        } else {
            Err(AppError::PermissionDenied)
        }
    }

    pub fn require_admin(&self) -> AppResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::PermissionDenied)
        }
    }
}

// 公开路径配置
struct PublicPaths {
    exact_paths: Vec<&'static str>,
    prefix_paths: Vec<&'static str>,
}

impl PublicPaths {
    fn new() -> Self {
        Self {
            // 完全匹配的公开路径
            exact_paths: vec!["/swagger-ui", "/swagger-ui/", "/api-docs/openapi.json"],
            // 前缀匹配的公开路径
            // 支付网关回调使用签名校验
            prefix_paths: vec!["/swagger-ui/", "/api-docs/", "/webhook/"],
        }
    }

    fn is_public_path(&self, path: &str) -> bool {
        // 检查完全匹配
        if self.exact_paths.contains(&path) {
            return true;
        }

        // 检查前缀匹配
        self.prefix_paths
            .iter()
            .any(|&prefix| path.starts_with(prefix))
    }
}

pub struct AuthMiddleware {
    jwt_service: JwtService,
}

impl AuthMiddleware {
    pub fn new(jwt_service: JwtService) -> Self {
        Self { jwt_service }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
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
            service,
            jwt_service: self.jwt_service.clone(),
            public_paths: PublicPaths::new(),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
    jwt_service: JwtService,
    public_paths: PublicPaths,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // 放行所有 CORS 预检请求
        if req.method() == Method::OPTIONS {
            let fut = self.service.call(req);
            return Box::pin(fut);
        }

        // 检查是否为公开路径
        let path = req.path();

        if self.public_paths.is_public_path(path) {
            let fut = self.service.call(req);
            return Box::pin(fut);
        }

        // 提取Authorization header
        let auth_header = req.headers().get("Authorization");

        let token = if let Some(auth_value) = auth_header {
            if let Ok(auth_str) = auth_value.to_str() {
                auth_str.strip_prefix("Bearer ")
            } else {
                None
            }
        } else {
            None
        };

        let jwt_service = self.jwt_service.clone();

        if let Some(token) = token {
            match jwt_service.verify_access_token(token) {
                Ok(claims) => match claims.sub.parse::<i64>() {
                    Ok(user_id) => {
                        req.extensions_mut().insert(AuthUser {
                            user_id,
                            role: claims.role,
                        });
                        let fut = self.service.call(req);
                        Box::pin(fut)
                    }
                    Err(_) => {
                        let error = AppError::AuthError("Invalid token subject".to_string());
                        Box::pin(async move { Err(error.into()) })
                    }
                },
                Err(_) => {
                    let error = AppError::AuthError("Invalid access token".to_string());
                    Box::pin(async move { Err(error.into()) })
                }
            }
        } else {
            let error = AppError::AuthError("Missing access token".to_string());
            Box::pin(async move { Err(error.into()) })
        }
    }
}

/// 处理器中获取当前调用方
pub fn current_user(req: &HttpRequest) -> AppResult<AuthUser> {
    req.extensions()
        .get::<AuthUser>()
        .copied()
        .ok_or_else(|| AppError::AuthError("Missing access token".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_paths() {
        let paths = PublicPaths::new();
        assert!(paths.is_public_path("/swagger-ui/index.html"));
        assert!(paths.is_public_path("/api-docs/openapi.json"));
        assert!(paths.is_public_path("/webhook/payments"));
        assert!(!paths.is_public_path("/api/v1/bookings"));
        assert!(!paths.is_public_path("/api/v1/admin/settings/tax_rate"));
    }

    #[test]
    fn test_role_checks() {
        let provider = AuthUser {
            user_id: 1,
            role: Role::Provider,
        };
        let admin = AuthUser {
            user_id: 2,
            role: Role::Admin,
        };
        assert!(provider.require_role(Role::Provider).is_ok());
        assert!(provider.require_admin().is_err());
        assert!(admin.require_role(Role::Provider).is_ok());
        assert!(admin.require_admin().is_ok());
    }
}
