use crate::error::{AppError, AppResult};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Provider,
    Admin,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
    pub token_type: String,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expires_in: i64,
}

impl JwtService {
    pub fn new(secret: &str, access_expires_in: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_expires_in: access_expires_in,
        }
    }

    pub fn generate_access_token(&self, user_id: i64, role: Role) -> AppResult<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.access_token_expires_in);

        let claims = Claims {
            sub: user_id.to_string(),
            role,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            token_type: "access".to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(AppError::JwtError)
    }

    pub fn verify_access_token(&self, token: &str) -> AppResult<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(AppError::JwtError)?;

        if claims.token_type != "access" {
            return Err(AppError::AuthError("Invalid access token type".to_string()));
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_carries_role() {
        let jwt = JwtService::new("secret", 3600);
        let token = jwt.generate_access_token(42, Role::Provider).unwrap();
        let claims = jwt.verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.role, Role::Provider);
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let token = JwtService::new("a", 3600)
            .generate_access_token(1, Role::User)
            .unwrap();
        assert!(JwtService::new("b", 3600).verify_access_token(&token).is_err());
    }
}
