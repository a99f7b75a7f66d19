use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AuthError, OAuthProvider};
use crate::security::config::AuthConfig;

pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;
pub const REFRESH_TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;

const ACCESS_AUDIENCE: &str = "authenticated";
const ACCESS_ROLE: &str = "authenticated";
const ACCESS_AAL: &str = "aal1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// A claim set that knows which token type it belongs to.
pub trait TypedClaims: Serialize + DeserializeOwned {
    const TYPE: TokenType;

    fn token_type(&self) -> TokenType;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub jti: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub role: String,
    pub aud: String,
    pub aal: String,
    pub custom_roles: Vec<String>,
    pub permissions: Vec<String>,
    pub provider: OAuthProvider,
}

impl AccessTokenClaims {
    pub fn has_role(&self, role: &str) -> bool {
        self.custom_roles.iter().any(|r| r == role)
    }
}

impl TypedClaims for AccessTokenClaims {
    const TYPE: TokenType = TokenType::Access;

    fn token_type(&self) -> TokenType {
        self.token_type
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub jti: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub provider: OAuthProvider,
    pub family_id: String,
}

impl TypedClaims for RefreshTokenClaims {
    const TYPE: TokenType = TokenType::Refresh;

    fn token_type(&self) -> TokenType {
        self.token_type
    }
}

/// HS256 signer/verifier for session tokens. Pure: no storage lookups.
#[derive(Clone)]
pub struct JwtManager {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    kid: String,
    access_ttl: i64,
    refresh_ttl: i64,
}

impl JwtManager {
    pub fn new(access_secret: &[u8], refresh_secret: &[u8], kid: impl Into<String>) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret),
            access_decoding: DecodingKey::from_secret(access_secret),
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
            kid: kid.into(),
            access_ttl: ACCESS_TOKEN_TTL_SECS,
            refresh_ttl: REFRESH_TOKEN_TTL_SECS,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.jwt_secret.as_bytes(),
            config.jwt_refresh_secret.as_bytes(),
            config.jwt_kid.clone(),
        )
        .with_ttls(config.access_token_ttl_secs, config.refresh_token_ttl_secs)
    }

    pub fn with_ttls(mut self, access_ttl: i64, refresh_ttl: i64) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    pub fn access_claims(
        &self,
        user_id: &str,
        provider: OAuthProvider,
        roles: Vec<String>,
        permissions: Vec<String>,
        now: i64,
    ) -> AccessTokenClaims {
        AccessTokenClaims {
            jti: Uuid::new_v4().to_string(),
            sub: user_id.to_string(),
            iat: now,
            exp: now + self.access_ttl,
            token_type: TokenType::Access,
            role: ACCESS_ROLE.to_string(),
            aud: ACCESS_AUDIENCE.to_string(),
            aal: ACCESS_AAL.to_string(),
            custom_roles: roles,
            permissions,
            provider,
        }
    }

    pub fn refresh_claims(
        &self,
        user_id: &str,
        provider: OAuthProvider,
        family_id: &str,
        now: i64,
    ) -> RefreshTokenClaims {
        RefreshTokenClaims {
            jti: Uuid::new_v4().to_string(),
            sub: user_id.to_string(),
            iat: now,
            exp: now + self.refresh_ttl,
            token_type: TokenType::Refresh,
            provider,
            family_id: family_id.to_string(),
        }
    }

    pub fn issue<C: TypedClaims>(&self, claims: &C) -> Result<String, AuthError> {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.kid.clone());
        let key = match C::TYPE {
            TokenType::Access => &self.access_encoding,
            TokenType::Refresh => &self.refresh_encoding,
        };
        encode(&header, claims, key).map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Fails with [`AuthError::InvalidToken`] on a bad signature, malformed
    /// claims, a passed `exp`, or a `type` other than `C::TYPE`.
    pub fn verify<C: TypedClaims>(&self, token: &str) -> Result<C, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        let key = match C::TYPE {
            TokenType::Access => {
                validation.set_audience(&[ACCESS_AUDIENCE]);
                &self.access_decoding
            }
            TokenType::Refresh => {
                validation.validate_aud = false;
                &self.refresh_decoding
            }
        };

        let claims = decode::<C>(token, key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?
            .claims;
        if claims.token_type() != C::TYPE {
            return Err(AuthError::InvalidToken(format!(
                "expected {:?} token, got {:?}",
                C::TYPE,
                claims.token_type()
            )));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::decode_header;
    use time::OffsetDateTime;

    fn manager() -> JwtManager {
        JwtManager::new(b"test-secret", b"test-secret", "kid-1")
    }

    fn now() -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }

    #[test]
    fn refresh_token_carries_subject_and_family() {
        let jwt = manager();
        let claims = jwt.refresh_claims("U1", OAuthProvider::Bnet, "F1", now());
        let token = jwt.issue(&claims).unwrap();

        let decoded: RefreshTokenClaims = jwt.verify(&token).unwrap();
        assert_eq!(decoded.token_type, TokenType::Refresh);
        assert_eq!(decoded.sub, "U1");
        assert_eq!(decoded.family_id, "F1");
        assert_eq!(decoded.provider, OAuthProvider::Bnet);
        assert_eq!(decoded, claims);
    }

    #[test]
    fn header_embeds_kid_and_algorithm() {
        let jwt = manager();
        let token = jwt
            .issue(&jwt.access_claims("U1", OAuthProvider::Discord, vec![], vec![], now()))
            .unwrap();
        let header = decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::HS256);
        assert_eq!(header.kid.as_deref(), Some("kid-1"));
        assert_eq!(header.typ.as_deref(), Some("JWT"));
    }

    #[test]
    fn expiry_arithmetic() {
        let jwt = manager();
        let iat = now();
        let access = jwt.access_claims("U1", OAuthProvider::Bnet, vec![], vec![], iat);
        let refresh = jwt.refresh_claims("U1", OAuthProvider::Bnet, "F1", iat);
        assert_eq!(access.exp - access.iat, 900);
        assert_eq!(refresh.exp - refresh.iat, 2_592_000);
    }

    #[test]
    fn access_claims_carry_roles_and_permissions() {
        let jwt = manager();
        let claims = jwt.access_claims(
            "U1",
            OAuthProvider::Bnet,
            vec!["officer".into()],
            vec!["roster:write".into()],
            now(),
        );
        let token = jwt.issue(&claims).unwrap();
        let decoded: AccessTokenClaims = jwt.verify(&token).unwrap();
        assert_eq!(decoded.aud, "authenticated");
        assert_eq!(decoded.role, "authenticated");
        assert_eq!(decoded.aal, "aal1");
        assert!(decoded.has_role("officer"));
        assert_eq!(decoded.permissions, vec!["roster:write".to_string()]);
    }

    #[test]
    fn wrong_type_is_rejected() {
        let jwt = manager();
        let access = jwt
            .issue(&jwt.access_claims("U1", OAuthProvider::Bnet, vec![], vec![], now()))
            .unwrap();
        let refresh = jwt
            .issue(&jwt.refresh_claims("U1", OAuthProvider::Bnet, "F1", now()))
            .unwrap();

        assert!(matches!(
            jwt.verify::<RefreshTokenClaims>(&access),
            Err(AuthError::InvalidToken(_))
        ));
        assert!(matches!(
            jwt.verify::<AccessTokenClaims>(&refresh),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn mislabelled_type_claim_is_rejected() {
        let jwt = manager();
        let mut claims = jwt.refresh_claims("U1", OAuthProvider::Bnet, "F1", now());
        claims.token_type = TokenType::Access;
        let token = jwt.issue(&claims).unwrap();
        assert!(matches!(
            jwt.verify::<RefreshTokenClaims>(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn bad_signature_is_rejected() {
        let jwt = manager();
        let other = JwtManager::new(b"other-secret", b"other-secret", "kid-1");
        let token = other
            .issue(&other.refresh_claims("U1", OAuthProvider::Bnet, "F1", now()))
            .unwrap();
        assert!(matches!(
            jwt.verify::<RefreshTokenClaims>(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let jwt = manager();
        let issued_at = now() - REFRESH_TOKEN_TTL_SECS - 10;
        let token = jwt
            .issue(&jwt.refresh_claims("U1", OAuthProvider::Bnet, "F1", issued_at))
            .unwrap();
        assert!(matches!(
            jwt.verify::<RefreshTokenClaims>(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let jwt = manager();
        assert!(matches!(
            jwt.verify::<RefreshTokenClaims>("not.a.jwt"),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn issued_jtis_are_unique() {
        let jwt = manager();
        let n = now();
        let a = jwt.refresh_claims("U1", OAuthProvider::Bnet, "F1", n);
        let b = jwt.refresh_claims("U1", OAuthProvider::Bnet, "F1", n);
        let c = jwt.access_claims("U1", OAuthProvider::Bnet, vec![], vec![], n);
        assert_ne!(a.jti, b.jti);
        assert_ne!(a.jti, c.jti);
    }
}
