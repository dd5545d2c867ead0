//! Bearer token checks for the protected menu routes.
//!
//! Tokens are issued elsewhere; all we hold is the issuer's public key set.
//! A request is let through when its token verifies against one of those
//! keys, was minted for our audience by our issuer, and lists the required
//! permission in its `permissions` claim.

use std::collections::HashMap;
use std::fmt;

use actix_web::http::StatusCode;
use anyhow::{bail, Context, Result};
use err_derive::Error;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use log::*;
use serde::{Deserialize, Serialize};

pub const GET_DRINKS_DETAIL: &str = "get:drinks-detail";
pub const POST_DRINKS: &str = "post:drinks";
pub const PATCH_DRINKS: &str = "patch:drinks";
pub const DELETE_DRINKS: &str = "delete:drinks";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error(display = "{}", _0)]
    MissingHeader(&'static str),
    #[error(display = "{}", _0)]
    InvalidToken(&'static str),
    #[error(display = "{}", _0)]
    InvalidClaims(&'static str),
    #[error(display = "Permission not found.")]
    InsufficientScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub aud: Option<Audience>,
    pub exp: u64,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
}

/// Signing keys by key id.
#[derive(Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, (DecodingKey, Algorithm)>,
}

#[derive(Debug, Clone)]
pub struct Verifier {
    keys: KeySet,
    issuer: String,
    audience: String,
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InsufficientScope => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Pulls the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingHeader("Authorization header is expected."))?;
    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        (Some(scheme), _, _) if !scheme.eq_ignore_ascii_case("bearer") => Err(
            AuthError::MissingHeader("Authorization header must start with \"Bearer\"."),
        ),
        (_, None, _) => Err(AuthError::MissingHeader("Token not found.")),
        _ => Err(AuthError::MissingHeader(
            "Authorization header must be bearer token.",
        )),
    }
}

pub fn check_permissions(permission: &str, claims: &Claims) -> Result<(), AuthError> {
    let granted = claims
        .permissions
        .as_ref()
        .ok_or(AuthError::InvalidClaims("Permissions not included in JWT."))?;
    if !granted.iter().any(|p| p == permission) {
        return Err(AuthError::InsufficientScope);
    }
    Ok(())
}

fn algorithm_for(jwk: &Jwk) -> Result<Algorithm> {
    let alg = match &jwk.algorithm {
        AlgorithmParameters::RSA(_) => Algorithm::RS256,
        AlgorithmParameters::EllipticCurve(params) => match params.curve {
            EllipticCurve::P256 => Algorithm::ES256,
            EllipticCurve::P384 => Algorithm::ES384,
            ref other => bail!("unsupported curve {:?}", other),
        },
        AlgorithmParameters::OctetKeyPair(_) => Algorithm::EdDSA,
        AlgorithmParameters::OctetKey(_) => Algorithm::HS256,
        #[allow(unreachable_patterns)]
        _ => bail!("unsupported key type"),
    };
    Ok(alg)
}

impl KeySet {
    pub fn from_jwks(jwks: &JwkSet) -> Result<Self> {
        let mut keys = KeySet::default();
        for jwk in jwks.keys.iter() {
            let kid = match jwk.common.key_id.as_ref() {
                Some(kid) => kid,
                None => {
                    warn!("Skipping signing key without a key id");
                    continue;
                }
            };
            let alg = algorithm_for(jwk).with_context(|| format!("key {}", kid))?;
            let key = DecodingKey::from_jwk(jwk).with_context(|| format!("key {}", kid))?;
            keys.insert(kid.clone(), key, alg);
        }
        Ok(keys)
    }

    pub fn insert(&mut self, kid: impl Into<String>, key: DecodingKey, alg: Algorithm) {
        self.keys.insert(kid.into(), (key, alg));
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn get(&self, kid: &str) -> Option<&(DecodingKey, Algorithm)> {
        self.keys.get(kid)
    }
}

impl fmt::Debug for KeySet {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_set().entries(self.keys.keys()).finish()
    }
}

impl Verifier {
    pub fn new(keys: KeySet, issuer: &str, audience: &str) -> Self {
        Verifier {
            keys,
            issuer: issuer.to_string(),
            audience: audience.to_string(),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let header =
            decode_header(token).map_err(|_| AuthError::InvalidToken("Authorization malformed."))?;
        let kid = header
            .kid
            .ok_or(AuthError::InvalidToken("Authorization malformed."))?;
        let (key, alg) = self
            .keys
            .get(&kid)
            .ok_or(AuthError::InvalidToken("Unable to find the appropriate key."))?;

        let mut validation = Validation::new(*alg);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);

        match decode::<Claims>(token, key, &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => {
                debug!("Rejected token signed with {}: {}", kid, e);
                match e.kind() {
                    ErrorKind::ExpiredSignature => Err(AuthError::InvalidToken("Token expired.")),
                    ErrorKind::InvalidAudience | ErrorKind::InvalidIssuer => {
                        Err(AuthError::InvalidClaims(
                            "Incorrect claims. Please, check the audience and issuer.",
                        ))
                    }
                    _ => Err(AuthError::InvalidToken(
                        "Unable to parse authentication token.",
                    )),
                }
            }
        }
    }

    /// Checks an `Authorization` header value grants `permission`.
    pub fn authorize(&self, header: Option<&str>, permission: &str) -> Result<Claims, AuthError> {
        let token = bearer_token(header)?;
        let claims = self.verify(token)?;
        check_permissions(permission, &claims)?;
        debug!("Granted {} to {:?}", permission, claims.sub);
        Ok(claims)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    const SECRET: &[u8] = b"secret";
    const ISSUER: &str = "https://coffeeshop.example/";
    const AUDIENCE: &str = "drinks";

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_secs()
    }

    fn verifier() -> Verifier {
        let jwks: JwkSet =
            serde_json::from_str(r#"{"keys":[{"kty":"oct","kid":"k1","k":"c2VjcmV0"}]}"#)
                .expect("jwks");
        Verifier::new(KeySet::from_jwks(&jwks).expect("key set"), ISSUER, AUDIENCE)
    }

    fn sign(kid: Option<&str>, claims: serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = kid.map(str::to_string);
        encode(&header, &claims, &EncodingKey::from_secret(SECRET)).expect("encode")
    }

    fn claims(permissions: &[&str]) -> serde_json::Value {
        json!({
            "iss": ISSUER,
            "aud": AUDIENCE,
            "sub": "auth0|barista",
            "exp": now() + 3600,
            "permissions": permissions,
        })
    }

    #[test]
    fn bearer_token_requires_a_header() {
        assert_eq!(
            bearer_token(None),
            Err(AuthError::MissingHeader("Authorization header is expected."))
        );
    }

    #[test]
    fn bearer_token_accepts_any_case_scheme() {
        assert_eq!(bearer_token(Some("bearer abc")), Ok("abc"));
        assert_eq!(bearer_token(Some("Bearer abc")), Ok("abc"));
    }

    #[test]
    fn bearer_token_rejects_malformed_headers() {
        for header in &["Basic abc", "Bearer", "Bearer a b", ""] {
            let res = bearer_token(Some(header));
            assert!(
                matches!(res, Err(AuthError::MissingHeader(_))),
                "{:?} -> {:?}",
                header,
                res
            );
        }
    }

    #[test]
    fn permissions_are_a_membership_test() {
        let claims: Claims = serde_json::from_value(claims(&[POST_DRINKS])).expect("claims");

        assert_eq!(check_permissions(POST_DRINKS, &claims), Ok(()));
        assert_eq!(
            check_permissions(DELETE_DRINKS, &claims),
            Err(AuthError::InsufficientScope)
        );
    }

    #[test]
    fn absent_permissions_claim_is_invalid() {
        let mut claims: Claims = serde_json::from_value(claims(&[])).expect("claims");
        claims.permissions = None;

        assert!(matches!(
            check_permissions(POST_DRINKS, &claims),
            Err(AuthError::InvalidClaims(_))
        ));
    }

    #[test]
    fn authorize_accepts_a_good_token() {
        let token = sign(Some("k1"), claims(&[PATCH_DRINKS]));
        let header = format!("Bearer {}", token);

        let claims = verifier()
            .authorize(Some(&header), PATCH_DRINKS)
            .expect("authorized");

        assert_eq!(claims.sub.as_deref(), Some("auth0|barista"));
        assert_eq!(claims.aud, Some(Audience::One(AUDIENCE.to_string())));
    }

    #[test]
    fn authorize_reports_insufficient_scope_as_forbidden() {
        let token = sign(Some("k1"), claims(&[GET_DRINKS_DETAIL]));
        let header = format!("Bearer {}", token);

        let err = verifier()
            .authorize(Some(&header), DELETE_DRINKS)
            .expect_err("forbidden");

        assert_eq!(err, AuthError::InsufficientScope);
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn tokens_without_a_key_id_are_malformed() {
        let token = sign(None, claims(&[POST_DRINKS]));

        assert_eq!(
            verifier().verify(&token),
            Err(AuthError::InvalidToken("Authorization malformed."))
        );
    }

    #[test]
    fn tokens_from_unknown_keys_are_rejected() {
        let token = sign(Some("k2"), claims(&[POST_DRINKS]));

        assert_eq!(
            verifier().verify(&token),
            Err(AuthError::InvalidToken("Unable to find the appropriate key."))
        );
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let mut claims = claims(&[POST_DRINKS]);
        claims["exp"] = json!(now() - 3600);
        let token = sign(Some("k1"), claims);

        assert_eq!(
            verifier().verify(&token),
            Err(AuthError::InvalidToken("Token expired."))
        );
    }

    #[test]
    fn wrong_audience_is_an_invalid_claim() {
        let mut claims = claims(&[POST_DRINKS]);
        claims["aud"] = json!("someone-else");
        let token = sign(Some("k1"), claims);

        let err = verifier().verify(&token).expect_err("rejected");
        assert!(matches!(err, AuthError::InvalidClaims(_)), "{:?}", err);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn garbage_is_not_a_token() {
        let err = verifier().verify("not.a.token").expect_err("rejected");
        assert!(matches!(err, AuthError::InvalidToken(_)), "{:?}", err);
    }

    #[test]
    fn tampered_signatures_are_rejected() {
        let token = sign(Some("k1"), claims(&[POST_DRINKS]));
        let mut forged = token[..token.len() - 2].to_string();
        forged.push_str(if token.ends_with("AA") { "BB" } else { "AA" });

        assert_eq!(
            verifier().verify(&forged),
            Err(AuthError::InvalidToken(
                "Unable to parse authentication token."
            ))
        );
    }
}
