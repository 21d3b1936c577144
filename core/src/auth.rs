//! Identity token decoding and the normalized user model.
//!
//! # Design
//! `parse_token` reads claims leniently: a missing or mistyped claim leaves
//! the matching field empty and never produces an error. Only the outer
//! `Jwt::decode` step can fail, and callers treat that as "signed out".
//! Signatures are not verified here.

use std::collections::BTreeMap;
use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

const GROUP_PREFIX: &str = "WASTE_PLUS_";
const LAST_AUTH_USER: &str = "LastAuthUser";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("No token found")]
    MissingToken,
    #[error("Error parsing token: {0}")]
    Malformed(String),
}

/// A decoded identity token.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Jwt {
    pub raw: String,
    pub payload: Map<String, Value>,
}

impl Jwt {
    /// Decode the claim set of a compact `header.payload.signature` token.
    pub fn decode(token: &str) -> Result<Self, AuthError> {
        let segment = token
            .split('.')
            .nth(1)
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| AuthError::Malformed("missing payload segment".to_string()))?;

        let bytes = URL_SAFE_NO_PAD
            .decode(segment.trim_end_matches('='))
            .map_err(|e| AuthError::Malformed(e.to_string()))?;
        let payload: Map<String, Value> =
            serde_json::from_slice(&bytes).map_err(|e| AuthError::Malformed(e.to_string()))?;

        Ok(Self {
            raw: token.to_string(),
            payload,
        })
    }

    pub fn from_claims(payload: Map<String, Value>) -> Self {
        Self {
            raw: String::new(),
            payload,
        }
    }

    fn claim_str(&self, name: &str) -> &str {
        self.payload.get(name).and_then(Value::as_str).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IdpProvider {
    Idir,
    BceidBusiness,
}

impl IdpProvider {
    pub const ALL: [IdpProvider; 2] = [IdpProvider::Idir, IdpProvider::BceidBusiness];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdpProvider::Idir => "IDIR",
            IdpProvider::BceidBusiness => "BCEIDBUSINESS",
        }
    }

    /// Match a provider claim case-insensitively.
    pub fn from_claim(claim: &str) -> Option<Self> {
        let upper = claim.to_uppercase();
        Self::ALL.into_iter().find(|provider| provider.as_str() == upper)
    }
}

impl fmt::Display for IdpProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Roles that can carry privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AppRole {
    Viewer,
    Submitter,
    District,
    Area,
    Admin,
}

impl AppRole {
    pub const ALL: [AppRole; 5] = [
        AppRole::Viewer,
        AppRole::Submitter,
        AppRole::District,
        AppRole::Area,
        AppRole::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppRole::Viewer => "VIEWER",
            AppRole::Submitter => "SUBMITTER",
            AppRole::District => "DISTRICT",
            AppRole::Area => "AREA",
            AppRole::Admin => "ADMIN",
        }
    }

    fn from_normalized(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.as_str() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleType {
    Concrete,
    Abstract,
}

/// Every role a user can hold, including the provider pseudo-roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "VIEWER")]
    Viewer,
    #[serde(rename = "SUBMITTER")]
    Submitter,
    #[serde(rename = "DISTRICT")]
    District,
    #[serde(rename = "AREA")]
    Area,
    #[serde(rename = "ADMIN")]
    Admin,
    #[serde(rename = "IDIR")]
    Idir,
    #[serde(rename = "BCeID")]
    Bceid,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Viewer,
        Role::Submitter,
        Role::District,
        Role::Area,
        Role::Admin,
        Role::Idir,
        Role::Bceid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "VIEWER",
            Role::Submitter => "SUBMITTER",
            Role::District => "DISTRICT",
            Role::Area => "AREA",
            Role::Admin => "ADMIN",
            Role::Idir => "IDIR",
            Role::Bceid => "BCeID",
        }
    }

    /// Exact, case-sensitive match on the role value.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.as_str() == value)
    }

    pub fn role_type(&self) -> RoleType {
        match self {
            Role::Viewer | Role::Submitter => RoleType::Abstract,
            _ => RoleType::Concrete,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamRole {
    pub role: Role,
    pub clients: Vec<String>,
}

/// Per-role grant: `None` is unrestricted, `Some(ids)` is scoped.
pub type Privileges = BTreeMap<AppRole, Option<Vec<String>>>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamLoginUser {
    pub provider_username: Option<String>,
    pub user_name: String,
    pub display_name: String,
    pub email: String,
    pub idp_provider: Option<IdpProvider>,
    pub roles: Vec<FamRole>,
    pub auth_token: Option<String>,
    pub exp: Option<i64>,
    pub privileges: Privileges,
    pub first_name: String,
    pub last_name: String,
    /// Group entries with the application prefix stripped, uppercased.
    pub authorities: Vec<String>,
}

impl FamLoginUser {
    /// Holds `role` itself or a scoped `role_<id>` variant of it.
    pub fn has_role(&self, role: &str) -> bool {
        let scoped = format!("{}_", role.to_uppercase());
        self.authorities
            .iter()
            .any(|authority| authority.eq_ignore_ascii_case(role) || authority.starts_with(&scoped))
    }

    pub fn has_concrete_role(&self, role: &str) -> bool {
        self.authorities
            .iter()
            .any(|authority| authority.eq_ignore_ascii_case(role))
    }

    pub fn has_abstract_role(&self, role_prefix: &str, client_id: &str) -> bool {
        let wanted = format!("{role_prefix}_{client_id}");
        self.authorities
            .iter()
            .any(|authority| authority.eq_ignore_ascii_case(&wanted))
    }

    pub fn has_idp_provider(&self, provider: &str) -> bool {
        IdpProvider::from_claim(provider).is_some_and(|wanted| self.idp_provider == Some(wanted))
    }

    /// Client ids across all roles, first occurrence order.
    pub fn clients(&self) -> Vec<String> {
        let mut clients: Vec<String> = Vec::new();
        for client in self.roles.iter().flat_map(|role| role.clients.iter()) {
            if !clients.contains(client) {
                clients.push(client.clone());
            }
        }
        clients
    }
}

fn normalize_group(entry: &str) -> String {
    let upper = entry.to_uppercase();
    match upper.strip_prefix(GROUP_PREFIX) {
        Some(rest) => rest.to_string(),
        None => upper,
    }
}

fn extract_groups(jwt: &Jwt) -> Vec<String> {
    jwt.payload
        .get("cognito:groups")
        .and_then(Value::as_array)
        .map(|groups| {
            groups
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Whether a non-empty suffix converts to a finite number under JavaScript
/// `Number()` rules: surrounding whitespace is ignored, a blank string is
/// zero, and `0x`/`0o`/`0b` prefixes select hex, octal and binary.
fn is_numeric(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return true;
    }

    let radix = match trimmed.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0o" | "0O") => Some(8),
        Some("0b" | "0B") => Some(2),
        _ => None,
    };
    match radix {
        Some(radix) => {
            let digits = &trimmed[2..];
            !digits.is_empty() && digits.chars().all(|c| c.is_digit(radix))
        }
        None => trimmed.parse::<f64>().is_ok_and(f64::is_finite),
    }
}

/// Build the privilege map from raw group entries.
pub fn parse_privileges(groups: &[String]) -> Privileges {
    let mut privileges = Privileges::new();
    for group in groups {
        let normalized = normalize_group(group);
        match normalized.rsplit_once('_') {
            Some((role_name, scope)) if is_numeric(scope) => {
                if let Some(role) = AppRole::from_normalized(role_name) {
                    privileges
                        .entry(role)
                        .or_insert(None)
                        .get_or_insert_with(Vec::new)
                        .push(scope.to_string());
                }
            }
            _ => {
                if let Some(role) = AppRole::from_normalized(&normalized) {
                    privileges.insert(role, None);
                }
            }
        }
    }
    privileges
}

/// Group entries into `(role, clients)` pairs, keeping first-seen order.
pub fn extract_roles(groups: &[String]) -> Vec<FamRole> {
    let mut roles: Vec<FamRole> = Vec::new();
    for group in groups {
        let normalized = normalize_group(group);
        let mut parts = normalized.split('_');
        let Some(role) = parts.next().and_then(Role::parse) else {
            continue;
        };
        let client = parts.next().filter(|client| !client.is_empty());

        let index = match roles.iter().position(|entry| entry.role == role) {
            Some(index) => index,
            None => {
                roles.push(FamRole {
                    role,
                    clients: Vec::new(),
                });
                roles.len() - 1
            }
        };
        if let Some(client) = client {
            let clients = &mut roles[index].clients;
            if !clients.iter().any(|existing| existing == client) {
                clients.push(client.to_string());
            }
        }
    }
    roles
}

/// Split a display name into `(first, last)`.
///
/// `"Last, First Middle"` keeps only the first word after the comma.
/// `"First Last"` is split on the first spaces.
fn split_display_name(display_name: &str) -> (String, String) {
    if display_name.contains(',') {
        let mut parts = display_name.split(", ");
        let last = parts.next().unwrap_or_default().to_string();
        let first = parts
            .next()
            .and_then(|rest| rest.split(' ').next())
            .map(|first| first.trim().to_string())
            .unwrap_or_default();
        (first, last)
    } else {
        let mut parts = display_name.split(' ');
        let first = parts.next().unwrap_or_default().to_string();
        let last = parts.next().unwrap_or_default().to_string();
        (first, last)
    }
}

/// Normalize an identity token into a [`FamLoginUser`].
///
/// Returns `None` only when there is no token.
pub fn parse_token(token: Option<&Jwt>) -> Option<FamLoginUser> {
    let jwt = token?;

    let display_name = jwt.claim_str("custom:idp_display_name").to_string();
    let idp_provider = IdpProvider::from_claim(jwt.claim_str("custom:idp_name"));
    let (first_name, last_name) = split_display_name(&display_name);
    let user_name = jwt.claim_str("custom:idp_username").to_string();

    let groups = extract_groups(jwt);
    let mut roles = extract_roles(&groups);
    roles.push(FamRole {
        role: if idp_provider == Some(IdpProvider::Idir) {
            Role::Idir
        } else {
            Role::Bceid
        },
        clients: Vec::new(),
    });

    Some(FamLoginUser {
        provider_username: idp_provider.map(|provider| format!("{provider}\\{user_name}")),
        email: jwt.claim_str("email").to_string(),
        idp_provider,
        privileges: parse_privileges(&groups),
        authorities: groups.iter().map(|group| normalize_group(group)).collect(),
        roles,
        auth_token: Some(jwt.raw.clone()).filter(|raw| !raw.is_empty()),
        exp: jwt.payload.get("exp").and_then(Value::as_i64),
        display_name,
        user_name,
        first_name,
        last_name,
    })
}

/// Value of the first cookie whose name starts with `name`, or `""`.
pub fn get_cookie(cookies: &str, name: &str) -> String {
    cookies
        .split(';')
        .find(|cookie| cookie.trim().starts_with(name))
        .and_then(|cookie| cookie.split('=').nth(1))
        .unwrap_or_default()
        .to_string()
}

/// Find the identity token stored by the hosted login for `client_id`.
pub fn user_token_from_cookies(cookies: &str, client_id: &str) -> Option<String> {
    let base = format!("CognitoIdentityServiceProvider.{client_id}");
    let user = get_cookie(cookies, &format!("{base}.{LAST_AUTH_USER}"));
    if user.is_empty() {
        return None;
    }
    let user = urlencoding::encode(&user);
    Some(get_cookie(cookies, &format!("{base}.{user}.idToken"))).filter(|token| !token.is_empty())
}
