use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::repo_types::{NewUser, Role, User};

/// Request body for user registration. Fields are optional so missing input
/// is reported as a validation message instead of a decoder error.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "userType")]
    pub role: Option<String>,
}

impl TryFrom<RegisterRequest> for NewUser {
    type Error = String;

    fn try_from(req: RegisterRequest) -> Result<Self, Self::Error> {
        let role = match req.role.as_deref().map(str::trim) {
            None | Some("") => return Err("Please add a role".into()),
            Some(raw) => raw.parse::<Role>()?,
        };
        Ok(NewUser {
            name: req.name.unwrap_or_default(),
            email: req.email.unwrap_or_default(),
            password: req.password.unwrap_or_default(),
            role,
        })
    }
}

/// Request body for login.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Returned by register and login; the refresh token travels in a cookie.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub access_token: String,
}

impl AuthResponse {
    pub fn new(user: User, access_token: String) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            access_token,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
