//! Session role model

use std::fmt;

/// Role of the signed-in principal as far as the dashboard is concerned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionRole {
    /// Auth check still in flight
    #[default]
    Unknown,
    /// Signed out, or signed in without the admin role
    None,
    Admin,
}

impl SessionRole {
    const ADMIN_ROLE_NAME: &'static str = "admin";

    /// Map a role name from the roles table; anything but `admin` is denied.
    pub fn from_role_name(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            Some(Self::ADMIN_ROLE_NAME) => Self::Admin,
            _ => Self::None,
        }
    }

    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unknown => "unknown",
            Self::None => "none",
            Self::Admin => "admin",
        };
        f.write_str(label)
    }
}
