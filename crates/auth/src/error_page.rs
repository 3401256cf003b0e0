//! The enumerated error surface shown after a failed sign-in or a denied access.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorPage {
    /// Server-side misconfiguration or an unavailable identity store.
    Configuration,
    /// Authenticated, but the held role does not satisfy the required one.
    AccessDenied {
        required_role: Option<String>,
        held_role: Option<String>,
    },
    /// A verification link was expired or already used.
    Verification,
    Default,
}

/// Query parameters of the error surface (`?error=..&requiredRole=..&userRole=..`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorQuery {
    pub error: Option<String>,
    pub required_role: Option<String>,
    pub user_role: Option<String>,
}

impl ErrorPage {
    pub fn access_denied(required: impl Into<String>, held: Option<String>) -> Self {
        ErrorPage::AccessDenied {
            required_role: Some(required.into()),
            held_role: held,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ErrorPage::Configuration => "Configuration",
            ErrorPage::AccessDenied { .. } => "AccessDenied",
            ErrorPage::Verification => "Verification",
            ErrorPage::Default => "Default",
        }
    }

    /// User-facing message. Carries role names only.
    pub fn message(&self) -> String {
        match self {
            ErrorPage::Configuration => {
                "There is a problem with the server configuration. Contact your administrator.".to_string()
            }
            ErrorPage::AccessDenied {
                required_role: Some(required),
                held_role: Some(held),
            } => format!(
                "Access denied. This page requires the '{required}' role, but you are signed in as '{held}'."
            ),
            ErrorPage::AccessDenied {
                required_role: Some(required),
                held_role: None,
            } => format!("Access denied. This page requires the '{required}' role."),
            ErrorPage::AccessDenied { .. } => "You do not have permission to access this page.".to_string(),
            ErrorPage::Verification => {
                "The sign-in link is no longer valid. It may have been used already or it may have expired."
                    .to_string()
            }
            ErrorPage::Default => "An unexpected authentication error occurred.".to_string(),
        }
    }

    pub fn to_query(&self) -> ErrorQuery {
        let (required_role, user_role) = match self {
            ErrorPage::AccessDenied { required_role, held_role } => (required_role.clone(), held_role.clone()),
            _ => (None, None),
        };
        ErrorQuery {
            error: Some(self.kind().to_string()),
            required_role,
            user_role,
        }
    }

    /// Percent-encoded query string, e.g. `error=AccessDenied&requiredRole=admin&userRole=DOE`.
    pub fn query_string(&self) -> String {
        let query = self.to_query();
        let mut parts = Vec::with_capacity(3);
        if let Some(error) = &query.error {
            parts.push(format!("error={}", urlencoding::encode(error)));
        }
        if let Some(required) = &query.required_role {
            parts.push(format!("requiredRole={}", urlencoding::encode(required)));
        }
        if let Some(held) = &query.user_role {
            parts.push(format!("userRole={}", urlencoding::encode(held)));
        }
        parts.join("&")
    }
}

impl From<&ErrorQuery> for ErrorPage {
    fn from(query: &ErrorQuery) -> Self {
        match query.error.as_deref() {
            Some("Configuration") => ErrorPage::Configuration,
            Some("AccessDenied") => ErrorPage::AccessDenied {
                required_role: query.required_role.clone().filter(|r| !r.is_empty()),
                held_role: query.user_role.clone().filter(|r| !r.is_empty()),
            },
            Some("Verification") => ErrorPage::Verification,
            _ => ErrorPage::Default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_denied_query_carries_both_roles() {
        let page = ErrorPage::access_denied("admin", Some("DOE".to_string()));
        assert_eq!(page.query_string(), "error=AccessDenied&requiredRole=admin&userRole=DOE");
        let message = page.message();
        assert!(message.contains("'admin'"));
        assert!(message.contains("'DOE'"));
    }

    #[test]
    fn role_names_are_percent_encoded() {
        let page = ErrorPage::access_denied("admin", Some("Night Shift".to_string()));
        assert!(page.query_string().ends_with("userRole=Night%20Shift"));
    }

    #[test]
    fn query_round_trips_into_page() {
        let page = ErrorPage::access_denied("DOE", Some("dispatcher".to_string()));
        assert_eq!(ErrorPage::from(&page.to_query()), page);
    }

    #[test]
    fn unknown_kinds_fall_back_to_default() {
        let query = ErrorQuery {
            error: Some("Bogus".to_string()),
            ..Default::default()
        };
        assert_eq!(ErrorPage::from(&query), ErrorPage::Default);
        assert_eq!(ErrorPage::from(&ErrorQuery::default()), ErrorPage::Default);
    }

    #[test]
    fn each_kind_has_a_distinct_message() {
        let messages = [
            ErrorPage::Configuration.message(),
            ErrorPage::AccessDenied { required_role: None, held_role: None }.message(),
            ErrorPage::Verification.message(),
            ErrorPage::Default.message(),
        ];
        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
