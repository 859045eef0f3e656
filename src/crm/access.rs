//! Row-level access rules for contacts.
//!
//! Coarse endpoint authorization is an outer concern; this gate only decides whether a
//! given caller may touch a given contact.

use serde::{Deserialize, Serialize};

use crate::error::{CrmError, Result};
use crate::models::{Contact, ContactFilters};

/// Role as delivered by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    SuperAdmin,
    Admin,
    TaxPreparer,
    Affiliate,
    Client,
    Lead,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "SUPER_ADMIN",
            Self::Admin => "ADMIN",
            Self::TaxPreparer => "TAX_PREPARER",
            Self::Affiliate => "AFFILIATE",
            Self::Client => "CLIENT",
            Self::Lead => "LEAD",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "SUPER_ADMIN" | "SUPERADMIN" => Ok(Self::SuperAdmin),
            "ADMIN" => Ok(Self::Admin),
            "TAX_PREPARER" | "PREPARER" => Ok(Self::TaxPreparer),
            "AFFILIATE" => Ok(Self::Affiliate),
            "CLIENT" => Ok(Self::Client),
            "LEAD" => Ok(Self::Lead),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// Resolved identity of the caller. Each variant carries exactly the fields valid for it,
/// so a preparer without a preparer id cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessContext {
    SuperAdmin { user_id: String },
    Admin { user_id: String },
    TaxPreparer { user_id: String, preparer_id: String },
    /// Any other authenticated role. Endpoint-level rules decide what these may call.
    Member { user_id: String, role: UserRole },
}

impl AccessContext {
    /// Build a context from raw upstream identity.
    ///
    /// A TAX_PREPARER without a usable preparer id is a broken caller, reported as a
    /// configuration error rather than an access denial.
    pub fn resolve(user_id: &str, role: UserRole, preparer_id: Option<&str>) -> Result<Self> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(CrmError::Configuration("caller has no user id".into()));
        }
        let user_id = user_id.to_string();

        Ok(match role {
            UserRole::SuperAdmin => Self::SuperAdmin { user_id },
            UserRole::Admin => Self::Admin { user_id },
            UserRole::TaxPreparer => {
                let preparer_id = preparer_id
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| {
                        CrmError::Configuration(format!(
                            "TAX_PREPARER {} has no preparer id",
                            user_id
                        ))
                    })?;
                Self::TaxPreparer {
                    user_id,
                    preparer_id: preparer_id.to_string(),
                }
            }
            role => Self::Member { user_id, role },
        })
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self::Admin {
            user_id: user_id.into(),
        }
    }

    pub fn tax_preparer(user_id: impl Into<String>, preparer_id: impl Into<String>) -> Self {
        Self::TaxPreparer {
            user_id: user_id.into(),
            preparer_id: preparer_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Self::SuperAdmin { user_id }
            | Self::Admin { user_id }
            | Self::TaxPreparer { user_id, .. }
            | Self::Member { user_id, .. } => user_id,
        }
    }

    pub fn role(&self) -> UserRole {
        match self {
            Self::SuperAdmin { .. } => UserRole::SuperAdmin,
            Self::Admin { .. } => UserRole::Admin,
            Self::TaxPreparer { .. } => UserRole::TaxPreparer,
            Self::Member { role, .. } => *role,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::SuperAdmin { .. } | Self::Admin { .. })
    }
}

/// Decide whether `ctx` may read or write `contact`. Pure and deterministic.
pub fn check_contact_access(contact: &Contact, ctx: &AccessContext) -> Result<()> {
    match ctx {
        AccessContext::TaxPreparer { preparer_id, .. } => {
            if contact.assigned_preparer_id.as_deref() == Some(preparer_id.as_str()) {
                Ok(())
            } else {
                Err(CrmError::AccessDenied)
            }
        }
        _ => Ok(()),
    }
}

/// Gate for operations reserved to ADMIN and SUPER_ADMIN.
pub fn require_admin(ctx: &AccessContext) -> Result<()> {
    if ctx.is_admin() {
        Ok(())
    } else {
        Err(CrmError::AccessDenied)
    }
}

/// Narrow list filters to what the caller may see. A preparer always gets their own
/// assignment filter, whatever they asked for.
pub fn scope_filters(mut filters: ContactFilters, ctx: &AccessContext) -> ContactFilters {
    if let AccessContext::TaxPreparer { preparer_id, .. } = ctx {
        filters.assigned_preparer_id = Some(preparer_id.clone());
    }
    filters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact_assigned_to(preparer: Option<&str>) -> Contact {
        let mut c = Contact::new("A".into(), "B".into(), "ab@x.com".into());
        c.assigned_preparer_id = preparer.map(String::from);
        c
    }

    #[test]
    fn test_preparer_sees_only_assigned_contacts() {
        let ctx = AccessContext::tax_preparer("u1", "p1");
        assert!(check_contact_access(&contact_assigned_to(Some("p1")), &ctx).is_ok());
        assert!(matches!(
            check_contact_access(&contact_assigned_to(Some("p2")), &ctx),
            Err(CrmError::AccessDenied)
        ));
        assert!(matches!(
            check_contact_access(&contact_assigned_to(None), &ctx),
            Err(CrmError::AccessDenied)
        ));
    }

    #[test]
    fn test_other_roles_pass_the_gate() {
        let contact = contact_assigned_to(Some("p9"));
        for role in [UserRole::SuperAdmin, UserRole::Admin, UserRole::Client, UserRole::Affiliate] {
            let ctx = AccessContext::resolve("u1", role, None).unwrap();
            assert!(check_contact_access(&contact, &ctx).is_ok(), "{} denied", role);
        }
    }

    #[test]
    fn test_gate_is_deterministic() {
        let ctx = AccessContext::tax_preparer("u1", "p1");
        let contact = contact_assigned_to(Some("p2"));
        let first = check_contact_access(&contact, &ctx).is_ok();
        for _ in 0..10 {
            assert_eq!(check_contact_access(&contact, &ctx).is_ok(), first);
        }
    }

    #[test]
    fn test_resolve_preparer_requires_preparer_id() {
        for missing in [None, Some(""), Some("   ")] {
            let err = AccessContext::resolve("u1", UserRole::TaxPreparer, missing).unwrap_err();
            assert!(matches!(err, CrmError::Configuration(_)));
        }
        let ctx = AccessContext::resolve("u1", UserRole::TaxPreparer, Some(" p1 ")).unwrap();
        assert_eq!(ctx, AccessContext::tax_preparer("u1", "p1"));
    }

    #[test]
    fn test_resolve_ignores_preparer_id_for_other_roles() {
        let ctx = AccessContext::resolve("u1", UserRole::Admin, Some("p1")).unwrap();
        assert_eq!(ctx, AccessContext::admin("u1"));
        assert!(AccessContext::resolve("  ", UserRole::Admin, None).is_err());
    }

    #[test]
    fn test_require_admin() {
        assert!(require_admin(&AccessContext::admin("u1")).is_ok());
        assert!(require_admin(&AccessContext::SuperAdmin { user_id: "u1".into() }).is_ok());
        assert!(require_admin(&AccessContext::tax_preparer("u1", "p1")).is_err());
        let client = AccessContext::resolve("u2", UserRole::Client, None).unwrap();
        assert!(matches!(require_admin(&client), Err(CrmError::AccessDenied)));
    }

    #[test]
    fn test_scope_filters_overrides_preparer_filter() {
        let requested = ContactFilters {
            assigned_preparer_id: Some("p2".into()),
            ..Default::default()
        };
        let scoped = scope_filters(requested.clone(), &AccessContext::tax_preparer("u1", "p1"));
        assert_eq!(scoped.assigned_preparer_id.as_deref(), Some("p1"));

        let admin_scoped = scope_filters(requested.clone(), &AccessContext::admin("u1"));
        assert_eq!(admin_scoped, requested);
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("tax-preparer".parse::<UserRole>(), Ok(UserRole::TaxPreparer));
        assert_eq!("super_admin".parse::<UserRole>(), Ok(UserRole::SuperAdmin));
        assert!("root".parse::<UserRole>().is_err());
    }
}
