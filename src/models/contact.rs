use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContactType {
    #[default]
    Lead,
    Client,
    Affiliate,
    Preparer,
}

impl ContactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "LEAD",
            Self::Client => "CLIENT",
            Self::Affiliate => "AFFILIATE",
            Self::Preparer => "PREPARER",
        }
    }
}

impl std::fmt::Display for ContactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LEAD" => Ok(Self::Lead),
            "CLIENT" => Ok(Self::Client),
            "AFFILIATE" => Ok(Self::Affiliate),
            "PREPARER" | "TAX_PREPARER" => Ok(Self::Preparer),
            _ => Err(format!("unknown contact type: {}", s)),
        }
    }
}

/// A person the business tracks across the lead, client, affiliate or preparer roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    /// Linked application account, if the person has signed up.
    pub user_id: Option<String>,
    /// User id at the external identity provider.
    pub identity_provider_id: Option<String>,
    pub contact_type: ContactType,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub stage: Stage,
    pub stage_entered_at: DateTime<Utc>,
    pub referrer_username: Option<String>,
    pub referrer_type: Option<String>,
    pub attribution_method: Option<String>,
    /// Percent confidence, 0..=100.
    pub attribution_confidence: Option<u8>,
    /// Fraction of revenue paid to the referrer, 0.0..=1.0.
    pub commission_rate: Option<f64>,
    pub commission_rate_locked_at: Option<DateTime<Utc>>,
    pub assigned_preparer_id: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub lead_score: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Contact {
    pub fn new(first_name: String, last_name: String, email: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: None,
            identity_provider_id: None,
            contact_type: ContactType::default(),
            first_name,
            last_name,
            email,
            phone: None,
            company: None,
            stage: Stage::default(),
            stage_entered_at: now,
            referrer_username: None,
            referrer_type: None,
            attribution_method: None,
            attribution_confidence: None,
            commission_rate: None,
            commission_rate_locked_at: None,
            assigned_preparer_id: None,
            assigned_at: None,
            last_contacted_at: None,
            lead_score: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_commission_locked(&self) -> bool {
        self.commission_rate_locked_at.is_some()
    }
}

/// Input for creating a contact. Also the shape of one backfill row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewContact {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub contact_type: ContactType,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub identity_provider_id: Option<String>,
    #[serde(default)]
    pub referrer_username: Option<String>,
    #[serde(default)]
    pub referrer_type: Option<String>,
    #[serde(default)]
    pub attribution_method: Option<String>,
    #[serde(default)]
    pub attribution_confidence: Option<u8>,
    #[serde(default)]
    pub lead_score: Option<i32>,
}

impl NewContact {
    pub fn into_contact(self) -> Contact {
        let mut contact = Contact::new(self.first_name, self.last_name, self.email);
        contact.phone = self.phone;
        contact.company = self.company;
        contact.contact_type = self.contact_type;
        contact.user_id = self.user_id;
        contact.identity_provider_id = self.identity_provider_id;
        contact.referrer_username = self.referrer_username;
        contact.referrer_type = self.referrer_type;
        contact.attribution_method = self.attribution_method;
        contact.attribution_confidence = self.attribution_confidence;
        contact.lead_score = self.lead_score.unwrap_or(0);
        contact
    }

    /// Fold a repeated submission into an existing contact.
    ///
    /// Names and contact details take the newer value when supplied. Type and stage are kept.
    /// Attribution is first-touch: it only fills fields that are still empty.
    pub fn merge_into(&self, contact: &mut Contact) {
        if !self.first_name.trim().is_empty() {
            contact.first_name = self.first_name.clone();
        }
        if !self.last_name.trim().is_empty() {
            contact.last_name = self.last_name.clone();
        }
        if self.phone.is_some() {
            contact.phone = self.phone.clone();
        }
        if self.company.is_some() {
            contact.company = self.company.clone();
        }
        if self.user_id.is_some() {
            contact.user_id = self.user_id.clone();
        }
        if self.identity_provider_id.is_some() {
            contact.identity_provider_id = self.identity_provider_id.clone();
        }
        if let Some(score) = self.lead_score {
            contact.lead_score = score;
        }
        if contact.referrer_username.is_none() {
            contact.referrer_username = self.referrer_username.clone();
            contact.referrer_type = self.referrer_type.clone();
        }
        if contact.attribution_method.is_none() {
            contact.attribution_method = self.attribution_method.clone();
            contact.attribution_confidence = self.attribution_confidence;
        }
    }
}

/// Partial update. `None` leaves a field untouched.
///
/// Stage and assignment are deliberately absent: they change only through their own
/// operations so that history and assignment timestamps stay consistent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactPatch {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub contact_type: Option<ContactType>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub identity_provider_id: Option<String>,
    #[serde(default)]
    pub referrer_username: Option<String>,
    #[serde(default)]
    pub referrer_type: Option<String>,
    #[serde(default)]
    pub attribution_method: Option<String>,
    #[serde(default)]
    pub attribution_confidence: Option<u8>,
    #[serde(default)]
    pub commission_rate: Option<f64>,
    #[serde(default)]
    pub lead_score: Option<i32>,
}

impl ContactPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the patch onto a contact in memory.
    pub fn apply_to(&self, contact: &mut Contact) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }
        fn set_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *target = value.clone();
            }
        }

        set(&mut contact.first_name, &self.first_name);
        set(&mut contact.last_name, &self.last_name);
        set(&mut contact.email, &self.email);
        set_opt(&mut contact.phone, &self.phone);
        set_opt(&mut contact.company, &self.company);
        set(&mut contact.contact_type, &self.contact_type);
        set_opt(&mut contact.user_id, &self.user_id);
        set_opt(&mut contact.identity_provider_id, &self.identity_provider_id);
        set_opt(&mut contact.referrer_username, &self.referrer_username);
        set_opt(&mut contact.referrer_type, &self.referrer_type);
        set_opt(&mut contact.attribution_method, &self.attribution_method);
        set_opt(&mut contact.attribution_confidence, &self.attribution_confidence);
        set_opt(&mut contact.commission_rate, &self.commission_rate);
        set(&mut contact.lead_score, &self.lead_score);
    }
}

/// Filters for listing contacts. All are conjunctive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactFilters {
    pub stage: Option<Stage>,
    pub contact_type: Option<ContactType>,
    /// Case-insensitive substring over name, email and phone.
    pub search: Option<String>,
    pub assigned_preparer_id: Option<String>,
}

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page request. Fields are private so every read goes through the clamping getters,
/// including values that arrive through `Deserialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    page: u32,
    limit: u32,
}

impl Pagination {
    /// Build pagination with `page` clamped to >= 1 and `limit` to 1..=MAX_PAGE_SIZE.
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn page(&self) -> u32 {
        self.page.max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> u32 {
        (self.page() - 1).saturating_mul(self.limit())
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactPage {
    pub contacts: Vec<Contact>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

impl ContactPage {
    pub fn new(contacts: Vec<Contact>, total: u64, pagination: Pagination) -> Self {
        let total_pages = total.div_ceil(pagination.limit() as u64) as u32;
        Self {
            contacts,
            total,
            page: pagination.page(),
            limit: pagination.limit(),
            total_pages,
        }
    }
}
