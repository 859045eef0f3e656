use serde::{Deserialize, Serialize};

use super::{Contact, EmailActivity, Interaction, StageHistory, Tag, Task};

/// How many rows of each related log `ContactDetail` carries.
pub const DETAIL_RECENT_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactCounts {
    pub interactions: u64,
    pub stage_changes: u64,
    pub tasks: u64,
    pub open_tasks: u64,
    pub emails_sent: u64,
}

/// Full contact view - the contact with its recent activity and aggregate counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactDetail {
    pub contact: Contact,
    pub recent_interactions: Vec<Interaction>,
    pub recent_stage_history: Vec<StageHistory>,
    pub tags: Vec<Tag>,
    pub open_tasks: Vec<Task>,
    pub recent_email_activity: Vec<EmailActivity>,
    pub counts: ContactCounts,
}

impl ContactDetail {
    /// Most recent interaction, if any. Lists are stored most-recent-first.
    pub fn last_interaction(&self) -> Option<&Interaction> {
        self.recent_interactions.first()
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name.eq_ignore_ascii_case(name))
    }
}
