use crate::error::{AppError, AppResult};
use crate::models::message::Message;
use crate::models::profile::UserProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MAX_DISPLAY_NAME_LEN: usize = 255;

/// Participants of a conversation, kept sorted and free of duplicates so that
/// two sets with the same members compare equal regardless of input order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Uuid>", into = "Vec<Uuid>")]
pub struct MemberSet(Vec<Uuid>);

impl MemberSet {
    pub fn new(ids: impl IntoIterator<Item = Uuid>) -> Self {
        let mut ids: Vec<Uuid> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self(ids)
    }

    /// Stable text key for the set, used for exact set-equality lookups.
    pub fn key(&self) -> String {
        self.0
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.0.binary_search(id).is_ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Uuid> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Uuid] {
        &self.0
    }
}

impl From<Vec<Uuid>> for MemberSet {
    fn from(ids: Vec<Uuid>) -> Self {
        Self::new(ids)
    }
}

impl From<MemberSet> for Vec<Uuid> {
    fn from(set: MemberSet) -> Self {
        set.0
    }
}

/// Stored conversation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub is_group: bool,
    pub display_name: Option<String>,
    pub avatar_ref: Option<String>,
    pub member_ids: MemberSet,
    pub owner_id: Uuid,
    /// Cache of the newest message; may dangle after a bulk message removal.
    pub last_message_id: Option<Uuid>,
    pub last_read_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(owner_id: Uuid, spec: ConversationSpec, now: DateTime<Utc>) -> Self {
        let (is_group, display_name, avatar_ref, member_ids) = match spec {
            ConversationSpec::Group {
                display_name,
                member_ids,
                avatar_ref,
            } => (true, Some(display_name), avatar_ref, member_ids),
            ConversationSpec::Direct { member_ids } => (false, None, None, member_ids),
        };

        Self {
            id: Uuid::now_v7(),
            is_group,
            display_name,
            avatar_ref,
            member_ids,
            owner_id,
            last_message_id: None,
            last_read_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_member(&self, user_id: &Uuid) -> bool {
        self.member_ids.contains(user_id)
    }
}

/// Validated input for resolve-or-create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationSpec {
    Group {
        display_name: String,
        member_ids: MemberSet,
        avatar_ref: Option<String>,
    },
    Direct {
        member_ids: MemberSet,
    },
}

impl ConversationSpec {
    pub fn group(
        display_name: impl Into<String>,
        member_ids: impl IntoIterator<Item = Uuid>,
        avatar_ref: Option<String>,
    ) -> AppResult<Self> {
        let spec = Self::Group {
            display_name: display_name.into().trim().to_string(),
            member_ids: MemberSet::new(member_ids),
            avatar_ref,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn direct(member_ids: impl IntoIterator<Item = Uuid>) -> AppResult<Self> {
        let spec = Self::Direct {
            member_ids: MemberSet::new(member_ids),
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Checks the invariants the constructors establish. Variants built by
    /// hand go through this again before anything is stored.
    pub fn validate(&self) -> AppResult<()> {
        match self {
            Self::Group {
                display_name,
                member_ids,
                ..
            } => {
                let trimmed = display_name.trim();
                if trimmed.is_empty() {
                    return Err(AppError::Validation(
                        "group conversation requires a display name".into(),
                    ));
                }
                if trimmed.len() != display_name.len() {
                    return Err(AppError::Validation(
                        "display name must not have surrounding whitespace".into(),
                    ));
                }
                if display_name.chars().count() > MAX_DISPLAY_NAME_LEN {
                    return Err(AppError::Validation(format!(
                        "display name too long (max {MAX_DISPLAY_NAME_LEN})"
                    )));
                }
                if member_ids.is_empty() {
                    return Err(AppError::Validation(
                        "conversation needs at least one member".into(),
                    ));
                }
            }
            Self::Direct { member_ids } => {
                if member_ids.len() != 2 {
                    return Err(AppError::Validation(format!(
                        "direct conversation needs exactly 2 distinct members, got {}",
                        member_ids.len()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn member_ids(&self) -> &MemberSet {
        match self {
            Self::Group { member_ids, .. } | Self::Direct { member_ids } => member_ids,
        }
    }
}

/// Wire shape of a create request. A display name makes it a group.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub is_group: bool,
    pub display_name: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
    pub avatar_ref: Option<String>,
}

impl TryFrom<CreateConversationRequest> for ConversationSpec {
    type Error = AppError;

    fn try_from(req: CreateConversationRequest) -> Result<Self, Self::Error> {
        let name = req.display_name.filter(|name| !name.trim().is_empty());
        match name {
            Some(name) => ConversationSpec::group(name, req.member_ids, req.avatar_ref),
            None if req.is_group => Err(AppError::Validation(
                "group conversation requires a display name".into(),
            )),
            None => ConversationSpec::direct(req.member_ids),
        }
    }
}

/// Conversation with member profiles and the resolved last message.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationView {
    pub id: Uuid,
    pub is_group: bool,
    pub display_name: Option<String>,
    pub avatar_ref: Option<String>,
    pub members: Vec<UserProfile>,
    pub owner_id: Uuid,
    pub last_message: Option<Message>,
    pub last_read_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_set_ignores_order_and_duplicates() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let left = MemberSet::new([a, b, a]);
        let right = MemberSet::new([b, a]);
        assert_eq!(left, right);
        assert_eq!(left.key(), right.key());
        assert_eq!(left.len(), 2);
    }

    #[test]
    fn member_set_key_differs_for_different_sets() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        assert_ne!(MemberSet::new([a, b]).key(), MemberSet::new([a, c]).key());
    }

    #[test]
    fn member_set_deserializes_normalized() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let json = serde_json::json!([b, a, b]);
        let set: MemberSet = serde_json::from_value(json).unwrap();
        assert_eq!(set, MemberSet::new([a, b]));
    }

    #[test]
    fn direct_requires_two_distinct_members() {
        let a = Uuid::new_v4();
        assert!(matches!(
            ConversationSpec::direct([a, a]),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            ConversationSpec::direct(Vec::new()),
            Err(AppError::Validation(_))
        ));
        assert!(ConversationSpec::direct([a, Uuid::new_v4()]).is_ok());
    }

    #[test]
    fn group_requires_name_and_members() {
        let a = Uuid::new_v4();
        assert!(matches!(
            ConversationSpec::group("   ", [a], None),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            ConversationSpec::group("team", Vec::new(), None),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            ConversationSpec::group("x".repeat(256), [a], None),
            Err(AppError::Validation(_))
        ));
        let spec = ConversationSpec::group("  team  ", [a], None).unwrap();
        match spec {
            ConversationSpec::Group { display_name, .. } => assert_eq!(display_name, "team"),
            other => panic!("expected group, got {other:?}"),
        }
    }

    #[test]
    fn hand_built_variants_are_checked() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let invalid = [
            ConversationSpec::Direct {
                member_ids: MemberSet::default(),
            },
            ConversationSpec::Direct {
                member_ids: MemberSet::new([a, b, c]),
            },
            ConversationSpec::Group {
                display_name: String::new(),
                member_ids: MemberSet::new([a]),
                avatar_ref: None,
            },
            ConversationSpec::Group {
                display_name: " padded ".into(),
                member_ids: MemberSet::new([a]),
                avatar_ref: None,
            },
            ConversationSpec::Group {
                display_name: "team".into(),
                member_ids: MemberSet::default(),
                avatar_ref: None,
            },
        ];
        for spec in invalid {
            assert!(
                matches!(spec.validate(), Err(AppError::Validation(_))),
                "accepted {spec:?}"
            );
        }
        assert!(ConversationSpec::Direct {
            member_ids: MemberSet::new([a, b]),
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn request_with_name_becomes_group() {
        let req = CreateConversationRequest {
            display_name: Some("ops".into()),
            member_ids: vec![Uuid::new_v4()],
            ..Default::default()
        };
        let spec = ConversationSpec::try_from(req).unwrap();
        assert!(matches!(spec, ConversationSpec::Group { .. }));
    }

    #[test]
    fn group_flag_without_name_is_rejected() {
        let req = CreateConversationRequest {
            is_group: true,
            display_name: Some(" ".into()),
            member_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
            avatar_ref: None,
        };
        assert!(matches!(
            ConversationSpec::try_from(req),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn new_conversation_starts_without_last_message() {
        let owner = Uuid::new_v4();
        let now = Utc::now();
        let spec = ConversationSpec::direct([owner, Uuid::new_v4()]).unwrap();
        let conversation = Conversation::new(owner, spec, now);
        assert!(!conversation.is_group);
        assert_eq!(conversation.owner_id, owner);
        assert_eq!(conversation.last_message_id, None);
        assert_eq!(conversation.last_read_at, now);
        assert!(conversation.has_member(&owner));
    }
}
