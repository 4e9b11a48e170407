//! User stream fold

use chrono::{DateTime, Utc};
use holocron_storage::{UserEventRow, UserEventType, UserId};
use serde::Serialize;

use super::{parse_instant, ReconstructionError};

const DEFAULT_NAME_PREFIX: &str = "ユーザー";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    pub id: UserId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Fold a user's rows; names never change after `created`
pub fn reconstruct_user(rows: &[UserEventRow]) -> Result<Option<UserState>, ReconstructionError> {
    let mut state = None;

    for row in rows {
        let event_type = row.event_type.parse::<UserEventType>().map_err(|e| {
            ReconstructionError::UnknownEventType {
                event_id: row.event_id,
                event_type: e.0,
            }
        })?;
        let occurred_at = parse_instant(row.event_id, "occurred_at", &row.occurred_at)?;

        match event_type {
            UserEventType::Created => {
                state = Some(UserState {
                    id: row.user_id.clone(),
                    name: row.name.clone(),
                    created_at: occurred_at,
                });
            }
        }
    }

    Ok(state)
}

/// Display name used when a user registers without one
pub fn default_user_name(user_id: &UserId) -> String {
    let suffix: String = user_id.as_str().chars().take(4).collect();
    format!("{}{}", DEFAULT_NAME_PREFIX, suffix)
}
