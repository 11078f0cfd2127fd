//! Role resolution and permission predicates.
//!
//! Access to a document is granted exclusively by a row in `document_shares`.
//! The `owner_id` column on `documents` is informational: authorization
//! always re-derives the role from the share table, so ownership could later
//! move by mutating shares alone.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{DocumentShare, NewDocumentShare};
use crate::schema::document_shares;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Editor,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "OWNER",
            Role::Editor => "EDITOR",
            Role::Viewer => "VIEWER",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "OWNER" => Some(Role::Owner),
            "EDITOR" => Some(Role::Editor),
            "VIEWER" => Some(Role::Viewer),
            _ => None,
        }
    }

    /// Any share at all grants read access.
    pub fn can_view(&self) -> bool {
        matches!(self, Role::Owner | Role::Editor | Role::Viewer)
    }

    /// Comment creation is restricted to owners and editors.
    pub fn can_edit(&self) -> bool {
        matches!(self, Role::Owner | Role::Editor)
    }

    /// Sharing is restricted to the owner.
    pub fn is_owner(&self) -> bool {
        matches!(self, Role::Owner)
    }
}

/// Single lookup in the share registry keyed by (document, user). Returns
/// `None` when no share exists; there is no implicit access.
pub fn role_of(
    conn: &mut PgConnection,
    user_id: Uuid,
    document_id: Uuid,
) -> AppResult<Option<Role>> {
    let share: Option<DocumentShare> = document_shares::table
        .find((document_id, user_id))
        .first(conn)
        .optional()?;

    Ok(share.and_then(|row| Role::parse(&row.role)))
}

pub fn require_view(conn: &mut PgConnection, user_id: Uuid, document_id: Uuid) -> AppResult<Role> {
    match role_of(conn, user_id, document_id)? {
        Some(role) if role.can_view() => Ok(role),
        _ => Err(AppError::forbidden()),
    }
}

pub fn require_edit(conn: &mut PgConnection, user_id: Uuid, document_id: Uuid) -> AppResult<Role> {
    match role_of(conn, user_id, document_id)? {
        Some(role) if role.can_edit() => Ok(role),
        _ => Err(AppError::forbidden()),
    }
}

pub fn require_owner(conn: &mut PgConnection, user_id: Uuid, document_id: Uuid) -> AppResult<Role> {
    match role_of(conn, user_id, document_id)? {
        Some(role) if role.is_owner() => Ok(role),
        _ => Err(AppError::forbidden()),
    }
}

/// Establishes the OWNER row for a fresh document. Callers must run this in
/// the same transaction as the document insert so no reader ever observes a
/// document with zero shares.
pub fn create_owner_share(
    conn: &mut PgConnection,
    document_id: Uuid,
    user_id: Uuid,
) -> Result<(), diesel::result::Error> {
    diesel::insert_into(document_shares::table)
        .values(&NewDocumentShare {
            document_id,
            user_id,
            role: Role::Owner.as_str().to_string(),
        })
        .execute(conn)?;
    Ok(())
}

/// Creates or replaces the share row for (document, user). Re-granting the
/// same role is a no-op effect-wise, so last-writer-wins is sufficient here.
pub fn upsert_share(
    conn: &mut PgConnection,
    document_id: Uuid,
    user_id: Uuid,
    role: Role,
) -> AppResult<DocumentShare> {
    diesel::insert_into(document_shares::table)
        .values(&NewDocumentShare {
            document_id,
            user_id,
            role: role.as_str().to_string(),
        })
        .on_conflict((document_shares::document_id, document_shares::user_id))
        .do_update()
        .set(document_shares::role.eq(role.as_str()))
        .execute(conn)?;

    let share = document_shares::table
        .find((document_id, user_id))
        .first(conn)?;
    Ok(share)
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn view_is_granted_by_any_role() {
        assert!(Role::Owner.can_view());
        assert!(Role::Editor.can_view());
        assert!(Role::Viewer.can_view());
    }

    #[test]
    fn edit_excludes_viewers() {
        assert!(Role::Owner.can_edit());
        assert!(Role::Editor.can_edit());
        assert!(!Role::Viewer.can_edit());
    }

    #[test]
    fn only_the_owner_owns() {
        assert!(Role::Owner.is_owner());
        assert!(!Role::Editor.is_owner());
        assert!(!Role::Viewer.is_owner());
    }

    #[test]
    fn parse_round_trips_known_roles() {
        for role in [Role::Owner, Role::Editor, Role::Viewer] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn parse_rejects_unknown_roles() {
        assert_eq!(Role::parse("ADMIN"), None);
        assert_eq!(Role::parse("owner"), None);
        assert_eq!(Role::parse(""), None);
    }
}
