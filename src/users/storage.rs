use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::shared::enums::UserRole;
use crate::core::shared::schema::users;
use crate::core::shared::utils::like_pattern;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub role: UserRole,
    pub oauth_provider: Option<String>,
    #[serde(skip_serializing, default)]
    pub oauth_id: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: String, email: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            email: normalize_email(&email),
            password_hash: None,
            role,
            oauth_provider: None,
            oauth_id: None,
            avatar_url: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = users)]
pub struct UserChanges {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

/// `users.name` and `users.email` are `VARCHAR(255)`.
pub const NAME_MAX_CHARS: usize = 255;
pub const EMAIL_MAX_CHARS: usize = 255;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn list_users(
    conn: &mut PgConnection,
    search: Option<&str>,
    limit: i64,
    offset: i64,
) -> QueryResult<Vec<User>> {
    let mut query = users::table.select(User::as_select()).into_boxed();

    if let Some(term) = search.map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = like_pattern(term);
        query = query.filter(
            users::name
                .ilike(pattern.clone())
                .or(users::email.ilike(pattern)),
        );
    }

    query
        .order(users::name.asc())
        .limit(limit)
        .offset(offset)
        .load(conn)
}

pub fn find_user(conn: &mut PgConnection, id: Uuid) -> QueryResult<User> {
    users::table.find(id).select(User::as_select()).first(conn)
}

pub fn find_by_email(conn: &mut PgConnection, email: &str) -> QueryResult<Option<User>> {
    users::table
        .filter(users::email.eq(normalize_email(email)))
        .select(User::as_select())
        .first(conn)
        .optional()
}

pub fn find_by_oauth(
    conn: &mut PgConnection,
    provider: &str,
    oauth_id: &str,
) -> QueryResult<Option<User>> {
    users::table
        .filter(users::oauth_provider.eq(provider))
        .filter(users::oauth_id.eq(oauth_id))
        .select(User::as_select())
        .first(conn)
        .optional()
}

/// Oldest user whose email contains `fragment`, case-insensitively.
pub fn find_by_email_fragment(
    conn: &mut PgConnection,
    fragment: &str,
) -> QueryResult<Option<User>> {
    users::table
        .filter(users::email.ilike(like_pattern(fragment)))
        .order(users::created_at.asc())
        .select(User::as_select())
        .first(conn)
        .optional()
}

pub fn insert_user(conn: &mut PgConnection, user: &User) -> QueryResult<User> {
    diesel::insert_into(users::table)
        .values(user)
        .returning(User::as_returning())
        .get_result(conn)
}

pub fn update_profile(
    conn: &mut PgConnection,
    id: Uuid,
    changes: &UserChanges,
) -> QueryResult<User> {
    if changes.name.is_none() && changes.avatar_url.is_none() {
        return find_user(conn, id);
    }
    diesel::update(users::table.find(id))
        .set((changes, users::updated_at.eq(Utc::now())))
        .returning(User::as_returning())
        .get_result(conn)
}

pub fn set_role(conn: &mut PgConnection, id: Uuid, role: UserRole) -> QueryResult<User> {
    diesel::update(users::table.find(id))
        .set((users::role.eq(role), users::updated_at.eq(Utc::now())))
        .returning(User::as_returning())
        .get_result(conn)
}

pub fn set_password_hash(conn: &mut PgConnection, id: Uuid, hash: &str) -> QueryResult<usize> {
    diesel::update(users::table.find(id))
        .set((
            users::password_hash.eq(Some(hash)),
            users::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
}

pub fn link_oauth(
    conn: &mut PgConnection,
    id: Uuid,
    provider: &str,
    oauth_id: &str,
    avatar_url: Option<&str>,
) -> QueryResult<User> {
    diesel::update(users::table.find(id))
        .set((
            users::oauth_provider.eq(Some(provider)),
            users::oauth_id.eq(Some(oauth_id)),
            users::avatar_url.eq(avatar_url),
            users::updated_at.eq(Utc::now()),
        ))
        .returning(User::as_returning())
        .get_result(conn)
}

pub fn delete_user(conn: &mut PgConnection, id: Uuid) -> QueryResult<usize> {
    diesel::delete(users::table.find(id)).execute(conn)
}
