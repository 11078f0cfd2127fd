use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub password_hash: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = documents)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub file_url: String,
    pub file_name: String,
    pub file_size: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub file_url: String,
    pub file_name: String,
    pub file_size: i64,
}

#[derive(Debug, Clone, Queryable, Associations)]
#[diesel(table_name = document_shares)]
#[diesel(belongs_to(Document))]
#[diesel(belongs_to(User))]
#[diesel(primary_key(document_id, user_id))]
pub struct DocumentShare {
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = document_shares)]
pub struct NewDocumentShare {
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = comments)]
#[diesel(belongs_to(Document))]
#[diesel(belongs_to(User))]
pub struct Comment {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub page_number: i32,
    pub x: f64,
    pub y: f64,
    pub message: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = comments)]
pub struct NewComment {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub page_number: i32,
    pub x: f64,
    pub y: f64,
    pub message: String,
}
