//! Ticket attachments and loose documents, kept on local disk under `UPLOAD_DIR`.

use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::core::error::ApiError;
use crate::core::shared::schema::documents;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{run_blocking, truncate_chars};
use crate::core::urls::ApiUrls;
use crate::security::antivirus::{ScanVerdict, ThreatKind};
use crate::security::auth::AuthenticatedUser;
use crate::tickets::storage as ticket_storage;
use crate::tickets::types::actions;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = documents)]
pub struct Document {
    pub id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub uploaded_by: Option<Uuid>,
    pub original_name: String,
    #[serde(skip_serializing)]
    pub stored_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListDocumentsQuery {
    pub ticket_id: Option<Uuid>,
}

struct Upload {
    file_name: String,
    data: Vec<u8>,
    ticket_id: Option<Uuid>,
}

/// `documents.original_name` is `VARCHAR(255)`.
const NAME_MAX_CHARS: usize = 255;

/// Strips any directory part a browser may send along with the file name and
/// shortens long names, keeping the extension.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "." || base == ".." {
        return "upload".to_string();
    }
    if base.chars().count() <= NAME_MAX_CHARS {
        return base.to_string();
    }
    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.chars().count() <= 16 => {
            let keep = NAME_MAX_CHARS - ext.chars().count() - 1;
            format!("{}.{ext}", truncate_chars(stem, keep))
        }
        _ => truncate_chars(base, NAME_MAX_CHARS),
    }
}

/// `<uuid>.<ext>`, with the extension reduced to lowercase alphanumerics.
pub fn stored_name_for(id: Uuid, original: &str) -> String {
    let ext: String = FsPath::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(16)
        .collect::<String>()
        .to_lowercase();
    if ext.is_empty() {
        id.to_string()
    } else {
        format!("{id}.{ext}")
    }
}

pub fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(file_name)
    )
}

fn stored_path(dir: &FsPath, stored_name: &str) -> PathBuf {
    dir.join(stored_name)
}

async fn store_file(dir: &FsPath, stored_name: &str, data: &[u8]) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = stored_path(dir, stored_name);
    tokio::fs::write(&path, data).await?;
    Ok(path)
}

/// A file that is already gone counts as removed.
async fn remove_stored(path: &FsPath) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut file = None;
    let mut ticket_id = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let file_name = sanitize_file_name(field.file_name().unwrap_or("upload"));
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;
                file = Some((file_name, data.to_vec()));
            }
            Some("ticket_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid ticket_id: {e}")))?;
                let text = text.trim();
                if !text.is_empty() {
                    ticket_id = Some(
                        Uuid::parse_str(text)
                            .map_err(|_| ApiError::BadRequest("Invalid ticket_id".into()))?,
                    );
                }
            }
            _ => {}
        }
    }
    let (file_name, data) =
        file.ok_or_else(|| ApiError::BadRequest("Missing multipart field 'file'".into()))?;
    Ok(Upload {
        file_name,
        data,
        ticket_id,
    })
}

fn find_document(conn: &mut PgConnection, id: Uuid) -> Result<Document, ApiError> {
    documents::table
        .find(id)
        .select(Document::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Document"))
}

pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let upload = read_upload(multipart).await?;
    if upload.data.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".into()));
    }

    let verdict = state
        .scanner
        .scan(&upload.file_name, &upload.data)
        .await
        .map_err(|e| ApiError::Internal(format!("Upload scan failed: {e}")))?;
    if let ScanVerdict::Rejected { kind, reason } = verdict {
        return Err(match kind {
            ThreatKind::TooLarge => ApiError::PayloadTooLarge(format!("file rejected: {reason}")),
            _ => ApiError::BadRequest(format!("file rejected: {reason}")),
        });
    }

    if let Some(ticket_id) = upload.ticket_id {
        run_blocking(&state.conn, move |conn| {
            ticket_storage::find_ticket(conn, ticket_id).map(|_| ())
        })
        .await?;
    }

    let id = Uuid::new_v4();
    let stored_name = stored_name_for(id, &upload.file_name);
    let path = store_file(&state.config.uploads.dir, &stored_name, &upload.data).await?;

    let document = Document {
        id,
        ticket_id: upload.ticket_id,
        uploaded_by: Some(user.user_id),
        mime_type: mime_guess::from_path(&upload.file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
        size_bytes: upload.data.len() as i64,
        original_name: upload.file_name,
        stored_name,
        created_at: Utc::now(),
    };

    let saved = run_blocking(&state.conn, move |conn| {
        conn.transaction(|conn| {
            let saved = diesel::insert_into(documents::table)
                .values(&document)
                .returning(Document::as_returning())
                .get_result(conn)?;
            if let Some(ticket_id) = saved.ticket_id {
                ticket_storage::record_activity(
                    conn,
                    ticket_id,
                    saved.uploaded_by,
                    actions::DOCUMENT_ATTACHED,
                    serde_json::json!({
                        "document_id": saved.id,
                        "file_name": saved.original_name,
                    }),
                )?;
            }
            Ok::<_, ApiError>(saved)
        })
    })
    .await;

    match saved {
        Ok(saved) => {
            info!(
                "Stored document {} ({} bytes) as {}",
                saved.original_name, saved.size_bytes, saved.stored_name
            );
            Ok((StatusCode::CREATED, Json(saved)))
        }
        Err(e) => {
            if let Err(io) = remove_stored(&path).await {
                warn!("Failed to clean up {}: {io}", path.display());
            }
            Err(e)
        }
    }
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let items = run_blocking(&state.conn, move |conn| {
        let mut q = documents::table.select(Document::as_select()).into_boxed();
        if let Some(ticket_id) = query.ticket_id {
            q = q.filter(documents::ticket_id.eq(ticket_id));
        }
        Ok(q.order(documents::created_at.desc()).load(conn)?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>, ApiError> {
    let document = run_blocking(&state.conn, move |conn| find_document(conn, id)).await?;
    Ok(Json(document))
}

/// Opens a stored file as a chunked body so large downloads are not held in memory.
async fn stream_file(path: &FsPath) -> std::io::Result<(u64, Body)> {
    let file = tokio::fs::File::open(path).await?;
    let length = file.metadata().await?.len();
    Ok((length, Body::from_stream(ReaderStream::new(file))))
}

pub async fn download_document(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let document = run_blocking(&state.conn, move |conn| find_document(conn, id)).await?;
    let path = stored_path(&state.config.uploads.dir, &document.stored_name);
    let (length, body) = stream_file(&path).await?;

    Ok((
        [
            (header::CONTENT_TYPE, document.mime_type.clone()),
            (header::CONTENT_LENGTH, length.to_string()),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&document.original_name),
            ),
        ],
        body,
    )
        .into_response())
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let document = run_blocking(&state.conn, move |conn| {
        let document = find_document(conn, id)?;
        if !user.can_access(document.uploaded_by) {
            return Err(ApiError::permission_denied());
        }
        diesel::delete(documents::table.find(id)).execute(conn)?;
        Ok(document)
    })
    .await?;

    let path = stored_path(&state.config.uploads.dir, &document.stored_name);
    if !remove_stored(&path).await? {
        warn!("Document {id} had no file at {}", path.display());
    }
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_documents_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::DOCUMENTS, get(list_documents).post(upload_document))
        .route(ApiUrls::DOCUMENT_BY_ID, get(get_document).delete(delete_document))
        .route(ApiUrls::DOCUMENT_DOWNLOAD, get(download_document))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\ana\\notes.txt"), "notes.txt");
        assert_eq!(sanitize_file_name("dir/"), "upload");
        assert_eq!(sanitize_file_name(".."), "upload");
    }

    #[test]
    fn test_long_file_name_keeps_extension() {
        let long = format!("{}.pdf", "a".repeat(400));
        let short = sanitize_file_name(&long);
        assert_eq!(short.chars().count(), 255);
        assert!(short.ends_with("aaa.pdf"));
        assert_eq!(sanitize_file_name(&"b".repeat(300)).chars().count(), 255);
    }

    #[test]
    fn test_stored_name_keeps_extension() {
        let id = Uuid::nil();
        assert_eq!(
            stored_name_for(id, "Scan.PDF"),
            "00000000-0000-0000-0000-000000000000.pdf"
        );
        assert_eq!(
            stored_name_for(id, "archive.tar.gz"),
            "00000000-0000-0000-0000-000000000000.gz"
        );
        assert_eq!(
            stored_name_for(id, "README"),
            "00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_content_disposition_encodes_non_ascii() {
        let value = content_disposition("relatório final.pdf");
        assert!(value.starts_with("attachment; filename=\"relat_rio final.pdf\""));
        assert!(value.ends_with("filename*=UTF-8''relat%C3%B3rio%20final.pdf"));
    }

    #[tokio::test]
    async fn test_store_and_remove_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("uploads");
        let name = stored_name_for(Uuid::new_v4(), "notes.txt");

        let path = store_file(&nested, &name, b"hello").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hello");

        assert!(remove_stored(&path).await.unwrap());
        assert!(!remove_stored(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_stream_file_yields_whole_file() {
        use http_body_util::BodyExt;

        let dir = tempfile::tempdir().unwrap();
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let path = store_file(dir.path(), "big.bin", &content).await.unwrap();

        let (length, body) = stream_file(&path).await.unwrap();
        assert_eq!(length, content.len() as u64);
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected.as_ref(), content.as_slice());

        let missing = stream_file(&dir.path().join("gone.bin")).await;
        assert_eq!(missing.err().map(|e| e.kind()), Some(std::io::ErrorKind::NotFound));
    }

    #[test]
    fn test_guessed_mime_types() {
        assert_eq!(
            mime_guess::from_path("a.png").first_or_octet_stream().essence_str(),
            "image/png"
        );
        assert_eq!(
            mime_guess::from_path("a.unknownext").first_or_octet_stream().essence_str(),
            "application/octet-stream"
        );
    }
}
