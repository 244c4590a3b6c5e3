use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, Row};

use crate::config::PhotoDimensions;
use crate::db::StoreHandle;
use crate::error::{Error, Result};
use crate::models::{from_millis, now_millis, Photo, PhotoKind};
use crate::thumbnails;

impl ToSql for PhotoKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PhotoKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|_| FromSqlError::InvalidType)
    }
}

fn photo_from_row(row: &Row<'_>) -> rusqlite::Result<Photo> {
    Ok(Photo {
        id: row.get(0)?,
        point_code: row.get(1)?,
        kind: row.get(2)?,
        blob: row.get(3)?,
        created_at: from_millis(row.get(4)?),
    })
}

/// Stores `blob` as the photo of `kind` for a point, replacing the previous one.
/// Returns the row id.
pub fn put_photo(conn: &Connection, point_code: &str, kind: PhotoKind, blob: &[u8]) -> Result<i64> {
    if point_code.trim().is_empty() {
        return Err(Error::InvalidArgument("photo needs a point code".into()));
    }
    if blob.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "empty {} photo for {point_code}",
            kind.as_str()
        )));
    }
    let id = conn.query_row(
        "INSERT INTO photos (point_code, kind, blob, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(point_code, kind) DO UPDATE SET
            blob = excluded.blob,
            created_at = excluded.created_at
         RETURNING id",
        params![point_code, kind, blob, now_millis().timestamp_millis()],
        |row| row.get(0),
    )?;
    log::debug!("Stored {} photo for {point_code} ({} bytes)", kind.as_str(), blob.len());
    Ok(id)
}

/// Photos for a point, near before far; `None` returns every kind.
pub fn photos_for_point(conn: &Connection, point_code: &str, kind: Option<PhotoKind>) -> Result<Vec<Photo>> {
    let photos = match kind {
        Some(kind) => {
            let mut stmt = conn.prepare_cached(
                "SELECT id, point_code, kind, blob, created_at FROM photos
                 WHERE point_code = ?1 AND kind = ?2",
            )?;
            let rows = stmt.query_map(params![point_code, kind], photo_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
        None => {
            let mut stmt = conn.prepare_cached(
                "SELECT id, point_code, kind, blob, created_at FROM photos
                 WHERE point_code = ?1 ORDER BY kind DESC",
            )?;
            let rows = stmt.query_map(params![point_code], photo_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
    };
    Ok(photos)
}

pub fn delete_photo(conn: &Connection, id: i64) -> Result<bool> {
    let removed = conn.execute("DELETE FROM photos WHERE id = ?1", params![id])?;
    Ok(removed > 0)
}

pub fn delete_photos_for_point(conn: &Connection, point_code: &str) -> Result<usize> {
    let removed = conn.execute("DELETE FROM photos WHERE point_code = ?1", params![point_code])?;
    Ok(removed)
}

pub fn count_photos(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM photos", [], |row| row.get(0))?;
    Ok(count.max(0) as u64)
}

#[derive(Clone)]
pub struct PhotoStore {
    handle: StoreHandle,
}

impl PhotoStore {
    pub fn new(handle: StoreHandle) -> Self {
        Self { handle }
    }

    pub async fn put(&self, point_code: &str, kind: PhotoKind, blob: Vec<u8>) -> Result<i64> {
        let point_code = point_code.to_string();
        self.handle
            .run(move |conn| put_photo(conn, &point_code, kind, &blob))
            .await
    }

    /// Downsizes a captured image to the configured box and stores the JPEG.
    pub async fn put_resized(&self, point_code: &str, kind: PhotoKind, image: Vec<u8>) -> Result<i64> {
        let dims: PhotoDimensions = self.handle.config().photo;
        let point_code = point_code.to_string();
        self.handle
            .run(move |conn| {
                let jpeg = thumbnails::resize_for_store(&image, dims)?;
                put_photo(conn, &point_code, kind, &jpeg)
            })
            .await
    }

    pub async fn get_by_point(&self, point_code: &str, kind: Option<PhotoKind>) -> Result<Vec<Photo>> {
        let point_code = point_code.to_string();
        self.handle
            .run(move |conn| photos_for_point(conn, &point_code, kind))
            .await
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        self.handle.run(move |conn| delete_photo(conn, id)).await
    }

    pub async fn delete_by_point(&self, point_code: &str) -> Result<usize> {
        let point_code = point_code.to_string();
        self.handle
            .run(move |conn| delete_photos_for_point(conn, &point_code))
            .await
    }

    pub async fn count(&self) -> Result<u64> {
        self.handle.run(|conn| count_photos(conn)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::db::run_migrations;

    fn store() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        conn
    }

    #[test]
    fn one_photo_per_point_and_kind() {
        let conn = store();
        let first = put_photo(&conn, "A", PhotoKind::Near, b"one").unwrap();
        let second = put_photo(&conn, "A", PhotoKind::Near, b"two").unwrap();
        assert_eq!(first, second);

        let near = photos_for_point(&conn, "A", Some(PhotoKind::Near)).unwrap();
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].blob, b"two".to_vec());
    }

    #[test]
    fn no_kind_returns_both() {
        let conn = store();
        put_photo(&conn, "A", PhotoKind::Far, b"far").unwrap();
        put_photo(&conn, "A", PhotoKind::Near, b"near").unwrap();
        put_photo(&conn, "B", PhotoKind::Near, b"other").unwrap();

        let kinds: Vec<PhotoKind> = photos_for_point(&conn, "A", None)
            .unwrap()
            .into_iter()
            .map(|p| p.kind)
            .collect();
        assert_eq!(kinds, vec![PhotoKind::Near, PhotoKind::Far]);
        assert!(photos_for_point(&conn, "C", None).unwrap().is_empty());
    }

    #[test]
    fn empty_blob_is_rejected() {
        let conn = store();
        assert!(matches!(
            put_photo(&conn, "A", PhotoKind::Far, &[]),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(count_photos(&conn).unwrap(), 0);
    }

    #[test]
    fn delete_by_id_and_by_point() {
        let conn = store();
        let id = put_photo(&conn, "A", PhotoKind::Near, b"x").unwrap();
        put_photo(&conn, "A", PhotoKind::Far, b"y").unwrap();
        put_photo(&conn, "B", PhotoKind::Far, b"z").unwrap();

        assert!(delete_photo(&conn, id).unwrap());
        assert!(!delete_photo(&conn, id).unwrap());
        assert_eq!(delete_photos_for_point(&conn, "A").unwrap(), 1);
        assert_eq!(count_photos(&conn).unwrap(), 1);
    }

    #[tokio::test]
    async fn resized_photo_is_stored_as_jpeg() {
        let store = PhotoStore::new(StoreHandle::new(StoreConfig::in_memory()));
        let png = thumbnails::tests::sample_png(800, 600);
        store.put_resized("A", PhotoKind::Far, png).await.unwrap();

        let photos = store.get_by_point("A", Some(PhotoKind::Far)).await.unwrap();
        assert_eq!(photos.len(), 1);
        let decoded = image::load_from_memory(&photos[0].blob).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (360, 480));
        assert_eq!(&photos[0].blob[..2], &[0xFF, 0xD8]);
    }
}
