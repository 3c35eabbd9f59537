use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Copy)]
pub enum DocumentState {
    Pendiente,
    Procesado,
    Error,
}

stored_object!(Document, "document", {
    expediente_id: String,
    filename: String,
    extension: String,
    content_type: String,
    ruta: String,
    state: DocumentState
});

impl Document {
    pub fn new(
        expediente_id: String,
        filename: String,
        extension: String,
        content_type: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            expediente_id,
            filename,
            extension,
            content_type,
            ruta: String::new(),
            state: DocumentState::Pendiente,
        }
    }

    /// Implements the `(expediente, filename)` re-upload idempotency lookup.
    pub async fn find_by_expediente_and_filename(
        expediente_id: &str,
        filename: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .client
            .query(
                "SELECT * FROM type::table($table) \
                 WHERE expediente_id = $expediente_id AND filename = $filename \
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(("table", Self::table_name()))
            .bind(("expediente_id", expediente_id.to_string()))
            .bind(("filename", filename.to_string()))
            .await?;
        let rows: Vec<Self> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    pub async fn set_state(
        id: &str,
        state: DocumentState,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        use surrealdb::opt::PatchOp;

        let _updated: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/state", state))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::Datetime::from(Utc::now()),
            ))
            .await?;
        Ok(())
    }

    pub async fn set_ruta(id: &str, ruta: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        use surrealdb::opt::PatchOp;

        let _updated: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/ruta", ruta.to_string()))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::Datetime::from(Utc::now()),
            ))
            .await?;
        Ok(())
    }

    pub async fn list_for_expediente(
        expediente_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM type::table($table) WHERE expediente_id = $expediente_id")
            .bind(("table", Self::table_name()))
            .bind(("expediente_id", expediente_id.to_string()))
            .await?;
        Ok(response.take(0)?)
    }
}

/// Collision policy for `uploads/{expediente}/{filename[_n]}`.
pub fn unique_upload_filename(existing: &[String], filename: &str) -> String {
    if !existing.iter().any(|f| f == filename) {
        return filename.to_string();
    }

    let (stem, ext) = match filename.rsplit_once('.') {
        Some((s, e)) => (s.to_string(), format!(".{e}")),
        None => (filename.to_string(), String::new()),
    };

    let mut n = 1u32;
    loop {
        let candidate = format!("{stem}_{n}{ext}");
        if !existing.iter().any(|f| f == &candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_upload_filename_keeps_first_occurrence_unchanged() {
        assert_eq!(unique_upload_filename(&[], "acta.pdf"), "acta.pdf");
    }

    #[test]
    fn unique_upload_filename_suffixes_on_collision() {
        let existing = vec!["acta.pdf".to_string()];
        assert_eq!(unique_upload_filename(&existing, "acta.pdf"), "acta_1.pdf");
    }

    #[test]
    fn unique_upload_filename_skips_taken_suffixes() {
        let existing = vec!["acta.pdf".to_string(), "acta_1.pdf".to_string()];
        assert_eq!(unique_upload_filename(&existing, "acta.pdf"), "acta_2.pdf");
    }

    #[tokio::test]
    async fn find_by_expediente_and_filename_returns_latest() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");

        let doc = Document::new(
            "exp-1".into(),
            "acta.pdf".into(),
            "pdf".into(),
            "application/pdf".into(),
        );
        db.store_item(doc.clone()).await.expect("store");

        let found = Document::find_by_expediente_and_filename("exp-1", "acta.pdf", &db)
            .await
            .expect("query")
            .expect("found");
        assert_eq!(found.id, doc.id);
    }

    #[tokio::test]
    async fn set_state_transitions_to_procesado() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");

        let doc = Document::new(
            "exp-1".into(),
            "acta.pdf".into(),
            "pdf".into(),
            "application/pdf".into(),
        );
        db.store_item(doc.clone()).await.expect("store");

        Document::set_state(&doc.id, DocumentState::Procesado, &db)
            .await
            .expect("set state");

        let fetched: Document = db
            .get_item(&doc.id)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(fetched.state, DocumentState::Procesado);
    }
}
