use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Closed enumeration — do not renumber, values are persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[repr(u8)]
pub enum AuditActionType {
    BusquedaCasosSimilares = 1,
    CargaDocumentos = 2,
    Login = 3,
    Logout = 4,
    CambioContrasena = 5,
    RecuperacionContrasena = 6,
    CrearUsuario = 7,
    EditarUsuario = 8,
    ConsultarUsuarios = 9,
    DescargarArchivo = 10,
    ListarArchivos = 11,
    ConsultaRag = 12,
    GenerarResumen = 13,
    ConsultarBitacora = 14,
    ExportarBitacora = 15,
}

stored_object!(AuditRecord, "audit_record", {
    user_id: Option<String>,
    action_type: AuditActionType,
    text: String,
    expediente_id: Option<String>,
    info_json: serde_json::Value
});

impl AuditRecord {
    pub fn new(
        user_id: Option<String>,
        action_type: AuditActionType,
        text: String,
        expediente_id: Option<String>,
        info_json: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            user_id,
            action_type,
            text,
            expediente_id,
            info_json,
        }
    }
}

/// Append-only, fire-and-forget: the spawned task's errors are logged, never propagated
/// to the caller's pipeline.
pub fn log_audit(db: SurrealDbClient, record: AuditRecord) {
    tokio::spawn(async move {
        if let Err(err) = db.store_item(record).await {
            tracing::warn!(error = %err, "audit write failed");
        }
    });
}

pub async fn recent_for_user(
    user_id: &str,
    limit: usize,
    db: &SurrealDbClient,
) -> Result<Vec<AuditRecord>, AppError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows: Vec<AuditRecord> = db
        .client
        .query(
            "SELECT * FROM type::table($table) WHERE user_id = $user_id \
             ORDER BY created_at DESC LIMIT $limit",
        )
        .bind(("table", AuditRecord::table_name()))
        .bind(("user_id", user_id.to_string()))
        .bind(("limit", limit))
        .await?
        .take(0)?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_audit_persists_without_blocking_caller() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");

        let record = AuditRecord::new(
            Some("user-1".into()),
            AuditActionType::ConsultaRag,
            "query executed".into(),
            Some("exp-1".into()),
            serde_json::json!({"question": "..."}),
        );

        log_audit(db.clone(), record);

        // give the spawned write a chance to land
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let recorded = recent_for_user("user-1", 10, &db).await.expect("query");
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].action_type, AuditActionType::ConsultaRag);
    }

    #[tokio::test]
    async fn recent_for_user_orders_newest_first() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");

        for i in 0..3u32 {
            let record = AuditRecord::new(
                Some("user-1".into()),
                AuditActionType::CargaDocumentos,
                format!("upload {i}"),
                None,
                serde_json::Value::Null,
            );
            db.store_item(record).await.expect("store");
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let records = recent_for_user("user-1", 10, &db).await.expect("query");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].text, "upload 2");
    }
}
