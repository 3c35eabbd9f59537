use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// `^\d{2,4}-\d{6}-\d{4}-[A-Z]{2}$`, e.g. `21-004512-0166-PE`.
fn numero_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{2,4}-\d{6}-\d{4}-[A-Z]{2}$").expect("valid regex"))
}

pub fn is_valid_expediente_numero(numero: &str) -> bool {
    numero_pattern().is_match(numero)
}

stored_object!(Expediente, "expediente", {
    numero: String
});

impl Expediente {
    pub fn new(numero: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            numero,
        }
    }

    pub async fn by_numero(
        numero: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM type::table($table) WHERE numero = $numero LIMIT 1")
            .bind(("table", Self::table_name()))
            .bind(("numero", numero.to_string()))
            .await?;
        let rows: Vec<Self> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// Lazy get-or-create by business key.
    pub async fn get_or_create(numero: &str, db: &SurrealDbClient) -> Result<Self, AppError> {
        if !is_valid_expediente_numero(numero) {
            return Err(AppError::Validation(format!(
                "invalid expediente numero: {numero}"
            )));
        }

        if let Some(existing) = Self::by_numero(numero, db).await? {
            return Ok(existing);
        }

        let expediente = Self::new(numero.to_string());
        db.store_item(expediente.clone()).await?;
        Ok(expediente)
    }
}
