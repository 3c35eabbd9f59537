use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use surrealdb::sql::Thing;

use super::StoredObject;
use crate::{error::AppError, storage::db::SurrealDbClient};

struct FlexibleIdVisitor;

impl<'de> Visitor<'de> for FlexibleIdVisitor {
    type Value = String;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a string or a Thing")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(value.to_string())
    }

    fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(value)
    }

    fn visit_map<A>(self, map: A) -> Result<Self::Value, A::Error>
    where
        A: de::MapAccess<'de>,
    {
        let thing = Thing::deserialize(de::value::MapAccessDeserializer::new(map))?;
        Ok(thing.id.to_raw())
    }
}

fn deserialize_flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(FlexibleIdVisitor)
}

/// The pluggable-model knobs left to runtime configuration ("the specific embedding model,
/// LLM... are pluggable"). Everything admin/auth-shaped lived here in the inherited schema
/// and has no counterpart in this domain.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SystemSettings {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    pub embedding_model: String,
    pub embedding_dimensions: u32,
    pub query_model: String,
    pub image_processing_model: String,
    pub voice_processing_model: String,
}

impl StoredObject for SystemSettings {
    fn table_name() -> &'static str {
        "system_settings"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            id: "current".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: crate::storage::db::EMBEDDING_DIMENSION,
            query_model: "gpt-4o-mini".to_string(),
            image_processing_model: "gpt-4o-mini".to_string(),
            voice_processing_model: "whisper-1".to_string(),
        }
    }
}

impl SystemSettings {
    pub async fn get_current(db: &SurrealDbClient) -> Result<Self, AppError> {
        if let Some(settings) = db.get_item("current").await? {
            return Ok(settings);
        }
        let defaults = Self::default();
        db.store_item(defaults.clone()).await?;
        Ok(defaults)
    }

    pub async fn update(db: &SurrealDbClient, changes: Self) -> Result<Self, AppError> {
        let updated: Option<Self> = db
            .client
            .query("UPDATE type::thing('system_settings', 'current') MERGE $changes RETURN AFTER")
            .bind(("changes", changes))
            .await?
            .take(0)?;

        updated.ok_or(AppError::Validation(
            "Something went wrong updating the settings".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn get_current_initializes_defaults_on_first_call() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");

        let settings = SystemSettings::get_current(&db).await.expect("get current");
        assert_eq!(settings.id, "current");
        assert_eq!(settings.query_model, "gpt-4o-mini");

        let again = SystemSettings::get_current(&db).await.expect("get again");
        assert_eq!(settings.embedding_model, again.embedding_model);
    }

    #[tokio::test]
    async fn update_persists_changes() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");

        let mut settings = SystemSettings::get_current(&db).await.expect("get current");
        settings.query_model = "gpt-4".to_string();

        let updated = SystemSettings::update(&db, settings).await.expect("update");
        assert_eq!(updated.query_model, "gpt-4");

        let current = SystemSettings::get_current(&db).await.expect("get current");
        assert_eq!(current.query_model, "gpt-4");
    }
}
