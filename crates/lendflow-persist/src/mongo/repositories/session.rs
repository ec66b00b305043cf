use bson::{doc, Bson};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{Client, Collection};

use crate::error::Result;
use crate::mongo::models::MongoSession;
use lendflow_types::DEFAULT_SESSION_TITLE;

#[derive(Clone)]
pub struct MongoSessionRepository {
    collection: Collection<MongoSession>,
}

impl MongoSessionRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("chat_sessions");
        Self { collection }
    }

    /// Insert unless the id exists; returns whether a document was inserted
    pub async fn insert_if_absent(&self, session: &MongoSession) -> Result<bool> {
        let mut fields = bson::to_document(session)?;
        fields.remove("_id");
        let filter = doc! { "_id": session.session_id.as_str() };
        let update = doc! { "$setOnInsert": fields };
        let result = self.collection.update_one(filter, update).upsert(true).await?;
        Ok(result.upserted_id.is_some())
    }

    /// Get session by ID
    pub async fn get(&self, session_id: &str) -> Result<Option<MongoSession>> {
        Ok(self.collection.find_one(doc! { "_id": session_id }).await?)
    }

    /// List sessions, most recently active first
    pub async fn list(&self, customer_id: Option<&str>, limit: i64) -> Result<Vec<MongoSession>> {
        let filter = match customer_id {
            Some(id) => doc! { "customer_id": id },
            None => doc! {},
        };
        let sessions = self
            .collection
            .find(filter)
            .sort(doc! { "updated_at": -1 })
            .limit(limit)
            .await?
            .try_collect()
            .await?;
        Ok(sessions)
    }

    pub async fn list_by_ids(&self, session_ids: &[String]) -> Result<Vec<MongoSession>> {
        let filter = doc! { "_id": { "$in": session_ids.to_vec() } };
        let sessions = self
            .collection
            .find(filter)
            .sort(doc! { "updated_at": -1 })
            .await?
            .try_collect()
            .await?;
        Ok(sessions)
    }

    /// Bump counters after a message was appended
    pub async fn record_message(&self, session_id: &str, preview: &str) -> Result<()> {
        let update = doc! {
            "$inc": { "message_count": 1_i64 },
            "$set": {
                "last_message_preview": preview,
                "updated_at": bson::DateTime::from_chrono(Utc::now()),
            }
        };
        self.collection
            .update_one(doc! { "_id": session_id }, update)
            .await?;
        Ok(())
    }

    /// Replace the title only while it is still the default
    pub async fn retitle_if_default(&self, session_id: &str, title: &str) -> Result<()> {
        let filter = doc! {
            "_id": session_id,
            "$or": [ { "title": DEFAULT_SESSION_TITLE }, { "title": Bson::Null } ],
        };
        self.collection
            .update_one(filter, doc! { "$set": { "title": title } })
            .await?;
        Ok(())
    }

    /// Returns false when no session matched
    pub async fn update_title(&self, session_id: &str, title: &str) -> Result<bool> {
        let update = doc! {
            "$set": {
                "title": title,
                "updated_at": bson::DateTime::from_chrono(Utc::now()),
            }
        };
        let result = self
            .collection
            .update_one(doc! { "_id": session_id }, update)
            .await?;
        Ok(result.matched_count > 0)
    }

    pub async fn delete(&self, session_id: &str) -> Result<bool> {
        let result = self.collection.delete_one(doc! { "_id": session_id }).await?;
        Ok(result.deleted_count > 0)
    }

    pub async fn claim_for_customer(&self, session_ids: &[String], customer_id: &str) -> Result<u64> {
        let filter = doc! {
            "_id": { "$in": session_ids.to_vec() },
            "customer_id": Bson::Null,
        };
        let update = doc! {
            "$set": {
                "customer_id": customer_id,
                "updated_at": bson::DateTime::from_chrono(Utc::now()),
            }
        };
        let result = self.collection.update_many(filter, update).await?;
        Ok(result.modified_count)
    }
}
