use bson::doc;
use futures::TryStreamExt;
use mongodb::{Client, Collection};

use crate::error::Result;
use crate::mongo::models::MongoMessage;

#[derive(Clone)]
pub struct MongoMessageRepository {
    collection: Collection<MongoMessage>,
}

impl MongoMessageRepository {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let collection = client.database(db_name).collection("chat_messages");
        Self { collection }
    }

    /// Save a single message
    pub async fn save_message(&self, message: &MongoMessage) -> Result<()> {
        self.collection.insert_one(message).await?;
        Ok(())
    }

    /// Get all messages for a session, oldest first
    pub async fn get_messages(&self, session_id: &str) -> Result<Vec<MongoMessage>> {
        let messages = self
            .collection
            .find(doc! { "session_id": session_id })
            .sort(doc! { "created_at": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(messages)
    }

    pub async fn delete_for_session(&self, session_id: &str) -> Result<u64> {
        let result = self
            .collection
            .delete_many(doc! { "session_id": session_id })
            .await?;
        Ok(result.deleted_count)
    }
}
