//! Notification endpoints

use crate::WorkflowClient;
use crate::error::Result;
use stagehand_core::dto::event::StageEvent;

impl WorkflowClient {
    /// Publish a stage event to the notification endpoint
    pub async fn publish_event(&self, event: &StageEvent) -> Result<()> {
        let url = format!("{}/api/events", self.base_url);
        let response = self.authorized(self.client.post(&url)).json(event).send().await?;

        self.handle_empty_response(response).await
    }
}
