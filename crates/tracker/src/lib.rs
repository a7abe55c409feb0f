use async_trait::async_trait;
use reqwest::Client;
use shared::domain::{ProjectId, Story};
use thiserror::Error;
use url::Url;

const TRACKER_TOKEN_HEADER: &str = "X-TrackerToken";

/// Transport errors and non-success responses are one opaque failure
/// category; the pipeline does not distinguish them.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("invalid tracker endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait TrackerClient: Send + Sync {
    /// Fetches the project's finished stories, in the tracker's order.
    async fn fetch_finished_stories(
        &self,
        project_id: &ProjectId,
        auth_token: &str,
    ) -> Result<Vec<Story>, TrackerError>;
}

/// REST client for a Pivotal-style tracker API.
pub struct PivotalTracker {
    http: Client,
    base_url: Url,
}

impl PivotalTracker {
    pub fn new(http: Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    fn stories_endpoint(&self, project_id: &ProjectId) -> Result<Url, url::ParseError> {
        self.base_url
            .join(&format!("services/v5/projects/{project_id}/stories"))
    }
}

#[async_trait]
impl TrackerClient for PivotalTracker {
    async fn fetch_finished_stories(
        &self,
        project_id: &ProjectId,
        auth_token: &str,
    ) -> Result<Vec<Story>, TrackerError> {
        let endpoint = self.stories_endpoint(project_id)?;
        let stories = self
            .http
            .get(endpoint)
            .query(&[("date_format", "millis"), ("with_state", "finished")])
            .header(TRACKER_TOKEN_HEADER, auth_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(stories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stories_endpoint_embeds_project_id() {
        let client = PivotalTracker::new(
            Client::new(),
            Url::parse("https://www.pivotaltracker.com").expect("base url"),
        );
        let project = ProjectId::extract("1234567").expect("project id");
        let endpoint = client.stories_endpoint(&project).expect("endpoint");
        assert_eq!(
            endpoint.as_str(),
            "https://www.pivotaltracker.com/services/v5/projects/1234567/stories"
        );
    }

    #[test]
    fn story_payload_ignores_extra_fields() {
        let stories: Vec<Story> = serde_json::from_value(serde_json::json!([
            {
                "id": 555,
                "name": "Fix the login flow",
                "url": "https://www.pivotaltracker.com/story/show/555",
                "current_state": "finished",
                "estimate": 2
            }
        ]))
        .expect("stories");
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].name, "Fix the login flow");
        assert_eq!(
            stories[0].url,
            "https://www.pivotaltracker.com/story/show/555"
        );
    }
}
