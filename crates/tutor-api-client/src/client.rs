use crate::{
    Conversation, CreateConversationParams, SendMessageParams, TutorError, TutorReply, TutorResult,
};
use auth_engine::AccessTokenSource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, error};
use url::Url;

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Tutor API client. Requests carry the signed-in user's access token.
#[derive(Clone)]
pub struct TutorClient {
    http_client: reqwest::Client,
    base_url: Url,
    tokens: Arc<dyn AccessTokenSource>,
}

impl TutorClient {
    pub fn new(base_url: Url, tokens: Arc<dyn AccessTokenSource>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url,
            tokens,
        }
    }

    pub async fn create_conversation(
        &self,
        params: &CreateConversationParams,
    ) -> TutorResult<Conversation> {
        if params.language.trim().is_empty() {
            return Err(TutorError::InvalidRequest("language is required".to_string()));
        }
        let url = self.endpoint(&["conversations"])?;
        let conversation: Conversation = self.post(url, params, "create conversation").await?;
        debug!(conversation_id = %conversation.id, "Conversation created");
        Ok(conversation)
    }

    pub async fn send_message(&self, params: &SendMessageParams) -> TutorResult<TutorReply> {
        if params.text.trim().is_empty() {
            return Err(TutorError::InvalidRequest("message text is empty".to_string()));
        }
        let url = self.endpoint(&["conversations", &params.conversation_id, "messages"])?;
        self.post(url, &json!({ "text": params.text }), "send message")
            .await
    }

    /// URL of the synthesized audio for `text`. Pure string building; no
    /// request is made.
    pub fn audio_stream_url(
        &self,
        conversation_id: &str,
        text: &str,
        voice: Option<&str>,
    ) -> TutorResult<Url> {
        let mut url = self.endpoint(&["conversations", conversation_id, "audio"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("text", text);
            if let Some(voice) = voice {
                query.append_pair("voice", voice);
            }
        }
        Ok(url)
    }

    fn endpoint(&self, segments: &[&str]) -> TutorResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TutorError::InvalidRequest("base URL cannot have a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post<B, T>(&self, url: Url, body: &B, what: &str) -> TutorResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let token = self
            .tokens
            .access_token()
            .await?
            .ok_or(TutorError::NotAuthenticated)?;

        let response = self
            .http_client
            .post(url)
            .header("Authorization", format!("Bearer {}", token))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            error!(status = %status, body_summary = %body_summary, "Failed to {}", what);
            return Err(TutorError::Rejected {
                status: status.as_u16(),
                body_summary,
            });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth_engine::StaticAccessToken;

    fn client(token: Option<&str>) -> TutorClient {
        TutorClient::new(
            Url::parse("https://tutor.parlo.app/api/v1/").unwrap(),
            Arc::new(StaticAccessToken(token.map(str::to_string))),
        )
    }

    #[test]
    fn test_audio_stream_url_encodes_query() {
        let url = client(None)
            .audio_stream_url("c-1", "¿Qué tal? & bien", Some("lucia"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://tutor.parlo.app/api/v1/conversations/c-1/audio?text=%C2%BFQu%C3%A9+tal%3F+%26+bien&voice=lucia"
        );
    }

    #[test]
    fn test_audio_stream_url_without_voice() {
        let url = client(None).audio_stream_url("c-1", "hola", None).unwrap();
        assert_eq!(url.query(), Some("text=hola"));
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let url = client(None).endpoint(&["conversations", "a/b", "messages"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://tutor.parlo.app/api/v1/conversations/a%2Fb/messages"
        );
    }

    #[tokio::test]
    async fn test_requires_token() {
        let result = client(None)
            .send_message(&SendMessageParams {
                conversation_id: "c-1".to_string(),
                text: "hola".to_string(),
            })
            .await;
        assert!(matches!(result, Err(TutorError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_rejects_empty_message_before_network() {
        let result = client(Some("token"))
            .send_message(&SendMessageParams {
                conversation_id: "c-1".to_string(),
                text: "  ".to_string(),
            })
            .await;
        assert!(matches!(result, Err(TutorError::InvalidRequest(_))));
    }
}
