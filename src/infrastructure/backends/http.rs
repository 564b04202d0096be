#[cfg(test)]
#[path = "http_test.rs"]
mod tests;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use chrono::SecondsFormat;
use futures::stream;
use futures::stream::TryStreamExt;
use futures::StreamExt;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Backend;
use crate::domain::models::BackendName;
use crate::domain::models::MessageStream;
use crate::domain::models::RawMessage;
use crate::domain::models::SenderRole;
use crate::domain::models::Timestamp;

fn convert_err(err: reqwest::Error) -> std::io::Error {
    let err_msg = err.to_string();
    return std::io::Error::new(std::io::ErrorKind::Interrupted, err_msg);
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct MessagesResponse {
    messages: Vec<RawMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest {
    text: String,
    sender_type: SenderRole,
}

/// REST + NDJSON messaging API.
pub struct Http {
    url: String,
    client: reqwest::Client,
}

impl Default for Http {
    fn default() -> Http {
        return Http::new(&Config::get(ConfigKey::BackendURL));
    }
}

impl Http {
    pub fn new(url: &str) -> Http {
        return Http {
            url: url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        };
    }

    fn conversation_url(&self, conversation_id: &str, path: &str) -> String {
        return format!(
            "{url}/conversations/{conversation_id}/{path}",
            url = self.url
        );
    }
}

#[async_trait]
impl Backend for Http {
    fn name(&self) -> BackendName {
        return BackendName::Http;
    }

    #[allow(clippy::implicit_return)]
    async fn fetch_older_messages(
        &self,
        conversation_id: &str,
        before: Option<Timestamp>,
        limit: usize,
    ) -> Result<Vec<RawMessage>> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(before) = before {
            query.push(("before", before.to_rfc3339_opts(SecondsFormat::AutoSi, true)));
        }

        let res = self
            .client
            .get(self.conversation_url(conversation_id, "messages"))
            .query(&query)
            .send()
            .await?;

        if !res.status().is_success() {
            tracing::error!(
                status = res.status().as_u16(),
                "Failed to fetch older messages"
            );
            bail!(format!(
                "Failed to fetch older messages, status {}",
                res.status().as_u16()
            ));
        }

        let body = res.json::<MessagesResponse>().await?;
        return Ok(body.messages);
    }

    #[allow(clippy::implicit_return)]
    async fn subscribe(&self, conversation_id: &str) -> Result<MessageStream> {
        let res = self
            .client
            .get(self.conversation_url(conversation_id, "stream"))
            .send()
            .await?;

        if !res.status().is_success() {
            tracing::error!(
                status = res.status().as_u16(),
                "Failed to open realtime stream"
            );
            bail!(format!(
                "Failed to open realtime stream, status {}",
                res.status().as_u16()
            ));
        }

        let bytes = res.bytes_stream().map_err(convert_err);
        let lines_reader = StreamReader::new(bytes).lines();

        // One message per line. A read error ends the stream after being
        // reported once.
        let messages = stream::unfold(Some(lines_reader), |state| async move {
            let mut lines_reader = state?;
            loop {
                match lines_reader.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let item = serde_json::from_str::<RawMessage>(&line).map_err(anyhow::Error::from);
                        return Some((item, Some(lines_reader)));
                    }
                    Ok(None) => return None,
                    Err(err) => return Some((Err(anyhow::Error::from(err)), None)),
                }
            }
        });

        return Ok(messages.boxed());
    }

    #[allow(clippy::implicit_return)]
    async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
        sender: SenderRole,
    ) -> Result<()> {
        let req = SendMessageRequest {
            text: text.to_string(),
            sender_type: sender,
        };

        let res = self
            .client
            .post(self.conversation_url(conversation_id, "messages"))
            .json(&req)
            .send()
            .await?;

        if !res.status().is_success() {
            tracing::error!(status = res.status().as_u16(), "Failed to send message");
            bail!(format!(
                "Failed to send message, status {}",
                res.status().as_u16()
            ));
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn mark_conversation_read(&self, conversation_id: &str) -> Result<()> {
        let res = self
            .client
            .post(self.conversation_url(conversation_id, "read"))
            .send()
            .await?;

        if !res.status().is_success() {
            tracing::error!(
                status = res.status().as_u16(),
                "Failed to mark conversation as read"
            );
            bail!(format!(
                "Failed to mark conversation as read, status {}",
                res.status().as_u16()
            ));
        }

        return Ok(());
    }
}
