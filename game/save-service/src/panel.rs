use async_trait::async_trait;
use serde_json::json;

/// Hosting-panel control plane: sends console commands to the game server.
#[async_trait]
pub trait PanelApi: Send + Sync {
    async fn send_console_command(&self, command: &str) -> anyhow::Result<()>;
    async fn available(&self) -> bool;
}

/// HTTP panel client. Posts the console command to the configured endpoint
/// with a bearer token.
pub struct HttpPanel {
    url: String,
    token: String,
    client: reqwest::Client,
}

impl HttpPanel {
    pub fn new(url: String, token: String) -> Self {
        Self {
            url,
            token,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PanelApi for HttpPanel {
    async fn send_console_command(&self, command: &str) -> anyhow::Result<()> {
        let res = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&json!({ "command": command }))
            .send()
            .await?;
        anyhow::ensure!(
            res.status().is_success(),
            "panel command rejected: {}",
            res.status()
        );
        Ok(())
    }

    async fn available(&self) -> bool {
        if self.url.is_empty() {
            return false;
        }
        match self.client.get(&self.url).bearer_auth(&self.token).send().await {
            Ok(res) => !res.status().is_server_error(),
            Err(_) => false,
        }
    }
}
