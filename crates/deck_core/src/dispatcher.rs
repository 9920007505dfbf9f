use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DeckError;

pub const GCODE_SCRIPT_PATH: &str = "/printer/gcode/script";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcodeScriptRequest {
    pub script: String,
}

/// Carries one command to the controller's script endpoint.
#[async_trait]
pub trait CommandTransport: Send + Sync {
    async fn post_script(&self, url: &str, request: &GcodeScriptRequest) -> Result<(), DeckError>;
}

pub struct HttpCommandTransport {
    http: Client,
}

impl HttpCommandTransport {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

impl Default for HttpCommandTransport {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

#[async_trait]
impl CommandTransport for HttpCommandTransport {
    async fn post_script(&self, url: &str, request: &GcodeScriptRequest) -> Result<(), DeckError> {
        let response = self.http.post(url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeckError::transport(format!(
                "controller request failed with status {status}"
            )));
        }
        debug!(%url, %status, "controller accepted command");
        Ok(())
    }
}

#[derive(Clone)]
pub struct CommandDispatcher {
    transport: Arc<dyn CommandTransport>,
}

impl CommandDispatcher {
    pub fn new(transport: Arc<dyn CommandTransport>) -> Self {
        Self { transport }
    }

    pub async fn send(&self, endpoint_base_url: &str, command: &str) -> Result<(), DeckError> {
        let base = endpoint_base_url.trim();
        if base.is_empty() {
            return Err(DeckError::configuration("controller URL is not configured"));
        }
        let command = command.trim();
        if command.is_empty() {
            return Err(DeckError::configuration("no command configured"));
        }

        let url = script_url(base);
        debug!(%url, command, "sending command");
        self.transport
            .post_script(
                &url,
                &GcodeScriptRequest {
                    script: command.to_string(),
                },
            )
            .await
    }
}

pub fn script_url(endpoint_base_url: &str) -> String {
    format!(
        "{}{GCODE_SCRIPT_PATH}",
        endpoint_base_url.trim_end_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use tokio::net::TcpListener;

    use super::*;

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl CommandTransport for RecordingTransport {
        async fn post_script(
            &self,
            url: &str,
            request: &GcodeScriptRequest,
        ) -> Result<(), DeckError> {
            self.calls
                .lock()
                .expect("calls")
                .push((url.to_string(), request.script.clone()));
            Ok(())
        }
    }

    fn http_dispatcher() -> CommandDispatcher {
        CommandDispatcher::new(Arc::new(HttpCommandTransport::default()))
    }

    #[test]
    fn script_url_strips_trailing_slashes() {
        assert_eq!(
            script_url("http://printer:7125///"),
            "http://printer:7125/printer/gcode/script"
        );
        assert_eq!(
            script_url("http://printer:7125"),
            "http://printer:7125/printer/gcode/script"
        );
    }

    #[tokio::test]
    async fn missing_endpoint_or_command_is_configuration_error() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = CommandDispatcher::new(transport.clone());

        let err = dispatcher.send("  ", "G28").await.expect_err("no endpoint");
        assert!(matches!(err, DeckError::Configuration(_)));
        let err = dispatcher
            .send("http://printer", "")
            .await
            .expect_err("no command");
        assert!(matches!(err, DeckError::Configuration(_)));

        assert!(transport.calls.lock().expect("calls").is_empty());
    }

    #[tokio::test]
    async fn sends_trimmed_command_to_normalized_url() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = CommandDispatcher::new(transport.clone());

        dispatcher
            .send("http://printer/", "  G28 X ")
            .await
            .expect("send");

        assert_eq!(
            transport.calls.lock().expect("calls").as_slice(),
            &[(
                "http://printer/printer/gcode/script".to_string(),
                "G28 X".to_string()
            )]
        );
    }

    async fn spawn_controller(status: StatusCode) -> (String, Arc<Mutex<Vec<String>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                GCODE_SCRIPT_PATH,
                post(
                    move |State(received): State<Arc<Mutex<Vec<String>>>>,
                          Json(body): Json<GcodeScriptRequest>| async move {
                        received.lock().expect("received").push(body.script);
                        (status, Json(serde_json::json!({"result": "ok"})))
                    },
                ),
            )
            .with_state(received.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{addr}"), received)
    }

    #[tokio::test]
    async fn http_transport_posts_script_body() {
        let (base_url, received) = spawn_controller(StatusCode::OK).await;
        let dispatcher = http_dispatcher();

        dispatcher
            .send(&format!("{base_url}/"), "M117 hello")
            .await
            .expect("send");

        assert_eq!(
            received.lock().expect("received").as_slice(),
            &["M117 hello".to_string()]
        );
    }

    #[tokio::test]
    async fn http_transport_maps_error_status_to_transport_error() {
        let (base_url, _received) = spawn_controller(StatusCode::SERVICE_UNAVAILABLE).await;
        let dispatcher = http_dispatcher();

        let err = dispatcher.send(&base_url, "G28").await.expect_err("503");
        assert!(matches!(err, DeckError::Transport(_)), "unexpected: {err}");
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn http_transport_maps_connection_failure_to_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let err = http_dispatcher()
            .send(&format!("http://{addr}"), "G28")
            .await
            .expect_err("refused");
        assert!(matches!(err, DeckError::Transport(_)), "unexpected: {err}");
    }
}
