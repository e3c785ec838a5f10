//! HTTP chat client
//!
//! The façade over [`TransportSession`]. Every `send` builds a fresh
//! session and spawns it on the current tokio runtime; the client itself
//! only holds `Arc`-shared configuration and transport.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::traits::{ChatBackend, ChatError, SendOptions, StreamHandle};
use crate::config::ClientConfig;
use crate::messages::{ChatMessage, StreamChunk};
use crate::session::TransportSession;
use crate::sink::{ChannelSink, ChunkSink};
use crate::transport::{HttpTransport, ReqwestTransport};

/// Chat client over an [`HttpTransport`]
pub struct ChatClient<T: ?Sized = ReqwestTransport> {
    transport: Arc<T>,
    config: Arc<ClientConfig>,
}

impl<T: ?Sized> Clone for ChatClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: Arc::clone(&self.config),
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for ChatClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("endpoint", &self.config.backend.chat_url())
            .finish_non_exhaustive()
    }
}

impl ChatClient<ReqwestTransport> {
    /// Build a client with the default `reqwest` transport
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Config` for an invalid configuration and
    /// `ChatError::Transport` if the HTTP client cannot be built.
    pub fn from_config(config: ClientConfig) -> Result<Self, ChatError> {
        config.validate()?;
        let transport = ReqwestTransport::from_config(&config.backend)?;

        tracing::info!(
            endpoint = %config.backend.chat_url(),
            model = config.backend.model.as_deref().unwrap_or("-"),
            fallback = %config.fallback.policy,
            "Chat client configured"
        );

        Ok(Self::with_transport(Arc::new(transport), config))
    }
}

impl<T: HttpTransport + ?Sized> ChatClient<T> {
    /// Build a client over a custom transport
    #[must_use]
    pub fn with_transport(transport: Arc<T>, config: ClientConfig) -> Self {
        Self {
            transport,
            config: Arc::new(config),
        }
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start a session delivering into `sink`
    ///
    /// Returns immediately. `sink` is invoked sequentially from the session
    /// task, ending with at most one `Done` or `Error` chunk.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn send<S>(
        &self,
        messages: Vec<ChatMessage>,
        sink: S,
        options: SendOptions,
    ) -> StreamHandle
    where
        S: ChunkSink + 'static,
    {
        let token = options.session_token();
        let session = TransportSession::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.config),
            messages,
            token.clone(),
        );
        let id = session.id();
        let state = session.subscribe();
        let task = tokio::spawn(session.run(sink));

        StreamHandle::new(id, token, state, task)
    }
}

/// Adapter running a boxed sink through the generic session
struct BoxedSink(Box<dyn ChunkSink>);

#[async_trait]
impl ChunkSink for BoxedSink {
    async fn deliver(&mut self, chunk: StreamChunk) -> bool {
        self.0.deliver(chunk).await
    }
}

#[async_trait]
impl<T: HttpTransport + ?Sized> ChatBackend for ChatClient<T> {
    fn name(&self) -> &str {
        "http"
    }

    async fn health_check(&self) -> bool {
        let healthy = self.transport.probe(self.config.backend.base_url()).await;
        tracing::debug!(healthy, endpoint = self.config.backend.base_url(), "Health check");
        healthy
    }

    fn send_to_sink(
        &self,
        messages: Vec<ChatMessage>,
        sink: Box<dyn ChunkSink>,
        options: SendOptions,
    ) -> StreamHandle {
        self.send(messages, BoxedSink(sink), options)
    }

    fn send_streaming(
        &self,
        messages: Vec<ChatMessage>,
        options: SendOptions,
    ) -> (mpsc::Receiver<StreamChunk>, StreamHandle) {
        let (tx, rx) = mpsc::channel(self.config.stream.channel_capacity);
        let handle = self.send(messages, ChannelSink::new(tx), options);
        (rx, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::StreamExt;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use tokio_util::sync::CancellationToken;

    use crate::fallback::FallbackPolicy;
    use crate::session::{SessionOutcome, SessionState};
    use crate::transport::{TransportError, TransportRequest, TransportResponse};

    /// Event-stream transport that can hang after its scripted lines
    struct LineTransport {
        lines: Vec<&'static str>,
        hang: bool,
    }

    #[async_trait]
    impl HttpTransport for LineTransport {
        async fn post_stream(
            &self,
            _request: TransportRequest,
        ) -> Result<TransportResponse, TransportError> {
            let items: Vec<Result<Bytes, TransportError>> = self
                .lines
                .iter()
                .map(|line| Ok(Bytes::from_static(line.as_bytes())))
                .collect();
            let body = if self.hang {
                futures::stream::iter(items)
                    .chain(futures::stream::pending())
                    .boxed()
            } else {
                futures::stream::iter(items).boxed()
            };
            Ok(TransportResponse {
                status: 200,
                content_type: Some("text/event-stream".to_string()),
                body,
            })
        }

        async fn probe(&self, _url: &str) -> bool {
            true
        }
    }

    fn client(lines: Vec<&'static str>, hang: bool) -> ChatClient<LineTransport> {
        ChatClient::with_transport(Arc::new(LineTransport { lines, hang }), ClientConfig::default())
    }

    #[tokio::test]
    async fn test_send_delivers_to_closure_sink() {
        let client = client(vec!["data: Hello\n", "data: World\n", "data: [DONE]\n"], false);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);

        let handle = client.send(
            vec![ChatMessage::user("hi")],
            move |chunk: StreamChunk| sink_seen.lock().push(chunk),
            SendOptions::default(),
        );

        assert_eq!(handle.join().await.unwrap(), SessionOutcome::Completed);
        assert_eq!(
            *seen.lock(),
            vec![
                StreamChunk::text("Hello"),
                StreamChunk::text("World"),
                StreamChunk::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_send_message_aggregates() {
        let client = client(vec!["data: Hel", "lo\n", "data: [DONE]\n"], false);
        let reply = client.send_message(vec![ChatMessage::user("hi")]).await;
        assert_eq!(reply.unwrap(), "Hello");
    }

    #[tokio::test]
    async fn test_send_to_sink_boxed() {
        let client = client(vec!["data: x\n"], false);
        let (tx, mut rx) = mpsc::channel(4);
        let handle = client.send_to_sink(
            vec![ChatMessage::user("hi")],
            Box::new(ChannelSink::new(tx)),
            SendOptions::default(),
        );

        assert_eq!(rx.recv().await, Some(StreamChunk::text("x")));
        assert_eq!(rx.recv().await, Some(StreamChunk::Done));
        assert_eq!(handle.join().await.unwrap(), SessionOutcome::Completed);
    }

    #[tokio::test]
    async fn test_stream_yields_chunks() {
        let client = client(vec!["data: a\ndata: b\ndata: [DONE]\n"], false);
        let chunks: Vec<StreamChunk> = client.stream(vec![ChatMessage::user("hi")]).collect().await;
        assert_eq!(
            chunks,
            vec![StreamChunk::text("a"), StreamChunk::text("b"), StreamChunk::Done]
        );
    }

    #[tokio::test]
    async fn test_abort_stops_hanging_stream() {
        let client = client(vec!["data: first\n"], true);
        let (mut rx, handle) = client.send_streaming(vec![ChatMessage::user("hi")], SendOptions::default());

        assert_eq!(rx.recv().await, Some(StreamChunk::text("first")));
        handle.abort();
        handle.abort();

        assert_eq!(rx.recv().await, None);
        assert_eq!(handle.state(), SessionState::Cancelled);
        assert!(handle.is_finished());
        assert_eq!(handle.join().await.unwrap(), SessionOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_abort_after_completion_is_noop() {
        let client = client(vec!["data: [DONE]\n"], false);
        let (mut rx, handle) = client.send_streaming(vec![ChatMessage::user("hi")], SendOptions::default());
        assert_eq!(rx.recv().await, Some(StreamChunk::Done));
        assert_eq!(rx.recv().await, None);

        handle.abort();
        handle.abort();
        assert_eq!(handle.join().await.unwrap(), SessionOutcome::Completed);
    }

    #[tokio::test]
    async fn test_caller_token_cancels_but_abort_spares_it() {
        let client = client(vec!["data: first\n"], true);
        let parent = CancellationToken::new();

        let (mut rx, handle) = client.send_streaming(
            vec![ChatMessage::user("hi")],
            SendOptions::new().with_cancellation_token(parent.clone()),
        );
        assert_eq!(rx.recv().await, Some(StreamChunk::text("first")));
        handle.abort();
        assert!(!parent.is_cancelled());
        assert_eq!(handle.join().await.unwrap(), SessionOutcome::Cancelled);

        let (mut rx, handle) = client.send_streaming(
            vec![ChatMessage::user("hi")],
            SendOptions::new().with_cancellation_token(parent.clone()),
        );
        assert_eq!(rx.recv().await, Some(StreamChunk::text("first")));
        parent.cancel();
        assert_eq!(rx.recv().await, None);
        assert_eq!(handle.join().await.unwrap(), SessionOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_dropped_receiver_ends_session() {
        let client = client(vec!["data: a\n", "data: b\n"], true);
        let (rx, handle) = client.send_streaming(vec![ChatMessage::user("hi")], SendOptions::default());
        drop(rx);
        assert_eq!(handle.join().await.unwrap(), SessionOutcome::SinkClosed);
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let mut config = ClientConfig::default();
        config.backend.chat_path = "no-slash".to_string();
        assert!(matches!(ChatClient::from_config(config), Err(ChatError::Config(_))));
    }

    #[test]
    fn test_clone_shares_config() {
        let mut config = ClientConfig::default();
        config.fallback.policy = FallbackPolicy::Error;
        let client = ChatClient::with_transport(
            Arc::new(LineTransport { lines: vec![], hang: false }),
            config,
        );
        let cloned = client.clone();
        assert_eq!(cloned.config().fallback.policy, FallbackPolicy::Error);
        assert_eq!(cloned.name(), "http");
    }

    #[tokio::test]
    async fn test_health_check_uses_transport_probe() {
        assert!(client(vec![], false).health_check().await);
    }
}
