use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::HeaderValue;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::attachments::Attachment;
use crate::chat::{TurnOutcome, TurnUpdate};
use crate::config::{Config, Endpoints};
use crate::conversation::TurnId;
use crate::error::{ClientError, Result};
use crate::session::{SessionIdentity, SESSION_HEADER};
use crate::stream::{EventDecoder, StreamEvent, StreamProtocol};

pub const INGEST_SUCCESS: &str = "Files uploaded successfully.";

#[derive(Serialize)]
struct ChatRequest<'a> {
    question: &'a str,
}

/// HTTP side of the chat client: chat streaming, ingest and page fetches.
#[derive(Clone)]
pub struct RagClient {
    client: Client,
    endpoints: Endpoints,
    session: SessionIdentity,
    protocol: StreamProtocol,
}

impl RagClient {
    pub fn new(config: &Config, session: SessionIdentity) -> Self {
        Self::with_endpoints(config.endpoints(), config.stream_protocol(), session)
    }

    pub fn with_endpoints(endpoints: Endpoints, protocol: StreamProtocol, session: SessionIdentity) -> Self {
        Self {
            client: Client::new(),
            endpoints,
            session,
            protocol,
        }
    }

    pub fn session(&self) -> &SessionIdentity {
        &self.session
    }

    pub fn protocol(&self) -> StreamProtocol {
        self.protocol
    }

    /// Ask a question and feed every decoded event to `on_event` in order.
    ///
    /// JSON body without attachments, multipart (`question` + `file` parts)
    /// with them.
    pub async fn chat<F>(&self, question: &str, attachments: &[Attachment], on_event: F) -> Result<()>
    where
        F: FnMut(StreamEvent),
    {
        let request = self
            .client
            .post(self.endpoints.chat())
            .header(SESSION_HEADER, HeaderValue::from_str(self.session.token())?);

        let request = if attachments.is_empty() {
            request.json(&ChatRequest { question })
        } else {
            let form = attachments
                .iter()
                .fold(Form::new().text("question", question.to_string()), |form, file| {
                    form.part("file", file_part(file))
                });
            request.multipart(form)
        };

        tracing::info!(attachments = attachments.len(), "sending chat request");
        let response = ensure_success(request.send().await?).await?;

        let mut decoder = self.protocol.decoder();
        pump(response.bytes_stream(), decoder.as_mut(), on_event).await
    }

    /// Run one turn, forwarding events tagged with `turn`, and always finish
    /// with exactly one outcome update.
    pub async fn stream_turn(
        &self,
        turn: TurnId,
        question: String,
        attachments: Vec<Attachment>,
        cancel: CancellationToken,
        tx: UnboundedSender<TurnUpdate>,
    ) {
        let events = tx.clone();
        let run = self.chat(&question, &attachments, move |event| {
            let _ = events.send(TurnUpdate::event(turn, event));
        });

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(turn, "chat request aborted");
                TurnOutcome::Aborted
            }
            result = run => match result {
                Ok(()) => TurnOutcome::Completed,
                Err(err) => {
                    tracing::warn!(turn, %err, "chat request failed");
                    TurnOutcome::Failed(err.to_string())
                }
            },
        };

        let _ = tx.send(TurnUpdate::finished(turn, outcome));
    }

    /// Upload documents for indexing. Returns the server's status message.
    pub async fn ingest(&self, documents: &[Attachment]) -> Result<String> {
        let form = documents
            .iter()
            .fold(Form::new(), |form, file| form.part("file", file_part(file)));

        tracing::info!(documents = documents.len(), "uploading documents");
        let response = self
            .client
            .post(self.endpoints.ingest())
            .multipart(form)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let body = response.bytes().await.unwrap_or_default();
        let message = serde_json::from_slice::<Value>(&body)
            .ok()
            .and_then(|data| match data.get("message") {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
            })
            .filter(|m| !m.is_empty());

        Ok(message.unwrap_or_else(|| INGEST_SUCCESS.to_string()))
    }

    /// Single-page document for a cited source.
    pub async fn fetch_page(&self, doc_id: &str, page: &str) -> Result<Bytes> {
        let response = self.client.get(self.endpoints.page(doc_id, page)?).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.bytes().await?)
    }
}

fn file_part(file: &Attachment) -> Part {
    Part::bytes(file.bytes.to_vec()).file_name(file.name.clone())
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Read a body chunk by chunk through `decoder`.
///
/// Stops as soon as the decoder reports the terminator; a read error aborts
/// with that error after the events already emitted.
pub async fn pump<S, E, F>(body: S, decoder: &mut dyn EventDecoder, mut emit: F) -> Result<()>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Into<ClientError>,
    F: FnMut(StreamEvent),
{
    let mut body = std::pin::pin!(body);

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(Into::into)?;
        for event in decoder.feed(&chunk) {
            emit(event);
        }
        if decoder.is_done() {
            return Ok(());
        }
    }

    for event in decoder.finish() {
        emit(event);
    }
    Ok(())
}
