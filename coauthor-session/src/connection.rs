//! Per-connection reader/writer tasks and message dispatch.

use std::sync::Arc;
use std::time::Duration;

use coauthor_collab::{CollabError, CollabService};
use coauthor_presence::PresenceStore;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Semaphore};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::hub::{ConnectionHandle, ConnectionId, Hub};
use crate::message::{ClientMessage, MemberEntry, ServerMessage};

/// Per-connection behavior knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Presence TTL refreshed by heartbeat/join/create
    pub heartbeat_ttl: Duration,
    /// Deadline for one submit (semaphore wait included)
    pub submit_deadline: Duration,
    /// Outbound queue capacity per connection
    pub outbound_capacity: usize,
    /// Cap on concurrent submits across all connections
    pub max_concurrent_submits: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_ttl: Duration::from_secs(600),
            submit_deadline: Duration::from_millis(200),
            outbound_capacity: 32,
            max_concurrent_submits: 100,
        }
    }
}

/// Services shared by every connection.
pub struct SessionContext {
    pub hub: Arc<Hub>,
    pub collab: Arc<CollabService>,
    pub presence: Arc<dyn PresenceStore>,
    pub config: SessionConfig,
    /// Submit gate shared across connections
    submit_gate: Semaphore,
}

impl SessionContext {
    /// Bundle the shared services.
    pub fn new(
        hub: Arc<Hub>,
        collab: Arc<CollabService>,
        presence: Arc<dyn PresenceStore>,
        config: SessionConfig,
    ) -> Self {
        let submit_gate = Semaphore::new(config.max_concurrent_submits.max(1));
        Self {
            hub,
            collab,
            presence,
            config,
            submit_gate,
        }
    }
}

/// One authenticated session. Owned by its reader task; the writer task
/// and the hub only see the [`ConnectionHandle`].
pub struct Connection {
    pub id: ConnectionId,
    user_id: u64,
    username: String,
    doc_id: Option<String>,
    ctx: Arc<SessionContext>,
    handle: ConnectionHandle,
}

/// Run a connection to completion: register with the hub, spawn the
/// writer, send the welcome, pump the reader, then tear everything down.
pub async fn run<S>(ctx: Arc<SessionContext>, ws: WebSocketStream<S>, user_id: u64, username: String)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = ws.split();
    let (tx, rx) = mpsc::channel(ctx.config.outbound_capacity.max(1));

    let connection_id = Uuid::new_v4().to_string();
    let handle = ConnectionHandle::new(connection_id.clone(), user_id, tx);
    ctx.hub.register_connection(handle.clone());

    let writer = tokio::spawn(write_loop(sink, rx));

    handle.enqueue(ServerMessage::Welcome {
        content: format!("Welcome, {username}"),
    });

    let mut connection = Connection {
        id: connection_id.clone(),
        user_id,
        username,
        doc_id: None,
        ctx: Arc::clone(&ctx),
        handle,
    };
    connection.read_loop(stream).await;

    // symmetric removal: the hub forgets the connection and its room, and
    // closing the queue lets the writer drain and exit
    ctx.hub.unregister_connection(&connection_id);
    drop(connection);
    let _ = writer.await;
    debug!(connection_id = %connection_id, "connection closed");
}

/// Consume the outbound queue, writing each message as a JSON text frame.
/// Exits when the queue closes or the socket rejects a write.
async fn write_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut rx: mpsc::Receiver<ServerMessage>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "failed to serialize server message");
                continue;
            }
        };
        if let Err(err) = sink.send(Message::Text(json.into())).await {
            warn!(error = %err, "failed to write message");
            break;
        }
    }
    let _ = sink.close().await;
}

impl Connection {
    async fn read_loop<S>(&mut self, mut stream: SplitStream<WebSocketStream<S>>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    let message: ClientMessage = match serde_json::from_str(&text) {
                        Ok(message) => message,
                        Err(err) => {
                            debug!(
                                user_id = self.user_id,
                                error = %err,
                                "malformed client message"
                            );
                            self.reply(ServerMessage::Error {
                                content: "BAD_REQUEST".into(),
                            });
                            continue;
                        }
                    };
                    self.dispatch(message).await;
                }
                Ok(Message::Close(_)) => break,
                // pings are answered by the protocol layer
                Ok(_) => {}
                Err(err) => {
                    debug!(
                        user_id = self.user_id,
                        doc_id = self.doc_id.as_deref().unwrap_or(""),
                        error = %err,
                        "read error"
                    );
                    break;
                }
            }
        }
    }

    fn reply(&self, message: ServerMessage) {
        self.handle.enqueue(message);
    }

    /// Route one client message.
    pub async fn dispatch(&mut self, message: ClientMessage) {
        match message.kind.as_str() {
            "heartbeat" => self.handle_heartbeat().await,
            "createDocument" => self.handle_create_document(&message.doc_title).await,
            "joinDocument" => self.handle_join_document(&message.doc_title).await,
            "show_alive_members" => self.handle_show_alive_members().await,
            "op_submit" => self.handle_op_submit(message).await,
            "saveDocument" => self.handle_save_document(&message.doc_id).await,
            "loadDocumentContent" => self.handle_load_document(&message.doc_id).await,
            _ => self.reply(ServerMessage::Ignored {
                content: "Unknown message type".into(),
            }),
        }
    }

    async fn handle_heartbeat(&mut self) {
        if let Some(doc_id) = self.doc_id.clone() {
            if let Err(err) = self
                .ctx
                .presence
                .add_member(
                    &doc_id,
                    self.user_id,
                    &self.username,
                    self.ctx.config.heartbeat_ttl,
                )
                .await
            {
                warn!(doc_id = %doc_id, error = %err, "presence refresh failed");
            }

            match self.ctx.presence.get_alive_members_with_names(&doc_id).await {
                Ok(members) => {
                    for member in members {
                        self.reply(ServerMessage::Presence {
                            doc_id: doc_id.clone(),
                            content: format!(
                                "User {}({}) is online",
                                member.user_id, member.username
                            ),
                        });
                    }
                }
                Err(err) => warn!(doc_id = %doc_id, error = %err, "presence read failed"),
            }
        }

        self.reply(ServerMessage::Feedback {
            content: "Heartbeat received".into(),
        });
    }

    async fn handle_create_document(&mut self, title: &str) {
        let doc_id = match self.ctx.collab.create_document(self.user_id, title).await {
            Ok(doc_id) => doc_id,
            Err(err) => {
                warn!(title = %title, error = %err, "create document failed");
                self.reply(ServerMessage::Error {
                    content: "CREATE_DOC_FAILED".into(),
                });
                return;
            }
        };

        // make the new document discoverable right away; the creator still
        // joins explicitly
        if let Err(err) = self
            .ctx
            .presence
            .add_member(
                &doc_id,
                self.user_id,
                &self.username,
                self.ctx.config.heartbeat_ttl,
            )
            .await
        {
            warn!(doc_id = %doc_id, error = %err, "presence add failed");
        }

        self.reply(ServerMessage::CreateDocument {
            doc_id: doc_id.clone(),
            content: format!("Document {doc_id} created by user {}", self.user_id),
        });
    }

    async fn handle_join_document(&mut self, title: &str) {
        let target = if title.is_empty() {
            self.doc_id.clone()
        } else {
            match self.ctx.collab.get_document_id(title).await {
                Ok(doc_id) => Some(doc_id),
                Err(err) => {
                    warn!(title = %title, error = %err, "resolve document failed");
                    self.reply(ServerMessage::Error {
                        content: "GET_DOCID_FAILED".into(),
                    });
                    return;
                }
            }
        };
        let Some(doc_id) = target else {
            self.reply(ServerMessage::Error {
                content: "GET_DOCID_FAILED".into(),
            });
            return;
        };

        let documents = match self.ctx.presence.get_documents().await {
            Ok(documents) => documents,
            Err(err) => {
                warn!(error = %err, "list documents failed");
                Vec::new()
            }
        };
        if !documents.contains(&doc_id) {
            self.reply(ServerMessage::JoinDocument {
                doc_id: doc_id.clone(),
                content: format!("Document {doc_id} not found"),
            });
            return;
        }

        if let Some(previous) = self.doc_id.take() {
            if previous != doc_id {
                self.ctx.hub.leave(&previous, &self.id);
            }
        }
        self.doc_id = Some(doc_id.clone());
        self.ctx.hub.join(&doc_id, &self.id);

        if let Err(err) = self
            .ctx
            .presence
            .add_member(
                &doc_id,
                self.user_id,
                &self.username,
                self.ctx.config.heartbeat_ttl,
            )
            .await
        {
            warn!(doc_id = %doc_id, error = %err, "presence add failed");
        }

        self.reply(ServerMessage::JoinDocument {
            doc_id: doc_id.clone(),
            content: format!("Document {doc_id} joined by user {}", self.user_id),
        });
    }

    async fn handle_show_alive_members(&mut self) {
        let members = match &self.doc_id {
            Some(doc_id) => match self.ctx.presence.get_alive_members_with_names(doc_id).await {
                Ok(members) => members
                    .into_iter()
                    .map(|m| MemberEntry {
                        user_id: m.user_id,
                        username: m.username,
                    })
                    .collect(),
                Err(err) => {
                    warn!(doc_id = %doc_id, error = %err, "presence read failed");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let content = format!(
            "Alive members: {:?}",
            members.iter().map(|m| m.user_id).collect::<Vec<_>>()
        );
        self.reply(ServerMessage::ShowAliveMembers { members, content });
    }

    async fn handle_op_submit(&mut self, message: ClientMessage) {
        let order = self.ctx.hub.room_order(&message.doc_id);

        let submitted = tokio::time::timeout(self.ctx.config.submit_deadline, async {
            let _permit = self
                .ctx
                .submit_gate
                .acquire()
                .await
                .map_err(|_| CollabError::Timeout)?;
            // ordering lock: broadcasts are enqueued in revision order
            let _order = order.lock().await;

            let applied = self
                .ctx
                .collab
                .submit(
                    &message.doc_id,
                    self.user_id,
                    message.base_revision,
                    &message.client_id,
                    message.client_seq,
                    message.ops.clone(),
                )
                .await?;

            self.ctx.hub.broadcast_applied_op(
                &message.doc_id,
                &self.id,
                &applied,
                &message.client_id,
                message.client_seq,
            );
            Ok::<_, CollabError>(applied)
        })
        .await;

        match submitted {
            Err(_) => self.reply(ServerMessage::Error {
                content: CollabError::Timeout.code().into(),
            }),
            Ok(Err(err)) => self.reply(ServerMessage::Error {
                content: err.code().into(),
            }),
            Ok(Ok(applied)) => self.reply(ServerMessage::OpApplied {
                doc_id: message.doc_id,
                base_revision: message.base_revision,
                current_revision: applied.revision,
                client_id: message.client_id,
                client_seq: message.client_seq,
            }),
        }
    }

    async fn handle_save_document(&mut self, doc_id: &str) {
        match self.ctx.collab.save_snapshot(doc_id).await {
            Ok(()) => self.reply(ServerMessage::SaveDocument {
                content: format!("Document {doc_id} saved"),
            }),
            Err(err) => {
                warn!(doc_id = %doc_id, error = %err, "save document failed");
                self.reply(ServerMessage::SaveDocument {
                    content: format!("Document {doc_id} save failed"),
                });
            }
        }
    }

    async fn handle_load_document(&mut self, doc_id: &str) {
        match self.ctx.collab.load_document_content(doc_id).await {
            Ok((content, revision)) => {
                self.reply(ServerMessage::LoadDocumentContent { content, revision })
            }
            Err(err) => {
                warn!(doc_id = %doc_id, error = %err, "load document failed");
                self.reply(ServerMessage::Error {
                    content: err.code().into(),
                });
            }
        }
    }
}
