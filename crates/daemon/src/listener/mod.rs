// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for the voice tool surface.
//!
//! Accepts Unix-socket connections and handles one request per connection
//! without blocking the rest of the daemon. Commands forward to the
//! orchestrator; a client disconnect cancels the in-flight handler.

use std::sync::Arc;
use std::time::Instant;

use cvr_adapters::ContextLookup;
use cvr_core::id::{CommandId, InboxId};
use cvr_core::{Clock, SystemClock};
use cvr_wire::{ContextHitEntry, InboxEntry, Request, Response, SystemHealthSummary};
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::conversation::ConversationFeed;
use crate::env::{ipc_timeout, PROTOCOL_VERSION};
use crate::fanout::DaemonNotifier;
use crate::orchestrator::{Orchestrator, QuickDispatchResult, RuntimeError};

/// Shared daemon context for request handlers.
pub struct ListenCtx {
    pub orchestrator: Orchestrator,
    pub notifier: Arc<DaemonNotifier>,
    pub conversation: Arc<ConversationFeed>,
    pub context: Arc<dyn ContextLookup>,
    pub shutdown: Arc<Notify>,
    pub start_time: Instant,
}

/// Listener task for accepting tool-surface connections.
pub struct Listener {
    unix: UnixListener,
    ctx: Arc<ListenCtx>,
}

/// Errors from connection handling.
#[derive(Debug, Error)]
pub(crate) enum ConnectionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] cvr_wire::ProtocolError),
}

impl Listener {
    pub fn new(unix: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { unix, ctx }
    }

    /// Run the accept loop until the process exits, spawning a task per
    /// connection.
    pub async fn run(self) {
        loop {
            match self.unix.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        let (reader, writer) = stream.into_split();
                        if let Err(e) = handle_connection(reader, writer, &ctx).await {
                            log_connection_error(e);
                        }
                    });
                }
                Err(e) => error!("accept error: {}", e),
            }
        }
    }
}

fn log_connection_error(e: ConnectionError) {
    match e {
        ConnectionError::Protocol(cvr_wire::ProtocolError::ConnectionClosed) => {
            debug!("client disconnected")
        }
        ConnectionError::Protocol(cvr_wire::ProtocolError::Timeout) => {
            debug!("connection timeout")
        }
        _ => error!("connection error: {}", e),
    }
}

/// Handle a single client connection: one request, one response.
///
/// The handler races against client disconnect so an abandoned call does
/// not keep doing work.
async fn handle_connection<R, W>(
    mut reader: R,
    mut writer: W,
    ctx: &ListenCtx,
) -> Result<(), ConnectionError>
where
    R: tokio::io::AsyncRead + tokio::io::AsyncReadExt + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + tokio::io::AsyncWriteExt + Unpin + Send + 'static,
{
    let request = cvr_wire::read_request(&mut reader, ipc_timeout()).await?;

    if matches!(request, Request::GetStatus | Request::PollPendingDelivery) {
        debug!(request = ?request, "received query");
    } else {
        info!(request = ?request, "received request");
    }

    let response = tokio::select! {
        response = handle_request(request, ctx) => response,
        _ = detect_client_disconnect(&mut reader) => {
            debug!("client disconnected, dropping handler");
            return Ok(());
        }
    };

    cvr_wire::write_response(&mut writer, &response, ipc_timeout()).await?;
    Ok(())
}

/// In the one-request protocol the client sends nothing more until the
/// response; a read returning means EOF (disconnect).
async fn detect_client_disconnect<R: tokio::io::AsyncReadExt + Unpin>(reader: &mut R) {
    let mut buf = [0u8; 1];
    let _ = reader.read(&mut buf).await;
}

fn command_id(raw: Option<String>) -> Option<CommandId> {
    raw.map(CommandId::new)
}

fn error_response(e: RuntimeError) -> Response {
    Response::Error { message: e.to_string() }
}

/// Dispatch one request to the command surface.
async fn handle_request(request: Request, ctx: &ListenCtx) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Hello { version: _ } => {
            Response::Hello { version: PROTOCOL_VERSION.to_string() }
        }

        Request::CreateTask { title, priority, command_id: cid } => {
            match ctx.orchestrator.create_task(&title, priority.as_deref(), command_id(cid)) {
                Ok((task_id, topic)) => Response::TaskCreated {
                    task_id: task_id.as_str().to_string(),
                    topic: topic.as_str().to_string(),
                },
                Err(e) => error_response(e),
            }
        }

        Request::UpdateWorkingPrompt { task_id, delta_summary, content, command_id: cid } => {
            match ctx
                .orchestrator
                .update_working_prompt(&task_id, &delta_summary, &content, command_id(cid))
                .await
            {
                Ok(_) => Response::Ok,
                Err(e) => error_response(e),
            }
        }

        Request::RaiseQuestions { task_id, questions, command_id: cid } => {
            match ctx.orchestrator.raise_questions(&task_id, questions, command_id(cid)) {
                Ok(()) => Response::Ok,
                Err(e) => error_response(e),
            }
        }

        Request::AnswerQuestions { task_id, answers, command_id: cid } => {
            match ctx.orchestrator.answer_questions(&task_id, answers, command_id(cid)) {
                Ok(()) => Response::Ok,
                Err(e) => error_response(e),
            }
        }

        Request::FreezePrompt { task_id, spec, command_id: cid } => {
            match ctx.orchestrator.freeze_prompt(&task_id, spec, command_id(cid)).await {
                Ok(frozen) => Response::Frozen {
                    task_id,
                    handoff_md_path: frozen.handoff_md_path,
                    handoff_json_path: frozen.handoff_json_path,
                    digest: frozen.digest,
                    already_frozen: frozen.already_frozen,
                },
                Err(e) => error_response(e),
            }
        }

        Request::Dispatch { task_id, builder_kind, command_id: cid } => {
            match ctx.orchestrator.dispatch(&task_id, &builder_kind, command_id(cid)).await {
                Ok(outcome) => Response::Dispatched {
                    task_id,
                    session_id: outcome.session_id.to_string(),
                    reused: outcome.reused,
                },
                Err(e) => error_response(e),
            }
        }

        Request::ResolveGate { task_id, approve, command_id: cid } => {
            match ctx.orchestrator.resolve_gate(&task_id, approve, command_id(cid)).await {
                Ok(()) => Response::Ok,
                Err(e) => error_response(e),
            }
        }

        Request::Cancel { task_id, reason, command_id: cid } => {
            match ctx.orchestrator.cancel(&task_id, &reason, command_id(cid)).await {
                Ok(()) => Response::Pending {
                    task_id,
                    last_seq: ctx.orchestrator.log().last_seq(),
                },
                Err(e) => error_response(e),
            }
        }

        Request::LinkExternal { task_id, external_task_id, command_id: cid } => {
            match ctx.orchestrator.link_external(&task_id, &external_task_id, command_id(cid)) {
                Ok(()) => Response::Ok,
                Err(e) => error_response(e),
            }
        }

        Request::QuickDispatch { title, prompt, builder_kind, spec, command_id: cid } => {
            match ctx
                .orchestrator
                .quick_dispatch(&title, &prompt, &builder_kind, spec, command_id(cid))
                .await
            {
                Ok(QuickDispatchResult::Executed { task_id, session_id }) => {
                    Response::Dispatched {
                        task_id: task_id.as_str().to_string(),
                        session_id: session_id.to_string(),
                        reused: false,
                    }
                }
                Ok(QuickDispatchResult::Blocked { task_id, reason }) => Response::Error {
                    message: format!("quick dispatch blocked for {}: {}", task_id, reason),
                },
                Err(e) => error_response(e),
            }
        }

        Request::SendInput { task_id, content } => {
            match ctx.orchestrator.send_input(&task_id, &content).await {
                Ok(()) => Response::Ok,
                Err(e) => error_response(e),
            }
        }

        Request::RecordUtterance { role, text } => {
            ctx.conversation.append(role, &text, SystemClock.epoch_ms());
            Response::Ok
        }

        Request::GetStatus => status_response(ctx),

        Request::LookupContext { query } => {
            let hits = ctx
                .context
                .lookup_context(&query)
                .await
                .into_iter()
                .map(|h| ContextHitEntry { path: h.path, summary: h.summary, score: h.score })
                .collect();
            Response::ContextHits { hits }
        }

        Request::PollPendingDelivery => Response::Delivery {
            hints: ctx.notifier.poll_pending_delivery(SystemClock.epoch_ms()),
        },

        Request::AcknowledgeInbox { ids } => {
            let ids: Vec<InboxId> = ids.iter().map(InboxId::from_string).collect();
            let acked = ctx.notifier.acknowledge(&ids, SystemClock.epoch_ms());
            Response::Acknowledged {
                ids: acked.iter().map(|id| id.as_str().to_string()).collect(),
            }
        }

        Request::Shutdown => {
            ctx.shutdown.notify_one();
            Response::ShuttingDown
        }
    }
}

fn status_response(ctx: &ListenCtx) -> Response {
    let log = ctx.orchestrator.log();
    let pool = ctx.orchestrator.pool();
    let (tasks_active, unread, last_seq, inbox_unread) = log.with_state(|s| {
        (
            s.tasks.values().filter(|t| !t.is_terminal()).count(),
            s.unread_count(),
            s.last_seq,
            s.inbox.iter().filter(|i| i.is_unread()).map(InboxEntry::from).collect::<Vec<_>>(),
        )
    });
    let builders = pool
        .registry()
        .configs()
        .map(|c| cvr_wire::BuilderSummary {
            name: c.name.clone(),
            kind: c.kind.clone(),
            endpoint: c.endpoint.clone(),
            live_sessions: pool.live_count(&c.kind),
            max_sessions: c.limits.max_sessions,
        })
        .collect();
    Response::Status {
        health: SystemHealthSummary {
            uptime_secs: ctx.start_time.elapsed().as_secs(),
            last_seq,
            tasks_active,
            unread_inbox: unread,
            degraded: log.is_degraded(),
        },
        builders,
        inbox_unread,
    }
}
