//! Message router: the single entry point for UI surface requests.
//!
//! `handle` always calls `respond` exactly once. Malformed messages, unknown
//! tags, handler errors and handler panics all become `{success: false,
//! error}` replies, and none of them affect the next message.

use crate::auth::AuthManager;
use crate::capture::{context_menu_content, CaptureCoordinator};
use crate::error::{RelayError, Result};
use crate::models::{Request, Response};
use crate::notes::NoteService;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub struct MessageRouter {
    auth: Arc<AuthManager>,
    notes: NoteService,
    capture: CaptureCoordinator,
}

impl MessageRouter {
    pub fn new(auth: Arc<AuthManager>, notes: NoteService, capture: CaptureCoordinator) -> Self {
        Self {
            auth,
            notes,
            capture,
        }
    }

    pub async fn handle<R>(&self, message: serde_json::Value, respond: R)
    where
        R: FnOnce(Response),
    {
        let response = match AssertUnwindSafe(self.handle_value(message))
            .catch_unwind()
            .await
        {
            Ok(response) => response,
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!(%detail, "message handler panicked");
                Response::failure(format!("Internal error: {}", detail))
            }
        };
        respond(response);
    }

    async fn handle_value(&self, message: serde_json::Value) -> Response {
        let request = match parse_request(message) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "rejected message");
                return Response::from_error(&e);
            }
        };

        let tag = request.tag();
        debug!(tag, "handling message");
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(tag, error = %e, "message failed");
                Response::from_error(&e)
            }
        }
    }

    pub async fn dispatch(&self, request: Request) -> Result<Response> {
        match request {
            Request::Authenticate => {
                let user = self.auth.authenticate().await?;
                Ok(Response {
                    user: Some(user),
                    ..Response::ok()
                })
            }
            Request::GetAuthStatus => {
                let snapshot = self.auth.snapshot();
                Ok(Response {
                    is_authenticated: Some(snapshot.session.is_some()),
                    user: snapshot.user().cloned(),
                    auth_state: Some(snapshot.state),
                    ..Response::ok()
                })
            }
            Request::SaveNote { data } => {
                let note_id = self.notes.save(&data.content, &data.context).await?;
                self.capture.resume_video();
                Ok(Response {
                    note_id: Some(note_id),
                    ..Response::ok()
                })
            }
            Request::GetNotes => {
                let notes = self.notes.list().await?;
                Ok(Response {
                    notes: Some(notes),
                    ..Response::ok()
                })
            }
            Request::Logout => {
                self.auth.logout().await;
                Ok(Response::ok())
            }
            Request::OpenFloatingWindow { context } => {
                self.capture.open(context);
                Ok(Response::ok())
            }
            Request::GetPendingContext => Ok(Response {
                context: self.capture.take_pending(),
                ..Response::ok()
            }),
            Request::ContextMenu { data } => {
                let content = context_menu_content(
                    data.menu_item_id,
                    data.selection_text.as_deref(),
                    &data.context,
                )
                .ok_or_else(|| RelayError::InvalidMessage("nothing to save".to_string()))?;
                let note_id = self.notes.save(&content, &data.context).await?;
                Ok(Response {
                    note_id: Some(note_id),
                    ..Response::ok()
                })
            }
            Request::QuickNote { data } => {
                let mut context = data.context;
                if let Some(content) = data.content.filter(|c| !c.trim().is_empty()) {
                    context.selection = Some(content);
                }
                self.capture.open(Some(context));
                Ok(Response::ok())
            }
            Request::CloseCapture => {
                self.capture.resume_video();
                Ok(Response::ok())
            }
        }
    }
}

fn parse_request(message: serde_json::Value) -> Result<Request> {
    let tag = message
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| RelayError::InvalidMessage("missing message type".to_string()))?;
    if !Request::TAGS.contains(&tag) {
        return Err(RelayError::InvalidMessage(format!(
            "Unknown message type: {}",
            tag
        )));
    }
    serde_json::from_value(message).map_err(|e| RelayError::InvalidMessage(e.to_string()))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
