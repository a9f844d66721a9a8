use crate::constants::reasons;
use crate::services::envelope::Envelope;
use crate::services::gateway::{ApiRequest, NextGenGateway};
use crate::services::logger::Logger;
use crate::services::session::ConversationContext;
use serde_json::Value;
use std::sync::Arc;

/// Upstream reason list a mutating appointment call has to cite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonKind {
    Reschedule,
    Cancel,
}

impl ReasonKind {
    pub fn list_type(self) -> &'static str {
        match self {
            ReasonKind::Reschedule => reasons::RESCHEDULE_LIST_TYPE,
            ReasonKind::Cancel => reasons::CANCEL_LIST_TYPE,
        }
    }

    pub fn target_name(self) -> &'static str {
        match self {
            ReasonKind::Reschedule => reasons::RESCHEDULE_REASON_NAME,
            ReasonKind::Cancel => reasons::CANCEL_REASON_NAME,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReasonKind::Reschedule => "reschedule",
            ReasonKind::Cancel => "cancellation",
        }
    }

    fn filter(self) -> String {
        format!("type eq '{}'", self.list_type())
    }
}

/// Id of the first entry named exactly `name`. A match without a usable id counts as missing.
pub fn find_reason_id(items: &[Value], name: &str) -> Option<String> {
    let entry = items
        .iter()
        .find(|item| item.get("name").and_then(Value::as_str) == Some(name))?;
    match entry.get("id")? {
        Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[derive(Clone)]
pub struct ReasonResolver {
    logger: Logger,
    gateway: Arc<NextGenGateway>,
}

impl ReasonResolver {
    pub fn new(logger: Logger, gateway: Arc<NextGenGateway>) -> Self {
        Self {
            logger: logger.child("reasons"),
            gateway,
        }
    }

    /// Fetches the reason list for `kind` and scans it by name; nothing is cached.
    /// The `Err` envelope is the caller's final answer.
    pub async fn resolve(&self, ctx: &ConversationContext, kind: ReasonKind) -> Result<String, Envelope> {
        self.logger.info(
            "Fetching reason list",
            Some(&serde_json::json!({ "type": kind.list_type() })),
        );
        let request = ApiRequest::get("master/list-items").query("$filter", kind.filter());
        let response = match self.gateway.request(ctx, request).await {
            Ok(response) => response,
            Err(err) => {
                self.logger.error(
                    "Could not fetch reason list",
                    Some(&serde_json::json!({ "type": kind.list_type(), "error": err.to_string() })),
                );
                return Err(Envelope::failure(format!(
                    "Could not fetch {} reasons.",
                    kind.label()
                )));
            }
        };

        match find_reason_id(&response.items(), kind.target_name()) {
            Some(id) => {
                self.logger.info(
                    "Selected reason",
                    Some(&serde_json::json!({ "type": kind.list_type(), "reason_id": id })),
                );
                Ok(id)
            }
            None => {
                self.logger.error(
                    "Reason not present in upstream list",
                    Some(&serde_json::json!({ "type": kind.list_type(), "name": kind.target_name() })),
                );
                Err(Envelope::failure(format!(
                    "A valid {} reason ('{}') could not be found.",
                    kind.label(),
                    kind.target_name()
                )))
            }
        }
    }
}
