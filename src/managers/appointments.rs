use crate::errors::ToolError;
use crate::managers::reasons::{ReasonKind, ReasonResolver};
use crate::services::envelope::Envelope;
use crate::services::gateway::{ApiRequest, NextGenGateway};
use crate::services::logger::Logger;
use crate::services::session::ConversationContext;
use crate::services::tool_executor::{parse_args, ToolHandler};
use crate::utils::datetime::splice_appointment_datetime;
use crate::utils::location::created_resource_id;
use crate::utils::tool_errors::unknown_tool_error;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub const APPOINTMENT_TOOLS: &[&str] = &[
    "get_appointment_categories",
    "get_category_events",
    "get_available_slots",
    "get_patient_appointments",
    "book_appointment",
    "reschedule_appointment",
    "cancel_appointment",
];

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryArgs {
    pub category_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotSearchArgs {
    pub category_id: String,
    pub start_date: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonArgs {
    pub person_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookAppointmentArgs {
    pub person_id: String,
    pub event_id: String,
    pub location_id: String,
    pub resource_id: String,
    pub appointment_date: String,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleAppointmentArgs {
    pub appointment_id: String,
    pub event_id: String,
    pub location_id: String,
    pub resource_id: String,
    pub appointment_date: String,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentArgs {
    pub appointment_id: String,
}

#[derive(Clone)]
pub struct AppointmentManager {
    logger: Logger,
    gateway: Arc<NextGenGateway>,
    reasons: ReasonResolver,
    detail_concurrency: usize,
}

impl AppointmentManager {
    pub fn new(
        logger: Logger,
        gateway: Arc<NextGenGateway>,
        reasons: ReasonResolver,
        detail_concurrency: usize,
    ) -> Self {
        Self {
            logger: logger.child("appointments"),
            gateway,
            reasons,
            detail_concurrency: detail_concurrency.max(1),
        }
    }

    pub async fn list_categories(&self, ctx: &ConversationContext) -> Envelope {
        self.list_named(
            ctx,
            ApiRequest::get("master/appointments/categories"),
            "categoryId",
            "categories",
        )
        .await
    }

    pub async fn list_events(&self, ctx: &ConversationContext, args: CategoryArgs) -> Envelope {
        let endpoint = format!("master/appointments/categories/{}/events", args.category_id);
        self.list_named(ctx, ApiRequest::get(endpoint), "eventId", "events")
            .await
    }

    async fn list_named(
        &self,
        ctx: &ConversationContext,
        request: ApiRequest,
        id_key: &str,
        output_key: &str,
    ) -> Envelope {
        let endpoint = request.endpoint.clone();
        let response = match self.gateway.request(ctx, request).await {
            Ok(response) => response,
            Err(err) => return err.into(),
        };

        let items = response.items();
        let mut projected = Vec::with_capacity(items.len());
        for item in &items {
            match project_named(item, id_key) {
                Some(entry) => projected.push(entry),
                None => self.logger.warn(
                    "Skipping malformed list item",
                    Some(&serde_json::json!({ "endpoint": endpoint, "item": item })),
                ),
            }
        }
        self.logger.info(
            "Listed items",
            Some(&serde_json::json!({
                "endpoint": endpoint,
                "received": items.len(),
                "kept": projected.len(),
            })),
        );
        Envelope::success().with(output_key, projected)
    }

    /// Slots at the resolved location that still have free capacity. The capacity
    /// check runs here, not upstream.
    pub async fn find_available_slots(
        &self,
        ctx: &ConversationContext,
        args: SlotSearchArgs,
    ) -> Envelope {
        let Some(location_id) = self.gateway.credentials(ctx).location_id else {
            self.logger
                .error("Slot search needs a location id but none is configured", None);
            return Envelope::failure(
                "Search cannot be performed because no location is configured.",
            );
        };

        let filter = format!(
            "categoryId eq guid'{}' and startDate eq dateTime'{}' and locationId eq guid'{}'",
            args.category_id, args.start_date, location_id
        );
        let request = ApiRequest::get("appointments/slots").query("$filter", filter);
        let response = match self.gateway.request(ctx, request).await {
            Ok(response) => response,
            Err(err) => return err.into(),
        };

        let slots = response.items();
        let mut available = Vec::new();
        for slot in &slots {
            match slot_has_capacity(slot) {
                Some(true) => available.push(slot.clone()),
                Some(false) => {}
                None => self.logger.warn(
                    "Skipping slot with non-numeric counts",
                    Some(&serde_json::json!({ "slot": slot })),
                ),
            }
        }
        self.logger.info(
            "Filtered slots",
            Some(&serde_json::json!({ "received": slots.len(), "available": available.len() })),
        );
        Envelope::success().with("available_slots", available)
    }

    /// Summary list first, then every detail record with at most
    /// `detail_concurrency` requests in flight. Failed detail fetches are dropped.
    pub async fn list_patient_appointments(
        &self,
        ctx: &ConversationContext,
        args: PersonArgs,
    ) -> Envelope {
        let summary_request = ApiRequest::get(format!("persons/{}/appointments", args.person_id));
        let summary = match self.gateway.request(ctx, summary_request).await {
            Ok(response) => response.items(),
            Err(err) => return err.into(),
        };
        if summary.is_empty() {
            self.logger.info("Patient has no upcoming appointments", None);
            return Envelope::success().with_message("This patient has no upcoming appointments.");
        }

        let categories: HashMap<String, Value> = summary
            .iter()
            .filter_map(|entry| {
                let id = id_text(entry.get("appointmentId"))?;
                Some((id, entry.get("categoryIds").cloned().unwrap_or(Value::Null)))
            })
            .collect();

        let details: Vec<Option<Value>> = stream::iter(summary.iter().cloned())
            .map(|entry| async move { self.fetch_detail(ctx, entry).await })
            .buffered(self.detail_concurrency)
            .collect()
            .await;

        let appointments: Vec<Value> = details
            .iter()
            .flatten()
            .map(|detail| format_appointment(detail, &categories))
            .collect();
        self.logger.info(
            "Fetched appointment details",
            Some(&serde_json::json!({
                "summary": summary.len(),
                "fetched": appointments.len(),
                "concurrency": self.detail_concurrency,
            })),
        );

        if appointments.is_empty() {
            self.logger
                .error("Could not retrieve details for any appointment", None);
            return Envelope::failure("Could not retrieve details for the patient's appointments.");
        }
        Envelope::success().with("appointments", appointments)
    }

    async fn fetch_detail(&self, ctx: &ConversationContext, entry: Value) -> Option<Value> {
        let Some(appointment_id) = id_text(entry.get("appointmentId")) else {
            self.logger.warn(
                "Appointment summary entry has no appointmentId",
                Some(&serde_json::json!({ "entry": entry })),
            );
            return None;
        };
        match self
            .gateway
            .request(ctx, ApiRequest::get(format!("appointments/{}", appointment_id)))
            .await
        {
            Ok(response) => match response.body {
                Value::Object(map) if !map.is_empty() => Some(Value::Object(map)),
                _ => None,
            },
            Err(err) => {
                self.logger.error(
                    "Failed to fetch appointment details",
                    Some(&serde_json::json!({
                        "appointment_id": appointment_id,
                        "error": err.to_string(),
                    })),
                );
                None
            }
        }
    }

    pub async fn book_appointment(
        &self,
        ctx: &ConversationContext,
        args: BookAppointmentArgs,
    ) -> Envelope {
        self.logger.info(
            "Booking appointment",
            Some(&serde_json::json!({ "appointment_date": args.appointment_date })),
        );
        let mut payload = booking_payload(
            &args.event_id,
            &args.location_id,
            &args.resource_id,
            &args.appointment_date,
            args.duration_minutes,
        );
        payload.insert("personId".to_string(), Value::String(args.person_id));

        let response = match self
            .gateway
            .request(ctx, ApiRequest::post("appointments").json(Value::Object(payload)))
            .await
        {
            Ok(response) => response,
            Err(err) => return err.into(),
        };

        match created_resource_id(&response) {
            Some(id) => {
                self.logger
                    .info("Booked appointment", Some(&serde_json::json!({ "appointment_id": id })));
                Envelope::success()
                    .with("appointmentId", id)
                    .with_message("Appointment booked successfully.")
            }
            None => {
                self.logger
                    .warn("Appointment booked but Location header was missing", None);
                Envelope::success()
                    .with("appointmentId", Value::Null)
                    .with_message("Appointment booked, but could not confirm the new ID.")
            }
        }
    }

    pub async fn reschedule_appointment(
        &self,
        ctx: &ConversationContext,
        args: RescheduleAppointmentArgs,
    ) -> Envelope {
        self.logger.info(
            "Rescheduling appointment",
            Some(&serde_json::json!({
                "appointment_id": args.appointment_id,
                "appointment_date": args.appointment_date,
            })),
        );
        let reason_id = match self.reasons.resolve(ctx, ReasonKind::Reschedule).await {
            Ok(id) => id,
            Err(envelope) => return envelope,
        };

        let mut payload = booking_payload(
            &args.event_id,
            &args.location_id,
            &args.resource_id,
            &args.appointment_date,
            args.duration_minutes,
        );
        payload.insert("rescheduleReasonId".to_string(), Value::String(reason_id));

        let endpoint = format!("appointments/{}/reschedule", args.appointment_id);
        let response = match self
            .gateway
            .request(ctx, ApiRequest::post(endpoint).json(Value::Object(payload)))
            .await
        {
            Ok(response) => response,
            Err(err) => return err.into(),
        };

        match created_resource_id(&response) {
            Some(id) => {
                self.logger.info(
                    "Rescheduled appointment",
                    Some(&serde_json::json!({ "new_appointment_id": id })),
                );
                Envelope::success()
                    .with("newAppointmentId", id)
                    .with_message("Appointment rescheduled successfully.")
            }
            None => {
                self.logger
                    .warn("Appointment rescheduled but Location header was missing", None);
                Envelope::success()
                    .with("newAppointmentId", Value::Null)
                    .with_message("Appointment rescheduled, but could not confirm the new ID.")
            }
        }
    }

    pub async fn cancel_appointment(&self, ctx: &ConversationContext, args: AppointmentArgs) -> Envelope {
        self.logger.info(
            "Cancelling appointment",
            Some(&serde_json::json!({ "appointment_id": args.appointment_id })),
        );
        let reason_id = match self.reasons.resolve(ctx, ReasonKind::Cancel).await {
            Ok(id) => id,
            Err(envelope) => return envelope,
        };

        let endpoint = format!("appointments/{}/cancel", args.appointment_id);
        let payload = serde_json::json!({ "cancelReasonId": reason_id });
        if let Err(err) = self
            .gateway
            .request(ctx, ApiRequest::post(endpoint).json(payload))
            .await
        {
            return err.into();
        }

        self.logger.info("Cancelled appointment", None);
        Envelope::success().with_message(format!(
            "Appointment {} canceled successfully.",
            args.appointment_id
        ))
    }

    pub async fn handle_tool(
        &self,
        tool: &str,
        ctx: &ConversationContext,
        args: Value,
    ) -> Result<Envelope, ToolError> {
        match tool {
            "get_appointment_categories" => Ok(self.list_categories(ctx).await),
            "get_category_events" => Ok(self.list_events(ctx, parse_args(tool, args)?).await),
            "get_available_slots" => {
                Ok(self.find_available_slots(ctx, parse_args(tool, args)?).await)
            }
            "get_patient_appointments" => {
                Ok(self.list_patient_appointments(ctx, parse_args(tool, args)?).await)
            }
            "book_appointment" => Ok(self.book_appointment(ctx, parse_args(tool, args)?).await),
            "reschedule_appointment" => {
                Ok(self.reschedule_appointment(ctx, parse_args(tool, args)?).await)
            }
            "cancel_appointment" => Ok(self.cancel_appointment(ctx, parse_args(tool, args)?).await),
            _ => Err(unknown_tool_error(tool, APPOINTMENT_TOOLS)),
        }
    }
}

#[async_trait::async_trait]
impl ToolHandler for AppointmentManager {
    async fn handle(
        &self,
        tool: &str,
        ctx: &ConversationContext,
        args: Value,
    ) -> Result<Envelope, ToolError> {
        self.handle_tool(tool, ctx, args).await
    }
}

fn id_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `{<id_key>: item.id, name: item.name}`, or `None` when either field is missing.
fn project_named(item: &Value, id_key: &str) -> Option<Value> {
    let id = item.get("id").filter(|v| !v.is_null())?;
    let name = item.get("name").filter(|v| !v.is_null())?;
    let mut out = Map::new();
    out.insert(id_key.to_string(), id.clone());
    out.insert("name".to_string(), name.clone());
    Some(Value::Object(out))
}

fn count(slot: &Value, key: &str) -> Option<f64> {
    match slot.get(key) {
        None | Some(Value::Null) => Some(0.0),
        Some(Value::Number(n)) => n.as_f64(),
        Some(_) => None,
    }
}

/// `Some(timeslotCount > appointmentCount)`; `None` when a count is not numeric.
fn slot_has_capacity(slot: &Value) -> Option<bool> {
    if !slot.is_object() {
        return None;
    }
    let timeslots = count(slot, "timeslotCount")?;
    let booked = count(slot, "appointmentCount")?;
    Some(timeslots > booked)
}

fn booking_payload(
    event_id: &str,
    location_id: &str,
    resource_id: &str,
    appointment_date: &str,
    duration_minutes: i64,
) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("eventId".to_string(), Value::String(event_id.to_string()));
    payload.insert("locationId".to_string(), Value::String(location_id.to_string()));
    payload.insert(
        "resourceIds".to_string(),
        Value::Array(vec![Value::String(resource_id.to_string())]),
    );
    payload.insert(
        "appointmentDate".to_string(),
        Value::String(appointment_date.to_string()),
    );
    payload.insert("durationMinutes".to_string(), Value::from(duration_minutes));
    payload
}

fn format_appointment(detail: &Value, categories: &HashMap<String, Value>) -> Value {
    let field = |key: &str| detail.get(key).cloned().unwrap_or(Value::Null);
    let appointment_id = field("id");
    let category_ids = id_text(Some(&appointment_id))
        .and_then(|id| categories.get(&id).cloned())
        .unwrap_or(Value::Null);
    let full_date = splice_appointment_datetime(
        detail.get("appointmentDate").and_then(Value::as_str).unwrap_or(""),
        detail.get("beginTime").and_then(Value::as_str).unwrap_or(""),
    )
    .unwrap_or_else(|| "N/A".to_string());

    serde_json::json!({
        "appointmentId": appointment_id,
        "fullAppointmentDate": full_date,
        "duration": field("duration"),
        "locationName": field("locationName"),
        "locationId": field("locationId"),
        "resourceIds": field("resourceIds"),
        "eventName": field("eventName"),
        "eventId": field("eventId"),
        "categoryIds": category_ids,
        "isCancelled": field("isCancelled"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::config::Config;
    use crate::services::session::SessionStore;

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn listing_future_is_send_for_dyn_handlers() {
        let logger = Logger::new("test");
        let gateway = Arc::new(NextGenGateway::new(logger.clone(), Arc::new(Config::default())));
        let reasons = ReasonResolver::new(logger.clone(), gateway.clone());
        let manager = AppointmentManager::new(logger, gateway, reasons, 2);
        let store = SessionStore::new();
        let ctx = store.context(Some("conv-send"), HashMap::new());

        let listing = manager.list_patient_appointments(
            &ctx,
            PersonArgs {
                person_id: "p-1".to_string(),
            },
        );
        assert_send(&listing);
        let dispatched = manager.handle("get_patient_appointments", &ctx, serde_json::json!({}));
        assert_send(&dispatched);
    }

    #[test]
    fn slot_capacity_requires_strictly_more_timeslots() {
        assert_eq!(
            slot_has_capacity(&serde_json::json!({"timeslotCount": 2, "appointmentCount": 1})),
            Some(true)
        );
        assert_eq!(
            slot_has_capacity(&serde_json::json!({"timeslotCount": 1, "appointmentCount": 1})),
            Some(false)
        );
        assert_eq!(
            slot_has_capacity(&serde_json::json!({"timeslotCount": 0, "appointmentCount": 3})),
            Some(false)
        );
    }

    #[test]
    fn missing_counts_default_to_zero_and_text_counts_are_skipped() {
        assert_eq!(slot_has_capacity(&serde_json::json!({"timeslotCount": 1})), Some(true));
        assert_eq!(slot_has_capacity(&serde_json::json!({})), Some(false));
        assert_eq!(
            slot_has_capacity(&serde_json::json!({"timeslotCount": "2", "appointmentCount": 0})),
            None
        );
        assert_eq!(slot_has_capacity(&serde_json::json!("slot")), None);
    }

    #[test]
    fn named_projection_skips_items_without_id_or_name() {
        assert_eq!(
            project_named(&serde_json::json!({"id": "c-1", "name": "New Patient", "x": 1}), "categoryId"),
            Some(serde_json::json!({"categoryId": "c-1", "name": "New Patient"}))
        );
        assert_eq!(project_named(&serde_json::json!({"name": "No id"}), "eventId"), None);
        assert_eq!(project_named(&serde_json::json!({"id": "e-1"}), "eventId"), None);
        assert_eq!(project_named(&serde_json::json!(42), "eventId"), None);
    }

    #[test]
    fn appointment_detail_is_reshaped_with_summary_categories() {
        let categories = HashMap::from([("a-1".to_string(), serde_json::json!(["c-1"]))]);
        let detail = serde_json::json!({
            "id": "a-1",
            "appointmentDate": "2024-06-03T00:00:00",
            "beginTime": "0915",
            "duration": 30,
            "locationName": "Main Clinic",
            "locationId": "l-1",
            "resourceIds": ["r-1"],
            "eventName": "Annual Physical",
            "eventId": "e-1",
            "isCancelled": false
        });
        let formatted = format_appointment(&detail, &categories);
        assert_eq!(formatted["fullAppointmentDate"], "2024-06-03T09:15:00");
        assert_eq!(formatted["categoryIds"], serde_json::json!(["c-1"]));
        assert_eq!(formatted["eventName"], "Annual Physical");
        assert_eq!(formatted["isCancelled"], false);
    }

    #[test]
    fn appointment_without_begin_time_gets_placeholder_date() {
        let formatted = format_appointment(
            &serde_json::json!({"id": "a-2", "appointmentDate": "2024-06-03T00:00:00"}),
            &HashMap::new(),
        );
        assert_eq!(formatted["fullAppointmentDate"], "N/A");
        assert_eq!(formatted["categoryIds"], Value::Null);
    }

    #[test]
    fn booking_payload_wraps_resource_in_list() {
        let payload = booking_payload("e-1", "l-1", "r-1", "2024-06-03T09:15:00", 30);
        assert_eq!(payload["resourceIds"], serde_json::json!(["r-1"]));
        assert_eq!(payload["durationMinutes"], 30);
        assert!(!payload.contains_key("personId"));
    }
}
