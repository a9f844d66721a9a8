use crate::errors::ToolError;
use crate::services::envelope::Envelope;
use crate::services::gateway::{ApiRequest, NextGenGateway};
use crate::services::logger::Logger;
use crate::services::session::ConversationContext;
use crate::services::tool_executor::{parse_args, ToolHandler};
use crate::utils::datetime::midnight_timestamp;
use crate::utils::location::created_resource_id;
use crate::utils::tool_errors::unknown_tool_error;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub const PATIENT_TOOLS: &[&str] = &["get_patient", "create_patient"];

#[derive(Debug, Clone, Deserialize)]
pub struct FindPatientArgs {
    pub first_name: String,
    pub last_name: String,
    pub birth_date: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePatientArgs {
    pub first_name: String,
    pub last_name: String,
    pub birth_date: String,
    pub sex: String,
    pub phone_number: String,
    pub email_address: String,
    #[serde(default)]
    pub ignore_duplicates: Option<bool>,
}

#[derive(Clone)]
pub struct PatientManager {
    logger: Logger,
    gateway: Arc<NextGenGateway>,
}

impl PatientManager {
    pub fn new(logger: Logger, gateway: Arc<NextGenGateway>) -> Self {
        Self {
            logger: logger.child("patients"),
            gateway,
        }
    }

    /// Looks a patient up by name and date of birth. Only a unique match is a success;
    /// several matches ask the caller for a phone number instead of picking one.
    pub async fn find_patient(&self, ctx: &ConversationContext, args: FindPatientArgs) -> Envelope {
        self.logger.info("Looking up patient", None);

        let mut request = ApiRequest::get("persons/lookup")
            .query("firstName", args.first_name)
            .query("lastName", args.last_name)
            .query("dateOfBirth", args.birth_date)
            .query("excludeExpired", "false");
        if let Some(phone) = args.phone_number.filter(|p| !p.trim().is_empty()) {
            request = request.query("phone", phone);
        }

        let response = match self.gateway.request(ctx, request).await {
            Ok(response) => response,
            Err(err) => return err.into(),
        };

        let patients = response.items();
        match patients.as_slice() {
            [] => {
                self.logger.info("No patient matched", None);
                Envelope::failure("Patient not found.").with("personId", Value::Null)
            }
            [patient] => {
                let person_id = patient.get("id").cloned().unwrap_or(Value::Null);
                self.logger.info(
                    "Found unique patient",
                    Some(&serde_json::json!({ "person_id": person_id })),
                );
                Envelope::success()
                    .with("personId", person_id)
                    .with_message("Patient found successfully.")
            }
            many => {
                self.logger.warn(
                    "Multiple patients matched",
                    Some(&serde_json::json!({ "matches": many.len() })),
                );
                Envelope::failure("Multiple patients found. Please ask for a phone number to confirm.")
                    .with("personId", Value::Null)
            }
        }
    }

    /// Creates a patient record. The new id comes from the `Location` header; when
    /// it cannot be read the record still exists upstream, so the call succeeds
    /// with an unconfirmed id.
    pub async fn create_patient(&self, ctx: &ConversationContext, args: CreatePatientArgs) -> Envelope {
        self.logger.info("Creating patient", None);

        let mut payload = serde_json::json!({
            "firstName": args.first_name,
            "lastName": args.last_name,
            "dateOfBirth": midnight_timestamp(&args.birth_date),
            "sex": args.sex,
            "homePhone": args.phone_number,
            "emailAddress": args.email_address,
        });
        if args.ignore_duplicates.unwrap_or(false) {
            payload["ignoreDuplicatePersons"] = Value::Bool(true);
        }

        let response = match self
            .gateway
            .request(ctx, ApiRequest::post("persons").json(payload))
            .await
        {
            Ok(response) => response,
            Err(err) => return err.into(),
        };

        match created_resource_id(&response) {
            Some(person_id) => {
                self.logger.info(
                    "Created patient",
                    Some(&serde_json::json!({ "person_id": person_id })),
                );
                Envelope::success()
                    .with("personId", person_id)
                    .with_message("New patient created successfully.")
            }
            None => {
                self.logger.warn(
                    "Patient created but Location header was missing or unparseable",
                    Some(&serde_json::json!({ "status": response.status_code })),
                );
                Envelope::success()
                    .with("personId", Value::Null)
                    .with_message("Patient was created, but the new ID could not be retrieved.")
            }
        }
    }

    pub async fn handle_tool(
        &self,
        tool: &str,
        ctx: &ConversationContext,
        args: Value,
    ) -> Result<Envelope, ToolError> {
        match tool {
            "get_patient" => Ok(self.find_patient(ctx, parse_args(tool, args)?).await),
            "create_patient" => Ok(self.create_patient(ctx, parse_args(tool, args)?).await),
            _ => Err(unknown_tool_error(tool, PATIENT_TOOLS)),
        }
    }
}

#[async_trait::async_trait]
impl ToolHandler for PatientManager {
    async fn handle(
        &self,
        tool: &str,
        ctx: &ConversationContext,
        args: Value,
    ) -> Result<Envelope, ToolError> {
        self.handle_tool(tool, ctx, args).await
    }
}
