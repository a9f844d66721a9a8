use crate::errors::ToolError;
use crate::managers::appointments::AppointmentManager;
use crate::managers::patients::PatientManager;
use crate::managers::reasons::ReasonResolver;
use crate::mcp::catalog::tool_catalog;
use crate::services::config::Config;
use crate::services::gateway::NextGenGateway;
use crate::services::logger::Logger;
use crate::services::session::SessionStore;
use crate::services::tool_executor::{ToolExecutor, ToolHandler};
use std::collections::HashMap;
use std::sync::Arc;

pub struct App {
    pub logger: Logger,
    pub config: Arc<Config>,
    pub sessions: Arc<SessionStore>,
    pub gateway: Arc<NextGenGateway>,
    pub tool_executor: Arc<ToolExecutor>,
}

impl App {
    fn validate_tool_wiring(handlers: &HashMap<String, Arc<dyn ToolHandler>>) -> Result<(), ToolError> {
        let mut missing: Vec<String> = tool_catalog()
            .iter()
            .filter(|tool| !handlers.contains_key(&tool.name))
            .map(|tool| tool.name.clone())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(ToolError::internal("Tool wiring is incomplete")
            .with_hint("every tool in tool_catalog.json must have a handler")
            .with_details(serde_json::json!({ "missing_tools": missing })))
    }

    pub fn initialize() -> Result<Self, ToolError> {
        Self::from_config(Config::from_env())
    }

    pub fn from_config(config: Config) -> Result<Self, ToolError> {
        let logger = Logger::new("nextgen");
        let config = Arc::new(config);

        let sessions = Arc::new(SessionStore::new());
        let gateway = Arc::new(NextGenGateway::new(logger.clone(), config.clone()));
        let reasons = ReasonResolver::new(logger.clone(), gateway.clone());

        let patient_manager = Arc::new(PatientManager::new(logger.clone(), gateway.clone()));
        let appointment_manager = Arc::new(AppointmentManager::new(
            logger.clone(),
            gateway.clone(),
            reasons,
            config.detail_concurrency,
        ));

        let mut handlers: HashMap<String, Arc<dyn ToolHandler>> = HashMap::new();
        for tool in crate::managers::patients::PATIENT_TOOLS {
            handlers.insert(tool.to_string(), patient_manager.clone());
        }
        for tool in crate::managers::appointments::APPOINTMENT_TOOLS {
            handlers.insert(tool.to_string(), appointment_manager.clone());
        }

        Self::validate_tool_wiring(&handlers)?;

        let tool_executor = Arc::new(ToolExecutor::new(logger.clone(), handlers));
        logger.info(
            "Application initialized",
            Some(&serde_json::json!({
                "tools": tool_executor.tool_names(),
                "detail_concurrency": config.detail_concurrency,
                "request_timeout_ms": config.request_timeout.as_millis() as u64,
            })),
        );

        Ok(Self {
            logger,
            config,
            sessions,
            gateway,
            tool_executor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_catalogued_tool_is_wired() {
        let app = App::from_config(Config::default()).expect("wiring");
        for tool in tool_catalog() {
            assert!(app.tool_executor.has_handler(&tool.name), "{}", tool.name);
        }
    }

    #[test]
    fn missing_handler_is_reported() {
        let err = App::validate_tool_wiring(&HashMap::new()).expect_err("nothing wired");
        assert_eq!(err.code, "INTERNAL");
        let missing = err.details.expect("details")["missing_tools"]
            .as_array()
            .map(|items| items.len())
            .unwrap_or(0);
        assert_eq!(missing, 9);
    }
}
