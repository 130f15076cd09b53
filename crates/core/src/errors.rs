use thiserror::Error;

use crate::gate::GateError;
use crate::records::RecordError;
use crate::scheduling::{CronError, ScheduleError};
use crate::tools::handler::ToolError;
use crate::tools::registry::RegistryError;

/// Any error a core operation can surface to an outer layer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Cron(#[from] CronError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Tool(#[from] ToolError),
}

impl CoreError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Registry(error) => error.error_class(),
            Self::Gate(error) => error.error_class(),
            Self::Schedule(error) => error.error_class(),
            Self::Cron(_) => "invalid_schedule",
            Self::Record(RecordError::NotFound(_)) => "not_found",
            Self::Record(RecordError::Invalid(_)) => "validation",
            Self::Tool(error) => error.error_class(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.error_class() == "not_found"
    }

    pub fn user_message(&self) -> &'static str {
        match self.error_class() {
            "not_found" => "The referenced call or schedule does not exist or is no longer active.",
            "unknown_tool" => "The requested tool is not available.",
            "validation" | "invalid_schedule" => {
                "The request could not be processed. Check inputs and try again."
            }
            "invalid_transition" | "already_resolved" => {
                "The call is not in a state that accepts this action."
            }
            _ => "The tool could not complete the request.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CoreError;
    use crate::domain::call::CallId;
    use crate::domain::schedule::ScheduleId;
    use crate::gate::GateError;
    use crate::scheduling::{CronExpression, ScheduleError};

    #[test]
    fn classes_flow_through_from_the_source_error() {
        let missing_call = CoreError::from(GateError::NotFound(CallId::from("c1")));
        assert_eq!(missing_call.error_class(), "not_found");
        assert!(missing_call.is_not_found());

        let missing_schedule = CoreError::from(ScheduleError::NotFound(ScheduleId("s1".into())));
        assert!(missing_schedule.is_not_found());

        let cron = match CronExpression::parse("bad") {
            Err(error) => CoreError::from(error),
            Ok(_) => panic!("`bad` is not a cron expression"),
        };
        assert_eq!(cron.error_class(), "invalid_schedule");
        assert!(cron.user_message().contains("Check inputs"));
    }
}
