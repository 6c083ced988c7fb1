pub mod app;
pub mod bus;
pub mod care_decision;
pub mod communication;
pub mod context;
pub mod emergency_coord;
pub mod gate;
pub mod previsit;
pub mod reasoning;
pub mod refill;
pub mod runtime;
pub mod vitals;
pub mod wellness;

pub use app::{AppContext, Collaborators};
pub use bus::{Agent, AgentRegistry, EventBus, Publisher};
pub use care_decision::CareDecisionAgent;
pub use communication::CommunicationAgent;
pub use emergency_coord::EmergencyCoordAgent;
pub use gate::{gate, Phase};
pub use previsit::{InterviewTurn, PreVisitAgent};
pub use reasoning::Generated;
pub use refill::{RefillAction, RefillAgent, SweepReport};
pub use runtime::{sanitize, ActionTaken, ChatReply, ChatRequest, Orchestrator, ToolServices};
pub use vitals::{classify, HealthMonitorAgent, Severity, SeverityVerdict, VitalsOutcome};
pub use wellness::{MoodAnalysis, MoodReply, WellnessAgent};
