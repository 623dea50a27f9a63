//! Azure AI Language clients.

pub mod conversations;
pub mod text_analytics;

pub use conversations::{AnalyzeConversationResult, ConversationAnalysisClient, ConversationTask};
pub use text_analytics::{
    ActionResult, AnalyzeAction, AnalyzeActionsOptions, AnalyzeActionsPoller, TextAnalyticsClient,
    TextDocumentInput,
};
