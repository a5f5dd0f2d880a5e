pub mod assignment_service;
pub mod notification_service;

pub use assignment_service::{
    AssignmentService, AssignmentSettings, ConversationHistory, HistoryPagination,
    SendUserMessageResult, WaitingPage,
};
pub use notification_service::NotificationService;
