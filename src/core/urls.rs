#[derive(Debug)]
pub struct ApiUrls;

impl ApiUrls {
    pub const HEALTH: &'static str = "/api/health";

    // Auth
    pub const AUTH_REGISTER: &'static str = "/api/auth/register";
    pub const AUTH_LOGIN: &'static str = "/api/auth/login";
    pub const AUTH_REFRESH: &'static str = "/api/auth/refresh";
    pub const AUTH_LOGOUT: &'static str = "/api/auth/logout";
    pub const AUTH_ME: &'static str = "/api/auth/me";
    pub const AUTH_PASSWORD: &'static str = "/api/auth/password";
    pub const AUTH_OAUTH: &'static str = "/api/auth/oauth/:provider";
    pub const AUTH_OAUTH_CALLBACK: &'static str = "/api/auth/oauth/:provider/callback";

    // Users
    pub const USERS: &'static str = "/api/users";
    pub const USER_BY_ID: &'static str = "/api/users/:id";
    pub const USER_ROLE: &'static str = "/api/users/:id/role";

    // Tickets
    pub const TICKETS: &'static str = "/api/tickets";
    pub const TICKET_BY_ID: &'static str = "/api/tickets/:id";
    pub const TICKET_KANBAN: &'static str = "/api/tickets/kanban";
    pub const TICKET_REORDER: &'static str = "/api/tickets/reorder";
    pub const TICKET_IMPORT: &'static str = "/api/tickets/import";
    pub const TICKET_STAGE: &'static str = "/api/tickets/:id/stage";
    pub const TICKET_COMMENTS: &'static str = "/api/tickets/:id/comments";
    pub const TICKET_COMMENT_BY_ID: &'static str = "/api/tickets/:id/comments/:comment_id";
    pub const TICKET_FOLLOW: &'static str = "/api/tickets/:id/follow";
    pub const TICKET_FOLLOWERS: &'static str = "/api/tickets/:id/followers";
    pub const TICKET_ACTIVITIES: &'static str = "/api/tickets/:id/activities";

    // Documents
    pub const DOCUMENTS: &'static str = "/api/documents";
    pub const DOCUMENT_BY_ID: &'static str = "/api/documents/:id";
    pub const DOCUMENT_DOWNLOAD: &'static str = "/api/documents/:id/download";

    // Reminders
    pub const REMINDERS: &'static str = "/api/reminders";
    pub const REMINDERS_DUE: &'static str = "/api/reminders/due";
    pub const REMINDER_BY_ID: &'static str = "/api/reminders/:id";
    pub const REMINDER_DONE: &'static str = "/api/reminders/:id/done";

    // Manuals
    pub const MANUALS: &'static str = "/api/manuals";
    pub const MANUAL_BY_ID: &'static str = "/api/manuals/:id";

    // Workflows
    pub const WORKFLOWS: &'static str = "/api/workflows";
    pub const WORKFLOW_BY_ID: &'static str = "/api/workflows/:id";

    // Reports
    pub const REPORT_STATS: &'static str = "/api/reports/stats";
    pub const REPORT_GENERATE: &'static str = "/api/reports/generate";
    pub const REPORTS_WEEKLY: &'static str = "/api/reports/weekly";
    pub const REPORTS_MONTHLY: &'static str = "/api/reports/monthly";
    pub const REPORTS_QUARTERLY: &'static str = "/api/reports/quarterly";
    pub const REPORT_SAVED: &'static str = "/api/reports/saved/:period";

    // Chat
    pub const CHAT: &'static str = "/api/chat";
}
