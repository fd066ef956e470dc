use super::core::users;

diesel::table! {
    tickets (id) {
        id -> Uuid,
        title -> Varchar,
        description -> Nullable<Text>,
        status -> SmallInt,
        priority -> SmallInt,
        ticket_type -> SmallInt,
        stage -> SmallInt,
        position -> Int4,
        creator_id -> Nullable<Uuid>,
        assignee_id -> Nullable<Uuid>,
        due_date -> Nullable<Timestamptz>,
        resolved_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_comments (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        user_id -> Uuid,
        content -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_activities (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        user_id -> Nullable<Uuid>,
        action -> Varchar,
        details -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_followers (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        user_id -> Uuid,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(ticket_comments -> tickets (ticket_id));
diesel::joinable!(ticket_comments -> users (user_id));
diesel::joinable!(ticket_activities -> tickets (ticket_id));
diesel::joinable!(ticket_followers -> tickets (ticket_id));
diesel::joinable!(ticket_followers -> users (user_id));
