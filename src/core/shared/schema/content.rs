diesel::table! {
    documents (id) {
        id -> Uuid,
        ticket_id -> Nullable<Uuid>,
        uploaded_by -> Nullable<Uuid>,
        original_name -> Varchar,
        stored_name -> Varchar,
        mime_type -> Varchar,
        size_bytes -> Int8,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    reminders (id) {
        id -> Uuid,
        user_id -> Uuid,
        ticket_id -> Nullable<Uuid>,
        title -> Varchar,
        description -> Nullable<Text>,
        remind_at -> Timestamptz,
        is_done -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    manuals (id) {
        id -> Uuid,
        title -> Varchar,
        content -> Text,
        category -> Nullable<Varchar>,
        author_id -> Uuid,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    workflows (id) {
        id -> Uuid,
        name -> Varchar,
        description -> Nullable<Text>,
        graph -> Jsonb,
        owner_id -> Uuid,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}
