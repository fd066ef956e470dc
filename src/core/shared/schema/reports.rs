diesel::table! {
    weekly_reports (id) {
        id -> Uuid,
        year -> Int4,
        week -> Int4,
        payload -> Jsonb,
        generated_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    monthly_reports (id) {
        id -> Uuid,
        year -> Int4,
        month -> Int4,
        payload -> Jsonb,
        generated_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    quarterly_reports (id) {
        id -> Uuid,
        year -> Int4,
        quarter -> Int4,
        payload -> Jsonb,
        generated_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}
