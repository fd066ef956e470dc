diesel::table! {
    users (id) {
        id -> Uuid,
        name -> Varchar,
        email -> Varchar,
        password_hash -> Nullable<Text>,
        role -> SmallInt,
        oauth_provider -> Nullable<Varchar>,
        oauth_id -> Nullable<Varchar>,
        avatar_url -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}
