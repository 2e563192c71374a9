// Diesel table definitions. Kept in sync with `DbContext::init_schema`.

diesel::table! {
    products (id) {
        id -> Text,
        canonical_url -> Text,
        display_name -> Nullable<Text>,
        primary_image_url -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    variants (id) {
        id -> Text,
        product_id -> Text,
        attributes -> Text,
        sku -> Nullable<Text>,
        current_price_minor -> Nullable<BigInt>,
        currency -> Nullable<Text>,
        current_stock_status -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    price_history (id) {
        id -> BigInt,
        variant_id -> Text,
        price_minor -> BigInt,
        currency -> Nullable<Text>,
        recorded_at -> Text,
    }
}

diesel::table! {
    stock_history (id) {
        id -> BigInt,
        variant_id -> Text,
        status -> Text,
        recorded_at -> Text,
    }
}

diesel::table! {
    check_runs (id) {
        id -> Text,
        product_id -> Text,
        worker_id -> Text,
        started_at -> Text,
        finished_at -> Text,
        status -> Text,
        error_message -> Nullable<Text>,
        duration_ms -> BigInt,
        fetch_mode -> Nullable<Text>,
        content_hash -> Nullable<Text>,
    }
}

diesel::table! {
    trackers (id) {
        id -> Text,
        product_id -> Text,
        user_id -> Text,
        active -> Integer,
        price_threshold_pct -> Nullable<Double>,
        notify_restock -> Integer,
        created_at -> Text,
    }
}

diesel::table! {
    check_locks (product_id) {
        product_id -> Text,
        holder -> Text,
        acquired_at -> Text,
        expires_at -> Text,
    }
}

diesel::joinable!(variants -> products (product_id));
diesel::joinable!(price_history -> variants (variant_id));
diesel::joinable!(stock_history -> variants (variant_id));
diesel::joinable!(check_runs -> products (product_id));
diesel::joinable!(trackers -> products (product_id));

diesel::allow_tables_to_appear_in_same_query!(
    products,
    variants,
    price_history,
    stock_history,
    check_runs,
    trackers,
    check_locks,
);
