//! Table definitions.

diesel::table! {
    documents (id) {
        #[max_length = 64]
        id -> Varchar,
        owner_id -> Unsigned<Bigint>,
        #[max_length = 255]
        title -> Varchar,
    }
}

diesel::table! {
    users (id) {
        id -> Unsigned<Bigint>,
        #[max_length = 255]
        username -> Varchar,
        #[max_length = 255]
        password_hash -> Varchar,
    }
}

diesel::table! {
    document_snapshots (document_id, revision) {
        #[max_length = 64]
        document_id -> Varchar,
        revision -> Unsigned<Bigint>,
        content -> Longtext,
    }
}

diesel::table! {
    doc_stats (doc_id) {
        #[max_length = 64]
        doc_id -> Varchar,
        like_count -> Unsigned<Bigint>,
        view_count -> Unsigned<Bigint>,
        share_count -> Unsigned<Bigint>,
        question_mark_count -> Unsigned<Bigint>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}
