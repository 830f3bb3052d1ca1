//! Diesel schema for task persistence.

diesel::table! {
    /// Task records.
    tasks (id) {
        /// Task identifier.
        id -> Uuid,
        /// Task type.
        task_type -> Text,
        /// Owning username.
        username -> Nullable<Text>,
        /// Opaque task payload.
        data -> Nullable<Jsonb>,
        /// Start timestamp; defaults to `clock_timestamp()`.
        start_date -> Timestamptz,
        /// Completion timestamp.
        end_date -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Append-only task status updates.
    task_statuses (id) {
        /// Status row identifier.
        id -> Uuid,
        /// Owning task.
        task_id -> Uuid,
        /// Status value.
        status -> Text,
        /// Optional status detail.
        detail -> Nullable<Text>,
        /// Creation timestamp; defaults to `clock_timestamp()`.
        created_date -> Timestamptz,
        /// Insertion order, breaking `created_date` ties.
        seq -> Int8,
    }
}

diesel::table! {
    /// Behaviors attached to tasks, at most one per type.
    task_behaviors (task_id, behavior_type) {
        /// Owning task.
        task_id -> Uuid,
        /// Behavior type.
        behavior_type -> Text,
        /// Opaque behavior payload.
        data -> Nullable<Jsonb>,
    }
}

diesel::joinable!(task_statuses -> tasks (task_id));
diesel::joinable!(task_behaviors -> tasks (task_id));
diesel::allow_tables_to_appear_in_same_query!(tasks, task_statuses, task_behaviors);
