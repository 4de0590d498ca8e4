diesel::table! {
    buildpacks (id) {
        id -> Integer,
        namespace -> Text,
        name -> Text,
        version -> Text,
        address -> Text,
        metadata_id -> Text,
        homepage -> Text,
        stacks -> Jsonb,
        indexed_at -> Text,
    }
}
